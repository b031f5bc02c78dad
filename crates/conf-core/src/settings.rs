//! Settings for the engine itself
//!
//! Read once at startup from a TOML (or commented JSON) file:
//!
//! ```toml
//! system_path = "/etc/assistant/assistant.conf"
//!
//! [remote]
//! url = "https://api.example.org/v1/device/settings"
//! poll_interval_secs = 60
//!
//! [policy]
//! log_level = "system"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use conf_fs::ConfigStore;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::policy::{OverridePolicy, PolicyRule};
use crate::store::DefaultSource;

const SYSTEM_CONFIG_PATH: &str = "/etc/assistant/assistant.conf";
const USER_CONFIG_DIR: &str = ".assistant";
const CONFIG_FILE_NAME: &str = "assistant.conf";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// File replacing the embedded defaults
    pub default_path: Option<PathBuf>,
    pub system_path: PathBuf,
    pub user_path: PathBuf,
    /// Absent: the REMOTE layer stays empty
    pub remote: Option<RemoteSettings>,
    pub watch: WatchSettings,
    /// Merged over [`OverridePolicy::builtin`]
    pub policy: BTreeMap<String, PolicyRule>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_path: None,
            system_path: PathBuf::from(SYSTEM_CONFIG_PATH),
            user_path: default_user_path(),
            remote: None,
            watch: WatchSettings::default(),
            policy: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    /// Load settings from `path`. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Self = ConfigStore::new().load(path)?;
        tracing::debug!(?path, "Loaded engine settings");
        Ok(settings)
    }

    /// Load settings from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(?path, "No engine settings file, using defaults");
            Ok(Self::default())
        }
    }

    /// Settings file location under the user's home directory.
    pub fn default_location() -> PathBuf {
        user_config_dir().join("engine.toml")
    }

    /// Built-in policy extended with the `[policy]` table.
    pub fn override_policy(&self) -> Result<OverridePolicy> {
        let mut policy = OverridePolicy::builtin();
        policy.extend_rules(&self.policy)?;
        Ok(policy)
    }

    pub fn default_source(&self) -> DefaultSource {
        match &self.default_path {
            Some(path) => DefaultSource::File(path.clone()),
            None => DefaultSource::Embedded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub url: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_secs: u64,
    /// Translate camelCase keys in remote payloads to snake_case
    pub translate_keys: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 10,
            poll_interval_secs: 60,
            backoff_initial_ms: 500,
            backoff_max_secs: 300,
            translate_keys: true,
        }
    }
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub file_poll_interval_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            file_poll_interval_ms: 1000,
        }
    }
}

impl WatchSettings {
    pub fn file_poll_interval(&self) -> Duration {
        Duration::from_millis(self.file_poll_interval_ms.max(10))
    }
}

fn user_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(USER_CONFIG_DIR)
}

fn default_user_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::path::ConfigPath;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "").unwrap();

        let settings = EngineSettings::load(&path).unwrap();

        assert_eq!(settings.system_path, PathBuf::from("/etc/assistant/assistant.conf"));
        assert!(settings.user_path.ends_with(".assistant/assistant.conf"));
        assert_eq!(settings.remote, None);
        assert_eq!(settings.watch.file_poll_interval_ms, 1000);
        assert_eq!(settings.default_source(), DefaultSource::Embedded);
    }

    #[test]
    fn remote_section_fills_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(
            &path,
            r#"
[remote]
url = "http://localhost:8080/v1/settings"
timeout_secs = 3
"#,
        )
        .unwrap();

        let remote = EngineSettings::load(&path).unwrap().remote.unwrap();

        assert_eq!(remote.url, "http://localhost:8080/v1/settings");
        assert_eq!(remote.timeout(), Duration::from_secs(3));
        assert_eq!(remote.poll_interval(), Duration::from_secs(60));
        assert!(remote.translate_keys);
    }

    #[test]
    fn policy_table_extends_builtin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(
            &path,
            r#"
[policy]
"listener.wake_word" = "user"
tts = ["default", "user"]
"#,
        )
        .unwrap();

        let policy = EngineSettings::load(&path).unwrap().override_policy().unwrap();

        let wake_word = ConfigPath::parse("listener.wake_word").unwrap();
        assert!(!policy.is_allowed(&wake_word, Layer::System));
        assert!(policy.is_allowed(&wake_word, Layer::User));
        assert!(!policy.is_allowed(&ConfigPath::parse("tts.module").unwrap(), Layer::Remote));
        assert!(!policy.is_allowed(&ConfigPath::parse("log_level").unwrap(), Layer::Remote));
    }

    #[test]
    fn missing_settings_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = EngineSettings::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }
}
