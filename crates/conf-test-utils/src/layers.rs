//! [`TestLayers`] fixture for engine test scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use conf_core::{DefaultSource, EngineSettings, WatchSettings};
use serde_json::Value;
use tempfile::TempDir;

/// A temporary directory holding the SYSTEM and USER layer files, an
/// optional file-backed DEFAULT layer and an engine settings file.
///
/// # Example
///
/// ```rust,no_run
/// use conf_test_utils::TestLayers;
/// use serde_json::json;
///
/// let layers = TestLayers::new();
/// layers.write_user(&json!({"system_unit": "english"}));
/// let settings = layers.settings();
/// ```
pub struct TestLayers {
    temp_dir: TempDir,
}

impl Default for TestLayers {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLayers {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn default_path(&self) -> PathBuf {
        self.root().join("default.conf")
    }

    pub fn system_path(&self) -> PathBuf {
        self.root().join("system").join("assistant.conf")
    }

    pub fn user_path(&self) -> PathBuf {
        self.root().join("user").join("assistant.conf")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root().join("engine.toml")
    }

    /// Engine settings pointing at this fixture's files, with a short
    /// file poll interval and no remote.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            system_path: self.system_path(),
            user_path: self.user_path(),
            watch: WatchSettings {
                file_poll_interval_ms: 20,
            },
            ..EngineSettings::default()
        }
    }

    /// Default source backed by `default.conf` in this fixture.
    pub fn default_file(&self) -> DefaultSource {
        DefaultSource::File(self.default_path())
    }

    /// A literal default tree.
    ///
    /// # Panics
    /// Panics if `value` is not a JSON object.
    pub fn literal_default(value: &Value) -> DefaultSource {
        DefaultSource::Literal(
            value
                .as_object()
                .cloned()
                .expect("default layer must be a JSON object"),
        )
    }

    pub fn write_default(&self, value: &Value) {
        write_json(&self.default_path(), value);
    }

    pub fn write_system(&self, value: &Value) {
        write_json(&self.system_path(), value);
    }

    pub fn write_user(&self, value: &Value) {
        write_json(&self.user_path(), value);
    }

    /// Write raw text to the USER file, e.g. a commented or broken document.
    pub fn write_user_raw(&self, content: &str) {
        write_raw(&self.user_path(), content);
    }

    /// Copy an existing document into place as the SYSTEM file.
    pub fn install_system(&self, source: &Path) {
        copy_into(source, &self.system_path());
    }

    /// Copy an existing document into place as the USER file.
    pub fn install_user(&self, source: &Path) {
        copy_into(source, &self.user_path());
    }

    pub fn remove_user(&self) {
        fs::remove_file(self.user_path()).unwrap();
    }

    /// Write `engine.toml` with this fixture's layer paths followed by
    /// `extra` (TOML tables such as `[remote]` or `[policy]`).
    pub fn write_settings(&self, extra: &str) -> PathBuf {
        let path = self.settings_path();
        let content = format!(
            "system_path = {:?}\nuser_path = {:?}\n\n[watch]\nfile_poll_interval_ms = 20\n\n{extra}",
            self.system_path().display().to_string(),
            self.user_path().display().to_string(),
        );
        write_raw(&path, &content);
        path
    }

    /// Parsed content of the USER file.
    ///
    /// # Panics
    /// Panics if the file is missing or not JSON.
    pub fn read_user(&self) -> Value {
        let content = fs::read_to_string(self.user_path())
            .unwrap_or_else(|_| panic!("Could not read {}", self.user_path().display()));
        serde_json::from_str(&content).unwrap()
    }
}

fn write_json(path: &Path, value: &Value) {
    write_raw(path, &serde_json::to_string_pretty(value).unwrap());
}

fn write_raw(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn copy_into(source: &Path, target: &Path) {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::copy(source, target)
        .unwrap_or_else(|e| panic!("Could not copy {}: {e}", source.display()));
}
