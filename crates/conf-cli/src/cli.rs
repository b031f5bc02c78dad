//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and edit the assistant's layered configuration
#[derive(Parser, Debug)]
#[command(name = "conf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine settings file (defaults to ~/.assistant/engine.toml)
    #[arg(long, global = true, env = "ASSISTANT_CONF_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the effective configuration
    Show {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Print the value at a dotted path
    ///
    /// Strings are printed bare, everything else as JSON.
    ///
    /// Examples:
    ///   conf get stt.module
    ///   conf get listener
    Get {
        /// Dotted path, e.g. listener.wake_word
        path: String,
    },

    /// Show which layer supplies a value and what each layer defines
    Explain {
        /// Dotted path, e.g. system_unit
        path: String,
    },

    /// List the four layers with their sources and status
    Layers {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Persist a value into the user (or system) layer file
    ///
    /// The value is parsed as JSON and falls back to a plain string.
    ///
    /// Examples:
    ///   conf set system_unit english
    ///   conf set listener.multiplier 1.2
    ///   conf set log_level DEBUG --system
    Set {
        /// Dotted path, e.g. tts.module
        path: String,

        /// New value
        value: String,

        /// Write the system file instead of the user file
        #[arg(long)]
        system: bool,
    },

    /// Follow configuration changes until interrupted
    Watch {
        /// Only report changes under this dotted prefix
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_defaults_to_user_layer() {
        let cli = Cli::try_parse_from(["conf", "set", "system_unit", "english"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Set {
                path: "system_unit".into(),
                value: "english".into(),
                system: false,
            })
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["conf", "show", "--json", "-v", "--settings", "engine.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.settings, Some(PathBuf::from("engine.toml")));
        assert_eq!(cli.command, Some(Commands::Show { json: true }));
    }

    #[test]
    fn watch_prefix_is_optional() {
        let cli = Cli::try_parse_from(["conf", "watch"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Watch { prefix: String::new() }));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
