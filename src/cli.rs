//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the Eliza daemon.

use clap::{Parser, Subcommand};

/// Eliza Daemon - autonomous multi-persona decision loop
///
/// Observes social, mining and governance signals, routes them to the
/// qualified persona, coordinates high-impact decisions and executes at most
/// one action per topic per cycle.
#[derive(Parser, Debug)]
#[command(name = "eliza-daemon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "ELIZA_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the decision loop
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Persona registry management
    Persona {
        #[command(subcommand)]
        subcommand: PersonaSubcommand,
    },

    /// Show recorded decisions
    History {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only show decisions by this persona
        #[arg(short, long)]
        persona: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Persona subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum PersonaSubcommand {
    /// List all registered personas with their success rates
    List,

    /// Show one persona in detail
    Show {
        /// Persona id
        id: String,
    },

    /// Set a persona active
    Activate { id: String },

    /// Set a persona inactive
    Deactivate { id: String },

    /// Suspend a persona manually
    Suspend { id: String },

    /// Put a persona into maintenance
    Maintenance { id: String },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["eliza-daemon", "run"]);
        match cli.command {
            Commands::Run { once } => assert!(!once),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_once_with_config() {
        let cli = Cli::parse_from(["eliza-daemon", "run", "--once", "--config", "/etc/eliza.toml"]);
        assert_eq!(cli.config, Some("/etc/eliza.toml".to_string()));
        match cli.command {
            Commands::Run { once } => assert!(once),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_persona_suspend() {
        let cli = Cli::parse_from(["eliza-daemon", "persona", "suspend", "marcus_technical"]);
        match cli.command {
            Commands::Persona {
                subcommand: PersonaSubcommand::Suspend { id },
            } => assert_eq!(id, "marcus_technical"),
            _ => panic!("Expected Persona Suspend command"),
        }
    }

    #[test]
    fn test_history_defaults() {
        let cli = Cli::parse_from(["eliza-daemon", "history"]);
        match cli.command {
            Commands::History { limit, persona } => {
                assert_eq!(limit, 20);
                assert!(persona.is_none());
            }
            _ => panic!("Expected History command"),
        }
    }

    #[test]
    fn test_history_filtered() {
        let cli = Cli::parse_from(["eliza-daemon", "history", "-l", "5", "--persona", "sofia"]);
        match cli.command {
            Commands::History { limit, persona } => {
                assert_eq!(limit, 5);
                assert_eq!(persona.as_deref(), Some("sofia"));
            }
            _ => panic!("Expected History command"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_flags() {
        let cli = Cli::parse_from(["eliza-daemon", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);

        let cli = Cli::parse_from(["eliza-daemon", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["eliza-daemon", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
