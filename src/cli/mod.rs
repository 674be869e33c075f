//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the bot (`run`, the default)
//! - Emptying the staging directory (`sweep`)
//! - Printing the effective configuration (`check-config`)

mod check_config;
mod sweep;

pub use check_config::{render_config, run_check_config_command};
pub use sweep::run_sweep_command;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ttsrelay")]
#[command(about = "Chat bot that converts uploaded text documents into speech")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Emit logs as JSON lines (also enabled by LOG_FORMAT=json)
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the bot (default if no subcommand given)
    Run,

    /// Delete every staged audio file and exit
    Sweep,

    /// Validate configuration and print it without secrets
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_subcommand() {
        let cli = Cli::try_parse_from(["ttsrelay"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["ttsrelay", "sweep"]).unwrap();
        assert_eq!(cli.command, Some(Command::Sweep));

        let cli = Cli::try_parse_from(["ttsrelay", "check-config", "--log-json"]).unwrap();
        assert_eq!(cli.command, Some(Command::CheckConfig));
        assert!(cli.log_json);
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["ttsrelay", "serve"]).is_err());
    }
}
