//! Command-line tools around the tenant token cache
//!
//! ```text
//! tenant-authz keygen --kid K1 --private-key k1.pem --jwks keys.json
//! tenant-authz sign --private-key k1.pem --kid K1 --tenant tenantA --ttl 600
//! tenant-authz inspect <TOKEN>
//! tenant-authz check --jwks keys.json --tenant tenantA <TOKEN>
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod commands;

use std::io::Write;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

pub use commands::Command;

/// Key, token and authorization tooling
#[derive(Debug, Parser)]
#[command(name = "tenant-authz", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Command succeeded
    Success,
    /// Token was refused or could not be parsed
    Denied,
}

impl Outcome {
    /// Process exit code: 0 on success, 1 when denied
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Denied => ExitCode::from(1),
        }
    }
}

impl Cli {
    /// Install the stderr log subscriber for the chosen verbosity
    pub fn init_tracing(&self) {
        use tracing::Level;

        let level = if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .init();
    }

    /// Run the selected subcommand, writing results to `out`
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable files, bad keys or configuration.
    /// A refused token is an [`Outcome::Denied`], not an error.
    pub fn execute(self, out: &mut impl Write) -> anyhow::Result<Outcome> {
        self.command.execute(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["tenant-authz", "-vv", "inspect", "a.b.c"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["tenant-authz", "-q", "-v", "inspect", "a.b.c"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(
            format!("{:?}", Outcome::Success.exit_code()),
            format!("{:?}", ExitCode::SUCCESS)
        );
        assert_ne!(
            format!("{:?}", Outcome::Denied.exit_code()),
            format!("{:?}", ExitCode::SUCCESS)
        );
    }
}
