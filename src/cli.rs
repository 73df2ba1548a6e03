//! Command-line surface: start, resume, force-resume, restart, restart-all,
//! and the version queries.
//!
//! The reference commands `-version`/`-bignumversion` are exposed as
//! ordinary subcommands (`version`/`bignumversion`) rather than
//! leading-dash flags — clap treats a leading dash as an option, not a
//! subcommand name, so this is the idiomatic adjustment.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hippso", about = "Arbitrary-precision particle swarm optimizer driver", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new run from a configuration file.
    C { config: PathBuf },
    /// Resume a run; requires the `.SHUTDOWN` sentinel to be present.
    R { confbu: PathBuf },
    /// Force-resume a run without requiring the `.SHUTDOWN` sentinel.
    Rf { confbu: PathBuf },
    /// Resume with a possibly-modified configuration.
    Restart { config: PathBuf, backup: PathBuf },
    /// Resume every shut-down run found under a directory.
    RestartAll { dir: PathBuf },
    /// Print the engine version and exit.
    Version,
    /// Print the bignum backend's version and exit.
    Bignumversion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_command_with_config_path() {
        let cli = Cli::parse_from(["hippso", "c", "run.toml"]);
        match cli.command {
            Command::C { config } => assert_eq!(config, PathBuf::from("run.toml")),
            other => panic!("expected C, got {other:?}"),
        }
    }

    #[test]
    fn parses_restart_command_with_two_paths() {
        let cli = Cli::parse_from(["hippso", "restart", "run.toml", "run.backup"]);
        match cli.command {
            Command::Restart { config, backup } => {
                assert_eq!(config, PathBuf::from("run.toml"));
                assert_eq!(backup, PathBuf::from("run.backup"));
            }
            other => panic!("expected Restart, got {other:?}"),
        }
    }
}
