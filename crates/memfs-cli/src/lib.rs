// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One-shot command dispatcher over a persisted memfs store
//!
//! Every invocation loads the store, runs exactly one operation, prints its
//! result and saves the store again when the operation changed anything.

pub mod command;
pub mod render;

use std::path::PathBuf;

use clap::Parser;
use memfs_logging::CliLoggingArgs;

pub use command::{execute, run, Command};

#[derive(Parser, Debug)]
#[command(
    name = "memfs",
    author,
    version,
    about = "Operate on an in-memory filesystem persisted to a single store file"
)]
pub struct Cli {
    /// Store file to load and save (overrides the config file)
    #[arg(long, env = "MEMFS_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "MEMFS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Install a fault-injection policy (JSON) for store I/O during this run
    #[arg(long, global = true)]
    pub fault_policy: Option<PathBuf>,

    #[command(flatten)]
    pub logging: CliLoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;
    use memfs_core::Permissions;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["memfs", "mkdir", "/a", "--store", "/tmp/fs.dat"]).unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/fs.dat")));
        assert_eq!(
            cli.command,
            Command::Mkdir {
                path: "/a".to_string(),
                mode: None
            }
        );
    }

    #[test]
    fn parses_link_and_chmod() {
        let cli = Cli::try_parse_from(["memfs", "ln", "-s", "target", "/link"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Ln {
                symbolic: true,
                target: "target".to_string(),
                link: "/link".to_string()
            }
        );

        let cli = Cli::try_parse_from(["memfs", "chmod", "r", "/f"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Chmod {
                mode: Permissions::Read,
                path: "/f".to_string()
            }
        );
        assert!(Cli::try_parse_from(["memfs", "chmod", "x", "/f"]).is_err());
    }

    #[test]
    fn ls_defaults_to_current_directory() {
        let cli = Cli::try_parse_from(["memfs", "ls"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Ls {
                path: ".".to_string(),
                long: false
            }
        );
    }
}
