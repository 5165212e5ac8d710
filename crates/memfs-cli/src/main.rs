// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use memfs_cli::{command, Cli};
use memfs_core::{BackstoreMode, FaultPolicy, FsConfig, FsError};

fn load_config(cli: &Cli) -> Result<FsConfig> {
    let mut config = match &cli.config {
        Some(path) => FsConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FsConfig::default(),
    };
    if let Some(store) = &cli.store {
        config.store.backend = BackstoreMode::HostFs {
            path: store.clone(),
        };
    }
    Ok(config)
}

fn load_fault_policy(path: &Path) -> Result<FaultPolicy> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read fault policy {}", path.display()))?;
    FaultPolicy::from_json_bytes(&bytes).context("invalid fault policy JSON")
}

fn run(cli: Cli) -> Result<String> {
    let config = load_config(&cli)?;
    let faults = match &cli.fault_policy {
        Some(path) => Some(load_fault_policy(path)?),
        None => None,
    };
    Ok(command::run(config, faults, cli.command)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = cli.logging.clone().init("memfs") {
        eprintln!("memfs: failed to initialise logging: {err:#}");
    }

    match run(cli) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            match err.downcast_ref::<FsError>() {
                Some(fs_err) => eprintln!("memfs: {}: {err:#}", fs_err.kind()),
                None => eprintln!("memfs: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
