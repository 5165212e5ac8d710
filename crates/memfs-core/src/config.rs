// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for memfs core

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::types::Permissions;

/// Node capacity, not counting the root directory
pub const MAX_FILES: usize = 100;
/// Upper bound for a single path component, in bytes
pub const MAX_NAME_LENGTH: usize = 50;
/// Upper bound for any absolute path the filesystem produces, in bytes
pub const MAX_PATH_LENGTH: usize = 256;
/// Default name of the persisted store
pub const FS_FILENAME: &str = "filesystem.dat";

/// System limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsLimits {
    pub max_files: usize,
    pub max_name_length: usize,
    pub max_path_length: usize,
    pub max_open_handles: usize,
    pub max_symlink_hops: usize,
}

impl Default for FsLimits {
    fn default() -> Self {
        Self {
            max_files: MAX_FILES,
            max_name_length: MAX_NAME_LENGTH,
            max_path_length: MAX_PATH_LENGTH,
            max_open_handles: 1024,
            max_symlink_hops: 40,
        }
    }
}

/// Where the persisted store lives
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackstoreMode {
    /// Kept in process memory; useful for tests and ephemeral sessions
    InMemory,
    /// A single file on the host filesystem, replaced atomically on save
    HostFs { path: PathBuf },
}

impl Default for BackstoreMode {
    fn default() -> Self {
        BackstoreMode::HostFs {
            path: PathBuf::from(FS_FILENAME),
        }
    }
}

/// Persistence policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorePolicy {
    pub backend: BackstoreMode,
    /// Save on `close_file_system` when there are unsaved mutations
    pub save_on_close: bool,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            backend: BackstoreMode::default(),
            save_on_close: true,
        }
    }
}

/// Main filesystem configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub limits: FsLimits,
    pub store: StorePolicy,
    pub default_permissions: Permissions,
    pub track_events: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            limits: FsLimits::default(),
            store: StorePolicy::default(),
            default_permissions: Permissions::Both,
            track_events: false,
        }
    }
}

impl FsConfig {
    /// Configuration backed by an in-memory store.
    pub fn in_memory() -> Self {
        Self {
            store: StorePolicy {
                backend: BackstoreMode::InMemory,
                ..StorePolicy::default()
            },
            ..Self::default()
        }
    }

    /// Configuration backed by a store file at `path`.
    pub fn with_store_path(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StorePolicy {
                backend: BackstoreMode::HostFs { path: path.into() },
                ..StorePolicy::default()
            },
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> FsResult<Self> {
        let config: FsConfig = toml::from_str(s).map_err(|_| FsError::InvalidArgument)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> FsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject limits the engine cannot honour.
    pub fn validate(&self) -> FsResult<()> {
        let l = &self.limits;
        if l.max_files == 0 || l.max_name_length == 0 || l.max_open_handles == 0 {
            return Err(FsError::InvalidArgument);
        }
        // "/" plus at least one single-byte name
        if l.max_path_length < 2 {
            return Err(FsError::InvalidArgument);
        }
        if l.max_files >= u32::MAX as usize {
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }
}
