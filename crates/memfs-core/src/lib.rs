// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memfs core: an in-memory hierarchical filesystem with a bounded node pool
//!
//! This crate provides the directory tree, path resolution, hard and symbolic
//! links, permission checks, file handles and the persisted store.

pub mod backstore;
pub mod config;
pub mod error;
pub mod fault;
mod handles;
mod links;
mod persist;
pub mod storage;
pub mod store;
mod tree;
pub mod types;
pub mod vfs;

// Re-export key types for convenience
pub use backstore::{create_backstore, Backstore, HostFsBackstore, InMemoryBackstore};
pub use config::{
    BackstoreMode, FsConfig, FsLimits, StorePolicy, FS_FILENAME, MAX_FILES, MAX_NAME_LENGTH,
    MAX_PATH_LENGTH,
};
pub use error::{ErrorKind, FsError, FsResult};
pub use fault::{FaultErrno, FaultInjector, FaultOp, FaultPolicy, FaultRule};
pub use types::*;
pub use vfs::FsCore;
