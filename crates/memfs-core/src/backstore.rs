// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Backing store implementations for the persisted filesystem image

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::BackstoreMode;
use crate::error::{FsError, FsResult};
use crate::fault::{FaultInjector, FaultOp};

/// Durable home of the serialized filesystem.
///
/// `write_atomic` either replaces the whole store or leaves the previous
/// contents untouched.
pub trait Backstore: Send {
    fn exists(&self) -> bool;
    fn read(&mut self) -> FsResult<Vec<u8>>;
    fn write_atomic(&mut self, bytes: &[u8]) -> FsResult<()>;
    fn fault_injector(&mut self) -> &mut FaultInjector;
    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// In-memory backstore implementation
#[derive(Debug, Default)]
pub struct InMemoryBackstore {
    data: Option<Vec<u8>>,
    faults: FaultInjector,
}

impl InMemoryBackstore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backstore for InMemoryBackstore {
    fn exists(&self) -> bool {
        self.data.is_some()
    }

    fn read(&mut self) -> FsResult<Vec<u8>> {
        self.faults.check(FaultOp::StoreRead)?;
        self.data.clone().ok_or(FsError::NotFound)
    }

    fn write_atomic(&mut self, bytes: &[u8]) -> FsResult<()> {
        self.faults.check(FaultOp::StoreWrite)?;
        let staged = bytes.to_vec();
        self.faults.check(FaultOp::StoreSync)?;
        self.faults.check(FaultOp::StoreRename)?;
        self.data = Some(staged);
        Ok(())
    }

    fn fault_injector(&mut self) -> &mut FaultInjector {
        &mut self.faults
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Host filesystem backstore: one file, replaced via write-to-temp + rename.
#[derive(Debug)]
pub struct HostFsBackstore {
    path: PathBuf,
    faults: FaultInjector,
}

impl HostFsBackstore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            faults: FaultInjector::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl Backstore for HostFsBackstore {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn read(&mut self) -> FsResult<Vec<u8>> {
        self.faults.check(FaultOp::StoreRead)?;
        Ok(std::fs::read(&self.path)?)
    }

    fn write_atomic(&mut self, bytes: &[u8]) -> FsResult<()> {
        self.faults.check(FaultOp::StoreWrite)?;
        // The temp file lives next to the target so the final rename stays on one filesystem
        let mut staged = tempfile::NamedTempFile::new_in(self.staging_dir())?;
        staged.write_all(bytes)?;
        self.faults.check(FaultOp::StoreSync)?;
        staged.as_file().sync_all()?;
        self.faults.check(FaultOp::StoreRename)?;
        staged.persist(&self.path).map_err(|err| FsError::Io(err.error))?;
        Ok(())
    }

    fn fault_injector(&mut self) -> &mut FaultInjector {
        &mut self.faults
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}

pub fn create_backstore(mode: &BackstoreMode) -> Box<dyn Backstore> {
    match mode {
        BackstoreMode::InMemory => Box::new(InMemoryBackstore::new()),
        BackstoreMode::HostFs { path } => Box::new(HostFsBackstore::new(path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultPolicy, FaultRule};

    #[test]
    fn host_store_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HostFsBackstore::new(dir.path().join("fs.dat"));
        assert!(!store.exists());
        assert!(store.path().ends_with("fs.dat"));
        assert!(store.describe().ends_with("fs.dat"));

        store.write_atomic(b"first").unwrap();
        store.write_atomic(b"second").unwrap();
        assert!(store.exists());
        assert_eq!(store.read().unwrap(), b"second");
    }

    #[test]
    fn failed_rename_keeps_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HostFsBackstore::new(dir.path().join("fs.dat"));
        store.write_atomic(b"stable").unwrap();

        store
            .fault_injector()
            .set_policy(FaultPolicy::single(FaultRule::always(FaultOp::StoreRename)));
        assert!(store.write_atomic(b"torn").is_err());
        store.fault_injector().clear();

        assert_eq!(store.read().unwrap(), b"stable");
        // No stray temp files left behind
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn memory_store_honours_faults() {
        let mut store = InMemoryBackstore::new();
        store
            .fault_injector()
            .set_policy(FaultPolicy::single(FaultRule::always(FaultOp::StoreSync)));
        assert!(store.write_atomic(b"data").is_err());
        assert!(!store.exists());
        assert!(matches!(store.read(), Err(FsError::NotFound)));
    }
}
