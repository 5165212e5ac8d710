// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for memfs

use serde::{Deserialize, Serialize};

/// Logical node identity: a slot index tagged with the slot's generation.
///
/// Freeing a node bumps its slot generation, so an identity kept past the
/// node's lifetime is rejected instead of silently naming whatever reuses
/// the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Opaque handle identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Identity of a file's content, shared by every hard link to it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId(pub u64);

impl ContentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Access mode stored on every node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permissions {
    Read,
    Write,
    Both,
}

impl Permissions {
    /// Whether a node carrying these permissions may be opened with `mode`.
    pub fn permits(self, mode: OpenMode) -> bool {
        match mode {
            OpenMode::Read => self.can_read(),
            OpenMode::Write => self.can_write(),
            OpenMode::Both => self == Permissions::Both,
        }
    }

    pub fn can_read(self) -> bool {
        matches!(self, Permissions::Read | Permissions::Both)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Permissions::Write | Permissions::Both)
    }
}

impl std::fmt::Display for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permissions::Read => f.write_str("r-"),
            Permissions::Write => f.write_str("-w"),
            Permissions::Both => f.write_str("rw"),
        }
    }
}

impl std::str::FromStr for Permissions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "r" | "read" => Ok(Permissions::Read),
            "w" | "write" => Ok(Permissions::Write),
            "rw" | "both" => Ok(Permissions::Both),
            _ => Err(format!("Invalid permissions: {}. Use 'r', 'w' or 'rw'", s)),
        }
    }
}

/// Mode requested when opening a file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write,
    Both,
}

impl OpenMode {
    pub fn can_read(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::Both)
    }

    pub fn can_write(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::Both)
    }
}

impl std::str::FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "rw" => Ok(OpenMode::Both),
            _ => Err(format!("Invalid open mode: {}. Use 'r', 'w' or 'rw'", s)),
        }
    }
}

/// Structural kind of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Link discriminator reported for a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkKind {
    None,
    /// The node's content identity is shared with at least one other entry
    HardAlias(ContentId),
    /// The node stores a path resolved at traversal time
    Symbolic(String),
}

/// Node metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub link: LinkKind,
    pub permissions: Permissions,
    pub size: u64,
    /// Entries sharing this node's content; 0 for directories and symbolic links
    pub refcount: usize,
}

/// Directory entry information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub link: LinkKind,
    pub permissions: Permissions,
    pub size: u64,
}

/// Filesystem statistics
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsStats {
    /// Live nodes, not counting the root
    pub nodes: usize,
    pub capacity: usize,
    pub open_handles: usize,
    pub content_bytes: u64,
}

/// Event kinds for filesystem change notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created { path: String },
    Removed { path: String },
    Modified { path: String },
    Renamed { from: String, to: String },
}

/// Event sink trait for receiving filesystem change notifications
pub trait EventSink: Send + Sync {
    fn on_event(&self, evt: &EventKind);
}

/// Opaque event subscription identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}
