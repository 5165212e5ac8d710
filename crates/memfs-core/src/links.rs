// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hard and symbolic links

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::tree::NodeBody;
use crate::vfs::FsCore;
use crate::NodeId;

impl FsCore {
    /// Add a second entry for the file at `existing`.
    ///
    /// The new entry shares content and permissions with the original; the
    /// content lives until the last entry is deleted.
    pub fn create_hard_link(&mut self, existing: &str, new_path: &str) -> FsResult<NodeId> {
        let src = self.tree.resolve(existing, true)?;
        let (content, permissions) = {
            let node = self.tree.node(src)?;
            match node.body {
                NodeBody::File { content } => (content, node.permissions),
                _ => return Err(FsError::IsADirectory),
            }
        };
        let (parent, name) = self.tree.resolve_parent(new_path)?;
        let id = self
            .tree
            .insert_child(parent, &name, permissions, NodeBody::File { content })?;
        self.tree.contents_mut().increment_refcount(content)?;
        self.created(id)?;
        debug!(existing = %existing, new = %new_path, node = ?id, "created hard link");
        Ok(id)
    }

    /// Create a symbolic link at `new_path` storing `target` verbatim.
    ///
    /// The target need not exist.
    pub fn create_symbolic_link(&mut self, target: &str, new_path: &str) -> FsResult<NodeId> {
        if target.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        if target.len() > self.config.limits.max_path_length {
            return Err(FsError::PathTooLong);
        }
        let (parent, name) = self.tree.resolve_parent(new_path)?;
        let id = self.tree.insert_child(
            parent,
            &name,
            self.config.default_permissions,
            NodeBody::Symlink {
                target: target.to_string(),
            },
        )?;
        self.created(id)?;
        debug!(target = %target, link = %new_path, node = ?id, "created symbolic link");
        Ok(id)
    }

    /// Stored target of the symbolic link at `path`.
    pub fn read_link(&self, path: &str) -> FsResult<String> {
        let id = self.tree.resolve(path, false)?;
        match &self.tree.node(id)?.body {
            NodeBody::Symlink { target } => Ok(target.clone()),
            _ => Err(FsError::InvalidArgument),
        }
    }
}
