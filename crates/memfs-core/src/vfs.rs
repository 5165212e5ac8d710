// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem engine: lifecycle, tree operations and change events

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backstore::{create_backstore, Backstore};
use crate::error::{FsError, FsResult};
use crate::fault::FaultInjector;
use crate::handles::Handle;
use crate::tree::{NodeBody, Tree};
use crate::{
    DirEntry, EventKind, EventSink, FsConfig, FsStats, HandleId, NodeId, NodeInfo, Permissions,
    SubscriptionId,
};

/// The filesystem engine.
///
/// Owns the tree, the open handle table and the backing store. Every
/// operation runs to completion on `&mut self`; a failed operation leaves
/// the tree as it was.
pub struct FsCore {
    pub(crate) config: FsConfig,
    pub(crate) tree: Tree,
    pub(crate) handles: HashMap<HandleId, Handle>,
    pub(crate) next_handle_id: u64,
    pub(crate) backstore: Box<dyn Backstore>,
    pub(crate) dirty: bool,
    event_subscriptions: HashMap<SubscriptionId, Arc<dyn EventSink>>,
    next_subscription_id: u64,
}

impl FsCore {
    /// Create an empty filesystem holding only the root directory.
    #[doc(alias = "init_file_system")]
    pub fn new(config: FsConfig) -> FsResult<Self> {
        config.validate()?;
        let tree = Tree::new(config.limits.clone(), config.default_permissions)?;
        let backstore = create_backstore(&config.store.backend);
        info!(store = %backstore.describe(), max_files = config.limits.max_files, "filesystem initialised");
        Ok(Self {
            config,
            tree,
            handles: HashMap::new(),
            next_handle_id: 1,
            backstore,
            dirty: false,
            event_subscriptions: HashMap::new(),
            next_subscription_id: 1,
        })
    }

    /// Load the configured store if it exists, otherwise start empty.
    pub fn open(config: FsConfig) -> FsResult<Self> {
        let mut fs = Self::new(config)?;
        if fs.backstore.exists() {
            fs.load_file_system()?;
        }
        Ok(fs)
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Whether there are mutations not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the configured backing store already holds a saved filesystem.
    pub fn store_exists(&self) -> bool {
        self.backstore.exists()
    }

    pub fn fault_injector(&mut self) -> &mut FaultInjector {
        self.backstore.fault_injector()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // Creation

    pub fn create_file(&mut self, path: &str) -> FsResult<NodeId> {
        self.create_file_with(path, self.config.default_permissions)
    }

    pub fn create_file_with(&mut self, path: &str, permissions: Permissions) -> FsResult<NodeId> {
        let (parent, name) = self.tree.resolve_parent(path)?;
        let content = self.tree.contents_mut().allocate(&[]);
        let id = match self
            .tree
            .insert_child(parent, &name, permissions, NodeBody::File { content })
        {
            Ok(id) => id,
            Err(err) => {
                self.tree.contents_mut().decrement_refcount(content);
                return Err(err);
            }
        };
        self.created(id)?;
        debug!(path = %path, node = ?id, "created file");
        Ok(id)
    }

    pub fn create_directory(&mut self, path: &str) -> FsResult<NodeId> {
        self.create_directory_with(path, self.config.default_permissions)
    }

    pub fn create_directory_with(
        &mut self,
        path: &str,
        permissions: Permissions,
    ) -> FsResult<NodeId> {
        let (parent, name) = self.tree.resolve_parent(path)?;
        let id = self.tree.insert_child(
            parent,
            &name,
            permissions,
            NodeBody::Directory {
                children: Vec::new(),
            },
        )?;
        self.created(id)?;
        debug!(path = %path, node = ?id, "created directory");
        Ok(id)
    }

    pub(crate) fn created(&mut self, id: NodeId) -> FsResult<()> {
        self.mark_dirty();
        if self.config.track_events {
            let path = self.tree.absolute_path(id)?;
            self.emit_event(EventKind::Created { path });
        }
        Ok(())
    }

    // Removal and relocation

    /// Remove a file, symbolic link, hard-link entry or empty directory.
    ///
    /// A symbolic link is removed itself, not its target.
    pub fn delete_file(&mut self, path: &str) -> FsResult<()> {
        let id = self.tree.resolve(path, false)?;
        if id == self.tree.root() {
            return Err(FsError::InvalidArgument);
        }
        if let NodeBody::Directory { children } = &self.tree.node(id)?.body {
            if !children.is_empty() {
                return Err(FsError::NotEmpty);
            }
        }
        if id == self.tree.cwd() {
            return Err(FsError::Busy);
        }
        let abs = self.tree.absolute_path(id)?;
        self.tree.detach(id)?;
        self.tree.release(id)?;
        self.mark_dirty();
        debug!(path = %abs, node = ?id, "deleted entry");
        self.emit_event(EventKind::Removed { path: abs });
        Ok(())
    }

    /// Work out where `src_name` lands for a move or copy to `dst`.
    fn destination(&self, dst: &str, src_name: &str) -> FsResult<(NodeId, String)> {
        match self.tree.resolve(dst, true) {
            Ok(existing) if self.tree.node(existing)?.is_dir() => {
                Ok((existing, src_name.to_string()))
            }
            Ok(_) => Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => self.tree.resolve_parent(dst),
            Err(err) => Err(err),
        }
    }

    pub fn move_file(&mut self, src: &str, dst: &str) -> FsResult<()> {
        let id = self.tree.resolve(src, false)?;
        if id == self.tree.root() {
            return Err(FsError::InvalidArgument);
        }
        let (old_parent, old_name) = {
            let node = self.tree.node(id)?;
            (node.parent.ok_or(FsError::InvalidArgument)?, node.name.clone())
        };
        let (new_parent, new_name) = self.destination(dst, &old_name)?;
        if self.tree.is_ancestor_or_self(id, new_parent)? {
            return Err(FsError::CyclicLink);
        }
        if new_parent == old_parent && new_name == old_name {
            return Ok(());
        }
        if self.tree.find_child(new_parent, &new_name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        let suffix = self.tree.subtree_max_suffix(id)?;
        self.tree.check_fits(new_parent, &new_name, suffix)?;

        let from = self.tree.absolute_path(id)?;
        self.tree.detach(id)?;
        self.tree.attach(id, new_parent, &new_name)?;
        self.mark_dirty();
        let to = self.tree.absolute_path(id)?;
        debug!(from = %from, to = %to, node = ?id, "moved entry");
        self.emit_event(EventKind::Renamed { from, to });
        Ok(())
    }

    /// Copy a file, symbolic link or whole directory tree.
    ///
    /// Copies never share content with the source; permissions are kept.
    pub fn copy_file(&mut self, src: &str, dst: &str) -> FsResult<NodeId> {
        let id = self.tree.resolve(src, false)?;
        let src_name = self.tree.node(id)?.name.clone();
        if id == self.tree.root() {
            return Err(FsError::CyclicLink);
        }
        let (parent, name) = self.destination(dst, &src_name)?;
        if self.tree.is_ancestor_or_self(id, parent)? {
            return Err(FsError::CyclicLink);
        }
        if self.tree.find_child(parent, &name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        let suffix = self.tree.subtree_max_suffix(id)?;
        self.tree.check_fits(parent, &name, suffix)?;
        if self.tree.subtree_size(id)? > self.tree.free_slots() {
            return Err(FsError::CapacityExceeded);
        }

        let copy = self.copy_node(id, parent, &name)?;
        self.created(copy)?;
        debug!(src = %src, dst = %dst, node = ?copy, "copied entry");
        Ok(copy)
    }

    fn copy_node(&mut self, src: NodeId, parent: NodeId, name: &str) -> FsResult<NodeId> {
        let (permissions, body) = {
            let node = self.tree.node(src)?;
            (node.permissions, node.body.clone())
        };
        match body {
            NodeBody::File { content } => {
                let fresh = self.tree.contents_mut().duplicate(content)?;
                self.tree
                    .insert_child(parent, name, permissions, NodeBody::File { content: fresh })
            }
            NodeBody::Symlink { target } => {
                self.tree
                    .insert_child(parent, name, permissions, NodeBody::Symlink { target })
            }
            NodeBody::Directory { children } => {
                let dir = self.tree.insert_child(
                    parent,
                    name,
                    permissions,
                    NodeBody::Directory {
                        children: Vec::new(),
                    },
                )?;
                for child in children {
                    let child_name = self.tree.node(child)?.name.clone();
                    self.copy_node(child, dir, &child_name)?;
                }
                Ok(dir)
            }
        }
    }

    // Navigation and lookup

    /// Names of the entries in a directory, in insertion order.
    pub fn list_files(&self, path: &str) -> FsResult<Vec<String>> {
        let dir = self.tree.resolve(path, true)?;
        self.tree
            .children(dir)?
            .iter()
            .map(|&child| Ok(self.tree.node(child)?.name.clone()))
            .collect()
    }

    /// Directory entries with kind, link and size, in insertion order.
    pub fn list_entries(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let dir = self.tree.resolve(path, true)?;
        self.tree
            .children(dir)?
            .iter()
            .map(|&child| {
                let info = self.tree.info(child)?;
                Ok(DirEntry {
                    name: info.name,
                    kind: info.kind,
                    link: info.link,
                    permissions: info.permissions,
                    size: info.size,
                })
            })
            .collect()
    }

    pub fn change_directory(&mut self, path: &str) -> FsResult<()> {
        let id = self.tree.resolve(path, true)?;
        if !self.tree.node(id)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.tree.set_cwd(id);
        // The current directory is part of the persisted state
        self.mark_dirty();
        debug!(path = %path, node = ?id, "changed directory");
        Ok(())
    }

    pub fn get_current_path(&self) -> FsResult<String> {
        let path = self.tree.absolute_path(self.tree.cwd())?;
        if path.len() > self.tree.limits().max_path_length {
            return Err(FsError::PathTooLong);
        }
        Ok(path)
    }

    pub fn get_file_by_path(&self, path: &str) -> FsResult<NodeId> {
        self.tree.resolve(path, true)
    }

    /// Metadata of the node `path` names, following a final symbolic link.
    pub fn stat(&self, path: &str) -> FsResult<NodeInfo> {
        let id = self.tree.resolve(path, true)?;
        self.tree.info(id)
    }

    /// Metadata of the entry `path` names, without following a final symbolic link.
    pub fn lstat(&self, path: &str) -> FsResult<NodeInfo> {
        let id = self.tree.resolve(path, false)?;
        self.tree.info(id)
    }

    /// Absolute path of a live node.
    pub fn path_of(&self, id: NodeId) -> FsResult<String> {
        self.tree.absolute_path(id)
    }

    pub fn stats(&self) -> FsStats {
        FsStats {
            nodes: self.tree.node_count(),
            capacity: self.tree.capacity(),
            open_handles: self.handles.len(),
            content_bytes: self.tree.contents().total_bytes(),
        }
    }

    // Event subscription operations

    pub fn subscribe_events(&mut self, cb: Arc<dyn EventSink>) -> FsResult<SubscriptionId> {
        let subscription_id = SubscriptionId::new(self.next_subscription_id);
        self.next_subscription_id += 1;
        self.event_subscriptions.insert(subscription_id, cb);
        Ok(subscription_id)
    }

    pub fn unsubscribe_events(&mut self, sub: SubscriptionId) -> FsResult<()> {
        if self.event_subscriptions.remove(&sub).is_none() {
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    pub(crate) fn emit_event(&self, event: EventKind) {
        if !self.config.track_events {
            return;
        }
        for sink in self.event_subscriptions.values() {
            sink.on_event(&event);
        }
    }

    /// Release the filesystem, saving first when configured to.
    pub fn close_file_system(mut self) -> FsResult<()> {
        if !self.handles.is_empty() {
            warn!(open_handles = self.handles.len(), "closing filesystem with open handles");
            self.handles.clear();
        }
        if self.dirty && self.config.store.save_on_close {
            self.save_file_system()?;
        }
        info!(store = %self.backstore.describe(), "filesystem closed");
        Ok(())
    }
}

impl std::fmt::Debug for FsCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsCore")
            .field("store", &self.backstore.describe())
            .field("nodes", &self.tree.node_count())
            .field("open_handles", &self.handles.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
