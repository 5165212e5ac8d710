// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File handles: open/read/write/close gated by node permissions

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::tree::NodeBody;
use crate::vfs::FsCore;
use crate::{ContentId, EventKind, HandleId, OpenMode};

/// Open file state. The mode is captured at open time.
#[derive(Clone, Debug)]
pub(crate) struct Handle {
    pub(crate) content: ContentId,
    pub(crate) mode: OpenMode,
    pub(crate) path: String,
}

impl FsCore {
    /// Open the file at `path`, following a final symbolic link.
    pub fn open_file(&mut self, path: &str, mode: OpenMode) -> FsResult<HandleId> {
        let id = self.tree.resolve(path, true)?;
        let node = self.tree.node(id)?;
        let content = match node.body {
            NodeBody::File { content } => content,
            _ => return Err(FsError::IsADirectory),
        };
        if !node.permissions.permits(mode) {
            return Err(FsError::PermissionDenied);
        }
        if self.handles.len() >= self.config.limits.max_open_handles {
            return Err(FsError::TooManyOpenFiles);
        }

        let handle_id = HandleId::new(self.next_handle_id);
        self.next_handle_id += 1;
        let abs = self.tree.absolute_path(id)?;
        debug!(path = %abs, handle = handle_id.0, ?mode, "opened file");
        self.handles.insert(
            handle_id,
            Handle {
                content,
                mode,
                path: abs,
            },
        );
        Ok(handle_id)
    }

    fn handle(&self, handle_id: HandleId) -> FsResult<&Handle> {
        self.handles.get(&handle_id).ok_or(FsError::InvalidHandle)
    }

    /// Whole content of the file behind the handle.
    pub fn read_file(&self, handle_id: HandleId) -> FsResult<Vec<u8>> {
        let handle = self.handle(handle_id)?;
        if !handle.mode.can_read() {
            return Err(FsError::PermissionDenied);
        }
        Ok(self.tree.contents().data(handle.content)?.to_vec())
    }

    /// Up to `len` bytes starting at `offset`; empty past end of file.
    pub fn read_at(&self, handle_id: HandleId, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let handle = self.handle(handle_id)?;
        if !handle.mode.can_read() {
            return Err(FsError::PermissionDenied);
        }
        // Never allocate past the end of the content, whatever `len` asks for
        let remaining = self.tree.contents().len_of(handle.content).saturating_sub(offset);
        let len = len.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let mut buf = vec![0u8; len];
        let n = self.tree.contents().read(handle.content, offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Replace the file's content. Every hard link to the file sees the change.
    pub fn write_file(&mut self, handle_id: HandleId, data: &[u8]) -> FsResult<()> {
        let (content, path) = self.writable(handle_id)?;
        self.tree.contents_mut().replace(content, data)?;
        self.written(path, data.len());
        Ok(())
    }

    pub fn append_file(&mut self, handle_id: HandleId, data: &[u8]) -> FsResult<()> {
        let (content, path) = self.writable(handle_id)?;
        self.tree.contents_mut().append(content, data)?;
        self.written(path, data.len());
        Ok(())
    }

    fn writable(&self, handle_id: HandleId) -> FsResult<(ContentId, String)> {
        let handle = self.handle(handle_id)?;
        if !handle.mode.can_write() {
            return Err(FsError::PermissionDenied);
        }
        Ok((handle.content, handle.path.clone()))
    }

    fn written(&mut self, path: String, len: usize) {
        self.mark_dirty();
        debug!(path = %path, bytes = len, "wrote file");
        self.emit_event(EventKind::Modified { path });
    }

    pub fn close_file(&mut self, handle_id: HandleId) -> FsResult<()> {
        self.handles
            .remove(&handle_id)
            .map(|_| ())
            .ok_or(FsError::InvalidHandle)
    }

    /// Overwrite the permissions of the node `path` names.
    ///
    /// Hard links share one set of permissions, so every entry of the file
    /// changes. Already-open handles keep the mode they were opened with.
    pub fn set_permissions(&mut self, path: &str, permissions: crate::Permissions) -> FsResult<()> {
        let id = self.tree.resolve(path, true)?;
        let targets = match self.tree.node(id)?.body {
            NodeBody::File { content } => self.tree.aliases_of(content),
            _ => vec![id],
        };
        for target in targets {
            self.tree.node_mut(target)?.permissions = permissions;
        }
        self.mark_dirty();
        let abs = self.tree.absolute_path(id)?;
        debug!(path = %abs, ?permissions, "set permissions");
        self.emit_event(EventKind::Modified { path: abs });
        Ok(())
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}
