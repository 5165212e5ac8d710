// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Refcounted content storage shared by hard-linked entries

use std::collections::BTreeMap;

use crate::error::{FsError, FsResult};
use crate::types::ContentId;

#[derive(Clone, Debug)]
pub(crate) struct ContentEntry {
    pub(crate) data: Vec<u8>,
    pub(crate) refcount: usize,
}

/// In-memory content store.
///
/// Every file entry holds one reference to a [`ContentId`]. Content is
/// dropped when its last reference goes away. Ids are never reused.
#[derive(Clone, Debug)]
pub struct ContentStore {
    next_id: u64,
    entries: BTreeMap<ContentId, ContentEntry>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    fn get_next_id(&mut self) -> ContentId {
        let id = ContentId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn allocate(&mut self, initial: &[u8]) -> ContentId {
        let id = self.get_next_id();
        self.entries.insert(
            id,
            ContentEntry {
                data: initial.to_vec(),
                refcount: 1,
            },
        );
        id
    }

    /// Allocate a fresh, independent copy of `base`.
    pub fn duplicate(&mut self, base: ContentId) -> FsResult<ContentId> {
        let data = self.entries.get(&base).ok_or(FsError::NotFound)?.data.clone();
        Ok(self.allocate(&data))
    }

    pub fn increment_refcount(&mut self, id: ContentId) -> FsResult<()> {
        let entry = self.entries.get_mut(&id).ok_or(FsError::NotFound)?;
        entry.refcount += 1;
        Ok(())
    }

    /// Drop one reference. Returns `true` when the content was released.
    pub fn decrement_refcount(&mut self, id: ContentId) -> bool {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                self.entries.remove(&id);
                return true;
            }
        }
        false
    }

    pub fn refcount(&self, id: ContentId) -> usize {
        self.entries.get(&id).map(|e| e.refcount).unwrap_or(0)
    }

    pub fn contains(&self, id: ContentId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn data(&self, id: ContentId) -> FsResult<&[u8]> {
        self.entries
            .get(&id)
            .map(|e| e.data.as_slice())
            .ok_or(FsError::NotFound)
    }

    pub fn len_of(&self, id: ContentId) -> u64 {
        self.entries.get(&id).map(|e| e.data.len() as u64).unwrap_or(0)
    }

    pub fn read(&self, id: ContentId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let content = self.data(id)?;

        let start = match usize::try_from(offset) {
            Ok(start) if start < content.len() => start,
            _ => return Ok(0),
        };

        let end = std::cmp::min(start.saturating_add(buf.len()), content.len());
        let bytes_to_copy = end - start;
        buf[..bytes_to_copy].copy_from_slice(&content[start..end]);
        Ok(bytes_to_copy)
    }

    /// Replace the whole content.
    pub fn replace(&mut self, id: ContentId, data: &[u8]) -> FsResult<()> {
        let entry = self.entries.get_mut(&id).ok_or(FsError::NotFound)?;
        entry.data.clear();
        entry.data.extend_from_slice(data);
        Ok(())
    }

    pub fn append(&mut self, id: ContentId, data: &[u8]) -> FsResult<()> {
        let entry = self.entries.get_mut(&id).ok_or(FsError::NotFound)?;
        entry.data.extend_from_slice(data);
        Ok(())
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.data.len() as u64).sum()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ContentId, &ContentEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Rebuild a store from persisted entries.
    pub(crate) fn restore(
        next_id: u64,
        entries: impl IntoIterator<Item = (ContentId, ContentEntry)>,
    ) -> FsResult<Self> {
        let mut map = BTreeMap::new();
        for (id, entry) in entries {
            if id.0 == 0 || id.0 >= next_id {
                return Err(FsError::corrupt(format!("content id {} out of range", id.0)));
            }
            if entry.refcount == 0 {
                return Err(FsError::corrupt(format!("content {} has no references", id.0)));
            }
            if map.insert(id, entry).is_some() {
                return Err(FsError::corrupt(format!("content {} appears twice", id.0)));
            }
        }
        Ok(Self {
            next_id,
            entries: map,
        })
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}
