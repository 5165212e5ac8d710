// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-capacity node arena with generation-tagged slots

use crate::error::{FsError, FsResult};
use crate::types::NodeId;

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena holding every node of the tree.
///
/// Capacity is fixed at construction. Freed slots go onto a free list and
/// have their generation bumped so stale [`NodeId`]s no longer resolve.
#[derive(Clone, Debug)]
pub struct NodeStore<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl<T> NodeStore<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots still available for allocation.
    pub fn free_count(&self) -> usize {
        self.capacity - self.live
    }

    pub fn allocate(&mut self, value: T) -> FsResult<NodeId> {
        if self.live >= self.capacity {
            return Err(FsError::CapacityExceeded);
        }
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                index
            }
        };
        self.live += 1;
        Ok(NodeId::new(index, self.slots[index as usize].generation))
    }

    pub fn get(&self, id: NodeId) -> FsResult<&T> {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.value.as_ref().ok_or(FsError::NotFound)
            }
            _ => Err(FsError::NotFound),
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> FsResult<&mut T> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.value.as_mut().ok_or(FsError::NotFound)
            }
            _ => Err(FsError::NotFound),
        }
    }

    /// Release a slot, returning its value.
    pub fn free(&mut self, id: NodeId) -> FsResult<T> {
        let slot = match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.value.is_some() => slot,
            _ => return Err(FsError::NotFound),
        };
        let value = slot.value.take().ok_or(FsError::NotFound)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Ok(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (NodeId::new(index as u32, slot.generation), value))
        })
    }

    /// Generation of every slot ever allocated, in slot order.
    pub fn generations(&self) -> Vec<u32> {
        self.slots.iter().map(|slot| slot.generation).collect()
    }

    /// Rebuild an arena from persisted slot generations and live entries.
    ///
    /// Every entry must name an existing slot with a matching generation and
    /// no slot may be claimed twice.
    pub fn restore(
        capacity: usize,
        generations: &[u32],
        entries: Vec<(NodeId, T)>,
    ) -> FsResult<Self> {
        let mut slots: Vec<Slot<T>> = generations
            .iter()
            .map(|&generation| Slot {
                generation,
                value: None,
            })
            .collect();
        let mut live = 0;
        for (id, value) in entries {
            let slot = slots
                .get_mut(id.index as usize)
                .ok_or_else(|| FsError::corrupt(format!("node {} outside slot table", id)))?;
            if slot.generation != id.generation {
                return Err(FsError::corrupt(format!("node {} has stale generation", id)));
            }
            if slot.value.is_some() {
                return Err(FsError::corrupt(format!("node {} appears twice", id)));
            }
            slot.value = Some(value);
            live += 1;
        }
        if live > capacity {
            return Err(FsError::corrupt(format!(
                "{} live nodes exceed capacity {}",
                live, capacity
            )));
        }
        let free = slots
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| slot.value.is_none())
            .map(|(index, _)| index as u32)
            .collect();
        Ok(Self {
            slots,
            free,
            capacity,
            live,
        })
    }
}
