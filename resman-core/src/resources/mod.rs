//! ## resman-core::resources
//! **Resource table: per-type capacity, per-slot allocation and FIFO wait queues**
//!
//! Every counter is unsigned and only changes through the methods below, which
//! keep `available + sum(allocation) == total` for each type. The held-count
//! mirror in the process table is maintained by `SimulationState`, which is the
//! only caller of the mutating methods.

use std::collections::VecDeque;

use crate::error::{ResourceError, Result};
use crate::types::{ResourceId, SlotIndex};

/// One catalogue entry with a fixed number of anonymous instances.
#[derive(Debug, Clone)]
pub struct ResourceType {
    total: u32,
    available: u32,
    allocation: Vec<u32>,
    pending: Vec<u32>,
    wait_queue: VecDeque<SlotIndex>,
}

impl ResourceType {
    /// Creates a fully available resource type for a table of `slots` processes.
    pub fn new(total: u32, slots: usize) -> Self {
        Self {
            total,
            available: total,
            allocation: vec![0; slots],
            pending: vec![0; slots],
            wait_queue: VecDeque::new(),
        }
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[inline]
    pub fn available(&self) -> u32 {
        self.available
    }

    #[inline]
    pub fn allocation(&self, slot: SlotIndex) -> u32 {
        self.allocation[slot.as_usize()]
    }

    pub fn allocations(&self) -> &[u32] {
        &self.allocation
    }

    /// Outstanding requested units for `slot`.
    #[inline]
    pub fn pending(&self, slot: SlotIndex) -> u32 {
        self.pending[slot.as_usize()]
    }

    pub fn pending_requests(&self) -> &[u32] {
        &self.pending
    }

    /// Waiters in grant order.
    pub fn waiters(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.wait_queue.iter().copied()
    }

    pub fn queue_len(&self) -> usize {
        self.wait_queue.len()
    }

    /// Moves one unit from `available` to `slot`. Returns `false` when exhausted.
    pub(crate) fn try_take(&mut self, slot: SlotIndex) -> bool {
        if self.available == 0 {
            return false;
        }
        self.available -= 1;
        self.allocation[slot.as_usize()] += 1;
        true
    }

    /// Returns one unit held by `slot`. The caller has checked the held count.
    pub(crate) fn give_back(&mut self, slot: SlotIndex) {
        let held = &mut self.allocation[slot.as_usize()];
        debug_assert!(*held > 0, "give_back on empty allocation");
        *held = held.saturating_sub(1);
        self.available += 1;
    }

    /// Records one unit of unmet demand for `slot`.
    pub(crate) fn enqueue(&mut self, slot: SlotIndex) {
        self.pending[slot.as_usize()] += 1;
        self.wait_queue.push_back(slot);
    }

    /// Grants one unit to the front waiter if an instance is free.
    pub(crate) fn serve_next(&mut self) -> Option<SlotIndex> {
        if self.available == 0 {
            return None;
        }
        let waiter = self.wait_queue.pop_front()?;
        let idx = waiter.as_usize();
        self.available -= 1;
        self.allocation[idx] += 1;
        debug_assert!(self.pending[idx] > 0, "queued waiter without pending request");
        self.pending[idx] = self.pending[idx].saturating_sub(1);
        Some(waiter)
    }

    /// Drops all demand of `slot` and returns everything it holds to `available`.
    ///
    /// Returns the number of reclaimed units. Queue order of other waiters is kept.
    pub(crate) fn purge(&mut self, slot: SlotIndex) -> u32 {
        let idx = slot.as_usize();
        let units = std::mem::take(&mut self.allocation[idx]);
        self.available += units;
        self.pending[idx] = 0;
        self.wait_queue.retain(|&waiter| waiter != slot);
        units
    }
}

/// The fixed catalogue of resource types.
#[derive(Debug, Clone)]
pub struct ResourceTable {
    kinds: Vec<ResourceType>,
}

impl ResourceTable {
    /// Creates `count` resource types with `instances` units each.
    pub fn new(count: usize, instances: u32, slots: usize) -> Self {
        Self {
            kinds: (0..count)
                .map(|_| ResourceType::new(instances, slots))
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn check(&self, resource: ResourceId) -> Result<()> {
        if resource.as_usize() < self.kinds.len() {
            Ok(())
        } else {
            Err(ResourceError::InvalidResource {
                resource,
                count: self.kinds.len(),
            })
        }
    }

    pub fn get(&self, resource: ResourceId) -> Result<&ResourceType> {
        self.check(resource)?;
        Ok(&self.kinds[resource.as_usize()])
    }

    pub(crate) fn get_mut(&mut self, resource: ResourceId) -> Result<&mut ResourceType> {
        self.check(resource)?;
        Ok(&mut self.kinds[resource.as_usize()])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &ResourceType)> {
        self.kinds
            .iter()
            .enumerate()
            .map(|(idx, kind)| (ResourceId::new(idx), kind))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ResourceId, &mut ResourceType)> {
        self.kinds
            .iter_mut()
            .enumerate()
            .map(|(idx, kind)| (ResourceId::new(idx), kind))
    }

    /// Copy of every type's `available` count, in catalogue order.
    pub fn available_vector(&self) -> Vec<u32> {
        self.kinds.iter().map(ResourceType::available).collect()
    }
}
