//! ## resman-core::process
//! **Fixed-capacity process table**
//!
//! Slots are addressed by index and carry an occupancy flag. A new process takes
//! the lowest vacant slot; identities are resolved by linear scan.

use crate::error::{ResourceError, Result};
use crate::types::{ProcessId, ResourceId, SimTime, SlotIndex};

/// Who lives in an occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub identity: ProcessId,
    pub start_time: SimTime,
}

/// One entry of the process table.
#[derive(Debug, Clone)]
pub struct ProcessSlot {
    occupant: Option<Occupant>,
    held: Vec<u32>,
}

impl ProcessSlot {
    fn vacant(resource_types: usize) -> Self {
        Self {
            occupant: None,
            held: vec![0; resource_types],
        }
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    #[inline]
    pub fn occupant(&self) -> Option<&Occupant> {
        self.occupant.as_ref()
    }

    /// Units held per resource type.
    pub fn held(&self) -> &[u32] {
        &self.held
    }

    #[inline]
    pub fn held_of(&self, resource: ResourceId) -> u32 {
        self.held[resource.as_usize()]
    }

    pub fn total_held(&self) -> u32 {
        self.held.iter().sum()
    }

    pub(crate) fn held_mut(&mut self, resource: ResourceId) -> &mut u32 {
        &mut self.held[resource.as_usize()]
    }
}

pub struct ProcessTable {
    slots: Vec<ProcessSlot>,
    running: usize,
}

impl ProcessTable {
    pub fn with_capacity(capacity: usize, resource_types: usize) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| ProcessSlot::vacant(resource_types))
                .collect(),
            running: 0,
        }
    }

    /// Returns the total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots.
    pub fn running(&self) -> usize {
        self.running
    }

    pub fn get(&self, slot: SlotIndex) -> Result<&ProcessSlot> {
        self.slots
            .get(slot.as_usize())
            .ok_or(ResourceError::InvalidSlot {
                slot,
                capacity: self.slots.len(),
            })
    }

    /// Occupant of `slot`, failing if the slot is out of range or vacant.
    pub fn occupant(&self, slot: SlotIndex) -> Result<Occupant> {
        self.get(slot)?
            .occupant()
            .copied()
            .ok_or(ResourceError::VacantSlot(slot))
    }

    pub(crate) fn get_mut(&mut self, slot: SlotIndex) -> Result<&mut ProcessSlot> {
        let capacity = self.slots.len();
        self.slots
            .get_mut(slot.as_usize())
            .ok_or(ResourceError::InvalidSlot { slot, capacity })
    }

    pub fn find(&self, identity: ProcessId) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|s| s.occupant.is_some_and(|o| o.identity == identity))
            .map(SlotIndex::new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &ProcessSlot)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| (SlotIndex::new(idx), slot))
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (SlotIndex, &ProcessSlot)> {
        self.iter().filter(|(_, slot)| slot.is_occupied())
    }

    /// Places a new process in the lowest vacant slot with zeroed counters.
    pub(crate) fn occupy(&mut self, identity: ProcessId, start_time: SimTime) -> Result<SlotIndex> {
        if self.find(identity).is_some() {
            return Err(ResourceError::DuplicateIdentity(identity));
        }
        let idx = self
            .slots
            .iter()
            .position(|slot| !slot.is_occupied())
            .ok_or(ResourceError::TableFull(self.running))?;

        let slot = &mut self.slots[idx];
        slot.occupant = Some(Occupant {
            identity,
            start_time,
        });
        slot.held.iter_mut().for_each(|h| *h = 0);
        self.running += 1;
        Ok(SlotIndex::new(idx))
    }

    /// Marks `slot` vacant and zeroes its held counts.
    pub(crate) fn vacate(&mut self, slot: SlotIndex) -> Result<Occupant> {
        let entry = self.get_mut(slot)?;
        let occupant = entry.occupant.take().ok_or(ResourceError::VacantSlot(slot))?;
        entry.held.iter_mut().for_each(|h| *h = 0);
        self.running -= 1;
        Ok(occupant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupy_takes_lowest_vacant_slot() {
        let mut table = ProcessTable::with_capacity(3, 2);
        assert_eq!(table.occupy(ProcessId(10), SimTime(0)), Ok(SlotIndex(0)));
        assert_eq!(table.occupy(ProcessId(11), SimTime(5)), Ok(SlotIndex(1)));
        table.vacate(SlotIndex(0)).unwrap();
        assert_eq!(table.occupy(ProcessId(12), SimTime(9)), Ok(SlotIndex(0)));
        assert_eq!(table.running(), 2);
        assert_eq!(table.find(ProcessId(11)), Some(SlotIndex(1)));
        assert_eq!(table.find(ProcessId(10)), None);
    }

    #[test]
    fn full_table_is_an_error() {
        let mut table = ProcessTable::with_capacity(1, 1);
        table.occupy(ProcessId(1), SimTime(0)).unwrap();
        assert_eq!(
            table.occupy(ProcessId(2), SimTime(0)),
            Err(ResourceError::TableFull(1))
        );
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut table = ProcessTable::with_capacity(2, 1);
        table.occupy(ProcessId(1), SimTime(0)).unwrap();
        assert_eq!(
            table.occupy(ProcessId(1), SimTime(0)),
            Err(ResourceError::DuplicateIdentity(ProcessId(1)))
        );
    }

    #[test]
    fn vacate_twice_fails() {
        let mut table = ProcessTable::with_capacity(2, 1);
        let slot = table.occupy(ProcessId(1), SimTime(0)).unwrap();
        *table.get_mut(slot).unwrap().held_mut(ResourceId(0)) = 3;
        table.vacate(slot).unwrap();
        assert_eq!(table.get(slot).unwrap().total_held(), 0);
        assert_eq!(table.vacate(slot), Err(ResourceError::VacantSlot(slot)));
        assert_eq!(
            table.occupant(SlotIndex(7)),
            Err(ResourceError::InvalidSlot {
                slot: SlotIndex(7),
                capacity: 2
            })
        );
    }
}
