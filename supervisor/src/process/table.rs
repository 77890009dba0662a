//! Fixed-capacity arena of process records.
//!
//! Slots are recycled through a free-index stack. Every slot carries a
//! generation counter that is bumped on removal, so a [`ProcessRef`] taken
//! before a record was reclaimed can never reach the slot's next occupant.
//! Iteration follows insertion order.

use super::ProcessRecord;
use crate::platform::{Pid, RawHandle, TitleId};

/// Generation-checked reference to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessRef {
    index: u16,
    generation: u32,
}

struct Slot {
    generation: u32,
    record: Option<ProcessRecord>,
}

pub struct ProcessTable {
    slots: Vec<Slot>,
    free: Vec<u16>,
    /// In-use slot indices, oldest first.
    order: Vec<u16>,
}

impl ProcessTable {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity <= usize::from(u16::MAX), "process table too large");
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                record: None,
            })
            .collect();
        // Reversed so that the lowest index is handed out first.
        let free = (0..capacity as u16).rev().collect();
        ProcessTable {
            slots,
            free,
            order: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts a record and returns its reference.
    ///
    /// # Panics
    ///
    /// Panics when every slot is in use.
    pub fn insert(&mut self, record: ProcessRecord) -> ProcessRef {
        let index = match self.free.pop() {
            Some(index) => index,
            None => panic!(
                "process table full ({} slots) while inserting pid {}",
                self.capacity(),
                record.pid
            ),
        };
        let slot = &mut self.slots[usize::from(index)];
        slot.record = Some(record);
        self.order.push(index);
        ProcessRef {
            index,
            generation: slot.generation,
        }
    }

    /// Removes a record, returning it so the caller can close its handle.
    pub fn remove(&mut self, process: ProcessRef) -> Option<ProcessRecord> {
        let slot = self.slots.get_mut(usize::from(process.index))?;
        if slot.generation != process.generation {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.order.retain(|&i| i != process.index);
        self.free.push(process.index);
        Some(record)
    }

    pub fn get(&self, process: ProcessRef) -> Option<&ProcessRecord> {
        let slot = self.slots.get(usize::from(process.index))?;
        if slot.generation != process.generation {
            return None;
        }
        slot.record.as_ref()
    }

    pub fn get_mut(&mut self, process: ProcessRef) -> Option<&mut ProcessRecord> {
        let slot = self.slots.get_mut(usize::from(process.index))?;
        if slot.generation != process.generation {
            return None;
        }
        slot.record.as_mut()
    }

    pub fn contains(&self, process: ProcessRef) -> bool {
        self.get(process).is_some()
    }

    /// References to every record, oldest first. Taken as a snapshot so the
    /// caller may mutate records while walking it.
    pub fn refs(&self) -> Vec<ProcessRef> {
        self.order
            .iter()
            .map(|&index| ProcessRef {
                index,
                generation: self.slots[usize::from(index)].generation,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcessRef, &ProcessRecord)> + '_ {
        self.order.iter().filter_map(move |&index| {
            let slot = &self.slots[usize::from(index)];
            slot.record.as_ref().map(|record| {
                (
                    ProcessRef {
                        index,
                        generation: slot.generation,
                    },
                    record,
                )
            })
        })
    }

    /// Mutable walk in insertion order.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(ProcessRef, &mut ProcessRecord),
    {
        for &index in &self.order {
            let slot = &mut self.slots[usize::from(index)];
            let generation = slot.generation;
            if let Some(record) = slot.record.as_mut() {
                f(ProcessRef { index, generation }, record);
            }
        }
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<ProcessRef> {
        self.find(|record| record.pid == pid)
    }

    pub fn find_by_handle(&self, handle: RawHandle) -> Option<ProcessRef> {
        self.find(|record| record.handle.raw() == handle)
    }

    /// Title lookup ignores the low byte (the title's variant).
    pub fn find_by_title(&self, title_id: TitleId) -> Option<ProcessRef> {
        self.find(|record| record.title_id & !0xFF == title_id & !0xFF)
    }

    fn find<P>(&self, predicate: P) -> Option<ProcessRef>
    where
        P: Fn(&ProcessRecord) -> bool,
    {
        self.iter()
            .find(|&(_, record)| predicate(record))
            .map(|(process, _)| process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::LaunchFlags;
    use crate::platform::{KernelHandle, MediaType, ProgramHandle};
    use crate::process::{ProcessFlags, TerminationStatus};

    fn record(pid: Pid, title_id: TitleId) -> ProcessRecord {
        ProcessRecord {
            pid,
            title_id,
            media_type: MediaType::Nand,
            program_handle: ProgramHandle(u64::from(pid)),
            handle: KernelHandle::from_raw(RawHandle(0x100 + pid)),
            flags: ProcessFlags::empty(),
            launch_flags: LaunchFlags::empty(),
            termination_status: TerminationStatus::Running,
            refcount: 1,
            notification_variant: 0,
        }
    }

    #[test]
    fn stale_refs_do_not_reach_new_occupant() {
        let mut table = ProcessTable::with_capacity(4);
        let first = table.insert(record(0x10, 0x1000));
        assert!(table.remove(first).is_some());

        let second = table.insert(record(0x11, 0x2000));
        assert!(table.get(first).is_none());
        assert!(table.remove(first).is_none());
        assert_eq!(table.get(second).map(|r| r.pid), Some(0x11));
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut table = ProcessTable::with_capacity(4);
        let a = table.insert(record(1, 0x1000));
        table.insert(record(2, 0x2000));
        table.insert(record(3, 0x3000));
        table.remove(a);
        table.insert(record(4, 0x4000));

        let pids: Vec<Pid> = table.iter().map(|(_, r)| r.pid).collect();
        assert_eq!(pids, vec![2, 3, 4]);
        assert_eq!(table.refs().len(), 3);
    }

    #[test]
    fn lookups() {
        let mut table = ProcessTable::with_capacity(4);
        let a = table.insert(record(7, 0x0004_0130_0000_1702));
        assert_eq!(table.find_by_pid(7), Some(a));
        assert_eq!(table.find_by_handle(RawHandle(0x107)), Some(a));
        // Low byte of the title is ignored.
        assert_eq!(table.find_by_title(0x0004_0130_0000_17FF), Some(a));
        assert_eq!(table.find_by_title(0x0004_0130_0000_1802), None);
        assert_eq!(table.find_by_pid(8), None);
    }

    #[test]
    fn for_each_mut_touches_every_record() {
        let mut table = ProcessTable::with_capacity(4);
        table.insert(record(1, 0x1000));
        table.insert(record(2, 0x2000));
        table.for_each_mut(|_, r| r.refcount += 1);
        assert!(table.iter().all(|(_, r)| r.refcount == 2));
    }

    #[test]
    #[should_panic(expected = "process table full")]
    fn overflow_is_fatal() {
        let mut table = ProcessTable::with_capacity(2);
        table.insert(record(1, 0x1000));
        table.insert(record(2, 0x2000));
        table.insert(record(3, 0x3000));
    }
}
