//! Flattened dependency closure used while loading and unloading titles.
//!
//! A [`DependencySet`] is the de-duplicated working set built while walking a
//! title's dependency graph breadth first. Entries that already have a live
//! record are refcounted immediately; entries still to be launched accumulate
//! the references owed to them until they come up.

use crate::config::{self, MAX_DEPENDENCIES};
use crate::platform::{Descriptor, TitleId};
use crate::process::{ProcessRef, ProcessTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEntry {
    pub title_id: TitleId,
    /// Live record serving this dependency, once known.
    pub process: Option<ProcessRef>,
    /// References owed to the entry before its process exists.
    pub pending_refs: u32,
    /// Set once a launch was attempted (or skipped) for the entry.
    pub resolved: bool,
}

#[derive(Debug, Default)]
pub struct DependencySet {
    entries: Vec<DependencyEntry>,
}

impl DependencySet {
    pub fn new() -> Self {
        DependencySet {
            entries: Vec::with_capacity(MAX_DEPENDENCIES),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DependencyEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&DependencyEntry> {
        self.entries.get(index)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut DependencyEntry> {
        self.entries.get_mut(index)
    }

    /// Merges a listed dependency set into the closure.
    ///
    /// New titles are appended and bound to an existing record when one is
    /// found. Each listing adds one reference: bound entries are increfed on
    /// their record (autoloaded records only), unbound ones accumulate it in
    /// `pending_refs`.
    ///
    /// # Panics
    ///
    /// Panics if the closure would exceed [`MAX_DEPENDENCIES`] titles.
    pub fn merge(&mut self, table: &mut ProcessTable, listed: &[TitleId]) {
        let mut new_refs = [0u32; MAX_DEPENDENCIES];

        for &title_id in listed {
            match self.entries.iter().position(|e| e.title_id == title_id) {
                Some(index) => new_refs[index] += 1,
                None => {
                    if self.entries.len() >= MAX_DEPENDENCIES {
                        panic!(
                            "dependency closure exceeds {} titles while adding {:#018x}",
                            MAX_DEPENDENCIES, title_id
                        );
                    }
                    new_refs[self.entries.len()] = 1;
                    self.entries.push(DependencyEntry {
                        title_id,
                        process: table.find_by_title(title_id),
                        pending_refs: 0,
                        resolved: false,
                    });
                }
            }
        }

        for (entry, &refs) in self.entries.iter_mut().zip(new_refs.iter()) {
            if refs == 0 {
                continue;
            }
            match entry.process.and_then(|process| table.get_mut(process)) {
                Some(record) => record.incref(refs),
                None => entry.pending_refs += refs,
            }
        }
    }
}

/// Lists a descriptor's dependencies for this hardware revision.
///
/// The list ends at the first zero entry or after [`MAX_DEPENDENCIES`]
/// entries. Titles reserved for the newer revision are dropped on the older
/// one, and the revision bits are stripped from the rest.
pub fn list_dependencies(descriptor: &Descriptor, new_model: bool) -> Vec<TitleId> {
    descriptor
        .dependencies
        .iter()
        .take(MAX_DEPENDENCIES)
        .take_while(|&&title_id| title_id != 0)
        .filter(|&&title_id| new_model || title_id & config::NEW_MODEL_TITLE_MASK == 0)
        .map(|&title_id| config::base_title(title_id))
        .collect()
}
