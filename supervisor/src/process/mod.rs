//! Process records and the table that owns them.
//!
//! A record is created by the launch engine when a program handle becomes a
//! live kernel process, mutated by the termination engine and the process
//! monitor, and removed only by the monitor once kernel-level exit has been
//! observed.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign};

use crate::launch::LaunchFlags;
use crate::platform::{KernelHandle, MediaType, Pid, ProgramHandle, TitleId};

pub mod table;

pub use table::{ProcessRef, ProcessTable};

/// Per-record flag word.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessFlags(u32);

impl ProcessFlags {
    pub const NOTIFY_ON_TERMINATION: ProcessFlags = ProcessFlags(1 << 0);
    pub const IS_KERNEL_BUILTIN: ProcessFlags = ProcessFlags(1 << 1);
    pub const DEPENDENCIES_LOADED: ProcessFlags = ProcessFlags(1 << 2);
    pub const AUTOLOADED: ProcessFlags = ProcessFlags(1 << 3);
    pub const TERMINATION_NOTIFIED_AND_DIED: ProcessFlags = ProcessFlags(1 << 4);
    pub const IS_NORMAL_APPLICATION: ProcessFlags = ProcessFlags(1 << 5);

    pub const fn empty() -> Self {
        ProcessFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: ProcessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ProcessFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ProcessFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for ProcessFlags {
    type Output = ProcessFlags;

    fn bitor(self, rhs: ProcessFlags) -> ProcessFlags {
        ProcessFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProcessFlags {
    fn bitor_assign(&mut self, rhs: ProcessFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ProcessFlags {
    type Output = ProcessFlags;

    fn bitand(self, rhs: ProcessFlags) -> ProcessFlags {
        ProcessFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for ProcessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ProcessFlags, &str); 6] = [
            (ProcessFlags::NOTIFY_ON_TERMINATION, "NOTIFY"),
            (ProcessFlags::IS_KERNEL_BUILTIN, "KIP"),
            (ProcessFlags::DEPENDENCIES_LOADED, "DEPS_LOADED"),
            (ProcessFlags::AUTOLOADED, "AUTOLOADED"),
            (ProcessFlags::TERMINATION_NOTIFIED_AND_DIED, "NOTIFIED_AND_DIED"),
            (ProcessFlags::IS_NORMAL_APPLICATION, "APPLICATION"),
        ];
        let mut first = true;
        write!(f, "ProcessFlags(")?;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

/// Progress of a record through termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    Running,
    /// Termination request delivered; waiting for the process to exit
    NotificationSent,
    /// Termination request could not be delivered; will be killed
    NotificationFailed,
    /// Kernel-level exit observed by the monitor
    Terminated,
}

/// One supervised process.
#[derive(Debug)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub title_id: TitleId,
    pub media_type: MediaType,
    pub program_handle: ProgramHandle,
    /// Owned kernel process handle; closed by whoever removes the record.
    pub handle: KernelHandle,
    pub flags: ProcessFlags,
    pub launch_flags: LaunchFlags,
    pub termination_status: TerminationStatus,
    /// Dependents still using this process. Only meaningful when AUTOLOADED.
    pub refcount: u8,
    /// Offset added to the "process died" notification id.
    pub notification_variant: u8,
}

impl ProcessRecord {
    pub fn is_kernel_builtin(&self) -> bool {
        self.flags.contains(ProcessFlags::IS_KERNEL_BUILTIN)
    }

    pub fn is_autoloaded(&self) -> bool {
        self.flags.contains(ProcessFlags::AUTOLOADED)
    }

    pub fn is_running(&self) -> bool {
        self.termination_status == TerminationStatus::Running
    }

    /// Adds `amount` dependents. Manually launched processes are never
    /// refcounted.
    ///
    /// # Panics
    ///
    /// Panics if the count would exceed 255.
    pub fn incref(&mut self, amount: u32) {
        if !self.is_autoloaded() {
            return;
        }
        let total = u32::from(self.refcount) + amount;
        if total > u32::from(u8::MAX) {
            panic!(
                "refcount overflow on pid {} ({:#018x}): {}",
                self.pid, self.title_id, total
            );
        }
        self.refcount = total as u8;
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            title_id: self.title_id,
            flags: self.flags,
            termination_status: self.termination_status,
            refcount: self.refcount,
        }
    }
}

/// Read-only snapshot of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub title_id: TitleId,
    pub flags: ProcessFlags,
    pub termination_status: TerminationStatus,
    pub refcount: u8,
}

impl ProcessInfo {
    pub fn is_autoloaded(&self) -> bool {
        self.flags.contains(ProcessFlags::AUTOLOADED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RawHandle;

    fn record(flags: ProcessFlags) -> ProcessRecord {
        ProcessRecord {
            pid: 0x20,
            title_id: 0x0004_0130_0000_1702,
            media_type: MediaType::Nand,
            program_handle: ProgramHandle(1),
            handle: KernelHandle::from_raw(RawHandle(0x40)),
            flags,
            launch_flags: LaunchFlags::empty(),
            termination_status: TerminationStatus::Running,
            refcount: 1,
            notification_variant: 0,
        }
    }

    #[test]
    fn incref_ignores_manual_launches() {
        let mut manual = record(ProcessFlags::empty());
        manual.incref(5);
        assert_eq!(manual.refcount, 1);

        let mut auto = record(ProcessFlags::AUTOLOADED);
        auto.incref(5);
        assert_eq!(auto.refcount, 6);
    }

    #[test]
    #[should_panic(expected = "refcount overflow")]
    fn incref_past_255_is_fatal() {
        let mut auto = record(ProcessFlags::AUTOLOADED);
        auto.incref(255);
    }

    #[test]
    fn flag_debug_lists_names() {
        let flags = ProcessFlags::AUTOLOADED | ProcessFlags::DEPENDENCIES_LOADED;
        assert_eq!(format!("{:?}", flags), "ProcessFlags(DEPS_LOADED | AUTOLOADED)");
        assert!(flags.contains(ProcessFlags::AUTOLOADED));
        assert!(!flags.contains(ProcessFlags::IS_KERNEL_BUILTIN));
    }
}
