//! Notification ids published through the service broker.

use crate::error::ResultCode;
use crate::platform::RawHandle;
use crate::Supervisor;

/// Asks a process to exit on its own.
pub const TERMINATION_REQUEST: u32 = 0x100;

/// A normal application started running.
pub const APPLICATION_LAUNCHED: u32 = 0x10C;

/// Base of the "process died" range; the record's variant is added.
pub const PROCESS_DIED_BASE: u32 = 0x110;

/// Sent to the caller of `prepare_for_reboot` once everything has drained.
pub const READY_FOR_REBOOT: u32 = 0x179;

/// An application was launched with the debug latch set but not queued.
pub const LAUNCHED_WITHOUT_DEBUG: u32 = 0x1000;

/// Sent to subscribers before a full shutdown when the extension is present.
pub const REBOOT_IMMINENT: u32 = 0x2000;

pub fn process_died(variant: u8) -> u32 {
    PROCESS_DIED_BASE + u32::from(variant)
}

/// Turns the broker's "queue full" answer into a panic. Any other failure is
/// handed back to the caller.
fn check_queue(result: Result<(), ResultCode>, notification: u32) -> Result<(), ResultCode> {
    match result {
        Err(code) if code == ResultCode::NOTIFICATION_QUEUE_FULL => {
            panic!("notification queue full while publishing {:#x}", notification)
        }
        other => other,
    }
}

impl Supervisor {
    pub(crate) fn notify_subscribers(&self, notification: u32) -> Result<(), ResultCode> {
        log::debug!("NOTIFY_ALL: {:#x}", notification);
        check_queue(self.broker().publish_to_subscribers(notification), notification)
    }

    pub(crate) fn notify_process(
        &self,
        process: RawHandle,
        notification: u32,
    ) -> Result<(), ResultCode> {
        log::trace!("NOTIFY: {:#x} -> {}", notification, process);
        check_queue(self.broker().publish_to_process(notification, process), notification)
    }
}
