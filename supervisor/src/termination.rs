//! Termination engine.
//!
//! Termination is a request, never a deletion: a process is first asked to
//! exit (notification `0x100`), then killed if it has not exited when the
//! drain budget runs out. Only the monitor removes records, once the kernel
//! reports the exit.
//!
//! Per-record state machine:
//!
//! ```text
//! Running --notify ok--> NotificationSent   --exit--> Terminated
//!         \-notify err-> NotificationFailed --kill--> Terminated
//! ```

use std::time::{Duration, Instant};

use crate::config::{self, EXTENSION_PID, IO_ROUTER_PID, ROLE_GRACE_PERIOD};
use crate::dependencies;
use crate::error::{KernelError, PmError, ResultCode};
use crate::notification;
use crate::platform::{Pid, ProgramHandle, TitleId};
use crate::process::{ProcessFlags, ProcessRef, TerminationStatus};
use crate::{ManagerState, Supervisor};

/// Which records a title/process termination applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationTarget {
    /// Every record with exactly this title id (built-ins share one).
    Title(TitleId),
    /// The record with this pid.
    Process(Pid),
}

/// Converts an IPC timeout. Negative means no timeout.
pub fn timeout_from_ns(timeout_ns: i64) -> Option<Duration> {
    u64::try_from(timeout_ns).ok().map(Duration::from_nanos)
}

impl Supervisor {
    // =========================================================================
    // Building blocks
    // =========================================================================

    /// Dependencies a process was launched with, read back from its
    /// descriptor.
    pub(crate) fn list_process_dependencies(
        &self,
        program: ProgramHandle,
    ) -> Result<Vec<TitleId>, PmError> {
        let mut descriptor = self.descriptors.acquire();
        self.loader().program_descriptor(program, &mut descriptor)?;
        Ok(dependencies::list_dependencies(&descriptor, self.config.is_new_model()))
    }

    /// Sends the termination request and records the outcome.
    pub(crate) fn send_termination_notification(
        &self,
        st: &mut ManagerState,
        process: ProcessRef,
    ) -> Result<(), ResultCode> {
        let record = match st.table.get_mut(process) {
            Some(record) => record,
            None => return Ok(()),
        };
        let result = self.notify_process(record.handle.raw(), notification::TERMINATION_REQUEST);
        record.termination_status = match result {
            Ok(()) => TerminationStatus::NotificationSent,
            Err(_) => TerminationStatus::NotificationFailed,
        };
        log::debug!(
            "TERMINATION_REQUESTED: pid {} -> {:?}",
            record.pid,
            record.termination_status
        );
        result
    }

    fn kill(&self, st: &ManagerState, process: ProcessRef) {
        if let Some(record) = st.table.get(process) {
            log::info!("PROCESS_KILL: pid {} ({:#018x})", record.pid, record.title_id);
            if let Err(err) = self.kernel().terminate_process(record.handle.raw()) {
                log::warn!("kernel refused to kill pid {}: {}", record.pid, err);
            }
        }
    }

    /// Drops one reference from every autoloaded, still-running record whose
    /// title is listed, and asks the ones that reach zero to exit.
    pub(crate) fn terminate_unused_dependencies(
        &self,
        st: &mut ManagerState,
        dependencies: &[TitleId],
    ) -> Result<(), PmError> {
        let mut result = Ok(());
        for process in st.table.refs() {
            let record = match st.table.get_mut(process) {
                Some(record) => record,
                None => continue,
            };
            if !record.is_running() || !record.is_autoloaded() {
                continue;
            }
            if !dependencies.contains(&record.title_id) {
                continue;
            }
            record.refcount = record.refcount.saturating_sub(1);
            if record.refcount > 0 {
                continue;
            }

            log::info!("DEPENDENCY_UNUSED: pid {} ({:#018x})", record.pid, record.title_id);
            match self.send_termination_notification(st, process) {
                Ok(()) => {}
                // Already gone: nothing left to ask.
                Err(code) if code.is_not_found() => {}
                Err(code) => {
                    self.kill(st, process);
                    result = Err(code.into());
                }
            }
        }
        result
    }

    /// Asks one record to exit and releases its dependencies. Records that
    /// were already asked (or already exited) are left alone.
    pub(crate) fn terminate_process_impl(
        &self,
        st: &mut ManagerState,
        process: ProcessRef,
    ) -> Result<(), PmError> {
        let (running, deps_loaded, program_handle) = match st.table.get(process) {
            Some(record) => (
                record.is_running(),
                record.flags.contains(ProcessFlags::DEPENDENCIES_LOADED),
                record.program_handle,
            ),
            None => return Ok(()),
        };
        if !running {
            return Ok(());
        }

        if !deps_loaded {
            let _ = self.send_termination_notification(st, process);
            return Ok(());
        }

        // Listed before the request goes out: the process may be gone
        // (and its program unregistered) right after.
        let dependencies = self.list_process_dependencies(program_handle)?;
        if let Some(record) = st.table.get_mut(process) {
            record.flags.remove(ProcessFlags::DEPENDENCIES_LOADED);
        }
        let _ = self.send_termination_notification(st, process);
        self.terminate_unused_dependencies(st, &dependencies)
    }

    /// The drain: kills every record whose request failed, waits up to
    /// `timeout` for the asked ones to exit, kills the stragglers, then
    /// waits for the monitor to confirm them. `None` waits forever.
    ///
    /// Drains run one at a time; a second caller waits for the first to end
    /// and then drains whatever is still pending.
    pub(crate) fn commit_pending_terminations(&self, timeout: Option<Duration>) {
        let _drain = self.lock_drain();
        let any_sent = {
            let mut st = self.lock_state();
            let mut any_sent = false;
            for (process, record) in st.table.iter() {
                match record.termination_status {
                    TerminationStatus::NotificationSent => any_sent = true,
                    TerminationStatus::NotificationFailed => self.kill(&st, process),
                    _ => {}
                }
            }
            if any_sent {
                if let Err(err) = self.kernel().clear_event(self.all_notified_event.raw()) {
                    log::error!("failed to clear the drain event: {}", err);
                }
                st.waiting_for_termination = true;
            }
            any_sent
        };
        if !any_sent {
            return;
        }

        log::debug!("DRAIN_BEGIN: timeout {:?}", timeout);
        self.poke_monitor();
        match self.kernel().wait_one(self.all_notified_event.raw(), timeout) {
            Ok(()) => {}
            Err(KernelError::Timeout) => {
                {
                    let st = self.lock_state();
                    for (process, record) in st.table.iter() {
                        if record.termination_status == TerminationStatus::NotificationSent {
                            self.kill(&st, process);
                        }
                    }
                }
                self.poke_monitor();
                if let Err(err) = self.kernel().wait_one(self.all_notified_event.raw(), None) {
                    log::error!("drain wait failed after forced kills: {}", err);
                }
            }
            Err(err) => log::error!("drain wait failed: {}", err),
        }

        self.lock_state().waiting_for_termination = false;
        log::debug!("DRAIN_END");
    }

    /// Makes the monitor rebuild its wait set.
    fn poke_monitor(&self) {
        if let Err(err) = self.kernel().signal_event(self.new_process_event.raw()) {
            log::error!("failed to wake the process monitor: {}", err);
        }
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Terminates the running application and waits for it. A negative
    /// timeout waits forever.
    pub fn terminate_application(&self, timeout_ns: i64) -> Result<(), PmError> {
        if self.is_preparing_for_reboot() {
            return Err(PmError::AlreadyRebooting);
        }

        {
            let mut st = self.lock_state();
            if let Some(app) = st.running_application() {
                if let Err(err) = self.terminate_process_impl(&mut st, app) {
                    log::warn!("application termination: {}", err);
                }
            }
        }
        self.commit_pending_terminations(timeout_from_ns(timeout_ns));
        Ok(())
    }

    pub fn terminate_title(&self, title_id: TitleId, timeout_ns: i64) -> Result<(), PmError> {
        self.terminate_target(TerminationTarget::Title(title_id), timeout_ns)
    }

    pub fn terminate_process(&self, pid: Pid, timeout_ns: i64) -> Result<(), PmError> {
        self.terminate_target(TerminationTarget::Process(pid), timeout_ns)
    }

    fn terminate_target(&self, target: TerminationTarget, timeout_ns: i64) -> Result<(), PmError> {
        if !self.is_preparing_for_reboot() {
            self.tasks
                .run(move |sup: &Supervisor| sup.terminate_target_task(target, timeout_ns));
            return Ok(());
        }

        // The system is going down: no grace period, no queueing.
        if timeout_ns != 0 {
            return Err(PmError::AlreadyRebooting);
        }
        let st = self.lock_state();
        for (process, record) in st.table.iter() {
            if target.matches(record.pid, record.title_id) {
                self.kill(&st, process);
                if let TerminationTarget::Process(_) = target {
                    break;
                }
            }
        }
        Ok(())
    }

    fn terminate_target_task(&self, target: TerminationTarget, timeout_ns: i64) {
        let mut died_variant = None;
        {
            let mut st = self.lock_state();
            for process in st.table.refs() {
                let record = match st.table.get_mut(process) {
                    Some(record) => record,
                    None => continue,
                };
                if !target.matches(record.pid, record.title_id) {
                    continue;
                }
                // The death is announced here, after the drain, and the
                // record is kept until the subscriber unregisters it.
                if record.flags.contains(ProcessFlags::NOTIFY_ON_TERMINATION) {
                    died_variant = Some(record.notification_variant);
                    record.flags.remove(ProcessFlags::NOTIFY_ON_TERMINATION);
                    record.flags.insert(ProcessFlags::TERMINATION_NOTIFIED_AND_DIED);
                }
                if let Err(err) = self.terminate_process_impl(&mut st, process) {
                    log::warn!("termination of {:?}: {}", target, err);
                }
                if let TerminationTarget::Process(_) = target {
                    break;
                }
            }
        }

        if let Some(timeout) = timeout_from_ns(timeout_ns) {
            self.commit_pending_terminations(Some(timeout));
            if let Some(variant) = died_variant {
                if let Err(code) = self.notify_subscribers(notification::process_died(variant)) {
                    log::warn!("death notification failed: {}", code);
                }
            }
        }
    }

    /// Brings everything down for a reboot or firmlaunch.
    ///
    /// Phase one asks every ordinary process to exit, except the caller and
    /// the caller's dependencies (which gain a reference instead), and drains
    /// within `timeout`. Phase two does the same for the extension and the
    /// I/O router, with an extra grace period. Returns the caller's record.
    ///
    /// # Panics
    ///
    /// Panics if a hard-wired role process is missing.
    pub fn terminate_all_processes(
        &self,
        caller: Option<Pid>,
        timeout: Duration,
    ) -> Option<ProcessRef> {
        let deadline = Instant::now() + timeout;
        let has_extension = self.config.has_extension_process();
        log::info!("TERMINATE_ALL: caller {:?}, budget {:?}", caller, timeout);

        let caller_process = {
            let mut st = self.lock_state();
            let caller_process = caller.and_then(|pid| st.table.find_by_pid(pid));
            let protected = match caller_process.and_then(|process| st.table.get(process)) {
                Some(record) if !record.is_kernel_builtin() => self
                    .list_process_dependencies(record.program_handle)
                    .unwrap_or_else(|err| {
                        log::warn!("could not list caller dependencies: {}", err);
                        Vec::new()
                    }),
                _ => Vec::new(),
            };

            if has_extension {
                if let Err(code) = self.notify_subscribers(notification::REBOOT_IMMINENT) {
                    log::warn!("reboot notification failed: {}", code);
                }
            }

            if let Some(app) = st.running_application() {
                if let Some(record) = st.table.get_mut(app) {
                    record.flags.remove(ProcessFlags::DEPENDENCIES_LOADED);
                }
                if st.table.get(app).map_or(false, |record| record.is_running()) {
                    let _ = self.send_termination_notification(&mut st, app);
                }
            }

            for process in st.table.refs() {
                let record = match st.table.get_mut(process) {
                    Some(record) => record,
                    None => continue,
                };
                if record.is_kernel_builtin() {
                    continue;
                }
                if Some(process) == caller_process || protected.contains(&record.title_id) {
                    record.incref(1);
                    continue;
                }
                if record.is_running() {
                    let _ = self.send_termination_notification(&mut st, process);
                }
            }
            caller_process
        };

        self.commit_pending_terminations(Some(deadline.saturating_duration_since(Instant::now())));

        {
            let mut st = self.lock_state();
            if has_extension {
                self.notify_role(&mut st, EXTENSION_PID);
            }
            self.notify_role(&mut st, IO_ROUTER_PID);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.commit_pending_terminations(Some(ROLE_GRACE_PERIOD + remaining));
        log::info!("TERMINATE_ALL: complete");

        caller_process
    }

    fn notify_role(&self, st: &mut ManagerState, pid: Pid) {
        let process = match st.table.find_by_pid(pid) {
            Some(process) => process,
            None => panic!("hard-wired process pid {} missing at shutdown", pid),
        };
        if st.table.get(process).map_or(false, |record| record.is_running()) {
            let _ = self.send_termination_notification(st, process);
        }
    }

    /// Latches the reboot state and drains the system on the task runner.
    /// The caller is told `0x179` once everything else is down.
    pub fn prepare_for_reboot(&self, caller: Pid, timeout_ns: i64) -> Result<(), PmError> {
        if self.preparing_for_reboot.swap(true, core::sync::atomic::Ordering::SeqCst) {
            return Err(PmError::AlreadyRebooting);
        }
        log::info!("REBOOT_PREPARE: requested by pid {}", caller);

        self.tasks.run(move |sup: &Supervisor| {
            let timeout = timeout_from_ns(timeout_ns).unwrap_or(Duration::ZERO);
            let caller_process = sup.terminate_all_processes(Some(caller), timeout);
            let handle = caller_process.and_then(|process| {
                let st = sup.lock_state();
                let handle = st.table.get(process).map(|record| record.handle.raw());
                handle
            });
            if let Some(handle) = handle {
                if let Err(code) = sup.notify_process(handle, notification::READY_FOR_REBOOT) {
                    log::warn!("ready-for-reboot notification failed: {}", code);
                }
            }
        });
        Ok(())
    }

    /// Releases the record of a title whose death has been announced.
    ///
    /// A terminated record is removed and its handle closed. A live record
    /// only loses its notify flags, so the monitor reclaims it normally.
    pub fn unregister_process(&self, title_id: TitleId) -> Result<(), PmError> {
        let mut st = self.lock_state();
        let process = match st.table.find_by_title(config::base_title(title_id)) {
            Some(process) => process,
            None => return Ok(()),
        };

        let terminated = st
            .table
            .get(process)
            .map_or(false, |record| record.termination_status == TerminationStatus::Terminated);
        if !terminated {
            if let Some(record) = st.table.get_mut(process) {
                record.flags.remove(ProcessFlags::NOTIFY_ON_TERMINATION);
                record.flags.remove(ProcessFlags::TERMINATION_NOTIFIED_AND_DIED);
            }
            return Ok(());
        }

        if st.running_application == Some(process) {
            st.running_application = None;
        }
        if st.queued_debug_process == Some(process) {
            st.queued_debug_process = None;
        }
        if let Some(record) = st.table.remove(process) {
            log::debug!("PROCESS_UNREGISTERED: pid {} ({:#018x})", record.pid, record.title_id);
            self.kernel().close_handle(record.handle);
        }
        Ok(())
    }
}

impl TerminationTarget {
    fn matches(self, pid: Pid, title_id: TitleId) -> bool {
        match self {
            TerminationTarget::Title(target) => title_id == target,
            TerminationTarget::Process(target) => pid == target,
        }
    }
}
