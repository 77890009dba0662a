//! Process monitor.
//!
//! A dedicated thread waits on the "new process" event plus the handle of
//! every live record. Any signaled process handle is a kernel-level exit:
//! the monitor marks the record terminated, releases what it held, and
//! drops it unless its death still has to be acknowledged.
//!
//! The monitor also completes drains: while a termination commit is waiting
//! and no record is left in `NotificationSent`, it signals the
//! all-notified event.
//!
//! The monitor never returns. A panic on it aborts the process.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crate::error::PmError;
use crate::notification;
use crate::platform::RawHandle;
use crate::process::{ProcessFlags, ProcessRecord, ProcessRef, TerminationStatus};
use crate::{ManagerState, Supervisor};

/// Starts the monitor thread. It runs for the life of the supervisor.
pub fn spawn(supervisor: Arc<Supervisor>) -> Result<(), PmError> {
    thread::Builder::new()
        .name("pm-monitor".into())
        .spawn(move || {
            if panic::catch_unwind(AssertUnwindSafe(|| run(&supervisor))).is_err() {
                log::error!("process monitor panicked, aborting");
                std::process::abort();
            }
        })
        .map_err(|err| {
            log::error!("failed to spawn the process monitor: {}", err);
            PmError::ThreadSpawn
        })?;
    log::info!("MONITOR_SPAWN: process monitor started");
    Ok(())
}

fn run(sup: &Supervisor) {
    loop {
        let (handles, refs) = wait_set(sup);

        let index = match sup.kernel().wait_any(&handles, None) {
            Ok(index) => index,
            Err(err) => {
                log::error!("monitor wait failed: {}", err);
                continue;
            }
        };
        // Index 0 is the new-process event: the set is rebuilt.
        if index == 0 {
            continue;
        }
        if let Some(&process) = refs.get(index - 1) {
            reap(sup, process);
        }
    }
}

/// Builds the handles to wait on. Also completes a pending drain.
fn wait_set(sup: &Supervisor) -> (Vec<RawHandle>, Vec<ProcessRef>) {
    let st = sup.lock_state();

    let mut handles = vec![sup.new_process_event.raw()];
    let mut refs = Vec::new();
    let mut any_sent = false;
    for (process, record) in st.table.iter() {
        match record.termination_status {
            TerminationStatus::Terminated => continue,
            TerminationStatus::NotificationSent => any_sent = true,
            _ => {}
        }
        handles.push(record.handle.raw());
        refs.push(process);
    }

    if st.waiting_for_termination && !any_sent {
        if let Err(err) = sup.kernel().signal_event(sup.all_notified_event.raw()) {
            log::error!("failed to signal the drain event: {}", err);
        }
    }
    (handles, refs)
}

/// Cleanup for one observed exit.
fn reap(sup: &Supervisor, process: ProcessRef) {
    let (removed, snapshot) = {
        let mut st = sup.lock_state();
        match mark_terminated(sup, &mut st, process) {
            Some(outcome) => outcome,
            None => return,
        }
    };

    if !snapshot.is_kernel_builtin {
        if let Err(code) = sup.broker().unregister_process(snapshot.pid) {
            log::warn!("broker unregister of pid {}: {}", snapshot.pid, code);
        }
        if let Err(code) = sup.fs().unregister(snapshot.pid) {
            log::warn!("fs unregister of pid {}: {}", snapshot.pid, code);
        }
        sup.unregister_program_quietly(snapshot.program_handle);
    }

    if let Some(variant) = snapshot.died_variant {
        if let Err(code) = sup.notify_subscribers(notification::process_died(variant)) {
            log::warn!("death notification for pid {}: {}", snapshot.pid, code);
        }
    }

    log::info!(
        "PROCESS_EXITED: pid {} ({:#018x}){}",
        snapshot.pid,
        snapshot.title_id,
        if removed.is_some() { "" } else { ", kept for acknowledgement" }
    );
    if let Some(record) = removed {
        sup.kernel().close_handle(record.handle);
    }
}

struct ExitSnapshot {
    pid: crate::platform::Pid,
    title_id: crate::platform::TitleId,
    program_handle: crate::platform::ProgramHandle,
    is_kernel_builtin: bool,
    died_variant: Option<u8>,
}

fn mark_terminated(
    sup: &Supervisor,
    st: &mut ManagerState,
    process: ProcessRef,
) -> Option<(Option<ProcessRecord>, ExitSnapshot)> {
    let record = st.table.get_mut(process)?;
    if record.termination_status == TerminationStatus::Terminated {
        return None;
    }
    record.termination_status = TerminationStatus::Terminated;

    let notify = record.flags.contains(ProcessFlags::NOTIFY_ON_TERMINATION);
    if notify {
        record.flags.insert(ProcessFlags::TERMINATION_NOTIFIED_AND_DIED);
    }
    let deps_loaded = record.flags.contains(ProcessFlags::DEPENDENCIES_LOADED);
    let snapshot = ExitSnapshot {
        pid: record.pid,
        title_id: record.title_id,
        program_handle: record.program_handle,
        is_kernel_builtin: record.is_kernel_builtin(),
        died_variant: if notify { Some(record.notification_variant) } else { None },
    };

    if st.running_application == Some(process) {
        st.running_application = None;
        if sup.config.manages_app_memory() {
            if let Err(err) = sup.reset_app_mem_limit(st) {
                log::error!("failed to restore the application memory limit: {}", err);
            }
        }
    }
    if st.queued_debug_process == Some(process) {
        st.queued_debug_process = None;
    }

    if deps_loaded {
        if let Some(record) = st.table.get_mut(process) {
            record.flags.remove(ProcessFlags::DEPENDENCIES_LOADED);
        }
        match sup.list_process_dependencies(snapshot.program_handle) {
            Ok(dependencies) => {
                if let Err(err) = sup.terminate_unused_dependencies(st, &dependencies) {
                    log::warn!("releasing dependencies of pid {}: {}", snapshot.pid, err);
                }
            }
            Err(err) => log::warn!("dependencies of pid {} unknown: {}", snapshot.pid, err),
        }
    }

    let keep = st
        .table
        .get(process)
        .map_or(false, |record| record.flags.contains(ProcessFlags::TERMINATION_NOTIFIED_AND_DIED));
    let removed = if keep { None } else { st.table.remove(process) };
    Some((removed, snapshot))
}
