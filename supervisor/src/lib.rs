//! Process supervisor for a capability-based microkernel.
//!
//! The supervisor launches programs with their dependency closures, tracks
//! every process it started (plus the kernel built-ins), reclaims them when
//! they exit, and drives cooperative termination up to a full system
//! shutdown.
//!
//! # Threads
//!
//! - the caller's thread, serving IPC through [`Supervisor::handle_app_command`]
//!   and [`Supervisor::handle_debug_command`]
//! - the task runner worker (`pm-tasks`), running long operations one at a time
//! - the process monitor (`pm-monitor`), the only thread that reclaims exited
//!   processes on its own
//!
//! All of them share one [`Supervisor`] and serialise on its state lock.
//! The state lock blocks rather than spins: it is held across loader, fs and
//! broker calls while a process is being built.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod dependencies;
pub mod descriptor_pool;
pub mod error;
pub mod firmlaunch;
pub mod info;
pub mod launch;
pub mod logger;
pub mod monitor;
pub mod notification;
pub mod platform;
pub mod policy;
pub mod process;
pub mod reslimit;
pub mod service;
pub mod task_runner;
pub mod termination;

#[cfg(any(test, feature = "testing"))]
pub mod sim;

pub use error::{KernelError, PmError, ResultCode};
pub use launch::LaunchFlags;
pub use platform::Platform;

use config::{
    PlatformConfig, DESCRIPTOR_POOL_SIZE, EXTENSION_PID, EXTENSION_TITLE_ID, FULL_FS_ACCESS,
    KIP_PROGRAM_HANDLE, KIP_RESLIMIT_PID_BOUND, KIP_TITLE_ID, PROCESS_TABLE_CAPACITY,
    SUPERVISOR_PID, SUPERVISOR_TITLE_ID,
};
use descriptor_pool::DescriptorPool;
use platform::{
    FsRegistrar, Kernel, KernelHandle, Loader, MediaType, Pid, ProgramHandle, ProgramInfo,
    ResetType, ServiceBroker, StorageInfo, TitleId,
};
use process::{ProcessFlags, ProcessRecord, ProcessRef, ProcessTable, TerminationStatus};
use reslimit::{ReslimitCategory, ResourceLimits};
use task_runner::TaskRunner;

/// Everything guarded by the supervisor lock.
pub struct ManagerState {
    pub(crate) table: ProcessTable,
    /// Weak: the record may already be gone, check with
    /// [`ManagerState::running_application`].
    pub(crate) running_application: Option<ProcessRef>,
    /// Weak: the process parked for a debugger.
    pub(crate) queued_debug_process: Option<ProcessRef>,
    /// A termination drain is waiting on the all-notified event.
    pub(crate) waiting_for_termination: bool,
    /// Ceiling for the application's core-1 time grants.
    pub(crate) max_app_cpu_time: u8,
    /// Offset added to runtime core-1 grants of five and above.
    pub(crate) cpu_time_base: i64,
    /// One-shot latch: queue the next application for debugging.
    pub(crate) debug_next_application: bool,
    pub(crate) current_app_mem_limit: u32,
    pub(crate) default_app_mem_limit: u32,
}

impl ManagerState {
    fn new(config: &PlatformConfig) -> Self {
        let app_memory = config.memory_regions[0];
        ManagerState {
            table: ProcessTable::with_capacity(PROCESS_TABLE_CAPACITY),
            running_application: None,
            queued_debug_process: None,
            waiting_for_termination: false,
            max_app_cpu_time: 0,
            cpu_time_base: 0,
            debug_next_application: false,
            current_app_mem_limit: app_memory,
            default_app_mem_limit: app_memory,
        }
    }

    /// The running application, if its record still exists.
    pub(crate) fn running_application(&self) -> Option<ProcessRef> {
        self.running_application
            .filter(|&process| self.table.contains(process))
    }

    /// The process parked for a debugger, if its record still exists.
    pub(crate) fn queued_debug_process(&self) -> Option<ProcessRef> {
        self.queued_debug_process
            .filter(|&process| self.table.contains(process))
    }
}

/// The process manager.
pub struct Supervisor {
    platform: Platform,
    config: PlatformConfig,
    state: Mutex<ManagerState>,
    /// Held for the whole of a termination drain. Drains share the
    /// all-notified event, so only one may wait on it at a time.
    drain: Mutex<()>,
    reslimits: ResourceLimits,
    /// Wakes the monitor so it rebuilds its wait set.
    new_process_event: KernelHandle,
    /// Signaled by the monitor once no drained process is left.
    all_notified_event: KernelHandle,
    preparing_for_reboot: AtomicBool,
    descriptors: DescriptorPool,
    tasks: TaskRunner<Supervisor>,
}

impl Supervisor {
    /// Brings the supervisor up: reads the platform configuration, creates
    /// the resource limits, adopts the kernel built-ins, starts the worker
    /// and monitor threads and launches the configured first sysmodule.
    pub fn boot(platform: Platform) -> Result<Arc<Supervisor>, PmError> {
        logger::attach_sink(Arc::clone(&platform.kernel));
        let kernel = platform.kernel.as_ref();

        let config = PlatformConfig::from_system_info(&kernel.system_info());
        log::info!(
            "PM_BOOT: {:?} revision, {} built-ins, core version {}",
            config.revision,
            config.kip_count,
            config.core_version
        );

        let new_process_event = kernel.create_event(ResetType::OneShot)?;
        let all_notified_event = kernel.create_event(ResetType::OneShot)?;
        let reslimits = ResourceLimits::initialize(kernel, &config)?;

        let mut state = ManagerState::new(&config);
        register_builtins(kernel, &config, &reslimits, &mut state.table)?;
        grant_full_fs_access(platform.fs.as_ref(), SUPERVISOR_PID, SUPERVISOR_TITLE_ID)?;
        if config.has_extension_process() {
            grant_full_fs_access(platform.fs.as_ref(), EXTENSION_PID, EXTENSION_TITLE_ID)?;
        }

        let supervisor = Arc::new(Supervisor {
            platform,
            config,
            state: Mutex::new(state),
            drain: Mutex::new(()),
            reslimits,
            new_process_event,
            all_notified_event,
            preparing_for_reboot: AtomicBool::new(false),
            descriptors: DescriptorPool::new(DESCRIPTOR_POOL_SIZE),
            tasks: TaskRunner::new("pm-tasks"),
        });

        supervisor.tasks.spawn_worker(Arc::clone(&supervisor))?;
        monitor::spawn(Arc::clone(&supervisor))?;

        supervisor.autolaunch_sysmodules()?;
        log::info!("PM_READY");
        Ok(supervisor)
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn is_preparing_for_reboot(&self) -> bool {
        self.preparing_for_reboot.load(Ordering::SeqCst)
    }

    /// Waits for every task queued so far. Must not be called from a task.
    pub fn flush_tasks(&self) {
        self.tasks.flush();
    }

    /// Locks the supervisor state. A panic on any supervisor thread aborts
    /// the process, so a poisoned lock only shows up in tests.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_drain(&self) -> MutexGuard<'_, ()> {
        self.drain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn kernel(&self) -> &dyn Kernel {
        self.platform.kernel.as_ref()
    }

    pub(crate) fn loader(&self) -> &dyn Loader {
        self.platform.loader.as_ref()
    }

    pub(crate) fn fs(&self) -> &dyn FsRegistrar {
        self.platform.fs.as_ref()
    }

    pub(crate) fn broker(&self) -> &dyn ServiceBroker {
        self.platform.broker.as_ref()
    }
}

/// Adopts the processes the kernel started before the supervisor existed.
fn register_builtins(
    kernel: &dyn Kernel,
    config: &PlatformConfig,
    reslimits: &ResourceLimits,
    table: &mut ProcessTable,
) -> Result<(), PmError> {
    for pid in 0..config.kip_count {
        let handle = kernel.open_process(pid)?;
        if pid < KIP_RESLIMIT_PID_BOUND {
            kernel.set_process_resource_limits(
                handle.raw(),
                reslimits.handle(ReslimitCategory::Other),
            )?;
        }
        table.insert(ProcessRecord {
            pid,
            title_id: KIP_TITLE_ID,
            media_type: MediaType::Nand,
            program_handle: ProgramHandle(0),
            handle,
            flags: ProcessFlags::IS_KERNEL_BUILTIN,
            launch_flags: LaunchFlags::empty(),
            termination_status: TerminationStatus::Running,
            refcount: 1,
            notification_variant: 0,
        });
        log::debug!("KIP_REGISTERED: pid {}", pid);
    }
    Ok(())
}

fn grant_full_fs_access(fs: &dyn FsRegistrar, pid: Pid, title_id: TitleId) -> Result<(), PmError> {
    let storage = StorageInfo {
        fs_access_info: FULL_FS_ACCESS,
        ..StorageInfo::default()
    };
    fs.register(
        pid,
        ProgramHandle(KIP_PROGRAM_HANDLE),
        ProgramInfo::nand(title_id),
        &storage,
    )?;
    Ok(())
}
