//! Interfaces the supervisor consumes from the rest of the system.
//!
//! The kernel and the three collaborator services (program loader,
//! filesystem registrar, service broker) are reached only through the traits
//! below. A real deployment binds them to IPC sessions; tests bind them to
//! [`crate::sim::SimPlatform`].

use std::sync::Arc;
use std::time::Duration;

use crate::config::FIRMLAUNCH_PARAMS_SIZE;
use crate::error::{KernelError, ResultCode};

mod types;

pub use types::*;

/// Kernel primitives.
pub trait Kernel: Send + Sync {
    fn system_info(&self) -> SystemInfo;

    fn create_event(&self, reset: ResetType) -> Result<KernelHandle, KernelError>;
    fn signal_event(&self, event: RawHandle) -> Result<(), KernelError>;
    fn clear_event(&self, event: RawHandle) -> Result<(), KernelError>;

    /// Blocks until one of `handles` is signaled and returns its index.
    /// When several are signaled the lowest index wins. `None` waits forever.
    fn wait_any(&self, handles: &[RawHandle], timeout: Option<Duration>)
        -> Result<usize, KernelError>;

    fn wait_one(&self, handle: RawHandle, timeout: Option<Duration>) -> Result<(), KernelError> {
        self.wait_any(&[handle], timeout).map(|_| ())
    }

    fn open_process(&self, pid: Pid) -> Result<KernelHandle, KernelError>;
    fn process_id(&self, process: RawHandle) -> Result<Pid, KernelError>;
    fn run_process(&self, process: RawHandle, startup: StartupInfo) -> Result<(), KernelError>;
    fn terminate_process(&self, process: RawHandle) -> Result<(), KernelError>;
    fn set_process_resource_limits(
        &self,
        process: RawHandle,
        limits: RawHandle,
    ) -> Result<(), KernelError>;
    fn set_process_affinity_mask(
        &self,
        process: RawHandle,
        mask: u8,
        core_count: u32,
    ) -> Result<(), KernelError>;
    fn set_process_ideal_processor(&self, process: RawHandle, core: i32)
        -> Result<(), KernelError>;
    fn debug_active_process(&self, pid: Pid) -> Result<KernelHandle, KernelError>;

    fn create_resource_limit(&self) -> Result<KernelHandle, KernelError>;
    fn set_resource_limit_values(
        &self,
        limits: RawHandle,
        values: &[(ResourceKind, i64)],
    ) -> Result<(), KernelError>;
    fn resource_limit_value(&self, limits: RawHandle, kind: ResourceKind)
        -> Result<i64, KernelError>;

    fn set_core1_scheduling_mode(&self, mode: SchedulingMode) -> Result<(), KernelError>;

    /// Firmlaunch parameter block, preserved across a warm reboot.
    fn read_firmlaunch_params(&self, out: &mut [u8; FIRMLAUNCH_PARAMS_SIZE]);
    fn write_firmlaunch_params(&self, params: &[u8; FIRMLAUNCH_PARAMS_SIZE]);
    /// Reboots into the given firmware title. Does not return on hardware.
    fn firmlaunch(&self, firm_title: TitleId) -> Result<(), KernelError>;

    fn close_handle(&self, handle: KernelHandle);

    /// Debug output channel used as the log sink.
    fn output_debug_string(&self, line: &str);
}

/// Program loader service.
pub trait Loader: Send + Sync {
    fn register_program(
        &self,
        program: ProgramInfo,
        update: ProgramInfo,
    ) -> Result<ProgramHandle, ResultCode>;
    fn unregister_program(&self, program: ProgramHandle) -> Result<(), ResultCode>;
    /// Creates the kernel process object without starting it.
    fn load_process(&self, program: ProgramHandle) -> Result<KernelHandle, ResultCode>;
    fn program_descriptor(
        &self,
        program: ProgramHandle,
        out: &mut Descriptor,
    ) -> Result<(), ResultCode>;
}

/// Filesystem permission registrar.
pub trait FsRegistrar: Send + Sync {
    fn register(
        &self,
        pid: Pid,
        program: ProgramHandle,
        info: ProgramInfo,
        storage: &StorageInfo,
    ) -> Result<(), ResultCode>;
    fn unregister(&self, pid: Pid) -> Result<(), ResultCode>;
}

/// Service-name broker.
pub trait ServiceBroker: Send + Sync {
    fn register_process(&self, pid: Pid, services: &[ServiceName]) -> Result<(), ResultCode>;
    fn unregister_process(&self, pid: Pid) -> Result<(), ResultCode>;
    /// Queues a notification for one process.
    fn publish_to_process(&self, notification: u32, process: RawHandle)
        -> Result<(), ResultCode>;
    /// Queues a notification for every subscriber.
    fn publish_to_subscribers(&self, notification: u32) -> Result<(), ResultCode>;
}

/// Bundle of the collaborators the supervisor is booted with.
#[derive(Clone)]
pub struct Platform {
    pub kernel: Arc<dyn Kernel>,
    pub loader: Arc<dyn Loader>,
    pub fs: Arc<dyn FsRegistrar>,
    pub broker: Arc<dyn ServiceBroker>,
}
