//! In-process simulation of the kernel and the collaborator services.
//!
//! [`SimPlatform`] implements every platform trait over one mutex-protected
//! state and a condition variable, so the real supervisor threads can run
//! against it: waits block until the simulated objects are signaled, and
//! simulated processes exit when asked (or not, per [`ExitBehavior`]).
//!
//! Everything observable is appended to an ordered [`SimEvent`] log.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::FIRMLAUNCH_PARAMS_SIZE;
use crate::error::{KernelError, ResultCode};
use crate::notification;
use crate::platform::{
    Descriptor, FsRegistrar, Kernel, KernelHandle, Loader, Pid, Platform, ProgramHandle,
    ProgramInfo, RawHandle, ResetType, ResourceKind, SchedulingMode, ServiceBroker, ServiceName,
    StartupInfo, StorageInfo, SystemInfo, TitleId,
};

mod title;

pub use title::{ExitBehavior, SimTitle};

/// Loader answer for a title that is not installed.
pub const TITLE_NOT_FOUND: ResultCode = ResultCode::from_raw(0xC880_4478);
/// Loader answer for a title marked as failing to load.
pub const LOAD_FAILED: ResultCode = ResultCode::from_raw(0xD900_4A0A);
/// Broker answer when the target process is gone.
pub const SESSION_CLOSED: ResultCode = ResultCode::from_raw(0xD880_07FA);

const FIRST_USER_PID: Pid = 0x20;
const DEBUG_LOG_LINES: usize = 4096;

/// Observable platform activity, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Registered { program: ProgramInfo },
    Loaded { pid: Pid, title_id: TitleId },
    Started { pid: Pid },
    DebugAttached { pid: Pid },
    Notified { pid: Pid, notification: u32 },
    Broadcast { notification: u32 },
    Killed { pid: Pid },
    Exited { pid: Pid },
    ProgramUnregistered { title_id: TitleId },
    Firmlaunch { title_id: TitleId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimProcessState {
    Created,
    Running,
    Exited,
}

#[derive(Debug)]
struct SimProcess {
    title_id: TitleId,
    state: SimProcessState,
    exit: ExitBehavior,
    resource_limits: Option<RawHandle>,
}

enum Object {
    Event { signaled: bool, reset: ResetType },
    Process(Pid),
    ResourceLimit([i64; 10]),
    Debug(Pid),
}

struct SimState {
    info: SystemInfo,
    next_handle: u32,
    objects: HashMap<u32, Object>,
    processes: BTreeMap<Pid, SimProcess>,
    next_pid: Pid,
    titles: HashMap<TitleId, SimTitle>,
    programs: HashMap<u64, ProgramInfo>,
    next_program: u64,
    fs_registrations: HashSet<Pid>,
    broker_registrations: HashMap<Pid, Vec<ServiceName>>,
    scheduling_mode: Option<SchedulingMode>,
    firmlaunch_params: [u8; FIRMLAUNCH_PARAMS_SIZE],
    events: Vec<SimEvent>,
    debug_log: Vec<String>,
}

impl SimState {
    fn alloc(&mut self, object: Object) -> KernelHandle {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(raw, object);
        KernelHandle::from_raw(RawHandle(raw))
    }

    fn process_of(&self, handle: RawHandle) -> Result<Pid, KernelError> {
        match self.objects.get(&handle.0) {
            Some(Object::Process(pid)) => Ok(*pid),
            _ => Err(KernelError::InvalidHandle),
        }
    }

    fn exit_process(&mut self, pid: Pid) {
        if let Some(process) = self.processes.get_mut(&pid) {
            if process.state != SimProcessState::Exited {
                process.state = SimProcessState::Exited;
                self.events.push(SimEvent::Exited { pid });
            }
        }
    }

    /// Whether a wait on `handle` is satisfied now. Consumes one-shot events.
    fn poll(&mut self, handle: RawHandle) -> bool {
        match self.objects.get_mut(&handle.0) {
            Some(Object::Event { signaled, reset }) => {
                let fired = *signaled;
                if fired && *reset == ResetType::OneShot {
                    *signaled = false;
                }
                fired
            }
            Some(Object::Process(pid)) => self
                .processes
                .get(pid)
                .map_or(false, |process| process.state == SimProcessState::Exited),
            _ => false,
        }
    }
}

/// Simulated kernel, loader, filesystem registrar and service broker.
pub struct SimPlatform {
    state: Mutex<SimState>,
    changed: Condvar,
}

impl SimPlatform {
    pub fn new(info: SystemInfo) -> Arc<Self> {
        let mut processes = BTreeMap::new();
        for pid in 0..info.kip_count {
            processes.insert(
                pid,
                SimProcess {
                    title_id: crate::config::KIP_TITLE_ID,
                    state: SimProcessState::Running,
                    exit: ExitBehavior::OnRequest,
                    resource_limits: None,
                },
            );
        }

        Arc::new(SimPlatform {
            state: Mutex::new(SimState {
                info,
                next_handle: 0x100,
                objects: HashMap::new(),
                processes,
                next_pid: FIRST_USER_PID,
                titles: HashMap::new(),
                programs: HashMap::new(),
                next_program: 1,
                fs_registrations: HashSet::new(),
                broker_registrations: HashMap::new(),
                scheduling_mode: None,
                firmlaunch_params: [0; FIRMLAUNCH_PARAMS_SIZE],
                events: Vec::new(),
                debug_log: Vec::new(),
            }),
            changed: Condvar::new(),
        })
    }

    /// Older hardware revision: 64 MiB application region, five built-ins.
    pub fn old_model() -> Arc<Self> {
        Self::new(SystemInfo {
            app_memory_type: 0,
            memory_regions: [0x0400_0000, 0x02C0_0000, 0x0140_0000],
            kip_count: 5,
            has_kernel_extension: false,
            stolen_system_memory: 0,
            core_version: 2,
            autolaunch_title: 0,
        })
    }

    /// Newer hardware revision in its native memory mode, with the kernel
    /// extension process (pid 5) running.
    pub fn new_model() -> Arc<Self> {
        Self::new(SystemInfo {
            app_memory_type: 6,
            memory_regions: [0x07C0_0000, 0x0640_0000, 0x0200_0000],
            kip_count: 6,
            has_kernel_extension: true,
            stolen_system_memory: 0,
            core_version: 2,
            autolaunch_title: 0,
        })
    }

    /// Bundles this simulation as the supervisor's platform.
    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            kernel: Arc::clone(self) as Arc<dyn Kernel>,
            loader: Arc::clone(self) as Arc<dyn Loader>,
            fs: Arc::clone(self) as Arc<dyn FsRegistrar>,
            broker: Arc::clone(self) as Arc<dyn ServiceBroker>,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let result = f(&mut self.lock());
        self.changed.notify_all();
        result
    }

    // -------------------------------------------------------------------------
    // Scenario setup
    // -------------------------------------------------------------------------

    pub fn install(&self, title: SimTitle) {
        self.update(|st| {
            st.titles.insert(title.title_id(), title);
        });
    }

    pub fn set_autolaunch_title(&self, title_id: TitleId) {
        self.lock().info.autolaunch_title = title_id;
    }

    /// Makes a process exit on its own.
    pub fn exit(&self, pid: Pid) {
        self.update(|st| st.exit_process(pid));
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn notifications_to(&self, pid: Pid) -> Vec<u32> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match *event {
                SimEvent::Notified { pid: target, notification } if target == pid => {
                    Some(notification)
                }
                _ => None,
            })
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<u32> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match *event {
                SimEvent::Broadcast { notification } => Some(notification),
                _ => None,
            })
            .collect()
    }

    /// How many processes were loaded for `title_id`.
    pub fn load_count(&self, title_id: TitleId) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::Loaded { title_id: t, .. } if *t == title_id))
            .count()
    }

    pub fn pid_of(&self, title_id: TitleId) -> Option<Pid> {
        self.lock()
            .processes
            .iter()
            .rev()
            .find(|(_, process)| process.title_id == title_id)
            .map(|(&pid, _)| pid)
    }

    pub fn process_state(&self, pid: Pid) -> Option<SimProcessState> {
        self.lock().processes.get(&pid).map(|process| process.state)
    }

    pub fn was_killed(&self, pid: Pid) -> bool {
        self.lock().events.contains(&SimEvent::Killed { pid })
    }

    pub fn is_fs_registered(&self, pid: Pid) -> bool {
        self.lock().fs_registrations.contains(&pid)
    }

    pub fn broker_services(&self, pid: Pid) -> Option<Vec<ServiceName>> {
        self.lock().broker_registrations.get(&pid).cloned()
    }

    pub fn registered_programs(&self) -> usize {
        self.lock().programs.len()
    }

    pub fn is_handle_open(&self, handle: RawHandle) -> bool {
        self.lock().objects.contains_key(&handle.0)
    }

    pub fn scheduling_mode(&self) -> Option<SchedulingMode> {
        self.lock().scheduling_mode
    }

    /// Current value of one kind in the resource limit a process was given.
    pub fn process_limit(&self, pid: Pid, kind: ResourceKind) -> Option<i64> {
        let st = self.lock();
        let limits = st.processes.get(&pid)?.resource_limits?;
        match st.objects.get(&limits.0) {
            Some(Object::ResourceLimit(values)) => Some(values[kind.index()]),
            _ => None,
        }
    }

    pub fn debug_log(&self) -> Vec<String> {
        self.lock().debug_log.clone()
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

impl Kernel for SimPlatform {
    fn system_info(&self) -> SystemInfo {
        self.lock().info.clone()
    }

    fn create_event(&self, reset: ResetType) -> Result<KernelHandle, KernelError> {
        Ok(self.lock().alloc(Object::Event {
            signaled: false,
            reset,
        }))
    }

    fn signal_event(&self, event: RawHandle) -> Result<(), KernelError> {
        self.update(|st| match st.objects.get_mut(&event.0) {
            Some(Object::Event { signaled, .. }) => {
                *signaled = true;
                Ok(())
            }
            _ => Err(KernelError::InvalidHandle),
        })
    }

    fn clear_event(&self, event: RawHandle) -> Result<(), KernelError> {
        match self.lock().objects.get_mut(&event.0) {
            Some(Object::Event { signaled, .. }) => {
                *signaled = false;
                Ok(())
            }
            _ => Err(KernelError::InvalidHandle),
        }
    }

    fn wait_any(
        &self,
        handles: &[RawHandle],
        timeout: Option<Duration>,
    ) -> Result<usize, KernelError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut st = self.lock();
        loop {
            if let Some(index) = handles.iter().position(|&handle| st.poll(handle)) {
                return Ok(index);
            }
            st = match deadline {
                None => self.changed.wait(st).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(KernelError::Timeout);
                    }
                    self.changed
                        .wait_timeout(st, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
            };
        }
    }

    fn open_process(&self, pid: Pid) -> Result<KernelHandle, KernelError> {
        let mut st = self.lock();
        if !st.processes.contains_key(&pid) {
            return Err(KernelError::NotFound);
        }
        Ok(st.alloc(Object::Process(pid)))
    }

    fn process_id(&self, process: RawHandle) -> Result<Pid, KernelError> {
        self.lock().process_of(process)
    }

    fn run_process(&self, process: RawHandle, _startup: StartupInfo) -> Result<(), KernelError> {
        self.update(|st| {
            let pid = st.process_of(process)?;
            match st.processes.get_mut(&pid) {
                Some(p) if p.state == SimProcessState::Created => {
                    p.state = SimProcessState::Running;
                    st.events.push(SimEvent::Started { pid });
                    Ok(())
                }
                _ => Err(KernelError::InvalidHandle),
            }
        })
    }

    fn terminate_process(&self, process: RawHandle) -> Result<(), KernelError> {
        self.update(|st| {
            let pid = st.process_of(process)?;
            st.events.push(SimEvent::Killed { pid });
            st.exit_process(pid);
            Ok(())
        })
    }

    fn set_process_resource_limits(
        &self,
        process: RawHandle,
        limits: RawHandle,
    ) -> Result<(), KernelError> {
        let mut st = self.lock();
        let pid = st.process_of(process)?;
        if let Some(p) = st.processes.get_mut(&pid) {
            p.resource_limits = Some(limits);
        }
        Ok(())
    }

    fn set_process_affinity_mask(
        &self,
        process: RawHandle,
        _mask: u8,
        _core_count: u32,
    ) -> Result<(), KernelError> {
        self.lock().process_of(process).map(|_| ())
    }

    fn set_process_ideal_processor(
        &self,
        process: RawHandle,
        _core: i32,
    ) -> Result<(), KernelError> {
        self.lock().process_of(process).map(|_| ())
    }

    fn debug_active_process(&self, pid: Pid) -> Result<KernelHandle, KernelError> {
        let mut st = self.lock();
        if !st.processes.contains_key(&pid) {
            return Err(KernelError::NotFound);
        }
        st.events.push(SimEvent::DebugAttached { pid });
        Ok(st.alloc(Object::Debug(pid)))
    }

    fn create_resource_limit(&self) -> Result<KernelHandle, KernelError> {
        Ok(self.lock().alloc(Object::ResourceLimit([0; 10])))
    }

    fn set_resource_limit_values(
        &self,
        limits: RawHandle,
        values: &[(ResourceKind, i64)],
    ) -> Result<(), KernelError> {
        match self.lock().objects.get_mut(&limits.0) {
            Some(Object::ResourceLimit(current)) => {
                for &(kind, value) in values {
                    current[kind.index()] = value;
                }
                Ok(())
            }
            _ => Err(KernelError::InvalidHandle),
        }
    }

    fn resource_limit_value(
        &self,
        limits: RawHandle,
        kind: ResourceKind,
    ) -> Result<i64, KernelError> {
        match self.lock().objects.get(&limits.0) {
            Some(Object::ResourceLimit(values)) => Ok(values[kind.index()]),
            _ => Err(KernelError::InvalidHandle),
        }
    }

    fn set_core1_scheduling_mode(&self, mode: SchedulingMode) -> Result<(), KernelError> {
        self.lock().scheduling_mode = Some(mode);
        Ok(())
    }

    fn read_firmlaunch_params(&self, out: &mut [u8; FIRMLAUNCH_PARAMS_SIZE]) {
        out.copy_from_slice(&self.lock().firmlaunch_params);
    }

    fn write_firmlaunch_params(&self, params: &[u8; FIRMLAUNCH_PARAMS_SIZE]) {
        self.lock().firmlaunch_params.copy_from_slice(params);
    }

    fn firmlaunch(&self, firm_title: TitleId) -> Result<(), KernelError> {
        self.update(|st| st.events.push(SimEvent::Firmlaunch { title_id: firm_title }));
        Ok(())
    }

    fn close_handle(&self, handle: KernelHandle) {
        self.lock().objects.remove(&handle.raw().0);
    }

    fn output_debug_string(&self, line: &str) {
        let mut st = self.lock();
        if st.debug_log.len() < DEBUG_LOG_LINES {
            st.debug_log.push(line.to_string());
        }
    }
}

impl Loader for SimPlatform {
    fn register_program(
        &self,
        program: ProgramInfo,
        _update: ProgramInfo,
    ) -> Result<ProgramHandle, ResultCode> {
        let mut st = self.lock();
        if !st.titles.contains_key(&program.program_id) {
            return Err(TITLE_NOT_FOUND);
        }
        let handle = st.next_program;
        st.next_program += 1;
        st.programs.insert(handle, program);
        st.events.push(SimEvent::Registered { program });
        Ok(ProgramHandle(handle))
    }

    fn unregister_program(&self, program: ProgramHandle) -> Result<(), ResultCode> {
        let mut st = self.lock();
        match st.programs.remove(&program.0) {
            Some(info) => {
                st.events.push(SimEvent::ProgramUnregistered {
                    title_id: info.program_id,
                });
                Ok(())
            }
            None => Err(TITLE_NOT_FOUND),
        }
    }

    fn load_process(&self, program: ProgramHandle) -> Result<KernelHandle, ResultCode> {
        self.update(|st| {
            let info = *st.programs.get(&program.0).ok_or(TITLE_NOT_FOUND)?;
            let title = st.titles.get(&info.program_id).ok_or(TITLE_NOT_FOUND)?;
            if title.fails_to_load {
                return Err(LOAD_FAILED);
            }
            let title_id = title.descriptor.title_id;
            let exit = title.exit;

            let pid = st.next_pid;
            st.next_pid += 1;
            st.processes.insert(
                pid,
                SimProcess {
                    title_id,
                    state: SimProcessState::Created,
                    exit,
                    resource_limits: None,
                },
            );
            st.events.push(SimEvent::Loaded { pid, title_id });
            Ok(st.alloc(Object::Process(pid)))
        })
    }

    fn program_descriptor(
        &self,
        program: ProgramHandle,
        out: &mut Descriptor,
    ) -> Result<(), ResultCode> {
        let st = self.lock();
        let info = st.programs.get(&program.0).ok_or(TITLE_NOT_FOUND)?;
        let title = st.titles.get(&info.program_id).ok_or(TITLE_NOT_FOUND)?;

        out.clone_from(&title.descriptor);
        out.core.core_version = title.core_version.unwrap_or(st.info.core_version);
        Ok(())
    }
}

impl FsRegistrar for SimPlatform {
    fn register(
        &self,
        pid: Pid,
        _program: ProgramHandle,
        _info: ProgramInfo,
        _storage: &StorageInfo,
    ) -> Result<(), ResultCode> {
        self.lock().fs_registrations.insert(pid);
        Ok(())
    }

    fn unregister(&self, pid: Pid) -> Result<(), ResultCode> {
        self.lock().fs_registrations.remove(&pid);
        Ok(())
    }
}

impl ServiceBroker for SimPlatform {
    fn register_process(&self, pid: Pid, services: &[ServiceName]) -> Result<(), ResultCode> {
        self.lock().broker_registrations.insert(pid, services.to_vec());
        Ok(())
    }

    fn unregister_process(&self, pid: Pid) -> Result<(), ResultCode> {
        self.lock().broker_registrations.remove(&pid);
        Ok(())
    }

    fn publish_to_process(
        &self,
        notification: u32,
        process: RawHandle,
    ) -> Result<(), ResultCode> {
        self.update(|st| {
            let pid = st.process_of(process).map_err(KernelError::result_code)?;
            let (state, exit) = match st.processes.get(&pid) {
                Some(p) => (p.state, p.exit),
                None => return Err(SESSION_CLOSED),
            };
            if state == SimProcessState::Exited {
                return Err(SESSION_CLOSED);
            }
            st.events.push(SimEvent::Notified { pid, notification });

            let cooperative = state == SimProcessState::Running && exit == ExitBehavior::OnRequest;
            if notification == notification::TERMINATION_REQUEST && cooperative {
                st.exit_process(pid);
            }
            Ok(())
        })
    }

    fn publish_to_subscribers(&self, notification: u32) -> Result<(), ResultCode> {
        self.update(|st| st.events.push(SimEvent::Broadcast { notification }));
        Ok(())
    }
}
