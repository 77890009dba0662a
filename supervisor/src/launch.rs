//! Launch engine.
//!
//! Turns a program into a running, supervised process:
//!
//! 1. policy checks and flag normalisation
//! 2. loader registration (with the newer revision's title id remap)
//! 3. descriptor fetch and core version check
//! 4. process creation, recorded in the table before anything else can fail
//! 5. broker, filesystem, resource limit and affinity setup
//! 6. the flattened dependency closure, launched breadth first
//! 7. start, or park in the debug slot
//!
//! Any failure after step 4 terminates the new process; the monitor then
//! reclaims its record. Dependencies that were already started stay up.

use core::ops::BitOr;

use crate::config::MAX_SERVICE_ACCESS;
use crate::dependencies::{self, DependencySet};
use crate::error::PmError;
use crate::notification;
use crate::platform::{
    Descriptor, KernelHandle, Pid, ProgramHandle, ProgramInfo, RawHandle, ServiceName,
    StartupInfo,
};
use crate::process::{ProcessFlags, ProcessRecord, ProcessRef, TerminationStatus};
use crate::reslimit::{self, ReslimitCategory};
use crate::{policy, ManagerState, Supervisor};

/// Launch flag word as passed over IPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchFlags(u32);

impl LaunchFlags {
    pub const NOTIFY_TERMINATION: LaunchFlags = LaunchFlags(1 << 0);
    pub const LOAD_DEPENDENCIES: LaunchFlags = LaunchFlags(1 << 1);
    pub const USE_UPDATE_TITLE: LaunchFlags = LaunchFlags(1 << 2);
    pub const QUEUE_DEBUG_APPLICATION: LaunchFlags = LaunchFlags(1 << 3);
    /// Bits 4..8 select the "process died" notification variant.
    pub const NOTIFICATION_VARIANT_MASK: LaunchFlags = LaunchFlags(0xF0);
    pub const FORCE_OLD_APP_MEMORY: LaunchFlags = LaunchFlags(1 << 8);
    pub const FORCE_OLD_MAX_APP_MEMORY: LaunchFlags = LaunchFlags(1 << 9);
    pub const NORMAL_APPLICATION: LaunchFlags = LaunchFlags(1 << 16);

    pub const fn empty() -> Self {
        LaunchFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        LaunchFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: LaunchFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: LaunchFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LaunchFlags) {
        self.0 &= !other.0;
    }

    pub const fn notification_variant(self) -> u8 {
        ((self.0 & Self::NOTIFICATION_VARIANT_MASK.0) >> 4) as u8
    }

    /// Applications always load their dependencies. Everything else never
    /// uses an update title and never overrides application memory.
    fn normalized(mut self) -> Self {
        if self.contains(Self::NORMAL_APPLICATION) {
            self.insert(Self::LOAD_DEPENDENCIES);
        } else {
            self.remove(Self::USE_UPDATE_TITLE);
            self.remove(Self::FORCE_OLD_APP_MEMORY | Self::FORCE_OLD_MAX_APP_MEMORY);
        }
        self
    }
}

impl BitOr for LaunchFlags {
    type Output = LaunchFlags;

    fn bitor(self, rhs: LaunchFlags) -> LaunchFlags {
        LaunchFlags(self.0 | rhs.0)
    }
}

/// Title ids with this bit set need a batch update first.
const BATCH_UPDATE_BIT: u64 = 1 << 35;

/// Outcome of a launch. Both fields are empty when policy skipped the title.
#[derive(Debug, Default)]
struct Launched {
    process: Option<ProcessRef>,
    debug: Option<KernelHandle>,
}

// =============================================================================
// Launch pipeline
// =============================================================================

impl Supervisor {
    /// Registers a program with the loader. On the newer revision the
    /// revision-specific title is tried first and the base title second.
    pub(crate) fn register_program(
        &self,
        program: ProgramInfo,
        update: ProgramInfo,
    ) -> Result<ProgramHandle, PmError> {
        // Host-IO titles are passed through untouched.
        if !self.config.is_new_model() || program.program_id >> 48 == 0xFFFF {
            return Ok(self.loader().register_program(program, update)?);
        }

        let remapped = ProgramInfo {
            program_id: self.config.variant_title(program.program_id),
            ..program
        };
        let remapped_update = ProgramInfo {
            program_id: self.config.variant_title(update.program_id),
            ..update
        };
        match self.loader().register_program(remapped, remapped_update) {
            Ok(handle) => Ok(handle),
            Err(code) => {
                log::debug!(
                    "LAUNCH_REMAP: {:#018x} rejected ({}), retrying base title",
                    remapped.program_id,
                    code
                );
                let base = ProgramInfo {
                    program_id: crate::config::base_title(program.program_id),
                    ..program
                };
                let base_update = ProgramInfo {
                    program_id: crate::config::base_title(update.program_id),
                    ..update
                };
                Ok(self.loader().register_program(base, base_update)?)
            }
        }
    }

    pub(crate) fn unregister_program_quietly(&self, program: ProgramHandle) {
        if let Err(code) = self.loader().unregister_program(program) {
            log::warn!("loader refused to unregister {:?}: {}", program, code);
        }
    }

    fn launch_title_impl(
        &self,
        st: &mut ManagerState,
        program: ProgramInfo,
        update: ProgramInfo,
        flags: LaunchFlags,
        attach_debugger: bool,
        descriptor: &mut Descriptor,
    ) -> Result<Launched, PmError> {
        if policy::is_launch_prevented(&self.config, program.program_id) {
            log::info!("LAUNCH_PREVENTED: {:#018x}", program.program_id);
            return Ok(Launched::default());
        }

        let flags = flags.normalized();
        if flags.contains(LaunchFlags::NORMAL_APPLICATION) && st.running_application().is_some() {
            return Err(PmError::ApplicationAlreadyRunning);
        }

        let update = if flags.contains(LaunchFlags::USE_UPDATE_TITLE) {
            update
        } else {
            program
        };
        let program_handle = self.register_program(program, update)?;

        if let Err(err) = self.prepare_launch(st, program_handle, flags, descriptor) {
            self.unregister_program_quietly(program_handle);
            return Err(err);
        }

        let mut launched = Launched::default();
        let result = self.build_process(
            st,
            &mut launched,
            program_handle,
            program,
            flags,
            attach_debugger,
            descriptor,
        );

        match result {
            Ok(()) => {
                if flags.contains(LaunchFlags::NOTIFY_TERMINATION) {
                    if let Some(record) = launched.process.and_then(|p| st.table.get_mut(p)) {
                        record.flags.insert(ProcessFlags::NOTIFY_ON_TERMINATION);
                    }
                }
                Ok(launched)
            }
            Err(err) => {
                log::warn!("LAUNCH_FAILED: {:#018x}: {}", program.program_id, err);
                if let Some(debug) = launched.debug.take() {
                    self.kernel().close_handle(debug);
                }
                match launched.process.and_then(|p| st.table.get(p)) {
                    // The monitor unregisters everything once the kernel
                    // reports the exit.
                    Some(record) => {
                        if let Err(kill) = self.kernel().terminate_process(record.handle.raw()) {
                            log::warn!("failed to kill pid {} after launch: {}", record.pid, kill);
                        }
                    }
                    None => self.unregister_program_quietly(program_handle),
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_process(
        &self,
        st: &mut ManagerState,
        launched: &mut Launched,
        program_handle: ProgramHandle,
        program: ProgramInfo,
        flags: LaunchFlags,
        attach_debugger: bool,
        descriptor: &Descriptor,
    ) -> Result<(), PmError> {
        let process = self.load_process(
            st,
            launched,
            program_handle,
            program,
            flags,
            attach_debugger,
            descriptor,
        )?;
        if flags.contains(LaunchFlags::LOAD_DEPENDENCIES) {
            self.load_dependencies(st, process, descriptor)?;
        }
        self.start_process(st, process, flags, descriptor)
    }

    /// Fetches the descriptor and applies the memory override, before any
    /// process exists.
    fn prepare_launch(
        &self,
        st: &mut ManagerState,
        program_handle: ProgramHandle,
        flags: LaunchFlags,
        descriptor: &mut Descriptor,
    ) -> Result<(), PmError> {
        descriptor.clear();
        self.loader().program_descriptor(program_handle, descriptor)?;
        if descriptor.core.core_version != self.config.core_version {
            log::warn!(
                "core version mismatch for {:#018x}: {} != {}",
                descriptor.title_id,
                descriptor.core.core_version,
                self.config.core_version
            );
            return Err(PmError::CoreVersionMismatch);
        }

        if let Some(limit) = reslimit::app_memory_override(&self.config, flags, &descriptor.core) {
            self.set_app_mem_limit(st, limit)?;
        }
        Ok(())
    }

    /// Creates the kernel process and configures it, without starting it.
    #[allow(clippy::too_many_arguments)]
    fn load_process(
        &self,
        st: &mut ManagerState,
        launched: &mut Launched,
        program_handle: ProgramHandle,
        program: ProgramInfo,
        flags: LaunchFlags,
        attach_debugger: bool,
        descriptor: &Descriptor,
    ) -> Result<ProcessRef, PmError> {
        if program.program_id & BATCH_UPDATE_BIT != 0 {
            return Err(PmError::BatchUpdateRequired);
        }

        let handle = self.loader().load_process(program_handle)?;
        let raw = handle.raw();
        let pid = match self.kernel().process_id(raw) {
            Ok(pid) => pid,
            Err(err) => {
                self.kernel().close_handle(handle);
                return Err(err.into());
            }
        };

        let process = st.table.insert(ProcessRecord {
            pid,
            title_id: descriptor.title_id,
            media_type: program.media_type,
            program_handle,
            handle,
            flags: ProcessFlags::empty(),
            launch_flags: flags,
            termination_status: TerminationStatus::Running,
            refcount: 1,
            notification_variant: flags.notification_variant(),
        });
        launched.process = Some(process);
        self.kernel().signal_event(self.new_process_event.raw())?;
        log::info!("PROCESS_CREATED: pid {} title {:#018x}", pid, descriptor.title_id);

        let services: Vec<ServiceName> = descriptor
            .service_access
            .iter()
            .take(MAX_SERVICE_ACCESS)
            .take_while(|&&name| name != ServiceName::default())
            .copied()
            .collect();
        self.fs().register(pid, program_handle, program, &descriptor.storage)?;
        self.broker().register_process(pid, &services)?;

        let category = match ReslimitCategory::from_index(descriptor.reslimit_category) {
            Some(category) => category,
            None => panic!(
                "resource limit category {} out of range for {:#018x}",
                descriptor.reslimit_category, descriptor.title_id
            ),
        };
        let kernel = self.kernel();
        kernel.set_process_resource_limits(raw, self.reslimits.handle(category))?;
        // Two cores even on the four-core revision: the mask only matters for
        // threads created without an explicit core.
        kernel.set_process_affinity_mask(raw, descriptor.core.affinity_mask, 2)?;
        kernel.set_process_ideal_processor(raw, descriptor.core.ideal_processor)?;

        if flags.contains(LaunchFlags::NORMAL_APPLICATION) {
            self.apply_app_cpu_time(st, descriptor.title_id, descriptor.cpu_time)?;
            if let Some(record) = st.table.get_mut(process) {
                record.flags.insert(ProcessFlags::IS_NORMAL_APPLICATION);
            }
        }

        if attach_debugger {
            launched.debug = Some(kernel.debug_active_process(pid)?);
        }
        Ok(process)
    }

    /// Launches the flattened dependency closure of `parent`, breadth first.
    /// Each dependency is started before the next one is looked at.
    fn load_dependencies(
        &self,
        st: &mut ManagerState,
        parent: ProcessRef,
        descriptor: &Descriptor,
    ) -> Result<(), PmError> {
        let new_model = self.config.is_new_model();
        let mut dep_descriptor = self.descriptors.acquire();
        let mut set = DependencySet::new();
        set.merge(&mut st.table, &dependencies::list_dependencies(descriptor, new_model));

        // The set grows while it is walked.
        let mut index = 0;
        while let Some(entry) = set.entry(index).copied() {
            index += 1;
            if entry.process.is_some() || entry.resolved {
                continue;
            }

            let program = ProgramInfo::nand(entry.title_id);
            let launched = self.launch_title_impl(
                st,
                program,
                program,
                LaunchFlags::empty(),
                false,
                &mut dep_descriptor,
            )?;

            if let Some(slot) = set.entry_mut(index - 1) {
                slot.resolved = true;
                slot.process = launched.process;
                slot.pending_refs = 0;
            }
            let process = match launched.process {
                Some(process) => process,
                None => continue,
            };
            if let Some(record) = st.table.get_mut(process) {
                record.flags.insert(ProcessFlags::AUTOLOADED | ProcessFlags::DEPENDENCIES_LOADED);
                record.incref(entry.pending_refs.saturating_sub(1));
                log::debug!(
                    "DEPENDENCY_LOADED: {:#018x} pid {} refcount {}",
                    entry.title_id,
                    record.pid,
                    record.refcount
                );
            }
            set.merge(&mut st.table, &dependencies::list_dependencies(&dep_descriptor, new_model));
        }

        if !set.is_empty() {
            if let Some(record) = st.table.get_mut(parent) {
                record.flags.insert(ProcessFlags::DEPENDENCIES_LOADED);
            }
        }
        Ok(())
    }

    fn start_process(
        &self,
        st: &mut ManagerState,
        process: ProcessRef,
        flags: LaunchFlags,
        descriptor: &Descriptor,
    ) -> Result<(), PmError> {
        if flags.contains(LaunchFlags::QUEUE_DEBUG_APPLICATION) {
            if st.queued_debug_process().is_some() {
                return Err(PmError::DebugSlotOccupied);
            }
            st.queued_debug_process = Some(process);
            log::info!("LAUNCH_QUEUED: {:#018x} parked for debugging", descriptor.title_id);
            return Ok(());
        }

        let handle = match st.table.get(process) {
            Some(record) => record.handle.raw(),
            None => return Err(PmError::ProcessGone),
        };
        self.kernel().run_process(
            handle,
            StartupInfo {
                priority: descriptor.core.priority,
                stack_size: descriptor.stack_size,
            },
        )?;

        if flags.contains(LaunchFlags::NORMAL_APPLICATION) {
            st.running_application = Some(process);
            if let Err(code) = self.notify_subscribers(notification::APPLICATION_LAUNCHED) {
                log::warn!("application launch notification failed: {}", code);
            }
        }
        log::info!("PROCESS_STARTED: {:#018x}", descriptor.title_id);
        Ok(())
    }

    /// Runs one launch with a pooled descriptor and reports the pid.
    fn launch_and_report(
        &self,
        st: &mut ManagerState,
        program: ProgramInfo,
        update: ProgramInfo,
        flags: LaunchFlags,
        attach_debugger: bool,
    ) -> Result<(Option<Pid>, Option<KernelHandle>), PmError> {
        let mut descriptor = self.descriptors.acquire();
        let launched =
            self.launch_title_impl(st, program, update, flags, attach_debugger, &mut descriptor)?;
        let pid = launched
            .process
            .and_then(|process| st.table.get(process))
            .map(|record| record.pid);
        Ok((pid, launched.debug))
    }

    /// Launch on the task runner. Failures are only logged.
    fn launch_async(&self, program: ProgramInfo, update: ProgramInfo, flags: LaunchFlags) {
        self.tasks.run(move |sup: &Supervisor| {
            let mut st = sup.lock_state();
            if let Err(err) = sup.launch_and_report(&mut st, program, update, flags, false) {
                log::warn!("async launch of {:#018x} failed: {}", program.program_id, err);
            }
        });
    }
}

// =============================================================================
// Public operations
// =============================================================================

impl Supervisor {
    /// Launches a title, or returns the pid of its running instance.
    ///
    /// Normal applications are launched on the task runner and `Ok(None)` is
    /// returned immediately; everything else runs synchronously.
    pub fn launch_title(
        &self,
        program: ProgramInfo,
        flags: LaunchFlags,
    ) -> Result<Option<Pid>, PmError> {
        let originally_debugged = flags.contains(LaunchFlags::QUEUE_DEBUG_APPLICATION);
        let mut flags = flags;
        flags.remove(LaunchFlags::USE_UPDATE_TITLE);

        let mut st = self.lock_state();
        if st.debug_next_application && flags.contains(LaunchFlags::NORMAL_APPLICATION) {
            flags.insert(LaunchFlags::QUEUE_DEBUG_APPLICATION);
        }
        if self.is_preparing_for_reboot() {
            return Err(PmError::AlreadyRebooting);
        }
        policy::check_core_version(&self.config, program.program_id);

        if flags.contains(LaunchFlags::NORMAL_APPLICATION) && st.running_application().is_some() {
            return Err(PmError::ApplicationAlreadyRunning);
        }

        if let Some(existing) = st.table.find_by_title(program.program_id) {
            if let Some(record) = st.table.get_mut(existing) {
                record.flags.remove(ProcessFlags::AUTOLOADED);
                log::debug!("LAUNCH_EXISTING: {:#018x} is pid {}", program.program_id, record.pid);
                return Ok(Some(record.pid));
            }
        }

        let application = flags.contains(LaunchFlags::NORMAL_APPLICATION);
        if flags.contains(LaunchFlags::QUEUE_DEBUG_APPLICATION) || !application {
            let (pid, _) = self.launch_and_report(&mut st, program, program, flags, false)?;
            if application {
                st.debug_next_application = false;
                drop(st);
                if !originally_debugged {
                    let result = self.notify_subscribers(notification::LAUNCHED_WITHOUT_DEBUG);
                    if let Err(code) = result {
                        log::warn!("debug latch notification failed: {}", code);
                    }
                }
            }
            return Ok(pid);
        }

        drop(st);
        self.launch_async(program, program, flags);
        Ok(None)
    }

    /// Launches an application using `update` for its code image.
    pub fn launch_title_update(
        &self,
        program: ProgramInfo,
        update: ProgramInfo,
        flags: LaunchFlags,
    ) -> Result<(), PmError> {
        let mut st = self.lock_state();
        if self.is_preparing_for_reboot() {
            return Err(PmError::AlreadyRebooting);
        }
        if st.running_application().is_some() {
            return Err(PmError::ApplicationAlreadyRunning);
        }
        if flags.bits() & !LaunchFlags::NORMAL_APPLICATION.bits() == 0 {
            return Err(PmError::InvalidLaunchFlags);
        }

        let originally_debugged = flags.contains(LaunchFlags::QUEUE_DEBUG_APPLICATION);
        let mut flags = flags | LaunchFlags::USE_UPDATE_TITLE;
        if st.debug_next_application {
            flags.insert(LaunchFlags::QUEUE_DEBUG_APPLICATION);
        }

        if flags.contains(LaunchFlags::QUEUE_DEBUG_APPLICATION) {
            self.launch_and_report(&mut st, program, update, flags, false)?;
            st.debug_next_application = false;
            drop(st);
            if !originally_debugged {
                if let Err(code) = self.notify_subscribers(notification::LAUNCHED_WITHOUT_DEBUG) {
                    log::warn!("debug latch notification failed: {}", code);
                }
            }
            return Ok(());
        }

        drop(st);
        self.launch_async(program, update, flags);
        Ok(())
    }

    /// Launches a normal application with its dependencies. Core 1 is closed
    /// to applications until the new one configures it.
    pub fn launch_app(&self, program: ProgramInfo, flags: LaunchFlags) -> Result<(), PmError> {
        {
            let st = self.lock_state();
            if st.running_application().is_some() {
                return Err(PmError::ApplicationAlreadyRunning);
            }
            self.set_app_cpu_time_limit(0)?;
        }
        self.launch_title(
            program,
            flags | LaunchFlags::LOAD_DEPENDENCIES | LaunchFlags::NORMAL_APPLICATION,
        )?;
        Ok(())
    }

    /// Launches an application with a debugger attached. If a process is
    /// already parked in the debug slot, that one is started instead.
    pub fn launch_app_debug(
        &self,
        program: ProgramInfo,
        flags: LaunchFlags,
    ) -> Result<KernelHandle, PmError> {
        let mut st = self.lock_state();
        if st.queued_debug_process().is_some() {
            return self.run_queued_process_locked(&mut st);
        }
        if st.running_application().is_some() {
            return Err(PmError::ApplicationAlreadyRunning);
        }

        let previous_latch = st.debug_next_application;
        st.debug_next_application = false;
        self.set_app_cpu_time_limit(0)?;

        let mut flags = flags | LaunchFlags::NORMAL_APPLICATION;
        flags.remove(LaunchFlags::USE_UPDATE_TITLE);
        match self.launch_and_report(&mut st, program, program, flags, true) {
            Ok((_, Some(debug))) => Ok(debug),
            Ok((_, None)) => Err(PmError::NotFound),
            Err(err) => {
                st.debug_next_application = previous_latch;
                Err(err)
            }
        }
    }

    /// Launches any title with a debugger attached.
    pub fn launch_title_debug(
        &self,
        program: ProgramInfo,
        flags: LaunchFlags,
    ) -> Result<KernelHandle, PmError> {
        if flags.contains(LaunchFlags::NORMAL_APPLICATION) {
            return self.launch_app_debug(program, flags);
        }

        let mut st = self.lock_state();
        if st.queued_debug_process().is_some() {
            return self.run_queued_process_locked(&mut st);
        }

        let mut flags = flags;
        flags.remove(LaunchFlags::USE_UPDATE_TITLE);
        match self.launch_and_report(&mut st, program, program, flags, true)? {
            (_, Some(debug)) => Ok(debug),
            (_, None) => Err(PmError::NotFound),
        }
    }

    /// Attaches a debugger to the parked process and starts it.
    pub fn run_queued_process(&self) -> Result<KernelHandle, PmError> {
        let mut st = self.lock_state();
        self.run_queued_process_locked(&mut st)
    }

    fn run_queued_process_locked(&self, st: &mut ManagerState) -> Result<KernelHandle, PmError> {
        let process = st.queued_debug_process().ok_or(PmError::NoQueuedProcess)?;
        let (pid, handle, program_handle, application) = match st.table.get(process) {
            Some(record) => (
                record.pid,
                record.handle.raw(),
                record.program_handle,
                record.flags.contains(ProcessFlags::IS_NORMAL_APPLICATION),
            ),
            None => return Err(PmError::NoQueuedProcess),
        };
        if application && st.running_application().is_some() {
            return Err(PmError::ApplicationAlreadyRunning);
        }
        st.queued_debug_process = None;

        match self.start_queued(pid, handle, program_handle) {
            Ok(debug) => {
                if application {
                    st.running_application = Some(process);
                    if let Err(code) = self.notify_subscribers(notification::APPLICATION_LAUNCHED) {
                        log::warn!("application launch notification failed: {}", code);
                    }
                }
                log::info!("QUEUED_PROCESS_STARTED: pid {}", pid);
                Ok(debug)
            }
            Err(err) => {
                if let Some(record) = st.table.get_mut(process) {
                    record.flags.remove(ProcessFlags::NOTIFY_ON_TERMINATION);
                    if let Err(kill) = self.kernel().terminate_process(record.handle.raw()) {
                        log::warn!("failed to kill queued pid {}: {}", pid, kill);
                    }
                }
                Err(err)
            }
        }
    }

    fn start_queued(
        &self,
        pid: Pid,
        handle: RawHandle,
        program_handle: ProgramHandle,
    ) -> Result<KernelHandle, PmError> {
        let mut descriptor = self.descriptors.acquire();
        self.loader().program_descriptor(program_handle, &mut descriptor)?;
        let debug = self.kernel().debug_active_process(pid)?;
        let startup = StartupInfo {
            priority: descriptor.core.priority,
            stack_size: descriptor.stack_size,
        };
        if let Err(err) = self.kernel().run_process(handle, startup) {
            self.kernel().close_handle(debug);
            return Err(err.into());
        }
        Ok(debug)
    }

    /// Arms (or disarms) the one-shot "debug the next application" latch.
    pub fn debug_next_application_by_force(&self, debug: bool) {
        self.lock_state().debug_next_application = debug;
        log::debug!("DEBUG_NEXT_APPLICATION: {}", debug);
    }

    /// Boot-time launch of the configured first sysmodule.
    pub fn autolaunch_sysmodules(&self) -> Result<(), PmError> {
        let title = self.config.autolaunch_title;
        if title == 0 {
            return Ok(());
        }
        let program = ProgramInfo::nand(title);
        let mut st = self.lock_state();
        self.launch_and_report(&mut st, program, program, LaunchFlags::LOAD_DEPENDENCIES, false)?;
        log::info!("AUTOLAUNCH: {:#018x} up", title);
        Ok(())
    }
}
