//! IPC command surface.
//!
//! Two services are exposed: the application-management service (`pm:app`)
//! and the debugger service (`pm:dbg`). Requests arrive already decoded as
//! [`AppCommand`] / [`DebugCommand`]; each handler runs on the IPC-serving
//! thread and either answers synchronously or queues work on the task
//! runner and answers at once.

use crate::error::PmError;
use crate::info::CurrentAppInfo;
use crate::launch::LaunchFlags;
use crate::platform::{CoreInfo, KernelHandle, Pid, ProgramInfo, SystemInfoFlags, TitleId};
use crate::Supervisor;

/// `pm:app` requests, in command-id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    LaunchTitle { program: ProgramInfo, flags: LaunchFlags },
    LaunchFirm { firm_title_low: u32, params: Vec<u8> },
    TerminateApplication { timeout_ns: i64 },
    TerminateTitle { title_id: TitleId, timeout_ns: i64 },
    TerminateProcess { pid: Pid, timeout_ns: i64 },
    PrepareForReboot { caller_pid: Pid, timeout_ns: i64 },
    GetFirmlaunchParams { size: usize },
    GetTitleExHeaderFlags { program: ProgramInfo },
    SetFirmlaunchParams { params: Vec<u8> },
    SetAppResourceLimit { category: u32, value: u32 },
    GetAppResourceLimit { category: u32 },
    UnregisterProcess { title_id: TitleId },
    LaunchTitleUpdate { program: ProgramInfo, update: ProgramInfo, flags: LaunchFlags },
}

impl AppCommand {
    pub fn id(&self) -> u16 {
        match self {
            AppCommand::LaunchTitle { .. } => 1,
            AppCommand::LaunchFirm { .. } => 2,
            AppCommand::TerminateApplication { .. } => 3,
            AppCommand::TerminateTitle { .. } => 4,
            AppCommand::TerminateProcess { .. } => 5,
            AppCommand::PrepareForReboot { .. } => 6,
            AppCommand::GetFirmlaunchParams { .. } => 7,
            AppCommand::GetTitleExHeaderFlags { .. } => 8,
            AppCommand::SetFirmlaunchParams { .. } => 9,
            AppCommand::SetAppResourceLimit { .. } => 10,
            AppCommand::GetAppResourceLimit { .. } => 11,
            AppCommand::UnregisterProcess { .. } => 12,
            AppCommand::LaunchTitleUpdate { .. } => 13,
        }
    }
}

/// `pm:dbg` requests. Ids `0x100` and up are extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    LaunchAppDebug { program: ProgramInfo, flags: LaunchFlags },
    LaunchApp { program: ProgramInfo, flags: LaunchFlags },
    RunQueuedProcess,
    GetCurrentAppTitleIdAndPid,
    DebugNextApplicationByForce { debug: bool },
    LaunchTitleDebug { program: ProgramInfo, flags: LaunchFlags },
}

impl DebugCommand {
    pub fn id(&self) -> u16 {
        match self {
            DebugCommand::LaunchAppDebug { .. } => 1,
            DebugCommand::LaunchApp { .. } => 2,
            DebugCommand::RunQueuedProcess => 3,
            DebugCommand::GetCurrentAppTitleIdAndPid => 0x100,
            DebugCommand::DebugNextApplicationByForce { .. } => 0x101,
            DebugCommand::LaunchTitleDebug { .. } => 0x102,
        }
    }
}

/// Successful answer to a command.
#[derive(Debug)]
pub enum Reply {
    Done,
    /// `None` when the launch was queued and the pid is not known yet.
    Launched { pid: Option<Pid> },
    Params(Vec<u8>),
    ExHeaderFlags { core: CoreInfo, flags: SystemInfoFlags },
    Limit(i64),
    /// Debug handle, moved to the caller.
    Debug(KernelHandle),
    AppInfo { title_id: TitleId, pid: Pid },
}

impl Supervisor {
    pub fn handle_app_command(&self, command: AppCommand) -> Result<Reply, PmError> {
        log::trace!("pm:app command {}", command.id());
        match command {
            AppCommand::LaunchTitle { program, flags } => {
                let pid = self.launch_title(program, flags)?;
                Ok(Reply::Launched { pid })
            }
            AppCommand::LaunchFirm { firm_title_low, params } => {
                self.launch_firm(firm_title_low, &params)?;
                Ok(Reply::Done)
            }
            AppCommand::TerminateApplication { timeout_ns } => {
                self.terminate_application(timeout_ns)?;
                Ok(Reply::Done)
            }
            AppCommand::TerminateTitle { title_id, timeout_ns } => {
                self.terminate_title(title_id, timeout_ns)?;
                Ok(Reply::Done)
            }
            AppCommand::TerminateProcess { pid, timeout_ns } => {
                self.terminate_process(pid, timeout_ns)?;
                Ok(Reply::Done)
            }
            AppCommand::PrepareForReboot { caller_pid, timeout_ns } => {
                self.prepare_for_reboot(caller_pid, timeout_ns)?;
                Ok(Reply::Done)
            }
            AppCommand::GetFirmlaunchParams { size } => {
                Ok(Reply::Params(self.get_firmlaunch_params(size)))
            }
            AppCommand::GetTitleExHeaderFlags { program } => {
                let (core, flags) = self.get_title_exheader_flags(program)?;
                Ok(Reply::ExHeaderFlags { core, flags })
            }
            AppCommand::SetFirmlaunchParams { params } => {
                self.set_firmlaunch_params(&params);
                Ok(Reply::Done)
            }
            AppCommand::SetAppResourceLimit { category, value } => {
                self.set_app_resource_limit(category, value)?;
                Ok(Reply::Done)
            }
            AppCommand::GetAppResourceLimit { category } => {
                Ok(Reply::Limit(self.get_app_resource_limit(category)?))
            }
            AppCommand::UnregisterProcess { title_id } => {
                self.unregister_process(title_id)?;
                Ok(Reply::Done)
            }
            AppCommand::LaunchTitleUpdate { program, update, flags } => {
                self.launch_title_update(program, update, flags)?;
                Ok(Reply::Done)
            }
        }
    }

    pub fn handle_debug_command(&self, command: DebugCommand) -> Result<Reply, PmError> {
        log::trace!("pm:dbg command {:#x}", command.id());
        match command {
            DebugCommand::LaunchAppDebug { program, flags } => {
                Ok(Reply::Debug(self.launch_app_debug(program, flags)?))
            }
            DebugCommand::LaunchApp { program, flags } => {
                self.launch_app(program, flags)?;
                Ok(Reply::Done)
            }
            DebugCommand::RunQueuedProcess => Ok(Reply::Debug(self.run_queued_process()?)),
            DebugCommand::GetCurrentAppTitleIdAndPid => {
                let (title_id, pid) = self.get_current_app_title_id_and_pid()?;
                Ok(Reply::AppInfo { title_id, pid })
            }
            DebugCommand::DebugNextApplicationByForce { debug } => {
                self.debug_next_application_by_force(debug);
                Ok(Reply::Done)
            }
            DebugCommand::LaunchTitleDebug { program, flags } => {
                Ok(Reply::Debug(self.launch_title_debug(program, flags)?))
            }
        }
    }

    /// Application info as reported to the home menu.
    pub fn current_app(&self) -> Option<CurrentAppInfo> {
        self.get_current_app_info().ok()
    }
}
