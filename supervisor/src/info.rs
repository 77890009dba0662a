//! Read-only queries over the process table and program descriptors.

use crate::error::PmError;
use crate::launch::LaunchFlags;
use crate::platform::{CoreInfo, Pid, ProgramInfo, SystemInfoFlags, TitleId};
use crate::process::ProcessInfo;
use crate::Supervisor;

/// What the application query reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentAppInfo {
    pub program: ProgramInfo,
    pub pid: Pid,
    pub launch_flags: LaunchFlags,
}

impl Supervisor {
    /// Core info and system-info flags of a program, read without launching
    /// it.
    pub fn get_title_exheader_flags(
        &self,
        program: ProgramInfo,
    ) -> Result<(CoreInfo, SystemInfoFlags), PmError> {
        if self.is_preparing_for_reboot() {
            return Err(PmError::AlreadyRebooting);
        }

        let mut descriptor = self.descriptors.acquire();
        let program_handle = self.register_program(program, program)?;
        let result = self.loader().program_descriptor(program_handle, &mut descriptor);
        self.unregister_program_quietly(program_handle);
        result?;

        Ok((descriptor.core, descriptor.flags))
    }

    pub fn get_current_app_info(&self) -> Result<CurrentAppInfo, PmError> {
        let st = self.lock_state();
        let app = st.running_application().ok_or(PmError::NotFound)?;
        let record = st.table.get(app).ok_or(PmError::NotFound)?;
        Ok(CurrentAppInfo {
            program: ProgramInfo::new(record.title_id, record.media_type),
            pid: record.pid,
            launch_flags: record.launch_flags,
        })
    }

    pub fn get_current_app_title_id_and_pid(&self) -> Result<(TitleId, Pid), PmError> {
        let info = self.get_current_app_info()?;
        Ok((info.program.program_id, info.pid))
    }

    /// Snapshot of every record, oldest first.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        let st = self.lock_state();
        st.table.iter().map(|(_, record)| record.info()).collect()
    }

    pub fn process_by_pid(&self, pid: Pid) -> Option<ProcessInfo> {
        let st = self.lock_state();
        let process = st.table.find_by_pid(pid)?;
        st.table.get(process).map(|record| record.info())
    }
}
