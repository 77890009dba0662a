//! Boot helpers shared by the scenario tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use supervisor::platform::{Pid, ProgramInfo, TitleId};
use supervisor::process::ProcessInfo;
use supervisor::sim::{self, SimPlatform, SimTitle};
use supervisor::{LaunchFlags, Supervisor};

pub const APP: TitleId = 0x0004_0000_0012_3400;
pub const OTHER_APP: TitleId = 0x0004_0000_0045_6700;
pub const DEP_A: TitleId = 0x0004_0130_0000_1802;
pub const DEP_B: TitleId = 0x0004_0130_0000_1D02;
pub const SYSMODULE: TitleId = 0x0004_0130_0000_3402;

pub const WAIT: Duration = Duration::from_secs(5);
pub const SECOND_NS: i64 = 1_000_000_000;

pub struct Harness {
    pub sim: Arc<SimPlatform>,
    pub pm: Arc<Supervisor>,
}

impl Harness {
    pub fn boot(sim: Arc<SimPlatform>, titles: Vec<SimTitle>) -> Self {
        let _ = supervisor::logger::init(log::LevelFilter::Debug);
        for title in titles {
            sim.install(title);
        }
        let pm = Supervisor::boot(sim.platform()).expect("boot");
        Harness { sim, pm }
    }

    pub fn old_model(titles: Vec<SimTitle>) -> Self {
        Self::boot(SimPlatform::old_model(), titles)
    }

    pub fn new_model(titles: Vec<SimTitle>) -> Self {
        Self::boot(SimPlatform::new_model(), titles)
    }

    /// Launches a normal application and waits for the task runner.
    pub fn launch_app(&self, title_id: TitleId, flags: LaunchFlags) -> Pid {
        self.pm
            .launch_app(ProgramInfo::nand(title_id), flags)
            .expect("launch_app");
        self.pm.flush_tasks();
        self.sim.pid_of(title_id).expect("application pid")
    }

    /// Launches a sysmodule synchronously.
    pub fn launch_sysmodule(&self, title_id: TitleId, flags: LaunchFlags) -> Pid {
        self.pm
            .launch_title(ProgramInfo::nand(title_id), flags)
            .expect("launch_title")
            .expect("sysmodule pid")
    }

    pub fn info(&self, pid: Pid) -> ProcessInfo {
        self.pm.process_by_pid(pid).expect("process record")
    }

    pub fn wait_gone(&self, pid: Pid) -> bool {
        sim::wait_until(WAIT, || self.pm.process_by_pid(pid).is_none())
    }
}
