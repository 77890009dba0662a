mod shared_sim;

use shared_sim::*;
use supervisor::platform::{CoreInfo, ProgramInfo, ResourceKind, SchedulingMode, SystemMode};
use supervisor::service::{AppCommand, DebugCommand, Reply};
use supervisor::sim::{self, SimTitle};
use supervisor::{LaunchFlags, PmError};

const CPU_TIME: u32 = ResourceKind::CpuTime as u32;

fn commit_value(bytes: u32) -> i64 {
    i64::from(bytes) | (i64::from(bytes) << 32)
}

#[test]
fn firmlaunch_params_are_a_fixed_block() {
    let h = Harness::old_model(vec![]);
    h.pm.set_firmlaunch_params(&[0xAB; 16]);
    assert_eq!(h.pm.get_firmlaunch_params(16), [0xAB; 16]);

    // A shorter write clears what it does not cover.
    h.pm.set_firmlaunch_params(&[0x01; 4]);
    assert_eq!(h.pm.get_firmlaunch_params(8), [1, 1, 1, 1, 0, 0, 0, 0]);

    // Reads and writes past the block are clipped.
    h.pm.set_firmlaunch_params(&vec![0x5A; 0x1800]);
    let block = h.pm.get_firmlaunch_params(0x2000);
    assert_eq!(block.len(), 0x1000);
    assert!(block.iter().all(|&b| b == 0x5A));
}

#[test]
fn application_cpu_time_respects_the_descriptor_ceiling() {
    let h = Harness::old_model(vec![SimTitle::application(APP).cpu_time(0x80 | 30)]);
    h.launch_app(APP, LaunchFlags::empty());
    assert_eq!(h.sim.scheduling_mode(), Some(SchedulingMode::Multi));
    assert_eq!(h.pm.get_app_resource_limit(CPU_TIME).unwrap(), 0);

    assert_eq!(
        h.pm.set_app_resource_limit(CPU_TIME, 31).unwrap_err(),
        PmError::InvalidArgument
    );
    h.pm.set_app_resource_limit(CPU_TIME, 25).unwrap();
    assert_eq!(h.pm.get_app_resource_limit(CPU_TIME).unwrap(), 25);

    let commit = ResourceKind::Commit as u32;
    assert_eq!(
        h.pm.set_app_resource_limit(commit, 1).unwrap_err(),
        PmError::InvalidArgument
    );
    assert_eq!(h.pm.get_app_resource_limit(commit).unwrap_err(), PmError::InvalidArgument);
}

#[test]
fn legacy_titles_get_their_override_grant() {
    let legacy = 0x0004_0000_0003_3400;
    let h = Harness::old_model(vec![SimTitle::application(legacy)]);
    let app = h.launch_app(legacy, LaunchFlags::empty());

    assert_eq!(h.sim.scheduling_mode(), Some(SchedulingMode::Single));
    assert_eq!(h.sim.process_limit(app, ResourceKind::CpuTime), Some(30));
    assert_eq!(h.pm.get_app_resource_limit(CPU_TIME).unwrap(), 30);
}

#[test]
fn new_model_emulates_old_application_memory() {
    let h = Harness::new_model(vec![SimTitle::application(APP)]);
    let app = h.launch_app(APP, LaunchFlags::empty());
    assert_eq!(
        h.sim.process_limit(app, ResourceKind::Commit),
        Some(commit_value(64 << 20))
    );

    h.pm.terminate_application(SECOND_NS).unwrap();
    assert!(h.wait_gone(app));
    assert!(sim::wait_until(WAIT, || {
        h.sim.process_limit(app, ResourceKind::Commit) == Some(commit_value(0x07C0_0000))
    }));
}

#[test]
fn new_model_native_application_keeps_the_full_region() {
    let core = CoreInfo {
        new_system_mode: SystemMode::NewProd,
        priority: 0x30,
        affinity_mask: 1,
        ..CoreInfo::default()
    };
    let h = Harness::new_model(vec![SimTitle::application(APP).core(core)]);
    let app = h.launch_app(APP, LaunchFlags::empty());
    // Still the boot-time value: nothing was rewritten.
    assert_eq!(h.sim.process_limit(app, ResourceKind::Commit), Some(0x07C0_0000));
}

#[test]
fn exheader_flags_are_read_without_launching() {
    let core = CoreInfo {
        priority: 0x2C,
        affinity_mask: 3,
        ideal_processor: 1,
        ..CoreInfo::default()
    };
    let h = Harness::old_model(vec![SimTitle::application(APP).core(core)]);

    let (reported, _flags) = h
        .pm
        .get_title_exheader_flags(ProgramInfo::nand(APP))
        .unwrap();
    assert_eq!(reported.priority, 0x2C);
    assert_eq!(reported.affinity_mask, 3);
    assert_eq!(reported.ideal_processor, 1);
    assert_eq!(h.sim.load_count(APP), 0);
    assert_eq!(h.sim.registered_programs(), 0);

    let missing = h
        .pm
        .get_title_exheader_flags(ProgramInfo::nand(OTHER_APP))
        .unwrap_err();
    assert_eq!(missing, PmError::Service(sim::TITLE_NOT_FOUND));
}

#[test]
fn no_application_means_not_found() {
    let h = Harness::old_model(vec![]);
    let err = h.pm.get_current_app_info().unwrap_err();
    assert_eq!(err, PmError::NotFound);
    assert!(err.result_code().is_not_found());
    assert!(h.pm.current_app().is_none());
}

#[test]
fn commands_dispatch_to_operations() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE), SimTitle::application(APP)]);

    let reply = h
        .pm
        .handle_app_command(AppCommand::LaunchTitle {
            program: ProgramInfo::nand(SYSMODULE),
            flags: LaunchFlags::empty(),
        })
        .unwrap();
    let sysmodule = match reply {
        Reply::Launched { pid: Some(pid) } => pid,
        other => panic!("unexpected reply {:?}", other),
    };
    assert_eq!(h.sim.pid_of(SYSMODULE), Some(sysmodule));

    // Applications launch on the task runner.
    let reply = h
        .pm
        .handle_debug_command(DebugCommand::LaunchApp {
            program: ProgramInfo::nand(APP),
            flags: LaunchFlags::empty(),
        })
        .unwrap();
    assert!(matches!(reply, Reply::Done));
    h.pm.flush_tasks();

    let app = h.sim.pid_of(APP).unwrap();
    match h
        .pm
        .handle_debug_command(DebugCommand::GetCurrentAppTitleIdAndPid)
        .unwrap()
    {
        Reply::AppInfo { title_id, pid } => {
            assert_eq!(title_id, APP);
            assert_eq!(pid, app);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert_eq!(h.pm.current_app().map(|info| info.pid), Some(app));

    let err = h
        .pm
        .handle_app_command(AppCommand::LaunchTitle {
            program: ProgramInfo::nand(APP),
            flags: LaunchFlags::NORMAL_APPLICATION,
        })
        .unwrap_err();
    assert_eq!(err.result_code(), PmError::ApplicationAlreadyRunning.result_code());

    match h
        .pm
        .handle_app_command(AppCommand::GetFirmlaunchParams { size: 4 })
        .unwrap()
    {
        Reply::Params(params) => assert_eq!(params, [0; 4]),
        other => panic!("unexpected reply {:?}", other),
    }

    h.pm
        .handle_app_command(AppCommand::TerminateProcess {
            pid: sysmodule,
            timeout_ns: SECOND_NS,
        })
        .unwrap();
    h.pm.flush_tasks();
    assert!(h.wait_gone(sysmodule));

    assert!(matches!(
        h.pm.handle_debug_command(DebugCommand::RunQueuedProcess),
        Err(PmError::NoQueuedProcess)
    ));
}
