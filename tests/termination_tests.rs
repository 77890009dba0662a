mod shared_sim;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shared_sim::*;
use supervisor::config::{EXTENSION_PID, IO_ROUTER_PID};
use supervisor::notification;
use supervisor::platform::ProgramInfo;
use supervisor::process::{ProcessFlags, TerminationStatus};
use supervisor::sim::{self, SimEvent, SimProcessState, SimTitle};
use supervisor::{LaunchFlags, PmError};

fn position(events: &[SimEvent], wanted: &SimEvent) -> usize {
    events
        .iter()
        .position(|event| event == wanted)
        .unwrap_or_else(|| panic!("{:?} never happened", wanted))
}

#[test]
fn unresponsive_application_is_killed_at_the_deadline() {
    let h = Harness::old_model(vec![SimTitle::application(APP).ignores_termination()]);
    let app = h.launch_app(APP, LaunchFlags::empty());

    let start = Instant::now();
    h.pm.terminate_application(0).unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));

    assert_eq!(h.sim.notifications_to(app), [notification::TERMINATION_REQUEST]);
    assert!(h.sim.was_killed(app));
    assert!(h.wait_gone(app));
    assert_eq!(h.pm.get_current_app_info().unwrap_err(), PmError::NotFound);
}

#[test]
fn cooperative_application_exits_without_a_kill() {
    let h = Harness::old_model(vec![SimTitle::application(APP)]);
    let app = h.launch_app(APP, LaunchFlags::empty());

    h.pm.terminate_application(SECOND_NS).unwrap();
    assert!(h.wait_gone(app));
    assert!(!h.sim.was_killed(app));
    assert_eq!(h.sim.process_state(app), Some(SimProcessState::Exited));
}

/// A drain on the IPC thread and one on the worker overlap. Neither may
/// sleep out its deadline once the processes it asked about are gone.
#[test]
fn overlapping_drains_finish_with_their_processes() {
    let h = Harness::old_model(vec![
        SimTitle::application(APP),
        SimTitle::sysmodule(SYSMODULE),
    ]);
    let app = h.launch_app(APP, LaunchFlags::empty());
    let sysmodule = h.launch_sysmodule(SYSMODULE, LaunchFlags::empty());

    let started = Instant::now();
    let worker_side = {
        let pm = Arc::clone(&h.pm);
        thread::spawn(move || {
            pm.terminate_title(SYSMODULE, 20 * SECOND_NS).unwrap();
            pm.flush_tasks();
        })
    };
    h.pm.terminate_application(20 * SECOND_NS).unwrap();
    worker_side.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(h.wait_gone(app));
    assert!(h.wait_gone(sysmodule));
    assert!(!h.sim.was_killed(app));
    assert!(!h.sim.was_killed(sysmodule));
}

/// The monitor keeps reclaiming exits while another thread is busy
/// launching.
#[test]
fn exits_are_reaped_during_a_launch_burst() {
    let titles: Vec<_> = (0..16u64)
        .map(|i| SimTitle::sysmodule(0x0004_0130_0020_0002 + (i << 8)))
        .collect();
    let ids: Vec<_> = titles.iter().map(SimTitle::title_id).collect();
    let h = Harness::old_model(titles);

    let early: Vec<_> = ids[..8]
        .iter()
        .map(|&title| h.launch_sysmodule(title, LaunchFlags::empty()))
        .collect();
    let launcher = {
        let pm = Arc::clone(&h.pm);
        let late = ids[8..].to_vec();
        thread::spawn(move || {
            for title in late {
                pm.launch_title(ProgramInfo::nand(title), LaunchFlags::empty())
                    .unwrap();
            }
        })
    };
    for &pid in &early {
        h.sim.exit(pid);
    }
    launcher.join().unwrap();

    for &pid in &early {
        assert!(h.wait_gone(pid), "pid {} never reaped", pid);
    }
    for &title in &ids[8..] {
        let pid = h.sim.pid_of(title).unwrap();
        assert_eq!(h.info(pid).termination_status, TerminationStatus::Running);
    }
}

/// Dependencies go away once the last process holding them does.
#[test]
fn dependency_closure_is_released_with_the_application() {
    let h = Harness::old_model(vec![
        SimTitle::sysmodule(DEP_A),
        SimTitle::sysmodule(DEP_B).depends_on(&[DEP_A]),
        SimTitle::application(APP).depends_on(&[DEP_A, DEP_B]),
    ]);
    let app = h.launch_app(APP, LaunchFlags::empty());
    let d1 = h.sim.pid_of(DEP_A).unwrap();
    let d2 = h.sim.pid_of(DEP_B).unwrap();

    h.pm.terminate_application(SECOND_NS).unwrap();
    assert!(h.wait_gone(app));
    assert!(h.wait_gone(d2));
    assert!(h.wait_gone(d1));
    assert_eq!(h.sim.notifications_to(d1), [notification::TERMINATION_REQUEST]);
    assert_eq!(h.sim.notifications_to(d2), [notification::TERMINATION_REQUEST]);
    // Unregistered on exit, just after the record goes.
    assert!(sim::wait_until(WAIT, || h.sim.registered_programs() == 0));
    assert!(sim::wait_until(WAIT, || !h.sim.is_fs_registered(d1)));
}

#[test]
fn dependency_launched_by_hand_outlives_its_users() {
    let h = Harness::old_model(vec![
        SimTitle::sysmodule(DEP_A),
        SimTitle::application(APP).depends_on(&[DEP_A]),
    ]);
    let dep = h.launch_sysmodule(DEP_A, LaunchFlags::empty());
    let app = h.launch_app(APP, LaunchFlags::empty());
    assert_eq!(h.sim.load_count(DEP_A), 1);

    h.pm.terminate_application(SECOND_NS).unwrap();
    assert!(h.wait_gone(app));
    assert!(h.sim.notifications_to(dep).is_empty());
    assert_eq!(h.info(dep).refcount, 1);
    assert_eq!(h.sim.process_state(dep), Some(SimProcessState::Running));
}

#[test]
fn repeated_termination_requests_are_not_resent() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE).ignores_termination()]);
    let pid = h.launch_sysmodule(SYSMODULE, LaunchFlags::empty());

    h.pm.terminate_process(pid, -1).unwrap();
    h.pm.terminate_process(pid, -1).unwrap();
    h.pm.flush_tasks();

    assert_eq!(h.sim.notifications_to(pid), [notification::TERMINATION_REQUEST]);
    assert_eq!(h.info(pid).termination_status, TerminationStatus::NotificationSent);
    assert!(!h.sim.was_killed(pid));
}

#[test]
fn terminate_process_with_timeout_kills_the_straggler() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE).ignores_termination()]);
    let pid = h.launch_sysmodule(SYSMODULE, LaunchFlags::empty());

    h.pm.terminate_process(pid, 0).unwrap();
    h.pm.flush_tasks();
    assert!(h.sim.was_killed(pid));
    assert!(h.wait_gone(pid));
}

#[test]
fn terminating_an_unknown_process_is_harmless() {
    let h = Harness::old_model(vec![]);
    h.pm.terminate_process(0x7FF, SECOND_NS).unwrap();
    h.pm.terminate_title(SYSMODULE, SECOND_NS).unwrap();
    h.pm.flush_tasks();
    assert_eq!(h.pm.processes().len(), 5);
}

#[test]
fn reboot_drains_ordinary_processes_before_the_role_processes() {
    let h = Harness::new_model(vec![
        SimTitle::sysmodule(DEP_A),
        SimTitle::sysmodule(SYSMODULE).depends_on(&[DEP_A]),
        SimTitle::sysmodule(DEP_B),
        SimTitle::application(APP),
    ]);
    let caller = h.launch_sysmodule(SYSMODULE, LaunchFlags::LOAD_DEPENDENCIES);
    let caller_dep = h.sim.pid_of(DEP_A).unwrap();
    let ordinary = h.launch_sysmodule(DEP_B, LaunchFlags::empty());
    let app = h.launch_app(APP, LaunchFlags::empty());

    h.pm.prepare_for_reboot(caller, SECOND_NS).unwrap();
    h.pm.flush_tasks();

    assert!(h.sim.broadcasts().contains(&notification::REBOOT_IMMINENT));
    assert!(h.wait_gone(ordinary));
    assert!(h.wait_gone(app));

    // The caller and what it runs on stay up, and only the caller is told.
    assert_eq!(h.sim.notifications_to(caller), [notification::READY_FOR_REBOOT]);
    assert!(h.sim.notifications_to(caller_dep).is_empty());
    assert_eq!(h.sim.process_state(caller_dep), Some(SimProcessState::Running));

    let events = h.sim.events();
    let ordinary_exit = position(&events, &SimEvent::Exited { pid: ordinary });
    let app_exit = position(&events, &SimEvent::Exited { pid: app });
    for role in [EXTENSION_PID, IO_ROUTER_PID] {
        let asked = position(
            &events,
            &SimEvent::Notified {
                pid: role,
                notification: notification::TERMINATION_REQUEST,
            },
        );
        assert!(asked > ordinary_exit && asked > app_exit, "pid {} asked early", role);
    }
    let ready = position(
        &events,
        &SimEvent::Notified {
            pid: caller,
            notification: notification::READY_FOR_REBOOT,
        },
    );
    assert!(ready > position(&events, &SimEvent::Exited { pid: IO_ROUTER_PID }));
}

#[test]
fn old_model_reboot_skips_the_extension() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE)]);
    let caller = h.launch_sysmodule(SYSMODULE, LaunchFlags::empty());

    h.pm.prepare_for_reboot(caller, SECOND_NS).unwrap();
    h.pm.flush_tasks();

    assert!(!h.sim.broadcasts().contains(&notification::REBOOT_IMMINENT));
    assert!(h.sim.notifications_to(EXTENSION_PID).is_empty());
    assert_eq!(h.sim.notifications_to(IO_ROUTER_PID), [notification::TERMINATION_REQUEST]);
    assert_eq!(h.sim.notifications_to(caller), [notification::READY_FOR_REBOOT]);
}

#[test]
fn reboot_state_rejects_new_work() {
    let h = Harness::old_model(vec![
        SimTitle::sysmodule(SYSMODULE),
        SimTitle::sysmodule(DEP_A),
        SimTitle::application(APP),
    ]);
    let caller = h.launch_sysmodule(SYSMODULE, LaunchFlags::empty());
    h.pm.prepare_for_reboot(caller, SECOND_NS).unwrap();
    h.pm.flush_tasks();
    assert!(h.pm.is_preparing_for_reboot());

    assert_eq!(h.pm.prepare_for_reboot(caller, 0).unwrap_err(), PmError::AlreadyRebooting);
    assert_eq!(
        h.pm.launch_title(ProgramInfo::nand(DEP_A), LaunchFlags::empty()).unwrap_err(),
        PmError::AlreadyRebooting
    );
    assert_eq!(
        h.pm.launch_title_update(
            ProgramInfo::nand(APP),
            ProgramInfo::nand(APP),
            LaunchFlags::NORMAL_APPLICATION | LaunchFlags::LOAD_DEPENDENCIES,
        )
        .unwrap_err(),
        PmError::AlreadyRebooting
    );
    assert_eq!(h.pm.terminate_application(0).unwrap_err(), PmError::AlreadyRebooting);
    assert_eq!(
        h.pm.get_title_exheader_flags(ProgramInfo::nand(APP)).unwrap_err(),
        PmError::AlreadyRebooting
    );
    assert_eq!(h.pm.terminate_process(caller, 5).unwrap_err(), PmError::AlreadyRebooting);

    // A zero timeout is an immediate kill.
    h.pm.terminate_process(caller, 0).unwrap();
    assert!(h.sim.was_killed(caller));
    assert!(h.wait_gone(caller));
}

#[test]
fn death_notification_keeps_the_record_until_unregistered() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE)]);
    let flags = LaunchFlags::NOTIFY_TERMINATION | LaunchFlags::from_bits(0x20);
    let pid = h.launch_sysmodule(SYSMODULE, flags);
    assert!(h.info(pid).flags.contains(ProcessFlags::NOTIFY_ON_TERMINATION));

    h.sim.exit(pid);
    assert!(sim::wait_until(WAIT, || h.sim.broadcasts().contains(&0x112)));
    assert!(sim::wait_until(WAIT, || h
        .pm
        .process_by_pid(pid)
        .map_or(false, |info| info.termination_status == TerminationStatus::Terminated)));
    assert!(h
        .info(pid)
        .flags
        .contains(ProcessFlags::TERMINATION_NOTIFIED_AND_DIED));
    // Cleanup ran even though the record stays.
    assert!(!h.sim.is_fs_registered(pid));

    h.pm.unregister_process(SYSMODULE).unwrap();
    assert!(h.pm.process_by_pid(pid).is_none());

    // A second call finds nothing to do.
    h.pm.unregister_process(SYSMODULE).unwrap();
}

#[test]
fn unregistering_a_live_process_only_drops_its_notification() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE)]);
    let pid = h.launch_sysmodule(SYSMODULE, LaunchFlags::NOTIFY_TERMINATION);

    h.pm.unregister_process(SYSMODULE).unwrap();
    let info = h.info(pid);
    assert!(!info.flags.contains(ProcessFlags::NOTIFY_ON_TERMINATION));
    assert_eq!(info.termination_status, TerminationStatus::Running);

    h.sim.exit(pid);
    assert!(h.wait_gone(pid));
    assert!(!h
        .sim
        .broadcasts()
        .iter()
        .any(|&n| (notification::PROCESS_DIED_BASE..0x120).contains(&n)));
}

#[test]
fn terminate_title_announces_the_death_once() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE)]);
    let flags = LaunchFlags::NOTIFY_TERMINATION | LaunchFlags::from_bits(0x20);
    let pid = h.launch_sysmodule(SYSMODULE, flags);

    h.pm.terminate_title(SYSMODULE, SECOND_NS).unwrap();
    h.pm.flush_tasks();

    let died = h.sim.broadcasts().iter().filter(|&&n| n == 0x112).count();
    assert_eq!(died, 1);
    assert_eq!(h.info(pid).termination_status, TerminationStatus::Terminated);

    h.pm.unregister_process(SYSMODULE).unwrap();
    assert!(h.pm.process_by_pid(pid).is_none());
}

#[test]
fn firmlaunch_drains_then_jumps() {
    let h = Harness::old_model(vec![SimTitle::sysmodule(SYSMODULE)]);
    let pid = h.launch_sysmodule(SYSMODULE, LaunchFlags::empty());

    h.pm.launch_firm(0x0000_0002, b"boot-args").unwrap();
    h.pm.flush_tasks();

    let events = h.sim.events();
    let jump = position(&events, &SimEvent::Firmlaunch { title_id: 0x0000_0002 });
    assert!(jump > position(&events, &SimEvent::Exited { pid }));
    assert!(jump > position(&events, &SimEvent::Exited { pid: IO_ROUTER_PID }));
    assert_eq!(h.pm.get_firmlaunch_params(9), b"boot-args");
}

#[test]
fn new_model_firmlaunch_targets_its_own_firmware() {
    let h = Harness::new_model(vec![]);
    h.pm.launch_firm(0x0000_0003, &[]).unwrap();
    h.pm.flush_tasks();
    assert!(h.sim.events().contains(&SimEvent::Firmlaunch {
        title_id: 0x2000_0003
    }));
}
