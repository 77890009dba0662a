use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use supervisor::platform::ProgramInfo;
use supervisor::process::ProcessInfo;
use supervisor::sim::{self, SimPlatform, SimTitle};
use supervisor::{LaunchFlags, Supervisor};

const HOME_MENU: u64 = 0x0004_0030_0000_8202;
const NS: u64 = 0x0004_0130_0000_8002;
const APT_SERVICES: u64 = 0x0004_0130_0000_1D02;
const CODEC: u64 = 0x0004_0130_0000_1802;
const GAME: u64 = 0x0004_0000_0012_3400;

/// Host runner for the process supervisor on a simulated platform.
#[derive(Parser)]
#[command(name = "pm", version)]
struct Cli {
    /// Hardware revision to simulate.
    #[arg(long, value_enum, default_value_t = Model::Old)]
    model: Model,

    /// Log level (error, warn, info, debug, trace); overrides PM_LOG.
    #[arg(long)]
    log: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum Model {
    Old,
    New,
}

#[derive(Subcommand)]
enum Cmd {
    /// Boot, launch an application with dependencies, then terminate it.
    Session,
    /// Boot, launch an application, then drain everything for a reboot.
    Reboot {
        /// Drain budget in milliseconds.
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// Boot and print the process table.
    Table,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log.or_else(|| std::env::var("PM_LOG").ok()) {
        Some(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => bail!("unknown log level {:?}", value),
        },
        None => LevelFilter::Info,
    };
    // A second logger cannot be installed; nothing else sets one here.
    let _ = supervisor::logger::init(level);

    let platform = match cli.model {
        Model::Old => SimPlatform::old_model(),
        Model::New => SimPlatform::new_model(),
    };
    install_titles(&platform);
    platform.set_autolaunch_title(NS);

    let pm = Supervisor::boot(platform.platform()).context("supervisor failed to boot")?;

    let result = match cli.cmd {
        Cmd::Session => session(&pm, &platform),
        Cmd::Reboot { timeout_ms } => reboot(&pm, &platform, timeout_ms),
        Cmd::Table => {
            print_table(&pm.processes());
            Ok(())
        }
    };

    for line in platform.debug_log() {
        println!("{}", line);
    }
    result
}

fn install_titles(platform: &SimPlatform) {
    platform.install(SimTitle::sysmodule(CODEC).services(&["dsp::DSP"]));
    platform.install(SimTitle::sysmodule(APT_SERVICES).depends_on(&[CODEC]).services(&["APT:U"]));
    platform.install(SimTitle::sysmodule(NS).depends_on(&[APT_SERVICES]).services(&["ns:s"]));
    platform.install(SimTitle::sysmodule(HOME_MENU).depends_on(&[NS]));
    platform.install(
        SimTitle::application(GAME)
            .depends_on(&[APT_SERVICES, CODEC])
            .cpu_time(0x80 | 30),
    );
}

fn launch_game(pm: &Supervisor, platform: &SimPlatform) -> Result<u32> {
    pm.launch_app(
        ProgramInfo::nand(GAME),
        LaunchFlags::NOTIFY_TERMINATION | LaunchFlags::LOAD_DEPENDENCIES,
    )?;
    pm.flush_tasks();
    match platform.pid_of(GAME) {
        Some(pid) => Ok(pid),
        None => bail!("application {:#018x} did not come up", GAME),
    }
}

fn session(pm: &Supervisor, platform: &SimPlatform) -> Result<()> {
    let pid = launch_game(pm, platform)?;
    println!("application running as pid {}", pid);
    print_table(&pm.processes());

    pm.terminate_application(Duration::from_secs(1).as_nanos() as i64)?;
    if !sim::wait_until(Duration::from_secs(2), || pm.get_current_app_info().is_err()) {
        bail!("application pid {} survived termination", pid);
    }
    println!("application terminated");
    print_table(&pm.processes());
    Ok(())
}

fn reboot(pm: &Supervisor, platform: &SimPlatform, timeout_ms: u64) -> Result<()> {
    launch_game(pm, platform)?;
    let home_menu = pm
        .launch_title(ProgramInfo::nand(HOME_MENU), LaunchFlags::LOAD_DEPENDENCIES)?
        .context("home menu launch was skipped")?;

    pm.prepare_for_reboot(home_menu, Duration::from_millis(timeout_ms).as_nanos() as i64)?;
    pm.flush_tasks();
    println!("ready for reboot: {:x?}", platform.notifications_to(home_menu));
    print_table(&pm.processes());
    Ok(())
}

fn print_table(processes: &[ProcessInfo]) {
    println!("{:>5}  {:<18}  {:>3}  {:<20}  flags", "pid", "title", "ref", "status");
    for process in processes {
        println!(
            "{:>5}  {:#018x}  {:>3}  {:<20}  {:?}",
            process.pid,
            process.title_id,
            process.refcount,
            format!("{:?}", process.termination_status),
            process.flags
        );
    }
}
