//! Resource limit catalog.
//!
//! Four kernel resource limits are created at boot, one per category. Their
//! static caps come from per-revision tables; the commit (allocatable memory)
//! caps are fixed up from the actual memory layout. The APPLICATION limit is
//! adjusted afterwards: its commit cap per launch on the newer revision, and
//! its core-1 CPU time whenever a normal application starts or asks for more.

use crate::config::PlatformConfig;
use crate::error::{KernelError, PmError};
use crate::launch::LaunchFlags;
use crate::platform::{
    CoreInfo, Kernel, KernelHandle, RawHandle, ResourceKind, SchedulingMode, SystemMode, TitleId,
};
use crate::{ManagerState, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReslimitCategory {
    Application = 0,
    SysApplet = 1,
    LibApplet = 2,
    Other = 3,
}

impl ReslimitCategory {
    pub const ALL: [ReslimitCategory; 4] = [
        ReslimitCategory::Application,
        ReslimitCategory::SysApplet,
        ReslimitCategory::LibApplet,
        ReslimitCategory::Other,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

/// Order in which values are pushed to the kernel. Commit comes first.
pub const INIT_ORDER: [ResourceKind; 10] = [
    ResourceKind::Commit,
    ResourceKind::Priority,
    ResourceKind::Thread,
    ResourceKind::Event,
    ResourceKind::Mutex,
    ResourceKind::Semaphore,
    ResourceKind::Timer,
    ResourceKind::SharedMemory,
    ResourceKind::AddressArbiter,
    ResourceKind::CpuTime,
];

/// One category's caps, in [`INIT_ORDER`].
pub type LimitValues = [i64; 10];

const OLD_MODEL_LIMITS: [LimitValues; 4] = [
    // APPLICATION
    [0x400_0000, 0x18, 32, 32, 32, 8, 8, 16, 2, 0],
    // SYS_APPLET
    [0x260_6000, 4, 14, 8, 8, 4, 4, 8, 3, 10000],
    // LIB_APPLET
    [0x060_2000, 4, 14, 8, 8, 4, 4, 8, 1, 10000],
    // OTHER
    [0x168_2000, 4, 202, 248, 35, 64, 43, 30, 43, 1000],
];

const NEW_MODEL_LIMITS: [LimitValues; 4] = [
    // APPLICATION
    [0x7C0_0000, 0x18, 32, 32, 32, 8, 8, 16, 2, 0],
    // SYS_APPLET
    [0x5E0_6000, 4, 29, 11, 8, 4, 4, 8, 3, 10000],
    // LIB_APPLET
    [0x060_2000, 4, 14, 8, 8, 4, 4, 8, 1, 10000],
    // OTHER
    [0x218_2000, 4, 225, 264, 37, 67, 44, 31, 45, 1000],
];

const MIN_APPLET_MEMORY: u32 = 0x120_0000;

/// Computes every category's caps with the commit values fixed up.
///
/// SYSTEM memory beyond the revision's default is split three quarters to
/// SYS_APPLET and one quarter each to LIB_APPLET and OTHER; LIB_APPLET always
/// keeps a third of the applet minimum unless SYSTEM is below that minimum.
pub fn limit_values(config: &PlatformConfig) -> [LimitValues; 4] {
    let mut values = if config.is_new_model() {
        NEW_MODEL_LIMITS
    } else {
        OLD_MODEL_LIMITS
    };

    let app_memory = config.memory_regions[0];
    let system_memory = config.system_memory();
    let (default_memory, other_min_overcommit, base_region) = if config.is_new_model() {
        (0x640_0000u32, 0x18_0000u32, 0x200_0000u32)
    } else {
        (0x2C0_0000, 0x28_0000, 0x140_0000)
    };

    let (sys_applet, lib_applet, other) = if system_memory < MIN_APPLET_MEMORY {
        (
            system_memory.wrapping_sub(MIN_APPLET_MEMORY / 3),
            0,
            base_region + other_min_overcommit,
        )
    } else {
        let excess = system_memory.saturating_sub(default_memory);
        (
            3 * excess / 4 + system_memory - MIN_APPLET_MEMORY / 3,
            excess / 4 + MIN_APPLET_MEMORY / 3,
            base_region + other_min_overcommit + excess / 4,
        )
    };

    values[ReslimitCategory::Application as usize][0] = i64::from(app_memory);
    values[ReslimitCategory::SysApplet as usize][0] = i64::from(sys_applet);
    values[ReslimitCategory::LibApplet as usize][0] = i64::from(lib_applet);
    values[ReslimitCategory::Other as usize][0] = i64::from(other);
    values
}

// =============================================================================
// Core-1 CPU time
// =============================================================================

const CPU_TIME_MULTI_BIT: u8 = 1 << 7;
const DEFAULT_CPU_TIME_MAX: u8 = 80;

/// Legacy titles that predate the CPU time descriptor, keyed by the title's
/// unique id. Values between 101 and 199 select "multi" mode with an initial
/// grant of `value - 100`; anything else is an initial grant in "single" mode
/// (10000 exempts the title from preemption).
pub const CPU_TIME_OVERRIDES: &[(u32, u32)] = &[
    (0x205, 10000),
    (0x215, 10000),
    (0x225, 10000),
    (0x304, 10000),
    (0x32E, 10000),
    (0x334, 30),
    (0x335, 30),
    (0x336, 30),
    (0x348, 10000),
    (0x349, 10000),
    (0x368, 10000),
    (0x370, 10000),
    (0x389, 10000),
    (0x490, 10000),
    (0x491, 10000),
    (0x562, 10000),
];

/// CPU time configuration derived from a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimeSetting {
    pub mode: SchedulingMode,
    /// Ceiling for later explicit grants.
    pub max: u8,
    /// Grant applied at launch; 0 leaves core 1 closed.
    pub initial: u32,
}

pub fn title_unique_id(title_id: TitleId) -> u32 {
    ((title_id as u32) >> 8) & 0xF_FFFF
}

pub fn cpu_time_setting(title_id: TitleId, descriptor: u16) -> CpuTimeSetting {
    let cpu_time = descriptor as u8;
    if cpu_time != 0 {
        let mode = if cpu_time & CPU_TIME_MULTI_BIT != 0 {
            SchedulingMode::Multi
        } else {
            SchedulingMode::Single
        };
        return CpuTimeSetting {
            mode,
            max: cpu_time & 0x7F,
            initial: 0,
        };
    }

    let unique_id = title_unique_id(title_id);
    match CPU_TIME_OVERRIDES.iter().find(|&&(uid, _)| uid == unique_id) {
        Some(&(_, value)) if value > 100 && value < 200 => CpuTimeSetting {
            mode: SchedulingMode::Multi,
            max: DEFAULT_CPU_TIME_MAX,
            initial: value - 100,
        },
        Some(&(_, value)) => CpuTimeSetting {
            mode: SchedulingMode::Single,
            max: DEFAULT_CPU_TIME_MAX,
            initial: value,
        },
        None => CpuTimeSetting {
            mode: SchedulingMode::Single,
            max: DEFAULT_CPU_TIME_MAX,
            initial: 0,
        },
    }
}

// =============================================================================
// Application memory
// =============================================================================

/// APPLICATION commit cap for a launch, in bytes, when the newer revision has
/// to emulate the older one's memory layout.
pub fn app_memory_override(
    config: &PlatformConfig,
    flags: LaunchFlags,
    core: &CoreInfo,
) -> Option<u32> {
    if !config.manages_app_memory() || !flags.contains(LaunchFlags::NORMAL_APPLICATION) {
        return None;
    }
    let forced = flags.contains(LaunchFlags::FORCE_OLD_APP_MEMORY);
    if !forced && core.new_system_mode != SystemMode::OldProd {
        return None;
    }

    let megabytes: u32 = if forced && flags.contains(LaunchFlags::FORCE_OLD_MAX_APP_MEMORY) {
        96
    } else {
        match core.old_system_mode {
            SystemMode::OldProd => 64,
            SystemMode::Dev1 => 96,
            SystemMode::Dev2 => 80,
            _ => 0,
        }
    };
    Some(megabytes << 20)
}

// =============================================================================
// Kernel objects
// =============================================================================

/// The four category resource limits.
pub struct ResourceLimits {
    handles: [KernelHandle; 4],
}

impl ResourceLimits {
    pub fn initialize(kernel: &dyn Kernel, config: &PlatformConfig) -> Result<Self, KernelError> {
        let values = limit_values(config);
        let mut create = |category: ReslimitCategory| -> Result<KernelHandle, KernelError> {
            let handle = kernel.create_resource_limit()?;
            let pairs: Vec<(ResourceKind, i64)> = INIT_ORDER
                .iter()
                .copied()
                .zip(values[category as usize].iter().copied())
                .collect();
            kernel.set_resource_limit_values(handle.raw(), &pairs)?;
            log::debug!(
                "RESLIMIT_INIT: {:?} commit={:#x}",
                category,
                values[category as usize][0]
            );
            Ok(handle)
        };

        Ok(ResourceLimits {
            handles: [
                create(ReslimitCategory::Application)?,
                create(ReslimitCategory::SysApplet)?,
                create(ReslimitCategory::LibApplet)?,
                create(ReslimitCategory::Other)?,
            ],
        })
    }

    pub fn handle(&self, category: ReslimitCategory) -> RawHandle {
        self.handles[category as usize].raw()
    }
}

impl Supervisor {
    /// Raw handle of a category's resource limit.
    pub fn resource_limit(&self, category: ReslimitCategory) -> RawHandle {
        self.reslimits.handle(category)
    }

    /// Writes the APPLICATION commit cap. The high word carries the value
    /// the kernel reports as the application memory size.
    pub(crate) fn set_app_mem_limit(
        &self,
        st: &mut ManagerState,
        limit: u32,
    ) -> Result<(), KernelError> {
        if st.current_app_mem_limit == limit {
            return Ok(());
        }
        let value = i64::from(limit) | (i64::from(limit) << 32);
        self.kernel().set_resource_limit_values(
            self.reslimits.handle(ReslimitCategory::Application),
            &[(ResourceKind::Commit, value)],
        )?;
        log::debug!("APP_MEM_LIMIT: {:#x} -> {:#x}", st.current_app_mem_limit, limit);
        st.current_app_mem_limit = limit;
        Ok(())
    }

    pub(crate) fn reset_app_mem_limit(&self, st: &mut ManagerState) -> Result<(), KernelError> {
        let default = st.default_app_mem_limit;
        self.set_app_mem_limit(st, default)
    }

    pub(crate) fn set_app_cpu_time_limit(&self, limit: i64) -> Result<(), KernelError> {
        self.kernel().set_resource_limit_values(
            self.reslimits.handle(ReslimitCategory::Application),
            &[(ResourceKind::CpuTime, limit)],
        )
    }

    fn app_cpu_time_limit(&self) -> Result<i64, KernelError> {
        self.kernel().resource_limit_value(
            self.reslimits.handle(ReslimitCategory::Application),
            ResourceKind::CpuTime,
        )
    }

    /// Configures core-1 scheduling for a normal application about to start.
    pub(crate) fn apply_app_cpu_time(
        &self,
        st: &mut ManagerState,
        title_id: TitleId,
        descriptor: u16,
    ) -> Result<(), KernelError> {
        self.set_app_cpu_time_limit(0)?;
        st.cpu_time_base = 0;

        let setting = cpu_time_setting(title_id, descriptor);
        self.kernel().set_core1_scheduling_mode(setting.mode)?;
        st.max_app_cpu_time = setting.max;
        if setting.initial != 0 {
            self.set_app_cpu_time_limit(i64::from(setting.initial))?;
        }
        log::debug!("APP_CPU_TIME: {:#018x} {:?}", title_id, setting);
        Ok(())
    }

    /// Grants core-1 time to the running application. Only CPU time may be
    /// set, and never above the ceiling computed at launch.
    pub fn set_app_resource_limit(&self, category: u32, value: u32) -> Result<(), PmError> {
        let st = self.lock_state();
        if ResourceKind::from_raw(category) != Some(ResourceKind::CpuTime)
            || value > u32::from(st.max_app_cpu_time)
        {
            return Err(PmError::InvalidArgument);
        }
        let value = if value < 5 {
            i64::from(value)
        } else {
            i64::from(value) + st.cpu_time_base
        };
        drop(st);
        self.set_app_cpu_time_limit(value)?;
        Ok(())
    }

    pub fn get_app_resource_limit(&self, category: u32) -> Result<i64, PmError> {
        if ResourceKind::from_raw(category) != Some(ResourceKind::CpuTime) {
            return Err(PmError::InvalidArgument);
        }
        let value = self.app_cpu_time_limit()?;
        let base = self.lock_state().cpu_time_base;
        Ok(if value >= 5 { (value - base).max(0) } else { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SystemInfo;

    fn config(app_memory_type: u8, regions: [u32; 3]) -> PlatformConfig {
        PlatformConfig::from_system_info(&SystemInfo {
            app_memory_type,
            memory_regions: regions,
            kip_count: 5,
            has_kernel_extension: false,
            stolen_system_memory: 0,
            core_version: 2,
            autolaunch_title: 0,
        })
    }

    #[test]
    fn old_model_default_layout() {
        let values = limit_values(&config(0, [0x400_0000, 0x2C0_0000, 0x140_0000]));
        assert_eq!(values[0][0], 0x400_0000);
        assert_eq!(values[1][0], 0x2C0_0000 - 0x60_0000);
        assert_eq!(values[2][0], 0x60_0000);
        assert_eq!(values[3][0], 0x140_0000 + 0x28_0000);
        // Static caps are untouched.
        assert_eq!(values[3][2], 202);
        assert_eq!(values[1][9], 10000);
    }

    #[test]
    fn excess_system_memory_is_redistributed() {
        let values = limit_values(&config(6, [0x7C0_0000, 0x680_0000, 0x200_0000]));
        let excess = 0x680_0000i64 - 0x640_0000;
        assert_eq!(values[1][0], 3 * excess / 4 + 0x680_0000 - 0x60_0000);
        assert_eq!(values[2][0], excess / 4 + 0x60_0000);
        assert_eq!(values[3][0], 0x200_0000 + 0x18_0000 + excess / 4);
        assert_eq!(values[3][2], 225);
    }

    #[test]
    fn small_system_region_starves_lib_applets() {
        let values = limit_values(&config(0, [0x400_0000, 0x100_0000, 0x140_0000]));
        assert_eq!(values[1][0], 0x100_0000 - 0x60_0000);
        assert_eq!(values[2][0], 0);
        assert_eq!(values[3][0], 0x140_0000 + 0x28_0000);
    }

    #[test]
    fn descriptor_cpu_time() {
        let multi = cpu_time_setting(0x0004_0000_0012_3400, 0x80 | 25);
        assert_eq!(multi.mode, SchedulingMode::Multi);
        assert_eq!(multi.max, 25);
        assert_eq!(multi.initial, 0);

        let single = cpu_time_setting(0x0004_0000_0012_3400, 0x9E00 | 30);
        assert_eq!(single.mode, SchedulingMode::Single);
        assert_eq!(single.max, 30);
    }

    #[test]
    fn zero_descriptor_defaults_and_overrides() {
        let plain = cpu_time_setting(0x0004_0000_0012_3400, 0);
        assert_eq!(plain, CpuTimeSetting { mode: SchedulingMode::Single, max: 80, initial: 0 });

        // Unique id 0x335 is one of the fixed-percentage legacy titles.
        let legacy = cpu_time_setting(0x0004_0000_0003_3500, 0);
        assert_eq!(legacy.initial, 30);
        assert_eq!(legacy.mode, SchedulingMode::Single);

        let exempt = cpu_time_setting(0x0004_0000_0004_9000, 0);
        assert_eq!(exempt.initial, 10000);

        // Unique ids between table entries get no override.
        let between = cpu_time_setting(0x0004_0000_0003_3700, 0);
        assert_eq!(between.initial, 0);
    }

    #[test]
    fn app_memory_override_rules() {
        let new = config(6, [0x7C0_0000, 0x640_0000, 0x200_0000]);
        let old = config(0, [0x400_0000, 0x2C0_0000, 0x140_0000]);
        let app = LaunchFlags::NORMAL_APPLICATION;
        let legacy_core = CoreInfo {
            new_system_mode: SystemMode::OldProd,
            old_system_mode: SystemMode::Dev2,
            ..CoreInfo::default()
        };
        let native_core = CoreInfo {
            new_system_mode: SystemMode::NewProd,
            ..CoreInfo::default()
        };

        assert_eq!(app_memory_override(&old, app, &legacy_core), None);
        assert_eq!(app_memory_override(&new, LaunchFlags::empty(), &legacy_core), None);
        assert_eq!(app_memory_override(&new, app, &native_core), None);
        assert_eq!(app_memory_override(&new, app, &legacy_core), Some(80 << 20));
        assert_eq!(
            app_memory_override(&new, app | LaunchFlags::FORCE_OLD_APP_MEMORY, &native_core),
            Some(64 << 20)
        );
        assert_eq!(
            app_memory_override(
                &new,
                app | LaunchFlags::FORCE_OLD_APP_MEMORY | LaunchFlags::FORCE_OLD_MAX_APP_MEMORY,
                &native_core
            ),
            Some(96 << 20)
        );
    }
}
