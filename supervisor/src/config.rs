//! Platform configuration.
//!
//! Build-time constants plus the facts read from the kernel once at boot.
//! Nothing here changes after [`crate::Supervisor::boot`] returns.

use std::time::Duration;

use crate::platform::{Pid, SystemInfo, TitleId};

// =============================================================================
// Build-time limits
// =============================================================================

/// Process table slots. Running out is a provisioning bug and aborts.
pub const PROCESS_TABLE_CAPACITY: usize = 0x40;

/// Bound on a flattened dependency closure.
pub const MAX_DEPENDENCIES: usize = 48;

/// Entries of a descriptor's service-access list that are honoured.
pub const MAX_SERVICE_ACCESS: usize = 34;

/// Descriptor scratch buffers shared by all supervisor threads.
pub const DESCRIPTOR_POOL_SIZE: usize = 8;

/// Size budget for a task handed to the task runner, in bytes.
pub const TASK_ARG_BUDGET: usize = 64;

/// Size of the firmlaunch parameter block.
pub const FIRMLAUNCH_PARAMS_SIZE: usize = 0x1000;

// =============================================================================
// Hard-wired processes
// =============================================================================

/// Dummy title id shared by every kernel built-in.
pub const KIP_TITLE_ID: TitleId = 0x0004_0001_0000_1000;

/// Built-ins below this pid are placed under the OTHER resource limit.
pub const KIP_RESLIMIT_PID_BOUND: Pid = 5;

pub const SUPERVISOR_PID: Pid = 2;
pub const SUPERVISOR_TITLE_ID: TitleId = 0x0004_0130_0000_1202;

/// Privileged I/O-routing process, terminated last on reboot.
pub const IO_ROUTER_PID: Pid = 4;

/// Kernel extension process, present when there are more than five built-ins.
pub const EXTENSION_PID: Pid = 5;
pub const EXTENSION_TITLE_ID: TitleId = 0x0004_0130_0000_6902;

/// Program handle used for filesystem grants to built-ins.
pub const KIP_PROGRAM_HANDLE: u64 = 0xFFFF_0000_0000_0000;

/// Unrestricted filesystem access mask.
pub const FULL_FS_ACCESS: u64 = 0xFFFF_FFFF;

// =============================================================================
// Timeouts
// =============================================================================

/// Extra grace period granted to the I/O router and the extension on reboot.
pub const ROLE_GRACE_PERIOD: Duration = Duration::from_millis(1500);

/// Drain budget before handing control to new firmware.
pub const FIRMLAUNCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(4);

// =============================================================================
// Title id layout
// =============================================================================

/// Bits of the low title word selecting the hardware-revision variant.
pub const NEW_MODEL_TITLE_MASK: TitleId = 0xF000_0000;
pub const NEW_MODEL_TITLE_BIT: TitleId = 0x2000_0000;

/// Application memory types at or above this value only exist on the newer
/// hardware revision.
const NEW_MODEL_APP_MEMORY_TYPE: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareRevision {
    Old,
    New,
}

/// Configuration derived from [`SystemInfo`] at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub revision: HardwareRevision,
    pub app_memory_type: u8,
    /// APPLICATION, SYSTEM and BASE region sizes.
    pub memory_regions: [u32; 3],
    pub kip_count: u32,
    pub has_kernel_extension: bool,
    pub stolen_system_memory: u32,
    pub core_version: u32,
    pub autolaunch_title: TitleId,
}

impl PlatformConfig {
    pub fn from_system_info(info: &SystemInfo) -> Self {
        let revision = if info.app_memory_type >= NEW_MODEL_APP_MEMORY_TYPE {
            HardwareRevision::New
        } else {
            HardwareRevision::Old
        };

        PlatformConfig {
            revision,
            app_memory_type: info.app_memory_type,
            memory_regions: info.memory_regions,
            kip_count: info.kip_count,
            has_kernel_extension: info.has_kernel_extension,
            stolen_system_memory: info.stolen_system_memory,
            core_version: info.core_version,
            autolaunch_title: info.autolaunch_title,
        }
    }

    pub fn is_new_model(&self) -> bool {
        self.revision == HardwareRevision::New
    }

    /// Whether the extension process (pid 5) was started by the kernel.
    pub fn has_extension_process(&self) -> bool {
        self.kip_count > EXTENSION_PID
    }

    /// Whether the application memory limit is adjusted per launch.
    pub fn manages_app_memory(&self) -> bool {
        self.is_new_model() && self.app_memory_type == NEW_MODEL_APP_MEMORY_TYPE
    }

    /// SYSTEM region size as seen by the resource limits. Memory stolen by the
    /// kernel extension is counted back in.
    pub fn system_memory(&self) -> u32 {
        let stolen = if self.has_kernel_extension {
            self.stolen_system_memory
        } else {
            0
        };
        self.memory_regions[1] + stolen
    }

    /// Rewrites a title id for the running hardware revision.
    pub fn variant_title(&self, title_id: TitleId) -> TitleId {
        if self.is_new_model() {
            (title_id & !NEW_MODEL_TITLE_MASK) | NEW_MODEL_TITLE_BIT
        } else {
            title_id
        }
    }
}

/// Strips the hardware-revision bits from a title id.
pub fn base_title(title_id: TitleId) -> TitleId {
    title_id & !NEW_MODEL_TITLE_MASK
}
