//! Plain data exchanged with the kernel and the collaborator services.

use core::fmt;

/// Kernel-assigned process id.
pub type Pid = u32;

/// 64-bit title (program) identity. Not unique among live processes.
pub type TitleId = u64;

/// Raw kernel handle value, freely copyable. Used for waits and lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(pub u32);

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{:#x}", self.0)
    }
}

/// Owned kernel capability.
///
/// Not `Clone`: a handle is moved into exactly one owner and closed exactly
/// once through [`Kernel::close_handle`](super::Kernel::close_handle), which
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelHandle(RawHandle);

impl KernelHandle {
    pub fn from_raw(raw: RawHandle) -> Self {
        KernelHandle(raw)
    }

    pub fn raw(&self) -> RawHandle {
        self.0
    }
}

/// Loader-side token for a registered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MediaType {
    #[default]
    Nand,
    Sd,
    GameCard,
}

/// Identity of a program to register with the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramInfo {
    pub program_id: TitleId,
    pub media_type: MediaType,
}

impl ProgramInfo {
    pub const fn new(program_id: TitleId, media_type: MediaType) -> Self {
        ProgramInfo {
            program_id,
            media_type,
        }
    }

    /// System titles (dependencies, autolaunched modules) always live on NAND.
    pub const fn nand(program_id: TitleId) -> Self {
        ProgramInfo::new(program_id, MediaType::Nand)
    }
}

/// Memory configuration a program declares for each hardware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemMode {
    #[default]
    OldProd,
    NewProd,
    Dev1,
    Dev2,
    Dev3,
    Dev4,
}

/// Core placement and scheduling fields of a program descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreInfo {
    pub core_version: u32,
    pub old_system_mode: SystemMode,
    pub new_system_mode: SystemMode,
    pub ideal_processor: i32,
    pub affinity_mask: u8,
    pub priority: i32,
}

/// Code-set flags of a program descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemInfoFlags(pub u8);

/// Storage permissions handed to the filesystem registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageInfo {
    pub extdata_id: u64,
    pub system_savedata_ids: [u32; 2],
    pub fs_access_info: u64,
    pub other_attributes: u8,
}

/// Eight-byte service name, NUL padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ServiceName([u8; 8]);

impl ServiceName {
    /// Names longer than eight bytes are truncated.
    pub fn new(name: &str) -> Self {
        let mut raw = [0u8; 8];
        let len = name.len().min(raw.len());
        raw[..len].copy_from_slice(&name.as_bytes()[..len]);
        ServiceName(raw)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        core::str::from_utf8(&self.0[..len]).unwrap_or("<invalid>")
    }
}

impl fmt::Debug for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceName({:?})", self.as_str())
    }
}

/// Static metadata a program declares (extended header equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
    pub title_id: TitleId,
    pub core: CoreInfo,
    pub flags: SystemInfoFlags,
    pub stack_size: u32,
    /// Declared dependencies, zero entries terminate the list.
    pub dependencies: Vec<TitleId>,
    pub service_access: Vec<ServiceName>,
    pub storage: StorageInfo,
    /// Resource limit category (0..=3).
    pub reslimit_category: u8,
    /// Core-1 CPU time descriptor. Only the low byte is meaningful.
    pub cpu_time: u16,
}

impl Descriptor {
    /// Resets every field while keeping the list allocations.
    pub fn clear(&mut self) {
        self.title_id = 0;
        self.core = CoreInfo::default();
        self.flags = SystemInfoFlags::default();
        self.stack_size = 0;
        self.dependencies.clear();
        self.service_access.clear();
        self.storage = StorageInfo::default();
        self.reslimit_category = 0;
        self.cpu_time = 0;
    }
}

/// Initial thread parameters for `run_process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartupInfo {
    pub priority: i32,
    pub stack_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    /// Cleared by the wait that observes it
    OneShot,
    /// Stays signaled until explicitly cleared
    Sticky,
}

/// Resource kinds tracked by a kernel resource limit, by kernel numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Priority = 0,
    Commit = 1,
    Thread = 2,
    Event = 3,
    Mutex = 4,
    Semaphore = 5,
    Timer = 6,
    SharedMemory = 7,
    AddressArbiter = 8,
    CpuTime = 9,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Priority,
        ResourceKind::Commit,
        ResourceKind::Thread,
        ResourceKind::Event,
        ResourceKind::Mutex,
        ResourceKind::Semaphore,
        ResourceKind::Timer,
        ResourceKind::SharedMemory,
        ResourceKind::AddressArbiter,
        ResourceKind::CpuTime,
    ];

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Core-1 preemption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    /// Alternates sysmodule and application time slices
    Multi,
    /// Fixed 25ms slices, one application thread on core 1
    Single,
}

/// Boot-time facts reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    /// Application memory layout selector; 6 and above only exist on the
    /// newer hardware revision.
    pub app_memory_type: u8,
    /// APPLICATION, SYSTEM and BASE region sizes in bytes.
    pub memory_regions: [u32; 3],
    /// Number of processes the kernel started before the supervisor.
    pub kip_count: u32,
    pub has_kernel_extension: bool,
    /// SYSTEM memory reserved by the kernel extension.
    pub stolen_system_memory: u32,
    /// Kernel ABI version programs must be built for.
    pub core_version: u32,
    /// First system module to start at boot; 0 for none.
    pub autolaunch_title: TitleId,
}
