//! Error types for the supervisor.
//!
//! Every failure that can cross the IPC boundary is a [`PmError`], which maps
//! onto the platform's packed 32-bit [`ResultCode`]. Kernel primitive failures
//! are [`KernelError`]s and collaborator services (loader, filesystem
//! registrar, service broker) report raw result codes.

use core::fmt;

/// Packed platform result word: level (bits 27..31), summary (21..26),
/// module (10..17) and description (0..9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(u32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);

    pub const LEVEL_PERMANENT: u32 = 0x1B;
    pub const LEVEL_TEMPORARY: u32 = 0x1A;
    pub const SUMMARY_NOT_FOUND: u32 = 4;
    pub const MODULE_PM: u32 = 22;
    pub const DESCRIPTION_TIMEOUT: u32 = 0x3FE;

    /// Returned by the broker when a process' notification queue overflows.
    pub const NOTIFICATION_QUEUE_FULL: ResultCode = ResultCode(0xD860_6408);

    pub const fn new(level: u32, summary: u32, module: u32, description: u32) -> Self {
        ResultCode(
            ((level & 0x1F) << 27)
                | ((summary & 0x3F) << 21)
                | ((module & 0xFF) << 10)
                | (description & 0x3FF),
        )
    }

    pub const fn from_raw(raw: u32) -> Self {
        ResultCode(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn level(self) -> u32 {
        self.0 >> 27
    }

    pub const fn summary(self) -> u32 {
        (self.0 >> 21) & 0x3F
    }

    pub const fn module(self) -> u32 {
        (self.0 >> 10) & 0xFF
    }

    pub const fn description(self) -> u32 {
        self.0 & 0x3FF
    }

    pub const fn is_success(self) -> bool {
        (self.0 as i32) >= 0
    }

    pub const fn is_not_found(self) -> bool {
        self.summary() == Self::SUMMARY_NOT_FOUND
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

/// Failures of kernel primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A bounded wait expired
    Timeout,
    /// The handle does not name a live kernel object
    InvalidHandle,
    /// The target object (usually a process) no longer exists
    NotFound,
    /// The kernel ran out of objects of the requested kind
    OutOfResource,
    /// Any other kernel result
    Other(ResultCode),
}

impl KernelError {
    pub fn result_code(self) -> ResultCode {
        match self {
            KernelError::Timeout => ResultCode::from_raw(0x0940_1BFE),
            KernelError::InvalidHandle => ResultCode::from_raw(0xD8E0_07F7),
            KernelError::NotFound => ResultCode::from_raw(0xD880_07FA),
            KernelError::OutOfResource => ResultCode::from_raw(0xD860_07F3),
            KernelError::Other(code) => code,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Timeout => write!(f, "wait timed out"),
            KernelError::InvalidHandle => write!(f, "invalid handle"),
            KernelError::NotFound => write!(f, "kernel object not found"),
            KernelError::OutOfResource => write!(f, "out of kernel resources"),
            KernelError::Other(code) => write!(f, "kernel error {}", code),
        }
    }
}

/// Errors returned by supervisor operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmError {
    /// A reboot is in progress; new termination and reboot requests are refused
    AlreadyRebooting,
    /// At most one normal application may run at a time
    ApplicationAlreadyRunning,
    /// The program was built for a different kernel ABI version
    CoreVersionMismatch,
    /// A process is already queued for debugging
    DebugSlotOccupied,
    /// No process is queued for debugging
    NoQueuedProcess,
    /// Malformed request argument
    InvalidArgument,
    /// Launch flag word rejected for this command
    InvalidLaunchFlags,
    /// The title requires a system update before it can run
    BatchUpdateRequired,
    /// No matching process
    NotFound,
    /// The process record disappeared while an operation was in flight
    ProcessGone,
    /// A collaborator service (loader, filesystem registrar, broker) failed
    Service(ResultCode),
    /// A kernel primitive failed
    Kernel(KernelError),
    /// A supervisor thread could not be started
    ThreadSpawn,
}

impl PmError {
    /// The result code reported to IPC callers.
    pub fn result_code(self) -> ResultCode {
        match self {
            PmError::AlreadyRebooting => ResultCode::from_raw(0xC8A0_5801),
            PmError::ApplicationAlreadyRunning => ResultCode::from_raw(0xC8A0_5BF0),
            PmError::CoreVersionMismatch => ResultCode::from_raw(0xC8A0_5800),
            PmError::DebugSlotOccupied => ResultCode::from_raw(0xD8A0_5805),
            PmError::NoQueuedProcess => ResultCode::from_raw(0xD8A0_5804),
            PmError::InvalidArgument => ResultCode::from_raw(0xD8E0_5BF4),
            PmError::InvalidLaunchFlags => ResultCode::from_raw(0xD8E0_5802),
            PmError::BatchUpdateRequired => ResultCode::from_raw(0xD8E0_5803),
            PmError::NotFound | PmError::ProcessGone => ResultCode::new(
                ResultCode::LEVEL_TEMPORARY,
                ResultCode::SUMMARY_NOT_FOUND,
                ResultCode::MODULE_PM,
                0x100,
            ),
            PmError::Service(code) => code,
            PmError::Kernel(err) => err.result_code(),
            PmError::ThreadSpawn => KernelError::OutOfResource.result_code(),
        }
    }
}

impl fmt::Display for PmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PmError::AlreadyRebooting => write!(f, "system is preparing for reboot"),
            PmError::ApplicationAlreadyRunning => write!(f, "an application is already running"),
            PmError::CoreVersionMismatch => {
                write!(f, "program core version does not match the kernel")
            }
            PmError::DebugSlotOccupied => write!(f, "a process is already queued for debugging"),
            PmError::NoQueuedProcess => write!(f, "no process is queued for debugging"),
            PmError::InvalidArgument => write!(f, "invalid argument"),
            PmError::InvalidLaunchFlags => write!(f, "invalid launch flags"),
            PmError::BatchUpdateRequired => write!(f, "title requires a batch update"),
            PmError::NotFound => write!(f, "process not found"),
            PmError::ProcessGone => write!(f, "process exited during the operation"),
            PmError::Service(code) => write!(f, "service call failed with {}", code),
            PmError::Kernel(err) => write!(f, "{}", err),
            PmError::ThreadSpawn => write!(f, "failed to spawn supervisor thread"),
        }
    }
}

impl std::error::Error for PmError {}

impl From<KernelError> for PmError {
    fn from(err: KernelError) -> Self {
        PmError::Kernel(err)
    }
}

impl From<ResultCode> for PmError {
    fn from(code: ResultCode) -> Self {
        PmError::Service(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_code_matches_platform_layout() {
        let code = PmError::NotFound.result_code();
        assert_eq!(code.raw(), 0xD080_5900);
        assert_eq!(code.module(), ResultCode::MODULE_PM);
        assert_eq!(code.description(), 0x100);
        assert!(code.is_not_found());
        assert!(!code.is_success());
    }

    #[test]
    fn caller_errors_have_distinct_codes() {
        let errors = [
            PmError::AlreadyRebooting,
            PmError::ApplicationAlreadyRunning,
            PmError::CoreVersionMismatch,
            PmError::DebugSlotOccupied,
            PmError::NoQueuedProcess,
            PmError::InvalidArgument,
            PmError::InvalidLaunchFlags,
            PmError::BatchUpdateRequired,
            PmError::NotFound,
        ];
        for (i, a) in errors.iter().enumerate() {
            for b in &errors[i + 1..] {
                assert_ne!(a.result_code(), b.result_code(), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn kernel_not_found_is_a_not_found_summary() {
        assert!(KernelError::NotFound.result_code().is_not_found());
        assert_eq!(
            KernelError::Timeout.result_code().description(),
            ResultCode::DESCRIPTION_TIMEOUT
        );
        assert!(!ResultCode::NOTIFICATION_QUEUE_FULL.is_not_found());
    }

    #[test]
    fn service_errors_pass_their_code_through() {
        let code = ResultCode::from_raw(0xC880_4478);
        assert_eq!(PmError::from(code).result_code(), code);
        assert_eq!(format!("{}", code), "0xC8804478");
    }
}
