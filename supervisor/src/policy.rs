//! Title-level launch policy.

use crate::config::{PlatformConfig, NEW_MODEL_TITLE_MASK};
use crate::platform::TitleId;

/// The stock error display would be launched on top of the extension's own
/// crash handling; it is silently skipped while the extension runs.
const ERROR_DISPLAY_TITLE: TitleId = 0x0004_0030_0000_8A02;

/// Title id high words of sysmodules and applets. Their low byte carries the
/// core version the title was built for.
const SYSTEM_TITLE_HIGH_WORDS: [u32; 2] = [0x0004_0030, 0x0004_0130];

pub fn is_launch_prevented(config: &PlatformConfig, title_id: TitleId) -> bool {
    config.has_extension_process()
        && title_id & !(NEW_MODEL_TITLE_MASK | 1) == ERROR_DISPLAY_TITLE
}

/// Refuses to bring up a system title built for another core version (the
/// safe-mode set).
///
/// # Panics
///
/// Panics on a mismatch; such a launch request means the caller is broken.
pub fn check_core_version(config: &PlatformConfig, title_id: TitleId) {
    let high = (title_id >> 32) as u32;
    let low = title_id as u32;
    if SYSTEM_TITLE_HIGH_WORDS.contains(&high) && low & 0xFF != config.core_version {
        panic!(
            "system title {:#018x} targets core version {}, running {}",
            title_id,
            low & 0xFF,
            config.core_version
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SystemInfo;

    fn config(kip_count: u32) -> PlatformConfig {
        PlatformConfig::from_system_info(&SystemInfo {
            app_memory_type: 0,
            memory_regions: [0x400_0000, 0x2C0_0000, 0x140_0000],
            kip_count,
            has_kernel_extension: kip_count > 5,
            stolen_system_memory: 0,
            core_version: 2,
            autolaunch_title: 0,
        })
    }

    #[test]
    fn error_display_blocked_only_with_extension() {
        assert!(!is_launch_prevented(&config(5), ERROR_DISPLAY_TITLE));
        assert!(is_launch_prevented(&config(6), ERROR_DISPLAY_TITLE));
        assert!(is_launch_prevented(&config(6), 0x0004_0030_2000_8A03));
        assert!(!is_launch_prevented(&config(6), 0x0004_0030_0000_8B02));
    }

    #[test]
    fn matching_core_version_passes() {
        check_core_version(&config(5), 0x0004_0130_0000_1502);
        // Applications carry no core version in their id.
        check_core_version(&config(5), 0x0004_0000_0012_3403);
    }

    #[test]
    #[should_panic(expected = "targets core version 3")]
    fn safe_mode_title_is_fatal() {
        check_core_version(&config(5), 0x0004_0130_0000_1503);
    }
}
