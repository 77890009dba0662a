//! Firmlaunch: handing control to another firmware image.
//!
//! The kernel keeps a 4 KiB parameter block alive across the warm reboot.
//! Callers read and write it through the supervisor; `launch_firm` stores
//! the block, drains the whole system and asks the kernel to jump.

use crate::config::{FIRMLAUNCH_DRAIN_TIMEOUT, FIRMLAUNCH_PARAMS_SIZE};
use crate::error::PmError;
use crate::Supervisor;

impl Supervisor {
    /// Returns the first `size` bytes of the parameter block (at most 4096).
    pub fn get_firmlaunch_params(&self, size: usize) -> Vec<u8> {
        let mut block = [0u8; FIRMLAUNCH_PARAMS_SIZE];
        self.kernel().read_firmlaunch_params(&mut block);
        block[..size.min(FIRMLAUNCH_PARAMS_SIZE)].to_vec()
    }

    /// Replaces the parameter block. Input past 4096 bytes is ignored, and a
    /// short block is zero-filled.
    pub fn set_firmlaunch_params(&self, params: &[u8]) {
        let mut block = [0u8; FIRMLAUNCH_PARAMS_SIZE];
        let len = params.len().min(FIRMLAUNCH_PARAMS_SIZE);
        block[..len].copy_from_slice(&params[..len]);
        self.kernel().write_firmlaunch_params(&block);
        log::debug!("FIRMLAUNCH_PARAMS: {} bytes stored", len);
    }

    /// Stores `params` and firmlaunches the firmware whose title id low
    /// word is `firm_title_low` once everything has been terminated.
    ///
    /// The jump happens on the task runner; the call returns immediately.
    pub fn launch_firm(&self, firm_title_low: u32, params: &[u8]) -> Result<(), PmError> {
        self.set_firmlaunch_params(params);
        self.tasks.run(move |sup: &Supervisor| {
            sup.terminate_all_processes(None, FIRMLAUNCH_DRAIN_TIMEOUT);

            let firm_title = sup.config.variant_title(u64::from(firm_title_low));
            log::info!("FIRMLAUNCH: jumping to {:#018x}", firm_title);
            if let Err(err) = sup.kernel().firmlaunch(firm_title) {
                panic!("firmlaunch to {:#018x} failed: {}", firm_title, err);
            }
        });
        Ok(())
    }
}
