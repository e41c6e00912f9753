//! Cartridge configuration
//!
//! Values that influence how a cartridge is constructed and reset. A
//! `CartConfig` is handed to every mapper constructor; nothing in the crate
//! reads configuration from global state.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Application name used to build the default resource directory
pub const APP_NAME: &str = "vcs_cart";

/// Default number of coprocessor instructions allowed per activation
pub const DEFAULT_COPROCESSOR_CYCLE_LIMIT: usize = 1_000_000;

/// Configuration passed into cartridge and mapper constructors
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Seed used to randomise cartridge RAM on attach and reset.
    /// `None` leaves RAM zeroed.
    pub random_seed: Option<u64>,

    /// Directory searched last for companion files such as the
    /// Supercharger BIOS. `None` uses the platform data directory.
    pub resource_dir: Option<PathBuf>,

    /// Instructions a coprocessor may execute before it is considered stuck
    pub coprocessor_cycle_limit: usize,

    /// Whether PlusROM cartridges start with networking enabled
    pub plusrom_connected: bool,
}

impl Default for CartConfig {
    fn default() -> Self {
        CartConfig {
            random_seed: None,
            resource_dir: None,
            coprocessor_cycle_limit: DEFAULT_COPROCESSOR_CYCLE_LIMIT,
            plusrom_connected: true,
        }
    }
}

impl CartConfig {
    /// Configuration with RAM randomised from the given seed
    pub fn with_seed(seed: u64) -> Self {
        CartConfig {
            random_seed: Some(seed),
            ..Default::default()
        }
    }

    /// Fill a set of RAM banks according to the configured reset policy.
    ///
    /// One generator runs across all banks, so banks differ from each other.
    /// `salt` separates independent RAM blocks of the same cartridge. The
    /// same seed and salt always produce the same contents.
    pub fn fill_banks(&self, banks: &mut [Vec<u8>], salt: u64) {
        match self.random_seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15));
                for bank in banks.iter_mut() {
                    rng.fill(bank.as_mut_slice());
                }
            }
            None => banks.iter_mut().for_each(|bank| bank.fill(0)),
        }
    }

    /// Directory searched last for companion resources
    pub fn resource_path(&self) -> Option<PathBuf> {
        match &self.resource_dir {
            Some(dir) => Some(dir.clone()),
            None => dirs::data_local_dir().map(|d| d.join(APP_NAME).join("BIOS")),
        }
    }
}
