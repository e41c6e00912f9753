//! vcs_cart - Atari 2600 cartridge port emulation
//!
//! Everything the 6507 sees through the cartridge slot: scheme
//! fingerprinting, the bank-switching mappers, the Supercharger tape
//! interface, the ARM coprocessor of ACE cartridges and the PlusROM
//! network container. The rest of an emulator talks to a single
//! [`Cartridge`].

pub mod cartridge;
pub mod config;
pub mod coprocessor;
pub mod fingerprint;
pub mod loader;
pub mod mappers;
pub mod memory;
pub mod savestate;
pub mod util;

pub use cartridge::{BusFault, Capabilities, CartError, Cartridge, ErrorCategory};
pub use config::CartConfig;
pub use loader::{Loader, Mapping, Scheme};
pub use mappers::{BankInfo, CartMapper};
pub use savestate::{MapperState, Snapshot};
