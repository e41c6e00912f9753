//! Mapper implementations for 2600 cartridges
//!
//! The 6507 can only see 4KB of cartridge space, so anything larger than that
//! relies on a bank-switching scheme built into the cartridge. This module
//! defines the contract every scheme implements plus the optional
//! capabilities some of them expose to tooling.

pub mod ace;
mod atari;
pub mod banking;
mod ejected;
mod mnetwork;
mod parker;
pub mod plusrom;
pub mod supercharger;
mod tigervision;

pub use ace::Ace;
pub use atari::Atari;
pub use ejected::Ejected;
pub use mnetwork::MNetwork;
pub use parker::Parker;
pub use plusrom::PlusRom;
pub use supercharger::Supercharger;
pub use tigervision::Tigervision;

use crate::cartridge::CartError;
use crate::config::CartConfig;
use crate::coprocessor::{YieldHook, YieldReason};
use crate::loader::{Loader, Mapping, Scheme};
use crate::savestate::MapperState;

use plusrom::Network;
use supercharger::{FastLoaded, TapeCounter};

/// Bank occupying part of the cartridge window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankInfo {
    /// Bank number within the scheme's pool
    pub number: usize,

    /// Segment of the window the bank is mapped into
    pub segment: usize,

    /// The bank is RAM rather than ROM
    pub is_ram: bool,

    /// The address is not cartridge space at all
    pub non_cart_space: bool,

    /// A coprocessor is answering the bus instead of plain memory
    pub coprocessor: bool,
}

impl BankInfo {
    pub fn rom(number: usize, segment: usize) -> Self {
        BankInfo {
            number,
            segment,
            ..Default::default()
        }
    }

    pub fn ram(number: usize, segment: usize) -> Self {
        BankInfo {
            number,
            segment,
            is_ram: true,
            ..Default::default()
        }
    }

    pub fn non_cart() -> Self {
        BankInfo {
            non_cart_space: true,
            ..Default::default()
        }
    }
}

/// Trait for cartridge mappers
///
/// Addresses are cartridge-local offsets (`0x000..=0xFFF`) except for
/// `access_passive`, which sees the full 13-bit bus address.
pub trait CartMapper {
    /// Short identifier of the scheme
    fn id(&self) -> &'static str;

    /// Mapping tag, including modifiers such as the superchip
    fn mapping(&self) -> String;

    /// Reinitialise volatile state
    fn reset(&mut self, config: &CartConfig);

    /// Read a byte as the CPU would. May have side effects.
    fn read(&mut self, addr: u16) -> Result<u8, CartError>;

    /// Read a byte without side effects
    fn peek(&self, addr: u16) -> Result<u8, CartError>;

    /// Write a byte as the CPU would
    fn write(&mut self, addr: u16, data: u8) -> Result<(), CartError>;

    /// Change a byte of cartridge RAM for a debugger
    fn poke(&mut self, addr: u16, data: u8) -> Result<(), CartError>;

    /// Change a byte of the ROM image. The offset is into the original image.
    fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError>;

    /// Observe a bus cycle that did not select the cartridge, or any cycle at
    /// all for schemes that snoop the bus
    fn access_passive(&mut self, _bus_addr: u16, _data: u8) {}

    /// Advance time by one CPU cycle
    fn step(&mut self, _clock_mhz: f32) {}

    /// Number of banks in the scheme's pool
    fn num_banks(&self) -> usize;

    /// Bank mapped at an address
    fn get_bank(&self, addr: u16) -> BankInfo;

    /// Force the bank mapped at an address
    fn set_bank(&mut self, addr: u16, bank: usize) -> Result<(), CartError>;

    /// Capture volatile state
    fn snapshot(&self) -> MapperState;

    /// Restore volatile state captured from the same scheme
    fn restore(&mut self, state: &MapperState) -> Result<(), CartError>;

    fn ram_bus(&mut self) -> Option<&mut dyn RamBus> {
        None
    }

    fn registers_bus(&mut self) -> Option<&mut dyn RegistersBus> {
        None
    }

    fn tape_bus(&mut self) -> Option<&mut dyn TapeBus> {
        None
    }

    fn coprocessor_bus(&mut self) -> Option<&mut dyn CoprocessorBus> {
        None
    }

    fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        None
    }

    fn container_bus(&mut self) -> Option<&mut dyn ContainerBus> {
        None
    }

    fn hot_loader(&mut self) -> Option<&mut dyn HotLoader> {
        None
    }

    fn bus_stuffer(&mut self) -> Option<&mut dyn BusStuffer> {
        None
    }
}

/// A region of cartridge RAM as seen by tooling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamRegion {
    pub label: String,

    /// Address of the read port in the canonical cartridge space
    pub read_origin: u16,

    /// Address of the write port in the canonical cartridge space
    pub write_origin: u16,

    /// The region is currently visible to the CPU
    pub mapped: bool,

    pub data: Vec<u8>,
}

/// Enumerate and modify cartridge RAM
pub trait RamBus {
    fn ram(&self) -> Vec<RamRegion>;

    /// Change byte `idx` of region `region`, numbered as returned by `ram`
    fn put_ram(&mut self, region: usize, idx: usize, data: u8) -> Result<(), CartError>;
}

/// A named cartridge register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: &'static str,
    pub value: u32,
}

/// Inspect and modify cartridge registers
pub trait RegistersBus {
    fn registers(&self) -> Vec<Register>;

    fn put_register(&mut self, name: &str, value: u32) -> Result<(), CartError>;
}

/// Control a cartridge tape
pub trait TapeBus {
    fn tape_counter(&self) -> TapeCounter;

    fn rewind(&mut self);

    /// Most recent fast-load event, cleared on read
    fn take_fastload(&mut self) -> Option<FastLoaded>;
}

/// Inspect a cartridge coprocessor
pub trait CoprocessorBus {
    /// Name of the coprocessor core
    fn coproc_id(&self) -> &'static str;

    fn coproc_registers(&self) -> [u32; 16];

    /// Read a word of coprocessor memory without side effects
    fn coproc_read32(&self, addr: u32) -> Option<u32>;

    /// Reason for the most recent yield
    fn last_yield(&self) -> Option<YieldReason>;

    /// Called every time the coprocessor yields back to the 6507
    fn set_yield_hook(&mut self, hook: Option<YieldHook>);

    fn set_breakpoints_enabled(&mut self, enabled: bool);

    fn add_breakpoint(&mut self, addr: u32);

    fn remove_breakpoint(&mut self, addr: u32);
}

/// What touching a hotspot does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotspotKind {
    /// Selects a ROM or RAM bank
    Bankswitch,

    /// Sets a cartridge register
    Register,

    /// Starts a peripheral action such as loading from tape
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotspotInfo {
    pub addr: u16,
    pub kind: HotspotKind,
    pub label: &'static str,
}

/// List the hotspots of a scheme
pub trait HotspotsBus {
    fn read_hotspots(&self) -> Vec<HotspotInfo>;

    fn write_hotspots(&self) -> Vec<HotspotInfo>;
}

/// Identify a container wrapped around another mapper
pub trait ContainerBus {
    fn container_id(&self) -> &'static str;

    /// Mapping of the wrapped mapper
    fn contained_mapping(&self) -> String;

    fn network(&mut self) -> Option<&mut Network> {
        None
    }
}

/// Replace the ROM image without resetting anything else
pub trait HotLoader {
    fn hot_load(&mut self, image: &[u8]) -> Result<(), CartError>;
}

/// Report data a cartridge drove onto the bus during a passive cycle
pub trait BusStuffer {
    fn bus_stuff(&mut self) -> Option<u8>;
}

/// Create a mapper for a mapping
pub fn create_mapper(
    mapping: Mapping,
    loader: &Loader,
    config: &CartConfig,
) -> Result<Box<dyn CartMapper>, CartError> {
    let data = &loader.data;
    let mapper: Box<dyn CartMapper> = match mapping.scheme {
        Scheme::Atari2K | Scheme::Atari4K | Scheme::F8 | Scheme::F6 | Scheme::F4 => {
            Box::new(Atari::new(mapping, data, config)?)
        }
        Scheme::E0 => Box::new(Parker::new(data)?),
        Scheme::Tigervision => Box::new(Tigervision::new(data)?),
        Scheme::E7 => Box::new(MNetwork::new(data, config)?),
        Scheme::Supercharger => {
            let bios = supercharger::load_bios(loader, config)?;
            Box::new(Supercharger::new(data, bios, config)?)
        }
        Scheme::Ace => Box::new(Ace::new(data, config)?),
    };
    Ok(mapper)
}

/// Build a hotspot listing from a declarative table
pub(crate) fn describe<A>(table: &[banking::Hotspot<A>], kind: HotspotKind) -> Vec<HotspotInfo> {
    table
        .iter()
        .map(|h| HotspotInfo {
            addr: h.addr,
            kind,
            label: h.label,
        })
        .collect()
}

/// Error for a scheme that rejects an operation
pub(crate) fn unsupported(op: &'static str, mapping: impl Into<String>) -> CartError {
    CartError::Unsupported {
        op,
        mapping: mapping.into(),
    }
}

/// Error for a snapshot taken of a different scheme
pub(crate) fn mismatch(expected: &str, state: &MapperState) -> CartError {
    CartError::SnapshotMismatch {
        expected: expected.to_string(),
        found: state.name().to_string(),
    }
}
