//! Cartridge port
//!
//! This module holds the `Cartridge` facade that the rest of an emulator talks
//! to. It owns exactly one mapper at a time, decides which mapper to build
//! when an image is attached, and routes every bus access to it. A cartridge
//! with nothing attached still answers the bus through the ejected stub.

use std::fmt;

use bitflags::bitflags;
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use ring::digest::{digest, SHA256};
use thiserror::Error;

use crate::config::CartConfig;
use crate::fingerprint;
use crate::loader::Loader;
use crate::mappers::plusrom::{PlusRom, PlusRomAddress};
use crate::mappers::{
    self, BankInfo, CartMapper, ContainerBus, CoprocessorBus, Ejected, HotspotsBus, RamBus,
    RegistersBus, TapeBus,
};
use crate::memory::{decode, Access};
use crate::savestate::Snapshot;

/// Reasons a bus access can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusFault {
    #[error("write to ROM")]
    WriteToRom,

    #[error("address does not select the cartridge")]
    NotCartridge,

    #[error("no cartridge attached")]
    Ejected,

    #[error("coprocessor is not driving the data bus")]
    NotDriven,
}

/// Errors raised by the cartridge and its mappers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("Bus error at ${0:04X}: {1}")]
    BusError(u16, BusFault),

    #[error("Unrecognised cartridge size: {0} bytes")]
    UnrecognisedSize(usize),

    #[error("Unrecognised mapping: {0}")]
    UnrecognisedMapping(String),

    #[error("{size} bytes is the wrong size for {mapping}")]
    WrongSize { mapping: String, size: usize },

    #[error("Bank {bank} is not valid for {mapping} ({banks} banks)")]
    InvalidBank {
        mapping: String,
        bank: usize,
        banks: usize,
    },

    #[error("Malformed {mapping} image: {reason}")]
    Malformed { mapping: String, reason: String },

    #[error("Snapshot does not match cartridge (expected {expected}, found {found})")]
    SnapshotMismatch { expected: String, found: String },

    #[error("Coprocessor error: {0}")]
    Coprocessor(String),

    #[error("{op} is not supported by {mapping}")]
    Unsupported { op: &'static str, mapping: String },

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Not a PlusROM: {0}")]
    NotPlusRom(String),
}

/// Broad classes of `CartError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A single access failed; the machine carries on
    Bus,

    /// The image or a snapshot is unusable
    Cartridge,

    /// The scheme does not implement the operation
    Unsupported,

    /// A companion file could not be used
    Resource,
}

impl CartError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CartError::BusError(..) => ErrorCategory::Bus,
            CartError::Unsupported { .. } => ErrorCategory::Unsupported,
            CartError::Resource(_) => ErrorCategory::Resource,
            CartError::UnrecognisedSize(_)
            | CartError::UnrecognisedMapping(_)
            | CartError::WrongSize { .. }
            | CartError::InvalidBank { .. }
            | CartError::Malformed { .. }
            | CartError::SnapshotMismatch { .. }
            | CartError::Coprocessor(_)
            | CartError::NotPlusRom(_) => ErrorCategory::Cartridge,
        }
    }
}

bitflags! {
    /// Optional capabilities of the attached mapper
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u16 {
        const RAM = 1 << 0;
        const REGISTERS = 1 << 1;
        const TAPE = 1 << 2;
        const COPROCESSOR = 1 << 3;
        const HOTSPOTS = 1 << 4;
        const CONTAINER = 1 << 5;
        const HOT_LOAD = 1 << 6;
        const BUS_STUFF = 1 << 7;
    }
}

impl Capabilities {
    /// Query a mapper for the capabilities it offers
    fn probe(mapper: &mut dyn CartMapper) -> Self {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::RAM, mapper.ram_bus().is_some());
        caps.set(Capabilities::REGISTERS, mapper.registers_bus().is_some());
        caps.set(Capabilities::TAPE, mapper.tape_bus().is_some());
        caps.set(Capabilities::COPROCESSOR, mapper.coprocessor_bus().is_some());
        caps.set(Capabilities::HOTSPOTS, mapper.hotspots_bus().is_some());
        caps.set(Capabilities::CONTAINER, mapper.container_bus().is_some());
        caps.set(Capabilities::HOT_LOAD, mapper.hot_loader().is_some());
        caps.set(Capabilities::BUS_STUFF, mapper.bus_stuffer().is_some());
        caps
    }
}

/// SHA-256 of an image as lowercase hex
pub fn content_hash(data: &[u8]) -> String {
    HEXLOWER.encode(digest(&SHA256, data).as_ref())
}

/// The cartridge port facade
pub struct Cartridge {
    /// Construction-time configuration
    config: CartConfig,

    /// The attached mapper, or the ejected stub
    mapper: Box<dyn CartMapper>,

    /// Name of the attached image
    filename: String,

    /// Content hash of the attached image
    hash: String,

    /// Capabilities resolved when the mapper was installed
    caps: Capabilities,
}

impl Cartridge {
    /// Create a cartridge port with nothing attached
    pub fn new(config: CartConfig) -> Self {
        let mut cart = Cartridge {
            config,
            mapper: Box::new(Ejected::new()),
            filename: String::new(),
            hash: String::new(),
            caps: Capabilities::empty(),
        };
        cart.caps = Capabilities::probe(cart.mapper.as_mut());
        cart
    }

    /// Attach an image, replacing whatever was attached before.
    ///
    /// On failure the cartridge is left ejected.
    pub fn attach(&mut self, loader: &Loader) -> Result<(), CartError> {
        self.eject();

        let mapping = match loader.mapping {
            Some(mapping) => mapping,
            None => {
                let mapping = fingerprint::identify(&loader.data)?;
                info!("Identified {} as {}", loader.name, mapping);
                mapping
            }
        };

        let mut mapper = mappers::create_mapper(mapping, loader, &self.config)?;

        if fingerprint::plusrom_candidate(&loader.data) {
            match PlusRomAddress::from_image(&loader.data) {
                Ok(address) => {
                    info!("PlusROM at {}", address);
                    mapper = Box::new(PlusRom::new(mapper, address, &self.config));
                }
                Err(e) => warn!("{}", e),
            }
        }

        self.caps = Capabilities::probe(mapper.as_mut());
        self.mapper = mapper;
        self.filename = loader.name.clone();
        self.hash = content_hash(&loader.data);

        info!(
            "Attached {}: mapping {}, {} banks, capabilities {:?}",
            self.filename,
            self.mapper.mapping(),
            self.mapper.num_banks(),
            self.caps
        );
        debug!("Content hash {}", self.hash);
        Ok(())
    }

    /// Remove the attached image
    pub fn eject(&mut self) {
        if !self.is_ejected() {
            info!("Ejected {}", self.filename);
        }
        self.mapper = Box::new(Ejected::new());
        self.filename.clear();
        self.hash.clear();
        self.caps = Capabilities::probe(self.mapper.as_mut());
    }

    /// Swap the ROM image of the attached cartridge without touching any
    /// other state
    pub fn hot_load(&mut self, loader: &Loader) -> Result<(), CartError> {
        let mapping = self.mapper.mapping();
        if !self.caps.contains(Capabilities::HOT_LOAD) {
            return Err(mappers::unsupported("hot load", mapping));
        }
        let loader_bus = self
            .mapper
            .hot_loader()
            .ok_or_else(|| mappers::unsupported("hot load", mapping))?;
        loader_bus.hot_load(&loader.data)?;

        self.hash = content_hash(&loader.data);
        info!("Hot loaded {} over {}", loader.name, self.filename);
        self.filename = loader.name.clone();
        Ok(())
    }

    /// Reinitialise volatile cartridge state
    pub fn reset(&mut self) {
        self.mapper.reset(&self.config);
    }

    pub fn is_ejected(&self) -> bool {
        self.mapper.id() == Ejected::ID
    }

    pub fn id(&self) -> &'static str {
        self.mapper.id()
    }

    pub fn mapping(&self) -> String {
        self.mapper.mapping()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn config(&self) -> &CartConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Decode an address and check that it selects the cartridge
    fn cart_address(addr: u16, access: Access) -> Result<u16, CartError> {
        let decoded = decode(addr, access);
        if decoded.area.is_cartridge() {
            Ok(decoded.offset)
        } else {
            Err(CartError::BusError(addr, BusFault::NotCartridge))
        }
    }

    /// Read from the cartridge as the CPU would
    pub fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        let offset = Self::cart_address(addr, Access::Read)?;
        self.mapper.read(offset)
    }

    /// Write to the cartridge as the CPU would
    pub fn write(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        let offset = Self::cart_address(addr, Access::Write)?;
        self.mapper.write(offset, data)
    }

    /// Read without side effects
    pub fn peek(&self, addr: u16) -> Result<u8, CartError> {
        let offset = Self::cart_address(addr, Access::Read)?;
        self.mapper.peek(offset)
    }

    /// Debugger write into cartridge RAM
    pub fn poke(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        let offset = Self::cart_address(addr, Access::Write)?;
        self.mapper.poke(offset, data)
    }

    /// Change a byte of the ROM image
    pub fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        self.mapper.patch(offset, data)
    }

    /// Let the cartridge observe a bus cycle
    pub fn access_passive(&mut self, addr: u16, data: u8) {
        self.mapper.access_passive(decode(addr, Access::Write).bus, data);
    }

    /// Advance by one CPU cycle
    pub fn step(&mut self, clock_mhz: f32) {
        self.mapper.step(clock_mhz);
    }

    /// Data the cartridge drove onto the bus during the last passive cycle
    pub fn bus_stuff(&mut self) -> Option<u8> {
        if !self.caps.contains(Capabilities::BUS_STUFF) {
            return None;
        }
        self.mapper.bus_stuffer().and_then(|b| b.bus_stuff())
    }

    pub fn num_banks(&self) -> usize {
        self.mapper.num_banks()
    }

    /// Bank mapped at a CPU address
    pub fn get_bank(&self, addr: u16) -> BankInfo {
        match Self::cart_address(addr, Access::Read) {
            Ok(offset) => self.mapper.get_bank(offset),
            Err(_) => BankInfo::non_cart(),
        }
    }

    /// Force the bank mapped at a CPU address
    pub fn set_bank(&mut self, addr: u16, bank: usize) -> Result<(), CartError> {
        let offset = Self::cart_address(addr, Access::Read)?;
        self.mapper.set_bank(offset, bank)
    }

    /// Capture the cartridge's volatile state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.hash.clone(), self.mapper.snapshot())
    }

    /// Restore state captured from the same image
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), CartError> {
        if snapshot.hash() != self.hash {
            return Err(CartError::SnapshotMismatch {
                expected: self.hash.clone(),
                found: snapshot.hash().to_string(),
            });
        }
        self.mapper.restore(snapshot.state())?;
        debug!("Restored {} state", self.mapper.mapping());
        Ok(())
    }

    pub fn ram_bus(&mut self) -> Option<&mut dyn RamBus> {
        if self.caps.contains(Capabilities::RAM) {
            self.mapper.ram_bus()
        } else {
            None
        }
    }

    pub fn registers_bus(&mut self) -> Option<&mut dyn RegistersBus> {
        if self.caps.contains(Capabilities::REGISTERS) {
            self.mapper.registers_bus()
        } else {
            None
        }
    }

    pub fn tape_bus(&mut self) -> Option<&mut dyn TapeBus> {
        if self.caps.contains(Capabilities::TAPE) {
            self.mapper.tape_bus()
        } else {
            None
        }
    }

    pub fn coprocessor_bus(&mut self) -> Option<&mut dyn CoprocessorBus> {
        if self.caps.contains(Capabilities::COPROCESSOR) {
            self.mapper.coprocessor_bus()
        } else {
            None
        }
    }

    pub fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        if self.caps.contains(Capabilities::HOTSPOTS) {
            self.mapper.hotspots_bus()
        } else {
            None
        }
    }

    pub fn container_bus(&mut self) -> Option<&mut dyn ContainerBus> {
        if self.caps.contains(Capabilities::CONTAINER) {
            self.mapper.container_bus()
        } else {
            None
        }
    }
}

impl fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cartridge")
            .field("filename", &self.filename)
            .field("mapping", &self.mapper.mapping())
            .field("hash", &self.hash)
            .field("banks", &self.mapper.num_banks())
            .field("capabilities", &self.caps)
            .finish()
    }
}
