//! Starpath Supercharger (AR) implementation
//!
//! The Supercharger plugs into the cartridge port and holds 6K of RAM in
//! three 2K banks plus a 2K BIOS that loads programs from cassette. The
//! cartridge window is split into two 2K segments whose contents are picked
//! from a table of eight bank configurations.
//!
//! There are no dedicated write lines. Touching `$F000-$F0FF` latches the
//! low byte of the address into a data register, and the first access after
//! the write delay has elapsed commits it: to the control register if the
//! access is to `$FFF8`, otherwise to RAM at the accessed address when
//! writing is enabled.
//!
//! Bank numbers: 0 is the BIOS, 1-3 are the RAM banks.

mod bios;
mod tape;

pub use bios::{load_bios, search_bios, BIOS_NAMES, BIOS_SIZE};
pub use tape::{FastLoad, FastLoaded, Tape, TapeCounter, TapeState, LOAD_SIZE};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::cartridge::CartError;
use crate::config::CartConfig;
use crate::memory::CART_ORIGIN;
use crate::savestate::{MapperState, SuperchargerState};
use crate::util::check_bit;

use super::{
    mismatch, unsupported, BankInfo, CartMapper, HotspotInfo, HotspotKind, HotspotsBus, RamBus,
    RamRegion, Register, RegistersBus, TapeBus,
};

/// Cycles between latching a value and being able to commit it
pub const WRITE_DELAY: u8 = 4;

const CONTROL_REGISTER: u16 = 0xFF8;
const TAPE_TRIGGER: u16 = 0x850;
const LATCH_MEMTOP: u16 = 0x0FF;

const SEGMENT_SIZE: usize = 2048;
const RAM_BANKS: usize = 3;
const BIOS_BANK: usize = 0;

/// (lower, upper) segment contents for each bank configuration
const BANK_CONFIGS: [[usize; 2]; 8] = [
    [3, 0],
    [1, 0],
    [3, 1],
    [1, 3],
    [3, 0],
    [2, 0],
    [3, 2],
    [2, 3],
];

/// Latch and control register
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    /// Latched data byte
    pub value: u8,

    /// Cycles left before `value` may be committed
    pub delay: u8,

    /// `value` has not been committed yet
    pub pending: bool,

    /// Last value written to the control register
    pub control: u8,

    pub rom_power: bool,
    pub write_enabled: bool,
}

pub struct Supercharger {
    bios: Vec<u8>,

    /// RAM banks 1-3, stored from index 0
    ram: Vec<Vec<u8>>,

    registers: Registers,

    /// Bank shown in each segment
    segments: [usize; 2],

    tape: Box<dyn Tape>,

    /// Last fast load not yet collected by the CPU driver
    fastload: Option<FastLoaded>,
}

impl Supercharger {
    pub fn new(data: &[u8], bios: Vec<u8>, config: &CartConfig) -> Result<Self, CartError> {
        if bios.len() != BIOS_SIZE {
            return Err(CartError::Resource(format!(
                "Supercharger BIOS is {} bytes, expected {}",
                bios.len(),
                BIOS_SIZE
            )));
        }

        let mut cart = Supercharger {
            bios,
            ram: vec![vec![0; SEGMENT_SIZE]; RAM_BANKS],
            registers: Registers::default(),
            segments: BANK_CONFIGS[0],
            tape: Box::new(FastLoad::new(data)?),
            fastload: None,
        };
        cart.reset(config);
        Ok(cart)
    }

    fn set_control(&mut self, value: u8) {
        let config = ((value >> 2) & 0x07) as usize;
        self.registers.control = value;
        self.registers.rom_power = !check_bit(value, 0);
        self.registers.write_enabled = check_bit(value, 1);
        self.segments = BANK_CONFIGS[config];
        debug!(
            "AR control ${:02X}: config {} {:?}, ROM power {}, write {}",
            value, config, self.segments, self.registers.rom_power, self.registers.write_enabled
        );
    }

    #[inline]
    fn segment(addr: u16) -> usize {
        ((addr >> 11) & 1) as usize
    }

    fn fetch(&self, addr: u16) -> u8 {
        let offset = addr as usize % SEGMENT_SIZE;
        match self.segments[Self::segment(addr)] {
            BIOS_BANK if self.registers.rom_power => self.bios[offset],
            BIOS_BANK => 0,
            bank => self.ram[bank - 1][offset],
        }
    }

    fn write_ram(&mut self, addr: u16, value: u8) {
        match self.segments[Self::segment(addr)] {
            BIOS_BANK => trace!("AR write to BIOS at ${:03X} ignored", addr),
            bank => {
                trace!("AR RAM {} [{:03X}] = ${:02X}", bank, addr as usize % SEGMENT_SIZE, value);
                self.ram[bank - 1][addr as usize % SEGMENT_SIZE] = value;
            }
        }
    }

    /// Commit or latch on a bus access
    fn latch(&mut self, addr: u16) {
        if self.registers.pending && self.registers.delay == 0 {
            let value = self.registers.value;
            self.registers.pending = false;
            if addr == CONTROL_REGISTER {
                self.set_control(value);
            } else if self.registers.write_enabled {
                self.write_ram(addr, value);
            }
            return;
        }

        if addr <= LATCH_MEMTOP && !(self.registers.write_enabled && self.registers.pending) {
            self.registers.value = addr as u8;
            self.registers.pending = true;
            self.registers.delay = WRITE_DELAY;
        }
    }

    fn load_tape(&mut self) -> Result<(), CartError> {
        let event = self.tape.load(&mut self.ram)?;
        self.set_control(event.config);
        info!(
            "AR loaded multiload {} from tape, start ${:04X}",
            event.multiload, event.start_address
        );
        self.fastload = Some(event);
        Ok(())
    }

    fn access(&mut self, addr: u16) -> Result<u8, CartError> {
        if addr == TAPE_TRIGGER && self.segments[1] == BIOS_BANK && self.registers.rom_power {
            self.load_tape()?;
        }
        self.latch(addr);
        Ok(self.fetch(addr))
    }
}

impl CartMapper for Supercharger {
    fn id(&self) -> &'static str {
        "AR"
    }

    fn mapping(&self) -> String {
        "AR".to_string()
    }

    fn reset(&mut self, config: &CartConfig) {
        config.fill_banks(&mut self.ram, 0);
        self.registers = Registers::default();
        self.set_control(0);
        self.tape.rewind();
        self.fastload = None;
    }

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        self.access(addr)
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        Ok(self.fetch(addr))
    }

    /// The data bus is not connected, so a write is just another access
    fn write(&mut self, addr: u16, _data: u8) -> Result<(), CartError> {
        self.access(addr).map(|_| ())
    }

    fn poke(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        if self.segments[Self::segment(addr)] == BIOS_BANK {
            return Err(unsupported("poke BIOS", "AR"));
        }
        self.write_ram(addr, data);
        Ok(())
    }

    fn patch(&mut self, _offset: usize, _data: u8) -> Result<(), CartError> {
        Err(unsupported("patch", "AR"))
    }

    fn step(&mut self, _clock_mhz: f32) {
        if self.registers.pending && self.registers.delay > 0 {
            self.registers.delay -= 1;
        }
    }

    fn num_banks(&self) -> usize {
        RAM_BANKS + 1
    }

    fn get_bank(&self, addr: u16) -> BankInfo {
        let segment = Self::segment(addr);
        match self.segments[segment] {
            BIOS_BANK => BankInfo::rom(BIOS_BANK, segment),
            bank => BankInfo::ram(bank, segment),
        }
    }

    fn set_bank(&mut self, addr: u16, bank: usize) -> Result<(), CartError> {
        if bank > RAM_BANKS {
            return Err(CartError::InvalidBank {
                mapping: "AR".to_string(),
                bank,
                banks: RAM_BANKS + 1,
            });
        }
        self.segments[Self::segment(addr)] = bank;
        Ok(())
    }

    fn snapshot(&self) -> MapperState {
        MapperState::Supercharger(SuperchargerState {
            registers: self.registers.clone(),
            segments: self.segments,
            ram: self.ram.clone(),
            tape: self.tape.snapshot(),
        })
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        let MapperState::Supercharger(state) = state else {
            return Err(mismatch("AR", state));
        };
        if state.ram.len() != RAM_BANKS
            || state.ram.iter().any(|b| b.len() != SEGMENT_SIZE)
            || state.segments.iter().any(|&b| b > RAM_BANKS)
        {
            return Err(CartError::SnapshotMismatch {
                expected: format!("AR with {} RAM banks of {} bytes", RAM_BANKS, SEGMENT_SIZE),
                found: format!("{} RAM banks, segments {:?}", state.ram.len(), state.segments),
            });
        }
        self.tape.restore(&state.tape)?;
        self.registers = state.registers.clone();
        self.segments = state.segments;
        for (bank, saved) in self.ram.iter_mut().zip(state.ram.iter()) {
            bank.copy_from_slice(saved);
        }
        self.fastload = None;
        Ok(())
    }

    fn ram_bus(&mut self) -> Option<&mut dyn RamBus> {
        Some(self)
    }

    fn registers_bus(&mut self) -> Option<&mut dyn RegistersBus> {
        Some(self)
    }

    fn tape_bus(&mut self) -> Option<&mut dyn TapeBus> {
        Some(self)
    }

    fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        Some(self)
    }
}

impl RamBus for Supercharger {
    fn ram(&self) -> Vec<RamRegion> {
        self.ram
            .iter()
            .enumerate()
            .map(|(i, data)| {
                let segment = self.segments.iter().position(|&b| b == i + 1);
                let origin = CART_ORIGIN | (segment.unwrap_or(0) * SEGMENT_SIZE) as u16;
                RamRegion {
                    label: format!("RAM {}", i + 1),
                    read_origin: origin,
                    write_origin: origin,
                    mapped: segment.is_some(),
                    data: data.clone(),
                }
            })
            .collect()
    }

    fn put_ram(&mut self, region: usize, idx: usize, data: u8) -> Result<(), CartError> {
        match self.ram.get_mut(region).and_then(|bank| bank.get_mut(idx)) {
            Some(b) => {
                *b = data;
                Ok(())
            }
            None => Err(CartError::InvalidBank {
                mapping: "AR".to_string(),
                bank: region,
                banks: RAM_BANKS,
            }),
        }
    }
}

impl RegistersBus for Supercharger {
    fn registers(&self) -> Vec<Register> {
        let r = &self.registers;
        vec![
            Register { name: "control", value: r.control as u32 },
            Register { name: "value", value: r.value as u32 },
            Register { name: "delay", value: r.delay as u32 },
            Register { name: "pending", value: r.pending as u32 },
            Register { name: "rom_power", value: r.rom_power as u32 },
            Register { name: "write_enabled", value: r.write_enabled as u32 },
        ]
    }

    fn put_register(&mut self, name: &str, value: u32) -> Result<(), CartError> {
        match name {
            "control" => self.set_control(value as u8),
            "value" => {
                self.registers.value = value as u8;
                self.registers.pending = true;
            }
            "delay" => self.registers.delay = value as u8,
            _ => return Err(unsupported("put_register", format!("AR register {}", name))),
        }
        Ok(())
    }
}

impl TapeBus for Supercharger {
    fn tape_counter(&self) -> TapeCounter {
        self.tape.counter()
    }

    fn rewind(&mut self) {
        self.tape.rewind();
    }

    fn take_fastload(&mut self) -> Option<FastLoaded> {
        self.fastload.take()
    }
}

impl HotspotsBus for Supercharger {
    fn read_hotspots(&self) -> Vec<HotspotInfo> {
        vec![
            HotspotInfo { addr: CONTROL_REGISTER, kind: HotspotKind::Register, label: "control register" },
            HotspotInfo { addr: TAPE_TRIGGER, kind: HotspotKind::Function, label: "load from tape" },
        ]
    }

    fn write_hotspots(&self) -> Vec<HotspotInfo> {
        vec![HotspotInfo { addr: CONTROL_REGISTER, kind: HotspotKind::Register, label: "control register" }]
    }
}
