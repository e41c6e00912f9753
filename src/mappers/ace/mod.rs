//! ACE ARM coprocessor cartridge
//!
//! The cartridge is an ARM microcontroller wired straight to the cartridge
//! port. The 6507 side presents each bus address through a GPIO port and the
//! driver program running on the ARM decides what to put on the data bus.
//! The driver runs until it asks for an address it has already seen, at
//! which point control returns to the 6507 until the next bus cycle.
//!
//! Image header (little endian):
//! - 0x00: magic "ACE-2600"
//! - 0x08: driver name, 16 bytes, NUL padded
//! - 0x18: driver version
//! - 0x1C: ROM size
//! - 0x20: checksum
//! - 0x24: entry point (Thumb address in flash)

mod bus;

pub use bus::Gpio;
pub use bus::{ADDR_IDR, DATA_IDR, DATA_MODER, DATA_ODR, FLASH_ORIGIN, PROGRAM_END, SRAM_ORIGIN, SRAM_SIZE};

use log::{debug, info, warn};

use crate::cartridge::{BusFault, CartError};
use crate::config::CartConfig;
use crate::coprocessor::{Thumb, YieldHook, YieldReason};
use crate::memory::{CART_ORIGIN, CART_SELECT};
use crate::savestate::{AceState, MapperState};
use crate::util::read_u32_le;

use self::bus::{peek_word, AceBus};
use super::{mismatch, unsupported, BankInfo, BusStuffer, CartMapper, CoprocessorBus, Register, RegistersBus};

/// Magic at the start of every ACE image
pub const MAGIC: &[u8; 8] = b"ACE-2600";

const HEADER_SIZE: usize = 0x28;

const REGISTER_NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp", "lr", "pc",
];

/// Fields of the ACE image header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AceHeader {
    pub driver_name: String,
    pub driver_version: u32,
    pub rom_size: u32,
    pub checksum: u32,
    pub entry: u32,
}

impl AceHeader {
    pub fn parse(data: &[u8]) -> Result<Self, CartError> {
        let malformed = |reason: String| CartError::Malformed {
            mapping: "ACE".to_string(),
            reason,
        };

        if data.len() < HEADER_SIZE {
            return Err(malformed(format!("{} bytes is too short for the header", data.len())));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(malformed("missing ACE-2600 magic".to_string()));
        }

        let name = &data[0x08..0x18];
        let name_len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let header = AceHeader {
            driver_name: String::from_utf8_lossy(&name[..name_len]).into_owned(),
            driver_version: read_u32_le(data, 0x18),
            rom_size: read_u32_le(data, 0x1C),
            checksum: read_u32_le(data, 0x20),
            entry: read_u32_le(data, 0x24),
        };

        if header.rom_size as usize > data.len() {
            return Err(malformed(format!(
                "header claims {} bytes but image has {}",
                header.rom_size,
                data.len()
            )));
        }

        let entry = header.entry & !1;
        let flash_end = FLASH_ORIGIN as u64 + data.len() as u64;
        if header.entry & 1 == 0 || (entry as u64) < FLASH_ORIGIN as u64 + HEADER_SIZE as u64 || entry as u64 >= flash_end {
            return Err(malformed(format!("entry point {:08X} is not Thumb code in flash", header.entry)));
        }

        Ok(header)
    }
}

pub struct Ace {
    /// Flash contents: the whole image
    flash: Vec<u8>,

    sram: Vec<u8>,
    gpio: Gpio,
    arm: Thumb,

    /// Instructions allowed per activation
    cycle_limit: usize,

    /// Set once the driver has finished or faulted
    halted: Option<YieldReason>,

    last_yield: Option<YieldReason>,

    /// Data driven during the last passive cycle
    stuffed: Option<u8>,

    yield_hook: Option<YieldHook>,
}

impl Ace {
    pub fn new(data: &[u8], config: &CartConfig) -> Result<Self, CartError> {
        let header = AceHeader::parse(data)?;
        info!(
            "ACE driver \"{}\" version {}, entry {:08X}",
            header.driver_name, header.driver_version, header.entry
        );
        debug!("ACE header checksum {:08X}, ROM size {}", header.checksum, header.rom_size);

        let stack_top = SRAM_ORIGIN + SRAM_SIZE as u32;
        let mut cart = Ace {
            arm: Thumb::new(header.entry, stack_top, PROGRAM_END),
            flash: data.to_vec(),
            sram: vec![0; SRAM_SIZE],
            gpio: Gpio::default(),
            cycle_limit: config.coprocessor_cycle_limit,
            halted: None,
            last_yield: None,
            stuffed: None,
            yield_hook: None,
        };
        cart.reset(config);
        Ok(cart)
    }

    /// Run the driver until it yields
    fn resume(&mut self) -> Result<(), CartError> {
        if self.halted.is_some() {
            return Ok(());
        }

        let reason = {
            let mut bus = AceBus::new(&self.flash, &mut self.sram, &mut self.gpio);
            self.arm.run(&mut bus, self.cycle_limit)
        };
        let pc = self.arm.pc();
        self.last_yield = Some(reason);
        if let Some(hook) = self.yield_hook.as_mut() {
            hook(reason, pc);
        }

        match reason {
            YieldReason::ProgramEnded => {
                info!("ACE driver finished");
                self.halted = Some(reason);
                Ok(())
            }
            YieldReason::Runaway => {
                warn!("ACE driver ran {} instructions without yielding", self.cycle_limit);
                Err(CartError::Coprocessor(format!("runaway at {:08X}", pc)))
            }
            fault if fault.is_error() => {
                warn!("ACE driver stopped: {:?} at {:08X}", fault, pc);
                self.halted = Some(fault);
                Err(CartError::Coprocessor(format!("{:?} at {:08X}", fault, pc)))
            }
            _ => Ok(()),
        }
    }

    fn driven(&self, addr: u16) -> Result<u8, CartError> {
        if self.gpio.driving() {
            Ok(self.gpio.output())
        } else {
            Err(CartError::BusError(CART_ORIGIN | addr, BusFault::NotDriven))
        }
    }
}

impl CartMapper for Ace {
    fn id(&self) -> &'static str {
        "ACE"
    }

    fn mapping(&self) -> String {
        "ACE".to_string()
    }

    fn reset(&mut self, _config: &CartConfig) {
        self.sram.fill(0);
        self.gpio = Gpio::default();
        self.arm.reset();
        self.halted = None;
        self.last_yield = None;
        self.stuffed = None;
    }

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        self.gpio.present(CART_ORIGIN | addr, None);
        self.resume()?;
        self.driven(addr)
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        self.driven(addr)
    }

    fn write(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        self.gpio.present(CART_ORIGIN | addr, Some(data));
        self.resume()
    }

    fn poke(&mut self, _addr: u16, _data: u8) -> Result<(), CartError> {
        Err(unsupported("poke", "ACE"))
    }

    fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        match self.flash.get_mut(offset) {
            Some(b) => {
                *b = data;
                Ok(())
            }
            None => Err(CartError::Malformed {
                mapping: "ACE".to_string(),
                reason: format!("patch offset {:#x} is beyond the end of the image", offset),
            }),
        }
    }

    fn access_passive(&mut self, bus_addr: u16, data: u8) {
        if bus_addr & CART_SELECT != 0 {
            return;
        }
        self.gpio.present(bus_addr, Some(data));
        // failures are already logged and a passive cycle has nobody to report to
        let _ = self.resume();
        self.stuffed = self.gpio.driving().then(|| self.gpio.output());
    }

    fn num_banks(&self) -> usize {
        1
    }

    fn get_bank(&self, _addr: u16) -> BankInfo {
        BankInfo {
            coprocessor: true,
            ..Default::default()
        }
    }

    fn set_bank(&mut self, _addr: u16, bank: usize) -> Result<(), CartError> {
        if bank == 0 {
            Ok(())
        } else {
            Err(CartError::InvalidBank {
                mapping: "ACE".to_string(),
                bank,
                banks: 1,
            })
        }
    }

    fn snapshot(&self) -> MapperState {
        MapperState::Ace(Box::new(AceState {
            arm: self.arm.state().clone(),
            sram: self.sram.clone(),
            gpio: self.gpio.clone(),
            halted: self.halted,
            last_yield: self.last_yield,
            stuffed: self.stuffed,
        }))
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        let MapperState::Ace(state) = state else {
            return Err(mismatch("ACE", state));
        };
        if state.sram.len() != self.sram.len() {
            return Err(CartError::SnapshotMismatch {
                expected: format!("{} bytes of SRAM", self.sram.len()),
                found: format!("{} bytes", state.sram.len()),
            });
        }
        self.arm.restore(&state.arm);
        self.sram.copy_from_slice(&state.sram);
        self.gpio = state.gpio.clone();
        self.halted = state.halted;
        self.last_yield = state.last_yield;
        self.stuffed = state.stuffed;
        Ok(())
    }

    fn registers_bus(&mut self) -> Option<&mut dyn RegistersBus> {
        Some(self)
    }

    fn coprocessor_bus(&mut self) -> Option<&mut dyn CoprocessorBus> {
        Some(self)
    }

    fn bus_stuffer(&mut self) -> Option<&mut dyn BusStuffer> {
        Some(self)
    }
}

impl RegistersBus for Ace {
    fn registers(&self) -> Vec<Register> {
        let mut registers: Vec<Register> = REGISTER_NAMES
            .iter()
            .zip(self.arm.registers())
            .map(|(&name, value)| Register { name, value })
            .collect();
        registers.push(Register { name: "ADDR_IDR", value: self.gpio.address as u32 });
        registers.push(Register { name: "DATA_IDR", value: self.gpio.data_in as u32 });
        registers.push(Register { name: "DATA_ODR", value: self.gpio.data_out });
        registers.push(Register { name: "DATA_MODER", value: self.gpio.data_moder });
        registers
    }

    fn put_register(&mut self, name: &str, value: u32) -> Result<(), CartError> {
        if let Some(n) = REGISTER_NAMES.iter().position(|&r| r.eq_ignore_ascii_case(name)) {
            self.arm.set_register(n, value);
            return Ok(());
        }
        match name.to_ascii_uppercase().as_str() {
            "DATA_ODR" => self.gpio.data_out = value,
            "DATA_MODER" => self.gpio.data_moder = value,
            _ => return Err(unsupported("unknown register", "ACE")),
        }
        Ok(())
    }
}

impl CoprocessorBus for Ace {
    fn coproc_id(&self) -> &'static str {
        "ARM7TDMI"
    }

    fn coproc_registers(&self) -> [u32; 16] {
        self.arm.registers()
    }

    fn coproc_read32(&self, addr: u32) -> Option<u32> {
        peek_word(&self.flash, &self.sram, &self.gpio, addr)
    }

    fn last_yield(&self) -> Option<YieldReason> {
        self.last_yield
    }

    fn set_yield_hook(&mut self, hook: Option<YieldHook>) {
        self.yield_hook = hook;
    }

    fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.arm.set_breakpoints_enabled(enabled);
    }

    fn add_breakpoint(&mut self, addr: u32) {
        self.arm.add_breakpoint(addr);
    }

    fn remove_breakpoint(&mut self, addr: u32) {
        self.arm.remove_breakpoint(addr);
    }
}

impl BusStuffer for Ace {
    fn bus_stuff(&mut self) -> Option<u8> {
        self.stuffed.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Image with a header and a Thumb driver at offset 0x28
    fn image(program: &[u16], literals: &[u32]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        let mut name = [0u8; 16];
        name[..4].copy_from_slice(b"echo");
        data.extend_from_slice(&name);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&(FLASH_ORIGIN + HEADER_SIZE as u32 + 1).to_le_bytes());
        for op in program {
            data.extend_from_slice(&op.to_le_bytes());
        }
        for word in literals {
            data.extend_from_slice(&word.to_le_bytes());
        }
        data
    }

    /// Driver that echoes the low byte of every bus address onto the data bus
    fn echo_driver() -> Vec<u8> {
        image(
            &[
                0x4C04, // LDR r4, =0x40020000
                0x4805, // LDR r0, =0x5555
                0x2304, // MOVS r3, #4
                0x021B, // LSLS r3, r3, #8
                0x18E5, // ADDS r5, r4, r3
                0x6028, // STR r0, [r5, #0]     DATA_MODER
                0x6921, // LDR r1, [r4, #0x10]  ADDR_IDR
                0x6169, // STR r1, [r5, #0x14]  DATA_ODR
                0xE7FC, // B back to the ADDR_IDR load
                0x46C0, // NOP
            ],
            &[0x4002_0000, 0x0000_5555],
        )
    }

    #[test]
    fn header_is_parsed() {
        let header = AceHeader::parse(&echo_driver()).unwrap();
        assert_eq!(header.driver_name, "echo");
        assert_eq!(header.driver_version, 1);
        assert_eq!(header.entry, FLASH_ORIGIN + 0x29);
    }

    #[test]
    fn bad_headers_are_malformed() {
        let mut data = echo_driver();
        data[0] = b'X';
        assert_matches!(AceHeader::parse(&data), Err(CartError::Malformed { .. }));
        assert_matches!(AceHeader::parse(&data[..0x20]), Err(CartError::Malformed { .. }));

        let mut data = echo_driver();
        data[0x24] &= !1;
        assert_matches!(AceHeader::parse(&data), Err(CartError::Malformed { .. }));
    }

    #[test]
    fn driver_answers_the_bus() {
        let mut cart = Ace::new(&echo_driver(), &CartConfig::default()).unwrap();
        assert_eq!(cart.read(0x123).unwrap(), 0x23);
        assert_eq!(cart.read(0xFFC).unwrap(), 0xFC);
        assert_eq!(cart.peek(0x000).unwrap(), 0xFC);
        cart.write(0x456, 0x99).unwrap();
        assert_eq!(cart.gpio.data_in, 0x99);
        assert_eq!(cart.last_yield(), Some(YieldReason::SyncWithVcs));
        assert!(cart.get_bank(0).coprocessor);
    }

    #[test]
    fn passive_cycles_are_stuffed() {
        let mut cart = Ace::new(&echo_driver(), &CartConfig::default()).unwrap();
        cart.access_passive(0x0080, 0);
        assert_eq!(cart.bus_stuff(), Some(0x80));
        assert_eq!(cart.bus_stuff(), None);

        cart.access_passive(0x1080, 0);
        assert_eq!(cart.bus_stuff(), None);
    }

    #[test]
    fn finished_driver_stops_driving() {
        // BX LR straight away
        let mut cart = Ace::new(&image(&[0x4770], &[]), &CartConfig::default()).unwrap();
        assert_matches!(cart.read(0x000), Err(CartError::BusError(0x1000, BusFault::NotDriven)));
        assert_eq!(cart.last_yield(), Some(YieldReason::ProgramEnded));
        assert_matches!(cart.read(0x001), Err(CartError::BusError(_, BusFault::NotDriven)));
    }

    #[test]
    fn runaway_is_reported() {
        let config = CartConfig {
            coprocessor_cycle_limit: 500,
            ..Default::default()
        };
        // B .
        let mut cart = Ace::new(&image(&[0xE7FE], &[]), &config).unwrap();
        assert_matches!(cart.read(0x000), Err(CartError::Coprocessor(_)));
        assert_eq!(cart.last_yield(), Some(YieldReason::Runaway));
        assert!(cart.last_yield().is_some_and(|r| r.is_error()));
    }

    #[test]
    fn yield_hook_sees_every_yield() {
        let mut cart = Ace::new(&echo_driver(), &CartConfig::default()).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        cart.set_yield_hook(Some(Box::new(move |reason, _pc| sink.borrow_mut().push(reason))));
        cart.read(0x001).unwrap();
        cart.read(0x002).unwrap();
        assert_eq!(*seen.borrow(), vec![YieldReason::SyncWithVcs; 2]);
    }

    #[test]
    fn snapshot_restores_driver_state() {
        let mut cart = Ace::new(&echo_driver(), &CartConfig::default()).unwrap();
        cart.read(0x010).unwrap();
        let state = cart.snapshot();

        cart.read(0x020).unwrap();
        cart.restore(&state).unwrap();
        assert_eq!(cart.peek(0).unwrap(), 0x10);
        assert_eq!(cart.read(0x030).unwrap(), 0x30);
        assert_eq!(cart.coproc_registers()[1], 0x1030);
    }

    #[test]
    fn registers_can_be_edited() {
        let mut cart = Ace::new(&echo_driver(), &CartConfig::default()).unwrap();
        cart.put_register("r7", 0xDEAD).unwrap();
        cart.put_register("DATA_ODR", 0x77).unwrap();
        let registers = cart.registers();
        assert!(registers.contains(&Register { name: "r7", value: 0xDEAD }));
        assert!(registers.contains(&Register { name: "DATA_ODR", value: 0x77 }));
        assert!(cart.put_register("r99", 0).is_err());
    }
}
