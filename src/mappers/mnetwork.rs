//! M-Network (E7) implementation
//!
//! Eight 2K ROM banks plus two kinds of RAM. The lower segment shows one of
//! ROM banks 0-6, or 1K of RAM in place of bank 7. The upper segment is
//! always ROM bank 7 apart from its bottom 512 bytes, which hold the ports of
//! four independently selectable 256 byte RAM banks. The two selections never
//! affect each other.
//!
//! Memory map:
//! - 0x000-0x3FF: ROM, or 1K RAM write port
//! - 0x400-0x7FF: ROM, or 1K RAM read port
//! - 0x800-0x8FF: 256 byte RAM write port
//! - 0x900-0x9FF: 256 byte RAM read port
//! - 0xA00-0xFFF: ROM bank 7
//!
//! Hotspots: 0xFE0-0xFE6 select ROM banks 0-6, 0xFE7 selects the 1K RAM,
//! 0xFE8-0xFEB select the 256 byte RAM bank.

use log::debug;

use crate::cartridge::{BusFault, CartError};
use crate::config::CartConfig;
use crate::memory::CART_ORIGIN;
use crate::savestate::{MapperState, MNetworkState};

use super::banking::{lookup, Hotspot, RomBanks, SplitRam, Window};
use super::{
    describe, mismatch, unsupported, BankInfo, CartMapper, HotspotKind, HotspotInfo, HotspotsBus,
    RamBus, RamRegion,
};

const SIZE: usize = 16384;
const BANK_SIZE: usize = 2048;

/// Lower segment selection that maps RAM instead of ROM
const RAM_BANK: usize = 7;

/// Start of the fixed part of the upper segment
const FIXED_ORIGIN: u16 = 0xA00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Select {
    /// Lower segment shows a ROM bank, or the 1K RAM for bank 7
    Lower(usize),
    /// 256 byte RAM bank
    SmallRam(usize),
}

const HOTSPOTS: [Hotspot<Select>; 12] = [
    Hotspot { addr: 0xFE0, action: Select::Lower(0), label: "ROM bank 0" },
    Hotspot { addr: 0xFE1, action: Select::Lower(1), label: "ROM bank 1" },
    Hotspot { addr: 0xFE2, action: Select::Lower(2), label: "ROM bank 2" },
    Hotspot { addr: 0xFE3, action: Select::Lower(3), label: "ROM bank 3" },
    Hotspot { addr: 0xFE4, action: Select::Lower(4), label: "ROM bank 4" },
    Hotspot { addr: 0xFE5, action: Select::Lower(5), label: "ROM bank 5" },
    Hotspot { addr: 0xFE6, action: Select::Lower(6), label: "ROM bank 6" },
    Hotspot { addr: 0xFE7, action: Select::Lower(RAM_BANK), label: "1K RAM" },
    Hotspot { addr: 0xFE8, action: Select::SmallRam(0), label: "256B RAM bank 0" },
    Hotspot { addr: 0xFE9, action: Select::SmallRam(1), label: "256B RAM bank 1" },
    Hotspot { addr: 0xFEA, action: Select::SmallRam(2), label: "256B RAM bank 2" },
    Hotspot { addr: 0xFEB, action: Select::SmallRam(3), label: "256B RAM bank 3" },
];

pub struct MNetwork {
    /// ROM banks
    banks: RomBanks,

    /// Selection for the lower segment
    bank: usize,

    /// 1K RAM, visible when the lower segment selects bank 7
    ram_1k: SplitRam,

    /// Four banks of 256 bytes, always visible
    ram_256: SplitRam,
}

impl MNetwork {
    pub fn new(data: &[u8], config: &CartConfig) -> Result<Self, CartError> {
        if data.len() != SIZE {
            return Err(CartError::WrongSize {
                mapping: "E7".to_string(),
                size: data.len(),
            });
        }

        let mut cart = MNetwork {
            banks: RomBanks::new(data, BANK_SIZE, "E7")?,
            bank: 0,
            ram_1k: SplitRam::new("1K RAM", Window::new(0x000, 0x3FF), Window::new(0x400, 0x7FF), 1),
            ram_256: SplitRam::new("256B RAM", Window::new(0x800, 0x8FF), Window::new(0x900, 0x9FF), 4),
        };
        cart.reset(config);
        Ok(cart)
    }

    fn switch(&mut self, addr: u16) -> bool {
        match lookup(&HOTSPOTS, addr) {
            Some(Select::Lower(bank)) => {
                let target = if bank == RAM_BANK { "1K RAM".to_string() } else { format!("bank {}", bank) };
                debug!("E7 lower segment selects {}", target);
                self.bank = bank;
                true
            }
            Some(Select::SmallRam(bank)) => {
                debug!("E7 256B RAM selects bank {}", bank);
                self.ram_256.select(bank).is_ok()
            }
            None => false,
        }
    }

    #[inline]
    fn ram_mapped(&self) -> bool {
        self.bank == RAM_BANK
    }
}

impl CartMapper for MNetwork {
    fn id(&self) -> &'static str {
        "E7"
    }

    fn mapping(&self) -> String {
        "E7".to_string()
    }

    fn reset(&mut self, config: &CartConfig) {
        self.bank = 0;
        self.ram_1k.reset(config);
        self.ram_256.reset(config);
    }

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        self.switch(addr);
        self.peek(addr)
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        if addr < 0x800 {
            if self.ram_mapped() {
                if let Some(data) = self.ram_1k.read(addr) {
                    return Ok(data);
                }
            }
            return Ok(self.banks.read(self.bank, addr as usize));
        }

        if let Some(data) = self.ram_256.read(addr) {
            return Ok(data);
        }
        Ok(self.banks.read(self.banks.last(), addr as usize))
    }

    fn write(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        if self.ram_mapped() && self.ram_1k.write(addr, data) {
            return Ok(());
        }
        if self.ram_256.write(addr, data) {
            return Ok(());
        }
        if self.switch(addr) {
            return Ok(());
        }
        Err(CartError::BusError(CART_ORIGIN | addr, BusFault::WriteToRom))
    }

    fn poke(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        if addr < 0x800 {
            if self.ram_mapped() && self.ram_1k.poke(addr, data) {
                return Ok(());
            }
        } else if self.ram_256.poke(addr, data) {
            return Ok(());
        }
        Err(unsupported("poke ROM", "E7"))
    }

    fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        self.banks.patch(offset, data)
    }

    fn num_banks(&self) -> usize {
        self.banks.len()
    }

    fn get_bank(&self, addr: u16) -> BankInfo {
        if addr < 0x800 {
            if self.ram_mapped() {
                BankInfo::ram(0, 0)
            } else {
                BankInfo::rom(self.bank, 0)
            }
        } else if addr < FIXED_ORIGIN {
            BankInfo::ram(self.ram_256.selected(), 1)
        } else {
            BankInfo::rom(self.banks.last(), 2)
        }
    }

    fn set_bank(&mut self, addr: u16, bank: usize) -> Result<(), CartError> {
        if addr < 0x800 {
            self.bank = self.banks.check(bank)?;
            Ok(())
        } else if addr < FIXED_ORIGIN {
            self.ram_256.select(bank)
        } else if bank == self.banks.last() {
            Ok(())
        } else {
            Err(CartError::InvalidBank {
                mapping: "E7".to_string(),
                bank,
                banks: self.banks.len(),
            })
        }
    }

    fn snapshot(&self) -> MapperState {
        MapperState::MNetwork(MNetworkState {
            bank: self.bank,
            ram_1k: self.ram_1k.snapshot(),
            ram_256: self.ram_256.snapshot(),
        })
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        let MapperState::MNetwork(state) = state else {
            return Err(mismatch("E7", state));
        };
        let bank = self.banks.check(state.bank)?;
        self.ram_1k.restore(&state.ram_1k)?;
        self.ram_256.restore(&state.ram_256)?;
        self.bank = bank;
        Ok(())
    }

    fn ram_bus(&mut self) -> Option<&mut dyn RamBus> {
        Some(self)
    }

    fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        Some(self)
    }
}

impl RamBus for MNetwork {
    fn ram(&self) -> Vec<RamRegion> {
        let mut regions = self.ram_1k.regions(self.ram_mapped());
        regions.extend(self.ram_256.regions(true));
        regions
    }

    fn put_ram(&mut self, region: usize, idx: usize, data: u8) -> Result<(), CartError> {
        match region {
            0 => self.ram_1k.put(0, idx, data),
            n => self.ram_256.put(n - 1, idx, data),
        }
    }
}

impl HotspotsBus for MNetwork {
    fn read_hotspots(&self) -> Vec<HotspotInfo> {
        describe(&HOTSPOTS, HotspotKind::Bankswitch)
    }

    fn write_hotspots(&self) -> Vec<HotspotInfo> {
        describe(&HOTSPOTS, HotspotKind::Bankswitch)
    }
}
