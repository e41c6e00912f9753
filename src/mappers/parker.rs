//! Parker Brothers (E0) implementation
//!
//! Eight 1K banks shown through four 1K segments. Each of the first three
//! segments has its own group of eight hotspots; the last segment always
//! shows bank 7, which is where the hotspots live.
//!
//! Memory map:
//! - 0x000-0x3FF: segment 0 (hotspots 0xFE0-0xFE7)
//! - 0x400-0x7FF: segment 1 (hotspots 0xFE8-0xFEF)
//! - 0x800-0xBFF: segment 2 (hotspots 0xFF0-0xFF7)
//! - 0xC00-0xFFF: segment 3, fixed to bank 7

use log::debug;

use crate::cartridge::{BusFault, CartError};
use crate::config::CartConfig;
use crate::memory::CART_ORIGIN;
use crate::savestate::{MapperState, ParkerState};

use super::banking::{lookup, Hotspot, RomBanks};
use super::{
    describe, mismatch, unsupported, BankInfo, CartMapper, HotspotKind, HotspotInfo, HotspotsBus,
};

const SIZE: usize = 8192;
const BANK_SIZE: usize = 1024;
const FIXED_BANK: usize = 7;

/// Hotspot action: (segment, bank)
type Select = (usize, usize);

const SEGMENT_LABELS: [&str; 3] = ["segment 0", "segment 1", "segment 2"];

const fn hotspot_table() -> [Hotspot<Select>; 24] {
    let mut table = [Hotspot { addr: 0, action: (0, 0), label: "" }; 24];
    let mut i = 0;
    while i < 24 {
        table[i] = Hotspot {
            addr: 0xFE0 + i as u16,
            action: (i / 8, i % 8),
            label: SEGMENT_LABELS[i / 8],
        };
        i += 1;
    }
    table
}

const HOTSPOTS: [Hotspot<Select>; 24] = hotspot_table();

pub struct Parker {
    /// ROM banks
    banks: RomBanks,

    /// Bank shown in each segment
    segments: [usize; 4],
}

impl Parker {
    pub fn new(data: &[u8]) -> Result<Self, CartError> {
        if data.len() != SIZE {
            return Err(CartError::WrongSize {
                mapping: "E0".to_string(),
                size: data.len(),
            });
        }
        Ok(Parker {
            banks: RomBanks::new(data, BANK_SIZE, "E0")?,
            segments: [0, 1, 2, FIXED_BANK],
        })
    }

    fn switch(&mut self, addr: u16) -> bool {
        match lookup(&HOTSPOTS, addr) {
            Some((segment, bank)) => {
                debug!("E0 segment {} selects bank {}", segment, bank);
                self.segments[segment] = bank;
                true
            }
            None => false,
        }
    }

    #[inline]
    fn segment(addr: u16) -> usize {
        (addr >> 10) as usize & 0x03
    }
}

impl CartMapper for Parker {
    fn id(&self) -> &'static str {
        "E0"
    }

    fn mapping(&self) -> String {
        "E0".to_string()
    }

    fn reset(&mut self, _config: &CartConfig) {
        self.segments = [0, 1, 2, FIXED_BANK];
    }

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        self.switch(addr);
        self.peek(addr)
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        let bank = self.segments[Self::segment(addr)];
        Ok(self.banks.read(bank, addr as usize))
    }

    fn write(&mut self, addr: u16, _data: u8) -> Result<(), CartError> {
        if self.switch(addr) {
            Ok(())
        } else {
            Err(CartError::BusError(CART_ORIGIN | addr, BusFault::WriteToRom))
        }
    }

    fn poke(&mut self, _addr: u16, _data: u8) -> Result<(), CartError> {
        Err(unsupported("poke ROM", "E0"))
    }

    fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        self.banks.patch(offset, data)
    }

    fn num_banks(&self) -> usize {
        self.banks.len()
    }

    fn get_bank(&self, addr: u16) -> BankInfo {
        let segment = Self::segment(addr);
        BankInfo::rom(self.segments[segment], segment)
    }

    fn set_bank(&mut self, addr: u16, bank: usize) -> Result<(), CartError> {
        let segment = Self::segment(addr);
        let bank = self.banks.check(bank)?;
        if segment == 3 && bank != FIXED_BANK {
            return Err(CartError::InvalidBank {
                mapping: "E0".to_string(),
                bank,
                banks: self.banks.len(),
            });
        }
        self.segments[segment] = bank;
        Ok(())
    }

    fn snapshot(&self) -> MapperState {
        MapperState::Parker(ParkerState {
            segments: self.segments,
        })
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        let MapperState::Parker(state) = state else {
            return Err(mismatch("E0", state));
        };
        for &bank in &state.segments {
            self.banks.check(bank)?;
        }
        self.segments = state.segments;
        Ok(())
    }

    fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        Some(self)
    }
}

impl HotspotsBus for Parker {
    fn read_hotspots(&self) -> Vec<HotspotInfo> {
        describe(&HOTSPOTS, HotspotKind::Bankswitch)
    }

    fn write_hotspots(&self) -> Vec<HotspotInfo> {
        describe(&HOTSPOTS, HotspotKind::Bankswitch)
    }
}
