//! Standard Atari schemes (2K, 4K, F8, F6, F4)
//!
//! The whole 4KB window shows one bank at a time. Touching one of the
//! hotspots near the top of the window, by reading or writing, selects the
//! bank for the next access.
//!
//! Memory map:
//! - 0x000-0xFFF: selected 4K bank (2K images are mirrored)
//! - 0x000-0x07F: superchip write port (when fitted)
//! - 0x080-0x0FF: superchip read port (when fitted)

use log::debug;

use crate::cartridge::{BusFault, CartError};
use crate::config::CartConfig;
use crate::loader::{Mapping, Scheme};
use crate::memory::CART_ORIGIN;
use crate::savestate::{AtariState, MapperState};

use super::banking::{lookup, Hotspot, RomBanks, SplitRam, Window};
use super::{
    describe, mismatch, unsupported, BankInfo, CartMapper, HotLoader, HotspotKind, HotspotInfo,
    HotspotsBus, RamBus, RamRegion,
};

const NO_HOTSPOTS: [Hotspot<usize>; 0] = [];

const F8_HOTSPOTS: [Hotspot<usize>; 2] = [
    Hotspot { addr: 0xFF8, action: 0, label: "bank 0" },
    Hotspot { addr: 0xFF9, action: 1, label: "bank 1" },
];

const F6_HOTSPOTS: [Hotspot<usize>; 4] = [
    Hotspot { addr: 0xFF6, action: 0, label: "bank 0" },
    Hotspot { addr: 0xFF7, action: 1, label: "bank 1" },
    Hotspot { addr: 0xFF8, action: 2, label: "bank 2" },
    Hotspot { addr: 0xFF9, action: 3, label: "bank 3" },
];

const F4_HOTSPOTS: [Hotspot<usize>; 8] = [
    Hotspot { addr: 0xFF4, action: 0, label: "bank 0" },
    Hotspot { addr: 0xFF5, action: 1, label: "bank 1" },
    Hotspot { addr: 0xFF6, action: 2, label: "bank 2" },
    Hotspot { addr: 0xFF7, action: 3, label: "bank 3" },
    Hotspot { addr: 0xFF8, action: 4, label: "bank 4" },
    Hotspot { addr: 0xFF9, action: 5, label: "bank 5" },
    Hotspot { addr: 0xFFA, action: 6, label: "bank 6" },
    Hotspot { addr: 0xFFB, action: 7, label: "bank 7" },
];

const SUPERCHIP_WRITE: Window = Window::new(0x000, 0x07F);
const SUPERCHIP_READ: Window = Window::new(0x080, 0x0FF);

#[derive(Debug)]
pub struct Atari {
    /// Scheme and superchip flag
    mapping: Mapping,

    /// ROM banks
    banks: RomBanks,

    /// Currently selected bank
    bank: usize,

    /// Bank-switching hotspots
    hotspots: &'static [Hotspot<usize>],

    /// Extra RAM, if fitted
    superchip: Option<SplitRam>,
}

impl Atari {
    /// Create a standard Atari mapper. The image size must match the scheme
    /// exactly.
    pub fn new(mapping: Mapping, data: &[u8], config: &CartConfig) -> Result<Self, CartError> {
        let (size, bank_size, hotspots): (usize, usize, &'static [Hotspot<usize>]) =
            match mapping.scheme {
                Scheme::Atari2K => (2048, 2048, &NO_HOTSPOTS),
                Scheme::Atari4K => (4096, 4096, &NO_HOTSPOTS),
                Scheme::F8 => (8192, 4096, &F8_HOTSPOTS),
                Scheme::F6 => (16384, 4096, &F6_HOTSPOTS),
                Scheme::F4 => (32768, 4096, &F4_HOTSPOTS),
                _ => return Err(CartError::UnrecognisedMapping(mapping.to_string())),
            };

        if data.len() != size {
            return Err(CartError::WrongSize {
                mapping: mapping.to_string(),
                size: data.len(),
            });
        }

        let mut cart = Atari {
            mapping,
            banks: RomBanks::new(data, bank_size, &mapping.to_string())?,
            bank: 0,
            hotspots,
            superchip: mapping
                .superchip
                .then(|| SplitRam::new("superchip", SUPERCHIP_WRITE, SUPERCHIP_READ, 1)),
        };
        cart.reset(config);
        Ok(cart)
    }

    /// Select a bank if the address is a hotspot
    fn switch(&mut self, addr: u16) -> bool {
        match lookup(self.hotspots, addr) {
            Some(bank) => {
                if bank != self.bank {
                    debug!("{} bank switch: ${:04X} selects bank {}", self.mapping, CART_ORIGIN | addr, bank);
                }
                self.bank = bank;
                true
            }
            None => false,
        }
    }

    fn rom(&self, addr: u16) -> u8 {
        self.banks.read(self.bank, addr as usize)
    }
}

impl CartMapper for Atari {
    fn id(&self) -> &'static str {
        self.mapping.scheme.tag()
    }

    fn mapping(&self) -> String {
        self.mapping.to_string()
    }

    fn reset(&mut self, config: &CartConfig) {
        self.bank = 0;
        if let Some(ram) = self.superchip.as_mut() {
            ram.reset(config);
        }
    }

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        self.switch(addr);
        self.peek(addr)
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        if let Some(data) = self.superchip.as_ref().and_then(|ram| ram.read(addr)) {
            return Ok(data);
        }
        Ok(self.rom(addr))
    }

    fn write(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        if let Some(ram) = self.superchip.as_mut() {
            if ram.write(addr, data) {
                return Ok(());
            }
        }
        if self.switch(addr) {
            return Ok(());
        }
        Err(CartError::BusError(CART_ORIGIN | addr, BusFault::WriteToRom))
    }

    fn poke(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        if let Some(ram) = self.superchip.as_mut() {
            if ram.poke(addr, data) {
                return Ok(());
            }
        }
        Err(unsupported("poke ROM", self.mapping.to_string()))
    }

    fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        self.banks.patch(offset, data)
    }

    fn num_banks(&self) -> usize {
        self.banks.len()
    }

    fn get_bank(&self, addr: u16) -> BankInfo {
        match self.superchip.as_ref() {
            Some(ram) if ram.in_read_port(addr) || ram.in_write_port(addr) => BankInfo::ram(0, 0),
            _ => BankInfo::rom(self.bank, 0),
        }
    }

    fn set_bank(&mut self, _addr: u16, bank: usize) -> Result<(), CartError> {
        self.bank = self.banks.check(bank)?;
        Ok(())
    }

    fn snapshot(&self) -> MapperState {
        MapperState::Atari(AtariState {
            bank: self.bank,
            superchip: self.superchip.as_ref().map(SplitRam::snapshot),
        })
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        let MapperState::Atari(state) = state else {
            return Err(mismatch("Atari", state));
        };
        let bank = self.banks.check(state.bank)?;
        match (self.superchip.as_mut(), &state.superchip) {
            (Some(ram), Some(saved)) => ram.restore(saved)?,
            (None, None) => {}
            _ => {
                return Err(CartError::SnapshotMismatch {
                    expected: self.mapping.to_string(),
                    found: "different superchip fitting".to_string(),
                })
            }
        }
        self.bank = bank;
        Ok(())
    }

    fn ram_bus(&mut self) -> Option<&mut dyn RamBus> {
        if self.superchip.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        if self.hotspots.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn hot_loader(&mut self) -> Option<&mut dyn HotLoader> {
        Some(self)
    }
}

impl RamBus for Atari {
    fn ram(&self) -> Vec<RamRegion> {
        self.superchip
            .as_ref()
            .map(|ram| ram.regions(true))
            .unwrap_or_default()
    }

    fn put_ram(&mut self, region: usize, idx: usize, data: u8) -> Result<(), CartError> {
        match self.superchip.as_mut() {
            Some(ram) => ram.put(region, idx, data),
            None => Err(unsupported("RAM", self.mapping.to_string())),
        }
    }
}

impl HotspotsBus for Atari {
    fn read_hotspots(&self) -> Vec<HotspotInfo> {
        describe(self.hotspots, HotspotKind::Bankswitch)
    }

    fn write_hotspots(&self) -> Vec<HotspotInfo> {
        describe(self.hotspots, HotspotKind::Bankswitch)
    }
}

impl HotLoader for Atari {
    fn hot_load(&mut self, image: &[u8]) -> Result<(), CartError> {
        self.banks.replace(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Image whose first byte in each bank is the bank number
    fn image(banks: usize) -> Vec<u8> {
        let mut data: Vec<u8> = (0..banks * 4096).map(|i| (i % 253) as u8).collect();
        for bank in 0..banks {
            data[bank * 4096] = bank as u8;
        }
        data
    }

    #[test]
    fn f6_hotspots_select_banks() {
        let mut cart = Atari::new(Mapping::new(Scheme::F6), &image(4), &CartConfig::default()).unwrap();
        assert_eq!(cart.read(0x000).unwrap(), 0);
        for (hotspot, bank) in [(0xFF8u16, 2u8), (0xFF6, 0), (0xFF9, 3), (0xFF7, 1)] {
            cart.read(hotspot).unwrap();
            assert_eq!(cart.read(0x000).unwrap(), bank);
        }
    }

    #[test]
    fn hotspot_writes_switch_too() {
        let mut cart = Atari::new(Mapping::new(Scheme::F4), &image(8), &CartConfig::default()).unwrap();
        cart.write(0xFFB, 0).unwrap();
        assert_eq!(cart.get_bank(0x000).number, 7);
        assert_eq!(cart.peek(0x000).unwrap(), 7);
    }

    #[test]
    fn read_of_hotspot_comes_from_new_bank() {
        let data = image(2);
        let mut cart = Atari::new(Mapping::new(Scheme::F8), &data, &CartConfig::default()).unwrap();
        assert_eq!(cart.read(0xFF9).unwrap(), data[4096 + 0xFF9]);
    }

    #[test]
    fn writes_to_rom_fail() {
        let mut cart = Atari::new(Mapping::new(Scheme::Atari4K), &image(1), &CartConfig::default()).unwrap();
        assert_matches!(cart.write(0x123, 1), Err(CartError::BusError(0x1123, BusFault::WriteToRom)));
        assert!(cart.hotspots_bus().is_none());
    }

    #[test]
    fn two_k_is_mirrored() {
        let data: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        let mut cart = Atari::new(Mapping::new(Scheme::Atari2K), &data, &CartConfig::default()).unwrap();
        assert_eq!(cart.read(0x812).unwrap(), cart.read(0x012).unwrap());
    }

    #[test]
    fn superchip_ports() {
        let data = image(2);
        let mut cart = Atari::new(Mapping::with_superchip(Scheme::F8), &data, &CartConfig::default()).unwrap();
        cart.write(0x010, 0xAB).unwrap();
        assert_eq!(cart.read(0x090).unwrap(), 0xAB);
        assert_eq!(cart.read(0x010).unwrap(), data[0x010]);
        assert!(cart.get_bank(0x090).is_ram);
        assert_eq!(cart.mapping(), "F8SC");
        assert_eq!(cart.ram_bus().unwrap().ram()[0].data[0x10], 0xAB);
    }

    #[test]
    fn poke_reaches_superchip_only() {
        let mut cart = Atari::new(Mapping::with_superchip(Scheme::F8), &image(2), &CartConfig::default()).unwrap();
        cart.poke(0x095, 0x5C).unwrap();
        assert_eq!(cart.peek(0x095).unwrap(), 0x5C);
        cart.poke(0x016, 0x6D).unwrap();
        assert_eq!(cart.peek(0x096).unwrap(), 0x6D);
        assert_matches!(cart.poke(0x200, 0), Err(CartError::Unsupported { .. }));

        let mut plain = Atari::new(Mapping::new(Scheme::F8), &image(2), &CartConfig::default()).unwrap();
        assert_matches!(plain.poke(0x095, 0), Err(CartError::Unsupported { .. }));
    }

    #[test]
    fn wrong_size_is_rejected() {
        assert_matches!(
            Atari::new(Mapping::new(Scheme::F6), &image(2), &CartConfig::default()),
            Err(CartError::WrongSize { size: 8192, .. })
        );
    }

    #[test]
    fn set_bank_is_checked() {
        let mut cart = Atari::new(Mapping::new(Scheme::F8), &image(2), &CartConfig::default()).unwrap();
        cart.set_bank(0, 1).unwrap();
        assert_eq!(cart.peek(0).unwrap(), 1);
        assert_matches!(cart.set_bank(0, 2), Err(CartError::InvalidBank { bank: 2, .. }));
    }

    #[test]
    fn snapshot_restores_bank_and_ram() {
        let mut cart = Atari::new(Mapping::with_superchip(Scheme::F6), &image(4), &CartConfig::default()).unwrap();
        cart.read(0xFF8).unwrap();
        cart.write(0x000, 0x42).unwrap();
        let state = cart.snapshot();

        cart.read(0xFF6).unwrap();
        cart.write(0x000, 0x00).unwrap();
        cart.restore(&state).unwrap();
        assert_eq!(cart.get_bank(0x200).number, 2);
        assert_eq!(cart.peek(0x080).unwrap(), 0x42);

        assert_matches!(
            cart.restore(&MapperState::Ejected),
            Err(CartError::SnapshotMismatch { .. })
        );
    }
}
