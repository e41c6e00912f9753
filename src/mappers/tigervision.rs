//! Tigervision (3F) implementation
//!
//! The cartridge watches the bus for writes to the bottom of TIA space. Any
//! access with an address up to 0x003F latches the data bus as the bank
//! number for the lower segment. The upper segment always shows the last
//! bank.
//!
//! Memory map:
//! - 0x000-0x7FF: selected 2K bank
//! - 0x800-0xFFF: last 2K bank

use log::debug;

use crate::cartridge::{BusFault, CartError};
use crate::config::CartConfig;
use crate::memory::CART_ORIGIN;
use crate::savestate::{MapperState, TigervisionState};

use super::banking::RomBanks;
use super::{mismatch, unsupported, BankInfo, CartMapper, HotspotKind, HotspotInfo, HotspotsBus};

const BANK_SIZE: usize = 2048;

/// Highest bus address that selects a bank
const SELECT_MAX: u16 = 0x003F;

#[derive(Debug)]
pub struct Tigervision {
    /// ROM banks
    banks: RomBanks,

    /// Bank shown in the lower segment
    bank: usize,
}

impl Tigervision {
    pub fn new(data: &[u8]) -> Result<Self, CartError> {
        Ok(Tigervision {
            banks: RomBanks::new(data, BANK_SIZE, "3F")?,
            bank: 0,
        })
    }

    #[inline]
    fn segment(addr: u16) -> usize {
        (addr >> 11) as usize & 0x01
    }
}

impl CartMapper for Tigervision {
    fn id(&self) -> &'static str {
        "3F"
    }

    fn mapping(&self) -> String {
        "3F".to_string()
    }

    fn reset(&mut self, _config: &CartConfig) {
        self.bank = 0;
    }

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        self.peek(addr)
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        let bank = match Self::segment(addr) {
            0 => self.bank,
            _ => self.banks.last(),
        };
        Ok(self.banks.read(bank, addr as usize))
    }

    fn write(&mut self, addr: u16, _data: u8) -> Result<(), CartError> {
        Err(CartError::BusError(CART_ORIGIN | addr, BusFault::WriteToRom))
    }

    fn poke(&mut self, _addr: u16, _data: u8) -> Result<(), CartError> {
        Err(unsupported("poke ROM", "3F"))
    }

    fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        self.banks.patch(offset, data)
    }

    fn access_passive(&mut self, bus_addr: u16, data: u8) {
        if bus_addr <= SELECT_MAX {
            let bank = data as usize % self.banks.len();
            if bank != self.bank {
                debug!("3F bank switch: ${:04X} <- ${:02X} selects bank {}", bus_addr, data, bank);
            }
            self.bank = bank;
        }
    }

    fn num_banks(&self) -> usize {
        self.banks.len()
    }

    fn get_bank(&self, addr: u16) -> BankInfo {
        match Self::segment(addr) {
            0 => BankInfo::rom(self.bank, 0),
            _ => BankInfo::rom(self.banks.last(), 1),
        }
    }

    fn set_bank(&mut self, addr: u16, bank: usize) -> Result<(), CartError> {
        let bank = self.banks.check(bank)?;
        match Self::segment(addr) {
            0 => {
                self.bank = bank;
                Ok(())
            }
            _ if bank == self.banks.last() => Ok(()),
            _ => Err(CartError::InvalidBank {
                mapping: "3F".to_string(),
                bank,
                banks: self.banks.len(),
            }),
        }
    }

    fn snapshot(&self) -> MapperState {
        MapperState::Tigervision(TigervisionState { bank: self.bank })
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        let MapperState::Tigervision(state) = state else {
            return Err(mismatch("3F", state));
        };
        self.bank = self.banks.check(state.bank)?;
        Ok(())
    }

    fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        Some(self)
    }
}

impl HotspotsBus for Tigervision {
    fn read_hotspots(&self) -> Vec<HotspotInfo> {
        Vec::new()
    }

    fn write_hotspots(&self) -> Vec<HotspotInfo> {
        vec![HotspotInfo {
            addr: SELECT_MAX,
            kind: HotspotKind::Bankswitch,
            label: "bank select (any write to $0000-$003F)",
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn image(banks: usize) -> Vec<u8> {
        let mut data = vec![0; banks * BANK_SIZE];
        for bank in 0..banks {
            data[bank * BANK_SIZE] = 0x30 + bank as u8;
        }
        data
    }

    #[test]
    fn passive_writes_select_bank() {
        let mut cart = Tigervision::new(&image(4)).unwrap();
        cart.access_passive(0x003F, 2);
        assert_eq!(cart.read(0x000).unwrap(), 0x32);
        assert_eq!(cart.read(0x800).unwrap(), 0x33);

        cart.access_passive(0x0040, 1);
        assert_eq!(cart.read(0x000).unwrap(), 0x32);

        cart.access_passive(0x0000, 5);
        assert_eq!(cart.get_bank(0x000).number, 1);
    }

    #[test]
    fn upper_segment_is_fixed() {
        let mut cart = Tigervision::new(&image(4)).unwrap();
        assert_matches!(cart.set_bank(0x800, 0), Err(CartError::InvalidBank { .. }));
        cart.set_bank(0x800, 3).unwrap();
        assert_eq!(cart.get_bank(0xFFF), BankInfo::rom(3, 1));
    }

    #[test]
    fn ragged_images_are_rejected() {
        assert_matches!(Tigervision::new(&[0; 3000]), Err(CartError::WrongSize { .. }));
    }
}
