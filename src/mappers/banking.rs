//! Generic bank-switching model shared by the mapper implementations
//!
//! Most cartridge schemes divide the 4KB window into segments, each showing
//! one bank from a pool, and reserve a handful of addresses as hotspots that
//! select banks when touched. RAM-bearing schemes cannot use a single address
//! per RAM cell because the cartridge port has no read/write line: writes
//! land in one address range (the write port) and reads of the same byte
//! happen in a different range (the read port).

use serde::{Deserialize, Serialize};

use crate::cartridge::CartError;
use crate::config::CartConfig;
use crate::memory::CART_ORIGIN;

use super::RamRegion;

/// An inclusive range of cartridge-local addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First address in the window
    pub origin: u16,

    /// Last address in the window
    pub memtop: u16,
}

impl Window {
    pub const fn new(origin: u16, memtop: u16) -> Self {
        Window { origin, memtop }
    }

    #[inline]
    pub fn contains(&self, addr: u16) -> bool {
        addr >= self.origin && addr <= self.memtop
    }

    /// Offset of an address from the start of the window
    #[inline]
    pub fn offset(&self, addr: u16) -> usize {
        (addr - self.origin) as usize
    }

    pub fn len(&self) -> usize {
        (self.memtop - self.origin) as usize + 1
    }

    fn overlaps(&self, other: &Window) -> bool {
        self.origin <= other.memtop && other.origin <= self.memtop
    }
}

/// A single entry of a declarative hotspot table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotspot<A> {
    /// Cartridge-local address of the hotspot
    pub addr: u16,

    /// Effect of touching the hotspot
    pub action: A,

    /// Short description used by tooling
    pub label: &'static str,
}

/// Find the action of the hotspot at an address, if there is one
#[inline]
pub fn lookup<A: Copy>(table: &[Hotspot<A>], addr: u16) -> Option<A> {
    table.iter().find(|h| h.addr == addr).map(|h| h.action)
}

/// ROM image split into fixed-size banks
#[derive(Debug, Clone)]
pub struct RomBanks {
    /// Bank data, each exactly `bank_size` bytes
    banks: Vec<Vec<u8>>,

    /// Size of every bank in bytes
    bank_size: usize,

    /// Mapping name used in error messages
    mapping: String,
}

impl RomBanks {
    /// Split an image into banks. The image must be a non-zero multiple of
    /// the bank size.
    pub fn new(image: &[u8], bank_size: usize, mapping: &str) -> Result<Self, CartError> {
        if image.is_empty() || image.len() % bank_size != 0 {
            return Err(CartError::WrongSize {
                mapping: mapping.to_string(),
                size: image.len(),
            });
        }

        Ok(RomBanks {
            banks: image.chunks(bank_size).map(|c| c.to_vec()).collect(),
            bank_size,
            mapping: mapping.to_string(),
        })
    }

    /// Number of banks
    #[inline]
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    #[inline]
    pub fn bank_size(&self) -> usize {
        self.bank_size
    }

    /// Index of the last bank
    #[inline]
    pub fn last(&self) -> usize {
        self.banks.len() - 1
    }

    /// Read a byte from a bank. The offset wraps at the bank size, which
    /// gives the mirroring smaller banks show across a larger segment.
    #[inline]
    pub fn read(&self, bank: usize, offset: usize) -> u8 {
        self.banks[bank][offset % self.bank_size]
    }

    /// Check that a bank number exists
    pub fn check(&self, bank: usize) -> Result<usize, CartError> {
        if bank < self.banks.len() {
            Ok(bank)
        } else {
            Err(CartError::InvalidBank {
                mapping: self.mapping.clone(),
                bank,
                banks: self.banks.len(),
            })
        }
    }

    /// Change a byte of the ROM image. The offset is relative to the start of
    /// the original image.
    pub fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        let bank = offset / self.bank_size;
        if bank >= self.banks.len() {
            return Err(CartError::Malformed {
                mapping: self.mapping.clone(),
                reason: format!("patch offset {:#x} is beyond the end of the image", offset),
            });
        }
        self.banks[bank][offset % self.bank_size] = data;
        Ok(())
    }

    /// Replace the ROM contents with an image of exactly the same size
    pub fn replace(&mut self, image: &[u8]) -> Result<(), CartError> {
        if image.len() != self.banks.len() * self.bank_size {
            return Err(CartError::WrongSize {
                mapping: self.mapping.clone(),
                size: image.len(),
            });
        }
        for (bank, chunk) in self.banks.iter_mut().zip(image.chunks(self.bank_size)) {
            bank.copy_from_slice(chunk);
        }
        Ok(())
    }
}

/// Serialisable copy of a `SplitRam`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamState {
    pub banks: Vec<Vec<u8>>,
    pub selected: usize,
}

/// RAM with separate write and read ports, optionally banked
#[derive(Debug, Clone)]
pub struct SplitRam {
    /// Label shown by tooling
    label: &'static str,

    /// Addresses that write to RAM
    write_port: Window,

    /// Addresses that read from RAM
    read_port: Window,

    /// RAM banks, each the size of the ports
    banks: Vec<Vec<u8>>,

    /// Bank visible through the ports
    selected: usize,
}

impl SplitRam {
    /// Create RAM with `num_banks` banks. The ports must be the same size
    /// and must not overlap.
    pub fn new(label: &'static str, write_port: Window, read_port: Window, num_banks: usize) -> Self {
        debug_assert_eq!(write_port.len(), read_port.len());
        debug_assert!(!write_port.overlaps(&read_port));

        SplitRam {
            label,
            write_port,
            read_port,
            banks: vec![vec![0; write_port.len()]; num_banks.max(1)],
            selected: 0,
        }
    }

    /// Reinitialise contents according to the configuration
    pub fn reset(&mut self, config: &CartConfig) {
        config.fill_banks(&mut self.banks, self.write_port.origin as u64);
        self.selected = 0;
    }

    #[inline]
    pub fn in_write_port(&self, addr: u16) -> bool {
        self.write_port.contains(addr)
    }

    #[inline]
    pub fn in_read_port(&self, addr: u16) -> bool {
        self.read_port.contains(addr)
    }

    /// Read through the read port. Addresses outside the read port return
    /// `None`; reading the write port is the caller's business.
    #[inline]
    pub fn read(&self, addr: u16) -> Option<u8> {
        if self.read_port.contains(addr) {
            Some(self.banks[self.selected][self.read_port.offset(addr)])
        } else {
            None
        }
    }

    /// Write through the write port. Returns false if the address is not in
    /// the write port.
    #[inline]
    pub fn write(&mut self, addr: u16, data: u8) -> bool {
        if self.write_port.contains(addr) {
            let offset = self.write_port.offset(addr);
            self.banks[self.selected][offset] = data;
            true
        } else {
            false
        }
    }

    /// Debugger write through either port
    pub fn poke(&mut self, addr: u16, data: u8) -> bool {
        let offset = if self.write_port.contains(addr) {
            self.write_port.offset(addr)
        } else if self.read_port.contains(addr) {
            self.read_port.offset(addr)
        } else {
            return false;
        };
        self.banks[self.selected][offset] = data;
        true
    }

    /// Number of RAM banks
    pub fn num_banks(&self) -> usize {
        self.banks.len()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Select the RAM bank visible through the ports
    pub fn select(&mut self, bank: usize) -> Result<(), CartError> {
        if bank >= self.banks.len() {
            return Err(CartError::InvalidBank {
                mapping: self.label.to_string(),
                bank,
                banks: self.banks.len(),
            });
        }
        self.selected = bank;
        Ok(())
    }

    /// Set a byte of a specific bank, regardless of selection
    pub fn put(&mut self, bank: usize, idx: usize, data: u8) -> Result<(), CartError> {
        let size = self.write_port.len();
        match self.banks.get_mut(bank) {
            Some(ram) if idx < size => {
                ram[idx] = data;
                Ok(())
            }
            _ => Err(CartError::InvalidBank {
                mapping: self.label.to_string(),
                bank,
                banks: self.banks.len(),
            }),
        }
    }

    /// Copy of the RAM contents and bank selection
    pub fn snapshot(&self) -> RamState {
        RamState {
            banks: self.banks.clone(),
            selected: self.selected,
        }
    }

    /// Restore contents from a snapshot taken of RAM with the same geometry
    pub fn restore(&mut self, state: &RamState) -> Result<(), CartError> {
        let size = self.write_port.len();
        if state.banks.len() != self.banks.len()
            || state.banks.iter().any(|b| b.len() != size)
            || state.selected >= self.banks.len()
        {
            return Err(CartError::SnapshotMismatch {
                expected: format!("{} x{} banks of {} bytes", self.label, self.banks.len(), size),
                found: format!("{} banks", state.banks.len()),
            });
        }
        for (bank, saved) in self.banks.iter_mut().zip(state.banks.iter()) {
            bank.copy_from_slice(saved);
        }
        self.selected = state.selected;
        Ok(())
    }

    /// Describe every bank for the RAM bus. `visible` says whether the
    /// ports are currently decoded at all.
    pub fn regions(&self, visible: bool) -> Vec<RamRegion> {
        self.banks
            .iter()
            .enumerate()
            .map(|(n, data)| RamRegion {
                label: if self.banks.len() > 1 {
                    format!("{} {}", self.label, n)
                } else {
                    self.label.to_string()
                },
                read_origin: CART_ORIGIN | self.read_port.origin,
                write_origin: CART_ORIGIN | self.write_port.origin,
                mapped: visible && n == self.selected,
                data: data.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn superchip() -> SplitRam {
        SplitRam::new("superchip", Window::new(0x000, 0x07F), Window::new(0x080, 0x0FF), 1)
    }

    #[test]
    fn split_ports_are_distinct() {
        let mut ram = superchip();
        assert!(ram.write(0x010, 0xAB));
        assert_eq!(ram.read(0x090), Some(0xAB));
        assert_eq!(ram.read(0x010), None);
        assert!(!ram.write(0x090, 0x12));
        assert_eq!(ram.read(0x090), Some(0xAB));
    }

    #[test]
    fn banked_ram_keeps_banks_apart() {
        let mut ram = SplitRam::new("ram", Window::new(0x800, 0x8FF), Window::new(0x900, 0x9FF), 4);
        ram.write(0x800, 1);
        ram.select(2).unwrap();
        ram.write(0x800, 2);
        assert_eq!(ram.read(0x900), Some(2));
        ram.select(0).unwrap();
        assert_eq!(ram.read(0x900), Some(1));
        assert_matches!(ram.select(4), Err(CartError::InvalidBank { bank: 4, banks: 4, .. }));
    }

    #[test]
    fn restore_copies_rather_than_aliases() {
        let mut ram = superchip();
        ram.write(0x000, 0x11);
        let saved = ram.snapshot();
        ram.write(0x000, 0x22);
        ram.restore(&saved).unwrap();
        assert_eq!(ram.read(0x080), Some(0x11));
        assert_eq!(saved.banks[0][0], 0x11);
    }

    #[test]
    fn rom_banks_reject_ragged_images() {
        assert_matches!(RomBanks::new(&[0; 3000], 2048, "F8"), Err(CartError::WrongSize { size: 3000, .. }));
        assert_matches!(RomBanks::new(&[], 2048, "F8"), Err(CartError::WrongSize { size: 0, .. }));
    }

    #[test]
    fn rom_banks_patch_and_replace() {
        let mut image = vec![0u8; 8192];
        image[4096] = 7;
        let mut rom = RomBanks::new(&image, 4096, "F8").unwrap();
        assert_eq!(rom.len(), 2);
        assert_eq!(rom.read(1, 0), 7);
        rom.patch(4097, 9).unwrap();
        assert_eq!(rom.read(1, 1), 9);
        assert!(rom.patch(8192, 0).is_err());
        assert!(rom.replace(&[0; 4096]).is_err());
        rom.replace(&[3; 8192]).unwrap();
        assert_eq!(rom.read(0, 100), 3);
    }

    #[test]
    fn hotspot_lookup() {
        const TABLE: [Hotspot<usize>; 2] = [
            Hotspot { addr: 0xFF8, action: 0, label: "bank 0" },
            Hotspot { addr: 0xFF9, action: 1, label: "bank 1" },
        ];
        assert_eq!(lookup(&TABLE, 0xFF9), Some(1));
        assert_eq!(lookup(&TABLE, 0xFFA), None);
    }
}
