//! Address decoding for the 6507 bus
//!
//! The 6507 only brings out 13 address lines, so the 16-bit addresses used by
//! programs fold onto an 8KB bus. This module maps a CPU address onto that bus
//! and says which chip answers it. Every mapper compares its hotspots against
//! the cartridge-local offsets produced here.
//!
//! Memory Map (13-bit bus):
//! - A12 set:            0x1000 - 0x1FFF: Cartridge (4KB window)
//! - A12 clear, A7 clear: TIA registers (mirrored every 64/16 bytes)
//! - A12 clear, A7 set, A9 clear: RIOT RAM (128 bytes)
//! - A12 clear, A7 set, A9 set:   RIOT timer and I/O registers

/// Mask applied to a CPU address to produce the 13-bit bus address
pub const BUS_MASK: u16 = 0x1FFF;

/// Mask applied to a bus address to produce a cartridge-local offset
pub const CART_MASK: u16 = 0x0FFF;

/// Address line that selects the cartridge
pub const CART_SELECT: u16 = 0x1000;

/// Origin of the cartridge window in the canonical address space
pub const CART_ORIGIN: u16 = 0x1000;

/// Highest address of the cartridge window in the canonical address space
pub const CART_MEMTOP: u16 = 0x1FFF;

/// Kind of bus cycle being decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Chip selected by a bus address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    /// Cartridge port
    Cartridge,

    /// Television interface adaptor
    Tia,

    /// RAM inside the RIOT chip
    Ram,

    /// Timer and I/O ports of the RIOT chip
    Riot,
}

impl Area {
    /// Whether the area belongs to the cartridge port
    #[inline]
    pub fn is_cartridge(self) -> bool {
        self == Area::Cartridge
    }
}

/// Result of decoding a CPU address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Address as it appears on the 13-bit bus
    pub bus: u16,

    /// Chip selected by the address
    pub area: Area,

    /// Offset local to the selected chip
    pub offset: u16,
}

/// Decode a CPU address into bus address, area and area-local offset.
///
/// TIA registers decode differently for reads and writes: reads only look
/// at the bottom four address lines while writes look at six.
pub fn decode(addr: u16, access: Access) -> Decoded {
    let bus = addr & BUS_MASK;

    let (area, offset) = if bus & CART_SELECT != 0 {
        (Area::Cartridge, bus & CART_MASK)
    } else if bus & 0x0080 == 0 {
        match access {
            Access::Read => (Area::Tia, bus & 0x000F),
            Access::Write => (Area::Tia, bus & 0x003F),
        }
    } else if bus & 0x0200 == 0 {
        (Area::Ram, bus & 0x007F)
    } else {
        (Area::Riot, bus & 0x001F)
    };

    Decoded { bus, area, offset }
}

/// Whether a CPU address selects the cartridge
#[inline]
pub fn is_cartridge(addr: u16) -> bool {
    addr & CART_SELECT != 0
}
