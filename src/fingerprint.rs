//! Cartridge fingerprinting
//!
//! Guesses the bank-switching scheme of an image from its size and from
//! opcode sequences that only make sense for a particular scheme. Every
//! check is a linear scan, so identifying an image is cheap even for the
//! largest 3F cartridges.

use log::debug;

use crate::cartridge::CartError;
use crate::loader::{Mapping, Scheme};
use crate::mappers::ace::MAGIC;
use crate::mappers::supercharger::LOAD_SIZE;

/// Largest image a 3F cartridge can address
const MAX_TIGERVISION_SIZE: usize = 512 * 1024;

/// Hotspot accesses typical of Parker Brothers games
const E0_SIGNATURES: [[u8; 3]; 8] = [
    [0x8D, 0xE0, 0x1F], // STA $1FE0
    [0x8D, 0xE0, 0x5F], // STA $5FE0
    [0x8D, 0xE9, 0xFF], // STA $FFE9
    [0x0C, 0xE0, 0x1F], // NOP $1FE0
    [0xAD, 0xE0, 0x1F], // LDA $1FE0
    [0xAD, 0xE9, 0xFF], // LDA $FFE9
    [0xAD, 0xED, 0xFF], // LDA $FFED
    [0xAD, 0xF3, 0xBF], // LDA $BFF3
];

/// Hotspot accesses typical of M-Network games
const E7_SIGNATURES: [[u8; 3]; 7] = [
    [0xAD, 0xE2, 0xFF], // LDA $FFE2
    [0xAD, 0xE5, 0xFF], // LDA $FFE5
    [0xAD, 0xE5, 0x1F], // LDA $1FE5
    [0xAD, 0xE7, 0x1F], // LDA $1FE7
    [0x0C, 0xE7, 0x1F], // NOP $1FE7
    [0x8D, 0xE7, 0xFF], // STA $FFE7
    [0x8D, 0xE7, 0x1F], // STA $1FE7
];

/// STA $3F, the Tigervision bank switch
const TIGERVISION_SIGNATURE: [u8; 2] = [0x85, 0x3F];

/// STA $1FF1 / STA $FFF1, the PlusROM transmit hotspot
const PLUSROM_SIGNATURES: [[u8; 3]; 2] = [[0x8D, 0xF1, 0x1F], [0x8D, 0xF1, 0xFF]];

fn count(data: &[u8], pattern: &[u8]) -> usize {
    data.windows(pattern.len()).filter(|w| *w == pattern).count()
}

fn contains_any(data: &[u8], patterns: &[[u8; 3]]) -> bool {
    data.windows(3).any(|w| patterns.iter().any(|p| w == p))
}

fn is_parker(data: &[u8]) -> bool {
    contains_any(data, &E0_SIGNATURES)
}

fn is_mnetwork(data: &[u8]) -> bool {
    contains_any(data, &E7_SIGNATURES)
}

fn is_tigervision(data: &[u8]) -> bool {
    count(data, &TIGERVISION_SIGNATURE) >= 2
}

/// Superchip RAM reads back whatever was last written, and images dumped
/// from such cartridges carry identical filler in the write and read ports
/// of every bank.
fn has_superchip(data: &[u8]) -> bool {
    data.len() >= 4096
        && data
            .chunks(4096)
            .all(|bank| bank.len() >= 0x100 && bank[..0x80] == bank[0x80..0x100])
}

fn atari(scheme: Scheme, data: &[u8]) -> Mapping {
    if has_superchip(data) {
        Mapping::with_superchip(scheme)
    } else {
        Mapping::new(scheme)
    }
}

/// Identify the mapping of a cartridge image
pub fn identify(data: &[u8]) -> Result<Mapping, CartError> {
    if data.starts_with(MAGIC) {
        return Ok(Mapping::new(Scheme::Ace));
    }
    if !data.is_empty() && data.len() % LOAD_SIZE == 0 {
        return Ok(Mapping::new(Scheme::Supercharger));
    }

    let mapping = match data.len() {
        2048 => Mapping::new(Scheme::Atari2K),
        4096 => atari(Scheme::Atari4K, data),
        8192 if is_parker(data) => Mapping::new(Scheme::E0),
        8192 if is_tigervision(data) => Mapping::new(Scheme::Tigervision),
        8192 => atari(Scheme::F8, data),
        16384 if is_mnetwork(data) => Mapping::new(Scheme::E7),
        16384 if is_tigervision(data) => Mapping::new(Scheme::Tigervision),
        16384 => atari(Scheme::F6, data),
        32768 if is_tigervision(data) => Mapping::new(Scheme::Tigervision),
        32768 => atari(Scheme::F4, data),
        n if n > 0 && n % 2048 == 0 && n <= MAX_TIGERVISION_SIZE && is_tigervision(data) => {
            Mapping::new(Scheme::Tigervision)
        }
        n => return Err(CartError::UnrecognisedSize(n)),
    };

    debug!("Fingerprint of {} bytes: {}", data.len(), mapping);
    Ok(mapping)
}

/// The image may be a PlusROM. Confirmed by parsing the address strings.
pub fn plusrom_candidate(data: &[u8]) -> bool {
    contains_any(data, &PLUSROM_SIGNATURES)
}
