//! Utility functions and helpers
//!
//! Small byte-twiddling and formatting helpers shared by the mappers and the
//! command line tool.

use std::fmt::Write;

/// Combine two 8-bit values into a 16-bit value (little-endian)
#[inline]
pub fn combine_bytes(low: u8, high: u8) -> u16 {
    u16::from_le_bytes([low, high])
}

/// Read a little-endian 32-bit value. Bytes past the end of `data` read as
/// zero.
pub fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = data.get(offset + i).copied().unwrap_or(0);
    }
    u32::from_le_bytes(bytes)
}

/// Check if a bit is set in a byte
#[inline]
pub fn check_bit(value: u8, bit: u8) -> bool {
    (value & (1 << bit)) != 0
}

/// Format a 16-bit address as a hex string
pub fn format_addr(addr: u16) -> String {
    format!("${:04X}", addr)
}

/// Hexdump of a memory region
pub fn hexdump(data: &[u8], start_addr: u16) -> String {
    let mut out = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        let addr = start_addr.wrapping_add((i * 16) as u16);
        let _ = write!(out, "{:04X}: ", addr);

        for (j, byte) in chunk.iter().enumerate() {
            let _ = write!(out, "{:02X} ", byte);
            if j == 7 {
                out.push(' ');
            }
        }

        // Padding for incomplete lines
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        if chunk.len() <= 8 {
            out.push(' ');
        }

        out.push_str(" |");
        for &byte in chunk {
            out.push(if (0x20..0x7F).contains(&byte) { byte as char } else { '.' });
        }
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_helpers() {
        assert_eq!(combine_bytes(0x34, 0x12), 0x1234);
        assert_eq!(read_u32_le(&[0x78, 0x56, 0x34, 0x12], 0), 0x1234_5678);
        assert_eq!(read_u32_le(&[0xFF], 0), 0xFF);
        assert!(check_bit(0b0000_0010, 1));
        assert_eq!(format_addr(0x1FF8), "$1FF8");
    }

    #[test]
    fn hexdump_layout() {
        let dump = hexdump(b"ACE-2600\x00\x01", 0x1000);
        assert_eq!(
            dump,
            format!("1000: 41 43 45 2D 32 36 30 30  00 01 {}|ACE-2600..|\n", " ".repeat(19))
        );
    }
}
