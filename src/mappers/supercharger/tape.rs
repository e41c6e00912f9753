//! Supercharger tapes
//!
//! A fast-load tape image is a sequence of 8448 byte loads. Each load is
//! 8192 bytes of data split into 256 byte pages followed by a 256 byte
//! header:
//!
//! - 0x00-0x01: start address
//! - 0x02: bank configuration to apply after loading
//! - 0x03: number of pages
//! - 0x04: checksum
//! - 0x05: multiload id
//! - 0x10..: page table, one byte per page (bits 0-1 RAM bank, bits 2-4 page)

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cartridge::CartError;
use crate::util::combine_bytes;

/// Size of one load on a fast-load tape
pub const LOAD_SIZE: usize = 8448;

const DATA_SIZE: usize = 8192;
const PAGE_SIZE: usize = 256;
const PAGE_TABLE: usize = 0x10;
const RAM_BANKS: usize = 3;

/// A load has been copied into RAM. The CPU driver is expected to jump to
/// `start_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastLoaded {
    /// Index of the load on the tape
    pub load: usize,
    pub start_address: u16,
    pub config: u8,
    pub multiload: u8,
}

/// Tape position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeCounter {
    /// Next load to be read
    pub position: usize,

    /// Number of loads on the tape
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeState {
    pub position: usize,
}

/// A source of Supercharger loads
pub trait Tape {
    /// Copy the next load into the RAM banks
    fn load(&mut self, ram: &mut [Vec<u8>]) -> Result<FastLoaded, CartError>;

    fn counter(&self) -> TapeCounter;

    fn rewind(&mut self);

    fn snapshot(&self) -> TapeState;

    fn restore(&mut self, state: &TapeState) -> Result<(), CartError>;
}

/// Fast-load tape image
#[derive(Debug)]
pub struct FastLoad {
    data: Vec<u8>,
    position: usize,
}

impl FastLoad {
    pub fn new(data: &[u8]) -> Result<Self, CartError> {
        if data.is_empty() || data.len() % LOAD_SIZE != 0 {
            return Err(CartError::WrongSize {
                mapping: "AR".to_string(),
                size: data.len(),
            });
        }

        let tape = FastLoad {
            data: data.to_vec(),
            position: 0,
        };
        for load in 0..tape.loads() {
            tape.check(load)?;
        }
        info!("Supercharger tape with {} load(s)", tape.loads());
        Ok(tape)
    }

    pub fn loads(&self) -> usize {
        self.data.len() / LOAD_SIZE
    }

    fn header(&self, load: usize) -> &[u8] {
        let start = load * LOAD_SIZE + DATA_SIZE;
        &self.data[start..start + PAGE_SIZE]
    }

    /// Validate the page table of a load
    fn check(&self, load: usize) -> Result<(), CartError> {
        let header = self.header(load);
        let pages = header[3] as usize;
        let malformed = |reason: String| CartError::Malformed {
            mapping: "AR".to_string(),
            reason: format!("load {}: {}", load, reason),
        };

        if pages > DATA_SIZE / PAGE_SIZE {
            return Err(malformed(format!("{} pages do not fit in a load", pages)));
        }
        for (j, &entry) in header[PAGE_TABLE..PAGE_TABLE + pages].iter().enumerate() {
            if (entry & 0x03) as usize >= RAM_BANKS {
                return Err(malformed(format!("page {} targets RAM bank {}", j, entry & 0x03)));
            }
        }
        Ok(())
    }
}

impl Tape for FastLoad {
    fn load(&mut self, ram: &mut [Vec<u8>]) -> Result<FastLoaded, CartError> {
        let load = self.position;
        let base = load * LOAD_SIZE;
        let header = self.header(load);
        let pages = header[3] as usize;

        for (j, &entry) in header[PAGE_TABLE..PAGE_TABLE + pages].iter().enumerate() {
            let bank = (entry & 0x03) as usize;
            let page = ((entry >> 2) & 0x07) as usize;
            let src = &self.data[base + j * PAGE_SIZE..base + (j + 1) * PAGE_SIZE];
            let dest = ram
                .get_mut(bank)
                .and_then(|b| b.get_mut(page * PAGE_SIZE..(page + 1) * PAGE_SIZE))
                .ok_or_else(|| CartError::Malformed {
                    mapping: "AR".to_string(),
                    reason: format!("page {} of load {} has nowhere to go", j, load),
                })?;
            dest.copy_from_slice(src);
        }

        let event = FastLoaded {
            load,
            start_address: combine_bytes(header[0], header[1]),
            config: header[2],
            multiload: header[5],
        };
        debug!(
            "Fast load {}: {} pages, checksum ${:02X}, start ${:04X}",
            load, pages, header[4], event.start_address
        );

        self.position = (load + 1) % self.loads();
        if self.position == 0 && self.loads() > 1 {
            info!("Supercharger tape wrapped around");
        }
        Ok(event)
    }

    fn counter(&self) -> TapeCounter {
        TapeCounter {
            position: self.position,
            length: self.loads(),
        }
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn snapshot(&self) -> TapeState {
        TapeState {
            position: self.position,
        }
    }

    fn restore(&mut self, state: &TapeState) -> Result<(), CartError> {
        if state.position >= self.loads() {
            return Err(CartError::SnapshotMismatch {
                expected: format!("tape of {} loads", self.loads()),
                found: format!("position {}", state.position),
            });
        }
        self.position = state.position;
        Ok(())
    }
}

/// Build a single fast-load image. Used by tests.
#[cfg(test)]
pub(crate) fn build_load(start: u16, config: u8, multiload: u8, pages: &[(u8, u8)], fill: u8) -> Vec<u8> {
    let mut load = vec![0u8; LOAD_SIZE];
    for (j, _) in pages.iter().enumerate() {
        for b in &mut load[j * PAGE_SIZE..(j + 1) * PAGE_SIZE] {
            *b = fill.wrapping_add(j as u8);
        }
    }
    let header = &mut load[DATA_SIZE..];
    header[0..2].copy_from_slice(&start.to_le_bytes());
    header[2] = config;
    header[3] = pages.len() as u8;
    header[5] = multiload;
    for (j, &(bank, page)) in pages.iter().enumerate() {
        header[PAGE_TABLE + j] = bank | (page << 2);
    }
    load
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ram() -> Vec<Vec<u8>> {
        vec![vec![0; 2048]; 3]
    }

    #[test]
    fn pages_land_where_the_table_says() {
        let image = build_load(0xF800, 0x0D, 7, &[(0, 0), (2, 7)], 0x40);
        let mut tape = FastLoad::new(&image).unwrap();
        let mut ram = ram();
        let event = tape.load(&mut ram).unwrap();

        assert_eq!(
            event,
            FastLoaded { load: 0, start_address: 0xF800, config: 0x0D, multiload: 7 }
        );
        assert_eq!(ram[0][0], 0x40);
        assert_eq!(ram[2][7 * 256 + 255], 0x41);
        assert_eq!(ram[1][0], 0);
    }

    #[test]
    fn loads_are_sequential_and_wrap() {
        let mut image = build_load(0xF000, 0, 0, &[(0, 0)], 1);
        image.extend(build_load(0xF100, 0, 1, &[(0, 0)], 2));
        let mut tape = FastLoad::new(&image).unwrap();
        let mut ram = ram();

        assert_eq!(tape.counter(), TapeCounter { position: 0, length: 2 });
        assert_eq!(tape.load(&mut ram).unwrap().multiload, 0);
        assert_eq!(tape.load(&mut ram).unwrap().multiload, 1);
        assert_eq!(ram[0][0], 2);
        assert_eq!(tape.counter().position, 0);

        tape.load(&mut ram).unwrap();
        tape.rewind();
        assert_eq!(tape.counter().position, 0);
    }

    #[test]
    fn bad_tapes_are_rejected() {
        assert_matches!(FastLoad::new(&[0; 8000]), Err(CartError::WrongSize { .. }));

        let image = build_load(0, 0, 0, &[(3, 0)], 0);
        assert_matches!(FastLoad::new(&image), Err(CartError::Malformed { .. }));

        let mut image = build_load(0, 0, 0, &[], 0);
        image[DATA_SIZE + 3] = 40;
        assert_matches!(FastLoad::new(&image), Err(CartError::Malformed { .. }));
    }
}
