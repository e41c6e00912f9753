//! Snapshot implementation
//!
//! A snapshot captures the volatile state of the attached cartridge: bank
//! selections, RAM contents, register latches, tape position and coprocessor
//! state. ROM contents are never captured; a snapshot is tied to the image it
//! was taken from by the image's content hash.
//!
//! Snapshots are versioned and serialized using bincode with Serde.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coprocessor::{ThumbState, YieldReason};
use crate::mappers::ace::Gpio;
use crate::mappers::banking::RamState;
use crate::mappers::plusrom::Network;
use crate::mappers::supercharger::{Registers, TapeState};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur during snapshot operations
#[derive(Error, Debug)]
pub enum SaveStateError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Incompatible snapshot version: found {0}, expected {1}")]
    IncompatibleVersion(u32, u32),
}

/// Snapshot of a cartridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version
    version: u32,

    /// Content hash of the image the snapshot was taken from
    hash: String,

    /// Mapper-specific state
    state: MapperState,
}

impl Snapshot {
    pub fn new(hash: String, state: MapperState) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            hash,
            state,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn state(&self) -> &MapperState {
        &self.state
    }

    /// Serialize the snapshot
    pub fn to_bytes(&self) -> Result<Vec<u8>, SaveStateError> {
        bincode::serde::encode_to_vec(self, config())
            .map_err(|e| SaveStateError::SerializationError(e.to_string()))
    }

    /// Deserialize a snapshot, checking its version
    pub fn from_bytes(data: &[u8]) -> Result<Self, SaveStateError> {
        let (snapshot, _): (Snapshot, usize) = bincode::serde::decode_from_slice(data, config())
            .map_err(|e| SaveStateError::DeserializationError(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                "Snapshot version mismatch: found {}, expected {}",
                snapshot.version, SNAPSHOT_VERSION
            );
            return Err(SaveStateError::IncompatibleVersion(
                snapshot.version,
                SNAPSHOT_VERSION,
            ));
        }
        Ok(snapshot)
    }

    /// Save the snapshot to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveStateError> {
        let bytes = self.to_bytes()?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&bytes)?;
        info!("Snapshot saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Load a snapshot from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SaveStateError> {
        let mut file = File::open(path.as_ref())?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let snapshot = Self::from_bytes(&bytes)?;
        info!("Snapshot loaded from {}", path.as_ref().display());
        Ok(snapshot)
    }
}

/// Mapper-specific state data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapperState {
    /// Nothing attached
    Ejected,

    /// 2K, 4K, F8, F6 and F4, with or without superchip
    Atari(AtariState),

    /// E0
    Parker(ParkerState),

    /// 3F
    Tigervision(TigervisionState),

    /// E7
    MNetwork(MNetworkState),

    /// AR
    Supercharger(SuperchargerState),

    /// ARM coprocessor cartridge
    Ace(Box<AceState>),

    /// PlusROM container around another mapper
    PlusRom(Box<PlusRomState>),
}

impl MapperState {
    /// Name of the variant, used in mismatch errors
    pub fn name(&self) -> &'static str {
        match self {
            MapperState::Ejected => "ejected",
            MapperState::Atari(_) => "Atari",
            MapperState::Parker(_) => "E0",
            MapperState::Tigervision(_) => "3F",
            MapperState::MNetwork(_) => "E7",
            MapperState::Supercharger(_) => "AR",
            MapperState::Ace(_) => "ACE",
            MapperState::PlusRom(_) => "PlusROM",
        }
    }
}

/// Standard Atari state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtariState {
    pub bank: usize,
    pub superchip: Option<RamState>,
}

/// Parker Brothers state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkerState {
    pub segments: [usize; 4],
}

/// Tigervision state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TigervisionState {
    pub bank: usize,
}

/// M-Network state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MNetworkState {
    pub bank: usize,
    pub ram_1k: RamState,
    pub ram_256: RamState,
}

/// Supercharger state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperchargerState {
    pub registers: Registers,
    pub segments: [usize; 2],
    pub ram: Vec<Vec<u8>>,
    pub tape: TapeState,
}

/// ACE state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AceState {
    pub arm: ThumbState,
    pub sram: Vec<u8>,
    pub gpio: Gpio,
    pub halted: Option<YieldReason>,
    pub last_yield: Option<YieldReason>,
    pub stuffed: Option<u8>,
}

/// PlusROM state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlusRomState {
    pub child: MapperState,
    pub network: Network,
}

/// Create a bincode configuration optimized for size
fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}
