//! Cartridge coprocessors
//!
//! Some cartridges carry an ARM microcontroller that runs alongside the 6507
//! and answers the cartridge port itself. The coprocessor here is a
//! resumable interpreter: it runs until it needs something from the 6507
//! side, then yields, and picks up where it left off the next time the
//! cartridge is accessed. All of its state is plain data so it can be
//! snapshotted.

pub mod thumb;

pub use thumb::{Thumb, ThumbState};

use serde::{Deserialize, Serialize};

/// Why the coprocessor handed control back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YieldReason {
    /// Waiting for the 6507 to present the next bus address
    SyncWithVcs,

    /// Returned to the program-end sentinel
    ProgramEnded,

    /// Reached an enabled breakpoint
    Breakpoint,

    /// Accessed memory that does not exist
    MemoryFault(u32),

    /// Executed an instruction the core does not implement
    UndefinedInstruction(u16),

    /// Tried to switch to ARM state
    ArmState(u32),

    /// Ran for the whole cycle budget without yielding
    Runaway,
}

impl YieldReason {
    /// Whether the yield indicates a fault in the coprocessor program
    pub fn is_error(self) -> bool {
        matches!(
            self,
            YieldReason::MemoryFault(_)
                | YieldReason::UndefinedInstruction(_)
                | YieldReason::ArmState(_)
                | YieldReason::Runaway
        )
    }
}

/// Callback invoked after every yield with the reason and the program counter
pub type YieldHook = Box<dyn FnMut(YieldReason, u32)>;

/// An access that did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The coprocessor must wait for the 6507
    Yield,

    /// Nothing answers the address
    Fault(u32),
}

/// Memory seen by a coprocessor
///
/// Reads may yield instead of returning data. An instruction that receives a
/// yield must not have changed any state so it can run again on resume.
pub trait CoprocMemory {
    fn read8(&mut self, addr: u32) -> Result<u8, Interrupt>;
    fn read16(&mut self, addr: u32) -> Result<u16, Interrupt>;
    fn read32(&mut self, addr: u32) -> Result<u32, Interrupt>;
    fn write8(&mut self, addr: u32, data: u8) -> Result<(), Interrupt>;
    fn write16(&mut self, addr: u32, data: u16) -> Result<(), Interrupt>;
    fn write32(&mut self, addr: u32, data: u32) -> Result<(), Interrupt>;

    /// Read a word without side effects
    fn peek32(&self, addr: u32) -> Option<u32>;
}
