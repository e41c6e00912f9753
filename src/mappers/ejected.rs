//! Stub mapper used when nothing is attached

use crate::cartridge::{BusFault, CartError};
use crate::config::CartConfig;
use crate::memory::CART_ORIGIN;
use crate::savestate::MapperState;

use super::{mismatch, unsupported, BankInfo, CartMapper};

/// Empty cartridge slot. Every access is a bus error.
#[derive(Debug, Default)]
pub struct Ejected;

impl Ejected {
    pub const ID: &'static str = "-";

    pub fn new() -> Self {
        Ejected
    }

    fn fault(addr: u16) -> CartError {
        CartError::BusError(CART_ORIGIN | addr, BusFault::Ejected)
    }
}

impl CartMapper for Ejected {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn mapping(&self) -> String {
        Self::ID.to_string()
    }

    fn reset(&mut self, _config: &CartConfig) {}

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        Err(Self::fault(addr))
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        Err(Self::fault(addr))
    }

    fn write(&mut self, addr: u16, _data: u8) -> Result<(), CartError> {
        Err(Self::fault(addr))
    }

    fn poke(&mut self, addr: u16, _data: u8) -> Result<(), CartError> {
        Err(Self::fault(addr))
    }

    fn patch(&mut self, _offset: usize, _data: u8) -> Result<(), CartError> {
        Err(unsupported("patch", Self::ID))
    }

    fn num_banks(&self) -> usize {
        0
    }

    fn get_bank(&self, _addr: u16) -> BankInfo {
        BankInfo::default()
    }

    fn set_bank(&mut self, _addr: u16, _bank: usize) -> Result<(), CartError> {
        Err(unsupported("set bank", Self::ID))
    }

    fn snapshot(&self) -> MapperState {
        MapperState::Ejected
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        match state {
            MapperState::Ejected => Ok(()),
            other => Err(mismatch("ejected", other)),
        }
    }
}
