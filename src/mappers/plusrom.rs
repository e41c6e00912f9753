//! PlusROM container
//!
//! PlusROM cartridges talk to a web service through four hotspots layered
//! over whatever bank-switching scheme the cartridge otherwise uses:
//!
//! - write `$FF0`: append a byte to the send buffer
//! - write `$FF1`: append a byte and transmit the send buffer
//! - read `$FF2`: next byte of the receive buffer
//! - read `$FF3`: number of bytes in the receive buffer
//!
//! The host and path of the service are NUL-terminated strings stored where
//! the NMI vector of the last 4K bank points. The 2600 has no NMI, so the
//! vector is free for this purpose.
//!
//! Networking itself is left to the host application, which collects
//! transmissions with `Network::take_transmissions` and feeds responses back
//! with `Network::receive`.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cartridge::CartError;
use crate::config::CartConfig;
use crate::savestate::{MapperState, PlusRomState};
use crate::util::combine_bytes;

use super::{
    mismatch, BankInfo, BusStuffer, CartMapper, ContainerBus, CoprocessorBus, HotLoader,
    HotspotInfo, HotspotKind, HotspotsBus, RamBus, RegistersBus, TapeBus,
};

const SEND_BYTE: u16 = 0xFF0;
const SEND_AND_TRANSMIT: u16 = 0xFF1;
const RECEIVE_BYTE: u16 = 0xFF2;
const RECEIVE_LENGTH: u16 = 0xFF3;

/// Capacity of the send buffer
const BUFFER_SIZE: usize = 256;

/// Capacity of the receive buffer, bounded by what `$FF3` can report
const RECEIVE_CAPACITY: usize = u8::MAX as usize;

const BANK_SIZE: usize = 4096;
const NMI_VECTOR: usize = 0xFFA;

/// Where a PlusROM sends its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlusRomAddress {
    pub host: String,
    pub path: String,
}

impl PlusRomAddress {
    /// Read the host and path from a cartridge image
    pub fn from_image(data: &[u8]) -> Result<Self, CartError> {
        if data.len() < BANK_SIZE {
            return Err(CartError::NotPlusRom(format!(
                "{} bytes is too small to hold a PlusROM address",
                data.len()
            )));
        }

        let bank = &data[data.len() - BANK_SIZE..];
        let vector = combine_bytes(bank[NMI_VECTOR], bank[NMI_VECTOR + 1]);
        let start = (vector & 0x0FFF) as usize;

        let (path, next) = read_string(bank, start)?;
        let (host, _) = read_string(bank, next)?;
        if host.is_empty() {
            return Err(CartError::NotPlusRom(format!(
                "no host name at NMI vector ${:04X}",
                vector
            )));
        }

        Ok(PlusRomAddress { host, path })
    }
}

impl fmt::Display for PlusRomAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.path)
    }
}

/// NUL-terminated printable string. Returns the string and the offset after
/// the terminator.
fn read_string(bank: &[u8], start: usize) -> Result<(String, usize), CartError> {
    let mut s = String::new();
    for (i, &b) in bank.iter().enumerate().skip(start) {
        match b {
            0 => return Ok((s, i + 1)),
            0x20..=0x7E => s.push(b as char),
            _ => {
                return Err(CartError::NotPlusRom(format!(
                    "unprintable byte ${:02X} in address string",
                    b
                )))
            }
        }
    }
    Err(CartError::NotPlusRom("unterminated address string".to_string()))
}

/// A completed send buffer waiting for the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub host: String,
    pub path: String,
    pub payload: Vec<u8>,
}

/// Send and receive buffers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Network {
    send: Vec<u8>,
    recv: VecDeque<u8>,
    connected: bool,

    /// Transmissions not yet collected. Belongs to the host side and is
    /// never part of a snapshot.
    #[serde(skip)]
    outbox: Vec<Transmission>,
}

impl Network {
    pub fn new(connected: bool) -> Self {
        Network {
            connected,
            ..Default::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Transmissions made while offline are dropped
    pub fn set_connected(&mut self, connected: bool) {
        info!("PlusROM network {}", if connected { "connected" } else { "disconnected" });
        self.connected = connected;
    }

    /// Queue response bytes for the cartridge
    pub fn receive(&mut self, data: &[u8]) {
        let room = RECEIVE_CAPACITY.saturating_sub(self.recv.len());
        if data.len() > room {
            warn!("PlusROM receive buffer full, dropping {} bytes", data.len() - room);
        }
        self.recv.extend(data.iter().take(room));
    }

    /// Collect everything transmitted since the last call
    pub fn take_transmissions(&mut self) -> Vec<Transmission> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_send(&self) -> &[u8] {
        &self.send
    }

    pub fn pending_receive(&self) -> usize {
        self.recv.len()
    }

    fn append(&mut self, data: u8) {
        if self.send.len() < BUFFER_SIZE {
            self.send.push(data);
        } else {
            warn!("PlusROM send buffer full, dropping ${:02X}", data);
        }
    }

    fn transmit(&mut self, address: &PlusRomAddress) {
        let payload = std::mem::take(&mut self.send);
        if !self.connected {
            warn!("PlusROM offline, dropping {} bytes for {}", payload.len(), address);
            return;
        }
        debug!("PlusROM transmits {} bytes to {}", payload.len(), address);
        self.outbox.push(Transmission {
            host: address.host.clone(),
            path: address.path.clone(),
            payload,
        });
    }

    /// Copy of the buffers suitable for a snapshot
    fn snapshot(&self) -> Network {
        Network {
            send: self.send.clone(),
            recv: self.recv.clone(),
            connected: self.connected,
            outbox: Vec::new(),
        }
    }
}

/// PlusROM wrapped around another mapper
pub struct PlusRom {
    child: Box<dyn CartMapper>,
    address: PlusRomAddress,
    network: Network,
}

impl PlusRom {
    pub const ID: &'static str = "PlusROM";

    pub fn new(child: Box<dyn CartMapper>, address: PlusRomAddress, config: &CartConfig) -> Self {
        PlusRom {
            child,
            address,
            network: Network::new(config.plusrom_connected),
        }
    }
}

impl CartMapper for PlusRom {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn mapping(&self) -> String {
        format!("{}+{}", self.child.mapping(), Self::ID)
    }

    fn reset(&mut self, config: &CartConfig) {
        self.child.reset(config);
        self.network = Network::new(config.plusrom_connected);
    }

    fn read(&mut self, addr: u16) -> Result<u8, CartError> {
        match addr {
            RECEIVE_BYTE => Ok(self.network.recv.pop_front().unwrap_or(0)),
            RECEIVE_LENGTH => Ok(self.network.recv.len() as u8),
            _ => self.child.read(addr),
        }
    }

    fn peek(&self, addr: u16) -> Result<u8, CartError> {
        match addr {
            RECEIVE_BYTE => Ok(self.network.recv.front().copied().unwrap_or(0)),
            RECEIVE_LENGTH => Ok(self.network.recv.len() as u8),
            _ => self.child.peek(addr),
        }
    }

    fn write(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        match addr {
            SEND_BYTE => self.network.append(data),
            SEND_AND_TRANSMIT => {
                self.network.append(data);
                self.network.transmit(&self.address);
            }
            _ => return self.child.write(addr, data),
        }
        Ok(())
    }

    fn poke(&mut self, addr: u16, data: u8) -> Result<(), CartError> {
        self.child.poke(addr, data)
    }

    fn patch(&mut self, offset: usize, data: u8) -> Result<(), CartError> {
        self.child.patch(offset, data)
    }

    fn access_passive(&mut self, bus_addr: u16, data: u8) {
        self.child.access_passive(bus_addr, data)
    }

    fn step(&mut self, clock_mhz: f32) {
        self.child.step(clock_mhz)
    }

    fn num_banks(&self) -> usize {
        self.child.num_banks()
    }

    fn get_bank(&self, addr: u16) -> BankInfo {
        self.child.get_bank(addr)
    }

    fn set_bank(&mut self, addr: u16, bank: usize) -> Result<(), CartError> {
        self.child.set_bank(addr, bank)
    }

    fn snapshot(&self) -> MapperState {
        MapperState::PlusRom(Box::new(PlusRomState {
            child: self.child.snapshot(),
            network: self.network.snapshot(),
        }))
    }

    fn restore(&mut self, state: &MapperState) -> Result<(), CartError> {
        let MapperState::PlusRom(state) = state else {
            return Err(mismatch(Self::ID, state));
        };
        self.child.restore(&state.child)?;
        self.network.send = state.network.send.clone();
        self.network.recv = state.network.recv.clone();
        self.network.connected = state.network.connected;
        Ok(())
    }

    fn ram_bus(&mut self) -> Option<&mut dyn RamBus> {
        self.child.ram_bus()
    }

    fn registers_bus(&mut self) -> Option<&mut dyn RegistersBus> {
        self.child.registers_bus()
    }

    fn tape_bus(&mut self) -> Option<&mut dyn TapeBus> {
        self.child.tape_bus()
    }

    fn coprocessor_bus(&mut self) -> Option<&mut dyn CoprocessorBus> {
        self.child.coprocessor_bus()
    }

    fn hotspots_bus(&self) -> Option<&dyn HotspotsBus> {
        Some(self)
    }

    fn container_bus(&mut self) -> Option<&mut dyn ContainerBus> {
        Some(self)
    }

    fn hot_loader(&mut self) -> Option<&mut dyn HotLoader> {
        self.child.hot_loader()
    }

    fn bus_stuffer(&mut self) -> Option<&mut dyn BusStuffer> {
        self.child.bus_stuffer()
    }
}

impl HotspotsBus for PlusRom {
    fn read_hotspots(&self) -> Vec<HotspotInfo> {
        let mut hotspots = self
            .child
            .hotspots_bus()
            .map(|h| h.read_hotspots())
            .unwrap_or_default();
        hotspots.push(HotspotInfo { addr: RECEIVE_BYTE, kind: HotspotKind::Function, label: "receive byte" });
        hotspots.push(HotspotInfo { addr: RECEIVE_LENGTH, kind: HotspotKind::Register, label: "receive length" });
        hotspots
    }

    fn write_hotspots(&self) -> Vec<HotspotInfo> {
        let mut hotspots = self
            .child
            .hotspots_bus()
            .map(|h| h.write_hotspots())
            .unwrap_or_default();
        hotspots.push(HotspotInfo { addr: SEND_BYTE, kind: HotspotKind::Function, label: "send byte" });
        hotspots.push(HotspotInfo { addr: SEND_AND_TRANSMIT, kind: HotspotKind::Function, label: "send and transmit" });
        hotspots
    }
}

impl ContainerBus for PlusRom {
    fn container_id(&self) -> &'static str {
        Self::ID
    }

    fn contained_mapping(&self) -> String {
        self.child.mapping()
    }

    fn network(&mut self) -> Option<&mut Network> {
        Some(&mut self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Mapping;
    use crate::mappers::Atari;
    use assert_matches::assert_matches;

    /// F8 image with a PlusROM address at $FE00 of the last bank
    fn image() -> Vec<u8> {
        let mut data = vec![0xEA; 8192];
        let bank = &mut data[4096..];
        let strings = b"api.php\0h.firmaplus.de\0";
        bank[0xE00..0xE00 + strings.len()].copy_from_slice(strings);
        bank[NMI_VECTOR] = 0x00;
        bank[NMI_VECTOR + 1] = 0xFE;
        data
    }

    fn plusrom(connected: bool) -> PlusRom {
        let data = image();
        let config = CartConfig {
            plusrom_connected: connected,
            ..Default::default()
        };
        let child = Box::new(Atari::new(Mapping::new(crate::loader::Scheme::F8), &data, &config).unwrap());
        PlusRom::new(child, PlusRomAddress::from_image(&data).unwrap(), &config)
    }

    #[test]
    fn address_from_nmi_vector() {
        let address = PlusRomAddress::from_image(&image()).unwrap();
        assert_eq!(address.host, "h.firmaplus.de");
        assert_eq!(address.path, "api.php");
        assert_eq!(address.to_string(), "h.firmaplus.de/api.php");
    }

    #[test]
    fn false_positives_are_not_plusroms() {
        let mut data = image();
        data[4096 + 0xE00 + 3] = 0x01;
        assert_matches!(PlusRomAddress::from_image(&data), Err(CartError::NotPlusRom(_)));

        let mut data = image();
        data[4096 + 0xE00 + 8] = 0;
        assert_matches!(PlusRomAddress::from_image(&data), Err(CartError::NotPlusRom(_)));

        assert_matches!(PlusRomAddress::from_image(&[0; 2048]), Err(CartError::NotPlusRom(_)));
        assert_matches!(PlusRomAddress::from_image(&vec![0x41; 4096]), Err(CartError::NotPlusRom(_)));
    }

    #[test]
    fn send_and_receive() {
        let mut cart = plusrom(true);
        cart.write(SEND_BYTE, 1).unwrap();
        cart.write(SEND_BYTE, 2).unwrap();
        cart.write(SEND_AND_TRANSMIT, 3).unwrap();

        let network = cart.network().unwrap();
        let sent = network.take_transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, vec![1, 2, 3]);
        assert_eq!(sent[0].host, "h.firmaplus.de");
        assert!(network.take_transmissions().is_empty());

        network.receive(&[9, 8]);
        assert_eq!(cart.read(RECEIVE_LENGTH).unwrap(), 2);
        assert_eq!(cart.peek(RECEIVE_BYTE).unwrap(), 9);
        assert_eq!(cart.read(RECEIVE_BYTE).unwrap(), 9);
        assert_eq!(cart.read(RECEIVE_BYTE).unwrap(), 8);
        assert_eq!(cart.read(RECEIVE_BYTE).unwrap(), 0);
        assert_eq!(cart.read(RECEIVE_LENGTH).unwrap(), 0);
    }

    #[test]
    fn receive_buffer_stops_at_the_reportable_length() {
        let mut cart = plusrom(true);
        cart.network().unwrap().receive(&[7; 256]);
        assert_eq!(cart.read(RECEIVE_LENGTH).unwrap(), 255);
        cart.network().unwrap().receive(&[1]);
        assert_eq!(cart.read(RECEIVE_LENGTH).unwrap(), 255);
        assert_eq!(cart.read(RECEIVE_BYTE).unwrap(), 7);
        assert_eq!(cart.read(RECEIVE_LENGTH).unwrap(), 254);
    }

    #[test]
    fn offline_transmissions_are_dropped() {
        let mut cart = plusrom(false);
        cart.write(SEND_AND_TRANSMIT, 3).unwrap();
        let network = cart.network().unwrap();
        assert!(network.take_transmissions().is_empty());
        assert!(network.pending_send().is_empty());
    }

    #[test]
    fn everything_else_is_delegated() {
        let mut cart = plusrom(true);
        assert_eq!(cart.mapping(), "F8+PlusROM");
        assert_eq!(cart.contained_mapping(), "F8");
        cart.read(0xFF9).unwrap();
        assert_eq!(cart.get_bank(0x000).number, 1);
        assert_eq!(cart.num_banks(), 2);

        let writes = cart.write_hotspots();
        assert!(writes.iter().any(|h| h.addr == 0xFF8));
        assert!(writes.iter().any(|h| h.addr == SEND_AND_TRANSMIT));
    }

    #[test]
    fn snapshot_includes_child_and_buffers() {
        let mut cart = plusrom(true);
        cart.write(SEND_BYTE, 7).unwrap();
        cart.network().unwrap().receive(&[5]);
        cart.read(0xFF9).unwrap();
        let state = cart.snapshot();

        cart.read(0xFF8).unwrap();
        cart.read(RECEIVE_BYTE).unwrap();
        cart.write(SEND_AND_TRANSMIT, 1).unwrap();
        cart.restore(&state).unwrap();

        assert_eq!(cart.get_bank(0x000).number, 1);
        assert_eq!(cart.peek(RECEIVE_BYTE).unwrap(), 5);
        assert_eq!(cart.network().unwrap().pending_send(), &[7]);
        assert_eq!(cart.snapshot(), state);
        assert_eq!(cart.network().unwrap().take_transmissions().len(), 1);
    }
}
