//! Memory map seen by the ACE coprocessor
//!
//! - 0x0800_0000: flash, holding the whole cartridge image
//! - 0x1FFF_0000: firmware vector table, every entry pointing at a stub
//! - 0x2000_0000: 32KB SRAM, stack at the top
//! - 0x4002_0000: GPIO ports connected to the cartridge port

use serde::{Deserialize, Serialize};

use crate::coprocessor::{CoprocMemory, Interrupt};

pub const FLASH_ORIGIN: u32 = 0x0800_0000;

pub const SRAM_ORIGIN: u32 = 0x2000_0000;
pub const SRAM_SIZE: usize = 0x8000;

pub const FIRMWARE_ORIGIN: u32 = 0x1FFF_0000;
const FIRMWARE_VECTORS: u32 = 16;

/// Firmware routine every vector points at: `MOVS r0,#1; BX LR`
pub const STUB_ADDR: u32 = 0x1FFF_0100;
const STUB: [u8; 4] = [0x01, 0x20, 0x70, 0x47];

/// Return address marking the end of the driver program
pub const PROGRAM_END: u32 = 0x1FFF_0200;

const GPIO_ORIGIN: u32 = 0x4002_0000;
const GPIO_MEMTOP: u32 = 0x4002_07FF;

/// Address bus input: the 13-bit address presented by the 6507
pub const ADDR_IDR: u32 = 0x4002_0010;
/// Data bus direction; non-zero drives the data bus
pub const DATA_MODER: u32 = 0x4002_0400;
/// Data bus input: the byte written by the 6507
pub const DATA_IDR: u32 = 0x4002_0410;
/// Data bus output: the byte presented to the 6507
pub const DATA_ODR: u32 = 0x4002_0414;

/// GPIO state shared between the 6507 bus and the coprocessor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gpio {
    /// Last address presented by the 6507
    pub address: u16,

    /// The coprocessor has not read `address` yet
    pub address_fresh: bool,

    pub data_in: u8,
    pub data_out: u32,
    pub data_moder: u32,
}

impl Gpio {
    /// Present a bus cycle to the coprocessor
    pub fn present(&mut self, address: u16, data: Option<u8>) {
        self.address = address;
        self.address_fresh = true;
        if let Some(data) = data {
            self.data_in = data;
        }
    }

    /// Whether the coprocessor is driving the data bus
    pub fn driving(&self) -> bool {
        self.data_moder & 0xFFFF != 0
    }

    pub fn output(&self) -> u8 {
        self.data_out as u8
    }

    fn register(&self, reg: u32) -> Option<u32> {
        match reg {
            ADDR_IDR => Some(self.address as u32),
            DATA_IDR => Some(self.data_in as u32),
            DATA_ODR => Some(self.data_out),
            DATA_MODER => Some(self.data_moder),
            _ => None,
        }
    }
}

fn firmware_byte(addr: u32) -> Option<u8> {
    let offset = addr.checked_sub(FIRMWARE_ORIGIN)?;
    if offset < FIRMWARE_VECTORS * 4 {
        Some(((STUB_ADDR | 1) >> ((offset & 3) * 8)) as u8)
    } else if (STUB_ADDR..STUB_ADDR + STUB.len() as u32).contains(&addr) {
        Some(STUB[(addr - STUB_ADDR) as usize])
    } else {
        None
    }
}

fn memory_byte(flash: &[u8], sram: &[u8], addr: u32) -> Option<u8> {
    if let Some(offset) = addr.checked_sub(FLASH_ORIGIN) {
        if let Some(&b) = flash.get(offset as usize) {
            return Some(b);
        }
    }
    if let Some(offset) = addr.checked_sub(SRAM_ORIGIN) {
        if let Some(&b) = sram.get(offset as usize) {
            return Some(b);
        }
    }
    firmware_byte(addr)
}

#[inline]
fn is_gpio(addr: u32) -> bool {
    (GPIO_ORIGIN..=GPIO_MEMTOP).contains(&addr)
}

/// Side-effect free word read
pub fn peek_word(flash: &[u8], sram: &[u8], gpio: &Gpio, addr: u32) -> Option<u32> {
    if is_gpio(addr) {
        return gpio.register(addr & !3).map(|v| v >> ((addr & 3) * 8));
    }
    let mut word = 0u32;
    for i in 0..4 {
        word |= (memory_byte(flash, sram, addr.wrapping_add(i))? as u32) << (i * 8);
    }
    Some(word)
}

/// Coprocessor view of the cartridge for one activation
pub struct AceBus<'a> {
    flash: &'a [u8],
    sram: &'a mut [u8],
    gpio: &'a mut Gpio,
}

impl<'a> AceBus<'a> {
    pub fn new(flash: &'a [u8], sram: &'a mut [u8], gpio: &'a mut Gpio) -> Self {
        AceBus { flash, sram, gpio }
    }

    fn read(&mut self, addr: u32, width: u32) -> Result<u32, Interrupt> {
        if is_gpio(addr) {
            let reg = addr & !3;
            if reg == ADDR_IDR {
                if !self.gpio.address_fresh {
                    return Err(Interrupt::Yield);
                }
                self.gpio.address_fresh = false;
            }
            let value = self.gpio.register(reg).ok_or(Interrupt::Fault(addr))?;
            return Ok((value >> ((addr & 3) * 8)) & mask(width));
        }

        let mut value = 0u32;
        for i in 0..width {
            let a = addr.wrapping_add(i);
            let b = memory_byte(self.flash, &*self.sram, a).ok_or(Interrupt::Fault(a))?;
            value |= (b as u32) << (i * 8);
        }
        Ok(value)
    }

    fn write(&mut self, addr: u32, value: u32, width: u32) -> Result<(), Interrupt> {
        if is_gpio(addr) {
            let target = match addr & !3 {
                DATA_ODR => &mut self.gpio.data_out,
                DATA_MODER => &mut self.gpio.data_moder,
                _ => return Err(Interrupt::Fault(addr)),
            };
            let shift = (addr & 3) * 8;
            let m = mask(width) << shift;
            *target = (*target & !m) | ((value << shift) & m);
            return Ok(());
        }

        let offset = addr.wrapping_sub(SRAM_ORIGIN) as usize;
        if addr < SRAM_ORIGIN || offset + width as usize > self.sram.len() {
            return Err(Interrupt::Fault(addr));
        }
        for i in 0..width as usize {
            self.sram[offset + i] = (value >> (i * 8)) as u8;
        }
        Ok(())
    }
}

#[inline]
fn mask(width: u32) -> u32 {
    match width {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => 0xFFFF_FFFF,
    }
}

impl CoprocMemory for AceBus<'_> {
    fn read8(&mut self, addr: u32) -> Result<u8, Interrupt> {
        self.read(addr, 1).map(|v| v as u8)
    }

    fn read16(&mut self, addr: u32) -> Result<u16, Interrupt> {
        self.read(addr, 2).map(|v| v as u16)
    }

    fn read32(&mut self, addr: u32) -> Result<u32, Interrupt> {
        self.read(addr, 4)
    }

    fn write8(&mut self, addr: u32, data: u8) -> Result<(), Interrupt> {
        self.write(addr, data as u32, 1)
    }

    fn write16(&mut self, addr: u32, data: u16) -> Result<(), Interrupt> {
        self.write(addr, data as u32, 2)
    }

    fn write32(&mut self, addr: u32, data: u32) -> Result<(), Interrupt> {
        self.write(addr, data, 4)
    }

    fn peek32(&self, addr: u32) -> Option<u32> {
        peek_word(self.flash, &*self.sram, &*self.gpio, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_vectors_point_at_stub() {
        let gpio = Gpio::default();
        assert_eq!(peek_word(&[], &[], &gpio, FIRMWARE_ORIGIN + 0x3C), Some(STUB_ADDR | 1));
        assert_eq!(peek_word(&[], &[], &gpio, STUB_ADDR), Some(0x4770_2001));
        assert_eq!(peek_word(&[], &[], &gpio, FIRMWARE_ORIGIN + 0x40), None);
    }

    #[test]
    fn address_register_yields_once_consumed() {
        let flash = [0u8; 16];
        let mut sram = vec![0u8; SRAM_SIZE];
        let mut gpio = Gpio::default();
        gpio.present(0x1FF8, None);

        let mut bus = AceBus::new(&flash, &mut sram, &mut gpio);
        assert_eq!(bus.read32(ADDR_IDR), Ok(0x1FF8));
        assert_eq!(bus.read32(ADDR_IDR), Err(Interrupt::Yield));
        assert_eq!(bus.peek32(ADDR_IDR), Some(0x1FF8));
    }

    #[test]
    fn flash_is_read_only() {
        let flash = [0xAAu8; 16];
        let mut sram = vec![0u8; SRAM_SIZE];
        let mut gpio = Gpio::default();
        let mut bus = AceBus::new(&flash, &mut sram, &mut gpio);
        assert_eq!(bus.read8(FLASH_ORIGIN + 3), Ok(0xAA));
        assert_eq!(bus.write8(FLASH_ORIGIN, 0), Err(Interrupt::Fault(FLASH_ORIGIN)));
        assert_eq!(bus.read8(FLASH_ORIGIN + 16), Err(Interrupt::Fault(FLASH_ORIGIN + 16)));
    }

    #[test]
    fn sram_and_output_port() {
        let flash = [0u8; 4];
        let mut sram = vec![0u8; SRAM_SIZE];
        let mut gpio = Gpio::default();
        {
            let mut bus = AceBus::new(&flash, &mut sram, &mut gpio);
            bus.write32(SRAM_ORIGIN + 0x7FFC, 0x1234_5678).unwrap();
            assert_eq!(bus.read16(SRAM_ORIGIN + 0x7FFE), Ok(0x1234));
            assert!(bus.write32(SRAM_ORIGIN + 0x7FFE, 0).is_err());
            bus.write8(DATA_ODR, 0x42).unwrap();
            bus.write32(DATA_MODER, 0x5555).unwrap();
        }
        assert!(gpio.driving());
        assert_eq!(gpio.output(), 0x42);
    }
}
