//! Behaviour every scheme has to honour when driven through the cartridge
//! port.

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use vcs_cart::coprocessor::YieldReason;
use vcs_cart::fingerprint;
use vcs_cart::mappers::ace::{FLASH_ORIGIN, MAGIC};
use vcs_cart::{BusFault, Capabilities, CartConfig, CartError, Cartridge, Loader, Mapping, Scheme};

/// Deterministic filler without any fingerprint signatures
fn filler(size: usize, salt: u8) -> Vec<u8> {
    (0..size).map(|i| ((i % 241) as u8 | 0x01).wrapping_add(salt << 1)).collect()
}

fn attach(data: Vec<u8>, tag: &str) -> Cartridge {
    let mut cart = Cartridge::new(CartConfig::with_seed(7));
    let loader = Loader::new(data, "test.bin").with_mapping(tag).unwrap();
    cart.attach(&loader).unwrap();
    cart
}

fn supercharger_tape() -> Vec<u8> {
    let mut tape = vec![0u8; 8448];
    tape[..256].fill(0x5A);
    let header = &mut tape[8192..];
    header[0] = 0x00;
    header[1] = 0xF8;
    header[2] = 0x0E; // RAM 1 low, RAM 3 high, writes enabled
    header[3] = 1;
    header[0x10] = 0;
    tape
}

fn supercharger() -> Cartridge {
    let mut cart = Cartridge::new(CartConfig::with_seed(7));
    let loader = Loader::new(supercharger_tape(), "tape.bin").with_bios(vec![0xB1; 2048]);
    cart.attach(&loader).unwrap();
    cart
}

/// Driver that echoes the low byte of every bus address onto the data bus
fn ace_echo() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(FLASH_ORIGIN + 0x29).to_le_bytes());
    for op in [0x4C04u16, 0x4805, 0x2304, 0x021B, 0x18E5, 0x6028, 0x6921, 0x6169, 0xE7FC, 0x46C0] {
        data.extend_from_slice(&op.to_le_bytes());
    }
    for word in [0x4002_0000u32, 0x0000_5555] {
        data.extend_from_slice(&word.to_le_bytes());
    }
    data
}

/// Touch every hotspot region and a spread of ordinary addresses
fn exercise(cart: &mut Cartridge) -> Vec<Result<u8, CartError>> {
    let mut seen = Vec::new();
    for addr in [0x1FF9u16, 0x1000, 0x1FE1, 0x1123, 0x1FE7, 0x1456, 0x1FEA, 0x1910, 0x1FF6, 0x1FFB, 0x1800] {
        seen.push(cart.read(addr));
        cart.access_passive(0x003F, 1);
        cart.step(1.19);
    }
    seen
}

fn every_scheme() -> Vec<(Vec<u8>, &'static str)> {
    vec![
        (filler(2048, 0), "2K"),
        (filler(4096, 1), "4K"),
        (filler(8192, 2), "F8"),
        (filler(8192, 3), "F8SC"),
        (filler(16384, 4), "F6SC"),
        (filler(32768, 5), "F4"),
        (filler(8192, 6), "E0"),
        (filler(8192, 7), "3F"),
        (filler(16384, 8), "E7"),
    ]
}

#[test]
fn reattaching_is_idempotent() {
    for (data, tag) in every_scheme() {
        let mut cart = attach(data.clone(), tag);
        let first = exercise(&mut cart);

        cart.eject();
        assert!(cart.is_ejected());
        let loader = Loader::new(data, "test.bin").with_mapping(tag).unwrap();
        cart.attach(&loader).unwrap();
        assert_eq!(exercise(&mut cart), first, "{}", tag);
    }
}

#[test]
fn snapshot_then_restore_changes_nothing() {
    for (data, tag) in every_scheme() {
        let mut reference = attach(data.clone(), tag);
        let mut cart = attach(data, tag);
        exercise(&mut reference);
        exercise(&mut cart);

        let snapshot = cart.snapshot();
        cart.restore(&snapshot).unwrap();
        assert_eq!(exercise(&mut cart), exercise(&mut reference), "{}", tag);
    }
}

#[test]
fn snapshots_do_not_alias_live_ram() {
    // Superchip
    let mut cart = attach(filler(8192, 0), "F8SC");
    cart.write(0x1010, 0x11).unwrap();
    let snapshot = cart.snapshot();
    cart.write(0x1010, 0x22).unwrap();
    cart.restore(&snapshot).unwrap();
    assert_eq!(cart.read(0x1090).unwrap(), 0x11);

    // E7 small RAM
    let mut cart = attach(filler(16384, 0), "E7");
    cart.write(0x1801, 0x33).unwrap();
    let snapshot = cart.snapshot();
    cart.write(0x1801, 0x44).unwrap();
    cart.restore(&snapshot).unwrap();
    assert_eq!(cart.read(0x1901).unwrap(), 0x33);

    // Supercharger RAM
    let mut cart = supercharger();
    cart.read(0x1850).unwrap();
    let snapshot = cart.snapshot();
    cart.ram_bus().unwrap().put_ram(0, 0, 0x99).unwrap();
    assert_eq!(cart.peek(0x1000).unwrap(), 0x99);
    cart.restore(&snapshot).unwrap();
    assert_eq!(cart.peek(0x1000).unwrap(), 0x5A);
}

#[test]
fn snapshots_survive_serialisation() {
    let mut cart = attach(filler(16384, 0), "E7");
    cart.read(0x1FE7).unwrap();
    cart.write(0x1020, 0x77).unwrap();
    let bytes = cart.snapshot().to_bytes().unwrap();

    cart.reset();
    let snapshot = vcs_cart::Snapshot::from_bytes(&bytes).unwrap();
    cart.restore(&snapshot).unwrap();
    assert_eq!(cart.read(0x1420).unwrap(), 0x77);
}

#[test]
fn e7_ports_are_separate() {
    let data = filler(16384, 0);
    let mut cart = attach(data.clone(), "E7");
    cart.read(0x1FE7).unwrap();
    cart.write(0x1005, 0xC3).unwrap();

    assert_eq!(cart.read(0x1405).unwrap(), 0xC3);
    assert_eq!(cart.read(0x1005).unwrap(), data[7 * 2048 + 5]);
    assert_matches!(
        cart.write(0x1405, 0),
        Err(CartError::BusError(0x1405, BusFault::WriteToRom))
    );
    assert_eq!(cart.read(0x1405).unwrap(), 0xC3);
}

#[test]
fn standard_hotspots_select_banks() {
    for (size, tag, first) in [(8192, "F8", 0xFF8u16), (16384, "F6", 0xFF6), (32768, "F4", 0xFF4)] {
        let data: Vec<u8> = (0..size).map(|i| (i / 4096) as u8).collect();
        let mut cart = attach(data, tag);
        let banks = size / 4096;
        assert_eq!(cart.num_banks(), banks);

        for bank in 0..banks {
            cart.read(0x1000 | (first + bank as u16)).unwrap();
            assert_eq!(cart.read(0x1000).unwrap(), bank as u8, "{} bank {}", tag, bank);
        }
        // writes switch too
        cart.write(0x1000 | first, 0).unwrap();
        assert_eq!(cart.get_bank(0x1000).number, 0);
    }
}

#[test]
fn fingerprinting_is_deterministic() {
    for (data, _) in every_scheme() {
        assert_eq!(fingerprint::identify(&data).ok(), fingerprint::identify(&data).ok());
    }
    let mut data = filler(8192, 0);
    data[0x40..0x43].copy_from_slice(&[0x8D, 0xE0, 0x1F]);
    assert_eq!(fingerprint::identify(&data).unwrap(), Mapping::new(Scheme::E0));
}

#[test]
fn plusrom_false_positive_still_attaches() {
    let mut data = filler(4096, 0);
    data[0x100..0x103].copy_from_slice(&[0x8D, 0xF1, 0x1F]);
    assert!(fingerprint::plusrom_candidate(&data));

    let mut cart = Cartridge::new(CartConfig::default());
    cart.attach(&Loader::new(data, "maybe.bin")).unwrap();
    assert_eq!(cart.mapping(), "4K");
    assert!(!cart.capabilities().contains(Capabilities::CONTAINER));
}

#[test]
fn plusrom_wraps_the_primary_mapper() {
    let mut data = filler(8192, 0);
    data[0x100..0x103].copy_from_slice(&[0x8D, 0xF1, 0x1F]);
    let bank = &mut data[4096..];
    bank[0xE00..0xE0E].copy_from_slice(b"api\0pluscart\0\0");
    bank[0xFFA] = 0x00;
    bank[0xFFB] = 0xFE;

    let mut cart = Cartridge::new(CartConfig::default());
    cart.attach(&Loader::new(data, "net.bin")).unwrap();
    assert!(cart.capabilities().contains(Capabilities::CONTAINER));
    assert_eq!(cart.container_bus().unwrap().contained_mapping(), "F8");

    cart.write(0x1FF1, 0x42).unwrap();
    let network = cart.container_bus().unwrap().network().unwrap();
    let sent = network.take_transmissions();
    assert_eq!(sent[0].host, "pluscart");
    assert_eq!(sent[0].payload, vec![0x42]);
    network.receive(&[1, 2, 3]);
    assert_eq!(cart.read(0x1FF3).unwrap(), 3);
}

#[test]
fn supercharger_loads_from_tape() {
    let mut cart = supercharger();
    assert!(cart.capabilities().contains(Capabilities::TAPE | Capabilities::RAM));
    cart.read(0x1850).unwrap();
    let event = cart.tape_bus().unwrap().take_fastload().unwrap();
    assert_eq!(event.start_address, 0xF800);
    assert_eq!(cart.read(0x1000).unwrap(), 0x5A);
    assert_eq!(cart.get_bank(0x1800).number, 3);
}

#[test]
fn coprocessor_yields_deterministically() {
    let run = || {
        let mut cart = attach(ace_echo(), "ACE");
        let mut trace = Vec::new();
        for addr in [0x1000u16, 0x1ABC, 0x1FFF, 0x1234] {
            let data = cart.read(addr).unwrap();
            let bus = cart.coprocessor_bus().unwrap();
            trace.push((data, bus.last_yield(), bus.coproc_registers()));
        }
        trace
    };

    let first = run();
    assert_eq!(first, run());
    assert_eq!(first[1].0, 0xBC);
    assert!(first.iter().all(|(_, reason, _)| *reason == Some(YieldReason::SyncWithVcs)));
}
