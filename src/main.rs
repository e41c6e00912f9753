//! vcs_cart - inspect Atari 2600 cartridge images
//!
//! Attaches an image to a cartridge port, reports how it was identified and
//! optionally dumps its hotspots, RAM and the visible cartridge window.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;

use vcs_cart::memory::{CART_MEMTOP, CART_ORIGIN};
use vcs_cart::util::{format_addr, hexdump};
use vcs_cart::{CartConfig, Cartridge, Loader};

/// Command line arguments for vcs_cart
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the cartridge image
    #[clap(name = "ROM")]
    rom_path: PathBuf,

    /// Mapping to use instead of fingerprinting (e.g. F8SC, E7, AR)
    #[clap(short, long, default_value = "AUTO")]
    mapping: String,

    /// Supercharger BIOS to use instead of searching for one
    #[clap(long)]
    bios: Option<PathBuf>,

    /// Seed for randomising cartridge RAM
    #[clap(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// List read and write hotspots
    #[clap(long)]
    hotspots: bool,

    /// Dump cartridge RAM
    #[clap(long)]
    ram: bool,

    /// Dump the 4K cartridge window as currently mapped
    #[clap(long)]
    window: bool,

    /// Write a snapshot of the attached cartridge to a file
    #[clap(long)]
    save_state: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let rom_path = args.rom_path.to_string_lossy();
    info!("Loading cartridge: {}", rom_path);

    let mut loader = Loader::from_file(&args.rom_path)
        .with_context(|| format!("Failed to load ROM: {}", rom_path))?
        .with_mapping(&args.mapping)
        .with_context(|| format!("Bad mapping: {}", args.mapping))?;
    if let Some(path) = &args.bios {
        let bios = fs::read(path).with_context(|| format!("Failed to read BIOS: {}", path.display()))?;
        loader = loader.with_bios(bios);
    }

    let config = match args.seed {
        Some(seed) => CartConfig::with_seed(seed),
        None => CartConfig::default(),
    };
    let mut cart = Cartridge::new(config);
    if let Err(e) = cart.attach(&loader) {
        warn!("{} ({:?} error)", e, e.category());
        return Err(e).with_context(|| format!("Failed to attach {}", rom_path));
    }

    println!("Cartridge:    {}", cart.filename());
    println!("Mapping:      {}", cart.mapping());
    println!("Banks:        {}", cart.num_banks());
    println!("SHA-256:      {}", cart.hash());
    println!("Capabilities: {:?}", cart.capabilities());
    if let Some(container) = cart.container_bus() {
        println!("Container:    {} around {}", container.container_id(), container.contained_mapping());
    }

    if args.hotspots {
        match cart.hotspots_bus() {
            Some(bus) => {
                for (dir, hotspots) in [("read", bus.read_hotspots()), ("write", bus.write_hotspots())] {
                    for h in hotspots {
                        println!("{:5} {} {:?}: {}", dir, format_addr(CART_ORIGIN | h.addr), h.kind, h.label);
                    }
                }
            }
            None => println!("No hotspots"),
        }
    }

    if args.ram {
        match cart.ram_bus() {
            Some(bus) => {
                for region in bus.ram() {
                    println!(
                        "{} (read {}, write {}{})",
                        region.label,
                        format_addr(region.read_origin),
                        format_addr(region.write_origin),
                        if region.mapped { "" } else { ", unmapped" }
                    );
                    print!("{}", hexdump(&region.data, region.read_origin));
                }
            }
            None => println!("No cartridge RAM"),
        }
    }

    if args.window {
        let window: Vec<u8> = (CART_ORIGIN..=CART_MEMTOP)
            .map(|addr| cart.peek(addr).unwrap_or(0))
            .collect();
        print!("{}", hexdump(&window, CART_ORIGIN));
    }

    if let Some(path) = &args.save_state {
        cart.snapshot()
            .save_to_file(path)
            .with_context(|| format!("Failed to save state: {}", path.display()))?;
        info!("Saved state to {}", path.display());
    }

    Ok(())
}
