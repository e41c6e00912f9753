//! Supercharger BIOS discovery

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::cartridge::CartError;
use crate::config::CartConfig;
use crate::loader::Loader;

pub const BIOS_SIZE: usize = 2048;

/// File names the BIOS is commonly distributed under
pub const BIOS_NAMES: [&str; 3] = [
    "Supercharger BIOS.bin",
    "Supercharger_BIOS.bin",
    "Supercharger.BIOS.bin",
];

/// Find the BIOS for a Supercharger image.
///
/// A BIOS supplied with the loader wins. Otherwise the working directory,
/// the directory of the image and the resource directory are searched in
/// that order.
pub fn load_bios(loader: &Loader, config: &CartConfig) -> Result<Vec<u8>, CartError> {
    if let Some(bios) = &loader.bios {
        return check_size(bios.clone(), "supplied BIOS");
    }

    let mut dirs = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(dir) = loader.rom_dir() {
        dirs.push(dir.to_path_buf());
    }
    if let Some(dir) = config.resource_path() {
        dirs.push(dir);
    }
    search_bios(&dirs)
}

/// Search directories in order for the first file with a BIOS name
pub fn search_bios(dirs: &[PathBuf]) -> Result<Vec<u8>, CartError> {
    for dir in dirs {
        for name in BIOS_NAMES {
            let path = dir.join(name);
            debug!("Looking for BIOS at {}", path.display());
            if path.is_file() {
                return read_bios(&path);
            }
        }
    }
    Err(CartError::Resource(format!(
        "Supercharger BIOS not found (tried {} in {} directories)",
        BIOS_NAMES.join(", "),
        dirs.len()
    )))
}

fn read_bios(path: &Path) -> Result<Vec<u8>, CartError> {
    let data = fs::read(path).map_err(|e| CartError::Resource(format!("{}: {}", path.display(), e)))?;
    let bios = check_size(data, &path.display().to_string())?;
    info!("Using Supercharger BIOS {}", path.display());
    Ok(bios)
}

fn check_size(data: Vec<u8>, source: &str) -> Result<Vec<u8>, CartError> {
    if data.len() != BIOS_SIZE {
        return Err(CartError::Resource(format!(
            "{} is {} bytes, expected {}",
            source,
            data.len(),
            BIOS_SIZE
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::process;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("vcs_cart_bios_{}_{}", process::id(), tag));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn search_order_and_names() {
        let first = scratch_dir("first");
        let second = scratch_dir("second");
        fs::write(second.join(BIOS_NAMES[2]), vec![0x22; BIOS_SIZE]).unwrap();
        fs::write(first.join(BIOS_NAMES[1]), vec![0x11; BIOS_SIZE]).unwrap();

        let bios = search_bios(&[first.clone(), second.clone()]).unwrap();
        assert_eq!(bios[0], 0x11);

        let bios = search_bios(&[second.clone()]).unwrap();
        assert_eq!(bios[0], 0x22);

        fs::remove_dir_all(first).unwrap();
        fs::remove_dir_all(second).unwrap();
    }

    #[test]
    fn wrong_size_and_missing_bios() {
        let dir = scratch_dir("bad");
        assert_matches!(search_bios(&[dir.clone()]), Err(CartError::Resource(_)));

        fs::write(dir.join(BIOS_NAMES[0]), vec![0; 1024]).unwrap();
        assert_matches!(search_bios(&[dir.clone()]), Err(CartError::Resource(_)));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn supplied_bios_wins() {
        let loader = Loader::new(vec![0; 8448], "game.bin").with_bios(vec![0xEA; BIOS_SIZE]);
        assert_eq!(load_bios(&loader, &CartConfig::default()).unwrap()[0], 0xEA);

        let loader = Loader::new(vec![0; 8448], "game.bin").with_bios(vec![0; 10]);
        assert_matches!(load_bios(&loader, &CartConfig::default()), Err(CartError::Resource(_)));
    }
}
