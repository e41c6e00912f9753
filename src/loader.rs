//! Cartridge images and mapping tags
//!
//! A `Loader` carries everything the cartridge needs to attach an image: the
//! bytes, a name for logging, where the image came from (companion files are
//! searched for beside it) and an optional mapping that overrides
//! fingerprinting.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cartridge::CartError;

/// Bank-switching schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// 2KB, mirrored across the window
    Atari2K,
    /// 4KB, no switching
    Atari4K,
    /// 8KB, two 4K banks
    F8,
    /// 16KB, four 4K banks
    F6,
    /// 32KB, eight 4K banks
    F4,
    /// Parker Brothers, eight 1K banks in four segments
    E0,
    /// Tigervision, 2K banks selected by writes to TIA space
    Tigervision,
    /// M-Network, 2K ROM banks plus two kinds of RAM
    E7,
    /// Starpath Supercharger, tape loaded into RAM
    Supercharger,
    /// ARM coprocessor cartridge
    Ace,
}

impl Scheme {
    /// Tag used on the command line and in logs
    pub fn tag(self) -> &'static str {
        match self {
            Scheme::Atari2K => "2K",
            Scheme::Atari4K => "4K",
            Scheme::F8 => "F8",
            Scheme::F6 => "F6",
            Scheme::F4 => "F4",
            Scheme::E0 => "E0",
            Scheme::Tigervision => "3F",
            Scheme::E7 => "E7",
            Scheme::Supercharger => "AR",
            Scheme::Ace => "ACE",
        }
    }

    /// Whether the scheme can carry a superchip
    pub fn supports_superchip(self) -> bool {
        matches!(
            self,
            Scheme::Atari2K | Scheme::Atari4K | Scheme::F8 | Scheme::F6 | Scheme::F4
        )
    }

    const ALL: [Scheme; 10] = [
        Scheme::Atari2K,
        Scheme::Atari4K,
        Scheme::F8,
        Scheme::F6,
        Scheme::F4,
        Scheme::E0,
        Scheme::Tigervision,
        Scheme::E7,
        Scheme::Supercharger,
        Scheme::Ace,
    ];
}

/// A scheme together with its modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub scheme: Scheme,

    /// 128 bytes of extra RAM in the low 256 bytes of the window
    pub superchip: bool,
}

impl Mapping {
    pub fn new(scheme: Scheme) -> Self {
        Mapping {
            scheme,
            superchip: false,
        }
    }

    pub fn with_superchip(scheme: Scheme) -> Self {
        Mapping {
            scheme,
            superchip: true,
        }
    }

    /// Parse a mapping tag. `AUTO` means "fingerprint the image" and parses
    /// to `None`.
    pub fn from_tag(tag: &str) -> Result<Option<Mapping>, CartError> {
        let upper = tag.trim().to_ascii_uppercase();
        if upper == "AUTO" {
            return Ok(None);
        }

        if let Some(scheme) = Scheme::ALL.iter().find(|s| s.tag() == upper) {
            return Ok(Some(Mapping::new(*scheme)));
        }

        if let Some(base) = upper.strip_suffix("SC") {
            if let Some(scheme) = Scheme::ALL
                .iter()
                .find(|s| s.tag() == base && s.supports_superchip())
            {
                return Ok(Some(Mapping::with_superchip(*scheme)));
            }
        }

        Err(CartError::UnrecognisedMapping(tag.to_string()))
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.superchip {
            write!(f, "{}SC", self.scheme.tag())
        } else {
            write!(f, "{}", self.scheme.tag())
        }
    }
}

/// An image ready to be attached
#[derive(Debug, Clone)]
pub struct Loader {
    /// Name used in logs and by the cartridge facade
    pub name: String,

    /// File the image was read from, if any
    pub path: Option<PathBuf>,

    /// Image bytes
    pub data: Vec<u8>,

    /// Mapping to use instead of fingerprinting
    pub mapping: Option<Mapping>,

    /// Supercharger BIOS to use instead of searching for one
    pub bios: Option<Vec<u8>>,
}

impl Loader {
    pub fn new(data: Vec<u8>, name: impl Into<String>) -> Self {
        Loader {
            name: name.into(),
            path: None,
            data,
            mapping: None,
            bios: None,
        }
    }

    /// Read an image from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| CartError::Resource(format!("{}: {}", path.display(), e)))?;
        debug!("Read {} bytes from {}", data.len(), path.display());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Loader {
            name,
            path: Some(path.to_path_buf()),
            data,
            mapping: None,
            bios: None,
        })
    }

    /// Force a mapping by tag
    pub fn with_mapping(mut self, tag: &str) -> Result<Self, CartError> {
        self.mapping = Mapping::from_tag(tag)?;
        Ok(self)
    }

    /// Supply a Supercharger BIOS directly
    pub fn with_bios(mut self, bios: Vec<u8>) -> Self {
        self.bios = Some(bios);
        self
    }

    /// Directory the image was loaded from
    pub fn rom_dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn tags_are_case_insensitive() {
        assert_eq!(Mapping::from_tag("f8").unwrap(), Some(Mapping::new(Scheme::F8)));
        assert_eq!(Mapping::from_tag("3f").unwrap(), Some(Mapping::new(Scheme::Tigervision)));
        assert_eq!(Mapping::from_tag("Ace").unwrap(), Some(Mapping::new(Scheme::Ace)));
        assert_eq!(Mapping::from_tag("auto").unwrap(), None);
    }

    #[test]
    fn superchip_suffix() {
        assert_eq!(
            Mapping::from_tag("F6SC").unwrap(),
            Some(Mapping::with_superchip(Scheme::F6))
        );
        assert_eq!(Mapping::with_superchip(Scheme::F4).to_string(), "F4SC");
        assert_matches!(Mapping::from_tag("E7SC"), Err(CartError::UnrecognisedMapping(_)));
    }

    #[test]
    fn unknown_tag() {
        assert_matches!(Mapping::from_tag("DPC+"), Err(CartError::UnrecognisedMapping(t)) if t == "DPC+");
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        assert_matches!(
            Loader::from_file("/nonexistent/rom.bin"),
            Err(CartError::Resource(_))
        );
    }

    #[test]
    fn rom_dir_comes_from_path() {
        let mut loader = Loader::new(vec![], "a.bin");
        assert!(loader.rom_dir().is_none());
        loader.path = Some(PathBuf::from("/roms/a.bin"));
        assert_eq!(loader.rom_dir(), Some(Path::new("/roms")));
    }
}
