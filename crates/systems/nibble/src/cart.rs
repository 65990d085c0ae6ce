//! Cart contents: eight asset banks plus the program text.
//!
//! Carts are built programmatically; reading and writing a cart file format is
//! left to the host.

use nibble_core::palette::{DEFAULT_PALETTE, PALETTE_BYTES};
use thiserror::Error;

use crate::memory::layout;
use crate::sync::Section;

/// Bits used to address a bank.
pub const BANK_BITS: u32 = 3;
/// Number of banks in a cart.
pub const BANKS: usize = 1 << BANK_BITS;

pub const SCREEN_BYTES: usize = layout::SCREEN.size;
pub const TILES_BYTES: usize = layout::TILES.size;
pub const SPRITES_BYTES: usize = layout::SPRITES.size;
pub const MAP_BYTES: usize = layout::MAP.size;
pub const SFX_BYTES: usize = layout::WAVEFORMS.size + layout::SFX.size;
pub const MUSIC_BYTES: usize = layout::PATTERNS.size + layout::TRACKS.size;
pub const FLAGS_BYTES: usize = layout::FLAGS.size;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("{section:?} section needs {expected} bytes, got {got}")]
    SectionSize {
        section: Section,
        expected: usize,
        got: usize,
    },
}

/// One bank of cart assets. Every section has the size of its RAM region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub screen: Box<[u8; SCREEN_BYTES]>,
    pub tiles: Box<[u8; TILES_BYTES]>,
    pub sprites: Box<[u8; SPRITES_BYTES]>,
    pub map: Box<[u8; MAP_BYTES]>,
    /// Waveforms followed by sfx samples.
    pub sfx: Box<[u8; SFX_BYTES]>,
    /// Music patterns followed by tracks.
    pub music: Box<[u8; MUSIC_BYTES]>,
    pub flags: Box<[u8; FLAGS_BYTES]>,
    pub palette: [u8; PALETTE_BYTES],
    pub ovr_palette: [u8; PALETTE_BYTES],
}

impl Bank {
    pub fn new() -> Self {
        Self {
            screen: Box::new([0; SCREEN_BYTES]),
            tiles: Box::new([0; TILES_BYTES]),
            sprites: Box::new([0; SPRITES_BYTES]),
            map: Box::new([0; MAP_BYTES]),
            sfx: Box::new([0; SFX_BYTES]),
            music: Box::new([0; MUSIC_BYTES]),
            flags: Box::new([0; FLAGS_BYTES]),
            palette: DEFAULT_PALETTE,
            ovr_palette: [0; PALETTE_BYTES],
        }
    }

    /// Bytes of one section. The palette section is the screen palette only.
    pub fn section(&self, section: Section) -> &[u8] {
        match section {
            Section::Tiles => &self.tiles[..],
            Section::Sprites => &self.sprites[..],
            Section::Map => &self.map[..],
            Section::Sfx => &self.sfx[..],
            Section::Music => &self.music[..],
            Section::Palette => &self.palette[..],
            Section::Flags => &self.flags[..],
            Section::Screen => &self.screen[..],
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut [u8] {
        match section {
            Section::Tiles => &mut self.tiles[..],
            Section::Sprites => &mut self.sprites[..],
            Section::Map => &mut self.map[..],
            Section::Sfx => &mut self.sfx[..],
            Section::Music => &mut self.music[..],
            Section::Palette => &mut self.palette[..],
            Section::Flags => &mut self.flags[..],
            Section::Screen => &mut self.screen[..],
        }
    }

    /// Replace a whole section. `bytes` must have the section's exact size.
    pub fn set_section(&mut self, section: Section, bytes: &[u8]) -> Result<(), CartError> {
        let target = self.section_mut(section);
        if target.len() != bytes.len() {
            return Err(CartError::SectionSize {
                section,
                expected: target.len(),
                got: bytes.len(),
            });
        }
        target.copy_from_slice(bytes);
        Ok(())
    }
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

/// A loaded cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub banks: [Bank; BANKS],
    pub code: String,
}

impl Cart {
    pub fn new() -> Self {
        Self {
            banks: std::array::from_fn(|_| Bank::new()),
            code: String::new(),
        }
    }

    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::new()
        }
    }

    pub fn bank(&self, index: usize) -> &Bank {
        &self.banks[index]
    }

    pub fn bank_mut(&mut self, index: usize) -> &mut Bank {
        &mut self.banks[index]
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SECTIONS;

    #[test]
    fn test_new_cart_has_all_banks() {
        let cart = Cart::with_code("-- hi");
        assert_eq!(cart.banks.len(), BANKS);
        assert_eq!(cart.code, "-- hi");
        assert_eq!(cart.bank(0).palette, DEFAULT_PALETTE);
    }

    #[test]
    fn test_set_section_checks_length() {
        let mut bank = Bank::new();
        assert_eq!(
            bank.set_section(Section::Map, &[1, 2, 3]),
            Err(CartError::SectionSize {
                section: Section::Map,
                expected: MAP_BYTES,
                got: 3,
            })
        );
        assert!(bank.map.iter().all(|&b| b == 0));

        let tiles = vec![0x5A; TILES_BYTES];
        bank.set_section(Section::Tiles, &tiles).unwrap();
        assert_eq!(bank.section(Section::Tiles), &tiles[..]);
    }

    #[test]
    fn test_sections_match_ram_regions() {
        let bank = Bank::new();
        for section in SECTIONS {
            assert_eq!(bank.section(section).len(), section.region().size);
        }
    }
}
