//! Bank synchronization between the cart and RAM.
//!
//! A sync copies whole sections between one cart bank and their fixed RAM
//! regions. Sections already synced this frame are skipped; the accumulator
//! is cleared by the dispatcher at tick start.

use std::ops::BitOr;

use nibble_core::logging::{log, LogCategory, LogLevel};
use nibble_core::palette::PALETTE_BYTES;

use crate::cart::{Cart, BANKS};
use crate::memory::{layout, Ram, Region};

/// A cart section that can be synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Tiles,
    Sprites,
    Map,
    Sfx,
    Music,
    Palette,
    Flags,
    Screen,
}

/// All sections in mask bit order.
pub const SECTIONS: [Section; 8] = [
    Section::Tiles,
    Section::Sprites,
    Section::Map,
    Section::Sfx,
    Section::Music,
    Section::Palette,
    Section::Flags,
    Section::Screen,
];

impl Section {
    pub fn mask(self) -> SyncMask {
        SyncMask(1 << self as u32)
    }

    /// RAM region the section maps onto.
    pub fn region(self) -> Region {
        match self {
            Section::Tiles => layout::TILES,
            Section::Sprites => layout::SPRITES,
            Section::Map => layout::MAP,
            Section::Sfx => Region::new(
                layout::WAVEFORMS.offset,
                layout::WAVEFORMS.size + layout::SFX.size,
            ),
            Section::Music => Region::new(
                layout::PATTERNS.offset,
                layout::PATTERNS.size + layout::TRACKS.size,
            ),
            Section::Palette => layout::PALETTE,
            Section::Flags => layout::FLAGS,
            Section::Screen => layout::SCREEN,
        }
    }
}

/// Set of sections, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SyncMask(u32);

impl SyncMask {
    pub const NONE: SyncMask = SyncMask(0);
    pub const TILES: SyncMask = SyncMask(1 << 0);
    pub const SPRITES: SyncMask = SyncMask(1 << 1);
    pub const MAP: SyncMask = SyncMask(1 << 2);
    pub const SFX: SyncMask = SyncMask(1 << 3);
    pub const MUSIC: SyncMask = SyncMask(1 << 4);
    pub const PALETTE: SyncMask = SyncMask(1 << 5);
    pub const FLAGS: SyncMask = SyncMask(1 << 6);
    pub const SCREEN: SyncMask = SyncMask(1 << 7);
    pub const ALL: SyncMask = SyncMask(0xFF);

    /// Mask from raw bits; unknown bits are dropped.
    pub fn from_bits(bits: u32) -> Self {
        SyncMask(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: SyncMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: SyncMask) -> SyncMask {
        SyncMask(self.0 & !other.0)
    }
}

impl BitOr for SyncMask {
    type Output = SyncMask;

    fn bitor(self, rhs: SyncMask) -> SyncMask {
        SyncMask(self.0 | rhs.0)
    }
}

/// Copy the sections in `mask` between `cart.banks[bank]` and RAM.
///
/// An empty mask means every section. Sections already in `synced` are
/// skipped, and every processed section is added to it. Returns the sections
/// that were copied.
///
/// # Panics
///
/// Panics if `bank` is not a valid bank index.
pub fn sync(
    ram: &mut Ram,
    cart: &mut Cart,
    ovr_palette: &mut [u8; PALETTE_BYTES],
    synced: &mut SyncMask,
    mask: SyncMask,
    bank: usize,
    to_cart: bool,
) -> SyncMask {
    assert!(bank < BANKS, "bank index {bank} out of range");

    let mask = if mask.is_empty() { SyncMask::ALL } else { mask };
    let pending = mask.without(*synced);
    let bank_data = cart.bank_mut(bank);

    for section in SECTIONS {
        if !pending.contains(section.mask()) {
            continue;
        }
        let region = section.region();
        if to_cart {
            bank_data
                .section_mut(section)
                .copy_from_slice(ram.region(region));
        } else {
            ram.region_mut(region)
                .copy_from_slice(bank_data.section(section));
        }
        if section == Section::Palette {
            if to_cart {
                bank_data.ovr_palette = *ovr_palette;
            } else {
                *ovr_palette = bank_data.ovr_palette;
            }
        }
    }

    log(LogCategory::Sync, LogLevel::Debug, || {
        format!(
            "sync bank {bank} {} mask={:#04x} skipped={:#04x}",
            if to_cart { "ram->cart" } else { "cart->ram" },
            pending.bits(),
            mask.bits() & synced.bits()
        )
    });

    *synced = *synced | pending;
    pending
}

/// Sections loaded from bank 0 when a cart starts. The screen is left alone
/// when the cart's bank-0 screen is blank.
pub fn startup_mask(cart: &Cart) -> SyncMask {
    if cart.bank(0).screen.iter().all(|&b| b == 0) {
        SyncMask::ALL.without(SyncMask::SCREEN)
    } else {
        SyncMask::ALL
    }
}
