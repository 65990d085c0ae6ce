//! Indexed palette conversion for console video output.
//!
//! Console palettes are stored in RAM as packed `r, g, b` byte triples. Before a
//! frame is produced the triples are converted once into host pixels in the
//! requested output format, and pixel indices are then looked up directly.

use serde::{Deserialize, Serialize};

/// Number of colors in a console palette.
pub const PALETTE_SIZE: usize = 16;

/// Size in bytes of a packed RGB palette.
pub const PALETTE_BYTES: usize = PALETTE_SIZE * 3;

/// Output pixel layout of the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Bytes `r, g, b, a` in memory (0xAABBGGRR as a little-endian u32).
    #[default]
    Rgba8888,
    /// Bytes `b, g, r, a` in memory (0xAARRGGBB as a little-endian u32).
    Bgra8888,
}

impl PixelFormat {
    /// Pack one color into a host pixel.
    pub fn pack(self, rgb: Rgb) -> u32 {
        let (r, g, b) = (rgb.r as u32, rgb.g as u32, rgb.b as u32);
        match self {
            PixelFormat::Rgba8888 => 0xFF00_0000 | (b << 16) | (g << 8) | r,
            PixelFormat::Bgra8888 => 0xFF00_0000 | (r << 16) | (g << 8) | b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Indexed palette that maps color indices to host pixels.
pub trait IndexedPalette {
    /// Get the host pixel for a palette index.
    fn get_color(&self, index: usize) -> u32;

    /// Get the number of colors in this palette.
    fn len(&self) -> usize;

    /// Check if the palette is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A 16-color palette already converted to host pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitPalette {
    colors: [u32; PALETTE_SIZE],
}

impl BlitPalette {
    /// Convert a packed `r, g, b` palette. Missing trailing bytes read as black.
    pub fn from_rgb(data: &[u8], format: PixelFormat) -> Self {
        let mut colors = [0u32; PALETTE_SIZE];
        for (i, color) in colors.iter_mut().enumerate() {
            let at = |k: usize| data.get(i * 3 + k).copied().unwrap_or(0);
            *color = format.pack(Rgb::new(at(0), at(1), at(2)));
        }
        Self { colors }
    }

    /// Get a slice of all colors.
    pub fn colors(&self) -> &[u32] {
        &self.colors
    }
}

impl IndexedPalette for BlitPalette {
    fn get_color(&self, index: usize) -> u32 {
        self.colors[index & (PALETTE_SIZE - 1)]
    }

    fn len(&self) -> usize {
        PALETTE_SIZE
    }
}

/// Default 16-color palette, as packed `r, g, b` bytes.
pub const DEFAULT_PALETTE: [u8; PALETTE_BYTES] = [
    0x1a, 0x1c, 0x2c, 0x5d, 0x27, 0x5d, 0xb1, 0x3e, 0x53, 0xef, 0x7d, 0x57, //
    0xff, 0xcd, 0x75, 0xa7, 0xf0, 0x70, 0x38, 0xb7, 0x64, 0x25, 0x71, 0x79, //
    0x29, 0x36, 0x6f, 0x3b, 0x5d, 0xc9, 0x41, 0xa6, 0xf6, 0x73, 0xef, 0xf7, //
    0xf4, 0xf4, 0xf4, 0x94, 0xb0, 0xc2, 0x56, 0x6c, 0x86, 0x33, 0x3c, 0x57, //
];
