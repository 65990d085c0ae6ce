//! Console RAM and the packed memory surface.
//!
//! RAM is a flat 96 KiB byte array whose layout is part of the compatibility
//! surface: guests address it directly with `peek`/`poke` at 1, 2, 4 or 8 bit
//! resolution. Writes that land in the screen bitmap also mark the touched
//! pixels in a dirty mask, which the overlay pass uses to recomposite only what
//! an overlay hook drew.

use nibble_core::bits;
use nibble_core::logging::{log, LogCategory, LogLevel};

/// Visible screen width in pixels.
pub const WIDTH: usize = 240;
/// Visible screen height in pixels.
pub const HEIGHT: usize = 136;
/// Full output width including the left and right border.
pub const FULL_WIDTH: usize = 256;
/// Full output height including the top and bottom border.
pub const FULL_HEIGHT: usize = 144;
/// Border rows above the visible screen.
pub const TOP: usize = (FULL_HEIGHT - HEIGHT) / 2;
/// Border columns left of the visible screen.
pub const LEFT: usize = (FULL_WIDTH - WIDTH) / 2;
/// Frames per second.
pub const FRAMERATE: u32 = 60;

/// Total RAM size.
pub const RAM_SIZE: usize = 0x18000;
/// Video RAM size; VRAM occupies the start of RAM.
pub const VRAM_SIZE: usize = 0x4000;
/// Number of persistent memory slots.
pub const PMEM_SLOTS: usize = 256;

/// A fixed byte range of RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub size: usize,
}

impl Region {
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// One past the last byte.
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

/// RAM layout. Offsets never change between versions.
pub mod layout {
    use super::Region;

    pub const VRAM: Region = Region::new(0x00000, super::VRAM_SIZE);
    pub const SCREEN: Region = Region::new(0x00000, super::WIDTH * super::HEIGHT / 2);
    pub const PALETTE: Region = Region::new(0x03FC0, 48);
    pub const PALETTE_MAP: Region = Region::new(0x03FF0, 8);
    pub const BORDER: Region = Region::new(0x03FF8, 1);
    pub const OFFSET: Region = Region::new(0x03FF9, 2);
    pub const CURSOR: Region = Region::new(0x03FFB, 1);
    pub const BLIT_SEGMENT: Region = Region::new(0x03FFC, 1);
    pub const TILES: Region = Region::new(0x04000, 8192);
    pub const SPRITES: Region = Region::new(0x06000, 8192);
    pub const MAP: Region = Region::new(0x08000, 32640);
    pub const GAMEPADS: Region = Region::new(0x0FF80, 4);
    pub const MOUSE: Region = Region::new(0x0FF84, 4);
    pub const KEYBOARD: Region = Region::new(0x0FF88, 4);
    pub const SFX_POS: Region = Region::new(0x0FF8C, 16);
    pub const REGISTERS: Region = Region::new(0x0FF9C, 72);
    pub const WAVEFORMS: Region = Region::new(0x0FFE4, 256);
    pub const SFX: Region = Region::new(0x100E4, 4224);
    pub const PATTERNS: Region = Region::new(0x11164, 11520);
    pub const TRACKS: Region = Region::new(0x13E64, 408);
    pub const MUSIC_STATE: Region = Region::new(0x13FFC, 4);
    pub const STEREO: Region = Region::new(0x14000, 4);
    pub const PERSISTENT: Region = Region::new(0x14004, 1024);
    pub const FLAGS: Region = Region::new(0x14404, 512);
    pub const FONT: Region = Region::new(0x14604, 2048);
    pub const MAPPING: Region = Region::new(0x14E04, 32);
}

/// Default palette map: every color maps to itself.
pub const DEFAULT_PALETTE_MAP: [u8; 8] = [0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE];

/// Access resolution for `peek`/`poke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bits {
    One,
    Two,
    Four,
    Eight,
}

impl Bits {
    /// Resolution from a bit width; only 1, 2, 4 and 8 are valid.
    pub fn from_width(width: i64) -> Option<Self> {
        match width {
            1 => Some(Bits::One),
            2 => Some(Bits::Two),
            4 => Some(Bits::Four),
            8 => Some(Bits::Eight),
            _ => None,
        }
    }

    pub fn width(self) -> usize {
        match self {
            Bits::One => 1,
            Bits::Two => 2,
            Bits::Four => 4,
            Bits::Eight => 8,
        }
    }

    /// Number of addressable units of this width in RAM.
    pub fn bound(self) -> usize {
        RAM_SIZE * 8 / self.width()
    }
}

const SCREEN_PIXELS: usize = WIDTH * HEIGHT;

/// One flag per visible pixel, set by writes into the screen bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyMask {
    words: Vec<u64>,
}

impl DirtyMask {
    pub fn new() -> Self {
        Self {
            words: vec![0; SCREEN_PIXELS.div_ceil(64)],
        }
    }

    pub fn mark(&mut self, pixel: usize) {
        if pixel < SCREEN_PIXELS {
            self.words[pixel / 64] |= 1 << (pixel % 64);
        }
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Indices of all marked pixels, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| i * 64 + bit)
        })
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl Default for DirtyMask {
    fn default() -> Self {
        Self::new()
    }
}

/// Console RAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram {
    data: Vec<u8>,
    dirty: DirtyMask,
}

impl Ram {
    pub fn new() -> Self {
        Self {
            data: vec![0; RAM_SIZE],
            dirty: DirtyMask::new(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn region(&self, region: Region) -> &[u8] {
        &self.data[region.range()]
    }

    /// Raw mutable access for engine-side copies; does not mark the dirty mask.
    pub fn region_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.data[region.range()]
    }

    pub fn dirty(&self) -> &DirtyMask {
        &self.dirty
    }

    pub fn dirty_mut(&mut self) -> &mut DirtyMask {
        &mut self.dirty
    }

    /// Read a packed value. Out-of-range addresses read as 0.
    pub fn peek(&self, addr: i64, bits: Bits) -> u8 {
        let Some(index) = self.check(addr, bits) else {
            return 0;
        };
        match bits {
            Bits::One => bits::peek1(&self.data, index),
            Bits::Two => bits::peek2(&self.data, index),
            Bits::Four => bits::peek4(&self.data, index),
            Bits::Eight => self.data[index],
        }
    }

    /// Write a packed value. Out-of-range addresses are ignored.
    pub fn poke(&mut self, addr: i64, value: u8, bits: Bits) {
        let Some(index) = self.check(addr, bits) else {
            return;
        };
        match bits {
            Bits::One => bits::poke1(&mut self.data, index, value),
            Bits::Two => bits::poke2(&mut self.data, index, value),
            Bits::Four => bits::poke4(&mut self.data, index, value),
            Bits::Eight => self.data[index] = value,
        }
        self.mark_bits(index * bits.width(), bits.width());
    }

    /// Copy `size` bytes within RAM. Returns false and copies nothing if either
    /// range leaves RAM.
    pub fn memcpy(&mut self, dst: i64, src: i64, size: i64) -> bool {
        let (Some(dst), Some(src)) = (Self::span(dst, size), Self::span(src, size)) else {
            log(LogCategory::Memory, LogLevel::Trace, || {
                format!("memcpy rejected: dst={dst} src={src} size={size}")
            });
            return false;
        };
        self.data.copy_within(src.clone(), dst.start);
        self.mark_bytes(dst);
        true
    }

    /// Fill `size` bytes. Returns false and writes nothing if the range leaves RAM.
    pub fn memset(&mut self, dst: i64, value: u8, size: i64) -> bool {
        let Some(dst) = Self::span(dst, size) else {
            log(LogCategory::Memory, LogLevel::Trace, || {
                format!("memset rejected: dst={dst} size={size}")
            });
            return false;
        };
        self.data[dst.clone()].fill(value);
        self.mark_bytes(dst);
        true
    }

    /// Read or replace a persistent memory slot, returning the previous value.
    /// Out-of-range slots read as 0 and are never written.
    pub fn pmem(&mut self, index: i64, value: Option<u32>) -> u32 {
        if index < 0 || index as usize >= PMEM_SLOTS {
            return 0;
        }
        let offset = layout::PERSISTENT.offset + index as usize * 4;
        let old = self.read_u32(offset);
        if let Some(value) = value {
            self.write_u32(offset, value);
        }
        old
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(word)
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Screen pixel as a palette index. Caller keeps `pixel` inside the screen.
    pub fn screen_pixel(&self, pixel: usize) -> u8 {
        bits::peek4(&self.data, pixel)
    }

    /// Write a screen pixel and mark it dirty.
    pub fn set_screen_pixel(&mut self, pixel: usize, color: u8) {
        if pixel < SCREEN_PIXELS {
            bits::poke4(&mut self.data, pixel, color);
            self.dirty.mark(pixel);
        }
    }

    pub fn border_color(&self) -> u8 {
        self.data[layout::BORDER.offset] & 0x0F
    }

    /// Signed scroll offset `(x, y)`.
    pub fn offset(&self) -> (i8, i8) {
        let at = layout::OFFSET.offset;
        (self.data[at] as i8, self.data[at + 1] as i8)
    }

    /// Map a drawing color through the palette map.
    pub fn map_color(&self, color: u8) -> u8 {
        bits::peek4(self.region(layout::PALETTE_MAP), (color & 0x0F) as usize)
    }

    fn check(&self, addr: i64, bits: Bits) -> Option<usize> {
        if addr < 0 || addr as usize >= bits.bound() {
            log(LogCategory::Memory, LogLevel::Trace, || {
                format!("access out of range: addr={addr} bits={}", bits.width())
            });
            return None;
        }
        Some(addr as usize)
    }

    fn span(start: i64, size: i64) -> Option<std::ops::Range<usize>> {
        if start < 0 || size < 0 {
            return None;
        }
        let end = start.checked_add(size).filter(|&end| end <= RAM_SIZE as i64)?;
        Some(start as usize..end as usize)
    }

    fn mark_bytes(&mut self, range: std::ops::Range<usize>) {
        let screen_end = layout::SCREEN.end();
        let end = range.end.min(screen_end);
        for byte in range.start.min(end)..end {
            self.dirty.mark(byte * 2);
            self.dirty.mark(byte * 2 + 1);
        }
    }

    fn mark_bits(&mut self, bit: usize, width: usize) {
        if bit >= layout::SCREEN.end() * 8 {
            return;
        }
        let first = bit / 4;
        let last = (bit + width - 1) / 4;
        for pixel in first..=last {
            self.dirty.mark(pixel);
        }
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}
