//! Raster blit: composes the full output frame from VRAM.
//!
//! The frame is produced row by row so that guest hooks can change the
//! palette, border color or scroll offset between rows. After the main pass an
//! optional overlay pass lets the program draw on top of the finished frame
//! with its own palette, without disturbing the screen bitmap.

use nibble_core::logging::{log, LogCategory, LogLevel};
use nibble_core::palette::{BlitPalette, IndexedPalette, PixelFormat, PALETTE_BYTES};
use nibble_core::types::Frame;

use crate::machine::Core;
use crate::memory::{layout, FULL_HEIGHT, FULL_WIDTH, HEIGHT, LEFT, TOP, WIDTH};
use crate::script::HookSet;

/// Hooks invoked while blitting.
pub trait RasterHooks {
    /// Hooks that are bound; unbound hooks are never called.
    fn hooks(&self) -> HookSet;

    /// Before visible row `row` is drawn; row 0 fires once before the frame.
    fn scanline(&mut self, core: &mut Core, row: i32);

    /// Before full-frame row `row`, border included.
    fn border(&mut self, core: &mut Core, row: i32);

    /// After the frame is composed.
    fn overline(&mut self, core: &mut Core);
}

/// No hooks bound.
pub struct NoHooks;

impl RasterHooks for NoHooks {
    fn hooks(&self) -> HookSet {
        HookSet::default()
    }

    fn scanline(&mut self, _core: &mut Core, _row: i32) {}

    fn border(&mut self, _core: &mut Core, _row: i32) {}

    fn overline(&mut self, _core: &mut Core) {}
}

/// Source index for output position `pos` scrolled by `offset`, wrapping
/// around `size`.
pub fn source_index(pos: usize, offset: i32, size: usize) -> usize {
    (pos as i64 + offset as i64).rem_euclid(size as i64) as usize
}

fn palette(core: &Core, format: PixelFormat) -> BlitPalette {
    BlitPalette::from_rgb(core.ram.region(layout::PALETTE), format)
}

/// Compose `frame` (resized to the full frame if needed) from VRAM.
pub fn blit(core: &mut Core, hooks: &mut dyn RasterHooks, frame: &mut Frame) {
    if frame.width as usize != FULL_WIDTH || frame.height as usize != FULL_HEIGHT {
        *frame = Frame::new(FULL_WIDTH as u32, FULL_HEIGHT as u32);
    }
    let bound = hooks.hooks();
    let format = core.config.pixel_format;

    if bound.scanline {
        hooks.scanline(core, 0);
    }

    for row in 0..FULL_HEIGHT {
        if bound.border {
            hooks.border(core, row as i32);
        }
        let visible = (TOP..TOP + HEIGHT).contains(&row);
        if visible && row > TOP && bound.scanline {
            hooks.scanline(core, (row - TOP) as i32);
        }

        let pal = palette(core, format);
        let border = pal.get_color(core.ram.border_color() as usize);
        let line = &mut frame.pixels[row * FULL_WIDTH..(row + 1) * FULL_WIDTH];
        if !visible {
            line.fill(border);
            continue;
        }

        line[..LEFT].fill(border);
        line[LEFT + WIDTH..].fill(border);
        let (ox, oy) = core.ram.offset();
        let src_row = source_index(row - TOP, oy as i32, HEIGHT) * WIDTH;
        for (x, out) in line[LEFT..LEFT + WIDTH].iter_mut().enumerate() {
            let src = src_row + source_index(x, ox as i32, WIDTH);
            *out = pal.get_color(core.ram.screen_pixel(src) as usize);
        }
    }

    if bound.overline {
        overlay(core, hooks, frame, format);
    }
}

/// Run the overline hook against a scratch screen and composite what it drew.
fn overlay(core: &mut Core, hooks: &mut dyn RasterHooks, frame: &mut Frame, format: PixelFormat) {
    let mut screen_palette = [0u8; PALETTE_BYTES];
    screen_palette.copy_from_slice(core.ram.region(layout::PALETTE));
    let bitmap = core.ram.region(layout::SCREEN).to_vec();

    let ovr = if core.state.ovr_palette.iter().all(|&b| b == 0) {
        screen_palette
    } else {
        core.state.ovr_palette
    };
    core.ram.region_mut(layout::PALETTE).copy_from_slice(&ovr);
    core.ram.dirty_mut().clear();

    hooks.overline(core);

    let pal = palette(core, format);
    for pixel in core.ram.dirty().iter() {
        let (x, y) = (pixel % WIDTH, pixel / WIDTH);
        frame.pixels[(y + TOP) * FULL_WIDTH + x + LEFT] =
            pal.get_color(core.ram.screen_pixel(pixel) as usize);
    }
    log(LogCategory::Raster, LogLevel::Trace, || {
        format!("overlay recomposited {} pixels", core.ram.dirty().count())
    });

    core.state
        .ovr_palette
        .copy_from_slice(core.ram.region(layout::PALETTE));
    core.ram
        .region_mut(layout::PALETTE)
        .copy_from_slice(&screen_palette);
    core.ram.region_mut(layout::SCREEN).copy_from_slice(&bitmap);
    core.ram.dirty_mut().clear();
}
