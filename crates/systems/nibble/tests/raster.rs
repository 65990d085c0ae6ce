//! Raster blit: frame shape, borders, scrolling, hooks and the overlay pass.

mod common;

use common::{events, frame, machine, Events, FakeRuntime};
use nibble_core::palette::{BlitPalette, IndexedPalette, PixelFormat, DEFAULT_PALETTE};
use nibble_machine::memory::{layout, FULL_HEIGHT, FULL_WIDTH, HEIGHT, LEFT, TOP, WIDTH};
use nibble_machine::{Bits, Cart, Core, HookSet, Machine};

fn color(index: usize) -> u32 {
    BlitPalette::from_rgb(&DEFAULT_PALETTE, PixelFormat::Rgba8888).get_color(index)
}

/// A running machine whose program fills the screen with `fill` every frame.
fn running(fill: u8, hooks: HookSet, setup: impl FnOnce(&mut FakeRuntime)) -> (Machine, Events) {
    let (mut m, _) = machine();
    let ev = events();
    let mut runtime = FakeRuntime::new(&["lua"], "--", &ev);
    runtime.hooks = hooks;
    runtime.on_tick = Some(Box::new(move |core: &mut Core| core.canvas().cls(fill)));
    setup(&mut runtime);
    m.register_runtime(Box::new(runtime));
    m.load_cart(Cart::with_code("-- script: lua\n"));
    frame(&mut m);
    ev.borrow_mut().clear();
    (m, ev)
}

#[test]
fn test_frame_has_full_size() {
    let (mut m, _) = machine();
    let f = m.blit();
    assert_eq!((f.width as usize, f.height as usize), (FULL_WIDTH, FULL_HEIGHT));
    assert_eq!(f.pixels.len(), FULL_WIDTH * FULL_HEIGHT);
}

#[test]
fn test_solid_fill_maps_through_palette() {
    let (mut m, _) = running(5, HookSet::default(), |_| {});
    let f = m.blit();
    for y in TOP..TOP + HEIGHT {
        for x in LEFT..LEFT + WIDTH {
            assert_eq!(f.pixel(x as u32, y as u32), Some(color(5)));
        }
    }
}

#[test]
fn test_margins_use_border_color() {
    let (mut m, _) = running(5, HookSet::default(), |_| {});
    m.core_mut().poke(layout::BORDER.offset as i64, 9, Bits::Eight);
    let f = m.blit();
    for y in 0..FULL_HEIGHT {
        let inside_rows = (TOP..TOP + HEIGHT).contains(&y);
        for x in 0..FULL_WIDTH {
            let inside = inside_rows && (LEFT..LEFT + WIDTH).contains(&x);
            if !inside {
                assert_eq!(f.pixel(x as u32, y as u32), Some(color(9)), "({x}, {y})");
            }
        }
    }
}

#[test]
fn test_offset_wraps_around() {
    let (mut m, _) = running(0, HookSet::default(), |_| {});
    let core = m.core_mut();
    core.canvas().pix(0, 0, 7);
    core.canvas().pix(WIDTH as i32 - 1, HEIGHT as i32 - 1, 3);
    let offset = layout::OFFSET.offset as i64;
    core.poke(offset, (-1i8) as u8, Bits::Eight);
    core.poke(offset + 1, (-1i8) as u8, Bits::Eight);
    let f = m.blit();
    // bottom-right pixel scrolls into the top-left corner, top-left moves by one
    assert_eq!(f.pixel(LEFT as u32, TOP as u32), Some(color(3)));
    assert_eq!(f.pixel(LEFT as u32 + 1, TOP as u32 + 1), Some(color(7)));
}

#[test]
fn test_hook_order() {
    let hooks = HookSet {
        scanline: true,
        border: true,
        ..HookSet::default()
    };
    let (mut m, ev) = running(0, hooks, |_| {});
    m.blit();
    let ev = ev.borrow();
    assert_eq!(ev[0], "scanline 0");
    assert_eq!(ev[1], "border 0");
    let border5 = ev.iter().position(|e| e == "border 5").unwrap();
    assert_eq!(ev[border5 + 1], "scanline 1");
    assert_eq!(ev.iter().filter(|e| e.starts_with("border")).count(), FULL_HEIGHT);
    assert_eq!(ev.iter().filter(|e| e.starts_with("scanline")).count(), HEIGHT);
    assert!(!ev.contains(&format!("scanline {HEIGHT}")));
}

#[test]
fn test_border_hook_changes_apply_per_row() {
    let hooks = HookSet {
        border: true,
        ..HookSet::default()
    };
    let (mut m, _) = running(0, hooks, |runtime| {
        runtime.on_border = Some(Box::new(|core: &mut Core, row: i32| {
            let c = if row < 72 { 1 } else { 2 };
            core.poke(layout::BORDER.offset as i64, c, Bits::Eight);
        }));
    });
    let f = m.blit();
    assert_eq!(f.pixel(0, 0), Some(color(1)));
    assert_eq!(f.pixel(0, 71), Some(color(1)));
    assert_eq!(f.pixel(0, 72), Some(color(2)));
    assert_eq!(f.pixel(0, FULL_HEIGHT as u32 - 1), Some(color(2)));
}

#[test]
fn test_scanline_palette_change_is_seen() {
    let hooks = HookSet {
        scanline: true,
        ..HookSet::default()
    };
    let (mut m, _) = running(0, hooks, |runtime| {
        runtime.on_scanline = Some(Box::new(|core: &mut Core, row: i32| {
            let value = if row >= 10 { 0xFF } else { DEFAULT_PALETTE[0] };
            core.poke(layout::PALETTE.offset as i64, value, Bits::Eight);
        }));
    });
    let f = m.blit();
    let mut changed = DEFAULT_PALETTE;
    changed[0] = 0xFF;
    let changed = BlitPalette::from_rgb(&changed, PixelFormat::Rgba8888).get_color(0);
    assert_eq!(f.pixel(LEFT as u32, TOP as u32 + 9), Some(color(0)));
    assert_eq!(f.pixel(LEFT as u32, TOP as u32 + 10), Some(changed));
}

#[test]
fn test_overlay_recomposites_dirty_pixels_only() {
    let hooks = HookSet {
        overline: true,
        ..HookSet::default()
    };
    let (mut m, ev) = running(5, hooks, |runtime| {
        runtime.on_overline = Some(Box::new(|core: &mut Core| {
            core.poke(layout::PALETTE.offset as i64 + 6, 0x01, Bits::Eight);
            core.canvas().pix(0, 0, 2);
        }));
    });
    let f = m.blit().clone();
    assert_eq!(ev.borrow().as_slice(), ["overline"]);

    let mut overlay = DEFAULT_PALETTE;
    overlay[6] = 0x01;
    let expected = BlitPalette::from_rgb(&overlay, PixelFormat::Rgba8888).get_color(2);
    assert_eq!(f.pixel(LEFT as u32, TOP as u32), Some(expected));
    assert_eq!(f.pixel(LEFT as u32 + 1, TOP as u32), Some(color(5)));

    let core = m.core();
    assert_eq!(core.ram.screen_pixel(0), 5);
    assert_eq!(core.ram.region(layout::PALETTE), &DEFAULT_PALETTE);
    assert_eq!(&core.state().ovr_palette, &overlay);
    assert_eq!(core.ram.dirty().count(), 0);
}

#[test]
fn test_blit_without_running_program_skips_hooks() {
    let (mut m, _) = machine();
    let ev = events();
    let mut runtime = FakeRuntime::new(&["lua"], "--", &ev);
    runtime.hooks = HookSet {
        scanline: true,
        border: true,
        overline: true,
        menu: false,
    };
    m.register_runtime(Box::new(runtime));
    m.load_cart(Cart::with_code("-- script: lua\n"));
    m.blit();
    assert!(ev.borrow().is_empty());
}
