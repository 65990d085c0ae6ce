//! Sound from guest call to rendered samples.

mod common;

use common::{events, frame, machine, FakeRuntime};
use nibble_machine::memory::layout;
use nibble_machine::{Bits, Cart, Machine};

fn running(cart: Cart) -> Machine {
    let (mut m, _) = machine();
    let ev = events();
    m.register_runtime(Box::new(FakeRuntime::new(&["lua"], "--", &ev)));
    m.load_cart(cart);
    frame(&mut m);
    m
}

fn square_cart() -> Cart {
    let mut cart = Cart::with_code("-- script: lua\n");
    // waveform 0: half low, half high
    cart.bank_mut(0).sfx[8..16].fill(0xFF);
    cart
}

fn loudest(m: &mut Machine, frames: usize) -> i32 {
    let mut peak = 0;
    for _ in 0..frames {
        m.tick_start();
        m.tick();
        m.tick_end();
        let samples = m.synth();
        peak = samples.iter().fold(peak, |p, &s| p.max((s as i32).abs()));
        m.blit();
    }
    peak
}

#[test]
fn test_silence_without_sfx() {
    let mut m = running(square_cart());
    assert_eq!(loudest(&mut m, 8), 0);
}

#[test]
fn test_sfx_reaches_the_synth() {
    let mut m = running(square_cart());
    assert!(m.core_mut().sfx(0, 9, 4, -1, 0, (15, 15), 0));
    assert!(loudest(&mut m, 8) > 0);
    let register = m.core().peek(layout::REGISTERS.offset as i64 + 1, Bits::Eight);
    assert_eq!(register >> 4, 15);
}

#[test]
fn test_sfx_stops_after_duration() {
    let mut m = running(square_cart());
    m.core_mut().sfx(0, 9, 4, 2, 0, (15, 15), 0);
    loudest(&mut m, 4);
    assert_eq!(loudest(&mut m, 8), 0);
}

#[test]
fn test_synth_frame_length() {
    let mut m = running(square_cart());
    assert_eq!(m.synth().len(), 44100 / 60 * 2);
}

#[test]
fn test_invalid_channel_is_ignored() {
    let mut m = running(square_cart());
    assert!(!m.core_mut().sfx(0, 9, 4, -1, 4, (15, 15), 0));
    assert!(!m.core_mut().sfx(64, 9, 4, -1, 0, (15, 15), 0));
}
