//! Memory surface, bank sync and input edges as a guest sees them.

mod common;

use common::{events, machine, FakeRuntime};
use nibble_machine::api::{self, Value};
use nibble_machine::memory::{layout, RAM_SIZE};
use nibble_machine::{Bits, Cart, Machine, RawInput, SyncMask};

fn running() -> Machine {
    let (mut m, _) = machine();
    let ev = events();
    m.register_runtime(Box::new(FakeRuntime::new(&["lua"], "--", &ev)));
    m.load_cart(Cart::with_code("-- script: lua\n"));
    m.tick_start();
    m.tick();
    m.tick_end();
    m
}

#[test]
fn test_peek_poke_resolutions_agree() {
    let (mut m, _) = machine();
    let core = m.core_mut();
    for (i, byte) in [0x00u8, 0xFF, 0xA5, 0x3C].into_iter().enumerate() {
        let addr = 0x4000 + i as i64;
        core.poke(addr, byte, Bits::Eight);
        for bits in [Bits::One, Bits::Two, Bits::Four] {
            let per_byte = (8 / bits.width()) as i64;
            let mut rebuilt = 0u8;
            for k in 0..per_byte {
                let part = core.peek(addr * per_byte + k, bits);
                rebuilt |= part << (k as usize * bits.width());
            }
            assert_eq!(rebuilt, byte, "{} bits", bits.width());
        }
    }
}

#[test]
fn test_out_of_range_access_is_silent() {
    let (mut m, _) = machine();
    let core = m.core_mut();
    core.poke(-1, 0xFF, Bits::Eight);
    core.poke(RAM_SIZE as i64, 0xFF, Bits::Eight);
    assert_eq!(core.peek(RAM_SIZE as i64 * 2, Bits::Four), 0);
    assert_eq!(core.peek(RAM_SIZE as i64 * 2 - 1, Bits::Four), 0);
    assert!(!core.memset(RAM_SIZE as i64 - 4, 0xFF, 8));
    assert!(!core.memset(-1, 0xFF, 2));
    assert!(!core.memcpy(0, RAM_SIZE as i64 - 1, 2));
    assert_eq!(core.peek(RAM_SIZE as i64 - 4, Bits::Eight), 0);
    assert_eq!(core.peek(0, Bits::Eight), 0);
}

#[test]
fn test_pmem_returns_previous_value() {
    let (mut m, _) = machine();
    let core = m.core_mut();
    assert_eq!(core.pmem(3, Some(77)), 0);
    assert_eq!(core.pmem(3, Some(78)), 77);
    assert_eq!(core.pmem(3, None), 78);
    assert_eq!(core.pmem(256, Some(1)), 0);
    assert_eq!(core.pmem(-1, None), 0);
}

#[test]
fn test_sync_is_idempotent_within_a_frame() {
    let mut m = running();
    m.tick_start();
    let core = m.core_mut();
    core.cart.bank_mut(2).map[0] = 0x10;
    assert_eq!(core.sync(SyncMask::MAP, 2, false), SyncMask::MAP);
    assert_eq!(core.peek(layout::MAP.offset as i64, Bits::Eight), 0x10);

    core.cart.bank_mut(3).map[0] = 0x20;
    assert_eq!(core.sync(SyncMask::MAP, 3, false), SyncMask::NONE);
    assert_eq!(core.peek(layout::MAP.offset as i64, Bits::Eight), 0x10);

    m.tick_end();
    m.tick_start();
    assert_eq!(m.core_mut().sync(SyncMask::MAP, 3, false), SyncMask::MAP);
    assert_eq!(m.core().peek(layout::MAP.offset as i64, Bits::Eight), 0x20);
}

#[test]
fn test_sync_round_trip() {
    let mut m = running();
    m.tick_start();
    let core = m.core_mut();
    core.poke(layout::TILES.offset as i64 + 5, 0xAB, Bits::Eight);
    core.poke(layout::FLAGS.offset as i64, 0x0F, Bits::Eight);
    core.sync(SyncMask::ALL, 4, true);
    assert_eq!(core.cart.bank(4).tiles[5], 0xAB);
    assert_eq!(core.cart.bank(4).flags[0], 0x0F);

    m.tick_start();
    let core = m.core_mut();
    core.poke(layout::TILES.offset as i64 + 5, 0, Bits::Eight);
    core.sync(SyncMask::TILES | SyncMask::FLAGS, 4, false);
    assert_eq!(core.peek(layout::TILES.offset as i64 + 5, Bits::Eight), 0xAB);
}

#[test]
#[should_panic]
fn test_sync_invalid_bank_panics() {
    let mut m = running();
    m.core_mut().sync(SyncMask::ALL, 8, false);
}

#[test]
fn test_btnp_hold_and_period() {
    let mut m = running();
    let pressed = RawInput {
        gamepads: 1,
        ..RawInput::default()
    };
    let mut fired = Vec::new();
    for frame in 0..10 {
        m.set_input(&pressed);
        m.tick_start();
        if m.core().btnp(0, 3, 2) != 0 {
            fired.push(frame);
        }
        m.tick_end();
    }
    assert_eq!(fired, vec![0, 4, 6, 8]);
}

#[test]
fn test_btnp_without_repeat_fires_once() {
    let mut m = running();
    let pressed = RawInput {
        gamepads: 1 << 5,
        ..RawInput::default()
    };
    let mut fired = 0;
    for _ in 0..10 {
        m.set_input(&pressed);
        m.tick_start();
        fired += m.core().btnp(5, -1, -1).count_ones();
        assert_ne!(m.core().btn(5), 0);
        m.tick_end();
    }
    assert_eq!(fired, 1);
}

#[test]
fn test_keyp_any_key() {
    let mut m = running();
    m.set_input(&RawInput {
        keyboard: [12, 0, 0, 0],
        ..RawInput::default()
    });
    m.tick_start();
    assert!(m.core().keyp(-1, -1, -1));
    assert!(m.core().keyp(12, -1, -1));
    assert!(!m.core().keyp(13, -1, -1));
    m.tick_end();
    m.tick_start();
    assert!(!m.core().keyp(-1, -1, -1));
    assert!(m.core().key(12));
}

#[test]
fn test_api_sfx_starts_channel() {
    let mut m = running();
    let core = m.core_mut();
    let args = [Value::Int(3), Value::Int(36), Value::Int(10), Value::Int(2)];
    assert_eq!(api::call(core, "sfx", &args), Ok(Value::Nil));
    let channel = core.state().sound.sfx_channel(2);
    assert_eq!(channel.index, 3);
    assert_eq!(channel.note, 36);
    assert_eq!(channel.duration, 10);
}

#[test]
fn test_api_vbank_and_memset() {
    let mut m = running();
    let core = m.core_mut();
    api::call(core, "memset", &[Value::Int(0), Value::Int(0x11), Value::Int(4)]).unwrap();
    assert_eq!(api::call(core, "vbank", &[Value::Int(1)]), Ok(Value::Int(0)));
    assert_eq!(api::call(core, "peek", &[Value::Int(0)]), Ok(Value::Int(0)));
    assert_eq!(api::call(core, "vbank", &[]), Ok(Value::Int(1)));
    api::call(core, "vbank", &[Value::Int(0)]).unwrap();
    assert_eq!(api::call(core, "peek", &[Value::Int(3)]), Ok(Value::Int(0x11)));
}
