//! Input devices and edge detection.
//!
//! The host writes the current device state into RAM every frame. Level reads
//! (`btn`, `key`) look at RAM directly; edge reads (`btnp`, `keyp`) compare it
//! against the previous frame's snapshot, with an optional autorepeat driven by
//! per-button hold counters.
//!
//! Hold counters advance at tick start, comparing the previous snapshot with the
//! new input. The previous snapshot is taken at tick end, after the guest ran.

use crate::memory::{layout, Ram};

/// Gamepad buttons: 4 pads with 8 buttons each.
pub const BUTTONS: usize = 32;
/// Simultaneous keys held in the keyboard buffer.
pub const KEY_BUFFER: usize = 4;
/// Number of key codes; code 0 means no key.
pub const KEY_COUNT: usize = 95;

/// Mouse state as stored in RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mouse {
    /// Position in full-frame coordinates, border included.
    pub x: u8,
    pub y: u8,
    pub left: bool,
    pub middle: bool,
    pub right: bool,
    /// Signed 6-bit scroll deltas.
    pub scroll_x: i8,
    pub scroll_y: i8,
    pub relative: bool,
}

impl Mouse {
    pub fn to_bytes(self) -> [u8; 4] {
        let buttons = (self.left as u16)
            | (self.middle as u16) << 1
            | (self.right as u16) << 2
            | ((self.scroll_x as u16) & 0x3F) << 3
            | ((self.scroll_y as u16) & 0x3F) << 9
            | (self.relative as u16) << 15;
        let [lo, hi] = buttons.to_le_bytes();
        [self.x, self.y, lo, hi]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        let buttons = u16::from_le_bytes([bytes[2], bytes[3]]);
        let scroll = |shift: u16| (((buttons >> shift) as u8 & 0x3F) << 2) as i8 >> 2;
        Self {
            x: bytes[0],
            y: bytes[1],
            left: buttons & 1 != 0,
            middle: buttons & 2 != 0,
            right: buttons & 4 != 0,
            scroll_x: scroll(3),
            scroll_y: scroll(9),
            relative: buttons & 0x8000 != 0,
        }
    }
}

/// One frame of device input as supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawInput {
    /// Bit `pad * 8 + button` is set while the button is down.
    pub gamepads: u32,
    pub mouse: Mouse,
    /// Up to four pressed key codes, 0 for empty slots.
    pub keyboard: [u8; KEY_BUFFER],
}

impl RawInput {
    pub fn write_to(&self, ram: &mut Ram) {
        ram.write_u32(layout::GAMEPADS.offset, self.gamepads);
        ram.region_mut(layout::MOUSE)
            .copy_from_slice(&self.mouse.to_bytes());
        ram.region_mut(layout::KEYBOARD)
            .copy_from_slice(&self.keyboard);
    }

    pub fn read_from(ram: &Ram) -> Self {
        let mut mouse = [0u8; 4];
        mouse.copy_from_slice(ram.region(layout::MOUSE));
        let mut keyboard = [0u8; KEY_BUFFER];
        keyboard.copy_from_slice(ram.region(layout::KEYBOARD));
        Self {
            gamepads: ram.read_u32(layout::GAMEPADS.offset),
            mouse: Mouse::from_bytes(mouse),
            keyboard,
        }
    }
}

/// Devices a cart asked for through its `input:` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputCaps {
    pub gamepad: bool,
    pub mouse: bool,
    pub keyboard: bool,
}

impl InputCaps {
    pub const ALL: InputCaps = InputCaps {
        gamepad: true,
        mouse: true,
        keyboard: true,
    };

    /// Parse an `input:` tag value. Missing or unknown values enable everything.
    pub fn from_tag(tag: Option<&str>) -> Self {
        let only = |gamepad, mouse, keyboard| InputCaps {
            gamepad,
            mouse,
            keyboard,
        };
        match tag {
            Some("mouse") => only(false, true, false),
            Some("gamepad") => only(true, false, false),
            Some("keyboard") => only(false, false, true),
            _ => Self::ALL,
        }
    }

    /// Zero the RAM input regions of disabled devices.
    pub fn mask(&self, ram: &mut Ram) {
        if !self.gamepad {
            ram.region_mut(layout::GAMEPADS).fill(0);
        }
        if !self.mouse {
            ram.region_mut(layout::MOUSE).fill(0);
        }
        if !self.keyboard {
            ram.region_mut(layout::KEYBOARD).fill(0);
        }
    }
}

impl Default for InputCaps {
    fn default() -> Self {
        Self::ALL
    }
}

fn key_down(keyboard: &[u8; KEY_BUFFER], code: usize) -> bool {
    keyboard.iter().any(|&k| k as usize == code)
}

/// Previous-frame snapshots and hold counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputState {
    previous_gamepads: u32,
    previous_keyboard: [u8; KEY_BUFFER],
    gamepad_holds: [u32; BUTTONS],
    key_holds: [u32; KEY_COUNT],
}

impl InputState {
    pub fn new() -> Self {
        Self {
            previous_gamepads: 0,
            previous_keyboard: [0; KEY_BUFFER],
            gamepad_holds: [0; BUTTONS],
            key_holds: [0; KEY_COUNT],
        }
    }

    /// Advance hold counters: a button held in both the previous snapshot and
    /// the current input counts up, anything else resets to 0.
    pub fn update_holds(&mut self, current: &RawInput) {
        for (i, hold) in self.gamepad_holds.iter_mut().enumerate() {
            let bit = 1u32 << i;
            if self.previous_gamepads & bit != 0 && current.gamepads & bit != 0 {
                *hold += 1;
            } else {
                *hold = 0;
            }
        }
        for (code, hold) in self.key_holds.iter_mut().enumerate().skip(1) {
            if key_down(&self.previous_keyboard, code) && key_down(&current.keyboard, code) {
                *hold += 1;
            } else {
                *hold = 0;
            }
        }
    }

    /// Remember this frame's input as the previous snapshot.
    pub fn snapshot(&mut self, current: &RawInput) {
        self.previous_gamepads = current.gamepads;
        self.previous_keyboard = current.keyboard;
    }

    pub fn gamepad_hold(&self, id: usize) -> u32 {
        self.gamepad_holds.get(id).copied().unwrap_or(0)
    }

    pub fn key_hold(&self, code: usize) -> u32 {
        self.key_holds.get(code).copied().unwrap_or(0)
    }

    /// Level read. A negative id returns the whole button mask.
    pub fn btn(&self, current: &RawInput, id: i32) -> u32 {
        if id < 0 {
            current.gamepads
        } else if (id as usize) < BUTTONS {
            current.gamepads & (1 << id)
        } else {
            0
        }
    }

    /// Edge read. With a non-negative `hold` and `period`, a button held for
    /// at least `hold` frames fires again every `period` frames.
    pub fn btnp(&self, current: &RawInput, id: i32, hold: i32, period: i32) -> u32 {
        if id < 0 {
            return !self.previous_gamepads & current.gamepads;
        }
        if id as usize >= BUTTONS {
            return 0;
        }
        let bit = 1u32 << id;
        let previous = if hold >= 0 && period >= 0 {
            repeat_previous(
                self.gamepad_holds[id as usize],
                hold as u32,
                period as u32,
                self.previous_gamepads,
                0,
            )
        } else {
            self.previous_gamepads
        };
        !previous & current.gamepads & bit
    }

    /// Level read. `code <= 0` asks whether any key is down.
    pub fn key(&self, current: &RawInput, code: i32) -> bool {
        if code <= 0 {
            return current.keyboard.iter().any(|&k| k != 0);
        }
        (code as usize) < KEY_COUNT && key_down(&current.keyboard, code as usize)
    }

    /// Edge read over the keyboard buffer. `code <= 0` fires for any newly
    /// pressed key and ignores `hold` and `period`.
    pub fn keyp(&self, current: &RawInput, code: i32, hold: i32, period: i32) -> bool {
        if code <= 0 {
            return current
                .keyboard
                .iter()
                .any(|&k| k != 0 && !self.previous_keyboard.contains(&k));
        }
        let code = code as usize;
        if code >= KEY_COUNT {
            return false;
        }
        let was_down = key_down(&self.previous_keyboard, code);
        let previous = if hold >= 0 && period >= 0 {
            repeat_previous(self.key_holds[code], hold as u32, period as u32, was_down, false)
        } else {
            was_down
        };
        !previous && key_down(&current.keyboard, code)
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

/// Effective previous state under autorepeat: once the hold counter reaches
/// `hold`, the previous state reads as `released` on every `period`-th frame
/// (every frame when `period` is 0).
fn repeat_previous<T>(holds: u32, hold: u32, period: u32, previous: T, released: T) -> T {
    if holds >= hold && (period == 0 || holds % period == 0) {
        released
    } else {
        previous
    }
}
