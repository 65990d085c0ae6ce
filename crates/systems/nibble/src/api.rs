//! Guest API table.
//!
//! Runtimes bind guest functions by iterating [`API`]. Every entry takes the
//! core and a slice of loosely typed arguments, so a binding only has to
//! convert its language's values to and from [`Value`].

use std::fmt;

use nibble_core::logging::{log, LogCategory, LogLevel};
use thiserror::Error;

use crate::machine::{valid_bank, Core};
use crate::memory::{Bits, LEFT, TOP};
use crate::sound::{Sample, SFX_COUNT};
use crate::sync::SyncMask;

/// A guest value crossing the API boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Integer view: numbers truncate, booleans are 0/1, anything else is `None`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Num(n) => Some(*n as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Guest truthiness: only nil and false are false.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

pub type ApiCall = fn(&mut Core, &[Value]) -> Value;

/// One guest-callable function.
#[derive(Clone, Copy)]
pub struct ApiFunction {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub call: ApiCall,
}

impl fmt::Debug for ApiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiFunction")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("unknown function '{0}'")]
    Unknown(String),
    #[error("'{name}' takes {min}..={max} arguments, got {got}")]
    Arity {
        name: &'static str,
        min: usize,
        max: usize,
        got: usize,
    },
}

/// Argument `i` as an integer, or `default` when missing or not numeric.
fn int(args: &[Value], i: usize, default: i64) -> i64 {
    args.get(i).and_then(Value::as_int).unwrap_or(default)
}

fn i32_arg(args: &[Value], i: usize, default: i32) -> i32 {
    int(args, i, default as i64).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn color(args: &[Value], i: usize, default: u8) -> u8 {
    (int(args, i, default as i64) & 0x0F) as u8
}

fn flag(args: &[Value], i: usize) -> bool {
    args.get(i).is_some_and(Value::truthy)
}

fn peek_n(core: &mut Core, args: &[Value], bits: Bits) -> Value {
    Value::Int(core.peek(int(args, 0, 0), bits) as i64)
}

fn poke_n(core: &mut Core, args: &[Value], bits: Bits) -> Value {
    core.poke(int(args, 0, 0), int(args, 1, 0) as u8, bits);
    Value::Nil
}

fn peek(core: &mut Core, args: &[Value]) -> Value {
    match Bits::from_width(int(args, 1, 8)) {
        Some(bits) => peek_n(core, args, bits),
        None => Value::Int(0),
    }
}

fn poke(core: &mut Core, args: &[Value]) -> Value {
    if let Some(bits) = Bits::from_width(int(args, 2, 8)) {
        poke_n(core, args, bits);
    }
    Value::Nil
}

fn memcpy(core: &mut Core, args: &[Value]) -> Value {
    core.memcpy(int(args, 0, 0), int(args, 1, 0), int(args, 2, 0));
    Value::Nil
}

fn memset(core: &mut Core, args: &[Value]) -> Value {
    core.memset(int(args, 0, 0), int(args, 1, 0) as u8, int(args, 2, 0));
    Value::Nil
}

fn pmem(core: &mut Core, args: &[Value]) -> Value {
    let value = args.get(1).and_then(Value::as_int).map(|v| v as u32);
    Value::Int(core.pmem(int(args, 0, 0), value) as i64)
}

fn sync(core: &mut Core, args: &[Value]) -> Value {
    let mask = SyncMask::from_bits(int(args, 0, 0) as u32);
    let bank = int(args, 1, 0);
    let Some(bank) = valid_bank(bank) else {
        log(LogCategory::Sync, LogLevel::Warn, || {
            format!("sync: invalid bank {bank}")
        });
        return Value::Bool(false);
    };
    core.sync(mask, bank, flag(args, 2));
    Value::Nil
}

fn vbank(core: &mut Core, args: &[Value]) -> Value {
    Value::Int(core.vbank(int(args, 0, -1)) as i64)
}

fn btn(core: &mut Core, args: &[Value]) -> Value {
    let id = i32_arg(args, 0, -1);
    let value = core.btn(id);
    if id < 0 {
        Value::Int(value as i64)
    } else {
        Value::Bool(value != 0)
    }
}

fn btnp(core: &mut Core, args: &[Value]) -> Value {
    let id = i32_arg(args, 0, -1);
    let value = core.btnp(id, i32_arg(args, 1, -1), i32_arg(args, 2, -1));
    if id < 0 {
        Value::Int(value as i64)
    } else {
        Value::Bool(value != 0)
    }
}

fn key(core: &mut Core, args: &[Value]) -> Value {
    Value::Bool(core.key(i32_arg(args, 0, -1)))
}

fn keyp(core: &mut Core, args: &[Value]) -> Value {
    Value::Bool(core.keyp(
        i32_arg(args, 0, -1),
        i32_arg(args, 1, -1),
        i32_arg(args, 2, -1),
    ))
}

/// `[x, y, left, middle, right, scroll_x, scroll_y]`, position in screen
/// coordinates, or raw deltas in relative mode.
fn mouse(core: &mut Core, _args: &[Value]) -> Value {
    let m = core.mouse();
    let (x, y) = if m.relative {
        (m.x as i8 as i64, m.y as i8 as i64)
    } else {
        (m.x as i64 - LEFT as i64, m.y as i64 - TOP as i64)
    };
    Value::List(vec![
        Value::Int(x),
        Value::Int(y),
        Value::Bool(m.left),
        Value::Bool(m.middle),
        Value::Bool(m.right),
        Value::Int(m.scroll_x as i64),
        Value::Int(m.scroll_y as i64),
    ])
}

fn time(core: &mut Core, _args: &[Value]) -> Value {
    Value::Num(core.time())
}

fn tstamp(core: &mut Core, _args: &[Value]) -> Value {
    Value::Int(core.tstamp() as i64)
}

fn trace(core: &mut Core, args: &[Value]) -> Value {
    let message = args.first().map(Value::to_string).unwrap_or_default();
    core.trace(&message, color(args, 1, 15));
    Value::Nil
}

fn exit(core: &mut Core, _args: &[Value]) -> Value {
    core.exit();
    Value::Nil
}

fn reset(core: &mut Core, _args: &[Value]) -> Value {
    core.reset();
    Value::Nil
}

fn cls(core: &mut Core, args: &[Value]) -> Value {
    core.canvas().cls(color(args, 0, 0));
    Value::Nil
}

/// Reads the pixel with two arguments, writes it with three.
fn pix(core: &mut Core, args: &[Value]) -> Value {
    let (x, y) = (i32_arg(args, 0, 0), i32_arg(args, 1, 0));
    match args.get(2).and_then(Value::as_int) {
        Some(c) => {
            core.canvas().pix(x, y, (c & 0x0F) as u8);
            Value::Nil
        }
        None => Value::Int(core.canvas().get_pix(x, y) as i64),
    }
}

fn rect_args(args: &[Value]) -> (i32, i32, i32, i32, u8) {
    (
        i32_arg(args, 0, 0),
        i32_arg(args, 1, 0),
        i32_arg(args, 2, 0),
        i32_arg(args, 3, 0),
        color(args, 4, 0),
    )
}

fn rect(core: &mut Core, args: &[Value]) -> Value {
    let (x, y, w, h, c) = rect_args(args);
    core.canvas().rect(x, y, w, h, c);
    Value::Nil
}

fn rectb(core: &mut Core, args: &[Value]) -> Value {
    let (x, y, w, h, c) = rect_args(args);
    core.canvas().rectb(x, y, w, h, c);
    Value::Nil
}

fn line(core: &mut Core, args: &[Value]) -> Value {
    let (x0, y0, x1, y1, c) = rect_args(args);
    core.canvas().line(x0, y0, x1, y1, c);
    Value::Nil
}

/// No arguments resets the clip.
fn clip(core: &mut Core, args: &[Value]) -> Value {
    if args.len() < 4 {
        core.reset_clip();
    } else {
        let (x, y, w, h, _) = rect_args(args);
        core.clip(x, y, w, h);
    }
    Value::Nil
}

/// `sfx(id, note, duration, channel, volume, speed)`. `note` counts semitones
/// from octave 0; a negative note plays the sample's own note.
fn sfx(core: &mut Core, args: &[Value]) -> Value {
    let index = i32_arg(args, 0, -1);
    let mut note = i32_arg(args, 1, -1);
    if note < 0 {
        note = match usize::try_from(index) {
            Ok(i) if i < SFX_COUNT => {
                let sample = Sample::read(&core.ram, i);
                sample.note as i32 + sample.octave as i32 * 12
            }
            _ => 0,
        };
    }
    let volume = int(args, 4, 15).clamp(0, 15) as u8;
    core.sfx(
        index,
        note % 12,
        note / 12,
        i32_arg(args, 2, -1),
        i32_arg(args, 3, 0),
        (volume, volume),
        i32_arg(args, 5, 0),
    );
    Value::Nil
}

/// `music(track, frame, row, loop, sustain, tempo, speed)`.
fn music(core: &mut Core, args: &[Value]) -> Value {
    let looped = args.get(3).map_or(true, Value::truthy);
    core.music(
        i32_arg(args, 0, -1),
        i32_arg(args, 1, -1),
        i32_arg(args, 2, -1),
        looped,
        flag(args, 4),
        i32_arg(args, 5, -1),
        i32_arg(args, 6, -1),
    );
    Value::Nil
}

macro_rules! api {
    ($name:literal, $min:expr, $max:expr, $call:expr) => {
        ApiFunction {
            name: $name,
            min_args: $min,
            max_args: $max,
            call: $call,
        }
    };
}

/// Every guest function, in binding order.
pub static API: &[ApiFunction] = &[
    api!("peek", 1, 2, peek),
    api!("poke", 2, 3, poke),
    api!("peek1", 1, 1, |c, a| peek_n(c, a, Bits::One)),
    api!("poke1", 2, 2, |c, a| poke_n(c, a, Bits::One)),
    api!("peek2", 1, 1, |c, a| peek_n(c, a, Bits::Two)),
    api!("poke2", 2, 2, |c, a| poke_n(c, a, Bits::Two)),
    api!("peek4", 1, 1, |c, a| peek_n(c, a, Bits::Four)),
    api!("poke4", 2, 2, |c, a| poke_n(c, a, Bits::Four)),
    api!("memcpy", 3, 3, memcpy),
    api!("memset", 3, 3, memset),
    api!("pmem", 1, 2, pmem),
    api!("sync", 0, 3, sync),
    api!("vbank", 0, 1, vbank),
    api!("btn", 0, 1, btn),
    api!("btnp", 0, 3, btnp),
    api!("key", 0, 1, key),
    api!("keyp", 0, 3, keyp),
    api!("mouse", 0, 0, mouse),
    api!("time", 0, 0, time),
    api!("tstamp", 0, 0, tstamp),
    api!("trace", 1, 2, trace),
    api!("exit", 0, 0, exit),
    api!("reset", 0, 0, reset),
    api!("cls", 0, 1, cls),
    api!("pix", 2, 3, pix),
    api!("rect", 5, 5, rect),
    api!("rectb", 5, 5, rectb),
    api!("line", 5, 5, line),
    api!("clip", 0, 4, clip),
    api!("sfx", 1, 6, sfx),
    api!("music", 0, 7, music),
];

pub fn lookup(name: &str) -> Option<&'static ApiFunction> {
    API.iter().find(|f| f.name == name)
}

/// Call `name` after checking its arity.
pub fn call(core: &mut Core, name: &str, args: &[Value]) -> Result<Value, ApiError> {
    let f = lookup(name).ok_or_else(|| ApiError::Unknown(name.to_string()))?;
    if args.len() < f.min_args || args.len() > f.max_args {
        return Err(ApiError::Arity {
            name: f.name,
            min: f.min_args,
            max: f.max_args,
            got: args.len(),
        });
    }
    Ok((f.call)(core, args))
}
