//! Runtime core of the nibble fantasy console.
//!
//! The console is a 240x136, 16-color machine with a flat RAM image, eight
//! cart banks, four sound channels and a raster blit that guest programs can
//! hook per row. Scripting languages plug in through [`ScriptRuntime`] and
//! the host supplies timing and text output through [`Host`].

pub mod api;
pub mod cart;
pub mod config;
pub mod draw;
pub mod host;
pub mod input;
pub mod machine;
pub mod memory;
pub mod raster;
pub mod script;
pub mod sound;
pub mod sync;

pub use cart::{Bank, Cart, CartError};
pub use config::{ConfigError, MachineConfig};
pub use host::{ClockHost, Host};
pub use input::{Mouse, RawInput};
pub use machine::{Core, Machine, Phase};
pub use memory::Bits;
pub use script::{HookSet, ScriptError, ScriptRuntime};
pub use sync::SyncMask;

use thiserror::Error;

/// Why a cart could not be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("the code is empty")]
    EmptyCode,
    #[error("no script runtime registered")]
    NoRuntime,
    #[error(transparent)]
    Script(#[from] ScriptError),
}

#[derive(Error, Debug)]
pub enum SystemError {
    #[error("No cart loaded")]
    NoCart,
}
