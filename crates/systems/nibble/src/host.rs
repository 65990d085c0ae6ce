//! Services the embedding host provides to the console.

use std::time::Instant;

use nibble_core::logging::{log, LogCategory, LogLevel};

/// Host callbacks. The console never blocks on them.
pub trait Host {
    /// Monotonic counter in host ticks.
    fn counter(&self) -> u64;

    /// Counter ticks per second.
    fn freq(&self) -> u64;

    /// Show a load or runtime error.
    fn error(&mut self, message: &str);

    /// Show guest trace output.
    fn trace(&mut self, message: &str, color: u8);

    /// The guest asked to leave.
    fn exit(&mut self);
}

/// Host backed by the system clock that forwards messages to the logger.
#[derive(Debug)]
pub struct ClockHost {
    epoch: Instant,
    exit_requested: bool,
}

impl ClockHost {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            exit_requested: false,
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}

impl Default for ClockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for ClockHost {
    fn counter(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn freq(&self) -> u64 {
        1_000_000
    }

    fn error(&mut self, message: &str) {
        log(LogCategory::Script, LogLevel::Error, || message.to_string());
    }

    fn trace(&mut self, message: &str, color: u8) {
        log(LogCategory::Script, LogLevel::Info, || {
            format!("[{color:2}] {message}")
        });
    }

    fn exit(&mut self) {
        self.exit_requested = true;
    }
}
