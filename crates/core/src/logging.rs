//! Process-wide logging for the console.
//!
//! Every subsystem logs through [`log`] with a [`LogCategory`] and a
//! [`LogLevel`]. The message closure only runs when the category is enabled,
//! so disabled logging costs one atomic load.
//!
//! A category either has its own level or, when that level is `Off`, follows
//! the global one. Each category may emit a bounded number of lines per
//! second; the overflow is counted and summarized once it drains.
//!
//! Lines go to stderr unless a log file is set with [`LogConfig::set_log_file`].
//!
//! ```rust
//! use nibble_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Sync, LogLevel::Debug, || {
//!     format!("sync bank {} mask={:#04x}", 0, 0x20)
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Default per-category budget, about one line per frame.
pub const DEFAULT_RATE_LIMIT: usize = 60;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    #[default]
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

const LEVELS: [LogLevel; 6] = [
    LogLevel::Off,
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info,
    LogLevel::Debug,
    LogLevel::Trace,
];

impl LogLevel {
    /// Level from a name or its digit, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        let level = match s.to_ascii_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "err" | "1" => LogLevel::Error,
            "warn" | "warning" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => return None,
        };
        Some(level)
    }

    fn load(cell: &AtomicU8) -> Self {
        LEVELS
            .get(cell.load(Ordering::Relaxed) as usize)
            .copied()
            .unwrap_or(LogLevel::Off)
    }
}

/// Console subsystem a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LogCategory {
    /// peek/poke, memcpy/memset, pmem
    Memory,
    /// cart bank to RAM copies
    Sync,
    /// blit pipeline and drawing
    Raster,
    Input,
    /// sfx channels and the music sequencer
    Sound,
    /// runtime selection and guest callbacks
    Script,
}

const CATEGORIES: usize = 6;

impl LogCategory {
    pub fn parse(s: &str) -> Option<Self> {
        let category = match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => LogCategory::Memory,
            "sync" => LogCategory::Sync,
            "raster" | "video" => LogCategory::Raster,
            "input" => LogCategory::Input,
            "sound" | "audio" => LogCategory::Sound,
            "script" => LogCategory::Script,
            _ => return None,
        };
        Some(category)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Outcome of asking the budget for one more line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admit {
    allowed: bool,
    /// Lines dropped since the last summary, when one is due now.
    dropped: Option<usize>,
}

#[derive(Default)]
struct Budget {
    recent: VecDeque<Instant>,
    dropped: usize,
    last_summary: Option<Instant>,
}

/// Sliding one-second window of emitted lines per category.
struct RateLimiter {
    limit: AtomicUsize,
    budgets: Mutex<[Budget; CATEGORIES]>,
}

impl RateLimiter {
    fn new(limit: usize) -> Self {
        Self {
            limit: AtomicUsize::new(limit),
            budgets: Mutex::new(Default::default()),
        }
    }

    fn admit(&self, category: LogCategory, now: Instant) -> Admit {
        let limit = self.limit.load(Ordering::Relaxed);
        let mut budgets = self.budgets.lock().unwrap_or_else(|e| e.into_inner());
        let budget = &mut budgets[category.index()];

        while budget
            .recent
            .front()
            .is_some_and(|&t| now.duration_since(t) > WINDOW)
        {
            budget.recent.pop_front();
        }

        let allowed = budget.recent.len() < limit;
        if allowed {
            budget.recent.push_back(now);
        } else {
            budget.dropped += 1;
        }

        // Report as soon as lines flow again, or at most once a second while
        // still saturated.
        let due = budget.dropped > 0
            && (allowed
                || budget
                    .last_summary
                    .map_or(true, |t| now.duration_since(t) >= WINDOW));
        let dropped = due.then(|| {
            budget.last_summary = Some(now);
            std::mem::take(&mut budget.dropped)
        });

        Admit { allowed, dropped }
    }
}

/// Global logger state. Obtain it with [`LogConfig::global`].
pub struct LogConfig {
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORIES],
    limiter: RateLimiter,
    file: Mutex<Option<LineWriter<File>>>,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: std::array::from_fn(|_| AtomicU8::new(LogLevel::Off as u8)),
            limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
            file: Mutex::new(None),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::load(&self.global_level)
    }

    /// Give `category` its own level. `Off` makes it follow the global level.
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::load(&self.category_levels[category.index()])
    }

    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        let threshold = match self.get_level(category) {
            LogLevel::Off => self.get_global_level(),
            own => own,
        };
        level <= threshold
    }

    /// Turn every level back to `Off`. The log file and rate limit are kept.
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in &self.category_levels {
            category.store(LogLevel::Off as u8, Ordering::Relaxed);
        }
    }

    /// Lines each category may emit per second.
    pub fn set_rate_limit(&self, per_second: usize) {
        self.limiter.limit.store(per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.limiter.limit.load(Ordering::Relaxed)
    }

    /// Append log lines to `path` instead of stderr, creating the file if
    /// needed. Replaces any previous log file.
    pub fn set_log_file(&self, path: &Path) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.file.lock().unwrap_or_else(|e| e.into_inner()) = Some(LineWriter::new(file));
        Ok(())
    }

    /// Go back to stderr.
    pub fn clear_log_file(&self) {
        *self.file.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn emit(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        // A failed write falls through to stderr rather than losing the line.
        let written = match file.as_mut() {
            Some(out) => writeln!(out, "{line}").is_ok(),
            None => false,
        };
        if !written {
            eprintln!("{line}");
        }
    }
}

/// Log a lazily built line under `category` at `level`.
///
/// Nothing is formatted unless the category is enabled at `level` and its
/// per-second budget has room.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let admit = config.limiter.admit(category, Instant::now());
    if let Some(dropped) = admit.dropped {
        config.emit(&format!(
            "[{category:?}] rate limit hit, {dropped} line(s) dropped"
        ));
    }
    if admit.allowed {
        config.emit(&message_fn());
    }
}
