//! Readers for the sound data packed in RAM: sfx samples, music tracks and
//! pattern rows.

use nibble_core::bits::sign_extend;

use crate::memory::{layout, Ram};

/// Ticks in one sfx sample envelope.
pub const SFX_TICKS: usize = 30;
/// Number of sfx samples.
pub const SFX_COUNT: usize = 64;
/// Bytes per sfx sample.
pub const SAMPLE_BYTES: usize = 66;
/// Bytes per waveform (32 packed 4-bit values).
pub const WAVEFORM_BYTES: usize = 16;
/// Number of music tracks.
pub const TRACKS: usize = 8;
/// Frames per music track.
pub const MUSIC_FRAMES: usize = 16;
/// Bytes per track.
pub const TRACK_BYTES: usize = 51;
/// Number of music patterns; pattern ids start at 1.
pub const PATTERNS: usize = 60;
/// Rows per pattern.
pub const PATTERN_ROWS: usize = 64;
/// Bytes per pattern row.
pub const ROW_BYTES: usize = 3;

/// Envelope index for each loop in a sample.
pub const LOOP_WAVE: usize = 0;
pub const LOOP_VOLUME: usize = 1;
pub const LOOP_CHORD: usize = 2;
pub const LOOP_PITCH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleTick {
    pub volume: u8,
    pub wave: u8,
    pub chord: u8,
    pub pitch: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleLoop {
    pub start: u8,
    pub size: u8,
}

impl SampleLoop {
    /// Envelope position after `pos` ticks: run forward until the loop end,
    /// then cycle through the loop. Without a loop the last tick holds.
    pub fn position(&self, pos: i32) -> i32 {
        if pos <= 0 {
            return 0;
        }
        if self.size == 0 {
            return pos.min(SFX_TICKS as i32 - 1);
        }
        let start = self.start as i32;
        let size = self.size as i32;
        let end = start + size - 1;
        if pos <= end {
            pos
        } else {
            start + (pos - end - 1) % size
        }
    }
}

/// One decoded sfx sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub ticks: [SampleTick; SFX_TICKS],
    pub octave: u8,
    pub pitch16x: bool,
    /// Signed 3-bit playback speed.
    pub speed: i8,
    pub reverse: bool,
    pub note: u8,
    pub stereo_left: bool,
    pub stereo_right: bool,
    pub loops: [SampleLoop; 4],
}

impl Sample {
    pub fn parse(bytes: &[u8]) -> Self {
        let mut ticks = [SampleTick::default(); SFX_TICKS];
        for (i, tick) in ticks.iter_mut().enumerate() {
            let (a, b) = (bytes[i * 2], bytes[i * 2 + 1]);
            *tick = SampleTick {
                volume: a & 0x0F,
                wave: a >> 4,
                chord: b & 0x0F,
                pitch: sign_extend(b >> 4, 4),
            };
        }
        let flags = bytes[60];
        let note = bytes[61];
        let mut loops = [SampleLoop::default(); 4];
        for (i, l) in loops.iter_mut().enumerate() {
            let b = bytes[62 + i];
            *l = SampleLoop {
                start: b & 0x0F,
                size: b >> 4,
            };
        }
        Self {
            ticks,
            octave: flags & 0x07,
            pitch16x: flags & 0x08 != 0,
            speed: sign_extend((flags >> 4) & 0x07, 3),
            reverse: flags & 0x80 != 0,
            note: note & 0x0F,
            stereo_left: note & 0x10 != 0,
            stereo_right: note & 0x20 != 0,
            loops,
        }
    }

    /// Read sample `index` from RAM. Caller keeps `index` below `SFX_COUNT`.
    pub fn read(ram: &Ram, index: usize) -> Self {
        let offset = index * SAMPLE_BYTES;
        Self::parse(&ram.region(layout::SFX)[offset..offset + SAMPLE_BYTES])
    }
}

/// Music commands carried by pattern rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Empty,
    Volume,
    Chord,
    Jump,
    Slide,
    Pitch,
    Vibrato,
    Delay,
}

impl Command {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => Command::Volume,
            2 => Command::Chord,
            3 => Command::Jump,
            4 => Command::Slide,
            5 => Command::Pitch,
            6 => Command::Vibrato,
            7 => Command::Delay,
            _ => Command::Empty,
        }
    }
}

/// Row note values below this are control codes.
pub const NOTE_START: u8 = 4;
/// Row note that stops the channel.
pub const NOTE_STOP: u8 = 1;

/// One decoded pattern row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternRow {
    pub note: u8,
    pub param1: u8,
    pub param2: u8,
    pub command: Command,
    pub sfx: u8,
    pub octave: u8,
}

impl PatternRow {
    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            note: bytes[0] & 0x0F,
            param1: bytes[0] >> 4,
            param2: bytes[1] & 0x0F,
            command: Command::from_bits(bytes[1] >> 4),
            sfx: ((bytes[1] >> 7) << 5) | (bytes[2] & 0x1F),
            octave: bytes[2] >> 5,
        }
    }

    /// Read a row of pattern `id` (1-based). Caller keeps both in range.
    pub fn read(ram: &Ram, id: usize, row: usize) -> Self {
        let offset = (id - 1) * PATTERN_ROWS * ROW_BYTES + row * ROW_BYTES;
        Self::parse(&ram.region(layout::PATTERNS)[offset..offset + ROW_BYTES])
    }

    /// Both parameters as one byte.
    pub fn param(&self) -> i32 {
        ((self.param1 << 4) | self.param2) as i32
    }
}

/// One decoded music track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    data: [u8; MUSIC_FRAMES * 3],
    /// Signed offset from the default tempo.
    pub tempo: i8,
    /// Rows cut from the end of every pattern.
    pub rows: u8,
    /// Signed offset from the default speed.
    pub speed: i8,
}

impl Track {
    pub fn parse(bytes: &[u8]) -> Self {
        let mut data = [0u8; MUSIC_FRAMES * 3];
        data.copy_from_slice(&bytes[..MUSIC_FRAMES * 3]);
        Self {
            data,
            tempo: bytes[48] as i8,
            rows: bytes[49],
            speed: bytes[50] as i8,
        }
    }

    /// Read track `index`. Caller keeps `index` below `TRACKS`.
    pub fn read(ram: &Ram, index: usize) -> Self {
        let offset = index * TRACK_BYTES;
        Self::parse(&ram.region(layout::TRACKS)[offset..offset + TRACK_BYTES])
    }

    /// Pattern id (0 = none) for a channel in a frame.
    pub fn pattern_id(&self, frame: usize, channel: usize) -> usize {
        let at = frame * 3;
        let packed = u32::from_le_bytes([self.data[at], self.data[at + 1], self.data[at + 2], 0]);
        ((packed >> (channel * 6)) & 0x3F) as usize
    }

    /// Rows played per pattern.
    pub fn pattern_rows(&self) -> i32 {
        PATTERN_ROWS as i32 - self.rows as i32
    }
}

/// A waveform holds all-0 or all-F samples exactly when it should play noise.
pub fn is_noise(waveform: &[u8]) -> bool {
    let first = waveform[0];
    (first == 0x00 || first == 0xFF) && waveform.iter().all(|&b| b == first)
}
