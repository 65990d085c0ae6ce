//! Sound tick: sfx channels, the music sequencer and the register ring buffer.
//!
//! Every frame `tick_start` clears the sound registers, advances the music
//! sequencer and every playing sfx channel, and writes frequency, volume and
//! waveform into each channel's register in RAM. `tick_end` pushes the final
//! registers (including anything the guest poked) into a ring buffer that the
//! [`Synth`] consumes.

mod data;
mod synth;

pub use data::*;
pub use synth::Synth;

use nibble_core::bits;
use nibble_core::logging::{log, LogCategory, LogLevel};

use crate::memory::{layout, Ram};

/// Sound channels.
pub const CHANNELS: usize = 4;
/// Maximum channel and stereo volume.
pub const MAX_VOLUME: u8 = 15;
/// Bytes per sound register: frequency, volume and a waveform.
pub const REGISTER_BYTES: usize = 18;
/// Entries in the register ring buffer.
pub const RING_LEN: usize = 12;

const NOTES: i32 = 12;
const NOTES_PER_BEAT: i32 = 4;
const NOTES_PER_MINUTE: i32 = 60 / NOTES_PER_BEAT * 60;
const DEFAULT_TEMPO: i32 = 150;
const DEFAULT_SPEED: i32 = 6;
const PITCH_DELTA: i32 = 128;

/// Register frequency per note, starting 8 notes below the first octave.
pub const NOTE_FREQS: [u16; 104] = [
    0x10, 0x11, 0x12, 0x13, 0x15, 0x16, 0x17, 0x18, 0x1a, 0x1c, 0x1d, 0x1f, 0x21, 0x23, 0x25,
    0x27, 0x29, 0x2c, 0x2e, 0x31, 0x34, 0x37, 0x3a, 0x3e, 0x41, 0x45, 0x49, 0x4e, 0x52, 0x57,
    0x5c, 0x62, 0x68, 0x6e, 0x75, 0x7b, 0x83, 0x8b, 0x93, 0x9c, 0xa5, 0xaf, 0xb9, 0xc4, 0xd0,
    0xdc, 0xe9, 0xf7, 0x106, 0x115, 0x126, 0x137, 0x14a, 0x15d, 0x172, 0x188, 0x19f, 0x1b8,
    0x1d2, 0x1ee, 0x20b, 0x22a, 0x24b, 0x26e, 0x293, 0x2ba, 0x2e4, 0x310, 0x33f, 0x370, 0x3a4,
    0x3dc, 0x417, 0x455, 0x497, 0x4dd, 0x527, 0x575, 0x5c8, 0x620, 0x67d, 0x6e0, 0x749, 0x7b8,
    0x82d, 0x8a9, 0x92d, 0x9b9, 0xa4d, 0xaea, 0xb90, 0xc40, 0xcfa, 0xdc0, 0xe91, 0xf6f,
    0x105a, 0x1153, 0x125b, 0x1372, 0x149a, 0x15d4, 0x1720, 0x1880,
];

/// One period of a sine scaled to 16.16, for vibrato.
const VIBRATO: [i32; 32] = [
    0x0, 0x31f1, 0x61f8, 0x8e3a, 0xb505, 0xd4db, 0xec83, 0xfb15, 0x10000, 0xfb15, 0xec83, 0xd4db,
    0xb505, 0x8e3a, 0x61f8, 0x31f1, 0x0, -0x31f1, -0x61f8, -0x8e3a, -0xb505, -0xd4db, -0xec83,
    -0xfb15, -0x10000, -0xfb15, -0xec83, -0xd4db, -0xb505, -0x8e3a, -0x61f8, -0x31f1,
];

/// Envelope positions, one per sample loop; -1 when the channel is idle.
pub type SfxPos = [i8; 4];

const IDLE_POS: SfxPos = [-1; 4];

/// Playback state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Ticks since the note started, -1 before the first tick.
    pub tick: i32,
    /// Sample index, -1 when stopped.
    pub index: i32,
    pub note: i32,
    pub left: u8,
    pub right: u8,
    pub speed: i8,
    /// Remaining ticks, -1 to play until stopped.
    pub duration: i32,
    pub pos: SfxPos,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            tick: -1,
            index: -1,
            note: 0,
            left: 0,
            right: 0,
            speed: 0,
            duration: -1,
            pos: IDLE_POS,
        }
    }
}

impl Channel {
    pub fn is_active(&self) -> bool {
        self.index >= 0
    }

    fn reset_pos(&mut self) {
        self.pos = IDLE_POS;
        self.tick = -1;
    }

    /// Start a sample (or stop with `index < 0`). A speed outside the signed
    /// 3-bit range uses the sample's own speed.
    #[allow(clippy::too_many_arguments)]
    fn start(
        &mut self,
        ram: &Ram,
        index: i32,
        note: i32,
        octave: i32,
        duration: i32,
        left: u8,
        right: u8,
        speed: i32,
    ) {
        self.left = left;
        self.right = right;
        if index >= 0 {
            self.speed = if (-4..=3).contains(&speed) {
                speed as i8
            } else {
                Sample::read(ram, index as usize).speed
            };
        }
        self.note = note.saturating_add(octave.saturating_mul(NOTES));
        self.duration = duration;
        self.index = index;
        self.reset_pos();
    }
}

/// Sample position reached after `ticks` at a signed speed.
pub fn sfx_pos(speed: i32, ticks: i32) -> i32 {
    if speed > 0 {
        ticks * (1 + speed)
    } else {
        ticks / (1 - speed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ChordCommand {
    tick: i32,
    note1: i32,
    note2: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct VibratoCommand {
    tick: i32,
    period: i32,
    depth: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct SlideCommand {
    tick: i32,
    note: i32,
    duration: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct DelayCommand {
    row: Option<PatternRow>,
    ticks: i32,
}

/// Running music effects of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Commands {
    chord: ChordCommand,
    vibrato: VibratoCommand,
    slide: SlideCommand,
    finepitch: i32,
    delay: DelayCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Jump {
    active: bool,
    frame: i32,
    beat: i32,
}

/// Sequencer status as stored in the music state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicStatus {
    Stop,
    PlayFrame,
    Play,
}

/// The guest-visible music position and flags in RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicPosition {
    pub track: i8,
    pub frame: i8,
    pub row: i8,
    pub looped: bool,
    pub status: MusicStatus,
    pub sustain: bool,
}

impl MusicPosition {
    pub fn read(ram: &Ram) -> Self {
        let b = ram.region(layout::MUSIC_STATE);
        Self {
            track: b[0] as i8,
            frame: b[1] as i8,
            row: b[2] as i8,
            looped: b[3] & 1 != 0,
            status: match (b[3] >> 1) & 3 {
                1 => MusicStatus::PlayFrame,
                2 => MusicStatus::Play,
                _ => MusicStatus::Stop,
            },
            sustain: b[3] & 8 != 0,
        }
    }

    pub fn write(&self, ram: &mut Ram) {
        let status = match self.status {
            MusicStatus::Stop => 0,
            MusicStatus::PlayFrame => 1,
            MusicStatus::Play => 2,
        };
        let flags = self.looped as u8 | status << 1 | (self.sustain as u8) << 3;
        ram.region_mut(layout::MUSIC_STATE).copy_from_slice(&[
            self.track as u8,
            self.frame as u8,
            self.row as u8,
            flags,
        ]);
    }
}

/// Sequencer state kept outside RAM.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Music {
    ticks: i32,
    channels: [Channel; CHANNELS],
    commands: [Commands; CHANNELS],
    jump: Jump,
    /// Tempo override, -1 to use the track's.
    tempo: i32,
    /// Speed override, -1 to use the track's.
    speed: i32,
}

impl Music {
    fn new() -> Self {
        Self {
            ticks: 0,
            channels: [Channel::default(); CHANNELS],
            commands: [Commands::default(); CHANNELS],
            jump: Jump::default(),
            tempo: -1,
            speed: -1,
        }
    }

    fn tempo(&self, track: &Track) -> i32 {
        if self.tempo < 0 {
            track.tempo as i32 + DEFAULT_TEMPO
        } else {
            self.tempo
        }
    }

    fn speed(&self, track: &Track) -> i32 {
        if self.speed < 0 {
            track.speed as i32 + DEFAULT_SPEED
        } else {
            self.speed
        }
    }

    fn tick_to_row(&self, track: &Track, tick: i32) -> i32 {
        let speed = self.speed(track);
        if speed == 0 {
            return 0;
        }
        tick * self.tempo(track) * DEFAULT_SPEED / speed / NOTES_PER_MINUTE
    }

    fn row_to_tick(&self, track: &Track, row: i32) -> i32 {
        let tempo = self.tempo(track);
        if tempo == 0 {
            return 0;
        }
        row * self.speed(track) * NOTES_PER_MINUTE / tempo / DEFAULT_SPEED
    }
}

/// One frame of sound registers queued for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEntry {
    pub registers: [u8; REGISTER_BYTES * CHANNELS],
    pub stereo: u32,
}

impl Default for RingEntry {
    fn default() -> Self {
        Self {
            registers: [0; REGISTER_BYTES * CHANNELS],
            stereo: 0,
        }
    }
}

impl RingEntry {
    pub fn frequency(&self, channel: usize) -> u16 {
        let r = &self.registers[channel * REGISTER_BYTES..];
        (((r[1] & 0x0F) as u16) << 8) | r[0] as u16
    }

    pub fn volume(&self, channel: usize) -> u8 {
        self.registers[channel * REGISTER_BYTES + 1] >> 4
    }

    pub fn waveform(&self, channel: usize) -> &[u8] {
        let at = channel * REGISTER_BYTES + 2;
        &self.registers[at..at + WAVEFORM_BYTES]
    }

    /// Stereo volume of a channel; `side` 0 is left, 1 is right.
    pub fn stereo_volume(&self, channel: usize, side: usize) -> u8 {
        bits::peek4(&self.stereo.to_le_bytes(), channel * 2 + side)
    }
}

/// Queue of register frames between tick end and synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundRing {
    entries: Vec<RingEntry>,
    head: usize,
    tail: usize,
}

impl SoundRing {
    pub fn new() -> Self {
        Self {
            entries: vec![RingEntry::default(); RING_LEN],
            head: 0,
            tail: 0,
        }
    }

    /// Store a frame at the head and advance it unless the buffer is full.
    pub fn push(&mut self, entry: RingEntry) {
        self.entries[self.head] = entry;
        if self.head != (self.tail + RING_LEN - 2) % RING_LEN {
            self.head = (self.head + 1) % RING_LEN;
        }
    }

    /// Entry to synthesize: the one just behind the tail.
    pub fn current(&self) -> &RingEntry {
        &self.entries[(self.tail + RING_LEN - 1) % RING_LEN]
    }

    /// Move the tail forward if new entries were pushed.
    pub fn advance(&mut self) {
        if self.tail != self.head {
            self.tail = (self.tail + 1) % RING_LEN;
        }
    }

    /// Entries pushed but not consumed yet.
    pub fn pending(&self) -> usize {
        (self.head + RING_LEN - self.tail) % RING_LEN
    }
}

impl Default for SoundRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Sound state of the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundState {
    sfx: [Channel; CHANNELS],
    music: Music,
    pub ring: SoundRing,
}

impl SoundState {
    pub fn new() -> Self {
        Self {
            sfx: [Channel::default(); CHANNELS],
            music: Music::new(),
            ring: SoundRing::new(),
        }
    }

    pub fn sfx_channel(&self, channel: usize) -> &Channel {
        &self.sfx[channel]
    }

    pub fn music_channel(&self, channel: usize) -> &Channel {
        &self.music.channels[channel]
    }

    /// Play sample `index` on `channel`; `index < 0` stops the channel.
    /// Returns false for an invalid channel or sample.
    #[allow(clippy::too_many_arguments)]
    pub fn sfx(
        &mut self,
        ram: &mut Ram,
        index: i32,
        note: i32,
        octave: i32,
        duration: i32,
        channel: i32,
        volume: (u8, u8),
        speed: i32,
    ) -> bool {
        if !(0..CHANNELS as i32).contains(&channel) || index >= SFX_COUNT as i32 {
            log(LogCategory::Sound, LogLevel::Warn, || {
                format!("sfx ignored: index={index} channel={channel}")
            });
            return false;
        }
        let (left, right) = volume;
        let ch = &mut self.sfx[channel as usize];
        ch.start(
            ram,
            index.max(-1),
            note,
            octave,
            duration,
            left.min(MAX_VOLUME),
            right.min(MAX_VOLUME),
            speed,
        );
        write_sfx_pos(ram, channel as usize, &ch.pos);
        true
    }

    /// Start track `track` at `frame`/`row`, or stop the music with `track < 0`.
    /// Negative `tempo`/`speed` use the track's own values.
    #[allow(clippy::too_many_arguments)]
    pub fn music(
        &mut self,
        ram: &mut Ram,
        track: i32,
        frame: i32,
        row: i32,
        looped: bool,
        sustain: bool,
        tempo: i32,
        speed: i32,
    ) {
        if track >= TRACKS as i32 {
            log(LogCategory::Sound, LogLevel::Warn, || {
                format!("music ignored: track={track}")
            });
            return;
        }
        let mut pos = MusicPosition::read(ram);
        if track < 0 {
            pos.track = -1;
            pos.status = MusicStatus::Stop;
            pos.write(ram);
            self.reset_music_channels(ram);
            return;
        }
        for c in 0..CHANNELS {
            self.start_music_channel(ram, c, -1, 0, 0, (MAX_VOLUME, MAX_VOLUME));
        }
        let frame = frame.clamp(0, MUSIC_FRAMES as i32 - 1);
        pos = MusicPosition {
            track: track as i8,
            frame: frame as i8,
            row: -1,
            looped,
            status: MusicStatus::Play,
            sustain,
        };
        pos.write(ram);
        let data = Track::read(ram, track as usize);
        self.music.tempo = tempo;
        self.music.speed = speed;
        self.music.ticks = if row >= 0 {
            self.music.row_to_tick(&data, row)
        } else {
            0
        };
    }

    fn stop_music(&mut self, ram: &mut Ram) {
        self.music(ram, -1, 0, 0, false, false, -1, -1);
    }

    fn start_music_channel(
        &mut self,
        ram: &Ram,
        c: usize,
        index: i32,
        note: i32,
        octave: i32,
        volume: (u8, u8),
    ) {
        // Music channels always take the sample's own speed.
        let speed = i32::MAX;
        self.music.channels[c].start(ram, index, note, octave, -1, volume.0, volume.1, speed);
    }

    fn reset_music_channels(&mut self, ram: &Ram) {
        for c in 0..CHANNELS {
            self.start_music_channel(ram, c, -1, 0, 0, (0, 0));
        }
        self.music.commands = [Commands::default(); CHANNELS];
        self.music.jump = Jump::default();
    }

    /// Stop everything and clear the sound RAM registers.
    pub fn reset(&mut self, ram: &mut Ram) {
        *self = Self {
            ring: std::mem::take(&mut self.ring),
            ..Self::new()
        };
        MusicPosition {
            track: -1,
            frame: 0,
            row: 0,
            looped: false,
            status: MusicStatus::Stop,
            sustain: false,
        }
        .write(ram);
        ram.region_mut(layout::REGISTERS).fill(0);
        ram.region_mut(layout::SFX_POS).fill(IDLE_POS[0] as u8);
    }

    /// Clear registers, advance music and every playing sfx channel.
    pub fn tick_start(&mut self, ram: &mut Ram) {
        ram.region_mut(layout::REGISTERS).fill(0);
        ram.write_u32(layout::STEREO.offset, u32::MAX);

        self.process_music(ram);

        for c in 0..CHANNELS {
            let mut ch = self.sfx[c];
            if ch.is_active() {
                let note = ch.note;
                step_channel(ram, &mut ch, note, 0, c);
                self.sfx[c] = ch;
                write_sfx_pos(ram, c, &ch.pos);
            }
        }
    }

    /// Queue this frame's registers for synthesis.
    pub fn tick_end(&mut self, ram: &Ram) {
        let mut entry = RingEntry::default();
        entry.registers.copy_from_slice(ram.region(layout::REGISTERS));
        entry.stereo = ram.read_u32(layout::STEREO.offset);
        self.ring.push(entry);
    }

    fn process_music(&mut self, ram: &mut Ram) {
        let mut pos = MusicPosition::read(ram);
        if pos.status == MusicStatus::Stop {
            return;
        }
        if !(0..TRACKS as i8).contains(&pos.track) {
            self.stop_music(ram);
            return;
        }
        let track = Track::read(ram, pos.track as usize);
        let mut row = self.music.tick_to_row(&track, self.music.ticks);

        if row != pos.row as i32 && self.music.jump.active {
            pos.frame = self.music.jump.frame as i8;
            row = self.music.jump.beat * NOTES_PER_BEAT;
            self.music.ticks = self.music.row_to_tick(&track, row);
            self.music.jump = Jump::default();
        }

        if row >= track.pattern_rows() {
            row = 0;
            self.music.ticks = 0;

            if !pos.sustain {
                self.reset_music_channels(ram);
                for c in 0..CHANNELS {
                    self.start_music_channel(ram, c, -1, 0, 0, (MAX_VOLUME, MAX_VOLUME));
                }
            }

            match pos.status {
                MusicStatus::Play => {
                    pos.frame += 1;
                    let wrapped = pos.frame as usize >= MUSIC_FRAMES
                        || (0..CHANNELS).all(|c| track.pattern_id(pos.frame as usize, c) == 0);
                    if wrapped {
                        if pos.looped {
                            pos.frame = 0;
                        } else {
                            self.stop_music(ram);
                            return;
                        }
                    }
                }
                MusicStatus::PlayFrame if !pos.looped => {
                    self.stop_music(ram);
                    return;
                }
                _ => {}
            }
        }

        if row != pos.row as i32 {
            pos.row = row as i8;
            let frame = (pos.frame.max(0) as usize).min(MUSIC_FRAMES - 1);
            for c in 0..CHANNELS {
                let id = track.pattern_id(frame, c);
                if id == 0 || id > PATTERNS {
                    continue;
                }
                let row = PatternRow::read(ram, id, pos.row as usize);
                self.apply_row(ram, c, row);
            }
        }
        pos.write(ram);

        for c in 0..CHANNELS {
            let cmd = self.music.commands[c];
            let mut ch = self.music.channels[c];
            if ch.is_active() {
                let mut note = ch.note;
                let mut pitch = 0;

                let chord = [0, cmd.chord.note1, cmd.chord.note2];
                let span = if cmd.chord.note2 == 0 { 2 } else { 3 };
                note += chord[(cmd.chord.tick % span) as usize];

                if cmd.vibrato.period != 0 && cmd.vibrato.depth != 0 {
                    let p = cmd.vibrato.period << 1;
                    let at = (cmd.vibrato.tick % p) * VIBRATO.len() as i32 / p;
                    pitch += (VIBRATO[at as usize] * cmd.vibrato.depth) >> 16;
                }

                if cmd.slide.tick < cmd.slide.duration {
                    note = cmd.slide.note;
                    pitch += (note_freq(ch.note) - note_freq(note)) * cmd.slide.tick
                        / cmd.slide.duration;
                }

                pitch += cmd.finepitch;
                step_channel(ram, &mut ch, note, pitch, c);
                self.music.channels[c] = ch;
            }

            let cmd = &mut self.music.commands[c];
            cmd.chord.tick += 1;
            cmd.vibrato.tick += 1;
            cmd.slide.tick += 1;
            if cmd.delay.ticks > 0 {
                cmd.delay.ticks -= 1;
            }
        }

        self.music.ticks += 1;
    }

    fn apply_row(&mut self, ram: &Ram, c: usize, row: PatternRow) {
        let mut row = Some(row);
        let cmd = &mut self.music.commands[c];

        if let Some(r) = row.filter(|r| r.command == Command::Delay) {
            cmd.delay = DelayCommand {
                row: Some(r),
                ticks: r.param(),
            };
            row = None;
        }
        if cmd.delay.row.is_some() && cmd.delay.ticks == 0 {
            row = cmd.delay.row.take();
        }
        let Some(row) = row else {
            return;
        };

        let current = self.music.channels[c];
        if row.note != 0 {
            let cmd = &mut self.music.commands[c];
            cmd.slide.tick = 0;
            cmd.slide.note = current.note;
        }
        let volume = (current.left, current.right);
        if row.note == NOTE_STOP {
            self.start_music_channel(ram, c, -1, 0, 0, volume);
        } else if row.note >= NOTE_START {
            self.start_music_channel(
                ram,
                c,
                row.sfx as i32,
                (row.note - NOTE_START) as i32,
                row.octave as i32,
                volume,
            );
        }

        let cmd = &mut self.music.commands[c];
        match row.command {
            Command::Volume => {
                let ch = &mut self.music.channels[c];
                ch.left = row.param1;
                ch.right = row.param2;
            }
            Command::Chord => {
                cmd.chord = ChordCommand {
                    tick: 0,
                    note1: row.param1 as i32,
                    note2: row.param2 as i32,
                };
            }
            Command::Jump => {
                self.music.jump = Jump {
                    active: true,
                    frame: row.param1 as i32,
                    beat: row.param2 as i32,
                };
            }
            Command::Vibrato => {
                cmd.vibrato = VibratoCommand {
                    tick: 0,
                    period: row.param1 as i32,
                    depth: row.param2 as i32,
                };
            }
            Command::Slide => cmd.slide.duration = row.param(),
            Command::Pitch => cmd.finepitch = row.param() - PITCH_DELTA,
            Command::Empty | Command::Delay => {}
        }
    }
}

impl Default for SoundState {
    fn default() -> Self {
        Self::new()
    }
}

fn note_freq(note: i32) -> i32 {
    NOTE_FREQS[note.clamp(0, NOTE_FREQS.len() as i32 - 1) as usize] as i32
}

fn write_sfx_pos(ram: &mut Ram, channel: usize, pos: &SfxPos) {
    let slot = &mut ram.region_mut(layout::SFX_POS)[channel * 4..channel * 4 + 4];
    for (b, &p) in slot.iter_mut().zip(pos) {
        *b = p as u8;
    }
}

/// Advance one channel by a tick and write its register.
fn step_channel(ram: &mut Ram, ch: &mut Channel, note: i32, pitch: i32, c: usize) {
    if ch.duration > 0 {
        ch.duration -= 1;
    }
    if ch.index < 0 || ch.duration == 0 {
        ch.reset_pos();
        return;
    }

    let sample = Sample::read(ram, ch.index as usize);
    ch.tick += 1;
    let pos = sfx_pos(ch.speed as i32, ch.tick);
    for (i, p) in ch.pos.iter_mut().enumerate() {
        *p = sample.loops[i].position(pos) as i8;
    }

    let tick = |loop_index: usize| &sample.ticks[ch.pos[loop_index] as usize];
    let volume = MAX_VOLUME - tick(LOOP_VOLUME).volume;
    if volume == 0 {
        return;
    }

    let direction = if sample.reverse { -1 } else { 1 };
    let note = note
        .saturating_add(tick(LOOP_CHORD).chord as i32 * direction)
        .clamp(0, NOTE_FREQS.len() as i32 - 1);
    let scale = if sample.pitch16x { 16 } else { 1 };
    let freq = NOTE_FREQS[note as usize] as i32 + tick(LOOP_PITCH).pitch as i32 * scale + pitch;

    let wave = tick(LOOP_WAVE).wave as usize;
    let mut waveform = [0u8; WAVEFORM_BYTES];
    waveform.copy_from_slice(
        &ram.region(layout::WAVEFORMS)[wave * WAVEFORM_BYTES..(wave + 1) * WAVEFORM_BYTES],
    );

    let reg =
        &mut ram.region_mut(layout::REGISTERS)[c * REGISTER_BYTES..(c + 1) * REGISTER_BYTES];
    let freq = freq as u16;
    reg[0] = freq as u8;
    reg[1] = ((freq >> 8) as u8 & 0x0F) | (volume << 4);
    reg[2..].copy_from_slice(&waveform);

    let stereo = ram.region_mut(layout::STEREO);
    bits::poke4(stereo, c * 2, ch.left * !sample.stereo_left as u8);
    bits::poke4(stereo, c * 2 + 1, ch.right * !sample.stereo_right as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Bits;

    /// Sample 0 at full volume on waveform 1, looping nothing.
    fn ram_with_sample() -> Ram {
        let mut ram = Ram::new();
        let wave = layout::WAVEFORMS.offset + WAVEFORM_BYTES;
        ram.region_mut(layout::WAVEFORMS)[WAVEFORM_BYTES..WAVEFORM_BYTES * 2].fill(0xF0);
        let sample = layout::SFX.offset;
        for t in 0..SFX_TICKS {
            ram.poke((sample + t * 2) as i64, 0x10, Bits::Eight);
        }
        assert_eq!(ram.peek(wave as i64, Bits::Eight), 0xF0);
        ram
    }

    #[test]
    fn test_sfx_pos() {
        assert_eq!(sfx_pos(0, 5), 5);
        assert_eq!(sfx_pos(2, 5), 15);
        assert_eq!(sfx_pos(-1, 5), 2);
        assert_eq!(sfx_pos(-4, 10), 2);
    }

    #[test]
    fn test_sfx_writes_register() {
        let mut ram = ram_with_sample();
        let mut sound = SoundState::new();
        assert!(sound.sfx(&mut ram, 0, 0, 4, -1, 2, (15, 7), 0));
        sound.tick_start(&mut ram);

        let c = 2 * REGISTER_BYTES;
        let reg = ram.region(layout::REGISTERS);
        let freq = ((reg[c + 1] as u16 & 0x0F) << 8) | reg[c] as u16;
        assert_eq!(freq, NOTE_FREQS[48]);
        assert_eq!(reg[c + 1] >> 4, MAX_VOLUME);
        assert_eq!(reg[c + 2], 0xF0);
        assert_eq!(bits::peek4(ram.region(layout::STEREO), 4), 15);
        assert_eq!(bits::peek4(ram.region(layout::STEREO), 5), 7);
        assert_eq!(sound.sfx_channel(2).tick, 0);
        assert_eq!(ram.region(layout::SFX_POS)[8..12], [0, 0, 0, 0]);
    }

    #[test]
    fn test_extreme_note_with_chord_clamps() {
        let mut ram = ram_with_sample();
        for t in 0..SFX_TICKS {
            ram.poke((layout::SFX.offset + t * 2 + 1) as i64, 0x03, Bits::Eight);
        }
        let mut sound = SoundState::new();
        assert!(sound.sfx(&mut ram, 0, i32::MAX, 0, -1, 0, (15, 15), 0));
        assert!(sound.sfx(&mut ram, 0, 0, i32::MAX, -1, 1, (15, 15), 0));
        sound.tick_start(&mut ram);

        let top = NOTE_FREQS[NOTE_FREQS.len() - 1] & 0x0FFF;
        let reg = ram.region(layout::REGISTERS);
        for c in 0..2 {
            let at = c * REGISTER_BYTES;
            let freq = ((reg[at + 1] as u16 & 0x0F) << 8) | reg[at] as u16;
            assert_eq!(freq, top);
        }
    }

    #[test]
    fn test_sfx_duration_expires() {
        let mut ram = ram_with_sample();
        let mut sound = SoundState::new();
        sound.sfx(&mut ram, 0, 0, 4, 2, 0, (15, 15), 0);
        sound.tick_start(&mut ram);
        assert_eq!(ram.region(layout::REGISTERS)[1] >> 4, MAX_VOLUME);
        sound.tick_start(&mut ram);
        assert_eq!(ram.region(layout::REGISTERS)[1], 0);
        assert_eq!(sound.sfx_channel(0).tick, -1);
        assert_eq!(sound.sfx_channel(0).pos, [-1; 4]);
    }

    #[test]
    fn test_sfx_invalid_channel() {
        let mut ram = Ram::new();
        let mut sound = SoundState::new();
        assert!(!sound.sfx(&mut ram, 0, 0, 0, -1, 4, (15, 15), 0));
        assert!(!sound.sfx(&mut ram, 64, 0, 0, -1, 0, (15, 15), 0));
        assert!(sound.sfx(&mut ram, -1, 0, 0, -1, 0, (15, 15), 0));
        assert!(!sound.sfx_channel(0).is_active());
    }

    #[test]
    fn test_sfx_speed_fallback() {
        let mut ram = Ram::new();
        ram.region_mut(layout::SFX)[60] = 0x20; // speed 2
        let mut sound = SoundState::new();
        sound.sfx(&mut ram, 0, 0, 0, -1, 0, (15, 15), 8);
        assert_eq!(sound.sfx_channel(0).speed, 2);
        sound.sfx(&mut ram, 0, 0, 0, -1, 0, (15, 15), -3);
        assert_eq!(sound.sfx_channel(0).speed, -3);
    }

    #[test]
    fn test_ring_buffer_keeps_gap() {
        let mut ring = SoundRing::new();
        for i in 0..20u32 {
            ring.push(RingEntry {
                stereo: i,
                ..Default::default()
            });
        }
        assert_eq!(ring.pending(), RING_LEN - 2);
        ring.advance();
        assert_eq!(ring.current().stereo, 0);
        ring.advance();
        assert_eq!(ring.current().stereo, 1);
    }

    #[test]
    fn test_ring_buffer_holds_last_when_empty() {
        let mut ring = SoundRing::new();
        ring.push(RingEntry {
            stereo: 7,
            ..Default::default()
        });
        ring.advance();
        ring.advance();
        assert_eq!(ring.current().stereo, 7);
        assert_eq!(ring.pending(), 0);
    }

    #[test]
    fn test_tick_end_queues_registers() {
        let mut ram = ram_with_sample();
        let mut sound = SoundState::new();
        sound.sfx(&mut ram, 0, 0, 4, -1, 0, (15, 15), 0);
        sound.tick_start(&mut ram);
        sound.tick_end(&ram);
        sound.ring.advance();
        assert_eq!(sound.ring.current().frequency(0), NOTE_FREQS[48]);
        assert_eq!(sound.ring.current().volume(0), MAX_VOLUME);
        assert_eq!(sound.ring.current().stereo_volume(0, 1), 15);
    }

    fn ram_with_song() -> Ram {
        let mut ram = ram_with_sample();
        // track 0, frame 0: channel 0 plays pattern 1
        ram.region_mut(layout::TRACKS)[0] = 1;
        // pattern 1 row 0: note C (4), octave 3, sfx 0
        let p = layout::PATTERNS.offset;
        ram.region_mut(layout::PATTERNS)[0..3].copy_from_slice(&[0x04, 0x00, 0x60]);
        assert_eq!(ram.peek(p as i64, Bits::Eight), 4);
        ram
    }

    #[test]
    fn test_music_plays_first_row() {
        let mut ram = ram_with_song();
        let mut sound = SoundState::new();
        sound.music(&mut ram, 0, 0, 0, true, false, -1, -1);
        sound.tick_start(&mut ram);

        let pos = MusicPosition::read(&ram);
        assert_eq!(pos.track, 0);
        assert_eq!(pos.row, 0);
        assert_eq!(pos.status, MusicStatus::Play);
        assert!(sound.music_channel(0).is_active());
        assert_eq!(sound.music_channel(0).note, 36);
        let reg = ram.region(layout::REGISTERS);
        assert_eq!(((reg[1] as u16 & 0x0F) << 8) | reg[0] as u16, NOTE_FREQS[36]);
    }

    #[test]
    fn test_music_stop() {
        let mut ram = ram_with_song();
        let mut sound = SoundState::new();
        sound.music(&mut ram, 0, 0, 0, false, false, -1, -1);
        sound.tick_start(&mut ram);
        sound.music(&mut ram, -1, 0, 0, false, false, -1, -1);
        let pos = MusicPosition::read(&ram);
        assert_eq!(pos.status, MusicStatus::Stop);
        assert_eq!(pos.track, -1);
        assert!(!sound.music_channel(0).is_active());
        sound.tick_start(&mut ram);
        assert!(ram.region(layout::REGISTERS).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_music_stops_after_empty_frame() {
        let mut ram = ram_with_song();
        // 1-row patterns so each frame lasts a single row
        ram.region_mut(layout::TRACKS)[49] = 63;
        let mut sound = SoundState::new();
        sound.music(&mut ram, 0, 0, 0, false, false, -1, -1);
        for _ in 0..20 {
            sound.tick_start(&mut ram);
        }
        assert_eq!(MusicPosition::read(&ram).status, MusicStatus::Stop);
    }

    #[test]
    fn test_tempo_row_conversion() {
        let music = Music::new();
        let track = Track::parse(&[0; TRACK_BYTES]);
        // default tempo 150 and speed 6: one row every 6 ticks
        assert_eq!(music.row_to_tick(&track, 1), 6);
        assert_eq!(music.tick_to_row(&track, 12), 2);
        assert_eq!(music.tick_to_row(&track, 11), 1);
    }

    #[test]
    fn test_music_position_flags() {
        let mut ram = Ram::new();
        let pos = MusicPosition {
            track: 3,
            frame: 2,
            row: -1,
            looped: true,
            status: MusicStatus::PlayFrame,
            sustain: true,
        };
        pos.write(&mut ram);
        assert_eq!(ram.region(layout::MUSIC_STATE)[3], 0b1011);
        assert_eq!(MusicPosition::read(&ram), pos);
    }
}
