//! Point-sampled synthesizer for the sound registers.
//!
//! Voices run on a fixed clock of `CLOCK_RATE` ticks per second. A waveform
//! voice steps through its 32 samples once per `period` clocks; a noise voice
//! shifts an LFSR instead. The output holds each voice's amplitude between
//! steps, with no band limiting.

use nibble_core::bits;
use nibble_core::types::AudioSample;

use super::{is_noise, RingEntry, SoundRing, CHANNELS, MAX_VOLUME};
use crate::memory::FRAMERATE;

/// Synth clock in ticks per second.
pub const CLOCK_RATE: i64 = 255 << 13;
/// Clock ticks in one frame.
const FRAME_CLOCKS: i64 = CLOCK_RATE / FRAMERATE as i64;
const WAVE_VALUES: i64 = 32;
const MIN_PERIOD: i64 = 10;
const MAX_PERIOD: i64 = 4096;

fn period(freq: i64) -> i64 {
    if freq == 0 {
        return MAX_PERIOD;
    }
    (CLOCK_RATE * 2 / WAVE_VALUES / freq - 1).clamp(MIN_PERIOD, MAX_PERIOD)
}

fn amplitude(volume: u8, amp: i32) -> i32 {
    amp * volume as i32 / MAX_VOLUME as i32 / (CHANNELS as i32 + 1)
}

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    /// Clock of the next step, relative to the frame start.
    time: i64,
    /// Waveform position, or the LFSR state for noise.
    phase: u32,
    amp: i32,
}

impl Voice {
    fn step(&mut self, reg: &RingEntry, channel: usize, stereo: u8) -> i64 {
        let volume = reg.volume(channel);
        let waveform = reg.waveform(channel);
        if is_noise(waveform) {
            if self.phase == 0 {
                self.phase = 1;
            }
            let feedback = if waveform[0] != 0 { 0x14 } else { 0x12000 };
            let on = self.phase & 1 != 0;
            self.amp = amplitude(
                volume,
                if on {
                    stereo as i32 * i16::MAX as i32 / MAX_VOLUME as i32
                } else {
                    0
                },
            );
            self.phase = ((self.phase & 1) * feedback) ^ (self.phase >> 1);
            period(reg.frequency(channel) as i64)
        } else {
            self.phase %= WAVE_VALUES as u32;
            let value = bits::peek4(waveform, self.phase as usize) as i32;
            self.amp = amplitude(
                volume,
                value * i16::MAX as i32 / MAX_VOLUME as i32 * stereo as i32 / MAX_VOLUME as i32,
            );
            self.phase = (self.phase + 1) % WAVE_VALUES as u32;
            period(reg.frequency(channel) as i64 * 2)
        }
    }
}

/// Renders one frame of interleaved stereo samples per call.
pub struct Synth {
    sample_rate: u32,
    voices: [[Voice; CHANNELS]; 2],
    buffer: Vec<AudioSample>,
}

impl Synth {
    pub fn new(sample_rate: u32) -> Self {
        let frames = (sample_rate / FRAMERATE) as usize;
        Self {
            sample_rate,
            voices: [[Voice::default(); CHANNELS]; 2],
            buffer: vec![0; frames * 2],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples rendered by the last call to [`Synth::render`].
    pub fn samples(&self) -> &[AudioSample] {
        &self.buffer
    }

    /// Synthesize the registers behind the ring tail, then move the tail on if
    /// the ring has newer frames.
    pub fn render(&mut self, ring: &mut SoundRing) -> &[AudioSample] {
        let frames = self.buffer.len() / 2;
        let entry = ring.current().clone();

        for (side, voices) in self.voices.iter_mut().enumerate() {
            for s in 0..frames {
                let t = s as i64 * FRAME_CLOCKS / frames as i64;
                let mut mix = 0i32;
                for (c, voice) in voices.iter_mut().enumerate() {
                    let stereo = entry.stereo_volume(c, side);
                    while voice.time <= t {
                        voice.time += voice.step(&entry, c, stereo);
                    }
                    mix += voice.amp;
                }
                self.buffer[s * 2 + side] =
                    mix.clamp(i16::MIN as i32, i16::MAX as i32) as AudioSample;
            }
            for (c, voice) in voices.iter_mut().enumerate() {
                let stereo = entry.stereo_volume(c, side);
                while voice.time < FRAME_CLOCKS {
                    voice.time += voice.step(&entry, c, stereo);
                }
                voice.time -= FRAME_CLOCKS;
            }
        }

        ring.advance();
        &self.buffer
    }
}
