//! The soundcard boundary: hardware clock and frame sink.
//!
//! The engine never talks to a device directly. Once per tick it hands the
//! interleaved output bus to a [`Soundcard`]; a real implementation blocks
//! in [`present`](Soundcard::present) until the device wants the next
//! buffer, which is what paces the audio loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::engine::OutputBus;
use crate::settings::EngineSettings;
use crate::sound::SampleFormat;

/// Stream parameters a soundcard runs at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Presentation {
    /// Sample rate in Hz.
    pub samplerate: u32,
    /// Frames per buffer.
    pub buffer_size: usize,
    /// Sample format on the device side.
    pub format: SampleFormat,
    /// Interleaved channel count.
    pub audio_channels: usize,
}

impl Presentation {
    /// Parameters taken from engine settings.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            samplerate: settings.samplerate,
            buffer_size: settings.buffer_size,
            format: settings.format,
            audio_channels: settings.audio_channels,
        }
    }

    /// Samples in one interleaved buffer.
    pub fn samples(&self) -> usize {
        self.buffer_size * self.audio_channels
    }

    /// Wall-clock length of one buffer.
    pub fn period(&self) -> Duration {
        let nanos = self.buffer_size as u64 * 1_000_000_000 / u64::from(self.samplerate.max(1));
        Duration::from_nanos(nanos)
    }
}

/// Soundcard failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoundcardError {
    /// The device went away or never opened.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// A buffer of the wrong length was presented.
    #[error("expected {expected} samples per buffer, got {got}")]
    SizeMismatch {
        /// Samples the device expects.
        expected: usize,
        /// Samples presented.
        got: usize,
    },
}

/// Device providing the tick clock.
pub trait Soundcard: Send {
    /// Stream parameters.
    fn presentation(&self) -> Presentation;

    /// Delivers one interleaved buffer. May block until the device is ready
    /// for it.
    fn present(&mut self, frames: &[f32]) -> Result<(), SoundcardError>;
}

/// Copies `bus` into `scratch` and presents it.
pub fn present_bus(
    bus: &OutputBus,
    card: &mut dyn Soundcard,
    scratch: &mut Vec<f32>,
) -> Result<(), SoundcardError> {
    let samples = card.presentation().samples();
    scratch.resize(samples, 0.0);
    scratch.fill(0.0);
    bus.copy_interleaved(scratch);
    card.present(scratch)
}

/// Soundcard that keeps what it is given, optionally paced in real time.
#[derive(Debug)]
pub struct InMemorySoundcard {
    presentation: Presentation,
    recorded: Vec<f32>,
    record: bool,
    paced: bool,
    next_deadline: Option<Instant>,
    buffers: u64,
}

impl InMemorySoundcard {
    /// Recording, unpaced soundcard.
    pub fn new(presentation: Presentation) -> Self {
        Self {
            presentation,
            recorded: Vec::new(),
            record: true,
            paced: false,
            next_deadline: None,
            buffers: 0,
        }
    }

    /// Sleeps in `present` so buffers go out at the device rate.
    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }

    /// Counts buffers without keeping them.
    pub fn discarding(mut self) -> Self {
        self.record = false;
        self
    }

    /// Every sample presented so far, interleaved.
    pub fn recorded(&self) -> &[f32] {
        &self.recorded
    }

    /// Takes the recorded samples.
    pub fn take_recorded(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.recorded)
    }

    /// Buffers presented so far.
    pub fn buffers(&self) -> u64 {
        self.buffers
    }

    /// Samples of one channel, de-interleaved.
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        let stride = self.presentation.audio_channels.max(1);
        self.recorded
            .iter()
            .skip(channel)
            .step_by(stride)
            .copied()
            .collect()
    }
}

impl Soundcard for InMemorySoundcard {
    fn presentation(&self) -> Presentation {
        self.presentation
    }

    fn present(&mut self, frames: &[f32]) -> Result<(), SoundcardError> {
        let expected = self.presentation.samples();
        if frames.len() != expected {
            return Err(SoundcardError::SizeMismatch {
                expected,
                got: frames.len(),
            });
        }
        if self.paced {
            let now = Instant::now();
            let deadline = self.next_deadline.unwrap_or(now);
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
            self.next_deadline = Some(deadline.max(now) + self.presentation.period());
        }
        if self.record {
            self.recorded.extend_from_slice(frames);
        }
        self.buffers += 1;
        Ok(())
    }
}

/// A soundcard shared with its owner, who can inspect it while the engine
/// presents to it.
impl<S: Soundcard> Soundcard for Arc<Mutex<S>> {
    fn presentation(&self) -> Presentation {
        self.lock().presentation()
    }

    fn present(&mut self, frames: &[f32]) -> Result<(), SoundcardError> {
        self.lock().present(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presentation() -> Presentation {
        Presentation {
            samplerate: 48_000,
            buffer_size: 4,
            format: SampleFormat::F32,
            audio_channels: 2,
        }
    }

    #[test]
    fn rejects_short_buffer() {
        let mut card = InMemorySoundcard::new(presentation());
        let err = card.present(&[0.0; 3]).unwrap_err();
        assert_eq!(err, SoundcardError::SizeMismatch { expected: 8, got: 3 });
    }

    #[test]
    fn presents_bus_interleaved() {
        let bus = OutputBus::new(2, 4);
        bus.mix(1, &[1.0, 1.0, 1.0, 1.0]);
        let mut card = InMemorySoundcard::new(presentation());
        let mut scratch = Vec::new();
        present_bus(&bus, &mut card, &mut scratch).unwrap();
        assert_eq!(card.buffers(), 1);
        assert_eq!(card.channel(0), vec![0.0; 4]);
        assert_eq!(card.channel(1), vec![1.0; 4]);
    }

    #[test]
    fn discarding_card_only_counts() {
        let mut card = InMemorySoundcard::new(presentation()).discarding();
        card.present(&[0.5; 8]).unwrap();
        assert!(card.recorded().is_empty());
        assert_eq!(card.buffers(), 1);
    }

    #[test]
    fn period_follows_rate() {
        assert_eq!(
            Presentation {
                buffer_size: 480,
                ..presentation()
            }
            .period(),
            Duration::from_millis(10)
        );
    }
}
