//! Loaders fill voice buffers from an external source.
//!
//! Decoding sample files is somebody else's job; the engine only asks a
//! [`BufferLoader`] for the next buffer of a voice.

use std::f32::consts::TAU;
use std::sync::Arc;

use crate::note::Note;

/// Per-voice audio source.
pub trait BufferLoader: Send + Sync {
    /// Writes the next frames into `out`. Returns the frames written; `0`
    /// means the source is exhausted.
    fn fill(&mut self, note: Option<Note>, samplerate: u32, out: &mut [f32]) -> usize;

    /// Fresh loader for another voice, positioned at the start.
    fn boxed_clone(&self) -> Box<dyn BufferLoader>;
}

impl Clone for Box<dyn BufferLoader> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Sine oscillator at the note's frequency, or a fixed one without a note.
#[derive(Clone, Debug)]
pub struct SineLoader {
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl SineLoader {
    /// Oscillator at `frequency` Hz for voices without a note.
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
        }
    }
}

impl Default for SineLoader {
    fn default() -> Self {
        Self::new(440.0, 0.5)
    }
}

impl BufferLoader for SineLoader {
    fn fill(&mut self, note: Option<Note>, samplerate: u32, out: &mut [f32]) -> usize {
        let (frequency, gain) = note.map_or((self.frequency, 1.0), |n| (n.frequency(), n.gain()));
        let step = TAU * frequency / samplerate.max(1) as f32;
        let amplitude = self.amplitude * gain;
        for sample in out.iter_mut() {
            *sample = amplitude * self.phase.sin();
            self.phase += step;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
        out.len()
    }

    fn boxed_clone(&self) -> Box<dyn BufferLoader> {
        Box::new(Self {
            phase: 0.0,
            ..self.clone()
        })
    }
}

/// Plays a fixed sample once.
#[derive(Clone, Debug)]
pub struct SampleLoader {
    samples: Arc<[f32]>,
    position: usize,
}

impl SampleLoader {
    /// Loader over `samples`.
    pub fn new(samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
            position: 0,
        }
    }
}

impl BufferLoader for SampleLoader {
    fn fill(&mut self, _note: Option<Note>, _samplerate: u32, out: &mut [f32]) -> usize {
        let rest = &self.samples[self.position.min(self.samples.len())..];
        let n = rest.len().min(out.len());
        out[..n].copy_from_slice(&rest[..n]);
        out[n..].fill(0.0);
        self.position += n;
        n
    }

    fn boxed_clone(&self) -> Box<dyn BufferLoader> {
        Box::new(Self::new(Arc::clone(&self.samples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_follows_note() {
        let mut loader = SineLoader::default();
        let mut out = [0.0f32; 64];
        loader.fill(Some(Note::new(69, 127)), 44_100, &mut out);
        assert!(out.iter().all(|s| s.abs() <= 0.5 + 1e-6));
        assert!(out.iter().any(|&s| s > 0.1));
    }

    #[test]
    fn clone_restarts_phase() {
        let mut loader = SineLoader::default();
        let mut a = [0.0f32; 8];
        loader.fill(None, 44_100, &mut a);
        let mut fresh = loader.boxed_clone();
        let mut b = [0.0f32; 8];
        fresh.fill(None, 44_100, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn sample_loader_runs_out() {
        let mut loader = SampleLoader::new(vec![1.0, 2.0, 3.0]);
        let mut out = [9.0f32; 2];
        assert_eq!(loader.fill(None, 1, &mut out), 2);
        assert_eq!(out, [1.0, 2.0]);
        assert_eq!(loader.fill(None, 1, &mut out), 1);
        assert_eq!(out, [3.0, 0.0]);
        assert_eq!(loader.fill(None, 1, &mut out), 0);
    }
}
