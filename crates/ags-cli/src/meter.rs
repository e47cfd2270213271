//! Level metering soundcard.

use ags_core::{Presentation, Soundcard, SoundcardError};

/// Wraps a soundcard and keeps peak and RMS per channel of everything
/// presented to it.
#[derive(Debug)]
pub struct MeterCard<S> {
    inner: S,
    peak: Vec<f32>,
    sum_squares: Vec<f64>,
    frames: u64,
}

impl<S: Soundcard> MeterCard<S> {
    pub fn new(inner: S) -> Self {
        let channels = inner.presentation().audio_channels;
        Self {
            inner,
            peak: vec![0.0; channels],
            sum_squares: vec![0.0; channels],
            frames: 0,
        }
    }

    /// Frames metered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.peak.len()
    }

    /// Largest absolute sample seen on `channel`.
    pub fn peak(&self, channel: usize) -> f32 {
        self.peak.get(channel).copied().unwrap_or(0.0)
    }

    /// Root mean square of `channel` over every frame.
    pub fn rms(&self, channel: usize) -> f32 {
        if self.frames == 0 {
            return 0.0;
        }
        let sum = self.sum_squares.get(channel).copied().unwrap_or(0.0);
        (sum / self.frames as f64).sqrt() as f32
    }

    /// One line per channel: peak, peak in dBFS and RMS.
    pub fn report(&self) -> Vec<String> {
        (0..self.channels())
            .map(|ch| {
                let peak = self.peak(ch);
                let db = if peak > 0.0 {
                    format!("{:.1} dBFS", 20.0 * peak.log10())
                } else {
                    "-inf dBFS".to_string()
                };
                format!("  channel {ch}: peak {peak:.3} ({db}), rms {:.3}", self.rms(ch))
            })
            .collect()
    }
}

impl<S: Soundcard> Soundcard for MeterCard<S> {
    fn presentation(&self) -> Presentation {
        self.inner.presentation()
    }

    fn present(&mut self, frames: &[f32]) -> Result<(), SoundcardError> {
        self.inner.present(frames)?;
        let channels = self.peak.len().max(1);
        for (i, &sample) in frames.iter().enumerate() {
            let ch = i % channels;
            self.peak[ch] = self.peak[ch].max(sample.abs());
            self.sum_squares[ch] += f64::from(sample) * f64::from(sample);
        }
        self.frames += (frames.len() / channels) as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ags_core::{EngineSettings, InMemorySoundcard};

    fn card() -> MeterCard<InMemorySoundcard> {
        let settings = EngineSettings {
            buffer_size: 4,
            ..EngineSettings::default()
        };
        MeterCard::new(InMemorySoundcard::new(Presentation::from_settings(&settings)).discarding())
    }

    #[test]
    fn meters_each_channel() {
        let mut card = card();
        card.present(&[0.5, 0.0, -0.5, 0.0, 0.5, 0.0, -0.5, 0.0]).unwrap();
        assert_eq!(card.frames(), 4);
        assert_eq!(card.peak(0), 0.5);
        assert_eq!(card.peak(1), 0.0);
        assert!((card.rms(0) - 0.5).abs() < 1e-6);
        assert_eq!(card.rms(1), 0.0);

        let report = card.report();
        assert_eq!(report.len(), 2);
        assert!(report[0].contains("-6.0 dBFS"), "got: {}", report[0]);
        assert!(report[1].contains("-inf dBFS"), "got: {}", report[1]);
    }

    #[test]
    fn rejected_buffers_are_not_metered() {
        let mut card = card();
        assert!(card.present(&[1.0; 3]).is_err());
        assert_eq!(card.frames(), 0);
        assert_eq!(card.peak(0), 0.0);
    }
}
