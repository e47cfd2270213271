//! Runtime settings shared by the graph, the staging protocol and the loop.
//!
//! The file-backed configuration lives in `ags-config`; it converts into
//! [`EngineSettings`] so this crate stays free of serialization concerns.

use std::time::Duration;

use crate::sound::SampleFormat;

/// How many resolve passes a [`RecallId`](crate::RecallId) gets before the
/// remaining unresolved recalls are declared wiring errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResolvePasses {
    /// One full pass per recall registered for the recall id.
    #[default]
    PerRecall,
    /// A fixed pass count (values below one are treated as one).
    Fixed(u32),
}

impl ResolvePasses {
    /// Pass bound for a recall id with `registered` recalls.
    pub fn bound(self, registered: usize) -> usize {
        match self {
            ResolvePasses::PerRecall => registered.max(1),
            ResolvePasses::Fixed(n) => (n as usize).max(1),
        }
    }
}

/// Engine-wide runtime settings.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Sample rate in Hz.
    pub samplerate: u32,
    /// Frames per tick.
    pub buffer_size: usize,
    /// Soundcard sample format.
    pub format: SampleFormat,
    /// Soundcard channel count.
    pub audio_channels: usize,
    /// Give every output channel a dedicated thread per scope.
    pub super_threaded: bool,
    /// Resolve retry policy.
    pub resolve_passes: ResolvePasses,
    /// Fraction of the tick period a leaf recall may spend in one run call.
    pub realtime_budget: f32,
    /// Ticks a worker reply may be outstanding before it is reported.
    pub worker_timeout_ticks: u64,
    /// Buffers an audio signal keeps behind its stream position.
    pub stream_retain: usize,
    /// Capacity of the runtime fault log.
    pub fault_capacity: usize,
    /// Initial tempo in beats per minute.
    pub bpm: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            samplerate: 44_100,
            buffer_size: 512,
            format: SampleFormat::F32,
            audio_channels: 2,
            super_threaded: false,
            resolve_passes: ResolvePasses::PerRecall,
            realtime_budget: 0.8,
            worker_timeout_ticks: 4,
            stream_retain: 16,
            fault_capacity: 256,
            bpm: 120.0,
        }
    }
}

impl EngineSettings {
    /// Duration of one tick.
    pub fn tick_period(&self) -> Duration {
        let nanos = self.buffer_size as u64 * 1_000_000_000 / u64::from(self.samplerate.max(1));
        Duration::from_nanos(nanos)
    }

    /// Time a leaf recall may spend in a single run call.
    pub fn leaf_budget(&self) -> Duration {
        let nanos = self.tick_period().as_nanos() as f64 * f64::from(self.realtime_budget.max(0.0));
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Tick frequency in Hz.
    pub fn frequency(&self) -> f64 {
        f64::from(self.samplerate) / self.buffer_size.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_recall_bound_has_floor_of_one() {
        assert_eq!(ResolvePasses::PerRecall.bound(0), 1);
        assert_eq!(ResolvePasses::PerRecall.bound(5), 5);
    }

    #[test]
    fn fixed_bound_ignores_recall_count() {
        assert_eq!(ResolvePasses::Fixed(3).bound(10), 3);
        assert_eq!(ResolvePasses::Fixed(0).bound(10), 1);
    }

    #[test]
    fn tick_period_matches_buffer() {
        let settings = EngineSettings {
            samplerate: 48_000,
            buffer_size: 480,
            ..EngineSettings::default()
        };
        assert_eq!(settings.tick_period(), Duration::from_millis(10));
        assert!((settings.frequency() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn leaf_budget_is_fraction_of_period() {
        let settings = EngineSettings {
            samplerate: 48_000,
            buffer_size: 480,
            realtime_budget: 0.5,
            ..EngineSettings::default()
        };
        assert_eq!(settings.leaf_budget(), Duration::from_millis(5));
    }
}
