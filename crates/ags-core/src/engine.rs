//! Engine-wide services, constructed once and passed down explicitly.
//!
//! [`EngineContext`] replaces process-wide singletons: tasks, staging calls
//! and recalls receive it by reference. It holds the settings, the task
//! queue sender, the fault log, the worker scheduler, the tick clock and the
//! output bus presented to the soundcard.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::fault::FaultLog;
use crate::settings::EngineSettings;
use crate::task::{TaskReceiver, TaskSender, task_queue};
use crate::worker::{InlineScheduler, WorkScheduler};

/// Tick counter and tempo.
#[derive(Debug)]
pub struct Clock {
    tick: AtomicU64,
    bpm: AtomicU64,
}

impl Clock {
    fn new(bpm: f64) -> Self {
        Self {
            tick: AtomicU64::new(0),
            bpm: AtomicU64::new(bpm.to_bits()),
        }
    }

    /// Ticks completed.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Counts one more tick and returns the new count.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm.load(Ordering::Relaxed))
    }

    /// Sets the tempo. Non-positive or non-finite values are ignored.
    pub fn set_bpm(&self, bpm: f64) -> bool {
        if !bpm.is_finite() || bpm <= 0.0 {
            return false;
        }
        self.bpm.store(bpm.to_bits(), Ordering::Relaxed);
        true
    }
}

/// Planar mix bus, one lane per soundcard channel.
#[derive(Debug)]
pub struct OutputBus {
    channels: usize,
    frames: usize,
    samples: Mutex<Vec<f32>>,
}

impl OutputBus {
    /// Creates a silent bus.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels,
            frames,
            samples: Mutex::new(vec![0.0; channels * frames]),
        }
    }

    /// Soundcard channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per tick.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Adds `input` into lane `channel` (wrapped to the channel count).
    pub fn mix(&self, channel: usize, input: &[f32]) {
        if self.channels == 0 {
            return;
        }
        let lane = channel % self.channels;
        let mut samples = self.samples.lock();
        let dst = &mut samples[lane * self.frames..(lane + 1) * self.frames];
        for (d, s) in dst.iter_mut().zip(input) {
            *d += s;
        }
    }

    /// Silences the bus.
    pub fn clear(&self) {
        self.samples.lock().fill(0.0);
    }

    /// Writes the bus interleaved into `out`. Returns the frames written.
    pub fn copy_interleaved(&self, out: &mut [f32]) -> usize {
        if self.channels == 0 {
            return 0;
        }
        let samples = self.samples.lock();
        let frames = (out.len() / self.channels).min(self.frames);
        for frame in 0..frames {
            for lane in 0..self.channels {
                out[frame * self.channels + lane] = samples[lane * self.frames + frame];
            }
        }
        frames
    }

    /// Copy of lane `channel`.
    pub fn lane(&self, channel: usize) -> Vec<f32> {
        if channel >= self.channels {
            return Vec::new();
        }
        self.samples.lock()[channel * self.frames..(channel + 1) * self.frames].to_vec()
    }
}

/// Services shared by tasks, staging and recalls.
pub struct EngineContext {
    settings: EngineSettings,
    leaf_budget: Duration,
    tasks: TaskSender,
    faults: FaultLog,
    worker: Arc<dyn WorkScheduler>,
    clock: Clock,
    bus: OutputBus,
}

impl EngineContext {
    /// Builds the context and the receiving end of its task queue.
    ///
    /// Blocking work runs inline until a worker is installed with
    /// [`with_worker`](Self::with_worker).
    pub fn new(settings: EngineSettings) -> (Self, TaskReceiver) {
        let (tasks, receiver) = task_queue();
        let context = Self {
            leaf_budget: settings.leaf_budget(),
            faults: FaultLog::new(settings.fault_capacity),
            worker: Arc::new(InlineScheduler),
            clock: Clock::new(settings.bpm),
            bus: OutputBus::new(settings.audio_channels, settings.buffer_size),
            tasks,
            settings,
        };
        (context, receiver)
    }

    /// Replaces the work scheduler.
    pub fn with_worker(mut self, worker: Arc<dyn WorkScheduler>) -> Self {
        self.worker = worker;
        self
    }

    /// Settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Time a leaf recall may spend in one run call.
    pub fn leaf_budget(&self) -> Duration {
        self.leaf_budget
    }

    /// Task queue sender.
    pub fn tasks(&self) -> &TaskSender {
        &self.tasks
    }

    /// Fault log.
    pub fn faults(&self) -> &FaultLog {
        &self.faults
    }

    /// Scheduler for blocking work.
    pub fn worker(&self) -> &dyn WorkScheduler {
        self.worker.as_ref()
    }

    /// Tick clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Output bus.
    pub fn bus(&self) -> &OutputBus {
        &self.bus
    }
}

impl core::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineContext")
            .field("settings", &self.settings)
            .field("tick", &self.clock.tick())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_interleaves_lanes() {
        let bus = OutputBus::new(2, 3);
        bus.mix(0, &[1.0, 2.0, 3.0]);
        bus.mix(1, &[-1.0, -2.0, -3.0]);
        bus.mix(2, &[1.0, 1.0, 1.0]);
        let mut out = [0.0; 6];
        assert_eq!(bus.copy_interleaved(&mut out), 3);
        assert_eq!(out, [2.0, -1.0, 3.0, -2.0, 4.0, -3.0]);
        bus.clear();
        assert!(bus.lane(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn clock_rejects_bad_tempo() {
        let clock = Clock::new(120.0);
        assert!(!clock.set_bpm(0.0));
        assert!(!clock.set_bpm(f64::NAN));
        assert!(clock.set_bpm(90.0));
        assert_eq!(clock.bpm(), 90.0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.tick(), 1);
    }

    #[test]
    fn context_derives_budget_from_settings() {
        let settings = EngineSettings::default();
        let budget = settings.leaf_budget();
        let (engine, _rx) = EngineContext::new(settings);
        assert_eq!(engine.leaf_budget(), budget);
        assert_eq!(engine.bus().channels(), 2);
        assert_eq!(engine.bus().frames(), 512);
    }
}
