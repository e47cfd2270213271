//! The main audio loop.
//!
//! One cycle is one tick:
//!
//! 1. **Reset** - silence the output bus.
//! 2. **Run** - every top-level recall id through pre, inter and post. The
//!    notation driver pulls the note feed here, in its pre stage.
//!    A super-threaded channel's scopes run on their own threads while the
//!    loop runs the rest.
//! 3. **Present** - hand the bus to the soundcard, which paces the loop.
//!
//! The graph's read lock is held through step 2 only, so the task launcher
//! gets the graph while the soundcard blocks.

use std::collections::HashSet;
use std::sync::Arc;

use ags_core::soundcard::present_bus;
use ags_core::{AudioGraph, ChannelId, EngineContext, Soundcard, SoundScope, TickSummary};
use parking_lot::{Mutex, RwLock};

use crate::channel_thread::ChannelThread;
use crate::error::Result;
use crate::tree::StopToken;

/// Shared soundcard slot.
pub type SharedSoundcard = Arc<Mutex<Box<dyn Soundcard>>>;

/// Drives ticks and presents their output.
pub struct AudioLoop {
    graph: Arc<RwLock<AudioGraph>>,
    engine: Arc<EngineContext>,
    soundcard: SharedSoundcard,
    channels: Vec<ChannelThread>,
    scratch: Vec<f32>,
    totals: Arc<Mutex<TickSummary>>,
}

impl AudioLoop {
    /// Loop over `graph`, presenting to `soundcard`.
    pub fn new(
        graph: Arc<RwLock<AudioGraph>>,
        engine: Arc<EngineContext>,
        soundcard: SharedSoundcard,
        totals: Arc<Mutex<TickSummary>>,
    ) -> Self {
        Self {
            graph,
            engine,
            soundcard,
            channels: Vec::new(),
            scratch: Vec::new(),
            totals,
        }
    }

    /// Hands one scope of a channel to a channel thread.
    pub fn add_channel_thread(&mut self, channel: ChannelThread) {
        self.channels.push(channel);
    }

    /// Channel and scope pairs served by their own thread.
    pub fn threaded_channels(&self) -> impl Iterator<Item = (ChannelId, SoundScope)> + '_ {
        self.channels.iter().map(|c| (c.channel(), c.scope()))
    }

    /// Runs one tick and presents it.
    pub fn cycle(&mut self, stop: &StopToken) -> Result<TickSummary> {
        let summary = {
            let graph = self.graph.read();
            self.engine.bus().clear();

            let started: Vec<&ChannelThread> =
                self.channels.iter().filter(|c| c.begin()).collect();
            let threaded: HashSet<(ChannelId, SoundScope)> =
                started.iter().map(|c| (c.channel(), c.scope())).collect();

            let mut summary = TickSummary::default();
            let order = graph.processing_order();
            for scope in SoundScope::ALL {
                for &channel in order.iter().filter(|&&c| !threaded.contains(&(c, scope))) {
                    summary += graph.run_channel(&self.engine, channel, scope);
                }
            }
            for channel in started {
                summary += channel.finish(stop).unwrap_or_default();
            }
            self.engine.clock().advance();
            summary
        };

        {
            let mut card = self.soundcard.lock();
            present_bus(self.engine.bus(), &mut **card, &mut self.scratch)?;
        }
        *self.totals.lock() += summary;
        if summary.cancelled > 0 || summary.finished > 0 {
            tracing::trace!(
                "loop: tick {} cancelled {} finished {}",
                self.engine.clock().tick(),
                summary.cancelled,
                summary.finished
            );
        }
        Ok(summary)
    }

    /// Thread body: cycles until `stop` is raised or the soundcard fails.
    pub fn run_until(mut self, stop: &StopToken) {
        tracing::info!(
            "loop: started at {:.1} Hz, {} channel thread(s)",
            self.engine.settings().frequency(),
            self.channels.len()
        );
        while !stop.is_stopped() {
            if let Err(e) = self.cycle(stop) {
                tracing::error!("loop: {e}, stopping");
                break;
            }
        }
        tracing::info!("loop: stopped after {} tick(s)", self.engine.clock().tick());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ags_core::loader::SampleLoader;
    use ags_core::recall::builtin::playback_chain;
    use ags_core::{
        AudioSpec, EngineSettings, InMemorySoundcard, Presentation, ScopeSet, StartRequest,
    };

    fn settings() -> EngineSettings {
        EngineSettings {
            buffer_size: 32,
            realtime_budget: 100.0,
            ..EngineSettings::default()
        }
    }

    #[test]
    fn cycle_ticks_then_presents() {
        let (engine, _queue) = EngineContext::new(settings());
        let engine = Arc::new(engine);
        let mut graph = AudioGraph::new(settings());
        let audio = graph.add_audio(AudioSpec::new("a").with_audio_channels(2));
        for spec in playback_chain(SampleLoader::new(vec![0.25; 64]), Some(64), ScopeSet::ALL) {
            graph.add_container(audio, spec).unwrap();
        }
        let right = graph.audio(audio).unwrap().outputs()[1];
        graph
            .start_channel(&engine, StartRequest::new(right, SoundScope::Playback))
            .unwrap();

        let card = Arc::new(Mutex::new(InMemorySoundcard::new(Presentation::from_settings(
            &settings(),
        ))));
        let boxed: Box<dyn Soundcard> = Box::new(Arc::clone(&card));
        let shared: SharedSoundcard = Arc::new(Mutex::new(boxed));
        let totals = Arc::new(Mutex::new(TickSummary::default()));
        let mut audio_loop = AudioLoop::new(
            Arc::new(RwLock::new(graph)),
            Arc::clone(&engine),
            shared,
            Arc::clone(&totals),
        );

        let stop = StopToken::new();
        assert_eq!(audio_loop.cycle(&stop).unwrap().recall_ids, 1);
        audio_loop.cycle(&stop).unwrap();
        assert_eq!(engine.clock().tick(), 2);
        assert_eq!(totals.lock().finished, 1);

        let card = card.lock();
        assert_eq!(card.buffers(), 2);
        assert!(card.channel(1).iter().all(|&s| s == 0.25));
        assert!(card.channel(0).iter().all(|&s| s == 0.0));
    }
}
