//! The demo instrument driven by `run` and `render`.
//!
//! One audio with an output line per soundcard channel. Every line gets a
//! notation recall with its own note feed, so a note sent to the
//! instrument sounds on all lines. Voices are sine oscillators at the
//! note's pitch.

use std::sync::Arc;

use ags_core::loader::SineLoader;
use ags_core::recall::builtin::{NotationRecall, playback_chain};
use ags_core::tasks::{AddAudio, AddRecallContainer};
use ags_core::{
    AudioId, AudioSpec, ChannelId, ChannelNoteFeed, ContainerSpec, NoteEvent, ScopeSet,
    SoundScope, StartRequest, TaskReport,
};
use ags_thread::Engine;
use anyhow::{Context, bail};
use crossbeam_channel::Sender;

/// Oscillator level for voices without a note.
const DRONE_AMPLITUDE: f32 = 0.25;

/// Scopes a voice can play in. The sequencer scope belongs to the
/// notation run alone.
const VOICE_SCOPES: ScopeSet = ScopeSet::of(SoundScope::Playback).with(SoundScope::Notation);

pub struct Instrument {
    audio: AudioId,
    outputs: Vec<ChannelId>,
    feeds: Vec<Sender<NoteEvent>>,
}

impl Instrument {
    /// Adds the instrument to `engine`'s graph.
    pub fn build(engine: &Engine) -> anyhow::Result<Self> {
        let lines = engine.settings().audio_channels;
        let report = engine
            .submit_wait(AddAudio::new(AudioSpec::new("demo").with_audio_channels(lines)))
            .context("adding the instrument audio")?;
        let TaskReport::Audio(audio) = report else {
            bail!("add-audio answered {report:?}");
        };

        let mut feeds = Vec::with_capacity(lines);
        for line in 0..lines {
            let feed = Arc::new(ChannelNoteFeed::new());
            feeds.push(feed.sender());
            let spec = ContainerSpec::new(format!("notation-{line}"))
                .with_audio_run(NotationRecall::new(feed).with_line(line).into_prototype());
            engine
                .submit_wait(AddRecallContainer { audio, spec })
                .with_context(|| format!("adding the notation recall for line {line}"))?;
        }
        let voice = SineLoader::new(220.0, DRONE_AMPLITUDE);
        for spec in playback_chain(voice, None, VOICE_SCOPES) {
            engine
                .submit_wait(AddRecallContainer { audio, spec })
                .context("adding the voice chain")?;
        }

        let outputs = engine.read(|g| g.audio(audio).map(|a| a.outputs().to_vec()));
        let outputs = outputs.context("instrument audio vanished")?;
        tracing::debug!("instrument: {audio} with {} output(s)", outputs.len());
        Ok(Self {
            audio,
            outputs,
            feeds,
        })
    }

    pub fn audio(&self) -> AudioId {
        self.audio
    }

    pub fn outputs(&self) -> &[ChannelId] {
        &self.outputs
    }

    /// Starts the notation run that turns feed events into voices.
    pub fn start_sequencer(&self, engine: &Engine) -> anyhow::Result<()> {
        let first = *self.outputs.first().context("instrument has no outputs")?;
        let report = engine.play(StartRequest::new(first, SoundScope::Sequencer))?;
        for error in &report.wiring {
            tracing::warn!("instrument: {error}");
        }
        Ok(())
    }

    /// Starts a drone voice on every output.
    pub fn drone(&self, engine: &Engine) -> anyhow::Result<()> {
        for &out in &self.outputs {
            engine.play(StartRequest::new(out, SoundScope::Playback))?;
        }
        Ok(())
    }

    /// Sends `event` to every line.
    pub fn send(&self, event: NoteEvent) -> anyhow::Result<()> {
        for tx in &self.feeds {
            tx.send(event).context("note feed closed")?;
        }
        Ok(())
    }
}

