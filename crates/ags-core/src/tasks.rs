//! The structural tasks the engine understands.
//!
//! Each task is a plain value describing one mutation. Submitters never
//! touch the graph themselves; they queue one of these and, if they care,
//! wait on the returned [`TaskHandle`](crate::task::TaskHandle) for the
//! [`TaskReport`] or the error.

use crate::engine::EngineContext;
use crate::error::{EngineError, StagingError};
use crate::graph::{AudioGraph, AudioSpec};
use crate::ids::{AudioId, ChannelId, ContainerId, ContextId, RecallIdKey};
use crate::note::Note;
use crate::recall::{ContainerSpec, StartRequest};
use crate::sound::{Direction, SoundScope};
use crate::task::{Task, TaskReport};

/// Adds an audio.
#[derive(Debug)]
pub struct AddAudio {
    spec: AudioSpec,
}

impl AddAudio {
    /// Task creating an audio from `spec`.
    pub fn new(spec: AudioSpec) -> Self {
        Self { spec }
    }
}

impl Task for AddAudio {
    fn name(&self) -> &'static str {
        "add-audio"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        Ok(TaskReport::Audio(graph.add_audio(self.spec)))
    }
}

/// Removes an idle audio with its channels and containers.
#[derive(Debug)]
pub struct RemoveAudio(pub AudioId);

impl Task for RemoveAudio {
    fn name(&self) -> &'static str {
        "remove-audio"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        graph.remove_audio(self.0)?;
        Ok(TaskReport::Done)
    }
}

/// Changes the number of lines per pad.
#[derive(Debug)]
pub struct ResizeAudioChannels {
    /// Audio to resize.
    pub audio: AudioId,
    /// New line count.
    pub audio_channels: usize,
}

impl Task for ResizeAudioChannels {
    fn name(&self) -> &'static str {
        "resize-audio-channels"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        let report = graph.set_audio_channels(self.audio, self.audio_channels)?;
        Ok(TaskReport::Resized(report))
    }
}

/// Changes the pad count of one direction.
#[derive(Debug)]
pub struct ResizePads {
    /// Audio to resize.
    pub audio: AudioId,
    /// Which side.
    pub direction: Direction,
    /// New pad count.
    pub pads: usize,
}

impl Task for ResizePads {
    fn name(&self) -> &'static str {
        "resize-pads"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        let report = graph.set_pads(self.audio, self.direction, self.pads)?;
        Ok(TaskReport::Resized(report))
    }
}

/// Links an output of one audio to an input of another.
#[derive(Debug)]
pub struct LinkChannel {
    /// One side.
    pub a: ChannelId,
    /// The other side.
    pub b: ChannelId,
}

impl Task for LinkChannel {
    fn name(&self) -> &'static str {
        "link-channel"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        graph.link_channels(self.a, self.b)?;
        Ok(TaskReport::Done)
    }
}

/// Removes a channel's link.
#[derive(Debug)]
pub struct UnlinkChannel(pub ChannelId);

impl Task for UnlinkChannel {
    fn name(&self) -> &'static str {
        "unlink-channel"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        Ok(TaskReport::Unlinked(graph.unlink_channel(self.0)?))
    }
}

/// Adds a recall container to an audio.
#[derive(Debug)]
pub struct AddRecallContainer {
    /// Target audio.
    pub audio: AudioId,
    /// What the container instantiates.
    pub spec: ContainerSpec,
}

impl Task for AddRecallContainer {
    fn name(&self) -> &'static str {
        "add-recall-container"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        Ok(TaskReport::Container(graph.add_container(self.audio, self.spec)?))
    }
}

/// Cancels every duplicate of a container and frees it.
#[derive(Debug)]
pub struct RemoveRecallContainer(pub ContainerId);

impl Task for RemoveRecallContainer {
    fn name(&self) -> &'static str {
        "remove-recall-container"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        Ok(TaskReport::Removed(graph.remove_container(self.0, engine)?))
    }
}

/// Starts a run on a channel.
#[derive(Debug)]
pub struct StartChannel(pub StartRequest);

impl Task for StartChannel {
    fn name(&self) -> &'static str {
        "start-channel"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        Ok(TaskReport::Started(graph.start_channel(engine, self.0)?))
    }
}

/// Starts a voice for a note.
///
/// With a `parent` the voice nests below that context and is ticked, cancelled
/// and removed together with the run owning it. A voice whose parent is gone
/// by the time the task runs is dropped and reported as
/// [`TaskReport::Deferred`].
#[derive(Debug)]
pub struct NoteOn {
    /// Channel to start.
    pub channel: ChannelId,
    /// The note.
    pub note: Note,
    /// Scope of the voice.
    pub scope: SoundScope,
    /// Context of the run that asked for the voice.
    pub parent: Option<ContextId>,
}

impl Task for NoteOn {
    fn name(&self) -> &'static str {
        "note-on"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        let mut request = StartRequest::new(self.channel, self.scope).with_note(self.note);
        if let Some(parent) = self.parent {
            let owner_live = graph
                .context(parent)
                .and_then(|c| c.recall_id())
                .and_then(|rid| graph.recall_id(rid))
                .is_some_and(|id| id.is_live());
            if !owner_live {
                tracing::debug!("note-on: {parent} is gone, dropping key {}", self.note.key);
                return Ok(TaskReport::Deferred);
            }
            request = request.with_parent(parent);
        }
        Ok(TaskReport::Started(graph.start_channel(engine, request)?))
    }
}

/// Cancels the live voices of a note on a channel.
#[derive(Debug)]
pub struct NoteOff {
    /// Channel the voice runs on.
    pub channel: ChannelId,
    /// MIDI key of the note.
    pub key: u8,
}

impl Task for NoteOff {
    fn name(&self) -> &'static str {
        "note-off"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        let voices = graph.voices_for_key(self.channel, self.key);
        if voices.is_empty() {
            return Ok(TaskReport::Deferred);
        }
        for rid in voices {
            graph.cancel_recall_id(rid)?;
        }
        Ok(TaskReport::Cancelled)
    }
}

/// Requests cancel of a run.
#[derive(Debug)]
pub struct CancelRecallId(pub RecallIdKey);

impl Task for CancelRecallId {
    fn name(&self) -> &'static str {
        "cancel-recall-id"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        graph.cancel_recall_id(self.0)?;
        Ok(TaskReport::Cancelled)
    }
}

/// Frees a cancelled run.
///
/// A run whose cancel has not completed yet is asked to cancel instead and
/// reported as [`TaskReport::Deferred`]; the tick that completes the cancel
/// queues the removal again.
#[derive(Debug)]
pub struct RemoveRecallId(pub RecallIdKey);

impl RemoveRecallId {
    /// Task removing `rid`.
    pub fn new(rid: RecallIdKey) -> Self {
        Self(rid)
    }
}

impl Task for RemoveRecallId {
    fn name(&self) -> &'static str {
        "remove-recall-id"
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        _engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        match graph.remove_recall_id(self.0) {
            Ok(released) => Ok(TaskReport::Removed(released)),
            Err(EngineError::Staging(StagingError::NotCancelled { .. })) => {
                graph.cancel_recall_id(self.0)?;
                Ok(TaskReport::Deferred)
            }
            Err(e) => Err(e),
        }
    }
}

/// Changes the tempo.
#[derive(Debug)]
pub struct SetBpm(pub f64);

impl Task for SetBpm {
    fn name(&self) -> &'static str {
        "set-bpm"
    }

    fn launch(
        self: Box<Self>,
        _graph: &mut AudioGraph,
        engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        if engine.clock().set_bpm(self.0) {
            tracing::debug!("tempo: {} bpm", self.0);
            Ok(TaskReport::Done)
        } else {
            tracing::warn!("tempo: ignoring {} bpm", self.0);
            Ok(TaskReport::Deferred)
        }
    }
}

impl AudioGraph {
    /// Live recall ids on `channel` whose voice carries MIDI `key`.
    pub fn voices_for_key(&self, channel: ChannelId, key: u8) -> Vec<RecallIdKey> {
        let Some(ch) = self.channels.get(channel) else {
            return Vec::new();
        };
        ch.recall_ids
            .iter()
            .copied()
            .filter(|&rid| {
                self.recall_ids.get(rid).is_some_and(|id| {
                    id.is_live()
                        && id.anchor() == channel
                        && id.signals().iter().any(|&s| {
                            self.signals
                                .get(s)
                                .and_then(|s| s.note())
                                .is_some_and(|n| n.key == key)
                        })
                })
            })
            .collect()
    }
}
