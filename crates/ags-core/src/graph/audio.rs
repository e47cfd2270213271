//! Audio objects: one instrument or track with its channel grid.

use crate::error::TopologyError;
use crate::ids::{AudioId, ChannelId, ContainerId, RecallIdKey};
use crate::sound::{AudioBehaviour, Direction};

use super::AudioGraph;

/// Construction parameters for an [`Audio`].
///
/// ```rust
/// use ags_core::{AudioBehaviour, AudioGraph, AudioSpec};
///
/// let mut graph = AudioGraph::default();
/// let synth = graph.add_audio(
///     AudioSpec::new("synth")
///         .with_audio_channels(2)
///         .with_input_pads(12)
///         .with_behaviour(AudioBehaviour::DEFAULTS_TO_INPUT),
/// );
/// assert_eq!(graph.audio(synth).unwrap().inputs().len(), 24);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSpec {
    name: String,
    audio_channels: usize,
    output_pads: usize,
    input_pads: usize,
    behaviour: AudioBehaviour,
}

impl AudioSpec {
    /// One audio channel, one output pad, no inputs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            audio_channels: 1,
            output_pads: 1,
            input_pads: 0,
            behaviour: AudioBehaviour::NONE,
        }
    }

    /// Sets the number of lines per pad.
    pub fn with_audio_channels(mut self, audio_channels: usize) -> Self {
        self.audio_channels = audio_channels;
        self
    }

    /// Sets the output pad count.
    pub fn with_output_pads(mut self, pads: usize) -> Self {
        self.output_pads = pads;
        self
    }

    /// Sets the input pad count.
    pub fn with_input_pads(mut self, pads: usize) -> Self {
        self.input_pads = pads;
        self
    }

    /// Sets the behaviour flags.
    pub fn with_behaviour(mut self, behaviour: AudioBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }
}

/// One instrument or track.
///
/// Channels are stored pad-major: the channel at `(pad, audio_channel)` sits
/// at index `pad * audio_channels + audio_channel`, which is also its line.
#[derive(Debug)]
pub struct Audio {
    pub(crate) name: String,
    pub(crate) audio_channels: usize,
    pub(crate) output_pads: usize,
    pub(crate) input_pads: usize,
    pub(crate) behaviour: AudioBehaviour,
    pub(crate) outputs: Vec<ChannelId>,
    pub(crate) inputs: Vec<ChannelId>,
    pub(crate) containers: Vec<ContainerId>,
    pub(crate) recall_ids: Vec<RecallIdKey>,
}

impl Audio {
    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lines per pad.
    pub fn audio_channels(&self) -> usize {
        self.audio_channels
    }

    /// Output pad count.
    pub fn output_pads(&self) -> usize {
        self.output_pads
    }

    /// Input pad count.
    pub fn input_pads(&self) -> usize {
        self.input_pads
    }

    /// Pad count for `direction`.
    pub fn pads(&self, direction: Direction) -> usize {
        match direction {
            Direction::Output => self.output_pads,
            Direction::Input => self.input_pads,
        }
    }

    /// Behaviour flags.
    pub fn behaviour(&self) -> AudioBehaviour {
        self.behaviour
    }

    /// Output channels, pad-major.
    pub fn outputs(&self) -> &[ChannelId] {
        &self.outputs
    }

    /// Input channels, pad-major.
    pub fn inputs(&self) -> &[ChannelId] {
        &self.inputs
    }

    /// Channels for `direction`.
    pub fn channels(&self, direction: Direction) -> &[ChannelId] {
        match direction {
            Direction::Output => &self.outputs,
            Direction::Input => &self.inputs,
        }
    }

    /// Recall containers in registration order.
    pub fn containers(&self) -> &[ContainerId] {
        &self.containers
    }

    /// Live recall ids started on this audio.
    pub fn recall_ids(&self) -> &[RecallIdKey] {
        &self.recall_ids
    }
}

impl AudioGraph {
    /// Creates an audio with its channels, recyclings and template signals.
    pub fn add_audio(&mut self, spec: AudioSpec) -> AudioId {
        let id = self.audios.insert(Audio {
            name: spec.name,
            audio_channels: spec.audio_channels,
            output_pads: spec.output_pads,
            input_pads: spec.input_pads,
            behaviour: spec.behaviour,
            outputs: Vec::new(),
            inputs: Vec::new(),
            containers: Vec::new(),
            recall_ids: Vec::new(),
        });
        let outputs: Vec<ChannelId> = (0..spec.output_pads * spec.audio_channels)
            .map(|_| self.create_channel(id, Direction::Output))
            .collect();
        let inputs: Vec<ChannelId> = (0..spec.input_pads * spec.audio_channels)
            .map(|_| self.create_channel(id, Direction::Input))
            .collect();
        if let Some(audio) = self.audios.get_mut(id) {
            audio.outputs = outputs;
            audio.inputs = inputs;
        }
        self.rewire(id);
        self.audio_order.push(id);
        tracing::debug!("graph: add audio {id}");
        id
    }

    /// Removes an audio and everything bound to it.
    ///
    /// Rejected while any recall id is still live on the audio.
    pub fn remove_audio(&mut self, id: AudioId) -> Result<(), TopologyError> {
        let audio = self.audios.get(id).ok_or(TopologyError::UnknownAudio(id))?;
        if !audio.recall_ids.is_empty() {
            return Err(TopologyError::AudioBusy {
                audio: id,
                live: audio.recall_ids.len(),
            });
        }
        let containers = audio.containers.clone();
        let channels: Vec<ChannelId> = audio.outputs.iter().chain(&audio.inputs).copied().collect();

        for container in containers {
            self.drop_container(container);
        }
        for channel in channels {
            self.unlink_unchecked(channel);
            self.destroy_channel(channel);
        }
        self.audios.remove(id);
        self.audio_order.retain(|&a| a != id);
        tracing::debug!("graph: remove audio {id}");
        Ok(())
    }

    /// Channel at `(pad, audio_channel)` in `direction`.
    pub fn channel_at(
        &self,
        audio: AudioId,
        direction: Direction,
        pad: usize,
        audio_channel: usize,
    ) -> Option<ChannelId> {
        let a = self.audios.get(audio)?;
        if audio_channel >= a.audio_channels {
            return None;
        }
        a.channels(direction)
            .get(pad * a.audio_channels + audio_channel)
            .copied()
    }

    /// Channel at `line` in `direction`.
    pub fn nth_channel(&self, audio: AudioId, direction: Direction, line: usize) -> Option<ChannelId> {
        self.audios.get(audio)?.channels(direction).get(line).copied()
    }
}
