//! Recyclings: the signal pool of one channel.

use crate::error::TopologyError;
use crate::ids::{ChannelId, RecallIdKey, RecyclingId, SignalId};
use crate::note::Note;
use crate::signal::AudioSignal;

use super::AudioGraph;

/// Reusable pool of audio signals for one channel.
///
/// Besides the template signal every recycling keeps the voice signals of
/// the recall ids running on its channel, ordered by the depth of their
/// recycling context (outer runs first, nested voices after them).
#[derive(Debug)]
pub struct Recycling {
    pub(crate) channel: ChannelId,
    pub(crate) template: SignalId,
    pub(crate) signals: Vec<SignalId>,
    pub(crate) parent: Option<RecyclingId>,
    pub(crate) next: Option<RecyclingId>,
    pub(crate) prev: Option<RecyclingId>,
}

impl Recycling {
    pub(crate) fn new(channel: ChannelId, template: SignalId) -> Self {
        Self {
            channel,
            template,
            signals: Vec::new(),
            parent: None,
            next: None,
            prev: None,
        }
    }

    /// Owning channel.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Template signal, the default content of new voices.
    pub fn template(&self) -> SignalId {
        self.template
    }

    /// Voice signals, outer contexts first.
    pub fn signals(&self) -> &[SignalId] {
        &self.signals
    }

    /// Recycling of the linked upstream output, if linked.
    pub fn parent(&self) -> Option<RecyclingId> {
        self.parent
    }

    /// Next recycling in line order.
    pub fn next(&self) -> Option<RecyclingId> {
        self.next
    }

    /// Previous recycling in line order.
    pub fn prev(&self) -> Option<RecyclingId> {
        self.prev
    }
}

impl AudioGraph {
    pub(crate) fn new_signal(&self, recycling: RecyclingId, recall_id: Option<RecallIdKey>) -> AudioSignal {
        AudioSignal::new(
            recycling,
            recall_id,
            self.settings.samplerate,
            self.settings.buffer_size,
            self.settings.format,
            self.settings.stream_retain,
        )
    }

    fn signal_depth(&self, signal: &AudioSignal) -> usize {
        signal
            .recall_id()
            .and_then(|key| self.recall_ids.get(key))
            .map_or(0, |id| self.context_depth(id.context()))
    }

    /// Adds `signal` to its recycling, keeping context-depth order.
    pub fn add_audio_signal(&mut self, signal: AudioSignal) -> Result<SignalId, TopologyError> {
        let recycling = signal.recycling();
        let channel = self
            .recyclings
            .get(recycling)
            .map(|r| r.channel)
            .ok_or_else(|| TopologyError::Inconsistent(format!("unknown {recycling}")))?;
        let depth = self.signal_depth(&signal);
        let position = self.recyclings.get(recycling).map_or(0, |r| {
            r.signals
                .iter()
                .position(|&s| {
                    self.signals
                        .get(s)
                        .is_some_and(|existing| self.signal_depth(existing) > depth)
                })
                .unwrap_or(r.signals.len())
        });
        let id = self.signals.insert(signal);
        if let Some(r) = self.recyclings.get_mut(recycling) {
            r.signals.insert(position, id);
        }
        tracing::trace!("graph: add {id} to {recycling} of {channel}");
        Ok(id)
    }

    /// Creates a voice signal for `recall_id`, seeded from the template.
    pub fn create_audio_signal_with_defaults(
        &mut self,
        recycling: RecyclingId,
        recall_id: RecallIdKey,
        note: Option<Note>,
    ) -> Result<SignalId, TopologyError> {
        let template = self
            .recyclings
            .get(recycling)
            .map(|r| r.template)
            .ok_or_else(|| TopologyError::Inconsistent(format!("unknown {recycling}")))?;
        let signal = self.new_signal(recycling, Some(recall_id)).with_note(note);
        if let Some(t) = self.signals.get(template) {
            signal.copy_stream_from(t);
        }
        let id = self.add_audio_signal(signal)?;
        if let Some(rid) = self.recall_ids.get_mut(recall_id) {
            rid.signals.push(id);
        }
        Ok(id)
    }

    /// Removes a voice signal. Template signals stay with their recycling.
    pub fn remove_audio_signal(&mut self, signal: SignalId) -> Option<AudioSignal> {
        let recycling = self.signals.get(signal)?.recycling();
        if self.recyclings.get(recycling).is_some_and(|r| r.template == signal) {
            return None;
        }
        if let Some(r) = self.recyclings.get_mut(recycling) {
            r.signals.retain(|&s| s != signal);
        }
        self.signals.remove(signal)
    }

    /// Voice signal of `recall_id` in `recycling`.
    pub fn find_signal_by_recall_id(
        &self,
        recycling: RecyclingId,
        recall_id: RecallIdKey,
    ) -> Option<SignalId> {
        self.recyclings.get(recycling)?.signals.iter().copied().find(|&s| {
            self.signals
                .get(s)
                .is_some_and(|signal| signal.recall_id() == Some(recall_id))
        })
    }

    /// Returns `true` while the signal's recall id is running.
    pub fn signal_is_active(&self, signal: SignalId) -> bool {
        self.signals
            .get(signal)
            .and_then(AudioSignal::recall_id)
            .and_then(|key| self.recall_ids.get(key))
            .is_some_and(|id| id.is_live() && id.staging() == crate::StagingState::Running)
    }
}
