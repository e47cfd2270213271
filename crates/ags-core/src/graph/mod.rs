//! The audio graph: every engine object lives in one of its tables.
//!
//! [`AudioGraph`] owns the data model (audios, channels, recyclings, audio
//! signals), the recycling-context tree, recall ids, recalls and recall
//! containers. Objects refer to each other through the typed handles in
//! [`crate::ids`], never through pointers, so parent links are weak by
//! construction and a removed object cannot be reached through a stale link.
//!
//! # Mutation model
//!
//! Structural changes take `&mut AudioGraph` and are only performed by tasks
//! on the task launcher, between ticks. The tick itself works on
//! `&AudioGraph`; the few fields it mutates (signal streams, recall state,
//! staging flags) sit behind atomics or a per-object mutex.
//!
//! # Submodules
//!
//! - `audio`: [`Audio`] objects and their construction
//! - `channel`: [`Channel`] lanes and the pad/line grid
//! - `recycling`: [`Recycling`] pools and signal bookkeeping
//! - `context`: the [`RecyclingContext`] tree
//! - `resize`: controlled channel/pad resize
//! - `link`: channel linking across audios

mod audio;
mod channel;
mod context;
mod link;
mod recycling;
mod resize;

pub use audio::{Audio, AudioSpec};
pub use channel::Channel;
pub use context::RecyclingContext;
pub use recycling::Recycling;
pub use resize::ResizeReport;

use crate::arena::Arena;
use crate::ids::{
    AudioId, ChannelId, ContainerId, ContextId, RecallIdKey, RecallKey, RecyclingId, SignalId,
};
use crate::recall::{Recall, RecallContainer};
use crate::recall_id::RecallId;
use crate::settings::EngineSettings;
use crate::signal::AudioSignal;

/// Owner of every engine object.
pub struct AudioGraph {
    pub(crate) settings: EngineSettings,
    pub(crate) audios: Arena<AudioId, Audio>,
    pub(crate) audio_order: Vec<AudioId>,
    pub(crate) channels: Arena<ChannelId, Channel>,
    pub(crate) recyclings: Arena<RecyclingId, Recycling>,
    pub(crate) signals: Arena<SignalId, AudioSignal>,
    pub(crate) contexts: Arena<ContextId, RecyclingContext>,
    pub(crate) recall_ids: Arena<RecallIdKey, RecallId>,
    pub(crate) recalls: Arena<RecallKey, Recall>,
    pub(crate) containers: Arena<ContainerId, RecallContainer>,
    pub(crate) master: ContextId,
}

impl AudioGraph {
    /// Creates an empty graph holding only the master recycling context.
    pub fn new(settings: EngineSettings) -> Self {
        let mut contexts = Arena::new();
        let master = contexts.insert(RecyclingContext::new(None, Vec::new()));
        tracing::debug!("graph: master context {master}");
        Self {
            settings,
            audios: Arena::new(),
            audio_order: Vec::new(),
            channels: Arena::new(),
            recyclings: Arena::new(),
            signals: Arena::new(),
            contexts,
            recall_ids: Arena::new(),
            recalls: Arena::new(),
            containers: Arena::new(),
            master,
        }
    }

    /// Settings the graph was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Root of the recycling-context tree.
    pub fn master_context(&self) -> ContextId {
        self.master
    }

    /// Looks up an audio.
    pub fn audio(&self, id: AudioId) -> Option<&Audio> {
        self.audios.get(id)
    }

    /// Audios in creation order.
    pub fn audios(&self) -> &[AudioId] {
        &self.audio_order
    }

    /// Looks up a channel.
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// Looks up a recycling.
    pub fn recycling(&self, id: RecyclingId) -> Option<&Recycling> {
        self.recyclings.get(id)
    }

    /// Looks up an audio signal.
    pub fn signal(&self, id: SignalId) -> Option<&AudioSignal> {
        self.signals.get(id)
    }

    /// Looks up a recycling context.
    pub fn context(&self, id: ContextId) -> Option<&RecyclingContext> {
        self.contexts.get(id)
    }

    /// Looks up a recall id.
    pub fn recall_id(&self, id: RecallIdKey) -> Option<&RecallId> {
        self.recall_ids.get(id)
    }

    /// Looks up a recall.
    pub fn recall(&self, key: RecallKey) -> Option<&Recall> {
        self.recalls.get(key)
    }

    /// Looks up a recall container.
    pub fn container(&self, id: ContainerId) -> Option<&RecallContainer> {
        self.containers.get(id)
    }

    /// Number of live recall ids.
    pub fn recall_id_count(&self) -> usize {
        self.recall_ids.len()
    }

    /// Number of recalls, templates and duplicates alike.
    pub fn recall_count(&self) -> usize {
        self.recalls.len()
    }

    /// Number of recycling contexts, the master included.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Number of audio signals, templates included.
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Number of channels across all audios.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Every recall id currently in the graph.
    pub fn recall_id_keys(&self) -> impl Iterator<Item = RecallIdKey> + '_ {
        self.recall_ids.iter().map(|(key, _)| key)
    }

    /// Checks every structural invariant of the graph.
    ///
    /// Runs the per-audio grid check and verifies that every channel is
    /// listed by exactly one audio and every context parent link is mirrored
    /// by a child link.
    pub fn verify(&self) -> Result<(), crate::error::TopologyError> {
        use crate::error::TopologyError;

        let mut listed = 0usize;
        for &audio in &self.audio_order {
            self.verify_grid(audio)?;
            let a = self.audios.get(audio).ok_or(TopologyError::UnknownAudio(audio))?;
            listed += a.outputs().len() + a.inputs().len();
        }
        if listed != self.channels.len() {
            return Err(TopologyError::Inconsistent(format!(
                "{} channels stored but {listed} listed by audios",
                self.channels.len()
            )));
        }
        for (id, context) in self.contexts.iter() {
            if let Some(parent) = context.parent() {
                let mirrored = self
                    .contexts
                    .get(parent)
                    .is_some_and(|p| p.children().contains(&id));
                if !mirrored {
                    return Err(TopologyError::Inconsistent(format!(
                        "{id} names {parent} as parent but is not its child"
                    )));
                }
            } else if id != self.master {
                return Err(TopologyError::Inconsistent(format!("{id} has no parent")));
            }
        }
        Ok(())
    }
}

impl Default for AudioGraph {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}
