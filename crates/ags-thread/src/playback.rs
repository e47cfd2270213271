//! Per-channel playback slots.
//!
//! A [`Playback`] ties one channel to at most one running recall id per
//! sound scope and, when the channel is super-threaded, to one thread node
//! per scope.
//! Slots hold handles into the graph and the thread tree, never references.

use std::collections::HashMap;

use ags_core::{AudioGraph, ChannelId, RecallIdKey, SoundScope};

use crate::tree::NodeId;

/// Playback state of one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Playback {
    recall_ids: [Option<RecallIdKey>; SoundScope::COUNT],
    threads: [Option<NodeId>; SoundScope::COUNT],
}

impl Playback {
    /// Recall id running in `scope`.
    pub fn recall_id(&self, scope: SoundScope) -> Option<RecallIdKey> {
        self.recall_ids[scope.index()]
    }

    /// Thread node running `scope` of a super-threaded channel.
    pub fn thread(&self, scope: SoundScope) -> Option<NodeId> {
        self.threads[scope.index()]
    }

    /// Returns `true` if any scope has its own thread.
    pub fn has_thread(&self) -> bool {
        self.threads.iter().any(Option::is_some)
    }

    /// Returns `true` if any scope has a recall id.
    pub fn is_playing(&self) -> bool {
        self.recall_ids.iter().any(Option::is_some)
    }
}

/// Playback slots of every channel that has one.
#[derive(Debug, Default)]
pub struct PlaybackTable {
    slots: HashMap<ChannelId, Playback>,
}

impl PlaybackTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots of `channel`.
    pub fn get(&self, channel: ChannelId) -> Option<&Playback> {
        self.slots.get(&channel)
    }

    /// Records `rid` as the run of `channel` in `scope`. Returns the recall
    /// id it replaces.
    pub fn set_recall_id(
        &mut self,
        channel: ChannelId,
        scope: SoundScope,
        rid: RecallIdKey,
    ) -> Option<RecallIdKey> {
        self.slots.entry(channel).or_default().recall_ids[scope.index()].replace(rid)
    }

    /// Clears the `scope` slot of `channel` and returns what it held.
    pub fn take_recall_id(&mut self, channel: ChannelId, scope: SoundScope) -> Option<RecallIdKey> {
        let slot = self.slots.get_mut(&channel)?;
        let rid = slot.recall_ids[scope.index()].take();
        if !slot.is_playing() && !slot.has_thread() {
            self.slots.remove(&channel);
        }
        rid
    }

    /// Binds `scope` of `channel` to a thread node.
    pub fn set_thread(&mut self, channel: ChannelId, scope: SoundScope, node: NodeId) {
        self.slots.entry(channel).or_default().threads[scope.index()] = Some(node);
    }

    /// Releases the thread binding of every channel.
    pub fn clear_threads(&mut self) {
        for slot in self.slots.values_mut() {
            slot.threads = [None; SoundScope::COUNT];
        }
        self.slots.retain(|_, s| s.is_playing());
    }

    /// Channels with at least one running scope.
    pub fn playing(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.slots
            .iter()
            .filter(|(_, s)| s.is_playing())
            .map(|(&c, _)| c)
    }

    /// Drops slots whose recall id is no longer in `graph`. Returns the
    /// slots cleared.
    pub fn prune(&mut self, graph: &AudioGraph) -> usize {
        let mut cleared = 0;
        for slot in self.slots.values_mut() {
            for rid in &mut slot.recall_ids {
                if rid.is_some_and(|r| graph.recall_id(r).is_none()) {
                    *rid = None;
                    cleared += 1;
                }
            }
        }
        self.slots.retain(|_, s| s.is_playing() || s.has_thread());
        cleared
    }

    /// Channels with a slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no channel has a slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ags_core::recall::builtin::VolumeRecall;
    use ags_core::{AudioSpec, ContainerSpec, EngineContext, EngineSettings, StartRequest};

    #[test]
    fn scopes_have_independent_slots() {
        let (engine, queue) = EngineContext::new(EngineSettings::default());
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a"));
        graph
            .add_container(audio, ContainerSpec::new("volume").with_signal(VolumeRecall::prototype()))
            .unwrap();
        let out = graph.audio(audio).unwrap().outputs()[0];
        let play = graph
            .start_channel(&engine, StartRequest::new(out, SoundScope::Playback))
            .unwrap()
            .recall_id;
        let seq = graph
            .start_channel(&engine, StartRequest::new(out, SoundScope::Sequencer))
            .unwrap()
            .recall_id;

        let mut table = PlaybackTable::new();
        assert_eq!(table.set_recall_id(out, SoundScope::Playback, play), None);
        assert_eq!(table.set_recall_id(out, SoundScope::Sequencer, seq), None);
        assert_eq!(table.get(out).unwrap().recall_id(SoundScope::Notation), None);
        assert_eq!(table.playing().count(), 1);

        graph.cancel_recall_id(play).unwrap();
        graph.tick(&engine);
        queue.drain(&mut graph, &engine);
        assert_eq!(table.prune(&graph), 1);
        assert_eq!(table.get(out).unwrap().recall_id(SoundScope::Sequencer), Some(seq));

        assert_eq!(table.take_recall_id(out, SoundScope::Sequencer), Some(seq));
        assert!(table.is_empty());
    }
}
