//! Recall containers: one effect's recall set, added and removed as a unit.
//!
//! A container owns a shared audio recall, an optional audio-run template,
//! and per mapped channel a shared channel recall plus a channel-run
//! template tree. Duplicates made from its templates are listed in its
//! duplicate pool so removal can cancel and detach them first.

use std::sync::Arc;

use crate::engine::EngineContext;
use crate::error::{EngineError, TopologyError};
use crate::graph::AudioGraph;
use crate::ids::{AudioId, ChannelId, ContainerId, RecallKey};
use crate::port::PortSet;
use crate::sound::Direction;

use super::prototype::PassThrough;
use super::{Binding, ContainerSpec, Recall, RecallInfo, RecallLayer, RecallPrototype, StageContext};

/// One effect bound to an audio.
#[derive(Debug)]
pub struct RecallContainer {
    audio: AudioId,
    spec: Arc<ContainerSpec>,
    recall_audio: RecallKey,
    audio_run: Option<RecallKey>,
    channel_recalls: Vec<(ChannelId, RecallKey)>,
    channel_runs: Vec<(ChannelId, RecallKey)>,
    pub(crate) duplicates: Vec<RecallKey>,
}

impl RecallContainer {
    /// Effect name.
    pub fn effect(&self) -> &str {
        self.spec.effect()
    }

    /// Owning audio.
    pub fn audio(&self) -> AudioId {
        self.audio
    }

    /// Channel direction this container maps onto.
    pub fn direction(&self) -> Direction {
        self.spec.direction()
    }

    /// The spec the container was built from.
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// Shared audio recall.
    pub fn recall_audio(&self) -> RecallKey {
        self.recall_audio
    }

    /// Audio-run template.
    pub fn audio_run(&self) -> Option<RecallKey> {
        self.audio_run
    }

    /// Shared channel recall mapped onto `channel`.
    pub fn channel_recall(&self, channel: ChannelId) -> Option<RecallKey> {
        lookup(&self.channel_recalls, channel)
    }

    /// Channel-run template mapped onto `channel`.
    pub fn channel_run(&self, channel: ChannelId) -> Option<RecallKey> {
        lookup(&self.channel_runs, channel)
    }

    /// Channels this container is mapped onto, in mapping order.
    pub fn mapped_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channel_recalls.iter().map(|&(c, _)| c)
    }

    /// Root templates: the audio run followed by every channel run.
    pub fn templates(&self) -> impl Iterator<Item = RecallKey> + '_ {
        self.audio_run
            .into_iter()
            .chain(self.channel_runs.iter().map(|&(_, k)| k))
    }

    /// Roots of the live duplicate trees made from this container.
    pub fn duplicates(&self) -> &[RecallKey] {
        &self.duplicates
    }
}

fn lookup(table: &[(ChannelId, RecallKey)], channel: ChannelId) -> Option<RecallKey> {
    table.iter().find(|&&(c, _)| c == channel).map(|&(_, k)| k)
}

fn child_layer(layer: RecallLayer) -> Option<RecallLayer> {
    match layer {
        RecallLayer::ChannelRun => Some(RecallLayer::Recycling),
        RecallLayer::Recycling => Some(RecallLayer::AudioSignal),
        _ => None,
    }
}

impl AudioGraph {
    /// Adds a container for `spec` to `audio` and maps it onto every channel
    /// of the spec's direction.
    pub fn add_container(
        &mut self,
        audio: AudioId,
        spec: ContainerSpec,
    ) -> Result<ContainerId, TopologyError> {
        let channels = self
            .audios
            .get(audio)
            .ok_or(TopologyError::UnknownAudio(audio))?
            .channels(spec.direction())
            .to_vec();
        let spec = Arc::new(spec);
        let id = self.containers.next_key();

        let shared = Recall::new(
            Arc::new(shared_info(&spec, "audio")),
            RecallLayer::Audio,
            Binding::Audio(audio),
            Arc::new(PortSet::new(spec.audio_ports().iter().cloned())),
            Box::new(PassThrough),
        )
        .in_container(id);
        let recall_audio = self.recalls.insert(shared);
        let audio_run = spec.audio_run().and_then(|proto| {
            self.instantiate(id, &spec, proto, RecallLayer::AudioRun, Binding::Audio(audio))
        });

        let inserted = self.containers.insert(RecallContainer {
            audio,
            spec,
            recall_audio,
            audio_run,
            channel_recalls: Vec::new(),
            channel_runs: Vec::new(),
            duplicates: Vec::new(),
        });
        debug_assert_eq!(inserted, id);
        if let Some(a) = self.audios.get_mut(audio) {
            a.containers.push(id);
        }
        for channel in channels {
            self.map_container_onto(id, channel);
        }
        tracing::debug!("graph: add {id} to {audio}");
        Ok(id)
    }

    /// Creates one template recall for `proto` and its children.
    fn instantiate(
        &mut self,
        container: ContainerId,
        spec: &ContainerSpec,
        proto: &RecallPrototype,
        layer: RecallLayer,
        binding: Binding,
    ) -> Option<RecallKey> {
        let mut info = proto.info().clone();
        info.effect = spec.effect().to_owned();
        let recall = Recall::new(
            Arc::new(info),
            layer,
            binding,
            Arc::new(PortSet::new(proto.ports().iter().cloned())),
            proto.build(),
        )
        .in_container(container);
        let key = self.recalls.insert(recall);

        if let Some(next) = child_layer(layer) {
            for child in proto.children() {
                let Some(child_binding) = self.template_binding(next, binding) else {
                    continue;
                };
                if let Some(child_key) = self.instantiate(container, spec, child, next, child_binding) {
                    self.attach_child(key, child_key);
                }
            }
        } else if !proto.children().is_empty() {
            tracing::warn!("graph: {layer} template {} cannot host children", proto.info().name);
        }
        Some(key)
    }

    fn template_binding(&self, layer: RecallLayer, parent: Binding) -> Option<Binding> {
        match (layer, parent) {
            (RecallLayer::Recycling, Binding::Channel(c)) => {
                self.channels.get(c).map(|c| Binding::Recycling(c.recycling()))
            }
            (RecallLayer::AudioSignal, Binding::Recycling(r)) => {
                self.recyclings.get(r).map(|r| Binding::Signal(r.template()))
            }
            _ => None,
        }
    }

    pub(crate) fn attach_child(&mut self, parent: RecallKey, child: RecallKey) {
        if let Some(c) = self.recalls.get_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.recalls.get_mut(parent) {
            p.children.push(child);
        }
    }

    /// Maps `container` onto `channel`. Returns the template recalls created.
    pub(crate) fn map_container_onto(&mut self, container: ContainerId, channel: ChannelId) -> usize {
        let Some(c) = self.containers.get(container) else {
            return 0;
        };
        if c.channel_recall(channel).is_some() {
            return 0;
        }
        let spec = Arc::clone(&c.spec);
        let shared = Recall::new(
            Arc::new(shared_info(&spec, "channel")),
            RecallLayer::Channel,
            Binding::Channel(channel),
            Arc::new(PortSet::new(spec.channel_ports().iter().cloned())),
            Box::new(PassThrough),
        )
        .in_container(container);
        let shared = self.recalls.insert(shared);
        let before = self.recalls.len();
        let run = spec.channel_run().and_then(|proto| {
            self.instantiate(container, &spec, proto, RecallLayer::ChannelRun, Binding::Channel(channel))
        });
        let created = 1 + self.recalls.len() - before;
        if let Some(c) = self.containers.get_mut(container) {
            c.channel_recalls.push((channel, shared));
            if let Some(run) = run {
                c.channel_runs.push((channel, run));
            }
        }
        created
    }

    /// Maps every container of the channel's audio with a matching direction
    /// onto `channel`.
    pub(crate) fn map_channel(&mut self, channel: ChannelId) -> usize {
        let Some(ch) = self.channels.get(channel) else {
            return 0;
        };
        let direction = ch.direction();
        let containers = self
            .audios
            .get(ch.audio())
            .map(|a| a.containers.clone())
            .unwrap_or_default();
        let matching: Vec<ContainerId> = containers
            .into_iter()
            .filter(|&c| self.containers.get(c).is_some_and(|c| c.direction() == direction))
            .collect();
        matching
            .into_iter()
            .map(|c| self.map_container_onto(c, channel))
            .sum()
    }

    fn map_direction(&mut self, audio: AudioId, direction: Direction, start_line: usize) -> usize {
        let channels = self
            .audios
            .get(audio)
            .map(|a| a.channels(direction).iter().skip(start_line).copied().collect::<Vec<_>>())
            .unwrap_or_default();
        channels.into_iter().map(|c| self.map_channel(c)).sum()
    }

    /// Maps the audio's input containers onto every input from `start_line`
    /// on that lacks them. Returns the template recalls created.
    pub fn input_map_recall(&mut self, audio: AudioId, start_line: usize) -> usize {
        self.map_direction(audio, Direction::Input, start_line)
    }

    /// Maps the audio's output containers onto every output from
    /// `start_line` on that lacks them. Returns the template recalls created.
    pub fn output_map_recall(&mut self, audio: AudioId, start_line: usize) -> usize {
        self.map_direction(audio, Direction::Output, start_line)
    }

    /// Releases every template and shared recall mapped onto `channel`.
    /// Returns the recalls released.
    pub(crate) fn unmap_channel(&mut self, channel: ChannelId) -> usize {
        let Some(audio) = self.channels.get(channel).map(|c| c.audio()) else {
            return 0;
        };
        let containers = self
            .audios
            .get(audio)
            .map(|a| a.containers.clone())
            .unwrap_or_default();
        let mut released = 0;
        for id in containers {
            let Some(c) = self.containers.get_mut(id) else {
                continue;
            };
            let shared = c.channel_recall(channel);
            let run = c.channel_run(channel);
            c.channel_recalls.retain(|&(ch, _)| ch != channel);
            c.channel_runs.retain(|&(ch, _)| ch != channel);
            for root in shared.into_iter().chain(run) {
                released += self.release_tree(root);
            }
        }
        released
    }

    /// Removes `root` and every recall below it from the arena, detaching it
    /// from its parent, its run and its container's duplicate pool.
    pub(crate) fn release_tree(&mut self, root: RecallKey) -> usize {
        if let Some(parent) = self.recalls.get(root).and_then(Recall::parent) {
            if let Some(p) = self.recalls.get_mut(parent) {
                p.children.retain(|&c| c != root);
            }
        }
        let keys = self.subtree(root);
        for &key in &keys {
            let Some(recall) = self.recalls.remove(key) else {
                continue;
            };
            if let Some(rid) = recall.recall_id().and_then(|r| self.recall_ids.get_mut(r)) {
                rid.recalls.retain(|&k| k != key);
                rid.roots.retain(|&k| k != key);
            }
            if let Some(c) = recall.container().and_then(|c| self.containers.get_mut(c)) {
                c.duplicates.retain(|&k| k != key);
            }
        }
        keys.len()
    }

    /// Cancels and detaches every duplicate of `container`, then frees it
    /// with its templates. Returns the recalls released.
    pub fn remove_container(
        &mut self,
        container: ContainerId,
        engine: &EngineContext,
    ) -> Result<usize, EngineError> {
        let duplicates = self
            .containers
            .get(container)
            .ok_or(EngineError::UnknownContainer(container))?
            .duplicates
            .clone();
        for &root in &duplicates {
            for key in self.subtree(root) {
                let Some(recall) = self.recalls.get(key) else {
                    continue;
                };
                let Some(rid) = recall.recall_id() else {
                    continue;
                };
                if recall.is_failed() {
                    continue;
                }
                let cx = StageContext::new(self, engine, key, rid);
                recall.with_behavior(|b| b.cancel(&cx));
            }
        }
        let released = self.drop_container(container);
        tracing::debug!("graph: remove {container}, {released} recall(s) released");
        Ok(released)
    }

    /// Frees a container and all of its recalls without staging calls.
    pub(crate) fn drop_container(&mut self, container: ContainerId) -> usize {
        let Some(c) = self.containers.get(container) else {
            return 0;
        };
        let audio = c.audio;
        let roots: Vec<RecallKey> = c
            .duplicates
            .iter()
            .copied()
            .chain(c.templates())
            .chain(c.channel_recalls.iter().map(|&(_, k)| k))
            .chain(core::iter::once(c.recall_audio))
            .collect();
        let released = roots.into_iter().map(|root| self.release_tree(root)).sum();
        self.containers.remove(container);
        if let Some(a) = self.audios.get_mut(audio) {
            a.containers.retain(|&c| c != container);
        }
        released
    }
}

fn shared_info(spec: &ContainerSpec, suffix: &str) -> RecallInfo {
    let mut info = RecallInfo::new(format!("{}-{suffix}", spec.effect()));
    info.effect = spec.effect().to_owned();
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioSpec;
    use crate::port::PortDescriptor;

    fn leaf() -> RecallPrototype {
        RecallPrototype::of("leaf", PassThrough)
    }

    #[test]
    fn container_maps_every_output() {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a").with_audio_channels(2).with_input_pads(1));
        let id = graph
            .add_container(audio, ContainerSpec::new("fx").with_signal(leaf()))
            .unwrap();
        let c = graph.container(id).unwrap();
        assert_eq!(c.mapped_channels().count(), 2);
        assert_eq!(c.templates().count(), 2);
        // shared audio + 2 x (shared channel + channel run + recycling + leaf)
        assert_eq!(graph.recall_count(), 9);
        for &out in graph.audio(audio).unwrap().outputs() {
            let run = graph.recall(c.channel_run(out).unwrap()).unwrap();
            assert!(run.is_template());
            assert_eq!(run.binding(), Binding::Channel(out));
        }
    }

    #[test]
    fn template_chain_binds_recycling_and_template_signal() {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a"));
        let out = graph.audio(audio).unwrap().outputs()[0];
        let id = graph
            .add_container(audio, ContainerSpec::new("fx").with_signal(leaf()))
            .unwrap();
        let run = graph.container(id).unwrap().channel_run(out).unwrap();
        let recycling = graph.recall(run).unwrap().children()[0];
        let leaf = graph.recall(recycling).unwrap().children()[0];
        let r = graph.channel(out).unwrap().recycling();
        assert_eq!(graph.recall(recycling).unwrap().binding(), Binding::Recycling(r));
        let template = graph.recycling(r).unwrap().template();
        assert_eq!(graph.recall(leaf).unwrap().binding(), Binding::Signal(template));
        assert_eq!(graph.recall(leaf).unwrap().layer(), RecallLayer::AudioSignal);
    }

    #[test]
    fn shared_recalls_carry_spec_ports() {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a"));
        let out = graph.audio(audio).unwrap().outputs()[0];
        let spec = ContainerSpec::new("mix")
            .with_audio_port(PortDescriptor::new("master", 1.0, 0.0, 1.0))
            .with_channel_port(PortDescriptor::new("pan", 0.0, -1.0, 1.0));
        let id = graph.add_container(audio, spec).unwrap();
        let c = graph.container(id).unwrap();
        assert_eq!(graph.recall(c.recall_audio()).unwrap().ports().get("master"), Some(1.0));
        let shared = graph.recall(c.channel_recall(out).unwrap()).unwrap();
        assert_eq!(shared.ports().get("pan"), Some(0.0));
        assert!(!shared.is_template());
    }

    #[test]
    fn drop_container_releases_everything() {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a").with_output_pads(3));
        let id = graph
            .add_container(audio, ContainerSpec::new("fx").with_signal(leaf()))
            .unwrap();
        assert_eq!(graph.drop_container(id), 13);
        assert_eq!(graph.recall_count(), 0);
        assert!(graph.audio(audio).unwrap().containers().is_empty());
    }

    #[test]
    fn output_map_recall_fills_missing_lines_only() {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a").with_output_pads(2));
        graph
            .add_container(audio, ContainerSpec::new("fx").with_signal(leaf()))
            .unwrap();
        assert_eq!(graph.output_map_recall(audio, 0), 0);
        assert_eq!(graph.input_map_recall(audio, 0), 0);
    }

    #[test]
    fn remapping_a_channel_only_picks_containers_of_its_direction() {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a").with_input_pads(1));
        let out_fx = graph
            .add_container(audio, ContainerSpec::new("out-fx").with_signal(leaf()))
            .unwrap();
        let in_fx = graph
            .add_container(
                audio,
                ContainerSpec::new("in-fx")
                    .with_signal(leaf())
                    .with_direction(Direction::Input),
            )
            .unwrap();
        let out = graph.audio(audio).unwrap().outputs()[0];

        // shared channel + channel run + recycling + leaf
        assert_eq!(graph.unmap_channel(out), 4);
        assert_eq!(graph.container(out_fx).unwrap().channel_run(out), None);

        assert_eq!(graph.map_channel(out), 4);
        assert!(graph.container(out_fx).unwrap().channel_run(out).is_some());
        assert_eq!(graph.container(in_fx).unwrap().channel_recall(out), None);
        assert_eq!(graph.map_channel(out), 0);
    }
}
