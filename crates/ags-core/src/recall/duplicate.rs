//! Duplication of templates into runs and starting runs on channels.
//!
//! Starting a channel allocates a [`RecyclingContext`](crate::RecyclingContext)
//! and a [`RecallId`] for it, gives every lane a voice signal seeded from
//! the lane's template signal, and duplicates the templates of every
//! container on the audio into the run. Inputs linked to another audio's
//! output start a nested run in a child context, so the upstream voice is
//! produced independently for this run.

use crate::engine::EngineContext;
use crate::error::{EngineError, TopologyError, WiringError};
use crate::graph::AudioGraph;
use crate::ids::{ChannelId, ContextId, RecallIdKey, RecallKey};
use crate::note::Note;
use crate::recall_id::RecallId;
use crate::sound::{AudioBehaviour, Direction, SoundScope};

use super::{Binding, RecallLayer};

/// Request to start a run on a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartRequest {
    /// Channel to start.
    pub channel: ChannelId,
    /// Scope of the run.
    pub scope: SoundScope,
    /// Note attached to the voice signals.
    pub note: Option<Note>,
    /// Parent context. `None` places the run below the master context.
    pub parent: Option<ContextId>,
}

impl StartRequest {
    /// Starts `channel` in `scope` below the master context.
    pub fn new(channel: ChannelId, scope: SoundScope) -> Self {
        Self {
            channel,
            scope,
            note: None,
            parent: None,
        }
    }

    /// Attaches a note.
    pub fn with_note(mut self, note: Note) -> Self {
        self.note = Some(note);
        self
    }

    /// Nests the run below `parent`.
    pub fn with_parent(mut self, parent: ContextId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Result of starting a run.
#[derive(Debug)]
pub struct StartReport {
    /// The new top-level run.
    pub recall_id: RecallIdKey,
    /// Its context.
    pub context: ContextId,
    /// Runs started for linked inputs, parents before children.
    pub nested: Vec<RecallIdKey>,
    /// Recalls excluded by wiring errors. The run itself keeps going.
    pub wiring: Vec<WiringError>,
}

impl AudioGraph {
    /// Duplicates `template` into `recall_id`, bound to `lane`.
    ///
    /// Signal-layer children are bound to the run's voice signal in the
    /// lane's recycling and skipped when the run has none there.
    pub fn duplicate_recall(
        &mut self,
        template: RecallKey,
        recall_id: RecallIdKey,
        lane: ChannelId,
    ) -> Result<RecallKey, EngineError> {
        let t = self
            .recalls
            .get(template)
            .ok_or(EngineError::UnknownRecall(template))?;
        if !t.is_template() {
            return Err(WiringError::MissingTemplate {
                recall: template,
                name: t.name().to_owned(),
            }
            .into());
        }
        let binding = match t.layer() {
            RecallLayer::AudioRun => {
                let audio = self
                    .channels
                    .get(lane)
                    .ok_or(TopologyError::UnknownChannel(lane))?
                    .audio();
                Binding::Audio(audio)
            }
            _ => Binding::Channel(lane),
        };
        if !self.recall_ids.contains(recall_id) {
            return Err(crate::error::StagingError::UnknownRecallId(recall_id).into());
        }
        let key = self
            .duplicate_tree(template, recall_id, binding)
            .ok_or(EngineError::UnknownRecall(template))?;
        if let Some(id) = self.recall_ids.get_mut(recall_id) {
            id.roots.push(key);
        }
        if let Some(c) = self
            .recalls
            .get(key)
            .and_then(|r| r.container())
            .and_then(|c| self.containers.get_mut(c))
        {
            c.duplicates.push(key);
        }
        Ok(key)
    }

    fn duplicate_tree(
        &mut self,
        template: RecallKey,
        recall_id: RecallIdKey,
        binding: Binding,
    ) -> Option<RecallKey> {
        let (duplicate, children) = {
            let t = self.recalls.get(template)?;
            (t.duplicate_for(template, recall_id, binding), t.children.clone())
        };
        let key = self.recalls.insert(duplicate);
        if let Some(id) = self.recall_ids.get_mut(recall_id) {
            id.recalls.push(key);
        }
        for child in children {
            let Some(layer) = self.recalls.get(child).map(|c| c.layer()) else {
                continue;
            };
            let child_binding = match (layer, binding) {
                (RecallLayer::Recycling, Binding::Channel(c)) => {
                    self.channels.get(c).map(|c| Binding::Recycling(c.recycling()))
                }
                (RecallLayer::AudioSignal, Binding::Recycling(r)) => self
                    .find_signal_by_recall_id(r, recall_id)
                    .map(Binding::Signal),
                _ => None,
            };
            let Some(child_binding) = child_binding else {
                continue;
            };
            if let Some(child_key) = self.duplicate_tree(child, recall_id, child_binding) {
                self.attach_child(key, child_key);
            }
        }
        Some(key)
    }

    /// Lanes a run on `channel` covers: the channel itself, plus the
    /// matching lanes of the other direction when the audio's behaviour
    /// routes playback through them.
    pub fn run_lanes(&self, channel: ChannelId) -> Vec<ChannelId> {
        let Some(ch) = self.channels.get(channel) else {
            return Vec::new();
        };
        let Some(audio) = self.audios.get(ch.audio()) else {
            return vec![channel];
        };
        let behaviour = audio.behaviour();
        let line = ch.audio_channel();
        let mut lanes = vec![channel];
        let same_line = |list: &[ChannelId]| -> Vec<ChannelId> {
            list.iter()
                .copied()
                .filter(|&c| self.channels.get(c).is_some_and(|c| c.audio_channel() == line))
                .collect()
        };
        match ch.direction() {
            Direction::Output if behaviour.contains(AudioBehaviour::DEFAULTS_TO_INPUT) => {
                let mut inputs = same_line(audio.inputs());
                if behaviour.contains(AudioBehaviour::REVERSE_MAPPING) {
                    inputs.reverse();
                }
                lanes.extend(inputs);
            }
            Direction::Input if behaviour.contains(AudioBehaviour::DEFAULTS_TO_OUTPUT) => {
                lanes.extend(same_line(audio.outputs()).into_iter().take(1));
            }
            _ => {}
        }
        lanes
    }

    /// Starts a run and stages it up to `InitPostDone`.
    ///
    /// Wiring errors exclude the affected recalls and are reported in the
    /// returned [`StartReport`]; they do not fail the start.
    pub fn start_channel(
        &mut self,
        engine: &EngineContext,
        request: StartRequest,
    ) -> Result<StartReport, EngineError> {
        let parent = request.parent.unwrap_or(self.master);
        if !self.contexts.contains(parent) {
            return Err(TopologyError::UnknownContext(parent).into());
        }
        if !self.channels.contains(request.channel) {
            return Err(TopologyError::UnknownChannel(request.channel).into());
        }
        let mut nested = Vec::new();
        let recall_id = self.start_run(request.channel, request.scope, request.note, parent, &mut nested)?;
        let wiring = self.stage_tree(engine, recall_id)?;
        for error in &wiring {
            tracing::warn!("staging: {error}");
        }
        let context = self
            .recall_ids
            .get(recall_id)
            .map_or(parent, RecallId::context);
        tracing::debug!(
            "graph: start {recall_id} on {} ({}), {} nested",
            request.channel,
            request.scope,
            nested.len()
        );
        Ok(StartReport {
            recall_id,
            context,
            nested,
            wiring,
        })
    }

    pub(crate) fn start_run(
        &mut self,
        channel: ChannelId,
        scope: SoundScope,
        note: Option<Note>,
        parent: ContextId,
        nested: &mut Vec<RecallIdKey>,
    ) -> Result<RecallIdKey, EngineError> {
        let audio = self
            .channels
            .get(channel)
            .ok_or(TopologyError::UnknownChannel(channel))?
            .audio();
        let lanes = self.run_lanes(channel);
        let recyclings = lanes
            .iter()
            .filter_map(|&l| self.channels.get(l).map(|c| c.recycling()))
            .collect();
        let context = self.add_context(parent, recyclings)?;

        let key = self.recall_ids.next_key();
        let mut id = RecallId::new(key, scope, context, audio, channel);
        id.channels = lanes.clone();
        let inserted = self.recall_ids.insert(id);
        debug_assert_eq!(inserted, key);
        if let Some(c) = self.contexts.get_mut(context) {
            c.recall_id = Some(key);
        }
        for &lane in &lanes {
            if let Some(c) = self.channels.get_mut(lane) {
                c.recall_ids.push(key);
            }
        }
        if let Some(a) = self.audios.get_mut(audio) {
            a.recall_ids.push(key);
        }
        for &lane in &lanes {
            if let Some(recycling) = self.channels.get(lane).map(|c| c.recycling()) {
                self.create_audio_signal_with_defaults(recycling, key, note)?;
            }
        }

        let containers = self
            .audios
            .get(audio)
            .map(|a| a.containers.clone())
            .unwrap_or_default();
        for container in containers {
            let Some(c) = self.containers.get(container) else {
                continue;
            };
            let mut templates: Vec<(RecallKey, ChannelId)> = Vec::new();
            templates.extend(c.audio_run().map(|t| (t, channel)));
            templates.extend(lanes.iter().filter_map(|&l| c.channel_run(l).map(|t| (t, l))));
            for (template, lane) in templates {
                let able = self
                    .recalls
                    .get(template)
                    .is_some_and(|t| t.info().ability.contains(scope));
                if able {
                    self.duplicate_recall(template, key, lane)?;
                }
            }
        }

        for &lane in &lanes {
            let upstream = self
                .channels
                .get(lane)
                .filter(|c| c.direction() == Direction::Input)
                .and_then(|c| c.link());
            if let Some(upstream) = upstream {
                let child = self.start_run(upstream, scope, note, context, nested)?;
                nested.insert(0, child);
            }
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioSpec;
    use crate::recall::prototype::PassThrough;
    use crate::recall::{ContainerSpec, RecallPrototype};
    use crate::settings::EngineSettings;

    fn engine() -> EngineContext {
        EngineContext::new(EngineSettings::default()).0
    }

    fn chain() -> ContainerSpec {
        ContainerSpec::new("fx").with_signal(RecallPrototype::of("leaf", PassThrough))
    }

    #[test]
    fn start_duplicates_channel_run_tree() {
        let engine = engine();
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a").with_output_pads(2));
        let fx = graph.add_container(audio, chain()).unwrap();
        let out = graph.audio(audio).unwrap().outputs()[0];
        let report = graph
            .start_channel(&engine, StartRequest::new(out, SoundScope::Playback))
            .unwrap();
        assert!(report.wiring.is_empty());
        let id = graph.recall_id(report.recall_id).unwrap();
        assert_eq!(id.recalls().len(), 3);
        assert_eq!(id.roots().len(), 1);
        assert_eq!(id.signals().len(), 1);
        assert_eq!(graph.container(fx).unwrap().duplicates().len(), 1);
        let template = graph.container(fx).unwrap().channel_run(out).unwrap();
        assert_eq!(graph.duplicates_of(template), 1);

        let leaf = id.recalls()[2];
        let signal = id.signals()[0];
        assert_eq!(graph.recall(leaf).unwrap().binding(), Binding::Signal(signal));
    }

    #[test]
    fn ability_filters_templates() {
        let engine = engine();
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a"));
        let only_wave = RecallPrototype::of("leaf", PassThrough)
            .with_ability(crate::sound::ScopeSet::of(SoundScope::Wave));
        graph
            .add_container(audio, ContainerSpec::new("fx").with_signal(only_wave))
            .unwrap();
        let out = graph.audio(audio).unwrap().outputs()[0];
        let report = graph
            .start_channel(&engine, StartRequest::new(out, SoundScope::Playback))
            .unwrap();
        assert!(graph.recall_id(report.recall_id).unwrap().recalls().is_empty());
    }

    #[test]
    fn defaults_to_input_covers_matching_inputs() {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(
            AudioSpec::new("synth")
                .with_audio_channels(2)
                .with_input_pads(3)
                .with_behaviour(AudioBehaviour::DEFAULTS_TO_INPUT),
        );
        let out = graph.audio(audio).unwrap().outputs()[1];
        let lanes = graph.run_lanes(out);
        let inputs = graph.audio(audio).unwrap().inputs().to_vec();
        assert_eq!(lanes, vec![out, inputs[1], inputs[3], inputs[5]]);
    }

    #[test]
    fn duplicating_a_duplicate_is_rejected() {
        let engine = engine();
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a"));
        graph.add_container(audio, chain()).unwrap();
        let out = graph.audio(audio).unwrap().outputs()[0];
        let report = graph
            .start_channel(&engine, StartRequest::new(out, SoundScope::Playback))
            .unwrap();
        let root = graph.recall_id(report.recall_id).unwrap().roots()[0];
        let err = graph.duplicate_recall(root, report.recall_id, out).unwrap_err();
        assert!(matches!(err, EngineError::Wiring(WiringError::MissingTemplate { .. })));
    }

    #[test]
    fn linked_input_starts_nested_run() {
        let engine = engine();
        let mut graph = AudioGraph::default();
        let source = graph.add_audio(AudioSpec::new("source"));
        let mixer = graph.add_audio(
            AudioSpec::new("mixer")
                .with_input_pads(1)
                .with_behaviour(AudioBehaviour::DEFAULTS_TO_INPUT),
        );
        let src_out = graph.audio(source).unwrap().outputs()[0];
        let mix_in = graph.audio(mixer).unwrap().inputs()[0];
        let mix_out = graph.audio(mixer).unwrap().outputs()[0];
        graph.link_channels(src_out, mix_in).unwrap();

        let report = graph
            .start_channel(&engine, StartRequest::new(mix_out, SoundScope::Playback))
            .unwrap();
        assert_eq!(report.nested.len(), 1);
        let child = graph.recall_id(report.nested[0]).unwrap();
        assert_eq!(graph.context(child.context()).unwrap().parent(), Some(report.context));
        assert_eq!(child.anchor(), src_out);
        let top: Vec<_> = graph.top_level_recall_ids(src_out, SoundScope::Playback).collect();
        assert!(top.is_empty());
    }
}
