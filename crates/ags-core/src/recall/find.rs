//! Lookup helpers over recall lists.

use crate::graph::AudioGraph;
use crate::ids::{AudioId, ContainerId, RecallKey};

use super::Binding;

impl AudioGraph {
    /// First recall in `keys` called `name`.
    pub fn find_by_name(&self, keys: &[RecallKey], name: &str) -> Option<RecallKey> {
        keys.iter()
            .copied()
            .find(|&k| self.recalls.get(k).is_some_and(|r| r.name() == name))
    }

    /// First template in `keys` called `name`.
    pub fn find_template(&self, keys: &[RecallKey], name: &str) -> Option<RecallKey> {
        keys.iter().copied().find(|&k| {
            self.recalls
                .get(k)
                .is_some_and(|r| r.is_template() && r.name() == name)
        })
    }

    /// Every recall in `keys` bound to `binding`.
    pub fn find_by_binding(&self, keys: &[RecallKey], binding: Binding) -> Vec<RecallKey> {
        keys.iter()
            .copied()
            .filter(|&k| self.recalls.get(k).is_some_and(|r| r.binding() == binding))
            .collect()
    }

    /// Container of `audio` for `effect`.
    pub fn find_by_effect(&self, audio: AudioId, effect: &str) -> Option<ContainerId> {
        self.audios.get(audio)?.containers.iter().copied().find(|&c| {
            self.containers
                .get(c)
                .is_some_and(|c| c.effect() == effect)
        })
    }

    /// `root` followed by every recall below it, depth first.
    pub fn subtree(&self, root: RecallKey) -> Vec<RecallKey> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let Some(recall) = self.recalls.get(key) else {
                continue;
            };
            out.push(key);
            stack.extend(recall.children.iter().rev().copied());
        }
        out
    }

    /// Live duplicates made from `template`.
    pub fn duplicates_of(&self, template: RecallKey) -> usize {
        self.recalls
            .iter()
            .filter(|(_, r)| r.template() == Some(template))
            .count()
    }
}

/// Returns `true` if every recall in `keys` is done or failed. Persistent
/// recalls never count as done.
pub fn is_done(graph: &AudioGraph, keys: &[RecallKey]) -> bool {
    keys.iter().all(|&k| {
        graph
            .recall(k)
            .is_none_or(|r| !r.is_persistent() && (r.is_done() || r.is_failed()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioSpec;
    use crate::recall::prototype::PassThrough;
    use crate::recall::{ContainerSpec, RecallPrototype};

    fn graph_with_fx() -> (AudioGraph, AudioId, ContainerId) {
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(AudioSpec::new("a").with_output_pads(2));
        let fx = graph
            .add_container(
                audio,
                ContainerSpec::new("echo").with_signal(RecallPrototype::of("tap", PassThrough)),
            )
            .unwrap();
        (graph, audio, fx)
    }

    #[test]
    fn effect_lookup() {
        let (graph, audio, fx) = graph_with_fx();
        assert_eq!(graph.find_by_effect(audio, "echo"), Some(fx));
        assert_eq!(graph.find_by_effect(audio, "reverb"), None);
    }

    #[test]
    fn template_lookup_by_name() {
        let (graph, _, fx) = graph_with_fx();
        let templates: Vec<_> = graph.container(fx).unwrap().templates().collect();
        assert_eq!(graph.find_template(&templates, "echo-channel"), Some(templates[0]));
        assert_eq!(graph.find_by_name(&templates, "nope"), None);
    }

    #[test]
    fn binding_lookup() {
        let (graph, audio, fx) = graph_with_fx();
        let second = graph.audio(audio).unwrap().outputs()[1];
        let templates: Vec<_> = graph.container(fx).unwrap().templates().collect();
        assert_eq!(graph.find_by_binding(&templates, Binding::Channel(second)), vec![templates[1]]);
    }

    #[test]
    fn subtree_is_preorder() {
        let (graph, audio, fx) = graph_with_fx();
        let first = graph.audio(audio).unwrap().outputs()[0];
        let root = graph.container(fx).unwrap().channel_run(first).unwrap();
        let names: Vec<_> = graph
            .subtree(root)
            .into_iter()
            .map(|k| graph.recall(k).unwrap().name().to_owned())
            .collect();
        assert_eq!(names, ["echo-channel", "echo-recycling", "tap"]);
    }

    #[test]
    fn empty_list_is_done() {
        let graph = AudioGraph::default();
        assert!(is_done(&graph, &[]));
    }
}
