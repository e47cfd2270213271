//! Declarative descriptions of what a recall container instantiates.

use core::fmt;
use std::sync::Arc;

use crate::port::PortDescriptor;
use crate::sound::{Direction, ScopeSet};

use super::{RecallBehavior, RecallFlags, RecallInfo};

/// Builds a fresh behavior for a template.
pub type BehaviorFactory = Arc<dyn Fn() -> Box<dyn RecallBehavior> + Send + Sync>;

/// Template recall description, with optional child templates.
///
/// Children of a channel-run prototype become recycling-layer templates,
/// and their children become audio-signal templates.
#[derive(Clone)]
pub struct RecallPrototype {
    info: RecallInfo,
    ports: Vec<PortDescriptor>,
    factory: BehaviorFactory,
    children: Vec<RecallPrototype>,
}

impl RecallPrototype {
    /// Prototype whose behavior is produced by `factory`.
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn RecallBehavior> + Send + Sync + 'static,
    ) -> Self {
        Self {
            info: RecallInfo::new(name),
            ports: Vec::new(),
            factory: Arc::new(factory),
            children: Vec::new(),
        }
    }

    /// Prototype that clones `behavior` for every template.
    pub fn of<B: RecallBehavior + Clone + Sync + 'static>(name: impl Into<String>, behavior: B) -> Self {
        Self::new(name, move || Box::new(behavior.clone()))
    }

    /// Channel-run prototype that forwards to one recycling recall which
    /// hosts `leaf` on the voice signal. Both wrappers become done when the
    /// leaf is done.
    pub fn signal_chain(name: impl Into<String>, leaf: RecallPrototype) -> Self {
        let name = name.into();
        let recycling = Self::of(format!("{name}-recycling"), PassThrough)
            .with_flags(RecallFlags::PROPAGATE_DONE)
            .with_ability(leaf.info.ability)
            .with_child(leaf);
        Self::of(format!("{name}-channel"), PassThrough)
            .with_flags(RecallFlags::PROPAGATE_DONE)
            .with_ability(recycling.info.ability)
            .with_child(recycling)
    }

    /// Sets the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.info.version = version.into();
        self
    }

    /// Restricts the scopes the recall runs in.
    pub fn with_ability(mut self, ability: ScopeSet) -> Self {
        self.info.ability = ability;
        self
    }

    /// Sets the flags.
    pub fn with_flags(mut self, flags: RecallFlags) -> Self {
        self.info.flags = flags;
        self
    }

    /// Adds a port.
    pub fn with_port(mut self, port: PortDescriptor) -> Self {
        self.ports.push(port);
        self
    }

    /// Adds a child template.
    pub fn with_child(mut self, child: RecallPrototype) -> Self {
        self.children.push(child);
        self
    }

    /// Metadata.
    pub fn info(&self) -> &RecallInfo {
        &self.info
    }

    /// Port descriptors.
    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    /// Child templates.
    pub fn children(&self) -> &[RecallPrototype] {
        &self.children
    }

    pub(crate) fn build(&self) -> Box<dyn RecallBehavior> {
        (self.factory)()
    }
}

impl fmt::Debug for RecallPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecallPrototype")
            .field("info", &self.info)
            .field("ports", &self.ports)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Behavior that does nothing but host children.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PassThrough;

impl RecallBehavior for PassThrough {
    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(PassThrough)
    }
}

/// Everything one effect contributes to an audio.
///
/// ```rust
/// use ags_core::recall::builtin::VolumeRecall;
/// use ags_core::{ContainerSpec, PortDescriptor, RecallPrototype};
///
/// let spec = ContainerSpec::new("volume")
///     .with_channel_port(PortDescriptor::new("muted", 0.0, 0.0, 1.0))
///     .with_signal(VolumeRecall::prototype());
/// assert!(spec.channel_run().is_some());
/// ```
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    effect: String,
    direction: Direction,
    audio_ports: Vec<PortDescriptor>,
    channel_ports: Vec<PortDescriptor>,
    audio_run: Option<RecallPrototype>,
    channel_run: Option<RecallPrototype>,
}

impl ContainerSpec {
    /// Spec for `effect`, mapped onto output channels.
    pub fn new(effect: impl Into<String>) -> Self {
        Self {
            effect: effect.into(),
            direction: Direction::Output,
            audio_ports: Vec::new(),
            channel_ports: Vec::new(),
            audio_run: None,
            channel_run: None,
        }
    }

    /// Maps the container onto channels of `direction`.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Adds a port to the shared audio recall.
    pub fn with_audio_port(mut self, port: PortDescriptor) -> Self {
        self.audio_ports.push(port);
        self
    }

    /// Adds a port to every shared channel recall.
    pub fn with_channel_port(mut self, port: PortDescriptor) -> Self {
        self.channel_ports.push(port);
        self
    }

    /// Sets the audio-run template.
    pub fn with_audio_run(mut self, prototype: RecallPrototype) -> Self {
        self.audio_run = Some(prototype);
        self
    }

    /// Sets the channel-run template.
    pub fn with_channel_run(mut self, prototype: RecallPrototype) -> Self {
        self.channel_run = Some(prototype);
        self
    }

    /// Hosts `leaf` on every voice signal of the mapped channels.
    pub fn with_signal(self, leaf: RecallPrototype) -> Self {
        let chain = RecallPrototype::signal_chain(self.effect.clone(), leaf);
        self.with_channel_run(chain)
    }

    /// Effect name.
    pub fn effect(&self) -> &str {
        &self.effect
    }

    /// Channel direction the container maps onto.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Ports of the shared audio recall.
    pub fn audio_ports(&self) -> &[PortDescriptor] {
        &self.audio_ports
    }

    /// Ports of each shared channel recall.
    pub fn channel_ports(&self) -> &[PortDescriptor] {
        &self.channel_ports
    }

    /// Audio-run template.
    pub fn audio_run(&self) -> Option<&RecallPrototype> {
        self.audio_run.as_ref()
    }

    /// Channel-run template.
    pub fn channel_run(&self) -> Option<&RecallPrototype> {
        self.channel_run.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::SoundScope;

    #[test]
    fn signal_chain_nests_leaf_two_levels_down() {
        let leaf = RecallPrototype::of("leaf", PassThrough)
            .with_ability(ScopeSet::of(SoundScope::Notation));
        let chain = RecallPrototype::signal_chain("fx", leaf);
        assert_eq!(chain.info().name, "fx-channel");
        assert_eq!(chain.children()[0].info().name, "fx-recycling");
        assert_eq!(chain.children()[0].children()[0].info().name, "leaf");
        assert!(chain.info().flags.contains(RecallFlags::PROPAGATE_DONE));
        assert!(chain.info().ability.contains(SoundScope::Notation));
        assert!(!chain.info().ability.contains(SoundScope::Playback));
    }

    #[test]
    fn spec_defaults_to_output() {
        let spec = ContainerSpec::new("x").with_direction(Direction::Input);
        assert_eq!(spec.direction(), Direction::Input);
        assert!(spec.audio_run().is_none());
        assert_eq!(ContainerSpec::new("y").direction(), Direction::Output);
    }
}
