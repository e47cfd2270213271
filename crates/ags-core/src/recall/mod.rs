//! The recall family: behavior units bound to one layer of the graph.
//!
//! A [`Recall`] pairs static metadata ([`RecallInfo`], shared ports) with a
//! boxed [`RecallBehavior`]. The layer a recall is bound to is a closed
//! enum ([`RecallLayer`]); what it does is open through the behavior trait.
//!
//! Recalls come in three kinds:
//!
//! - **Shared** recalls (`Audio`, `Channel` layers) belong to a container and
//!   carry the ports every run reads. They are never duplicated.
//! - **Templates** (`AudioRun`, `ChannelRun`, `Recycling`, `AudioSignal`
//!   layers without a recall id) exist only to be duplicated.
//! - **Duplicates** are owned by exactly one [`RecallId`](crate::RecallId)
//!   and hold the per-voice state of one run.
//!
//! Duplicates share their template's ports through an `Arc` and get a fresh
//! behavior from [`RecallBehavior::duplicate`], so per-voice state is never
//! shared between two runs.

mod behavior;
pub mod builtin;
mod container;
mod duplicate;
mod find;
mod prototype;

use core::fmt;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::ids::{AudioId, ChannelId, ContainerId, RecallIdKey, RecallKey, RecyclingId, SignalId};
use crate::port::PortSet;
use crate::sound::ScopeSet;

pub use behavior::{
    AsAny, InitStage, RecallBehavior, RecallError, RunOutcome, RunStage, StageContext,
};
pub use container::RecallContainer;
pub use duplicate::{StartReport, StartRequest};
pub use find::is_done;
pub use prototype::{BehaviorFactory, ContainerSpec, RecallPrototype};
pub(crate) use prototype::PassThrough;

/// Graph layer a recall is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecallLayer {
    /// Shared per-audio recall holding the container's audio ports.
    Audio,
    /// Shared per-channel recall holding the container's channel ports.
    Channel,
    /// Per-run audio behavior.
    AudioRun,
    /// Per-run channel behavior.
    ChannelRun,
    /// Per-run behavior on one recycling.
    Recycling,
    /// Leaf DSP on one audio signal.
    AudioSignal,
}

impl RecallLayer {
    /// Returns `true` for layers that are duplicated per run.
    pub const fn is_run(self) -> bool {
        !matches!(self, RecallLayer::Audio | RecallLayer::Channel)
    }
}

impl fmt::Display for RecallLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecallLayer::Audio => "audio",
            RecallLayer::Channel => "channel",
            RecallLayer::AudioRun => "audio-run",
            RecallLayer::ChannelRun => "channel-run",
            RecallLayer::Recycling => "recycling",
            RecallLayer::AudioSignal => "audio-signal",
        })
    }
}

/// Graph object a recall is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// An audio.
    Audio(AudioId),
    /// A channel.
    Channel(ChannelId),
    /// A recycling.
    Recycling(RecyclingId),
    /// An audio signal.
    Signal(SignalId),
}

/// Static behaviour flags of a recall.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RecallFlags(u8);

impl RecallFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Never counts as done; keeps its run alive.
    pub const PERSISTENT: Self = Self(1 << 0);
    /// Becomes done once all of its children are done.
    pub const PROPAGATE_DONE: Self = Self(1 << 1);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Immutable metadata shared by a template and its duplicates.
#[derive(Clone, Debug, PartialEq)]
pub struct RecallInfo {
    /// Recall name, used for dependency lookup.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Effect name of the owning container.
    pub effect: String,
    /// Scopes this recall is able to run in.
    pub ability: ScopeSet,
    /// Behaviour flags.
    pub flags: RecallFlags,
}

impl RecallInfo {
    /// Info for a recall able to run in every scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::from("0.0.0"),
            effect: String::new(),
            ability: ScopeSet::ALL,
            flags: RecallFlags::NONE,
        }
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Restricts the scopes.
    pub fn with_ability(mut self, ability: ScopeSet) -> Self {
        self.ability = ability;
        self
    }

    /// Sets the flags.
    pub fn with_flags(mut self, flags: RecallFlags) -> Self {
        self.flags = flags;
        self
    }
}

mod status {
    pub const RESOLVED: u8 = 1 << 0;
    pub const INIT_PRE: u8 = 1 << 1;
    pub const INIT_INTER: u8 = 1 << 2;
    pub const INIT_POST: u8 = 1 << 3;
    pub const DONE: u8 = 1 << 4;
    pub const FAILED: u8 = 1 << 5;
}

/// One behavior unit in the graph.
pub struct Recall {
    info: Arc<RecallInfo>,
    layer: RecallLayer,
    binding: Binding,
    container: Option<ContainerId>,
    recall_id: Option<RecallIdKey>,
    template: Option<RecallKey>,
    pub(crate) parent: Option<RecallKey>,
    pub(crate) children: Vec<RecallKey>,
    ports: Arc<PortSet>,
    status: AtomicU8,
    behavior: Mutex<Box<dyn RecallBehavior>>,
}

impl Recall {
    pub(crate) fn new(
        info: Arc<RecallInfo>,
        layer: RecallLayer,
        binding: Binding,
        ports: Arc<PortSet>,
        behavior: Box<dyn RecallBehavior>,
    ) -> Self {
        Self {
            info,
            layer,
            binding,
            container: None,
            recall_id: None,
            template: None,
            parent: None,
            children: Vec::new(),
            ports,
            status: AtomicU8::new(0),
            behavior: Mutex::new(behavior),
        }
    }

    pub(crate) fn in_container(mut self, container: ContainerId) -> Self {
        self.container = Some(container);
        self
    }

    /// Builds the duplicate of `self` for `recall_id`, bound to `binding`.
    pub(crate) fn duplicate_for(
        &self,
        source: RecallKey,
        recall_id: RecallIdKey,
        binding: Binding,
    ) -> Self {
        let behavior = self.behavior.lock().duplicate();
        Self {
            info: Arc::clone(&self.info),
            layer: self.layer,
            binding,
            container: self.container,
            recall_id: Some(recall_id),
            template: Some(source),
            parent: None,
            children: Vec::new(),
            ports: Arc::clone(&self.ports),
            status: AtomicU8::new(0),
            behavior: Mutex::new(behavior),
        }
    }

    /// Shared metadata.
    pub fn info(&self) -> &RecallInfo {
        &self.info
    }

    /// Recall name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Bound layer.
    pub fn layer(&self) -> RecallLayer {
        self.layer
    }

    /// Bound graph object.
    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// Owning container.
    pub fn container(&self) -> Option<ContainerId> {
        self.container
    }

    /// Run owning this duplicate. `None` for templates and shared recalls.
    pub fn recall_id(&self) -> Option<RecallIdKey> {
        self.recall_id
    }

    /// Template this duplicate was made from.
    pub fn template(&self) -> Option<RecallKey> {
        self.template
    }

    /// Returns `true` for run-layer recalls without a recall id.
    pub fn is_template(&self) -> bool {
        self.recall_id.is_none() && self.layer.is_run()
    }

    /// Parent recall.
    pub fn parent(&self) -> Option<RecallKey> {
        self.parent
    }

    /// Child recalls in registration order.
    pub fn children(&self) -> &[RecallKey] {
        &self.children
    }

    /// Ports shared with the template.
    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    pub(crate) fn shared_ports(&self) -> Arc<PortSet> {
        Arc::clone(&self.ports)
    }

    fn has(&self, bit: u8) -> bool {
        self.status.load(Ordering::Acquire) & bit != 0
    }

    fn set(&self, bit: u8) {
        self.status.fetch_or(bit, Ordering::AcqRel);
    }

    /// Returns `true` once resolve succeeded.
    pub fn is_resolved(&self) -> bool {
        self.has(status::RESOLVED)
    }

    pub(crate) fn mark_resolved(&self) {
        self.set(status::RESOLVED);
    }

    /// Returns `true` once `init(stage)` succeeded.
    pub fn is_initialized(&self, stage: InitStage) -> bool {
        self.has(init_bit(stage))
    }

    pub(crate) fn mark_initialized(&self, stage: InitStage) {
        self.set(init_bit(stage));
    }

    /// Returns `true` once the recall finished on its own.
    pub fn is_done(&self) -> bool {
        self.has(status::DONE)
    }

    pub(crate) fn mark_done(&self) {
        self.set(status::DONE);
    }

    /// Returns `true` if the recall was excluded after a wiring error.
    pub fn is_failed(&self) -> bool {
        self.has(status::FAILED)
    }

    pub(crate) fn mark_failed(&self) {
        self.set(status::FAILED);
    }

    /// Returns `true` if the recall keeps its run alive.
    pub fn is_persistent(&self) -> bool {
        self.info.flags.contains(RecallFlags::PERSISTENT)
    }

    pub(crate) fn with_behavior<R>(&self, f: impl FnOnce(&mut dyn RecallBehavior) -> R) -> R {
        let mut guard = self.behavior.lock();
        f(&mut **guard)
    }

    /// Runs `f` on the behavior if it is a `T`.
    pub fn inspect<T: RecallBehavior + 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.behavior.lock();
        let behavior: &dyn RecallBehavior = &**guard;
        let any: &dyn Any = behavior.as_any();
        any.downcast_ref::<T>().map(f)
    }
}

fn init_bit(stage: InitStage) -> u8 {
    match stage {
        InitStage::Pre => status::INIT_PRE,
        InitStage::Inter => status::INIT_INTER,
        InitStage::Post => status::INIT_POST,
    }
}

impl fmt::Debug for Recall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recall")
            .field("name", &self.info.name)
            .field("layer", &self.layer)
            .field("binding", &self.binding)
            .field("recall_id", &self.recall_id)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
