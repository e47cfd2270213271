//! The behavior trait and the context handed to every staging call.

use std::any::Any;

use thiserror::Error;

use crate::engine::{EngineContext, OutputBus};
use crate::fault::Fault;
use crate::graph::AudioGraph;
use crate::ids::{AudioId, ChannelId, RecallIdKey, RecallKey};
use crate::note::Note;
use crate::port::PortSet;
use crate::recall_id::{RecallId, StagingState};
use crate::signal::AudioSignal;
use crate::sound::SoundScope;
use crate::task::Task;

use super::{Binding, Recall, RecallLayer};

/// Init sub-stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InitStage {
    /// First init pass.
    Pre,
    /// Second init pass.
    Inter,
    /// Last init pass.
    Post,
}

impl InitStage {
    /// Stages in execution order.
    pub const ALL: [InitStage; 3] = [InitStage::Pre, InitStage::Inter, InitStage::Post];

    /// Staging state reached once every recall finished this stage.
    pub const fn done_state(self) -> StagingState {
        match self {
            InitStage::Pre => StagingState::InitPreDone,
            InitStage::Inter => StagingState::InitInterDone,
            InitStage::Post => StagingState::InitPostDone,
        }
    }
}

/// Run sub-stage, executed once per tick in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunStage {
    /// Produce.
    Pre,
    /// Process.
    Inter,
    /// Deliver.
    Post,
}

impl RunStage {
    /// Stages in execution order.
    pub const ALL: [RunStage; 3] = [RunStage::Pre, RunStage::Inter, RunStage::Post];

    /// Bit used to track completed stages within a tick.
    #[inline]
    pub const fn bit(self) -> u8 {
        match self {
            RunStage::Pre => 1 << 0,
            RunStage::Inter => 1 << 1,
            RunStage::Post => 1 << 2,
        }
    }
}

/// Result of one run call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// Keep running next tick.
    #[default]
    Continue,
    /// Finished; skip this recall for the rest of the run.
    Done,
}

/// Error returned from `resolve` or `init`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecallError {
    /// A dependency is not available yet; resolve is retried.
    #[error("dependency not ready: {0}")]
    Dependency(String),

    /// Permanent failure; the recall is excluded from the run.
    #[error("{0}")]
    Failed(String),
}

/// Downcast support for boxed behaviors.
pub trait AsAny: Any {
    /// `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What a recall does at each staging step.
///
/// Only [`duplicate`](Self::duplicate) is required. `run` is called on the
/// real-time path and must not block, allocate in steady state, or take more
/// than one lock at a time.
pub trait RecallBehavior: AsAny + Send {
    /// Binds external references. Return [`RecallError::Dependency`] to be
    /// retried in the next resolve pass.
    fn resolve(&mut self, cx: &StageContext<'_>) -> Result<(), RecallError> {
        let _ = cx;
        Ok(())
    }

    /// Allocates per-run resources for `stage`. Called at most once per stage.
    fn init(&mut self, stage: InitStage, cx: &StageContext<'_>) -> Result<(), RecallError> {
        let _ = (stage, cx);
        Ok(())
    }

    /// Real-time callback.
    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        let _ = (stage, cx);
        RunOutcome::Continue
    }

    /// Orderly stop. No run call follows.
    fn cancel(&mut self, cx: &StageContext<'_>) {
        let _ = cx;
    }

    /// Fresh per-voice state sharing this behavior's configuration.
    fn duplicate(&self) -> Box<dyn RecallBehavior>;
}

/// View of the engine handed to a behavior for one staging call.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    graph: &'a AudioGraph,
    engine: &'a EngineContext,
    recall: RecallKey,
    recall_id: RecallIdKey,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        graph: &'a AudioGraph,
        engine: &'a EngineContext,
        recall: RecallKey,
        recall_id: RecallIdKey,
    ) -> Self {
        Self {
            graph,
            engine,
            recall,
            recall_id,
        }
    }

    /// The graph, read-only.
    pub fn graph(&self) -> &'a AudioGraph {
        self.graph
    }

    /// Engine services.
    pub fn engine(&self) -> &'a EngineContext {
        self.engine
    }

    /// Handle of the recall being staged.
    pub fn recall_key(&self) -> RecallKey {
        self.recall
    }

    /// Handle of its run.
    pub fn recall_id_key(&self) -> RecallIdKey {
        self.recall_id
    }

    /// The recall being staged.
    pub fn recall(&self) -> Option<&'a Recall> {
        self.graph.recall(self.recall)
    }

    /// Its run.
    pub fn recall_id(&self) -> Option<&'a RecallId> {
        self.graph.recall_id(self.recall_id)
    }

    /// Scope of the run.
    pub fn scope(&self) -> Option<SoundScope> {
        self.recall_id().map(RecallId::scope)
    }

    /// Current tick.
    pub fn tick(&self) -> u64 {
        self.engine.clock().tick()
    }

    /// Bound graph object.
    pub fn binding(&self) -> Option<Binding> {
        self.recall().map(Recall::binding)
    }

    /// Ports shared with the template.
    pub fn ports(&self) -> Option<&'a PortSet> {
        self.recall().map(Recall::ports)
    }

    /// Value of the port called `name`.
    pub fn port(&self, name: &str) -> Option<f32> {
        self.ports()?.get(name)
    }

    /// Bound audio signal, for signal-layer recalls.
    pub fn signal(&self) -> Option<&'a AudioSignal> {
        match self.binding()? {
            Binding::Signal(id) => self.graph.signal(id),
            _ => None,
        }
    }

    /// Channel the recall is bound to, directly or through its recycling.
    pub fn channel(&self) -> Option<ChannelId> {
        match self.binding()? {
            Binding::Audio(_) => None,
            Binding::Channel(id) => Some(id),
            Binding::Recycling(id) => self.graph.recycling(id).map(|r| r.channel()),
            Binding::Signal(id) => {
                let recycling = self.graph.signal(id)?.recycling();
                self.graph.recycling(recycling).map(|r| r.channel())
            }
        }
    }

    /// Audio the recall works on.
    pub fn audio(&self) -> Option<AudioId> {
        match self.binding()? {
            Binding::Audio(id) => Some(id),
            _ => self.channel().and_then(|c| self.graph.channel(c)).map(|c| c.audio()),
        }
    }

    /// Note of the bound signal, or of the run's first voice.
    pub fn note(&self) -> Option<Note> {
        if let Some(note) = self.signal().and_then(AudioSignal::note) {
            return Some(note);
        }
        self.recall_id()?
            .signals()
            .iter()
            .find_map(|&s| self.graph.signal(s).and_then(AudioSignal::note))
    }

    /// Shared recall of the owning container on `layer` (`Audio` or
    /// `Channel`), holding the container's ports.
    pub fn shared_recall(&self, layer: RecallLayer) -> Option<&'a Recall> {
        let container = self.graph.container(self.recall()?.container()?)?;
        let key = match layer {
            RecallLayer::Audio => Some(container.recall_audio()),
            RecallLayer::Channel => container.channel_recall(self.channel()?),
            _ => None,
        }?;
        self.graph.recall(key)
    }

    /// Sibling in the same run called `name`, once it is resolved.
    pub fn require(&self, name: &str) -> Result<RecallKey, RecallError> {
        let id = self
            .recall_id()
            .ok_or_else(|| RecallError::Failed(format!("{} is gone", self.recall_id)))?;
        let found = id.recalls().iter().copied().find(|&key| {
            key != self.recall && self.graph.recall(key).is_some_and(|r| r.name() == name)
        });
        let Some(key) = found else {
            return Err(RecallError::Dependency(format!("{name} not present")));
        };
        let Some(recall) = self.graph.recall(key) else {
            return Err(RecallError::Dependency(format!("{name} not present")));
        };
        if recall.is_failed() {
            return Err(RecallError::Failed(format!("dependency {name} failed")));
        }
        if !recall.is_resolved() {
            return Err(RecallError::Dependency(format!("{name} not resolved")));
        }
        Ok(key)
    }

    /// Voice of a nested run in the recycling linked upstream of the bound
    /// signal's recycling.
    pub fn upstream_signal(&self) -> Option<&'a AudioSignal> {
        let recycling = self.signal()?.recycling();
        let upstream = self.graph.recycling(recycling)?.parent()?;
        let context = self.recall_id()?.context();
        self.graph
            .child_recall_ids(context)
            .into_iter()
            .find_map(|child| self.graph.find_signal_by_recall_id(upstream, child))
            .and_then(|s| self.graph.signal(s))
    }

    /// Queues a task for the task launcher. Never blocks.
    pub fn submit(&self, task: impl Task) {
        self.engine.tasks().post(task);
    }

    /// Requests cancel of the run. Takes effect at the top of the next tick.
    pub fn cancel_run(&self) {
        if let Some(id) = self.recall_id() {
            id.request_cancel();
        }
    }

    /// Records a runtime fault.
    pub fn record(&self, fault: Fault) {
        self.engine.faults().record(fault);
    }

    /// Output bus presented to the soundcard at the end of the tick.
    pub fn bus(&self) -> &'a OutputBus {
        self.engine.bus()
    }
}
