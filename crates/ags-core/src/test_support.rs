//! Behaviors and fixtures shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::EngineContext;
use crate::graph::{AudioGraph, AudioSpec};
use crate::ids::{AudioId, ChannelId, ContainerId};
use crate::recall::{
    ContainerSpec, InitStage, RecallBehavior, RecallError, RecallPrototype, RunOutcome, RunStage,
    StageContext,
};
use crate::settings::EngineSettings;
use crate::task::TaskReceiver;

/// Call counters shared by a template and every duplicate made from it.
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub resolve: AtomicUsize,
    pub init: [AtomicUsize; 3],
    pub run: [AtomicUsize; 3],
    pub cancel: AtomicUsize,
}

impl Calls {
    pub fn runs(&self, stage: RunStage) -> usize {
        self.run[stage as usize].load(Ordering::SeqCst)
    }

    pub fn total_runs(&self) -> usize {
        RunStage::ALL.iter().map(|&s| self.runs(s)).sum()
    }

    pub fn inits(&self, stage: InitStage) -> usize {
        self.init[stage as usize].load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Recording behavior with a little scripted logic.
#[derive(Clone, Debug, Default)]
pub(crate) struct Probe {
    pub calls: Arc<Calls>,
    /// Sibling that must resolve first.
    pub requires: Option<&'static str>,
    /// Refuse to resolve.
    pub reject: bool,
    /// Fail `init(inter)`.
    pub fail_init: bool,
    /// Return `Done` after this many ticks.
    pub finish_after: Option<u64>,
    /// Request cancel of the run from this stage.
    pub cancel_in: Option<RunStage>,
    /// Per-voice tick count.
    pub ticks: u64,
}

impl Probe {
    pub fn new() -> (Self, Arc<Calls>) {
        let probe = Self::default();
        let calls = Arc::clone(&probe.calls);
        (probe, calls)
    }
}

impl RecallBehavior for Probe {
    fn resolve(&mut self, cx: &StageContext<'_>) -> Result<(), RecallError> {
        self.calls.resolve.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(RecallError::Failed("refused".into()));
        }
        if let Some(name) = self.requires {
            cx.require(name)?;
        }
        Ok(())
    }

    fn init(&mut self, stage: InitStage, _cx: &StageContext<'_>) -> Result<(), RecallError> {
        self.calls.init[stage as usize].fetch_add(1, Ordering::SeqCst);
        if self.fail_init && stage == InitStage::Inter {
            return Err(RecallError::Failed("no memory".into()));
        }
        Ok(())
    }

    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        self.calls.run[stage as usize].fetch_add(1, Ordering::SeqCst);
        if self.cancel_in == Some(stage) {
            cx.cancel_run();
        }
        if stage == RunStage::Post {
            self.ticks += 1;
            if self.finish_after.is_some_and(|n| self.ticks >= n) {
                return RunOutcome::Done;
            }
        }
        RunOutcome::Continue
    }

    fn cancel(&mut self, _cx: &StageContext<'_>) {
        self.calls.cancel.fetch_add(1, Ordering::SeqCst);
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(Self {
            ticks: 0,
            ..self.clone()
        })
    }
}

pub(crate) fn engine() -> (EngineContext, TaskReceiver) {
    EngineContext::new(EngineSettings::default())
}

/// Graph with one audio of `outputs` output pads and a container hosting
/// `leaf` on every voice signal.
pub(crate) fn graph_with_leaf(
    outputs: usize,
    leaf: RecallPrototype,
) -> (AudioGraph, AudioId, ContainerId, Vec<ChannelId>) {
    let mut graph = AudioGraph::default();
    let audio = graph.add_audio(AudioSpec::new("a").with_output_pads(outputs));
    let fx = graph
        .add_container(audio, ContainerSpec::new("fx").with_signal(leaf))
        .expect("container");
    let outs = graph.audio(audio).expect("audio").outputs().to_vec();
    (graph, audio, fx, outs)
}
