//! The staging protocol: resolve, init, run, cancel and remove.
//!
//! Staging works per [`RecallId`](crate::RecallId) and is driven from two
//! places:
//!
//! - **Startup** (`&self`, on the task launcher): [`AudioGraph::stage_tree`]
//!   resolves and initializes a freshly started run and its nested runs.
//! - **The tick** (`&self`, on the audio loop or a channel thread):
//!   [`AudioGraph::process_tick`] runs every ready recall id through the
//!   pre, inter and post stages.
//!
//! Removal needs `&mut AudioGraph` and therefore only happens between ticks,
//! through the [`RemoveRecallId`](crate::tasks::RemoveRecallId) task the
//! tick posts once a cancel has completed.
//!
//! # Cancellation
//!
//! [`AudioGraph::cancel_recall_id`] only raises a flag. The next tick
//! observes it before entering any run stage, calls `cancel` on every
//! behavior of the run (nested runs first), moves staging to `Cancelled` and
//! queues the removal. A tick that is already past its check runs to the end
//! of its post stage.

use std::ops::AddAssign;
use std::time::Instant;

use crate::engine::EngineContext;
use crate::error::{EngineError, StagingError, WiringError};
use crate::fault::Fault;
use crate::graph::AudioGraph;
use crate::ids::{ChannelId, RecallIdKey, RecallKey};
use crate::recall::{
    Binding, InitStage, RecallError, RecallFlags, RunOutcome, RunStage, StageContext, is_done,
};
use crate::recall_id::{RunState, StagingState};
use crate::sound::{Direction, SoundScope};
use crate::tasks::RemoveRecallId;

/// What one processing pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Recall ids that went through the run stages.
    pub recall_ids: usize,
    /// Run calls made.
    pub recalls: usize,
    /// Recall ids whose cancel completed.
    pub cancelled: usize,
    /// Recall ids that finished on their own.
    pub finished: usize,
}

impl AddAssign for TickSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.recall_ids += rhs.recall_ids;
        self.recalls += rhs.recalls;
        self.cancelled += rhs.cancelled;
        self.finished += rhs.finished;
    }
}

impl AudioGraph {
    /// Resolves every pending recall of `rid`.
    ///
    /// A recall reporting [`RecallError::Dependency`] is retried in the next
    /// pass. Passes are bounded by the engine's
    /// [`ResolvePasses`](crate::ResolvePasses) and stop early once a pass
    /// makes no progress; whatever is still pending then is marked failed.
    /// Wiring errors exclude single recalls and are returned, the run itself
    /// reaches `Resolved` regardless.
    pub fn resolve(
        &self,
        engine: &EngineContext,
        rid: RecallIdKey,
    ) -> Result<Vec<WiringError>, StagingError> {
        let id = self
            .recall_ids
            .get(rid)
            .ok_or(StagingError::UnknownRecallId(rid))?;
        if id.staging() >= StagingState::Resolved {
            return Ok(Vec::new());
        }

        let mut errors = Vec::new();
        let mut pending: Vec<(RecallKey, String)> = id
            .recalls
            .iter()
            .copied()
            .filter(|&k| {
                self.recalls
                    .get(k)
                    .is_some_and(|r| !r.is_resolved() && !r.is_failed())
            })
            .map(|k| (k, String::new()))
            .collect();
        let bound = engine.settings().resolve_passes.bound(id.recalls.len());
        let mut passes = 0;

        while !pending.is_empty() && passes < bound {
            passes += 1;
            let before = pending.len();
            let mut retry = Vec::new();
            for (key, _) in pending {
                let Some(recall) = self.recalls.get(key) else {
                    continue;
                };
                if recall.is_failed() {
                    continue;
                }
                let cx = StageContext::new(self, engine, key, rid);
                match recall.with_behavior(|b| b.resolve(&cx)) {
                    Ok(()) => recall.mark_resolved(),
                    Err(RecallError::Dependency(reason)) => retry.push((key, reason)),
                    Err(RecallError::Failed(reason)) => {
                        self.fail_subtree(key);
                        errors.push(WiringError::Rejected {
                            recall: key,
                            name: recall.name().to_owned(),
                            reason,
                        });
                    }
                }
            }
            let progressed = retry.len() < before;
            pending = retry;
            if !progressed {
                break;
            }
        }

        for (key, reason) in pending {
            let Some(recall) = self.recalls.get(key) else {
                continue;
            };
            if recall.is_failed() {
                continue;
            }
            self.fail_subtree(key);
            errors.push(WiringError::Unresolved {
                recall: key,
                name: recall.name().to_owned(),
                passes,
                reason,
            });
        }

        id.transition(StagingState::Resolved)?;
        tracing::trace!("staging: {rid} resolved in {passes} pass(es)");
        Ok(errors)
    }

    /// Runs `init(stage)` on every live recall of `rid`.
    ///
    /// Idempotent: once `rid` reached the stage's done state this returns
    /// without calling any behavior. Calling a stage before its predecessor
    /// finished is an [`StagingError::IllegalTransition`].
    pub fn init(
        &self,
        engine: &EngineContext,
        rid: RecallIdKey,
        stage: InitStage,
    ) -> Result<Vec<WiringError>, StagingError> {
        let id = self
            .recall_ids
            .get(rid)
            .ok_or(StagingError::UnknownRecallId(rid))?;
        let target = stage.done_state();
        let current = id.staging();
        if current >= target {
            return Ok(Vec::new());
        }
        if current.next() != Some(target) {
            return Err(StagingError::IllegalTransition {
                recall_id: rid,
                from: current,
                to: target,
            });
        }

        let mut errors = Vec::new();
        for &key in &id.recalls {
            let Some(recall) = self.recalls.get(key) else {
                continue;
            };
            if recall.is_failed() || recall.is_initialized(stage) {
                continue;
            }
            let cx = StageContext::new(self, engine, key, rid);
            match recall.with_behavior(|b| b.init(stage, &cx)) {
                Ok(()) => recall.mark_initialized(stage),
                Err(e) => {
                    self.fail_subtree(key);
                    errors.push(WiringError::InitFailed {
                        recall: key,
                        name: recall.name().to_owned(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        id.transition(target)?;
        Ok(errors)
    }

    /// Stages `rid` and its nested runs up to `InitPostDone`, nested runs
    /// first.
    pub fn stage_tree(
        &self,
        engine: &EngineContext,
        rid: RecallIdKey,
    ) -> Result<Vec<WiringError>, StagingError> {
        let context = self
            .recall_ids
            .get(rid)
            .ok_or(StagingError::UnknownRecallId(rid))?
            .context();
        let mut errors = Vec::new();
        for child in self.child_recall_ids(context) {
            errors.extend(self.stage_tree(engine, child)?);
        }
        errors.extend(self.resolve(engine, rid)?);
        for stage in InitStage::ALL {
            errors.extend(self.init(engine, rid, stage)?);
        }
        Ok(errors)
    }

    fn fail_subtree(&self, root: RecallKey) {
        for key in self.subtree(root) {
            if let Some(recall) = self.recalls.get(key) {
                recall.mark_failed();
            }
        }
    }

    /// Requests cancel of `rid` and every run nested below it.
    ///
    /// Takes effect at the top of the next tick.
    pub fn cancel_recall_id(&self, rid: RecallIdKey) -> Result<(), StagingError> {
        let id = self
            .recall_ids
            .get(rid)
            .ok_or(StagingError::UnknownRecallId(rid))?;
        id.request_cancel();
        for child in self.child_recall_ids(id.context()) {
            self.cancel_recall_id(child)?;
        }
        Ok(())
    }

    /// Completes a requested cancel: nested runs first, then `rid`.
    fn complete_cancel(&self, engine: &EngineContext, rid: RecallIdKey) {
        let Some(id) = self.recall_ids.get(rid) else {
            return;
        };
        for child in self.child_recall_ids(id.context()) {
            if let Some(c) = self.recall_ids.get(child) {
                c.request_cancel();
            }
            self.complete_cancel(engine, child);
        }
        if !matches!(id.transition(StagingState::Cancelled), Ok(true)) {
            return;
        }
        id.advance_run_state(RunState::Removing);
        for &key in &id.recalls {
            let Some(recall) = self.recalls.get(key) else {
                continue;
            };
            if recall.is_failed() {
                continue;
            }
            let cx = StageContext::new(self, engine, key, rid);
            recall.with_behavior(|b| b.cancel(&cx));
        }
        tracing::debug!("staging: {rid} cancelled");
    }

    /// Detaches and frees `rid`, its nested runs, their duplicates, voice
    /// signals and contexts. Returns the recalls released.
    ///
    /// Every run in the tree must have completed its cancel; otherwise
    /// nothing is removed.
    pub fn remove_recall_id(&mut self, rid: RecallIdKey) -> Result<usize, EngineError> {
        let tree = self.recall_id_tree(rid);
        if tree.is_empty() {
            return Err(StagingError::UnknownRecallId(rid).into());
        }
        for &key in &tree {
            let state = self
                .recall_ids
                .get(key)
                .map_or(StagingState::Removed, |id| id.staging());
            if state != StagingState::Cancelled {
                return Err(StagingError::NotCancelled {
                    recall_id: key,
                    state,
                }
                .into());
            }
        }
        let released = tree.into_iter().map(|key| self.detach_recall_id(key)).sum();
        tracing::debug!("staging: {rid} removed, {released} recall(s) released");
        Ok(released)
    }

    /// `rid` and its nested runs, children before parents.
    fn recall_id_tree(&self, rid: RecallIdKey) -> Vec<RecallIdKey> {
        let Some(id) = self.recall_ids.get(rid) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for child in self.child_recall_ids(id.context()) {
            out.extend(self.recall_id_tree(child));
        }
        out.push(rid);
        out
    }

    fn detach_recall_id(&mut self, rid: RecallIdKey) -> usize {
        let Some(id) = self.recall_ids.get(rid) else {
            return 0;
        };
        let roots = id.roots.clone();
        let signals = id.signals.clone();
        let channels = id.channels.clone();
        let audio = id.audio();
        let context = id.context();

        let mut released = 0;
        for root in roots {
            released += self.release_tree(root);
        }
        for signal in signals {
            self.remove_audio_signal(signal);
        }
        for channel in channels {
            if let Some(c) = self.channels.get_mut(channel) {
                c.recall_ids.retain(|&k| k != rid);
            }
        }
        if let Some(a) = self.audios.get_mut(audio) {
            a.recall_ids.retain(|&k| k != rid);
        }
        if let Some(c) = self.contexts.get_mut(context) {
            c.recall_id = None;
        }
        if let Err(e) = self.remove_context(context) {
            tracing::warn!("staging: {rid} left {context} behind: {e}");
        }
        if let Some(id) = self.recall_ids.remove(rid)
            && let Err(e) = id.transition(StagingState::Removed)
        {
            tracing::warn!("staging: {e}");
        }
        released
    }

    /// Runs one tick over every top-level recall id: scopes in order, then
    /// audios in creation order, outputs before inputs.
    pub fn process_tick(&self, engine: &EngineContext) -> TickSummary {
        let mut summary = TickSummary::default();
        let channels = self.processing_order();
        for scope in SoundScope::ALL {
            for &channel in &channels {
                summary += self.run_channel(engine, channel, scope);
            }
        }
        summary
    }

    /// Silences the output bus, processes one tick and advances the clock.
    pub fn tick(&self, engine: &EngineContext) -> TickSummary {
        engine.bus().clear();
        let summary = self.process_tick(engine);
        engine.clock().advance();
        summary
    }

    /// Channels of every audio in processing order.
    pub fn processing_order(&self) -> Vec<ChannelId> {
        let mut out = Vec::with_capacity(self.channels.len());
        for &audio in &self.audio_order {
            let Some(a) = self.audios.get(audio) else {
                continue;
            };
            out.extend_from_slice(a.channels(Direction::Output));
            out.extend_from_slice(a.channels(Direction::Input));
        }
        out
    }

    /// Runs the top-level recall ids of `scope` anchored on `channel`.
    ///
    /// This is the unit of work a super-threaded channel takes over.
    pub fn run_channel(
        &self,
        engine: &EngineContext,
        channel: ChannelId,
        scope: SoundScope,
    ) -> TickSummary {
        let mut summary = TickSummary::default();
        for rid in self.top_level_recall_ids(channel, scope) {
            summary += self.run_tick(engine, rid);
        }
        summary
    }

    /// Runs one tick of `rid` and its nested runs.
    ///
    /// Nested runs go through each stage before their parent, and the whole
    /// tree finishes its post stage before this returns.
    pub fn run_tick(&self, engine: &EngineContext, rid: RecallIdKey) -> TickSummary {
        let mut summary = TickSummary::default();
        let mut active = Vec::new();
        self.collect_active(engine, rid, &mut active, &mut summary);

        for stage in RunStage::ALL {
            for &key in &active {
                let Some(id) = self.recall_ids.get(key) else {
                    continue;
                };
                for &root in &id.roots {
                    self.run_recall(engine, key, root, stage, &mut summary);
                }
                id.finish_stage(stage);
            }
        }
        for &key in &active {
            self.finish_tick(key, &mut summary);
        }
        summary.recall_ids += active.len();
        summary
    }

    /// Handles pending cancels and collects the runs that enter the stages
    /// this tick, nested runs before their parent.
    fn collect_active(
        &self,
        engine: &EngineContext,
        rid: RecallIdKey,
        out: &mut Vec<RecallIdKey>,
        summary: &mut TickSummary,
    ) {
        let Some(id) = self.recall_ids.get(rid) else {
            return;
        };
        if id.staging() >= StagingState::Cancelled {
            return;
        }
        if id.is_cancel_requested() {
            self.complete_cancel(engine, rid);
            engine.tasks().post(RemoveRecallId::new(rid));
            summary.cancelled += 1;
            return;
        }
        match id.staging() {
            StagingState::Running => {}
            StagingState::InitPostDone => {
                if id.transition(StagingState::Running).is_err() {
                    return;
                }
            }
            _ => return,
        }
        id.begin_tick();
        for child in self.child_recall_ids(id.context()) {
            self.collect_active(engine, child, out, summary);
        }
        out.push(rid);
    }

    /// Runs `key` and then its children for `stage`. Returns `true` once
    /// the recall is done or failed.
    fn run_recall(
        &self,
        engine: &EngineContext,
        rid: RecallIdKey,
        key: RecallKey,
        stage: RunStage,
        summary: &mut TickSummary,
    ) -> bool {
        let Some(recall) = self.recalls.get(key) else {
            return true;
        };
        if recall.is_failed() || recall.is_done() {
            return true;
        }
        let cx = StageContext::new(self, engine, key, rid);
        let outcome = if recall.children.is_empty() {
            let started = Instant::now();
            let outcome = recall.with_behavior(|b| b.run(stage, &cx));
            let elapsed = started.elapsed();
            let budget = engine.leaf_budget();
            if elapsed > budget {
                if let Binding::Signal(signal) = recall.binding()
                    && let Some(signal) = self.signals.get(signal)
                {
                    signal.clear_current();
                }
                engine.faults().record(Fault::RealtimeViolation {
                    recall: key,
                    elapsed,
                    budget,
                });
            }
            outcome
        } else {
            recall.with_behavior(|b| b.run(stage, &cx))
        };
        summary.recalls += 1;

        let mut children_done = true;
        for &child in &recall.children {
            children_done &= self.run_recall(engine, rid, child, stage, summary);
        }
        let propagated = recall.info().flags.contains(RecallFlags::PROPAGATE_DONE)
            && !recall.children.is_empty()
            && children_done;
        if outcome == RunOutcome::Done || propagated {
            recall.mark_done();
            return true;
        }
        false
    }

    fn finish_tick(&self, rid: RecallIdKey, summary: &mut TickSummary) {
        let Some(id) = self.recall_ids.get(rid) else {
            return;
        };
        for &signal in &id.signals {
            if let Some(s) = self.signals.get(signal) {
                s.advance();
            }
        }
        id.end_tick();
        if id.run_state() == RunState::Active && !id.roots.is_empty() && is_done(self, &id.roots) {
            id.advance_run_state(RunState::Done);
            id.request_cancel();
            summary.finished += 1;
            tracing::debug!("staging: {rid} done after {} tick(s)", id.ticks_run());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recall::{ContainerSpec, RecallPrototype, StartRequest};
    use crate::settings::{EngineSettings, ResolvePasses};
    use crate::test_support::{Probe, engine, graph_with_leaf};

    fn start(
        graph: &mut AudioGraph,
        engine: &EngineContext,
        channel: ChannelId,
    ) -> crate::recall::StartReport {
        graph
            .start_channel(engine, StartRequest::new(channel, SoundScope::Playback))
            .unwrap()
    }

    #[test]
    fn start_stages_up_to_init_post() {
        let (engine, _rx) = engine();
        let (probe, calls) = Probe::new();
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let report = start(&mut graph, &engine, outs[0]);
        let id = graph.recall_id(report.recall_id).unwrap();
        assert_eq!(id.staging(), StagingState::InitPostDone);
        assert_eq!(calls.resolve.load(std::sync::atomic::Ordering::SeqCst), 1);
        for stage in InitStage::ALL {
            assert_eq!(calls.inits(stage), 1);
        }
    }

    #[test]
    fn init_twice_is_noop() {
        let (engine, _rx) = engine();
        let (probe, calls) = Probe::new();
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let rid = start(&mut graph, &engine, outs[0]).recall_id;
        for stage in InitStage::ALL {
            assert!(graph.init(&engine, rid, stage).unwrap().is_empty());
        }
        for stage in InitStage::ALL {
            assert_eq!(calls.inits(stage), 1);
        }
    }

    #[test]
    fn dependency_resolves_on_second_pass() {
        let (engine, _rx) = engine();
        let (mut first, calls) = Probe::new();
        first.requires = Some("second");
        let (second, _) = Probe::new();
        let channel_run = RecallPrototype::of("fx-channel", crate::recall::PassThrough)
            .with_child(
                RecallPrototype::of("fx-recycling", crate::recall::PassThrough)
                    .with_child(RecallPrototype::of("first", first))
                    .with_child(RecallPrototype::of("second", second)),
            );
        let mut graph = AudioGraph::default();
        let audio = graph.add_audio(crate::AudioSpec::new("a"));
        graph
            .add_container(audio, ContainerSpec::new("fx").with_channel_run(channel_run))
            .unwrap();
        let out = graph.audio(audio).unwrap().outputs()[0];
        let report = start(&mut graph, &engine, out);
        assert!(report.wiring.is_empty(), "{:?}", report.wiring);
        assert_eq!(calls.resolve.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_dependency_fails_only_that_recall() {
        let settings = EngineSettings {
            resolve_passes: ResolvePasses::Fixed(3),
            ..EngineSettings::default()
        };
        let (engine, _rx) = EngineContext::new(settings);
        let (mut leaf, calls) = Probe::new();
        leaf.requires = Some("nowhere");
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", leaf));
        let report = start(&mut graph, &engine, outs[0]);
        assert_eq!(report.wiring.len(), 1);
        assert!(matches!(
            &report.wiring[0],
            WiringError::Unresolved { name, passes: 2, .. } if name == "leaf"
        ));
        let id = graph.recall_id(report.recall_id).unwrap();
        assert_eq!(id.staging(), StagingState::InitPostDone);
        let leaf_key = report.wiring[0].recall();
        assert!(graph.recall(leaf_key).unwrap().is_failed());

        graph.tick(&engine);
        assert_eq!(calls.total_runs(), 0);
        assert_eq!(calls.inits(InitStage::Pre), 0);
    }

    #[test]
    fn rejected_recall_excludes_its_subtree() {
        let (engine, _rx) = engine();
        let (mut leaf, calls) = Probe::new();
        leaf.reject = true;
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", leaf));
        let report = start(&mut graph, &engine, outs[0]);
        assert!(matches!(report.wiring[0], WiringError::Rejected { .. }));
        graph.tick(&engine);
        assert_eq!(calls.total_runs(), 0);
    }

    #[test]
    fn init_failure_is_reported() {
        let (engine, _rx) = engine();
        let (mut leaf, calls) = Probe::new();
        leaf.fail_init = true;
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", leaf));
        let report = start(&mut graph, &engine, outs[0]);
        assert!(matches!(report.wiring[0], WiringError::InitFailed { .. }));
        assert_eq!(calls.inits(InitStage::Post), 0);
    }

    #[test]
    fn init_out_of_order_is_illegal() {
        let (engine, _rx) = engine();
        let (probe, calls) = Probe::new();
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let master = graph.master_context();
        let rid = graph
            .start_run(outs[0], SoundScope::Playback, None, master, &mut Vec::new())
            .unwrap();
        let err = graph.init(&engine, rid, InitStage::Inter).unwrap_err();
        assert!(matches!(
            err,
            StagingError::IllegalTransition {
                from: StagingState::Unresolved,
                to: StagingState::InitInterDone,
                ..
            }
        ));
        assert_eq!(calls.inits(InitStage::Inter), 0);
        assert!(graph.resolve(&engine, rid).unwrap().is_empty());
        assert!(graph.init(&engine, rid, InitStage::Pre).unwrap().is_empty());
        assert_eq!(graph.recall_id(rid).unwrap().staging(), StagingState::InitPreDone);
    }

    #[test]
    fn resolve_after_cancel_is_noop() {
        let (engine, _rx) = engine();
        let (probe, calls) = Probe::new();
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let rid = start(&mut graph, &engine, outs[0]).recall_id;
        graph.cancel_recall_id(rid).unwrap();
        graph.tick(&engine);
        assert!(graph.resolve(&engine, rid).unwrap().is_empty());
        assert_eq!(calls.resolve.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(graph.recall_id(rid).unwrap().staging(), StagingState::Cancelled);
    }

    #[test]
    fn tick_runs_every_stage_in_order() {
        let (engine, _rx) = engine();
        let (probe, calls) = Probe::new();
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let rid = start(&mut graph, &engine, outs[0]).recall_id;
        let summary = graph.tick(&engine);
        assert_eq!(summary.recall_ids, 1);
        assert_eq!(summary.recalls, 9);
        for stage in RunStage::ALL {
            assert_eq!(calls.runs(stage), 1);
        }
        let id = graph.recall_id(rid).unwrap();
        assert_eq!(id.staging(), StagingState::Running);
        assert!(RunStage::ALL.iter().all(|&s| id.stage_completed(s)));
        assert_eq!(id.ticks_run(), 1);
        assert_eq!(engine.clock().tick(), 1);
    }

    #[test]
    fn cancel_mid_tick_finishes_the_tick_then_stops() {
        let (engine, rx) = engine();
        let (mut probe, calls) = Probe::new();
        probe.cancel_in = Some(RunStage::Inter);
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let rid = start(&mut graph, &engine, outs[0]).recall_id;

        graph.tick(&engine);
        assert_eq!(calls.runs(RunStage::Post), 1);
        assert!(graph.recall_id(rid).unwrap().is_cancel_requested());

        let summary = graph.tick(&engine);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(calls.total_runs(), 3);
        assert_eq!(calls.cancels(), 1);
        assert_eq!(graph.recall_id(rid).unwrap().staging(), StagingState::Cancelled);

        let reports = rx.drain(&mut graph, &engine);
        assert_eq!(reports, 1);
        assert!(graph.recall_id(rid).is_none());
        assert_eq!(graph.context_count(), 1);
    }

    #[test]
    fn remove_before_cancel_is_rejected() {
        let (engine, _rx) = engine();
        let (probe, _) = Probe::new();
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let rid = start(&mut graph, &engine, outs[0]).recall_id;
        let err = graph.remove_recall_id(rid).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Staging(StagingError::NotCancelled {
                state: StagingState::InitPostDone,
                ..
            })
        ));
        assert!(graph.recall_id(rid).is_some());
    }

    #[test]
    fn finished_run_cancels_itself() {
        let (engine, rx) = engine();
        let (mut probe, calls) = Probe::new();
        probe.finish_after = Some(2);
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        let rid = start(&mut graph, &engine, outs[0]).recall_id;

        assert_eq!(graph.tick(&engine).finished, 0);
        assert_eq!(graph.tick(&engine).finished, 1);
        assert_eq!(graph.recall_id(rid).unwrap().run_state(), RunState::Done);
        graph.tick(&engine);
        assert_eq!(calls.runs(RunStage::Post), 2);
        rx.drain(&mut graph, &engine);
        assert!(graph.recall_id(rid).is_none());
    }

    #[test]
    fn removal_releases_duplicates_and_signals() {
        let (engine, rx) = engine();
        let (probe, _) = Probe::new();
        let (mut graph, _, fx, outs) = graph_with_leaf(2, RecallPrototype::of("leaf", probe));
        let recalls = graph.recall_count();
        let signals = graph.signal_count();
        let rid = start(&mut graph, &engine, outs[0]).recall_id;
        assert!(graph.recall_count() > recalls);

        graph.cancel_recall_id(rid).unwrap();
        graph.tick(&engine);
        rx.drain(&mut graph, &engine);
        assert_eq!(graph.recall_count(), recalls);
        assert_eq!(graph.signal_count(), signals);
        assert!(graph.container(fx).unwrap().duplicates().is_empty());
        assert!(graph.channel(outs[0]).unwrap().recall_ids().is_empty());
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn budget_overrun_records_fault_and_drops_output() {
        let settings = EngineSettings {
            realtime_budget: 0.0,
            ..EngineSettings::default()
        };
        let (engine, _rx) = EngineContext::new(settings);
        let (probe, _) = Probe::new();
        let (mut graph, _, _, outs) = graph_with_leaf(1, RecallPrototype::of("leaf", probe));
        start(&mut graph, &engine, outs[0]);
        graph.tick(&engine);
        let faults = engine.faults().drain();
        assert!(!faults.is_empty());
        assert!(matches!(faults[0], Fault::RealtimeViolation { .. }));
    }
}
