//! Recall ids: one running instantiation per recycling context and scope.
//!
//! A [`RecallId`] owns the duplicated recalls and the voice signals of one
//! run. Its [`StagingState`] is the explicit state machine of the staging
//! protocol:
//!
//! ```text
//! Unresolved -> Resolved -> InitPreDone -> InitInterDone -> InitPostDone
//!     -> Running -> Cancelled -> Removed
//! ```
//!
//! Every state may jump to `Cancelled`; all other transitions go to the next
//! state only. The state is stored atomically and moved with a
//! compare-exchange, so a transition that lost a race or would move
//! backwards fails with [`StagingError::IllegalTransition`] instead of
//! silently regressing.

use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::error::StagingError;
use crate::graph::AudioGraph;
use crate::ids::{AudioId, ChannelId, ContextId, RecallIdKey, RecallKey, SignalId};
use crate::recall::RunStage;
use crate::sound::SoundScope;

/// Staging state of a recall id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum StagingState {
    /// Created, dependencies not bound yet.
    Unresolved = 0,
    /// Every non-failed recall resolved.
    Resolved = 1,
    /// `init(pre)` done.
    InitPreDone = 2,
    /// `init(inter)` done.
    InitInterDone = 3,
    /// `init(post)` done, ready for the first tick.
    InitPostDone = 4,
    /// Ticking.
    Running = 5,
    /// Cancel completed; no further run stages.
    Cancelled = 6,
    /// Detached and released.
    Removed = 7,
}

impl StagingState {
    /// Every state in order.
    pub const ALL: [StagingState; 8] = [
        StagingState::Unresolved,
        StagingState::Resolved,
        StagingState::InitPreDone,
        StagingState::InitInterDone,
        StagingState::InitPostDone,
        StagingState::Running,
        StagingState::Cancelled,
        StagingState::Removed,
    ];

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(StagingState::Removed)
    }

    /// The state that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self as usize + 1).copied()
    }

    /// Returns `true` if `to` is a legal successor of `self`.
    pub fn can_transition_to(self, to: StagingState) -> bool {
        if to == StagingState::Cancelled {
            return self < StagingState::Cancelled;
        }
        self.next() == Some(to)
    }
}

impl fmt::Display for StagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StagingState::Unresolved => "unresolved",
            StagingState::Resolved => "resolved",
            StagingState::InitPreDone => "init-pre-done",
            StagingState::InitInterDone => "init-inter-done",
            StagingState::InitPostDone => "init-post-done",
            StagingState::Running => "running",
            StagingState::Cancelled => "cancelled",
            StagingState::Removed => "removed",
        })
    }
}

/// Coarse run state, moving only forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RunState {
    /// Running or about to.
    Active = 0,
    /// Every root recall finished on its own.
    Done = 1,
    /// Cancel completed; waiting to be removed.
    Removing = 2,
}

/// One running instantiation of the recalls for a context and scope.
pub struct RecallId {
    key: RecallIdKey,
    scope: SoundScope,
    context: ContextId,
    audio: AudioId,
    anchor: ChannelId,
    staging: AtomicU8,
    run_state: AtomicU8,
    cancel: AtomicBool,
    tick_stages: AtomicU8,
    ticks: AtomicU64,
    pub(crate) recalls: Vec<RecallKey>,
    pub(crate) roots: Vec<RecallKey>,
    pub(crate) signals: Vec<SignalId>,
    pub(crate) channels: Vec<ChannelId>,
}

impl RecallId {
    pub(crate) fn new(
        key: RecallIdKey,
        scope: SoundScope,
        context: ContextId,
        audio: AudioId,
        anchor: ChannelId,
    ) -> Self {
        Self {
            key,
            scope,
            context,
            audio,
            anchor,
            staging: AtomicU8::new(StagingState::Unresolved as u8),
            run_state: AtomicU8::new(RunState::Active as u8),
            cancel: AtomicBool::new(false),
            tick_stages: AtomicU8::new(0),
            ticks: AtomicU64::new(0),
            recalls: Vec::new(),
            roots: Vec::new(),
            signals: Vec::new(),
            channels: Vec::new(),
        }
    }

    /// Own handle.
    pub fn key(&self) -> RecallIdKey {
        self.key
    }

    /// Sound scope.
    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// Owning recycling context.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Audio the run was started on.
    pub fn audio(&self) -> AudioId {
        self.audio
    }

    /// Channel the run was started on.
    pub fn anchor(&self) -> ChannelId {
        self.anchor
    }

    /// Every duplicate owned by this recall id, parents before children.
    pub fn recalls(&self) -> &[RecallKey] {
        &self.recalls
    }

    /// Top-level duplicates, in processing order.
    pub fn roots(&self) -> &[RecallKey] {
        &self.roots
    }

    /// Voice signals owned by this recall id.
    pub fn signals(&self) -> &[SignalId] {
        &self.signals
    }

    /// Channels this run covers.
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Current staging state.
    #[inline]
    pub fn staging(&self) -> StagingState {
        StagingState::from_u8(self.staging.load(Ordering::Acquire))
    }

    /// Moves the staging state to `to`.
    ///
    /// Returns `Ok(false)` if the state already is `to`, `Ok(true)` if it
    /// moved, and an error for any illegal move.
    pub fn transition(&self, to: StagingState) -> Result<bool, StagingError> {
        let mut current = self.staging();
        loop {
            if current == to {
                return Ok(false);
            }
            if !current.can_transition_to(to) {
                return Err(StagingError::IllegalTransition {
                    recall_id: self.key,
                    from: current,
                    to,
                });
            }
            match self.staging.compare_exchange(
                current as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(true),
                Err(actual) => current = StagingState::from_u8(actual),
            }
        }
    }

    /// Coarse run state.
    pub fn run_state(&self) -> RunState {
        match self.run_state.load(Ordering::Acquire) {
            0 => RunState::Active,
            1 => RunState::Done,
            _ => RunState::Removing,
        }
    }

    pub(crate) fn advance_run_state(&self, to: RunState) {
        self.run_state.fetch_max(to as u8, Ordering::AcqRel);
    }

    /// Returns `true` once a cancel was requested.
    #[inline]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Returns `true` while the run accepts new children.
    pub fn is_live(&self) -> bool {
        !self.is_cancel_requested() && self.staging() < StagingState::Cancelled
    }

    pub(crate) fn begin_tick(&self) {
        self.tick_stages.store(0, Ordering::Release);
    }

    pub(crate) fn finish_stage(&self, stage: RunStage) {
        self.tick_stages.fetch_or(stage.bit(), Ordering::AcqRel);
    }

    pub(crate) fn end_tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns `true` if `stage` completed during the latest tick.
    pub fn stage_completed(&self, stage: RunStage) -> bool {
        self.tick_stages.load(Ordering::Acquire) & stage.bit() != 0
    }

    /// Ticks this run has completed.
    pub fn ticks_run(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl fmt::Debug for RecallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecallId")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("context", &self.context)
            .field("staging", &self.staging())
            .field("cancel", &self.is_cancel_requested())
            .finish_non_exhaustive()
    }
}

/// Finds the recall id in `ids` running `scope` for exactly `context`.
///
/// Lookups are scope-qualified: a play and a record run on the same
/// context never shadow each other.
pub fn find_recycling_context(
    graph: &AudioGraph,
    ids: &[RecallIdKey],
    scope: SoundScope,
    context: ContextId,
) -> Option<RecallIdKey> {
    ids.iter().copied().find(|&key| {
        graph
            .recall_id(key)
            .is_some_and(|id| id.scope == scope && id.context == context)
    })
}

/// Finds the recall id in `ids` running `scope` on the nearest ancestor of
/// `context`, walking parent links up to the master context.
pub fn find_parent_recycling_context(
    graph: &AudioGraph,
    ids: &[RecallIdKey],
    scope: SoundScope,
    context: ContextId,
) -> Option<RecallIdKey> {
    let mut current = graph.context(context)?.parent();
    while let Some(ancestor) = current {
        if let Some(found) = find_recycling_context(graph, ids, scope, ancestor) {
            return Some(found);
        }
        current = graph.context(ancestor)?.parent();
    }
    None
}
