//! Error taxonomy of the engine.
//!
//! Three families are returned to callers:
//!
//! - [`WiringError`]: a recall could not be bound or initialized. Fatal for
//!   that recall only; it is marked failed and its siblings keep running.
//! - [`TopologyError`]: a structural mutation was rejected. The graph is
//!   left exactly as it was.
//! - [`StagingError`]: an illegal staging transition was requested.
//!
//! Runtime problems on the tick path are never returned. They are recorded
//! as [`Fault`](crate::Fault)s instead.

use thiserror::Error;

use crate::ids::{AudioId, ChannelId, ContainerId, ContextId, RecallIdKey, RecallKey};
use crate::recall_id::StagingState;
use crate::soundcard::SoundcardError;

/// A recall could not be wired into its recall id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    /// Dependency still missing once the resolve pass bound was reached.
    #[error("{recall} ({name}) unresolved after {passes} resolve pass(es): {reason}")]
    Unresolved {
        /// The failed recall.
        recall: RecallKey,
        /// Recall name.
        name: String,
        /// Passes attempted.
        passes: usize,
        /// Last reason reported by the recall.
        reason: String,
    },

    /// The recall refused to resolve.
    #[error("{recall} ({name}) rejected its wiring: {reason}")]
    Rejected {
        /// The failed recall.
        recall: RecallKey,
        /// Recall name.
        name: String,
        /// Reason reported by the recall.
        reason: String,
    },

    /// Duplication was requested from a recall that is not a template.
    #[error("{recall} ({name}) is not a template and cannot be duplicated")]
    MissingTemplate {
        /// The recall asked to act as template.
        recall: RecallKey,
        /// Recall name.
        name: String,
    },

    /// The recall failed to allocate its per-run resources.
    #[error("{recall} ({name}) failed to initialize: {reason}")]
    InitFailed {
        /// The failed recall.
        recall: RecallKey,
        /// Recall name.
        name: String,
        /// Reason reported by the recall.
        reason: String,
    },
}

impl WiringError {
    /// The recall this error is about.
    pub fn recall(&self) -> RecallKey {
        match self {
            WiringError::Unresolved { recall, .. }
            | WiringError::Rejected { recall, .. }
            | WiringError::MissingTemplate { recall, .. }
            | WiringError::InitFailed { recall, .. } => *recall,
        }
    }
}

/// A structural mutation was rejected and not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Audio handle does not resolve.
    #[error("unknown audio {0}")]
    UnknownAudio(AudioId),

    /// Channel handle does not resolve.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// Context handle does not resolve.
    #[error("unknown recycling context {0}")]
    UnknownContext(ContextId),

    /// Shrinking would drop a channel that still runs recall ids.
    #[error("resize of {audio} would orphan {live} live recall id(s) on {channel}")]
    WouldOrphan {
        /// Audio being resized.
        audio: AudioId,
        /// First channel that would be dropped while live.
        channel: ChannelId,
        /// Live recall ids on that channel.
        live: usize,
    },

    /// The channel is running and cannot be rewired.
    #[error("{channel} has {live} live recall id(s)")]
    InFlight {
        /// Busy channel.
        channel: ChannelId,
        /// Live recall ids on it.
        live: usize,
    },

    /// The audio is running and cannot be removed.
    #[error("{audio} has {live} live recall id(s)")]
    AudioBusy {
        /// Busy audio.
        audio: AudioId,
        /// Live recall ids on it.
        live: usize,
    },

    /// The two channels cannot be linked.
    #[error("cannot link {from} to {to}: {reason}")]
    InvalidLink {
        /// First channel.
        from: ChannelId,
        /// Second channel.
        to: ChannelId,
        /// Why the link is invalid.
        reason: &'static str,
    },

    /// The two channels are already linked to each other.
    #[error("{from} and {to} are already linked")]
    AlreadyLinked {
        /// First channel.
        from: ChannelId,
        /// Second channel.
        to: ChannelId,
    },

    /// A context still has children holding live recall ids.
    #[error("{context} still has {live} live child recall id(s)")]
    ContextInUse {
        /// Context that was asked to go away.
        context: ContextId,
        /// Live recall ids below it.
        live: usize,
    },

    /// The master context is never removed.
    #[error("the master recycling context cannot be removed")]
    MasterContext,

    /// The pad/line grid failed its consistency check.
    #[error("inconsistent channel grid: {0}")]
    Inconsistent(String),
}

/// An illegal staging request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    /// Transition that would move staging backwards or skip a state.
    #[error("{recall_id}: illegal staging transition {from} -> {to}")]
    IllegalTransition {
        /// Recall id.
        recall_id: RecallIdKey,
        /// Current state.
        from: StagingState,
        /// Requested state.
        to: StagingState,
    },

    /// Removal requested before cancel completed.
    #[error("{recall_id}: remove requires a completed cancel, state is {state}")]
    NotCancelled {
        /// Recall id.
        recall_id: RecallIdKey,
        /// Current state.
        state: StagingState,
    },

    /// Recall id handle does not resolve.
    #[error("unknown recall id {0}")]
    UnknownRecallId(RecallIdKey),
}

/// Top-level error returned by tasks and graph operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Wiring error.
    #[error(transparent)]
    Wiring(#[from] WiringError),

    /// Rejected structural mutation.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Illegal staging request.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// Soundcard failure.
    #[error("soundcard: {0}")]
    Soundcard(#[from] SoundcardError),

    /// Container handle does not resolve.
    #[error("unknown recall container {0}")]
    UnknownContainer(ContainerId),

    /// Recall handle does not resolve.
    #[error("unknown recall {0}")]
    UnknownRecall(RecallKey),

    /// Plugin host failure.
    #[error("plugin: {0}")]
    Plugin(String),

    /// The engine shut down before the request was served.
    #[error("engine shut down")]
    Shutdown,
}

/// Convenience alias.
pub type Result<T> = core::result::Result<T, EngineError>;
