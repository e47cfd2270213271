//! Typed handles into the tables of an [`AudioGraph`](crate::AudioGraph).
//!
//! Handles are cheap `Copy` values. They never keep the referenced object
//! alive: a handle to a removed object simply stops resolving, which is how
//! parent back-references (context parents, recall parents, playback slots)
//! stay weak.

use crate::arena::arena_key;

arena_key!(
    /// Handle of an [`Audio`](crate::Audio).
    AudioId,
    "audio"
);

arena_key!(
    /// Handle of a [`Channel`](crate::Channel).
    ChannelId,
    "channel"
);

arena_key!(
    /// Handle of a [`Recycling`](crate::Recycling).
    RecyclingId,
    "recycling"
);

arena_key!(
    /// Handle of an [`AudioSignal`](crate::AudioSignal).
    SignalId,
    "signal"
);

arena_key!(
    /// Handle of a [`RecyclingContext`](crate::RecyclingContext).
    ContextId,
    "context"
);

arena_key!(
    /// Handle of a [`RecallId`](crate::RecallId).
    RecallIdKey,
    "recall-id"
);

arena_key!(
    /// Handle of a [`Recall`](crate::Recall).
    RecallKey,
    "recall"
);

arena_key!(
    /// Handle of a [`RecallContainer`](crate::RecallContainer).
    ContainerId,
    "container"
);
