//! Super-threaded channels.
//!
//! A super-threaded channel gets one thread per sound scope. Each runs the
//! channel's top-level recall id of its scope while the audio loop runs the
//! rest. The loop holds the graph's read
//! lock for the tick and the channel thread borrows the graph with
//! `read_recursive`, which never queues behind a waiting writer and so
//! cannot deadlock against the task launcher.

use std::sync::Arc;
use std::time::Duration;

use ags_core::{AudioGraph, ChannelId, EngineContext, SoundScope, TickSummary};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;

use crate::tree::StopToken;

/// How often a waiting side looks at its stop token.
const POLL: Duration = Duration::from_millis(5);

/// Loop side of a channel thread.
#[derive(Debug)]
pub struct ChannelThread {
    channel: ChannelId,
    scope: SoundScope,
    start: Sender<()>,
    done: Receiver<TickSummary>,
}

/// Thread side of a channel thread.
pub struct ChannelRunner {
    channel: ChannelId,
    scope: SoundScope,
    graph: Arc<RwLock<AudioGraph>>,
    engine: Arc<EngineContext>,
    start: Receiver<()>,
    done: Sender<TickSummary>,
}

impl ChannelThread {
    /// Creates both sides for `scope` of `channel`.
    pub fn new(
        channel: ChannelId,
        scope: SoundScope,
        graph: Arc<RwLock<AudioGraph>>,
        engine: Arc<EngineContext>,
    ) -> (Self, ChannelRunner) {
        let (start_tx, start_rx) = crossbeam_channel::bounded(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        (
            Self {
                channel,
                scope,
                start: start_tx,
                done: done_rx,
            },
            ChannelRunner {
                channel,
                scope,
                graph,
                engine,
                start: start_rx,
                done: done_tx,
            },
        )
    }

    /// Channel served.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Scope served.
    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// Starts one tick on the thread. Returns `false` if the thread is gone.
    pub fn begin(&self) -> bool {
        self.start.send(()).is_ok()
    }

    /// Waits for the tick started by [`begin`](Self::begin). `None` if the
    /// thread went away or `stop` was raised first.
    pub fn finish(&self, stop: &StopToken) -> Option<TickSummary> {
        loop {
            match self.done.recv_timeout(POLL) {
                Ok(summary) => return Some(summary),
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) if stop.is_stopped() => return None,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }
}

impl ChannelRunner {
    /// Channel served.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Scope served.
    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// Runs the channel's recall id of its scope once.
    pub fn run_once(&self) -> TickSummary {
        let graph = self.graph.read_recursive();
        graph.run_channel(&self.engine, self.channel, self.scope)
    }

    /// Thread body: one [`run_once`](Self::run_once) per started tick.
    pub fn run_until(self, stop: &StopToken) {
        tracing::debug!("channel thread: {} {} started", self.channel, self.scope);
        while !stop.is_stopped() {
            match self.start.recv_timeout(POLL) {
                Ok(()) => {
                    let summary = self.run_once();
                    if self.done.send(summary).is_err() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("channel thread: {} {} stopped", self.channel, self.scope);
    }
}
