//! Graph-mutating tasks and the queue that serializes them.
//!
//! Every structural change is a [`Task`]: an opaque object the submitter
//! hands to the task launcher, which runs it with exclusive access to the
//! graph between two ticks. The tick itself may only [`post`](TaskSender::post)
//! tasks, never run them.
//!
//! ```rust
//! use ags_core::tasks::AddAudio;
//! use ags_core::{AudioGraph, AudioSpec, EngineContext, EngineSettings};
//!
//! let (engine, queue) = EngineContext::new(EngineSettings::default());
//! let mut graph = AudioGraph::new(engine.settings().clone());
//!
//! let handle = engine.tasks().submit(AddAudio::new(AudioSpec::new("drums")));
//! queue.drain(&mut graph, &engine);
//! assert!(handle.wait().is_ok());
//! assert_eq!(graph.audios().len(), 1);
//! ```

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::graph::{AudioGraph, ResizeReport};
use crate::ids::{AudioId, ChannelId, ContainerId};
use crate::recall::StartReport;

/// What a task did.
#[derive(Debug)]
pub enum TaskReport {
    /// Applied, nothing to report.
    Done,
    /// An audio was created.
    Audio(AudioId),
    /// A recall container was created.
    Container(ContainerId),
    /// A run was started.
    Started(StartReport),
    /// Channels or pads were resized.
    Resized(ResizeReport),
    /// A channel was unlinked from its former partner.
    Unlinked(Option<ChannelId>),
    /// A cancel was requested.
    Cancelled,
    /// Recalls released by a removal.
    Removed(usize),
    /// The task had nothing to act on yet and left the graph unchanged.
    Deferred,
}

/// A unit of structural work.
pub trait Task: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Applies the task. Runs on the task launcher, never inside a tick.
    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        engine: &EngineContext,
    ) -> Result<TaskReport, EngineError>;
}

/// Task built from a closure.
pub struct FnTask<F> {
    name: &'static str,
    f: F,
}

/// Wraps `f` as a [`Task`].
pub fn from_fn<F>(name: &'static str, f: F) -> FnTask<F>
where
    F: FnOnce(&mut AudioGraph, &EngineContext) -> Result<TaskReport, EngineError> + Send + 'static,
{
    FnTask { name, f }
}

impl<F> Task for FnTask<F>
where
    F: FnOnce(&mut AudioGraph, &EngineContext) -> Result<TaskReport, EngineError> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn launch(
        self: Box<Self>,
        graph: &mut AudioGraph,
        engine: &EngineContext,
    ) -> Result<TaskReport, EngineError> {
        (self.f)(graph, engine)
    }
}

/// Task run on every launcher cycle until removed.
pub trait CyclicTask: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Runs once per cycle, after the one-shot tasks.
    fn launch(&self, graph: &mut AudioGraph, engine: &EngineContext);
}

type Reply = Sender<Result<TaskReport, EngineError>>;

/// A task waiting in the queue, with its reply channel if it has one.
pub struct QueuedTask {
    task: Box<dyn Task>,
    reply: Option<Reply>,
}

impl QueuedTask {
    /// Task name.
    pub fn name(&self) -> &'static str {
        self.task.name()
    }

    /// Runs the task and delivers the result. Returns `true` on success.
    pub fn run(self, graph: &mut AudioGraph, engine: &EngineContext) -> bool {
        let name = self.task.name();
        let result = self.task.launch(graph, engine);
        let ok = result.is_ok();
        match &result {
            Ok(report) => tracing::trace!("task {name}: {report:?}"),
            Err(e) => tracing::warn!("task {name} failed: {e}"),
        }
        if let Some(reply) = self.reply {
            // The submitter may have dropped its handle.
            let _ = reply.send(result);
        }
        ok
    }
}

/// Creates a task queue.
pub fn task_queue() -> (TaskSender, TaskReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (TaskSender { tx }, TaskReceiver { rx })
}

/// Submitting side of the task queue. Cheap to clone, never blocks.
#[derive(Clone, Debug)]
pub struct TaskSender {
    tx: Sender<QueuedTask>,
}

impl TaskSender {
    /// Queues `task` and returns a handle to its result.
    pub fn submit(&self, task: impl Task) -> TaskHandle {
        self.submit_boxed(Box::new(task))
    }

    /// Queues an already boxed task.
    pub fn submit_boxed(&self, task: Box<dyn Task>) -> TaskHandle {
        let (reply, rx) = crossbeam_channel::bounded(1);
        let name = task.name();
        if self
            .tx
            .send(QueuedTask {
                task,
                reply: Some(reply),
            })
            .is_err()
        {
            tracing::debug!("task {name} submitted after shutdown");
        }
        TaskHandle { rx }
    }

    /// Queues `task` without a result handle. Errors are only logged.
    pub fn post(&self, task: impl Task) {
        let name = task.name();
        if self
            .tx
            .send(QueuedTask {
                task: Box::new(task),
                reply: None,
            })
            .is_err()
        {
            tracing::debug!("task {name} posted after shutdown");
        }
    }

    /// Tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Draining side of the task queue, owned by the task launcher.
#[derive(Debug)]
pub struct TaskReceiver {
    rx: Receiver<QueuedTask>,
}

impl TaskReceiver {
    /// Takes the next queued task, if any.
    pub fn try_recv(&self) -> Option<QueuedTask> {
        match self.rx.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits up to `timeout` for the next task.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<QueuedTask> {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => Some(task),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// The underlying channel, for `select!`.
    pub fn receiver(&self) -> &Receiver<QueuedTask> {
        &self.rx
    }

    /// Runs every task queued when the call started. Tasks queued by those
    /// tasks wait for the next drain. Returns the tasks run.
    pub fn drain(&self, graph: &mut AudioGraph, engine: &EngineContext) -> usize {
        let queued = self.rx.len();
        let mut ran = 0;
        for _ in 0..queued {
            let Some(task) = self.try_recv() else {
                break;
            };
            task.run(graph, engine);
            ran += 1;
        }
        ran
    }

    /// Tasks waiting to run.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Result of a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    rx: Receiver<Result<TaskReport, EngineError>>,
}

impl TaskHandle {
    /// Blocks until the task ran. Fails with [`EngineError::Shutdown`] if
    /// the launcher went away first.
    pub fn wait(self) -> Result<TaskReport, EngineError> {
        self.rx.recv().unwrap_or(Err(EngineError::Shutdown))
    }

    /// Waits up to `timeout`. `None` if the task has not run yet.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<TaskReport, EngineError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(EngineError::Shutdown)),
        }
    }

    /// The result if the task already ran.
    pub fn try_result(&self) -> Option<Result<TaskReport, EngineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(EngineError::Shutdown)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioSpec;
    use crate::test_support::engine;

    #[test]
    fn submit_then_drain_delivers_result() {
        let (engine, rx) = engine();
        let mut graph = AudioGraph::default();
        let handle = engine.tasks().submit(from_fn("add", |g, _| {
            Ok(TaskReport::Audio(g.add_audio(AudioSpec::new("x"))))
        }));
        assert!(handle.try_result().is_none());
        assert_eq!(rx.drain(&mut graph, &engine), 1);
        assert!(matches!(handle.wait(), Ok(TaskReport::Audio(_))));
    }

    #[test]
    fn tasks_posted_while_draining_wait_for_next_drain() {
        let (engine, rx) = engine();
        let mut graph = AudioGraph::default();
        engine.tasks().post(from_fn("outer", |_, engine| {
            engine.tasks().post(from_fn("inner", |_, _| Ok(TaskReport::Done)));
            Ok(TaskReport::Done)
        }));
        assert_eq!(rx.drain(&mut graph, &engine), 1);
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.drain(&mut graph, &engine), 1);
        assert!(rx.is_empty());
    }

    #[test]
    fn dropped_queue_reports_shutdown() {
        let (engine, rx) = engine();
        let handle = engine.tasks().submit(from_fn("never", |_, _| Ok(TaskReport::Done)));
        drop(rx);
        assert!(matches!(handle.wait(), Err(EngineError::Shutdown)));
    }

    #[test]
    fn errors_reach_the_submitter() {
        let (engine, rx) = engine();
        let mut graph = AudioGraph::default();
        let handle = engine
            .tasks()
            .submit(from_fn("fail", |_, _| Err(EngineError::Plugin("boom".into()))));
        rx.drain(&mut graph, &engine);
        let err = handle.wait().unwrap_err();
        assert_eq!(err.to_string(), "plugin: boom");
    }
}
