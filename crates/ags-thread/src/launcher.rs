//! The task launcher: the only place the graph is mutated.
//!
//! Structural tasks are queued on the engine's task queue from anywhere,
//! the tick included. The launcher takes the graph's write lock to run
//! them. The audio loop holds the read lock for a whole tick, so a task
//! always lands between two ticks and never inside one.
//!
//! Each launcher cycle runs the one-shot tasks queued so far, then every
//! cyclic task once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ags_core::task::{CyclicTask, TaskReceiver};
use ags_core::{AudioGraph, EngineContext, Task, TaskHandle};
use parking_lot::{Mutex, RwLock};

use crate::tree::StopToken;

/// Handle to a registered cyclic task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CyclicId(u64);

/// Serializes graph-mutating work.
pub struct TaskLauncher {
    graph: Arc<RwLock<AudioGraph>>,
    engine: Arc<EngineContext>,
    queue: TaskReceiver,
    cyclic: Mutex<Vec<(CyclicId, Arc<dyn CyclicTask>)>>,
    next_cyclic: AtomicU64,
    cycles: AtomicU64,
    poll: Duration,
}

impl TaskLauncher {
    /// Launcher for `graph`, draining `queue`.
    ///
    /// An idle launcher thread wakes every `poll` to run the cyclic tasks.
    pub fn new(
        graph: Arc<RwLock<AudioGraph>>,
        engine: Arc<EngineContext>,
        queue: TaskReceiver,
        poll: Duration,
    ) -> Self {
        Self {
            graph,
            engine,
            queue,
            cyclic: Mutex::new(Vec::new()),
            next_cyclic: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            poll,
        }
    }

    /// Queues `task` and returns a handle to its result.
    pub fn add_task(&self, task: impl Task) -> TaskHandle {
        self.engine.tasks().submit(task)
    }

    /// Queues `tasks` in order. They run in the same cycle unless the queue
    /// is being drained at that moment.
    pub fn add_task_all(&self, tasks: Vec<Box<dyn Task>>) -> Vec<TaskHandle> {
        tasks
            .into_iter()
            .map(|task| self.engine.tasks().submit_boxed(task))
            .collect()
    }

    /// Registers a task run once per cycle.
    pub fn add_cyclic_task(&self, task: Arc<dyn CyclicTask>) -> CyclicId {
        let id = CyclicId(self.next_cyclic.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("launcher: add cyclic task {}", task.name());
        self.cyclic.lock().push((id, task));
        id
    }

    /// Unregisters a cyclic task. Returns `false` if it was not registered.
    pub fn remove_cyclic_task(&self, id: CyclicId) -> bool {
        let mut cyclic = self.cyclic.lock();
        let before = cyclic.len();
        cyclic.retain(|(c, _)| *c != id);
        before != cyclic.len()
    }

    /// Cyclic tasks registered.
    pub fn cyclic_count(&self) -> usize {
        self.cyclic.lock().len()
    }

    /// One-shot tasks waiting.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Cycles completed.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Runs one cycle on the calling thread: queued one-shot tasks, then the
    /// cyclic tasks. Blocks while a tick holds the graph. Returns the
    /// one-shot tasks run.
    pub fn sync_run(&self) -> usize {
        let mut graph = self.graph.write();
        self.cycle(&mut graph)
    }

    fn cycle(&self, graph: &mut AudioGraph) -> usize {
        let ran = self.queue.drain(graph, &self.engine);
        // Cloned so a cyclic task may register or remove others.
        let cyclic: Vec<Arc<dyn CyclicTask>> =
            self.cyclic.lock().iter().map(|(_, t)| Arc::clone(t)).collect();
        for task in cyclic {
            task.launch(graph, &self.engine);
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);
        ran
    }

    /// Thread body: waits for tasks and runs a cycle whenever one arrives
    /// or `poll` passes with cyclic tasks registered. Runs a last cycle on
    /// stop so queued submitters get their results.
    pub fn run_until(&self, stop: &StopToken) {
        tracing::debug!("launcher: started");
        while !stop.is_stopped() {
            match self.queue.recv_timeout(self.poll) {
                Some(first) => {
                    let mut graph = self.graph.write();
                    first.run(&mut graph, &self.engine);
                    self.cycle(&mut graph);
                }
                None => {
                    if self.cyclic_count() > 0 {
                        self.sync_run();
                    }
                }
            }
        }
        let ran = self.sync_run();
        tracing::debug!("launcher: stopped, {ran} task(s) run on the way out");
    }
}
