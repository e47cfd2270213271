//! The worker thread: blocking recall work, off the tick path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ags_core::worker::{Job, WorkScheduler};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::tree::StopToken;

/// How often an idle worker looks at its stop token.
const POLL: Duration = Duration::from_millis(5);

/// Job queue served by one thread.
///
/// Install it as the engine's [`WorkScheduler`]; scheduling never blocks.
/// Until the thread runs, [`run_pending`](Self::run_pending) serves the
/// queue from the caller.
#[derive(Debug)]
pub struct WorkerThread {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    completed: AtomicU64,
}

impl WorkerThread {
    /// Creates an idle worker.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            completed: AtomicU64::new(0),
        }
    }

    /// Jobs waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Jobs run so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    fn execute(&self, job: Job) {
        job();
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs every queued job on the calling thread. Returns the jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    self.execute(job);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Thread body: serves jobs until `stop` is raised, then finishes what
    /// is queued.
    pub fn run_until(&self, stop: &StopToken) {
        tracing::debug!("worker: started");
        while !stop.is_stopped() {
            match self.rx.recv_timeout(POLL) {
                Ok(job) => self.execute(job),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let drained = self.run_pending();
        tracing::debug!("worker: stopped, {drained} job(s) run on the way out");
    }
}

impl Default for WorkerThread {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkScheduler for WorkerThread {
    fn schedule(&self, job: Job) {
        // The worker owns both ends, so the queue is never disconnected.
        let _ = self.tx.send(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ags_core::worker::{WorkPoll, schedule_work};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn jobs_wait_until_served() {
        let worker = WorkerThread::new();
        let mut ticket = schedule_work(&worker, 0, 4, || 21 * 2);
        assert_eq!(ticket.poll(1), WorkPoll::Pending);
        assert_eq!(worker.pending(), 1);
        assert_eq!(worker.run_pending(), 1);
        assert_eq!(ticket.poll(2), WorkPoll::Ready(42));
        assert_eq!(worker.completed(), 1);
    }

    #[test]
    fn thread_serves_jobs_until_stopped() {
        let worker = Arc::new(WorkerThread::new());
        let stop = StopToken::new();
        let handle = {
            let worker = Arc::clone(&worker);
            let stop = stop.clone();
            thread::spawn(move || worker.run_until(&stop))
        };
        let mut ticket = schedule_work(worker.as_ref(), 0, 1000, || "done");
        let mut tick = 0;
        let reply = loop {
            tick += 1;
            if let WorkPoll::Ready(reply) = ticket.poll(tick) {
                break reply;
            }
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(reply, "done");
        stop.stop();
        handle.join().unwrap();
    }
}
