//! Off-tick execution of blocking work.
//!
//! A recall that needs something slow (a plugin's worker request, disk I/O)
//! hands a job to the [`WorkScheduler`] and keeps a [`WorkTicket`]. The job
//! stores its result in a single-slot handoff; the recall polls the ticket
//! on later ticks without ever blocking on it.

use std::sync::Arc;

use parking_lot::Mutex;

/// A unit of blocking work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs away from the tick path.
pub trait WorkScheduler: Send + Sync {
    /// Queues `job`. Must not block the caller.
    fn schedule(&self, job: Job);
}

/// Runs jobs immediately on the calling thread. Used when no worker thread
/// is installed (tests, offline rendering).
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineScheduler;

impl WorkScheduler for InlineScheduler {
    fn schedule(&self, job: Job) {
        job();
    }
}

/// Single-value handoff between a job and its ticket.
#[derive(Debug)]
pub struct ReplySlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> ReplySlot<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Stores the reply.
    pub fn put(&self, value: T) {
        *self.value.lock() = Some(value);
    }

    /// Takes the reply without blocking. `None` if it is not there yet or
    /// the job is writing it right now.
    pub fn try_take(&self) -> Option<T> {
        self.value.try_lock()?.take()
    }
}

/// State of a pending job.
#[derive(Debug, PartialEq, Eq)]
pub enum WorkPoll<T> {
    /// The reply arrived.
    Ready(T),
    /// Still waiting.
    Pending,
    /// Still waiting and past the timeout. Reported once per ticket.
    TimedOut {
        /// Ticks since the job was scheduled.
        waited: u64,
    },
}

/// Claim on the result of a scheduled job.
#[derive(Debug)]
pub struct WorkTicket<T> {
    slot: Arc<ReplySlot<T>>,
    scheduled_at: u64,
    timeout_ticks: u64,
    reported: bool,
}

impl<T> WorkTicket<T> {
    /// Polls the job at `tick`.
    pub fn poll(&mut self, tick: u64) -> WorkPoll<T> {
        if let Some(value) = self.slot.try_take() {
            return WorkPoll::Ready(value);
        }
        let waited = tick.saturating_sub(self.scheduled_at);
        if waited >= self.timeout_ticks && !self.reported {
            self.reported = true;
            return WorkPoll::TimedOut { waited };
        }
        WorkPoll::Pending
    }

    /// Tick the job was scheduled at.
    pub fn scheduled_at(&self) -> u64 {
        self.scheduled_at
    }
}

/// Schedules `job` on `scheduler` and returns the ticket for its result.
pub fn schedule_work<T, F>(
    scheduler: &dyn WorkScheduler,
    tick: u64,
    timeout_ticks: u64,
    job: F,
) -> WorkTicket<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let slot = Arc::new(ReplySlot::new());
    let reply = Arc::clone(&slot);
    scheduler.schedule(Box::new(move || reply.put(job())));
    WorkTicket {
        slot,
        scheduled_at: tick,
        timeout_ticks,
        reported: false,
    }
}
