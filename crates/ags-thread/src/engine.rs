//! The threaded engine.
//!
//! [`Engine`] owns the graph, the engine context and every thread that
//! touches them. It runs in one of two modes:
//!
//! - **Synchronous** - [`tick`](Engine::tick) and
//!   [`run_ticks`](Engine::run_ticks) drive the loop from the caller:
//!   launcher cycle, tick, present, worker jobs. Used for offline rendering
//!   and tests.
//! - **Threaded** - [`start`](Engine::start) spawns the thread tree:
//!
//! ```text
//! ags
//! ├── ags-launcher
//! ├── ags-worker
//! └── ags-loop
//!     └── ags-channel-<n>-<scope>   (per output and scope, when super-threaded)
//! ```
//!
//! Dropping a running engine stops it.

use std::sync::Arc;
use std::time::Duration;

use ags_core::tasks::{CancelRecallId, StartChannel};
use ags_core::worker::WorkScheduler;
use ags_core::{
    AudioGraph, ChannelId, EngineContext, EngineError, EngineSettings, Fault, Presentation,
    RecallIdKey, ScopeSet, SoundScope, Soundcard, StartReport, StartRequest, Task, TaskHandle,
    TaskReport, TickSummary,
};
use parking_lot::{Mutex, RwLock};

use crate::audio_loop::{AudioLoop, SharedSoundcard};
use crate::channel_thread::ChannelThread;
use crate::error::{Result, ThreadError};
use crate::launcher::TaskLauncher;
use crate::playback::{Playback, PlaybackTable};
use crate::tree::{StopToken, ThreadSpec, ThreadTree};
use crate::worker::WorkerThread;

/// How often an idle launcher runs its cyclic tasks.
const LAUNCHER_POLL: Duration = Duration::from_millis(10);

/// Scopes that get a thread of their own on a super-threaded channel.
pub const SUPER_THREADED_SCOPES: ScopeSet = ScopeSet::of(SoundScope::Playback)
    .with(SoundScope::Sequencer)
    .with(SoundScope::Notation);

/// Graph, services and threads of one running engine.
pub struct Engine {
    settings: EngineSettings,
    graph: Arc<RwLock<AudioGraph>>,
    context: Arc<EngineContext>,
    launcher: Arc<TaskLauncher>,
    worker: Arc<WorkerThread>,
    soundcard: SharedSoundcard,
    playback: Mutex<PlaybackTable>,
    totals: Arc<Mutex<TickSummary>>,
    sync_loop: AudioLoop,
    tree: ThreadTree,
}

impl Engine {
    /// Builds an idle engine presenting to `soundcard`.
    ///
    /// Fails if the soundcard runs at other parameters than `settings`.
    pub fn new(settings: EngineSettings, soundcard: impl Soundcard + 'static) -> Result<Self> {
        let wanted = Presentation::from_settings(&settings);
        let offered = soundcard.presentation();
        if offered != wanted {
            return Err(ThreadError::Presentation {
                card: offered,
                engine: wanted,
            });
        }

        let worker = Arc::new(WorkerThread::new());
        let scheduler: Arc<dyn WorkScheduler> = worker.clone();
        let (context, queue) = EngineContext::new(settings.clone());
        let context = Arc::new(context.with_worker(scheduler));
        let graph = Arc::new(RwLock::new(AudioGraph::new(settings.clone())));
        let launcher = Arc::new(TaskLauncher::new(
            Arc::clone(&graph),
            Arc::clone(&context),
            queue,
            LAUNCHER_POLL,
        ));
        let boxed: Box<dyn Soundcard> = Box::new(soundcard);
        let soundcard: SharedSoundcard = Arc::new(Mutex::new(boxed));
        let totals = Arc::new(Mutex::new(TickSummary::default()));
        let sync_loop = AudioLoop::new(
            Arc::clone(&graph),
            Arc::clone(&context),
            Arc::clone(&soundcard),
            Arc::clone(&totals),
        );
        let tree = ThreadTree::new("ags", settings.frequency());

        tracing::info!(
            "engine: {} Hz, {} frames, {} channel(s), {}",
            settings.samplerate,
            settings.buffer_size,
            settings.audio_channels,
            settings.format
        );
        Ok(Self {
            settings,
            graph,
            context,
            launcher,
            worker,
            soundcard,
            playback: Mutex::new(PlaybackTable::new()),
            totals,
            sync_loop,
            tree,
        })
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Services shared with tasks and recalls.
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// The task launcher, for cyclic tasks.
    pub fn launcher(&self) -> &TaskLauncher {
        &self.launcher
    }

    /// Returns `true` while the thread tree runs.
    pub fn is_running(&self) -> bool {
        self.tree.is_running()
    }

    /// Ticks completed.
    pub fn ticks(&self) -> u64 {
        self.context.clock().tick()
    }

    /// Sum of every tick summary so far.
    pub fn totals(&self) -> TickSummary {
        *self.totals.lock()
    }

    /// Queues a structural task.
    pub fn submit(&self, task: impl Task) -> TaskHandle {
        self.launcher.add_task(task)
    }

    /// Queues a task and waits for its result. Without running threads the
    /// launcher cycle runs on the caller first.
    pub fn submit_wait(&self, task: impl Task) -> std::result::Result<TaskReport, EngineError> {
        let handle = self.submit(task);
        if !self.is_running() {
            self.launcher.sync_run();
        }
        handle.wait()
    }

    /// Reads the graph between ticks.
    pub fn read<R>(&self, f: impl FnOnce(&AudioGraph) -> R) -> R {
        f(&self.graph.read())
    }

    /// Drains the runtime faults recorded so far.
    pub fn faults(&self) -> Vec<Fault> {
        self.context.faults().drain()
    }

    /// Gives `f` the soundcard between two presents.
    pub fn with_soundcard<R>(&self, f: impl FnOnce(&mut dyn Soundcard) -> R) -> R {
        let mut card = self.soundcard.lock();
        f(&mut **card)
    }

    /// Runs one cycle on the caller: launcher, tick, present, worker jobs.
    pub fn tick(&mut self) -> Result<TickSummary> {
        if self.is_running() {
            return Err(ThreadError::AlreadyRunning);
        }
        self.launcher.sync_run();
        let summary = self.sync_loop.cycle(&StopToken::new())?;
        self.worker.run_pending();
        Ok(summary)
    }

    /// Runs `ticks` cycles on the caller and sums their summaries.
    pub fn run_ticks(&mut self, ticks: u64) -> Result<TickSummary> {
        let mut total = TickSummary::default();
        for _ in 0..ticks {
            total += self.tick()?;
        }
        Ok(total)
    }

    /// Starts a run on a channel and records it in the channel's playback
    /// slot for the request's scope, cancelling the run it replaces.
    pub fn play(&self, request: StartRequest) -> Result<StartReport> {
        let (channel, scope) = (request.channel, request.scope);
        let TaskReport::Started(report) = self.submit_wait(StartChannel(request))? else {
            return Err(ThreadError::UnexpectedReport("start-channel"));
        };
        let replaced = self
            .playback
            .lock()
            .set_recall_id(channel, scope, report.recall_id);
        if let Some(old) = replaced {
            self.cancel(old);
        }
        Ok(report)
    }

    /// Cancels the run in `channel`'s `scope` slot. Returns `false` if the
    /// slot was empty.
    pub fn stop_playback(&self, channel: ChannelId, scope: SoundScope) -> bool {
        let rid = self.playback.lock().take_recall_id(channel, scope);
        rid.inspect(|&rid| self.cancel(rid)).is_some()
    }

    fn cancel(&self, rid: RecallIdKey) {
        self.submit(CancelRecallId(rid));
    }

    /// Playback slots of `channel`, with finished runs cleared.
    pub fn playback(&self, channel: ChannelId) -> Option<Playback> {
        let graph = self.graph.read();
        let mut table = self.playback.lock();
        table.prune(&graph);
        table.get(channel).cloned()
    }

    /// Spawns the thread tree.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ThreadError::AlreadyRunning);
        }
        let mut tree = ThreadTree::new("ags", self.settings.frequency());
        let root = tree.root();

        let launcher = Arc::clone(&self.launcher);
        tree.add_child(
            root,
            ThreadSpec::new("ags-launcher", move |stop| launcher.run_until(&stop))
                .with_frequency(1.0 / LAUNCHER_POLL.as_secs_f64()),
        )?;
        let worker = Arc::clone(&self.worker);
        tree.add_child(root, ThreadSpec::new("ags-worker", move |stop| worker.run_until(&stop)))?;

        let mut audio_loop = AudioLoop::new(
            Arc::clone(&self.graph),
            Arc::clone(&self.context),
            Arc::clone(&self.soundcard),
            Arc::clone(&self.totals),
        );
        let mut runners = Vec::new();
        if self.settings.super_threaded {
            let outputs: Vec<ChannelId> = self.read(|graph| {
                graph
                    .audios()
                    .iter()
                    .filter_map(|&a| graph.audio(a))
                    .flat_map(|a| a.outputs().iter().copied())
                    .collect()
            });
            let scopes = SoundScope::ALL
                .into_iter()
                .filter(|&s| SUPER_THREADED_SCOPES.contains(s));
            for channel in outputs {
                for scope in scopes.clone() {
                    let (thread, runner) = ChannelThread::new(
                        channel,
                        scope,
                        Arc::clone(&self.graph),
                        Arc::clone(&self.context),
                    );
                    audio_loop.add_channel_thread(thread);
                    runners.push(runner);
                }
            }
        }
        let loop_node = tree.add_child(
            root,
            ThreadSpec::new("ags-loop", move |stop| audio_loop.run_until(&stop)),
        )?;
        let mut playback = self.playback.lock();
        for runner in runners {
            let (channel, scope) = (runner.channel(), runner.scope());
            let name = format!("ags-channel-{}-{scope}", channel.index());
            let node = tree.add_child(
                loop_node,
                ThreadSpec::new(name, move |stop| runner.run_until(&stop)),
            )?;
            playback.set_thread(channel, scope, node);
        }
        drop(playback);

        tree.start()?;
        self.tree = tree;
        tracing::info!("engine: started {} thread node(s)", self.tree.len() - 1);
        Ok(())
    }

    /// Stops and joins every thread. Tasks queued before the call still
    /// run.
    pub fn stop(&mut self) -> Result<()> {
        let result = self.tree.stop();
        self.playback.lock().clear_threads();
        if result.is_ok() {
            tracing::info!("engine: stopped after {} tick(s)", self.ticks());
        }
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_running()
            && let Err(e) = self.stop()
        {
            tracing::warn!("engine: {e}");
        }
    }
}
