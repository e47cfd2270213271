//! Integration tests for the threaded engine.
//!
//! These run the real thread tree against a paced in-memory soundcard.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use ags_core::loader::{SampleLoader, SineLoader};
use ags_core::recall::builtin::playback_chain;
use ags_core::task::CyclicTask;
use ags_core::tasks::{AddAudio, AddRecallContainer, RemoveAudio, ResizePads};
use ags_core::{
    AudioGraph, AudioId, AudioSpec, ContainerSpec, Direction, EngineContext, EngineSettings,
    InMemorySoundcard, Presentation, RecallBehavior, RecallPrototype, RunOutcome, RunStage,
    ScopeSet, SoundScope, StageContext, StartRequest, TaskReport,
};
use ags_thread::Engine;
use parking_lot::Mutex;

fn settings() -> EngineSettings {
    EngineSettings {
        buffer_size: 64,
        realtime_budget: 100.0,
        ..EngineSettings::default()
    }
}

fn paced_card(settings: &EngineSettings) -> InMemorySoundcard {
    InMemorySoundcard::new(Presentation::from_settings(settings)).paced()
}

fn add_audio(engine: &Engine, name: &str) -> AudioId {
    let Ok(TaskReport::Audio(audio)) =
        engine.submit_wait(AddAudio::new(AudioSpec::new(name).with_audio_channels(2)))
    else {
        panic!("audio {name} not added");
    };
    audio
}

fn add_chain(engine: &Engine, audio: AudioId, specs: Vec<ContainerSpec>) {
    for spec in specs {
        engine.submit_wait(AddRecallContainer { audio, spec }).unwrap();
    }
}

fn outputs(engine: &Engine, audio: AudioId) -> Vec<ags_core::ChannelId> {
    engine.read(|g| g.audio(audio).unwrap().outputs().to_vec())
}

/// Polls `done` every millisecond for up to five seconds.
fn wait_for(engine: &Engine, done: impl Fn(&Engine) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done(engine) {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done(engine)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn threaded_voice_finishes_and_is_removed() {
    let settings = settings();
    let mut engine = Engine::new(settings.clone(), paced_card(&settings).discarding()).unwrap();
    let synth = add_audio(&engine, "synth");
    add_chain(
        &engine,
        synth,
        playback_chain(SampleLoader::new(vec![0.5; 1024]), Some(256), ScopeSet::ALL),
    );
    let left = outputs(&engine, synth)[0];

    engine.start().unwrap();
    let report = engine.play(StartRequest::new(left, SoundScope::Playback)).unwrap();
    assert!(wait_for(&engine, |e| e.totals().cancelled >= 1));
    engine.stop().unwrap();

    let totals = engine.totals();
    assert_eq!(totals.finished, 1);
    assert_eq!(totals.cancelled, 1);
    assert!(engine.ticks() >= 5);
    assert!(engine.read(|g| g.recall_id(report.recall_id).is_none()));
    assert_eq!(engine.read(AudioGraph::recall_id_count), 0);
    assert!(engine.playback(left).is_none());
}

#[test]
fn engine_restarts_after_stop() {
    let settings = settings();
    let mut engine = Engine::new(settings.clone(), paced_card(&settings).discarding()).unwrap();

    engine.start().unwrap();
    assert!(wait_for(&engine, |e| e.ticks() >= 3));
    engine.stop().unwrap();
    let first = engine.ticks();

    engine.start().unwrap();
    assert!(wait_for(&engine, |e| e.ticks() >= first + 3));
    engine.stop().unwrap();
    assert!(!engine.is_running());
}

// ============================================================================
// Tasks against a running graph
// ============================================================================

/// Checks the whole graph from inside a tick.
#[derive(Clone)]
struct Probe {
    runs: Arc<AtomicUsize>,
    violations: Arc<AtomicUsize>,
}

impl RecallBehavior for Probe {
    fn run(&mut self, _stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        if cx.graph().verify().is_err() {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
        self.runs.fetch_add(1, Ordering::Relaxed);
        RunOutcome::Continue
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(self.clone())
    }
}

/// Checks the whole graph on every launcher cycle.
struct Verifier {
    checks: AtomicUsize,
    violations: AtomicUsize,
}

impl CyclicTask for Verifier {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn launch(&self, graph: &mut AudioGraph, _engine: &EngineContext) {
        if graph.verify().is_err() {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
        self.checks.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn ticks_never_see_a_half_applied_task() {
    let settings = settings();
    let mut engine = Engine::new(settings.clone(), paced_card(&settings).discarding()).unwrap();

    let probe = Probe {
        runs: Arc::new(AtomicUsize::new(0)),
        violations: Arc::new(AtomicUsize::new(0)),
    };
    let synth = add_audio(&engine, "synth");
    let mut chain = playback_chain(SineLoader::default(), None, ScopeSet::ALL);
    chain.push(ContainerSpec::new("probe").with_signal(RecallPrototype::of("probe", probe.clone())));
    add_chain(&engine, synth, chain);
    let scratch = add_audio(&engine, "scratch");
    let left = outputs(&engine, synth)[0];

    let verifier = Arc::new(Verifier {
        checks: AtomicUsize::new(0),
        violations: AtomicUsize::new(0),
    });
    let cyclic: Arc<dyn CyclicTask> = verifier.clone();
    engine.launcher().add_cyclic_task(cyclic);

    engine.start().unwrap();
    engine.play(StartRequest::new(left, SoundScope::Playback)).unwrap();

    let context: Arc<EngineContext> = Arc::clone(engine.context());
    let submitter = thread::spawn(move || {
        for i in 0..100 {
            context
                .tasks()
                .submit(ResizePads {
                    audio: scratch,
                    direction: Direction::Output,
                    pads: i % 4 + 1,
                })
                .wait()
                .unwrap();
            let Ok(TaskReport::Audio(extra)) =
                context.tasks().submit(AddAudio::new(AudioSpec::new("extra"))).wait()
            else {
                panic!("extra audio not added");
            };
            context.tasks().submit(RemoveAudio(extra)).wait().unwrap();
        }
    });
    submitter.join().unwrap();
    assert!(wait_for(&engine, |_| probe.runs.load(Ordering::Relaxed) > 0));
    engine.stop().unwrap();

    assert_eq!(probe.violations.load(Ordering::Relaxed), 0);
    assert_eq!(verifier.violations.load(Ordering::Relaxed), 0);
    assert!(verifier.checks.load(Ordering::Relaxed) > 0);
    assert_eq!(engine.read(|g| g.audio(scratch).unwrap().output_pads()), 4);
    assert_eq!(engine.read(|g| g.audios().len()), 2);
    assert!(engine.faults().is_empty());
}

// ============================================================================
// Super-threaded channels
// ============================================================================

#[test]
fn super_threaded_outputs_reach_the_soundcard() {
    let settings = EngineSettings {
        super_threaded: true,
        ..settings()
    };
    let card = Arc::new(Mutex::new(paced_card(&settings)));
    let mut engine = Engine::new(settings.clone(), Arc::clone(&card)).unwrap();

    let synth = add_audio(&engine, "synth");
    add_chain(
        &engine,
        synth,
        playback_chain(SampleLoader::new(vec![0.5; 480_000]), None, ScopeSet::ALL),
    );
    let outs = outputs(&engine, synth);
    for &out in &outs {
        engine.play(StartRequest::new(out, SoundScope::Playback)).unwrap();
    }

    engine.start().unwrap();
    for &out in &outs {
        let slot = engine.playback(out).unwrap();
        assert!(slot.thread(SoundScope::Playback).is_some());
        assert!(slot.thread(SoundScope::Notation).is_some());
        assert!(slot.thread(SoundScope::Wave).is_none());
    }
    assert!(wait_for(&engine, |e| e.ticks() >= 20));
    engine.stop().unwrap();

    for &out in &outs {
        let slot = engine.playback(out).unwrap();
        assert!(!slot.has_thread());
        assert!(slot.is_playing());
    }
    let card = card.lock();
    assert!(card.buffers() >= 20);
    assert!(card.channel(0).contains(&0.5));
    assert!(card.channel(1).contains(&0.5));
}
