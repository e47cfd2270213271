//! Real-time run: the thread tree drives the loop, the main thread plays
//! an arpeggio into the note feeds until Ctrl+C or the tick limit.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ags_core::{InMemorySoundcard, NoteEvent, Presentation, SoundScope};
use ags_thread::{Engine, SUPER_THREADED_SCOPES};
use anyhow::Context;
use clap::Args;
use parking_lot::Mutex;

use super::common;
use crate::instrument::Instrument;
use crate::meter::MeterCard;

#[derive(Args)]
pub struct RunArgs {
    /// Stop after this many ticks instead of waiting for Ctrl+C
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Engine config file (defaults to the per-user config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give every output channel a thread per sound scope
    #[arg(long)]
    super_threaded: bool,

    /// MIDI keys of the arpeggio
    #[arg(short, long, value_delimiter = ',', default_value = "60,64,67,72")]
    notes: Vec<u8>,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut settings = common::load_settings(args.config.as_deref())?;
    settings.super_threaded |= args.super_threaded;

    let card = Arc::new(Mutex::new(MeterCard::new(
        InMemorySoundcard::new(Presentation::from_settings(&settings))
            .paced()
            .discarding(),
    )));
    let mut engine =
        Engine::new(settings.clone(), Arc::clone(&card)).context("creating the engine")?;
    let instrument = Instrument::build(&engine)?;
    instrument.start_sequencer(&engine)?;

    println!(
        "Running {} at {} Hz, {} frames per tick{}",
        instrument.audio(),
        settings.samplerate,
        settings.buffer_size,
        if settings.super_threaded {
            let scopes = SoundScope::ALL
                .into_iter()
                .filter(|&s| SUPER_THREADED_SCOPES.contains(s))
                .count();
            format!(
                ", {} channel thread(s)",
                instrument.outputs().len() * scopes
            )
        } else {
            String::new()
        }
    );
    if args.ticks.is_none() {
        println!("\nPress Ctrl+C to stop...\n");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    engine.start().context("starting the engine threads")?;

    let step = common::ticks_per_step(&settings, engine.context().clock().bpm());
    let step_ticks = u32::try_from(step).unwrap_or(u32::MAX);
    let mut next_step = 0;
    let mut played = 0usize;
    while running.load(Ordering::SeqCst) && args.ticks.is_none_or(|limit| engine.ticks() < limit) {
        if !args.notes.is_empty() && engine.ticks() >= next_step {
            let key = args.notes[played % args.notes.len()];
            instrument.send(NoteEvent::on(key, 100))?;
            instrument.send(NoteEvent::off(key).after(step_ticks))?;
            played += 1;
            next_step = engine.ticks() + step;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    engine.stop().context("stopping the engine threads")?;

    println!("Notes played: {played}");
    common::print_summary(engine.ticks(), &engine.totals(), &engine.faults());
    println!("Levels:");
    for line in card.lock().report() {
        println!("{line}");
    }
    println!("Done!");
    Ok(())
}
