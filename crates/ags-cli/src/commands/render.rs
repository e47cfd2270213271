//! Offline rendering: the loop runs on the caller, as fast as it can.

use std::path::PathBuf;
use std::sync::Arc;

use ags_core::{InMemorySoundcard, NoteEvent, Presentation};
use ags_thread::Engine;
use anyhow::Context;
use clap::Args;
use parking_lot::Mutex;

use super::common;
use crate::instrument::Instrument;
use crate::meter::MeterCard;

#[derive(Args)]
pub struct RenderArgs {
    /// Ticks to render
    #[arg(short, long, default_value = "100")]
    ticks: u64,

    /// MIDI keys to play one after another (e.g. "60,64,67"); a drone plays
    /// on every output when omitted
    #[arg(short, long, value_delimiter = ',')]
    notes: Vec<u8>,

    /// Ticks each note sounds
    #[arg(long, default_value = "16")]
    note_ticks: u32,

    /// Engine config file (defaults to the per-user config)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let settings = common::load_settings(args.config.as_deref())?;
    let card = Arc::new(Mutex::new(MeterCard::new(
        InMemorySoundcard::new(Presentation::from_settings(&settings)).discarding(),
    )));
    let mut engine =
        Engine::new(settings.clone(), Arc::clone(&card)).context("creating the engine")?;
    let instrument = Instrument::build(&engine)?;

    if args.notes.is_empty() {
        instrument.drone(&engine)?;
    } else {
        instrument.start_sequencer(&engine)?;
        let length = args.note_ticks.max(1);
        for (i, &key) in args.notes.iter().enumerate() {
            let on_at = i as u32 * length;
            instrument.send(NoteEvent::on(key, 100).after(on_at))?;
            instrument.send(NoteEvent::off(key).after(on_at + length))?;
        }
    }

    engine.run_ticks(args.ticks).context("rendering")?;

    let card = card.lock();
    println!(
        "Rendered {} frames at {} Hz, {} channel(s)",
        card.frames(),
        settings.samplerate,
        card.channels()
    );
    common::print_summary(engine.ticks(), &engine.totals(), &engine.faults());
    println!("Levels:");
    for line in card.report() {
        println!("{line}");
    }
    Ok(())
}
