//! Threads for the AGS recall engine.
//!
//! This crate runs an [`ags_core::AudioGraph`] in real time:
//!
//! - [`Engine`] - owns the graph, its services and every thread below
//! - [`ThreadTree`] - named threads with frequencies, started parents first
//! - [`AudioLoop`] - reset, tick and present, paced by the soundcard
//! - [`TaskLauncher`] - the single writer of the graph, between ticks
//! - [`WorkerThread`] - blocking recall work, off the tick path
//! - [`ChannelThread`] - one scope of a super-threaded channel
//! - [`PlaybackTable`] - per-channel, per-scope run slots
//!
//! ## Quick Start
//!
//! ```rust
//! use ags_core::loader::SineLoader;
//! use ags_core::recall::builtin::playback_chain;
//! use ags_core::tasks::{AddAudio, AddRecallContainer};
//! use ags_core::{AudioSpec, EngineSettings, InMemorySoundcard, Presentation, ScopeSet};
//! use ags_core::{SoundScope, StartRequest, TaskReport};
//! use ags_thread::Engine;
//!
//! let settings = EngineSettings::default();
//! let card = InMemorySoundcard::new(Presentation::from_settings(&settings));
//! let mut engine = Engine::new(settings, card)?;
//!
//! let Ok(TaskReport::Audio(synth)) = engine.submit_wait(AddAudio::new(AudioSpec::new("synth"))) else {
//!     panic!("no audio");
//! };
//! for spec in playback_chain(SineLoader::default(), Some(2048), ScopeSet::ALL) {
//!     engine.submit_wait(AddRecallContainer { audio: synth, spec })?;
//! }
//! let out = engine.read(|g| g.audio(synth).unwrap().outputs()[0]);
//! engine.play(StartRequest::new(out, SoundScope::Playback))?;
//!
//! let summary = engine.run_ticks(8)?;
//! assert_eq!(summary.finished, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod audio_loop;
mod channel_thread;
mod engine;
mod error;
mod launcher;
mod playback;
mod tree;
mod worker;

pub use audio_loop::{AudioLoop, SharedSoundcard};
pub use channel_thread::{ChannelRunner, ChannelThread};
pub use engine::{Engine, SUPER_THREADED_SCOPES};
pub use error::{Result, ThreadError};
pub use launcher::{CyclicId, TaskLauncher};
pub use playback::{Playback, PlaybackTable};
pub use tree::{NodeId, StopToken, ThreadBody, ThreadSpec, ThreadTree};
pub use worker::WorkerThread;
