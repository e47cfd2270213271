//! AGS Core - recall graph execution engine
//!
//! This crate holds the audio data model and the staged protocol that runs
//! behavior on it, one tick at a time, without tearing down running audio
//! when the graph changes.
//!
//! # Data Model
//!
//! Everything lives in one [`AudioGraph`], addressed by typed handles:
//!
//! - [`Audio`] - an instrument or track with a pad/line grid of [`Channel`]s
//! - [`Recycling`] - the signal pool of one channel
//! - [`AudioSignal`] - one voice's stream of fixed-size buffers
//! - [`RecyclingContext`] - a voice node in the context tree
//!
//! # Recalls
//!
//! - [`Recall`] - a behavior unit bound to one graph layer
//! - [`RecallContainer`] - the recalls of one effect, added and removed as a unit
//! - [`RecallId`] - one running instantiation for a scope and a context
//! - [`recall::builtin`] - feed, volume, play, pull, notation and plugin recalls
//!
//! # Staging
//!
//! Every run moves through resolve, init (pre/inter/post), run (pre/inter/post
//! per tick), cancel and remove. Transitions are checked against
//! [`StagingState`]; illegal ones return a [`StagingError`].
//!
//! # Mutation
//!
//! The tick only ever reads the graph. Structural changes are [`Task`]s
//! queued on a [`TaskSender`](task::TaskSender) and applied between ticks.
//!
//! # Example
//!
//! ```rust
//! use ags_core::loader::SineLoader;
//! use ags_core::recall::builtin::playback_chain;
//! use ags_core::{AudioGraph, AudioSpec, EngineContext, EngineSettings, ScopeSet, SoundScope, StartRequest};
//!
//! let settings = EngineSettings::default();
//! let (engine, tasks) = EngineContext::new(settings.clone());
//! let mut graph = AudioGraph::new(settings);
//! let synth = graph.add_audio(AudioSpec::new("synth").with_audio_channels(2));
//! for spec in playback_chain(SineLoader::default(), Some(44_100), ScopeSet::ALL) {
//!     graph.add_container(synth, spec).unwrap();
//! }
//! let left = graph.audio(synth).unwrap().outputs()[0];
//! graph.start_channel(&engine, StartRequest::new(left, SoundScope::Playback)).unwrap();
//!
//! let summary = graph.tick(&engine);
//! assert_eq!(summary.recall_ids, 1);
//! assert!(engine.bus().lane(0).iter().any(|&s| s != 0.0));
//! tasks.drain(&mut graph, &engine);
//! ```

mod arena;
pub mod engine;
pub mod error;
pub mod fault;
pub mod graph;
pub mod ids;
pub mod loader;
pub mod note;
pub mod plugin;
pub mod port;
pub mod recall;
pub mod recall_id;
pub mod settings;
pub mod signal;
pub mod sound;
pub mod soundcard;
pub mod staging;
pub mod task;
pub mod tasks;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{Clock, EngineContext, OutputBus};
pub use error::{EngineError, Result, StagingError, TopologyError, WiringError};
pub use fault::{Fault, FaultLog};
pub use graph::{Audio, AudioGraph, AudioSpec, Channel, Recycling, RecyclingContext, ResizeReport};
pub use ids::{AudioId, ChannelId, ContainerId, ContextId, RecallIdKey, RecallKey, RecyclingId, SignalId};
pub use note::{ChannelNoteFeed, Note, NoteEvent, NoteFeed};
pub use port::{Port, PortDescriptor, PortSet};
pub use recall::{
    Binding, ContainerSpec, InitStage, Recall, RecallBehavior, RecallContainer, RecallError,
    RecallFlags, RecallInfo, RecallLayer, RecallPrototype, RunOutcome, RunStage, StageContext,
    StartReport, StartRequest,
};
pub use recall_id::{RecallId, RunState, StagingState, find_parent_recycling_context, find_recycling_context};
pub use settings::{EngineSettings, ResolvePasses};
pub use signal::AudioSignal;
pub use sound::{AudioBehaviour, Direction, ParseSampleFormatError, SampleFormat, ScopeSet, SoundScope};
pub use soundcard::{InMemorySoundcard, Presentation, Soundcard, SoundcardError};
pub use staging::TickSummary;
pub use task::{Task, TaskHandle, TaskReport};
