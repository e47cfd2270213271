//! Error types for the threaded engine.

use std::io;

use ags_core::{EngineError, Presentation, SoundcardError};
use thiserror::Error;

/// Errors from starting, stopping or driving the engine.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// The OS refused to spawn a thread.
    #[error("failed to spawn thread '{name}'")]
    Spawn {
        /// Thread name.
        name: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The engine threads are already running.
    #[error("engine already running")]
    AlreadyRunning,

    /// The operation needs the engine threads to be running.
    #[error("engine not running")]
    NotRunning,

    /// The soundcard runs at other parameters than the engine.
    #[error("soundcard presents {card:?} but the engine runs at {engine:?}")]
    Presentation {
        /// What the soundcard reports.
        card: Presentation,
        /// What the engine settings ask for.
        engine: Presentation,
    },

    /// A thread node was not found.
    #[error("unknown thread node {0}")]
    UnknownNode(usize),

    /// A task answered with a report its submitter did not ask for.
    #[error("task {0} returned an unexpected report")]
    UnexpectedReport(&'static str),

    /// A thread panicked.
    #[error("thread '{0}' panicked")]
    Panicked(String),

    /// Soundcard failure.
    #[error(transparent)]
    Soundcard(#[from] SoundcardError),

    /// Graph or task failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ThreadError {
    /// Create a spawn error.
    pub fn spawn(name: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            name: name.into(),
            source,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ThreadError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn spawn_error_keeps_source() {
        let err = ThreadError::spawn("ags-worker", io::Error::other("no threads left"));
        assert_eq!(err.to_string(), "failed to spawn thread 'ags-worker'");
        assert!(err.source().is_some());
    }

    #[test]
    fn soundcard_errors_convert() {
        let err: ThreadError = SoundcardError::Unavailable("gone".into()).into();
        assert_eq!(err.to_string(), "device unavailable: gone");
    }
}
