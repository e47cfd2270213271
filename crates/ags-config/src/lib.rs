//! Engine configuration for the AGS recall engine.
//!
//! The engine itself runs on [`ags_core::EngineSettings`]; this crate is the
//! file-backed side of it.
//!
//! - **Config file**: [`EngineConfig`] loads and saves TOML, every key optional
//! - **Validation**: ranges and names checked before the engine sees them
//! - **Paths**: per-user config directory and default file location
//!
//! # Example
//!
//! ```rust
//! use ags_config::EngineConfig;
//!
//! let config = EngineConfig::from_toml("samplerate = 48000\nbuffer_size = 256\n")?;
//! let settings = config.settings()?;
//! assert_eq!(settings.samplerate, 48000);
//! assert_eq!(settings.audio_channels, 2);
//! # Ok::<(), ags_config::ConfigError>(())
//! ```

mod config;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

/// Configuration validation.
pub mod validation;

pub use config::{EngineConfig, ResolvePassesSetting};
pub use error::ConfigError;
pub use paths::{config_path, default_config_path, ensure_user_config_dir, user_config_dir};
pub use validation::{ValidationError, ValidationResult, validate_config};
