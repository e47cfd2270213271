//! Engine configuration file format and operations.

use std::path::Path;

use ags_core::{EngineSettings, ResolvePasses, SampleFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{self, PER_RECALL, ValidationError};

/// How many resolve passes a run gets, as written in the config file:
/// either `"per-recall"` or a pass count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolvePassesSetting {
    /// Fixed pass count.
    Fixed(u32),
    /// Named policy. Only `"per-recall"` is known.
    Policy(String),
}

impl Default for ResolvePassesSetting {
    fn default() -> Self {
        ResolvePassesSetting::Policy(PER_RECALL.to_string())
    }
}

impl From<ResolvePasses> for ResolvePassesSetting {
    fn from(passes: ResolvePasses) -> Self {
        match passes {
            ResolvePasses::PerRecall => ResolvePassesSetting::default(),
            ResolvePasses::Fixed(n) => ResolvePassesSetting::Fixed(n),
        }
    }
}

impl TryFrom<&ResolvePassesSetting> for ResolvePasses {
    type Error = ValidationError;

    fn try_from(setting: &ResolvePassesSetting) -> Result<Self, Self::Error> {
        validation::validate_resolve_passes(setting)?;
        Ok(match setting {
            ResolvePassesSetting::Fixed(n) => ResolvePasses::Fixed(*n),
            ResolvePassesSetting::Policy(_) => ResolvePasses::PerRecall,
        })
    }
}

/// Engine configuration file.
///
/// Every key is optional; missing keys take the engine defaults.
///
/// # TOML Format
///
/// ```toml
/// samplerate = 48000
/// buffer_size = 256
/// format = "f32"
/// audio_channels = 2
/// super_threaded = false
/// resolve_passes = "per-recall"
/// realtime_budget = 0.8
/// worker_timeout_ticks = 4
/// stream_retain = 16
/// fault_capacity = 256
/// bpm = 120.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub samplerate: u32,
    /// Frames per tick.
    pub buffer_size: usize,
    /// Soundcard sample format name.
    pub format: String,
    /// Soundcard channel count.
    pub audio_channels: usize,
    /// Give every output channel a dedicated thread per scope.
    pub super_threaded: bool,
    /// Resolve retry policy.
    pub resolve_passes: ResolvePassesSetting,
    /// Fraction of the tick period a leaf recall may use.
    pub realtime_budget: f32,
    /// Ticks a worker reply may be outstanding before it is reported.
    pub worker_timeout_ticks: u64,
    /// Buffers an audio signal keeps behind its position.
    pub stream_retain: usize,
    /// Runtime fault log capacity.
    pub fault_capacity: usize,
    /// Initial tempo.
    pub bpm: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            samplerate: settings.samplerate,
            buffer_size: settings.buffer_size,
            format: settings.format.to_string(),
            audio_channels: settings.audio_channels,
            super_threaded: settings.super_threaded,
            resolve_passes: settings.resolve_passes.into(),
            realtime_budget: settings.realtime_budget,
            worker_timeout_ticks: settings.worker_timeout_ticks,
            stream_retain: settings.stream_retain,
            fault_capacity: settings.fault_capacity,
            bpm: settings.bpm,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with every key at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sample rate.
    pub fn with_samplerate(mut self, samplerate: u32) -> Self {
        self.samplerate = samplerate;
        self
    }

    /// Set the frames per tick.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the sample format.
    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format.to_string();
        self
    }

    /// Set the soundcard channel count.
    pub fn with_audio_channels(mut self, audio_channels: usize) -> Self {
        self.audio_channels = audio_channels;
        self
    }

    /// Enable or disable per-channel threads.
    pub fn with_super_threaded(mut self, super_threaded: bool) -> Self {
        self.super_threaded = super_threaded;
        self
    }

    /// Set the resolve retry policy.
    pub fn with_resolve_passes(mut self, passes: ResolvePasses) -> Self {
        self.resolve_passes = passes.into();
        self
    }

    /// Set the leaf budget fraction.
    pub fn with_realtime_budget(mut self, budget: f32) -> Self {
        self.realtime_budget = budget;
        self
    }

    /// Set the initial tempo.
    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("config: loaded {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("config: {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        tracing::debug!("config: saved {}", path.display());
        Ok(())
    }

    /// Check every key against the ranges the engine accepts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)?;
        Ok(())
    }

    /// Validated runtime settings.
    pub fn settings(&self) -> Result<EngineSettings, ConfigError> {
        self.validate()?;
        Ok(EngineSettings {
            samplerate: self.samplerate,
            buffer_size: self.buffer_size,
            format: validation::parse_format(&self.format)?,
            audio_channels: self.audio_channels,
            super_threaded: self.super_threaded,
            resolve_passes: ResolvePasses::try_from(&self.resolve_passes)?,
            realtime_budget: self.realtime_budget,
            worker_timeout_ticks: self.worker_timeout_ticks,
            stream_retain: self.stream_retain,
            fault_capacity: self.fault_capacity,
            bpm: self.bpm,
        })
    }
}
