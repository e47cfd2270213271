//! Range and format checks for [`EngineConfig`](crate::EngineConfig).
//!
//! Every key is checked and all failures are reported together, so a user
//! fixing a config file sees the whole list at once.

use std::ops::RangeInclusive;
use std::str::FromStr;

use ags_core::SampleFormat;
use thiserror::Error;

use crate::config::{EngineConfig, ResolvePassesSetting};

/// Accepted sample rates in Hz.
pub const SAMPLERATE_RANGE: RangeInclusive<u32> = 8_000..=384_000;
/// Accepted frames per tick.
pub const BUFFER_SIZE_RANGE: RangeInclusive<usize> = 16..=16_384;
/// Accepted soundcard channel counts.
pub const AUDIO_CHANNELS_RANGE: RangeInclusive<usize> = 1..=64;
/// Accepted leaf budgets, as a fraction of the tick period.
pub const REALTIME_BUDGET_RANGE: RangeInclusive<f32> = 0.01..=100.0;
/// Accepted fixed resolve pass counts.
pub const RESOLVE_PASSES_RANGE: RangeInclusive<u32> = 1..=1024;
/// Accepted worker timeouts in ticks.
pub const WORKER_TIMEOUT_RANGE: RangeInclusive<u64> = 1..=10_000;
/// Accepted stream retention in buffers.
pub const STREAM_RETAIN_RANGE: RangeInclusive<usize> = 1..=4096;
/// Accepted fault log capacities.
pub const FAULT_CAPACITY_RANGE: RangeInclusive<usize> = 1..=1_000_000;
/// Accepted tempi in beats per minute.
pub const BPM_RANGE: RangeInclusive<f64> = 1.0..=999.0;

/// Name of the per-recall resolve policy in config files.
pub const PER_RECALL: &str = "per-recall";

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Numeric value out of range.
    #[error("'{key}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Config key.
        key: String,
        /// Offending value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// Value of the right type but not one the engine knows.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Config key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Number of individual problems reported.
    pub fn count(&self) -> usize {
        match self {
            ValidationError::Multiple(errors) => errors.len(),
            _ => 1,
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn check_range<T>(errors: &mut Vec<ValidationError>, key: &str, value: T, range: &RangeInclusive<T>)
where
    T: PartialOrd + Copy + Into<f64>,
{
    if !range.contains(&value) {
        errors.push(ValidationError::OutOfRange {
            key: key.to_string(),
            value: value.into(),
            min: (*range.start()).into(),
            max: (*range.end()).into(),
        });
    }
}

fn check_count(errors: &mut Vec<ValidationError>, key: &str, value: usize, range: &RangeInclusive<usize>) {
    if !range.contains(&value) {
        errors.push(ValidationError::OutOfRange {
            key: key.to_string(),
            value: value as f64,
            min: *range.start() as f64,
            max: *range.end() as f64,
        });
    }
}

/// Parses the `format` key.
pub fn parse_format(format: &str) -> ValidationResult<SampleFormat> {
    SampleFormat::from_str(format).map_err(|_| ValidationError::InvalidValue {
        key: "format".to_string(),
        reason: format!("unknown sample format '{format}', expected one of s16, s24, s32, f32, f64"),
    })
}

/// Checks the `resolve_passes` key.
pub fn validate_resolve_passes(setting: &ResolvePassesSetting) -> ValidationResult<()> {
    match setting {
        ResolvePassesSetting::Policy(name) if name == PER_RECALL => Ok(()),
        ResolvePassesSetting::Policy(name) => Err(ValidationError::InvalidValue {
            key: "resolve_passes".to_string(),
            reason: format!("expected '{PER_RECALL}' or a pass count, got '{name}'"),
        }),
        ResolvePassesSetting::Fixed(n) => {
            let mut errors = Vec::new();
            check_range(&mut errors, "resolve_passes", *n, &RESOLVE_PASSES_RANGE);
            errors.pop().map_or(Ok(()), Err)
        }
    }
}

/// Checks every key of `config`.
///
/// A single problem is returned as is; several come back as
/// [`ValidationError::Multiple`].
pub fn validate_config(config: &EngineConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();

    check_range(&mut errors, "samplerate", config.samplerate, &SAMPLERATE_RANGE);
    check_count(&mut errors, "buffer_size", config.buffer_size, &BUFFER_SIZE_RANGE);
    if let Err(e) = parse_format(&config.format) {
        errors.push(e);
    }
    check_count(&mut errors, "audio_channels", config.audio_channels, &AUDIO_CHANNELS_RANGE);
    if let Err(e) = validate_resolve_passes(&config.resolve_passes) {
        errors.push(e);
    }
    check_range(
        &mut errors,
        "realtime_budget",
        config.realtime_budget,
        &REALTIME_BUDGET_RANGE,
    );
    if !WORKER_TIMEOUT_RANGE.contains(&config.worker_timeout_ticks) {
        errors.push(ValidationError::OutOfRange {
            key: "worker_timeout_ticks".to_string(),
            value: config.worker_timeout_ticks as f64,
            min: *WORKER_TIMEOUT_RANGE.start() as f64,
            max: *WORKER_TIMEOUT_RANGE.end() as f64,
        });
    }
    check_count(&mut errors, "stream_retain", config.stream_retain, &STREAM_RETAIN_RANGE);
    check_count(&mut errors, "fault_capacity", config.fault_capacity, &FAULT_CAPACITY_RANGE);
    check_range(&mut errors, "bpm", config.bpm, &BPM_RANGE);

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}
