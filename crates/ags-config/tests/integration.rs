//! Integration tests for ags-config.
//!
//! These go from a file on disk to running engine settings.

use ags_config::{ConfigError, EngineConfig, ResolvePassesSetting, ValidationError};
use ags_core::{EngineSettings, ResolvePasses, SampleFormat};
use tempfile::TempDir;

// ============================================================================
// File round trips
// ============================================================================

#[test]
fn saved_config_loads_back_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");

    let config = EngineConfig::new()
        .with_samplerate(96000)
        .with_buffer_size(64)
        .with_format(SampleFormat::F64)
        .with_super_threaded(true)
        .with_resolve_passes(ResolvePasses::Fixed(5))
        .with_realtime_budget(0.25)
        .with_bpm(174.0);
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.settings().unwrap(), config.settings().unwrap());
}

#[test]
fn hand_written_file_is_understood() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        r#"
# studio machine
samplerate = 48000
buffer_size = 128
format = "S32"
audio_channels = 8
resolve_passes = 2
fault_capacity = 1024
"#,
    )
    .unwrap();

    let settings = EngineConfig::load(&path).unwrap().settings().unwrap();
    assert_eq!(
        settings,
        EngineSettings {
            samplerate: 48000,
            buffer_size: 128,
            format: SampleFormat::S32,
            audio_channels: 8,
            resolve_passes: ResolvePasses::Fixed(2),
            fault_capacity: 1024,
            ..EngineSettings::default()
        }
    );
    assert!((settings.tick_period().as_secs_f64() - 128.0 / 48000.0).abs() < 1e-9);
}

#[test]
fn settings_survive_a_trip_through_the_file_format() {
    let settings = EngineSettings {
        samplerate: 22050,
        buffer_size: 1024,
        audio_channels: 1,
        resolve_passes: ResolvePasses::Fixed(7),
        stream_retain: 4,
        ..EngineSettings::default()
    };
    let text = EngineConfig::from(&settings).to_toml().unwrap();
    let back = EngineConfig::from_toml(&text).unwrap().settings().unwrap();
    assert_eq!(back, settings);
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn broken_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "samplerate = [").unwrap();
    assert!(matches!(EngineConfig::load(&path), Err(ConfigError::TomlParse(_))));
}

#[test]
fn out_of_range_values_are_listed_together() {
    let config = EngineConfig {
        samplerate: 1,
        audio_channels: 0,
        resolve_passes: ResolvePassesSetting::Fixed(0),
        ..EngineConfig::default()
    };
    let Err(ConfigError::Validation(ValidationError::Multiple(errors))) = config.settings() else {
        panic!("expected several validation errors");
    };
    let keys: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            ValidationError::OutOfRange { key, .. } => Some(key.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(keys, ["samplerate", "audio_channels", "resolve_passes"]);
}
