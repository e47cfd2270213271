//! Shared CLI helpers used across multiple commands.

use std::path::Path;

use ags_config::EngineConfig;
use ags_core::{EngineSettings, Fault, TickSummary};
use anyhow::Context;

/// Loads engine settings from `explicit`, or from the per-user config file
/// when there is one. An explicit path has to exist.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<EngineSettings> {
    let path = ags_config::config_path(explicit);
    let config = if explicit.is_some() {
        EngineConfig::load(&path)
    } else {
        EngineConfig::load_or_default(&path)
    }
    .with_context(|| format!("loading {}", path.display()))?;
    config
        .settings()
        .with_context(|| format!("invalid config {}", path.display()))
}

/// Ticks in one eighth note at `bpm`. Never less than one.
pub fn ticks_per_step(settings: &EngineSettings, bpm: f64) -> u64 {
    let beat = 60.0 / bpm.max(1.0);
    let ticks = beat * f64::from(settings.samplerate) / settings.buffer_size.max(1) as f64 / 2.0;
    (ticks.round() as u64).max(1)
}

/// Prints tick totals and any recorded faults.
pub fn print_summary(ticks: u64, totals: &TickSummary, faults: &[Fault]) {
    println!("Ticks: {ticks}");
    println!(
        "Runs: {} finished, {} cancelled",
        totals.finished, totals.cancelled
    );
    if !faults.is_empty() {
        println!("Faults: {}", faults.len());
        for fault in faults.iter().take(5) {
            println!("  {fault}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eighth_notes_at_120_bpm() {
        let settings = EngineSettings {
            samplerate: 48000,
            buffer_size: 480,
            ..EngineSettings::default()
        };
        assert_eq!(ticks_per_step(&settings, 120.0), 25);
        assert_eq!(ticks_per_step(&settings, 1e9), 1);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_settings(Some(&dir.path().join("none.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read file"));
    }
}
