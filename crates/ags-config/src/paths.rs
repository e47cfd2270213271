//! Platform-specific configuration paths.
//!
//! - **User config**: `~/.config/ags/` (Linux), `~/Library/Application Support/ags/` (macOS), `%APPDATA%\ags\` (Windows)
//! - **Engine config file**: `engine.toml` inside the user config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use ags_config::{EngineConfig, paths};
//!
//! let config = EngineConfig::load_or_default(paths::default_config_path()).unwrap();
//! println!("{} Hz", config.samplerate);
//! ```

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "ags";

/// File name of the engine configuration.
pub const CONFIG_FILE: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// # Platform Paths
///
/// - Linux: `~/.config/ags/`
/// - macOS: `~/Library/Application Support/ags/`
/// - Windows: `%APPDATA%\ags\`
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the engine configuration file in the user config directory.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// `explicit` if given, otherwise [`default_config_path`].
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(default_config_path, Path::to_path_buf)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_config_dir() {
        let dir = user_config_dir();
        assert!(dir.ends_with(APP_NAME));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(CONFIG_FILE));
        assert_eq!(path.parent(), Some(user_config_dir().as_path()));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/tmp/custom.toml");
        assert_eq!(config_path(Some(explicit)), explicit);
        assert_eq!(config_path(None), default_config_path());
    }
}
