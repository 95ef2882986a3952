//! Configuration file loading and path resolution
//!
//! Config files are TOML. Path resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/<app>/config.toml`)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Resolve the config file path for `app_name`, if any exists.
///
/// A path given explicitly (CLI or env var) is returned even when the file
/// does not exist, so a typo surfaces as a load error instead of silently
/// falling back to defaults.
pub fn resolve_config_path(
    cli_arg: Option<&str>,
    env_var_name: &str,
    app_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var(env_var_name) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join(app_name).join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// Load and parse a TOML config file.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write a TOML config file, creating parent directories as needed.
///
/// Writes to a temporary sibling first so a crash mid-write never leaves a
/// truncated config behind.
pub fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        warn!("Atomic rename failed, falling back to direct write: {}", e);
        std::fs::copy(&tmp, path)?;
        let _ = std::fs::remove_file(&tmp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let original = Sample {
            name: "overpass".to_string(),
            count: 3,
        };
        write_toml(&original, &path).unwrap();
        let loaded: Sample = load_toml(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = load_toml::<Sample>(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_arg_wins_resolution() {
        let path = resolve_config_path(Some("/tmp/explicit.toml"), "BIOGEO_TEST_NO_SUCH_VAR", "x");
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }
}
