//! Configuration – reads/writes `~/.almue/config.toml`.
//!
//! ```toml
//! simulate = false
//! database_path = "/var/lib/almue/almue.db"
//!
//! [[shutters]]
//! id = 1
//! description = "Living room"
//! openPin = 17
//! closePin = 27
//! completeWayInSeconds = 20
//! jobsEnabled = true
//! openTime = "07:00:00"
//! closeTime = "21:00:00"
//!
//! [[lightings]]
//! id = 1
//! switchPin = 22
//! onTime = "18:00:00"
//! offTime = "23:00:00"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use almue_types::{LightingDescriptor, ShutterDescriptor};
use serde::{Deserialize, Serialize};

/// Persisted controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Drive simulated lines instead of the GPIO header.
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    /// SQLite file that records device states.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shutters: Vec<ShutterDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lightings: Vec<LightingDescriptor>,
}

fn default_simulate() -> bool {
    true
}
fn default_database_path() -> String {
    "almue.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulate: default_simulate(),
            database_path: default_database_path(),
            shutters: Vec::new(),
            lightings: Vec::new(),
        }
    }
}

/// Return `$ALMUE_CONFIG`, or `~/.almue/config.toml` when it is unset.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ALMUE_CONFIG")
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".almue").join("config.toml")
}

/// Load the config from disk with environment overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ALMUE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ALMUE_SIMULATE` | `simulate` (`true`/`false`/`1`/`0`) |
/// | `ALMUE_DATABASE` | `database_path` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ALMUE_SIMULATE")
        && let Some(simulate) = parse_flag(&v)
    {
        cfg.simulate = simulate;
    }
    if let Ok(v) = std::env::var("ALMUE_DATABASE")
        && !v.is_empty()
    {
        cfg.database_path = v;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating the parent directory if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
