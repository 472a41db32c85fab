//! Application configuration for importkit.
//!
//! User config lives at `~/.importkit/importkit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImportKitError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "importkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".importkit";

// ---------------------------------------------------------------------------
// Config structs (matching importkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of elements processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Deepest transform tree a mapping may define.
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,

    /// Import unpublished elements too.
    #[serde(default)]
    pub admin_mode: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_tree_depth: default_max_tree_depth(),
            admin_mode: false,
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_max_tree_depth() -> usize {
    32
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the libSQL database targets are saved to.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "importkit.db".into()
}

// ---------------------------------------------------------------------------
// Run settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Run-scoped settings handed to the pipeline entry point.
///
/// Nothing here is process-global: two runs in one process may use
/// different settings.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Maximum elements in flight at once.
    pub concurrency: u32,
    /// Import unpublished elements too.
    pub admin_mode: bool,
    /// Transform rows but skip saving.
    pub dry_run: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RunSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.concurrency,
            admin_mode: config.defaults.admin_mode,
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.importkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ImportKitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.importkit/importkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ImportKitError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ImportKitError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ImportKitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ImportKitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ImportKitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings no run could work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.defaults.concurrency == 0 {
        return Err(ImportKitError::config("defaults.concurrency must be at least 1"));
    }
    if config.defaults.max_tree_depth == 0 {
        return Err(ImportKitError::config(
            "defaults.max_tree_depth must be at least 1",
        ));
    }
    Ok(())
}
