//! Sync configuration.
//!
//! Handles loading, validating, merging, and saving `lowres-sync.toml`.
//! Stock defaults are the base layer; the user file is merged on top, and
//! command-line flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source = ""                 # Full-resolution photo tree (required to sync)
//! target = ""                 # Low-resolution mirror (required to sync)
//!
//! [resize]
//! max_long_side = 1920        # Longest edge of generated images, in pixels
//! quality = 85                # JPEG quality (1-100)
//! # tool = "/usr/bin/nconvert" # External resize tool (omit for built-in)
//! timeout_secs = 5            # Hard wait bound for the external tool
//!
//! [sync]
//! existing_files = "skip"     # skip | overwrite | overwrite-if-lower-resolution
//! follow_progress = false     # Report every finished file
//! extensions = ["jpg", "jpeg"]
//!
//! [processing]
//! max_processes = 4           # Max parallel workers (omit for auto = CPU cores)
//!
//! [metadata]
//! enabled = true              # Extract EXIF metadata into the store
//! store = "photo-metadata.json" # Relative paths resolve against the target root
//! batch_size = 50             # Records per store commit
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::types::ExistingFileAction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "lowres-sync.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Everything a sync run needs to know.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Root of the full-resolution tree.
    pub source: PathBuf,
    /// Root of the low-resolution mirror.
    pub target: PathBuf,
    pub resize: ResizeConfig,
    pub sync: SyncSettings,
    pub processing: ProcessingConfig,
    pub metadata: MetadataConfig,
}

/// How target images are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub max_long_side: u32,
    pub quality: u32,
    /// External nconvert-compatible binary. `None` uses the built-in resizer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            max_long_side: 1920,
            quality: 85,
            tool: None,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub existing_files: ExistingFileAction,
    /// Emit a progress event for every finished file.
    pub follow_progress: bool,
    /// Image extensions to mirror, without the dot. Case-insensitive.
    pub extensions: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            existing_files: ExistingFileAction::Skip,
            follow_progress: false,
            extensions: vec!["jpg".into(), "jpeg".into()],
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of files processed at once.
    /// When absent, defaults to the number of CPU cores. Values above the
    /// core count are honored; conversions through an external tool spend
    /// most of their time waiting on the child process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `n` as given, at least 1
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    config
        .max_processes
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub enabled: bool,
    /// Store file. Relative paths are resolved against the target root.
    pub store: PathBuf,
    pub batch_size: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: PathBuf::from("photo-metadata.json"),
            batch_size: crate::writer::DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resize.max_long_side == 0 {
            return Err(ConfigError::Validation(
                "resize.max_long_side must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.resize.quality) {
            return Err(ConfigError::Validation(
                "resize.quality must be 1-100".into(),
            ));
        }
        if self.resize.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "resize.timeout_secs must be positive".into(),
            ));
        }
        if self.sync.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "sync.extensions must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.metadata.batch_size == 0 {
            return Err(ConfigError::Validation(
                "metadata.batch_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Check that both roots are set, the source exists, and neither tree
    /// contains the other.
    pub fn validate_roots(&self) -> Result<(), ConfigError> {
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::Validation("source is not set".into()));
        }
        if self.target.as_os_str().is_empty() {
            return Err(ConfigError::Validation("target is not set".into()));
        }
        if !self.source.is_dir() {
            return Err(ConfigError::Validation(format!(
                "source {} is not a directory",
                self.source.display()
            )));
        }
        let source = absolute(&self.source);
        let target = absolute(&self.target);
        if source.starts_with(&target) || target.starts_with(&source) {
            return Err(ConfigError::Validation(format!(
                "source {} and target {} must not contain each other",
                source.display(),
                target.display()
            )));
        }
        Ok(())
    }

    /// Location of the metadata store file.
    pub fn resolve_store_path(&self) -> PathBuf {
        if self.metadata.store.is_absolute() {
            self.metadata.store.clone()
        } else {
            self.target.join(&self.metadata.store)
        }
    }
}

/// Canonical form of `path`, which need not exist yet: the longest existing
/// ancestor is canonicalized and the remaining components re-appended.
fn absolute(path: &Path) -> PathBuf {
    let full = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = full.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return full,
        }
    }
    let mut resolved = fs::canonicalize(existing).unwrap_or_else(|_| existing.to_path_buf());
    resolved.extend(rest.iter().rev());
    resolved
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub max_long_side: Option<u32>,
    pub concurrency: Option<usize>,
    pub existing_files: Option<ExistingFileAction>,
    pub no_metadata: bool,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut SyncConfig) {
        if let Some(v) = self.source {
            config.source = v;
        }
        if let Some(v) = self.target {
            config.target = v;
        }
        if let Some(v) = self.max_long_side {
            config.resize.max_long_side = v;
        }
        if let Some(v) = self.concurrency {
            config.processing.max_processes = Some(v);
        }
        if let Some(v) = self.existing_files {
            config.sync.existing_files = v;
        }
        if self.no_metadata {
            config.metadata.enabled = false;
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SyncConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SyncConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SyncConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to defaults when the file is absent.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Write the effective config to `path`.
pub fn save_config(config: &SyncConfig, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Returns a fully-commented stock `lowres-sync.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# lowres-sync Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Full-resolution photo tree. Required to sync (or pass --source).
source = ""

# Low-resolution mirror. Required to sync (or pass --target).
# Files and folders here without a source counterpart are deleted.
target = ""

# ---------------------------------------------------------------------------
# Resizing
# ---------------------------------------------------------------------------
[resize]
# Longest edge of generated images, in pixels. Smaller sources are copied
# unchanged.
max_long_side = 1920

# JPEG encoding quality (1 = worst, 100 = best).
quality = 85

# External nconvert-compatible resize tool, invoked as
#   <tool> -out jpeg -resize longest <N> -o <target> <source>
# Omit to use the built-in resizer.
# tool = "/usr/local/bin/nconvert"

# Seconds to wait for the external tool before killing it.
timeout_secs = 5

# ---------------------------------------------------------------------------
# Synchronization
# ---------------------------------------------------------------------------
[sync]
# What to do when a target file already exists:
#   skip                          - keep it (and skip stored metadata)
#   overwrite                     - rebuild it
#   overwrite-if-lower-resolution - rebuild only if it is smaller than needed
existing_files = "skip"

# Print a line for every finished file.
follow_progress = false

# Source file extensions to mirror (case-insensitive, no dot).
extensions = ["jpg", "jpeg"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum files processed at once.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Metadata
# ---------------------------------------------------------------------------
[metadata]
# Extract EXIF metadata (camera, exposure, date taken) into the store.
enabled = true

# Store file. Relative paths are resolved against the target root.
store = "photo-metadata.json"

# Records written per store commit.
batch_size = 50
"##
}
