//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Individual values can be
//! overridden from the environment, and the binary layers command-line
//! arguments on top.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--port`, `--root-folder`, `--boundary`)
//! 2. Environment variables (`FW_ROOT_FOLDER`, `FW_PORT`, ...)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ENV_ROOT_FOLDER: &str = "FW_ROOT_FOLDER";
/// Environment variable overriding the HTTP port
pub const ENV_PORT: &str = "FW_PORT";
/// Environment variable overriding the deforestation threshold
pub const ENV_DEFORESTATION_THRESHOLD: &str = "FW_DEFORESTATION_THRESHOLD";
/// Environment variable overriding the maximum acceptable cloud cover
pub const ENV_MAX_CLOUD_COVER: &str = "FW_MAX_CLOUD_COVER";
/// Environment variable carrying the narrative generator API key
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding outputs and the default boundary file
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Boundary polygon file (JSON). Defaults to `<root>/boundary.json`
    #[serde(default)]
    pub boundary_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Analysis parameters
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Narrative generation settings
    #[serde(default)]
    pub narrative: NarrativeConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            bind_address: default_bind_address(),
            boundary_path: None,
            logging: LoggingConfig::default(),
            analysis: AnalysisConfig::default(),
            narrative: NarrativeConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Pixel adjacency used when merging changed pixels into patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Orthogonal neighbours only
    Four,
    /// Orthogonal and diagonal neighbours
    #[default]
    Eight,
}

/// Parameters controlling change detection and classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// A pixel is changed iff its probability is at least this value
    #[serde(default = "default_deforestation_threshold")]
    pub deforestation_threshold: f32,

    /// Probabilities above this value render as confirmed loss
    #[serde(default = "default_confirmed_threshold")]
    pub confirmed_threshold: f32,

    /// Probabilities at or above this value (up to confirmed) render as possible degradation
    #[serde(default = "default_degradation_threshold")]
    pub degradation_threshold: f32,

    /// Patch adjacency policy
    #[serde(default)]
    pub connectivity: Connectivity,

    /// Components smaller than this many pixels are dropped from the mask (0 = keep all)
    #[serde(default)]
    pub min_patch_pixels: usize,

    /// Scenes with more cloud cover than this percentage are rejected
    #[serde(default = "default_max_cloud_cover")]
    pub max_cloud_cover: f32,

    /// Ground sample distance of generated imagery, metres per pixel
    #[serde(default = "default_image_resolution")]
    pub image_resolution: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            deforestation_threshold: default_deforestation_threshold(),
            confirmed_threshold: default_confirmed_threshold(),
            degradation_threshold: default_degradation_threshold(),
            connectivity: Connectivity::default(),
            min_patch_pixels: 0,
            max_cloud_cover: default_max_cloud_cover(),
            image_resolution: default_image_resolution(),
        }
    }
}

impl AnalysisConfig {
    /// Reject parameter combinations the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("deforestation_threshold", self.deforestation_threshold),
            ("confirmed_threshold", self.confirmed_threshold),
            ("degradation_threshold", self.degradation_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.degradation_threshold > self.confirmed_threshold {
            return Err(Error::Config(format!(
                "degradation_threshold ({}) must not exceed confirmed_threshold ({})",
                self.degradation_threshold, self.confirmed_threshold
            )));
        }

        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(Error::Config(format!(
                "max_cloud_cover must be within [0, 100], got {}",
                self.max_cloud_cover
            )));
        }

        if !(self.image_resolution > 0.0) {
            return Err(Error::Config(format!(
                "image_resolution must be positive, got {}",
                self.image_resolution
            )));
        }

        Ok(())
    }
}

/// Narrative generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// API key; the offline template narrator is used when absent
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name passed to the generator
    #[serde(default = "default_narrative_model")]
    pub model: String,

    /// Base URL of the generation API
    #[serde(default = "default_narrative_endpoint")]
    pub endpoint: String,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_narrative_model(),
            endpoint: default_narrative_endpoint(),
        }
    }
}

fn default_port() -> u16 {
    5080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_deforestation_threshold() -> f32 {
    0.5
}

fn default_confirmed_threshold() -> f32 {
    0.7
}

fn default_degradation_threshold() -> f32 {
    0.4
}

fn default_max_cloud_cover() -> f32 {
    20.0
}

fn default_image_resolution() -> f64 {
    10.0
}

fn default_narrative_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_narrative_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl TomlConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing file is not fatal: a warning is logged and defaults are used.
    /// A file that exists but fails to parse is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file not found at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply per-value environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var(ENV_PORT) {
            self.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {}: {}", ENV_PORT, e)))?;
        }

        if let Ok(threshold) = std::env::var(ENV_DEFORESTATION_THRESHOLD) {
            self.analysis.deforestation_threshold = threshold.parse().map_err(|e| {
                Error::Config(format!("Invalid {}: {}", ENV_DEFORESTATION_THRESHOLD, e))
            })?;
        }

        if let Ok(cloud) = std::env::var(ENV_MAX_CLOUD_COVER) {
            self.analysis.max_cloud_cover = cloud
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {}: {}", ENV_MAX_CLOUD_COVER, e)))?;
        }

        if let Ok(key) = std::env::var(ENV_GEMINI_API_KEY) {
            if !key.trim().is_empty() {
                self.narrative.api_key = Some(key);
            }
        }

        Ok(())
    }

    /// Write configuration atomically (temp file + rename)
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Default location of the service TOML file
///
/// `~/.config/forest-watch/fw-da.toml` on Linux, the platform config
/// directory elsewhere.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("forest-watch").join("fw-da.toml"))
        .unwrap_or_else(|| PathBuf::from("fw-da.toml"))
}

/// Resolve the root folder
///
/// Priority: command-line argument, then `FW_ROOT_FOLDER`, then the TOML
/// `root_folder` key, then the OS-dependent default.
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_ROOT_FOLDER) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("forest-watch"))
        .unwrap_or_else(|| PathBuf::from("./forest_watch_data"))
}

/// Root folder layout
#[derive(Debug, Clone)]
pub struct RootFolder {
    root: PathBuf,
}

impl RootFolder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root and outputs directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.outputs_dir())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory holding per-job output folders
    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    /// Boundary file used when none is configured
    pub fn default_boundary_path(&self) -> PathBuf {
        self.root.join("boundary.json")
    }
}
