use anyhow::{anyhow, Context, Result};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::media::SubtitleStyle;
use crate::subtitles::SynthesisOptions;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    /// Where results go and how they are arranged
    #[serde(default)]
    pub output: OutputConfig,

    /// Transcoder/prober discovery
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Batch clipping defaults
    #[serde(default)]
    pub clipping: ClippingConfig,

    /// Caption pacing and layout
    #[serde(default)]
    pub subtitles: SynthesisOptions,

    /// Caption appearance for shorts
    #[serde(default)]
    pub style: SubtitleStyle,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Output location settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    // @field: Default output directory; platform video dir when unset
    #[serde(default)]
    pub default_output_dir: Option<PathBuf>,

    // @field: Move results into <base>/<source>/<type>/
    #[serde(default = "default_true")]
    pub organize_output: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_output_dir: None,
            organize_output: default_true(),
        }
    }
}

impl OutputConfig {
    // @returns: Configured directory, or <videos>/autotube, or ./autotube
    pub fn resolve_output_dir(&self) -> PathBuf {
        self.default_output_dir
            .clone()
            .or_else(|| dirs::video_dir().map(|dir| dir.join("autotube")))
            .unwrap_or_else(|| PathBuf::from("autotube"))
    }
}

/// Tool discovery settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolsConfig {
    // @field: Directory searched before PATH
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    // @field: Bound for each `-version` probe
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            verify_timeout_secs: default_verify_timeout_secs(),
        }
    }
}

/// Batch clipping settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClippingConfig {
    /// Clips per source video
    #[serde(default = "default_clip_count")]
    pub clip_count: usize,

    /// Shortest clip in seconds
    #[serde(default = "default_min_clip_secs")]
    pub min_clip_secs: u64,

    /// Longest clip in seconds
    #[serde(default = "default_max_clip_secs")]
    pub max_clip_secs: u64,

    #[serde(default)]
    pub vertical: bool,

    #[serde(default)]
    pub remove_audio: bool,

    #[serde(default)]
    pub mirror: bool,

    #[serde(default)]
    pub enhance: bool,

    /// Cut on scene boundaries instead of random offsets
    #[serde(default = "default_true")]
    pub use_scene_detection: bool,

    /// Scene score threshold in (0, 1]
    #[serde(default = "default_scene_threshold")]
    pub scene_threshold: f64,

    /// Keep parsed scenes even when the detection pass exits non-zero
    #[serde(default = "default_true")]
    pub accept_partial_scene_results: bool,
}

impl Default for ClippingConfig {
    fn default() -> Self {
        Self {
            clip_count: default_clip_count(),
            min_clip_secs: default_min_clip_secs(),
            max_clip_secs: default_max_clip_secs(),
            vertical: false,
            remove_audio: false,
            mirror: false,
            enhance: false,
            use_scene_detection: default_true(),
            scene_threshold: default_scene_threshold(),
            accept_partial_scene_results: default_true(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    // @returns: Matching `log` filter
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_verify_timeout_secs() -> u64 {
    5
}

fn default_clip_count() -> usize {
    5
}

fn default_min_clip_secs() -> u64 {
    15
}

fn default_max_clip_secs() -> u64 {
    45
}

fn default_scene_threshold() -> f64 {
    0.3
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let clipping = &self.clipping;
        if clipping.clip_count == 0 {
            return Err(anyhow!("Clip count must be at least 1"));
        }
        if clipping.min_clip_secs == 0 {
            return Err(anyhow!("Minimum clip length must be positive"));
        }
        if clipping.min_clip_secs > clipping.max_clip_secs {
            return Err(anyhow!(
                "Minimum clip length ({}s) exceeds maximum ({}s)",
                clipping.min_clip_secs,
                clipping.max_clip_secs
            ));
        }
        if !(clipping.scene_threshold > 0.0 && clipping.scene_threshold <= 1.0) {
            return Err(anyhow!(
                "Scene threshold must be in (0, 1], got {}",
                clipping.scene_threshold
            ));
        }
        if self.tools.verify_timeout_secs == 0 {
            return Err(anyhow!("Tool verification timeout must be positive"));
        }

        self.subtitles.validate().context("Invalid subtitle settings")?;
        self.style.validate().map_err(|e| anyhow!("Invalid subtitle style: {}", e))?;

        Ok(())
    }

    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Load the file, or write and return the defaults when it is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            warn!("Config file not found at '{}', creating default config.", path.display());
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }
}
