//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default session file looked up in the working directory
pub const DEFAULT_COOKIE_FILE: &str = "./cookie.json";

/// Alternate session file name accepted when the default is absent
pub const FALLBACK_COOKIE_FILE: &str = "./cookies.json";

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment variable was set to a value that cannot be used
    #[error("Invalid value for {key}: {reason}")]
    InvalidEnv { key: &'static str, reason: String },

    /// A loaded value violates a configuration constraint
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind (default 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port (default 3000)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Session material handed to the renderer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionConfig {
    /// Cookie/credential file (resolved from the working directory if None)
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
}

/// Admission gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    /// Number of snapshot jobs allowed to run at once (default 1)
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Give up waiting for a slot after this many seconds (default: wait forever)
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
}

fn default_capacity() -> u32 {
    1
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            acquire_timeout_secs: None,
        }
    }
}

/// External renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderConfig {
    /// Renderer executable (default `twitter-snap`)
    #[serde(default = "default_render_program")]
    pub program: String,
    /// Root directory under which per-job workspaces are created
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Render theme name
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Device scale factor
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Page width in CSS pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Timeout the renderer applies to each ffmpeg invocation
    #[serde(default = "default_ffmpeg_timeout_ms")]
    pub ffmpeg_timeout_ms: u64,
    /// Extra options forwarded to ffmpeg by the renderer
    #[serde(default)]
    pub ffmpeg_options: Option<Vec<String>>,
}

fn default_render_program() -> String {
    "twitter-snap".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".temp")
}

fn default_theme() -> String {
    "RenderOceanBlueColor".to_string()
}

fn default_scale() -> f32 {
    2.0
}

fn default_width() -> u32 {
    1440
}

fn default_ffmpeg_timeout_ms() -> u64 {
    30_000
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            program: default_render_program(),
            output_dir: default_output_dir(),
            theme: default_theme(),
            scale: default_scale(),
            width: default_width(),
            ffmpeg_timeout_ms: default_ffmpeg_timeout_ms(),
            ffmpeg_options: None,
        }
    }
}

/// Encoder probing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// ffmpeg executable used for capability probes
    #[serde(default = "default_ffmpeg_program")]
    pub ffmpeg_program: String,
}

fn default_ffmpeg_program() -> String {
    "ffmpeg".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_program: default_ffmpeg_program(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - HOST -> server.host
    /// - PORT -> server.port
    /// - COOKIE_FILE -> session.cookie_file
    /// - SEMAPHORE -> gate.capacity
    /// - GATE_TIMEOUT_SECS -> gate.acquire_timeout_secs
    /// - RENDERER_PROGRAM -> render.program
    /// - OUTPUT_DIR -> render.output_dir
    /// - FFMPEG_OPTION -> render.ffmpeg_options (JSON list of strings)
    /// - FFMPEG_PROGRAM -> encoder.ffmpeg_program
    /// - LOG_FORMAT -> logging.format
    ///
    /// Unlike a missing variable, a present but unusable one is an error.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = env::var("HOST") {
            self.server.host = val;
        }

        if let Some(port) = parse_env::<u16>("PORT")? {
            self.server.port = port;
        }

        if let Ok(val) = env::var("COOKIE_FILE") {
            self.session.cookie_file = Some(PathBuf::from(val));
        }

        if let Some(capacity) = parse_env::<u32>("SEMAPHORE")? {
            self.gate.capacity = capacity;
        }

        if let Some(secs) = parse_env::<u64>("GATE_TIMEOUT_SECS")? {
            self.gate.acquire_timeout_secs = Some(secs);
        }

        if let Ok(val) = env::var("RENDERER_PROGRAM") {
            self.render.program = val;
        }

        if let Ok(val) = env::var("OUTPUT_DIR") {
            self.render.output_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("FFMPEG_OPTION") {
            self.render.ffmpeg_options = Some(parse_ffmpeg_options(&val)?);
        }

        if let Ok(val) = env::var("FFMPEG_PROGRAM") {
            self.encoder.ffmpeg_program = val;
        }

        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = match val.to_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        key: "LOG_FORMAT",
                        reason: format!("expected 'compact' or 'json', got '{}'", other),
                    })
                }
            };
        }

        Ok(())
    }

    /// Check constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gate.capacity == 0 {
            return Err(ConfigError::Invalid(
                "gate.capacity must be at least 1".to_string(),
            ));
        }
        if !(self.render.scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "render.scale must be positive, got {}",
                self.render.scale
            )));
        }
        if self.render.width == 0 {
            return Err(ConfigError::Invalid(
                "render.width must be non-zero".to_string(),
            ));
        }
        if self.render.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "render.program must not be empty".to_string(),
            ));
        }
        if self.encoder.ffmpeg_program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "encoder.ffmpeg_program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the configuration: optional TOML file, then environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Session file the renderer should use
    ///
    /// An explicit setting wins; otherwise `./cookie.json`, or `./cookies.json`
    /// when only the latter exists.
    pub fn cookie_file(&self) -> PathBuf {
        match &self.session.cookie_file {
            Some(path) => path.clone(),
            None => resolve_cookie_file_in(Path::new(".")),
        }
    }
}

/// Pick the default session file name inside `dir`
pub fn resolve_cookie_file_in(dir: &Path) -> PathBuf {
    let primary = dir.join(DEFAULT_COOKIE_FILE);
    let fallback = dir.join(FALLBACK_COOKIE_FILE);
    if !primary.exists() && fallback.exists() {
        fallback
    } else {
        primary
    }
}

/// Parse the `FFMPEG_OPTION` JSON list
pub fn parse_ffmpeg_options(raw: &str) -> Result<Vec<String>, ConfigError> {
    serde_json::from_str::<Vec<String>>(raw).map_err(|e| ConfigError::InvalidEnv {
        key: "FFMPEG_OPTION",
        reason: format!("expected a JSON list of strings: {}", e),
    })
}

fn parse_env<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                key,
                reason: format!("'{}': {}", val, e),
            }),
        Err(_) => Ok(None),
    }
}
