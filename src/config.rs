use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use odai_core::session::DEFAULT_CANVAS_SIZE;
use odai_core::{RetryPolicy, SessionConfig};

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_CLOSE_DELAY_MS: u64 = 100;
const DEFAULT_ERROR_DELAY_MS: u64 = 1000;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Backing canvas resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_SIZE,
            height: DEFAULT_CANVAS_SIZE,
        }
    }
}

/// Reconnect delays in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the relay closed the connection
    pub close_delay_ms: u64,
    /// Delay after a failed connection attempt
    pub error_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            close_delay_ms: DEFAULT_CLOSE_DELAY_MS,
            error_delay_ms: DEFAULT_ERROR_DELAY_MS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            close_delay: Duration::from_millis(self.close_delay_ms),
            error_delay: Duration::from_millis(self.error_delay_ms),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Relay origin (e.g., "http://localhost:3000" or "https://odai.example.com")
    pub server_url: ConfigValue<String>,
    /// Directory `odai watch` saves canvases to
    pub output_dir: ConfigValue<PathBuf>,
    pub canvas: CanvasConfig,
    pub retry: RetryConfig,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    output_dir: Option<PathBuf>,
    canvas: Option<CanvasConfig>,
    retry: Option<RetryConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut server_url =
            ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut output_dir = ConfigValue::new(PathBuf::from("."), ConfigSource::Default);
        let mut canvas = CanvasConfig::default();
        let mut retry = RetryConfig::default();
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(dir) = file_config.output_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                output_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(c) = file_config.canvas {
                canvas = c;
            }
            if let Some(r) = file_config.retry {
                retry = r;
            }
        }

        if let Ok(url) = std::env::var("ODAI_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("ODAI_OUTPUT_DIR") {
            output_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            output_dir,
            canvas,
            retry,
            config_file,
        })
    }

    /// Session settings for a canvas shown at its backing size.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            canvas_width: self.canvas.width,
            canvas_height: self.canvas.height,
            retry: self.retry.policy(),
            ..SessionConfig::new(self.server_url.value.clone())
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/odai/
    /// - macOS: ~/Library/Application Support/odai/
    /// - Windows: %APPDATA%/odai/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("odai")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
