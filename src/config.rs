use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    audio::AnalysisConfig,
    composition::types::{OutputFormat, TransitionKind},
    error::{ConfigError, Result},
    pacing::PacingConfig,
};

/// Environment variable overriding `render.api_key`
pub const API_KEY_ENV: &str = "TEMPO_RENDER_API_KEY";

/// Environment variable overriding `render.webhook_secret`
pub const WEBHOOK_SECRET_ENV: &str = "TEMPO_WEBHOOK_SECRET";

/// Main configuration for the Tempo-Compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Soundtrack analysis settings
    pub analysis: AnalysisConfig,

    /// Pacing planner settings
    pub pacing: PacingConfig,

    /// Composition builder defaults
    pub composition: CompositionConfig,

    /// Metadata prober settings
    pub probe: ProbeConfig,

    /// External renderer and job tracking settings
    pub render: RenderConfig,

    /// HTTP surface settings
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace secrets with values from the environment when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            self.render.api_key = key;
        }
        if let Ok(secret) = std::env::var(WEBHOOK_SECRET_ENV) {
            self.render.webhook_secret = Some(secret);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate().map_err(|details| ConfigError::InvalidValue {
            key: "analysis".to_string(),
            value: details,
        })?;
        self.pacing.validate().map_err(|details| ConfigError::InvalidValue {
            key: "pacing".to_string(),
            value: details,
        })?;
        self.composition.validate()?;
        self.probe.validate()?;
        self.render.validate()?;
        Ok(())
    }
}

/// Composition builder defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Natural duration assumed for a video whose length could not be probed (seconds)
    pub default_video_duration: f64,

    /// Slowest playback rate used to stretch a short video over its segment
    pub min_playback_rate: f64,

    /// Output container when the request does not name one
    pub output_format: OutputFormat,

    /// Output width in pixels
    pub output_width: u32,

    /// Output height in pixels
    pub output_height: u32,

    /// Output frame rate
    pub output_fps: f64,

    /// Transition placed between consecutive clips
    pub transition: Option<TransitionKind>,

    /// Soundtrack volume (0.0-1.0)
    pub soundtrack_volume: f64,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            default_video_duration: 10.0,
            min_playback_rate: 0.5,
            output_format: OutputFormat::Mp4,
            output_width: 1080,
            output_height: 1920,
            output_fps: 30.0,
            transition: Some(TransitionKind::Fade),
            soundtrack_volume: 1.0,
        }
    }
}

impl CompositionConfig {
    fn validate(&self) -> Result<()> {
        if !positive(self.default_video_duration) {
            return Err(ConfigError::InvalidValue {
                key: "composition.default_video_duration".to_string(),
                value: self.default_video_duration.to_string()
            }.into());
        }

        if !(self.min_playback_rate > 0.0 && self.min_playback_rate <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "composition.min_playback_rate".to_string(),
                value: self.min_playback_rate.to_string()
            }.into());
        }

        if self.output_width == 0 || self.output_height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "composition.output_size".to_string(),
                value: format!("{}x{}", self.output_width, self.output_height)
            }.into());
        }

        if !(0.0..=1.0).contains(&self.soundtrack_volume) {
            return Err(ConfigError::InvalidValue {
                key: "composition.soundtrack_volume".to_string(),
                value: self.soundtrack_volume.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Metadata prober settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// ffprobe executable
    pub ffprobe_path: String,

    /// Upper bound for a single probe, reachability check included (seconds)
    pub timeout_sec: f64,

    /// Issue a HEAD request before spawning ffprobe
    pub reachability_check: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
            timeout_sec: 15.0,
            reachability_check: true,
        }
    }
}

impl ProbeConfig {
    fn validate(&self) -> Result<()> {
        if !positive(self.timeout_sec) {
            return Err(ConfigError::InvalidValue {
                key: "probe.timeout_sec".to_string(),
                value: self.timeout_sec.to_string()
            }.into());
        }
        Ok(())
    }
}

/// External renderer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Base URL of the render API
    pub endpoint: String,

    /// API key sent as `x-api-key`
    pub api_key: String,

    /// Callback URL handed to the renderer for webhooks
    pub callback_url: Option<String>,

    /// Shared secret for webhook signatures; unsigned webhooks are accepted when unset
    pub webhook_secret: Option<String>,

    /// Upper bound for submission and status requests (seconds)
    pub request_timeout_sec: f64,

    /// Start polling when no terminal webhook arrived within this window (seconds)
    pub webhook_timeout_sec: f64,

    /// Delay between status polls (seconds)
    pub poll_interval_sec: f64,

    /// Give up polling after this many attempts
    pub max_poll_attempts: u32,

    /// Enable the poll fallback
    pub poll_enabled: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.shotstack.io/edit/stage".to_string(),
            api_key: String::new(),
            callback_url: None,
            webhook_secret: None,
            request_timeout_sec: 20.0,
            webhook_timeout_sec: 120.0,
            poll_interval_sec: 15.0,
            max_poll_attempts: 40,
            poll_enabled: true,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.endpoint).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "render.endpoint".to_string(),
                value: self.endpoint.clone()
            }.into());
        }

        for (key, value) in [
            ("render.request_timeout_sec", self.request_timeout_sec),
            ("render.webhook_timeout_sec", self.webhook_timeout_sec),
            ("render.poll_interval_sec", self.poll_interval_sec),
        ] {
            if !positive(value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string()
                }.into());
            }
        }

        Ok(())
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Finite and strictly positive
fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Configured seconds as a `Duration`; out-of-range values saturate instead of panicking
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.render.callback_url = Some("https://hooks.example.com/render".to_string());

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config.analysis.hop_size, loaded_config.analysis.hop_size);
        assert_eq!(original_config.pacing.max_speed, loaded_config.pacing.max_speed);
        assert_eq!(loaded_config.render.callback_url.as_deref(), Some("https://hooks.example.com/render"));
        assert_eq!(loaded_config.composition.output_format, OutputFormat::Mp4);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[pacing]\nbeats_per_segment = 8\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.pacing.beats_per_segment, 8);
        assert_eq!(config.analysis.window_size, AnalysisConfig::default().window_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(
            result,
            Err(crate::error::CompositorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_speed_range() {
        let mut config = Config::default();
        config.pacing.min_speed = 2.0;
        config.pacing.max_speed = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_infinite_durations_are_rejected() {
        let mut config = Config::default();
        config.render.poll_interval_sec = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe.timeout_sec = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.composition.default_video_duration = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.fetch_timeout_sec = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.max_bpm = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seconds_saturates() {
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
        assert_eq!(seconds(f64::INFINITY), Duration::MAX);
        assert_eq!(seconds(-2.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_invalid_render_endpoint() {
        let mut config = Config::default();
        config.render.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
