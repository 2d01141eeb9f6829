//! Configuration management for spinny-link
//!
//! Provides configuration loading, saving, and validation for the signaling
//! relay endpoint, connection wait policy, video buffering and control timing.

use crate::errors::LinkError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `SPINNY_LINK__SIGNALING__URL`.
pub const ENV_PREFIX: &str = "SPINNY_LINK";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub signaling: SignalingConfig,
    pub connection: ConnectionConfig,
    pub video: VideoConfig,
    pub control: ControlConfig,
    pub peer: PeerConfig,
}

/// Signaling relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay
    pub url: String,
    /// Relay video format identifier sent with the call request
    pub vformat: u32,
    /// Ask the relay for its hardware video codec
    pub force_hw_vcodec: bool,
    /// Send ICE candidates incrementally
    pub trickle_ice: bool,
}

/// Readiness wait policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Number of readiness polls before giving up
    pub max_attempts: u32,
    /// Delay between polls in milliseconds
    pub poll_interval_ms: u64,
}

/// Inbound video configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Decoded frames buffered before the oldest is dropped
    pub queue_capacity: usize,
    /// Observation width consumers resize frames to
    pub observation_width: u32,
    /// Observation height consumers resize frames to
    pub observation_height: u32,
}

/// Motor actuation timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Delay per coil phase in milliseconds
    pub step_delay_ms: u64,
    /// Coil phases per motor step
    pub phases_per_step: u32,
    /// Extra settle time after a command in milliseconds
    pub settle_ms: u64,
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// STUN/TURN URLs handed to the peer engine
    pub ice_servers: Vec<String>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/stream/webrtc".to_string(),
            vformat: 10,
            force_hw_vcodec: false,
            trickle_ice: true,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            observation_width: 320,
            observation_height: 240,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 5,
            phases_per_step: 4,
            settle_ms: 500,
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

impl ConnectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl LinkConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults are used for every key the
    /// file and environment leave unset.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let config: LinkConfig = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate().map_err(LinkError::Config)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), LinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LinkError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| LinkError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| LinkError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("spinny-link.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        let url = &self.signaling.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(format!("Signaling URL must be ws:// or wss://, got {}", url));
        }

        if self.connection.max_attempts == 0 {
            return Err("Connection attempts must be at least 1".to_string());
        }
        if self.connection.poll_interval_ms == 0 {
            return Err("Poll interval must be non-zero".to_string());
        }

        if self.video.queue_capacity == 0 || self.video.queue_capacity > 1024 {
            return Err("Video queue capacity must be between 1 and 1024".to_string());
        }
        if self.video.observation_width == 0 || self.video.observation_height == 0 {
            return Err("Invalid observation size".to_string());
        }

        if self.control.phases_per_step == 0 {
            return Err("Phases per step must be at least 1".to_string());
        }

        Ok(())
    }
}
