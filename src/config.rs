/// Engine configuration: defaults, JSON file loading and validation
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Producer ticks per second. Velocities go out as per-tick speed times this.
    pub tick_rate: f64,
    /// Only one viewer at a time; a new connection evicts the previous one.
    pub single_session: bool,
    /// Frames buffered per session before further frames are dropped.
    pub outbound_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            tick_rate: 30.0,
            single_session: true,
            outbound_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_rate must be positive, got {}",
                self.tick_rate
            )));
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbound_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
