// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the driver's TOML file, deserializes it into `DriverConfig` and
//! checks the values the lifecycle relies on before any object is created.

use std::{fs, path::Path};

use log::LevelFilter;

use crate::config::model::{
    ConfigError, DriverConfig, EVENT_QUEUE_LIMIT, MAX_SESSIONS_LIMIT, SESSION_BUFFER_LIMIT,
};
use crate::helpers::make_unicode;
use crate::logging::parse_level;

/// Load, parse and validate the configuration at `path`.
pub fn load(path: &Path) -> Result<DriverConfig, ConfigError> {
    log::debug!("Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = DriverConfig::from_toml(&txt)?;
    log::info!("Loaded config from {:?}", path);
    Ok(cfg)
}

impl DriverConfig {
    /// Parse and validate TOML text.
    pub fn from_toml(txt: &str) -> Result<Self, ConfigError> {
        let cfg: DriverConfig = toml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would only fail later, half-way through startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("device.name", &self.device.name), ("device.alias", &self.device.alias)] {
            if make_unicode(value).is_err() {
                return Err(ConfigError::InvalidName { field, value: value.clone() });
            }
        }
        if self.device.name.eq_ignore_ascii_case(&self.device.alias) {
            return Err(ConfigError::AliasEqualsName(self.device.name.clone()));
        }
        let m = &self.manager;
        for (field, value, max) in [
            ("manager.max_sessions", m.max_sessions, MAX_SESSIONS_LIMIT),
            ("manager.session_buffer_bytes", m.session_buffer_bytes, SESSION_BUFFER_LIMIT),
            ("manager.event_queue_depth", m.event_queue_depth, EVENT_QUEUE_LIMIT),
        ] {
            if value == 0 || value > max {
                return Err(ConfigError::LimitOutOfRange { field, value, max });
            }
        }
        if parse_level(&self.logging.level).is_none() {
            return Err(ConfigError::InvalidLevel(self.logging.level.clone()));
        }
        Ok(())
    }

    /// Log level requested by `[logging]`.
    pub fn level_filter(&self) -> LevelFilter {
        parse_level(&self.logging.level).unwrap_or(LevelFilter::Info)
    }
}
