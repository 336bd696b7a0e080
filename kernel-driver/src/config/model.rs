// src/config/model.rs

use serde::Deserialize;
use shared::constants::{CATEGORY_ALL, DEVICE_NAME, SYMBOLIC_LINK};
use thiserror::Error;

/// Top-level driver config. Every table is optional; a missing table or
/// field falls back to the built-in endpoint defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub device:  DeviceConfig,
    pub manager: ManagerConfig,
    pub logging: LoggingConfig,
}

/// Mirror of the `[device]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Internal object name, e.g. `\Device\KmonDevice`.
    pub name:        String,
    /// Symbolic link published for callers, e.g. `\??\KmonDevice`.
    pub alias:       String,
    /// Create with `FILE_DEVICE_SECURE_OPEN`.
    pub secure_open: bool,
    /// Only one handle may be open at a time.
    pub exclusive:   bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name:        DEVICE_NAME.into(),
            alias:       SYMBOLIC_LINK.into(),
            secure_open: true,
            exclusive:   false,
        }
    }
}

/// Largest accepted `[manager] max_sessions`.
pub const MAX_SESSIONS_LIMIT: usize = 4096;
/// Largest accepted `[manager] session_buffer_bytes` (16 MiB).
pub const SESSION_BUFFER_LIMIT: usize = 16 * 1024 * 1024;
/// Largest accepted `[manager] event_queue_depth`.
pub const EVENT_QUEUE_LIMIT: usize = 65_536;

/// Mirror of the `[manager]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// `false` skips manager construction; the endpoint runs degraded.
    pub enabled:              bool,
    /// Treat manager failure as a startup failure instead of degrading.
    pub required:             bool,
    pub max_sessions:         usize,
    /// Per-session loopback buffer, in bytes.
    pub session_buffer_bytes: usize,
    /// Capacity of the monitor-record queue.
    pub event_queue_depth:    usize,
    /// Initial record category mask (`CATEGORY_*` bits).
    pub category_mask:        u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            enabled:              true,
            required:             false,
            max_sessions:         64,
            session_buffer_bytes: 64 * 1024,
            event_queue_depth:    4096,
            category_mask:        CATEGORY_ALL,
        }
    }
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]                   pub enable: bool,
    #[serde(default)]                   pub file:   Option<String>,
    #[serde(default = "default_level")] pub level:  String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} '{value}': must be a rooted object name")]
    InvalidName { field: &'static str, value: String },

    #[error("device name and alias must differ ('{0}')")]
    AliasEqualsName(String),

    #[error("{field} = {value} is out of range (1..={max})")]
    LimitOutOfRange { field: &'static str, value: usize, max: usize },

    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
