//! Public API for configuration

pub mod loader;
pub mod model;

// Re-export the main entrypoints:
pub use loader::load;
pub use model::{
    ConfigError, DeviceConfig, DriverConfig, LoggingConfig, ManagerConfig, EVENT_QUEUE_LIMIT,
    MAX_SESSIONS_LIMIT, SESSION_BUFFER_LIMIT,
};
