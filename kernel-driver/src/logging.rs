//! Diagnostic tracing for the driver.
//!
//! Every module logs through the `log` facade. `init_tracing` installs the
//! process-wide `fern` sink the first time a driver starts with
//! `[logging] enable = true`; `flush_tracing` runs as the last teardown step.

use std::{process, thread};

use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;

use crate::config::LoggingConfig;

/// Logs with the component tag used as the record target.
///
/// ```ignore
/// kmon_log!(Level::Info, "lifecycle", "device created: {}", name);
/// ```
#[macro_export]
macro_rules! kmon_log {
    ($level:expr, $component:expr, $($arg:tt)+) => {
        log::log!(target: concat!("kmon::", $component), $level, $($arg)+)
    };
}

/// Map a configured level name onto a filter; `None` when unknown.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_uppercase().as_str() {
        "OFF" => Some(LevelFilter::Off),
        "ERROR" => Some(LevelFilter::Error),
        "WARN" => Some(LevelFilter::Warn),
        "INFO" => Some(LevelFilter::Info),
        "DEBUG" => Some(LevelFilter::Debug),
        "TRACE" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Build (without installing) the dispatch described by `cfg`.
pub fn build_dispatch(cfg: &LoggingConfig) -> Result<Dispatch, fern::InitError> {
    let level = parse_level(&cfg.level).unwrap_or(LevelFilter::Info);

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = cfg.file.as_deref() {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    Ok(dispatch)
}

/// Install the global logger. A logger that is already installed (another
/// driver instance, or the host's own) is kept and reported as `false`.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<bool, fern::InitError> {
    match build_dispatch(cfg)?.apply() {
        Ok(()) => Ok(true),
        Err(_already_set) => Ok(false),
    }
}

/// Flush buffered records; the tracing side of driver unload.
pub fn flush_tracing() {
    log::logger().flush();
}
