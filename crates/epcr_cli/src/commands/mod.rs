//! CLI command implementations.

pub mod init;
pub mod pending;
pub mod serve;
pub mod transfer;

use epcr_audit::{FileSink, LogConfig, LogService};
use std::path::Path;

/// Starts a log service appending to `path`, if one was given.
pub fn start_audit(path: Option<&Path>) -> Result<Option<LogService>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let sink = FileSink::open(path)?;
    let mut service = LogService::new(Box::new(sink), LogConfig::default());
    service.start()?;
    Ok(Some(service))
}

/// Stops the log service, writing out everything still buffered.
pub fn stop_audit(service: Option<LogService>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(mut service) = service {
        service.stop()?;
    }
    Ok(())
}
