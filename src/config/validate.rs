// src/config/validate.rs

use std::str::FromStr;

use crate::config::settings::Settings;
use crate::errors::{DevloopError, Result};
use crate::types::UpstreamAddr;

/// Run semantic validation against resolved settings.
///
/// This checks:
/// - the proxy bind address is `host:port`
/// - the upstream port is non-zero
/// - at least one readiness attempt is allowed
/// - the watch flush interval is non-zero
/// - the watch exclude globs compile
///
/// Command templates are already checked while resolving.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_addresses(settings)?;
    validate_timing(settings)?;
    settings.watch_filter()?;
    Ok(())
}

fn validate_addresses(settings: &Settings) -> Result<()> {
    UpstreamAddr::from_str(&settings.listen_addr).map_err(|e| {
        DevloopError::Config(format!(
            "proxy address {:?} is not host:port: {e}",
            settings.listen_addr
        ))
    })?;

    if settings.upstream.port() == 0 {
        return Err(DevloopError::Config(
            "upstream port must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_timing(settings: &Settings) -> Result<()> {
    if settings.retry.attempts == 0 {
        return Err(DevloopError::Config(
            "[restart].attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    if settings.flush_interval.is_zero() {
        return Err(DevloopError::Config(
            "[watch].flush_interval must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
