// src/config/settings.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::CliArgs;
use crate::config::duration::parse_duration;
use crate::config::model::ConfigFile;
use crate::config::validate::validate_settings;
use crate::connect::RetryPolicy;
use crate::errors::{DevloopError, Result};
use crate::supervisor::{CommandTemplate, SupervisorOptions};
use crate::types::UpstreamAddr;
use crate::watch::path_utils::absolutize;
use crate::watch::{DEFAULT_EXCLUDES, DEFAULT_EXTENSIONS, DEFAULT_FLUSH_INTERVAL, WatchFilter};

pub const DEFAULT_UPSTREAM_HOST: &str = "127.0.0.1";
pub const DEFAULT_UPSTREAM_PORT: u16 = 18080;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_BUILD_CMD: &str = "make";
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the development proxy binds.
    pub listen_addr: String,
    pub upstream: UpstreamAddr,
    /// `None` skips the build step.
    pub build_cmd: Option<CommandTemplate>,
    pub server_cmd: CommandTemplate,
    pub live_reload: bool,
    /// Absolute web root; reported paths are made relative to it.
    pub web_root: Option<PathBuf>,
    pub watch_extensions: Vec<String>,
    pub watch_exclude: Vec<String>,
    pub flush_interval: Duration,
    pub stop_grace: Duration,
    pub retry: RetryPolicy,
}

impl Settings {
    /// Merge command line, config file and defaults, in that order of
    /// precedence, and validate the result.
    pub fn resolve(cli: &CliArgs, file: Option<ConfigFile>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let server_cmd = cli
            .server_cmd
            .clone()
            .or(file.server.cmd)
            .ok_or_else(|| {
                DevloopError::Config(
                    "missing server command (pass SERVER_CMD or set [server].cmd)".to_string(),
                )
            })?;
        let server_cmd = CommandTemplate::parse(&server_cmd)
            .map_err(|e| DevloopError::Config(format!("server command: {e}")))?;

        let build_cmd = cli
            .build_cmd
            .clone()
            .or(file.build.cmd)
            .unwrap_or_else(|| DEFAULT_BUILD_CMD.to_string());
        let build_cmd = CommandTemplate::parse_optional(&build_cmd)
            .map_err(|e| DevloopError::Config(format!("build command: {e}")))?;

        let host = file
            .server
            .host
            .unwrap_or_else(|| DEFAULT_UPSTREAM_HOST.to_string());
        let port = cli.port.or(file.server.port).unwrap_or(DEFAULT_UPSTREAM_PORT);

        let listen_addr = cli
            .addr
            .clone()
            .or(file.proxy.addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let live_reload = cli.live_reload.or(file.proxy.live_reload).unwrap_or(true);

        let web_root = cli
            .web_root
            .clone()
            .or(file.watch.web_root)
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| absolutize(&p));

        let watch_extensions = file
            .watch
            .extensions
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect());
        let watch_exclude = file
            .watch
            .exclude
            .unwrap_or_else(|| DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect());

        let flush_interval =
            duration_or("[watch].flush_interval", file.watch.flush_interval, DEFAULT_FLUSH_INTERVAL)?;
        let stop_grace =
            duration_or("[server].stop_grace", file.server.stop_grace, DEFAULT_STOP_GRACE)?;

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            attempts: file.restart.attempts.unwrap_or(default_retry.attempts),
            initial_delay: duration_or(
                "[restart].initial_delay",
                file.restart.initial_delay,
                default_retry.initial_delay,
            )?,
        };

        let settings = Self {
            listen_addr,
            upstream: UpstreamAddr::new(host, port),
            build_cmd,
            server_cmd,
            live_reload,
            web_root,
            watch_extensions,
            watch_exclude,
            flush_interval,
            stop_grace,
            retry,
        };

        validate_settings(&settings)?;
        Ok(settings)
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            stop_grace: self.stop_grace,
            retry: self.retry,
        }
    }

    pub fn watch_filter(&self) -> Result<WatchFilter> {
        Ok(WatchFilter::new(&self.watch_extensions, &self.watch_exclude)?)
    }
}

fn duration_or(key: &str, raw: Option<String>, default: Duration) -> Result<Duration> {
    match raw {
        Some(raw) => parse_duration(&raw).map_err(|e| DevloopError::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}
