// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Flags left unset fall back to `Devloop.toml` and then to the built-in
//! defaults, so every value here is optional.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

const PLACEHOLDER_HELP: &str = "\
Supported placeholders in SERVER_CMD:
  {}      is replaced by host:port
  {host}  is replaced by host
  {port}  is replaced by port

Press Enter to rebuild and restart the server.";

/// Command-line arguments for `devloop`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Build, run and live-reload a web server during development.",
    after_help = PLACEHOLDER_HELP
)]
pub struct CliArgs {
    /// Command that starts the server, e.g. `./bin/app -addr {}`.
    #[arg(value_name = "SERVER_CMD")]
    pub server_cmd: Option<String>,

    /// Upstream port the server listens on [default: 18080].
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Proxy bind address [default: 127.0.0.1:8080].
    #[arg(long, value_name = "HOST:PORT")]
    pub addr: Option<String>,

    /// Enable or disable browser reload via server-sent events [default: true].
    #[arg(long, value_name = "BOOL")]
    pub live_reload: Option<bool>,

    /// Command that builds the server; empty disables the build [default: make].
    #[arg(long, value_name = "CMD")]
    pub build_cmd: Option<String>,

    /// Report changed files relative to this directory.
    #[arg(long, value_name = "DIR")]
    pub web_root: Option<PathBuf>,

    /// Path to the config file (TOML) [default: Devloop.toml, if present].
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVLOOP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
