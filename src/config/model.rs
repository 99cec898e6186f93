// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Project configuration as read from `Devloop.toml`.
///
/// ```toml
/// [server]
/// cmd = "./bin/server -addr {}"
/// port = 18080
/// stop_grace = "10s"
///
/// [build]
/// cmd = "make"
///
/// [proxy]
/// addr = "127.0.0.1:8080"
/// live_reload = true
///
/// [watch]
/// web_root = "web"
/// extensions = [".html", ".css"]
/// exclude = ["dist/**"]
/// flush_interval = "100ms"
///
/// [restart]
/// attempts = 10
/// initial_delay = "500ms"
/// ```
///
/// Every key is optional. Unset keys fall through to the command line or
/// the built-in defaults, see [`Settings::resolve`](crate::config::Settings::resolve).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub proxy: ProxySection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub restart: RestartSection,
}

/// `[server]`: the supervised upstream server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    /// Command template; may contain `{}`, `{host}` and `{port}`.
    pub cmd: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// How long a stopping server may take, e.g. `"10s"`.
    pub stop_grace: Option<String>,
}

/// `[build]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    /// Build command; an empty string disables the build step.
    pub cmd: Option<String>,
}

/// `[proxy]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySection {
    /// Bind address of the development proxy.
    pub addr: Option<String>,
    pub live_reload: Option<bool>,
}

/// `[watch]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchSection {
    /// Reported file paths are made relative to this directory.
    pub web_root: Option<PathBuf>,
    pub extensions: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub flush_interval: Option<String>,
}

/// `[restart]`: readiness probing after a restart.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestartSection {
    pub attempts: Option<u32>,
    pub initial_delay: Option<String>,
}
