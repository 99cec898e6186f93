// src/lib.rs

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod connect;
pub mod errors;
pub mod inject;
pub mod logging;
pub mod proxy;
pub mod signals;
pub mod supervisor;
pub mod trigger;
pub mod types;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::cli::CliArgs;
use crate::config::{Settings, load_config};
use crate::errors::Result;
use crate::proxy::ProxyState;
use crate::supervisor::{ProcessBackend, Supervisor};
use crate::watch::FsEventBatch;

/// Pending restart triggers; extra Enter presses beyond this just block the
/// stdin reader until a cycle finishes.
const TRIGGER_QUEUE: usize = 8;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (flags over `Devloop.toml` over defaults)
/// - the build/restart supervisor
/// - the stdin restart trigger
/// - (optional) the file watcher feeding live reload
/// - the development proxy
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let file = load_config(args.config.as_deref())?;
    let settings = Settings::resolve(&args, file)?;
    run_with_settings(settings).await
}

/// Run devloop until shutdown, or until the first build fails.
pub async fn run_with_settings(settings: Settings) -> Result<()> {
    debug!(?settings, "resolved settings");

    let shutdown = CancellationToken::new();
    signals::spawn_signal_listener(shutdown.clone());

    let reload = Broadcaster::<FsEventBatch>::new();

    if settings.live_reload {
        // The pipeline task owns the watcher; it stops watching on shutdown.
        let watcher = watch::spawn_watcher(
            Path::new("."),
            settings.watch_filter()?,
            settings.flush_interval,
        )?;
        tokio::spawn(watch::forward_batches(
            watcher,
            settings.web_root.clone(),
            reload.clone(),
            shutdown.clone(),
        ));
    } else {
        info!("live reload disabled");
    }

    let (trigger_tx, trigger_rx) = mpsc::channel::<()>(TRIGGER_QUEUE);
    trigger::spawn_stdin_trigger(trigger_tx, shutdown.clone());

    let supervisor = Supervisor::new(
        ProcessBackend::new(settings.build_cmd.clone()),
        settings.server_cmd.clone(),
        settings.upstream.clone(),
        settings.supervisor_options(),
        reload.clone(),
        trigger_rx,
        shutdown.clone(),
    );
    let mut supervisor = tokio::spawn(supervisor.run());

    let state = Arc::new(ProxyState::new(
        &settings.upstream,
        settings.live_reload,
        reload,
        shutdown.clone(),
    )?);
    let listen_addr = settings.listen_addr.clone();
    let mut proxy = tokio::spawn(async move { proxy::serve(&listen_addr, state).await });

    // Whichever side finishes first takes the other down with it. The
    // supervisor's verdict wins: it reports a failed first build.
    let (supervised, proxied) = tokio::select! {
        res = &mut supervisor => {
            shutdown.cancel();
            (joined(res), joined(proxy.await))
        }
        res = &mut proxy => {
            shutdown.cancel();
            (joined(supervisor.await), joined(res))
        }
    };

    supervised?;
    proxied
}

fn joined(res: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    res.map_err(|e| anyhow!("task failed: {e}"))?
}
