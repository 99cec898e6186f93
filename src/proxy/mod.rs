// src/proxy/mod.rs

//! Development front door: live-reload events plus a reverse proxy.
//!
//! ```text
//! Browser ──HTTP──► devloop proxy (axum)
//!                        │
//!                        ├─► /_dev  (SSE, one Broadcaster listener per client)
//!                        │
//!                        └─► everything else ──reqwest──► supervised server
//!                                                 (HTML bodies get the reload script)
//! ```

pub mod forward;
pub mod sse;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::any;
use reqwest::redirect::Policy;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broadcast::Broadcaster;
use crate::errors::Result;
use crate::types::UpstreamAddr;
use crate::watch::FsEventBatch;

pub use forward::ProxyError;

/// Path the injected script subscribes to.
pub const DEV_EVENTS_PATH: &str = "/_dev";

/// Shared state of the proxy handlers.
#[derive(Debug)]
pub struct ProxyState {
    client: reqwest::Client,
    base_url: String,
    live_reload: bool,
    reload: Broadcaster<FsEventBatch>,
    shutdown: CancellationToken,
}

impl ProxyState {
    pub fn new(
        upstream: &UpstreamAddr,
        live_reload: bool,
        reload: Broadcaster<FsEventBatch>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        // Redirects go back to the browser untouched.
        let client = reqwest::Client::builder().redirect(Policy::none()).build()?;

        Ok(Self {
            client,
            base_url: format!("http://{upstream}"),
            live_reload,
            reload,
            shutdown,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Create the proxy router.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route(DEV_EVENTS_PATH, any(sse::dev_events))
        .fallback(forward::forward)
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(addr: &str, state: Arc<ProxyState>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("proxy: binding {addr}"))?;
    serve_on(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve_on(listener: TcpListener, state: Arc<ProxyState>) -> Result<()> {
    let local = listener.local_addr()?;
    info!(address = %local, upstream = %state.base_url, "proxy listening");

    let shutdown = state.shutdown.clone();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("proxy stopped");
    Ok(())
}
