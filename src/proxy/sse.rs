// src/proxy/sse.rs

//! `/_dev`: server-sent change events for the injected reload script.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::broadcast::{Listener, ListenerHandle};
use crate::watch::FsEventBatch;

use super::ProxyState;

/// Name of the SSE event the client script listens for.
pub const CHANGE_EVENT: &str = "change";

#[derive(Serialize)]
struct ChangePayload<'a> {
    events: &'a FsEventBatch,
    time: DateTime<Utc>,
}

/// Build the `change` event for one batch.
pub fn change_event(batch: &FsEventBatch) -> Result<Event, axum::Error> {
    Event::default().event(CHANGE_EVENT).json_data(ChangePayload {
        events: batch,
        time: Utc::now(),
    })
}

pub(crate) async fn dev_events(State(state): State<Arc<ProxyState>>, method: Method) -> Response {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
    }

    let (listener, handle) = state.reload.register();
    debug!(listener = %handle.id(), "browser connected");

    let shutdown = state.shutdown.clone();
    let stream = ChangeStream {
        listener,
        handle: Some(handle),
    }
    .take_until(async move { shutdown.cancelled().await });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// One browser's event stream. Owns the registration; dropping the stream
/// (client went away) removes the listener.
struct ChangeStream {
    listener: Listener<FsEventBatch>,
    handle: Option<ListenerHandle<FsEventBatch>>,
}

impl Stream for ChangeStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(batch) = ready!(Pin::new(&mut self.listener).poll_next(cx)) else {
                return Poll::Ready(None);
            };
            match change_event(&batch) {
                Ok(event) => return Poll::Ready(Some(Ok(event))),
                Err(err) => warn!(error = %err, "json encode error; skipping batch"),
            }
        }
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(listener = %handle.id(), "browser disconnected");
            handle.remove();
        }
    }
}
