// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, trace, warn};

use crate::errors::Result;
use crate::watch::event::{ChangeKind, FsEventBatch};
use crate::watch::filter::WatchFilter;

/// Default flush boundary between two batches.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Accumulates notify events between flushes.
///
/// Pure bookkeeping: no timers, no IO, so the batching rules can be tested
/// with hand-made events.
#[derive(Debug)]
pub struct Batcher {
    root: PathBuf,
    filter: WatchFilter,
    pending: FsEventBatch,
}

impl Batcher {
    pub fn new(root: impl Into<PathBuf>, filter: WatchFilter) -> Self {
        Self {
            root: root.into(),
            filter,
            pending: FsEventBatch::new(),
        }
    }

    /// Record every accepted path of `event`. Returns how many were kept.
    pub fn push(&mut self, event: &Event) -> usize {
        let Some(kind) = ChangeKind::from_notify(&event.kind) else {
            trace!(kind = ?event.kind, "ignoring notify event kind");
            return 0;
        };

        let now = Utc::now();
        let mut kept = 0;
        for path in &event.paths {
            if self.filter.accepts(&self.root, path) {
                self.pending.record(path, kind, now);
                kept += 1;
            }
        }
        kept
    }

    /// Hand out what accumulated since the last flush, if anything.
    pub fn flush(&mut self) -> Option<FsEventBatch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.take())
        }
    }
}

/// Stream of change batches from a recursive `notify` watcher.
///
/// Owns the OS watcher: dropping the stream stops file watching.
pub struct FileWatcher {
    _inner: RecommendedWatcher,
    batches: ReceiverStream<FsEventBatch>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

impl Stream for FileWatcher {
    type Item = FsEventBatch;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.batches).poll_next(cx)
    }
}

/// Watch `root` recursively and emit a batch of accepted changes at every
/// `flush_interval` boundary that saw at least one.
pub fn spawn_watcher(
    root: &Path,
    filter: WatchFilter,
    flush_interval: Duration,
) -> Result<FileWatcher> {
    // Canonicalize once so event paths share a stable prefix.
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.blocking_send(event).is_err() {
                    debug!("watch batcher gone; dropping notify event");
                }
            }
            Err(err) => warn!(error = %err, "watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), extensions = ?filter.extensions(), "watching files");

    let (batch_tx, batch_rx) = mpsc::channel::<FsEventBatch>(16);
    let mut batcher = Batcher::new(root, filter);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(event) => {
                        batcher.push(&event);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some(batch) = batcher.flush() {
                        debug!(files = batch.len(), "flushing change batch");
                        if batch_tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        debug!("watch batcher finished");
    });

    Ok(FileWatcher {
        _inner: watcher,
        batches: ReceiverStream::new(batch_rx),
    })
}
