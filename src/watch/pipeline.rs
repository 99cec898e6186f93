// src/watch/pipeline.rs

use std::path::PathBuf;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::watch::event::FsEventBatch;

/// Forward change batches to every connected browser.
///
/// Each batch is rewritten relative to `web_root` (when set) and broadcast
/// if non-empty; the empty batch is reserved for restart notifications.
/// Returns when the source ends or `shutdown` fires.
pub async fn forward_batches<S>(
    batches: S,
    web_root: Option<PathBuf>,
    reload: Broadcaster<FsEventBatch>,
    shutdown: CancellationToken,
) where
    S: Stream<Item = FsEventBatch> + Send,
{
    tokio::pin!(batches);

    loop {
        let batch = tokio::select! {
            batch = batches.next() => match batch {
                Some(batch) => batch,
                None => break,
            },
            _ = shutdown.cancelled() => break,
        };

        let batch = match &web_root {
            Some(root) => batch.relative_to(root),
            None => batch,
        };
        if batch.is_empty() {
            continue;
        }

        let files: Vec<&str> = batch.events().iter().map(|e| e.file()).collect();
        info!(?files, listeners = reload.len(), "files changed");
        reload.broadcast(batch);
    }

    debug!("watch pipeline finished");
}
