// src/broadcast.rs

//! Fan-out of a value to a dynamic set of listeners.
//!
//! [`Broadcaster::register`] hands out a [`Listener`] (the receiving side)
//! and a [`ListenerHandle`] (the only way to remove that registration).
//! [`Broadcaster::broadcast`] snapshots the registry under a shared lock and
//! spawns one delivery task per listener, so a slow consumer never blocks
//! the caller, other listeners, or registry mutation.
//!
//! Removal marks the listener as draining before its sender is released:
//! every in-flight delivery races its send against that mark and gives up
//! once it fires. The receiver observes end-of-stream as soon as the last
//! sender is gone.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Opaque identifier of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot<T> {
    tx: mpsc::Sender<T>,
    draining: CancellationToken,
}

struct Registry<T> {
    listeners: RwLock<HashMap<ListenerId, Slot<T>>>,
    next_id: AtomicU64,
}

impl<T> Registry<T> {
    fn detach(&self, id: ListenerId) {
        let slot = self.listeners.write().remove(&id);
        if let Some(slot) = slot {
            // Wake in-flight deliveries before our sender goes away.
            slot.draining.cancel();
            trace!(listener = %id, "listener removed");
        }
    }
}

/// Broadcasts values of type `T` to every registered listener.
///
/// Cloning is cheap and yields another handle to the same registry.
pub struct Broadcaster<T> {
    inner: Arc<Registry<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Registry {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T> Broadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.inner.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a new listener.
    ///
    /// The delivery channel holds a single value; further deliveries wait in
    /// their own tasks until the listener makes room.
    pub fn register(&self) -> (Listener<T>, ListenerHandle<T>) {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(1);

        self.inner.listeners.write().insert(
            id,
            Slot {
                tx,
                draining: CancellationToken::new(),
            },
        );
        trace!(listener = %id, "listener registered");

        (
            Listener { id, rx },
            ListenerHandle {
                id,
                registry: Some(Arc::clone(&self.inner)),
            },
        )
    }
}

impl<T> Broadcaster<T>
where
    T: Clone + Send + 'static,
{
    /// Offer `value` to every listener registered at the time of the call.
    ///
    /// Never blocks. Must be called from within a Tokio runtime, since each
    /// delivery runs in its own task.
    pub fn broadcast(&self, value: T) {
        let targets: Vec<(ListenerId, mpsc::Sender<T>, CancellationToken)> = {
            let listeners = self.inner.listeners.read();
            listeners
                .iter()
                .map(|(id, slot)| (*id, slot.tx.clone(), slot.draining.clone()))
                .collect()
        };

        trace!(listeners = targets.len(), "broadcasting value");

        for (id, tx, draining) in targets {
            let value = value.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = draining.cancelled() => {
                        trace!(listener = %id, "listener removed during delivery; dropping value");
                    }
                    res = tx.send(value) => {
                        if res.is_err() {
                            trace!(listener = %id, "listener receiver gone; dropping value");
                        }
                    }
                }
            });
        }
    }
}

/// Receiving side of a registration.
///
/// Yields `None` once the registration has been removed and every pending
/// delivery has either completed or been abandoned.
pub struct Listener<T> {
    id: ListenerId,
    rx: mpsc::Receiver<T>,
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

impl<T> Listener<T> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for Listener<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Removal capability for a registration.
///
/// [`ListenerHandle::remove`] consumes the handle, so a listener can only be
/// removed once. Dropping the handle removes the listener as well.
pub struct ListenerHandle<T> {
    id: ListenerId,
    registry: Option<Arc<Registry<T>>>,
}

impl<T> fmt::Debug for ListenerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<T> ListenerHandle<T> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn remove(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.detach(self.id);
        }
    }
}

impl<T> Drop for ListenerHandle<T> {
    fn drop(&mut self) {
        self.detach();
    }
}
