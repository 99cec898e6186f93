// src/watch/mod.rs

//! File watching for live reload.
//!
//! This module is responsible for:
//! - Turning `notify` events into [`FsEventBatch`]es, filtered by extension
//!   and exclude globs and flushed on a fixed interval.
//! - Forwarding those batches to the reload [`Broadcaster`](crate::broadcast::Broadcaster).
//!
//! The pipeline accepts any `Stream` of batches; the notify-backed
//! [`FileWatcher`] is just the production source.

pub mod event;
pub mod filter;
pub mod path_utils;
pub mod pipeline;
pub mod watcher;

pub use event::{ChangeKind, FsEvent, FsEventBatch};
pub use filter::{DEFAULT_EXCLUDES, DEFAULT_EXTENSIONS, WatchFilter};
pub use pipeline::forward_batches;
pub use watcher::{Batcher, DEFAULT_FLUSH_INTERVAL, FileWatcher, spawn_watcher};
