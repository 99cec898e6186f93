// src/watch/event.rs

//! File change events as pushed to browsers.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use notify::EventKind;
use notify::event::{MetadataKind, ModifyKind};
use serde::Serialize;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
    Renamed,
    OwnerModified,
    AttributeModified,
}

impl ChangeKind {
    /// Map a notify event kind; access and unclassified events map to
    /// `None` and are dropped.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Remove(_) => Some(Self::Removed),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Renamed),
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership)) => {
                Some(Self::OwnerModified)
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(Self::AttributeModified),
            EventKind::Modify(_) => Some(Self::Updated),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single observed change.
///
/// Serialized with capitalized keys, which is what the injected client
/// script destructures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsEvent {
    #[serde(rename = "File")]
    file: String,
    #[serde(rename = "Ext")]
    ext: String,
    #[serde(rename = "Events")]
    events: Vec<ChangeKind>,
    #[serde(rename = "Time")]
    time: DateTime<Utc>,
}

impl FsEvent {
    pub fn new(path: &Path, events: Vec<ChangeKind>, time: DateTime<Utc>) -> Self {
        Self {
            file: slash_path(path),
            ext: extension_of(path),
            events,
            time,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Extension including the leading dot, empty if there is none.
    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn events(&self) -> &[ChangeKind] {
        &self.events
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn is(&self, kind: ChangeKind) -> bool {
        self.events.contains(&kind)
    }

    /// Record another kind for the same file, keeping first-seen order.
    pub fn merge(&mut self, kind: ChangeKind) {
        if !self.is(kind) {
            self.events.push(kind);
        }
    }

    /// Rewrite the path relative to `web_root`, as a URL path (`/css/a.css`).
    ///
    /// Paths outside the web root are left untouched.
    pub fn relative_to(mut self, web_root: &Path) -> Self {
        if let Ok(rel) = Path::new(&self.file).strip_prefix(web_root) {
            self.file = format!("/{}", slash_path(rel));
        } else {
            tracing::debug!(file = %self.file, root = %web_root.display(), "path outside web root");
        }
        self
    }
}

/// Changes collected between two watcher flushes, in discovery order.
///
/// The empty batch carries no file information and means "reload now".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FsEventBatch(Vec<FsEvent>);

impl FsEventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn events(&self) -> &[FsEvent] {
        &self.0
    }

    /// Add a change, folding it into an earlier event for the same file.
    pub fn record(&mut self, path: &Path, kind: ChangeKind, time: DateTime<Utc>) {
        let file = slash_path(path);
        match self.0.iter_mut().find(|e| e.file == file) {
            Some(existing) => existing.merge(kind),
            None => self.0.push(FsEvent::new(path, vec![kind], time)),
        }
    }

    pub fn relative_to(self, web_root: &Path) -> Self {
        self.into_iter().map(|e| e.relative_to(web_root)).collect()
    }

    /// Take the collected events, leaving an empty batch behind.
    pub fn take(&mut self) -> Self {
        Self(std::mem::take(&mut self.0))
    }
}

impl FromIterator<FsEvent> for FsEventBatch {
    fn from_iter<I: IntoIterator<Item = FsEvent>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FsEventBatch {
    type Item = FsEvent;
    type IntoIter = std::vec::IntoIter<FsEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
