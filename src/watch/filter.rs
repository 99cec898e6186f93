// src/watch/filter.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::watch::path_utils::relative_str;

/// Extensions watched when nothing else is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".tmpl", ".html", ".css", ".js"];

/// Directories nobody wants page reloads for.
pub const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/node_modules/**", "**/target/**"];

/// Decides which changed paths are worth telling the browser about.
///
/// A path passes when its extension is in the allow list and its path,
/// relative to the watch root, matches none of the exclude globs:
///
/// ```toml
/// [watch]
/// extensions = [".html", ".css"]
/// exclude = ["dist/**"]
/// ```
#[derive(Clone)]
pub struct WatchFilter {
    extensions: Vec<String>,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for WatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchFilter")
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl Default for WatchFilter {
    fn default() -> Self {
        let extensions: Vec<String> = DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        let excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        // The built-in patterns are known to be valid.
        Self::new(&extensions, &excludes).unwrap_or_else(|_| Self {
            extensions,
            exclude_set: None,
        })
    }
}

impl WatchFilter {
    /// Compile a filter. Extensions may be given with or without the dot.
    pub fn new(extensions: &[String], exclude: &[String]) -> Result<Self> {
        let extensions = extensions.iter().map(|e| normalize_ext(e)).collect();

        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building watch exclude globset")?)
        };

        Ok(Self {
            extensions,
            exclude_set,
        })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether a change to `path` should be reported. `root` is the
    /// directory being watched; exclude globs are matched relative to it.
    pub fn accepts(&self, root: &Path, path: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = format!(".{}", ext.to_string_lossy());
        if !self.extensions.iter().any(|e| *e == ext) {
            return false;
        }

        if let Some(exclude) = &self.exclude_set {
            let rel = relative_str(root, path).unwrap_or_else(|| path.to_string_lossy().into());
            if exclude.is_match(&rel) {
                return false;
            }
        }
        true
    }
}

fn normalize_ext(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_accepts_web_assets_only() {
        let filter = WatchFilter::default();
        let root = Path::new("/proj");

        assert!(filter.accepts(root, Path::new("/proj/templates/index.tmpl")));
        assert!(filter.accepts(root, Path::new("/proj/static/site.css")));
        assert!(filter.accepts(root, Path::new("/proj/static/app.js")));
        assert!(!filter.accepts(root, Path::new("/proj/main.go")));
        assert!(!filter.accepts(root, Path::new("/proj/Makefile")));
    }

    #[test]
    fn excluded_directories_are_ignored() {
        let filter = WatchFilter::default();
        let root = Path::new("/proj");

        assert!(!filter.accepts(root, Path::new("/proj/node_modules/lib/x.js")));
        assert!(!filter.accepts(root, Path::new("/proj/.git/index.html")));
    }

    #[test]
    fn extensions_without_dot_are_normalized() {
        let filter = WatchFilter::new(&["md".to_string()], &[]).unwrap();
        assert_eq!(filter.extensions(), &[".md".to_string()]);
        assert!(filter.accepts(Path::new("/r"), Path::new("/r/a.md")));
    }

    #[test]
    fn invalid_exclude_glob_is_an_error() {
        let err = WatchFilter::new(&[], &["a/[".to_string()]).unwrap_err();
        assert!(err.to_string().contains("exclude"));
    }
}
