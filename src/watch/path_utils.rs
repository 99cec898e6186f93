// src/watch/path_utils.rs

use std::path::{Path, PathBuf};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Falls back to comparing canonicalized paths when the plain prefix check
/// fails (symlinked roots, `/private/var` on macOS). Returns `None` if the
/// path is not under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// Absolute, canonical form of `path`, resolved against the current
/// directory. Paths that do not exist yet are only made absolute.
pub fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_prefix() {
        assert_eq!(
            relative_str(Path::new("/a/b"), Path::new("/a/b/c/d.css")).as_deref(),
            Some("c/d.css")
        );
    }

    #[test]
    fn unrelated_path_is_none() {
        assert_eq!(relative_str(Path::new("/nope-root-x"), Path::new("/other/f")), None);
    }

    #[test]
    fn absolutize_keeps_absolute_paths() {
        let p = Path::new("/definitely/not/here/x");
        assert_eq!(absolutize(p), PathBuf::from("/definitely/not/here/x"));
    }
}
