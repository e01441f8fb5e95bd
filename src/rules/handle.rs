// src/rules/handle.rs

//! Normalized file handles used as dependency-matching keys.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// A normalized file or directory path.
///
/// Identity (equality, hashing, ordering) is by normalized path only; the
/// directory flag is carried along for typing but never splits two handles
/// that name the same location.
#[derive(Debug, Clone)]
pub struct FileHandle {
    path: String,
    is_dir: bool,
}

impl FileHandle {
    /// Build a handle, normalizing the path lexically.
    ///
    /// A trailing `/` marks the handle as a directory.
    pub fn new(path: impl AsRef<str>, is_dir: bool) -> Self {
        let raw = path.as_ref();
        let trailing_slash = raw.len() > 1 && raw.ends_with('/');
        Self {
            path: normalize_path(raw),
            is_dir: is_dir || trailing_slash,
        }
    }

    pub fn file(path: impl AsRef<str>) -> Self {
        Self::new(path, false)
    }

    pub fn dir(path: impl AsRef<str>) -> Self {
        Self::new(path, true)
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_absolute(&self) -> bool {
        self.path.starts_with('/')
    }

    /// Whether `self` lies strictly below the directory `dir`.
    pub fn is_under(&self, dir: &FileHandle) -> bool {
        if dir.path == "." {
            return !self.is_absolute() && self.path != ".";
        }
        self.path.len() > dir.path.len()
            && self.path.starts_with(&dir.path)
            && (dir.path.ends_with('/') || self.path.as_bytes()[dir.path.len()] == b'/')
    }

    /// Parent directory of the handle, if it has a non-trivial one.
    pub fn parent(&self) -> Option<&str> {
        let idx = self.path.rfind('/')?;
        if idx == 0 {
            return None;
        }
        Some(&self.path[..idx])
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileHandle {}

impl Hash for FileHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for FileHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "{}/", self.path)
        } else {
            write!(f, "{}", self.path)
        }
    }
}

/// Lexically normalize a `/`-separated path.
///
/// - `.` segments and repeated separators are dropped
/// - `..` pops a preceding normal segment; leading `..` of a relative path is kept
/// - `..` directly under the root is dropped
/// - the empty relative path becomes `.`
pub fn normalize_path(raw: &str) -> String {
    let raw = raw.replace('\\', "/");
    let absolute = raw.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            normal => parts.push(normal),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dots_and_separators() {
        assert_eq!(normalize_path("./a//b/./c"), "a/b/c");
        assert_eq!(normalize_path("a/b/../c"), "a/c");
        assert_eq!(normalize_path("../x/../../y"), "../../y");
        assert_eq!(normalize_path("/../etc"), "/etc");
        assert_eq!(normalize_path("./"), ".");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn identity_ignores_directory_flag() {
        assert_eq!(FileHandle::file("out/x"), FileHandle::dir("out/x/"));
        assert!(FileHandle::file("out/x/").is_dir());
    }

    #[test]
    fn absolute_and_relative_differ() {
        let abs = FileHandle::file("/data/a.txt");
        let rel = FileHandle::file("data/a.txt");
        assert_ne!(abs, rel);
        assert!(abs.is_absolute());
        assert!(!rel.is_absolute());
    }

    #[test]
    fn is_under_requires_segment_boundary() {
        let dir = FileHandle::dir("refs");
        assert!(FileHandle::file("refs/genome.fa").is_under(&dir));
        assert!(!FileHandle::file("refs2/genome.fa").is_under(&dir));
        assert!(!FileHandle::file("refs").is_under(&dir));
    }
}
