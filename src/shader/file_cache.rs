//! File cache collaborator.
//!
//! The shader library reads every file through a [`FileCache`], which must
//! guarantee that repeated reads of the same normalized path return
//! byte-identical contents for as long as the cache lives. Contents are
//! handed out as `Arc<str>` so shaders and importers can hold on to them
//! without copies.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Read access to shader source files, memoized per normalized path.
pub trait FileCache: Send + Sync {
    /// Removes redundant `..`/`.` components and normalizes separators.
    fn normalize_path(&self, path: &str) -> String;

    /// Whether `normalized_path` is cached or exists in the backing store.
    fn exists(&self, normalized_path: &str) -> bool;

    /// The file's contents, terminated by a newline. Repeated calls return
    /// byte-identical data. `None` when the file cannot be read.
    fn content(&self, normalized_path: &str) -> Option<Arc<str>>;

    /// Drops all memoized contents.
    fn clear(&self);
}

/// Lexically normalizes a path without touching the file system.
pub(crate) fn normalize_components(path: &str) -> String {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                } else {
                    parts.push(component);
                }
            }
            other => parts.push(other),
        }
    }

    let mut normalized = PathBuf::new();
    for part in parts {
        normalized.push(part.as_os_str());
    }
    normalized.to_string_lossy().into_owned()
}

fn with_trailing_newline(mut content: String) -> String {
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

/// [`FileCache`] over the real file system. Paths handed to `exists` and
/// `content` must be absolute.
#[derive(Default)]
pub struct DiskFileCache {
    contents: Mutex<HashMap<String, Arc<str>>>,
}

impl DiskFileCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileCache for DiskFileCache {
    fn normalize_path(&self, path: &str) -> String {
        normalize_components(path)
    }

    fn exists(&self, normalized_path: &str) -> bool {
        if self
            .contents
            .lock()
            .expect("file cache lock poisoned")
            .contains_key(normalized_path)
        {
            return true;
        }

        let path = Path::new(normalized_path);
        path.is_absolute() && path.exists()
    }

    fn content(&self, normalized_path: &str) -> Option<Arc<str>> {
        let mut contents = self.contents.lock().expect("file cache lock poisoned");
        if let Some(cached) = contents.get(normalized_path) {
            return Some(cached.clone());
        }

        let read = std::fs::read_to_string(normalized_path).ok()?;
        let content: Arc<str> = Arc::from(with_trailing_newline(read));
        contents.insert(normalized_path.to_string(), content.clone());
        Some(content)
    }

    fn clear(&self) {
        self.contents
            .lock()
            .expect("file cache lock poisoned")
            .clear();
    }
}

/// In-memory [`FileCache`] for tests and embedded shader sources.
#[derive(Default)]
pub struct MemoryFileCache {
    contents: Mutex<HashMap<String, Arc<str>>>,
}

impl MemoryFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a file under its normalized path, newline-terminating the
    /// content like a disk read would.
    pub fn insert(&self, path: &str, content: &str) {
        self.contents
            .lock()
            .expect("file cache lock poisoned")
            .insert(
                normalize_components(path),
                Arc::from(with_trailing_newline(content.to_string())),
            );
    }
}

impl FileCache for MemoryFileCache {
    fn normalize_path(&self, path: &str) -> String {
        normalize_components(path)
    }

    fn exists(&self, normalized_path: &str) -> bool {
        self.contents
            .lock()
            .expect("file cache lock poisoned")
            .contains_key(normalized_path)
    }

    fn content(&self, normalized_path: &str) -> Option<Arc<str>> {
        self.contents
            .lock()
            .expect("file cache lock poisoned")
            .get(normalized_path)
            .cloned()
    }

    fn clear(&self) {
        self.contents
            .lock()
            .expect("file cache lock poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_components, FileCache, MemoryFileCache};

    #[test]
    fn normalization() {
        assert_eq!(normalize_components("a/b/../c"), "a/c");
        assert_eq!(normalize_components("a//b/./c"), "a/b/c");
        assert_eq!(normalize_components("/root/x/../y"), "/root/y");
        assert_eq!(normalize_components("../up"), "../up");
        assert_eq!(normalize_components("a/../../up"), "../up");
    }

    #[test]
    fn memory_cache_round_trip() {
        let cache = MemoryFileCache::new();
        cache.insert("shaders/./common.hlsl", "float4 color;");

        let normalized = cache.normalize_path("shaders/common.hlsl");
        assert!(cache.exists(&normalized));

        let first = cache.content(&normalized).unwrap();
        let second = cache.content(&normalized).unwrap();
        assert_eq!(first, second);
        assert_eq!(&*first, "float4 color;\n");

        cache.clear();
        assert!(!cache.exists(&normalized));
    }

    #[test]
    fn missing_files() {
        let cache = MemoryFileCache::new();
        assert!(!cache.exists("nope"));
        assert!(cache.content("nope").is_none());
    }
}
