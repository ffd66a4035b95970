//! File locator collaborator.
//!
//! Resolves `import` and `#include` references to normalized paths. Quoted
//! relatives (`"lighting.hlsl"`) resolve against the referencing file's
//! directory; bracketed relatives (`<common.hlsl>`) search the registered
//! include directories in reverse insertion order, so the last added root
//! has the highest priority. Paths the cache already knows pass through
//! unchanged.

use crate::shader::file_cache::FileCache;

/// Resolves a reference found in `parent_path` to a locatable path.
pub trait FileLocator: Send + Sync {
    fn find(&self, cache: &dyn FileCache, parent_path: &str, relative: &str) -> Option<String>;
}

/// [`FileLocator`] over a list of include directories.
#[derive(Debug, Default)]
pub struct IncludeDirLocator {
    include_paths: Vec<String>,
}

impl IncludeDirLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an include root. Later roots shadow earlier ones.
    pub fn add_include_directory(&mut self, path: &str) {
        let mut with_separator = path.to_string();
        if !with_separator.ends_with('/') {
            with_separator.push('/');
        }
        self.include_paths.push(with_separator);
    }

    fn find_relative_to_parent(
        &self,
        cache: &dyn FileCache,
        parent_path: &str,
        relative: &str,
    ) -> Option<String> {
        // Drop the parent's file name with a `..` and let normalization
        // collapse it.
        let full_path = cache.normalize_path(&format!("{parent_path}/../{relative}"));
        cache.exists(&full_path).then_some(full_path)
    }

    fn find_in_include_directories(
        &self,
        cache: &dyn FileCache,
        relative: &str,
    ) -> Option<String> {
        for directory in self.include_paths.iter().rev() {
            let full_path = cache.normalize_path(&format!("{directory}{relative}"));
            if cache.exists(&full_path) {
                return Some(full_path);
            }
        }
        None
    }
}

impl FileLocator for IncludeDirLocator {
    fn find(&self, cache: &dyn FileCache, parent_path: &str, relative: &str) -> Option<String> {
        if relative.is_empty() {
            return None;
        }

        // Already locatable as-is (e.g. an absolute path).
        if cache.exists(relative) {
            return Some(relative.to_string());
        }

        let quoted = relative.starts_with('"');
        let mut stripped = relative;
        stripped = stripped
            .strip_prefix(['"', '<'])
            .unwrap_or(stripped);
        stripped = stripped
            .strip_suffix(['"', '>'])
            .unwrap_or(stripped);

        if quoted {
            self.find_relative_to_parent(cache, parent_path, stripped)
        } else {
            self.find_in_include_directories(cache, stripped)
        }
    }
}
