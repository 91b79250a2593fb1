//! Mapping from local directories to the remote folders created for them.
//!
//! Entries are keyed by the full local path of the directory, so two
//! branches containing folders with the same name resolve independently.
//! The mapping lives for one sync pass only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct PathResolver {
    folder_ids: HashMap<PathBuf, String>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the remote folder created for directory `path`
    pub fn register_parent(&mut self, path: &Path, remote_id: impl Into<String>) {
        self.folder_ids.insert(path.to_path_buf(), remote_id.into());
    }

    /// Remote identifier of the directory containing `path`.
    ///
    /// `None` means the parent was never registered and the object belongs at
    /// the store root.
    pub fn resolve_parent(&self, path: &Path) -> Option<&str> {
        path.parent()
            .and_then(|parent| self.folder_ids.get(parent))
            .map(String::as_str)
    }

    /// Display name used for the remote counterpart of `path`
    pub fn object_name(path: &Path) -> Option<String> {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn len(&self) -> usize {
        self.folder_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folder_ids.is_empty()
    }
}
