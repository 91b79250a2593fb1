//! Upload of a local directory tree to the remote store

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::drive_service::drive_client::RemoteStore;
use crate::error::SyncError;
use crate::sync::path_resolver::PathResolver;

/// Counters for one sync pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub folders: usize,
    pub files: usize,
    pub skipped: usize,
}

/// Walks a local tree and upserts every entry into the remote store
pub struct SyncService<S: RemoteStore + ?Sized> {
    store: Arc<S>,
}

impl<S: RemoteStore + ?Sized> SyncService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Upload `root` and everything below it.
    ///
    /// Directories are visited before their contents, so every parent folder
    /// exists remotely before its children are created. The first failure
    /// aborts the pass; objects already synced stay in place.
    pub async fn sync(&self, root: &Path) -> Result<SyncReport, SyncError> {
        let root = root.canonicalize().map_err(|source| SyncError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        if PathResolver::object_name(&root).is_none() {
            return Err(SyncError::InvalidRoot {
                path: root,
                reason: "path has no final component to name the remote folder".to_string(),
            });
        }

        info!("Starting sync of {}", root.display());
        let mut resolver = PathResolver::new();
        let mut report = SyncReport::default();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|source| SyncError::Walk {
                path: source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.clone()),
                source,
            })?;
            let path = entry.path();
            let file_type = entry.file_type();

            if file_type.is_dir() {
                self.sync_folder(path, &mut resolver).await?;
                report.folders += 1;
            } else if file_type.is_file() {
                self.sync_file(path, &resolver).await?;
                report.files += 1;
            } else {
                warn!("Skipping {} (not a regular file or directory)", path.display());
                report.skipped += 1;
            }
        }

        info!(
            "Sync of {} finished: {} folders, {} files, {} skipped",
            root.display(),
            report.folders,
            report.files,
            report.skipped
        );
        Ok(report)
    }

    async fn sync_folder(&self, path: &Path, resolver: &mut PathResolver) -> Result<(), SyncError> {
        let name = entry_name(path)?;
        let parent_id = resolver.resolve_parent(path).map(str::to_string);

        let folder = self
            .store
            .create_or_update_folder(&name, parent_id.as_deref())
            .await
            .map_err(|source| SyncError::Remote {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Folder {} -> {}", path.display(), folder.id);
        resolver.register_parent(path, folder.id);
        Ok(())
    }

    async fn sync_file(&self, path: &Path, resolver: &PathResolver) -> Result<(), SyncError> {
        let name = entry_name(path)?;
        let parent_id = resolver.resolve_parent(path);

        let content = tokio::fs::read(path).await.map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file = self
            .store
            .create_or_update_file(&content, &name, parent_id)
            .await
            .map_err(|source| SyncError::Remote {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("File {} -> {} ({} bytes)", path.display(), file.id, content.len());
        Ok(())
    }
}

fn entry_name(path: &Path) -> Result<String, SyncError> {
    PathResolver::object_name(path).ok_or_else(|| SyncError::InvalidRoot {
        path: PathBuf::from(path),
        reason: "entry has no file name".to_string(),
    })
}
