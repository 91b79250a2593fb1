use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Margin subtracted from the expiry so a token is not used in its last seconds
const EXPIRY_SKEW_SECS: i64 = 10;

/// Bearer credential issued by the authorization server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::seconds(EXPIRY_SKEW_SECS)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

/// File backed storage for the single active credential
pub struct TokenStore {
    file_path: PathBuf,
}

impl TokenStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Load the persisted credential.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet so the caller can
    /// start a first time authorization.
    pub fn load(&self) -> Result<Option<Credential>, StoreError> {
        let data = match fs::read_to_string(&self.file_path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No credential file at {}", self.file_path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.file_path.clone(),
                    source,
                })
            }
        };

        let credential = serde_json::from_str(&data).map_err(|source| StoreError::Serde {
            path: self.file_path.clone(),
            source,
        })?;
        Ok(Some(credential))
    }

    /// Overwrite the persisted credential.
    ///
    /// The record is written to a sibling temporary file which is renamed over
    /// the destination, so readers never observe a half written file.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.file_path.clone(),
            source,
        };

        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = self.tmp_path();
        let written = Self::write_tmp(&tmp_path, credential);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &self.file_path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            io_err(source)
        })?;

        debug!("Credential saved to {}", self.file_path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .file_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.file_path.with_file_name(name)
    }

    fn write_tmp(tmp_path: &Path, credential: &Credential) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: tmp_path.to_path_buf(),
            source,
        };

        let file = Self::create_private(tmp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, credential).map_err(|source| {
            StoreError::Serde {
                path: tmp_path.to_path_buf(),
                source,
            }
        })?;
        writer.flush().map_err(io_err)?;
        let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)
    }

    #[cfg(unix)]
    fn create_private(path: &Path) -> std::io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
    }

    #[cfg(not(unix))]
    fn create_private(path: &Path) -> std::io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }
}
