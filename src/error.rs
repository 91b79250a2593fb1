//! Error types shared across the sync engine.
//!
//! Authorization failures are kept apart from remote store failures so the
//! binary can tell the operator to re-authorize instead of just retrying.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with the settings file or the OAuth client secret file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Client secret file {0} has neither an \"installed\" nor a \"web\" section")]
    MissingClientSection(PathBuf),

    #[error("Platform directories could not be determined")]
    NoProjectDirs,
}

/// Credential file failures. A missing file is not an error, see `TokenStore::load`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Credential file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file {path} is malformed: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Callback listener failed: {0}")]
    Listener(String),

    #[error("Unable to exchange authorization code: {0}")]
    Exchange(String),

    #[error("Unable to refresh token: {0}")]
    Refresh(String),

    #[error("Credential has expired and carries no refresh token")]
    MissingRefreshToken,

    #[error("No credential available, authorization is required")]
    NotAuthenticated,

    #[error("Malformed token endpoint response: {0}")]
    MalformedResponse(String),

    #[error("Token endpoint request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("{operation} request failed: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to encode {operation} request: {source}")]
    Encode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Drive request could not be authorized: {0}")]
    Auth(#[from] AuthError),
}

impl DriveError {
    /// The underlying authorization failure, if any.
    pub fn as_auth_error(&self) -> Option<&AuthError> {
        match self {
            DriveError::Auth(e) => Some(e),
            _ => None,
        }
    }
}

/// A failed sync pass. Every variant names the path that was being processed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync root {path} cannot be used: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to sync {path}: {source}")]
    Remote {
        path: PathBuf,
        #[source]
        source: DriveError,
    },
}

impl SyncError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            SyncError::InvalidRoot { path, .. }
            | SyncError::Walk { path, .. }
            | SyncError::Io { path, .. }
            | SyncError::Remote { path, .. } => path,
        }
    }

    /// Whether this pass failed because the credential is unusable.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Remote {
                source: DriveError::Auth(_),
                ..
            }
        )
    }
}
