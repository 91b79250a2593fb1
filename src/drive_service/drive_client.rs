use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

use crate::auth::google_auth::AccessTokenProvider;
use crate::drive_service::drive_models::{
    DriveFile, FileList, NewFile, NewFolder, RemoteObjectReference, FILE_FIELDS,
    FOLDER_COLOR_RGB, FOLDER_MIME_TYPE,
};
use crate::drive_service::http_client::HttpClient;
use crate::error::DriveError;

/// Operations the sync engine needs from the remote object store.
///
/// The four primitives never deduplicate; the `create_or_update_*` helpers
/// build the upsert policy on top of them and do not retry.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create_file(
        &self,
        content: &[u8],
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError>;

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError>;

    /// First non-trashed object named `name`, constrained to `parent_id` when given
    async fn find(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteObjectReference>, DriveError>;

    /// Replace file content in place, keeping the identifier
    async fn update_content(
        &self,
        id: &str,
        content: &[u8],
    ) -> Result<RemoteObjectReference, DriveError>;

    async fn create_or_update_file(
        &self,
        content: &[u8],
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError> {
        match self.find(name, parent_id).await? {
            Some(existing) => {
                debug!("Updating existing file {} ({})", name, existing.id);
                self.update_content(&existing.id, content).await
            }
            None => {
                debug!("Creating file {}", name);
                self.create_file(content, name, parent_id).await
            }
        }
    }

    /// Folders are never updated, an existing match is returned as is
    async fn create_or_update_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError> {
        match self.find(name, parent_id).await? {
            Some(existing) => {
                debug!("Reusing existing folder {} ({})", name, existing.id);
                Ok(existing)
            }
            None => {
                debug!("Creating folder {}", name);
                self.create_folder(name, parent_id).await
            }
        }
    }
}

/// Google Drive v3 implementation of `RemoteStore`
pub struct DriveClient {
    http_client: HttpClient,
    auth: Arc<dyn AccessTokenProvider>,
}

impl DriveClient {
    pub fn new(auth: Arc<dyn AccessTokenProvider>) -> Self {
        Self::with_http_client(auth, HttpClient::new())
    }

    pub fn with_http_client(auth: Arc<dyn AccessTokenProvider>, http_client: HttpClient) -> Self {
        Self { http_client, auth }
    }

    /// Get authorization header with valid token
    async fn auth_header(&self) -> Result<String, DriveError> {
        let token = self.auth.access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    fn build_find_query(name: &str, parent_id: Option<&str>) -> String {
        let name = escape_query_value(name);
        match parent_id {
            Some(parent) => format!(
                "name = '{}' and '{}' in parents and trashed = false",
                name,
                escape_query_value(parent)
            ),
            None => format!("name = '{}' and trashed = false", name),
        }
    }
}

/// Escape a literal for the Drive query language
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn create_file(
        &self,
        content: &[u8],
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError> {
        let auth_header = self.auth_header().await?;
        let url = self.http_client.upload_url("/files");
        let metadata = NewFile {
            name,
            parents: parent_id.into_iter().collect(),
        };

        let file: DriveFile = self
            .http_client
            .post_multipart(
                "create file",
                &url,
                &[("uploadType", "multipart"), ("fields", FILE_FIELDS)],
                &metadata,
                content,
                &auth_header,
            )
            .await?;

        info!("Created file: {} -> {}", name, file.id);
        Ok(file.into())
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError> {
        let auth_header = self.auth_header().await?;
        let url = self.http_client.api_url("/files");
        let body = NewFolder {
            name,
            mime_type: FOLDER_MIME_TYPE,
            parents: parent_id.into_iter().collect(),
            folder_color_rgb: FOLDER_COLOR_RGB,
        };

        let folder: DriveFile = self
            .http_client
            .post_json(
                "create folder",
                &url,
                &[("fields", FILE_FIELDS)],
                &body,
                &auth_header,
            )
            .await?;

        info!("Created folder: {} -> {}", name, folder.id);
        Ok(folder.into())
    }

    async fn find(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteObjectReference>, DriveError> {
        let auth_header = self.auth_header().await?;
        let url = self.http_client.api_url("/files");
        let query = Self::build_find_query(name, parent_id);
        let fields = format!("files({})", FILE_FIELDS);

        let list: FileList = self
            .http_client
            .get(
                "find",
                &url,
                &[
                    ("q", query.as_str()),
                    ("fields", fields.as_str()),
                    ("orderBy", "createdTime"),
                    ("pageSize", "1"),
                ],
                &auth_header,
            )
            .await?;

        Ok(list.files.into_iter().next().map(RemoteObjectReference::from))
    }

    async fn update_content(
        &self,
        id: &str,
        content: &[u8],
    ) -> Result<RemoteObjectReference, DriveError> {
        let auth_header = self.auth_header().await?;
        let url = self
            .http_client
            .upload_url(&format!("/files/{}", urlencoding::encode(id)));

        let file: DriveFile = self
            .http_client
            .patch_media(
                "update file",
                &url,
                &[("uploadType", "media"), ("fields", FILE_FIELDS)],
                content,
                &auth_header,
            )
            .await?;

        info!("Updated file: {}", file.id);
        Ok(file.into())
    }
}
