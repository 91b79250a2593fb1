use log::debug;
use rand::Rng;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DriveError;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const BOUNDARY_PREFIX: &str = "drive_sync_";
const BOUNDARY_RANDOM_LEN: usize = 32;
const BOUNDARY_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// HTTP client for the Google Drive v3 API
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    api_base: String,
    upload_base: String,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_base_urls(DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    /// Point the client at a different API host, used by tests against a mock server
    pub fn with_base_urls(api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    pub fn upload_url(&self, path: &str) -> String {
        format!("{}{}", self.upload_base, path)
    }

    /// Make a GET request with authorization header
    pub async fn get<T, Q>(
        &self,
        operation: &'static str,
        url: &str,
        query: &Q,
        auth_header: &str,
    ) -> Result<T, DriveError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, auth_header)
            .query(query)
            .send()
            .await
            .map_err(|source| DriveError::Network { operation, source })?;

        Self::parse(operation, response).await
    }

    /// Make a POST request with a JSON body
    pub async fn post_json<T, Q, B>(
        &self,
        operation: &'static str,
        url: &str,
        query: &Q,
        body: &B,
        auth_header: &str,
    ) -> Result<T, DriveError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
        B: Serialize + ?Sized,
    {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, auth_header)
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|source| DriveError::Network { operation, source })?;

        Self::parse(operation, response).await
    }

    /// Upload metadata and content in one `multipart/related` request
    pub async fn post_multipart<T, Q, M>(
        &self,
        operation: &'static str,
        url: &str,
        query: &Q,
        metadata: &M,
        content: &[u8],
        auth_header: &str,
    ) -> Result<T, DriveError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
        M: Serialize + ?Sized,
    {
        let metadata_json = serde_json::to_vec(metadata)
            .map_err(|source| DriveError::Encode { operation, source })?;
        let boundary = multipart_boundary(&metadata_json, content);
        let body = multipart_related_body(&boundary, &metadata_json, content);

        debug!("POST {} ({} bytes)", url, content.len());
        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, auth_header)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(query)
            .body(body)
            .send()
            .await
            .map_err(|source| DriveError::Network { operation, source })?;

        Self::parse(operation, response).await
    }

    /// Replace the content of an existing file
    pub async fn patch_media<T, Q>(
        &self,
        operation: &'static str,
        url: &str,
        query: &Q,
        content: &[u8],
        auth_header: &str,
    ) -> Result<T, DriveError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        debug!("PATCH {} ({} bytes)", url, content.len());
        let response = self
            .client
            .patch(url)
            .header(header::AUTHORIZATION, auth_header)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .query(query)
            .body(content.to_vec())
            .send()
            .await
            .map_err(|source| DriveError::Network { operation, source })?;

        Self::parse(operation, response).await
    }

    async fn parse<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, DriveError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| DriveError::Decode { operation, source })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Random boundary that occurs in neither part of the upload
fn multipart_boundary(metadata_json: &[u8], content: &[u8]) -> String {
    let mut rng = rand::rng();
    loop {
        let suffix: String = (0..BOUNDARY_RANDOM_LEN)
            .map(|_| BOUNDARY_CHARS[rng.random_range(0..BOUNDARY_CHARS.len())] as char)
            .collect();
        let boundary = format!("{}{}", BOUNDARY_PREFIX, suffix);
        if !contains(metadata_json, boundary.as_bytes()) && !contains(content, boundary.as_bytes())
        {
            return boundary;
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn multipart_related_body(boundary: &str, metadata_json: &[u8], content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata_json.len() + content.len() + 256);

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--", boundary).as_bytes());
    body
}
