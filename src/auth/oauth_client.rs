//! OAuth2 client for the Google authorization and token endpoints.
//!
//! Builds the consent URL for the installed-app flow (with PKCE) and
//! exchanges authorization codes or refresh tokens for credentials.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use log::debug;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use url::Url;

use crate::auth::token_store::Credential;
use crate::error::{AuthError, ConfigError};

/// Scope limited to files created by this application
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const PKCE_CODE_VERIFIER_LENGTH: usize = 128;
const PKCE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
const STATE_LENGTH: usize = 32;

/// Client section of a Google OAuth client secret file
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Parse a client secret file as downloaded from the Google Cloud console
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ClientSecretFile =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        file.installed
            .or(file.web)
            .ok_or_else(|| ConfigError::MissingClientSection(path.to_path_buf()))
    }
}

/// Per-attempt values tying the consent URL to the callback
#[derive(Debug, Clone)]
pub struct PendingGrant {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub redirect_uri: String,
}

impl PendingGrant {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        let (code_verifier, code_challenge) = generate_pkce();
        Self {
            state: random_string(STATE_LENGTH),
            code_verifier,
            code_challenge,
            redirect_uri: redirect_uri.into(),
        }
    }
}

fn random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| PKCE_CHARS[rng.random_range(0..PKCE_CHARS.len())] as char)
        .collect()
}

/// Generate PKCE code verifier and S256 challenge
fn generate_pkce() -> (String, String) {
    let code_verifier = random_string(PKCE_CODE_VERIFIER_LENGTH);

    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    let code_challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (code_verifier, code_challenge)
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl IssuedToken {
    /// Build a fresh credential from a code exchange
    pub fn into_credential(self) -> Credential {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
            scopes: split_scopes(self.scope.as_deref()),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }

    /// Apply a refresh response on top of an existing credential.
    ///
    /// The refresh token and scopes are only replaced when the server sends new ones.
    pub fn apply_to(self, credential: &mut Credential) {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        credential.access_token = self.access_token;
        credential.expires_at = Utc::now() + Duration::seconds(expires_in);
        if let Some(refresh_token) = self.refresh_token.filter(|t| !t.is_empty()) {
            credential.refresh_token = Some(refresh_token);
        }
        let scopes = split_scopes(self.scope.as_deref());
        if !scopes.is_empty() {
            credential.scopes = scopes;
        }
        if let Some(token_type) = self.token_type {
            credential.token_type = token_type;
        }
    }
}

fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Seam between the authorization flow and the authorization server
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// URL the operator opens to grant access
    fn authorization_url(&self, grant: &PendingGrant) -> Result<Url, AuthError>;

    async fn exchange_code(&self, code: &str, grant: &PendingGrant)
        -> Result<IssuedToken, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, AuthError>;
}

/// reqwest based client for the Google OAuth endpoints
pub struct OAuthClient {
    client: Client,
    secret: ClientSecret,
    scopes: Vec<String>,
}

impl OAuthClient {
    pub fn new(secret: ClientSecret) -> Self {
        Self::with_scopes(secret, vec![DRIVE_FILE_SCOPE.to_string()])
    }

    pub fn with_scopes(secret: ClientSecret, scopes: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            secret,
            scopes,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.secret.client_id
    }

    fn build_token_exchange_params(
        &self,
        code: &str,
        grant: &PendingGrant,
    ) -> HashMap<&'static str, String> {
        let mut params = self.client_params();
        params.insert("code", code.to_string());
        params.insert("redirect_uri", grant.redirect_uri.clone());
        params.insert("grant_type", "authorization_code".to_string());
        params.insert("code_verifier", grant.code_verifier.clone());
        params
    }

    fn build_refresh_token_params(&self, refresh_token: &str) -> HashMap<&'static str, String> {
        let mut params = self.client_params();
        params.insert("refresh_token", refresh_token.to_string());
        params.insert("grant_type", "refresh_token".to_string());
        params
    }

    fn client_params(&self) -> HashMap<&'static str, String> {
        let mut params = HashMap::new();
        params.insert("client_id", self.secret.client_id.clone());
        if let Some(secret) = &self.secret.client_secret {
            params.insert("client_secret", secret.clone());
        }
        params
    }

    async fn post_token_request(
        &self,
        params: &HashMap<&'static str, String>,
        rejected: fn(String) -> AuthError,
    ) -> Result<IssuedToken, AuthError> {
        let response = self
            .client
            .post(&self.secret.token_uri)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(rejected(format!("{}: {}", status, error_text)));
        }

        let body = response.text().await?;
        serde_json::from_str::<IssuedToken>(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl TokenExchanger for OAuthClient {
    fn authorization_url(&self, grant: &PendingGrant) -> Result<Url, AuthError> {
        let mut auth_url = Url::parse(&self.secret.auth_uri)
            .map_err(|e| AuthError::Exchange(format!("invalid auth_uri: {}", e)))?;
        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &self.secret.client_id)
            .append_pair("redirect_uri", &grant.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &grant.state)
            .append_pair("code_challenge", &grant.code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(auth_url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        grant: &PendingGrant,
    ) -> Result<IssuedToken, AuthError> {
        debug!("Exchanging authorization code at {}", self.secret.token_uri);
        let params = self.build_token_exchange_params(code, grant);
        self.post_token_request(&params, AuthError::Exchange).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, AuthError> {
        debug!("Refreshing access token at {}", self.secret.token_uri);
        let params = self.build_refresh_token_params(refresh_token);
        self.post_token_request(&params, AuthError::Refresh).await
    }
}
