use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use url::Url;

use crate::auth::callback_server::CallbackServer;
use crate::auth::oauth_client::{PendingGrant, TokenExchanger};
use crate::auth::token_store::{Credential, TokenStore};
use crate::error::AuthError;

/// Authorization state of the process
#[derive(Debug, Clone)]
pub enum AuthState {
    Unauthenticated,
    AwaitingUserGrant,
    Authenticated(Credential),
    Refreshing,
    Failed(String),
}

/// Summary of `AuthState` with the credential expiry resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    AwaitingUserGrant,
    Valid,
    Expired,
    Refreshing,
    Failed,
}

impl AuthState {
    pub fn status(&self) -> AuthStatus {
        match self {
            AuthState::Unauthenticated => AuthStatus::Unauthenticated,
            AuthState::AwaitingUserGrant => AuthStatus::AwaitingUserGrant,
            AuthState::Authenticated(credential) if credential.is_expired() => AuthStatus::Expired,
            AuthState::Authenticated(_) => AuthStatus::Valid,
            AuthState::Refreshing => AuthStatus::Refreshing,
            AuthState::Failed(_) => AuthStatus::Failed,
        }
    }
}

/// Source of bearer tokens for remote store requests
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Callback listener settings
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub callback_port: u16,
    pub open_browser: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            callback_port: crate::config::DEFAULT_CALLBACK_PORT,
            open_browser: true,
        }
    }
}

/// Google Drive authentication manager.
///
/// Owns the single credential of the process, persists it after every
/// exchange or refresh, and refreshes it on demand.
pub struct GoogleAuth {
    exchanger: Arc<dyn TokenExchanger>,
    token_store: TokenStore,
    options: AuthOptions,
    state: Mutex<AuthState>,
    last_auth_url: StdMutex<Option<Url>>,
}

impl GoogleAuth {
    pub fn new(
        exchanger: Arc<dyn TokenExchanger>,
        token_store: TokenStore,
        options: AuthOptions,
    ) -> Self {
        Self {
            exchanger,
            token_store,
            options,
            state: Mutex::new(AuthState::Unauthenticated),
            last_auth_url: StdMutex::new(None),
        }
    }

    pub async fn state(&self) -> AuthState {
        self.state.lock().await.clone()
    }

    pub async fn status(&self) -> AuthStatus {
        self.state.lock().await.status()
    }

    /// Load the stored credential, authorize when none exists, refresh when expired
    pub async fn ensure_authenticated(&self) -> Result<Credential, AuthError> {
        let needs_grant = {
            let mut state = self.state.lock().await;
            if matches!(*state, AuthState::Authenticated(_)) {
                false
            } else {
                match self.token_store.load() {
                    Ok(Some(credential)) => {
                        info!("Credential loaded from {}", self.token_store.path().display());
                        *state = AuthState::Authenticated(credential);
                        false
                    }
                    Ok(None) => true,
                    Err(e) => {
                        *state = AuthState::Failed(e.to_string());
                        return Err(e.into());
                    }
                }
            }
        };

        if needs_grant {
            info!("No stored credential, starting authorization");
            return self.authorize().await;
        }

        self.refresh_if_expired().await
    }

    /// Run the interactive grant: present the URL, capture the redirect, exchange the code
    pub async fn authorize(&self) -> Result<Credential, AuthError> {
        *self.state.lock().await = AuthState::AwaitingUserGrant;

        let result = self.run_user_grant().await;
        let mut state = self.state.lock().await;
        match result {
            Ok(credential) => {
                *state = AuthState::Authenticated(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                error!("Authorization failed: {}", e);
                *state = AuthState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_user_grant(&self) -> Result<Credential, AuthError> {
        let server = CallbackServer::bind(self.options.callback_port)?;
        let grant = PendingGrant::new(server.redirect_uri());
        let auth_url = self.exchanger.authorization_url(&grant)?;
        self.present_authorization_url(&auth_url);

        let issued = server.wait_for_grant(self.exchanger.clone(), grant).await?;
        let credential = issued.into_credential();
        if !credential.can_refresh() {
            warn!("Authorization server issued no refresh token, re-authorization will be needed on expiry");
        }

        self.token_store.save(&credential)?;
        info!(
            "Credential saved to {}",
            self.token_store.path().display()
        );
        Ok(credential)
    }

    fn present_authorization_url(&self, auth_url: &Url) {
        println!(
            "Go to the following URL to authorize the application:\n{}",
            auth_url
        );
        info!("Auth URL: {}", auth_url);
        if self.options.open_browser {
            if let Err(e) = webbrowser::open(auth_url.as_str()) {
                warn!("Failed to open browser: {}", e);
            }
        }
        if let Ok(mut last) = self.last_auth_url.lock() {
            *last = Some(auth_url.clone());
        }
    }

    /// Refresh the credential when it has expired, no-op otherwise
    pub async fn refresh_if_expired(&self) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().await;
        let mut credential = match &*state {
            AuthState::Authenticated(credential) if !credential.is_expired_at(Utc::now()) => {
                return Ok(credential.clone());
            }
            AuthState::Authenticated(credential) => credential.clone(),
            _ => return Err(AuthError::NotAuthenticated),
        };

        let Some(refresh_token) = credential.refresh_token.clone().filter(|t| !t.is_empty())
        else {
            *state = AuthState::Failed(AuthError::MissingRefreshToken.to_string());
            return Err(AuthError::MissingRefreshToken);
        };

        warn!("Token expired, refreshing...");
        *state = AuthState::Refreshing;

        let refreshed = match self.exchanger.refresh(&refresh_token).await {
            Ok(issued) => {
                issued.apply_to(&mut credential);
                self.token_store
                    .save(&credential)
                    .map(|_| credential)
                    .map_err(AuthError::from)
            }
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(credential) => {
                info!("Access token refreshed");
                *state = AuthState::Authenticated(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                error!("Token refresh failed: {}", e);
                *state = AuthState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Consent page URL for display only.
    ///
    /// Its `state` and PKCE values belong to a grant nobody is listening for,
    /// so completing consent through it cannot succeed. A new grant is started
    /// with `authorize()`.
    pub fn reauthorization_url(&self) -> Option<Url> {
        if let Some(url) = self.last_auth_url.lock().ok().and_then(|last| last.clone()) {
            return Some(url);
        }
        let redirect_uri = format!(
            "http://localhost:{}{}",
            self.options.callback_port,
            crate::auth::callback_server::CALLBACK_PATH
        );
        self.exchanger
            .authorization_url(&PendingGrant::new(redirect_uri))
            .ok()
    }

    /// Operator message for an authorization failure
    pub fn reauthorization_hint(&self, error: &AuthError) -> String {
        let mut hint = format!(
            "Authorization failed ({}). Run `drive-sync auth` to grant access again.",
            error
        );
        if let Some(url) = self.reauthorization_url() {
            hint.push_str(&format!(
                "\nConsent page, for reference only (it completes only while `drive-sync auth` is running): {}",
                url
            ));
        }
        hint
    }
}

#[async_trait]
impl AccessTokenProvider for GoogleAuth {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.refresh_if_expired().await?.access_token)
    }
}
