use async_trait::async_trait;
use drive_sync::auth::callback_server::CallbackServer;
use drive_sync::auth::google_auth::{AuthOptions, AuthStatus, GoogleAuth};
use drive_sync::auth::oauth_client::{
    ClientSecret, IssuedToken, OAuthClient, PendingGrant, TokenExchanger,
};
use drive_sync::auth::token_store::TokenStore;
use drive_sync::error::AuthError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::setup::init_test_logging;

/// Exchanger that succeeds or fails without touching the network
struct StubExchanger {
    exchanges: AtomicUsize,
    fail_exchange: bool,
}

impl StubExchanger {
    fn new(fail_exchange: bool) -> Arc<Self> {
        Arc::new(Self {
            exchanges: AtomicUsize::new(0),
            fail_exchange,
        })
    }

    fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchanger for StubExchanger {
    fn authorization_url(&self, grant: &PendingGrant) -> Result<Url, AuthError> {
        let mut url = Url::parse("https://accounts.example.com/o/oauth2/auth").unwrap();
        url.query_pairs_mut()
            .append_pair("redirect_uri", &grant.redirect_uri)
            .append_pair("state", &grant.state);
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _grant: &PendingGrant,
    ) -> Result<IssuedToken, AuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange {
            return Err(AuthError::Exchange("400 Bad Request: invalid_grant".to_string()));
        }
        Ok(IssuedToken {
            access_token: format!("access-for-{}", code),
            refresh_token: Some("refresh-1".to_string()),
            expires_in: Some(3600),
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<IssuedToken, AuthError> {
        Err(AuthError::Refresh("not used".to_string()))
    }
}

fn secret_for(server: &MockServer) -> ClientSecret {
    ClientSecret {
        client_id: "client-1".to_string(),
        client_secret: Some("secret-1".to_string()),
        auth_uri: format!("{}/auth", server.uri()),
        token_uri: format!("{}/token", server.uri()),
    }
}

fn form_encoded(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn callback_url(port: u16, query: &str) -> String {
    format!("http://127.0.0.1:{}/callback?{}", port, query)
}

// ============================================================================
// Token endpoint
// ============================================================================

#[tokio::test]
async fn test_exchange_code_posts_pkce_form() {
    init_test_logging();
    let server = MockServer::start().await;
    let client = OAuthClient::new(secret_for(&server));
    let grant = PendingGrant::new("http://localhost:8080/callback");

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=code-1"))
        .and(body_string_contains(format!("code_verifier={}", form_encoded(&grant.code_verifier))))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/drive.file",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let issued = client.exchange_code("code-1", &grant).await.unwrap();
    assert_eq!(issued.access_token, "a1");
    assert_eq!(issued.refresh_token.as_deref(), Some("r1"));

    let credential = issued.into_credential();
    assert!(credential.can_refresh());
    assert!(!credential.is_expired());
}

#[tokio::test]
async fn test_refresh_without_new_refresh_token() {
    let server = MockServer::start().await;
    let client = OAuthClient::new(secret_for(&server));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "a2",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let issued = client.refresh("r1").await.unwrap();
    assert_eq!(issued.access_token, "a2");
    assert!(issued.refresh_token.is_none());
}

#[tokio::test]
async fn test_rejected_refresh_is_refresh_error() {
    let server = MockServer::start().await;
    let client = OAuthClient::new(secret_for(&server));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    match client.refresh("revoked").await.unwrap_err() {
        AuthError::Refresh(message) => assert!(message.contains("invalid_grant")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_code_is_exchange_error() {
    let server = MockServer::start().await;
    let client = OAuthClient::new(secret_for(&server));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let grant = PendingGrant::new("http://localhost:8080/callback");
    let err = client.exchange_code("stale", &grant).await.unwrap_err();
    assert!(matches!(err, AuthError::Exchange(_)));
}

#[tokio::test]
async fn test_malformed_token_response() {
    let server = MockServer::start().await;
    let client = OAuthClient::new(secret_for(&server));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"token\": 1}"))
        .mount(&server)
        .await;

    let err = client.refresh("r1").await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse(_)));
}

// ============================================================================
// Callback listener
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_callback_exchanges_first_valid_code() {
    init_test_logging();
    let exchanger = StubExchanger::new(false);
    let server = CallbackServer::bind(0).unwrap();
    let port = server.port();
    let grant = PendingGrant::new(server.redirect_uri());
    let state = grant.state.clone();

    let waiting = tokio::spawn(server.wait_for_grant(exchanger.clone(), grant));

    let response = reqwest::get(callback_url(port, &format!("state={}", state)))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = reqwest::get(format!("http://127.0.0.1:{}/favicon.ico", port))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = reqwest::get(callback_url(port, "code=c1&state=forged"))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(exchanger.exchanges(), 0);

    let response = reqwest::get(callback_url(port, &format!("code=c1&state={}", state)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("Authorization successful"));

    let issued = waiting.await.unwrap().unwrap();
    assert_eq!(issued.access_token, "access-for-c1");
    assert_eq!(exchanger.exchanges(), 1);

    // the listener is gone once the grant completed
    let late = reqwest::get(callback_url(port, &format!("code=c2&state={}", state))).await;
    assert!(late.unwrap_err().is_connect());
    assert_eq!(exchanger.exchanges(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_callback_reports_failed_exchange() {
    let exchanger = StubExchanger::new(true);
    let server = CallbackServer::bind(0).unwrap();
    let port = server.port();
    let grant = PendingGrant::new(server.redirect_uri());
    let state = grant.state.clone();

    let waiting = tokio::spawn(server.wait_for_grant(exchanger.clone(), grant));

    let response = reqwest::get(callback_url(port, &format!("code=bad&state={}", state)))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::Exchange(_)));
    assert_eq!(exchanger.exchanges(), 1);
}

// ============================================================================
// Full interactive grant
// ============================================================================

/// Port the listener is bound to, read back from the presented authorization URL
async fn wait_for_listener_port(auth: &GoogleAuth) -> u16 {
    for _ in 0..200 {
        if let Some(url) = auth.reauthorization_url() {
            let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
            let port = pairs
                .get("redirect_uri")
                .and_then(|uri| Url::parse(uri).ok())
                .and_then(|uri| uri.port());
            if let Some(port) = port.filter(|p| *p != 0) {
                return port;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("callback listener never started");
}

fn state_of(auth: &GoogleAuth) -> String {
    let url = auth.reauthorization_url().unwrap();
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_authorize_persists_credential() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("token.json");
    let exchanger = StubExchanger::new(false);
    let auth = Arc::new(GoogleAuth::new(
        exchanger.clone(),
        TokenStore::new(&token_path),
        AuthOptions {
            callback_port: 0,
            open_browser: false,
        },
    ));

    let granting = tokio::spawn({
        let auth = auth.clone();
        async move { auth.ensure_authenticated().await }
    });

    let port = wait_for_listener_port(&auth).await;
    assert_eq!(auth.status().await, AuthStatus::AwaitingUserGrant);

    let state = state_of(&auth);
    let response = reqwest::get(callback_url(port, &format!("code=c7&state={}", state)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let credential = granting.await.unwrap().unwrap();
    assert_eq!(credential.access_token, "access-for-c7");
    assert_eq!(auth.status().await, AuthStatus::Valid);

    let saved = TokenStore::new(&token_path).load().unwrap().unwrap();
    assert_eq!(saved.access_token, "access-for-c7");
    assert_eq!(saved.refresh_token.as_deref(), Some("refresh-1"));

    // a stored, valid credential needs no second grant
    let second = GoogleAuth::new(
        exchanger.clone(),
        TokenStore::new(&token_path),
        AuthOptions {
            callback_port: 0,
            open_browser: false,
        },
    );
    second.ensure_authenticated().await.unwrap();
    assert_eq!(exchanger.exchanges(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_authorize_failure_sets_failed_state() {
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("token.json");
    let auth = Arc::new(GoogleAuth::new(
        StubExchanger::new(true),
        TokenStore::new(&token_path),
        AuthOptions {
            callback_port: 0,
            open_browser: false,
        },
    ));

    let granting = tokio::spawn({
        let auth = auth.clone();
        async move { auth.authorize().await }
    });

    let port = wait_for_listener_port(&auth).await;
    let state = state_of(&auth);
    let response = reqwest::get(callback_url(port, &format!("code=c8&state={}", state)))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    assert!(granting.await.unwrap().is_err());
    assert_eq!(auth.status().await, AuthStatus::Failed);
    assert!(!token_path.exists());
}
