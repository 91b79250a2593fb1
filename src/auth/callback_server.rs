//! Short lived local HTTP listener capturing the OAuth redirect.
//!
//! The listener runs on a blocking worker thread while the caller awaits a
//! one-shot completion signal. It performs at most one code exchange: the
//! first request carrying a `code` either completes the grant or reports the
//! exchange failure, and in both cases the listener stops serving.

use log::{debug, info, warn};
use std::sync::Arc;
use tiny_http::{Header, Request, Response, Server};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use url::Url;

use crate::auth::oauth_client::{IssuedToken, PendingGrant, TokenExchanger};
use crate::error::AuthError;

/// Local server address
const CALLBACK_ADDRESS: &str = "127.0.0.1";

/// Path the authorization server redirects to
pub const CALLBACK_PATH: &str = "/callback";

const SUCCESS_MESSAGE: &str = "Authorization successful. You can close this window.";
const MISSING_CODE_MESSAGE: &str = "Authorization code not found";
const STATE_MISMATCH_MESSAGE: &str = "Authorization state does not match this request";

/// What an inbound request asks the listener to do
#[derive(Debug, PartialEq, Eq)]
enum CallbackRequest {
    Code(String),
    MissingCode,
    StateMismatch,
    UnknownPath,
}

pub struct CallbackServer {
    server: Arc<Server>,
    port: u16,
}

impl CallbackServer {
    /// Bind the listener. Port `0` picks a free port, see `port()`.
    pub fn bind(port: u16) -> Result<Self, AuthError> {
        let server = Server::http(format!("{}:{}", CALLBACK_ADDRESS, port))
            .map_err(|e| AuthError::Listener(format!("failed to start local server: {}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(port);

        Ok(Self {
            server: Arc::new(server),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register in the authorization URL
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.port, CALLBACK_PATH)
    }

    /// Serve requests until one code exchange has been attempted.
    ///
    /// Returns the token issued for the first valid code, or the exchange
    /// error. The listener is unblocked and joined before returning.
    pub async fn wait_for_grant(
        self,
        exchanger: Arc<dyn TokenExchanger>,
        grant: PendingGrant,
    ) -> Result<IssuedToken, AuthError> {
        let (done_tx, done_rx) = oneshot::channel();
        let runtime = Handle::current();
        let server = self.server.clone();
        let port = self.port;

        info!("Waiting for authorization callback on port {}...", port);
        let worker = tokio::task::spawn_blocking(move || {
            serve(&server, port, exchanger.as_ref(), &grant, &runtime, done_tx)
        });

        let outcome = done_rx.await;

        self.server.unblock();
        if let Err(e) = worker.await {
            warn!("Callback listener task ended abnormally: {}", e);
        }
        debug!("Callback listener on port {} shut down", port);

        outcome.map_err(|_| {
            AuthError::Listener("listener stopped before an authorization code arrived".to_string())
        })?
    }
}

fn serve(
    server: &Server,
    port: u16,
    exchanger: &dyn TokenExchanger,
    grant: &PendingGrant,
    runtime: &Handle,
    done_tx: oneshot::Sender<Result<IssuedToken, AuthError>>,
) {
    for request in server.incoming_requests() {
        match classify(port, request.url(), &grant.state) {
            CallbackRequest::UnknownPath => {
                debug!("Ignoring request for {}", request.url());
                respond(request, 404, "Not found");
            }
            CallbackRequest::MissingCode => {
                warn!("Callback request without authorization code");
                respond(request, 400, MISSING_CODE_MESSAGE);
            }
            CallbackRequest::StateMismatch => {
                warn!("Callback request with unexpected state parameter");
                respond(request, 400, STATE_MISMATCH_MESSAGE);
            }
            CallbackRequest::Code(code) => {
                let result = runtime.block_on(exchanger.exchange_code(&code, grant));
                match &result {
                    Ok(_) => respond(request, 200, SUCCESS_MESSAGE),
                    Err(e) => respond(
                        request,
                        500,
                        &format!("Unable to exchange authorization code: {}", e),
                    ),
                }
                let _ = done_tx.send(result);
                return;
            }
        }
    }
}

fn classify(port: u16, request_url: &str, expected_state: &str) -> CallbackRequest {
    let Ok(url) = Url::parse(&format!("http://localhost:{}{}", port, request_url)) else {
        return CallbackRequest::MissingCode;
    };
    if url.path() != CALLBACK_PATH {
        return CallbackRequest::UnknownPath;
    }

    let code = url
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty());
    let Some(code) = code else {
        return CallbackRequest::MissingCode;
    };

    let state_matches = url
        .query_pairs()
        .any(|(key, value)| key == "state" && value == expected_state);
    if !state_matches {
        return CallbackRequest::StateMismatch;
    }

    CallbackRequest::Code(code)
}

fn respond(request: Request, status: u16, body: &str) {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/plain; charset=utf-8"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!("Failed to answer callback request: {}", e);
    }
}
