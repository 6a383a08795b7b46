//! Authenticated request gateway
//!
//! Every call carries the current access token. A 401 triggers at most one
//! token refresh per call, and concurrent 401s share a single refresh.
//!
//! ```text
//! call ──▶ send(bearer) ──▶ 401? ──no──▶ classify
//!                            │
//!                           yes ──▶ bearer stale? ──yes──▶ replay with current token
//!                                        │
//!                                        no ──▶ join/start refresh ──ok──▶ replay once
//!                                                      │
//!                                                     err ──▶ clear tokens, SessionExpired
//! ```

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::{FORBIDDEN_MESSAGE, GatewayError, SERVER_ERROR_MESSAGE, login_redirect};
use super::session::{Credentials, LoginSession, normalize_login};
use super::token_store::TokenStore;
use super::transport::{ApiReply, ApiRequest, Transport};
use crate::config::ClientConfig;
use crate::user_auth::TokenPair;

const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";

/// Resolves to the new access token, or the reason the session ended
type RefreshFuture = Shared<BoxFuture<'static, Result<String, String>>>;

struct Inner {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    login_path: String,
    refresh_path: String,
    in_flight: Mutex<Option<RefreshFuture>>,
    refresh_calls: AtomicU64,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, Option<RefreshFuture>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
pub struct AuthenticatedGateway {
    inner: Arc<Inner>,
}

impl AuthenticatedGateway {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenStore>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                tokens,
                login_path: config.login_path.clone(),
                refresh_path: config.refresh_path.clone(),
                in_flight: Mutex::new(None),
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    /// Refresh calls issued since construction
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::Relaxed)
    }

    /// Send a request and return the envelope's `data`
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, GatewayError> {
        let bearer = self.inner.tokens.access_token();
        let reply = self
            .inner
            .transport
            .send(&request.with_bearer(bearer.clone()))
            .await?;
        if reply.status != 401 {
            return classify(reply);
        }

        // A refresh finished while this call was on the wire
        let current = self.inner.tokens.access_token();
        let token = match current {
            Some(token) if bearer.as_ref() != Some(&token) => token,
            _ => self.refresh_access().await.map_err(|reason| {
                GatewayError::SessionExpired {
                    reason,
                    redirect: login_redirect(&self.inner.login_path, &request.destination()),
                }
            })?,
        };

        let retry = self
            .inner
            .transport
            .send(&request.with_bearer(Some(token)))
            .await?;
        if retry.status == 401 {
            tracing::warn!(path = %request.path, "Still unauthorized after token refresh");
            return Err(GatewayError::Unauthorized(message_of(&retry.body)));
        }
        classify(retry)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        decode(self.execute(ApiRequest::get(path)).await?)
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, GatewayError> {
        decode(self.execute(ApiRequest::post(path).json(body)).await?)
    }

    /// Log in and install the returned tokens
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginSession, GatewayError> {
        let body = serde_json::to_value(credentials)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        let reply = self
            .inner
            .transport
            .send(&ApiRequest::post(LOGIN_PATH).json(body))
            .await?;
        if !reply.is_success() {
            return Err(failure(reply));
        }

        let session = normalize_login(reply.body)?;
        self.inner.tokens.set_tokens(&session.tokens);
        tracing::info!(user_id = %session.user.id, "Logged in");
        Ok(session)
    }

    /// End the session server-side if possible; local tokens are always
    /// cleared. Only the bearer travels: the server revokes by user.
    pub async fn logout(&self) {
        match self.execute(ApiRequest::post(LOGOUT_PATH)).await {
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Logout call failed"),
        }
        self.inner.tokens.clear();
    }

    /// Join the in-flight refresh, or start one
    async fn refresh_access(&self) -> Result<String, String> {
        let refresh = self
            .inner
            .in_flight()
            .get_or_insert_with(|| run_refresh(self.inner.clone()).boxed().shared())
            .clone();
        refresh.await
    }
}

async fn run_refresh(inner: Arc<Inner>) -> Result<String, String> {
    inner.refresh_calls.fetch_add(1, Ordering::Relaxed);
    let result = request_new_tokens(&inner).await;
    match &result {
        Ok(tokens) => inner.tokens.set_tokens(tokens),
        Err(reason) => {
            tracing::warn!(%reason, "Token refresh failed, ending session");
            inner.tokens.clear();
        }
    }
    // Tokens are in place before the next 401 can start another refresh
    *inner.in_flight() = None;
    result.map(|tokens| tokens.access_token)
}

async fn request_new_tokens(inner: &Inner) -> Result<TokenPair, String> {
    let refresh_token = inner
        .tokens
        .refresh_token()
        .ok_or_else(|| "No refresh token".to_string())?;
    let request =
        ApiRequest::post(inner.refresh_path.as_str()).json(json!({ "refreshToken": refresh_token }));
    let reply = inner
        .transport
        .send(&request)
        .await
        .map_err(|e| e.to_string())?;
    if !reply.is_success() {
        return Err(message_of(&reply.body));
    }
    serde_json::from_value(data_of(reply.body)).map_err(|e| format!("Malformed refresh response: {}", e))
}

fn data_of(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn message_of(body: &Value) -> String {
    body.get("msg")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("Request failed")
        .to_string()
}

/// First message of the first field in `errors`
fn first_field_error(body: &Value) -> Option<String> {
    body.get("errors")?
        .as_object()?
        .values()
        .next()?
        .as_array()?
        .first()?
        .as_str()
        .map(str::to_string)
}

fn classify(reply: ApiReply) -> Result<Value, GatewayError> {
    if reply.is_success() {
        Ok(data_of(reply.body))
    } else {
        Err(failure(reply))
    }
}

fn failure(reply: ApiReply) -> GatewayError {
    match reply.status {
        401 => GatewayError::Unauthorized(message_of(&reply.body)),
        403 => GatewayError::Forbidden(FORBIDDEN_MESSAGE.to_string()),
        422 => GatewayError::Validation(
            first_field_error(&reply.body).unwrap_or_else(|| message_of(&reply.body)),
        ),
        500..=599 => {
            tracing::error!(status = reply.status, "Server error");
            GatewayError::Server(SERVER_ERROR_MESSAGE.to_string())
        }
        status => GatewayError::Api {
            status,
            message: message_of(&reply.body),
        },
    }
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, GatewayError> {
    serde_json::from_value(data).map_err(|e| GatewayError::Decode(e.to_string()))
}
