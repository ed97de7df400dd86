//! Authenticated HTTP client for the SchoolDesk backend.
//!
//! Every request carries the stored access token as a bearer header and a
//! JSON content type. A 401 on a non-auth route triggers one session
//! refresh through the client's [`RefreshGate`] and one retry of the
//! original request. If the refresh fails the stored session is cleared,
//! the auth-failure hook fires, and the caller gets
//! [`ApiError::SessionExpired`].

use std::sync::Arc;

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::auth::{TokenKind, TokenStore};
use super::error::ApiError;
use super::refresh::{RefreshFailure, RefreshGate, RefreshOutcome};
use super::transport::{ApiRequest, HttpTransport, RawResponse, ReqwestTransport};
use super::types::{RefreshRequest, SessionTokens};
use crate::config::{AuthEndpoints, ClientConfig};

/// Called once per failed refresh, after the stored session was cleared.
pub type AuthFailureHook = Arc<dyn Fn() + Send + Sync>;

/// Per-call overrides. Headers set here replace the defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// HTTP client wrapper for SchoolDesk API communication.
pub struct ApiClient<T = ReqwestTransport> {
    transport: T,
    base_url: String,
    session_url: String,
    endpoints: AuthEndpoints,
    tokens: Arc<dyn TokenStore>,
    refresh: Arc<RefreshGate>,
    on_auth_failure: Option<AuthFailureHook>,
}

impl ApiClient<ReqwestTransport> {
    /// Create a client talking to the backend described by `config`.
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let transport = ReqwestTransport::new(config.timeout, config.connect_timeout);
        Self::with_transport(transport, config, tokens)
    }
}

impl<T: HttpTransport> ApiClient<T> {
    pub fn with_transport(
        transport: T,
        config: &ClientConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            transport,
            base_url: config.api_base_url.clone(),
            session_url: config.session_base_url.clone(),
            endpoints: config.endpoints.clone(),
            tokens,
            refresh: Arc::new(RefreshGate::new()),
            on_auth_failure: None,
        }
    }

    /// Register the hook run when the session cannot be recovered.
    pub fn on_auth_failure(mut self, hook: AuthFailureHook) -> Self {
        self.on_auth_failure = Some(hook);
        self
    }

    /// Share a refresh gate with another client using the same token store.
    pub fn with_refresh_gate(mut self, gate: Arc<RefreshGate>) -> Self {
        self.refresh = gate;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn refresh_gate(&self) -> &RefreshGate {
        &self.refresh
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.get_with(path, &RequestOptions::default()).await
    }

    pub async fn get_with<R: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<R, ApiError> {
        self.send(Method::GET, path, None, options).await
    }

    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.post_with(path, Some(body), &RequestOptions::default()).await
    }

    pub async fn post_with<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(Method::POST, path, encode_body(body)?, options).await
    }

    pub async fn put<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.put_with(path, Some(body), &RequestOptions::default()).await
    }

    pub async fn put_with<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(Method::PUT, path, encode_body(body)?, options).await
    }

    pub async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.patch_with(path, Some(body), &RequestOptions::default()).await
    }

    pub async fn patch_with<B, R>(
        &self,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(Method::PATCH, path, encode_body(body)?, options).await
    }

    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.delete_with(path, &RequestOptions::default()).await
    }

    pub async fn delete_with<R: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<R, ApiError> {
        self.send(Method::DELETE, path, None, options).await
    }

    /// Log in with `credentials` and store the returned tokens.
    pub async fn login<C: Serialize + ?Sized>(
        &self,
        credentials: &C,
    ) -> Result<SessionTokens, ApiError> {
        let url = format!("{}{}", self.session_url, self.endpoints.login);
        let body = encode_body(Some(credentials))?;
        let response = self
            .execute(Method::POST, &url, &self.endpoints.login, body, &RequestOptions::default())
            .await?;
        let tokens: SessionTokens = decode(response)?;
        self.refresh
            .settle(Ok(()), || self.store_tokens(&tokens))
            .await?;

        log::info!("Login successful");
        Ok(tokens)
    }

    /// End the session: notify the logout route (best-effort), then clear
    /// the stored tokens.
    pub async fn logout(&self) -> Result<(), ApiError> {
        log::info!("Logging out");

        let url = format!("{}{}", self.session_url, self.endpoints.logout);
        match self
            .execute(Method::POST, &url, &self.endpoints.logout, None, &RequestOptions::default())
            .await
        {
            Ok(resp) if resp.is_success() => {}
            Ok(resp) => log::warn!(
                "Logout route returned {} (continuing local cleanup)",
                resp.status
            ),
            Err(e) => log::warn!("Logout request failed (continuing local cleanup): {}", e),
        }

        self.refresh
            .settle(Err(RefreshFailure::SignedOut), || self.tokens.clear())
            .await?;
        Ok(())
    }

    /// Refresh the session now, e.g. on start-up before the first request.
    ///
    /// Joins a refresh already in flight rather than starting another.
    pub async fn refresh_session(&self) -> Result<(), ApiError> {
        let observed = self.refresh.epoch();
        self.refresh_after(observed)
            .await
            .map_err(|_| ApiError::SessionExpired)
    }

    /// Whether an access token is currently stored.
    pub fn is_authenticated(&self) -> Result<bool, ApiError> {
        Ok(self.tokens.get(TokenKind::Access)?.is_some())
    }

    async fn send<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
    ) -> Result<R, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.execute(method, &url, path, body, options).await?;
        decode(response)
    }

    /// Send once, and on a 401 from a non-auth route refresh and send once more.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        path: &str,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
    ) -> Result<RawResponse, ApiError> {
        let observed = self.refresh.epoch();
        let token = self.tokens.get(TokenKind::Access)?;

        let request = build_request(method.clone(), url, token.as_deref(), body.clone(), options);
        let response = self.transport.send(request).await?;

        if response.status != 401 || self.endpoints.is_exempt(path) {
            return Ok(response);
        }

        log::info!("{} {} returned 401, refreshing session", method, path);
        if let Err(failure) = self.refresh_after(observed).await {
            log::warn!("{} {} abandoned: {}", method, path, failure);
            return Err(ApiError::SessionExpired);
        }

        // Logout may have cleared the store after the refresh settled.
        let Some(token) = self.tokens.get(TokenKind::Access)? else {
            log::warn!("{} {} abandoned: no session to retry with", method, path);
            return Err(ApiError::SessionExpired);
        };

        let retry = build_request(method, url, Some(&token), body, options);
        self.transport.send(retry).await
    }

    async fn refresh_after(&self, observed: u64) -> RefreshOutcome {
        self.refresh
            .run(observed, move || self.perform_refresh())
            .await
    }

    /// The refresh call itself. Only ever run by the gate's current leader.
    async fn perform_refresh(&self) -> RefreshOutcome {
        let refresh_token = match self.tokens.get(TokenKind::Refresh) {
            Ok(token) => token,
            Err(e) => return self.fail_refresh(RefreshFailure::Storage(e.to_string())),
        };

        let body = match serde_json::to_vec(&RefreshRequest { refresh_token }) {
            Ok(body) => body,
            Err(e) => return self.fail_refresh(RefreshFailure::Transport(e.to_string())),
        };

        let url = format!("{}{}", self.session_url, self.endpoints.refresh);
        let request =
            build_request(Method::POST, &url, None, Some(body), &RequestOptions::default());

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => return self.fail_refresh(RefreshFailure::Transport(e.to_string())),
        };

        if !response.is_success() {
            return self.fail_refresh(RefreshFailure::Rejected(response.status));
        }

        let tokens: SessionTokens = match serde_json::from_slice(&response.body) {
            Ok(tokens) => tokens,
            Err(e) => {
                log::warn!("Unreadable refresh response: {}", e);
                return self.fail_refresh(RefreshFailure::MalformedResponse);
            }
        };

        if let Err(e) = self.store_tokens(&tokens) {
            return self.fail_refresh(RefreshFailure::Storage(e.to_string()));
        }

        log::info!("Session refreshed");
        Ok(())
    }

    fn store_tokens(&self, tokens: &SessionTokens) -> Result<(), ApiError> {
        self.tokens.set(TokenKind::Access, &tokens.access_token)?;
        if let Some(ref refresh_token) = tokens.refresh_token {
            self.tokens.set(TokenKind::Refresh, refresh_token)?;
        }
        Ok(())
    }

    /// Clear the local session and notify the application.
    fn fail_refresh(&self, failure: RefreshFailure) -> RefreshOutcome {
        log::warn!("Session refresh failed: {}", failure);

        if let Err(e) = self.tokens.clear() {
            log::error!("Failed to clear stored session: {}", e);
        }
        if let Some(ref hook) = self.on_auth_failure {
            hook();
        }

        Err(failure)
    }
}

fn build_request(
    method: Method,
    url: &str,
    token: Option<&str>,
    body: Option<Vec<u8>>,
    options: &RequestOptions,
) -> ApiRequest {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => log::warn!("Stored access token is not a valid header value, omitting it"),
        }
    }

    for (name, value) in options.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }

    ApiRequest {
        method,
        url: url.to_string(),
        headers,
        body,
    }
}

fn encode_body<B: Serialize + ?Sized>(body: Option<&B>) -> Result<Option<Vec<u8>>, ApiError> {
    body.map(serde_json::to_vec)
        .transpose()
        .map_err(ApiError::Serialize)
}

/// Parse a body as JSON. Empty and malformed bodies become `Null`.
pub fn parse_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Ignoring malformed JSON response body: {}", e);
            Value::Null
        }
    }
}

fn decode<R: DeserializeOwned>(response: RawResponse) -> Result<R, ApiError> {
    let data = parse_body(&response.body);

    if !response.is_success() {
        return Err(ApiError::from_response(response.status, data));
    }

    R::deserialize(&data).map_err(|source| ApiError::Decode {
        status: response.status,
        data,
        source,
    })
}
