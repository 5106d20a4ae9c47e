//! Gateway: token attachment and refresh-on-401
//!
//! Every request records the refresh generation, then reads the current
//! access token from `AuthState`, before dispatch. A 401 sends the request
//! through `recover`, which asks the coordinator in one step whether to queue
//! behind a running refresh, replay with a token issued while it was in
//! flight, or lead a new refresh. A request is replayed at most once; a
//! second 401 ends the session, unless its token was replaced meanwhile.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, ORIGIN};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use session::AuthState;
use tracing::{debug, info, instrument, warn};

use crate::constants::{DEFAULT_QUEUE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, REFRESH_PATH};
use crate::error::{Error, Result};
use crate::events::{ExpiryReason, LogListener, SessionExpired, SessionListener};
use crate::refresh::{RefreshCoordinator, RefreshLease, Settlement, Ticket};
use crate::request::ApiRequest;
use crate::telemetry;

/// Connection settings for a gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API origin, e.g. `https://api.example.com`. Paths are appended verbatim.
    pub base_url: String,
    /// Transport timeout for each dispatched request.
    pub timeout: Duration,
    /// How long a request queued behind a refresh waits before failing.
    pub queue_timeout: Duration,
    /// `Origin` sent with every request. The API rejects cookie-authenticated
    /// refresh and logout calls whose origin it does not allow.
    pub origin: Option<String>,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            origin: None,
        }
    }
}

/// Response body of the refresh endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshGrant {
    access_token: Secret<String>,
}

/// How a shared refresh ended for one participant.
enum RefreshOutcome {
    Refreshed(Secret<String>),
    /// The refresh call failed. `ended` is true only for the leader, and
    /// only when no newer token replaced the one it started from.
    Failed { ended: bool },
    /// The wait timed out or the leader was cancelled.
    Unresolved,
    /// The token was replaced while the request was in flight and nothing
    /// replaced it again: the session ended meanwhile.
    Ended,
}

/// HTTP gateway owning the refresh protocol for one application.
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    queue_timeout: Duration,
    state: Arc<AuthState>,
    refresh: RefreshCoordinator,
    listener: Arc<dyn SessionListener>,
}

impl Gateway {
    /// Build a gateway bound to `state`.
    ///
    /// The HTTP client keeps a cookie store so the refresh credential set by
    /// the server is sent back on later refresh calls.
    pub fn new(config: GatewayConfig, state: Arc<AuthState>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(origin) = &config.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|_| Error::InvalidRequest(format!("invalid origin: {origin}")))?;
            headers.insert(ORIGIN, value);
        }

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            queue_timeout: config.queue_timeout,
            state,
            refresh: RefreshCoordinator::new(),
            listener: Arc::new(LogListener),
        })
    }

    /// Replace the session-expired listener.
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn auth_state(&self) -> &Arc<AuthState> {
        &self.state
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(ApiRequest::get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(ApiRequest::delete(path)).await
    }

    /// Send `request` and decode a successful JSON body.
    ///
    /// Non-success statuses become `Error::Status`; an empty body decodes as
    /// JSON `null`, so `()` works for 204 responses.
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        let response = check_status(response).await?;
        decode(response).await
    }

    /// Send `request` through the refresh protocol and return the raw response.
    ///
    /// Any status other than 401 is returned as is. A 401 is recovered
    /// transparently when possible; otherwise the session is torn down and
    /// `Error::SessionExpired` is returned.
    #[instrument(skip_all, fields(request_id = %new_request_id(), method = %request.method(), path = %request.path()))]
    pub async fn send(&self, mut request: ApiRequest) -> Result<reqwest::Response> {
        // Generation first: a token read after it is never older than it.
        let seen = self.refresh.generation();
        let mut token = self.state.token().await;
        loop {
            let response = self.dispatch(&request, token.as_ref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if request.is_retried() {
                return Err(self.reject_replay(&request, token.as_ref(), response).await);
            }

            let fresh = self.recover(&request, seen, token.as_ref(), response).await?;
            request.mark_retried();
            token = Some(fresh);
        }
    }

    /// Obtain a token to replay a request that was answered with 401.
    ///
    /// The 401 body is only read when the request fails with it.
    async fn recover(
        &self,
        request: &ApiRequest,
        seen: u64,
        sent: Option<&Secret<String>>,
        response: reqwest::Response,
    ) -> Result<Secret<String>> {
        let current = self.state.token().await;
        let token_changed = current.is_some() && current.as_ref() != sent;
        match self.follow(self.refresh.join_after(seen, token_changed)).await {
            RefreshOutcome::Refreshed(token) => Ok(token),
            RefreshOutcome::Failed { ended } => {
                if ended {
                    self.notify(request, ExpiryReason::RefreshFailed);
                }
                Err(Error::SessionExpired)
            }
            RefreshOutcome::Ended => Err(Error::SessionExpired),
            RefreshOutcome::Unresolved => Err(Error::from_response(response).await),
        }
    }

    /// A replayed request was answered with 401 again.
    ///
    /// Only a rejection of the token still in `AuthState` ends the session
    /// and notifies the listener. If that token was replaced, or another
    /// refresh is already running, the 401 is returned as is.
    async fn reject_replay(
        &self,
        request: &ApiRequest,
        sent: Option<&Secret<String>>,
        response: reqwest::Response,
    ) -> Error {
        if self.refresh.is_refreshing() {
            debug!("replay rejected while another refresh is running");
            return Error::from_response(response).await;
        }

        if self.state.revoke(sent).await {
            warn!("request rejected again after token refresh");
            self.notify(request, ExpiryReason::RejectedAfterRefresh);
            return Error::SessionExpired;
        }

        if self.state.is_authenticated().await {
            debug!("replayed token was replaced, keeping the newer session");
            Error::from_response(response).await
        } else {
            Error::SessionExpired
        }
    }

    /// Obtain a new access token from the refresh credential.
    ///
    /// Joins the refresh already in flight if there is one. On failure the
    /// session is cleared but no listener is notified: a failed restore at
    /// startup is a normal anonymous outcome.
    pub async fn refresh_session(&self) -> Result<()> {
        match self.follow(self.refresh.join()).await {
            RefreshOutcome::Refreshed(_) => Ok(()),
            RefreshOutcome::Failed { .. } | RefreshOutcome::Unresolved | RefreshOutcome::Ended => {
                Err(Error::SessionExpired)
            }
        }
    }

    async fn follow(&self, ticket: Ticket<'_>) -> RefreshOutcome {
        match ticket {
            Ticket::Replay => match self.state.token().await {
                Some(current) => {
                    debug!("access token changed while request was in flight, replaying");
                    RefreshOutcome::Refreshed(current)
                }
                None => RefreshOutcome::Ended,
            },
            Ticket::Lead(lease) => {
                let started_with = self.state.token().await;
                self.lead(lease, started_with).await
            }
            Ticket::Wait(settled) => {
                telemetry::record_queued();
                debug!("waiting for in-flight token refresh");
                match tokio::time::timeout(self.queue_timeout, settled).await {
                    Ok(Ok(Settlement::Refreshed(token))) => RefreshOutcome::Refreshed(token),
                    Ok(Ok(Settlement::Failed)) => RefreshOutcome::Failed { ended: false },
                    Ok(Err(_)) => {
                        debug!("token refresh abandoned by its leader");
                        RefreshOutcome::Unresolved
                    }
                    Err(_) => {
                        telemetry::record_queue_timeout();
                        warn!(
                            timeout = ?self.queue_timeout,
                            "gave up waiting for token refresh"
                        );
                        RefreshOutcome::Unresolved
                    }
                }
            }
        }
    }

    /// Perform the refresh this caller leads. A failure only clears the
    /// session it started from, so a login that finished meanwhile survives.
    async fn lead(
        &self,
        lease: RefreshLease<'_>,
        started_with: Option<Secret<String>>,
    ) -> RefreshOutcome {
        match self.request_token().await {
            Ok(token) => {
                self.state.set_token(Some(token.clone())).await;
                let released = lease.succeed(&token);
                telemetry::record_refresh("success");
                info!(released, "access token refreshed");
                RefreshOutcome::Refreshed(token)
            }
            Err(e) => {
                let ended = self.state.revoke(started_with.as_ref()).await;
                let rejected = lease.fail();
                telemetry::record_refresh("failure");
                warn!(error = %e, rejected, ended, "token refresh failed");
                RefreshOutcome::Failed { ended }
            }
        }
    }

    /// POST the refresh endpoint directly on the client, outside `send`, so a
    /// 401 here can never re-enter the protocol.
    async fn request_token(&self) -> Result<Secret<String>> {
        let response = self
            .http
            .post(self.url(REFRESH_PATH))
            .send()
            .await
            .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;
        let response = check_status(response).await?;
        let grant: RefreshGrant = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))?;
        Ok(grant.access_token)
    }

    /// Dispatch without a bearer token and without the refresh protocol.
    /// Used for login and registration, where a 401 means bad credentials.
    pub(crate) async fn send_public(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let response = self.dispatch(request, None).await?;
        check_status(response).await
    }

    /// Dispatch with the current token but never enter the refresh protocol.
    pub(crate) async fn send_once(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let token = self.state.token().await;
        let response = self.dispatch(request, token.as_ref()).await?;
        check_status(response).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&Secret<String>>,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .request(request.method().clone(), self.url(request.path()));
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, bearer(token)?);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        builder.send().await.map_err(|e| Error::Http(e.to_string()))
    }

    fn notify(&self, request: &ApiRequest, reason: ExpiryReason) {
        telemetry::record_session_expired(reason.label());
        self.listener.session_expired(&SessionExpired {
            path: request.path().to_string(),
            reason,
        });
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

fn bearer(token: &Secret<String>) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
        .map_err(|_| Error::InvalidRequest("access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(Error::from_response(response).await)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("failed to read response body: {e}")))?;
    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body).map_err(|e| Error::InvalidResponse(e.to_string()))
}
