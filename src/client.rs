use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::auth::cache;
use crate::auth::grant::{self, ExchangeFailure};
use crate::auth::token::{refresh_delay, TokenPair, TokenStore, REFRESH_MARGIN_SECS};
use crate::classify::{classify_response, vendor_error_message};
use crate::credentials::{Credentials, Grant};
use crate::dispatch::{self, ApiRequest};
use crate::error::HomelinkError;
use crate::events::{Channel, Event, EventSignal, SubscriptionId};
use crate::http::{validate_base_url, ReqwestTransport};
use crate::logging::{LogSink, TracingSink};
use crate::transport::HttpTransport;

/// The vendor cloud's production API base.
pub const DEFAULT_BASE_URL: &str = "https://api.homelink.cloud";

/// Backoff between proactive-refresh attempts after a failure, and the cap
/// on consecutive attempts before the timer stands down.
const TIMER_RETRY_BACKOFF: Duration = Duration::from_secs(30);
const TIMER_MAX_ATTEMPTS: u32 = 3;

/// Session construction options. The defaults target the production cloud
/// with a reqwest transport and tracing diagnostics.
pub struct ClientOptions {
    pub base_url: String,
    /// Permit cleartext `http://` base URLs (local gateways, tests).
    pub allow_http: bool,
    /// How long before token expiry the proactive refresh fires.
    pub refresh_margin: Duration,
    /// When set, token pairs persist under `~/.homelink/<profile>/` and a
    /// cached pair is adopted on `authenticate()` if the credentials carry
    /// no tokens of their own.
    pub cache_profile: Option<String>,
    pub transport: Option<Arc<dyn HttpTransport>>,
    pub log_sink: Option<Arc<dyn LogSink>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            allow_http: false,
            refresh_margin: Duration::from_secs(REFRESH_MARGIN_SECS),
            cache_profile: None,
            transport: None,
            log_sink: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

pub(crate) struct PendingCall {
    pub(crate) request: ApiRequest,
    pub(crate) reply: oneshot::Sender<Result<serde_json::Value, HomelinkError>>,
}

pub(crate) struct ClientInner {
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) base_url: String,
    pub(crate) credentials: Credentials,
    pub(crate) refresh_margin: Duration,
    pub(crate) cache_profile: Option<String>,
    pub(crate) tokens: Mutex<TokenStore>,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) pending: Mutex<Vec<PendingCall>>,
    pub(crate) refresh_timer: Mutex<Option<AbortHandle>>,
    /// Serializes refresh exchanges so concurrent failed calls collapse
    /// into one refresh.
    pub(crate) refresh_gate: tokio::sync::Mutex<()>,
    /// Set when the initial grant failed; the session is dead until a fresh
    /// `authenticate()`.
    pub(crate) fatal: Mutex<Option<HomelinkError>>,
    pub(crate) events: EventSignal,
    pub(crate) log: Arc<dyn LogSink>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.refresh_timer).take() {
            handle.abort();
        }
    }
}

/// One authenticated session against the vendor cloud.
///
/// Cheap to clone; clones share the same session state.
#[derive(Clone)]
pub struct HomelinkClient {
    inner: Arc<ClientInner>,
}

impl HomelinkClient {
    pub fn new(credentials: Credentials) -> Result<Self, HomelinkError> {
        Self::with_options(credentials, ClientOptions::default())
    }

    pub fn with_options(
        credentials: Credentials,
        options: ClientOptions,
    ) -> Result<Self, HomelinkError> {
        validate_base_url(&options.base_url, options.allow_http)?;

        let transport = options
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let log = options
            .log_sink
            .unwrap_or_else(|| Arc::new(TracingSink));

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                base_url: options.base_url,
                credentials,
                refresh_margin: options.refresh_margin,
                cache_profile: options.cache_profile,
                tokens: Mutex::new(TokenStore::new()),
                state: Mutex::new(SessionState::Unauthenticated),
                pending: Mutex::new(Vec::new()),
                refresh_timer: Mutex::new(None),
                refresh_gate: tokio::sync::Mutex::new(()),
                fatal: Mutex::new(None),
                events: EventSignal::new(),
                log,
            }),
        })
    }

    /// Exchange the session's credentials for a token pair.
    ///
    /// Depending on the credential shape this adopts a supplied pair
    /// directly, exchanges an authorization code, or falls back to the
    /// legacy password grant. A configuration problem is reported without
    /// any network traffic. On success the pending call queue drains and
    /// `authenticated` fires.
    pub async fn authenticate(&self) -> Result<(), HomelinkError> {
        let inner = &self.inner;

        let grant = match inner.credentials.grant() {
            Ok(grant) => grant,
            Err(err) => {
                // The credential shape cannot change for the life of the
                // session, so this is fatal: fail parked and future calls.
                inner.log.error(&format!("credentials rejected: {err}"));
                inner.events.emit(&Event::Error(err.clone()));
                *lock(&inner.fatal) = Some(err.clone());
                fail_pending(inner, &err);
                return Err(err);
            }
        };

        {
            let mut state = lock(&inner.state);
            if *state != SessionState::Unauthenticated {
                inner
                    .log
                    .warn("authenticate() called while a grant is in flight or a session is active; ignoring");
                return Ok(());
            }
            *state = SessionState::Authenticating;
        }
        *lock(&inner.fatal) = None;

        let (label, form) = match grant {
            Grant::Adopt {
                access_token,
                refresh_token,
            } => {
                let pair = TokenPair {
                    access_token: access_token.to_string(),
                    refresh_token: refresh_token.map(str::to_string),
                    expires_at: None,
                };
                inner.log.info("adopting token pair from credentials");
                complete_authentication(inner, pair);
                return Ok(());
            }
            Grant::AuthorizationCode { code, redirect_uri } => (
                "authorization_code",
                grant::authorization_code_form(&inner.credentials, code, redirect_uri),
            ),
            Grant::Password { username, password } => (
                "password",
                grant::password_form(&inner.credentials, username, password),
            ),
        };

        if let Some(ref profile) = inner.cache_profile {
            if let Some(pair) = cache::load_cached_pair(profile) {
                inner
                    .log
                    .info(&format!("adopting cached token pair for profile '{profile}'"));
                complete_authentication(inner, pair);
                return Ok(());
            }
        }

        inner.log.debug(&format!("requesting tokens via {label} grant"));
        let url = grant::token_url(&inner.base_url);
        match grant::token_exchange(inner.transport.as_ref(), &url, form).await {
            Ok(response) => {
                let pair = response.into_pair();
                complete_authentication(inner, pair);
                Ok(())
            }
            Err(failure) => {
                let err = auth_grant_error(failure);
                *lock(&inner.state) = SessionState::Unauthenticated;
                *lock(&inner.fatal) = Some(err.clone());
                inner.log.error(&err.to_string());
                inner.events.emit(&Event::Error(err.clone()));
                fail_pending(inner, &err);
                Err(err)
            }
        }
    }

    /// Perform one authenticated API call.
    ///
    /// Issued before authentication completes, the call parks on the
    /// pending queue and resolves once the session is authenticated; this
    /// is deferred execution, not an error.
    pub async fn call(
        &self,
        request: ApiRequest,
    ) -> Result<serde_json::Value, HomelinkError> {
        dispatch::call(&self.inner, request).await
    }

    pub fn subscribe<F>(&self, channel: Channel, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(channel, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.events.unsubscribe(id);
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.inner.tokens).access_token()
    }

    pub fn refresh_token(&self) -> Option<String> {
        lock(&self.inner.tokens).refresh_token()
    }

    pub fn session_state(&self) -> SessionState {
        *lock(&self.inner.state)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.session_state(),
            SessionState::Authenticated | SessionState::Refreshing
        )
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Tear the session down: cancel the refresh timer and fail any still
    /// queued calls.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if let Some(handle) = lock(&inner.refresh_timer).take() {
            handle.abort();
        }
        fail_pending(inner, &HomelinkError::Canceled);
        inner.log.debug("session shut down");
    }
}

impl std::fmt::Debug for HomelinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomelinkClient")
            .field("base_url", &self.inner.base_url)
            .field("state", &self.session_state())
            .finish_non_exhaustive()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn complete_authentication(inner: &Arc<ClientInner>, pair: TokenPair) {
    store_pair(inner, &pair);
    *lock(&inner.state) = SessionState::Authenticated;
    inner.log.info("session authenticated");
    inner.events.emit(&Event::Authenticated);
    emit_token_events(inner, &pair);
    drain_pending(inner);
}

/// Replace the session's token pair, persist it when a cache profile is
/// configured, and re-arm the proactive refresh timer.
pub(crate) fn store_pair(inner: &Arc<ClientInner>, pair: &TokenPair) {
    lock(&inner.tokens).replace(pair.clone());

    if let Some(ref profile) = inner.cache_profile {
        if let Err(err) = cache::save_pair(profile, pair) {
            inner.log.warn(&format!("failed to persist token cache: {err}"));
        }
    }

    if let Some(expires_at) = pair.expires_at {
        let secs = (expires_at - chrono::Utc::now()).num_seconds();
        arm_refresh_timer(inner, refresh_delay(secs, inner.refresh_margin));
    }
}

fn emit_token_events(inner: &Arc<ClientInner>, pair: &TokenPair) {
    inner
        .events
        .emit(&Event::AccessToken(pair.access_token.clone()));
    if let Some(ref refresh) = pair.refresh_token {
        inner.events.emit(&Event::RefreshToken(refresh.clone()));
    }
}

/// Arm the proactive refresh timer, replacing any previously armed one.
/// At most one timer is live per session.
pub(crate) fn arm_refresh_timer(inner: &Arc<ClientInner>, delay: Duration) {
    let weak = Arc::downgrade(inner);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut attempt = 0u32;
        loop {
            let Some(inner) = weak.upgrade() else { return };
            match refresh_tokens(&inner, None).await {
                // A successful refresh armed the next timer already.
                Ok(()) => return,
                Err(err) => {
                    attempt += 1;
                    if attempt >= TIMER_MAX_ATTEMPTS {
                        inner.log.warn(&format!(
                            "proactive refresh failed {attempt} times, standing down: {err}"
                        ));
                        return;
                    }
                    inner
                        .log
                        .warn(&format!("proactive refresh failed (attempt {attempt}): {err}"));
                }
            }
            drop(inner);
            tokio::time::sleep(TIMER_RETRY_BACKOFF).await;
        }
    });

    let mut slot = lock(&inner.refresh_timer);
    if let Some(previous) = slot.replace(handle.abort_handle()) {
        previous.abort();
    }
}

/// Exchange the refresh token for a new pair.
///
/// Serialized behind the refresh gate: when a concurrent call already
/// replaced the pair this one was failing on, the exchange is skipped and
/// the caller retries with the fresh token. A refresh failure is a warning,
/// not a session-fatal error; the prior pair stays in place.
pub(crate) async fn refresh_tokens(
    inner: &Arc<ClientInner>,
    stale_access: Option<&str>,
) -> Result<(), HomelinkError> {
    let _guard = inner.refresh_gate.lock().await;

    if let Some(stale) = stale_access {
        let current = lock(&inner.tokens).access_token();
        if current.as_deref() != Some(stale) {
            inner
                .log
                .debug("token already refreshed by a concurrent call, skipping exchange");
            return Ok(());
        }
    }

    let refresh_token = lock(&inner.tokens).refresh_token().ok_or_else(|| {
        HomelinkError::Api {
            status: None,
            code: None,
            message: "no refresh token available for this session".into(),
        }
    })?;

    {
        let mut state = lock(&inner.state);
        if *state == SessionState::Authenticated {
            *state = SessionState::Refreshing;
        }
    }

    inner.log.debug("refreshing access token");
    let url = grant::token_url(&inner.base_url);
    let form = grant::refresh_form(&inner.credentials, &refresh_token);
    match grant::token_exchange(inner.transport.as_ref(), &url, form).await {
        Ok(response) => {
            let pair = response.into_pair();
            store_pair(inner, &pair);
            *lock(&inner.state) = SessionState::Authenticated;
            emit_token_events(inner, &pair);
            inner.log.info("access token refreshed");
            Ok(())
        }
        Err(failure) => {
            let err = refresh_error(failure);
            *lock(&inner.state) = SessionState::Authenticated;
            inner.log.warn(&format!("token refresh failed: {err}"));
            inner.events.emit(&Event::Warning(err.clone()));
            Err(err)
        }
    }
}

fn auth_grant_error(failure: ExchangeFailure) -> HomelinkError {
    match failure {
        ExchangeFailure::Response { status, body } => HomelinkError::AuthGrant {
            status: Some(status),
            detail: vendor_error_message(&body)
                .unwrap_or_else(|| format!("HTTP status {status}")),
        },
        ExchangeFailure::Network(detail) => HomelinkError::AuthGrant {
            status: None,
            detail,
        },
        ExchangeFailure::Payload(detail) => HomelinkError::AuthGrant {
            status: None,
            detail,
        },
    }
}

fn refresh_error(failure: ExchangeFailure) -> HomelinkError {
    match failure {
        // A refresh response is never itself retryable.
        ExchangeFailure::Response { status, body } => classify_response(status, &body, false),
        ExchangeFailure::Network(detail) => HomelinkError::Network(detail),
        ExchangeFailure::Payload(detail) => HomelinkError::Payload(detail),
    }
}

fn drain_pending(inner: &Arc<ClientInner>) {
    let drained: Vec<PendingCall> = std::mem::take(&mut *lock(&inner.pending));
    if drained.is_empty() {
        return;
    }
    inner
        .log
        .debug(&format!("draining {} queued call(s)", drained.len()));

    // FIFO relative to registration: one task works through the queue in
    // order rather than spawning each call individually.
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        for call in drained {
            let result = dispatch::dispatch(&inner, &call.request).await;
            let _ = call.reply.send(result);
        }
    });
}

pub(crate) fn fail_pending(inner: &Arc<ClientInner>, err: &HomelinkError) {
    let drained: Vec<PendingCall> = std::mem::take(&mut *lock(&inner.pending));
    for call in drained {
        let _ = call.reply.send(Err(err.clone()));
    }
}
