use std::sync::Arc;

use tokio::sync::oneshot;

use crate::classify::classify_response;
use crate::client::{self, lock, ClientInner, PendingCall};
use crate::error::HomelinkError;
use crate::events::Event;
use crate::transport::{HttpRequest, Method};

/// One vendor API call: endpoint path, encoding, parameters, and whether a
/// failure is critical (mutating device-control calls) or a warning
/// (reads).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub params: Vec<(String, String)>,
    pub critical: bool,
}

impl ApiRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Get,
            params: Vec::new(),
            critical: false,
        }
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Post,
            params: Vec::new(),
            critical: false,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Mark a failure of this call as critical. Device-control writes are
    /// critical; data reads are not.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Operation name for the per-operation success channel: the final
    /// path segment of the endpoint.
    pub fn op(&self) -> &str {
        self.endpoint
            .trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(self.endpoint.as_str())
    }
}

/// Entry point for one authenticated call.
///
/// Without a token the call parks on the pending queue and resolves after
/// `authenticated` fires; after a session-fatal grant failure it fails
/// immediately instead of parking forever.
pub(crate) async fn call(
    inner: &Arc<ClientInner>,
    request: ApiRequest,
) -> Result<serde_json::Value, HomelinkError> {
    if let Some(err) = lock(&inner.fatal).clone() {
        return Err(err);
    }

    let receiver = {
        // Hold the token lock across the queue push so authentication
        // completing in between cannot strand the call.
        let tokens = lock(&inner.tokens);
        if tokens.has_token() {
            None
        } else {
            let (tx, rx) = oneshot::channel();
            lock(&inner.pending).push(PendingCall {
                request: request.clone(),
                reply: tx,
            });
            Some(rx)
        }
    };

    match receiver {
        None => dispatch(inner, &request).await,
        Some(rx) => {
            inner.log.debug(&format!(
                "queued '{}' until authentication completes",
                request.op()
            ));
            rx.await.unwrap_or(Err(HomelinkError::Canceled))
        }
    }
}

/// Execute a call with at-most-one-retry-after-refresh semantics.
///
/// Only the first attempt may enter the refresh path; the retry's result is
/// returned as-is, so a second token rejection cannot start another cycle.
pub(crate) async fn dispatch(
    inner: &Arc<ClientInner>,
    request: &ApiRequest,
) -> Result<serde_json::Value, HomelinkError> {
    // Captured before the attempt so a refresh completed by a concurrent
    // call in the meantime is recognized and not repeated.
    let used_token = lock(&inner.tokens).access_token();
    match dispatch_once(inner, request).await {
        Ok(value) => Ok(value),
        Err(err) if err.retryable() => {
            inner.log.info(&format!(
                "'{}' failed with an expired token, refreshing and retrying",
                request.op()
            ));
            if let Err(refresh_err) = client::refresh_tokens(inner, used_token.as_deref()).await {
                // The refresh itself emitted its warning; the original call
                // fails with the refresh error.
                return Err(refresh_err);
            }
            match dispatch_once(inner, request).await {
                Ok(value) => Ok(value),
                Err(retry_err) => Err(report_failure(inner, request, retry_err)),
            }
        }
        Err(err) => Err(report_failure(inner, request, err)),
    }
}

fn report_failure(
    inner: &Arc<ClientInner>,
    request: &ApiRequest,
    err: HomelinkError,
) -> HomelinkError {
    if request.critical {
        inner.events.emit(&Event::Error(err.clone()));
    } else {
        inner.events.emit(&Event::Warning(err.clone()));
    }
    err
}

/// Exactly one HTTP round trip: attach the bearer token, execute, classify
/// a failure or parse and publish a success.
async fn dispatch_once(
    inner: &Arc<ClientInner>,
    request: &ApiRequest,
) -> Result<serde_json::Value, HomelinkError> {
    let (access, has_refresh) = {
        let tokens = lock(&inner.tokens);
        (tokens.access_token(), tokens.refresh_token().is_some())
    };
    let access = access.ok_or_else(|| HomelinkError::Api {
        status: None,
        code: None,
        message: "no access token in session".into(),
    })?;

    let call_id = uuid::Uuid::new_v4();
    let url = format!(
        "{}/{}",
        inner.base_url.trim_end_matches('/'),
        request.endpoint.trim_start_matches('/')
    );
    inner
        .log
        .debug(&format!("[{call_id}] {:?} {url}", request.method));

    let response = inner
        .transport
        .execute(HttpRequest {
            method: request.method,
            url,
            bearer: Some(access),
            params: request.params.clone(),
        })
        .await?;

    if !response.is_success() {
        let err = classify_response(response.status, &response.body, has_refresh);
        inner.log.debug(&format!("[{call_id}] failed: {err}"));
        return Err(err);
    }

    let payload: serde_json::Value = serde_json::from_str(&response.body).map_err(|e| {
        HomelinkError::Payload(format!("invalid JSON from {}: {e}", request.endpoint))
    })?;

    inner.log.debug(&format!("[{call_id}] ok"));
    inner.events.emit(&Event::OpSuccess {
        op: request.op().to_string(),
        payload: payload.clone(),
    });
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_defaults() {
        let req = ApiRequest::get("/api/getstationsdata");
        assert_eq!(req.method, Method::Get);
        assert!(req.params.is_empty());
        assert!(!req.critical);
    }

    #[test]
    fn post_request_with_params() {
        let req = ApiRequest::post("/api/setstate")
            .param("home_id", "h1")
            .param("target_position", "100")
            .critical();
        assert_eq!(req.method, Method::Post);
        assert_eq!(
            req.params,
            vec![
                ("home_id".to_string(), "h1".to_string()),
                ("target_position".to_string(), "100".to_string())
            ]
        );
        assert!(req.critical);
    }

    #[test]
    fn op_is_final_path_segment() {
        assert_eq!(ApiRequest::get("/api/getstationsdata").op(), "getstationsdata");
        assert_eq!(ApiRequest::get("api/homestatus").op(), "homestatus");
        assert_eq!(ApiRequest::get("/gethomedata/").op(), "gethomedata");
        assert_eq!(ApiRequest::get("getmeasure").op(), "getmeasure");
    }
}
