use async_trait::async_trait;

use crate::error::HomelinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing API request. `params` become the query string on GET and
/// the form-encoded body on POST; the vendor accepts both encodings.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for dyn HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish()
    }
}

/// The HTTP seam the session depends on: `(method, url, bearer, params)`
/// in, `(status, body)` out. A transport-level failure (no response at all)
/// surfaces as `HomelinkError::Network`; any response, success or not, is
/// returned for the caller to classify.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HomelinkError>;
}
