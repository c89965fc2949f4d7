use async_trait::async_trait;

use crate::error::HomelinkError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};

/// Production transport backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HomelinkError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url).query(&request.params),
            Method::Post => self.client.post(&request.url).form(&request.params),
        };

        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HomelinkError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(HttpResponse { status, body })
    }
}

/// Validate a base URL before any request is issued.
///
/// Rejects cleartext `http://` URLs unless `allow_http` is `true`.
pub(crate) fn validate_base_url(base_url: &str, allow_http: bool) -> Result<(), HomelinkError> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| HomelinkError::Configuration(format!("invalid base URL '{base_url}': {e}")))?;

    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        "http" => Err(HomelinkError::Configuration(format!(
            "Cleartext HTTP is not allowed for '{base_url}'. \
             Use https:// or enable allow_http to permit insecure connections."
        ))),
        scheme => Err(HomelinkError::Configuration(format!(
            "unsupported URL scheme '{scheme}' in '{base_url}'"
        ))),
    }
}
