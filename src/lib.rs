pub mod auth;
pub mod classify;
pub mod client;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod http;
pub mod logging;
pub mod transport;

pub use auth::{build_authorize_url, generate_state, TokenPair};
pub use client::{ClientOptions, HomelinkClient, SessionState, DEFAULT_BASE_URL};
pub use credentials::Credentials;
pub use dispatch::ApiRequest;
pub use error::HomelinkError;
pub use events::{Channel, Event, EventSignal, SubscriptionId};
pub use http::ReqwestTransport;
pub use logging::{Level, LogSink, MemorySink, TracingSink};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method};

/// One-shot convenience: authenticate, perform a single call, tear down.
pub async fn call_once(
    credentials: Credentials,
    request: ApiRequest,
) -> Result<serde_json::Value, HomelinkError> {
    let client = HomelinkClient::new(credentials)?;
    client.authenticate().await?;
    let result = client.call(request).await;
    client.shutdown();
    result
}
