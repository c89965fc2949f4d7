use std::sync::{Arc, Mutex, Once};

use homelink::{Channel, ClientOptions, Credentials, HomelinkClient, LogSink, MemorySink};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

#[allow(dead_code)]
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .try_init();
    });
}

#[allow(dead_code)]
pub fn password_credentials() -> Credentials {
    let mut creds = Credentials::new("a", "b");
    creds.username = Some("u".into());
    creds.password = Some("p".into());
    creds
}

#[allow(dead_code)]
pub fn adopted_credentials(access: &str, refresh: &str) -> Credentials {
    let mut creds = Credentials::new("a", "b");
    creds.access_token = Some(access.into());
    creds.refresh_token = Some(refresh.into());
    creds
}

#[allow(dead_code)]
pub fn client_for(server: &MockServer, credentials: Credentials) -> HomelinkClient {
    client_with_sink(server, credentials).0
}

#[allow(dead_code)]
pub fn client_with_sink(
    server: &MockServer,
    credentials: Credentials,
) -> (HomelinkClient, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let log_sink: Arc<dyn LogSink> = Arc::clone(&sink) as Arc<dyn LogSink>;
    let options = ClientOptions {
        base_url: server.uri(),
        allow_http: true,
        log_sink: Some(log_sink),
        ..ClientOptions::default()
    };
    let client = HomelinkClient::with_options(credentials, options).unwrap();
    (client, sink)
}

/// Mount a token endpoint answering the password grant.
#[allow(dead_code)]
pub async fn mount_password_grant(
    server: &MockServer,
    access: &str,
    refresh: &str,
    expires_in: i64,
) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
        })))
        .mount(server)
        .await;
}

/// Mount a token endpoint answering the refresh grant, expecting it to be
/// hit exactly `expected` times.
#[allow(dead_code)]
pub async fn mount_refresh_grant(
    server: &MockServer,
    access: &str,
    refresh: &str,
    expected: u64,
) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 600,
        })))
        .expect(expected)
        .mount(server)
        .await;
}

/// Record the lifecycle channels an emission lands on, in order.
#[allow(dead_code)]
pub fn record_channels(client: &HomelinkClient) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for channel in [
        Channel::Authenticated,
        Channel::AccessToken,
        Channel::RefreshToken,
        Channel::Error,
        Channel::Warning,
    ] {
        let seen = Arc::clone(&seen);
        let name = channel.to_string();
        client.subscribe(channel, move |_| {
            seen.lock().unwrap().push(name.clone());
        });
    }
    seen
}
