use crate::auth::token::TokenResponse;
use crate::credentials::Credentials;
use crate::transport::{HttpRequest, HttpTransport, Method};

/// Construct the token endpoint URL from an API base URL.
pub(crate) fn token_url(base_url: &str) -> String {
    format!("{}/oauth2/token", base_url.trim_end_matches('/'))
}

/// How a token exchange failed; the caller decides how to classify it
/// (session-fatal for an initial grant, a warning for a refresh).
#[derive(Debug)]
pub(crate) enum ExchangeFailure {
    Response { status: u16, body: String },
    Network(String),
    Payload(String),
}

/// Perform one `POST /oauth2/token` exchange with the given form.
pub(crate) async fn token_exchange(
    transport: &dyn HttpTransport,
    token_url: &str,
    form: Vec<(String, String)>,
) -> Result<TokenResponse, ExchangeFailure> {
    let response = transport
        .execute(HttpRequest {
            method: Method::Post,
            url: token_url.to_string(),
            bearer: None,
            params: form,
        })
        .await
        .map_err(|e| ExchangeFailure::Network(e.to_string()))?;

    if !response.is_success() {
        return Err(ExchangeFailure::Response {
            status: response.status,
            body: response.body,
        });
    }

    serde_json::from_str(&response.body)
        .map_err(|e| ExchangeFailure::Payload(format!("failed to parse token response: {e}")))
}

fn client_form(credentials: &Credentials, grant_type: &str) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), grant_type.into()),
        ("client_id".into(), credentials.client_id.clone()),
        ("client_secret".into(), credentials.client_secret.clone()),
    ]
}

fn push_scope(form: &mut Vec<(String, String)>, credentials: &Credentials) {
    if let Some(ref scope) = credentials.scope {
        form.push(("scope".into(), scope.clone()));
    }
}

/// Legacy password grant. The vendor has flagged this grant as potentially
/// unsupported for clients registered going forward.
pub(crate) fn password_form(
    credentials: &Credentials,
    username: &str,
    password: &str,
) -> Vec<(String, String)> {
    let mut form = client_form(credentials, "password");
    form.push(("username".into(), username.into()));
    form.push(("password".into(), password.into()));
    push_scope(&mut form, credentials);
    form
}

pub(crate) fn authorization_code_form(
    credentials: &Credentials,
    code: &str,
    redirect_uri: &str,
) -> Vec<(String, String)> {
    let mut form = client_form(credentials, "authorization_code");
    form.push(("code".into(), code.into()));
    form.push(("redirect_uri".into(), redirect_uri.into()));
    push_scope(&mut form, credentials);
    form
}

pub(crate) fn refresh_form(
    credentials: &Credentials,
    refresh_token: &str,
) -> Vec<(String, String)> {
    let mut form = client_form(credentials, "refresh_token");
    form.push(("refresh_token".into(), refresh_token.into()));
    form
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        let mut c = Credentials::new("cid", "csecret");
        c.scope = Some("read_station".into());
        c
    }

    fn get<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn token_url_joins_base() {
        assert_eq!(
            token_url("https://api.homelink.cloud"),
            "https://api.homelink.cloud/oauth2/token"
        );
        assert_eq!(
            token_url("https://api.homelink.cloud/"),
            "https://api.homelink.cloud/oauth2/token"
        );
    }

    #[test]
    fn password_form_fields() {
        let form = password_form(&creds(), "u", "p");
        assert_eq!(get(&form, "grant_type"), Some("password"));
        assert_eq!(get(&form, "client_id"), Some("cid"));
        assert_eq!(get(&form, "client_secret"), Some("csecret"));
        assert_eq!(get(&form, "username"), Some("u"));
        assert_eq!(get(&form, "password"), Some("p"));
        assert_eq!(get(&form, "scope"), Some("read_station"));
    }

    #[test]
    fn authorization_code_form_fields() {
        let form = authorization_code_form(&creds(), "abc", "https://host.example/cb");
        assert_eq!(get(&form, "grant_type"), Some("authorization_code"));
        assert_eq!(get(&form, "code"), Some("abc"));
        assert_eq!(get(&form, "redirect_uri"), Some("https://host.example/cb"));
        assert_eq!(get(&form, "scope"), Some("read_station"));
    }

    #[test]
    fn refresh_form_fields() {
        let form = refresh_form(&creds(), "R1");
        assert_eq!(get(&form, "grant_type"), Some("refresh_token"));
        assert_eq!(get(&form, "refresh_token"), Some("R1"));
        assert_eq!(get(&form, "client_id"), Some("cid"));
        assert_eq!(get(&form, "client_secret"), Some("csecret"));
        // The refresh exchange never re-sends scope.
        assert_eq!(get(&form, "scope"), None);
    }

    #[test]
    fn scope_omitted_when_absent() {
        let c = Credentials::new("cid", "csecret");
        let form = password_form(&c, "u", "p");
        assert_eq!(get(&form, "scope"), None);
    }
}
