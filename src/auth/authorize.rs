use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Generate a random URL-safe `state` value for the authorization redirect.
///
/// The host hands this out with the authorize URL and checks it against the
/// value echoed back on its redirect endpoint.
pub fn generate_state() -> String {
    let mut buf = [0u8; 16];
    rand::Rng::fill_bytes(&mut rand::rng(), &mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Build the vendor's user-facing authorization URL.
///
/// The host platform sends the user here to grant consent; the vendor then
/// redirects to `redirect_uri` with `code` and `state` query parameters,
/// and the code goes into `Credentials::code`.
pub fn build_authorize_url(
    base_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: Option<&str>,
    state: &str,
) -> String {
    let mut url = format!(
        "{}/oauth2/authorize?response_type=code&client_id={}&redirect_uri={}&state={}",
        base_url.trim_end_matches('/'),
        urlencoded(client_id),
        urlencoded(redirect_uri),
        urlencoded(state),
    );
    if let Some(scope) = scope {
        url.push_str("&scope=");
        url.push_str(&urlencoded(scope));
    }
    url
}

fn urlencoded(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char);
            }
            _ => {
                result.push('%');
                result.push_str(&format!("{b:02X}"));
            }
        }
    }
    result
}
