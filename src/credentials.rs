use serde::{Deserialize, Serialize};

use crate::error::HomelinkError;

/// Credentials for one session against the vendor cloud.
///
/// Hosts typically deserialize this from their own configuration store.
/// Exactly one of three shapes must be present besides the client pair:
/// a pre-existing token pair to adopt, an authorization code obtained from
/// the vendor's consent page, or a username/password pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: None,
            username: None,
            password: None,
            code: None,
            redirect_uri: None,
            access_token: None,
            refresh_token: None,
        }
    }
}

/// The grant shape resolved from a set of credentials.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Grant<'a> {
    /// A token pair was supplied directly; no exchange needed.
    Adopt {
        access_token: &'a str,
        refresh_token: Option<&'a str>,
    },
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
    },
    /// Legacy fallback. The vendor has announced the password grant may stop
    /// being supported for new clients; prefer the authorization-code flow.
    Password {
        username: &'a str,
        password: &'a str,
    },
}

impl Credentials {
    /// Resolve which grant these credentials describe.
    ///
    /// Resolution order: adopt a supplied access token, else exchange an
    /// authorization code, else fall back to the password grant.
    pub(crate) fn grant(&self) -> Result<Grant<'_>, HomelinkError> {
        if self.client_id.is_empty() {
            return Err(HomelinkError::Configuration("missing client_id".into()));
        }
        if self.client_secret.is_empty() {
            return Err(HomelinkError::Configuration("missing client_secret".into()));
        }

        if let Some(access_token) = non_empty(&self.access_token) {
            return Ok(Grant::Adopt {
                access_token,
                refresh_token: non_empty(&self.refresh_token),
            });
        }

        if let Some(code) = non_empty(&self.code) {
            let redirect_uri = non_empty(&self.redirect_uri).ok_or_else(|| {
                HomelinkError::Configuration(
                    "authorization code supplied without redirect_uri".into(),
                )
            })?;
            return Ok(Grant::AuthorizationCode { code, redirect_uri });
        }

        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => Ok(Grant::Password { username, password }),
            _ => Err(HomelinkError::Configuration(
                "no authorization code or username/password supplied".into(),
            )),
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}
