use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Seconds before actual expiry at which the proactive refresh fires.
pub(crate) const REFRESH_MARGIN_SECS: u64 = 10;

/// An access/refresh token pair owned by one session.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TokenPair {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => chrono::Utc::now() >= expires,
            None => false,
        }
    }
}

/// Raw token response from the vendor's token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub(crate) fn into_pair(self) -> TokenPair {
        let expires_at = self
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));
        TokenPair {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// Delay before the proactive refresh for a token valid `expires_in`
/// seconds: the margin is subtracted so the refresh lands before actual
/// expiry, clamping at zero for very short-lived tokens.
pub(crate) fn refresh_delay(expires_in: i64, margin: Duration) -> Duration {
    let lifetime = if expires_in > 0 { expires_in as u64 } else { 0 };
    Duration::from_secs(lifetime.saturating_sub(margin.as_secs()))
}

/// Single-owner slot for the session's token pair. The pair is replaced
/// whole on every grant or refresh, never field by field.
#[derive(Debug, Default)]
pub(crate) struct TokenStore {
    pair: Option<TokenPair>,
}

impl TokenStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn replace(&mut self, pair: TokenPair) {
        self.pair = Some(pair);
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.pair.as_ref().map(|p| p.access_token.clone())
    }

    pub(crate) fn refresh_token(&self) -> Option<String> {
        self.pair.as_ref().and_then(|p| p.refresh_token.clone())
    }

    pub(crate) fn pair(&self) -> Option<&TokenPair> {
        self.pair.as_ref()
    }

    pub(crate) fn has_token(&self) -> bool {
        self.pair.is_some()
    }
}
