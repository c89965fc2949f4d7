#[derive(Debug, Clone, thiserror::Error)]
pub enum HomelinkError {
    #[error("Missing or invalid configuration: {0}")]
    Configuration(String),

    #[error("{}", format_auth_grant(.status, .detail))]
    AuthGrant {
        status: Option<u16>,
        detail: String,
    },

    #[error("Access token rejected (vendor code {code}): {message}")]
    TokenExpired { code: i64, message: String },

    #[error("{}", format_api(.status, .code, .message))]
    Api {
        status: Option<u16>,
        code: Option<i64>,
        message: String,
    },

    #[error("No response from API: {0}")]
    Network(String),

    #[error("Invalid response payload: {0}")]
    Payload(String),

    #[error("Session shut down before the call completed")]
    Canceled,
}

fn format_auth_grant(status: &Option<u16>, detail: &str) -> String {
    match status {
        Some(s) => format!("Authentication failed (HTTP {s}): {detail}"),
        None => format!("Authentication failed: {detail}"),
    }
}

fn format_api(status: &Option<u16>, code: &Option<i64>, message: &str) -> String {
    match (status, code) {
        (Some(s), Some(c)) => format!("API error (HTTP {s}, vendor code {c}): {message}"),
        (Some(s), None) => format!("API error (HTTP {s}): {message}"),
        (None, Some(c)) => format!("API error (vendor code {c}): {message}"),
        (None, None) => format!("API error: {message}"),
    }
}

impl HomelinkError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            HomelinkError::Configuration(_) => "config_error",
            HomelinkError::AuthGrant { .. } => "auth_failed",
            HomelinkError::TokenExpired { .. } => "token_expired",
            HomelinkError::Api { .. } => "api_error",
            HomelinkError::Network(_) => "network_error",
            HomelinkError::Payload(_) => "parse_error",
            HomelinkError::Canceled => "canceled",
        }
    }

    /// Whether this error is eligible for the one refresh-then-retry cycle.
    pub fn retryable(&self) -> bool {
        matches!(self, HomelinkError::TokenExpired { .. })
    }

    /// Whether the session cannot recover from this error without a fresh
    /// `authenticate()` call.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            HomelinkError::Configuration(_) | HomelinkError::AuthGrant { .. }
        )
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            HomelinkError::AuthGrant { status, .. } => *status,
            HomelinkError::Api { status, .. } => *status,
            _ => None,
        }
    }

    pub fn vendor_code(&self) -> Option<i64> {
        match self {
            HomelinkError::TokenExpired { code, .. } => Some(*code),
            HomelinkError::Api { code, .. } => *code,
            _ => None,
        }
    }

    /// Produce a structured JSON error object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "message".into(),
            serde_json::Value::String(self.to_string()),
        );
        obj.insert(
            "code".into(),
            serde_json::Value::String(self.code().to_string()),
        );
        if let Some(status) = self.http_status() {
            obj.insert("httpStatus".into(), serde_json::Value::from(status));
        }
        if let Some(code) = self.vendor_code() {
            obj.insert("vendorCode".into(), serde_json::Value::from(code));
        }
        obj.insert(
            "retryable".into(),
            serde_json::Value::Bool(self.retryable()),
        );
        serde_json::json!({ "error": obj })
    }
}
