use serde::Deserialize;

use crate::error::HomelinkError;

/// Vendor code for "Invalid access token".
pub const VENDOR_CODE_TOKEN_INVALID: i64 = 2;
/// Vendor code for "Access token expired".
pub const VENDOR_CODE_TOKEN_EXPIRED: i64 = 3;

/// Error envelope as the vendor sends it. The payload under `error` is
/// either a `{code, message}` object or, on some endpoints, a bare string.
#[derive(Debug, Deserialize)]
struct VendorErrorBody {
    error: VendorError,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VendorError {
    Detail {
        code: i64,
        #[serde(default)]
        message: Option<String>,
    },
    Plain(String),
}

/// Classify a non-success HTTP response.
///
/// Vendor codes 2 and 3 mark the access token as invalid/expired; those are
/// the only classifications eligible for the refresh-then-retry cycle, and
/// only when a refresh token is actually on hand to run it with.
pub fn classify_response(status: u16, body: &str, has_refresh_token: bool) -> HomelinkError {
    match serde_json::from_str::<VendorErrorBody>(body) {
        Ok(VendorErrorBody {
            error: VendorError::Detail { code, message },
        }) => {
            let message = message.unwrap_or_else(|| format!("vendor error code {code}"));
            if is_token_code(code) && has_refresh_token {
                HomelinkError::TokenExpired { code, message }
            } else {
                HomelinkError::Api {
                    status: Some(status),
                    code: Some(code),
                    message,
                }
            }
        }
        Ok(VendorErrorBody {
            error: VendorError::Plain(message),
        }) => HomelinkError::Api {
            status: Some(status),
            code: None,
            message,
        },
        Err(_) => HomelinkError::Api {
            status: Some(status),
            code: None,
            message: format!("HTTP status {status}"),
        },
    }
}

fn is_token_code(code: i64) -> bool {
    code == VENDOR_CODE_TOKEN_INVALID || code == VENDOR_CODE_TOKEN_EXPIRED
}

/// Pull the human-readable message out of a vendor error body, if the body
/// has one of the two known shapes.
pub(crate) fn vendor_error_message(body: &str) -> Option<String> {
    match serde_json::from_str::<VendorErrorBody>(body).ok()?.error {
        VendorError::Detail { code, message } => Some(match message {
            Some(m) => format!("{m} (vendor code {code})"),
            None => format!("vendor error code {code}"),
        }),
        VendorError::Plain(message) => Some(message),
    }
}
