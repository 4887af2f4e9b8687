//! HTTP client for the vending backend.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

mod credentials;
mod kiosk;

pub use credentials::{CredentialProvider, NoCredentials, StaticCredential};
pub use kiosk::KioskClient;

use reqwest::StatusCode;

/// Errors produced by the backend HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// The `error` field of a JSON error body, if the server sent one.
    pub fn server_reason(&self) -> Option<String> {
        let ClientError::Api { body, .. } = self else {
            return None;
        };
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value.get("error")?.as_str().map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_reason_extraction() {
        let err = ClientError::Api {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"success":false,"error":"Card blocked"}"#.to_string(),
        };
        assert_eq!(err.server_reason().as_deref(), Some("Card blocked"));

        let err = ClientError::Api {
            status: StatusCode::BAD_GATEWAY,
            body: "<html>bad gateway</html>".to_string(),
        };
        assert_eq!(err.server_reason(), None);
    }
}
