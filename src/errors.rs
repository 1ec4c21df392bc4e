//! # Gateway Error Types Module
//!
//! Error taxonomy for calls to the external analysis and nutrition diary
//! services. Both are optional collaborators: callers log these errors and
//! carry on without the data.

/// Failure of a remote gateway call
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Connection or transport failure
    Http(String),
    /// Non-success HTTP status with a snippet of the body
    Status { code: u16, body: String },
    /// The call did not finish within the configured bound
    Timeout(String),
    /// Response body did not have the expected shape
    Decode(String),
    /// The service answered with an application-level error
    Remote(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Http(msg) => write!(f, "HTTP error: {msg}"),
            GatewayError::Status { code, body } => write!(f, "Status {code}: {body}"),
            GatewayError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            GatewayError::Decode(msg) => write!(f, "Decode error: {msg}"),
            GatewayError::Remote(msg) => write!(f, "Remote error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

/// Build a status error from a failed response, keeping at most 256 chars of body
pub(crate) async fn status_error(resp: reqwest::Response) -> GatewayError {
    let code = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    GatewayError::Status {
        code,
        body: body.chars().take(256).collect(),
    }
}
