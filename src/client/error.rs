use thiserror::Error;

pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action";
pub const SERVER_ERROR_MESSAGE: &str = "Server error. Please try again later.";

/// Classified outcome of a failed API call
///
/// `Clone` because one refresh failure is handed to every queued caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Refresh failed; local tokens are gone and the caller should go to `redirect`
    #[error("Session expired: {reason}")]
    SessionExpired { reason: String, redirect: String },

    /// 401 that survived one refresh, or rejected credentials on login
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// 422; carries the first field-level message
    #[error("{0}")]
    Validation(String),

    /// Any 5xx; server detail is not passed through
    #[error("{0}")]
    Server(String),

    /// Other non-2xx statuses (400, 404, 409, 429)
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Timeout or connection failure; never retried
    #[error("Network error: {0}")]
    Network(String),

    /// Payload did not match any known shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::SessionExpired { .. } | GatewayError::Unauthorized(_)
        )
    }

    /// Login location, when the session has been torn down
    pub fn redirect(&self) -> Option<&str> {
        match self {
            GatewayError::SessionExpired { redirect, .. } => Some(redirect),
            _ => None,
        }
    }
}

/// `/login?redirect=<destination>`
pub fn login_redirect(login_path: &str, destination: &str) -> String {
    format!("{}?redirect={}", login_path, urlencoding::encode(destination))
}
