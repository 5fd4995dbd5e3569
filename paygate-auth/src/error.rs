// Error types for authentication

use paygate_core::HttpResponse;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    /// No internal key is configured, so nothing can match.
    #[error("Internal API key not configured")]
    NotConfigured,

    #[error("Missing required role: {0}")]
    MissingRole(String),
}

impl AuthError {
    /// Every key failure renders the same 401 so callers learn nothing
    /// about which check failed.
    pub fn to_response(&self) -> HttpResponse {
        match self {
            AuthError::MissingRole(_) => HttpResponse::new(403)
                .with_header("Content-Type", "application/json")
                .with_body(r#"{"error":"Forbidden"}"#),
            _ => HttpResponse::unauthorized()
                .with_header("Content-Type", "application/json")
                .with_body(crate::UNAUTHORIZED_BODY),
        }
    }
}

impl From<AuthError> for paygate_core::Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingRole(_) => paygate_core::Error::Forbidden(err.to_string()),
            _ => paygate_core::Error::Unauthorized(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_failures_share_one_response() {
        for err in [
            AuthError::MissingApiKey,
            AuthError::InvalidApiKey,
            AuthError::NotConfigured,
        ] {
            let response = err.to_response();
            assert_eq!(response.status, 401);
            assert_eq!(response.body_text(), r#"{"error":"Invalid or missing API key"}"#);
        }
    }

    #[test]
    fn test_core_error_mapping() {
        let err: paygate_core::Error = AuthError::InvalidApiKey.into();
        assert_eq!(err.status_code(), 401);

        let err: paygate_core::Error = AuthError::MissingRole("ROLE_ADMIN".into()).into();
        assert_eq!(err.status_code(), 403);
    }
}
