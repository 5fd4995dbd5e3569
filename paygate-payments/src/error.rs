//! Error types for payment processing

use crate::PaymentGateway;
use thiserror::Error;

/// Payment error types
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Request rejected before reaching a provider
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider answered with a non-success status
    #[error("{gateway} error ({status}): {message}")]
    Gateway {
        gateway: PaymentGateway,
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The named breaker rejected the call without running it
    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    /// No gateway issues ids of this shape
    #[error("Unknown gateway for id: {0}")]
    UnknownGateway(String),

    #[error("Gateway not configured: {0}")]
    GatewayNotConfigured(PaymentGateway),

    #[error("Operation failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        last_error: Option<Box<PaymentError>>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A detached task died before producing a result
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Gateway,
    CircuitOpen,
    Unauthorized,
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::UnknownGateway(_) => ErrorKind::Validation,
            Self::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Self::Unauthorized(_) | Self::InvalidWebhookSignature => ErrorKind::Unauthorized,
            Self::Gateway { .. }
            | Self::GatewayNotConfigured(_)
            | Self::RetriesExhausted { .. }
            | Self::Network(_)
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::TaskFailed(_) => ErrorKind::Gateway,
        }
    }

    /// Transport failures, provider 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Gateway { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status a host server should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::UnknownGateway(_) => 400,
            Self::Unauthorized(_) | Self::InvalidWebhookSignature => 401,
            Self::CircuitOpen(_) | Self::GatewayNotConfigured(_) => 503,
            Self::Gateway { .. } | Self::RetriesExhausted { .. } | Self::Network(_) => 502,
            Self::Serialization(_) | Self::Config(_) | Self::TaskFailed(_) => 500,
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Serialization(err.to_string())
    }
}

impl From<PaymentError> for paygate_core::Error {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err.status_code() {
            400 => paygate_core::Error::BadRequest(message),
            401 => paygate_core::Error::Unauthorized(message),
            502 => paygate_core::Error::BadGateway(message),
            503 => paygate_core::Error::ServiceUnavailable(message),
            _ => paygate_core::Error::Internal(message),
        }
    }
}

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_error(status: u16) -> PaymentError {
        PaymentError::Gateway {
            gateway: PaymentGateway::Stripe,
            status,
            code: Some("card_declined".into()),
            message: "Your card was declined".into(),
        }
    }

    #[test]
    fn test_every_variant_has_a_kind() {
        assert_eq!(PaymentError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(PaymentError::UnknownGateway("x_1".into()).kind(), ErrorKind::Validation);
        assert_eq!(PaymentError::CircuitOpen("stripe-payments".into()).kind(), ErrorKind::CircuitOpen);
        assert_eq!(PaymentError::InvalidWebhookSignature.kind(), ErrorKind::Unauthorized);
        assert_eq!(gateway_error(402).kind(), ErrorKind::Gateway);
        assert_eq!(PaymentError::Network("reset".into()).kind(), ErrorKind::Gateway);
    }

    #[test]
    fn test_retryable() {
        assert!(gateway_error(500).is_retryable());
        assert!(gateway_error(503).is_retryable());
        assert!(gateway_error(429).is_retryable());
        assert!(!gateway_error(402).is_retryable());
        assert!(!gateway_error(404).is_retryable());
        assert!(PaymentError::Network("timeout".into()).is_retryable());
        assert!(!PaymentError::Validation("amount".into()).is_retryable());
        assert!(!PaymentError::CircuitOpen("upi-payments".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            gateway_error(402).to_string(),
            "stripe error (402): Your card was declined"
        );
        let exhausted = PaymentError::RetriesExhausted {
            attempts: 3,
            last_error: Some(Box::new(gateway_error(500))),
        };
        assert_eq!(exhausted.to_string(), "Operation failed after 3 attempts");
    }

    #[test]
    fn test_core_error_mapping() {
        let err: paygate_core::Error = PaymentError::CircuitOpen("razorpay-payments".into()).into();
        assert_eq!(err.status_code(), 503);

        let err: paygate_core::Error = PaymentError::UnknownGateway("zz_1".into()).into();
        assert_eq!(err.status_code(), 400);

        let err: paygate_core::Error = gateway_error(500).into();
        assert_eq!(err.status_code(), 502);
    }
}
