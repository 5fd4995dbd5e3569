//! Webhook signature schemes
//!
//! | Gateway  | Header                 | Value                                        |
//! |----------|------------------------|----------------------------------------------|
//! | Stripe   | `Stripe-Signature`     | `t=<ts>,v1=<hex HMAC-SHA256("<ts>.<body>")>` |
//! | Razorpay | `X-Razorpay-Signature` | hex HMAC-SHA256(body)                        |
//! | UPI      | `X-UPI-Signature`      | base64 HMAC-SHA256(body)                     |

use crate::{PaymentError, PaymentGateway};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Stripe's default replay window.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("webhook secret not configured")]
    MissingSecret,

    #[error("signature header missing")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("timestamp {age}s old exceeds tolerance of {tolerance}s")]
    Stale { age: u64, tolerance: u64 },

    #[error("signature mismatch")]
    Mismatch,
}

impl From<SignatureError> for PaymentError {
    fn from(_: SignatureError) -> Self {
        PaymentError::InvalidWebhookSignature
    }
}

fn hmac_sha256(secret: &str, parts: &[&[u8]]) -> Result<Vec<u8>, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Slices of different length compare unequal; digest lengths are public.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Build a `Stripe-Signature` header value.
pub fn sign_stripe(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let ts = timestamp.to_string();
    let digest = hmac_sha256(secret, &[ts.as_bytes(), b".", payload])?;
    Ok(format!("t={},v1={}", ts, hex::encode(digest)))
}

pub fn verify_stripe(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), SignatureError> {
    verify_stripe_at(payload, header, secret, tolerance_secs, chrono::Utc::now().timestamp())
}

/// [`verify_stripe`] against an explicit clock.
///
/// Any one `v1` entry matching is enough, which keeps verification working
/// while a secret is being rolled.
pub fn verify_stripe_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    if header.trim().is_empty() {
        return Err(SignatureError::MissingHeader);
    }

    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let raw_ts = timestamp.ok_or_else(|| SignatureError::Malformed("missing t=".into()))?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed("missing v1=".into()));
    }
    let ts: i64 = raw_ts
        .parse()
        .map_err(|_| SignatureError::Malformed(format!("bad timestamp '{}'", raw_ts)))?;

    let age = now.saturating_sub(ts).unsigned_abs();
    if age > tolerance_secs {
        return Err(SignatureError::Stale {
            age,
            tolerance: tolerance_secs,
        });
    }

    let expected = hex::encode(hmac_sha256(secret, &[raw_ts.as_bytes(), b".", payload])?);
    let matched = candidates
        .iter()
        .fold(false, |found, candidate| {
            found | constant_time_eq(candidate.as_bytes(), expected.as_bytes())
        });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build an `X-Razorpay-Signature` header value.
pub fn sign_razorpay(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    hmac_sha256(secret, &[payload]).map(hex::encode)
}

pub fn verify_razorpay(payload: &[u8], header: &str, secret: &str) -> Result<(), SignatureError> {
    let expected = hmac_sha256(secret, &[payload])?;
    let header = header.trim();
    if header.is_empty() {
        return Err(SignatureError::MissingHeader);
    }
    let provided = hex::decode(header).map_err(|e| SignatureError::Malformed(e.to_string()))?;

    if constant_time_eq(&provided, &expected) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build an `X-UPI-Signature` header value.
pub fn sign_upi(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    hmac_sha256(secret, &[payload]).map(|digest| STANDARD.encode(digest))
}

pub fn verify_upi(payload: &[u8], header: &str, secret: &str) -> Result<(), SignatureError> {
    let expected = hmac_sha256(secret, &[payload])?;
    let header = header.trim();
    if header.is_empty() {
        return Err(SignatureError::MissingHeader);
    }
    let provided = STANDARD
        .decode(header)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;

    if constant_time_eq(&provided, &expected) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Dispatch on the gateway's scheme.
pub fn verify_signature(
    gateway: PaymentGateway,
    payload: &[u8],
    signature: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), SignatureError> {
    match gateway {
        PaymentGateway::Stripe => verify_stripe(payload, signature, secret, tolerance_secs),
        PaymentGateway::Razorpay => verify_razorpay(payload, signature, secret),
        PaymentGateway::Upi => verify_upi(payload, signature, secret),
    }
}
