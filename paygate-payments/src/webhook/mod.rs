//! Inbound webhook handling
//!
//! ```rust,ignore
//! use paygate_payments::webhook::{InMemoryAuditSink, WebhookReceiver};
//! use std::sync::Arc;
//!
//! let receiver = WebhookReceiver::new(Arc::new(InMemoryAuditSink::new()))
//!     .with_secret(PaymentGateway::Stripe, "whsec_...");
//!
//! let event = receiver.receive_request(PaymentGateway::Stripe, &request).await?;
//! ```

mod audit;
mod receiver;
mod signature;

pub use audit::{InMemoryAuditSink, LogAuditSink, WebhookAuditRecord, WebhookAuditSink};
pub use receiver::{RAZORPAY_EVENT_ID_HEADER, WebhookReceiver};
pub use signature::{
    DEFAULT_TOLERANCE_SECS, SignatureError, sign_razorpay, sign_stripe, sign_upi, verify_razorpay,
    verify_signature, verify_stripe, verify_stripe_at, verify_upi,
};

use crate::{PaymentError, PaymentGateway, PaymentResult};
use crate::types::from_unix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway-neutral classification of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    PaymentAuthorized,
    PaymentSucceeded,
    PaymentFailed,
    RefundCreated,
    RefundProcessed,
    RefundFailed,
    SubscriptionActivated,
    SubscriptionCanceled,
    Other,
}

impl WebhookEventKind {
    pub fn classify(gateway: PaymentGateway, event_type: &str) -> Self {
        use PaymentGateway::*;
        use WebhookEventKind::*;

        match (gateway, event_type) {
            (Stripe, "payment_intent.amount_capturable_updated") => PaymentAuthorized,
            (Stripe, "payment_intent.succeeded" | "charge.succeeded") => PaymentSucceeded,
            (Stripe, "payment_intent.payment_failed" | "charge.failed") => PaymentFailed,
            (Stripe, "refund.created") => RefundCreated,
            (Stripe, "charge.refunded") => RefundProcessed,
            (Stripe, "refund.failed") => RefundFailed,
            (Stripe, "customer.subscription.created") => SubscriptionActivated,
            (Stripe, "customer.subscription.deleted") => SubscriptionCanceled,

            (Razorpay, "payment.authorized") => PaymentAuthorized,
            (Razorpay, "payment.captured" | "order.paid") => PaymentSucceeded,
            (Razorpay, "payment.failed") => PaymentFailed,
            (Razorpay, "refund.created") => RefundCreated,
            (Razorpay, "refund.processed") => RefundProcessed,
            (Razorpay, "refund.failed") => RefundFailed,
            (Razorpay, "subscription.activated") => SubscriptionActivated,
            (Razorpay, "subscription.cancelled") => SubscriptionCanceled,

            (Upi, "payment.success") => PaymentSucceeded,
            (Upi, "payment.failure" | "payment.expired") => PaymentFailed,
            (Upi, "refund.success") => RefundProcessed,
            (Upi, "refund.failure") => RefundFailed,
            (Upi, "mandate.activated") => SubscriptionActivated,
            (Upi, "mandate.revoked") => SubscriptionCanceled,

            _ => Other,
        }
    }
}

/// A verified webhook, normalized across gateways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Provider event id, when the payload (or a header) carries one.
    pub id: Option<String>,
    pub gateway: PaymentGateway,
    /// Provider event type, e.g. `payment_intent.succeeded`.
    pub event_type: String,
    pub kind: WebhookEventKind,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// The provider's event object.
    pub data: Value,
}

impl WebhookEvent {
    /// Parse a raw payload. Does not check signatures.
    pub fn parse(gateway: PaymentGateway, payload: &[u8]) -> PaymentResult<Self> {
        let root: Value = serde_json::from_slice(payload)?;

        let (id, event_type, created, payment_id, data) = match gateway {
            PaymentGateway::Stripe => {
                let object = root.pointer("/data/object").cloned().unwrap_or(Value::Null);
                let payment_id = match object.get("object").and_then(Value::as_str) {
                    Some("payment_intent") => str_at(&object, "/id"),
                    _ => str_at(&object, "/payment_intent"),
                };
                (
                    str_at(&root, "/id"),
                    str_at(&root, "/type"),
                    root.get("created").and_then(Value::as_i64),
                    payment_id,
                    object,
                )
            }
            PaymentGateway::Razorpay => {
                let payment_id = str_at(&root, "/payload/payment/entity/id")
                    .or_else(|| str_at(&root, "/payload/refund/entity/payment_id"));
                (
                    str_at(&root, "/id"),
                    str_at(&root, "/event"),
                    root.get("created_at").and_then(Value::as_i64),
                    payment_id,
                    root.get("payload").cloned().unwrap_or(Value::Null),
                )
            }
            PaymentGateway::Upi => (
                str_at(&root, "/id"),
                str_at(&root, "/event").or_else(|| str_at(&root, "/type")),
                root.get("created_at").and_then(Value::as_i64),
                str_at(&root, "/data/payment_id"),
                root.get("data").cloned().unwrap_or(Value::Null),
            ),
        };

        let event_type = event_type.ok_or_else(|| {
            PaymentError::Serialization(format!("{} webhook has no event type", gateway))
        })?;

        Ok(Self {
            id,
            gateway,
            kind: WebhookEventKind::classify(gateway, &event_type),
            event_type,
            payment_id,
            created_at: created.map(from_unix).unwrap_or_else(Utc::now),
            data,
        })
    }
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stripe_event() {
        let payload = json!({
            "id": "evt_123",
            "type": "payment_intent.succeeded",
            "created": 1_700_000_000,
            "data": {"object": {"id": "pi_123", "object": "payment_intent", "amount": 2000}}
        });
        let event = WebhookEvent::parse(PaymentGateway::Stripe, payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.id.as_deref(), Some("evt_123"));
        assert_eq!(event.kind, WebhookEventKind::PaymentSucceeded);
        assert_eq!(event.payment_id.as_deref(), Some("pi_123"));
        assert_eq!(event.created_at.timestamp(), 1_700_000_000);
        assert_eq!(event.data["amount"], 2000);
    }

    #[test]
    fn test_parse_stripe_refund_points_at_intent() {
        let payload = json!({
            "id": "evt_9",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1", "object": "charge", "payment_intent": "pi_77"}}
        });
        let event = WebhookEvent::parse(PaymentGateway::Stripe, payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.kind, WebhookEventKind::RefundProcessed);
        assert_eq!(event.payment_id.as_deref(), Some("pi_77"));
    }

    #[test]
    fn test_parse_razorpay_event() {
        let payload = json!({
            "entity": "event",
            "event": "payment.captured",
            "created_at": 1_700_000_100,
            "payload": {"payment": {"entity": {"id": "pay_29QQoUBi66xm2f", "amount": 50000}}}
        });
        let event = WebhookEvent::parse(PaymentGateway::Razorpay, payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.id, None);
        assert_eq!(event.kind, WebhookEventKind::PaymentSucceeded);
        assert_eq!(event.payment_id.as_deref(), Some("pay_29QQoUBi66xm2f"));
    }

    #[test]
    fn test_parse_upi_event() {
        let payload = json!({
            "id": "upie_1",
            "event": "payment.failure",
            "data": {"payment_id": "upi_abc", "reason": "declined by payer"}
        });
        let event = WebhookEvent::parse(PaymentGateway::Upi, payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.kind, WebhookEventKind::PaymentFailed);
        assert_eq!(event.payment_id.as_deref(), Some("upi_abc"));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            WebhookEvent::parse(PaymentGateway::Stripe, b"not json"),
            Err(PaymentError::Serialization(_))
        ));
        assert!(matches!(
            WebhookEvent::parse(PaymentGateway::Razorpay, br#"{"payload": {}}"#),
            Err(PaymentError::Serialization(_))
        ));
    }

    #[test]
    fn test_unknown_event_type_is_other() {
        assert_eq!(
            WebhookEventKind::classify(PaymentGateway::Stripe, "invoice.created"),
            WebhookEventKind::Other
        );
        assert_eq!(
            WebhookEventKind::classify(PaymentGateway::Upi, "payment.captured"),
            WebhookEventKind::Other
        );
    }
}
