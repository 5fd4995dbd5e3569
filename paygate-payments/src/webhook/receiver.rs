//! Verifies, audits and parses inbound webhooks

use super::signature::{DEFAULT_TOLERANCE_SECS, SignatureError, verify_signature};
use super::{WebhookAuditRecord, WebhookAuditSink, WebhookEvent};
use crate::{PaymentError, PaymentGateway, PaymentResult};
use paygate_config::GatewaysSettings;
use paygate_core::HttpRequest;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;

/// Razorpay sends the event id as a header rather than in the body.
pub const RAZORPAY_EVENT_ID_HEADER: &str = "X-Razorpay-Event-Id";

/// Receiver for inbound gateway webhooks.
///
/// Every delivery is written to the audit sink, whether or not its signature
/// checks out. Payloads are only parsed once verified.
pub struct WebhookReceiver {
    secrets: HashMap<PaymentGateway, SecretString>,
    tolerance_secs: u64,
    sink: Arc<dyn WebhookAuditSink>,
}

impl WebhookReceiver {
    pub fn new(sink: Arc<dyn WebhookAuditSink>) -> Self {
        Self {
            secrets: HashMap::new(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            sink,
        }
    }

    /// Register the signing secret for one gateway.
    pub fn with_secret(mut self, gateway: PaymentGateway, secret: impl Into<String>) -> Self {
        self.secrets
            .insert(gateway, SecretString::new(secret.into().into()));
        self
    }

    /// Replay window for timestamped schemes, in seconds.
    pub fn with_tolerance(mut self, seconds: u64) -> Self {
        self.tolerance_secs = seconds;
        self
    }

    /// Take webhook secrets from each configured gateway.
    pub fn from_settings(gateways: &GatewaysSettings, sink: Arc<dyn WebhookAuditSink>) -> Self {
        let mut receiver = Self::new(sink);

        if let Some(stripe) = &gateways.stripe {
            receiver.tolerance_secs = stripe.webhook_tolerance_secs;
            if let Some(secret) = &stripe.webhook_secret {
                receiver = receiver.with_secret(PaymentGateway::Stripe, secret.expose_secret());
            }
        }
        if let Some(secret) = gateways.razorpay.as_ref().and_then(|r| r.webhook_secret.as_ref()) {
            receiver = receiver.with_secret(PaymentGateway::Razorpay, secret.expose_secret());
        }
        if let Some(secret) = gateways.upi.as_ref().and_then(|u| u.webhook_secret.as_ref()) {
            receiver = receiver.with_secret(PaymentGateway::Upi, secret.expose_secret());
        }

        receiver
    }

    pub fn has_secret(&self, gateway: PaymentGateway) -> bool {
        self.secrets.contains_key(&gateway)
    }

    /// Check the gateway's signature header against `payload`.
    pub fn verify(
        &self,
        gateway: PaymentGateway,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<(), SignatureError> {
        let secret = self
            .secrets
            .get(&gateway)
            .ok_or(SignatureError::MissingSecret)?;
        let signature =
            find_header(headers, gateway.signature_header()).ok_or(SignatureError::MissingHeader)?;

        verify_signature(
            gateway,
            payload,
            signature,
            secret.expose_secret(),
            self.tolerance_secs,
        )
    }

    /// Verify, audit, then parse.
    pub async fn receive(
        &self,
        gateway: PaymentGateway,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> PaymentResult<WebhookEvent> {
        let record = WebhookAuditRecord::new(gateway, payload, headers);

        let (outcome, record) = match self.verify(gateway, payload, headers) {
            Err(err) => {
                paygate_log::warn!(
                    target: "paygate::webhook",
                    "Rejected {} webhook: {}", gateway, err
                );
                let record = record.failed(err.to_string());
                (Err(PaymentError::from(err)), record)
            }
            Ok(()) => match WebhookEvent::parse(gateway, payload) {
                Ok(mut event) => {
                    if event.id.is_none() && gateway == PaymentGateway::Razorpay {
                        event.id =
                            find_header(headers, RAZORPAY_EVENT_ID_HEADER).map(str::to_string);
                    }
                    paygate_log::debug!(
                        target: "paygate::webhook",
                        "Verified {} webhook {}", gateway, event.event_type
                    );
                    let record = record.verified(event.id.clone());
                    (Ok(event), record)
                }
                Err(err) => {
                    let record = record
                        .verified(None)
                        .failed(format!("unparseable payload: {}", err));
                    (Err(err), record)
                }
            },
        };

        if let Err(err) = self.sink.record(record).await {
            paygate_log::error!(
                target: "paygate::webhook",
                "Failed to write {} webhook audit record: {}", gateway, err
            );
        }

        outcome
    }

    /// [`receive`](Self::receive) for a request from the middleware chain.
    pub async fn receive_request(
        &self,
        gateway: PaymentGateway,
        request: &HttpRequest,
    ) -> PaymentResult<WebhookEvent> {
        self.receive(gateway, &request.body, &request.headers).await
    }
}

fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::{InMemoryAuditSink, WebhookEventKind, sign_razorpay, sign_stripe, sign_upi};
    use async_trait::async_trait;

    const STRIPE_BODY: &str = r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","object":"payment_intent"}}}"#;
    const RAZORPAY_BODY: &str = r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1"}}}}"#;

    fn receiver(sink: Arc<InMemoryAuditSink>) -> WebhookReceiver {
        WebhookReceiver::new(sink)
            .with_secret(PaymentGateway::Stripe, "whsec_test")
            .with_secret(PaymentGateway::Razorpay, "rzp_secret")
            .with_secret(PaymentGateway::Upi, "upi_secret")
    }

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_receive_verified_stripe_event() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let receiver = receiver(sink.clone());
        let signature =
            sign_stripe(STRIPE_BODY.as_bytes(), "whsec_test", chrono::Utc::now().timestamp()).unwrap();

        let event = receiver
            .receive(
                PaymentGateway::Stripe,
                STRIPE_BODY.as_bytes(),
                &headers(&[("stripe-signature", &signature)]),
            )
            .await
            .unwrap();

        assert_eq!(event.kind, WebhookEventKind::PaymentSucceeded);
        assert_eq!(event.payment_id.as_deref(), Some("pi_1"));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].verified);
        assert_eq!(records[0].event_id.as_deref(), Some("evt_1"));
    }

    #[tokio::test]
    async fn test_invalid_signature_is_audited_and_rejected() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let receiver = receiver(sink.clone());
        let signature = sign_razorpay(RAZORPAY_BODY.as_bytes(), "someone_else").unwrap();

        let result = receiver
            .receive(
                PaymentGateway::Razorpay,
                RAZORPAY_BODY.as_bytes(),
                &headers(&[("X-Razorpay-Signature", &signature)]),
            )
            .await;

        assert!(matches!(result, Err(PaymentError::InvalidWebhookSignature)));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].verified);
        assert_eq!(records[0].failure_reason.as_deref(), Some("signature mismatch"));
    }

    #[tokio::test]
    async fn test_missing_header_and_secret() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let receiver = WebhookReceiver::new(sink.clone()).with_secret(PaymentGateway::Upi, "s");

        let missing_header = receiver
            .receive(PaymentGateway::Upi, b"{}", &HashMap::new())
            .await;
        assert!(matches!(missing_header, Err(PaymentError::InvalidWebhookSignature)));

        let signature = sign_stripe(b"{}", "s", chrono::Utc::now().timestamp()).unwrap();
        let no_secret = receiver
            .receive(
                PaymentGateway::Stripe,
                b"{}",
                &headers(&[("Stripe-Signature", &signature)]),
            )
            .await;
        assert!(matches!(no_secret, Err(PaymentError::InvalidWebhookSignature)));
        assert!(!receiver.has_secret(PaymentGateway::Stripe));

        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_razorpay_event_id_from_header() {
        let receiver = receiver(Arc::new(InMemoryAuditSink::new()));
        let signature = sign_razorpay(RAZORPAY_BODY.as_bytes(), "rzp_secret").unwrap();
        let request = HttpRequest::new("POST", "/webhooks/razorpay")
            .with_header("X-Razorpay-Signature", signature)
            .with_header("x-razorpay-event-id", "evt_rzp_9")
            .with_body(RAZORPAY_BODY);

        let event = receiver
            .receive_request(PaymentGateway::Razorpay, &request)
            .await
            .unwrap();

        assert_eq!(event.id.as_deref(), Some("evt_rzp_9"));
        assert_eq!(event.payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_verified_but_unparseable() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let receiver = receiver(sink.clone());
        let body = b"{\"no_event\":true}";
        let signature = sign_upi(body, "upi_secret").unwrap();

        let result = receiver
            .receive(PaymentGateway::Upi, body, &headers(&[("X-UPI-Signature", &signature)]))
            .await;

        assert!(matches!(result, Err(PaymentError::Serialization(_))));
        let record = &sink.records()[0];
        assert!(record.verified);
        assert!(record.failure_reason.is_some());
    }

    struct FailingSink;

    #[async_trait]
    impl WebhookAuditSink for FailingSink {
        async fn record(&self, _record: WebhookAuditRecord) -> PaymentResult<()> {
            Err(PaymentError::Config("audit store offline".into()))
        }
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_block_delivery() {
        let receiver =
            WebhookReceiver::new(Arc::new(FailingSink)).with_secret(PaymentGateway::Upi, "upi_secret");
        let body = br#"{"event":"payment.success","data":{"payment_id":"upi_1"}}"#;
        let signature = sign_upi(body, "upi_secret").unwrap();

        let event = receiver
            .receive(PaymentGateway::Upi, body, &headers(&[("X-UPI-Signature", &signature)]))
            .await
            .unwrap();

        assert_eq!(event.payment_id.as_deref(), Some("upi_1"));
    }

    #[tokio::test]
    async fn test_stale_stripe_signature() {
        let receiver = receiver(Arc::new(InMemoryAuditSink::new())).with_tolerance(60);
        let old = chrono::Utc::now().timestamp() - 120;
        let signature = sign_stripe(STRIPE_BODY.as_bytes(), "whsec_test", old).unwrap();

        let err = receiver
            .verify(
                PaymentGateway::Stripe,
                STRIPE_BODY.as_bytes(),
                &headers(&[("Stripe-Signature", &signature)]),
            )
            .unwrap_err();

        assert!(matches!(err, SignatureError::Stale { tolerance: 60, .. }));
    }
}
