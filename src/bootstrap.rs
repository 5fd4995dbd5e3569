//! One-call assembly of the payment layer from settings.
//!
//! ```rust,ignore
//! use paygate::prelude::*;
//! use std::sync::Arc;
//!
//! let paygate = Paygate::from_env(Arc::new(LogAuditSink))?;
//! let chain = paygate.middleware();
//! let payment = paygate.factory().retrieve_payment("pay_29QQoUBi66xm2f").await?;
//! ```

use paygate_auth::InternalApiKeyFilter;
use paygate_config::{ConfigError, PaygateSettings};
use paygate_core::resilience::CircuitBreakerRegistry;
use paygate_core::{HttpRequest, HttpResponse, LoggerMiddleware, MiddlewareChain, RequestIdMiddleware};
use paygate_payments::webhook::{WebhookAuditSink, WebhookEvent, WebhookReceiver};
use paygate_payments::{PaymentError, PaymentGateway, PaymentGatewayFactory};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaygateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// The assembled layer. Cheap to clone; clones share providers, breakers
/// and the audit sink.
#[derive(Clone)]
pub struct Paygate {
    settings: Arc<PaygateSettings>,
    factory: Arc<PaymentGatewayFactory>,
    webhooks: Arc<WebhookReceiver>,
}

impl Paygate {
    /// Optional `.env`, then `PAYGATE_*` variables.
    pub fn from_env(sink: Arc<dyn WebhookAuditSink>) -> Result<Self, PaygateError> {
        let settings = PaygateSettings::from_env()?;
        Self::from_settings(settings, sink)
    }

    /// Uses the process-wide breaker registry.
    pub fn from_settings(
        settings: PaygateSettings,
        sink: Arc<dyn WebhookAuditSink>,
    ) -> Result<Self, PaygateError> {
        Self::from_settings_in(settings, sink, CircuitBreakerRegistry::shared())
    }

    pub fn from_settings_in(
        settings: PaygateSettings,
        sink: Arc<dyn WebhookAuditSink>,
        registry: Arc<CircuitBreakerRegistry>,
    ) -> Result<Self, PaygateError> {
        let factory = PaymentGatewayFactory::from_settings_in(&settings, registry)?;
        let webhooks = WebhookReceiver::from_settings(&settings.gateways, sink);

        paygate_log::info!(
            target: "paygate",
            "Payment layer ready: gateways={:?} default={:?}",
            factory.gateways(),
            factory.default_gateway()
        );

        Ok(Self {
            settings: Arc::new(settings),
            factory: Arc::new(factory),
            webhooks: Arc::new(webhooks),
        })
    }

    pub fn settings(&self) -> &PaygateSettings {
        &self.settings
    }

    pub fn factory(&self) -> &Arc<PaymentGatewayFactory> {
        &self.factory
    }

    pub fn webhooks(&self) -> &Arc<WebhookReceiver> {
        &self.webhooks
    }

    pub fn api_key_filter(&self) -> InternalApiKeyFilter {
        InternalApiKeyFilter::from_settings(&self.settings.security)
    }

    /// Request id, access log, then the internal API-key gate.
    pub fn middleware(&self) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(RequestIdMiddleware);
        chain.use_middleware(LoggerMiddleware);
        chain.use_middleware(self.api_key_filter());
        chain
    }

    /// Verify, parse and audit a webhook delivery, answering the way
    /// gateways expect: 200 when accepted, 400 otherwise so the gateway
    /// retries or gives up on its own schedule.
    pub async fn handle_webhook(
        &self,
        gateway: PaymentGateway,
        request: &HttpRequest,
    ) -> (HttpResponse, Option<WebhookEvent>) {
        match self.webhooks.receive_request(gateway, request).await {
            Ok(event) => (
                HttpResponse::ok()
                    .with_header("Content-Type", "application/json")
                    .with_body(r#"{"received":true}"#),
                Some(event),
            ),
            Err(err) => {
                let body = serde_json::json!({ "error": err.to_string() }).to_string();
                (
                    HttpResponse::bad_request()
                        .with_header("Content-Type", "application/json")
                        .with_body(body),
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_config::ConfigService;
    use paygate_payments::webhook::{InMemoryAuditSink, sign_razorpay};

    fn registry() -> Arc<CircuitBreakerRegistry> {
        Arc::new(CircuitBreakerRegistry::new())
    }

    fn settings(entries: &[(&str, &str)]) -> PaygateSettings {
        let mut builder = ConfigService::builder();
        for (key, value) in entries {
            builder = builder.set(key, value).unwrap();
        }
        PaygateSettings::from_service(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_empty_settings_build_an_empty_layer() {
        let paygate = Paygate::from_settings_in(
            PaygateSettings::default(),
            Arc::new(InMemoryAuditSink::new()),
            registry(),
        )
        .unwrap();

        assert!(paygate.factory().gateways().is_empty());
        assert_eq!(paygate.factory().default_gateway(), None);
        assert_eq!(paygate.middleware().len(), 3);
        assert_eq!(paygate.api_key_filter().path_prefix(), "/api/internal");
    }

    #[test]
    fn test_factory_shares_the_given_registry() {
        let service = ConfigService::builder()
            .set("breakers.overrides.stripe-payments.failure_threshold", 2)
            .unwrap()
            .build()
            .unwrap();
        let registry = registry();
        let paygate = Paygate::from_settings_in(
            PaygateSettings::from_service(&service).unwrap(),
            Arc::new(InMemoryAuditSink::new()),
            registry.clone(),
        )
        .unwrap();

        assert!(Arc::ptr_eq(paygate.factory().registry(), &registry));
        let breaker = registry.get("stripe-payments").unwrap();
        assert_eq!(breaker.config().failure_threshold, 2);
    }

    #[cfg(feature = "razorpay")]
    #[test]
    fn test_gateways_and_secrets_from_settings() {
        let paygate = Paygate::from_settings_in(
            settings(&[
                ("gateways.default", "razorpay"),
                ("gateways.razorpay.key_id", "rzp_test_key"),
                ("gateways.razorpay.key_secret", "rzp_test_secret"),
                ("gateways.razorpay.webhook_secret", "whsec_rzp"),
            ]),
            Arc::new(InMemoryAuditSink::new()),
            registry(),
        )
        .unwrap();

        assert_eq!(paygate.factory().gateways(), vec![PaymentGateway::Razorpay]);
        assert_eq!(paygate.factory().default_gateway(), Some(PaymentGateway::Razorpay));
        assert!(paygate.webhooks().has_secret(PaymentGateway::Razorpay));
        assert!(!paygate.webhooks().has_secret(PaymentGateway::Stripe));
    }

    #[cfg(feature = "razorpay")]
    #[tokio::test]
    async fn test_handle_webhook_status_codes() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let paygate = Paygate::from_settings_in(
            settings(&[
                ("gateways.razorpay.key_id", "rzp_test_key"),
                ("gateways.razorpay.key_secret", "rzp_test_secret"),
                ("gateways.razorpay.webhook_secret", "whsec_rzp"),
            ]),
            sink.clone(),
            registry(),
        )
        .unwrap();

        let payload = r#"{"event":"payment.captured","created_at":1700000000,"payload":{"payment":{"entity":{"id":"pay_1"}}}}"#;
        let signature = sign_razorpay(payload.as_bytes(), "whsec_rzp").unwrap();

        let good = HttpRequest::new("POST", "/webhooks/razorpay")
            .with_header("X-Razorpay-Signature", signature)
            .with_body(payload);
        let (response, event) = paygate.handle_webhook(PaymentGateway::Razorpay, &good).await;
        assert_eq!(response.status, 200);
        assert_eq!(event.unwrap().payment_id.as_deref(), Some("pay_1"));

        let forged = HttpRequest::new("POST", "/webhooks/razorpay")
            .with_header("X-Razorpay-Signature", "00")
            .with_body(payload);
        let (response, event) = paygate.handle_webhook(PaymentGateway::Razorpay, &forged).await;
        assert_eq!(response.status, 400);
        assert!(event.is_none());

        assert_eq!(sink.len(), 2);
    }
}
