//! Gateway selection and resilient dispatch
//!
//! Every outbound call runs through the circuit breaker named
//! `"<gateway>-payments"`. Only transport failures and 5xx/429 responses
//! count against a breaker; a declined card or a validation error from
//! the provider is a healthy answer. Reads are additionally retried.

use crate::provider::PaymentProvider;
use crate::webhook::{DEFAULT_TOLERANCE_SECS, verify_signature};
use crate::{
    ConfirmPaymentRequest, CreateCustomerRequest, CreateSubscriptionRequest, Customer,
    PaymentError, PaymentGateway, PaymentRequest, PaymentResponse, PaymentResult, RefundRequest,
    RefundResponse, Subscription,
};
use paygate_config::PaygateSettings;
use paygate_core::resilience::{CircuitBreakerError, CircuitBreakerRegistry, Retry, RetryConfig, RetryError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

/// Routes each operation to one configured provider.
pub struct PaymentGatewayFactory {
    providers: HashMap<PaymentGateway, Arc<dyn PaymentProvider>>,
    default_gateway: Option<PaymentGateway>,
    retry: RetryConfig,
    registry: Arc<CircuitBreakerRegistry>,
    webhook_tolerance_secs: u64,
}

impl PaymentGatewayFactory {
    /// No providers, the global breaker registry and the default retry policy.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_gateway: None,
            retry: RetryConfig::default(),
            registry: CircuitBreakerRegistry::shared(),
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Build every configured gateway and install breaker settings into
    /// the global registry.
    pub fn from_settings(settings: &PaygateSettings) -> PaymentResult<Self> {
        Self::from_settings_in(settings, CircuitBreakerRegistry::shared())
    }

    /// [`from_settings`](Self::from_settings) against a specific registry.
    pub fn from_settings_in(
        settings: &PaygateSettings,
        registry: Arc<CircuitBreakerRegistry>,
    ) -> PaymentResult<Self> {
        settings.breakers.apply(&registry);
        let mut factory = Self::new()
            .with_registry(registry)
            .with_retry(settings.retry.to_config());

        let gateways = &settings.gateways;

        #[cfg(feature = "razorpay")]
        {
            if let Some(razorpay) = &gateways.razorpay {
                let provider = crate::providers::RazorpayProvider::from_settings(razorpay)?;
                factory = factory.with_provider(Arc::new(provider));
            }
        }
        #[cfg(feature = "stripe")]
        {
            if let Some(stripe) = &gateways.stripe {
                let provider = crate::providers::StripeProvider::from_settings(stripe)?;
                factory = factory.with_provider(Arc::new(provider));
                factory.webhook_tolerance_secs = stripe.webhook_tolerance_secs;
            }
        }
        #[cfg(feature = "upi")]
        {
            if let Some(upi) = &gateways.upi {
                let provider = crate::providers::UpiProvider::from_settings(upi)?;
                factory = factory.with_provider(Arc::new(provider));
            }
        }

        if let Some(name) = &gateways.default {
            let gateway: PaymentGateway = name.parse()?;
            if !factory.is_available(gateway) {
                return Err(PaymentError::GatewayNotConfigured(gateway));
            }
            factory.default_gateway = Some(gateway);
        }

        paygate_log::info!(
            target: "paygate::factory",
            "Payment gateways ready: {:?} (default {:?})",
            factory.gateways(),
            factory.default_gateway
        );
        Ok(factory)
    }

    /// Register a provider, replacing any earlier one for the same gateway.
    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.gateway(), provider);
        self
    }

    pub fn with_default_gateway(mut self, gateway: PaymentGateway) -> Self {
        self.default_gateway = Some(gateway);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Use a registry other than the global one.
    pub fn with_registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn default_gateway(&self) -> Option<PaymentGateway> {
        self.default_gateway
    }

    /// Configured gateways in a stable order.
    pub fn gateways(&self) -> Vec<PaymentGateway> {
        PaymentGateway::ALL
            .into_iter()
            .filter(|gateway| self.providers.contains_key(gateway))
            .collect()
    }

    pub fn is_available(&self, gateway: PaymentGateway) -> bool {
        self.providers.contains_key(&gateway)
    }

    pub fn provider(&self, gateway: PaymentGateway) -> PaymentResult<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&gateway)
            .cloned()
            .ok_or(PaymentError::GatewayNotConfigured(gateway))
    }

    fn select(&self, hint: Option<PaymentGateway>) -> PaymentResult<Arc<dyn PaymentProvider>> {
        let gateway = hint.or(self.default_gateway).ok_or_else(|| {
            PaymentError::Validation("no gateway given and no default configured".into())
        })?;
        self.provider(gateway)
    }

    /// The registered provider must also accept the id.
    fn route(&self, id: &str) -> PaymentResult<Arc<dyn PaymentProvider>> {
        let gateway = PaymentGateway::from_payment_id(id)?;
        let provider = self.provider(gateway)?;
        if !provider.owns_payment_id(id) {
            return Err(PaymentError::UnknownGateway(id.to_string()));
        }
        paygate_log::trace!(target: "paygate::factory", "{} routed to {}", id, gateway);
        Ok(provider)
    }

    pub async fn create_payment(&self, request: PaymentRequest) -> PaymentResult<PaymentResponse> {
        request.validate()?;
        let provider = self.select(request.gateway)?;
        guarded(&self.registry, provider.gateway(), || {
            provider.create_payment(&request)
        })
        .await
    }

    pub async fn confirm_payment(
        &self,
        request: ConfirmPaymentRequest,
    ) -> PaymentResult<PaymentResponse> {
        let provider = self.route(&request.payment_id)?;
        guarded(&self.registry, provider.gateway(), || {
            provider.confirm_payment(&request)
        })
        .await
    }

    /// Start a refund on the runtime and hand back its handle.
    ///
    /// Validation and routing errors are returned immediately. The refund
    /// keeps running if the returned task is dropped.
    pub fn process_refund(&self, request: RefundRequest) -> PaymentResult<RefundTask> {
        request.validate()?;
        let provider = self.route(&request.payment_id)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PaymentError::TaskFailed(format!("no async runtime: {}", e)))?;

        let registry = Arc::clone(&self.registry);
        let payment_id = request.payment_id.clone();
        let handle = runtime.spawn(async move {
            let gateway = provider.gateway();
            let result = guarded(&registry, gateway, || provider.process_refund(&request)).await;
            match &result {
                Ok(refund) => paygate_log::info!(
                    target: "paygate::factory",
                    "Refund {} for {} is {:?}", refund.id, request.payment_id, refund.status
                ),
                Err(err) => paygate_log::error!(
                    target: "paygate::factory",
                    "Refund for {} failed: {}", request.payment_id, err
                ),
            }
            result
        });

        Ok(RefundTask { payment_id, handle })
    }

    /// Fetch current state, retrying transient failures.
    pub async fn retrieve_payment(&self, payment_id: &str) -> PaymentResult<PaymentResponse> {
        let provider = self.route(payment_id)?;
        let gateway = provider.gateway();
        let registry = &*self.registry;
        let provider = &provider;

        Retry::new(self.retry.clone())
            .call_if(
                move || guarded(registry, gateway, move || provider.retrieve_payment(payment_id)),
                PaymentError::is_retryable,
            )
            .await
            .map_err(retry_outcome)
    }

    pub async fn create_customer(&self, request: CreateCustomerRequest) -> PaymentResult<Customer> {
        let provider = self.select(request.gateway)?;
        guarded(&self.registry, provider.gateway(), || {
            provider.create_customer(&request)
        })
        .await
    }

    /// The gateway comes from the request, else from the customer id, else
    /// the default.
    pub async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> PaymentResult<Subscription> {
        let hint = request
            .gateway
            .or_else(|| PaymentGateway::from_payment_id(&request.customer_id).ok());
        let provider = self.select(hint)?;
        guarded(&self.registry, provider.gateway(), || {
            provider.create_subscription(&request)
        })
        .await
    }

    /// `sub_` ids are issued by more than one gateway, so the caller names it.
    pub async fn cancel_subscription(
        &self,
        gateway: PaymentGateway,
        subscription_id: &str,
        at_period_end: bool,
    ) -> PaymentResult<Subscription> {
        let provider = self.provider(gateway)?;
        guarded(&self.registry, gateway, || {
            provider.cancel_subscription(subscription_id, at_period_end)
        })
        .await
    }

    /// Check a webhook against the secret the gateway's provider holds.
    pub fn verify_webhook(
        &self,
        gateway: PaymentGateway,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<()> {
        self.provider(gateway)?
            .verify_webhook_signature(payload, signature)
            .inspect_err(|err| {
                paygate_log::warn!(
                    target: "paygate::factory",
                    "{} webhook rejected by provider: {}", gateway, err
                );
            })
    }

    /// Check a webhook signature with an explicit secret.
    pub fn verify_webhook_signature(
        &self,
        gateway: PaymentGateway,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> bool {
        match verify_signature(gateway, payload, signature, secret, self.webhook_tolerance_secs) {
            Ok(()) => true,
            Err(err) => {
                paygate_log::warn!(
                    target: "paygate::factory",
                    "{} webhook signature rejected: {}", gateway, err
                );
                false
            }
        }
    }
}

impl Default for PaymentGatewayFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `op` through the gateway's breaker.
async fn guarded<T, F, Fut>(
    registry: &CircuitBreakerRegistry,
    gateway: PaymentGateway,
    op: F,
) -> PaymentResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = PaymentResult<T>>,
{
    let name = gateway.breaker_name();
    // Non-retryable errors pass through the breaker as successes.
    let outcome = registry
        .try_execute(&name, || async move {
            match op().await {
                Err(err) if err.is_retryable() => Err(err),
                other => Ok(other),
            }
        })
        .await;

    match outcome {
        Ok(result) => result,
        Err(CircuitBreakerError::Execution(err)) => Err(err),
        Err(rejection) => {
            paygate_log::warn!(target: "paygate::factory", "{} call rejected: {}", gateway, rejection);
            Err(PaymentError::CircuitOpen(name))
        }
    }
}

fn retry_outcome(err: RetryError<PaymentError>) -> PaymentError {
    match err.last_error {
        Some(last) if !last.is_retryable() => last,
        last => PaymentError::RetriesExhausted {
            attempts: err.attempts,
            last_error: last.map(Box::new),
        },
    }
}

/// A refund running on the tokio runtime.
pub struct RefundTask {
    payment_id: String,
    handle: JoinHandle<PaymentResult<RefundResponse>>,
}

impl RefundTask {
    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for RefundTask {
    type Output = PaymentResult<RefundResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(PaymentError::TaskFailed(format!(
                "refund for {}: {}",
                self.payment_id, e
            )))),
        }
    }
}
