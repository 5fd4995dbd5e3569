//! Stripe provider
//!
//! Payment intents over `https://api.stripe.com/v1` with form-encoded
//! bodies and bearer auth.

use crate::provider::{PaymentProvider, ProviderAuth, ProviderClient};
use crate::types::from_unix;
use crate::webhook::{DEFAULT_TOLERANCE_SECS, SignatureError, verify_stripe};
use crate::{
    ConfirmPaymentRequest, CreateCustomerRequest, CreateSubscriptionRequest, Currency, Customer,
    Money, PaymentError, PaymentGateway, PaymentRequest, PaymentResponse, PaymentResult,
    PaymentStatus, RefundRequest, RefundResponse, RefundStatus, Subscription, SubscriptionStatus,
};
use async_trait::async_trait;
use paygate_config::StripeSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

type Form = Vec<(String, String)>;

pub struct StripeProvider {
    client: ProviderClient,
    webhook_secret: Option<SecretString>,
    webhook_tolerance_secs: u64,
}

impl StripeProvider {
    pub fn new(secret_key: impl Into<String>) -> PaymentResult<Self> {
        Self::with_base_url(secret_key, STRIPE_API_BASE)
    }

    /// Point at another API root (a mock server in tests).
    pub fn with_base_url(secret_key: impl Into<String>, base_url: &str) -> PaymentResult<Self> {
        let auth = ProviderAuth::Bearer(SecretString::new(secret_key.into().into()));
        Ok(Self {
            client: ProviderClient::new(PaymentGateway::Stripe, base_url, auth)?,
            webhook_secret: None,
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
        })
    }

    pub fn from_settings(settings: &StripeSettings) -> PaymentResult<Self> {
        let base_url = settings.base_url.as_deref().unwrap_or(STRIPE_API_BASE);
        let mut provider = Self::with_base_url(settings.secret_key.expose_secret(), base_url)?
            .with_webhook_tolerance(settings.webhook_tolerance_secs);
        provider.webhook_secret = settings
            .webhook_secret
            .as_ref()
            .map(|secret| SecretString::new(secret.expose_secret().into()));
        Ok(provider)
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(SecretString::new(secret.into().into()));
        self
    }

    pub fn with_webhook_tolerance(mut self, seconds: u64) -> Self {
        self.webhook_tolerance_secs = seconds;
        self
    }

    async fn retrieve_charge(&self, charge_id: &str) -> PaymentResult<PaymentResponse> {
        let charge: StripeCharge = self.client.get(&format!("/charges/{}", charge_id)).await?;
        charge.into_response()
    }
}

fn push_metadata(form: &mut Form, metadata: &HashMap<String, String>) {
    for (key, value) in metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }
}

fn intent_status(status: &str) -> PaymentStatus {
    match status {
        "requires_payment_method" | "requires_confirmation" => PaymentStatus::Created,
        "requires_action" => PaymentStatus::RequiresAction,
        "processing" => PaymentStatus::Pending,
        "requires_capture" => PaymentStatus::Authorized,
        "succeeded" => PaymentStatus::Succeeded,
        "canceled" => PaymentStatus::Canceled,
        _ => PaymentStatus::Pending,
    }
}

fn subscription_status(status: &str) -> SubscriptionStatus {
    match status {
        "active" => SubscriptionStatus::Active,
        "trialing" => SubscriptionStatus::Trialing,
        "past_due" | "unpaid" => SubscriptionStatus::PastDue,
        "paused" => SubscriptionStatus::Paused,
        "canceled" => SubscriptionStatus::Canceled,
        "incomplete_expired" => SubscriptionStatus::Canceled,
        _ => SubscriptionStatus::Incomplete,
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    client_secret: Option<String>,
    created: i64,
}

impl StripePaymentIntent {
    fn into_response(self) -> PaymentResult<PaymentResponse> {
        Ok(PaymentResponse {
            gateway: PaymentGateway::Stripe,
            amount: Money::new(self.amount, Currency::parse(&self.currency)?),
            status: intent_status(&self.status),
            client_secret: self.client_secret,
            order_id: None,
            created_at: from_unix(self.created),
            provider_status: self.status,
            id: self.id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    refunded: bool,
    created: i64,
}

impl StripeCharge {
    fn into_response(self) -> PaymentResult<PaymentResponse> {
        let status = match (self.status.as_str(), self.refunded) {
            (_, true) => PaymentStatus::Refunded,
            ("succeeded", _) => PaymentStatus::Succeeded,
            ("failed", _) => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        };
        Ok(PaymentResponse {
            gateway: PaymentGateway::Stripe,
            amount: Money::new(self.amount, Currency::parse(&self.currency)?),
            status,
            client_secret: None,
            order_id: None,
            created_at: from_unix(self.created),
            provider_status: self.status,
            id: self.id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    amount: i64,
    currency: String,
    status: Option<String>,
    payment_intent: Option<String>,
    charge: Option<String>,
    created: i64,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    email: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    created: i64,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    customer: String,
    status: String,
    current_period_end: Option<i64>,
    created: i64,
    #[serde(default)]
    items: Option<StripeList<StripeSubscriptionItem>>,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    price: StripePrice,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

impl From<StripeSubscription> for Subscription {
    fn from(sub: StripeSubscription) -> Self {
        let plan_id = sub
            .items
            .and_then(|items| items.data.into_iter().next())
            .map(|item| item.price.id);
        Subscription {
            gateway: PaymentGateway::Stripe,
            id: sub.id,
            customer_id: Some(sub.customer),
            plan_id,
            status: subscription_status(&sub.status),
            current_period_end: sub.current_period_end.map(from_unix),
            created_at: from_unix(sub.created),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn gateway(&self) -> PaymentGateway {
        PaymentGateway::Stripe
    }

    async fn create_payment(&self, request: &PaymentRequest) -> PaymentResult<PaymentResponse> {
        let mut form: Form = vec![
            ("amount".into(), request.amount.amount.to_string()),
            ("currency".into(), request.amount.currency.code().to_lowercase()),
            ("payment_method_types[]".into(), request.method.as_str().into()),
        ];
        if let Some(customer) = &request.customer_id {
            form.push(("customer".into(), customer.clone()));
        }
        if let Some(description) = &request.description {
            form.push(("description".into(), description.clone()));
        }
        push_metadata(&mut form, &request.metadata);

        let intent: StripePaymentIntent = self
            .client
            .post_form("/payment_intents", &form, request.idempotency_key.as_deref())
            .await?;
        intent.into_response()
    }

    async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> PaymentResult<PaymentResponse> {
        if !request.payment_id.starts_with("pi_") {
            return Err(PaymentError::Validation(format!(
                "only payment intents can be confirmed (got {})",
                request.payment_id
            )));
        }

        let mut form: Form = Vec::new();
        if let Some(method) = &request.payment_method {
            form.push(("payment_method".into(), method.clone()));
        }

        let intent: StripePaymentIntent = self
            .client
            .post_form(
                &format!("/payment_intents/{}/confirm", request.payment_id),
                &form,
                None,
            )
            .await?;
        intent.into_response()
    }

    async fn process_refund(&self, request: &RefundRequest) -> PaymentResult<RefundResponse> {
        let target = if request.payment_id.starts_with("ch_") {
            "charge"
        } else {
            "payment_intent"
        };
        let mut form: Form = vec![(target.into(), request.payment_id.clone())];
        if let Some(amount) = &request.amount {
            form.push(("amount".into(), amount.amount.to_string()));
        }
        if let Some(reason) = &request.reason {
            form.push(("metadata[reason]".into(), reason.clone()));
        }
        push_metadata(&mut form, &request.metadata);

        let refund: StripeRefund = self.client.post_form("/refunds", &form, None).await?;
        let status = match refund.status.as_deref() {
            Some("succeeded") => RefundStatus::Succeeded,
            Some("failed" | "canceled") => RefundStatus::Failed,
            _ => RefundStatus::Pending,
        };

        Ok(RefundResponse {
            gateway: PaymentGateway::Stripe,
            payment_id: refund
                .payment_intent
                .or(refund.charge)
                .unwrap_or_else(|| request.payment_id.clone()),
            amount: Money::new(refund.amount, Currency::parse(&refund.currency)?),
            status,
            created_at: from_unix(refund.created),
            id: refund.id,
        })
    }

    async fn retrieve_payment(&self, payment_id: &str) -> PaymentResult<PaymentResponse> {
        if payment_id.starts_with("ch_") {
            return self.retrieve_charge(payment_id).await;
        }
        let intent: StripePaymentIntent = self
            .client
            .get(&format!("/payment_intents/{}", payment_id))
            .await?;
        intent.into_response()
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> PaymentResult<()> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or(SignatureError::MissingSecret)?;
        verify_stripe(
            payload,
            signature,
            secret.expose_secret(),
            self.webhook_tolerance_secs,
        )?;
        Ok(())
    }

    async fn create_customer(&self, request: &CreateCustomerRequest) -> PaymentResult<Customer> {
        let mut form: Form = Vec::new();
        if let Some(email) = &request.email {
            form.push(("email".into(), email.clone()));
        }
        if let Some(name) = &request.name {
            form.push(("name".into(), name.clone()));
        }
        if let Some(phone) = &request.phone {
            form.push(("phone".into(), phone.clone()));
        }
        push_metadata(&mut form, &request.metadata);

        let customer: StripeCustomer = self.client.post_form("/customers", &form, None).await?;
        Ok(Customer {
            gateway: PaymentGateway::Stripe,
            id: customer.id,
            email: customer.email,
            name: customer.name,
            phone: customer.phone,
            created_at: from_unix(customer.created),
        })
    }

    async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> PaymentResult<Subscription> {
        let mut form: Form = vec![
            ("customer".into(), request.customer_id.clone()),
            ("items[0][price]".into(), request.plan_id.clone()),
        ];
        if let Some(quantity) = request.quantity {
            form.push(("items[0][quantity]".into(), quantity.to_string()));
        }
        push_metadata(&mut form, &request.metadata);

        let sub: StripeSubscription = self.client.post_form("/subscriptions", &form, None).await?;
        Ok(sub.into())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> PaymentResult<Subscription> {
        let path = format!("/subscriptions/{}", subscription_id);
        let sub: StripeSubscription = if at_period_end {
            let form: Form = vec![("cancel_at_period_end".into(), "true".into())];
            self.client.post_form(&path, &form, None).await?
        } else {
            self.client.delete(&path).await?
        };
        Ok(sub.into())
    }
}
