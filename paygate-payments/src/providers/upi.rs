//! UPI provider
//!
//! Talks to a UPI payment service provider: collect requests for payments,
//! mandates for recurring debits. Amounts are always INR paise.

use crate::provider::{PaymentProvider, ProviderAuth, ProviderClient};
use crate::types::from_unix;
use crate::webhook::{SignatureError, verify_upi};
use crate::{
    ConfirmPaymentRequest, CreateCustomerRequest, CreateSubscriptionRequest, Currency, Customer,
    Money, PaymentError, PaymentGateway, PaymentRequest, PaymentResponse, PaymentResult,
    PaymentStatus, RefundRequest, RefundResponse, RefundStatus, Subscription, SubscriptionStatus,
};
use async_trait::async_trait;
use paygate_config::UpiSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub struct UpiProvider {
    client: ProviderClient,
    merchant_vpa: Option<String>,
    webhook_secret: Option<SecretString>,
}

impl UpiProvider {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> PaymentResult<Self> {
        let auth = ProviderAuth::Bearer(SecretString::new(api_key.into().into()));
        Ok(Self {
            client: ProviderClient::new(PaymentGateway::Upi, base_url, auth)?,
            merchant_vpa: None,
            webhook_secret: None,
        })
    }

    pub fn from_settings(settings: &UpiSettings) -> PaymentResult<Self> {
        let mut provider = Self::new(settings.api_key.expose_secret(), &settings.base_url)?;
        provider.merchant_vpa = settings.merchant_vpa.clone();
        provider.webhook_secret = settings
            .webhook_secret
            .as_ref()
            .map(|secret| SecretString::new(secret.expose_secret().into()));
        Ok(provider)
    }

    /// Payee VPA sent with every collect request.
    pub fn with_merchant_vpa(mut self, vpa: impl Into<String>) -> Self {
        self.merchant_vpa = Some(vpa.into());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(SecretString::new(secret.into().into()));
        self
    }
}

/// A VPA is `handle@psp`, both sides non-empty.
fn is_vpa(value: &str) -> bool {
    matches!(value.split_once('@'), Some((handle, psp)) if !handle.is_empty() && !psp.is_empty() && !psp.contains('@'))
}

fn payment_status(status: &str) -> PaymentStatus {
    match status.to_ascii_uppercase().as_str() {
        "CREATED" => PaymentStatus::Created,
        "SUCCESS" => PaymentStatus::Succeeded,
        "FAILURE" | "FAILED" => PaymentStatus::Failed,
        "EXPIRED" => PaymentStatus::Canceled,
        "REFUNDED" => PaymentStatus::Refunded,
        _ => PaymentStatus::Pending,
    }
}

fn mandate_status(status: &str) -> SubscriptionStatus {
    match status.to_ascii_uppercase().as_str() {
        "ACTIVE" => SubscriptionStatus::Active,
        "PAUSED" => SubscriptionStatus::Paused,
        "REVOKED" | "CANCELLED" => SubscriptionStatus::Canceled,
        "COMPLETED" | "EXPIRED" => SubscriptionStatus::Completed,
        _ => SubscriptionStatus::Created,
    }
}

#[derive(Debug, Serialize)]
struct CollectBody<'a> {
    amount: i64,
    currency: &'static str,
    payer_vpa: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payee_vpa: Option<&'a str>,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct UpiPayment {
    id: String,
    amount: i64,
    #[serde(default = "inr")]
    currency: String,
    status: String,
    created_at: i64,
}

fn inr() -> String {
    Currency::INR.code().to_string()
}

impl UpiPayment {
    fn into_response(self) -> PaymentResult<PaymentResponse> {
        Ok(PaymentResponse {
            gateway: PaymentGateway::Upi,
            amount: Money::new(self.amount, Currency::parse(&self.currency)?),
            status: payment_status(&self.status),
            client_secret: None,
            order_id: None,
            created_at: from_unix(self.created_at),
            provider_status: self.status,
            id: self.id,
        })
    }
}

#[derive(Debug, Serialize)]
struct RefundBody<'a> {
    payment_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct UpiRefund {
    id: String,
    payment_id: String,
    amount: i64,
    #[serde(default = "inr")]
    currency: String,
    status: String,
    created_at: i64,
}

#[derive(Debug, Serialize)]
struct CustomerBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vpa: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UpiCustomer {
    id: String,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    created_at: i64,
}

#[derive(Debug, Serialize)]
struct MandateBody<'a> {
    customer_id: &'a str,
    plan_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_count: Option<u32>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct UpiMandate {
    id: String,
    customer_id: Option<String>,
    plan_id: Option<String>,
    status: String,
    next_debit_at: Option<i64>,
    created_at: i64,
}

impl From<UpiMandate> for Subscription {
    fn from(mandate: UpiMandate) -> Self {
        Subscription {
            gateway: PaymentGateway::Upi,
            id: mandate.id,
            customer_id: mandate.customer_id,
            plan_id: mandate.plan_id,
            status: mandate_status(&mandate.status),
            current_period_end: mandate.next_debit_at.map(from_unix),
            created_at: from_unix(mandate.created_at),
        }
    }
}

#[async_trait]
impl PaymentProvider for UpiProvider {
    fn gateway(&self) -> PaymentGateway {
        PaymentGateway::Upi
    }

    async fn create_payment(&self, request: &PaymentRequest) -> PaymentResult<PaymentResponse> {
        if request.amount.currency != Currency::INR {
            return Err(PaymentError::Validation(format!(
                "UPI only settles INR (got {})",
                request.amount.currency
            )));
        }
        let payer_vpa = request
            .payer_vpa
            .as_deref()
            .filter(|vpa| is_vpa(vpa))
            .ok_or_else(|| PaymentError::Validation("UPI collect needs a valid payer VPA".into()))?;

        let reference = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let body = CollectBody {
            amount: request.amount.amount,
            currency: "INR",
            payer_vpa,
            payee_vpa: self.merchant_vpa.as_deref(),
            reference,
            note: request.description.as_deref(),
            metadata: &request.metadata,
        };

        let payment: UpiPayment = self
            .client
            .post_json("/collect-requests", &body, request.idempotency_key.as_deref())
            .await?;
        payment.into_response()
    }

    /// The payer approves a collect request in their UPI app, so there is
    /// nothing to submit; this reports the current state.
    async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> PaymentResult<PaymentResponse> {
        self.retrieve_payment(&request.payment_id).await
    }

    async fn process_refund(&self, request: &RefundRequest) -> PaymentResult<RefundResponse> {
        let body = RefundBody {
            payment_id: &request.payment_id,
            amount: request.amount.map(|amount| amount.amount),
            reason: request.reason.as_deref(),
            metadata: &request.metadata,
        };
        let refund: UpiRefund = self.client.post_json("/refunds", &body, None).await?;

        let status = match refund.status.to_ascii_uppercase().as_str() {
            "SUCCESS" => RefundStatus::Succeeded,
            "FAILURE" | "FAILED" => RefundStatus::Failed,
            _ => RefundStatus::Pending,
        };
        Ok(RefundResponse {
            gateway: PaymentGateway::Upi,
            amount: Money::new(refund.amount, Currency::parse(&refund.currency)?),
            payment_id: refund.payment_id,
            status,
            created_at: from_unix(refund.created_at),
            id: refund.id,
        })
    }

    async fn retrieve_payment(&self, payment_id: &str) -> PaymentResult<PaymentResponse> {
        let payment: UpiPayment = self.client.get(&format!("/payments/{}", payment_id)).await?;
        payment.into_response()
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> PaymentResult<()> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or(SignatureError::MissingSecret)?;
        verify_upi(payload, signature, secret.expose_secret())?;
        Ok(())
    }

    async fn create_customer(&self, request: &CreateCustomerRequest) -> PaymentResult<Customer> {
        if let Some(vpa) = &request.vpa
            && !is_vpa(vpa)
        {
            return Err(PaymentError::Validation(format!("invalid VPA '{}'", vpa)));
        }
        let body = CustomerBody {
            name: request.name.as_deref(),
            email: request.email.as_deref(),
            phone: request.phone.as_deref(),
            vpa: request.vpa.as_deref(),
        };
        let customer: UpiCustomer = self.client.post_json("/customers", &body, None).await?;
        Ok(Customer {
            gateway: PaymentGateway::Upi,
            id: customer.id,
            email: customer.email,
            name: customer.name,
            phone: customer.phone,
            created_at: from_unix(customer.created_at),
        })
    }

    async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> PaymentResult<Subscription> {
        let body = MandateBody {
            customer_id: &request.customer_id,
            plan_id: &request.plan_id,
            quantity: request.quantity,
            total_count: request.total_count,
            metadata: &request.metadata,
        };
        let mandate: UpiMandate = self.client.post_json("/mandates", &body, None).await?;
        Ok(mandate.into())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> PaymentResult<Subscription> {
        let body = serde_json::json!({ "at_period_end": at_period_end });
        let mandate: UpiMandate = self
            .client
            .post_json(&format!("/mandates/{}/revoke", subscription_id), &body, None)
            .await?;
        Ok(mandate.into())
    }
}
