//! Gateway-neutral request and response types

use crate::{Currency, Money, PaymentError, PaymentGateway, PaymentResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the payer intends to pay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    Upi,
    Netbanking,
    Wallet,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Upi => "upi",
            Self::Netbanking => "netbanking",
            Self::Wallet => "wallet",
        }
    }
}

/// Payment creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Explicit gateway; the factory default applies when absent
    pub gateway: Option<PaymentGateway>,
    pub amount: Money,
    pub method: PaymentMethodType,
    pub customer_id: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Forwarded so a retried create has at most one effect
    pub idempotency_key: Option<String>,
    /// Payer VPA for UPI collect requests
    pub payer_vpa: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: Money, method: PaymentMethodType) -> Self {
        Self {
            gateway: None,
            amount,
            method,
            customer_id: None,
            description: None,
            metadata: HashMap::new(),
            idempotency_key: None,
            payer_vpa: None,
        }
    }

    pub fn gateway(mut self, gateway: PaymentGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn payer_vpa(mut self, vpa: impl Into<String>) -> Self {
        self.payer_vpa = Some(vpa.into());
        self
    }

    /// Checks that hold for every gateway.
    pub fn validate(&self) -> PaymentResult<()> {
        if !self.amount.is_positive() {
            return Err(PaymentError::Validation(format!(
                "amount must be positive (got {})",
                self.amount.amount
            )));
        }
        if let Some(key) = &self.idempotency_key
            && key.trim().is_empty()
        {
            return Err(PaymentError::Validation(
                "idempotency key cannot be blank".into(),
            ));
        }
        if self.method == PaymentMethodType::Upi && self.amount.currency != Currency::INR {
            return Err(PaymentError::Validation(format!(
                "UPI payments must be in INR (got {})",
                self.amount.currency
            )));
        }
        Ok(())
    }
}

/// Lifecycle state of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Pending,
    RequiresAction,
    Authorized,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    /// No further transition happens without a refund.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::Refunded
        )
    }
}

/// A provider's view of a payment at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub gateway: PaymentGateway,
    pub id: String,
    /// Handed to a browser SDK to complete the payment (Stripe)
    pub client_secret: Option<String>,
    /// Order the payment belongs to (Razorpay)
    pub order_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    /// Status string exactly as the provider sent it
    pub provider_status: String,
}

impl PaymentResponse {
    /// A copy carrying a newer status.
    pub fn with_status(&self, status: PaymentStatus, provider_status: impl Into<String>) -> Self {
        Self {
            status,
            provider_status: provider_status.into(),
            ..self.clone()
        }
    }
}

/// Second step of a two-step payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_id: String,
    /// Amount to capture; providers that need one look it up when absent
    pub amount: Option<Money>,
    /// Payment method to confirm with (Stripe)
    pub payment_method: Option<String>,
}

impl ConfirmPaymentRequest {
    pub fn new(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            amount: None,
            payment_method: None,
        }
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }
}

/// Refund request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_id: String,
    /// `None` refunds the full amount
    pub amount: Option<Money>,
    pub reason: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl RefundRequest {
    pub fn new(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            amount: None,
            reason: None,
            metadata: HashMap::new(),
        }
    }

    /// Partial refund
    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> PaymentResult<()> {
        if self.payment_id.trim().is_empty() {
            return Err(PaymentError::Validation("payment id is required".into()));
        }
        if let Some(amount) = &self.amount
            && !amount.is_positive()
        {
            return Err(PaymentError::Validation(format!(
                "refund amount must be positive (got {})",
                amount.amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub gateway: PaymentGateway,
    pub id: String,
    pub payment_id: String,
    pub amount: Money,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub gateway: Option<PaymentGateway>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    /// UPI handle, used by UPI gateways
    pub vpa: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl CreateCustomerRequest {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn gateway(mut self, gateway: PaymentGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn vpa(mut self, vpa: impl Into<String>) -> Self {
        self.vpa = Some(vpa.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub gateway: PaymentGateway,
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Falls back to the gateway that issued `customer_id`
    pub gateway: Option<PaymentGateway>,
    pub customer_id: String,
    /// Price id (Stripe) or plan id (Razorpay, UPI)
    pub plan_id: String,
    pub quantity: Option<u32>,
    /// Billing cycles before the subscription completes (Razorpay)
    pub total_count: Option<u32>,
    pub metadata: HashMap<String, String>,
}

impl CreateSubscriptionRequest {
    pub fn new(customer_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            gateway: None,
            customer_id: customer_id.into(),
            plan_id: plan_id.into(),
            quantity: None,
            total_count: None,
            metadata: HashMap::new(),
        }
    }

    pub fn gateway(mut self, gateway: PaymentGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn total_count(mut self, count: u32) -> Self {
        self.total_count = Some(count);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Created,
    Active,
    Trialing,
    PastDue,
    Paused,
    Canceled,
    Completed,
    Incomplete,
}

impl SubscriptionStatus {
    /// The subscriber currently has service
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub gateway: PaymentGateway,
    pub id: String,
    pub customer_id: Option<String>,
    pub plan_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Provider timestamps are unix seconds; out-of-range values become "now".
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}
