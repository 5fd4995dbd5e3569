//! Payment gateway dispatch for Paygate
//!
//! One API over Razorpay, Stripe and UPI, with circuit breaking, retries
//! for reads and webhook verification.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    PaymentGatewayFactory                      │
//! │  create | confirm | refund | retrieve | customer | subscribe │
//! └──────────────────────────────────────────────────────────────┘
//!        │ explicit gateway / default        │ id prefix
//!        ▼                                   ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │        circuit breaker "<gateway>-payments" (+ retry)         │
//! └──────────────────────────────────────────────────────────────┘
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//!  ┌───────────┐     ┌───────────┐     ┌───────────┐
//!  │ Razorpay  │     │  Stripe   │     │    UPI    │
//!  └───────────┘     └───────────┘     └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use paygate_payments::{Money, PaymentGatewayFactory, PaymentMethodType, PaymentRequest, RefundRequest};
//!
//! let factory = PaymentGatewayFactory::from_settings(&settings)?;
//!
//! let payment = factory
//!     .create_payment(
//!         PaymentRequest::new(Money::inr(49_900), PaymentMethodType::Upi)
//!             .payer_vpa("alice@okaxis")
//!             .idempotency_key("order-1042"),
//!     )
//!     .await?;
//!
//! // Ids carry their gateway; no hint needed.
//! let latest = factory.retrieve_payment(&payment.id).await?;
//!
//! // Refunds run in the background.
//! let refund = factory.process_refund(RefundRequest::new(&payment.id))?.await?;
//! ```

pub mod error;
pub mod factory;
pub mod gateway;
pub mod money;
pub mod provider;
pub mod providers;
pub mod types;
pub mod webhook;

pub use error::*;
pub use factory::{PaymentGatewayFactory, RefundTask};
pub use gateway::PaymentGateway;
pub use money::{Currency, Money};
pub use provider::{PaymentProvider, ProviderAuth, ProviderClient};
pub use types::*;
pub use webhook::{
    InMemoryAuditSink, WebhookAuditRecord, WebhookAuditSink, WebhookEvent, WebhookEventKind,
    WebhookReceiver,
};

#[cfg(feature = "razorpay")]
pub use providers::RazorpayProvider;
#[cfg(feature = "stripe")]
pub use providers::StripeProvider;
#[cfg(feature = "upi")]
pub use providers::UpiProvider;

pub mod prelude {
    pub use crate::error::{ErrorKind, PaymentError, PaymentResult};
    pub use crate::factory::{PaymentGatewayFactory, RefundTask};
    pub use crate::gateway::PaymentGateway;
    pub use crate::money::{Currency, Money};
    pub use crate::provider::PaymentProvider;
    pub use crate::types::*;
    pub use crate::webhook::{WebhookEvent, WebhookReceiver};
}
