// Paygate - payment gateway dispatch for Razorpay, Stripe and UPI
//
// This crate ties the workspace together: settings, the internal API-key
// gate, the gateway factory and the webhook receiver.

mod bootstrap;

pub use bootstrap::{Paygate, PaygateError};

// Re-export the member crates
pub use paygate_auth;
pub use paygate_config;
pub use paygate_core;
pub use paygate_log;
pub use paygate_payments;

// Prelude for common imports
pub mod prelude {
    pub use crate::{Paygate, PaygateError};

    pub use paygate_auth::{API_KEY_HEADER, InternalApiKeyFilter, ServicePrincipal};
    pub use paygate_config::{ConfigService, PaygateSettings};
    pub use paygate_core::{
        HttpRequest, HttpResponse, Middleware, MiddlewareChain,
        resilience::{CircuitBreakerRegistry, RetryConfig},
    };
    pub use paygate_payments::prelude::*;
    pub use paygate_payments::webhook::{InMemoryAuditSink, LogAuditSink, WebhookAuditSink};
}
