//! # Resilience Patterns
//!
//! - **Circuit Breaker**: fail fast once a dependency keeps failing
//! - **Registry**: process-wide named breakers plus `Option`/default/fallback
//!   call wrappers
//! - **Retry**: repeated attempts with configurable backoff
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use paygate_core::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
//! use std::time::Duration;
//!
//! let registry = CircuitBreakerRegistry::global();
//! registry.configure(
//!     CircuitBreakerConfig::new("razorpay-payments")
//!         .failure_threshold(5)
//!         .reset_timeout(Duration::from_secs(30)),
//! );
//!
//! let order = registry
//!     .execute_with_circuit_breaker("razorpay-payments", || async {
//!         razorpay.create_order(request).await
//!     })
//!     .await;
//! ```

mod circuit_breaker;
mod registry;
mod retry;

pub use circuit_breaker::*;
pub use registry::*;
pub use retry::*;
