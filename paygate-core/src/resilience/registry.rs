//! Named circuit breakers and the call wrappers built on them.
//!
//! A process-wide registry is available through
//! [`CircuitBreakerRegistry::global`]; tests and embedders can also build
//! their own instance. Breakers are created on first use with the
//! registry's default configuration unless [`configure`] installed a named
//! configuration first.
//!
//! [`configure`]: CircuitBreakerRegistry::configure
//!
//! ```rust,ignore
//! use paygate_core::resilience::CircuitBreakerRegistry;
//!
//! let registry = CircuitBreakerRegistry::global();
//! let fee = registry
//!     .execute_with_default("fx-rates", || async { fetch_fee().await }, 0)
//!     .await;
//! ```

use super::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, CircuitState};
use crate::outcome::Fault;
use futures_util::FutureExt;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

static GLOBAL_REGISTRY: Lazy<Arc<CircuitBreakerRegistry>> =
    Lazy::new(|| Arc::new(CircuitBreakerRegistry::new()));

/// Thread-safe map of breaker name to breaker.
pub struct CircuitBreakerRegistry {
    default_config: RwLock<CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::with_default_config(CircuitBreakerConfig::default())
    }

    /// Registry whose lazily created breakers use `config` (renamed).
    pub fn with_default_config(config: CircuitBreakerConfig) -> Self {
        Self {
            default_config: RwLock::new(config),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static CircuitBreakerRegistry {
        GLOBAL_REGISTRY.as_ref()
    }

    /// A shared handle to the process-wide registry.
    pub fn shared() -> Arc<CircuitBreakerRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Replace the configuration used for breakers created from now on.
    pub fn set_default_config(&self, config: CircuitBreakerConfig) {
        *self.default_config.write() = config;
    }

    /// Install a breaker under `config.name`, replacing any existing one.
    pub fn configure(&self, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let name = config.name.clone();
        let breaker = CircuitBreaker::new(config);
        self.breakers.write().insert(name, breaker.clone());
        breaker
    }

    /// Fetch the named breaker, creating it with the default configuration.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(name, "Creating circuit breaker on first use");
                CircuitBreaker::new(self.default_config.read().renamed(name))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut stats: Vec<CircuitBreakerStats> = breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// True only while the named breaker is Closed. Half-open counts as
    /// not closed; unknown names are created (and therefore closed).
    pub fn is_circuit_closed(&self, name: &str) -> bool {
        self.get_or_create(name).state() == CircuitState::Closed
    }

    /// Run `op` through the named breaker, keeping the breaker's own error
    /// structure so callers can tell a rejection from a failed call.
    pub async fn try_execute<F, Fut, T, E>(
        &self,
        name: &str,
        op: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_create(name).call(op).await
    }

    /// Run `op` through the named breaker. Any failure, including a
    /// rejection or a panic, is logged and becomes `None`.
    pub async fn execute_with_circuit_breaker<F, Fut, T, E>(&self, name: &str, op: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let breaker = self.get_or_create(name);
        match guarded_call(&breaker, op).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(breaker = name, error = %e, "Circuit breaker call failed");
                None
            }
        }
    }

    /// Like [`execute_with_circuit_breaker`](Self::execute_with_circuit_breaker)
    /// but the call runs as its own tokio task. The returned handle can be
    /// awaited or dropped; dropping it does not cancel the call.
    pub fn execute_async_with_circuit_breaker<F, Fut, T, E>(
        &self,
        name: &str,
        op: F,
    ) -> BreakerTask<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(breaker = name, error = %e, "No tokio runtime for async circuit breaker call");
                return BreakerTask {
                    name: name.to_string(),
                    handle: None,
                };
            }
        };

        let breaker = self.get_or_create(name);
        let handle = runtime.spawn(async move {
            match guarded_call(&breaker, op).await {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(breaker = breaker.name(), error = %e, "Async circuit breaker call failed");
                    None
                }
            }
        });
        BreakerTask {
            name: name.to_string(),
            handle: Some(handle),
        }
    }

    /// Run `primary` through the named breaker and fall back to `fallback`
    /// when it fails or is rejected. The fallback's own error is returned.
    pub async fn execute_with_fallback<P, PFut, F, FFut, T, E>(
        &self,
        name: &str,
        primary: P,
        fallback: F,
    ) -> Result<T, E>
    where
        P: FnOnce() -> PFut,
        PFut: Future<Output = Result<T, E>>,
        F: FnOnce() -> FFut,
        FFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let breaker = self.get_or_create(name);
        match guarded_call(&breaker, primary).await {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(breaker = name, error = %e, "Primary operation failed, using fallback");
                fallback().await.inspect_err(|e| {
                    warn!(breaker = name, error = %e, "Fallback operation failed");
                })
            }
        }
    }

    /// Run `op` through the named breaker, returning `default` on any failure.
    pub async fn execute_with_default<F, Fut, T, E>(&self, name: &str, op: F, default: T) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with_circuit_breaker(name, op)
            .await
            .unwrap_or(default)
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts a panic inside `op` as a breaker failure instead of unwinding.
async fn guarded_call<F, Fut, T, E>(
    breaker: &CircuitBreaker,
    op: F,
) -> Result<T, CircuitBreakerError<Fault>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    breaker
        .call(|| async move {
            match AssertUnwindSafe(op()).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(Fault::Error(e.to_string())),
                Err(payload) => Err(Fault::from_panic(payload)),
            }
        })
        .await
}

/// Handle to a call started by
/// [`CircuitBreakerRegistry::execute_async_with_circuit_breaker`].
///
/// Resolves to `None` when the call failed, was rejected, its task died or
/// no runtime was available to start it.
pub struct BreakerTask<T> {
    name: String,
    handle: Option<JoinHandle<Option<T>>>,
}

impl<T> BreakerTask<T> {
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl<T> Future for BreakerTask<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(handle) = self.handle.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(e)) => {
                warn!(breaker = %self.name, error = %e, "Circuit breaker task aborted");
                Poll::Ready(None)
            }
        }
    }
}
