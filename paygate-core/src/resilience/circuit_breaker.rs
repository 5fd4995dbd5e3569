//! Circuit breaker over a sliding window of call outcomes.
//!
//! ## States
//!
//! - **Closed**: calls pass through; every outcome is recorded in the window
//! - **Open**: calls are rejected without running
//! - **Half-Open**: a limited number of trial calls probe for recovery
//!
//! The circuit opens when the window holds `failure_threshold` failures, or
//! when it holds at least `minimum_calls` outcomes and the failure rate
//! reaches `failure_rate_threshold`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use paygate_core::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("stripe-payments")
//!         .failure_threshold(5)
//!         .reset_timeout(Duration::from_secs(30)),
//! );
//!
//! match circuit.call(|| async { provider.retrieve_payment(id).await }).await {
//!     Ok(payment) => Ok(payment),
//!     Err(CircuitBreakerError::Execution(e)) => Err(e),
//!     Err(_) => Err(PaymentError::CircuitOpen(circuit.name().to_string())),
//! }
//! ```

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, testing recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Name of the circuit breaker (for logging).
    pub name: String,
    /// Failures within the window that open the circuit.
    pub failure_threshold: u32,
    /// Failure rate (0.0 - 1.0) within the window that opens the circuit.
    pub failure_rate_threshold: f64,
    /// Outcomes the window must hold before the failure rate is considered.
    pub minimum_calls: u32,
    /// Number of successful requests needed to close the circuit from half-open.
    pub success_threshold: u32,
    /// Time to wait before transitioning from open to half-open.
    pub reset_timeout: Duration,
    /// Number of requests allowed in half-open state.
    pub half_open_requests: u32,
    /// Length of the sliding outcome window.
    pub failure_window: Duration,
    /// Enable automatic open -> half-open transitions.
    pub automatic_transitions: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_requests: 3,
            failure_window: Duration::from_secs(60),
            automatic_transitions: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Same settings under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Set the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the failure rate threshold, clamped to 0.0 - 1.0.
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the minimum number of calls before the rate applies.
    pub fn minimum_calls(mut self, calls: u32) -> Self {
        self.minimum_calls = calls;
        self
    }

    /// Set the success threshold for recovery.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the reset timeout.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the number of half-open requests allowed.
    pub fn half_open_requests(mut self, count: u32) -> Self {
        self.half_open_requests = count;
        self
    }

    /// Set the sliding window length.
    pub fn failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }
}

/// Circuit breaker error.
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, request was rejected.
    Open,
    /// Request was executed but failed.
    Execution(E),
    /// Circuit rejected due to half-open limit.
    HalfOpenLimitReached,
}

impl<E> CircuitBreakerError<E> {
    /// True when the call never ran.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Execution(_))
    }

    /// The operation's own error, if it ran.
    pub fn into_execution(self) -> Option<E> {
        match self {
            Self::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Circuit breaker is open"),
            Self::Execution(e) => write!(f, "Execution failed: {}", e),
            Self::HalfOpenLimitReached => write!(f, "Half-open request limit reached"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

struct CircuitBreakerState {
    state: CircuitState,
    opened_at: Option<Instant>,
    /// (recorded at, was failure)
    outcomes: VecDeque<(Instant, bool)>,
}

impl CircuitBreakerState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&(at, _)) = self.outcomes.front() {
            if now.duration_since(at) > window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn failures(&self) -> u32 {
        self.outcomes.iter().filter(|(_, failed)| *failed).count() as u32
    }
}

/// Circuit breaker for protecting against cascade failures.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<CircuitBreakerState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    half_open_count: AtomicU32,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Arc<Self> {
        info!(
            name = %config.name,
            failure_threshold = config.failure_threshold,
            failure_rate_threshold = config.failure_rate_threshold,
            reset_timeout = ?config.reset_timeout,
            "Circuit breaker initialized"
        );

        Arc::new(Self {
            config,
            inner: RwLock::new(CircuitBreakerState {
                state: CircuitState::Closed,
                opened_at: None,
                outcomes: VecDeque::new(),
            }),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            half_open_count: AtomicU32::new(0),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        })
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open();
        self.inner.read().state
    }

    /// Get the circuit breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Claim a slot for one call, or say why the call is rejected.
    fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        self.maybe_transition_to_half_open();

        let state = self.inner.read().state;
        match state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(CircuitBreakerError::Open),
            CircuitState::HalfOpen => {
                let count = self.half_open_count.fetch_add(1, Ordering::SeqCst);
                if count < self.config.half_open_requests {
                    Ok(())
                } else {
                    Err(CircuitBreakerError::HalfOpenLimitReached)
                }
            }
        }
    }

    /// Check if a request is allowed through the circuit.
    ///
    /// In half-open state this consumes one trial slot.
    pub fn is_allowed(&self) -> bool {
        self.admit::<()>().is_ok()
    }

    /// Execute a function with circuit breaker protection.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Err(rejection) = self.admit() {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            debug!(
                name = %self.config.name,
                state = %self.state(),
                "Circuit breaker rejected request"
            );
            return Err(rejection);
        }

        match f().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Execution(e))
            }
        }
    }

    /// Record a successful operation.
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        let state = self.inner.read().state;

        match state {
            CircuitState::Closed => {
                let now = Instant::now();
                let mut inner = self.inner.write();
                inner.prune(now, self.config.failure_window);
                inner.outcomes.push_back((now, false));
                self.failure_count.store(inner.failures(), Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.close();
                }
            }
            CircuitState::Open => {
                debug!(name = %self.config.name, "Success recorded while circuit open");
            }
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let state = self.inner.read().state;

        match state {
            CircuitState::Closed => {
                let now = Instant::now();
                let mut inner = self.inner.write();
                inner.prune(now, self.config.failure_window);
                inner.outcomes.push_back((now, true));

                let failures = inner.failures();
                let calls = inner.outcomes.len() as u32;
                self.failure_count.store(failures, Ordering::SeqCst);

                if self.should_trip(failures, calls) {
                    drop(inner);
                    self.open();
                }
            }
            CircuitState::HalfOpen => {
                // Any trial failure reopens the circuit
                self.open();
            }
            CircuitState::Open => {}
        }
    }

    fn should_trip(&self, failures: u32, calls: u32) -> bool {
        if failures >= self.config.failure_threshold {
            return true;
        }
        calls > 0
            && calls >= self.config.minimum_calls
            && f64::from(failures) / f64::from(calls) >= self.config.failure_rate_threshold
    }

    fn open(&self) {
        let mut inner = self.inner.write();
        if inner.state != CircuitState::Open {
            warn!(
                name = %self.config.name,
                failures = self.failure_count.load(Ordering::SeqCst),
                window_calls = inner.outcomes.len(),
                "Circuit breaker OPENED"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            self.half_open_count.store(0, Ordering::SeqCst);
            self.success_count.store(0, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        let mut inner = self.inner.write();
        if inner.state != CircuitState::Closed {
            info!(name = %self.config.name, "Circuit breaker CLOSED");
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.outcomes.clear();
            self.failure_count.store(0, Ordering::SeqCst);
            self.success_count.store(0, Ordering::SeqCst);
            self.half_open_count.store(0, Ordering::SeqCst);
        }
    }

    fn maybe_transition_to_half_open(&self) {
        if !self.config.automatic_transitions {
            return;
        }

        let inner = self.inner.read();
        if inner.state != CircuitState::Open {
            return;
        }

        if let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.config.reset_timeout
        {
            drop(inner);

            let mut inner = self.inner.write();
            if inner.state == CircuitState::Open {
                debug!(name = %self.config.name, "Circuit breaker transitioning to HALF-OPEN");
                inner.state = CircuitState::HalfOpen;
                self.half_open_count.store(0, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
            }
        }
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.close();
    }

    /// Manually force the circuit open.
    pub fn force_open(&self) {
        self.open();
    }

    /// Failures currently inside the window.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Successes recorded during the current half-open trial.
    pub fn success_count(&self) -> u32 {
        self.success_count.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Requests rejected without running.
    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let window_calls = self.inner.read().outcomes.len() as u32;
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: self.state(),
            total_requests: self.total_requests(),
            total_successes: self.total_successes(),
            total_failures: self.total_failures(),
            total_rejections: self.total_rejections(),
            current_failure_count: self.failure_count(),
            window_calls,
        }
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    /// Failures in the current window.
    pub current_failure_count: u32,
    /// Outcomes in the current window.
    pub window_calls: u32,
}

impl CircuitBreakerStats {
    /// Calculate success rate (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.total_successes as f64 / self.total_requests as f64
        }
    }

    /// Failure rate within the current window (0.0 - 1.0).
    pub fn window_failure_rate(&self) -> f64 {
        if self.window_calls == 0 {
            0.0
        } else {
            f64::from(self.current_failure_count) / f64::from(self.window_calls)
        }
    }
}
