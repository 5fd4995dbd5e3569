//! Helpers for turning fallible work into plain `Result` values.
//!
//! [`try_execute`] and [`try_execute_async`] capture both returned errors
//! and panics as a [`Fault`], so a caller always gets a value back.
//! [`combine`], [`validate`] and [`validate_all`] compose results.
//!
//! ```rust
//! use paygate_core::outcome::{validate_all, Rule};
//!
//! let rules = vec![
//!     Rule::new(|amount: &i64| *amount > 0, "amount must be positive"),
//!     Rule::new(|amount: &i64| *amount <= 1_000_000, "amount exceeds limit"),
//! ];
//!
//! assert_eq!(validate_all(500, &rules), Ok(500));
//! assert_eq!(validate_all(-1, &rules), Err(vec!["amount must be positive".to_string()]));
//! ```

use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// A captured failure: either a returned error or a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The operation returned `Err`.
    Error(String),
    /// The operation panicked.
    Panic(String),
}

impl Fault {
    pub fn message(&self) -> &str {
        match self {
            Fault::Error(msg) | Fault::Panic(msg) => msg,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Fault::Panic(_))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "operation panicked".to_string()
        };
        Fault::Panic(msg)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for Fault {}

/// Run `op`, converting an `Err` or a panic into a logged [`Fault`].
pub fn try_execute<T, E, F>(op: F) -> Result<T, Fault>
where
    F: FnOnce() -> Result<T, E>,
    E: fmt::Display,
{
    let fault = match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => Fault::Error(e.to_string()),
        Err(payload) => Fault::from_panic(payload),
    };
    warn!(panic = fault.is_panic(), error = %fault, "Operation failed");
    Err(fault)
}

/// Alias of [`try_execute`] for call sites that read better as a verb.
pub fn safely<T, E, F>(op: F) -> Result<T, Fault>
where
    F: FnOnce() -> Result<T, E>,
    E: fmt::Display,
{
    try_execute(op)
}

/// Async counterpart of [`try_execute`]. A panic while polling `fut` is
/// captured the same way.
pub async fn try_execute_async<T, E, Fut>(fut: Fut) -> Result<T, Fault>
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let fault = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => Fault::Error(e.to_string()),
        Err(payload) => Fault::from_panic(payload),
    };
    warn!(panic = fault.is_panic(), error = %fault, "Async operation failed");
    Err(fault)
}

/// Pair two already computed results. The first failure wins, checking
/// `first` before `second`.
pub fn combine<A, B, E>(first: Result<A, E>, second: Result<B, E>) -> Result<(A, B), E> {
    Ok((first?, second?))
}

/// `Ok(value)` when `predicate` holds, else `Err(message)`.
pub fn validate<T, P>(value: T, predicate: P, message: impl Into<String>) -> Result<T, String>
where
    P: FnOnce(&T) -> bool,
{
    if predicate(&value) {
        Ok(value)
    } else {
        Err(message.into())
    }
}

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A named predicate used by [`validate_all`].
pub struct Rule<T> {
    predicate: Predicate<T>,
    message: String,
}

impl<T> Rule<T> {
    pub fn new<F>(predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            message: message.into(),
        }
    }

    pub fn check(&self, value: &T) -> bool {
        (self.predicate)(value)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl<T> Clone for Rule<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            message: self.message.clone(),
        }
    }
}

impl<T> fmt::Debug for Rule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("message", &self.message).finish()
    }
}

/// Evaluate every rule (no short-circuit) and collect one message per
/// failing rule, in rule order.
pub fn validate_all<T>(value: T, rules: &[Rule<T>]) -> Result<T, Vec<String>> {
    let errors: Vec<String> = rules
        .iter()
        .filter(|rule| !rule.check(&value))
        .map(|rule| rule.message.clone())
        .collect();

    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_try_execute_success() {
        let result = try_execute(|| Ok::<_, String>(7));
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_try_execute_captures_error() {
        let result: Result<i32, Fault> = try_execute(|| Err("declined"));
        assert_eq!(result, Err(Fault::Error("declined".to_string())));
    }

    #[test]
    fn test_try_execute_captures_panic() {
        let result: Result<i32, Fault> = safely(|| -> Result<i32, String> { panic!("boom") });

        let fault = result.unwrap_err();
        assert!(fault.is_panic());
        assert_eq!(fault.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_try_execute_async() {
        let ok = try_execute_async(async { Ok::<_, String>("done") }).await;
        assert_eq!(ok, Ok("done"));

        let err: Result<(), Fault> = try_execute_async(async { Err("timeout") }).await;
        assert_eq!(err, Err(Fault::Error("timeout".to_string())));

        async fn explode() -> Result<(), String> {
            panic!("async boom")
        }

        let panicked = try_execute_async(explode()).await;
        assert_eq!(panicked, Err(Fault::Panic("async boom".to_string())));
    }

    #[test]
    fn test_combine_truth_table() {
        let ok1: Result<i32, &str> = Ok(1);
        let ok2: Result<&str, &str> = Ok("b");
        assert_eq!(combine(ok1, ok2), Ok((1, "b")));

        assert_eq!(combine(Err::<i32, _>("e1"), Ok::<i32, _>(2)), Err("e1"));
        assert_eq!(combine(Ok::<i32, _>(1), Err::<i32, _>("e2")), Err("e2"));
        assert_eq!(combine(Err::<i32, _>("e1"), Err::<i32, _>("e2")), Err("e1"));
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(5, |v| *v > 0, "must be positive"), Ok(5));
        assert_eq!(
            validate(0, |v| *v > 0, "must be positive"),
            Err("must be positive".to_string())
        );
    }

    #[test]
    fn test_validate_all_reports_every_failure() {
        let evaluated = Arc::new(AtomicU32::new(0));
        let counter = |msg: &'static str, pass: bool| {
            let evaluated = evaluated.clone();
            Rule::new(
                move |_: &&str| {
                    evaluated.fetch_add(1, Ordering::SeqCst);
                    pass
                },
                msg,
            )
        };

        let rules = vec![
            counter("first", false),
            counter("second", true),
            counter("third", false),
        ];

        let result = validate_all("input", &rules);
        assert_eq!(result, Err(vec!["first".to_string(), "third".to_string()]));
        assert_eq!(evaluated.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_validate_all_empty_rules() {
        assert_eq!(validate_all(10, &[]), Ok(10));
    }
}
