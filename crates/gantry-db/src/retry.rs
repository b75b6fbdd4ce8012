//! Bounded retry of transient failures.
//!
//! [`RetryPolicy::run`] is a plain loop: an error is retried only when
//! [`is_transient`] says so, and once the budget is spent the last error is
//! returned exactly as the backend produced it.

use std::time::Duration;

use tracing::warn;

use crate::errors::{Result, is_transient};

/// Default retry budget.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// How many times to retry a transient failure, and how long to wait between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts are `budget + 1`.
    pub budget: u32,
    /// Fixed pause before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: DEFAULT_RETRY_BUDGET,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            budget: 0,
            delay: Duration::ZERO,
        }
    }

    /// Run `op`, retrying transient failures. `on_retry` is called before
    /// each retry with the 1-based retry number.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T>,
        mut on_retry: impl FnMut(u32),
    ) -> Result<T> {
        let mut remaining = self.budget;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if remaining > 0 && is_transient(&err) => {
                    remaining -= 1;
                    let attempt = self.budget - remaining;
                    warn!(attempt, remaining, error = %err, "transient database failure, retrying");
                    on_retry(attempt);
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DbError;
    use crate::errors::tests::busy;
    use std::cell::Cell;

    fn retry<T>(policy: &RetryPolicy, op: impl FnMut() -> Result<T>) -> Result<T> {
        policy.run(op, |_| {})
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let retries = Cell::new(0);
        let policy = RetryPolicy::default();
        let result = policy.run(
            || {
                calls.set(calls.get() + 1);
                if calls.get() <= 3 { Err(busy()) } else { Ok(42) }
            },
            |_| retries.set(retries.get() + 1),
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 4);
        assert_eq!(retries.get(), 3);
    }

    #[test]
    fn exhausted_budget_returns_original_error() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            budget: 2,
            delay: Duration::ZERO,
        };
        let result: Result<()> = retry(&policy, || {
            calls.set(calls.get() + 1);
            Err(busy())
        });
        assert_eq!(calls.get(), 3);
        let err = result.unwrap_err();
        assert!(is_transient(&err));
        assert!(err.to_string().contains("database is locked"));
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = retry(&RetryPolicy::default(), || {
            calls.set(calls.get() + 1);
            Err(DbError::MalformedCall("nope".into()))
        });
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(DbError::MalformedCall(_))));
    }

    #[test]
    fn zero_budget_runs_once() {
        let calls = Cell::new(0);
        let result: Result<()> = retry(&RetryPolicy::none(), || {
            calls.set(calls.get() + 1);
            Err(busy())
        });
        assert_eq!(calls.get(), 1);
        assert!(result.is_err());
    }

    #[test]
    fn retry_numbers_are_sequential() {
        let seen = std::cell::RefCell::new(Vec::new());
        let calls = Cell::new(0);
        let _ = RetryPolicy::default().run(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 { Err(busy()) } else { Ok(()) }
            },
            |n| seen.borrow_mut().push(n),
        );
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }
}
