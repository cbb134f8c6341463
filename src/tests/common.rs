//! Common types and action factories for tests.
//!
//! This module contains:
//! - `LedgerError`: The error type used by every test saga
//! - `Ledger`: A shared, ordered record of every action invocation
//! - Factories producing forward actions, compensations and callbacks

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{Action, Classify, ContextError, ExecutionContext, FailureHook, RetryPolicy, Step};

// ============================================================================
// Error Type
// ============================================================================

/// Errors produced by test actions.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum LedgerError {
    /// A forward action refused to run.
    #[error("step {0} rejected")]
    Rejected(&'static str),

    /// Transient error that may succeed on retry.
    #[error("transient failure")]
    Transient,

    /// A compensation handler failed.
    #[error("compensation of {0} failed")]
    Compensation(&'static str),

    /// A callback failed.
    #[error("callback failed")]
    Callback,

    /// The execution context was done.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Categories of [`LedgerError`] for retry filtering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LedgerKind {
    Rejected,
    Transient,
    Compensation,
    Callback,
    Context,
}

impl Classify for LedgerError {
    type Kind = LedgerKind;

    fn kind(&self) -> LedgerKind {
        match self {
            Self::Rejected(_) => LedgerKind::Rejected,
            Self::Transient => LedgerKind::Transient,
            Self::Compensation(_) => LedgerKind::Compensation,
            Self::Callback => LedgerKind::Callback,
            Self::Context(_) => LedgerKind::Context,
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Ordered record of action invocations, shared by every action of a saga.
#[derive(Clone, Default)]
pub struct Ledger {
    events: Arc<Mutex<Vec<String>>>,
}

impl Ledger {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Events starting with `prefix`, e.g. `"undo:"`.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Forward action that succeeds.
    pub fn ok(&self, name: &'static str) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        move |_ctx: ExecutionContext| {
            let ledger = ledger.clone();
            async move {
                ledger.record(format!("do:{name}"));
                Ok::<_, LedgerError>(())
            }
        }
    }

    /// Forward action that fails with [`LedgerError::Rejected`].
    pub fn fail(&self, name: &'static str) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        move |_ctx: ExecutionContext| {
            let ledger = ledger.clone();
            async move {
                ledger.record(format!("do:{name}"));
                Err::<(), _>(LedgerError::Rejected(name))
            }
        }
    }

    /// Forward action that fails transiently `failures` times, then succeeds.
    pub fn flaky(&self, name: &'static str, failures: u32) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        let remaining = Arc::new(AtomicU32::new(failures));
        move |_ctx: ExecutionContext| {
            let ledger = ledger.clone();
            let remaining = remaining.clone();
            async move {
                ledger.record(format!("do:{name}"));
                if remaining.load(Ordering::SeqCst) > 0 {
                    remaining.fetch_sub(1, Ordering::SeqCst);
                    return Err(LedgerError::Transient);
                }
                Ok(())
            }
        }
    }

    /// Forward action that succeeds after cancelling its own context.
    pub fn cancelling(&self, name: &'static str) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        move |ctx: ExecutionContext| {
            let ledger = ledger.clone();
            async move {
                ledger.record(format!("do:{name}"));
                ctx.cancel();
                Ok::<_, LedgerError>(())
            }
        }
    }

    /// Forward action that takes `duration` to succeed.
    pub fn slow(
        &self,
        name: &'static str,
        duration: Duration,
    ) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        move |_ctx: ExecutionContext| {
            let ledger = ledger.clone();
            async move {
                ledger.record(format!("do:{name}"));
                tokio::time::sleep(duration).await;
                Ok::<_, LedgerError>(())
            }
        }
    }

    /// Compensation that succeeds.
    pub fn undo(&self, name: &'static str) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        move |_ctx: ExecutionContext| {
            let ledger = ledger.clone();
            async move {
                ledger.record(format!("undo:{name}"));
                Ok::<_, LedgerError>(())
            }
        }
    }

    /// Compensation that fails with [`LedgerError::Compensation`].
    pub fn undo_fail(&self, name: &'static str) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        move |_ctx: ExecutionContext| {
            let ledger = ledger.clone();
            async move {
                ledger.record(format!("undo:{name}"));
                Err::<(), _>(LedgerError::Compensation(name))
            }
        }
    }

    /// Success callback recording `success`, failing if `fail` is set.
    pub fn on_success(&self, fail: bool) -> impl Action<LedgerError> + 'static {
        let ledger = self.clone();
        move |_ctx: ExecutionContext| {
            let ledger = ledger.clone();
            async move {
                ledger.record("success");
                if fail {
                    Err(LedgerError::Callback)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Failure callback recording `failure:<cause>`, failing if `fail` is set.
    pub fn on_failure(&self, fail: bool) -> impl FailureHook<LedgerError> + 'static {
        let ledger = self.clone();
        move |_ctx: ExecutionContext, cause: LedgerError| {
            let ledger = ledger.clone();
            async move {
                ledger.record(format!("failure:{cause}"));
                if fail {
                    Err(LedgerError::Callback)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// A step that succeeds and compensates cleanly.
    pub fn step(&self, name: &'static str) -> Step<LedgerError> {
        Step::new(name, self.ok(name)).with_compensation(self.undo(name))
    }
}

/// Deterministic policy with a 10ms initial wait.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .initial_interval(Duration::from_millis(10))
        .max_interval(Duration::from_secs(1))
        .multiplier(2.0)
        .jitter(0.0)
        .build()
        .expect("valid policy")
}

pub fn names(saga: &crate::Saga<LedgerError>) -> Vec<String> {
    saga.executed().map(str::to_owned).collect()
}
