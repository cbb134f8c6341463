//! Retry runner: bounded attempts, exponential backoff with jitter, and
//! selective retry by error kind.

use std::future::Future;
use std::sync::Arc;

use crate::context::{ContextError, ExecutionContext};
use crate::policy::RetryPolicy;

/// Errors that belong to a category the retry filter can match on.
///
/// `is_kind` is an equivalence test, not identity: an error wrapping another
/// may override it to report the kinds of its causes as well.
pub trait Classify {
    /// The category type.
    type Kind: PartialEq;

    /// The category of this error.
    fn kind(&self) -> Self::Kind;

    /// Returns `true` if this error counts as `kind`.
    fn is_kind(&self, kind: &Self::Kind) -> bool {
        self.kind() == *kind
    }
}

/// Decides whether a failed attempt may be retried.
pub struct RetryFilter<E> {
    predicate: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
}

impl<E> Clone for RetryFilter<E> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryFilter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.predicate.is_some() {
            "filtered"
        } else {
            "any"
        };
        f.debug_tuple("RetryFilter").field(&mode).finish()
    }
}

impl<E> Default for RetryFilter<E> {
    fn default() -> Self {
        Self::any()
    }
}

impl<E> RetryFilter<E> {
    /// Retry every error.
    pub fn any() -> Self {
        Self { predicate: None }
    }

    /// Retry only errors accepted by `predicate`.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Retry only errors matching one of `kinds`. An empty set retries every error.
    pub fn kinds<I>(kinds: I) -> Self
    where
        E: Classify,
        E::Kind: Send + Sync + 'static,
        I: IntoIterator<Item = E::Kind>,
    {
        let kinds: Vec<E::Kind> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Self::any();
        }
        Self::new(move |err: &E| kinds.iter().any(|kind| err.is_kind(kind)))
    }

    /// Returns `true` if `err` may be retried.
    pub fn allows(&self, err: &E) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(err),
            None => true,
        }
    }
}

/// Runs a fallible operation under a [`RetryPolicy`].
///
/// The context is checked before every attempt and observed during every
/// backoff wait. Exhausting the attempts returns the last operation error
/// unchanged.
#[derive(Debug)]
pub struct RetryRunner<E> {
    policy: RetryPolicy,
    filter: RetryFilter<E>,
}

impl<E> Clone for RetryRunner<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<E> RetryRunner<E> {
    /// A runner that retries every error.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            filter: RetryFilter::any(),
        }
    }

    /// Restrict which errors are retried.
    pub fn with_filter(mut self, filter: RetryFilter<E>) -> Self {
        self.filter = filter;
        self
    }

    /// The policy driving this runner.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts, or `ctx` is done.
    pub async fn run<T, F, Fut>(&self, ctx: &ExecutionContext, mut op: F) -> Result<T, E>
    where
        E: From<ContextError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut backoff = self.policy.backoff();
        let mut attempt: u32 = 0;

        loop {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.filter.allows(&err) {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "retry.non_retryable");

                return Err(err);
            }

            if attempt >= max_attempts {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "retry.exhausted");

                return Err(err);
            }

            let wait = {
                let mut rng = rand::rng();
                self.policy.jittered(backoff.next_base(), &mut rng)
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                "retry.backoff"
            );

            if let Err(cancelled) = ctx.sleep(wait).await {
                return Err(cancelled.into());
            }
        }
    }
}
