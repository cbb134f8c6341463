//! Steps: named forward actions with optional compensation.
//!
//! A [`Step`] bundles behaviour supplied by the caller; it holds no saga
//! state. Actions are anything implementing [`Action`], which includes
//! closures of the form `|ctx: ExecutionContext| async move { .. }`.

use std::future::Future;
use std::sync::Arc;

use crate::context::{ContextError, ExecutionContext};
use crate::policy::RetryPolicy;
use crate::retry::{RetryFilter, RetryRunner};

/// A fallible unit of work run against an execution context.
///
/// Used for forward actions, compensations and the success callback.
#[async_trait::async_trait]
pub trait Action<E>: Send + Sync {
    /// Run the action.
    async fn call(&self, ctx: &ExecutionContext) -> Result<(), E>;
}

#[async_trait::async_trait]
impl<E, F, Fut> Action<E> for F
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
{
    async fn call(&self, ctx: &ExecutionContext) -> Result<(), E> {
        (self)(ctx.clone()).await
    }
}

/// Callback invoked with the primary cause when a saga fails.
#[async_trait::async_trait]
pub trait FailureHook<E>: Send + Sync {
    /// Run the hook.
    async fn call(&self, ctx: &ExecutionContext, cause: &E) -> Result<(), E>;
}

#[async_trait::async_trait]
impl<E, F, Fut> FailureHook<E> for F
where
    F: Fn(ExecutionContext, E) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn call(&self, ctx: &ExecutionContext, cause: &E) -> Result<(), E> {
        (self)(ctx.clone(), cause.clone()).await
    }
}

/// Forward action wrapped in a [`RetryRunner`].
struct Retrying<E> {
    inner: Arc<dyn Action<E>>,
    runner: RetryRunner<E>,
}

#[async_trait::async_trait]
impl<E> Action<E> for Retrying<E>
where
    E: From<ContextError> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &ExecutionContext) -> Result<(), E> {
        self.runner.run(ctx, || self.inner.call(ctx)).await
    }
}

/// A named forward action with an optional compensation.
///
/// Names are for diagnostics only and need not be unique.
pub struct Step<E> {
    name: String,
    /// The caller's action, never wrapped.
    action: Arc<dyn Action<E>>,
    /// What the coordinator runs: `action`, or `action` under a runner.
    forward: Arc<dyn Action<E>>,
    compensate: Option<Arc<dyn Action<E>>>,
    retryable: bool,
}

impl<E> Clone for Step<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            action: self.action.clone(),
            forward: self.forward.clone(),
            compensate: self.compensate.clone(),
            retryable: self.retryable,
        }
    }
}

impl<E> std::fmt::Debug for Step<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("compensable", &self.compensate.is_some())
            .field("retryable", &self.retryable)
            .finish()
    }
}

impl<E> Step<E>
where
    E: Send + Sync + 'static,
{
    /// Create a step with no compensation.
    pub fn new<A>(name: impl Into<String>, forward: A) -> Self
    where
        A: Action<E> + 'static,
    {
        let action: Arc<dyn Action<E>> = Arc::new(forward);
        Self {
            name: name.into(),
            forward: action.clone(),
            action,
            compensate: None,
            retryable: false,
        }
    }

    /// Attach the action that undoes this step's forward action.
    pub fn with_compensation<A>(mut self, compensate: A) -> Self
    where
        A: Action<E> + 'static,
    {
        self.compensate = Some(Arc::new(compensate));
        self
    }

    /// Retry the forward action under `policy`, for any error.
    ///
    /// Compensation is never retried.
    pub fn with_retry(self, policy: RetryPolicy) -> Self
    where
        E: From<ContextError>,
    {
        self.with_runner(RetryRunner::new(policy))
    }

    /// Retry the forward action under `policy`, only for errors `filter` allows.
    pub fn with_retry_filtered(self, policy: RetryPolicy, filter: RetryFilter<E>) -> Self
    where
        E: From<ContextError>,
    {
        self.with_runner(RetryRunner::new(policy).with_filter(filter))
    }

    /// Run the forward action under `runner`.
    ///
    /// Replaces any runner set earlier; runners never nest.
    pub fn with_runner(mut self, runner: RetryRunner<E>) -> Self
    where
        E: From<ContextError>,
    {
        self.forward = Arc::new(Retrying {
            inner: self.action.clone(),
            runner,
        });
        self.retryable = true;
        self
    }
}

impl<E> Step<E> {
    /// The diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if a compensation handler is attached.
    pub fn has_compensation(&self) -> bool {
        self.compensate.is_some()
    }

    /// Returns `true` if the forward action runs under a retry policy.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub(crate) async fn forward(&self, ctx: &ExecutionContext) -> Result<(), E> {
        self.forward.call(ctx).await
    }

    pub(crate) fn compensation(&self) -> Option<&dyn Action<E>> {
        self.compensate.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Flake {
        Again,
        Context(ContextError),
    }

    impl From<ContextError> for Flake {
        fn from(err: ContextError) -> Self {
            Self::Context(err)
        }
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(attempts)
            .initial_interval(Duration::from_millis(1))
            .jitter(0.0)
            .build()
            .expect("valid policy")
    }

    #[test]
    fn builder_flags() {
        let step = Step::<Flake>::new("a", |_ctx: ExecutionContext| async { Ok(()) });
        assert_eq!(step.name(), "a");
        assert!(!step.has_compensation());
        assert!(!step.is_retryable());

        let step = step
            .with_compensation(|_ctx: ExecutionContext| async { Ok(()) })
            .with_retry(quick(2));
        assert!(step.has_compensation());
        assert!(step.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_wraps_forward_only() {
        let forward_calls = Arc::new(AtomicU32::new(0));
        let compensate_calls = Arc::new(AtomicU32::new(0));

        let fc = forward_calls.clone();
        let cc = compensate_calls.clone();
        let step = Step::new("flaky", move |_ctx: ExecutionContext| {
            let fc = fc.clone();
            async move {
                if fc.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Flake::Again)
                } else {
                    Ok(())
                }
            }
        })
        .with_compensation(move |_ctx: ExecutionContext| {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err(Flake::Again)
            }
        })
        .with_retry(quick(5));

        let ctx = ExecutionContext::new();
        assert_eq!(step.forward(&ctx).await, Ok(()));
        assert_eq!(forward_calls.load(Ordering::SeqCst), 3);

        let compensate = step.compensation().expect("handler attached");
        assert_eq!(compensate.call(&ctx).await, Err(Flake::Again));
        assert_eq!(compensate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_retry_replaces_earlier_one() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let step = Step::new("down", move |_ctx: ExecutionContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Flake::Again)
            }
        })
        .with_retry(quick(3))
        .with_retry(quick(2));

        assert_eq!(step.forward(&ExecutionContext::new()).await, Err(Flake::Again));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(step.is_retryable());
    }
}
