//! The saga coordinator.
//!
//! A [`Saga`] runs its steps in declaration order. When a forward action
//! fails, or the success callback fails after every step succeeded, the
//! steps that already executed are compensated in reverse order and a
//! single [`SagaError`] describes what happened.
//!
//! Construct a fresh saga per logical transaction. Calling
//! [`Saga::execute`] again on the same instance re-runs every step from the
//! start and is not a supported way to resume.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compensation::compensate_executed;
use crate::context::{ContextError, ExecutionContext};
use crate::error::{FailurePoint, SagaError};
use crate::journal::{Journal, SagaId, StepPhase, StepStatus, StepTiming};
use crate::policy::RetryPolicy;
use crate::retry::RetryFilter;
use crate::step::{Action, FailureHook, Step};

/// Lifecycle of a saga execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SagaState {
    /// Built but not yet executed.
    #[default]
    Pending,
    /// Forward actions, compensation or callbacks are in progress.
    Running,
    /// Every step and the success callback succeeded.
    Succeeded,
    /// Execution failed; compensation has run.
    Failed,
}

/// Ordered steps with compensation and terminal callbacks.
pub struct Saga<E> {
    id: SagaId,
    steps: Vec<Step<E>>,
    executed: Vec<usize>,
    on_success: Option<Arc<dyn Action<E>>>,
    on_failure: Option<Arc<dyn FailureHook<E>>>,
    state: SagaState,
    journal: Journal,
}

impl<E> std::fmt::Debug for Saga<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saga")
            .field("id", &self.id)
            .field("steps", &self.steps)
            .field("executed", &self.executed)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<E> Default for Saga<E> {
    fn default() -> Self {
        Self {
            id: SagaId::new(),
            steps: Vec::new(),
            executed: Vec::new(),
            on_success: None,
            on_failure: None,
            state: SagaState::Pending,
            journal: Journal::default(),
        }
    }
}

impl<E> Saga<E> {
    /// Create an empty saga.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier used in logs and errors.
    pub fn id(&self) -> SagaId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Number of declared steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if no steps were declared.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Declared steps, in order.
    pub fn steps(&self) -> &[Step<E>] {
        &self.steps
    }

    /// Names of the steps whose forward action succeeded in the last
    /// execution, in execution order.
    pub fn executed(&self) -> impl Iterator<Item = &str> {
        self.executed.iter().map(|&i| self.steps[i].name())
    }

    /// Timing records of the last execution.
    pub fn journal(&self) -> &[StepTiming] {
        self.journal.entries()
    }
}

impl<E> Saga<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Append a step.
    pub fn add_step(&mut self, step: Step<E>) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Append a step without compensation.
    pub fn step<A>(&mut self, name: impl Into<String>, forward: A) -> &mut Self
    where
        A: Action<E> + 'static,
    {
        self.add_step(Step::new(name, forward))
    }

    /// Append a step with a compensation handler.
    pub fn compensable_step<A, C>(
        &mut self,
        name: impl Into<String>,
        forward: A,
        compensate: C,
    ) -> &mut Self
    where
        A: Action<E> + 'static,
        C: Action<E> + 'static,
    {
        self.add_step(Step::new(name, forward).with_compensation(compensate))
    }

    /// Append a step whose forward action is retried under `policy`.
    pub fn retryable_step(&mut self, step: Step<E>, policy: RetryPolicy) -> &mut Self
    where
        E: From<ContextError>,
    {
        self.add_step(step.with_retry(policy))
    }

    /// Append a step whose forward action is retried for errors `filter` allows.
    pub fn retryable_step_filtered(
        &mut self,
        step: Step<E>,
        policy: RetryPolicy,
        filter: RetryFilter<E>,
    ) -> &mut Self
    where
        E: From<ContextError>,
    {
        self.add_step(step.with_retry_filtered(policy, filter))
    }

    /// Run `callback` after every step succeeded.
    ///
    /// If it fails, every executed step is compensated and the execution fails.
    pub fn on_success<A>(&mut self, callback: A) -> &mut Self
    where
        A: Action<E> + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Run `hook` with the primary cause after compensation.
    pub fn on_failure<H>(&mut self, hook: H) -> &mut Self
    where
        H: FailureHook<E> + 'static,
    {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    /// Execute all steps, compensating on failure.
    pub async fn execute(&mut self, ctx: &ExecutionContext) -> Result<(), SagaError<E>>
    where
        E: From<ContextError>,
    {
        self.executed.clear();
        self.journal.clear();
        self.state = SagaState::Running;

        #[cfg(feature = "tracing")]
        tracing::info!(saga_id = %self.id, steps = self.steps.len(), "saga.start");

        for index in 0..self.steps.len() {
            let step = &self.steps[index];

            // Checked before each step; a running step is never interrupted here.
            let result = match ctx.err() {
                Some(err) => Err(E::from(err)),
                None => {
                    self.journal.start(index, step.name(), StepPhase::Forward);

                    #[cfg(feature = "tracing")]
                    tracing::info!(saga_id = %self.id, step = index, name = step.name(), "step.start");

                    let result = step.forward(ctx).await;
                    let status = if result.is_ok() {
                        StepStatus::Completed
                    } else {
                        StepStatus::Failed
                    };
                    self.journal.end(status);
                    result
                }
            };

            match result {
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(saga_id = %self.id, step = index, outcome = "completed", "step.end");

                    self.executed.push(index);
                }
                Err(cause) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(saga_id = %self.id, step = index, outcome = "failed", "step.end");

                    let failed_at = FailurePoint::Step {
                        index,
                        name: step.name().to_owned(),
                    };
                    return Err(self.abort(ctx, failed_at, cause).await);
                }
            }
        }

        if let Some(callback) = self.on_success.clone() {
            if let Err(cause) = callback.call(ctx).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(saga_id = %self.id, "saga.success_callback_failed");

                return Err(self.abort(ctx, FailurePoint::SuccessCallback, cause).await);
            }
        }

        self.state = SagaState::Succeeded;

        #[cfg(feature = "tracing")]
        tracing::info!(saga_id = %self.id, outcome = "succeeded", "saga.end");

        Ok(())
    }

    /// Compensate, run the failure hook and assemble the composite error.
    async fn abort(
        &mut self,
        ctx: &ExecutionContext,
        failed_at: FailurePoint,
        cause: E,
    ) -> SagaError<E> {
        let compensation = compensate_executed(
            &self.steps,
            &self.executed,
            ctx,
            &mut self.journal,
            self.id,
        )
        .await;

        let callback_error = match self.on_failure.clone() {
            Some(hook) => hook.call(ctx, &cause).await.err(),
            None => None,
        };

        self.state = SagaState::Failed;

        #[cfg(feature = "tracing")]
        tracing::error!(
            saga_id = %self.id,
            failed_at = %failed_at,
            compensation = %compensation.status(),
            callback_failed = callback_error.is_some(),
            "saga.end"
        );

        SagaError {
            saga_id: self.id,
            failed_at,
            cause,
            compensation,
            callback_error,
        }
    }
}
