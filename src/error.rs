//! Composite failure returned by [`Saga::execute`](crate::Saga::execute).

use std::fmt;

use crate::compensation::{CompensationReport, CompensationStatus};
use crate::journal::SagaId;

/// Where a saga execution stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePoint {
    /// A forward action failed, or the context was done before it started.
    Step {
        /// Declaration index of the step.
        index: usize,
        /// Step name.
        name: String,
    },
    /// Every step succeeded but the success callback failed.
    SuccessCallback,
}

impl fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step { index, name } => write!(f, "step {index} ({name})"),
            Self::SuccessCallback => f.write_str("success callback"),
        }
    }
}

/// A failed saga execution.
///
/// `cause` is always the original failure. Compensation failures and a
/// failing failure-callback are carried alongside it, never in its place.
#[derive(Debug, Clone)]
pub struct SagaError<E> {
    pub(crate) saga_id: SagaId,
    pub(crate) failed_at: FailurePoint,
    pub(crate) cause: E,
    pub(crate) compensation: CompensationReport<E>,
    pub(crate) callback_error: Option<E>,
}

impl<E> SagaError<E> {
    /// The saga instance that failed.
    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    /// Where execution stopped.
    pub fn failed_at(&self) -> &FailurePoint {
        &self.failed_at
    }

    /// Name of the failing step, or `None` if the success callback failed.
    pub fn failed_step(&self) -> Option<&str> {
        match &self.failed_at {
            FailurePoint::Step { name, .. } => Some(name),
            FailurePoint::SuccessCallback => None,
        }
    }

    /// The original failure.
    pub fn cause(&self) -> &E {
        &self.cause
    }

    /// Consume the error and return the original failure.
    pub fn into_cause(self) -> E {
        self.cause
    }

    /// Per-step compensation records.
    pub fn compensation(&self) -> &CompensationReport<E> {
        &self.compensation
    }

    /// Summary of the compensation sweep.
    pub fn compensation_status(&self) -> CompensationStatus {
        self.compensation.status()
    }

    /// Error returned by the failure callback, if it ran and failed.
    pub fn callback_error(&self) -> Option<&E> {
        self.callback_error.as_ref()
    }
}

impl<E: fmt::Display> fmt::Display for SagaError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "saga {} failed at {}: {} (compensation {})",
            self.saga_id,
            self.failed_at,
            self.cause,
            self.compensation.status()
        )?;
        if let Some(err) = &self.callback_error {
            write!(f, "; failure callback also failed: {err}")?;
        }
        Ok(())
    }
}

impl<E> std::error::Error for SagaError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
