#![deny(missing_docs)]

//! Saga coordinator: sequential compensating transactions with retry.
//!
//! # Design Goals
//!
//! - **Strict ordering**: steps run one at a time in declaration order;
//!   compensation walks the successfully executed steps back to front
//! - **Nothing swallowed**: every failure path ends in one [`SagaError`] that
//!   names the failing step, the original cause and the compensation outcome
//! - **Cooperative cancellation**: an [`ExecutionContext`] is checked before
//!   every step and retry attempt, and interrupts backoff waits
//!
//! # Core Concepts
//!
//! - [`Step`]: a named forward [`Action`] with an optional compensation
//! - [`Saga`]: the coordinator, built with `&mut Self` chaining
//! - [`RetryPolicy`] / [`RetryRunner`]: bounded exponential backoff with
//!   jitter, optionally limited to error kinds via [`Classify`]
//!
//! ```no_run
//! use saga_coordinator::{ContextError, ExecutionContext, RetryPolicy, Saga, Step};
//!
//! #[derive(Debug, Clone)]
//! enum OrderError {
//!     Declined,
//!     Interrupted(ContextError),
//! }
//!
//! impl From<ContextError> for OrderError {
//!     fn from(err: ContextError) -> Self {
//!         Self::Interrupted(err)
//!     }
//! }
//!
//! # async fn run() -> Result<(), saga_coordinator::SagaError<OrderError>> {
//! let mut saga = Saga::<OrderError>::new();
//! saga.compensable_step(
//!     "reserve",
//!     |_ctx: ExecutionContext| async { Ok(()) },
//!     |_ctx: ExecutionContext| async { Ok(()) },
//! )
//! .retryable_step(
//!     Step::new("charge", |_ctx: ExecutionContext| async { Err(OrderError::Declined) }),
//!     RetryPolicy::default(),
//! );
//!
//! saga.execute(&ExecutionContext::new()).await
//! # }
//! ```

pub mod compensation;
pub mod context;
pub mod error;
pub mod journal;
pub mod policy;
pub mod retry;
pub mod saga;
pub mod step;

pub use compensation::{
    CompensationOutcome, CompensationRecord, CompensationReport, CompensationStatus,
};
pub use context::{ContextError, ExecutionContext};
pub use error::{FailurePoint, SagaError};
pub use journal::{SagaId, StepPhase, StepStatus, StepTiming};
pub use policy::{Backoff, PolicyError, RetryPolicy, RetryPolicyBuilder, RetryPolicyConfig};
pub use retry::{Classify, RetryFilter, RetryRunner};
pub use saga::{Saga, SagaState};
pub use step::{Action, FailureHook, Step};

#[cfg(test)]
mod tests;
