//! Reverse-order compensation of executed steps.

use crate::context::ExecutionContext;
use crate::journal::{Journal, SagaId, StepPhase, StepStatus};
use crate::step::Step;

/// What happened when one executed step was compensated.
#[derive(Debug, Clone, PartialEq)]
pub enum CompensationOutcome<E> {
    /// The handler ran and succeeded.
    Compensated,
    /// The step has no handler.
    Skipped,
    /// The handler ran and failed.
    Failed(E),
}

/// Compensation result for a single executed step.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationRecord<E> {
    /// Declaration index of the step.
    pub step_index: usize,
    /// Step name.
    pub name: String,
    /// Outcome of the handler.
    pub outcome: CompensationOutcome<E>,
}

/// Overall result of a compensation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationStatus {
    /// Nothing had executed, so nothing needed undoing.
    NoneNeeded,
    /// Every invoked handler succeeded.
    Clean,
    /// Some handlers succeeded and some failed.
    Partial,
    /// Every invoked handler failed.
    Failed,
}

impl std::fmt::Display for CompensationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoneNeeded => "none needed",
            Self::Clean => "clean",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-step records of a compensation sweep, in the order handlers ran.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationReport<E> {
    records: Vec<CompensationRecord<E>>,
}

impl<E> Default for CompensationReport<E> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<E> CompensationReport<E> {
    /// Records in execution order (most recently executed step first).
    pub fn records(&self) -> &[CompensationRecord<E>] {
        &self.records
    }

    /// Summarize the sweep.
    pub fn status(&self) -> CompensationStatus {
        if self.records.is_empty() {
            return CompensationStatus::NoneNeeded;
        }
        let mut invoked = 0;
        let mut failed = 0;
        for record in &self.records {
            match record.outcome {
                CompensationOutcome::Compensated => invoked += 1,
                CompensationOutcome::Failed(_) => {
                    invoked += 1;
                    failed += 1;
                }
                CompensationOutcome::Skipped => {}
            }
        }
        match failed {
            0 => CompensationStatus::Clean,
            n if n == invoked => CompensationStatus::Failed,
            _ => CompensationStatus::Partial,
        }
    }

    /// Returns `true` unless a handler failed.
    pub fn is_clean(&self) -> bool {
        matches!(
            self.status(),
            CompensationStatus::NoneNeeded | CompensationStatus::Clean
        )
    }

    /// Names of steps whose handler succeeded, in the order they ran.
    pub fn compensated(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, CompensationOutcome::Compensated))
            .map(|r| r.name.as_str())
    }

    /// Steps whose handler failed, with the handler's error.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &E)> {
        self.records.iter().filter_map(|r| match &r.outcome {
            CompensationOutcome::Failed(err) => Some((r.name.as_str(), err)),
            _ => None,
        })
    }

    fn push(&mut self, step_index: usize, name: &str, outcome: CompensationOutcome<E>) {
        self.records.push(CompensationRecord {
            step_index,
            name: name.to_owned(),
            outcome,
        });
    }
}

/// Compensate `executed` (indices into `steps`) from last to first.
///
/// Policy choice: a failing handler does not stop the sweep. Every remaining
/// executed step is still compensated and every failure lands in the report.
///
/// The context is handed to handlers but not checked here; a cancelled
/// execution still gets its rollback.
pub(crate) async fn compensate_executed<E>(
    steps: &[Step<E>],
    executed: &[usize],
    ctx: &ExecutionContext,
    journal: &mut Journal,
    saga_id: SagaId,
) -> CompensationReport<E> {
    let mut report = CompensationReport::default();
    #[cfg(not(feature = "tracing"))]
    let _ = saga_id;

    for &index in executed.iter().rev() {
        let step = &steps[index];
        journal.start(index, step.name(), StepPhase::Compensation);

        let Some(handler) = step.compensation() else {
            journal.end(StepStatus::Skipped);
            report.push(index, step.name(), CompensationOutcome::Skipped);
            continue;
        };

        #[cfg(feature = "tracing")]
        tracing::info!(%saga_id, step = index, name = step.name(), "compensate.start");

        match handler.call(ctx).await {
            Ok(()) => {
                journal.end(StepStatus::Compensated);

                #[cfg(feature = "tracing")]
                tracing::info!(%saga_id, step = index, outcome = "completed", "compensate.end");

                report.push(index, step.name(), CompensationOutcome::Compensated);
            }
            Err(err) => {
                journal.end(StepStatus::CompensationFailed);

                #[cfg(feature = "tracing")]
                tracing::error!(%saga_id, step = index, outcome = "failed", "compensate.end");

                report.push(index, step.name(), CompensationOutcome::Failed(err));
            }
        }
    }

    report
}
