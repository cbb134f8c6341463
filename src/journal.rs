//! Saga identifiers and the per-execution journal of step timings.
//!
//! Wall-clock start times are kept for correlation with external logs;
//! durations come from the monotonic tokio clock, so they stay exact under a
//! paused test runtime.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Identifies one saga instance in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The wrapped UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SagaId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SagaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Direction of the action a journal entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPhase {
    /// The forward action, including any retries.
    Forward,
    /// The compensation handler.
    Compensation,
}

/// Outcome recorded when a journal entry is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Forward action succeeded.
    Completed,
    /// Forward action failed (after any retries).
    Failed,
    /// Compensation succeeded.
    Compensated,
    /// No compensation handler; nothing ran.
    Skipped,
    /// Compensation handler returned an error.
    CompensationFailed,
}

/// One forward action or compensation, as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    /// Declaration index of the step.
    pub step_index: usize,
    /// Step name.
    pub name: String,
    /// Forward or compensation.
    pub phase: StepPhase,
    /// Wall-clock start, in milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    /// Time spent in the action; `None` while it is still open.
    pub elapsed: Option<Duration>,
    /// `None` while the entry is still open.
    pub outcome: Option<StepStatus>,
}

impl StepTiming {
    /// Returns `true` for compensation entries.
    pub fn is_compensation(&self) -> bool {
        self.phase == StepPhase::Compensation
    }
}

/// Entries for one execution, in the order actions started.
///
/// At most one entry is open at a time since the coordinator never runs two
/// actions concurrently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<StepTiming>,
    #[serde(skip)]
    open_since: Option<Instant>,
}

impl Journal {
    /// Open an entry for step `step_index`.
    pub fn start(&mut self, step_index: usize, name: &str, phase: StepPhase) {
        self.entries.push(StepTiming {
            step_index,
            name: name.to_owned(),
            phase,
            started_at_ms: unix_millis(),
            elapsed: None,
            outcome: None,
        });
        self.open_since = Some(Instant::now());
    }

    /// Close the open entry with `outcome`. Does nothing if none is open.
    pub fn end(&mut self, outcome: StepStatus) {
        let Some(since) = self.open_since.take() else {
            return;
        };
        if let Some(entry) = self.entries.last_mut() {
            entry.elapsed = Some(since.elapsed());
            entry.outcome = Some(outcome);
        }
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[StepTiming] {
        &self.entries
    }

    /// The first entry for `step_index` in the given phase.
    pub fn entry_for(&self, step_index: usize, phase: StepPhase) -> Option<&StepTiming> {
        self.entries
            .iter()
            .find(|t| t.step_index == step_index && t.phase == phase)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.open_since = None;
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
