//! Run/report types shared between the session pool and the suite runner.

use serde::{Deserialize, Serialize};

/// Identifies one worker (one parallelism slot) for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Outcome of a single attempt of a test unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail { reason: String },
    Skip { reason: String },
}

impl Outcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        Outcome::Fail {
            reason: reason.into(),
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Outcome::Skip {
            reason: reason.into(),
        }
    }
}

/// One attempt of one test unit, as recorded in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt_number: u32,
    pub outcome: Outcome,
}

/// Terminal status of a test unit after the retry controller concluded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    /// Passed, possibly after retries. Retries are visible only in the
    /// attempt history and the log.
    Passed { attempts_used: u32 },
    /// Failed after the retry policy was exhausted.
    FailedFinal { attempts_used: u32, reason: String },
    /// Skipped; never retried.
    Skipped { reason: String },
}

impl UnitStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, UnitStatus::FailedFinal { .. })
    }
}

/// Report for one test unit across all of its attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub name: String,
    pub status: UnitStatus,
    pub attempts: Vec<AttemptRecord>,
}

/// Aggregated report for an entire run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub units: Vec<UnitReport>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Passed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.units.iter().filter(|u| u.status.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Skipped { .. }))
            .count()
    }

    /// True when no unit ended in a terminal failure.
    pub fn all_green(&self) -> bool {
        self.failed() == 0
    }
}
