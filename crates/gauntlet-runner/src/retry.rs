//! Pure retry decision logic, one controller per test unit.
//!
//! No I/O and no sleeping happens here: the controller only decides. The
//! suite coordinator performs the delay and the re-scheduling through a
//! fresh session cycle. Controllers are constructed per unit, so attempt
//! counters can never leak from one unit into another.

use gauntlet_core::{Outcome, RetryPolicy, UnitStatus};
use tracing::debug;

/// What the suite coordinator should do after one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Re-run the unit on a fresh context/page after waiting `delay_ms`.
    Retry { delay_ms: u64 },
    /// The unit reached a terminal state; report it.
    Conclude(UnitStatus),
}

/// Per-unit retry state: `Pending → Running → {Passed, FailedFinal, Skipped}`
/// with an attempt counter that starts at zero.
#[derive(Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    attempts_used: u32,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts_used: 0,
        }
    }

    /// Retries consumed so far (0 on the first attempt).
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Decide what happens after an attempt finished with `outcome`.
    ///
    /// Pass and skip conclude immediately; skips are never retried. A
    /// failure retries while the policy is enabled and budget remains,
    /// otherwise it becomes the unit's real, terminal failure.
    pub fn decide(&mut self, outcome: &Outcome) -> Verdict {
        match outcome {
            Outcome::Pass => Verdict::Conclude(UnitStatus::Passed {
                attempts_used: self.attempts_used,
            }),
            Outcome::Skip { reason } => Verdict::Conclude(UnitStatus::Skipped {
                reason: reason.clone(),
            }),
            Outcome::Fail { reason } => {
                if !self.policy.enabled || self.attempts_used >= self.policy.max_retries {
                    return Verdict::Conclude(UnitStatus::FailedFinal {
                        attempts_used: self.attempts_used,
                        reason: reason.clone(),
                    });
                }
                self.attempts_used += 1;
                debug!(
                    "Retry {}/{} granted after failure: {}",
                    self.attempts_used, self.policy.max_retries, reason
                );
                Verdict::Retry {
                    delay_ms: self.policy.delay_between_retries_ms,
                }
            }
        }
    }
}
