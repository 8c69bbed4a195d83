//! Suite coordination: worker scheduling and the per-unit attempt loop.
//!
//! The coordinator applies the run configuration (parallelism degree,
//! retry policy, screenshot policy) before execution starts, then drives
//! each worker through the same cycle: pull a unit off the shared queue,
//! open a fresh test session, run the body, consult the retry controller,
//! fire the failure observer on terminal failure/skip, close the session.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use gauntlet_core::{
    AttemptRecord, HarnessError, Outcome, Result, RetryPolicy, RunConfiguration, RunReport,
    UnitReport, UnitStatus, WorkerId,
};
use gauntlet_session::{Driver, SessionPool, WorkerSession};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::observer::{CapturePolicy, FailureObserver};
use crate::retry::{RetryController, Verdict};

/// One schedulable test unit. Bodies are opaque to the harness: they acquire
/// the page handle from the session, act on it, and report an outcome.
#[async_trait::async_trait]
pub trait TestUnit: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, session: &WorkerSession) -> Outcome;
}

type UnitQueue = Arc<Mutex<VecDeque<Arc<dyn TestUnit>>>>;

/// Runs a suite of test units on partitioned workers.
pub struct SuiteRunner {
    config: Arc<RunConfiguration>,
    pool: SessionPool,
    observer: Arc<FailureObserver>,
}

impl SuiteRunner {
    pub fn new(
        config: Arc<RunConfiguration>,
        driver: Arc<dyn Driver>,
        observer: FailureObserver,
    ) -> Self {
        Self {
            pool: SessionPool::new(driver, config.clone()),
            config,
            observer: Arc::new(observer),
        }
    }

    /// Execute every unit and return the aggregated report.
    ///
    /// Fatal errors (none of the tests ran) are: configuration problems
    /// upstream of this call, and an engine-spawn failure for the first
    /// worker. Engine failures on later workers poison only that worker;
    /// its remaining units are reported failed and the run continues.
    pub async fn run(&self, units: Vec<Arc<dyn TestUnit>>) -> Result<RunReport> {
        let worker_count = self.config.worker_count();
        info!(
            "Starting run: {} units on {} worker(s) ({})",
            units.len(),
            worker_count,
            if self.config.test_execution.parallel {
                "parallel"
            } else {
                "serial"
            }
        );

        // Engine preflight for the first worker: if even one engine cannot
        // spawn before tests execute, the whole run aborts.
        let mut first_session = self.pool.worker_session(WorkerId(0));
        if let Err(e) = first_session.acquire_engine().await {
            error!("Engine preflight failed, aborting run: {}", e);
            return Err(e);
        }

        let queue: UnitQueue = Arc::new(Mutex::new(units.into_iter().collect()));
        let mut handles = Vec::with_capacity(worker_count);
        let mut sessions = VecDeque::with_capacity(worker_count);
        sessions.push_back(first_session);
        for i in 1..worker_count {
            sessions.push_back(self.pool.worker_session(WorkerId(i)));
        }

        for session in sessions {
            let queue = queue.clone();
            let policy = self.config.retry.clone();
            let observer = self.observer.clone();
            handles.push(tokio::spawn(worker_loop(session, queue, policy, observer)));
        }

        // Shutdown happens inside each worker once it goes idle; awaiting
        // every handle guarantees no engine is torn down while in use.
        let mut report = RunReport::default();
        for handle in handles {
            match handle.await {
                Ok(unit_reports) => report.units.extend(unit_reports),
                Err(e) => {
                    return Err(HarnessError::Other(format!("worker task failed: {}", e)))
                }
            }
        }

        info!(
            "Run finished: {} passed, {} failed, {} skipped",
            report.passed(),
            report.failed(),
            report.skipped()
        );
        Ok(report)
    }
}

/// Drain the queue on one worker, then shut its session down.
async fn worker_loop(
    mut session: WorkerSession,
    queue: UnitQueue,
    policy: RetryPolicy,
    observer: Arc<FailureObserver>,
) -> Vec<UnitReport> {
    let worker = session.worker_id();
    let mut reports = Vec::new();
    // Set when this worker's engine/browser cannot spawn mid-run: its
    // remaining units fail fast while other workers keep going.
    let mut poisoned: Option<String> = None;

    loop {
        let unit = { queue.lock().await.pop_front() };
        let Some(unit) = unit else { break };

        if let Some(reason) = &poisoned {
            warn!(
                "{}: marking '{}' failed, worker is unavailable",
                worker,
                unit.name()
            );
            reports.push(UnitReport {
                name: unit.name().to_string(),
                status: UnitStatus::FailedFinal {
                    attempts_used: 0,
                    reason: format!("worker unavailable: {}", reason),
                },
                attempts: vec![],
            });
            continue;
        }

        let (report, worker_fatal) = run_unit(&mut session, unit.as_ref(), &policy, &observer).await;
        if worker_fatal {
            if let UnitStatus::FailedFinal { reason, .. } = &report.status {
                poisoned = Some(reason.clone());
            }
        }
        reports.push(report);
    }

    session.shutdown().await;
    reports
}

/// Drive one unit through attempts until the retry controller concludes it.
/// Returns the unit report and whether the failure is fatal for the worker.
async fn run_unit(
    session: &mut WorkerSession,
    unit: &dyn TestUnit,
    policy: &RetryPolicy,
    observer: &FailureObserver,
) -> (UnitReport, bool) {
    let worker = session.worker_id();
    let mut controller = RetryController::new(policy.clone());
    let mut attempts = Vec::new();

    loop {
        let attempt_number = controller.attempts_used() + 1;

        if let Err(e) = session.begin_test_session().await {
            let worker_fatal = matches!(
                e,
                HarnessError::EngineStart(_) | HarnessError::BrowserLaunch(_)
            );
            error!(
                "{}: could not open a session for '{}': {}",
                worker,
                unit.name(),
                e
            );
            // No page exists, so the observer can only log.
            observer.on_unit_failure(unit.name(), None).await;
            let report = UnitReport {
                name: unit.name().to_string(),
                status: UnitStatus::FailedFinal {
                    attempts_used: controller.attempts_used(),
                    reason: format!("session setup failed: {}", e),
                },
                attempts,
            };
            return (report, worker_fatal);
        }

        info!(
            "{}: running '{}' (attempt {})",
            worker,
            unit.name(),
            attempt_number
        );
        let outcome = run_attempt(unit, session).await;
        attempts.push(AttemptRecord {
            attempt_number,
            outcome: outcome.clone(),
        });

        match controller.decide(&outcome) {
            Verdict::Retry { delay_ms } => {
                if observer.policy() == CapturePolicy::EveryAttempt {
                    observer.on_unit_failure(unit.name(), session.page()).await;
                }
                // Fresh context/page per attempt: never reuse the failed one.
                session.end_test_session().await;
                info!(
                    "{}: retrying '{}' after {}ms",
                    worker,
                    unit.name(),
                    delay_ms
                );
                if delay_ms > 0 {
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                }
            }
            Verdict::Conclude(status) => {
                // Capture before teardown so the page is still live.
                if !matches!(status, UnitStatus::Passed { .. }) {
                    observer.on_unit_failure(unit.name(), session.page()).await;
                }
                session.end_test_session().await;
                let report = UnitReport {
                    name: unit.name().to_string(),
                    status,
                    attempts,
                };
                return (report, false);
            }
        }
    }
}

/// Run one attempt, mapping a panicking test body to a failure.
async fn run_attempt(unit: &dyn TestUnit, session: &WorkerSession) -> Outcome {
    match std::panic::AssertUnwindSafe(unit.run(session))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => Outcome::fail(panic_message(panic)),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("test body panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("test body panicked: {}", message)
    } else {
        "test body panicked".to_string()
    }
}
