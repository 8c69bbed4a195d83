//! End-to-end suite runs against the in-memory driver: mixed outcomes,
//! retry redemption, artifact files on disk and full resource teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use gauntlet_core::{Outcome, RunConfiguration, UnitStatus};
use gauntlet_runner::{FailureObserver, FsArtifactSink, SuiteRunner, TestUnit};
use gauntlet_session::{FakeDriver, WorkerSession};

struct PassingUnit(&'static str);

#[async_trait::async_trait]
impl TestUnit for PassingUnit {
    fn name(&self) -> &str {
        self.0
    }

    async fn run(&self, session: &WorkerSession) -> Outcome {
        match session.page() {
            Some(_) => Outcome::Pass,
            None => Outcome::fail("no active page"),
        }
    }
}

struct FailingUnit(&'static str);

#[async_trait::async_trait]
impl TestUnit for FailingUnit {
    fn name(&self) -> &str {
        self.0
    }

    async fn run(&self, _session: &WorkerSession) -> Outcome {
        Outcome::fail("assertion failed: cart total mismatch")
    }
}

struct EventuallyPassingUnit {
    name: &'static str,
    failures_remaining: AtomicU32,
}

#[async_trait::async_trait]
impl TestUnit for EventuallyPassingUnit {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, _session: &WorkerSession) -> Outcome {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            Outcome::fail("stale element")
        } else {
            Outcome::Pass
        }
    }
}

const CONFIG: &str = r#"
    [environment]
    name = "qa"
    baseUrl = "https://staging.example.test"

    [browser]
    type = "chromium"
    headless = true
    timeout = 5000

    [screenshot]
    takeOnFailure = true
    fullPage = true

    [testExecution]
    parallel = true
    threadCount = 2

    [retry]
    enabled = true
    maxRetries = 1
    delayBetweenRetries = 0
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_run_with_mixed_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts_dir = dir.path().join("artifacts");

    let config = Arc::new(RunConfiguration::from_toml(CONFIG).unwrap());
    let driver = FakeDriver::new();
    let observer = FailureObserver::new(
        Box::new(FsArtifactSink::new(&artifacts_dir)),
        config.screenshot.clone(),
    );
    let runner = SuiteRunner::new(config, Arc::new(driver.clone()), observer);

    let units: Vec<Arc<dyn TestUnit>> = vec![
        Arc::new(PassingUnit("login_succeeds")),
        Arc::new(FailingUnit("checkout_total")),
        Arc::new(EventuallyPassingUnit {
            name: "search_results",
            failures_remaining: AtomicU32::new(1),
        }),
        Arc::new(PassingUnit("profile_loads")),
    ];

    let report = runner.run(units).await.unwrap();

    assert_eq!(report.units.len(), 4);
    assert_eq!(report.passed(), 3);
    assert_eq!(report.failed(), 1);
    assert!(!report.all_green());

    let failed = report
        .units
        .iter()
        .find(|u| u.name == "checkout_total")
        .unwrap();
    // maxRetries = 1: the original attempt plus one retry.
    assert_eq!(failed.attempts.len(), 2);
    assert!(matches!(
        failed.status,
        UnitStatus::FailedFinal {
            attempts_used: 1,
            ..
        }
    ));

    let redeemed = report
        .units
        .iter()
        .find(|u| u.name == "search_results")
        .unwrap();
    assert_eq!(redeemed.status, UnitStatus::Passed { attempts_used: 1 });

    // Only the terminal failure left an artifact on disk.
    let files: Vec<_> = std::fs::read_dir(&artifacts_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("checkout_total_"));
    assert!(files[0].ends_with(".png"));

    // Everything the run opened got closed again.
    let state = driver.state();
    assert_eq!(state.live_pages, 0);
    assert_eq!(state.live_contexts, 0);
    assert_eq!(state.browsers_closed, state.browsers_launched.len());
    assert_eq!(state.engines_stopped, state.engines_started);
    // Two workers, each with one engine and one browser for the whole run.
    assert_eq!(state.engines_started, 2);
    assert_eq!(state.browsers_launched.len(), 2);

    // Every fresh page navigated to the configured base URL.
    assert!(!state.navigations.is_empty());
    assert!(state
        .navigations
        .iter()
        .all(|url| url == "https://staging.example.test"));
}

#[tokio::test]
async fn test_serial_run_uses_one_worker() {
    let config = Arc::new(
        RunConfiguration::from_toml(
            r#"
            [environment]
            name = "qa"

            [testExecution]
            parallel = false
            threadCount = 8
        "#,
        )
        .unwrap(),
    );
    assert_eq!(config.worker_count(), 1);

    let driver = FakeDriver::new();
    let observer = FailureObserver::new(
        Box::new(gauntlet_runner::MemorySink::new()),
        config.screenshot.clone(),
    );
    let runner = SuiteRunner::new(config, Arc::new(driver.clone()), observer);

    let units: Vec<Arc<dyn TestUnit>> = vec![
        Arc::new(PassingUnit("first")),
        Arc::new(PassingUnit("second")),
        Arc::new(PassingUnit("third")),
    ];
    let report = runner.run(units).await.unwrap();

    assert!(report.all_green());
    let state = driver.state();
    assert_eq!(state.engines_started, 1);
    assert_eq!(state.browsers_launched.len(), 1);
    assert_eq!(state.contexts_created, 3);
}
