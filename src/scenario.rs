//! Scenario sequencing.
//!
//! A scenario is an ordered list of named steps, each performing one
//! externally visible action - create a resource, wait for a condition,
//! assert an outcome - with its own timeout. Insertion order is execution
//! order and is semantically significant: later steps assume earlier steps'
//! side effects (a repository must exist before a pull request against it
//! is created).
//!
//! Failure handling is a branch on data, never stack unwinding: steps
//! return a [`StepOutcome`], a failed *required* step aborts the remaining
//! sequence, a failed optional step is recorded and execution continues.
//! Step panics are caught and folded into a failed outcome. Whatever exit
//! path a run takes, the registered cleanup runs exactly once.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::poll::PollOutcome;

/// Result of one scenario step. Terminal once recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step's action and assertions succeeded
    Passed,
    /// The step failed definitively
    Failed(String),
    /// The step's own wait (or the step budget) elapsed while the external
    /// state was still indeterminate
    TimedOut(String),
}

impl StepOutcome {
    /// Whether the step passed
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Create a failed outcome with the given reason
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Passed when `ok` holds, otherwise failed with the given reason
    pub fn passed_if(ok: bool, reason: impl Into<String>) -> Self {
        if ok {
            Self::Passed
        } else {
            Self::Failed(reason.into())
        }
    }
}

impl From<PollOutcome> for StepOutcome {
    fn from(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Success => Self::Passed,
            PollOutcome::TimedOut => {
                Self::TimedOut("condition still pending at deadline".to_string())
            }
            PollOutcome::Failed(reason) => Self::Failed(reason),
        }
    }
}

/// Record of one executed step: name, outcome, wall-clock duration.
#[derive(Clone, Debug)]
pub struct StepRecord {
    /// Step name as registered
    pub name: String,
    /// Terminal outcome
    pub outcome: StepOutcome,
    /// Wall-clock time the step took
    pub duration: Duration,
}

/// Report of one scenario run.
#[derive(Clone, Debug)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,
    /// Run identifier the scenario's resource names were derived from
    pub run_id: String,
    /// Records of executed steps, in execution order. Steps skipped after
    /// an abort carry no record - they never executed.
    pub steps: Vec<StepRecord>,
    /// Name of the required step whose failure aborted the run, if any
    pub aborted_at: Option<String>,
    /// Whether cleanup succeeded; `None` when no cleanup was registered
    pub cleanup_ok: Option<bool>,
    /// Directory diagnostic artifacts of this run were captured under, if
    /// the scenario registered one
    pub artifacts_dir: Option<PathBuf>,
}

impl ScenarioReport {
    /// Whether the run passed: no required step failed.
    ///
    /// Optional step failures and cleanup failures are recorded but do not
    /// change the pass/fail status determined by the required steps.
    pub fn passed(&self) -> bool {
        self.aborted_at.is_none()
    }

    /// First step that did not pass, if any
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.outcome.is_passed())
    }
}

type StepAction = Box<dyn FnOnce() -> BoxFuture<'static, StepOutcome> + Send>;
type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, bool> + Send>;

struct ScenarioStep {
    name: String,
    required: bool,
    timeout: Duration,
    action: StepAction,
}

/// An ordered, named sequence of steps with a single-shot cleanup.
///
/// Steps are zero-argument async actions; state a scenario threads between
/// steps lives in whatever the actions capture (typically an `Arc<Mutex<_>>`
/// run state scoped to this run alone - no state is shared across runs).
pub struct Scenario {
    name: String,
    run_id: String,
    steps: Vec<ScenarioStep>,
    cleanup: Option<CleanupAction>,
    artifacts_dir: Option<PathBuf>,
}

impl Scenario {
    /// Create an empty scenario for one run identifier.
    pub fn new(name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_id: run_id.into(),
            steps: Vec::new(),
            cleanup: None,
            artifacts_dir: None,
        }
    }

    /// Scenario name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run identifier this scenario's resource names derive from
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Names of the registered steps, in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Record where this run's diagnostic artifacts are captured; the
    /// location is carried into the report so a failed run always points at
    /// its artifacts.
    pub fn with_artifact_location(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Append a required step: its failure aborts the remaining sequence.
    pub fn step<F, Fut>(self, name: impl Into<String>, timeout: Duration, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        self.push(name.into(), true, timeout, Box::new(move || action().boxed()))
    }

    /// Append an optional step: its failure is recorded but execution
    /// continues (a soft check).
    pub fn optional_step<F, Fut>(
        self,
        name: impl Into<String>,
        timeout: Duration,
        action: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        self.push(name.into(), false, timeout, Box::new(move || action().boxed()))
    }

    /// Register the cleanup action, invoked exactly once on every exit path.
    ///
    /// The action reports whether all deletions succeeded; its result never
    /// changes the pass/fail status already determined by the steps.
    pub fn with_cleanup<F, Fut>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.cleanup = Some(Box::new(move || cleanup().boxed()));
        self
    }

    fn push(mut self, name: String, required: bool, timeout: Duration, action: StepAction) -> Self {
        self.steps.push(ScenarioStep {
            name,
            required,
            timeout,
            action,
        });
        self
    }

    /// Execute the steps strictly in order and produce a report.
    ///
    /// Each step runs under its own timeout; a panicking step is caught and
    /// recorded as failed. After the last executed step - whether the run
    /// completed, aborted on a required failure, or a step panicked - the
    /// registered cleanup runs exactly once.
    pub async fn run(mut self) -> ScenarioReport {
        info!(
            scenario = %self.name,
            run_id = %self.run_id,
            steps = self.steps.len(),
            "Starting scenario run"
        );

        let mut report = ScenarioReport {
            scenario: self.name.clone(),
            run_id: self.run_id.clone(),
            steps: Vec::new(),
            aborted_at: None,
            cleanup_ok: None,
            artifacts_dir: self.artifacts_dir.take(),
        };

        for step in std::mem::take(&mut self.steps) {
            info!(scenario = %self.name, step = %step.name, "Running step");
            let start = Instant::now();

            let guarded = AssertUnwindSafe((step.action)()).catch_unwind();
            let outcome = match tokio::time::timeout(step.timeout, guarded).await {
                Err(_) => StepOutcome::TimedOut(format!(
                    "step did not finish within {}s",
                    step.timeout.as_secs()
                )),
                Ok(Err(panic)) => StepOutcome::Failed(format!(
                    "step panicked: {}",
                    panic_message(panic.as_ref())
                )),
                Ok(Ok(outcome)) => outcome,
            };

            let duration = start.elapsed();
            match &outcome {
                StepOutcome::Passed => {
                    info!(step = %step.name, duration_ms = duration.as_millis() as u64, "Step passed");
                }
                StepOutcome::Failed(reason) => {
                    warn!(step = %step.name, error = %reason, "Step failed");
                }
                StepOutcome::TimedOut(reason) => {
                    warn!(step = %step.name, error = %reason, "Step timed out");
                }
            }

            let abort = !outcome.is_passed() && step.required;
            let name = step.name;
            report.steps.push(StepRecord {
                name: name.clone(),
                outcome,
                duration,
            });

            if abort {
                warn!(
                    scenario = %self.name,
                    step = %name,
                    "Required step failed, skipping remaining steps"
                );
                report.aborted_at = Some(name);
                break;
            }
        }

        if let Some(cleanup) = self.cleanup.take() {
            info!(scenario = %self.name, run_id = %self.run_id, "Running cleanup");
            let ok = match AssertUnwindSafe(cleanup()).catch_unwind().await {
                Ok(ok) => ok,
                Err(panic) => {
                    error!(
                        scenario = %self.name,
                        error = %panic_message(panic.as_ref()),
                        "Cleanup panicked"
                    );
                    false
                }
            };
            if !ok {
                warn!(scenario = %self.name, "Cleanup reported failures");
            }
            report.cleanup_ok = Some(ok);
        }

        info!(
            scenario = %self.name,
            run_id = %self.run_id,
            passed = report.passed(),
            executed_steps = report.steps.len(),
            "Scenario run finished"
        );

        report
    }
}

/// Re-run a failing scenario with fresh resource identifiers.
///
/// `build` constructs a brand-new scenario per attempt; it must regenerate
/// the run identifier so a retry never collides with partially created state
/// from the previous attempt. Errors are logged before each retry. The
/// report of the first passing attempt - or of the final attempt - is
/// returned.
pub async fn run_with_retries<B>(max_attempts: u32, mut build: B) -> ScenarioReport
where
    B: FnMut(u32) -> Scenario,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let scenario = build(attempt);
        let report = scenario.run().await;

        if report.passed() || attempt >= attempts {
            return report;
        }

        let failed = report
            .failed_step()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "<unknown>".to_string());
        warn!(
            scenario = %report.scenario,
            run_id = %report.run_id,
            attempt = attempt,
            failed_step = %failed,
            "Scenario failed, retrying with fresh identifiers"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    const STEP_TIMEOUT: Duration = Duration::from_secs(5);

    fn counter() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        (Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)))
    }

    /// Story: a failed required step aborts the sequence and later steps
    /// never execute, but cleanup still runs exactly once.
    ///
    /// This is the "create component" worked example: the first of ten
    /// steps fails definitively and the other nine are skipped.
    #[tokio::test]
    async fn required_failure_aborts_and_cleanup_still_runs() {
        let (executed, cleanups) = counter();

        let mut scenario = Scenario::new("github-advanced", "a1b2c3-go");
        {
            let executed = executed.clone();
            scenario = scenario.step("creates go component", STEP_TIMEOUT, move || async move {
                executed.fetch_add(1, Ordering::SeqCst);
                StepOutcome::failed("template not found")
            });
        }
        for i in 2..=10 {
            let executed = executed.clone();
            scenario = scenario.step(format!("step {i}"), STEP_TIMEOUT, move || async move {
                executed.fetch_add(1, Ordering::SeqCst);
                StepOutcome::Passed
            });
        }
        let c = cleanups.clone();
        let report = scenario
            .with_cleanup(move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                true
            })
            .run()
            .await;

        assert!(!report.passed());
        assert_eq!(report.aborted_at.as_deref(), Some("creates go component"));
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(report.cleanup_ok, Some(true));
    }

    /// Story: optional steps are soft checks - their failure is recorded
    /// and the run continues and still passes.
    #[tokio::test]
    async fn optional_failure_is_recorded_but_run_continues() {
        let (executed, _) = counter();
        let e1 = executed.clone();
        let e2 = executed.clone();

        let report = Scenario::new("suite", "run-1")
            .optional_step("soft check", STEP_TIMEOUT, move || async move {
                e1.fetch_add(1, Ordering::SeqCst);
                StepOutcome::failed("scan log missing")
            })
            .step("hard check", STEP_TIMEOUT, move || async move {
                e2.fetch_add(1, Ordering::SeqCst);
                StepOutcome::Passed
            })
            .run()
            .await;

        assert!(report.passed());
        assert_eq!(executed.load(Ordering::SeqCst), 2);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.failed_step().map(|s| s.name.as_str()), Some("soft check"));
    }

    /// Story: a panicking step becomes a failed outcome, not an unwind past
    /// the sequencer, and cleanup runs exactly once.
    #[tokio::test]
    async fn panicking_step_is_caught_and_cleanup_runs_once() {
        let (executed, cleanups) = counter();
        let e = executed.clone();
        let c = cleanups.clone();

        let report = Scenario::new("suite", "run-1")
            .step("explodes", STEP_TIMEOUT, || async {
                panic!("assertion blew up mid-step");
            })
            .step("never reached", STEP_TIMEOUT, move || async move {
                e.fetch_add(1, Ordering::SeqCst);
                StepOutcome::Passed
            })
            .with_cleanup(move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                true
            })
            .run()
            .await;

        assert!(!report.passed());
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        match &report.steps[0].outcome {
            StepOutcome::Failed(reason) => assert!(reason.contains("assertion blew up")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overrunning_step_times_out_and_aborts() {
        let (_, cleanups) = counter();
        let c = cleanups.clone();

        let report = Scenario::new("suite", "run-1")
            .step("hangs", Duration::from_millis(20), || async {
                tokio::time::sleep(Duration::from_secs(300)).await;
                StepOutcome::Passed
            })
            .with_cleanup(move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                true
            })
            .run()
            .await;

        assert!(!report.passed());
        assert!(matches!(report.steps[0].outcome, StepOutcome::TimedOut(_)));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    /// A failing run's report points at the artifact location, so the
    /// operator never has to dig through logs for it.
    #[tokio::test]
    async fn report_carries_the_artifact_location() {
        let report = Scenario::new("suite", "a1b2c3-go")
            .with_artifact_location("artifacts/a1b2c3-go")
            .step("fails", STEP_TIMEOUT, || async {
                StepOutcome::failed("pipeline reported failure")
            })
            .run()
            .await;

        assert!(!report.passed());
        assert_eq!(
            report.artifacts_dir.as_deref(),
            Some(std::path::Path::new("artifacts/a1b2c3-go"))
        );

        let report = Scenario::new("suite", "run-2")
            .step("passes", STEP_TIMEOUT, || async { StepOutcome::Passed })
            .run()
            .await;
        assert_eq!(report.artifacts_dir, None);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_change_step_determined_result() {
        let report = Scenario::new("suite", "run-1")
            .step("passes", STEP_TIMEOUT, || async { StepOutcome::Passed })
            .with_cleanup(|| async { false })
            .run()
            .await;

        assert!(report.passed());
        assert_eq!(report.cleanup_ok, Some(false));
    }

    /// Story: scenario-level retry rebuilds the scenario with a fresh run
    /// identifier per attempt; no identifier repeats across attempts.
    #[tokio::test]
    async fn retry_regenerates_distinct_identifiers_per_attempt() {
        let ids: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let ids_in_build = ids.clone();

        let report = run_with_retries(3, move |_attempt| {
            let run_id = crate::generator::repository_name("java-quarkus");
            ids_in_build.lock().unwrap().push(run_id.clone());
            Scenario::new("suite", run_id).step("always fails", STEP_TIMEOUT, || async {
                StepOutcome::failed("flaky dependency")
            })
        })
        .await;

        assert!(!report.passed());
        let ids = ids.lock().unwrap();
        assert_eq!(ids.len(), 3);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 3, "every attempt must use a fresh identifier");
        assert_eq!(report.run_id, *ids.last().unwrap());
    }

    #[tokio::test]
    async fn retry_stops_at_first_passing_attempt() {
        let attempts_run = Arc::new(AtomicU32::new(0));
        let a = attempts_run.clone();

        let report = run_with_retries(3, move |attempt| {
            a.fetch_add(1, Ordering::SeqCst);
            Scenario::new("suite", format!("run-{attempt}")).step(
                "flaky",
                STEP_TIMEOUT,
                move || async move {
                    StepOutcome::passed_if(attempt == 2, "first attempt fails")
                },
            )
        })
        .await;

        assert!(report.passed());
        assert_eq!(attempts_run.load(Ordering::SeqCst), 2);
        assert_eq!(report.run_id, "run-2");
    }
}
