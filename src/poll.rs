//! Condition polling against external systems.
//!
//! Every wait in the harness goes through [`poll`]: a condition is an async
//! predicate over externally observable state, and the poller re-evaluates
//! it on a fixed interval until it reports success, a definitive failure, or
//! the deadline elapses. All state lives in the system being polled; the
//! poller itself is stateless between evaluations.
//!
//! # Example
//!
//! ```ignore
//! use tap_e2e::poll::{poll, CheckResult, PollPolicy};
//!
//! let outcome = poll("argocd application healthy", PollPolicy::new(600, 5), || async {
//!     match kube.application_health("my-app").await {
//!         Ok(Some(h)) if h == "Healthy" => CheckResult::Satisfied,
//!         Ok(Some(h)) if h == "Degraded" => CheckResult::failed("application degraded"),
//!         _ => CheckResult::Pending,
//!     }
//! })
//! .await;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of one condition evaluation.
///
/// The distinction between `Pending` and `Failed` is the caller's policy
/// choice, made explicitly at each call site: an HTTP 404 meaning "not yet
/// created" is `Pending`, while a response that arrived but reports a
/// definitive bad state (a failed pipeline, a malformed body) is `Failed`.
/// The poller never reclassifies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckResult {
    /// Condition not yet true; evaluate again after the interval
    Pending,
    /// Condition is true
    Satisfied,
    /// Condition can never become true; polling stops immediately
    Failed(String),
}

impl CheckResult {
    /// Create a failed result with the given reason
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Deadline and evaluation interval for one poll operation.
///
/// `interval <= timeout` should hold for the policy to be meaningful, but
/// the poller evaluates the condition at least once regardless - a timeout
/// of zero still performs exactly one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total time budget for the poll operation
    pub timeout: Duration,
    /// Sleep between evaluations
    pub interval: Duration,
}

impl PollPolicy {
    /// Create a policy from whole seconds
    pub fn new(timeout_secs: u64, interval_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Create a policy from explicit durations
    pub fn from_durations(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Policy with the given timeout and the harness-wide default interval
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: crate::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Terminal result of a poll operation. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition was satisfied within the deadline
    Success,
    /// The deadline elapsed while the condition was still pending
    ///
    /// Distinct from `Failed`: the external state is indeterminate, not
    /// confirmed bad.
    TimedOut,
    /// The condition reported a definitive failure
    Failed(String),
}

impl PollOutcome {
    /// Whether the condition was satisfied
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Evaluate `condition` until it settles or `policy.timeout` elapses.
///
/// The condition is evaluated immediately - time zero counts toward elapsed
/// time but guarantees at least one evaluation even when the timeout is
/// smaller than the interval. `Satisfied` and `Failed` return without any
/// extra delay; `Pending` sleeps for `policy.interval` and re-evaluates.
/// The sleep is a tokio suspension point, so concurrent pollers never block
/// each other.
///
/// # Arguments
/// * `name` - Name of the condition for logging purposes
/// * `policy` - Deadline and evaluation interval
/// * `condition` - The condition to evaluate
pub async fn poll<F, Fut>(name: &str, policy: PollPolicy, mut condition: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CheckResult>,
{
    let start = Instant::now();
    let mut evaluations = 0u32;

    loop {
        evaluations += 1;

        match condition().await {
            CheckResult::Satisfied => {
                debug!(
                    condition = %name,
                    evaluations = evaluations,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Condition satisfied"
                );
                return PollOutcome::Success;
            }
            CheckResult::Failed(reason) => {
                warn!(
                    condition = %name,
                    evaluations = evaluations,
                    error = %reason,
                    "Condition failed definitively"
                );
                return PollOutcome::Failed(reason);
            }
            CheckResult::Pending => {}
        }

        // Stop once the next evaluation could only happen past the deadline.
        if start.elapsed() + policy.interval > policy.timeout {
            warn!(
                condition = %name,
                evaluations = evaluations,
                timeout_ms = policy.timeout.as_millis() as u64,
                "Condition still pending at deadline"
            );
            return PollOutcome::TimedOut;
        }

        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_condition(
        results: Vec<CheckResult>,
    ) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<CheckResult>) {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cond = move || {
            let i = c.fetch_add(1, Ordering::SeqCst) as usize;
            let r = results
                .get(i)
                .cloned()
                .unwrap_or(CheckResult::Pending);
            std::future::ready(r)
        };
        (count, cond)
    }

    #[tokio::test]
    async fn satisfied_immediately_returns_success_without_delay() {
        let (count, cond) = counting_condition(vec![CheckResult::Satisfied]);
        let start = std::time::Instant::now();

        let outcome = poll("test", PollPolicy::new(60, 30), cond).await;

        assert_eq!(outcome, PollOutcome::Success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn failed_stops_immediately_with_zero_additional_evaluations() {
        let (count, cond) = counting_condition(vec![
            CheckResult::Pending,
            CheckResult::failed("pipeline reported failure"),
            CheckResult::Satisfied,
        ]);

        let policy = PollPolicy::from_durations(Duration::from_secs(10), Duration::from_millis(1));
        let outcome = poll("test", policy, cond).await;

        assert_eq!(
            outcome,
            PollOutcome::Failed("pipeline reported failure".to_string())
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    /// A timeout smaller than the interval still performs exactly one
    /// evaluation, and the outcome depends solely on it.
    #[tokio::test]
    async fn timeout_smaller_than_interval_evaluates_exactly_once() {
        let (count, cond) = counting_condition(vec![CheckResult::Pending]);

        let policy = PollPolicy::from_durations(Duration::from_millis(5), Duration::from_secs(60));
        let outcome = poll("test", policy, cond).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_timeout_still_evaluates_once() {
        let (count, cond) = counting_condition(vec![CheckResult::Satisfied]);

        let policy = PollPolicy::from_durations(Duration::ZERO, Duration::from_secs(5));
        let outcome = poll("test", policy, cond).await;

        assert_eq!(outcome, PollOutcome::Success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// Pending, Pending, Pending, Satisfied on calls 1-4 succeeds after
    /// three interval sleeps (the 20s/5s worked example, scaled down).
    #[tokio::test]
    async fn succeeds_on_fourth_evaluation_spaced_by_interval() {
        let (count, cond) = counting_condition(vec![
            CheckResult::Pending,
            CheckResult::Pending,
            CheckResult::Pending,
            CheckResult::Satisfied,
        ]);

        let policy = PollPolicy::from_durations(Duration::from_millis(200), Duration::from_millis(50));
        let start = std::time::Instant::now();
        let outcome = poll("test", policy, cond).await;

        assert_eq!(outcome, PollOutcome::Success);
        assert_eq!(count.load(Ordering::SeqCst), 4);
        // Three sleeps of 50ms happened before the satisfying evaluation.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn pending_past_deadline_times_out() {
        let (count, cond) = counting_condition(vec![]);

        let policy = PollPolicy::from_durations(Duration::from_millis(30), Duration::from_millis(10));
        let outcome = poll("test", policy, cond).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        // Evaluations at ~0, 10, 20, 30ms; the next would land past the deadline.
        let n = count.load(Ordering::SeqCst);
        assert!((2..=4).contains(&n), "expected 2-4 evaluations, got {n}");
    }
}
