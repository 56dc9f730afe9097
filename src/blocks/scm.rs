//! Repository verification blocks, provider-agnostic through
//! [`ScmProvider`].

use crate::poll::{poll, CheckResult, PollPolicy};
use crate::scenario::StepOutcome;
use crate::scm::ScmProvider;

/// Wait until the scaffolder-created repository exists and contains the
/// given folder.
///
/// Lookup errors are pending rather than definitive: the scaffolder creates
/// the repository and pushes its content in separate moments, and provider
/// APIs are briefly inconsistent in between.
pub async fn repository_created_with_folder(
    provider: &dyn ScmProvider,
    owner: &str,
    repository: &str,
    folder: &str,
    policy: PollPolicy,
) -> StepOutcome {
    let outcome = poll("repository exists with expected folder", policy, move || async move {
        match provider.repository_exists(owner, repository).await {
            Ok(false) | Err(_) => return CheckResult::Pending,
            Ok(true) => {}
        }
        match provider.folder_exists(owner, repository, folder).await {
            Ok(true) => CheckResult::Satisfied,
            Ok(false) | Err(_) => CheckResult::Pending,
        }
    })
    .await;

    match outcome.into() {
        StepOutcome::TimedOut(_) => StepOutcome::TimedOut(format!(
            "repository {owner}/{repository} with folder '{folder}' did not appear in time"
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm::MockScmProvider;
    use std::time::Duration;

    fn quick_policy() -> PollPolicy {
        PollPolicy::from_durations(Duration::from_millis(200), Duration::from_millis(10))
    }

    /// Story: the repository shows up first, its content a little later;
    /// the block keeps polling through the gap and passes.
    #[tokio::test]
    async fn passes_once_repository_and_folder_both_exist() {
        let mut provider = MockScmProvider::new();
        provider
            .expect_repository_exists()
            .returning(|_, _| Ok(true));
        let mut folder_calls = 0;
        provider.expect_folder_exists().returning(move |_, _, _| {
            folder_calls += 1;
            Ok(folder_calls >= 3)
        });

        let outcome = repository_created_with_folder(
            &provider,
            "my-org",
            "a1b2c3-go",
            ".tekton",
            quick_policy(),
        )
        .await;

        assert_eq!(outcome, StepOutcome::Passed);
    }

    #[tokio::test]
    async fn times_out_when_repository_never_appears() {
        let mut provider = MockScmProvider::new();
        provider
            .expect_repository_exists()
            .returning(|_, _| Ok(false));

        let outcome = repository_created_with_folder(
            &provider,
            "my-org",
            "a1b2c3-go",
            ".tekton",
            quick_policy(),
        )
        .await;

        match outcome {
            StepOutcome::TimedOut(reason) => {
                assert!(reason.contains("a1b2c3-go"));
                assert!(reason.contains(".tekton"));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    /// Transient provider errors must not fail the step.
    #[tokio::test]
    async fn lookup_errors_are_retried_not_definitive() {
        let mut provider = MockScmProvider::new();
        let mut calls = 0;
        provider.expect_repository_exists().returning(move |_, _| {
            calls += 1;
            if calls < 3 {
                Err(crate::Error::scm("rate limited"))
            } else {
                Ok(true)
            }
        });
        provider
            .expect_folder_exists()
            .returning(|_, _, _| Ok(true));

        let outcome = repository_created_with_folder(
            &provider,
            "my-org",
            "a1b2c3-go",
            "gitops",
            quick_policy(),
        )
        .await;

        assert_eq!(outcome, StepOutcome::Passed);
    }
}
