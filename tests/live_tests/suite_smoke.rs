//! Full scenario runs against a live cluster
//!
//! Each test drives one suite exactly the way the binary does and asserts
//! the report passed. Failures leave diagnostics under the artifact
//! directory keyed by the run identifier.

use tap_e2e::suites::github::GitHubSuite;
use tap_e2e::suites::gitlab::GitLabSuite;

use super::helpers::connect;

#[tokio::test]
#[ignore]
async fn github_basic_scenario_passes_end_to_end() {
    let (cfg, kube) = connect().await;

    let suite = GitHubSuite::connect(cfg, kube)
        .await
        .expect("github suite preflight failed");
    let report = suite.run_basic("go").await;

    assert!(
        report.passed(),
        "github-basic failed at {:?} (run {})",
        report.aborted_at,
        report.run_id
    );
}

#[tokio::test]
#[ignore]
async fn github_advanced_scenario_passes_end_to_end() {
    let (cfg, kube) = connect().await;

    let suite = GitHubSuite::connect(cfg, kube)
        .await
        .expect("github suite preflight failed");
    let report = suite.run_advanced("go").await;

    assert!(
        report.passed(),
        "github-advanced failed at {:?} (run {})",
        report.aborted_at,
        report.run_id
    );
    assert_eq!(report.cleanup_ok, Some(true), "cleanup reported failures");
}

#[tokio::test]
#[ignore]
async fn gitlab_advanced_scenario_passes_end_to_end() {
    let (cfg, kube) = connect().await;

    let suite = GitLabSuite::connect(cfg, kube)
        .await
        .expect("gitlab suite preflight failed");
    let report = suite.run_advanced("go").await;

    assert!(
        report.passed(),
        "gitlab-advanced failed at {:?} (run {})",
        report.aborted_at,
        report.run_id
    );
}
