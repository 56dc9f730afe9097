//! ArgoCD and deployed-endpoint verification blocks.
//!
//! The GitOps repository materializes as one ArgoCD Application per
//! environment, named `{repository}-{environment}`, deploying into the
//! `{app root}-{environment}` namespace behind a Route named after the
//! repository.

use tracing::warn;

use crate::hub::DeveloperHubClient;
use crate::kube::KubeHarness;
use crate::poll::PollPolicy;
use crate::scenario::StepOutcome;

/// Name of the ArgoCD Application deploying a repository into an
/// environment.
pub fn application_name(repository: &str, environment: &str) -> String {
    format!("{repository}-{environment}")
}

/// Wait for the environment's Application to report `Healthy`.
pub async fn application_healthy(
    kube: &KubeHarness,
    gitops_namespace: &str,
    repository: &str,
    environment: &str,
    policy: PollPolicy,
) -> StepOutcome {
    let name = application_name(repository, environment);
    let outcome = kube
        .wait_application_healthy(gitops_namespace, &name, policy)
        .await;

    match outcome.into() {
        StepOutcome::TimedOut(_) => StepOutcome::TimedOut(format!(
            "application {name} not healthy at deadline"
        )),
        other => other,
    }
}

/// Force a sync of the environment's Application, wait for it to turn
/// healthy, and verify the deployed endpoint serves the expected content.
///
/// The sync is requested up front so promotion merges take effect without
/// waiting for ArgoCD's own reconciliation interval.
#[allow(clippy::too_many_arguments)]
pub async fn application_synced_and_serving(
    kube: &KubeHarness,
    hub: &DeveloperHubClient,
    gitops_namespace: &str,
    environment_namespace: &str,
    repository: &str,
    environment: &str,
    expected_content: &str,
    health_policy: PollPolicy,
    endpoint_policy: PollPolicy,
) -> StepOutcome {
    let name = application_name(repository, environment);
    if let Err(e) = kube.trigger_application_sync(gitops_namespace, &name).await {
        // The app may briefly not exist right after the gitops push; health
        // polling below covers that window.
        warn!(application = %name, error = %e, "Sync request failed, relying on auto-sync");
    }

    let health = kube
        .wait_application_healthy(gitops_namespace, &name, health_policy)
        .await;
    if !health.is_success() {
        return match health.into() {
            StepOutcome::TimedOut(_) => StepOutcome::TimedOut(format!(
                "application {name} not healthy at deadline"
            )),
            other => other,
        };
    }

    let host = match kube.route_host(repository, environment_namespace).await {
        Ok(host) => host,
        Err(e) => {
            return StepOutcome::failed(format!(
                "route {environment_namespace}/{repository} lookup failed: {e}"
            ))
        }
    };
    let url = format!("https://{host}");

    let ready = hub.wait_endpoint_ready(&url, endpoint_policy).await;
    if !ready.is_success() {
        return StepOutcome::TimedOut(format!("endpoint {url} not serving at deadline"));
    }

    match hub
        .wait_for_string_on_page(&url, expected_content, endpoint_policy)
        .await
        .into()
    {
        StepOutcome::TimedOut(_) => StepOutcome::TimedOut(format!(
            "endpoint {url} never served expected content '{expected_content}'"
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_names_join_repository_and_environment() {
        assert_eq!(
            application_name("a1b2c3-go", "development"),
            "a1b2c3-go-development"
        );
    }
}
