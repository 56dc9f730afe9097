//! Scenario suites.
//!
//! One suite per provider/CI combination. Each suite resolves its
//! collaborators once (credentials fall back from the environment to the
//! integration secrets on the cluster), runs a preflight that fails fast on
//! missing configuration, and builds scenarios out of the blocks in
//! [`crate::blocks`].

pub mod bitbucket;
pub mod github;
pub mod gitlab;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::blocks;
use crate::config::HarnessConfig;
use crate::error::Error;
use crate::hub::DeveloperHubClient;
use crate::jenkins::JenkinsSettings;
use crate::kube::KubeHarness;
use crate::poll::PollPolicy;
use crate::scenario::Scenario;
use crate::scm::{GitHubProvider, GitLabProvider, ScmProvider};
use crate::Result;

/// Secret carrying the GitHub integration token, in the hub namespace
const GITHUB_INTEGRATION_SECRET: &str = "rhtap-github-integration";
/// Secret carrying the GitLab integration token, in the hub namespace
const GITLAB_INTEGRATION_SECRET: &str = "rhtap-gitlab-integration";
/// Secret carrying the hub's environment, including Jenkins connection keys
const HUB_ENV_SECRET: &str = "developer-hub-rhtap-env";

/// Deployment environments, in promotion order.
pub const ENVIRONMENTS: [&str; 3] = ["development", "stage", "prod"];

/// Folder of Pipelines-as-Code definitions the scaffolder must commit to
/// both the source and the GitOps repository. The GitOps copy is what lets
/// the enterprise contract pipeline gate promotion pull requests.
pub const PIPELINE_DEFINITIONS_FOLDER: &str = ".tekton";

/// Content every golden-path sample application serves on its root page.
pub const EXPECTED_PAGE_CONTENT: &str = "Hello World!";

/// A runnable suite, as selected on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuiteKind {
    /// Full GitHub flow: pull request, promotion through every environment
    GithubAdvanced,
    /// Short GitHub flow: push pipeline and development deployment
    GithubBasic,
    /// GitHub sources built by Jenkins instead of Tekton
    GithubJenkins,
    /// Full GitLab flow: merge request, promotion through every environment
    GitlabAdvanced,
    /// Short Bitbucket flow
    BitbucketBasic,
}

impl SuiteKind {
    /// Every known suite, for `list` output.
    pub fn all() -> [SuiteKind; 5] {
        [
            Self::GithubAdvanced,
            Self::GithubBasic,
            Self::GithubJenkins,
            Self::GitlabAdvanced,
            Self::BitbucketBasic,
        ]
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GithubAdvanced => "github-advanced",
            Self::GithubBasic => "github-basic",
            Self::GithubJenkins => "github-jenkins",
            Self::GitlabAdvanced => "gitlab-advanced",
            Self::BitbucketBasic => "bitbucket-basic",
        };
        f.write_str(name)
    }
}

impl FromStr for SuiteKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "github-advanced" => Ok(Self::GithubAdvanced),
            "github-basic" => Ok(Self::GithubBasic),
            "github-jenkins" => Ok(Self::GithubJenkins),
            "gitlab-advanced" => Ok(Self::GitlabAdvanced),
            "bitbucket-basic" => Ok(Self::BitbucketBasic),
            other => Err(Error::config(format!(
                "unknown suite '{other}'; known suites: {}",
                SuiteKind::all().map(|s| s.to_string()).join(", ")
            ))),
        }
    }
}

/// Step budget for a step whose body is one poll: the poll deadline plus
/// headroom for the surrounding API calls.
pub fn step_budget(policy: PollPolicy) -> Duration {
    policy.timeout + Duration::from_secs(60)
}

/// GitHub token from the environment, falling back to the integration
/// secret on the cluster.
pub async fn resolve_github_token(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<String> {
    if let Some(token) = &cfg.github_token {
        return Ok(token.clone());
    }
    info!("GITHUB_TOKEN not set, resolving from the cluster integration secret");
    kube.secret_value(&cfg.hub_namespace, GITHUB_INTEGRATION_SECRET, "token")
        .await
}

/// GitLab token from the environment, falling back to the integration
/// secret on the cluster.
pub async fn resolve_gitlab_token(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<String> {
    if let Some(token) = &cfg.gitlab_token {
        return Ok(token.clone());
    }
    info!("GITLAB_TOKEN not set, resolving from the cluster integration secret");
    kube.secret_value(&cfg.hub_namespace, GITLAB_INTEGRATION_SECRET, "token")
        .await
}

/// Developer Hub URL from the environment, falling back to its Route.
pub async fn resolve_hub_url(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<String> {
    if let Some(url) = &cfg.hub_url {
        return Ok(url.clone());
    }
    info!("RED_HAT_DEVELOPER_HUB_URL not set, resolving from the cluster Route");
    kube.developer_hub_url(&cfg.hub_namespace).await
}

/// Jenkins connection settings from the environment, falling back to the
/// hub's environment secret.
pub async fn resolve_jenkins_settings(
    cfg: &HarnessConfig,
    kube: &KubeHarness,
) -> Result<JenkinsSettings> {
    if let (Some(base_url), Some(username), Some(token)) =
        (&cfg.jenkins_url, &cfg.jenkins_username, &cfg.jenkins_token)
    {
        return Ok(JenkinsSettings {
            base_url: base_url.clone(),
            username: username.clone(),
            token: token.clone(),
        });
    }
    info!("Jenkins connection not set, resolving from the hub environment secret");
    Ok(JenkinsSettings {
        base_url: kube
            .secret_value(&cfg.hub_namespace, HUB_ENV_SECRET, "JENKINS__BASEURL")
            .await?,
        username: kube
            .secret_value(&cfg.hub_namespace, HUB_ENV_SECRET, "JENKINS__USERNAME")
            .await?,
        token: kube
            .secret_value(&cfg.hub_namespace, HUB_ENV_SECRET, "JENKINS__TOKEN")
            .await?,
    })
}

/// Verify the cluster carries the product namespaces a suite depends on.
async fn preflight_namespaces(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<()> {
    let ci_namespace = cfg.ci_namespace();
    for namespace in [
        &cfg.root_namespace,
        &cfg.gitops_namespace,
        &cfg.hub_namespace,
        &ci_namespace,
    ] {
        if !kube.namespace_exists(namespace).await? {
            return Err(Error::config(format!(
                "namespace '{namespace}' does not exist; is the product installed on this cluster?"
            )));
        }
    }
    Ok(())
}

/// Preflight for GitHub-backed suites.
pub async fn preflight_github(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<()> {
    cfg.require(&cfg.github_organization, "GITHUB_ORGANIZATION")?;
    preflight_namespaces(cfg, kube).await
}

/// Preflight for GitLab-backed suites.
pub async fn preflight_gitlab(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<()> {
    cfg.require(&cfg.gitlab_organization, "GITLAB_ORGANIZATION_PUBLIC")?;
    preflight_namespaces(cfg, kube).await
}

/// Preflight for Bitbucket-backed suites.
pub async fn preflight_bitbucket(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<()> {
    cfg.require(&cfg.bitbucket_workspace, "BITBUCKET_WORKSPACE")?;
    cfg.require(&cfg.bitbucket_project, "BITBUCKET_PROJECT")?;
    if cfg.bitbucket_username.is_none() || cfg.bitbucket_app_password.is_none() {
        return Err(Error::config(
            "BITBUCKET_USERNAME and BITBUCKET_APP_PASSWORD must both be set",
        ));
    }
    preflight_namespaces(cfg, kube).await
}

/// Delete everything a component run created, in dependency order: the
/// app-of-apps Application first so ArgoCD stops reconciling, then the
/// GitOps repository, then the source repository.
///
/// Returns whether every deletion succeeded. A disabled cleanup
/// (`CLEAN_AFTER_TESTS=false`) reports success and leaves the resources for
/// inspection.
pub async fn cleanup_component(
    cfg: &HarnessConfig,
    kube: &KubeHarness,
    provider: &dyn ScmProvider,
    owner: &str,
    repository: &str,
) -> bool {
    if !cfg.clean_after_tests {
        info!(repository = %repository, "Cleanup disabled, leaving resources in place");
        return true;
    }

    let mut ok = true;

    let app_of_apps = format!("{repository}-app-of-apps");
    if let Err(e) = kube
        .delete_application(&cfg.gitops_namespace, &app_of_apps)
        .await
    {
        warn!(application = %app_of_apps, error = %e, "Could not delete app-of-apps");
        ok = false;
    }

    let gitops_repository = format!("{repository}-gitops");
    if let Err(e) = provider
        .delete_repository_if_exists(owner, &gitops_repository)
        .await
    {
        warn!(repository = %gitops_repository, error = %e, "Could not delete gitops repository");
        ok = false;
    }
    if let Err(e) = provider.delete_repository_if_exists(owner, repository).await {
        warn!(repository = %repository, error = %e, "Could not delete source repository");
        ok = false;
    }

    ok
}

/// Append the two deployment checks every suite ends its happy path with:
/// the development Application turns healthy, and its endpoint serves the
/// sample application's page.
pub(crate) fn deployment_steps(
    scenario: Scenario,
    kube: &KubeHarness,
    hub: &Arc<DeveloperHubClient>,
    cfg: &Arc<HarnessConfig>,
    run_id: &str,
) -> Scenario {
    let health_policy = PollPolicy::with_timeout(crate::ARGO_HEALTH_TIMEOUT);
    let endpoint_policy = PollPolicy::with_timeout(crate::ENDPOINT_READY_TIMEOUT);

    let scenario = {
        let kube = kube.clone();
        let gitops_namespace = cfg.gitops_namespace.clone();
        let repository = run_id.to_string();
        scenario.step(
            "application deploys healthy to development",
            step_budget(health_policy),
            move || async move {
                blocks::argo::application_healthy(
                    &kube,
                    &gitops_namespace,
                    &repository,
                    "development",
                    health_policy,
                )
                .await
            },
        )
    };

    let kube = kube.clone();
    let hub = hub.clone();
    let cfg = cfg.clone();
    let repository = run_id.to_string();
    scenario.step(
        "development endpoint serves the application",
        step_budget(health_policy) + step_budget(endpoint_policy),
        move || async move {
            blocks::argo::application_synced_and_serving(
                &kube,
                &hub,
                &cfg.gitops_namespace,
                &cfg.environment_namespace("development"),
                &repository,
                "development",
                EXPECTED_PAGE_CONTENT,
                health_policy,
                endpoint_policy,
            )
            .await
        },
    )
}

/// Tag of an image reference, e.g. `quay.io/org/app:1a2b3c` yields `1a2b3c`.
///
/// References without a tag (or digest-only references) yield `None`; the
/// caller falls back to another search key.
pub(crate) fn image_tag(image: &str) -> Option<String> {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    let (_, tag) = last_segment.split_once(':')?;
    if tag.is_empty() || last_segment.contains('@') {
        return None;
    }
    Some(tag.to_string())
}

/// Connect a GitHub provider with the resolved token.
pub async fn connect_github(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<GitHubProvider> {
    let token = resolve_github_token(cfg, kube).await?;
    GitHubProvider::new(&token)
}

/// Connect a GitLab provider with the resolved token.
pub async fn connect_gitlab(cfg: &HarnessConfig, kube: &KubeHarness) -> Result<GitLabProvider> {
    let token = resolve_gitlab_token(cfg, kube).await?;
    GitLabProvider::new(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_names_round_trip() {
        for kind in SuiteKind::all() {
            let parsed: SuiteKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn unknown_suite_names_are_rejected_with_the_known_list() {
        let err = "github-ultra".parse::<SuiteKind>().unwrap_err();
        assert!(err.to_string().contains("github-ultra"));
        assert!(err.to_string().contains("github-advanced"));
    }

    #[test]
    fn environments_are_in_promotion_order() {
        assert_eq!(ENVIRONMENTS, ["development", "stage", "prod"]);
    }

    #[test]
    fn step_budget_exceeds_the_poll_deadline() {
        let policy = PollPolicy::new(120, 5);
        assert!(step_budget(policy) > policy.timeout);
    }

    #[test]
    fn image_tag_is_taken_from_the_last_path_segment() {
        assert_eq!(
            image_tag("quay.io/rhtap/a1b2c3-go:sha-9f8e7d").as_deref(),
            Some("sha-9f8e7d")
        );
        // A registry port must not be mistaken for a tag separator.
        assert_eq!(
            image_tag("registry.local:5000/rhtap/a1b2c3-go:latest").as_deref(),
            Some("latest")
        );
    }

    #[test]
    fn untagged_or_digest_references_yield_no_tag() {
        assert_eq!(image_tag("quay.io/rhtap/a1b2c3-go"), None);
        assert_eq!(image_tag("quay.io/rhtap/a1b2c3-go@sha256:deadbeef"), None);
    }
}
