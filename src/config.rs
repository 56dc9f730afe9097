//! Harness configuration.
//!
//! All configuration is resolved exactly once at process start into
//! [`HarnessConfig`] and passed by reference into suites and collaborators.
//! Core logic never reads the environment ad hoc; anything it needs is a
//! resolved scalar on this struct.
//!
//! Values fall back to cluster-derived defaults where documented: tokens and
//! URLs that are absent from the environment are looked up from the
//! integration secrets the product installs (see [`crate::kube`]).

use std::path::PathBuf;

use crate::error::Error;
use crate::Result;

/// Resolved harness configuration.
///
/// Optional fields are provider credentials and overrides that may instead
/// be resolved from cluster secrets; suite preflight checks reject runs
/// whose required values are still missing.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Namespace where the pipeline product is installed
    pub root_namespace: String,
    /// Namespace of the GitOps (ArgoCD) installation
    pub gitops_namespace: String,
    /// Namespace of the Developer Hub installation
    pub hub_namespace: String,
    /// Root namespace for application components; environment namespaces
    /// are derived from it
    pub app_root_namespace: String,
    /// Image registry host, e.g. `quay.io`
    pub image_registry: String,
    /// Image registry organization
    pub image_org: String,
    /// GitHub organization components are created in
    pub github_organization: String,
    /// GitLab group components are created in
    pub gitlab_organization: String,
    /// Bitbucket workspace components are created in
    pub bitbucket_workspace: String,
    /// Bitbucket project within the workspace
    pub bitbucket_project: String,
    /// GitHub API token; resolved from cluster secrets when absent
    pub github_token: Option<String>,
    /// GitLab API token; resolved from cluster secrets when absent
    pub gitlab_token: Option<String>,
    /// Bitbucket username for app-password auth
    pub bitbucket_username: Option<String>,
    /// Bitbucket app password
    pub bitbucket_app_password: Option<String>,
    /// Developer Hub URL override; resolved from the cluster Route when absent
    pub hub_url: Option<String>,
    /// Jenkins base URL; resolved from the hub environment secret when absent
    pub jenkins_url: Option<String>,
    /// Jenkins username
    pub jenkins_username: Option<String>,
    /// Jenkins API token
    pub jenkins_token: Option<String>,
    /// Image registry credentials seeded into CI secret stores
    pub image_registry_username: String,
    /// Image registry password seeded into CI secret stores
    pub image_registry_password: String,
    /// Directory diagnostic artifacts are written under
    pub artifact_dir: PathBuf,
    /// Whether cleanup deletes created external resources
    pub clean_after_tests: bool,
}

impl HarnessConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an injected lookup function.
    ///
    /// The seam exists so tests can exercise fallback behavior without
    /// mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            root_namespace: get("RHTAP_ROOT_NAMESPACE", crate::DEFAULT_ROOT_NAMESPACE),
            gitops_namespace: get("RHTAP_GITOPS_NAMESPACE", crate::DEFAULT_GITOPS_NAMESPACE),
            hub_namespace: get("RHTAP_RHDH_NAMESPACE", crate::DEFAULT_HUB_NAMESPACE),
            app_root_namespace: get(
                "APPLICATION_ROOT_NAMESPACE",
                crate::DEFAULT_APP_ROOT_NAMESPACE,
            ),
            image_registry: get("IMAGE_REGISTRY", crate::DEFAULT_IMAGE_REGISTRY),
            image_org: get("IMAGE_REGISTRY_ORG", crate::DEFAULT_IMAGE_ORG),
            github_organization: get("GITHUB_ORGANIZATION", ""),
            gitlab_organization: get("GITLAB_ORGANIZATION_PUBLIC", ""),
            bitbucket_workspace: get("BITBUCKET_WORKSPACE", ""),
            bitbucket_project: get("BITBUCKET_PROJECT", ""),
            github_token: lookup("GITHUB_TOKEN"),
            gitlab_token: lookup("GITLAB_TOKEN"),
            bitbucket_username: lookup("BITBUCKET_USERNAME"),
            bitbucket_app_password: lookup("BITBUCKET_APP_PASSWORD"),
            hub_url: lookup("RED_HAT_DEVELOPER_HUB_URL"),
            jenkins_url: lookup("JENKINS_URL"),
            jenkins_username: lookup("JENKINS_USERNAME"),
            jenkins_token: lookup("JENKINS_TOKEN"),
            image_registry_username: get("IMAGE_REGISTRY_USERNAME", ""),
            image_registry_password: get("IMAGE_REGISTRY_PASSWORD", ""),
            artifact_dir: PathBuf::from(get("ARTIFACT_DIR", "artifacts")),
            clean_after_tests: get("CLEAN_AFTER_TESTS", "false") == "true",
        }
    }

    /// CI namespace derived from the application root namespace
    pub fn ci_namespace(&self) -> String {
        format!("{}-ci", self.app_root_namespace)
    }

    /// Namespace of the given environment, e.g. `rhtap-app-development`
    pub fn environment_namespace(&self, environment: &str) -> String {
        format!("{}-{}", self.app_root_namespace, environment)
    }

    /// Fail fast if a required scalar resolved to an empty string.
    pub fn require(&self, value: &str, variable: &str) -> Result<()> {
        if value.is_empty() {
            return Err(Error::config(format!(
                "the '{variable}' environment variable is not set; \
                 define it or provide a cluster connection it can be resolved from"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_resolves_documented_defaults() {
        let cfg = HarnessConfig::from_lookup(|_| None);

        assert_eq!(cfg.root_namespace, "rhtap");
        assert_eq!(cfg.gitops_namespace, "rhtap-gitops");
        assert_eq!(cfg.hub_namespace, "rhtap-dh");
        assert_eq!(cfg.app_root_namespace, "rhtap-app");
        assert_eq!(cfg.image_registry, "quay.io");
        assert_eq!(cfg.image_org, "rhtap");
        assert!(cfg.github_token.is_none());
        assert!(!cfg.clean_after_tests);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = HarnessConfig::from_lookup(lookup_from(&[
            ("APPLICATION_ROOT_NAMESPACE", "team-a"),
            ("GITHUB_ORGANIZATION", "my-org"),
            ("GITHUB_TOKEN", "gh-secret"),
            ("CLEAN_AFTER_TESTS", "true"),
        ]));

        assert_eq!(cfg.app_root_namespace, "team-a");
        assert_eq!(cfg.github_organization, "my-org");
        assert_eq!(cfg.github_token.as_deref(), Some("gh-secret"));
        assert!(cfg.clean_after_tests);
    }

    #[test]
    fn derived_namespaces_follow_the_root() {
        let cfg = HarnessConfig::from_lookup(lookup_from(&[(
            "APPLICATION_ROOT_NAMESPACE",
            "team-a",
        )]));

        assert_eq!(cfg.ci_namespace(), "team-a-ci");
        assert_eq!(cfg.environment_namespace("development"), "team-a-development");
        assert_eq!(cfg.environment_namespace("prod"), "team-a-prod");
    }

    #[test]
    fn require_rejects_empty_values_naming_the_variable() {
        let cfg = HarnessConfig::from_lookup(|_| None);

        let err = cfg
            .require(&cfg.github_organization, "GITHUB_ORGANIZATION")
            .unwrap_err();
        assert!(err.to_string().contains("GITHUB_ORGANIZATION"));

        assert!(cfg.require(&cfg.root_namespace, "RHTAP_ROOT_NAMESPACE").is_ok());
    }
}
