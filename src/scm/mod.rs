//! SCM provider collaborators.
//!
//! Thin typed wrappers over the GitHub, GitLab and Bitbucket REST APIs.
//! Scenario blocks depend on the [`ScmProvider`] trait so the same
//! verification logic works against any provider (and against a mock in
//! tests); provider-specific operations (promotion pull requests, CI
//! variables) live on the concrete clients.

mod bitbucket;
mod github;
mod gitlab;

pub use bitbucket::BitbucketProvider;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Operations the harness needs from any SCM provider.
///
/// `owner` is the GitHub organization, GitLab group or Bitbucket workspace
/// the repository lives under.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScmProvider: Send + Sync {
    /// Whether the repository exists.
    ///
    /// A 404 from the provider is a plain `false`, not an error - callers
    /// poll this while waiting for the scaffolder to create the repository.
    async fn repository_exists(&self, owner: &str, repository: &str) -> Result<bool>;

    /// Whether a folder exists in the repository's default branch.
    async fn folder_exists(&self, owner: &str, repository: &str, path: &str) -> Result<bool>;

    /// Delete the repository when it exists; absent repositories are not an
    /// error, so cleanup can call this unconditionally.
    async fn delete_repository_if_exists(&self, owner: &str, repository: &str) -> Result<()>;
}

/// Extract the container image reference from a deployment patch manifest.
///
/// Promotion pull requests copy the image deployed in one environment's
/// overlay into the next environment's overlay; the patch is a small YAML
/// document whose only `image:` line carries the full reference including
/// the digest or tag.
pub fn extract_image_reference(patch: &str) -> Option<String> {
    for line in patch.lines() {
        let trimmed = line.trim_start().trim_start_matches("- ");
        if let Some(value) = trimmed.strip_prefix("image:") {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Rewrite the `image:` line of a deployment patch to the given reference,
/// preserving everything else byte for byte.
pub fn with_image_reference(patch: &str, image: &str) -> String {
    let mut out = Vec::with_capacity(patch.len());
    for line in patch.lines() {
        let trimmed = line.trim_start().trim_start_matches("- ");
        if trimmed.starts_with("image:") {
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            let dash = if line.trim_start().starts_with("- ") { "- " } else { "" };
            out.push(format!("{indent}{dash}image: {image}"));
        } else {
            out.push(line.to_string());
        }
    }
    let mut result = out.join("\n");
    if patch.ends_with('\n') {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "\
apiVersion: apps/v1
kind: Deployment
spec:
  template:
    spec:
      containers:
        - name: app
          image: quay.io/rhtap/rhtap-qe-go:sha256-1a2b3c
          ports:
            - containerPort: 8080
";

    #[test]
    fn extracts_the_deployed_image_reference() {
        assert_eq!(
            extract_image_reference(PATCH).as_deref(),
            Some("quay.io/rhtap/rhtap-qe-go:sha256-1a2b3c")
        );
    }

    #[test]
    fn missing_image_line_yields_none() {
        assert_eq!(extract_image_reference("kind: Deployment\n"), None);
    }

    #[test]
    fn promotion_rewrites_only_the_image_line() {
        let promoted = with_image_reference(PATCH, "quay.io/rhtap/rhtap-qe-go:sha256-9f8e7d");

        assert!(promoted.contains("image: quay.io/rhtap/rhtap-qe-go:sha256-9f8e7d"));
        assert!(!promoted.contains("sha256-1a2b3c"));
        // Structure is untouched.
        assert!(promoted.contains("containerPort: 8080"));
        assert!(promoted.ends_with('\n'));
        assert_eq!(promoted.lines().count(), PATCH.lines().count());
    }
}
