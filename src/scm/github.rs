//! GitHub provider.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::Error;
use crate::generator::random_suffix;
use crate::scm::{extract_image_reference, with_image_reference, ScmProvider};
use crate::Result;

const API_BASE: &str = "https://api.github.com";

/// Thin typed wrapper over the GitHub REST API.
pub struct GitHubProvider {
    http: reqwest::Client,
    base: String,
}

impl GitHubProvider {
    /// Create a provider authenticating with the given token.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base(token, API_BASE)
    }

    /// Create a provider against a non-default API base (test servers).
    pub fn with_base(token: &str, base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::config("github token contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("tap-e2e"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::scm(format!("github: GET {path} returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("github: GET {path}: {e}")))
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> Result<Value> {
        let response = self
            .http
            .request(method.clone(), self.url(path))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::scm(format!(
                "github: {method} {path} returned {status}: {detail}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("github: {method} {path}: {e}")))
    }

    /// SHA the default branch currently points at.
    async fn main_sha(&self, owner: &str, repository: &str) -> Result<String> {
        let reference = self
            .get_json(&format!("repos/{owner}/{repository}/git/ref/heads/main"))
            .await?;
        reference
            .pointer("/object/sha")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::serialization("github: ref response has no object.sha"))
    }

    /// Create a branch off main, add one file to it, and open a pull
    /// request. Returns the pull request number.
    pub async fn create_pull_request_from_main_branch(
        &self,
        owner: &str,
        repository: &str,
        file_name: &str,
        content: &str,
    ) -> Result<u64> {
        let sha = self.main_sha(owner, repository).await?;
        let branch = format!("test-pr-{}", random_suffix(6));

        self.send_json(
            reqwest::Method::POST,
            &format!("repos/{owner}/{repository}/git/refs"),
            &json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }),
        )
        .await?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        self.send_json(
            reqwest::Method::PUT,
            &format!("repos/{owner}/{repository}/contents/{file_name}"),
            &json!({
                "message": format!("add {file_name} to trigger a pull_request pipeline"),
                "content": encoded,
                "branch": branch,
            }),
        )
        .await?;

        let pull = self
            .send_json(
                reqwest::Method::POST,
                &format!("repos/{owner}/{repository}/pulls"),
                &json!({
                    "title": format!("e2e: add {file_name}"),
                    "head": branch,
                    "base": "main",
                }),
            )
            .await?;

        let number = pull
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::serialization("github: pull response has no number"))?;
        info!(repository = %repository, pull_request = number, "Opened pull request");
        Ok(number)
    }

    /// Merge a pull request.
    pub async fn merge_pull_request(
        &self,
        owner: &str,
        repository: &str,
        number: u64,
    ) -> Result<()> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("repos/{owner}/{repository}/pulls/{number}/merge"),
            &json!({ "merge_method": "merge" }),
        )
        .await?;
        info!(repository = %repository, pull_request = number, "Merged pull request");
        Ok(())
    }

    /// Create an empty commit on main to trigger a push pipeline.
    /// Returns the new commit SHA.
    pub async fn create_empty_commit(&self, owner: &str, repository: &str) -> Result<String> {
        let head = self.main_sha(owner, repository).await?;

        let commit = self
            .get_json(&format!("repos/{owner}/{repository}/git/commits/{head}"))
            .await?;
        let tree = commit
            .pointer("/tree/sha")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("github: commit response has no tree.sha"))?;

        let created = self
            .send_json(
                reqwest::Method::POST,
                &format!("repos/{owner}/{repository}/git/commits"),
                &json!({
                    "message": "e2e: empty commit to trigger a push pipeline",
                    "tree": tree,
                    "parents": [head],
                }),
            )
            .await?;
        let sha = created
            .get("sha")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("github: created commit has no sha"))?
            .to_string();

        self.send_json(
            reqwest::Method::PATCH,
            &format!("repos/{owner}/{repository}/git/refs/heads/main"),
            &json!({ "sha": sha }),
        )
        .await?;

        info!(repository = %repository, sha = %sha, "Created empty commit on main");
        Ok(sha)
    }

    /// Open a promotion pull request in the GitOps repository, copying the
    /// image deployed in `from_environment` into `to_environment`.
    ///
    /// Returns the promoted image reference and the pull request number.
    pub async fn create_promotion_pull_request(
        &self,
        owner: &str,
        gitops_repository: &str,
        from_environment: &str,
        to_environment: &str,
    ) -> Result<(String, u64)> {
        let component = gitops_repository.trim_end_matches("-gitops");
        let source_path =
            format!("components/{component}/overlays/{from_environment}/deployment-patch.yaml");
        let target_path =
            format!("components/{component}/overlays/{to_environment}/deployment-patch.yaml");

        let source = self
            .get_json(&format!(
                "repos/{owner}/{gitops_repository}/contents/{source_path}"
            ))
            .await?;
        let source_patch = decode_content(&source, &source_path)?;
        let image = extract_image_reference(&source_patch).ok_or_else(|| {
            Error::scm(format!("github: no image reference found in {source_path}"))
        })?;

        let target = self
            .get_json(&format!(
                "repos/{owner}/{gitops_repository}/contents/{target_path}"
            ))
            .await?;
        let target_sha = target
            .get("sha")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("github: contents response has no sha"))?
            .to_string();
        let target_patch = decode_content(&target, &target_path)?;
        let promoted = with_image_reference(&target_patch, &image);

        let main = self.main_sha(owner, gitops_repository).await?;
        let branch = format!(
            "promote-{from_environment}-{to_environment}-{}",
            random_suffix(6)
        );
        self.send_json(
            reqwest::Method::POST,
            &format!("repos/{owner}/{gitops_repository}/git/refs"),
            &json!({ "ref": format!("refs/heads/{branch}"), "sha": main }),
        )
        .await?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&promoted);
        self.send_json(
            reqwest::Method::PUT,
            &format!("repos/{owner}/{gitops_repository}/contents/{target_path}"),
            &json!({
                "message": format!("promote {from_environment} image to {to_environment}"),
                "content": encoded,
                "sha": target_sha,
                "branch": branch,
            }),
        )
        .await?;

        let pull = self
            .send_json(
                reqwest::Method::POST,
                &format!("repos/{owner}/{gitops_repository}/pulls"),
                &json!({
                    "title": format!("Promote {from_environment} to {to_environment}"),
                    "head": branch,
                    "base": "main",
                }),
            )
            .await?;
        let number = pull
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::serialization("github: pull response has no number"))?;

        info!(
            repository = %gitops_repository,
            pull_request = number,
            image = %image,
            from = %from_environment,
            to = %to_environment,
            "Opened promotion pull request"
        );
        Ok((image, number))
    }
}

fn decode_content(contents_response: &Value, path: &str) -> Result<String> {
    let raw = contents_response
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::serialization(format!("github: {path} response has no content")))?;
    // The contents API wraps base64 at 60 columns.
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| Error::serialization(format!("github: {path} content is not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| Error::serialization(format!("github: {path} content is not UTF-8")))
}

#[async_trait]
impl ScmProvider for GitHubProvider {
    async fn repository_exists(&self, owner: &str, repository: &str) -> Result<bool> {
        let response = self
            .http
            .get(self.url(&format!("repos/{owner}/{repository}")))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::scm(format!(
                "github: repository lookup returned {s}"
            ))),
        }
    }

    async fn folder_exists(&self, owner: &str, repository: &str, path: &str) -> Result<bool> {
        let response = self
            .http
            .get(self.url(&format!("repos/{owner}/{repository}/contents/{path}")))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::scm(format!("github: contents lookup returned {s}"))),
        }
    }

    async fn delete_repository_if_exists(&self, owner: &str, repository: &str) -> Result<()> {
        if !self.repository_exists(owner, repository).await? {
            return Ok(());
        }
        let response = self
            .http
            .delete(self.url(&format!("repos/{owner}/{repository}")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(Error::scm(format!(
                "github: deleting {owner}/{repository} returned {status}"
            )));
        }
        warn!(repository = %repository, owner = %owner, "Deleted repository");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wrapped_base64_contents() {
        // "image: quay.io/rhtap/app:v1\n" encoded and wrapped mid-stream,
        // the way the contents API returns it.
        let response = json!({
            "content": "aW1hZ2U6IHF1YXkuaW8v\ncmh0YXAvYXBwOnYxCg==\n",
            "sha": "abc"
        });
        let decoded = decode_content(&response, "p").unwrap();
        assert_eq!(decoded, "image: quay.io/rhtap/app:v1\n");
    }

    #[test]
    fn missing_content_field_is_a_serialization_error() {
        let err = decode_content(&json!({ "sha": "abc" }), "components/x").unwrap_err();
        assert!(err.to_string().contains("serialization error"));
        assert!(err.to_string().contains("components/x"));
    }
}
