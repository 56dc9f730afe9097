//! GitLab provider.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::Error;
use crate::generator::random_suffix;
use crate::scm::{extract_image_reference, with_image_reference, ScmProvider};
use crate::Result;

const API_BASE: &str = "https://gitlab.com/api/v4";

/// Thin typed wrapper over the GitLab REST API.
///
/// GitLab addresses projects by numeric id; [`Self::project_id`] resolves
/// the `group/name` path once and operations take the id from there.
pub struct GitLabProvider {
    http: reqwest::Client,
    base: String,
}

impl GitLabProvider {
    /// Create a provider authenticating with the given token.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base(token, API_BASE)
    }

    /// Create a provider against a non-default API base (test servers).
    pub fn with_base(token: &str, base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(token)
            .map_err(|_| Error::config("gitlab token contains invalid header characters"))?;
        headers.insert("PRIVATE-TOKEN", value);

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
            return Err(Error::scm(format!("gitlab: GET {path} returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("gitlab: GET {path}: {e}")))
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
                "gitlab: {method} {path} returned {status}: {detail}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("gitlab: {method} {path}: {e}")))
    }

    /// Numeric project id for `group/name`, or `None` if the project does
    /// not exist (yet).
    pub async fn project_id(&self, group: &str, name: &str) -> Result<Option<u64>> {
        let path = format!("projects/{group}%2F{name}");
        let response = self.http.get(self.url(&path)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let project: Value = response
                    .json()
                    .await
                    .map_err(|e| Error::serialization(format!("gitlab: GET {path}: {e}")))?;
                let id = project
                    .get("id")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Error::serialization("gitlab: project response has no id"))?;
                Ok(Some(id))
            }
            s => Err(Error::scm(format!("gitlab: project lookup returned {s}"))),
        }
    }

    /// Delete a project by id.
    pub async fn delete_project(&self, id: u64) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("projects/{id}")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(Error::scm(format!(
                "gitlab: deleting project {id} returned {status}"
            )));
        }
        warn!(project = id, "Deleted project");
        Ok(())
    }

    /// Create a branch off main, add one file, and open a merge request.
    /// Returns the merge request iid.
    pub async fn create_merge_request_from_main_branch(
        &self,
        id: u64,
        file_name: &str,
        content: &str,
    ) -> Result<u64> {
        let branch = format!("test-mr-{}", random_suffix(6));
        self.send_json(
            reqwest::Method::POST,
            &format!("projects/{id}/repository/branches?branch={branch}&ref=main"),
            &json!({}),
        )
        .await?;

        self.send_json(
            reqwest::Method::POST,
            &format!("projects/{id}/repository/files/{file_name}"),
            &json!({
                "branch": branch,
                "content": content,
                "commit_message": format!("add {file_name} to trigger a merge_request pipeline"),
            }),
        )
        .await?;

        let mr = self
            .send_json(
                reqwest::Method::POST,
                &format!("projects/{id}/merge_requests"),
                &json!({
                    "source_branch": branch,
                    "target_branch": "main",
                    "title": format!("e2e: add {file_name}"),
                }),
            )
            .await?;
        let iid = mr
            .get("iid")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::serialization("gitlab: merge request response has no iid"))?;
        info!(project = id, merge_request = iid, "Opened merge request");
        Ok(iid)
    }

    /// Merge a merge request.
    pub async fn merge_merge_request(&self, id: u64, iid: u64) -> Result<()> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("projects/{id}/merge_requests/{iid}/merge"),
            &json!({}),
        )
        .await?;
        info!(project = id, merge_request = iid, "Merged merge request");
        Ok(())
    }

    /// Open a promotion merge request in the GitOps project, copying the
    /// image deployed in `from_environment` into `to_environment`.
    ///
    /// Returns the promoted image reference and the merge request iid.
    pub async fn create_promotion_merge_request(
        &self,
        id: u64,
        component: &str,
        from_environment: &str,
        to_environment: &str,
    ) -> Result<(String, u64)> {
        let source_path =
            format!("components/{component}/overlays/{from_environment}/deployment-patch.yaml");
        let target_path =
            format!("components/{component}/overlays/{to_environment}/deployment-patch.yaml");
        let encode = |p: &str| p.replace('/', "%2F");

        let source = self
            .get_json(&format!(
                "projects/{id}/repository/files/{}?ref=main",
                encode(&source_path)
            ))
            .await?;
        let source_patch = decode_file_content(&source, &source_path)?;
        let image = extract_image_reference(&source_patch).ok_or_else(|| {
            Error::scm(format!("gitlab: no image reference found in {source_path}"))
        })?;

        let target = self
            .get_json(&format!(
                "projects/{id}/repository/files/{}?ref=main",
                encode(&target_path)
            ))
            .await?;
        let target_patch = decode_file_content(&target, &target_path)?;
        let promoted = with_image_reference(&target_patch, &image);

        let branch = format!(
            "promote-{from_environment}-{to_environment}-{}",
            random_suffix(6)
        );
        self.send_json(
            reqwest::Method::POST,
            &format!("projects/{id}/repository/branches?branch={branch}&ref=main"),
            &json!({}),
        )
        .await?;

        self.send_json(
            reqwest::Method::PUT,
            &format!("projects/{id}/repository/files/{}", encode(&target_path)),
            &json!({
                "branch": branch,
                "content": promoted,
                "commit_message": format!("promote {from_environment} image to {to_environment}"),
            }),
        )
        .await?;

        let mr = self
            .send_json(
                reqwest::Method::POST,
                &format!("projects/{id}/merge_requests"),
                &json!({
                    "source_branch": branch,
                    "target_branch": "main",
                    "title": format!("Promote {from_environment} to {to_environment}"),
                }),
            )
            .await?;
        let iid = mr
            .get("iid")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::serialization("gitlab: merge request response has no iid"))?;

        info!(
            project = id,
            merge_request = iid,
            image = %image,
            from = %from_environment,
            to = %to_environment,
            "Opened promotion merge request"
        );
        Ok((image, iid))
    }
}

fn decode_file_content(file_response: &Value, path: &str) -> Result<String> {
    let raw = file_response
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::serialization(format!("gitlab: {path} response has no content")))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|e| Error::serialization(format!("gitlab: {path} content is not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| Error::serialization(format!("gitlab: {path} content is not UTF-8")))
}

#[async_trait]
impl ScmProvider for GitLabProvider {
    async fn repository_exists(&self, owner: &str, repository: &str) -> Result<bool> {
        Ok(self.project_id(owner, repository).await?.is_some())
    }

    async fn folder_exists(&self, owner: &str, repository: &str, path: &str) -> Result<bool> {
        let id = match self.project_id(owner, repository).await? {
            Some(id) => id,
            None => return Ok(false),
        };
        let tree = self
            .get_json(&format!("projects/{id}/repository/tree?path={path}"))
            .await?;
        Ok(tree.as_array().is_some_and(|entries| !entries.is_empty()))
    }

    async fn delete_repository_if_exists(&self, owner: &str, repository: &str) -> Result<()> {
        if let Some(id) = self.project_id(owner, repository).await? {
            self.delete_project(id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_file_content() {
        let response = json!({ "content": "aW1hZ2U6IGFwcDp2MQo=" });
        assert_eq!(
            decode_file_content(&response, "p").unwrap(),
            "image: app:v1\n"
        );
    }

    #[test]
    fn missing_content_is_a_serialization_error() {
        let err = decode_file_content(&json!({}), "overlays/stage").unwrap_err();
        assert!(err.to_string().contains("overlays/stage"));
    }
}
