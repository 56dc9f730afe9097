//! Developer Hub (Backstage) collaborator.
//!
//! Creates components by submitting scaffolder tasks built from golden-path
//! templates, polls tasks to their terminal status, and checks deployed
//! component endpoints.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::Error;
use crate::poll::{poll, CheckResult, PollOutcome, PollPolicy};
use crate::Result;

/// Scaffolder task creation request.
///
/// `values` carries the template parameters; [`component_values`] builds
/// them for each SCM provider.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaffolderRequest {
    /// Template reference, e.g. `template:default/java-quarkus`
    pub template_ref: String,
    /// Template parameter values
    pub values: Value,
}

impl ScaffolderRequest {
    /// Build a request for the given golden-path template.
    pub fn new(template: &str, values: Value) -> Self {
        Self {
            template_ref: format!("template:default/{template}"),
            values,
        }
    }
}

/// Identity of the SCM provider a component is scaffolded into, with the
/// provider-specific template values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScmHost<'a> {
    /// GitHub organization
    GitHub {
        /// Organization owning the new repository
        organization: &'a str,
    },
    /// GitLab group
    GitLab {
        /// Group owning the new project
        group: &'a str,
    },
    /// Bitbucket workspace and project
    Bitbucket {
        /// Workspace owning the new repository
        workspace: &'a str,
        /// Project within the workspace
        project: &'a str,
        /// Username the templates commit as
        username: &'a str,
    },
}

/// Template parameter values for creating one component.
///
/// Mirrors the parameter set every golden-path template takes: where the
/// source lands, where the image is pushed, and which CI engine the
/// template wires up (`tekton` or `jenkins`).
#[allow(clippy::too_many_arguments)]
pub fn component_values(
    host: ScmHost<'_>,
    repository_name: &str,
    image_name: &str,
    image_org: &str,
    image_registry: &str,
    component_namespace: &str,
    ci_type: &str,
) -> Value {
    let mut values = json!({
        "branch": "main",
        "imageName": image_name,
        "imageOrg": image_org,
        "imageRegistry": image_registry,
        "name": repository_name,
        "namespace": component_namespace,
        "owner": "user:guest",
        "repoName": repository_name,
        "ciType": ci_type,
    });

    let extra = match host {
        ScmHost::GitHub { organization } => json!({
            "ghHost": "github.com",
            "hostType": "GitHub",
            "ghOwner": organization,
        }),
        ScmHost::GitLab { group } => json!({
            "glHost": "gitlab.com",
            "hostType": "GitLab",
            "glOwner": group,
        }),
        ScmHost::Bitbucket {
            workspace,
            project,
            username,
        } => json!({
            "bbHost": "bitbucket.org",
            "hostType": "Bitbucket",
            "bbOwner": workspace,
            "bbProject": project,
            "bbUsername": username,
        }),
    };
    if let (Some(map), Some(extra)) = (values.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            map.insert(k.clone(), v.clone());
        }
    }
    values
}

/// Thin typed wrapper over the Developer Hub REST API.
pub struct DeveloperHubClient {
    http: reqwest::Client,
    base: String,
}

impl DeveloperHubClient {
    /// Create a client against the hub base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Names of the golden-path templates registered in the catalog.
    pub async fn golden_path_templates(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/catalog/entities?filter=kind=template", self.base);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::hub(format!("catalog query returned {status}")));
        }
        let entities: Value = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("catalog response: {e}")))?;

        let names = entities
            .as_array()
            .ok_or_else(|| Error::serialization("catalog response is not a list"))?
            .iter()
            .filter_map(|e| e.pointer("/metadata/name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        Ok(names)
    }

    /// Submit a scaffolder task. Returns the task id.
    pub async fn create_task(&self, request: &ScaffolderRequest) -> Result<String> {
        let url = format!("{}/api/scaffolder/v2/tasks", self.base);
        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::hub(format!(
                "scaffolder task creation returned {status}: {detail}"
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("scaffolder response: {e}")))?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("scaffolder response has no id"))?
            .to_string();

        info!(task = %id, template = %request.template_ref, "Created scaffolder task");
        Ok(id)
    }

    /// Current status of a scaffolder task
    /// (`open`, `processing`, `completed`, `failed`, `cancelled`).
    pub async fn task_status(&self, task_id: &str) -> Result<String> {
        let url = format!("{}/api/scaffolder/v2/tasks/{}", self.base, task_id);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::hub(format!("task lookup returned {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("task response: {e}")))?;
        body.get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::serialization("task response has no status"))
    }

    /// Wait for a scaffolder task to complete.
    ///
    /// `failed` and `cancelled` are definitive; a response without a status
    /// field is malformed and also definitive.
    pub async fn wait_task_completed(&self, task_id: &str, policy: PollPolicy) -> PollOutcome {
        poll("scaffolder task completed", policy, move || async move {
            match self.task_status(task_id).await {
                Ok(status) => match status.as_str() {
                    "completed" => CheckResult::Satisfied,
                    "failed" | "cancelled" => CheckResult::failed(format!(
                        "scaffolder task {task_id} ended with status '{status}'"
                    )),
                    _ => CheckResult::Pending,
                },
                Err(Error::Serialization(msg)) => CheckResult::failed(msg),
                Err(e) => {
                    debug!(task = %task_id, error = %e, "Task status fetch failed, retrying");
                    CheckResult::Pending
                }
            }
        })
        .await
    }

    /// Collected event-stream log of a task, for diagnostics.
    pub async fn task_event_log(&self, task_id: &str) -> Result<String> {
        let url = format!("{}/api/scaffolder/v2/tasks/{}/events", self.base, task_id);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::hub(format!("task events returned {status}")));
        }
        let events: Value = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("task events response: {e}")))?;

        let lines: Vec<String> = events
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|e| e.pointer("/body/message").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(lines.join("\n"))
    }

    /// Wait until an endpoint answers with a success status.
    ///
    /// Connection errors and non-success statuses are pending: the route
    /// exists before the workload behind it is ready.
    pub async fn wait_endpoint_ready(&self, url: &str, policy: PollPolicy) -> PollOutcome {
        poll("component endpoint ready", policy, move || async move {
            match self.http.get(url).send().await {
                Ok(response) if response.status().is_success() => CheckResult::Satisfied,
                Ok(response) => {
                    debug!(url = %url, status = %response.status(), "Endpoint not ready");
                    CheckResult::Pending
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Endpoint unreachable, retrying");
                    CheckResult::Pending
                }
            }
        })
        .await
    }

    /// Wait until a page's body contains the given string.
    pub async fn wait_for_string_on_page(
        &self,
        url: &str,
        needle: &str,
        policy: PollPolicy,
    ) -> PollOutcome {
        poll("page content contains string", policy, move || async move {
            let response = match self.http.get(url).send().await {
                Ok(r) => r,
                Err(_) => return CheckResult::Pending,
            };
            if !response.status().is_success() {
                return CheckResult::Pending;
            }
            match response.text().await {
                Ok(body) if body.contains(needle) => CheckResult::Satisfied,
                Ok(_) => CheckResult::Pending,
                Err(_) => CheckResult::Pending,
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_component_values_carry_host_and_owner() {
        let values = component_values(
            ScmHost::GitHub { organization: "my-org" },
            "a1b2c3-go",
            "rhtap-qe-go",
            "rhtap",
            "quay.io",
            "rhtap-app",
            "tekton",
        );

        assert_eq!(values["hostType"], "GitHub");
        assert_eq!(values["ghHost"], "github.com");
        assert_eq!(values["ghOwner"], "my-org");
        assert_eq!(values["name"], "a1b2c3-go");
        assert_eq!(values["repoName"], "a1b2c3-go");
        assert_eq!(values["imageName"], "rhtap-qe-go");
        assert_eq!(values["namespace"], "rhtap-app");
        assert_eq!(values["ciType"], "tekton");
        assert_eq!(values["branch"], "main");
        assert_eq!(values["owner"], "user:guest");
    }

    #[test]
    fn gitlab_component_values_carry_group() {
        let values = component_values(
            ScmHost::GitLab { group: "my-group" },
            "x-python",
            "rhtap-qe-python",
            "rhtap",
            "quay.io",
            "rhtap-app",
            "tekton",
        );

        assert_eq!(values["hostType"], "GitLab");
        assert_eq!(values["glHost"], "gitlab.com");
        assert_eq!(values["glOwner"], "my-group");
        assert!(values.get("ghOwner").is_none());
    }

    #[test]
    fn bitbucket_component_values_carry_workspace_and_project() {
        let values = component_values(
            ScmHost::Bitbucket {
                workspace: "my-ws",
                project: "RHTAP",
                username: "qe-bot",
            },
            "x-nodejs",
            "rhtap-qe-nodejs",
            "rhtap",
            "quay.io",
            "rhtap-app",
            "tekton",
        );

        assert_eq!(values["hostType"], "Bitbucket");
        assert_eq!(values["bbOwner"], "my-ws");
        assert_eq!(values["bbProject"], "RHTAP");
        assert_eq!(values["bbUsername"], "qe-bot");
    }

    #[test]
    fn scaffolder_request_serializes_camel_case_template_ref() {
        let request = ScaffolderRequest::new("java-quarkus", json!({ "name": "x" }));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["templateRef"], "template:default/java-quarkus");
        assert_eq!(body["values"]["name"], "x");
    }
}
