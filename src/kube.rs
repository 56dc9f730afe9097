//! Kubernetes collaborator.
//!
//! Thin typed wrapper over the cluster APIs the harness observes and
//! mutates: integration secrets, OpenShift Routes, Tekton PipelineRuns and
//! TaskRuns, ArgoCD Applications and pod logs. Tekton and ArgoCD resources
//! are foreign CRDs, accessed as [`DynamicObject`]s with hand-built
//! [`ApiResource`] descriptors.

use k8s_openapi::api::core::v1::{Namespace, Pod, Secret};
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams};
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::poll::{poll, CheckResult, PollOutcome, PollPolicy};
use crate::Result;

/// Secret holding cosign signing material, in the product root namespace
pub const SIGNING_SECRET: &str = "signing-secrets";
/// Secret holding the ACS endpoint and API token
pub const ACS_SECRET: &str = "rhtap-acs-integration";
/// Secret holding Trustification (TPA) connection settings
pub const TRUSTIFICATION_SECRET: &str = "rhtap-trustification-integration";
/// Name of the Developer Hub Route in its namespace
pub const HUB_ROUTE: &str = "backstage-developer-hub";

/// Harness-facing Kubernetes client.
#[derive(Clone)]
pub struct KubeHarness {
    client: Client,
}

fn pipeline_run_resource() -> ApiResource {
    ApiResource {
        group: "tekton.dev".to_string(),
        version: "v1".to_string(),
        api_version: "tekton.dev/v1".to_string(),
        kind: "PipelineRun".to_string(),
        plural: "pipelineruns".to_string(),
    }
}

fn task_run_resource() -> ApiResource {
    ApiResource {
        group: "tekton.dev".to_string(),
        version: "v1".to_string(),
        api_version: "tekton.dev/v1".to_string(),
        kind: "TaskRun".to_string(),
        plural: "taskruns".to_string(),
    }
}

fn application_resource() -> ApiResource {
    ApiResource {
        group: "argoproj.io".to_string(),
        version: "v1alpha1".to_string(),
        api_version: "argoproj.io/v1alpha1".to_string(),
        kind: "Application".to_string(),
        plural: "applications".to_string(),
    }
}

fn route_resource() -> ApiResource {
    ApiResource {
        group: "route.openshift.io".to_string(),
        version: "v1".to_string(),
        api_version: "route.openshift.io/v1".to_string(),
        kind: "Route".to_string(),
        plural: "routes".to_string(),
    }
}

/// Label selector for PipelineRuns created by Pipelines-as-Code for a
/// repository and trigger event type (`push` or `pull_request`).
pub fn pac_label_selector(repository: &str, event_type: &str) -> String {
    format!(
        "pipelinesascode.tekton.dev/url-repository={repository},\
         pipelinesascode.tekton.dev/event-type={event_type}"
    )
}

/// Classify a PipelineRun's `Succeeded` condition into a poll check result.
///
/// An absent or unknown condition is pending (the run is still executing);
/// `status: "False"` is a definitive failure carrying the reported reason.
pub fn pipeline_run_check(status: &Value) -> CheckResult {
    let conditions = match status.get("conditions").and_then(Value::as_array) {
        Some(c) => c,
        None => return CheckResult::Pending,
    };

    for condition in conditions {
        if condition.get("type").and_then(Value::as_str) != Some("Succeeded") {
            continue;
        }
        return match condition.get("status").and_then(Value::as_str) {
            Some("True") => CheckResult::Satisfied,
            Some("False") => {
                let reason = condition
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let message = condition
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                CheckResult::failed(format!("pipeline run failed: {reason}: {message}"))
            }
            _ => CheckResult::Pending,
        };
    }

    CheckResult::Pending
}

/// Extract the ArgoCD application health status (`Healthy`, `Progressing`,
/// `Degraded`, ...) from its status object.
pub fn application_health(status: &Value) -> Option<&str> {
    status
        .get("health")
        .and_then(|h| h.get("status"))
        .and_then(Value::as_str)
}

impl KubeHarness {
    /// Connect using the ambient kubeconfig/in-cluster configuration.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Wrap an existing client (used by integration tests).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Whether the namespace exists in the cluster.
    pub async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    /// Read one key of a secret as a UTF-8 string.
    pub async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<String> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await?;

        let data = secret.data.unwrap_or_default();
        let bytes = data.get(key).ok_or_else(|| {
            Error::config(format!("secret {namespace}/{name} has no key '{key}'"))
        })?;

        String::from_utf8(bytes.0.clone()).map_err(|_| {
            Error::config(format!("secret {namespace}/{name} key '{key}' is not UTF-8"))
        })
    }

    /// Cosign public key from the signing secret.
    pub async fn cosign_public_key(&self, root_namespace: &str) -> Result<String> {
        self.secret_value(root_namespace, SIGNING_SECRET, "cosign.pub")
            .await
    }

    /// Cosign private key from the signing secret.
    pub async fn cosign_private_key(&self, root_namespace: &str) -> Result<String> {
        self.secret_value(root_namespace, SIGNING_SECRET, "cosign.key")
            .await
    }

    /// Cosign key password from the signing secret.
    pub async fn cosign_password(&self, root_namespace: &str) -> Result<String> {
        self.secret_value(root_namespace, SIGNING_SECRET, "cosign.password")
            .await
    }

    /// ACS central endpoint from the integration secret.
    pub async fn acs_endpoint(&self, root_namespace: &str) -> Result<String> {
        self.secret_value(root_namespace, ACS_SECRET, "endpoint").await
    }

    /// ACS API token from the integration secret.
    pub async fn acs_token(&self, root_namespace: &str) -> Result<String> {
        self.secret_value(root_namespace, ACS_SECRET, "token").await
    }

    /// Trustification connection settings from the integration secret.
    pub async fn trustification_settings(
        &self,
        root_namespace: &str,
    ) -> Result<crate::trustification::TrustificationSettings> {
        Ok(crate::trustification::TrustificationSettings {
            bombastic_api_url: self
                .secret_value(root_namespace, TRUSTIFICATION_SECRET, "bombastic_api_url")
                .await?,
            oidc_issuer_url: self
                .secret_value(root_namespace, TRUSTIFICATION_SECRET, "oidc_issuer_url")
                .await?,
            oidc_client_id: self
                .secret_value(root_namespace, TRUSTIFICATION_SECRET, "oidc_client_id")
                .await?,
            oidc_client_secret: self
                .secret_value(root_namespace, TRUSTIFICATION_SECRET, "oidc_client_secret")
                .await?,
            supported_cyclonedx_version: self
                .secret_value(
                    root_namespace,
                    TRUSTIFICATION_SECRET,
                    "supported_cyclonedx_version",
                )
                .await?,
        })
    }

    /// Host of an OpenShift Route.
    pub async fn route_host(&self, name: &str, namespace: &str) -> Result<String> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &route_resource());
        let route = api.get(name).await?;

        route
            .data
            .get("spec")
            .and_then(|s| s.get("host"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::serialization(format!("route {namespace}/{name} has no spec.host"))
            })
    }

    /// Host of the Developer Hub Route in its namespace.
    pub async fn developer_hub_url(&self, hub_namespace: &str) -> Result<String> {
        let host = self.route_host(HUB_ROUTE, hub_namespace).await?;
        Ok(format!("https://{host}"))
    }

    /// Newest PipelineRun triggered by Pipelines-as-Code for a repository
    /// and event type, if any exists yet.
    pub async fn pipeline_run_by_repository(
        &self,
        namespace: &str,
        repository: &str,
        event_type: &str,
    ) -> Result<Option<DynamicObject>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &pipeline_run_resource());
        let params = ListParams::default().labels(&pac_label_selector(repository, event_type));
        let runs = api.list(&params).await?;

        let newest = runs.items.into_iter().max_by_key(|run| {
            run.metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
        });
        Ok(newest)
    }

    /// Fetch one PipelineRun by name.
    pub async fn pipeline_run(&self, name: &str, namespace: &str) -> Result<DynamicObject> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &pipeline_run_resource());
        Ok(api.get(name).await?)
    }

    /// Wait for a PipelineRun to finish.
    ///
    /// Transport errors and a still-missing run are pending (retryable); a
    /// run whose `Succeeded` condition reports `False` fails definitively.
    pub async fn wait_pipeline_run_finished(
        &self,
        name: &str,
        namespace: &str,
        policy: PollPolicy,
    ) -> PollOutcome {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &pipeline_run_resource());

        poll("pipeline run finished", policy, || {
            let api = api.clone();
            let name = name.to_string();
            async move {
                match api.get_opt(&name).await {
                    Ok(Some(run)) => {
                        let status = run.data.get("status").cloned().unwrap_or(Value::Null);
                        pipeline_run_check(&status)
                    }
                    Ok(None) => CheckResult::Pending,
                    Err(e) => {
                        debug!(pipeline_run = %name, error = %e, "PipelineRun fetch failed, retrying");
                        CheckResult::Pending
                    }
                }
            }
        })
        .await
    }

    /// TaskRuns belonging to a PipelineRun.
    pub async fn task_runs_of(
        &self,
        pipeline_run: &str,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &task_run_resource());
        let params =
            ListParams::default().labels(&format!("tekton.dev/pipelineRun={pipeline_run}"));
        Ok(api.list(&params).await?.items)
    }

    /// Pod name a TaskRun executed in, if recorded in its status.
    pub fn task_run_pod(task_run: &DynamicObject) -> Option<String> {
        task_run
            .data
            .get("status")
            .and_then(|s| s.get("podName"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Full logs of a pod (all containers interleaved per container default).
    pub async fn pod_logs(&self, pod: &str, namespace: &str) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.logs(pod, &LogParams::default()).await?)
    }

    /// Logs of one container of a pod.
    pub async fn container_logs(
        &self,
        pod: &str,
        namespace: &str,
        container: &str,
    ) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        Ok(api.logs(pod, &params).await?)
    }

    /// Pod manifest rendered as YAML, for diagnostics.
    pub async fn pod_yaml(&self, pod: &str, namespace: &str) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = api.get(pod).await?;
        serde_yaml::to_string(&pod).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Fetch an ArgoCD Application, if it exists.
    pub async fn application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &application_resource());
        Ok(api.get_opt(name).await?)
    }

    /// Wait for an ArgoCD Application to report `Healthy`.
    ///
    /// `Degraded` is still pending rather than failed: applications
    /// routinely pass through Degraded while their workload image is being
    /// replaced, so only the deadline decides.
    pub async fn wait_application_healthy(
        &self,
        namespace: &str,
        name: &str,
        policy: PollPolicy,
    ) -> PollOutcome {
        poll("argocd application healthy", policy, || {
            let name = name.to_string();
            let namespace = namespace.to_string();
            let this = self.clone();
            async move {
                match this.application(&namespace, &name).await {
                    Ok(Some(app)) => {
                        let status = app.data.get("status").cloned().unwrap_or(Value::Null);
                        match application_health(&status) {
                            Some("Healthy") => CheckResult::Satisfied,
                            other => {
                                debug!(application = %name, health = ?other, "Application not healthy yet");
                                CheckResult::Pending
                            }
                        }
                    }
                    Ok(None) => CheckResult::Pending,
                    Err(e) => {
                        debug!(application = %name, error = %e, "Application fetch failed, retrying");
                        CheckResult::Pending
                    }
                }
            }
        })
        .await
    }

    /// Ask ArgoCD to sync an Application by writing its `operation` field.
    pub async fn trigger_application_sync(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &application_resource());

        let operation = serde_json::json!({
            "operation": {
                "initiatedBy": { "username": "tap-e2e" },
                "sync": { "prune": true }
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&operation))
            .await?;

        info!(application = %name, namespace = %namespace, "Triggered ArgoCD sync");
        Ok(())
    }

    /// Delete an ArgoCD Application if it exists.
    pub async fn delete_application(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &application_resource());

        if api.get_opt(name).await?.is_none() {
            debug!(application = %name, "Application already absent, nothing to delete");
            return Ok(());
        }
        api.delete(name, &DeleteParams::default()).await?;
        warn!(application = %name, namespace = %namespace, "Deleted ArgoCD application");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pac_selector_targets_repository_and_event() {
        let s = pac_label_selector("a1b2c3-go", "pull_request");
        assert!(s.contains("url-repository=a1b2c3-go"));
        assert!(s.contains("event-type=pull_request"));
    }

    #[test]
    fn running_pipeline_is_pending() {
        let status = json!({
            "conditions": [
                { "type": "Succeeded", "status": "Unknown", "reason": "Running" }
            ]
        });
        assert_eq!(pipeline_run_check(&status), CheckResult::Pending);
    }

    #[test]
    fn succeeded_pipeline_is_satisfied() {
        let status = json!({
            "conditions": [
                { "type": "Succeeded", "status": "True", "reason": "Succeeded" }
            ]
        });
        assert_eq!(pipeline_run_check(&status), CheckResult::Satisfied);
    }

    /// A pipeline reporting failure must stop polling immediately with the
    /// reported reason, not wait out the deadline.
    #[test]
    fn failed_pipeline_is_definitive_with_reason() {
        let status = json!({
            "conditions": [
                {
                    "type": "Succeeded",
                    "status": "False",
                    "reason": "Failed",
                    "message": "Tasks Completed: 7 (Failed: 1)"
                }
            ]
        });
        match pipeline_run_check(&status) {
            CheckResult::Failed(reason) => {
                assert!(reason.contains("Failed"));
                assert!(reason.contains("Tasks Completed"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn missing_conditions_are_pending() {
        assert_eq!(pipeline_run_check(&json!({})), CheckResult::Pending);
        assert_eq!(pipeline_run_check(&Value::Null), CheckResult::Pending);
    }

    #[test]
    fn application_health_reads_nested_status() {
        let status = json!({ "health": { "status": "Healthy" }, "sync": { "status": "Synced" } });
        assert_eq!(application_health(&status), Some("Healthy"));
        assert_eq!(application_health(&json!({})), None);
    }
}
