//! Tekton pipeline verification blocks.
//!
//! Pipelines-as-Code (PAC) reacts to SCM webhooks by creating PipelineRuns
//! labelled with the repository and the trigger event type; every check
//! here locates the newest matching run rather than carrying run names
//! between steps, since a retried webhook can replace the run.

use serde_json::Value;
use tracing::{info, warn};

use crate::artifacts::ArtifactSink;
use crate::kube::KubeHarness;
use crate::poll::{poll, CheckResult, PollPolicy};
use crate::scenario::StepOutcome;

/// Marker the ACS image-scan step prints when the scan passed.
const ACS_SCAN_SUCCESS: &str = r#""result":"SUCCESS""#;
/// Image prefix of the syft step injected into the build task.
const SYFT_IMAGE_PREFIX: &str = "registry.redhat.io/rh-syft";

/// Wait until PAC has created a PipelineRun for the repository and event.
///
/// A timeout here almost always means the webhook never reached the
/// cluster, so the message points at the PAC controller rather than at
/// Tekton.
pub async fn pipeline_run_started(
    kube: &KubeHarness,
    namespace: &str,
    repository: &str,
    event_type: &str,
    policy: PollPolicy,
) -> StepOutcome {
    let outcome = poll("pipeline run created", policy, move || async move {
        match kube
            .pipeline_run_by_repository(namespace, repository, event_type)
            .await
        {
            Ok(Some(_)) => CheckResult::Satisfied,
            Ok(None) | Err(_) => CheckResult::Pending,
        }
    })
    .await;

    match outcome.into() {
        StepOutcome::TimedOut(_) => StepOutcome::TimedOut(format!(
            "no {event_type} pipeline run appeared for {repository}; check the \
             pipelines-as-code controller received the webhook"
        )),
        other => other,
    }
}

/// Wait for the newest matching PipelineRun to finish successfully.
///
/// When the run fails or times out, the logs of every pod its TaskRuns
/// executed in are saved under `pipeline-runs-logs/` before the outcome is
/// reported.
pub async fn pipeline_run_succeeds(
    kube: &KubeHarness,
    artifacts: &ArtifactSink,
    namespace: &str,
    repository: &str,
    event_type: &str,
    policy: PollPolicy,
) -> StepOutcome {
    let run = match kube
        .pipeline_run_by_repository(namespace, repository, event_type)
        .await
    {
        Ok(Some(run)) => run,
        Ok(None) => {
            return StepOutcome::failed(format!(
                "no {event_type} pipeline run exists for {repository}; check the \
                 pipelines-as-code controller received the webhook"
            ))
        }
        Err(e) => return StepOutcome::failed(format!("pipeline run lookup failed: {e}")),
    };
    let name = match run.metadata.name.as_deref() {
        Some(name) => name.to_string(),
        None => return StepOutcome::failed("pipeline run has no name"),
    };

    info!(pipeline_run = %name, repository = %repository, "Waiting for pipeline run");
    let outcome: StepOutcome = kube
        .wait_pipeline_run_finished(&name, namespace, policy)
        .await
        .into();

    if !outcome.is_passed() {
        save_pipeline_run_logs(kube, artifacts, namespace, &name).await;
    }

    match outcome {
        StepOutcome::TimedOut(_) => StepOutcome::TimedOut(format!(
            "pipeline run {name} still executing at deadline"
        )),
        other => other,
    }
}

/// Capture the logs of every pod a PipelineRun's TaskRuns executed in.
async fn save_pipeline_run_logs(
    kube: &KubeHarness,
    artifacts: &ArtifactSink,
    namespace: &str,
    pipeline_run: &str,
) {
    let task_runs = match kube.task_runs_of(pipeline_run, namespace).await {
        Ok(runs) => runs,
        Err(e) => {
            warn!(pipeline_run = %pipeline_run, error = %e, "Could not list task runs for log capture");
            return;
        }
    };

    for task_run in &task_runs {
        let Some(pod) = KubeHarness::task_run_pod(task_run) else {
            continue;
        };
        match kube.pod_logs(&pod, namespace).await {
            Ok(logs) => {
                artifacts.write("pipeline-runs-logs", &format!("{pod}.log"), &logs);
            }
            Err(e) => {
                warn!(pod = %pod, error = %e, "Could not fetch pod logs");
            }
        }
    }
}

/// Whether the run's inlined pipeline spec carries the syft image in the
/// build task's steps.
pub fn syft_image_present(run: &Value) -> bool {
    let tasks = match run
        .pointer("/status/pipelineSpec/tasks")
        .and_then(Value::as_array)
    {
        Some(tasks) => tasks,
        None => return false,
    };

    tasks
        .iter()
        .filter(|t| t.get("name").and_then(Value::as_str) == Some("build-container"))
        .filter_map(|t| t.pointer("/taskSpec/steps").and_then(Value::as_array))
        .flatten()
        .filter_map(|step| step.get("image").and_then(Value::as_str))
        .any(|image| image.starts_with(SYFT_IMAGE_PREFIX))
}

/// Verify the build task ran syft from the expected registry path.
///
/// On failure the full run manifest is saved under `pipeline-runs/` so the
/// resolved pipeline spec can be inspected offline.
pub async fn syft_image_path_correct(
    kube: &KubeHarness,
    artifacts: &ArtifactSink,
    namespace: &str,
    repository: &str,
    event_type: &str,
) -> StepOutcome {
    let run = match kube
        .pipeline_run_by_repository(namespace, repository, event_type)
        .await
    {
        Ok(Some(run)) => run,
        Ok(None) => {
            return StepOutcome::failed(format!(
                "no {event_type} pipeline run exists for {repository}"
            ))
        }
        Err(e) => return StepOutcome::failed(format!("pipeline run lookup failed: {e}")),
    };

    let manifest = serde_json::to_value(&run).unwrap_or(Value::Null);
    if syft_image_present(&manifest) {
        return StepOutcome::Passed;
    }

    let name = run.metadata.name.as_deref().unwrap_or("pipeline-run");
    if let Ok(yaml) = serde_yaml::to_string(&manifest) {
        artifacts.write("pipeline-runs", &format!("{name}.yaml"), &yaml);
    }
    StepOutcome::failed(format!(
        "build-container steps of {name} do not run {SYFT_IMAGE_PREFIX}"
    ))
}

/// Whether the ACS scan step output reports success.
pub fn acs_scan_ok(logs: &str) -> bool {
    logs.contains(ACS_SCAN_SUCCESS)
}

/// Verify the ACS image scan of the newest matching run passed.
///
/// The scan runs in a dedicated pod named `{run}-acs-image-scan-pod`; its
/// `step-rox-image-scan` container prints a JSON verdict. The container log
/// is always saved under `acs-image-scan/`.
pub async fn acs_scan_passed(
    kube: &KubeHarness,
    artifacts: &ArtifactSink,
    namespace: &str,
    repository: &str,
    event_type: &str,
) -> StepOutcome {
    let run = match kube
        .pipeline_run_by_repository(namespace, repository, event_type)
        .await
    {
        Ok(Some(run)) => run,
        Ok(None) => {
            return StepOutcome::failed(format!(
                "no {event_type} pipeline run exists for {repository}"
            ))
        }
        Err(e) => return StepOutcome::failed(format!("pipeline run lookup failed: {e}")),
    };
    let name = match run.metadata.name.as_deref() {
        Some(name) => name.to_string(),
        None => return StepOutcome::failed("pipeline run has no name"),
    };

    let pod = format!("{name}-acs-image-scan-pod");
    let logs = match kube
        .container_logs(&pod, namespace, "step-rox-image-scan")
        .await
    {
        Ok(logs) => logs,
        Err(e) => {
            return StepOutcome::failed(format!("acs scan logs of {pod} unavailable: {e}"))
        }
    };
    artifacts.write("acs-image-scan", &format!("{pod}.log"), &logs);

    StepOutcome::passed_if(
        acs_scan_ok(&logs),
        format!("acs image scan of {name} did not report success"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_with_build_step_image(image: &str) -> Value {
        json!({
            "status": {
                "pipelineSpec": {
                    "tasks": [
                        {
                            "name": "clone-repository",
                            "taskSpec": { "steps": [ { "image": "registry.redhat.io/git-init" } ] }
                        },
                        {
                            "name": "build-container",
                            "taskSpec": {
                                "steps": [
                                    { "image": "registry.redhat.io/buildah" },
                                    { "image": image }
                                ]
                            }
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn finds_syft_in_the_build_task_steps() {
        let run = run_with_build_step_image("registry.redhat.io/rh-syft:1.4");
        assert!(syft_image_present(&run));
    }

    /// A syft pulled from anywhere else is a product misconfiguration.
    #[test]
    fn rejects_syft_from_an_unexpected_registry() {
        let run = run_with_build_step_image("quay.io/someone/syft:latest");
        assert!(!syft_image_present(&run));
    }

    #[test]
    fn missing_pipeline_spec_is_not_a_match() {
        assert!(!syft_image_present(&json!({ "status": {} })));
        assert!(!syft_image_present(&Value::Null));
    }

    #[test]
    fn acs_verdict_is_read_from_the_scan_output() {
        let passing = r#"{"result":"SUCCESS","summary":{"CRITICAL":0}}"#;
        let failing = r#"{"result":"FAILURE","summary":{"CRITICAL":3}}"#;
        assert!(acs_scan_ok(passing));
        assert!(!acs_scan_ok(failing));
        assert!(!acs_scan_ok(""));
    }
}
