//! Developer Hub verification blocks.

use tracing::info;

use crate::artifacts::ArtifactSink;
use crate::hub::{DeveloperHubClient, ScaffolderRequest};
use crate::poll::{PollOutcome, PollPolicy};
use crate::scenario::StepOutcome;

/// Verify the golden-path template is registered in the catalog.
pub async fn template_in_catalog(hub: &DeveloperHubClient, template: &str) -> StepOutcome {
    match hub.golden_path_templates().await {
        Ok(templates) if templates.iter().any(|t| t == template) => StepOutcome::Passed,
        Ok(templates) => StepOutcome::failed(format!(
            "template '{template}' not in catalog (found: {})",
            templates.join(", ")
        )),
        Err(e) => StepOutcome::failed(format!("catalog query failed: {e}")),
    }
}

/// Create a component by submitting a scaffolder task and waiting for it to
/// complete.
///
/// Whatever the terminal status, the task's event log is saved under
/// `backstage-tasks-logs/` so a failed scaffolding run can be diagnosed
/// from the artifacts alone.
pub async fn component_created(
    hub: &DeveloperHubClient,
    artifacts: &ArtifactSink,
    request: &ScaffolderRequest,
    run_id: &str,
    policy: PollPolicy,
) -> StepOutcome {
    let task_id = match hub.create_task(request).await {
        Ok(id) => id,
        Err(e) => return StepOutcome::failed(format!("scaffolder task creation failed: {e}")),
    };

    let outcome = hub.wait_task_completed(&task_id, policy).await;

    if let Ok(log) = hub.task_event_log(&task_id).await {
        if let Some(path) =
            artifacts.write("backstage-tasks-logs", &format!("{run_id}.log"), &log)
        {
            info!(task = %task_id, path = %path.display(), "Saved scaffolder task log");
        }
    }

    match outcome {
        PollOutcome::Success => StepOutcome::Passed,
        PollOutcome::TimedOut => StepOutcome::TimedOut(format!(
            "scaffolder task {task_id} still processing at deadline"
        )),
        PollOutcome::Failed(reason) => StepOutcome::Failed(reason),
    }
}
