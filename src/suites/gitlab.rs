//! GitLab-backed suite.
//!
//! The advanced scenario mirrors the GitHub walk on GitLab: the
//! golden-path template scaffolds source and GitOps projects with Tekton
//! definitions, merge requests and their merges drive pipeline runs
//! through Pipelines-as-Code, the built image is verified (syft
//! provenance, ACS scan, SBOM in Trustification) and then promoted
//! through every environment by GitOps merge requests gated on the
//! enterprise contract pipeline.

use std::sync::{Arc, Mutex};

use crate::artifacts::ArtifactSink;
use crate::blocks;
use crate::config::HarnessConfig;
use crate::generator::repository_name;
use crate::hub::{component_values, DeveloperHubClient, ScaffolderRequest, ScmHost};
use crate::kube::KubeHarness;
use crate::poll::PollPolicy;
use crate::scenario::{run_with_retries, Scenario, ScenarioReport, StepOutcome};
use crate::scm::GitLabProvider;
use crate::suites::{
    cleanup_component, connect_gitlab, deployment_steps, image_tag, preflight_gitlab,
    resolve_hub_url, step_budget, EXPECTED_PAGE_CONTENT, PIPELINE_DEFINITIONS_FOLDER,
};
use crate::Result;

/// State one scenario run threads between steps.
#[derive(Default)]
struct RunState {
    merge_request: Option<u64>,
    promotion_merge_request: Option<u64>,
    promoted_image: Option<String>,
}

/// Collaborators for the GitLab suite, resolved once per process.
pub struct GitLabSuite {
    cfg: Arc<HarnessConfig>,
    kube: KubeHarness,
    hub: Arc<DeveloperHubClient>,
    gitlab: Arc<GitLabProvider>,
}

impl GitLabSuite {
    /// Run the preflight and resolve every collaborator.
    pub async fn connect(cfg: HarnessConfig, kube: KubeHarness) -> Result<Self> {
        preflight_gitlab(&cfg, &kube).await?;
        let gitlab = connect_gitlab(&cfg, &kube).await?;
        let hub_url = resolve_hub_url(&cfg, &kube).await?;

        Ok(Self {
            cfg: Arc::new(cfg),
            kube,
            hub: Arc::new(DeveloperHubClient::new(&hub_url)?),
            gitlab: Arc::new(gitlab),
        })
    }

    /// Run the advanced scenario, retrying with fresh identifiers.
    pub async fn run_advanced(&self, template: &str) -> ScenarioReport {
        let template = template.to_string();
        run_with_retries(crate::SCENARIO_RETRY_ATTEMPTS, move |_| {
            self.advanced_scenario(&template, repository_name(&template))
        })
        .await
    }

    fn scaffolder_request(&self, template: &str, run_id: &str) -> ScaffolderRequest {
        let values = component_values(
            ScmHost::GitLab {
                group: &self.cfg.gitlab_organization,
            },
            run_id,
            run_id,
            &self.cfg.image_org,
            &self.cfg.image_registry,
            &self.cfg.app_root_namespace,
            "tekton",
        );
        ScaffolderRequest::new(template, values)
    }

    /// The full merge-request-to-prod walk.
    pub fn advanced_scenario(&self, template: &str, run_id: String) -> Scenario {
        let component_policy = PollPolicy::with_timeout(crate::COMPONENT_TIMEOUT);
        let pipeline_policy = PollPolicy::with_timeout(crate::PIPELINE_RUN_TIMEOUT);
        let sbom_policy = PollPolicy::with_timeout(crate::ENDPOINT_READY_TIMEOUT);
        let state = Arc::new(Mutex::new(RunState::default()));
        let artifacts = Arc::new(ArtifactSink::new(self.cfg.artifact_dir.clone(), &run_id));

        let scenario =
            Scenario::new("gitlab-advanced", run_id.clone()).with_artifact_location(artifacts.dir());

        let scenario = {
            let hub = self.hub.clone();
            let template = template.to_string();
            scenario.step(
                "golden path template is in the catalog",
                step_budget(component_policy),
                move || async move { blocks::hub::template_in_catalog(&hub, &template).await },
            )
        };

        let scenario = {
            let hub = self.hub.clone();
            let artifacts = artifacts.clone();
            let request = self.scaffolder_request(template, &run_id);
            let run_id = run_id.clone();
            scenario.step(
                "creates the component",
                step_budget(component_policy),
                move || async move {
                    blocks::hub::component_created(
                        &hub,
                        &artifacts,
                        &request,
                        &run_id,
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let gitlab = self.gitlab.clone();
            let group = self.cfg.gitlab_organization.clone();
            let repository = run_id.clone();
            scenario.step(
                "source project is created with pipeline definitions",
                step_budget(component_policy),
                move || async move {
                    blocks::scm::repository_created_with_folder(
                        gitlab.as_ref(),
                        &group,
                        &repository,
                        PIPELINE_DEFINITIONS_FOLDER,
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let gitlab = self.gitlab.clone();
            let group = self.cfg.gitlab_organization.clone();
            let gitops = format!("{run_id}-gitops");
            scenario.step(
                "gitops project is created with pipeline definitions",
                step_budget(component_policy),
                move || async move {
                    blocks::scm::repository_created_with_folder(
                        gitlab.as_ref(),
                        &group,
                        &gitops,
                        PIPELINE_DEFINITIONS_FOLDER,
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let gitlab = self.gitlab.clone();
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            let state = state.clone();
            scenario.step(
                "merge request triggers a pipeline run",
                step_budget(component_policy),
                move || async move {
                    let id = match project_id(&gitlab, &cfg, &repository).await {
                        Ok(id) => id,
                        Err(outcome) => return outcome,
                    };
                    let iid = match gitlab
                        .create_merge_request_from_main_branch(
                            id,
                            "e2e-check.txt",
                            "pipeline trigger marker\n",
                        )
                        .await
                    {
                        Ok(iid) => iid,
                        Err(e) => {
                            return StepOutcome::failed(format!("merge request failed: {e}"))
                        }
                    };
                    state.lock().unwrap_or_else(|p| p.into_inner()).merge_request = Some(iid);

                    blocks::tekton::pipeline_run_started(
                        &kube,
                        &cfg.ci_namespace(),
                        &repository,
                        "pull_request",
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let kube = self.kube.clone();
            let artifacts = artifacts.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            scenario.step(
                "merge request pipeline run succeeds",
                step_budget(pipeline_policy),
                move || async move {
                    blocks::tekton::pipeline_run_succeeds(
                        &kube,
                        &artifacts,
                        &cfg.ci_namespace(),
                        &repository,
                        "pull_request",
                        pipeline_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let gitlab = self.gitlab.clone();
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            let state = state.clone();
            scenario.step(
                "merging the merge request triggers a push pipeline run",
                step_budget(component_policy),
                move || async move {
                    let id = match project_id(&gitlab, &cfg, &repository).await {
                        Ok(id) => id,
                        Err(outcome) => return outcome,
                    };
                    let iid = {
                        let state = state.lock().unwrap_or_else(|p| p.into_inner());
                        state.merge_request
                    };
                    let Some(iid) = iid else {
                        return StepOutcome::failed("no merge request recorded");
                    };
                    if let Err(e) = gitlab.merge_merge_request(id, iid).await {
                        return StepOutcome::failed(format!("merge failed: {e}"));
                    }

                    blocks::tekton::pipeline_run_started(
                        &kube,
                        &cfg.ci_namespace(),
                        &repository,
                        "push",
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let kube = self.kube.clone();
            let artifacts = artifacts.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            scenario.step(
                "push pipeline run succeeds",
                step_budget(pipeline_policy),
                move || async move {
                    blocks::tekton::pipeline_run_succeeds(
                        &kube,
                        &artifacts,
                        &cfg.ci_namespace(),
                        &repository,
                        "push",
                        pipeline_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let kube = self.kube.clone();
            let artifacts = artifacts.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            scenario.step(
                "build task runs syft from the product registry",
                step_budget(component_policy),
                move || async move {
                    blocks::tekton::syft_image_path_correct(
                        &kube,
                        &artifacts,
                        &cfg.ci_namespace(),
                        &repository,
                        "push",
                    )
                    .await
                },
            )
        };

        let scenario = {
            let kube = self.kube.clone();
            let artifacts = artifacts.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            scenario.step(
                "acs image scan reports success",
                step_budget(component_policy),
                move || async move {
                    blocks::tekton::acs_scan_passed(
                        &kube,
                        &artifacts,
                        &cfg.ci_namespace(),
                        &repository,
                        "push",
                    )
                    .await
                },
            )
        };

        let scenario = deployment_steps(scenario, &self.kube, &self.hub, &self.cfg, &run_id);

        let scenario =
            self.promotion_steps(scenario, &run_id, "development", "stage", &state, &artifacts);
        let scenario = self.promotion_steps(scenario, &run_id, "stage", "prod", &state, &artifacts);

        let scenario = {
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            let state = state.clone();
            scenario.step(
                "sbom of the promoted image is searchable in trustification",
                step_budget(sbom_policy),
                move || async move {
                    let search_key = {
                        let state = state.lock().unwrap_or_else(|p| p.into_inner());
                        state.promoted_image.clone()
                    }
                    .and_then(|image| image_tag(&image))
                    .unwrap_or_else(|| repository.clone());

                    let settings = match kube.trustification_settings(&cfg.root_namespace).await {
                        Ok(settings) => settings,
                        Err(e) => {
                            return StepOutcome::failed(format!(
                                "trustification settings unavailable: {e}"
                            ))
                        }
                    };
                    let client = match crate::trustification::TrustificationClient::new(settings) {
                        Ok(client) => client,
                        Err(e) => {
                            return StepOutcome::failed(format!(
                                "trustification client failed: {e}"
                            ))
                        }
                    };
                    client.wait_for_sbom(&search_key, sbom_policy).await.into()
                },
            )
        };

        let cfg = self.cfg.clone();
        let kube = self.kube.clone();
        let gitlab = self.gitlab.clone();
        let repository = run_id.clone();
        scenario.with_cleanup(move || async move {
            cleanup_component(
                &cfg,
                &kube,
                gitlab.as_ref(),
                &cfg.gitlab_organization,
                &repository,
            )
            .await
        })
    }

    /// One promotion hop: open a promotion merge request in the GitOps
    /// project, wait for the enterprise contract pipeline to gate it,
    /// merge it, and verify the target environment serves the promoted
    /// application.
    fn promotion_steps(
        &self,
        scenario: Scenario,
        run_id: &str,
        from_environment: &'static str,
        to_environment: &'static str,
        state: &Arc<Mutex<RunState>>,
        artifacts: &Arc<ArtifactSink>,
    ) -> Scenario {
        let component_policy = PollPolicy::with_timeout(crate::COMPONENT_TIMEOUT);
        let pipeline_policy = PollPolicy::with_timeout(crate::PIPELINE_RUN_TIMEOUT);
        let health_policy = PollPolicy::with_timeout(crate::ARGO_HEALTH_TIMEOUT);
        let endpoint_policy = PollPolicy::with_timeout(crate::ENDPOINT_READY_TIMEOUT);

        let scenario = {
            let gitlab = self.gitlab.clone();
            let cfg = self.cfg.clone();
            let component = run_id.to_string();
            let gitops = format!("{run_id}-gitops");
            let state = state.clone();
            scenario.step(
                format!("opens a promotion merge request to {to_environment}"),
                step_budget(component_policy),
                move || async move {
                    let id = match project_id(&gitlab, &cfg, &gitops).await {
                        Ok(id) => id,
                        Err(outcome) => return outcome,
                    };
                    match gitlab
                        .create_promotion_merge_request(
                            id,
                            &component,
                            from_environment,
                            to_environment,
                        )
                        .await
                    {
                        Ok((image, iid)) => {
                            let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
                            state.promoted_image = Some(image);
                            state.promotion_merge_request = Some(iid);
                            StepOutcome::Passed
                        }
                        Err(e) => {
                            StepOutcome::failed(format!("promotion merge request failed: {e}"))
                        }
                    }
                },
            )
        };

        let scenario = {
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let gitops = format!("{run_id}-gitops");
            scenario.step(
                format!("promotion to {to_environment} triggers the enterprise contract pipeline"),
                step_budget(component_policy),
                move || async move {
                    blocks::tekton::pipeline_run_started(
                        &kube,
                        &cfg.ci_namespace(),
                        &gitops,
                        "pull_request",
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let kube = self.kube.clone();
            let artifacts = artifacts.clone();
            let cfg = self.cfg.clone();
            let gitops = format!("{run_id}-gitops");
            scenario.step(
                format!("enterprise contract pipeline passes for the {to_environment} promotion"),
                step_budget(pipeline_policy),
                move || async move {
                    blocks::tekton::pipeline_run_succeeds(
                        &kube,
                        &artifacts,
                        &cfg.ci_namespace(),
                        &gitops,
                        "pull_request",
                        pipeline_policy,
                    )
                    .await
                },
            )
        };

        let gitlab = self.gitlab.clone();
        let kube = self.kube.clone();
        let hub = self.hub.clone();
        let cfg = self.cfg.clone();
        let repository = run_id.to_string();
        let gitops = format!("{run_id}-gitops");
        let state = state.clone();
        scenario.step(
            format!("merged promotion deploys to {to_environment}"),
            step_budget(health_policy) + step_budget(endpoint_policy),
            move || async move {
                let id = match project_id(&gitlab, &cfg, &gitops).await {
                    Ok(id) => id,
                    Err(outcome) => return outcome,
                };
                let (iid, image) = {
                    let state = state.lock().unwrap_or_else(|p| p.into_inner());
                    (state.promotion_merge_request, state.promoted_image.clone())
                };
                let Some(iid) = iid else {
                    return StepOutcome::failed("no promotion merge request recorded");
                };
                if let Err(e) = gitlab.merge_merge_request(id, iid).await {
                    return StepOutcome::failed(format!("merging promotion failed: {e}"));
                }
                tracing::info!(
                    environment = %to_environment,
                    image = %image.unwrap_or_default(),
                    "Promotion merged"
                );

                blocks::argo::application_synced_and_serving(
                    &kube,
                    &hub,
                    &cfg.gitops_namespace,
                    &cfg.environment_namespace(to_environment),
                    &repository,
                    to_environment,
                    EXPECTED_PAGE_CONTENT,
                    health_policy,
                    endpoint_policy,
                )
                .await
            },
        )
    }
}

/// Resolve a project's numeric id, folding failures into a step outcome.
async fn project_id(
    gitlab: &GitLabProvider,
    cfg: &HarnessConfig,
    name: &str,
) -> std::result::Result<u64, StepOutcome> {
    match gitlab.project_id(&cfg.gitlab_organization, name).await {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(StepOutcome::failed(format!(
            "project {}/{name} does not exist",
            cfg.gitlab_organization
        ))),
        Err(e) => Err(StepOutcome::failed(format!("project lookup failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A suite wired against unreachable collaborators; scenario builders
    /// never talk to them, so composition can be asserted offline.
    fn offline_suite() -> GitLabSuite {
        let cfg = HarnessConfig::from_lookup(|key| match key {
            "GITLAB_ORGANIZATION_PUBLIC" => Some("my-group".to_string()),
            _ => None,
        });
        let config = ::kube::Config::new("http://127.0.0.1:8080".parse().unwrap());
        let client = ::kube::Client::try_from(config).unwrap();
        GitLabSuite {
            cfg: Arc::new(cfg),
            kube: KubeHarness::from_client(client),
            hub: Arc::new(DeveloperHubClient::new("https://hub.example.test").unwrap()),
            gitlab: Arc::new(GitLabProvider::new("test-token").unwrap()),
        }
    }

    /// The GitLab walk is pipeline-shaped like the GitHub one: both
    /// scaffolded projects carry Tekton definitions, merges trigger push
    /// runs, image checks happen before deployment, and the SBOM check
    /// closes the run.
    #[tokio::test]
    async fn advanced_scenario_is_driven_by_tekton_pipeline_runs() {
        let scenario = offline_suite().advanced_scenario("go", "a1b2c3-go".to_string());
        let names = scenario.step_names();

        assert!(names.contains(&"source project is created with pipeline definitions"));
        assert!(names.contains(&"gitops project is created with pipeline definitions"));
        assert!(names.contains(&"merge request pipeline run succeeds"));
        assert!(names.contains(&"push pipeline run succeeds"));
        assert!(names.contains(&"build task runs syft from the product registry"));
        assert!(names.contains(&"acs image scan reports success"));
        assert_eq!(
            names.last().copied(),
            Some("sbom of the promoted image is searchable in trustification")
        );
    }

    /// Every promotion merge is gated behind the enterprise contract
    /// pipeline run on the gitops project.
    #[tokio::test]
    async fn advanced_scenario_gates_promotion_merges_behind_the_enterprise_contract() {
        let scenario = offline_suite().advanced_scenario("go", "a1b2c3-go".to_string());
        let names = scenario.step_names();

        for environment in ["stage", "prod"] {
            let opened = names
                .iter()
                .position(|n| *n == format!("opens a promotion merge request to {environment}"))
                .expect("promotion merge request step missing");
            let passed = names
                .iter()
                .position(|n| {
                    *n == format!(
                        "enterprise contract pipeline passes for the {environment} promotion"
                    )
                })
                .expect("enterprise contract pass step missing");
            let merged = names
                .iter()
                .position(|n| *n == format!("merged promotion deploys to {environment}"))
                .expect("promotion merge step missing");

            assert!(
                opened < passed && passed < merged,
                "promotion to {environment} must pass the enterprise contract before merging"
            );
        }
    }
}
