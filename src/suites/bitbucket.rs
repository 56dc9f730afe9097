//! Bitbucket-backed suite.
//!
//! The basic scenario covers the Bitbucket scaffolding path: the component
//! is created into a workspace project, the scaffolder's initial push
//! triggers a Tekton pipeline through Pipelines-as-Code, and the result
//! deploys to development.

use std::sync::Arc;

use crate::artifacts::ArtifactSink;
use crate::blocks;
use crate::config::HarnessConfig;
use crate::error::Error;
use crate::generator::repository_name;
use crate::hub::{component_values, DeveloperHubClient, ScaffolderRequest, ScmHost};
use crate::kube::KubeHarness;
use crate::poll::PollPolicy;
use crate::scenario::{run_with_retries, Scenario, ScenarioReport};
use crate::scm::BitbucketProvider;
use crate::suites::{
    cleanup_component, deployment_steps, preflight_bitbucket, resolve_hub_url, step_budget,
    PIPELINE_DEFINITIONS_FOLDER,
};
use crate::Result;

/// Collaborators for the Bitbucket suite, resolved once per process.
pub struct BitbucketSuite {
    cfg: Arc<HarnessConfig>,
    kube: KubeHarness,
    hub: Arc<DeveloperHubClient>,
    bitbucket: Arc<BitbucketProvider>,
    username: String,
}

impl BitbucketSuite {
    /// Run the preflight and resolve every collaborator.
    pub async fn connect(cfg: HarnessConfig, kube: KubeHarness) -> Result<Self> {
        preflight_bitbucket(&cfg, &kube).await?;
        let (username, app_password) = match (&cfg.bitbucket_username, &cfg.bitbucket_app_password)
        {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => {
                return Err(Error::config(
                    "BITBUCKET_USERNAME and BITBUCKET_APP_PASSWORD must both be set",
                ))
            }
        };
        let bitbucket = BitbucketProvider::new(&username, &app_password)?;
        let hub_url = resolve_hub_url(&cfg, &kube).await?;

        Ok(Self {
            cfg: Arc::new(cfg),
            kube,
            hub: Arc::new(DeveloperHubClient::new(&hub_url)?),
            bitbucket: Arc::new(bitbucket),
            username,
        })
    }

    /// Run the basic scenario, retrying with fresh identifiers.
    pub async fn run_basic(&self, template: &str) -> ScenarioReport {
        let template = template.to_string();
        run_with_retries(crate::SCENARIO_RETRY_ATTEMPTS, move |_| {
            self.basic_scenario(&template, repository_name(&template))
        })
        .await
    }

    fn scaffolder_request(&self, template: &str, run_id: &str) -> ScaffolderRequest {
        let values = component_values(
            ScmHost::Bitbucket {
                workspace: &self.cfg.bitbucket_workspace,
                project: &self.cfg.bitbucket_project,
                username: &self.username,
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

    /// Scaffold, build on the initial push, deploy to development.
    pub fn basic_scenario(&self, template: &str, run_id: String) -> Scenario {
        let component_policy = PollPolicy::with_timeout(crate::COMPONENT_TIMEOUT);
        let pipeline_policy = PollPolicy::with_timeout(crate::PIPELINE_RUN_TIMEOUT);
        let artifacts = Arc::new(ArtifactSink::new(self.cfg.artifact_dir.clone(), &run_id));

        let scenario =
            Scenario::new("bitbucket-basic", run_id.clone()).with_artifact_location(artifacts.dir());

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
            let bitbucket = self.bitbucket.clone();
            let workspace = self.cfg.bitbucket_workspace.clone();
            let repository = run_id.clone();
            scenario.step(
                "source repository is created with pipeline definitions",
                step_budget(component_policy),
                move || async move {
                    blocks::scm::repository_created_with_folder(
                        bitbucket.as_ref(),
                        &workspace,
                        &repository,
                        PIPELINE_DEFINITIONS_FOLDER,
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let bitbucket = self.bitbucket.clone();
            let workspace = self.cfg.bitbucket_workspace.clone();
            let gitops = format!("{run_id}-gitops");
            scenario.step(
                "gitops repository is created with pipeline definitions",
                step_budget(component_policy),
                move || async move {
                    blocks::scm::repository_created_with_folder(
                        bitbucket.as_ref(),
                        &workspace,
                        &gitops,
                        PIPELINE_DEFINITIONS_FOLDER,
                        component_policy,
                    )
                    .await
                },
            )
        };

        let scenario = {
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            scenario.step(
                "initial push triggers a pipeline run",
                step_budget(component_policy),
                move || async move {
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

        let scenario = deployment_steps(scenario, &self.kube, &self.hub, &self.cfg, &run_id);

        let cfg = self.cfg.clone();
        let kube = self.kube.clone();
        let bitbucket = self.bitbucket.clone();
        let repository = run_id.clone();
        scenario.with_cleanup(move || async move {
            cleanup_component(
                &cfg,
                &kube,
                bitbucket.as_ref(),
                &cfg.bitbucket_workspace,
                &repository,
            )
            .await
        })
    }
}
