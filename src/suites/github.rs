//! GitHub-backed suites.
//!
//! The advanced scenario walks a component through the whole product: the
//! golden-path template scaffolds source and GitOps repositories, a pull
//! request and its merge drive Tekton pipeline runs, the built image is
//! verified (syft provenance, ACS scan, SBOM in Trustification) and then
//! promoted through every environment by GitOps pull requests.

use std::sync::{Arc, Mutex};

use crate::artifacts::ArtifactSink;
use crate::blocks;
use crate::config::HarnessConfig;
use crate::generator::repository_name;
use crate::hub::{component_values, DeveloperHubClient, ScaffolderRequest, ScmHost};
use crate::jenkins::JenkinsClient;
use crate::kube::KubeHarness;
use crate::poll::{poll, CheckResult, PollPolicy};
use crate::scenario::{run_with_retries, Scenario, ScenarioReport, StepOutcome};
use crate::scm::GitHubProvider;
use crate::suites::{
    cleanup_component, connect_github, image_tag, preflight_github, resolve_hub_url,
    resolve_jenkins_settings, step_budget, EXPECTED_PAGE_CONTENT, PIPELINE_DEFINITIONS_FOLDER,
};
use crate::Result;

/// State one scenario run threads between steps.
#[derive(Default)]
struct RunState {
    pull_request: Option<u64>,
    promotion_pull_request: Option<u64>,
    promoted_image: Option<String>,
    jenkins_build: Option<u64>,
}

/// Collaborators for the GitHub suites, resolved once per process.
pub struct GitHubSuite {
    cfg: Arc<HarnessConfig>,
    kube: KubeHarness,
    hub: Arc<DeveloperHubClient>,
    github: Arc<GitHubProvider>,
}

impl GitHubSuite {
    /// Run the preflight and resolve every collaborator.
    pub async fn connect(cfg: HarnessConfig, kube: KubeHarness) -> Result<Self> {
        preflight_github(&cfg, &kube).await?;
        let github = connect_github(&cfg, &kube).await?;
        let hub_url = resolve_hub_url(&cfg, &kube).await?;

        Ok(Self {
            cfg: Arc::new(cfg),
            kube,
            hub: Arc::new(DeveloperHubClient::new(&hub_url)?),
            github: Arc::new(github),
        })
    }

    /// One artifact sink per run: attempts never mix their diagnostics.
    fn artifacts_for(&self, run_id: &str) -> Arc<ArtifactSink> {
        Arc::new(ArtifactSink::new(self.cfg.artifact_dir.clone(), run_id))
    }

    /// Run the advanced scenario, retrying with fresh identifiers.
    pub async fn run_advanced(&self, template: &str) -> ScenarioReport {
        let template = template.to_string();
        run_with_retries(crate::SCENARIO_RETRY_ATTEMPTS, move |_| {
            self.advanced_scenario(&template, repository_name(&template))
        })
        .await
    }

    /// Run the basic scenario, retrying with fresh identifiers.
    pub async fn run_basic(&self, template: &str) -> ScenarioReport {
        let template = template.to_string();
        run_with_retries(crate::SCENARIO_RETRY_ATTEMPTS, move |_| {
            self.basic_scenario(&template, repository_name(&template))
        })
        .await
    }

    /// Run the Jenkins scenario, retrying with fresh identifiers.
    pub async fn run_jenkins(&self, template: &str) -> ScenarioReport {
        let settings = match resolve_jenkins_settings(&self.cfg, &self.kube).await {
            Ok(settings) => settings,
            Err(e) => {
                return failed_preflight_report("github-jenkins", &format!("{e}"));
            }
        };
        let jenkins = match JenkinsClient::new(settings) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                return failed_preflight_report("github-jenkins", &format!("{e}"));
            }
        };

        let template = template.to_string();
        run_with_retries(crate::SCENARIO_RETRY_ATTEMPTS, move |_| {
            self.jenkins_scenario(jenkins.clone(), &template, repository_name(&template))
        })
        .await
    }

    fn scaffolder_request(&self, template: &str, run_id: &str, ci_type: &str) -> ScaffolderRequest {
        let values = component_values(
            ScmHost::GitHub {
                organization: &self.cfg.github_organization,
            },
            run_id,
            run_id,
            &self.cfg.image_org,
            &self.cfg.image_registry,
            &self.cfg.app_root_namespace,
            ci_type,
        );
        ScaffolderRequest::new(template, values)
    }

    /// Steps 1-4 are shared by every GitHub scenario: template lookup,
    /// component creation, and both repositories appearing with content.
    fn scaffolding_steps(
        &self,
        scenario: Scenario,
        template: &str,
        run_id: &str,
        ci_type: &str,
        source_marker: &str,
        artifacts: &Arc<ArtifactSink>,
    ) -> Scenario {
        let component_policy = PollPolicy::with_timeout(crate::COMPONENT_TIMEOUT);

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
            let request = self.scaffolder_request(template, run_id, ci_type);
            let run_id = run_id.to_string();
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
            let github = self.github.clone();
            let owner = self.cfg.github_organization.clone();
            let repository = run_id.to_string();
            let marker = source_marker.to_string();
            scenario.step(
                "source repository is created with pipeline definitions",
                step_budget(component_policy),
                move || async move {
                    blocks::scm::repository_created_with_folder(
                        github.as_ref(),
                        &owner,
                        &repository,
                        &marker,
                        component_policy,
                    )
                    .await
                },
            )
        };

        let github = self.github.clone();
        let owner = self.cfg.github_organization.clone();
        let gitops = format!("{run_id}-gitops");
        scenario.step(
            "gitops repository is created with pipeline definitions",
            step_budget(component_policy),
            move || async move {
                blocks::scm::repository_created_with_folder(
                    github.as_ref(),
                    &owner,
                    &gitops,
                    PIPELINE_DEFINITIONS_FOLDER,
                    component_policy,
                )
                .await
            },
        )
    }

    fn development_steps(&self, scenario: Scenario, run_id: &str) -> Scenario {
        super::deployment_steps(scenario, &self.kube, &self.hub, &self.cfg, run_id)
    }

    /// One promotion hop: open a promotion pull request, wait for the
    /// enterprise contract pipeline to gate it, merge it, and verify the
    /// target environment serves the promoted application.
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
            let github = self.github.clone();
            let owner = self.cfg.github_organization.clone();
            let gitops = format!("{run_id}-gitops");
            let state = state.clone();
            scenario.step(
                format!("opens a promotion pull request to {to_environment}"),
                step_budget(component_policy),
                move || async move {
                    match github
                        .create_promotion_pull_request(
                            &owner,
                            &gitops,
                            from_environment,
                            to_environment,
                        )
                        .await
                    {
                        Ok((image, number)) => {
                            let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
                            state.promoted_image = Some(image);
                            state.promotion_pull_request = Some(number);
                            StepOutcome::Passed
                        }
                        Err(e) => {
                            StepOutcome::failed(format!("promotion pull request failed: {e}"))
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

        let kube = self.kube.clone();
        let hub = self.hub.clone();
        let github = self.github.clone();
        let cfg = self.cfg.clone();
        let repository = run_id.to_string();
        let gitops = format!("{run_id}-gitops");
        let state = state.clone();
        scenario.step(
            format!("merged promotion deploys to {to_environment}"),
            step_budget(health_policy) + step_budget(endpoint_policy),
            move || async move {
                let (number, image) = {
                    let state = state.lock().unwrap_or_else(|p| p.into_inner());
                    (state.promotion_pull_request, state.promoted_image.clone())
                };
                let Some(number) = number else {
                    return StepOutcome::failed("no promotion pull request recorded");
                };
                if let Err(e) = github
                    .merge_pull_request(&cfg.github_organization, &gitops, number)
                    .await
                {
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

    fn with_component_cleanup(&self, scenario: Scenario, run_id: &str) -> Scenario {
        let cfg = self.cfg.clone();
        let kube = self.kube.clone();
        let github = self.github.clone();
        let repository = run_id.to_string();
        scenario.with_cleanup(move || async move {
            cleanup_component(
                &cfg,
                &kube,
                github.as_ref(),
                &cfg.github_organization,
                &repository,
            )
            .await
        })
    }

    /// The full pull-request-to-prod walk.
    pub fn advanced_scenario(&self, template: &str, run_id: String) -> Scenario {
        let component_policy = PollPolicy::with_timeout(crate::COMPONENT_TIMEOUT);
        let pipeline_policy = PollPolicy::with_timeout(crate::PIPELINE_RUN_TIMEOUT);
        let sbom_policy = PollPolicy::with_timeout(crate::ENDPOINT_READY_TIMEOUT);
        let state = Arc::new(Mutex::new(RunState::default()));

        let artifacts = self.artifacts_for(&run_id);

        let scenario =
            Scenario::new("github-advanced", run_id.clone()).with_artifact_location(artifacts.dir());
        let scenario = self.scaffolding_steps(
            scenario,
            template,
            &run_id,
            "tekton",
            PIPELINE_DEFINITIONS_FOLDER,
            &artifacts,
        );

        let scenario = {
            let github = self.github.clone();
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            let state = state.clone();
            scenario.step(
                "pull request triggers a pipeline run",
                step_budget(component_policy),
                move || async move {
                    let number = match github
                        .create_pull_request_from_main_branch(
                            &cfg.github_organization,
                            &repository,
                            "e2e-check.txt",
                            "pipeline trigger marker\n",
                        )
                        .await
                    {
                        Ok(number) => number,
                        Err(e) => {
                            return StepOutcome::failed(format!("pull request failed: {e}"))
                        }
                    };
                    state.lock().unwrap_or_else(|p| p.into_inner()).pull_request = Some(number);

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
                "pull request pipeline run succeeds",
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
            let github = self.github.clone();
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            let state = state.clone();
            scenario.step(
                "merging the pull request triggers a push pipeline run",
                step_budget(component_policy),
                move || async move {
                    let number = {
                        let state = state.lock().unwrap_or_else(|p| p.into_inner());
                        state.pull_request
                    };
                    let Some(number) = number else {
                        return StepOutcome::failed("no pull request recorded");
                    };
                    if let Err(e) = github
                        .merge_pull_request(&cfg.github_organization, &repository, number)
                        .await
                    {
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

        let scenario = self.development_steps(scenario, &run_id);
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

        self.with_component_cleanup(scenario, &run_id)
    }

    /// The short push-to-development walk.
    pub fn basic_scenario(&self, template: &str, run_id: String) -> Scenario {
        let component_policy = PollPolicy::with_timeout(crate::COMPONENT_TIMEOUT);
        let pipeline_policy = PollPolicy::with_timeout(crate::PIPELINE_RUN_TIMEOUT);

        let artifacts = self.artifacts_for(&run_id);

        let scenario =
            Scenario::new("github-basic", run_id.clone()).with_artifact_location(artifacts.dir());
        let scenario = self.scaffolding_steps(
            scenario,
            template,
            &run_id,
            "tekton",
            PIPELINE_DEFINITIONS_FOLDER,
            &artifacts,
        );

        let scenario = {
            let github = self.github.clone();
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let repository = run_id.clone();
            scenario.step(
                "push to main triggers a pipeline run",
                step_budget(component_policy),
                move || async move {
                    if let Err(e) = github
                        .create_empty_commit(&cfg.github_organization, &repository)
                        .await
                    {
                        return StepOutcome::failed(format!("empty commit failed: {e}"));
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

        let scenario = self.development_steps(scenario, &run_id);
        self.with_component_cleanup(scenario, &run_id)
    }

    /// The Jenkins-built walk: the template wires a Jenkinsfile instead of
    /// Tekton definitions, so the harness seeds the generated Jenkins
    /// folder with credentials and drives a build directly.
    pub fn jenkins_scenario(
        &self,
        jenkins: Arc<JenkinsClient>,
        template: &str,
        run_id: String,
    ) -> Scenario {
        let component_policy = PollPolicy::with_timeout(crate::COMPONENT_TIMEOUT);
        let build_policy = PollPolicy::with_timeout(crate::PIPELINE_RUN_TIMEOUT);
        let state = Arc::new(Mutex::new(RunState::default()));

        let artifacts = self.artifacts_for(&run_id);

        let scenario =
            Scenario::new("github-jenkins", run_id.clone()).with_artifact_location(artifacts.dir());
        let scenario = self.scaffolding_steps(
            scenario,
            template,
            &run_id,
            "jenkins",
            "Jenkinsfile",
            &artifacts,
        );

        let scenario = {
            let jenkins = jenkins.clone();
            let kube = self.kube.clone();
            let cfg = self.cfg.clone();
            let folder = run_id.clone();
            scenario.step(
                "seeds the jenkins folder with pipeline credentials",
                step_budget(component_policy),
                move || async move {
                    match seed_jenkins_credentials(&jenkins, &kube, &cfg, &folder).await {
                        Ok(()) => StepOutcome::Passed,
                        Err(e) => StepOutcome::failed(format!("credential seeding failed: {e}")),
                    }
                },
            )
        };

        let scenario = {
            let jenkins = jenkins.clone();
            let job = run_id.clone();
            let state = state.clone();
            scenario.step(
                "triggers a jenkins build",
                step_budget(component_policy),
                move || async move {
                    if let Err(e) = jenkins.trigger_build(&job, &job).await {
                        return StepOutcome::failed(format!("build trigger failed: {e}"));
                    }
                    let outcome = poll("jenkins build queued", component_policy, || {
                        let jenkins = jenkins.clone();
                        let job = job.clone();
                        let state = state.clone();
                        async move {
                            match jenkins.latest_build_number(&job, &job).await {
                                Ok(Some(number)) => {
                                    state
                                        .lock()
                                        .unwrap_or_else(|p| p.into_inner())
                                        .jenkins_build = Some(number);
                                    CheckResult::Satisfied
                                }
                                Ok(None) | Err(_) => CheckResult::Pending,
                            }
                        }
                    })
                    .await;
                    outcome.into()
                },
            )
        };

        let scenario = {
            let jenkins = jenkins.clone();
            let job = run_id.clone();
            let state = state.clone();
            scenario.step(
                "jenkins build succeeds",
                step_budget(build_policy),
                move || async move {
                    let number = {
                        let state = state.lock().unwrap_or_else(|p| p.into_inner());
                        state.jenkins_build
                    };
                    let Some(number) = number else {
                        return StepOutcome::failed("no jenkins build recorded");
                    };
                    jenkins
                        .wait_build_succeeded(&job, &job, number, build_policy)
                        .await
                        .into()
                },
            )
        };

        let scenario = self.development_steps(scenario, &run_id);

        let cfg = self.cfg.clone();
        let kube = self.kube.clone();
        let github = self.github.clone();
        let repository = run_id.clone();
        scenario.with_cleanup(move || async move {
            let mut ok = true;
            if cfg.clean_after_tests {
                if let Err(e) = jenkins.delete_folder_if_exists(&repository).await {
                    tracing::warn!(folder = %repository, error = %e, "Could not delete Jenkins folder");
                    ok = false;
                }
            }
            cleanup_component(
                &cfg,
                &kube,
                github.as_ref(),
                &cfg.github_organization,
                &repository,
            )
            .await
                && ok
        })
    }
}

/// Credentials the generated Jenkinsfile expects in its folder store.
async fn seed_jenkins_credentials(
    jenkins: &JenkinsClient,
    kube: &KubeHarness,
    cfg: &HarnessConfig,
    folder: &str,
) -> Result<()> {
    let token = super::resolve_github_token(cfg, kube).await?;
    jenkins
        .create_secret_text_credential(folder, "GITOPS_AUTH_PASSWORD", &token)
        .await?;
    jenkins
        .create_username_password_credential(folder, "GITOPS_CREDENTIALS", "fakeUsername", &token)
        .await?;

    jenkins
        .create_secret_text_credential(
            folder,
            "COSIGN_PUBLIC_KEY",
            &kube.cosign_public_key(&cfg.root_namespace).await?,
        )
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "COSIGN_SECRET_KEY",
            &kube.cosign_private_key(&cfg.root_namespace).await?,
        )
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "COSIGN_SECRET_PASSWORD",
            &kube.cosign_password(&cfg.root_namespace).await?,
        )
        .await?;

    jenkins
        .create_secret_text_credential(folder, "IMAGE_REGISTRY_USER", &cfg.image_registry_username)
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "IMAGE_REGISTRY_PASSWORD",
            &cfg.image_registry_password,
        )
        .await?;

    jenkins
        .create_secret_text_credential(
            folder,
            "ROX_API_TOKEN",
            &kube.acs_token(&cfg.root_namespace).await?,
        )
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "ROX_CENTRAL_ENDPOINT",
            &kube.acs_endpoint(&cfg.root_namespace).await?,
        )
        .await?;

    let tpa = kube.trustification_settings(&cfg.root_namespace).await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "TRUSTIFICATION_BOMBASTIC_API_URL",
            &tpa.bombastic_api_url,
        )
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "TRUSTIFICATION_OIDC_ISSUER_URL",
            &tpa.oidc_issuer_url,
        )
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "TRUSTIFICATION_OIDC_CLIENT_ID",
            &tpa.oidc_client_id,
        )
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "TRUSTIFICATION_OIDC_CLIENT_SECRET",
            &tpa.oidc_client_secret,
        )
        .await?;
    jenkins
        .create_secret_text_credential(
            folder,
            "TRUSTIFICATION_SUPPORTED_CYCLONEDX_VERSION",
            &tpa.supported_cyclonedx_version,
        )
        .await?;

    Ok(())
}

/// A report for a scenario that could not even be constructed (missing
/// collaborator configuration). Counts as an aborted run.
fn failed_preflight_report(scenario: &str, reason: &str) -> ScenarioReport {
    tracing::error!(scenario = %scenario, error = %reason, "Suite preflight failed");
    ScenarioReport {
        scenario: scenario.to_string(),
        run_id: String::new(),
        steps: Vec::new(),
        aborted_at: Some(format!("preflight: {reason}")),
        cleanup_ok: None,
        artifacts_dir: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A suite wired against unreachable collaborators; scenario builders
    /// never talk to them, so composition can be asserted offline.
    fn offline_suite() -> GitHubSuite {
        let cfg = HarnessConfig::from_lookup(|key| match key {
            "GITHUB_ORGANIZATION" => Some("my-org".to_string()),
            _ => None,
        });
        let config = ::kube::Config::new("http://127.0.0.1:8080".parse().unwrap());
        let client = ::kube::Client::try_from(config).unwrap();
        GitHubSuite {
            cfg: Arc::new(cfg),
            kube: KubeHarness::from_client(client),
            hub: Arc::new(DeveloperHubClient::new("https://hub.example.test").unwrap()),
            github: Arc::new(GitHubProvider::new("test-token").unwrap()),
        }
    }

    /// Every promotion merge is gated behind the enterprise contract
    /// pipeline run on the gitops repository.
    #[tokio::test]
    async fn advanced_scenario_gates_promotion_merges_behind_the_enterprise_contract() {
        let scenario = offline_suite().advanced_scenario("go", "a1b2c3-go".to_string());
        let names = scenario.step_names();

        for environment in ["stage", "prod"] {
            let opened = names
                .iter()
                .position(|n| *n == format!("opens a promotion pull request to {environment}"))
                .expect("promotion pull request step missing");
            let started = names
                .iter()
                .position(|n| {
                    *n == format!(
                        "promotion to {environment} triggers the enterprise contract pipeline"
                    )
                })
                .expect("enterprise contract trigger step missing");
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
                opened < started && started < passed && passed < merged,
                "promotion to {environment} must pass the enterprise contract before merging"
            );
        }
    }

    /// The SBOM check runs last, once an image has been promoted.
    #[tokio::test]
    async fn advanced_scenario_checks_the_sbom_after_the_final_promotion() {
        let scenario = offline_suite().advanced_scenario("go", "a1b2c3-go".to_string());
        let names = scenario.step_names();
        assert_eq!(
            names.last().copied(),
            Some("sbom of the promoted image is searchable in trustification")
        );
    }

    /// Both scaffolder-created repositories must carry pipeline
    /// definitions; the gitops copy is what the promotion gate runs from.
    #[tokio::test]
    async fn scaffolding_requires_pipeline_definitions_in_both_repositories() {
        let scenario = offline_suite().basic_scenario("go", "a1b2c3-go".to_string());
        let names = scenario.step_names();
        assert!(names.contains(&"source repository is created with pipeline definitions"));
        assert!(names.contains(&"gitops repository is created with pipeline definitions"));
        assert_eq!(PIPELINE_DEFINITIONS_FOLDER, ".tekton");
    }
}
