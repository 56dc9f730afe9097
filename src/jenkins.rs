//! Jenkins collaborator.
//!
//! The Jenkins golden-path templates create one folder per component with a
//! job inside it; the harness seeds that folder with the credentials the
//! pipeline expects, triggers builds, and polls the workflow API until a
//! build reaches a terminal status.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::Error;
use crate::poll::{poll, CheckResult, PollOutcome, PollPolicy};
use crate::Result;

/// A build as reported by the workflow API (`wfapi/describe`).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsBuild {
    /// Build id
    pub id: String,
    /// Display name, e.g. `#3`
    pub name: String,
    /// `SUCCESS`, `FAILURE`, `IN_PROGRESS` or `ABORTED`
    pub status: String,
    /// Wall-clock duration in milliseconds
    #[serde(default)]
    pub duration_millis: u64,
    /// Pipeline stages in execution order
    #[serde(default)]
    pub stages: Vec<JenkinsBuildStage>,
}

/// One stage of a build.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsBuildStage {
    /// Stage id
    pub id: String,
    /// Stage name
    pub name: String,
    /// Stage status, same values as the build status
    pub status: String,
    /// Stage duration in milliseconds
    #[serde(default)]
    pub duration_millis: u64,
}

impl JenkinsBuild {
    /// Whether the build has left `IN_PROGRESS`.
    pub fn is_finished(&self) -> bool {
        self.status != "IN_PROGRESS"
    }

    /// Name of the first stage that did not succeed, for diagnostics.
    pub fn failed_stage(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|s| s.status != "SUCCESS" && s.status != "IN_PROGRESS")
            .map(|s| s.name.as_str())
    }
}

/// Connection settings for the Jenkins instance.
#[derive(Clone, Debug)]
pub struct JenkinsSettings {
    /// Base URL of the Jenkins instance
    pub base_url: String,
    /// Username the harness authenticates as
    pub username: String,
    /// API token for that user
    pub token: String,
}

/// Thin typed wrapper over the Jenkins REST and workflow APIs.
pub struct JenkinsClient {
    http: reqwest::Client,
    settings: JenkinsSettings,
}

impl JenkinsClient {
    /// Create a client from the connection settings.
    pub fn new(settings: JenkinsSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            http,
            settings: JenkinsSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.settings.username, Some(&self.settings.token))
    }

    /// Whether a top-level folder (or job) with this name exists.
    pub async fn folder_exists(&self, folder: &str) -> Result<bool> {
        let response = self
            .request(reqwest::Method::GET, &format!("job/{folder}/api/json"))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::jenkins(format!("folder lookup returned {s}"))),
        }
    }

    /// Delete a folder and every job in it. Absent folders are not an error.
    pub async fn delete_folder_if_exists(&self, folder: &str) -> Result<()> {
        if !self.folder_exists(folder).await? {
            return Ok(());
        }
        let response = self
            .request(reqwest::Method::POST, &format!("job/{folder}/doDelete"))
            .send()
            .await?;
        let status = response.status();
        // Jenkins answers the delete with a redirect to the parent view.
        if !status.is_success() && !status.is_redirection() {
            return Err(Error::jenkins(format!(
                "deleting folder {folder} returned {status}"
            )));
        }
        info!(folder = %folder, "Deleted Jenkins folder");
        Ok(())
    }

    /// Store a secret-text credential in a folder's credential store, with
    /// the credential id doubling as its description.
    pub async fn create_secret_text_credential(
        &self,
        folder: &str,
        id: &str,
        secret: &str,
    ) -> Result<()> {
        let credential = json!({
            "": "0",
            "credentials": {
                "scope": "GLOBAL",
                "id": id,
                "secret": secret,
                "description": id,
                "$class": "org.jenkinsci.plugins.plaincredentials.impl.StringCredentialsImpl",
            }
        });
        self.post_credential(folder, &credential).await?;
        info!(folder = %folder, credential = %id, "Created secret-text credential");
        Ok(())
    }

    /// Store a username/password credential in a folder's credential store.
    pub async fn create_username_password_credential(
        &self,
        folder: &str,
        id: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let credential = json!({
            "": "0",
            "credentials": {
                "scope": "GLOBAL",
                "id": id,
                "username": username,
                "password": password,
                "description": id,
                "$class": "com.cloudbees.plugins.credentials.impl.UsernamePasswordCredentialsImpl",
            }
        });
        self.post_credential(folder, &credential).await?;
        info!(folder = %folder, credential = %id, "Created username/password credential");
        Ok(())
    }

    async fn post_credential(&self, folder: &str, credential: &Value) -> Result<()> {
        let path = format!("job/{folder}/credentials/store/folder/domain/_/createCredentials");
        let response = self
            .request(reqwest::Method::POST, &path)
            .form(&[("json", credential.to_string())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::jenkins(format!(
                "creating credential in {folder} returned {status}: {detail}"
            )));
        }
        Ok(())
    }

    /// Trigger a build of the job inside a folder. The templates name the
    /// job after the folder, so `folder/job` share a name.
    pub async fn trigger_build(&self, folder: &str, job: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, &format!("job/{folder}/job/{job}/build"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            return Err(Error::jenkins(format!(
                "triggering {folder}/{job} returned {status}"
            )));
        }
        info!(folder = %folder, job = %job, "Triggered build");
        Ok(())
    }

    /// Number of the most recent build of a job, when one exists.
    pub async fn latest_build_number(&self, folder: &str, job: &str) -> Result<Option<u64>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("job/{folder}/job/{job}/api/json?tree=lastBuild[number]"),
            )
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::jenkins(format!("job lookup returned {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("job response: {e}")))?;
        Ok(body.pointer("/lastBuild/number").and_then(Value::as_u64))
    }

    /// Describe one build through the workflow API.
    pub async fn build(&self, folder: &str, job: &str, number: u64) -> Result<JenkinsBuild> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("job/{folder}/job/{job}/{number}/wfapi/describe"),
            )
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::jenkins(format!(
                "build {folder}/{job} #{number} returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("wfapi response: {e}")))
    }

    /// Wait for a build to finish successfully.
    ///
    /// `FAILURE` and `ABORTED` are definitive, with the first failed stage
    /// named in the message; transport errors are retried.
    pub async fn wait_build_succeeded(
        &self,
        folder: &str,
        job: &str,
        number: u64,
        policy: PollPolicy,
    ) -> PollOutcome {
        poll("jenkins build succeeded", policy, move || async move {
            match self.build(folder, job, number).await {
                Ok(build) if !build.is_finished() => CheckResult::Pending,
                Ok(build) if build.status == "SUCCESS" => CheckResult::Satisfied,
                Ok(build) => {
                    let stage = build.failed_stage().unwrap_or("unknown stage");
                    CheckResult::failed(format!(
                        "build {folder}/{job} #{number} ended {} at stage '{stage}'",
                        build.status
                    ))
                }
                Err(Error::Serialization(msg)) => CheckResult::failed(msg),
                Err(e) => {
                    debug!(folder = %folder, job = %job, error = %e, "Build fetch failed, retrying");
                    CheckResult::Pending
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILD: &str = r##"{
        "_links": { "self": { "href": "/job/x/job/x/3/wfapi/describe" } },
        "id": "3",
        "name": "#3",
        "status": "FAILURE",
        "startTimeMillis": 1700000000000,
        "endTimeMillis": 1700000180000,
        "durationMillis": 180000,
        "queueDurationMillis": 12,
        "pauseDurationMillis": 0,
        "stages": [
            { "_links": {}, "id": "6", "name": "Build", "execNode": "",
              "status": "SUCCESS", "startTimeMillis": 1, "durationMillis": 2,
              "pauseDurationMillis": 0 },
            { "_links": {}, "id": "9", "name": "Deploy", "execNode": "",
              "status": "FAILURE", "startTimeMillis": 3, "durationMillis": 4,
              "pauseDurationMillis": 0 }
        ]
    }"##;

    #[test]
    fn deserializes_a_workflow_build() {
        let build: JenkinsBuild = serde_json::from_str(BUILD).unwrap();
        assert_eq!(build.name, "#3");
        assert_eq!(build.status, "FAILURE");
        assert_eq!(build.stages.len(), 2);
        assert_eq!(build.duration_millis, 180_000);
    }

    #[test]
    fn failed_stage_names_the_first_non_success() {
        let build: JenkinsBuild = serde_json::from_str(BUILD).unwrap();
        assert!(build.is_finished());
        assert_eq!(build.failed_stage(), Some("Deploy"));
    }

    #[test]
    fn in_progress_builds_are_not_finished() {
        let build: JenkinsBuild = serde_json::from_str(
            r##"{ "id": "1", "name": "#1", "status": "IN_PROGRESS", "stages": [] }"##,
        )
        .unwrap();
        assert!(!build.is_finished());
        assert_eq!(build.failed_stage(), None);
    }
}
