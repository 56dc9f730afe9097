//! Bitbucket provider.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;

use crate::error::Error;
use crate::scm::ScmProvider;
use crate::Result;

const API_BASE: &str = "https://api.bitbucket.org/2.0";

/// Thin typed wrapper over the Bitbucket Cloud REST API.
pub struct BitbucketProvider {
    http: reqwest::Client,
    base: String,
    username: String,
    app_password: String,
}

impl BitbucketProvider {
    /// Create a provider authenticating with username + app password.
    pub fn new(username: &str, app_password: &str) -> Result<Self> {
        Self::with_base(username, app_password, API_BASE)
    }

    /// Create a provider against a non-default API base (test servers).
    pub fn with_base(username: &str, app_password: &str, base: &str) -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(Error::Http)?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            username: username.to_string(),
            app_password: app_password.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn get_status(&self, path: &str) -> Result<StatusCode> {
        let response = self
            .http
            .get(self.url(path))
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .await?;
        Ok(response.status())
    }
}

#[async_trait]
impl ScmProvider for BitbucketProvider {
    async fn repository_exists(&self, workspace: &str, repository: &str) -> Result<bool> {
        match self
            .get_status(&format!("repositories/{workspace}/{repository}"))
            .await?
        {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::scm(format!(
                "bitbucket: repository lookup returned {s}"
            ))),
        }
    }

    async fn folder_exists(&self, workspace: &str, repository: &str, path: &str) -> Result<bool> {
        match self
            .get_status(&format!(
                "repositories/{workspace}/{repository}/src/main/{path}"
            ))
            .await?
        {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::scm(format!("bitbucket: src lookup returned {s}"))),
        }
    }

    async fn delete_repository_if_exists(&self, workspace: &str, repository: &str) -> Result<()> {
        if !self.repository_exists(workspace, repository).await? {
            return Ok(());
        }
        let response = self
            .http
            .delete(self.url(&format!("repositories/{workspace}/{repository}")))
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(Error::scm(format!(
                "bitbucket: deleting {workspace}/{repository} returned {status}"
            )));
        }
        warn!(repository = %repository, workspace = %workspace, "Deleted repository");
        Ok(())
    }
}
