//! Trustification (TPA) collaborator.
//!
//! Authenticates against the OIDC issuer with client credentials and polls
//! the Bombastic search API until the SBOM uploaded by a pipeline run shows
//! up.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Error;
use crate::poll::{poll, CheckResult, PollOutcome, PollPolicy};
use crate::Result;

/// Connection settings for the Trustification deployment, as stored in the
/// integration secret on the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustificationSettings {
    /// Base URL of the Bombastic SBOM API
    pub bombastic_api_url: String,
    /// OIDC issuer the service accounts authenticate against
    pub oidc_issuer_url: String,
    /// OIDC client id
    pub oidc_client_id: String,
    /// OIDC client secret
    pub oidc_client_secret: String,
    /// CycloneDX version the pipeline is expected to upload
    pub supported_cyclonedx_version: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the Trustification SBOM search API.
pub struct TrustificationClient {
    http: reqwest::Client,
    settings: TrustificationSettings,
}

impl TrustificationClient {
    /// Create a client from the integration settings.
    pub fn new(settings: TrustificationSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(Error::Http)?;
        Ok(Self { http, settings })
    }

    /// Settings the client was built from.
    pub fn settings(&self) -> &TrustificationSettings {
        &self.settings
    }

    /// Fetch an access token with the client-credentials grant.
    pub async fn access_token(&self) -> Result<String> {
        let url = format!(
            "{}/protocol/openid-connect/token",
            self.settings.oidc_issuer_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.oidc_client_id.as_str()),
                ("client_secret", self.settings.oidc_client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::trustification(format!(
                "token endpoint returned {status}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("token response: {e}")))?;
        Ok(token.access_token)
    }

    /// How many SBOMs the search index holds for the given name.
    pub async fn sbom_count(&self, sbom_name: &str) -> Result<u64> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/api/v1/sbom/search",
            self.settings.bombastic_api_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", sbom_name)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::trustification(format!(
                "sbom search returned {status}"
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("sbom search response: {e}")))?;
        body.get("total")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::serialization("sbom search response has no total"))
    }

    /// Wait until at least one SBOM with the given name is searchable.
    ///
    /// A response without a `total` field is malformed and definitive;
    /// transport and auth errors are retried, since the index catches up
    /// some time after the pipeline uploads.
    pub async fn wait_for_sbom(&self, sbom_name: &str, policy: PollPolicy) -> PollOutcome {
        let outcome = poll("sbom searchable in trustification", policy, move || async move {
            match self.sbom_count(sbom_name).await {
                Ok(0) => CheckResult::Pending,
                Ok(total) => {
                    info!(sbom = %sbom_name, total, "SBOM found in Trustification");
                    CheckResult::Satisfied
                }
                Err(Error::Serialization(msg)) => CheckResult::failed(msg),
                Err(e) => {
                    debug!(sbom = %sbom_name, error = %e, "SBOM search failed, retrying");
                    CheckResult::Pending
                }
            }
        })
        .await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TrustificationSettings {
        TrustificationSettings {
            bombastic_api_url: "https://sbom.example.test/".into(),
            oidc_issuer_url: "https://sso.example.test/realms/chicken/".into(),
            oidc_client_id: "walker".into(),
            oidc_client_secret: "s3cret".into(),
            supported_cyclonedx_version: "1.4".into(),
        }
    }

    #[test]
    fn client_keeps_its_settings() {
        let client = TrustificationClient::new(settings()).unwrap();
        assert_eq!(client.settings().oidc_client_id, "walker");
        assert_eq!(client.settings().supported_cyclonedx_version, "1.4");
    }

    #[test]
    fn token_response_deserializes_access_token() {
        let raw = r#"{"access_token":"abc","expires_in":300,"token_type":"Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(token.access_token, "abc");
    }
}
