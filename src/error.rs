//! Error types for the harness

use thiserror::Error;

/// Main error type for harness operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Required configuration value missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// SCM provider (GitHub, GitLab, Bitbucket) error
    #[error("scm error: {0}")]
    Scm(String),

    /// Developer Hub (Backstage) error
    #[error("developer hub error: {0}")]
    Hub(String),

    /// Jenkins CI error
    #[error("jenkins error: {0}")]
    Jenkins(String),

    /// Trustification (TPA) error
    #[error("trustification error: {0}")]
    Trustification(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an SCM error with the given message
    pub fn scm(msg: impl Into<String>) -> Self {
        Self::Scm(msg.into())
    }

    /// Create a Developer Hub error with the given message
    pub fn hub(msg: impl Into<String>) -> Self {
        Self::Hub(msg.into())
    }

    /// Create a Jenkins error with the given message
    pub fn jenkins(msg: impl Into<String>) -> Self {
        Self::Jenkins(msg.into())
    }

    /// Create a Trustification error with the given message
    pub fn trustification(msg: impl Into<String>) -> Self {
        Self::Trustification(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation Through the Harness
    // ==========================================================================
    //
    // These tests demonstrate how errors flow through the harness during a
    // scenario run. Each error type represents a different failure category
    // with specific handling requirements.

    /// Story: missing configuration fails fast before any scenario step runs
    ///
    /// When a required environment value is absent, the preflight check
    /// surfaces a configuration error naming the variable so the operator
    /// knows what to set.
    #[test]
    fn story_missing_configuration_fails_preflight() {
        let err = Error::config("the 'GITHUB_ORGANIZATION' environment variable is not set");
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("GITHUB_ORGANIZATION"));

        match Error::config("any message") {
            Error::Config(msg) => assert_eq!(msg, "any message"),
            _ => panic!("expected Config variant"),
        }
    }

    /// Story: SCM failures identify the provider operation that broke
    #[test]
    fn story_scm_errors_name_the_failed_operation() {
        let err = Error::scm("github: merging pull request 42 returned 405");
        assert!(err.to_string().contains("scm error"));
        assert!(err.to_string().contains("pull request 42"));

        let err = Error::scm("gitlab: project lookup returned an unexpected body");
        assert!(err.to_string().contains("gitlab"));
    }

    /// Story: a malformed response is a definitive failure, not a retryable one
    ///
    /// Transport errors are retried by conditions, but a response that
    /// arrived and cannot be parsed indicates a confirmed problem.
    #[test]
    fn story_malformed_responses_are_serialization_errors() {
        let err = Error::serialization("scaffolder task response has no 'status' field");
        assert!(err.to_string().contains("serialization error"));
        assert!(err.to_string().contains("status"));
    }

    /// Story: Developer Hub task failures carry the task context
    #[test]
    fn story_hub_errors_carry_task_context() {
        let err = Error::hub("scaffolder task 7f3a ended with status 'failed'");
        assert!(err.to_string().contains("developer hub error"));
        assert!(err.to_string().contains("7f3a"));
    }
}
