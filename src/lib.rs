//! tap-e2e - end-to-end test harness for Trusted Application Pipelines
//!
//! The harness validates that creating a component from a golden-path
//! template results in a working, promoted, scanned and signed deployment
//! across environments. It drives external systems - SCM providers, a
//! developer portal (Developer Hub), a GitOps engine (ArgoCD), Tekton
//! pipelines, Jenkins and a supply-chain transparency service
//! (Trustification) - and asserts on their externally observable state.
//!
//! # Architecture
//!
//! Everything is built on a small orchestration core:
//!
//! - [`poll`] - repeatedly evaluates a condition against an external system
//!   until it is satisfied, definitively failed, or a deadline elapses
//! - [`scenario`] - ordered named steps with per-step timeouts, an
//!   abort-vs-continue decision on failure, a single-shot cleanup guarantee
//!   and a scenario-level retry wrapper
//!
//! The remaining modules are thin typed clients over each target system's
//! REST or Kubernetes API, and scenario definitions composed from them:
//!
//! - [`config`] - configuration resolved once at process start
//! - [`kube`] - Kubernetes collaborator (secrets, Routes, Tekton, ArgoCD)
//! - [`scm`] - GitHub, GitLab and Bitbucket providers
//! - [`hub`] - Developer Hub (Backstage) client
//! - [`jenkins`] - Jenkins CI client
//! - [`trustification`] - SBOM transparency service client
//! - [`blocks`] - reusable verification blocks composing clients + poller
//! - [`suites`] - end-to-end scenario definitions
//! - [`artifacts`] - diagnostic artifact capture keyed by run identifier
//! - [`generator`] - random run-identifier generation
//! - [`error`] - error types for the harness

#![deny(missing_docs)]

pub mod artifacts;
pub mod blocks;
pub mod config;
pub mod error;
pub mod generator;
pub mod hub;
pub mod jenkins;
pub mod kube;
pub mod poll;
pub mod scenario;
pub mod scm;
pub mod suites;
pub mod trustification;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

use std::time::Duration;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// These constants define the default values used throughout the harness.
// Centralizing them here keeps suite definitions, config fallbacks and test
// fixtures consistent.

/// Default namespace where the pipeline product itself is installed
pub const DEFAULT_ROOT_NAMESPACE: &str = "rhtap";

/// Default namespace of the GitOps (ArgoCD) installation
pub const DEFAULT_GITOPS_NAMESPACE: &str = "rhtap-gitops";

/// Default namespace of the Developer Hub installation
pub const DEFAULT_HUB_NAMESPACE: &str = "rhtap-dh";

/// Default root namespace for application components
///
/// Environment namespaces are derived from it: `<root>-development`,
/// `<root>-stage`, `<root>-prod` and `<root>-ci`.
pub const DEFAULT_APP_ROOT_NAMESPACE: &str = "rhtap-app";

/// Default image registry host components are pushed to
pub const DEFAULT_IMAGE_REGISTRY: &str = "quay.io";

/// Default image registry organization
pub const DEFAULT_IMAGE_ORG: &str = "rhtap";

/// How many times a failed scenario is re-run with fresh identifiers
pub const SCENARIO_RETRY_ATTEMPTS: u32 = 3;

/// Interval between condition evaluations unless a call site needs otherwise
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout for component/repository creation steps
pub const COMPONENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for a PipelineRun to be triggered and finish
pub const PIPELINE_RUN_TIMEOUT: Duration = Duration::from_secs(900);

/// Timeout for an ArgoCD application to become healthy
pub const ARGO_HEALTH_TIMEOUT: Duration = Duration::from_secs(500);

/// Timeout for a synced component endpoint to start serving
pub const ENDPOINT_READY_TIMEOUT: Duration = Duration::from_secs(600);
