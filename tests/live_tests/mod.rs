//! Live-cluster tests for the scenario harness
//!
//! These tests tell the story of a QE engineer pointing the harness at a
//! freshly installed cluster: first the cluster and its collaborators are
//! reachable, then whole scenarios run end to end.
//!
//! # Test Organization
//!
//! - `cluster_access`: Stories about resolving collaborators from the
//!   cluster (namespaces, integration secrets, the Developer Hub Route)
//!
//! - `suite_smoke`: Full scenario runs, one per provider path (slow, they
//!   scaffold real repositories and wait out real pipelines)
//!
//! # Running These Tests
//!
//! These tests are ignored by default because they require a product
//! cluster and credentials:
//!
//! ```bash
//! # Collaborator resolution only (~1min)
//! cargo test --test live cluster_access -- --ignored
//!
//! # Full scenarios (~30-60min each)
//! cargo test --test live suite_smoke -- --ignored --nocapture
//! ```

mod cluster_access;
mod helpers;
mod suite_smoke;
