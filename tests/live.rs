//! End-to-end tests against a live product cluster
//!
//! These tests require a cluster with Trusted Application Pipelines
//! installed and provider credentials in the environment. They are ignored
//! by default and can be run with:
//!
//! ```bash
//! cargo test --test live -- --ignored
//! ```

mod live_tests;
