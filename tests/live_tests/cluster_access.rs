//! Stories about resolving collaborators from a product cluster
//!
//! A correctly installed cluster carries the product namespaces, the
//! integration secrets, and a routable Developer Hub. Each test verifies
//! one resolution path the suites depend on.

use tap_e2e::hub::DeveloperHubClient;
use tap_e2e::suites::{resolve_github_token, resolve_hub_url};

use super::helpers::connect;

// =============================================================================
// Namespaces and Routes
// =============================================================================

#[tokio::test]
#[ignore]
async fn product_namespaces_exist() {
    let (cfg, kube) = connect().await;

    let ci_namespace = cfg.ci_namespace();
    for namespace in [
        &cfg.root_namespace,
        &cfg.gitops_namespace,
        &cfg.hub_namespace,
        &ci_namespace,
    ] {
        let exists = kube
            .namespace_exists(namespace)
            .await
            .expect("namespace lookup failed");
        assert!(exists, "namespace {namespace} is missing");
    }
}

#[tokio::test]
#[ignore]
async fn developer_hub_route_resolves_and_serves_the_catalog() {
    let (cfg, kube) = connect().await;

    let url = resolve_hub_url(&cfg, &kube)
        .await
        .expect("hub URL did not resolve");
    assert!(url.starts_with("https://"));

    let hub = DeveloperHubClient::new(&url).expect("hub client construction failed");
    let templates = hub
        .golden_path_templates()
        .await
        .expect("catalog query failed");
    assert!(
        !templates.is_empty(),
        "catalog has no golden path templates registered"
    );
}

// =============================================================================
// Integration Secrets
// =============================================================================

#[tokio::test]
#[ignore]
async fn signing_and_acs_secrets_are_readable() {
    let (cfg, kube) = connect().await;

    let public_key = kube
        .cosign_public_key(&cfg.root_namespace)
        .await
        .expect("cosign public key missing");
    assert!(public_key.contains("BEGIN PUBLIC KEY"));

    let endpoint = kube
        .acs_endpoint(&cfg.root_namespace)
        .await
        .expect("acs endpoint missing");
    assert!(!endpoint.is_empty());
}

#[tokio::test]
#[ignore]
async fn github_token_resolves_from_environment_or_cluster() {
    let (cfg, kube) = connect().await;

    let token = resolve_github_token(&cfg, &kube)
        .await
        .expect("github token resolution failed");
    assert!(!token.is_empty());
}
