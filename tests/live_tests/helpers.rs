//! Shared helpers for live-cluster tests

use tap_e2e::config::HarnessConfig;
use tap_e2e::kube::KubeHarness;

/// Resolve configuration and connect to the ambient cluster.
pub async fn connect() -> (HarnessConfig, KubeHarness) {
    let cfg = HarnessConfig::from_env();
    let kube = KubeHarness::connect()
        .await
        .expect("failed to connect to the cluster the kubeconfig points at");
    (cfg, kube)
}
