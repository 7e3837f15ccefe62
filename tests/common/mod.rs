// Common test utilities for integration tests

use kube::client::Client;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Build a sidecar configuration for tests, overriding only the labels
pub fn test_config(pod_labels: &str) -> mongocar::config::Config {
    mongocar::config::Config::from_lookup(|name| match name {
        "MONGOCAR_POD_LABELS" => Some(pod_labels.to_string()),
        "MONGOCAR_SERVICE_NAME" => Some("mongo".to_string()),
        _ => None,
    })
    .expect("test config must load")
}
