//! Kubernetes connection setup.

use crate::error::{ClientError, ClientResult};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::info;

/// Load client configuration from a kubeconfig file. With no path (or an
/// empty one) the process is assumed to run inside the cluster and uses the
/// mounted service account.
pub async fn load_kube_config(path: Option<&Path>) -> ClientResult<Config> {
    match path.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => {
            info!("Loading kubeconfig from {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))
        }
        None => {
            info!("Using in-cluster configuration");
            Config::incluster().map_err(|e| ClientError::Config(format!("in-cluster: {e}")))
        }
    }
}

/// Build a client from [`load_kube_config`]
pub async fn connect(path: Option<&Path>) -> ClientResult<Client> {
    let config = load_kube_config(path).await?;
    Ok(Client::try_from(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: demo
  cluster:
    server: https://127.0.0.1:6443
contexts:
- name: demo
  context:
    cluster: demo
    user: demo
    namespace: demo-ns
current-context: demo
users:
- name: demo
  user:
    token: not-a-real-token
"#;

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KUBECONFIG.as_bytes()).unwrap();

        let config = load_kube_config(Some(file.path())).await.unwrap();
        assert_eq!(config.cluster_url.host(), Some("127.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(6443));
        assert_eq!(config.default_namespace, "demo-ns");
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let err = load_kube_config(Some(Path::new("/nonexistent/admin.conf")))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(err.to_string().contains("admin.conf"));
    }
}
