//! # Demo manager
//!
//! Owns the backend connection, the per-kind watchers and the shutdown
//! channel they all listen on.

use crate::{demo, DemoConfig, EXAMPLE_NAME, EXAMPLE_STATE_NAME, UPDATED_MESSAGE};
use anyhow::{Context, Result};
use kube::Client;
use kube_crd_client::{
    connect, CrdRegistrar, LoggingHandler, MemoryStore, ResourceClient, ResourceKind, WatcherConfig,
    WatcherHandle,
};
use kube_crd_resources::{crd_name, kind_name, Example, ExampleState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

enum Backend {
    Cluster(Client),
    Memory,
}

pub struct DemoManager {
    config: DemoConfig,
    backend: Backend,
    shutdown_tx: broadcast::Sender<()>,
    watchers: Vec<WatcherHandle>,
}

impl DemoManager {
    /// Connect to the cluster named by `config`, or set up in-process
    /// stores when `in_memory` is set
    pub async fn new(config: DemoConfig) -> Result<Self> {
        let backend = if config.in_memory {
            info!("Running against in-memory stores");
            Backend::Memory
        } else {
            let client = connect(config.kubeconf.as_deref())
                .await
                .context("failed to build kubernetes client")?;
            Backend::Cluster(client)
        };
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            backend,
            shutdown_tx,
            watchers: Vec::new(),
        })
    }

    /// Run both kinds, then block until SIGINT or SIGTERM
    pub async fn run(mut self) -> Result<()> {
        info!("Starting kube-crd v{}", env!("CARGO_PKG_VERSION"));
        info!("Configuration: {:?}", self.config);

        self.start().await?;
        self.wait_for_shutdown().await;

        info!("Shutdown signal received, stopping watchers...");
        self.stop().await
    }

    /// Exercise and start watching `Example`, then `ExampleState`
    pub async fn start(&mut self) -> Result<()> {
        self.start_kind(Example::sample(EXAMPLE_NAME), |example: &mut Example| {
            if let Some(status) = example.status.as_mut() {
                status.message = UPDATED_MESSAGE.to_string();
            }
        })
        .await?;

        self.start_kind(ExampleState::sample(EXAMPLE_STATE_NAME), |state: &mut ExampleState| {
            if let Some(status) = state.status.as_mut() {
                status.message = UPDATED_MESSAGE.to_string();
            }
        })
        .await?;

        Ok(())
    }

    async fn start_kind<K, F>(&mut self, sample: K, touch: F) -> Result<()>
    where
        K: ResourceKind,
        F: FnOnce(&mut K),
    {
        let client = match &self.backend {
            Backend::Cluster(client) => {
                CrdRegistrar::new(client.clone())
                    .ensure::<K>(self.config.establish_timeout)
                    .await
                    .with_context(|| format!("failed to register CRD {}", crd_name::<K>()))?;
                ResourceClient::<K>::for_cluster(client.clone(), &self.config.namespace)
            }
            Backend::Memory => {
                ResourceClient::new(Arc::new(MemoryStore::<K>::new()), &self.config.namespace)
            }
        };

        demo::exercise(&client, sample, touch)
            .await
            .with_context(|| format!("{} demo failed", kind_name::<K>()))?;

        let watcher = client
            .new_watch()
            .with_config(WatcherConfig::default().resync_period(self.config.resync_period));
        self.watchers
            .push(watcher.spawn(LoggingHandler, self.shutdown_tx.subscribe()));
        Ok(())
    }

    /// Wait for shutdown signals
    async fn wait_for_shutdown(&self) {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
            }
            _ = terminate() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    /// Signal every watcher and wait for their tasks to finish
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        for handle in self.watchers {
            let kind = handle.kind().to_string();
            handle
                .join()
                .await
                .with_context(|| format!("{kind} watcher task failed"))?;
        }
        info!("kube-crd stopped");
        Ok(())
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn watchers(&self) -> &[WatcherHandle] {
        &self.watchers
    }

    /// Send shutdown signal
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Builder for fluent configuration
pub struct DemoBuilder {
    config: DemoConfig,
}

impl DemoBuilder {
    pub fn new() -> Self {
        Self {
            config: DemoConfig::default(),
        }
    }

    pub fn kubeconf(mut self, path: Option<PathBuf>) -> Self {
        self.config.kubeconf = path;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn resync_period(mut self, period: Duration) -> Self {
        self.config.resync_period = period;
        self
    }

    pub fn establish_timeout(mut self, timeout: Duration) -> Self {
        self.config.establish_timeout = timeout;
        self
    }

    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.config.in_memory = in_memory;
        self
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub async fn build(self) -> Result<DemoManager> {
        DemoManager::new(self.config).await
    }
}

impl Default for DemoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_crd_client::WatcherPhase;

    #[test]
    fn test_demo_builder() {
        let builder = DemoBuilder::new()
            .namespace("test-ns")
            .kubeconf(None)
            .resync_period(Duration::from_secs(5))
            .in_memory(true);

        assert_eq!(builder.config().namespace, "test-ns");
        assert_eq!(builder.config().kubeconf, None);
        assert_eq!(builder.config().resync_period, Duration::from_secs(5));
        assert_eq!(builder.config().establish_timeout, Duration::from_secs(30));
        assert!(builder.config().in_memory);
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_fails_setup() {
        let result = DemoBuilder::new()
            .kubeconf(Some(PathBuf::from("/nonexistent/admin.conf")))
            .build()
            .await;

        let err = result.err().expect("setup should fail without a kubeconfig");
        assert!(format!("{err:#}").contains("admin.conf"));
    }

    #[tokio::test]
    async fn test_in_memory_start_and_stop() {
        let mut manager = DemoBuilder::new().in_memory(true).build().await.unwrap();
        manager.start().await.unwrap();

        let kinds: Vec<&str> = manager.watchers().iter().map(|w| w.kind()).collect();
        assert_eq!(kinds, vec!["Example", "ExampleState"]);

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_watchers_stop_on_shutdown() {
        let mut manager = DemoBuilder::new().in_memory(true).build().await.unwrap();
        manager.start().await.unwrap();
        manager.shutdown();

        for handle in manager.watchers {
            let mut handle = handle;
            assert!(handle.wait_for(WatcherPhase::Stopped).await);
            handle.join().await.unwrap();
        }
    }
}
