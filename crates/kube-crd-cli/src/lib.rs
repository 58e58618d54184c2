//! # kube-crd
//!
//! Registers the `Example` and `ExampleState` CRDs, runs a create, list,
//! get and status update pass against each, then watches both kinds until the
//! process is told to stop.

pub mod cli;
pub mod demo;
pub mod manager;

pub use cli::Cli;
pub use demo::exercise;
pub use manager::{DemoBuilder, DemoManager};

use kube_crd_client::{DEFAULT_ESTABLISH_TIMEOUT, DEFAULT_RESYNC_PERIOD};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the sample `Example` object
pub const EXAMPLE_NAME: &str = "example123";
/// Name of the sample `ExampleState` object
pub const EXAMPLE_STATE_NAME: &str = "examplestate123";
/// Status message written by the update step
pub const UPDATED_MESSAGE: &str = "Hello There";

/// Demo configuration
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Kubeconfig path; `None` selects in-cluster configuration
    pub kubeconf: Option<PathBuf>,
    pub namespace: String,
    pub resync_period: Duration,
    pub establish_timeout: Duration,
    /// Run against in-process stores instead of a cluster
    pub in_memory: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            kubeconf: Some(PathBuf::from("admin.conf")),
            namespace: "default".to_string(),
            resync_period: DEFAULT_RESYNC_PERIOD,
            establish_timeout: DEFAULT_ESTABLISH_TIMEOUT,
            in_memory: false,
        }
    }
}
