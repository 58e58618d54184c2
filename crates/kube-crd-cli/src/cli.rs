//! Command-line flags

use crate::DemoConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "kube-crd")]
#[command(about = "Register custom resources, exercise a typed client and watch for changes")]
#[command(version)]
pub struct Cli {
    /// Path to a kubeconfig file; empty for in-cluster configuration
    #[arg(long, default_value = "admin.conf")]
    pub kubeconf: String,

    /// Namespace holding the sample objects
    #[arg(long, default_value = "default")]
    pub namespace: String,

    /// Seconds between full cache re-deliveries in each watcher
    #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    pub resync_secs: u64,

    /// Seconds to wait for a new CRD to become established
    #[arg(long, default_value_t = 30)]
    pub establish_timeout_secs: u64,

    /// Run against in-process stores, skipping kube config and CRD registration
    #[arg(long)]
    pub in_memory: bool,
}

impl Cli {
    pub fn into_config(self) -> DemoConfig {
        DemoConfig {
            kubeconf: (!self.kubeconf.is_empty()).then(|| PathBuf::from(self.kubeconf)),
            namespace: self.namespace,
            resync_period: Duration::from_secs(self.resync_secs),
            establish_timeout: Duration::from_secs(self.establish_timeout_secs),
            in_memory: self.in_memory,
        }
    }
}
