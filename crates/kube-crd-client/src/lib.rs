//! # kube-crd client
//!
//! One generic client and one generic watcher for any [`ResourceKind`]:
//!
//! - [`ResourceClient`]: create, update, get, delete, list and watch
//! - [`ResourceStore`]: backend seam, served by [`ClusterStore`] against a
//!   live API server or by [`MemoryStore`] in process
//! - [`CrdRegistrar`]: installs a CRD and waits until it is established
//! - [`Watcher`]: informer consumer delivering typed [`ChangeEvent`]s,
//!   backing off between failed list or watch attempts

pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod informer;
pub mod memory;
pub mod options;
pub mod registrar;
pub mod store;
pub mod watcher;

pub use client::ResourceClient;
pub use cluster::ClusterStore;
pub use config::{connect, load_kube_config};
pub use error::{ClientError, ClientResult};
pub use informer::list_watch;
pub use memory::MemoryStore;
pub use options::{DeleteOptions, ListOptions, Preconditions, Propagation};
pub use registrar::{CrdRegistrar, DEFAULT_ESTABLISH_TIMEOUT};
pub use store::{EventStream, InformerStream, ResourceList, ResourceStore, StoreEvent};
pub use watcher::{
    ChangeEvent, ChangeHandler, ChannelHandler, LoggingHandler, Watcher, WatcherConfig,
    WatcherHandle, WatcherPhase, DEFAULT_RESYNC_PERIOD,
};

pub use kube_crd_resources::ResourceKind;
