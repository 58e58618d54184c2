//! # Typed resource client
//!
//! CRUD and watch access to one custom resource kind in one namespace.

use crate::cluster::ClusterStore;
use crate::error::ClientResult;
use crate::options::{DeleteOptions, ListOptions};
use crate::store::{EventStream, InformerStream, ResourceList, ResourceStore};
use crate::watcher::{Watcher, WatcherConfig};
use kube::{Client, ResourceExt};
use kube_crd_resources::{kind_name, plural_name, ResourceKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Client for a single custom resource kind, bound to a namespace
pub struct ResourceClient<K: ResourceKind> {
    store: Arc<dyn ResourceStore<K>>,
    namespace: String,
}

impl<K: ResourceKind> Clone for ResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
        }
    }
}

impl<K: ResourceKind> ResourceClient<K> {
    pub fn new(store: Arc<dyn ResourceStore<K>>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
        }
    }

    /// Client talking to the API server behind `client`
    pub fn for_cluster(client: Client, namespace: &str) -> Self {
        Self::new(Arc::new(ClusterStore::<K>::new(client)), namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn plural(&self) -> String {
        plural_name::<K>()
    }

    /// Store a new object in this client's namespace
    pub async fn create(&self, obj: &K) -> ClientResult<K> {
        let obj = self.in_namespace(obj);
        info!("Creating {} {}/{}", kind_name::<K>(), self.namespace, obj.name_any());
        self.store.create(&self.namespace, &obj).await
    }

    /// Replace spec and metadata of an existing object. Its `resourceVersion`
    /// must be current; any status on `obj` is ignored.
    pub async fn update(&self, obj: &K) -> ClientResult<K> {
        let obj = self.in_namespace(obj);
        debug!("Updating {} {}/{}", kind_name::<K>(), self.namespace, obj.name_any());
        self.store.replace(&self.namespace, &obj).await
    }

    /// Replace only the status subresource, under the same version check
    pub async fn update_status(&self, obj: &K) -> ClientResult<K> {
        let obj = self.in_namespace(obj);
        debug!("Updating status of {} {}/{}", kind_name::<K>(), self.namespace, obj.name_any());
        self.store.replace_status(&self.namespace, &obj).await
    }

    pub async fn get(&self, name: &str) -> ClientResult<K> {
        self.store.get(&self.namespace, name).await
    }

    pub async fn delete(&self, name: &str, options: &DeleteOptions) -> ClientResult<()> {
        info!("Deleting {} {}/{}", kind_name::<K>(), self.namespace, name);
        self.store.delete(&self.namespace, name, options).await
    }

    pub async fn list(&self, options: &ListOptions) -> ClientResult<ResourceList<K>> {
        self.store.list(&self.namespace, options).await
    }

    /// Raw event stream strictly after `resource_version`
    pub async fn watch_from(&self, resource_version: &str) -> ClientResult<EventStream<K>> {
        self.store.watch(&self.namespace, resource_version).await
    }

    /// Self-healing list-watch stream over this client's namespace
    pub fn informer(&self, options: &ListOptions) -> InformerStream<K> {
        Arc::clone(&self.store).informer(&self.namespace, options)
    }

    fn in_namespace(&self, obj: &K) -> K {
        let mut obj = obj.clone();
        obj.meta_mut().namespace = Some(self.namespace.clone());
        obj
    }

    /// List-watch subscription over this client's namespace
    pub fn new_watch(&self) -> Watcher<K> {
        Watcher::new(self.clone(), WatcherConfig::default())
    }
}
