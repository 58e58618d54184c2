//! Backend seam between the typed client and whatever actually stores objects.

use crate::error::ClientResult;
use crate::options::{DeleteOptions, ListOptions};
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::runtime::watcher;
use kube::ResourceExt;
use kube_crd_resources::ResourceKind;
use std::sync::Arc;

/// Objects of one kind plus the version a watch can resume from
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceList<K> {
    pub resource_version: Option<String>,
    pub items: Vec<K>,
}

impl<K: ResourceKind> ResourceList<K> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name_any()).collect()
    }
}

/// Raw change notification from a store watch
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// Progress marker carrying only a resource version
    Bookmark(String),
    /// The requested resource version is too old; the caller must re-list
    Expired(String),
}

pub type EventStream<K> = BoxStream<'static, ClientResult<StoreEvent<K>>>;

/// Self-healing list-watch stream: a `Restarted` listing, then applied and
/// deleted objects, re-listing on its own whenever the watch expires.
pub type InformerStream<K> = BoxStream<'static, ClientResult<watcher::Event<K>>>;

/// Namespaced CRUD and watch over one resource kind.
#[async_trait]
pub trait ResourceStore<K: ResourceKind>: Send + Sync {
    async fn create(&self, namespace: &str, obj: &K) -> ClientResult<K>;

    /// Replace spec and metadata of an existing object; status is kept
    async fn replace(&self, namespace: &str, obj: &K) -> ClientResult<K>;

    /// Replace only the status of an existing object
    async fn replace_status(&self, namespace: &str, obj: &K) -> ClientResult<K>;

    async fn get(&self, namespace: &str, name: &str) -> ClientResult<K>;

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> ClientResult<()>;

    async fn list(&self, namespace: &str, options: &ListOptions)
        -> ClientResult<ResourceList<K>>;

    /// Stream events strictly after `resource_version`
    async fn watch(&self, namespace: &str, resource_version: &str)
        -> ClientResult<EventStream<K>>;

    /// Continuous list-watch over the namespace, filtered by `options`
    fn informer(self: Arc<Self>, namespace: &str, options: &ListOptions) -> InformerStream<K>;
}
