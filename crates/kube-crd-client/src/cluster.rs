//! `ResourceStore` backed by a live API server.

use crate::error::{ClientError, ClientResult};
use crate::options::{DeleteOptions, ListOptions};
use crate::store::{EventStream, InformerStream, ResourceList, ResourceStore, StoreEvent};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use kube::api::{Api, PostParams, WatchParams};
use kube::core::WatchEvent;
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use kube_crd_resources::{kind_name, ResourceKind};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Server-side timeout for a single watch request, below the apiserver cap
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Typed REST access to one custom resource kind
pub struct ClusterStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> ClusterStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn put_status(&self, api: &Api<K>, obj: &K) -> ClientResult<K> {
        let name = obj.name_any();
        debug!("Writing status of {} {}", kind_name::<K>(), name);
        api.replace_status(&name, &PostParams::default(), serde_json::to_vec(obj)?)
            .await
            .map_err(|e| ClientError::from_kube(e, &kind_name::<K>(), &name))
    }
}

impl<K> Clone for ClusterStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

/// The API server drops status on POST. When the submitted object carried a
/// status the stored one lacks, this is the object to write to `/status`.
fn pending_status<K: ResourceKind>(stored: &K, wanted: Option<&K::Status>) -> Option<K> {
    let status = wanted?;
    if stored.status() == Some(status) {
        return None;
    }
    let mut with_status = stored.clone();
    *with_status.status_mut() = Some(status.clone());
    Some(with_status)
}

/// Translate one raw watch frame; `410 Gone` means the version expired
fn store_event<K>(event: kube::Result<WatchEvent<K>>) -> ClientResult<StoreEvent<K>> {
    match event? {
        WatchEvent::Added(obj) => Ok(StoreEvent::Added(obj)),
        WatchEvent::Modified(obj) => Ok(StoreEvent::Modified(obj)),
        WatchEvent::Deleted(obj) => Ok(StoreEvent::Deleted(obj)),
        WatchEvent::Bookmark(bookmark) => {
            Ok(StoreEvent::Bookmark(bookmark.metadata.resource_version))
        }
        WatchEvent::Error(resp) if resp.code == 410 => Ok(StoreEvent::Expired(resp.message)),
        WatchEvent::Error(resp) => Err(ClientError::Kube(kube::Error::Api(resp))),
    }
}

fn watcher_config(options: &ListOptions) -> watcher::Config {
    let mut config = watcher::Config::default();
    if let Some(labels) = &options.label_selector {
        config = config.labels(labels);
    }
    if let Some(fields) = &options.field_selector {
        config = config.fields(fields);
    }
    config
}

#[async_trait]
impl<K: ResourceKind> ResourceStore<K> for ClusterStore<K> {
    async fn create(&self, namespace: &str, obj: &K) -> ClientResult<K> {
        let api = self.api(namespace);
        let created = api
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| ClientError::from_kube(e, &kind_name::<K>(), &obj.name_any()))?;
        match pending_status(&created, obj.status()) {
            Some(with_status) => self.put_status(&api, &with_status).await,
            None => Ok(created),
        }
    }

    async fn replace(&self, namespace: &str, obj: &K) -> ClientResult<K> {
        let name = obj.name_any();
        self.api(namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| ClientError::from_kube(e, &kind_name::<K>(), &name))
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> ClientResult<K> {
        self.put_status(&self.api(namespace), obj).await
    }

    async fn get(&self, namespace: &str, name: &str) -> ClientResult<K> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| ClientError::from_kube(e, &kind_name::<K>(), name))
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> ClientResult<()> {
        self.api(namespace)
            .delete(name, &options.to_delete_params())
            .await
            .map(|_| ())
            .map_err(|e| ClientError::from_kube(e, &kind_name::<K>(), name))
    }

    async fn list(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> ClientResult<ResourceList<K>> {
        let list = self
            .api(namespace)
            .list(&options.to_list_params())
            .await
            .map_err(|e| ClientError::from_kube(e, &kind_name::<K>(), ""))?;
        Ok(ResourceList {
            resource_version: list.metadata.resource_version,
            items: list.items,
        })
    }

    async fn watch(
        &self,
        namespace: &str,
        resource_version: &str,
    ) -> ClientResult<EventStream<K>> {
        let wp = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        let stream = self
            .api(namespace)
            .watch(&wp, resource_version)
            .await
            .map_err(|e| ClientError::from_kube(e, &kind_name::<K>(), ""))?;
        Ok(stream.map(store_event).boxed())
    }

    fn informer(self: Arc<Self>, namespace: &str, options: &ListOptions) -> InformerStream<K> {
        watcher(self.api(namespace), watcher_config(options))
            .map_err(ClientError::from)
            .boxed()
    }
}
