//! In-process `ResourceStore` with apiserver-like semantics.
//!
//! Every mutation bumps a store-wide revision that doubles as the object's
//! resource version. A bounded history of mutations lets a watch resume from
//! an older version; anything older than the retained history is reported
//! as expired, the same way the apiserver answers `410 Gone`.

use crate::error::{ClientError, ClientResult};
use crate::options::{DeleteOptions, FieldSelector, LabelSelector, ListOptions};
use crate::informer::list_watch;
use crate::store::{EventStream, InformerStream, ResourceList, ResourceStore, StoreEvent};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube_crd_resources::{kind_name, ResourceKind};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: usize = 1000;
const EVENT_CHANNEL_CAPACITY: usize = 1024;
const STALE_VERSION: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

#[derive(Debug)]
struct Record<K> {
    revision: u64,
    namespace: String,
    event: StoreEvent<K>,
}

struct State<K> {
    revision: u64,
    /// Highest revision no longer retained in `history`
    compacted: u64,
    objects: BTreeMap<(String, String), K>,
    history: VecDeque<Arc<Record<K>>>,
}

pub struct MemoryStore<K> {
    state: Mutex<State<K>>,
    events: broadcast::Sender<Arc<Record<K>>>,
    history_limit: usize,
}

impl<K: ResourceKind> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ResourceKind> MemoryStore<K> {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Store that keeps at most `limit` past mutations for watch resumption
    pub fn with_history_limit(limit: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State {
                revision: 0,
                compacted: 0,
                objects: BTreeMap::new(),
                history: VecDeque::new(),
            }),
            events,
            history_limit: limit.max(1),
        }
    }

    /// Current store revision, as a resource version string
    pub fn resource_version(&self) -> String {
        self.lock().revision.to_string()
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        // Every critical section leaves the state consistent before it can
        // panic, so a poisoned lock is still safe to use.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `updated` under a new revision unless it equals `existing`
    fn store_update(
        &self,
        state: &mut State<K>,
        namespace: &str,
        name: String,
        existing: K,
        mut updated: K,
    ) -> ClientResult<K> {
        // A no-op write leaves the stored object and its version untouched.
        if serde_json::to_value(&updated)? == serde_json::to_value(&existing)? {
            return Ok(existing);
        }

        state.revision += 1;
        updated.meta_mut().resource_version = Some(state.revision.to_string());
        state
            .objects
            .insert((namespace.to_string(), name), updated.clone());
        self.commit(state, namespace, StoreEvent::Modified(updated.clone()));
        Ok(updated)
    }

    fn commit(&self, state: &mut State<K>, namespace: &str, event: StoreEvent<K>) {
        let record = Arc::new(Record {
            revision: state.revision,
            namespace: namespace.to_string(),
            event,
        });
        state.history.push_back(Arc::clone(&record));
        while state.history.len() > self.history_limit {
            if let Some(dropped) = state.history.pop_front() {
                state.compacted = dropped.revision;
            }
        }
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(record);
    }
}

fn object_name<K: ResourceKind>(obj: &K) -> ClientResult<String> {
    match obj.meta().name.as_deref() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(ClientError::Invalid(format!(
            "{}: metadata.name is required",
            kind_name::<K>()
        ))),
    }
}

/// The stored object `obj` was read from; its resource version must match
fn current_version<K: ResourceKind>(
    state: &State<K>,
    namespace: &str,
    name: &str,
    obj: &K,
) -> ClientResult<K> {
    let Some(requested) = obj.meta().resource_version.as_deref() else {
        return Err(ClientError::Invalid(
            "metadata.resourceVersion must be specified for an update".to_string(),
        ));
    };
    let existing = state
        .objects
        .get(&(namespace.to_string(), name.to_string()))
        .ok_or_else(|| not_found::<K>(name))?;
    if existing.meta().resource_version.as_deref() != Some(requested) {
        return Err(conflict::<K>(name, STALE_VERSION));
    }
    Ok(existing.clone())
}

/// Everything but metadata and status, the part `generation` tracks
fn spec_value<K: ResourceKind>(obj: &K) -> ClientResult<serde_json::Value> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(fields) = value.as_object_mut() {
        fields.remove("metadata");
        fields.remove("status");
    }
    Ok(value)
}

fn conflict<K: ResourceKind>(name: &str, message: &str) -> ClientError {
    ClientError::Conflict {
        kind: kind_name::<K>(),
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn not_found<K: ResourceKind>(name: &str) -> ClientError {
    ClientError::NotFound {
        kind: kind_name::<K>(),
        name: name.to_string(),
    }
}

#[async_trait]
impl<K: ResourceKind> ResourceStore<K> for MemoryStore<K> {
    async fn create(&self, namespace: &str, obj: &K) -> ClientResult<K> {
        let name = object_name(obj)?;
        if obj.meta().resource_version.is_some() {
            return Err(ClientError::Invalid(
                "resourceVersion should not be set on objects to be created".to_string(),
            ));
        }

        let mut state = self.lock();
        let key = (namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists {
                kind: kind_name::<K>(),
                name,
            });
        }

        state.revision += 1;
        let mut stored = obj.clone();
        let meta = stored.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.creation_timestamp = Some(Time(Utc::now()));
        meta.resource_version = Some(state.revision.to_string());
        meta.generation = Some(1);

        state.objects.insert(key, stored.clone());
        self.commit(&mut state, namespace, StoreEvent::Added(stored.clone()));
        trace!("Stored {} {}/{}", kind_name::<K>(), namespace, name);
        Ok(stored)
    }

    async fn replace(&self, namespace: &str, obj: &K) -> ClientResult<K> {
        let name = object_name(obj)?;
        let mut state = self.lock();
        let existing = current_version(&state, namespace, &name, obj)?;

        let mut updated = obj.clone();
        *updated.status_mut() = existing.status().cloned();
        {
            let meta = updated.meta_mut();
            let previous = existing.meta();
            meta.namespace = Some(namespace.to_string());
            meta.uid = previous.uid.clone();
            meta.creation_timestamp = previous.creation_timestamp.clone();
            meta.generation = previous.generation;
        }
        if spec_value(&updated)? != spec_value(&existing)? {
            let meta = updated.meta_mut();
            meta.generation = Some(meta.generation.unwrap_or(1) + 1);
        }

        self.store_update(&mut state, namespace, name, existing, updated)
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> ClientResult<K> {
        let name = object_name(obj)?;
        let mut state = self.lock();
        let existing = current_version(&state, namespace, &name, obj)?;

        let mut updated = existing.clone();
        *updated.status_mut() = obj.status().cloned();

        self.store_update(&mut state, namespace, name, existing, updated)
    }

    async fn get(&self, namespace: &str, name: &str) -> ClientResult<K> {
        self.lock()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found::<K>(name))
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> ClientResult<()> {
        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        let existing = state.objects.get(&key).ok_or_else(|| not_found::<K>(name))?;

        if let Some(pre) = &options.preconditions {
            let meta = existing.meta();
            if pre.resource_version.is_some() && pre.resource_version != meta.resource_version {
                return Err(conflict::<K>(name, "precondition failed: resourceVersion mismatch"));
            }
            if pre.uid.is_some() && pre.uid != meta.uid {
                return Err(conflict::<K>(name, "precondition failed: uid mismatch"));
            }
        }

        let Some(mut removed) = state.objects.remove(&key) else {
            return Err(not_found::<K>(name));
        };
        state.revision += 1;
        removed.meta_mut().resource_version = Some(state.revision.to_string());
        self.commit(&mut state, namespace, StoreEvent::Deleted(removed));
        Ok(())
    }

    async fn list(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> ClientResult<ResourceList<K>> {
        let labels = LabelSelector::parse(options.label_selector.as_deref().unwrap_or_default())?;
        let fields = FieldSelector::parse(options.field_selector.as_deref().unwrap_or_default())?;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);

        let state = self.lock();
        let items = state
            .objects
            .iter()
            .filter(|((ns, name), obj)| {
                ns == namespace
                    && fields.matches(name, ns)
                    && labels.matches(obj.meta().labels.as_ref())
            })
            .map(|(_, obj)| obj.clone())
            .take(limit)
            .collect();

        Ok(ResourceList {
            resource_version: Some(state.revision.to_string()),
            items,
        })
    }

    async fn watch(
        &self,
        namespace: &str,
        resource_version: &str,
    ) -> ClientResult<EventStream<K>> {
        let state = self.lock();
        let receiver = self.events.subscribe();
        let mut last = state.revision;

        let unversioned = resource_version.is_empty() || resource_version == "0";
        let backlog: Vec<StoreEvent<K>> = if unversioned {
            // Unversioned watch: synthesize the current contents first.
            state
                .objects
                .iter()
                .filter(|((ns, _), _)| ns == namespace)
                .map(|(_, obj)| StoreEvent::Added(obj.clone()))
                .collect()
        } else {
            let since: u64 = resource_version.parse().map_err(|_| {
                ClientError::Invalid(format!("invalid resource version {resource_version:?}"))
            })?;
            if since < state.compacted {
                let expired = StoreEvent::Expired(format!(
                    "too old resource version: {since} ({})",
                    state.compacted + 1
                ));
                return Ok(stream::iter(vec![Ok(expired)]).boxed());
            }
            // Never deliver anything at or before the requested version
            last = last.max(since);
            state
                .history
                .iter()
                .filter(|record| record.revision > since && record.namespace == namespace)
                .map(|record| record.event.clone())
                .collect()
        };
        drop(state);

        let live = LiveFeed {
            receiver,
            last,
            namespace: namespace.to_string(),
            done: false,
        };
        let live = stream::unfold(live, |mut feed| async move {
            let event = feed.next_event().await?;
            Some((Ok::<_, ClientError>(event), feed))
        });

        Ok(stream::iter(backlog.into_iter().map(Ok::<_, ClientError>))
            .chain(live)
            .boxed())
    }

    fn informer(self: Arc<Self>, namespace: &str, options: &ListOptions) -> InformerStream<K> {
        list_watch(self, namespace, options)
    }
}

struct LiveFeed<K> {
    receiver: broadcast::Receiver<Arc<Record<K>>>,
    last: u64,
    namespace: String,
    done: bool,
}

impl<K: Clone> LiveFeed<K> {
    async fn next_event(&mut self) -> Option<StoreEvent<K>> {
        if self.done {
            return None;
        }
        loop {
            match self.receiver.recv().await {
                Ok(record) => {
                    if record.revision <= self.last || record.namespace != self.namespace {
                        continue;
                    }
                    self.last = record.revision;
                    return Some(record.event.clone());
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    self.done = true;
                    return Some(StoreEvent::Expired(format!(
                        "watch fell behind by {missed} events"
                    )));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_crd_resources::{Example, CREATED_MESSAGE};

    #[tokio::test]
    async fn test_resource_versions_increase() {
        let store = MemoryStore::<Example>::new();
        let a = store.create("default", &Example::sample("a")).await.unwrap();
        let b = store.create("default", &Example::sample("b")).await.unwrap();

        assert_eq!(a.resource_version().as_deref(), Some("1"));
        assert_eq!(b.resource_version().as_deref(), Some("2"));
        assert_eq!(store.resource_version(), "2");
        assert!(a.uid().is_some());
        assert!(a.creation_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_missing_name_and_version() {
        let store = MemoryStore::<Example>::new();
        let mut unnamed = Example::sample("x");
        unnamed.metadata.name = None;
        assert!(matches!(
            store.create("default", &unnamed).await,
            Err(ClientError::Invalid(_))
        ));

        let mut versioned = Example::sample("x");
        versioned.metadata.resource_version = Some("5".to_string());
        assert!(matches!(
            store.create("default", &versioned).await,
            Err(ClientError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_noop_replace_keeps_version() {
        let store = MemoryStore::<Example>::new();
        let created = store.create("default", &Example::sample("a")).await.unwrap();
        let same = store.replace("default", &created).await.unwrap();
        assert_eq!(same.resource_version(), created.resource_version());
        assert_eq!(store.resource_version(), "1");
    }

    #[tokio::test]
    async fn test_replace_keeps_stored_status() {
        let store = MemoryStore::<Example>::new();
        let mut created = store.create("default", &Example::sample("a")).await.unwrap();
        created.spec.bar = false;
        if let Some(status) = created.status.as_mut() {
            status.message = "ignored".to_string();
        }

        let updated = store.replace("default", &created).await.unwrap();
        assert!(!updated.spec.bar);
        assert_eq!(updated.status.unwrap().message, CREATED_MESSAGE);
        assert_eq!(updated.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn test_replace_status_writes_only_status() {
        let store = MemoryStore::<Example>::new();
        let mut created = store.create("default", &Example::sample("a")).await.unwrap();
        created.spec.foo = "ignored".to_string();
        if let Some(status) = created.status.as_mut() {
            status.message = "Hello There".to_string();
        }

        let updated = store.replace_status("default", &created).await.unwrap();
        assert_eq!(updated.spec.foo, "example-text");
        assert_eq!(updated.status.as_ref().unwrap().message, "Hello There");
        assert_eq!(updated.resource_version().as_deref(), Some("2"));
        // Status writes leave the generation alone
        assert_eq!(updated.metadata.generation, Some(1));

        // The old version is now stale
        assert!(store.replace_status("default", &created).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_label_change_keeps_generation() {
        let store = MemoryStore::<Example>::new();
        let mut created = store.create("default", &Example::sample("a")).await.unwrap();
        created.labels_mut().insert("extra".to_string(), "yes".to_string());

        let updated = store.replace("default", &created).await.unwrap();
        assert_eq!(updated.resource_version().as_deref(), Some("2"));
        assert_eq!(updated.metadata.generation, Some(1));
    }

    #[tokio::test]
    async fn test_watch_from_future_version_skips_until_reached() {
        let store = MemoryStore::<Example>::new();
        let mut events = store.watch("default", "3").await.unwrap();

        for name in ["a", "b", "c", "d"] {
            store.create("default", &Example::sample(name)).await.unwrap();
        }
        match events.next().await {
            Some(Ok(StoreEvent::Added(obj))) => assert_eq!(obj.name_any(), "d"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watch_replays_history_after_version() {
        let store = MemoryStore::<Example>::new();
        store.create("default", &Example::sample("a")).await.unwrap();
        store.create("default", &Example::sample("b")).await.unwrap();
        store.create("other", &Example::sample("c")).await.unwrap();

        let mut events = store.watch("default", "1").await.unwrap();
        match events.next().await {
            Some(Ok(StoreEvent::Added(obj))) => assert_eq!(obj.name_any(), "b"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watch_from_compacted_version_expires() {
        let store = MemoryStore::<Example>::with_history_limit(2);
        for name in ["a", "b", "c", "d"] {
            store.create("default", &Example::sample(name)).await.unwrap();
        }

        let mut events = store.watch("default", "1").await.unwrap();
        assert!(matches!(events.next().await, Some(Ok(StoreEvent::Expired(_)))));
        assert!(events.next().await.is_none());

        // Still inside the retained window
        let mut events = store.watch("default", "2").await.unwrap();
        assert!(matches!(events.next().await, Some(Ok(StoreEvent::Added(_)))));
    }

    #[tokio::test]
    async fn test_unversioned_watch_lists_current_objects() {
        let store = MemoryStore::<Example>::new();
        store.create("default", &Example::sample("a")).await.unwrap();

        let mut events = store.watch("default", "").await.unwrap();
        assert!(matches!(events.next().await, Some(Ok(StoreEvent::Added(_)))));

        store.delete("default", "a", &DeleteOptions::default()).await.unwrap();
        match events.next().await {
            Some(Ok(StoreEvent::Deleted(obj))) => {
                assert_eq!(obj.name_any(), "a");
                assert_eq!(obj.resource_version().as_deref(), Some("2"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_watch_version() {
        let store = MemoryStore::<Example>::new();
        assert!(matches!(
            store.watch("default", "abc").await,
            Err(ClientError::Invalid(_))
        ));
    }
}
