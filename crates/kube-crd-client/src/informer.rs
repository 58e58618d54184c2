//! List-then-watch over any [`ResourceStore`], shaped like
//! `kube::runtime::watcher` so the [`Watcher`](crate::Watcher) consumes both
//! backends the same way.
//!
//! Errors are yielded and the stream carries on; pacing retries is left to
//! the consumer's backoff.

use crate::error::{ClientError, ClientResult};
use crate::options::ListOptions;
use crate::store::{EventStream, InformerStream, ResourceStore, StoreEvent};
use futures::stream::{self, StreamExt};
use kube::runtime::watcher::Event;
use kube::ResourceExt;
use kube_crd_resources::ResourceKind;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

enum State<K> {
    /// Nothing known; the next step lists
    Empty,
    /// Listed up to `version` but no watch is open
    Listed { version: String },
    Watching { version: String, events: EventStream<K> },
}

struct ListWatch<K, S: ?Sized> {
    store: Arc<S>,
    namespace: String,
    options: ListOptions,
    state: State<K>,
    _kind: PhantomData<fn() -> K>,
}

/// Build an informer stream from plain `list` and `watch` calls
pub fn list_watch<K, S>(store: Arc<S>, namespace: &str, options: &ListOptions) -> InformerStream<K>
where
    K: ResourceKind,
    S: ResourceStore<K> + ?Sized + 'static,
{
    let list_watch = ListWatch {
        store,
        namespace: namespace.to_string(),
        options: options.clone(),
        state: State::Empty,
        _kind: PhantomData,
    };
    stream::unfold(list_watch, |lw| lw.step()).boxed()
}

impl<K, S> ListWatch<K, S>
where
    K: ResourceKind,
    S: ResourceStore<K> + ?Sized + 'static,
{
    async fn step(mut self) -> Option<(ClientResult<Event<K>>, Self)> {
        loop {
            match std::mem::replace(&mut self.state, State::Empty) {
                State::Empty => match self.store.list(&self.namespace, &self.options).await {
                    Ok(list) => {
                        let version = list.resource_version.unwrap_or_default();
                        self.state = State::Listed { version };
                        return Some((Ok(Event::Restarted(list.items)), self));
                    }
                    Err(e) => return Some((Err(e), self)),
                },
                State::Listed { version } => {
                    match self.store.watch(&self.namespace, &version).await {
                        Ok(events) => self.state = State::Watching { version, events },
                        Err(ClientError::Expired(message)) => {
                            debug!("watch from {} expired: {}", version, message);
                        }
                        Err(e) => {
                            self.state = State::Listed { version };
                            return Some((Err(e), self));
                        }
                    }
                }
                State::Watching { mut version, mut events } => match events.next().await {
                    Some(Ok(StoreEvent::Added(obj))) | Some(Ok(StoreEvent::Modified(obj))) => {
                        if let Some(rv) = obj.resource_version() {
                            version = rv;
                        }
                        self.state = State::Watching { version, events };
                        return Some((Ok(Event::Applied(obj)), self));
                    }
                    Some(Ok(StoreEvent::Deleted(obj))) => {
                        if let Some(rv) = obj.resource_version() {
                            version = rv;
                        }
                        self.state = State::Watching { version, events };
                        return Some((Ok(Event::Deleted(obj)), self));
                    }
                    Some(Ok(StoreEvent::Bookmark(rv))) => {
                        self.state = State::Watching { version: rv, events };
                    }
                    Some(Ok(StoreEvent::Expired(message))) => {
                        debug!("watch from {} expired, re-listing: {}", version, message);
                    }
                    Some(Err(e)) => {
                        self.state = State::Listed { version };
                        return Some((Err(e), self));
                    }
                    None => self.state = State::Listed { version },
                },
            }
        }
    }
}
