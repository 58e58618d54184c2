//! # Change watcher
//!
//! Consumes a resource informer, keeps a local cache and turns its listings
//! and deltas into typed [`ChangeEvent`]s for a handler.
//!
//! Phases run `Starting -> Syncing -> Watching -> Stopped`. Failed list or
//! watch attempts are retried with exponential backoff; an expired resource
//! version makes the informer re-list and the cache is diffed against the
//! new listing. Every `resync_period` the cached objects are re-delivered as
//! updates with identical old and new values; a zero period disables resync.

use crate::client::ResourceClient;
use crate::options::ListOptions;
use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use kube_crd_resources::{kind_name, ResourceKind};
use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default interval between full resyncs of the local cache
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(600);

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Period between cache resyncs; zero disables them
    pub resync_period: Duration,

    /// Selectors applied to every list and watch
    pub list_options: ListOptions,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            resync_period: DEFAULT_RESYNC_PERIOD,
            list_options: ListOptions::default(),
        }
    }
}

impl WatcherConfig {
    pub fn resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    pub fn list_options(mut self, options: ListOptions) -> Self {
        self.list_options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherPhase {
    Starting,
    Syncing,
    Watching,
    Stopped,
}

/// A change to one object, already decoded
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

impl<K: ResourceKind> ChangeEvent<K> {
    /// Current object; the new value for updates
    pub fn object(&self) -> &K {
        match self {
            ChangeEvent::Added(obj) | ChangeEvent::Deleted(obj) => obj,
            ChangeEvent::Updated { new, .. } => new,
        }
    }

    pub fn name(&self) -> String {
        self.object().name_any()
    }

    pub fn verb(&self) -> &'static str {
        match self {
            ChangeEvent::Added(_) => "add",
            ChangeEvent::Updated { .. } => "update",
            ChangeEvent::Deleted(_) => "delete",
        }
    }
}

/// Receives change events from a running watcher
pub trait ChangeHandler<K>: Send + Sync + 'static {
    fn handle(&self, event: ChangeEvent<K>);
}

impl<K, F> ChangeHandler<K> for F
where
    F: Fn(ChangeEvent<K>) + Send + Sync + 'static,
{
    fn handle(&self, event: ChangeEvent<K>) {
        self(event)
    }
}

/// Reconciler stub: logs every event and changes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl<K: ResourceKind> ChangeHandler<K> for LoggingHandler {
    fn handle(&self, event: ChangeEvent<K>) {
        match &event {
            ChangeEvent::Added(obj) => info!("{} add: {}", kind_name::<K>(), obj.summary()),
            ChangeEvent::Updated { old, new } => {
                debug!("{} update old: {}", kind_name::<K>(), old.summary());
                info!("{} update: {}", kind_name::<K>(), new.summary());
            }
            ChangeEvent::Deleted(obj) => info!("{} delete: {}", kind_name::<K>(), obj.summary()),
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelHandler<K> {
    sender: mpsc::UnboundedSender<ChangeEvent<K>>,
}

impl<K> ChannelHandler<K> {
    pub fn new(sender: mpsc::UnboundedSender<ChangeEvent<K>>) -> Self {
        Self { sender }
    }

    /// Handler plus the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChangeEvent<K>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl<K: Send + 'static> ChangeHandler<K> for ChannelHandler<K> {
    fn handle(&self, event: ChangeEvent<K>) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}

/// List-watch subscription for one resource kind
pub struct Watcher<K: ResourceKind> {
    client: ResourceClient<K>,
    config: WatcherConfig,
}

/// Running watcher task
pub struct WatcherHandle {
    kind: String,
    phase: watch::Receiver<WatcherPhase>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn phase(&self) -> WatcherPhase {
        *self.phase.borrow()
    }

    /// Wait until the watcher reaches `phase`; false if it exited first
    pub async fn wait_for(&mut self, phase: WatcherPhase) -> bool {
        self.phase.wait_for(|current| *current == phase).await.is_ok()
    }

    /// Wait for the task to finish after shutdown was signalled
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}

impl<K: ResourceKind> Watcher<K> {
    pub fn new(client: ResourceClient<K>, config: WatcherConfig) -> Self {
        Self { client, config }
    }

    pub fn with_config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Start the watcher on its own task. It runs until `shutdown` fires or
    /// its sender is dropped.
    pub fn spawn<H: ChangeHandler<K>>(
        self,
        handler: H,
        shutdown: broadcast::Receiver<()>,
    ) -> WatcherHandle {
        let (phase_tx, phase_rx) = watch::channel(WatcherPhase::Starting);
        let kind = kind_name::<K>();
        let task = tokio::spawn(self.run(handler, shutdown, phase_tx));
        WatcherHandle {
            kind,
            phase: phase_rx,
            task,
        }
    }

    async fn run<H: ChangeHandler<K>>(
        self,
        handler: H,
        mut shutdown: broadcast::Receiver<()>,
        phase: watch::Sender<WatcherPhase>,
    ) {
        let kind = kind_name::<K>();
        let namespace = self.client.namespace().to_string();
        info!("Starting {} watcher in namespace {}", kind, namespace);

        let mut cache: BTreeMap<String, K> = BTreeMap::new();
        let mut resync = resync_timer(self.config.resync_period);
        let mut events = self
            .client
            .informer(&self.config.list_options)
            .default_backoff()
            .boxed();
        phase.send_replace(WatcherPhase::Syncing);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = next_tick(&mut resync) => {
                    debug!("{} resync of {} cached objects", kind, cache.len());
                    for obj in cache.values() {
                        handler.handle(ChangeEvent::Updated {
                            old: obj.clone(),
                            new: obj.clone(),
                        });
                    }
                }
                next = events.next() => match next {
                    Some(Ok(watcher::Event::Restarted(items))) => {
                        debug!("{} synced {} objects", kind, items.len());
                        sync_cache(&mut cache, items, &handler);
                        phase.send_replace(WatcherPhase::Watching);
                    }
                    Some(Ok(event)) => apply_event(&mut cache, event, &handler),
                    Some(Err(e)) => warn!("{} list-watch failed, backing off: {}", kind, e),
                    None => break,
                },
            }
        }

        phase.send_replace(WatcherPhase::Stopped);
        info!("Stopped {} watcher in namespace {}", kind, namespace);
    }
}

fn resync_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut resync = interval_at(Instant::now() + period, period);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(resync)
}

/// Next resync tick; never resolves when resync is disabled
async fn next_tick(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Replace the cache with a fresh listing, reporting the differences
fn sync_cache<K: ResourceKind, H: ChangeHandler<K>>(
    cache: &mut BTreeMap<String, K>,
    items: Vec<K>,
    handler: &H,
) {
    let mut previous = std::mem::take(cache);
    for obj in items {
        let name = obj.name_any();
        match previous.remove(&name) {
            None => handler.handle(ChangeEvent::Added(obj.clone())),
            Some(old) if old.resource_version() != obj.resource_version() => {
                handler.handle(ChangeEvent::Updated {
                    old,
                    new: obj.clone(),
                })
            }
            Some(_) => {}
        }
        cache.insert(name, obj);
    }
    for (_, gone) in previous {
        handler.handle(ChangeEvent::Deleted(gone));
    }
}

/// Fold one informer delta into the cache
fn apply_event<K: ResourceKind, H: ChangeHandler<K>>(
    cache: &mut BTreeMap<String, K>,
    event: watcher::Event<K>,
    handler: &H,
) {
    match event {
        watcher::Event::Applied(obj) => match cache.insert(obj.name_any(), obj.clone()) {
            None => handler.handle(ChangeEvent::Added(obj)),
            Some(old) if old.resource_version() != obj.resource_version() => {
                handler.handle(ChangeEvent::Updated { old, new: obj })
            }
            Some(_) => {}
        },
        watcher::Event::Deleted(obj) => {
            cache.remove(&obj.name_any());
            handler.handle(ChangeEvent::Deleted(obj));
        }
        watcher::Event::Restarted(items) => sync_cache(cache, items, handler),
    }
}
