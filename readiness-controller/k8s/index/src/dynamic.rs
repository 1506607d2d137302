use crate::{kinds, lister::dynamic_api};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use futures::prelude::*;
use kube::runtime::{watcher, WatchStreamExt};
use readiness_controller_core::{Category, Gvk, ObjectId, SharedTracker, TrackedKinds};
use readiness_controller_k8s_api::{
    discovery, ApiCapabilities, ApiResource, Client, DynamicObject, Scope,
};
use std::collections::BTreeSet;
use tokio::{task::JoinHandle, time};
use tracing::{info_span, Instrument};

#[cfg(test)]
mod tests;

const DISCOVERY_BACKOFF_MIN: time::Duration = time::Duration::from_secs(1);
const DISCOVERY_BACKOFF_MAX: time::Duration = time::Duration::from_secs(60);

/// Runs a watch for each kind registered in a tracker category.
///
/// Watches start when a kind is registered and are aborted when it is
/// retired. Kinds that are watched through typed indexes are skipped.
pub struct DynamicWatches {
    client: Client,
    tracker: SharedTracker,
    category: Category,
    namespace: Option<String>,
    excluded: HashSet<Gvk>,
    watches: HashMap<Gvk, JoinHandle<()>>,
}

/// Follows the live objects of a kind, reporting each object to the tracker
/// as it is applied or deleted.
#[derive(Debug)]
pub struct KindCache {
    tracker: SharedTracker,
    category: Category,
    gvk: Gvk,

    /// Ids of the objects the watch currently knows of, used to detect
    /// deletions missed while it was disconnected.
    objects: HashSet<ObjectId>,

    /// Objects seen since the watch began a re-list.
    relisted: Option<HashSet<ObjectId>>,
}

// === impl DynamicWatches ===

impl DynamicWatches {
    pub fn new(
        client: Client,
        tracker: SharedTracker,
        category: Category,
        namespace: Option<String>,
    ) -> Self {
        let excluded = excluded(tracker.tracked_kinds(), category);
        Self {
            client,
            tracker,
            category,
            namespace,
            excluded,
            watches: HashMap::default(),
        }
    }

    /// Follows the category's registered kinds until shutdown.
    pub async fn run(mut self, shutdown: drain::Watch) {
        let mut kinds_rx = self.tracker.subscribe(self.category);
        tokio::pin! {
            let shutdown = shutdown.signaled();
        }

        loop {
            let kinds = kinds_rx.borrow_and_update().clone();
            self.sync(&kinds);

            tokio::select! {
                res = kinds_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        for (_, task) in self.watches.drain() {
            task.abort();
        }
    }

    fn sync(&mut self, kinds: &BTreeSet<Gvk>) {
        self.watches.retain(|gvk, task| {
            if kinds.contains(gvk) {
                return true;
            }
            tracing::debug!(%gvk, "Stopping watch");
            task.abort();
            false
        });

        for gvk in kinds {
            if self.excluded.contains(gvk) || self.watches.contains_key(gvk) {
                continue;
            }
            tracing::debug!(%gvk, "Starting watch");
            let cache = KindCache::new(self.tracker.clone(), self.category, gvk.clone());
            let task = tokio::spawn(
                watch(self.client.clone(), self.namespace.clone(), cache)
                    .instrument(info_span!("watch", category = %self.category, %gvk)),
            );
            self.watches.insert(gvk.clone(), task);
        }
    }
}

/// Kinds in a category that are watched by the typed indexes.
fn excluded(kinds: &TrackedKinds, category: Category) -> HashSet<Gvk> {
    match category {
        Category::Objects => [kinds.templates.clone(), kinds.config.clone()]
            .into_iter()
            .chain(kinds.providers.clone())
            .collect(),
        Category::Data => HashSet::default(),
    }
}

async fn watch(client: Client, namespace: Option<String>, mut cache: KindCache) {
    let (resource, caps) = discover(&client, cache.gvk()).await;
    let namespaced = matches!(caps.scope, Scope::Namespaced);
    let api = dynamic_api(&client, &resource, namespaced, namespace.as_deref());

    let events = watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(events);
    while let Some(res) = events.next().await {
        match res {
            Ok(event) => cache.handle(event),
            Err(error) => tracing::info!(%error, "Watch failed"),
        }
    }
}

/// Resolves a kind, retrying until it is served by the API server.
async fn discover(client: &Client, gvk: &Gvk) -> (ApiResource, ApiCapabilities) {
    let mut backoff = Backoff::default();
    loop {
        match discovery::pinned_kind(client, &kinds::to_kube(gvk)).await {
            Ok(found) => {
                if backoff.is_retrying() {
                    tracing::info!(attempts = backoff.attempts, "Discovered kind");
                }
                return found;
            }
            // Kinds that are never served retry while tracked; later
            // failures are logged at debug.
            Err(error) if backoff.is_retrying() => {
                tracing::debug!(%error, attempts = backoff.attempts, "Failed to discover kind")
            }
            Err(error) => tracing::info!(%error, "Failed to discover kind; retrying"),
        }
        time::sleep(backoff.failed()).await;
    }
}

/// Capped exponential backoff between discovery attempts.
#[derive(Debug)]
struct Backoff {
    attempts: usize,
    delay: time::Duration,
}

// === impl Backoff ===

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 0,
            delay: DISCOVERY_BACKOFF_MIN,
        }
    }
}

impl Backoff {
    fn is_retrying(&self) -> bool {
        self.attempts > 0
    }

    /// Records a failed attempt, returning the delay before the next one.
    fn failed(&mut self) -> time::Duration {
        let delay = self.delay;
        self.attempts += 1;
        self.delay = (delay * 2).min(DISCOVERY_BACKOFF_MAX);
        delay
    }
}

// === impl KindCache ===

impl KindCache {
    pub fn new(tracker: SharedTracker, category: Category, gvk: Gvk) -> Self {
        Self {
            tracker,
            category,
            gvk,
            objects: HashSet::default(),
            relisted: None,
        }
    }

    pub fn gvk(&self) -> &Gvk {
        &self.gvk
    }

    pub fn handle(&mut self, event: watcher::Event<DynamicObject>) {
        match event {
            watcher::Event::Init => {
                self.relisted = Some(HashSet::default());
            }
            watcher::Event::InitApply(obj) => {
                if let Some(id) = self.apply(obj) {
                    self.relisted.get_or_insert_with(HashSet::default).insert(id);
                }
            }
            watcher::Event::InitDone => self.finish_relist(),
            watcher::Event::Apply(obj) => {
                self.apply(obj);
            }
            watcher::Event::Delete(obj) => {
                if let Some(id) = self.id(&obj) {
                    self.remove(id);
                }
            }
        }
    }

    fn apply(&mut self, obj: DynamicObject) -> Option<ObjectId> {
        let id = self.id(&obj)?;
        self.objects.insert(id.clone());
        self.tracker.observe(self.category, id.clone());
        Some(id)
    }

    fn remove(&mut self, id: ObjectId) {
        self.objects.remove(&id);
        self.tracker.cancel(self.category, id);
    }

    /// Drops objects that were not seen in the re-list.
    fn finish_relist(&mut self) {
        let Some(seen) = self.relisted.take() else {
            return;
        };
        let stale = self
            .objects
            .difference(&seen)
            .cloned()
            .collect::<Vec<_>>();
        for id in stale {
            tracing::debug!(%id, "Object removed while the watch was disconnected");
            self.remove(id);
        }
    }

    fn id(&self, obj: &DynamicObject) -> Option<ObjectId> {
        let name = obj.metadata.name.clone()?;
        let namespace = obj.metadata.namespace.clone();
        Some(ObjectId::new(self.gvk.clone(), namespace, name))
    }
}
