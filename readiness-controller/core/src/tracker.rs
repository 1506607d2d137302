use crate::{
    expectations::{ExpectationSet, Stats},
    registrar::{KindRegistrar, SourceId},
    Gvk, ObjectId,
};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::{mpsc, watch};


pub type SharedTracker = Arc<Tracker>;

/// Lists the objects of a kind that exist when it is first tracked.
#[async_trait::async_trait]
pub trait Lister: Send + Sync {
    async fn list(&self, gvk: &Gvk) -> anyhow::Result<Vec<Listed>>;
}

/// An object returned by a [`Lister`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listed {
    pub id: ObjectId,

    /// Kinds this object causes to be tracked: the constraint kind of a
    /// constraint template, or the synced kinds of a `Config`. Empty for
    /// every other object.
    pub derived: Vec<Gvk>,
}

/// The built-in kinds the tracker always follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedKinds {
    pub templates: Gvk,
    pub config: Gvk,

    /// Set when external data providers are enabled.
    pub providers: Option<Gvk>,

    /// Empty unless mutation is enabled.
    pub mutators: Vec<Gvk>,
}

/// Distinguishes policy objects from the cluster data synced for policy
/// evaluation. The same kind may be tracked in both.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Objects,
    Data,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("shutdown signaled before bootstrap completed")]
    Aborted,

    #[error("tracker is already running")]
    AlreadyRunning,
}

/// Decides whether the controller has observed every policy object that
/// existed when it started.
///
/// `run` performs a bootstrap listing of every tracked kind and then keeps
/// listing kinds as they are registered. Watches report `observe` and
/// `cancel`, which apply only to registered kinds.
#[derive(Debug)]
pub struct Tracker {
    kinds: TrackedKinds,
    objects: KindRegistrar,
    data: KindRegistrar,
    bootstrapped: AtomicBool,
    pending_tx: mpsc::UnboundedSender<Pending>,
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<Pending>>>,
}

/// Diagnostics for a single tracked kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindReport {
    pub category: Category,
    pub gvk: Gvk,
    pub satisfied: bool,
    pub stats: Stats,
    pub unobserved: Vec<ObjectId>,
}

/// A newly registered kind awaiting its bootstrap listing.
#[derive(Debug)]
struct Pending {
    category: Category,
    gvk: Gvk,
}

// === impl TrackedKinds ===

impl TrackedKinds {
    fn statics(&self) -> Vec<Gvk> {
        let mut kinds = vec![self.templates.clone(), self.config.clone()];
        kinds.extend(self.providers.clone());
        kinds.extend(self.mutators.iter().cloned());
        kinds
    }
}

// === impl Category ===

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Objects => "objects",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Tracker ===

impl Tracker {
    pub fn new(kinds: TrackedKinds) -> Self {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let tracker = Self {
            objects: KindRegistrar::new("objects"),
            data: KindRegistrar::new("data"),
            bootstrapped: AtomicBool::new(false),
            pending_tx,
            pending_rx: Mutex::new(Some(pending_rx)),
            kinds,
        };
        tracker.add_source(Category::Objects, SourceId::Static, tracker.kinds.statics());
        tracker
    }

    pub fn shared(kinds: TrackedKinds) -> SharedTracker {
        Arc::new(Self::new(kinds))
    }

    pub fn tracked_kinds(&self) -> &TrackedKinds {
        &self.kinds
    }

    /// Lists every registered kind (including kinds derived from listed
    /// templates and configs) and then continues to list kinds as they are
    /// registered, until `shutdown` is signaled.
    ///
    /// Returns `Error::Aborted` if shutdown is signaled before the bootstrap
    /// pass completes. Such a tracker is never satisfied.
    pub async fn run<L: Lister>(&self, lister: L, shutdown: drain::Watch) -> Result<(), Error> {
        let mut pending = self
            .pending_rx
            .lock()
            .take()
            .ok_or(Error::AlreadyRunning)?;

        let signaled = shutdown.signaled();
        tokio::pin!(signaled);

        tokio::select! {
            biased;
            _ = &mut signaled => {
                tracing::warn!("Shutdown before bootstrap completed");
                return Err(Error::Aborted);
            }
            () = self.bootstrap(&lister, &mut pending) => {}
        }
        self.bootstrapped.store(true, Ordering::Release);
        tracing::info!(satisfied = self.satisfied(), "Bootstrap complete");

        let mut inflight = FuturesUnordered::new();
        loop {
            tokio::select! {
                biased;
                _ = &mut signaled => return Ok(()),
                Some(Pending { category, gvk }) = pending.recv() => {
                    inflight.push(self.populate(&lister, category, gvk));
                }
                Some(()) = inflight.next(), if !inflight.is_empty() => {}
                else => return Ok(()),
            }
        }
    }

    /// Lists pending kinds concurrently until none remain. Listing a
    /// template or config may register further kinds, which are listed
    /// before bootstrap completes.
    async fn bootstrap<L: Lister>(
        &self,
        lister: &L,
        pending: &mut mpsc::UnboundedReceiver<Pending>,
    ) {
        let mut inflight = FuturesUnordered::new();
        loop {
            while let Ok(Pending { category, gvk }) = pending.try_recv() {
                inflight.push(self.populate(lister, category, gvk));
            }
            if inflight.is_empty() {
                return;
            }
            inflight.next().await;
        }
    }

    #[tracing::instrument(skip_all, fields(%category, %gvk))]
    async fn populate<L: Lister>(&self, lister: &L, category: Category, gvk: Gvk) {
        let registrar = self.registrar(category);
        let Some(set) = registrar.get(&gvk) else {
            tracing::debug!("Kind retired before it was listed");
            return;
        };
        if set.populated() {
            return;
        }

        let objects = match lister.list(&gvk).await {
            Ok(objects) => objects,
            Err(error) => {
                tracing::warn!(%error, "Failed to list kind; no objects will be expected");
                set.mark_populated();
                return;
            }
        };

        // The kind may have been retired (and possibly re-registered) while
        // it was being listed.
        if !registrar.is_current(&gvk, &set) {
            tracing::debug!("Kind retired while it was listed");
            return;
        }

        let mut expected = 0;
        for Listed { id, derived } in objects {
            // Objects deleted while the listing was in flight are neither
            // expected nor allowed to register kinds.
            if set.is_cancelled(&id) {
                tracing::debug!(%id, "Skipping object deleted during listing");
                continue;
            }
            self.derive(category, &set, &id, derived);
            set.expect(id);
            expected += 1;
        }
        set.mark_populated();
        tracing::info!(expected, "Populated kind");
    }

    /// Registers the kinds a listed governing object requires.
    fn derive(
        &self,
        category: Category,
        set: &ExpectationSet,
        id: &ObjectId,
        derived: Vec<Gvk>,
    ) {
        if category != Category::Objects {
            return;
        }
        let target = if *set.gvk() == self.kinds.templates {
            Category::Objects
        } else if *set.gvk() == self.kinds.config {
            Category::Data
        } else {
            return;
        };

        let source = SourceId::Object(id.clone());
        self.add_source(target, source.clone(), derived);

        // The object's deletion may have been handled between the check in
        // `populate` and the registration above, in which case nothing else
        // removes the source.
        if set.is_cancelled(id) {
            let retired = self.remove_source(target, &source);
            tracing::debug!(%id, ?retired, "Released kinds of object deleted during listing");
        }
    }

    /// Associates a governing object with the kinds it requires, scheduling
    /// a listing for each kind that was not yet tracked.
    pub fn add_source(
        &self,
        category: Category,
        source: SourceId,
        kinds: impl IntoIterator<Item = Gvk>,
    ) {
        for gvk in self.registrar(category).add_source(source, kinds) {
            // Fails only once `run` has stopped, after which nothing lists.
            let _ = self.pending_tx.send(Pending { category, gvk });
        }
    }

    /// Disassociates a governing object, returning the kinds that are no
    /// longer tracked.
    pub fn remove_source(&self, category: Category, source: &SourceId) -> Vec<Gvk> {
        self.registrar(category).remove_source(source)
    }

    /// Returns the expectations for a policy object kind.
    pub fn for_kind(&self, gvk: &Gvk) -> Arc<ExpectationSet> {
        self.objects.get_or_detached(gvk)
    }

    /// Returns the expectations for a synced data kind.
    pub fn for_data(&self, gvk: &Gvk) -> Arc<ExpectationSet> {
        self.data.get_or_detached(gvk)
    }

    /// Marks an object of a registered kind as observed. Events for kinds
    /// that are not registered are dropped.
    pub fn observe(&self, category: Category, id: ObjectId) {
        match self.registrar(category).get(&id.gvk) {
            Some(set) => set.observe(id),
            None => tracing::trace!(%category, %id, "Ignoring observation for untracked kind"),
        }
    }

    /// Stops tracking an object of a registered kind. Events for kinds that
    /// are not registered are dropped.
    pub fn cancel(&self, category: Category, id: ObjectId) {
        match self.registrar(category).get(&id.gvk) {
            Some(set) => set.cancel(id),
            None => tracing::trace!(%category, %id, "Ignoring cancellation for untracked kind"),
        }
    }

    /// Watches the set of kinds registered in a category.
    pub fn subscribe(&self, category: Category) -> watch::Receiver<BTreeSet<Gvk>> {
        self.registrar(category).subscribe()
    }

    /// True once bootstrap has completed and every registered kind has been
    /// listed and all of its expected objects observed.
    pub fn satisfied(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire) && self.sets().all(|set| set.satisfied())
    }

    /// True once bootstrap has completed and every registered kind has been
    /// listed.
    pub fn populated(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire) && self.sets().all(|set| set.populated())
    }

    /// Counts the expectations of every registered kind, ordered by category
    /// and kind.
    pub fn stats(&self) -> Vec<(Category, Gvk, Stats)> {
        let mut stats = self
            .categorized()
            .map(|(category, set)| (category, set.gvk().clone(), set.stats()))
            .collect::<Vec<_>>();
        stats.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        stats
    }

    /// Describes every registered kind, including up to `limit` unobserved
    /// objects per kind.
    pub fn report(&self, limit: usize) -> Vec<KindReport> {
        let mut reports = self
            .categorized()
            .map(|(category, set)| KindReport {
                category,
                gvk: set.gvk().clone(),
                satisfied: set.satisfied(),
                stats: set.stats(),
                unobserved: set.unobserved(limit),
            })
            .collect::<Vec<_>>();
        reports.sort_by(|a, b| (a.category, &a.gvk).cmp(&(b.category, &b.gvk)));
        reports
    }

    /// Logs the kinds that are holding back readiness.
    pub fn log_unsatisfied(&self, limit: usize) {
        if !self.bootstrapped.load(Ordering::Acquire) {
            tracing::info!("Bootstrap in progress");
            return;
        }
        for KindReport {
            category,
            gvk,
            satisfied,
            stats,
            unobserved,
        } in self.report(limit)
        {
            if satisfied {
                continue;
            }
            let unobserved = unobserved
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            tracing::info!(
                %category,
                %gvk,
                populated = stats.populated,
                expected = stats.expected,
                observed = stats.observed,
                ?unobserved,
                "Unsatisfied expectations",
            );
        }
    }

    fn registrar(&self, category: Category) -> &KindRegistrar {
        match category {
            Category::Objects => &self.objects,
            Category::Data => &self.data,
        }
    }

    fn sets(&self) -> impl Iterator<Item = Arc<ExpectationSet>> {
        self.objects.sets().into_iter().chain(self.data.sets())
    }

    fn categorized(&self) -> impl Iterator<Item = (Category, Arc<ExpectationSet>)> + '_ {
        [Category::Objects, Category::Data]
            .into_iter()
            .flat_map(move |category| {
                self.registrar(category)
                    .sets()
                    .into_iter()
                    .map(move |set| (category, set))
            })
    }
}
