use crate::{ExpectationSet, Gvk, ObjectId};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use parking_lot::Mutex;
use std::{
    collections::{hash_map::Entry, BTreeSet},
    fmt,
    sync::{Arc, Weak},
};
use tokio::sync::watch;

/// Identifies the object that justifies tracking a kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// Kinds the controller always tracks. Never retired.
    Static,

    /// A governing object, e.g. a constraint template or the `Config`
    /// resource.
    Object(ObjectId),
}

/// Maintains the set of tracked kinds, keyed by the sources that reference
/// them, and owns the expectation set of each tracked kind.
///
/// The registry lock guards only the kind/source mappings and the existence
/// of each set. Set contents are guarded by each set's own lock.
pub struct KindRegistrar {
    name: &'static str,
    registry: Mutex<Registry>,
    kinds_tx: watch::Sender<BTreeSet<Gvk>>,
}

#[derive(Debug, Default)]
struct Registry {
    kinds: HashMap<Gvk, Registration>,
    sources: HashMap<SourceId, HashSet<Gvk>>,

    /// Sets handed out for kinds that no source references yet. They do not
    /// count toward readiness and are adopted if the kind is registered
    /// while a caller still holds them.
    detached: HashMap<Gvk, Weak<ExpectationSet>>,
}

#[derive(Debug)]
struct Registration {
    set: Arc<ExpectationSet>,
    sources: HashSet<SourceId>,
}

// === impl SourceId ===

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Object(id) => fmt::Display::fmt(id, f),
        }
    }
}

// === impl KindRegistrar ===

impl KindRegistrar {
    pub fn new(name: &'static str) -> Self {
        let (kinds_tx, _) = watch::channel(BTreeSet::new());
        Self {
            name,
            registry: Mutex::new(Registry::default()),
            kinds_tx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Associates `source` with `kinds`, replacing any kinds it previously
    /// referenced.
    ///
    /// Returns the kinds that became tracked as a result. These have fresh,
    /// unpopulated sets and must be listed. Kinds that the source no longer
    /// references are retired if nothing else references them.
    pub fn add_source(&self, source: SourceId, kinds: impl IntoIterator<Item = Gvk>) -> Vec<Gvk> {
        let kinds = kinds.into_iter().collect::<HashSet<_>>();

        let mut registry = self.registry.lock();
        let Registry {
            kinds: by_kind,
            sources,
            detached,
        } = &mut *registry;

        let previous = sources.remove(&source).unwrap_or_default();

        let mut added = Vec::new();
        for gvk in kinds.iter() {
            match by_kind.entry(gvk.clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().sources.insert(source.clone());
                }
                Entry::Vacant(entry) => {
                    let set = detached
                        .remove(gvk)
                        .and_then(|set| set.upgrade())
                        .unwrap_or_else(|| Arc::new(ExpectationSet::new(gvk.clone())));
                    entry.insert(Registration {
                        set,
                        sources: Some(source.clone()).into_iter().collect(),
                    });
                    added.push(gvk.clone());
                }
            }
        }

        let retired = previous
            .difference(&kinds)
            .filter(|gvk| Self::release(by_kind, gvk, &source))
            .cloned()
            .collect::<Vec<_>>();

        if !kinds.is_empty() {
            sources.insert(source.clone(), kinds);
        }

        if !added.is_empty() || !retired.is_empty() {
            self.publish(by_kind);
        }
        drop(registry);

        for gvk in &added {
            tracing::debug!(registrar = %self.name, %gvk, %source, "Registered kind");
        }
        for gvk in &retired {
            tracing::debug!(registrar = %self.name, %gvk, %source, "Retired kind");
        }
        added
    }

    /// Removes `source`, retiring every kind it was the last reference to.
    ///
    /// Returns the retired kinds.
    pub fn remove_source(&self, source: &SourceId) -> Vec<Gvk> {
        let mut registry = self.registry.lock();
        let Registry {
            kinds: by_kind,
            sources,
            ..
        } = &mut *registry;

        let Some(kinds) = sources.remove(source) else {
            return Vec::new();
        };

        let retired = kinds
            .iter()
            .filter(|gvk| Self::release(by_kind, gvk, source))
            .cloned()
            .collect::<Vec<_>>();
        if !retired.is_empty() {
            self.publish(by_kind);
        }
        drop(registry);

        for gvk in &retired {
            tracing::debug!(registrar = %self.name, %gvk, %source, "Retired kind");
        }
        retired
    }

    /// Returns the set of a registered kind.
    pub fn get(&self, gvk: &Gvk) -> Option<Arc<ExpectationSet>> {
        self.registry
            .lock()
            .kinds
            .get(gvk)
            .map(|reg| reg.set.clone())
    }

    /// Returns the set of a kind, creating a detached set if the kind is not
    /// registered.
    ///
    /// The registrar holds detached sets weakly, so a set is released once
    /// its last handle is dropped.
    pub fn get_or_detached(&self, gvk: &Gvk) -> Arc<ExpectationSet> {
        let mut registry = self.registry.lock();
        if let Some(reg) = registry.kinds.get(gvk) {
            return reg.set.clone();
        }
        if let Some(set) = registry.detached.get(gvk).and_then(Weak::upgrade) {
            return set;
        }

        registry.detached.retain(|_, set| set.strong_count() > 0);
        let set = Arc::new(ExpectationSet::new(gvk.clone()));
        registry
            .detached
            .insert(gvk.clone(), Arc::downgrade(&set));
        set
    }

    /// Indicates whether `set` is still the registered set for `gvk`.
    pub fn is_current(&self, gvk: &Gvk, set: &Arc<ExpectationSet>) -> bool {
        self.registry
            .lock()
            .kinds
            .get(gvk)
            .is_some_and(|reg| Arc::ptr_eq(&reg.set, set))
    }

    /// Snapshots the sets of all registered kinds.
    pub fn sets(&self) -> Vec<Arc<ExpectationSet>> {
        self.registry
            .lock()
            .kinds
            .values()
            .map(|reg| reg.set.clone())
            .collect()
    }

    pub fn kinds(&self) -> BTreeSet<Gvk> {
        self.kinds_tx.borrow().clone()
    }

    /// Watches the set of registered kinds.
    pub fn subscribe(&self) -> watch::Receiver<BTreeSet<Gvk>> {
        self.kinds_tx.subscribe()
    }

    /// Drops `source`'s reference to `gvk`, returning true if the kind was
    /// retired.
    fn release(by_kind: &mut HashMap<Gvk, Registration>, gvk: &Gvk, source: &SourceId) -> bool {
        let Entry::Occupied(mut entry) = by_kind.entry(gvk.clone()) else {
            return false;
        };
        entry.get_mut().sources.remove(source);
        if entry.get().sources.is_empty() {
            entry.remove();
            return true;
        }
        false
    }

    fn publish(&self, by_kind: &HashMap<Gvk, Registration>) {
        self.kinds_tx
            .send_replace(by_kind.keys().cloned().collect());
    }
}

impl fmt::Debug for KindRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistrar")
            .field("name", &self.name)
            .field("kinds", &*self.kinds_tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;

    fn constraint(kind: &str) -> Gvk {
        Gvk::new("constraints.gatekeeper.sh", "v1beta1", kind)
    }

    fn template(name: &str) -> SourceId {
        SourceId::Object(
            Gvk::new("templates.gatekeeper.sh", "v1beta1", "ConstraintTemplate")
                .cluster_object(name),
        )
    }

    #[test]
    fn add_source_registers_once() {
        let registrar = KindRegistrar::new("test");
        let kind = constraint("K8sRequiredLabels");

        assert_eq!(
            registrar.add_source(template("a"), Some(kind.clone())),
            vec![kind.clone()]
        );
        let set = registrar.get(&kind).expect("kind must be registered");

        // A second source referencing the same kind shares the set.
        assert!(registrar.add_source(template("b"), Some(kind.clone())).is_empty());
        assert!(registrar.is_current(&kind, &set));
        assert_eq!(registrar.sets().len(), 1);
    }

    #[test]
    fn kind_retired_with_last_source() {
        let registrar = KindRegistrar::new("test");
        let kind = constraint("K8sRequiredLabels");
        registrar.add_source(template("a"), Some(kind.clone()));
        registrar.add_source(template("b"), Some(kind.clone()));
        let set = registrar.get(&kind).unwrap();

        assert!(registrar.remove_source(&template("a")).is_empty());
        assert!(registrar.is_current(&kind, &set));

        assert_eq!(registrar.remove_source(&template("b")), vec![kind.clone()]);
        assert!(registrar.get(&kind).is_none());
        assert!(!registrar.is_current(&kind, &set));
        assert!(registrar.sets().is_empty());

        // Removing an unknown source is a no-op.
        assert!(registrar.remove_source(&template("b")).is_empty());
    }

    #[test]
    fn re_adding_a_source_replaces_its_kinds() {
        let registrar = KindRegistrar::new("test");
        let old = constraint("OldKind");
        let new = constraint("NewKind");

        registrar.add_source(template("a"), Some(old.clone()));
        assert_eq!(
            registrar.add_source(template("a"), Some(new.clone())),
            vec![new.clone()]
        );
        assert!(registrar.get(&old).is_none());
        assert!(registrar.get(&new).is_some());
        assert_eq!(registrar.kinds(), btreeset! { new });
    }

    #[test]
    fn static_kinds_survive_object_removal() {
        let registrar = KindRegistrar::new("test");
        let kind = constraint("K8sRequiredLabels");
        registrar.add_source(SourceId::Static, Some(kind.clone()));
        registrar.add_source(template("a"), Some(kind.clone()));

        assert!(registrar.remove_source(&template("a")).is_empty());
        assert!(registrar.get(&kind).is_some());
    }

    #[test]
    fn detached_set_is_adopted() {
        let registrar = KindRegistrar::new("test");
        let kind = constraint("K8sRequiredLabels");

        let detached = registrar.get_or_detached(&kind);
        detached.observe(kind.cluster_object("early"));
        assert!(registrar.get(&kind).is_none());
        assert!(registrar.sets().is_empty(), "detached sets are not registered");

        registrar.add_source(template("a"), Some(kind.clone()));
        let registered = registrar.get(&kind).unwrap();
        assert!(Arc::ptr_eq(&detached, &registered));
        assert_eq!(registered.stats().observed, 1);
    }

    #[test]
    fn dropped_detached_sets_are_released() {
        let registrar = KindRegistrar::new("test");
        let kind = constraint("K8sRequiredLabels");

        let detached = registrar.get_or_detached(&kind);
        detached.observe(kind.cluster_object("early"));
        assert!(Arc::ptr_eq(&detached, &registrar.get_or_detached(&kind)));
        drop(detached);

        // Looking up another kind prunes the released set.
        let _other = registrar.get_or_detached(&constraint("Other"));
        assert_eq!(registrar.registry.lock().detached.len(), 1);

        registrar.add_source(template("a"), Some(kind.clone()));
        let registered = registrar.get(&kind).unwrap();
        assert_eq!(registered.stats(), Default::default());
    }

    #[test]
    fn subscribers_see_kind_changes() {
        let registrar = KindRegistrar::new("test");
        let mut rx = registrar.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        let kind = constraint("K8sRequiredLabels");
        registrar.add_source(template("a"), Some(kind.clone()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), btreeset! { kind });

        registrar.remove_source(&template("a"));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }
}
