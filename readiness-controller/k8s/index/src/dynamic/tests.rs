use super::*;
use readiness_controller_core::{SourceId, Stats, Tracker};
use readiness_controller_k8s_api::GroupVersionKind;

fn configmaps() -> Gvk {
    Gvk::new("", "v1", "ConfigMap")
}

fn mk_configmap(ns: &str, name: &str) -> DynamicObject {
    let resource = ApiResource::from_gvk(&GroupVersionKind::gvk("", "v1", "ConfigMap"));
    DynamicObject::new(name, &resource).within(ns)
}

fn config_source() -> SourceId {
    SourceId::Object(
        kinds::of::<readiness_controller_k8s_api::Config>()
            .namespaced_object("gatekeeper-system", "config"),
    )
}

/// Builds a tracker syncing configmaps.
fn mk_tracker() -> SharedTracker {
    let tracker = Tracker::shared(kinds::tracked(false, false));
    tracker.add_source(Category::Data, config_source(), Some(configmaps()));
    tracker
}

#[test]
fn applied_objects_are_observed() {
    let tracker = mk_tracker();
    let set = tracker.for_data(&configmaps());
    set.expect(configmaps().namespaced_object("ns-0", "cm-0"));
    set.mark_populated();
    assert!(!set.satisfied());

    let mut cache = KindCache::new(tracker.clone(), Category::Data, configmaps());
    cache.handle(watcher::Event::Apply(mk_configmap("ns-0", "cm-0")));

    assert_eq!(
        set.stats(),
        Stats {
            expected: 1,
            observed: 1,
            populated: true,
        }
    );
    assert!(set.satisfied());
}

#[test]
fn deleted_objects_are_cancelled() {
    let tracker = mk_tracker();
    let set = tracker.for_data(&configmaps());
    let id = configmaps().namespaced_object("ns-0", "cm-0");
    set.expect(id.clone());
    set.mark_populated();

    let mut cache = KindCache::new(tracker.clone(), Category::Data, configmaps());
    cache.handle(watcher::Event::Delete(mk_configmap("ns-0", "cm-0")));
    assert!(set.satisfied());
    assert_eq!(set.stats().expected, 0);
}

#[test]
fn relist_cancels_vanished_objects() {
    let tracker = mk_tracker();
    let set = tracker.for_data(&configmaps());

    let mut cache = KindCache::new(tracker.clone(), Category::Data, configmaps());
    cache.handle(watcher::Event::Init);
    cache.handle(watcher::Event::InitApply(mk_configmap("ns-0", "cm-0")));
    cache.handle(watcher::Event::InitApply(mk_configmap("ns-0", "cm-1")));
    cache.handle(watcher::Event::InitDone);
    assert_eq!(set.stats().observed, 2);

    // cm-1 is deleted while the watch is disconnected, and a stale listing
    // completes afterwards.
    let gone = configmaps().namespaced_object("ns-0", "cm-1");
    cache.handle(watcher::Event::Init);
    cache.handle(watcher::Event::InitApply(mk_configmap("ns-0", "cm-0")));
    cache.handle(watcher::Event::InitDone);
    set.expect(gone.clone());
    set.mark_populated();

    assert_eq!(set.stats().expected, 1);
    assert!(set.unobserved(10).is_empty());
    assert!(set.satisfied(), "vanished objects must not be expected");

    // A later re-list does not cancel the vanished object twice.
    cache.handle(watcher::Event::Init);
    cache.handle(watcher::Event::InitApply(mk_configmap("ns-0", "cm-0")));
    cache.handle(watcher::Event::InitDone);
    assert_eq!(set.stats().observed, 1);
}

#[test]
fn unnamed_objects_are_ignored() {
    let tracker = mk_tracker();
    let set = tracker.for_data(&configmaps());
    let mut obj = mk_configmap("ns-0", "cm-0");
    obj.metadata.name = None;

    let mut cache = KindCache::new(tracker, Category::Data, configmaps());
    cache.handle(watcher::Event::Apply(obj));
    assert_eq!(set.stats(), Stats::default());
}

#[test]
fn events_after_retirement_are_dropped() {
    let tracker = mk_tracker();
    let mut cache = KindCache::new(tracker.clone(), Category::Data, configmaps());
    cache.handle(watcher::Event::Apply(mk_configmap("ns-0", "cm-0")));

    // The watch may still deliver events after the kind is retired.
    tracker.remove_source(Category::Data, &config_source());
    cache.handle(watcher::Event::Apply(mk_configmap("ns-0", "cm-1")));
    cache.handle(watcher::Event::Delete(mk_configmap("ns-0", "cm-0")));

    // The kind returns with a fresh set that holds none of those events.
    tracker.add_source(Category::Data, config_source(), Some(configmaps()));
    let set = tracker.for_data(&configmaps());
    assert_eq!(set.stats(), Stats::default());
    assert!(!set.is_cancelled(&configmaps().namespaced_object("ns-0", "cm-0")));
}

#[test]
fn discovery_backoff_is_capped() {
    let mut backoff = Backoff::default();
    assert!(!backoff.is_retrying());
    assert_eq!(backoff.failed(), DISCOVERY_BACKOFF_MIN);
    assert!(backoff.is_retrying(), "later failures are retries");

    let delays = (0..10).map(|_| backoff.failed()).collect::<Vec<_>>();
    assert_eq!(delays[0], DISCOVERY_BACKOFF_MIN * 2);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(delays.last(), Some(&DISCOVERY_BACKOFF_MAX));
    assert_eq!(backoff.attempts, 11);
}

#[test]
fn typed_kinds_are_not_watched_dynamically() {
    let kinds = kinds::tracked(true, true);
    let objects = excluded(&kinds, Category::Objects);
    assert!(objects.contains(&kinds.templates));
    assert!(objects.contains(&kinds.config));
    assert!(objects.contains(kinds.providers.as_ref().unwrap()));
    assert!(kinds.mutators.iter().all(|gvk| !objects.contains(gvk)));

    assert!(excluded(&kinds, Category::Data).is_empty());
}
