use parking_lot::RwLock;
use readiness_controller_core::{Category, Gvk, SharedTracker};
use readiness_controller_k8s_api::{Provider, ResourceExt};
use std::sync::Arc;

/// Reports external data providers as observed.
#[derive(Debug)]
pub struct Index {
    tracker: SharedTracker,
    gvk: Gvk,
}

pub type SharedIndex = Arc<RwLock<Index>>;

impl kubert::index::IndexClusterResource<Provider> for Index {
    fn apply(&mut self, provider: Provider) {
        let id = self.gvk.cluster_object(provider.name_unchecked());
        self.tracker.observe(Category::Objects, id);
    }

    fn delete(&mut self, name: String) {
        self.tracker
            .cancel(Category::Objects, self.gvk.cluster_object(name));
    }
}

impl Index {
    /// Returns `None` when external data is disabled.
    pub fn shared(tracker: SharedTracker) -> Option<SharedIndex> {
        let gvk = tracker.tracked_kinds().providers.clone()?;
        Some(Arc::new(RwLock::new(Self { tracker, gvk })))
    }
}
