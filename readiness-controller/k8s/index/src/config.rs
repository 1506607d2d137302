use crate::kinds;
use parking_lot::RwLock;
use readiness_controller_core::{Category, Gvk, SharedTracker, SourceId};
use readiness_controller_k8s_api::Config;
use std::sync::Arc;

/// Registers the data kinds synced by each `Config` resource with the
/// tracker and reports configs as observed.
#[derive(Debug)]
pub struct Index {
    tracker: SharedTracker,
    gvk: Gvk,
}

pub type SharedIndex = Arc<RwLock<Index>>;

impl kubert::index::IndexNamespacedResource<Config> for Index {
    fn apply(&mut self, config: Config) {
        let Some(id) = kinds::object_id(&config) else {
            return;
        };
        let synced = config.sync_only().iter().map(kinds::synced);
        self.tracker
            .add_source(Category::Data, SourceId::Object(id.clone()), synced);
        self.tracker.observe(Category::Objects, id);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = self.gvk.namespaced_object(namespace, name);
        self.tracker.cancel(Category::Objects, id.clone());
        let retired = self
            .tracker
            .remove_source(Category::Data, &SourceId::Object(id));
        tracing::debug!(?retired, "Config deleted");
    }
}

impl Index {
    pub fn shared(tracker: SharedTracker) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            gvk: tracker.tracked_kinds().config.clone(),
            tracker,
        }))
    }
}
