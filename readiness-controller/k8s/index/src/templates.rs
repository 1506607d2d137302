use crate::kinds;
use parking_lot::RwLock;
use readiness_controller_core::{Category, Gvk, SharedTracker, SourceId};
use readiness_controller_k8s_api::{ConstraintTemplate, ResourceExt};
use std::sync::Arc;

/// Registers the constraint kind of each constraint template with the
/// tracker and reports templates as observed.
#[derive(Debug)]
pub struct Index {
    tracker: SharedTracker,
    gvk: Gvk,
}

pub type SharedIndex = Arc<RwLock<Index>>;

impl kubert::index::IndexClusterResource<ConstraintTemplate> for Index {
    fn apply(&mut self, template: ConstraintTemplate) {
        let name = template.name_unchecked();
        let id = self.gvk.cluster_object(&name);
        let source = SourceId::Object(id.clone());

        match kinds::template_constraint(&template) {
            Some(gvk) => {
                self.tracker.add_source(Category::Objects, source, Some(gvk));
            }
            None => {
                tracing::warn!(template = %name, "Template does not name a constraint kind");
                self.tracker.remove_source(Category::Objects, &source);
            }
        }
        self.tracker.observe(Category::Objects, id);
    }

    fn delete(&mut self, name: String) {
        let id = self.gvk.cluster_object(&name);
        self.tracker.cancel(Category::Objects, id.clone());
        let retired = self
            .tracker
            .remove_source(Category::Objects, &SourceId::Object(id));
        tracing::debug!(template = %name, ?retired, "Template deleted");
    }
}

impl Index {
    pub fn shared(tracker: SharedTracker) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            gvk: tracker.tracked_kinds().templates.clone(),
            tracker,
        }))
    }
}
