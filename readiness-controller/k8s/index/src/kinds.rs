use readiness_controller_core::{Gvk, ObjectId, TrackedKinds};
use readiness_controller_k8s_api::{
    self as k8s, ConstraintTemplate, GroupVersionKind, Provider, Resource, ResourceExt,
    SyncOnlyEntry,
};

/// Returns the kind of a statically typed resource.
pub fn of<T>() -> Gvk
where
    T: Resource<DynamicType = ()>,
{
    Gvk::new(T::group(&()), T::version(&()), T::kind(&()))
}

/// Identifies a statically typed resource. Returns `None` for resources
/// without a name.
pub fn object_id<T>(resource: &T) -> Option<ObjectId>
where
    T: Resource<DynamicType = ()>,
{
    let name = resource.meta().name.clone()?;
    Some(ObjectId::new(of::<T>(), resource.namespace(), name))
}

/// The kind of the constraints generated by a template.
pub fn constraint(kind: &str) -> Gvk {
    Gvk::new(k8s::CONSTRAINTS_GROUP, k8s::CONSTRAINTS_VERSION, kind)
}

/// The constraint kind a template requires, if it names one.
pub fn template_constraint(template: &ConstraintTemplate) -> Option<Gvk> {
    template.constraint_kind().map(constraint)
}

pub fn synced(entry: &SyncOnlyEntry) -> Gvk {
    Gvk::new(&entry.group, &entry.version, &entry.kind)
}

pub fn mutators() -> Vec<Gvk> {
    k8s::MUTATOR_KINDS
        .iter()
        .map(|kind| Gvk::new(k8s::MUTATIONS_GROUP, k8s::MUTATIONS_VERSION, kind))
        .collect()
}

/// The kinds the tracker always follows, given the enabled features.
pub fn tracked(external_data: bool, mutation: bool) -> TrackedKinds {
    TrackedKinds {
        templates: of::<ConstraintTemplate>(),
        config: of::<k8s::Config>(),
        providers: external_data.then(of::<Provider>),
        mutators: if mutation { mutators() } else { vec![] },
    }
}

pub fn to_kube(gvk: &Gvk) -> GroupVersionKind {
    GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind)
}
