#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
pub mod external_data;
pub mod templates;

pub use self::{
    config::{Config, ConfigSpec, SyncOnlyEntry},
    external_data::{Provider, ProviderSpec},
    templates::{ConstraintTemplate, ConstraintTemplateSpec},
};
pub use k8s_openapi::{api, apimachinery};
pub use kube::{
    api::{
        Api, ApiResource, DynamicObject, GroupVersionKind, ListParams, ObjectMeta, ResourceExt,
    },
    discovery::{self, ApiCapabilities, Scope},
    runtime::watcher,
    Client, Error, Resource,
};

/// The API group of constraint kinds generated from templates.
pub const CONSTRAINTS_GROUP: &str = "constraints.gatekeeper.sh";

/// The API version of constraint kinds generated from templates.
pub const CONSTRAINTS_VERSION: &str = "v1beta1";

/// The API group of mutator kinds.
pub const MUTATIONS_GROUP: &str = "mutations.gatekeeper.sh";

/// The API version of mutator kinds.
pub const MUTATIONS_VERSION: &str = "v1beta1";

/// Mutator kinds tracked when mutation is enabled.
pub const MUTATOR_KINDS: [&str; 3] = ["Assign", "AssignMetadata", "ModifySet"];
