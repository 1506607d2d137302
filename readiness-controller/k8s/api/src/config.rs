use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configures the controller, including the cluster data that is synced
/// for use by policies.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "config.gatekeeper.sh",
    version = "v1alpha1",
    kind = "Config",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    #[serde(default)]
    pub sync: SyncSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_only: Vec<SyncOnlyEntry>,
}

/// A kind of cluster data to be synced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub struct SyncOnlyEntry {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Config {
    pub fn sync_only(&self) -> &[SyncOnlyEntry] {
        &self.spec.sync.sync_only
    }
}
