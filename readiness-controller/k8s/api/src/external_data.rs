use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An external data provider that policies may query.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "externaldata.gatekeeper.sh",
    version = "v1alpha1",
    kind = "Provider"
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    pub url: String,

    /// Seconds to wait for the provider to respond.
    pub timeout: Option<u32>,

    /// Base64-encoded CA bundle used to verify the provider.
    pub ca_bundle: Option<String>,
}
