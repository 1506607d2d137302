use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declares a constraint kind and the policy that constraints of that kind
/// enforce.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "templates.gatekeeper.sh",
    version = "v1beta1",
    kind = "ConstraintTemplate"
)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintTemplateSpec {
    #[serde(default)]
    pub crd: Crd,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Crd {
    #[serde(default)]
    pub spec: CrdSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct CrdSpec {
    #[serde(default)]
    pub names: Names,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Names {
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_names: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Target {
    pub target: String,
    pub rego: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<String>,
}

impl ConstraintTemplate {
    /// The kind of the constraints this template generates, if the template
    /// names one.
    pub fn constraint_kind(&self) -> Option<&str> {
        self.spec
            .crd
            .spec
            .names
            .kind
            .as_deref()
            .filter(|kind| !kind.is_empty())
    }
}
