use std::fmt;

/// Identifies a kind of cluster object by API group, version and kind.
///
/// The core API group is represented by an empty `group`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

/// Uniquely identifies a tracked object: its kind plus, for namespaced
/// kinds, the namespace, and its name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub gvk: Gvk,
    pub namespace: Option<String>,
    pub name: String,
}

// === impl Gvk ===

impl Gvk {
    pub fn new(group: impl ToString, version: impl ToString, kind: impl ToString) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            return self.version.clone();
        }
        format!("{}/{}", self.group, self.version)
    }

    /// Builds the identifier of a cluster-scoped object of this kind.
    pub fn cluster_object(&self, name: impl ToString) -> ObjectId {
        ObjectId {
            gvk: self.clone(),
            namespace: None,
            name: name.to_string(),
        }
    }

    /// Builds the identifier of a namespaced object of this kind.
    pub fn namespaced_object(&self, namespace: impl ToString, name: impl ToString) -> ObjectId {
        ObjectId {
            gvk: self.clone(),
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

// === impl ObjectId ===

impl ObjectId {
    pub fn new(gvk: Gvk, namespace: Option<String>, name: impl ToString) -> Self {
        Self {
            gvk,
            namespace,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.gvk, ns, self.name),
            None => write!(f, "{} {}", self.gvk, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_core_group() {
        let cm = Gvk::new("", "v1", "ConfigMap");
        assert_eq!(cm.api_version(), "v1");
        assert_eq!(
            cm.namespaced_object("ns-0", "cm-0").to_string(),
            "v1, Kind=ConfigMap ns-0/cm-0"
        );
    }

    #[test]
    fn display_named_group() {
        let ct = Gvk::new("templates.gatekeeper.sh", "v1beta1", "ConstraintTemplate");
        assert_eq!(
            ct.cluster_object("k8srequiredlabels").to_string(),
            "templates.gatekeeper.sh/v1beta1, Kind=ConstraintTemplate k8srequiredlabels"
        );
    }
}
