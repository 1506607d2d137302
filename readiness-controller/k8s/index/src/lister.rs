use crate::kinds;
use anyhow::{Context, Result};
use readiness_controller_core::{Gvk, Listed, Lister, ObjectId, TrackedKinds};
use readiness_controller_k8s_api::{
    discovery, Api, ApiResource, Client, Config, ConstraintTemplate, DynamicObject, ListParams,
    Scope,
};

/// Lists tracked kinds from the Kubernetes API.
///
/// Templates and configs are listed through their typed APIs so that the
/// kinds they govern can be derived. All other kinds are resolved through
/// discovery and listed as dynamic objects.
#[derive(Clone)]
pub struct KubeLister {
    client: Client,
    kinds: TrackedKinds,

    /// When set, namespaced kinds are only listed in this namespace.
    namespace: Option<String>,
}

#[async_trait::async_trait]
impl Lister for KubeLister {
    async fn list(&self, gvk: &Gvk) -> Result<Vec<Listed>> {
        if *gvk == self.kinds.templates {
            return self.list_templates().await;
        }
        if *gvk == self.kinds.config {
            return self.list_configs().await;
        }

        let (resource, caps) = discovery::pinned_kind(&self.client, &kinds::to_kube(gvk))
            .await
            .with_context(|| format!("failed to discover {gvk}"))?;
        let namespaced = matches!(caps.scope, Scope::Namespaced);
        let api = dynamic_api(&self.client, &resource, namespaced, self.namespace.as_deref());
        let list = api
            .list_metadata(&ListParams::default())
            .await
            .with_context(|| format!("failed to list {gvk}"))?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|obj| {
                let name = obj.metadata.name?;
                Some(Listed {
                    id: ObjectId::new(gvk.clone(), obj.metadata.namespace, name),
                    derived: vec![],
                })
            })
            .collect())
    }
}

impl KubeLister {
    pub fn new(client: Client, kinds: TrackedKinds, namespace: Option<String>) -> Self {
        Self {
            client,
            kinds,
            namespace,
        }
    }

    async fn list_templates(&self) -> Result<Vec<Listed>> {
        let templates = Api::<ConstraintTemplate>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .context("failed to list constraint templates")?;
        Ok(templates
            .items
            .iter()
            .filter_map(|template| {
                let id = kinds::object_id(template)?;
                let derived = kinds::template_constraint(template).into_iter().collect();
                Some(Listed { id, derived })
            })
            .collect())
    }

    async fn list_configs(&self) -> Result<Vec<Listed>> {
        let api = match &self.namespace {
            Some(ns) => Api::<Config>::namespaced(self.client.clone(), ns),
            None => Api::<Config>::all(self.client.clone()),
        };
        let configs = api
            .list(&ListParams::default())
            .await
            .context("failed to list configs")?;
        Ok(configs
            .items
            .iter()
            .filter_map(|config| {
                let id = kinds::object_id(config)?;
                let derived = config.sync_only().iter().map(kinds::synced).collect();
                Some(Listed { id, derived })
            })
            .collect())
    }
}

pub(crate) fn dynamic_api(
    client: &Client,
    resource: &ApiResource,
    namespaced: bool,
    namespace: Option<&str>,
) -> Api<DynamicObject> {
    match namespace {
        Some(ns) if namespaced => Api::namespaced_with(client.clone(), ns, resource),
        _ => Api::all_with(client.clone(), resource),
    }
}
