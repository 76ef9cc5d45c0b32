//! Reads and writes of managed objects in the cluster.

use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::{connection::FIELD_MANAGER, Result};

/// The subset of the cluster API the reconciler needs for one kind
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<K>>;

    async fn list(&self, labels: &BTreeMap<String, String>) -> Result<Vec<K>>;

    /// Replace spec and metadata, failing when `obj` is stale
    async fn update(&self, obj: &K) -> Result<K>;

    /// Write the status of `obj`
    async fn update_status(&self, obj: &K) -> Result<()>;
}

/// [`ObjectStore`] backed by the Kubernetes API within one namespace
pub struct KubeStore<K> {
    api: Api<K>,
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn list(&self, labels: &BTreeMap<String, String>) -> Result<Vec<K>> {
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        Ok(self.api.list(&ListParams::default().labels(&selector)).await?.items)
    }

    async fn update(&self, obj: &K) -> Result<K> {
        Ok(self
            .api
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?)
    }

    async fn update_status(&self, obj: &K) -> Result<()> {
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or_default();

        let patch = Patch::Apply(json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "status": status,
        }));
        let ps = PatchParams::apply(FIELD_MANAGER).force();
        self.api.patch_status(&obj.name_any(), &ps, &patch).await?;

        Ok(())
    }
}
