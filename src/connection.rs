//! Publishing connection details into a user-specified Secret.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::OwnerReference};
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
#[cfg(test)]
use mockall::automock;

use crate::{resources::Managed, Result};

/// Key/value pairs that let a consumer use the remote resource
pub type ConnectionDetails = BTreeMap<String, String>;

/// Field manager used for all server-side applies
pub const FIELD_MANAGER: &str = "sns-operator";

macro_rules! meta {
    (owners: $owners:expr, $($lhs:ident : $rhs:expr),*) => {{
        ::kube::core::ObjectMeta {
            owner_references: Some($owners),
            $($lhs : $rhs),*,

            ..Default::default()
        }
    }};
}

/// Where connection details for `obj` go: the secret's namespace and name
pub fn secret_target<K: Managed>(obj: &K) -> Option<(String, String)> {
    let secret = obj.connection_secret_ref()?;
    let name = secret.name.clone().filter(|n| !n.is_empty())?;
    let namespace = secret
        .namespace
        .clone()
        .or_else(|| obj.namespace())
        .unwrap_or_else(|| "default".into());

    Some((namespace, name))
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectionPublisher: Send + Sync {
    /// Write `details` into the secret, creating it when missing
    async fn publish(
        &self,
        namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        details: ConnectionDetails,
    ) -> Result<()>;
}

/// Publishes details by server-side applying a Secret
pub struct SecretPublisher {
    client: Client,
}

impl SecretPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectionPublisher for SecretPublisher {
    async fn publish(
        &self,
        namespace: &str,
        name: &str,
        owner: Option<OwnerReference>,
        details: ConnectionDetails,
    ) -> Result<()> {
        let secrets = Api::<Secret>::namespaced(self.client.clone(), namespace);
        let secret = Secret {
            metadata: meta! {
                owners: owner.into_iter().collect(),
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string())
            },
            string_data: Some(details),
            ..Default::default()
        };

        secrets
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(secret))
            .await?;

        Ok(())
    }
}
