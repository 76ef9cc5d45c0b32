use std::{collections::BTreeMap, fmt::Debug};

use k8s_openapi::api::core::v1::SecretReference;
use kube::Resource;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::conditions::Condition;

mod subscription;
mod topic;

pub use subscription::*;
pub use topic::*;

/// What happens to the remote resource when the object is deleted
#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, JsonSchema, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Delete the remote resource
    #[default]
    Delete,

    /// Leave the remote resource in place
    Orphan,
}

/// How much control the operator has over the remote resource
#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, JsonSchema, PartialEq, Eq)]
pub enum ManagementPolicy {
    /// Create, update and delete the remote resource
    #[default]
    FullControl,

    /// Only observe the remote resource and report its state
    ObserveOnly,
}

/// Reference to a sibling object in the same namespace
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// The name of the referenced object
    pub name: String,
}

/// Selects a sibling object in the same namespace by its labels
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    /// Labels the selected object must carry
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

/// A key/value tag on a remote resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Accessors the generic reconcile driver needs on every managed kind
pub trait Managed:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn deletion_policy(&self) -> DeletionPolicy;

    fn management_policy(&self) -> ManagementPolicy;

    /// Where connection details are published, if anywhere
    fn connection_secret_ref(&self) -> Option<&SecretReference>;

    /// The region all provider calls for this object go to
    fn region(&self) -> &str;

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}
