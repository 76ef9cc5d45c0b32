use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Client, Resource};
use tokio::sync::RwLock;

use crate::{
    connection::{ConnectionDetails, ConnectionPublisher},
    operator::Diagnostics,
    resources::{Managed, Topic},
    sns::{Connector, SnsClient},
    store::{KubeStore, ObjectStore},
    Metrics, Result,
};

mod managed;
pub mod subscription;
pub mod topic;

pub use managed::{Outcome, Reconciler};

/// The context passed around
pub struct Context {
    /// Kubernetes client
    pub client: Client,

    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,

    /// Prometheus metrics
    pub metrics: Metrics,

    /// Hands out SNS clients per region
    pub connector: Arc<dyn Connector>,

    /// Writes connection details into secrets
    pub publisher: Arc<dyn ConnectionPublisher>,

    /// How long to wait before observing a healthy resource again
    pub poll_interval: Duration,
}

/// What an observation of the remote resource found
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExternalObservation {
    pub resource_exists: bool,

    /// Whether the remote matches the spec. Only meaningful when the resource exists.
    pub resource_up_to_date: bool,

    /// Whether observe filled in unset spec fields, so the object needs persisting
    pub resource_late_initialized: bool,

    pub connection_details: ConnectionDetails,
}

impl ExternalObservation {
    /// The remote resource does not exist
    pub fn missing() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

/// CRUD against the remote resource behind one kind of managed object
#[async_trait]
pub trait ExternalClient<K>: Send + Sync {
    /// Read the remote resource, late-initializing `obj` and filling its observed status
    async fn observe(&self, obj: &mut K) -> Result<ExternalObservation>;

    /// Create the remote resource and record its external name on `obj`
    async fn create(&self, obj: &mut K) -> Result<ExternalCreation>;

    async fn update(&self, obj: &K) -> Result<ExternalUpdate>;

    /// Whether the remote resource still exists. Leaves `obj` untouched and
    /// does not look at the desired state.
    async fn exists(&self, obj: &K) -> Result<bool>;

    /// Steps required before deleting. Returns true when delete must wait for a later reconcile.
    async fn pre_delete(&self, _obj: &K) -> Result<bool> {
        Ok(false)
    }

    /// Delete the remote resource. A resource that is already gone is not an error.
    async fn delete(&self, obj: &K) -> Result<()>;
}

/// Objects in the same namespace that references may point at
pub struct Siblings {
    pub topics: Arc<dyn ObjectStore<Topic>>,
}

impl Siblings {
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            topics: Arc::new(KubeStore::namespaced(client, namespace)),
        }
    }
}

/// A managed kind the generic [`Reconciler`] can drive
#[async_trait]
pub trait ManagedResource: Managed + Resource<Scope = NamespaceResourceScope> {
    fn external(sns: Arc<dyn SnsClient>) -> Box<dyn ExternalClient<Self>>;

    /// Fill reference-kind fields from their siblings. Returns whether the spec changed.
    async fn resolve_references(&mut self, _siblings: &Siblings) -> Result<bool> {
        Ok(false)
    }
}
