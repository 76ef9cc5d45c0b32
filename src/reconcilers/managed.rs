//! The reconcile loop shared by every managed kind.

use std::time::Duration;

use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use super::{ExternalClient, ManagedResource, Siblings};
use crate::{
    conditions::{set_condition, Condition},
    connection::{secret_target, ConnectionDetails, ConnectionPublisher},
    external_name::get_external_name,
    resources::{DeletionPolicy, ManagementPolicy},
    sns::Connector,
    store::ObjectStore,
    Error, Result,
};

/// Requeue delay after a create or update, to observe the result soon
const SHORT_WAIT: Duration = Duration::from_secs(5);

/// What a successful apply did to the remote resource
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    UpToDate,
    /// The remote resource was only observed
    Observed,
}

impl Outcome {
    pub fn requeue_after(self, poll_interval: Duration) -> Duration {
        match self {
            Outcome::Created | Outcome::Updated => SHORT_WAIT.min(poll_interval),
            Outcome::UpToDate | Outcome::Observed => poll_interval,
        }
    }
}

/// Drives one object of kind `K` towards its spec
pub struct Reconciler<'a, K> {
    pub connector: &'a dyn Connector,
    pub store: &'a dyn ObjectStore<K>,
    pub siblings: &'a Siblings,
    pub publisher: &'a dyn ConnectionPublisher,
}

impl<'a, K: ManagedResource> Reconciler<'a, K> {
    /// Bring the remote resource in line with `obj` and record the result on its status.
    ///
    /// Failures are written to the `Synced` condition before being returned.
    pub async fn apply(&self, obj: &mut K) -> Result<Outcome> {
        let result = self.sync(obj).await;
        let synced = match &result {
            Ok(_) => Condition::reconcile_success(),
            Err(error) => Condition::reconcile_error(error),
        };
        set_condition(obj.conditions_mut(), synced);
        self.store.update_status(obj).await?;

        result
    }

    /// Delete the remote resource unless it is orphaned or only observed.
    ///
    /// Returns an error while the remote deletion has not completed.
    pub async fn cleanup(&self, obj: &mut K) -> Result<()> {
        if obj.deletion_policy() == DeletionPolicy::Orphan
            || obj.management_policy() == ManagementPolicy::ObserveOnly
        {
            info!(name = %obj.name_any(), "leaving remote resource in place");
            return Ok(());
        }

        let result = self.delete(obj).await;
        if let Err(error) = &result {
            set_condition(obj.conditions_mut(), Condition::reconcile_error(error));
            self.store.update_status(obj).await?;
        }

        result
    }

    fn external(&self, obj: &K) -> Result<Box<dyn ExternalClient<K>>> {
        Ok(K::external(self.connector.connect(obj.region())?))
    }

    async fn sync(&self, obj: &mut K) -> Result<Outcome> {
        if obj.resolve_references(self.siblings).await? {
            self.persist(obj).await?;
        }

        let external = self.external(obj)?;
        let observation = external.observe(obj).await?;
        if observation.resource_late_initialized {
            debug!(name = %obj.name_any(), "persisting late-initialized spec");
            self.persist(obj).await?;
        }

        let observe_only = obj.management_policy() == ManagementPolicy::ObserveOnly;
        if !observation.resource_exists {
            if observe_only {
                let name = get_external_name(obj).unwrap_or_default().to_string();
                return Err(Error::ObservedResourceMissing(name));
            }

            set_condition(obj.conditions_mut(), Condition::creating());
            let creation = external.create(obj).await?;
            // the external name is the only link to the new resource
            self.persist(obj).await?;
            info!(
                name = %obj.name_any(),
                external_name = get_external_name(obj).unwrap_or_default(),
                "created remote resource"
            );
            self.publish(obj, creation.connection_details).await?;

            return Ok(Outcome::Created);
        }

        self.publish(obj, observation.connection_details).await?;
        if observe_only {
            return Ok(Outcome::Observed);
        }
        if observation.resource_up_to_date {
            return Ok(Outcome::UpToDate);
        }

        let update = external.update(obj).await?;
        info!(name = %obj.name_any(), "updated remote resource");
        self.publish(obj, update.connection_details).await?;

        Ok(Outcome::Updated)
    }

    async fn delete(&self, obj: &mut K) -> Result<()> {
        set_condition(obj.conditions_mut(), Condition::deleting());

        let external = self.external(obj)?;
        if !external.exists(obj).await? {
            return Ok(());
        }

        let name = get_external_name(obj).unwrap_or_default().to_string();
        if external.pre_delete(obj).await? {
            return Err(Error::DeletionPending(name));
        }

        external.delete(obj).await?;
        info!(name = %obj.name_any(), external_name = %name, "deleted remote resource");

        Ok(())
    }

    /// Write spec and metadata, keeping the in-memory status
    async fn persist(&self, obj: &mut K) -> Result<()> {
        let stored = self.store.update(obj).await?;
        obj.meta_mut().resource_version = stored.meta().resource_version.clone();
        Ok(())
    }

    async fn publish(&self, obj: &K, details: ConnectionDetails) -> Result<()> {
        let Some((namespace, name)) = secret_target(obj) else {
            return Ok(());
        };
        if details.is_empty() {
            warn!(name = %obj.name_any(), "no connection details to publish");
            return Ok(());
        }

        self.publisher
            .publish(&namespace, &name, obj.controller_owner_ref(&()), details)
            .await
    }
}
