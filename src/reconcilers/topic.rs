use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{info, warn};

use super::{ExternalClient, ExternalCreation, ExternalObservation, ExternalUpdate, ManagedResource};
use crate::{
    attributes::{self, AttributeField, Comparator, Mutability},
    conditions::{set_condition, RemoteState},
    connection::ConnectionDetails,
    external_name::{get_external_name, set_external_name},
    resources::{Tag, Topic, TopicObservation, TopicParameters},
    sns::{AttributeBag, SnsClient},
    Error, Result,
};

const DESCRIBE: &str = "cannot describe topic";
const CREATE: &str = "cannot create topic";
const UPDATE: &str = "cannot update topic";
const DELETE: &str = "cannot delete topic";

fn display_name(p: &mut TopicParameters) -> &mut Option<String> {
    &mut p.display_name
}

fn kms_master_key_id(p: &mut TopicParameters) -> &mut Option<String> {
    &mut p.kms_master_key_id
}

fn policy(p: &mut TopicParameters) -> &mut Option<String> {
    &mut p.policy
}

fn delivery_policy(p: &mut TopicParameters) -> &mut Option<String> {
    &mut p.delivery_policy
}

/// Topic attributes the operator manages
pub const ATTRIBUTES: &[AttributeField<TopicParameters>] = &[
    AttributeField {
        name: "DisplayName",
        comparator: Comparator::Text,
        mutability: Mutability::Mutable,
        render: |p| p.display_name.clone(),
        late_init: Some(display_name),
    },
    AttributeField {
        name: "KmsMasterKeyId",
        comparator: Comparator::Text,
        mutability: Mutability::Mutable,
        render: |p| p.kms_master_key_id.clone(),
        late_init: Some(kms_master_key_id),
    },
    AttributeField {
        name: "Policy",
        comparator: Comparator::Policy,
        mutability: Mutability::Mutable,
        render: |p| p.policy.clone(),
        late_init: Some(policy),
    },
    AttributeField {
        name: "DeliveryPolicy",
        comparator: Comparator::Json,
        mutability: Mutability::Mutable,
        render: |p| p.delivery_policy.clone(),
        late_init: Some(delivery_policy),
    },
    AttributeField {
        name: "FifoTopic",
        comparator: Comparator::Bool,
        mutability: Mutability::Immutable,
        render: |p| p.fifo_topic.filter(|fifo| *fifo).map(|_| "true".to_string()),
        late_init: None,
    },
];

fn observation(attributes: &AttributeBag) -> TopicObservation {
    let text = |name: &str| attributes.get(name).filter(|v| !v.is_empty()).cloned();
    let count = |name: &str| attributes.get(name).and_then(|v| v.parse().ok());

    TopicObservation {
        arn: text("TopicArn"),
        owner: text("Owner"),
        subscriptions_confirmed: count("SubscriptionsConfirmed"),
        subscriptions_pending: count("SubscriptionsPending"),
        subscriptions_deleted: count("SubscriptionsDeleted"),
        effective_delivery_policy: text("EffectiveDeliveryPolicy"),
    }
}

/// The `(region, name)` a topic ARN encodes
fn arn_identity(arn: &str) -> Option<(&str, &str)> {
    match arn.splitn(6, ':').collect::<Vec<_>>()[..] {
        ["arn", _, "sns", region, _, name] => Some((region, name)),
        _ => None,
    }
}

fn connection_details(arn: &str) -> ConnectionDetails {
    let name = arn_identity(arn).map(|(_, name)| name).unwrap_or_default();
    ConnectionDetails::from([
        ("arn".to_string(), arn.to_string()),
        ("name".to_string(), name.to_string()),
    ])
}

/// Desired tags keyed by tag key. Keys must be unique.
fn desired_tags(topic: &Topic) -> Result<BTreeMap<&str, &str>> {
    let mut tags = BTreeMap::new();
    for tag in &topic.spec.for_provider.tags {
        if tags.insert(tag.key.as_str(), tag.value.as_str()).is_some() {
            return Err(Error::IllegalResource(
                "Topic".into(),
                format!("{}: duplicate tag key {:?}", topic.name_any(), tag.key),
            ));
        }
    }
    Ok(tags)
}

fn observed_tags(tags: &[Tag]) -> BTreeMap<&str, &str> {
    tags.iter()
        .map(|tag| (tag.key.as_str(), tag.value.as_str()))
        .collect()
}

/// Immutable fields whose desired value differs from the topic behind `arn`
fn identity_drift(
    arn: &str,
    params: &TopicParameters,
    tags: &[Tag],
    desired: &BTreeMap<&str, &str>,
) -> Vec<String> {
    let mut drift = vec![];
    if let Some((region, name)) = arn_identity(arn) {
        if name != params.name {
            drift.push("Name".to_string());
        }
        if region != params.region {
            drift.push("Region".to_string());
        }
    }
    if &observed_tags(tags) != desired {
        drift.push("Tags".to_string());
    }
    drift
}

/// Manages SNS topics
pub struct TopicClient {
    sns: Arc<dyn SnsClient>,
}

impl TopicClient {
    pub fn new(sns: Arc<dyn SnsClient>) -> Self {
        Self { sns }
    }
}

#[async_trait]
impl ExternalClient<Topic> for TopicClient {
    async fn observe(&self, topic: &mut Topic) -> Result<ExternalObservation> {
        let Some(arn) = get_external_name(topic).map(str::to_string) else {
            return Ok(ExternalObservation::missing());
        };

        let observed = match self.sns.get_topic_attributes(&arn).await {
            Ok(observed) => observed,
            Err(e) if e.is_not_found() => return Ok(ExternalObservation::missing()),
            Err(e) => return Err(Error::provider(DESCRIBE)(e)),
        };

        let late_initialized =
            attributes::late_initialize(ATTRIBUTES, &mut topic.spec.for_provider, &observed);

        // SNS topics have no lifecycle of their own, existing means usable
        let state = RemoteState::Active;
        let status = topic.status.get_or_insert_with(Default::default);
        status.at_provider = Some(observation(&observed));
        if let Some(condition) = state.condition() {
            set_condition(&mut status.conditions, condition);
        }

        let up_to_date = !state.checks_up_to_date() || {
            let desired = desired_tags(topic)?;
            let tags = self.sns.list_tags(&arn).await.map_err(Error::provider(DESCRIBE))?;
            attributes::is_up_to_date(ATTRIBUTES, &topic.spec.for_provider, &observed)?
                && identity_drift(&arn, &topic.spec.for_provider, &tags, &desired).is_empty()
        };

        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            resource_late_initialized: late_initialized,
            connection_details: connection_details(&arn),
        })
    }

    async fn create(&self, topic: &mut Topic) -> Result<ExternalCreation> {
        desired_tags(topic)?;
        let params = &topic.spec.for_provider;
        let create_time =
            attributes::render(ATTRIBUTES, params, |f| f.mutability == Mutability::Immutable)?;
        let remaining =
            attributes::render(ATTRIBUTES, params, |f| f.mutability == Mutability::Mutable)?;

        let arn = self
            .sns
            .create_topic(&params.name, create_time, params.tags.clone())
            .await
            .map_err(Error::provider(CREATE))?;
        let details = connection_details(&arn);

        // Remaining attributes are set right away; anything that fails here is
        // picked up by the next update.
        for (name, value) in &remaining {
            if let Err(e) = self.sns.set_topic_attributes(&arn, name, value).await {
                warn!(
                    topic = %topic.name_any(),
                    attribute = %name,
                    error = %e,
                    "cannot set attribute after create"
                );
                break;
            }
        }

        set_external_name(topic, arn);

        Ok(ExternalCreation {
            connection_details: details,
        })
    }

    async fn update(&self, topic: &Topic) -> Result<ExternalUpdate> {
        let arn = get_external_name(topic).ok_or_else(|| {
            Error::IllegalResource("Topic".into(), "no external name to update".into())
        })?;
        let params = &topic.spec.for_provider;

        let observed = self
            .sns
            .get_topic_attributes(arn)
            .await
            .map_err(Error::provider(UPDATE))?;
        let desired = desired_tags(topic)?;
        let changed = attributes::diff(ATTRIBUTES, params, &observed)?;
        let (updatable, mut immutable) = attributes::partition(ATTRIBUTES, changed);

        for (name, value) in &updatable {
            info!(topic = %topic.name_any(), attribute = %name, "setting topic attribute");
            self.sns
                .set_topic_attributes(arn, name, value)
                .await
                .map_err(Error::provider(UPDATE))?;
        }

        let tags = self.sns.list_tags(arn).await.map_err(Error::provider(UPDATE))?;
        immutable.extend(identity_drift(arn, params, &tags, &desired));
        if !immutable.is_empty() {
            return Err(Error::ImmutableField(immutable));
        }

        Ok(ExternalUpdate {
            connection_details: connection_details(arn),
        })
    }

    async fn exists(&self, topic: &Topic) -> Result<bool> {
        let Some(arn) = get_external_name(topic) else {
            return Ok(false);
        };

        match self.sns.get_topic_attributes(arn).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(Error::provider(DESCRIBE)(e)),
        }
    }

    async fn delete(&self, topic: &Topic) -> Result<()> {
        let Some(arn) = get_external_name(topic) else {
            return Ok(());
        };

        match self.sns.delete_topic(arn).await {
            Err(e) if !e.is_not_found() => Err(Error::provider(DELETE)(e)),
            _ => Ok(()),
        }
    }
}

impl ManagedResource for Topic {
    fn external(sns: Arc<dyn SnsClient>) -> Box<dyn ExternalClient<Self>> {
        Box::new(TopicClient::new(sns))
    }
}
