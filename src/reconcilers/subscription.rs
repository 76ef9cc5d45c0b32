use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::info;

use super::{
    ExternalClient, ExternalCreation, ExternalObservation, ExternalUpdate, ManagedResource,
    Siblings,
};
use crate::{
    attributes::{self, AttributeField, Comparator, Mutability},
    conditions::{set_condition, RemoteState},
    connection::ConnectionDetails,
    external_name::{get_external_name, set_external_name},
    references::{self, ReferenceField},
    resources::{ConfirmationStatus, Subscription, SubscriptionObservation, SubscriptionParameters},
    sns::{AttributeBag, SnsClient},
    Error, Result,
};

const DESCRIBE: &str = "cannot describe subscription";
const CREATE: &str = "cannot create subscription";
const UPDATE: &str = "cannot update subscription";
const DELETE: &str = "cannot delete subscription";

fn delivery_policy(p: &mut SubscriptionParameters) -> &mut Option<String> {
    &mut p.delivery_policy
}

fn filter_policy(p: &mut SubscriptionParameters) -> &mut Option<String> {
    &mut p.filter_policy
}

fn filter_policy_scope(p: &mut SubscriptionParameters) -> &mut Option<String> {
    &mut p.filter_policy_scope
}

fn raw_message_delivery(p: &mut SubscriptionParameters) -> &mut Option<String> {
    &mut p.raw_message_delivery
}

fn redrive_policy(p: &mut SubscriptionParameters) -> &mut Option<String> {
    &mut p.redrive_policy
}

/// Subscription attributes the operator manages
pub const ATTRIBUTES: &[AttributeField<SubscriptionParameters>] = &[
    AttributeField {
        name: "DeliveryPolicy",
        comparator: Comparator::Json,
        mutability: Mutability::Mutable,
        render: |p| p.delivery_policy.clone(),
        late_init: Some(delivery_policy),
    },
    AttributeField {
        name: "FilterPolicy",
        comparator: Comparator::Json,
        mutability: Mutability::Mutable,
        render: |p| p.filter_policy.clone(),
        late_init: Some(filter_policy),
    },
    AttributeField {
        name: "FilterPolicyScope",
        comparator: Comparator::Text,
        mutability: Mutability::Mutable,
        render: |p| p.filter_policy_scope.clone(),
        late_init: Some(filter_policy_scope),
    },
    AttributeField {
        name: "RawMessageDelivery",
        comparator: Comparator::Bool,
        mutability: Mutability::Mutable,
        render: |p| p.raw_message_delivery.clone(),
        late_init: Some(raw_message_delivery),
    },
    AttributeField {
        name: "RedrivePolicy",
        comparator: Comparator::Json,
        mutability: Mutability::Mutable,
        render: |p| p.redrive_policy.clone(),
        late_init: Some(redrive_policy),
    },
    AttributeField {
        name: "TopicArn",
        comparator: Comparator::Text,
        mutability: Mutability::Immutable,
        render: |p| p.topic_arn.clone(),
        late_init: None,
    },
    AttributeField {
        name: "Protocol",
        comparator: Comparator::Text,
        mutability: Mutability::Immutable,
        render: |p| Some(p.protocol.clone()),
        late_init: None,
    },
    AttributeField {
        name: "Endpoint",
        comparator: Comparator::Text,
        mutability: Mutability::Immutable,
        render: |p| Some(p.endpoint.clone()),
        late_init: None,
    },
];

fn confirmation(attributes: &AttributeBag) -> ConfirmationStatus {
    match attributes.get("PendingConfirmation") {
        Some(pending) if pending.eq_ignore_ascii_case("true") => ConfirmationStatus::Pending,
        _ => ConfirmationStatus::Confirmed,
    }
}

fn observation(attributes: &AttributeBag) -> SubscriptionObservation {
    let text = |name: &str| attributes.get(name).filter(|v| !v.is_empty()).cloned();

    SubscriptionObservation {
        arn: text("SubscriptionArn"),
        owner: text("Owner"),
        confirmation_status: Some(confirmation(attributes)),
        confirmation_was_authenticated: attributes
            .get("ConfirmationWasAuthenticated")
            .map(|v| v.eq_ignore_ascii_case("true")),
        effective_delivery_policy: text("EffectiveDeliveryPolicy"),
    }
}

fn connection_details(arn: &str) -> ConnectionDetails {
    ConnectionDetails::from([("arn".to_string(), arn.to_string())])
}

/// Manages subscriptions of endpoints to SNS topics
pub struct SubscriptionClient {
    sns: Arc<dyn SnsClient>,
}

impl SubscriptionClient {
    pub fn new(sns: Arc<dyn SnsClient>) -> Self {
        Self { sns }
    }
}

#[async_trait]
impl ExternalClient<Subscription> for SubscriptionClient {
    async fn observe(&self, sub: &mut Subscription) -> Result<ExternalObservation> {
        let Some(arn) = get_external_name(sub).map(str::to_string) else {
            return Ok(ExternalObservation::missing());
        };

        let observed = match self.sns.get_subscription_attributes(&arn).await {
            Ok(observed) => observed,
            Err(e) if e.is_not_found() => return Ok(ExternalObservation::missing()),
            Err(e) => return Err(Error::provider(DESCRIBE)(e)),
        };

        let late_initialized =
            attributes::late_initialize(ATTRIBUTES, &mut sub.spec.for_provider, &observed);

        // Nothing is delivered until the endpoint owner confirms
        let state = match confirmation(&observed) {
            ConfirmationStatus::Pending => RemoteState::Creating,
            ConfirmationStatus::Confirmed => RemoteState::Active,
        };
        let status = sub.status.get_or_insert_with(Default::default);
        status.at_provider = Some(observation(&observed));
        if let Some(condition) = state.condition() {
            set_condition(&mut status.conditions, condition);
        }

        let up_to_date = !state.checks_up_to_date()
            || attributes::is_up_to_date(ATTRIBUTES, &sub.spec.for_provider, &observed)?;

        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            resource_late_initialized: late_initialized,
            connection_details: connection_details(&arn),
        })
    }

    async fn create(&self, sub: &mut Subscription) -> Result<ExternalCreation> {
        let params = &sub.spec.for_provider;
        let topic_arn = params
            .topic_arn
            .as_deref()
            .filter(|arn| !arn.is_empty())
            .ok_or_else(|| {
                Error::IllegalResource(
                    "Subscription".into(),
                    format!("{}: topicArn is not set", sub.name_any()),
                )
            })?;
        let attributes =
            attributes::render(ATTRIBUTES, params, |f| f.mutability == Mutability::Mutable)?;

        let arn = self
            .sns
            .subscribe(topic_arn, &params.protocol, &params.endpoint, attributes)
            .await
            .map_err(Error::provider(CREATE))?;
        set_external_name(sub, arn.as_str());

        Ok(ExternalCreation {
            connection_details: connection_details(&arn),
        })
    }

    async fn update(&self, sub: &Subscription) -> Result<ExternalUpdate> {
        let arn = get_external_name(sub).ok_or_else(|| {
            Error::IllegalResource("Subscription".into(), "no external name to update".into())
        })?;

        let observed = self
            .sns
            .get_subscription_attributes(arn)
            .await
            .map_err(Error::provider(UPDATE))?;
        let changed = attributes::diff(ATTRIBUTES, &sub.spec.for_provider, &observed)?;
        let (updatable, immutable) = attributes::partition(ATTRIBUTES, changed);

        for (name, value) in &updatable {
            info!(subscription = %sub.name_any(), attribute = %name, "setting subscription attribute");
            self.sns
                .set_subscription_attributes(arn, name, value)
                .await
                .map_err(Error::provider(UPDATE))?;
        }

        if !immutable.is_empty() {
            return Err(Error::ImmutableField(immutable));
        }

        Ok(ExternalUpdate {
            connection_details: connection_details(arn),
        })
    }

    async fn exists(&self, sub: &Subscription) -> Result<bool> {
        let Some(arn) = get_external_name(sub) else {
            return Ok(false);
        };

        match self.sns.get_subscription_attributes(arn).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(Error::provider(DESCRIBE)(e)),
        }
    }

    async fn delete(&self, sub: &Subscription) -> Result<()> {
        let Some(arn) = get_external_name(sub) else {
            return Ok(());
        };

        match self.sns.unsubscribe(arn).await {
            Err(e) if !e.is_not_found() => Err(Error::provider(DELETE)(e)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ManagedResource for Subscription {
    fn external(sns: Arc<dyn SnsClient>) -> Box<dyn ExternalClient<Self>> {
        Box::new(SubscriptionClient::new(sns))
    }

    async fn resolve_references(&mut self, siblings: &Siblings) -> Result<bool> {
        let params = &mut self.spec.for_provider;
        let field = ReferenceField {
            kind: "Topic",
            value: &mut params.topic_arn,
            reference: &mut params.topic_arn_ref,
            selector: params.topic_arn_selector.as_ref(),
        };

        references::resolve(field, siblings.topics.as_ref(), references::topic_arn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conditions::{find_condition, ConditionReason, TYPE_READY},
        connection::MockConnectionPublisher,
        reconcilers::{Outcome, Reconciler},
        resources::{Reference, SubscriptionSpec, Topic, TopicObservation, TopicStatus},
        sns::{
            fake::{FakeConnector, FakeSns},
            MockSnsClient, ProviderError,
        },
        store::memory::MemoryStore,
    };

    const TOPIC_ARN: &str = "arn:aws:sns:eu-central-1:123456789012:orders";

    fn subscription(protocol: &str, endpoint: &str) -> Subscription {
        let mut sub = Subscription::new(
            "orders-mail",
            SubscriptionSpec {
                for_provider: SubscriptionParameters {
                    region: "eu-central-1".into(),
                    topic_arn: Some(TOPIC_ARN.into()),
                    protocol: protocol.into(),
                    endpoint: endpoint.into(),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        sub.metadata.namespace = Some("shop".into());
        sub
    }

    async fn sns_with_topic() -> Arc<FakeSns> {
        let sns = Arc::new(FakeSns::new("eu-central-1"));
        sns.create_topic("orders", AttributeBag::new(), vec![])
            .await
            .unwrap();
        sns
    }

    fn ready_reason(sub: &Subscription) -> ConditionReason {
        find_condition(&sub.status.as_ref().unwrap().conditions, TYPE_READY)
            .unwrap()
            .reason
    }

    #[tokio::test]
    async fn pending_confirmation_is_creating() {
        let sns = sns_with_topic().await;
        let client = SubscriptionClient::new(sns.clone());
        let mut sub = subscription("email", "ops@example.com");
        client.create(&mut sub).await.unwrap();
        let arn = get_external_name(&sub).unwrap().to_string();
        assert!(arn.starts_with(TOPIC_ARN));

        // a pending subscription is not updated even when it drifts
        sub.spec.for_provider.filter_policy = Some(r#"{"kind":["order"]}"#.into());
        let observation = client.observe(&mut sub).await.unwrap();
        assert!(observation.resource_exists);
        assert!(observation.resource_up_to_date);
        assert_eq!(ready_reason(&sub), ConditionReason::Creating);
        assert_eq!(
            sub.status.as_ref().unwrap().at_provider.as_ref().unwrap().confirmation_status,
            Some(ConfirmationStatus::Pending)
        );

        sns.poke_subscription(&arn, "PendingConfirmation", "false");
        let observation = client.observe(&mut sub).await.unwrap();
        assert_eq!(ready_reason(&sub), ConditionReason::Available);
        assert!(!observation.resource_up_to_date);
    }

    #[tokio::test]
    async fn subscribe_passes_attributes() {
        let mut sns = MockSnsClient::new();
        sns.expect_subscribe()
            .withf(|topic, protocol, endpoint, attributes| {
                topic == TOPIC_ARN
                    && protocol == "sqs"
                    && endpoint == "arn:aws:sqs:eu-central-1:123456789012:orders"
                    && attributes.get("RawMessageDelivery").map(String::as_str) == Some("true")
                    && !attributes.contains_key("Protocol")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(format!("{TOPIC_ARN}:0001")));

        let mut sub = subscription("sqs", "arn:aws:sqs:eu-central-1:123456789012:orders");
        sub.spec.for_provider.raw_message_delivery = Some("true".into());
        let creation = SubscriptionClient::new(Arc::new(sns))
            .create(&mut sub)
            .await
            .unwrap();

        assert_eq!(get_external_name(&sub), Some(format!("{TOPIC_ARN}:0001").as_str()));
        assert_eq!(creation.connection_details["arn"], format!("{TOPIC_ARN}:0001"));
    }

    #[tokio::test]
    async fn create_needs_a_topic() {
        let sns = MockSnsClient::new();
        let mut sub = subscription("sqs", "arn:aws:sqs:eu-central-1:123456789012:orders");
        sub.spec.for_provider.topic_arn = None;

        let err = SubscriptionClient::new(Arc::new(sns))
            .create(&mut sub)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IllegalResource(..)), "{err}");
    }

    #[tokio::test]
    async fn attributes_are_updated_one_at_a_time() {
        let sns = sns_with_topic().await;
        let client = SubscriptionClient::new(sns.clone());
        let mut sub = subscription("sqs", "arn:aws:sqs:eu-central-1:123456789012:orders");
        client.create(&mut sub).await.unwrap();
        assert!(client.observe(&mut sub).await.unwrap().resource_up_to_date);
        assert_eq!(sub.spec.for_provider.raw_message_delivery.as_deref(), Some("false"));

        sub.spec.for_provider.raw_message_delivery = Some("true".into());
        sub.spec.for_provider.filter_policy = Some(r#"{"kind": ["order"]}"#.into());
        sns.clear_calls();
        client.update(&sub).await.unwrap();
        assert_eq!(
            sns.calls(),
            vec![
                "GetSubscriptionAttributes",
                "SetSubscriptionAttributes:FilterPolicy",
                "SetSubscriptionAttributes:RawMessageDelivery",
            ]
        );

        // reformatted JSON is not drift
        let arn = get_external_name(&sub).unwrap().to_string();
        sns.poke_subscription(&arn, "FilterPolicy", r#"{ "kind" : [ "order" ] }"#);
        sns.clear_calls();
        client.update(&sub).await.unwrap();
        assert_eq!(sns.calls(), vec!["GetSubscriptionAttributes"]);
    }

    #[tokio::test]
    async fn endpoint_cannot_change() {
        let sns = sns_with_topic().await;
        let client = SubscriptionClient::new(sns.clone());
        let mut sub = subscription("sqs", "arn:aws:sqs:eu-central-1:123456789012:orders");
        client.create(&mut sub).await.unwrap();

        sub.spec.for_provider.endpoint = "arn:aws:sqs:eu-central-1:123456789012:other".into();
        let err = client.update(&sub).await.unwrap_err();
        assert!(matches!(&err, Error::ImmutableField(f) if f == &["Endpoint"]), "{err}");
    }

    #[tokio::test]
    async fn unsubscribe_tolerates_missing_subscriptions() {
        let mut sns = MockSnsClient::new();
        sns.expect_unsubscribe()
            .times(1)
            .returning(|_| Err(ProviderError::from_code("NotFoundException", "gone")));

        let mut sub = subscription("sqs", "q");
        set_external_name(&mut sub, format!("{TOPIC_ARN}:0001"));
        SubscriptionClient::new(Arc::new(sns))
            .delete(&sub)
            .await
            .unwrap();
    }

    fn topic(arn: Option<&str>) -> Topic {
        let mut topic = Topic::new("orders", Default::default());
        topic.status = arn.map(|arn| TopicStatus {
            at_provider: Some(TopicObservation {
                arn: Some(arn.into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        topic
    }

    fn referencing() -> Subscription {
        let mut sub = subscription("sqs", "arn:aws:sqs:eu-central-1:123456789012:orders");
        sub.spec.for_provider.topic_arn = None;
        sub.spec.for_provider.topic_arn_ref = Some(Reference {
            name: "orders".into(),
        });
        sub
    }

    #[tokio::test]
    async fn subscribes_to_the_referenced_topic() {
        let sns = sns_with_topic().await;
        let connector = FakeConnector(sns.clone());
        let mut sub = referencing();
        let store = MemoryStore::new(vec![sub.clone()]);
        let siblings = Siblings {
            topics: Arc::new(MemoryStore::new(vec![topic(Some(TOPIC_ARN))])),
        };
        let publisher = MockConnectionPublisher::new();
        let reconciler = Reconciler {
            connector: &connector,
            store: &store,
            siblings: &siblings,
            publisher: &publisher,
        };

        let outcome = reconciler.apply(&mut sub).await.unwrap();
        assert_eq!(outcome, Outcome::Created);
        assert_eq!(sub.spec.for_provider.topic_arn.as_deref(), Some(TOPIC_ARN));

        let stored = store.stored("orders-mail").unwrap();
        assert_eq!(stored.spec.for_provider.topic_arn.as_deref(), Some(TOPIC_ARN));
        assert!(get_external_name(&stored).unwrap().starts_with(TOPIC_ARN));
    }

    #[tokio::test]
    async fn waits_for_the_topic_arn() {
        let sns = sns_with_topic().await;
        sns.clear_calls();
        let connector = FakeConnector(sns.clone());
        let mut sub = referencing();
        let store = MemoryStore::new(vec![sub.clone()]);
        let siblings = Siblings {
            topics: Arc::new(MemoryStore::new(vec![topic(None)])),
        };
        let publisher = MockConnectionPublisher::new();
        let reconciler = Reconciler {
            connector: &connector,
            store: &store,
            siblings: &siblings,
            publisher: &publisher,
        };

        let err = reconciler.apply(&mut sub).await.unwrap_err();
        assert!(matches!(err, Error::ReferenceNotReady { .. }), "{err}");
        assert_eq!(sub.spec.for_provider.topic_arn, None);
        assert!(sns.calls().is_empty());
        assert_eq!(store.writes(), vec!["status"]);
    }
}
