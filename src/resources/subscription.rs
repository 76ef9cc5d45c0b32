use k8s_openapi::api::core::v1::SecretReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{DeletionPolicy, Managed, ManagementPolicy, Reference, Selector};
use crate::conditions::Condition;

/// Specification for a subscription of an endpoint to an SNS topic
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "Subscription",
    group = "sns.aws.crossplane.io",
    version = "v1beta1",
    status = "SubscriptionStatus",
    doc = "A subscription of an endpoint to an SNS topic",
    namespaced,
    printcolumn = r#"{ "name": "ready", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Ready')].status" }"#,
    printcolumn = r#"{ "name": "synced", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Synced')].status" }"#,
    printcolumn = r#"{ "name": "confirmation", "type": "string", "jsonPath": ".status.atProvider.confirmationStatus" }"#
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Desired state of the subscription.
    pub for_provider: SubscriptionParameters,

    /// What happens to the subscription when this object is deleted.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,

    /// Whether the operator may change the subscription or only observe it.
    #[serde(default)]
    pub management_policy: ManagementPolicy,

    /// The secret that receives the subscription's connection details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
}

/// The desired state of a subscription
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionParameters {
    /// The region of the topic. Immutable.
    pub region: String,

    /// ARN of the topic to subscribe to. Immutable.
    ///
    /// Either set directly or resolved from `topicArnRef` / `topicArnSelector`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_arn: Option<String>,

    /// A `Topic` in the same namespace whose ARN becomes `topicArn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_arn_ref: Option<Reference>,

    /// Selects the `Topic` whose ARN becomes `topicArn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_arn_selector: Option<Selector>,

    /// Delivery protocol, e.g. `email`, `sqs` or `https`. Immutable.
    pub protocol: String,

    /// Protocol specific endpoint receiving notifications. Immutable.
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_policy: Option<String>,

    /// Either `MessageAttributes` or `MessageBody`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_policy_scope: Option<String>,

    /// `"true"` to deliver messages without the SNS envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_message_delivery: Option<String>,

    /// Dead-letter queue configuration JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redrive_policy: Option<String>,
}

/// The observed state of a subscription
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<SubscriptionObservation>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Values SNS reports for a subscription
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_status: Option<ConfirmationStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_was_authenticated: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_delivery_policy: Option<String>,
}

/// Whether the endpoint owner has confirmed the subscription
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
}

impl Managed for Subscription {
    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }

    fn management_policy(&self) -> ManagementPolicy {
        self.spec.management_policy
    }

    fn connection_secret_ref(&self) -> Option<&SecretReference> {
        self.spec.write_connection_secret_to_ref.as_ref()
    }

    fn region(&self) -> &str {
        &self.spec.for_provider.region
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }
}
