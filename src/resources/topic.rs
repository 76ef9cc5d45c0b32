use k8s_openapi::api::core::v1::SecretReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{DeletionPolicy, Managed, ManagementPolicy, Tag};
use crate::conditions::Condition;

/// Specification for an SNS topic
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "Topic",
    group = "sns.aws.crossplane.io",
    version = "v1beta1",
    status = "TopicStatus",
    doc = "An SNS topic",
    namespaced,
    printcolumn = r#"{ "name": "ready", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Ready')].status" }"#,
    printcolumn = r#"{ "name": "synced", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Synced')].status" }"#,
    printcolumn = r#"{ "name": "external-name", "type": "string", "jsonPath": ".metadata.annotations.crossplane\\.io/external-name" }"#
)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    /// Desired state of the topic.
    pub for_provider: TopicParameters,

    /// What happens to the topic when this object is deleted.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,

    /// Whether the operator may change the topic or only observe it.
    #[serde(default)]
    pub management_policy: ManagementPolicy,

    /// The secret that receives the topic's connection details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
}

/// The desired state of a topic.
///
/// Unset optional fields are late-initialized from the values SNS reports.
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicParameters {
    /// Name of the topic in SNS. FIFO topics must end in `.fifo`. Immutable.
    pub name: String,

    /// The region to create the topic in. Immutable.
    pub region: String,

    /// Display name used for SMS and email subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// ID of a KMS key used for server-side encryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_master_key_id: Option<String>,

    /// Access policy JSON. Compared semantically with the policy SNS reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    /// Delivery retry policy JSON for HTTP/S endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_policy: Option<String>,

    /// Create a FIFO topic. Immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fifo_topic: Option<bool>,

    /// Tags applied when the topic is created. Immutable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// The observed state of a topic
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<TopicObservation>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Values SNS reports for a topic
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,

    /// The AWS account owning the topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions_confirmed: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions_pending: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions_deleted: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_delivery_policy: Option<String>,
}

impl Topic {
    /// The ARN SNS assigned, once observed
    pub fn arn(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.at_provider.as_ref())
            .and_then(|a| a.arn.as_deref())
    }
}

impl Managed for Topic {
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
