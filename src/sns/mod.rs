//! The narrow set of SNS operations the reconcilers depend on.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::resources::Tag;

mod aws;

pub use aws::{AwsConnector, AwsSnsClient};

/// The flat string map SNS uses to describe and update topics and subscriptions
pub type AttributeBag = BTreeMap<String, String>;

/// The provider error kinds the reconcilers tell apart
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The resource does not exist (any of the provider's not-found codes)
    NotFound,
    /// The operation is incompatible with the resource's lifecycle state
    InvalidState,
    Validation,
    Throttled,
    /// The caller is not authenticated or not allowed to perform the call
    Authorization,
    Unknown,
}

/// An error reported by the provider, or by the transport on the way there
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build an error from a provider error code, collapsing aliases into one kind.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let kind = match code.as_str() {
            "NotFound" | "NotFoundException" | "ResourceNotFound"
            | "ResourceNotFoundException" => {
                ProviderErrorKind::NotFound
            }
            "InvalidState" | "InvalidStateException" | "ConcurrentAccess"
            | "ConcurrentAccessException" => ProviderErrorKind::InvalidState,
            "ValidationError" | "ValidationException" | "InvalidParameter"
            | "InvalidParameterValue" | "InvalidParameterException" => {
                ProviderErrorKind::Validation
            }
            "Throttling" | "ThrottlingException" | "Throttled" | "ThrottledException"
            | "RequestLimitExceeded" => ProviderErrorKind::Throttled,
            "AuthorizationError" | "AccessDenied" | "AccessDeniedException"
            | "InvalidClientTokenId" | "SignatureDoesNotMatch" | "ExpiredToken" => {
                ProviderErrorKind::Authorization
            }
            _ => ProviderErrorKind::Unknown,
        };

        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Topic and subscription operations against one region
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SnsClient: Send + Sync {
    /// Create a topic, returning its ARN
    async fn create_topic(
        &self,
        name: &str,
        attributes: AttributeBag,
        tags: Vec<Tag>,
    ) -> ProviderResult<String>;

    async fn delete_topic(&self, arn: &str) -> ProviderResult<()>;

    async fn get_topic_attributes(&self, arn: &str) -> ProviderResult<AttributeBag>;

    async fn set_topic_attributes(&self, arn: &str, name: &str, value: &str)
        -> ProviderResult<()>;

    /// Tags currently on a topic
    async fn list_tags(&self, arn: &str) -> ProviderResult<Vec<Tag>>;

    /// Subscribe an endpoint to a topic, returning the subscription ARN.
    ///
    /// The subscription ARN is always requested, even while confirmation is pending.
    async fn subscribe(
        &self,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
        attributes: AttributeBag,
    ) -> ProviderResult<String>;

    async fn unsubscribe(&self, arn: &str) -> ProviderResult<()>;

    async fn get_subscription_attributes(&self, arn: &str) -> ProviderResult<AttributeBag>;

    async fn set_subscription_attributes(
        &self,
        arn: &str,
        name: &str,
        value: &str,
    ) -> ProviderResult<()>;
}

/// Hands out a client for a region
pub trait Connector: Send + Sync {
    fn connect(&self, region: &str) -> crate::Result<Arc<dyn SnsClient>>;
}
