//! [`SnsClient`] over the AWS SDK.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_sns::{
    config::Region,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types, Client,
};
use aws_smithy_types::timeout::TimeoutConfig;
use tracing::debug;

use super::{AttributeBag, Connector, ProviderError, ProviderErrorKind, ProviderResult, SnsClient};
use crate::{resources::Tag, Error, Result};

/// An SNS client bound to one region
pub struct AwsSnsClient {
    client: Client,
}

impl AwsSnsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnsClient for AwsSnsClient {
    async fn create_topic(
        &self,
        name: &str,
        attributes: AttributeBag,
        tags: Vec<Tag>,
    ) -> ProviderResult<String> {
        let tags = tags
            .into_iter()
            .map(|tag| types::Tag::builder().key(tag.key).value(tag.value).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                ProviderError::new(ProviderErrorKind::Validation, "InvalidParameter", e.to_string())
            })?;

        debug!(name, "creating topic");
        let output = self
            .client
            .create_topic()
            .name(name)
            .set_attributes(attribute_map(attributes))
            .set_tags(Some(tags).filter(|tags| !tags.is_empty()))
            .send()
            .await
            .map_err(provider_error)?;

        required(output.topic_arn(), "TopicArn")
    }

    async fn delete_topic(&self, arn: &str) -> ProviderResult<()> {
        self.client
            .delete_topic()
            .topic_arn(arn)
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn get_topic_attributes(&self, arn: &str) -> ProviderResult<AttributeBag> {
        let output = self
            .client
            .get_topic_attributes()
            .topic_arn(arn)
            .send()
            .await
            .map_err(provider_error)?;

        Ok(attribute_bag(output.attributes()))
    }

    async fn set_topic_attributes(
        &self,
        arn: &str,
        name: &str,
        value: &str,
    ) -> ProviderResult<()> {
        self.client
            .set_topic_attributes()
            .topic_arn(arn)
            .attribute_name(name)
            .attribute_value(value)
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn list_tags(&self, arn: &str) -> ProviderResult<Vec<Tag>> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_arn(arn)
            .send()
            .await
            .map_err(provider_error)?;

        Ok(output
            .tags()
            .iter()
            .map(|tag| Tag {
                key: tag.key().to_string(),
                value: tag.value().to_string(),
            })
            .collect())
    }

    async fn subscribe(
        &self,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
        attributes: AttributeBag,
    ) -> ProviderResult<String> {
        let output = self
            .client
            .subscribe()
            .topic_arn(topic_arn)
            .protocol(protocol)
            .endpoint(endpoint)
            .set_attributes(attribute_map(attributes))
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(provider_error)?;

        required(output.subscription_arn(), "SubscriptionArn")
    }

    async fn unsubscribe(&self, arn: &str) -> ProviderResult<()> {
        self.client
            .unsubscribe()
            .subscription_arn(arn)
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn get_subscription_attributes(&self, arn: &str) -> ProviderResult<AttributeBag> {
        let output = self
            .client
            .get_subscription_attributes()
            .subscription_arn(arn)
            .send()
            .await
            .map_err(provider_error)?;

        Ok(attribute_bag(output.attributes()))
    }

    async fn set_subscription_attributes(
        &self,
        arn: &str,
        name: &str,
        value: &str,
    ) -> ProviderResult<()> {
        self.client
            .set_subscription_attributes()
            .subscription_arn(arn)
            .attribute_name(name)
            .attribute_value(value)
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }
}

/// Builds an [`AwsSnsClient`] per region from one shared SDK configuration
pub struct AwsConnector {
    sdk_config: SdkConfig,
    endpoint: Option<String>,
    timeout: Duration,
}

impl AwsConnector {
    pub fn new(sdk_config: SdkConfig, endpoint: Option<String>, timeout: Duration) -> Self {
        Self {
            sdk_config,
            endpoint,
            timeout,
        }
    }

    /// Load credentials and defaults the standard way (environment, profile, web identity, IMDS).
    pub async fn from_env(endpoint: Option<String>, timeout: Duration) -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(sdk_config, endpoint, timeout)
    }
}

impl Connector for AwsConnector {
    fn connect(&self, region: &str) -> Result<Arc<dyn SnsClient>> {
        if region.is_empty() {
            return Err(Error::Configuration("region must not be empty".into()));
        }

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(self.timeout)
            .build();
        let mut builder = aws_sdk_sns::config::Builder::from(&self.sdk_config)
            .region(Region::new(region.to_string()))
            .timeout_config(timeout_config);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Arc::new(AwsSnsClient::new(Client::from_conf(builder.build()))))
    }
}

/// Map an SDK failure onto the provider taxonomy. Failures without a service
/// error code (timeouts, connection errors) are unknown and retried.
fn provider_error<E>(err: SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if let Some(service) = err.as_service_error() {
        if let Some(code) = service.code() {
            return ProviderError::from_code(code, service.message().unwrap_or_default());
        }
    }

    ProviderError::new(
        ProviderErrorKind::Unknown,
        "SdkError",
        DisplayErrorContext(&err).to_string(),
    )
}

fn attribute_map(attributes: AttributeBag) -> Option<HashMap<String, String>> {
    (!attributes.is_empty()).then(|| attributes.into_iter().collect())
}

fn attribute_bag(attributes: Option<&HashMap<String, String>>) -> AttributeBag {
    attributes
        .map(|attributes| {
            attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn required(value: Option<&str>, field: &str) -> ProviderResult<String> {
    value.map(str::to_string).ok_or_else(|| {
        ProviderError::new(
            ProviderErrorKind::Unknown,
            "MalformedResponse",
            format!("response is missing {field}"),
        )
    })
}
