use thiserror::Error;

/// Expose all controller components used by main
pub mod operator;
pub mod resources;

/// Managed resource machinery
pub mod attributes;
pub mod conditions;
pub mod connection;
pub mod external_name;
pub mod policy;
pub mod reconcilers;
pub mod references;
pub mod store;

/// The provider capability set and its HTTP implementation
pub mod sns;

/// Operator configuration
pub mod config;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

use sns::{ProviderError, ProviderErrorKind};

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    /// A provider call failed; `context` is a stable short tag such as `cannot describe topic`
    #[error("{context}: {source}")]
    Provider {
        context: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("cannot change immutable field(s): {}", .0.join(", "))]
    ImmutableField(Vec<String>),

    #[error("referenced {kind} {name:?} does not exist")]
    ReferenceNotFound { kind: String, name: String },

    #[error("selector matched {count} {kind} objects, expected exactly one")]
    ReferenceAmbiguous { kind: String, count: usize },

    #[error("referenced {kind} {name:?} does not have an identifier yet")]
    ReferenceNotReady { kind: String, name: String },

    #[error("external resource {0:?} does not exist and may not be created under ObserveOnly")]
    ObservedResourceMissing(String),

    #[error("deletion of {0:?} is waiting for the remote resource")]
    DeletionPending(String),

    #[error("Illegal {0}: {1}")]
    IllegalResource(String, String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How the controller should treat a failed reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry soon, the next attempt may well succeed
    Transient,
    /// Surface on the object and retry with a long backoff
    Permanent,
    /// The spec itself is unusable until the user changes it
    InvalidSpec,
}

impl Error {
    /// Wrap a provider error with a stable context tag.
    pub fn provider(context: &'static str) -> impl FnOnce(ProviderError) -> Error {
        move |source| Error::Provider { context, source }
    }

    pub fn classify(&self) -> ErrorClass {
        match self {
            Error::Provider { source, .. } => match source.kind {
                ProviderErrorKind::Validation | ProviderErrorKind::Authorization => {
                    ErrorClass::Permanent
                }
                ProviderErrorKind::NotFound
                | ProviderErrorKind::InvalidState
                | ProviderErrorKind::Throttled
                | ProviderErrorKind::Unknown => ErrorClass::Transient,
            },
            Error::InvalidPolicy(_) | Error::IllegalResource(..) => ErrorClass::InvalidSpec,
            Error::ImmutableField(_)
            | Error::ObservedResourceMissing(_)
            | Error::Configuration(_)
            | Error::SerializationError(_) => ErrorClass::Permanent,
            Error::FinalizerError(e) => match e.as_ref() {
                kube::runtime::finalizer::Error::ApplyFailed(inner)
                | kube::runtime::finalizer::Error::CleanupFailed(inner) => inner.classify(),
                _ => ErrorClass::Transient,
            },
            Error::KubeError(_)
            | Error::ReferenceNotFound { .. }
            | Error::ReferenceAmbiguous { .. }
            | Error::ReferenceNotReady { .. }
            | Error::DeletionPending(_) => ErrorClass::Transient,
        }
    }

    pub fn metric_label(&self) -> String {
        let label = match self {
            Error::SerializationError(_) => "serialization",
            Error::KubeError(_) => "kube",
            Error::FinalizerError(_) => "finalizer",
            Error::Provider { .. } => "provider",
            Error::InvalidPolicy(_) => "invalid_policy",
            Error::ImmutableField(_) => "immutable_field",
            Error::ReferenceNotFound { .. } => "reference_not_found",
            Error::ReferenceAmbiguous { .. } => "reference_ambiguous",
            Error::ReferenceNotReady { .. } => "reference_not_ready",
            Error::ObservedResourceMissing(_) => "observed_resource_missing",
            Error::DeletionPending(_) => "deletion_pending",
            Error::IllegalResource(..) => "illegal_resource",
            Error::Configuration(_) => "configuration",
        };
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_classified_by_kind() {
        let throttled = Error::provider("cannot describe topic")(ProviderError::new(
            ProviderErrorKind::Throttled,
            "Throttling",
            "slow down",
        ));
        assert_eq!(throttled.classify(), ErrorClass::Transient);
        assert_eq!(
            throttled.to_string(),
            "cannot describe topic: Throttling: slow down"
        );

        let invalid = Error::provider("cannot create topic")(ProviderError::new(
            ProviderErrorKind::Validation,
            "InvalidParameter",
            "bad name",
        ));
        assert_eq!(invalid.classify(), ErrorClass::Permanent);
    }

    #[test]
    fn spec_errors_wait_for_the_user() {
        assert_eq!(
            Error::InvalidPolicy("eof".into()).classify(),
            ErrorClass::InvalidSpec
        );
        assert_eq!(
            Error::ImmutableField(vec!["FifoTopic".into()]).classify(),
            ErrorClass::Permanent
        );
        assert_eq!(
            Error::ReferenceNotReady {
                kind: "Topic".into(),
                name: "orders".into()
            }
            .classify(),
            ErrorClass::Transient
        );
    }
}
