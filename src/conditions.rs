//! Status conditions and the mapping from remote lifecycle states onto them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reporting whether the remote resource is usable
pub const TYPE_READY: &str = "Ready";

/// Condition type reporting whether the last reconcile succeeded
pub const TYPE_SYNCED: &str = "Synced";

/// A user visible status entry. Only one condition per `type` is kept.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    pub reason: ConditionReason,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub last_transition_time: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// The closed vocabulary of condition reasons
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionReason {
    Available,
    Unavailable,
    Creating,
    Deleting,
    ReconcileSuccess,
    ReconcileError,
}

impl Condition {
    fn new(type_: &str, status: ConditionStatus, reason: ConditionReason) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason,
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    pub fn available() -> Self {
        Self::new(TYPE_READY, ConditionStatus::True, ConditionReason::Available)
    }

    pub fn unavailable() -> Self {
        Self::new(TYPE_READY, ConditionStatus::False, ConditionReason::Unavailable)
    }

    pub fn creating() -> Self {
        Self::new(TYPE_READY, ConditionStatus::False, ConditionReason::Creating)
    }

    pub fn deleting() -> Self {
        Self::new(TYPE_READY, ConditionStatus::False, ConditionReason::Deleting)
    }

    pub fn reconcile_success() -> Self {
        Self::new(TYPE_SYNCED, ConditionStatus::True, ConditionReason::ReconcileSuccess)
    }

    pub fn reconcile_error(error: &crate::Error) -> Self {
        Self {
            message: Some(error.to_string()),
            ..Self::new(TYPE_SYNCED, ConditionStatus::False, ConditionReason::ReconcileError)
        }
    }
}

/// Record `condition`, replacing any condition of the same type.
///
/// The transition time is only moved when the status changes.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.status == condition.status => {
            existing.reason = condition.reason;
            existing.message = condition.message;
        }
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Generalized lifecycle states a remote resource can report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteState {
    Creating,
    Active,
    Updating,
    Maintenance,
    Deleting,
    Failed,
    Terminated,
}

impl RemoteState {
    /// The Ready condition to report, `None` when the resource no longer exists
    pub fn condition(self) -> Option<Condition> {
        match self {
            RemoteState::Creating => Some(Condition::creating()),
            RemoteState::Active => Some(Condition::available()),
            RemoteState::Updating | RemoteState::Maintenance | RemoteState::Failed => {
                Some(Condition::unavailable())
            }
            RemoteState::Deleting => Some(Condition::deleting()),
            RemoteState::Terminated => None,
        }
    }

    /// Whether drift should be evaluated in this state.
    ///
    /// Resources in any other state are reported as up to date so no update is
    /// issued that the provider would reject; the next poll re-evaluates.
    pub fn checks_up_to_date(self) -> bool {
        matches!(self, RemoteState::Active | RemoteState::Failed)
    }
}
