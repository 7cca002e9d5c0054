use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TERMINATING_TRANSITION: &str = "autoscaling:EC2_INSTANCE_TERMINATING";
pub const LAUNCHING_TRANSITION: &str = "autoscaling:EC2_INSTANCE_LAUNCHING";
pub const TEST_NOTIFICATION_EVENT: &str = "autoscaling:TEST_NOTIFICATION";

/// Lifecycle hook payload exactly as the autoscaling service sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleMessage {
    #[serde(rename = "EC2InstanceId", alias = "instanceId", default)]
    pub instance_id: Option<String>,
    #[serde(rename = "AutoScalingGroupName", default)]
    pub auto_scaling_group_name: Option<String>,
    #[serde(rename = "LifecycleHookName", default)]
    pub lifecycle_hook_name: Option<String>,
    #[serde(rename = "LifecycleActionToken", default)]
    pub lifecycle_action_token: Option<String>,
    #[serde(rename = "LifecycleTransition", default)]
    pub lifecycle_transition: Option<String>,
    #[serde(rename = "Event", default)]
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Terminating,
    Launching,
    Other(String),
}

impl From<&str> for TransitionKind {
    fn from(s: &str) -> Self {
        match s {
            TERMINATING_TRANSITION => TransitionKind::Terminating,
            LAUNCHING_TRANSITION => TransitionKind::Launching,
            other => TransitionKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Terminating => f.write_str(TERMINATING_TRANSITION),
            TransitionKind::Launching => f.write_str(LAUNCHING_TRANSITION),
            TransitionKind::Other(s) => f.write_str(s),
        }
    }
}

/// A terminating-instance notification with every field the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleNotification {
    pub instance_id: String,
    pub auto_scaling_group_name: String,
    pub lifecycle_hook_name: String,
    pub lifecycle_action_token: String,
    pub transition: TransitionKind,
}

/// Why a well-formed message needs no work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    TestNotification,
    IrrelevantTransition(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TestNotification => f.write_str("test notification"),
            SkipReason::IrrelevantTransition(t) => write!(f, "transition {} is not handled", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Terminating(LifecycleNotification),
    Skip(SkipReason),
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

impl LifecycleMessage {
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Sorts the message into work, a no-op, or a rejection.
    pub fn classify(&self) -> Result<Classified, ValidationError> {
        if self.event.as_deref() == Some(TEST_NOTIFICATION_EVENT) {
            return Ok(Classified::Skip(SkipReason::TestNotification));
        }

        let transition = TransitionKind::from(required(&self.lifecycle_transition, "LifecycleTransition")?.as_str());
        if transition != TransitionKind::Terminating {
            return Ok(Classified::Skip(SkipReason::IrrelevantTransition(transition.to_string())));
        }

        Ok(Classified::Terminating(LifecycleNotification {
            instance_id: required(&self.instance_id, "EC2InstanceId")?,
            auto_scaling_group_name: required(&self.auto_scaling_group_name, "AutoScalingGroupName")?,
            lifecycle_hook_name: required(&self.lifecycle_hook_name, "LifecycleHookName")?,
            lifecycle_action_token: required(&self.lifecycle_action_token, "LifecycleActionToken")?,
            transition,
        }))
    }
}
