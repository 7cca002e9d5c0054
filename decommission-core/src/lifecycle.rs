use crate::error::AcknowledgmentError;
use crate::notification::LifecycleNotification;
use async_trait::async_trait;
use serde::Serialize;

pub const ACTION_RESULT_CONTINUE: &str = "CONTINUE";

/// Parameters of the CompleteLifecycleAction call, echoed from the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleCompletion {
    pub auto_scaling_group_name: String,
    pub lifecycle_hook_name: String,
    pub lifecycle_action_token: String,
    pub instance_id: String,
    pub result: String,
}

impl LifecycleCompletion {
    pub fn continue_termination(notification: &LifecycleNotification) -> Self {
        Self {
            auto_scaling_group_name: notification.auto_scaling_group_name.clone(),
            lifecycle_hook_name: notification.lifecycle_hook_name.clone(),
            lifecycle_action_token: notification.lifecycle_action_token.clone(),
            instance_id: notification.instance_id.clone(),
            result: ACTION_RESULT_CONTINUE.to_string(),
        }
    }
}

/// Tells the autoscaling service the instance may finish terminating.
#[async_trait]
pub trait LifecycleAcknowledger: Send + Sync {
    async fn complete(&self, completion: &LifecycleCompletion) -> Result<(), AcknowledgmentError>;
}
