use async_trait::async_trait;
use aws_sdk_autoscaling::config::Region;
use aws_sdk_autoscaling::error::DisplayErrorContext;
use aws_sdk_autoscaling::Client;
use decommission_core::{AcknowledgmentError, LifecycleAcknowledger, LifecycleCompletion};
use tracing::info;

/// Completes lifecycle actions through the AutoScaling API.
pub struct AutoScalingAcknowledger {
    client: Client,
}

impl AutoScalingAcknowledger {
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;
        Self {
            client: Client::new(&shared),
        }
    }
}

#[async_trait]
impl LifecycleAcknowledger for AutoScalingAcknowledger {
    async fn complete(&self, completion: &LifecycleCompletion) -> Result<(), AcknowledgmentError> {
        info!(
            group = %completion.auto_scaling_group_name,
            hook = %completion.lifecycle_hook_name,
            instance_id = %completion.instance_id,
            "completing lifecycle action"
        );

        self.client
            .complete_lifecycle_action()
            .auto_scaling_group_name(&completion.auto_scaling_group_name)
            .lifecycle_hook_name(&completion.lifecycle_hook_name)
            .lifecycle_action_token(&completion.lifecycle_action_token)
            .instance_id(&completion.instance_id)
            .lifecycle_action_result(&completion.result)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| AcknowledgmentError {
                hook: completion.lifecycle_hook_name.clone(),
                reason: DisplayErrorContext(&err).to_string(),
            })
    }
}
