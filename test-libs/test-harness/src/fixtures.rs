use decommission_core::LifecycleMessage;
use serde_json::{json, Value};

pub const GROUP: &str = "rancher-workers";
pub const HOOK: &str = "drain-rancher-host";
pub const TERMINATING: &str = "autoscaling:EC2_INSTANCE_TERMINATING";
pub const LAUNCHING: &str = "autoscaling:EC2_INSTANCE_LAUNCHING";

/// Test fixtures for lifecycle deliveries
#[derive(Debug, Clone)]
pub struct TestFixtures {
    pub group: String,
    pub hook: String,
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self {
            group: GROUP.to_string(),
            hook: HOOK.to_string(),
        }
    }
}

impl TestFixtures {
    pub fn token_for(instance_id: &str) -> String {
        format!("token-{}", instance_id)
    }

    /// Raw lifecycle message JSON for a terminating instance
    pub fn terminating_json(&self, instance_id: &str) -> Value {
        json!({
            "AutoScalingGroupName": self.group,
            "LifecycleHookName": self.hook,
            "LifecycleActionToken": Self::token_for(instance_id),
            "LifecycleTransition": TERMINATING,
            "EC2InstanceId": instance_id,
            "RequestId": "4f6a2c1e-7d1b-4a3e-9c55-0a3f7e2b1d10",
            "Service": "AWS Auto Scaling",
        })
    }

    pub fn terminating(&self, instance_id: &str) -> LifecycleMessage {
        // fixture json always matches the message shape
        serde_json::from_value(self.terminating_json(instance_id)).expect("fixture deserializes")
    }

    pub fn launching(&self, instance_id: &str) -> LifecycleMessage {
        let mut raw = self.terminating_json(instance_id);
        raw["LifecycleTransition"] = json!(LAUNCHING);
        serde_json::from_value(raw).expect("fixture deserializes")
    }

    pub fn test_notification(&self) -> LifecycleMessage {
        serde_json::from_value(json!({
            "AutoScalingGroupName": self.group,
            "Event": "autoscaling:TEST_NOTIFICATION",
            "Service": "AWS Auto Scaling",
        }))
        .expect("fixture deserializes")
    }

    /// Terminating message with one required field removed
    pub fn missing(&self, instance_id: &str, field: &str) -> LifecycleMessage {
        let mut raw = self.terminating_json(instance_id);
        if let Some(map) = raw.as_object_mut() {
            map.remove(field);
        }
        serde_json::from_value(raw).expect("fixture deserializes")
    }

    /// The message as SNS delivers it, wrapped in a Notification envelope
    pub fn sns_body(&self, message: &Value) -> String {
        json!({
            "Type": "Notification",
            "MessageId": "b0c6e9d4-11aa-4c3e-8f2d-6f1e0a9b7c21",
            "TopicArn": "arn:aws:sns:eu-west-1:123456789012:rancher-lifecycle",
            "Subject": "Auto Scaling:  Lifecycle action 'TERMINATING'",
            "Message": message.to_string(),
        })
        .to_string()
    }
}
