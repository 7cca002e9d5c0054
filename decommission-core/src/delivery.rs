//! Unwrapping of lifecycle messages from their transport envelopes, and the
//! mapping of pipeline outcomes back onto the transport.

use crate::error::{DecommissionError, ValidationError};
use crate::notification::LifecycleMessage;
use crate::pipeline::PipelineOutcome;
use serde::Deserialize;
use serde_json::Value;

/// SNS HTTP/SQS envelope fields we care about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnsEnvelope {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Token", default)]
    pub token: Option<String>,
    #[serde(rename = "TopicArn", default)]
    pub topic_arn: Option<String>,
    #[serde(rename = "SubscribeURL", default)]
    pub subscribe_url: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Inbound {
    Lifecycle(LifecycleMessage),
    SubscriptionConfirmation {
        token: String,
        topic_arn: String,
        subscribe_url: Option<String>,
    },
    /// An SNS control message with no work attached (e.g. UnsubscribeConfirmation).
    Ignored(String),
}

/// Accepts a bare lifecycle message or one wrapped in an SNS envelope.
pub fn parse_inbound(body: &str) -> Result<Inbound, ValidationError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    if value.get("Type").and_then(Value::as_str).is_none() {
        return serde_json::from_value(value)
            .map(Inbound::Lifecycle)
            .map_err(|e| ValidationError::Malformed(e.to_string()));
    }

    let envelope: SnsEnvelope = serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    match envelope.kind.as_str() {
        "Notification" => {
            let message = envelope.message.ok_or(ValidationError::MissingField("Message"))?;
            LifecycleMessage::from_json(&message).map(Inbound::Lifecycle)
        }
        "SubscriptionConfirmation" => Ok(Inbound::SubscriptionConfirmation {
            token: envelope.token.filter(|t| !t.is_empty()).ok_or(ValidationError::MissingField("Token"))?,
            topic_arn: envelope
                .topic_arn
                .filter(|t| !t.is_empty())
                .ok_or(ValidationError::MissingField("TopicArn"))?,
            subscribe_url: envelope.subscribe_url,
        }),
        other => Ok(Inbound::Ignored(other.to_string())),
    }
}

/// What the delivery layer should do with the message that triggered a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Consume the message; a redelivery would change nothing.
    Acknowledge,
    /// Leave the message for redelivery.
    Retry,
}

impl Disposition {
    pub fn for_error(error: &DecommissionError) -> Self {
        match error {
            DecommissionError::Validation(_)
            | DecommissionError::NotFound { .. }
            | DecommissionError::NoPartitions => Disposition::Acknowledge,
            DecommissionError::AmbiguousResolution { .. }
            | DecommissionError::Transport(_)
            | DecommissionError::Timeout { .. } => Disposition::Retry,
        }
    }

    pub fn for_outcome(outcome: &PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::Completed(_) | PipelineOutcome::Skipped(_) => Disposition::Acknowledge,
            PipelineOutcome::Failed(failure) => Disposition::for_error(&failure.error),
        }
    }
}
