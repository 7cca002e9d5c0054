use decommission_core::delivery::{parse_inbound, Disposition, Inbound};
use decommission_core::{DecommissionPipeline, PipelineOutcome, ValidationError};
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// What became of one delivered message body.
#[derive(Debug)]
pub enum Handled {
    Outcome(PipelineOutcome),
    /// The body could not be read as a lifecycle message or SNS envelope.
    Rejected(ValidationError),
    SubscriptionConfirmation {
        token: String,
        topic_arn: String,
        subscribe_url: Option<String>,
    },
    Ignored(String),
}

impl Handled {
    pub fn disposition(&self) -> Disposition {
        match self {
            Handled::Outcome(outcome) => Disposition::for_outcome(outcome),
            Handled::Rejected(_) | Handled::SubscriptionConfirmation { .. } | Handled::Ignored(_) => {
                Disposition::Acknowledge
            }
        }
    }

    pub fn is_validation_failure(&self) -> bool {
        match self {
            Handled::Rejected(_) => true,
            Handled::Outcome(PipelineOutcome::Failed(failure)) => {
                matches!(failure.error, decommission_core::DecommissionError::Validation(_))
            }
            _ => false,
        }
    }

    /// JSON body describing the result, for HTTP responses and `run` output.
    pub fn summary(&self) -> Value {
        match self {
            Handled::Outcome(PipelineOutcome::Completed(report)) => json!({
                "result": "completed",
                "msg": "Host removed!",
                "report": report,
                "trace": report.summary(),
            }),
            Handled::Outcome(PipelineOutcome::Skipped(reason)) => json!({
                "result": "skipped",
                "reason": reason.to_string(),
            }),
            Handled::Outcome(PipelineOutcome::Failed(failure)) => json!({
                "result": "failed",
                "stage": failure.stage,
                "error": failure.error.to_string(),
                "run_id": failure.run_id,
                "trace": decommission_core::pipeline::format_trace(&failure.trace),
            }),
            Handled::Rejected(err) => json!({
                "result": "rejected",
                "error": err.to_string(),
            }),
            Handled::SubscriptionConfirmation { topic_arn, .. } => json!({
                "result": "subscription_confirmation",
                "topic_arn": topic_arn,
            }),
            Handled::Ignored(kind) => json!({
                "result": "ignored",
                "type": kind,
            }),
        }
    }
}

/// Parses a delivered body and, when it carries a lifecycle message, runs the pipeline.
pub async fn process_body(pipeline: &DecommissionPipeline, body: &str) -> Handled {
    let inbound = match parse_inbound(body) {
        Ok(inbound) => inbound,
        Err(err) => {
            error!(error = %err, "can't process this message");
            return Handled::Rejected(err);
        }
    };

    let handled = match inbound {
        Inbound::Lifecycle(message) => Handled::Outcome(pipeline.handle(&message).await),
        Inbound::SubscriptionConfirmation {
            token,
            topic_arn,
            subscribe_url,
        } => Handled::SubscriptionConfirmation {
            token,
            topic_arn,
            subscribe_url,
        },
        Inbound::Ignored(kind) => {
            info!(%kind, "ignoring SNS message");
            Handled::Ignored(kind)
        }
    };

    match handled.disposition() {
        Disposition::Acknowledge => info!(result = %handled.summary()["result"], "message handled"),
        Disposition::Retry => warn!(result = %handled.summary()["result"], "message left for redelivery"),
    }
    handled
}
