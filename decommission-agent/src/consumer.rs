use crate::dispatch::process_body;
use anyhow::{bail, Result};
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::config::http::HttpResponse;
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client;
use decommission_core::delivery::Disposition;
use decommission_core::DecommissionPipeline;
use std::time::Duration;
use tracing::{error, info, warn};

const WAIT_TIME_SECONDS: i32 = 20;
const MAX_MESSAGES: i32 = 10;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Network failures, timeouts and 5xx answers are worth another receive.
fn is_transient<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(service) => service.raw().status().as_u16() >= 500,
        _ => false,
    }
}

fn receive_backoff(failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(6);
    (BACKOFF_BASE * factor).min(BACKOFF_MAX)
}

/// Long-polls an SQS queue and runs the pipeline for each message.
pub struct QueueConsumer {
    client: Client,
    queue_url: String,
    pipeline: DecommissionPipeline,
}

impl QueueConsumer {
    pub async fn from_env(queue_url: String, region: Option<String>, pipeline: DecommissionPipeline) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;
        Self {
            client: Client::new(&shared),
            queue_url,
            pipeline,
        }
    }

    /// Runs until a receive call fails with an error retrying cannot fix.
    pub async fn run(&self) -> Result<()> {
        info!(queue = %self.queue_url, "=> SQS message consumer started, awaiting messages..");
        let mut failures = 0u32;

        loop {
            let received = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(MAX_MESSAGES)
                .wait_time_seconds(WAIT_TIME_SECONDS)
                .send()
                .await;

            let output = match received {
                Ok(output) => {
                    failures = 0;
                    output
                }
                Err(err) if is_transient(&err) => {
                    failures += 1;
                    let delay = receive_backoff(failures);
                    warn!(error = %DisplayErrorContext(&err), failures, delay_ms = delay.as_millis() as u64, "receive failed, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(err) => {
                    bail!("consumer error: {}", DisplayErrorContext(&err));
                }
            };

            // Messages are processed one at a time; each run owns its own host.
            for message in output.messages() {
                self.handle(message).await;
            }
        }
    }

    async fn handle(&self, message: &Message) {
        let message_id = message.message_id().unwrap_or("<no id>");
        info!(%message_id, "=> SQS Message received");

        let Some(body) = message.body() else {
            warn!(%message_id, "message has no body, deleting");
            self.delete(message).await;
            return;
        };

        let handled = process_body(&self.pipeline, body).await;
        match handled.disposition() {
            Disposition::Acknowledge => self.delete(message).await,
            Disposition::Retry => {
                warn!(%message_id, "leaving message on the queue for redelivery");
            }
        }
    }

    async fn delete(&self, message: &Message) {
        let Some(receipt) = message.receipt_handle() else {
            return;
        };
        if let Err(e) = self
            .client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
        {
            error!(error = %DisplayErrorContext(&e), "could not delete message; it will be redelivered");
        }
    }
}
