use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use decommission_core::delivery::{parse_inbound, Disposition, Inbound};
use decommission_core::notification::Classified;
use decommission_core::{DecommissionPipeline, RancherClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod acknowledger;
mod config;
mod consumer;
mod dispatch;
mod logging;
mod server;

use acknowledger::AutoScalingAcknowledger;
use config::{AgentConfig, ConfigArgs};
use consumer::QueueConsumer;
use server::{AppState, SubscriptionConfirmer, SNS_HOST_SUFFIX};

#[derive(Parser)]
#[command(name = "decommission-agent")]
#[command(about = "Drains and removes Rancher hosts for terminating autoscaling instances")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive lifecycle notifications over HTTP (SNS subscription)
    Serve,
    /// Consume lifecycle notifications from an SQS queue
    Consume,
    /// Process a single notification read from a file
    Run {
        /// JSON file holding a lifecycle message or SNS envelope
        #[arg(short, long)]
        file: PathBuf,

        /// Only resolve the host; do not deactivate, remove or acknowledge
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let cli = Cli::parse();
    let config = AgentConfig::load(&cli.config).context("loading configuration")?;
    info!(rancher = %config.control_plane.redacted_url(), label = %config.pipeline.correlation_label, "configuration loaded");

    let client = RancherClient::new(&config.control_plane)?;
    let acknowledger = AutoScalingAcknowledger::from_env(config.aws_region.clone()).await;
    let pipeline = DecommissionPipeline::new(client, Arc::new(acknowledger), config.pipeline.clone());

    match cli.command {
        Commands::Serve => {
            let state = AppState {
                pipeline,
                confirmer: SubscriptionConfirmer::new(Some(SNS_HOST_SUFFIX.to_string()))
                    .context("building subscription confirmation client")?,
            };
            server::serve(state, config.listen_addr).await
        }
        Commands::Consume => {
            let queue_url = config
                .queue_url
                .clone()
                .context("SQS_URL (or delivery.queue_url) is required to consume")?;
            let consumer = QueueConsumer::from_env(queue_url, config.aws_region.clone(), pipeline).await;
            // the queue redelivers anything in flight, so exiting is safe
            consumer.run().await.context("Consumer error, will now exit.")
        }
        Commands::Run { file, dry_run } => {
            let body = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            if dry_run {
                return resolve_only(&pipeline, &body).await;
            }

            let handled = dispatch::process_body(&pipeline, &body).await;
            println!("{}", serde_json::to_string_pretty(&handled.summary())?);
            if handled.disposition() == Disposition::Retry {
                bail!("run failed; notification should be retried");
            }
            Ok(())
        }
    }
}

async fn resolve_only(pipeline: &DecommissionPipeline, body: &str) -> anyhow::Result<()> {
    let Inbound::Lifecycle(message) = parse_inbound(body)? else {
        bail!("file does not contain a lifecycle notification");
    };
    match message.classify()? {
        Classified::Terminating(notification) => {
            let host_id = pipeline.resolve(&notification).await?;
            println!(
                "{}",
                serde_json::json!({
                    "instance_id": notification.instance_id,
                    "host_id": host_id,
                    "label": pipeline.settings().correlation_label,
                })
            );
            Ok(())
        }
        Classified::Skip(reason) => {
            println!("{}", serde_json::json!({"result": "skipped", "reason": reason.to_string()}));
            Ok(())
        }
    }
}
