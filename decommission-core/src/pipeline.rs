//! The decommission sequence: resolve the host, deactivate it, remove it, then
//! release the lifecycle hook.
//!
//! Each stage is an async fn returning its typed output plus a trace record;
//! [`Run::step`] chains them so the first failure aborts the run tagged with
//! the stage it happened in. Nothing is rolled back: a run that fails after
//! deactivating is expected to be re-run from the top.

use crate::action::{perform_action, PollableAction};
use crate::config::PipelineSettings;
use crate::control_plane::RancherClient;
use crate::error::DecommissionError;
use crate::lifecycle::{LifecycleAcknowledger, LifecycleCompletion};
use crate::models::HostState;
use crate::notification::{Classified, LifecycleMessage, LifecycleNotification, SkipReason};
use crate::resolver::NodeResolver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Validate,
    Resolve,
    Deactivate,
    Delete,
    Acknowledge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One completed step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageRecord {
    Resolved { host_id: String },
    Deactivated { polls: u32 },
    Deleted { polls: u32 },
    Acknowledged,
    AcknowledgmentFailed { reason: String },
}

impl fmt::Display for StageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageRecord::Resolved { host_id } => write!(f, "Resolved:{}", host_id),
            StageRecord::Deactivated { polls } => write!(f, "Deactivated:{}-polls", polls),
            StageRecord::Deleted { polls } => write!(f, "Deleted:{}-polls", polls),
            StageRecord::Acknowledged => f.write_str("Acknowledged"),
            StageRecord::AcknowledgmentFailed { .. } => f.write_str("AcknowledgmentFailed"),
        }
    }
}

/// Renders `[Resolved:h-9, Deactivated:0-polls, ...]`.
pub fn format_trace(trace: &[StageRecord]) -> String {
    let parts: Vec<String> = trace.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub instance_id: String,
    pub host_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trace: Vec<StageRecord>,
}

impl PipelineReport {
    pub fn acknowledged(&self) -> bool {
        self.trace.contains(&StageRecord::Acknowledged)
    }

    pub fn summary(&self) -> String {
        format_trace(&self.trace)
    }
}

#[derive(Debug, Error)]
#[error("decommission of {} failed at {stage}: {error}", .instance_id.as_deref().unwrap_or("<unknown instance>"))]
pub struct PipelineFailure {
    pub run_id: Uuid,
    pub instance_id: Option<String>,
    pub stage: Stage,
    #[source]
    pub error: DecommissionError,
    /// Stages that completed before the failure.
    pub trace: Vec<StageRecord>,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(PipelineReport),
    Skipped(SkipReason),
    Failed(PipelineFailure),
}

struct Run<'a> {
    id: Uuid,
    instance_id: &'a str,
    started_at: DateTime<Utc>,
    trace: Vec<StageRecord>,
}

impl<'a> Run<'a> {
    fn start(instance_id: &'a str) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id,
            started_at: Utc::now(),
            trace: Vec::new(),
        }
    }

    async fn step<T, Fut>(&mut self, stage: Stage, work: Fut) -> Result<T, PipelineFailure>
    where
        Fut: Future<Output = Result<(T, StageRecord), DecommissionError>>,
    {
        match work.await {
            Ok((value, record)) => {
                info!(run_id = %self.id, instance_id = %self.instance_id, %stage, record = %record, "stage complete");
                self.trace.push(record);
                Ok(value)
            }
            Err(error) => Err(self.fail(stage, error)),
        }
    }

    fn fail(&self, stage: Stage, error: DecommissionError) -> PipelineFailure {
        match &error {
            DecommissionError::NotFound { .. } => {
                info!(run_id = %self.id, instance_id = %self.instance_id, %stage, %error, "nothing to decommission")
            }
            DecommissionError::AmbiguousResolution { .. } | DecommissionError::NoPartitions => {
                error!(run_id = %self.id, instance_id = %self.instance_id, %stage, %error, "operator attention required")
            }
            _ => warn!(run_id = %self.id, instance_id = %self.instance_id, %stage, %error, "stage failed"),
        }
        PipelineFailure {
            run_id: self.id,
            instance_id: Some(self.instance_id.to_string()),
            stage,
            error,
            trace: self.trace.clone(),
        }
    }
}

/// Drives one terminating instance's host out of the control plane.
#[derive(Clone)]
pub struct DecommissionPipeline {
    client: RancherClient,
    resolver: NodeResolver,
    acknowledger: Arc<dyn LifecycleAcknowledger>,
    settings: PipelineSettings,
}

impl DecommissionPipeline {
    pub fn new(client: RancherClient, acknowledger: Arc<dyn LifecycleAcknowledger>, settings: PipelineSettings) -> Self {
        let resolver = NodeResolver::new(client.clone(), settings.resolver_concurrency);
        Self {
            client,
            resolver,
            acknowledger,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Validates a raw lifecycle message and, if it is a termination, runs it.
    pub async fn handle(&self, message: &LifecycleMessage) -> PipelineOutcome {
        match message.classify() {
            Ok(Classified::Terminating(notification)) => match self.run(&notification).await {
                Ok(report) => PipelineOutcome::Completed(report),
                Err(failure) => PipelineOutcome::Failed(failure),
            },
            Ok(Classified::Skip(reason)) => {
                info!(instance_id = ?message.instance_id, %reason, "no action required");
                PipelineOutcome::Skipped(reason)
            }
            Err(error) => {
                warn!(instance_id = ?message.instance_id, %error, "rejecting lifecycle message");
                PipelineOutcome::Failed(PipelineFailure {
                    run_id: Uuid::new_v4(),
                    instance_id: message.instance_id.clone(),
                    stage: Stage::Validate,
                    error: error.into(),
                    trace: Vec::new(),
                })
            }
        }
    }

    pub async fn run(&self, notification: &LifecycleNotification) -> Result<PipelineReport, PipelineFailure> {
        let mut run = Run::start(&notification.instance_id);
        info!(run_id = %run.id, instance_id = %notification.instance_id, group = %notification.auto_scaling_group_name, "decommissioning host");

        let host_id = run.step(Stage::Resolve, self.resolve_host(notification)).await?;
        run.step(Stage::Deactivate, self.deactivate(&host_id)).await?;
        run.step(Stage::Delete, self.delete(&host_id)).await?;

        // the hook times out on its own, so a failed acknowledgment is only recorded
        let ack = self.acknowledge(notification).await;
        run.trace.push(ack);

        let report = PipelineReport {
            run_id: run.id,
            instance_id: notification.instance_id.clone(),
            host_id,
            started_at: run.started_at,
            finished_at: Utc::now(),
            trace: run.trace,
        };
        info!(run_id = %report.run_id, instance_id = %report.instance_id, trace = %report.summary(), "host decommissioned");
        Ok(report)
    }

    /// Resolution only; nothing is mutated and the hook is left alone.
    pub async fn resolve(&self, notification: &LifecycleNotification) -> Result<String, PipelineFailure> {
        let mut run = Run::start(&notification.instance_id);
        run.step(Stage::Resolve, self.resolve_host(notification)).await
    }

    async fn resolve_host(&self, notification: &LifecycleNotification) -> Result<(String, StageRecord), DecommissionError> {
        let label = &self.settings.correlation_label;
        let mut host_ids = self
            .resolver
            .resolve_by_label(label, &notification.instance_id)
            .await?;

        match host_ids.len() {
            0 => Err(DecommissionError::NotFound {
                label: label.clone(),
                value: notification.instance_id.clone(),
            }),
            1 => {
                let host_id = host_ids.remove(0);
                Ok((host_id.clone(), StageRecord::Resolved { host_id }))
            }
            _ => Err(DecommissionError::AmbiguousResolution {
                label: label.clone(),
                value: notification.instance_id.clone(),
                host_ids,
            }),
        }
    }

    async fn deactivate(&self, host_id: &str) -> Result<((), StageRecord), DecommissionError> {
        let action = PollableAction::deactivate(self.client.host_url(host_id), self.settings.poll);
        let outcome = perform_action(&self.client, &action)
            .await
            .map_err(|e| DecommissionError::from_action(e, &HostState::Inactive))?;
        Ok(((), StageRecord::Deactivated { polls: outcome.polls }))
    }

    async fn delete(&self, host_id: &str) -> Result<((), StageRecord), DecommissionError> {
        let action = PollableAction::remove(self.client.host_url(host_id), self.settings.poll);
        let outcome = perform_action(&self.client, &action)
            .await
            .map_err(|e| DecommissionError::from_action(e, &HostState::Removed))?;
        Ok(((), StageRecord::Deleted { polls: outcome.polls }))
    }

    async fn acknowledge(&self, notification: &LifecycleNotification) -> StageRecord {
        let completion = LifecycleCompletion::continue_termination(notification);
        match self.acknowledger.complete(&completion).await {
            Ok(()) => StageRecord::Acknowledged,
            Err(err) => {
                warn!(instance_id = %notification.instance_id, error = %err, "could not complete lifecycle hook; it will time out and complete on its own");
                StageRecord::AcknowledgmentFailed { reason: err.to_string() }
            }
        }
    }
}
