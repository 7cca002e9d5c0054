pub mod acknowledger;
pub mod fixtures;
pub mod rancher;

use anyhow::Result;
use decommission_core::{DecommissionPipeline, PipelineSettings, PollSettings, RancherClient};
use std::sync::Arc;
use std::time::Duration;

pub use acknowledger::RecordingAcknowledger;
pub use fixtures::TestFixtures;
pub use rancher::{ActionScript, SimulatedRancher};

/// Poll settings tight enough that convergence tests finish in milliseconds.
pub const FAST_POLL_INTERVAL: Duration = Duration::from_millis(5);
pub const FAST_POLL_ATTEMPTS: u32 = 5;

/// Main test harness: a simulated control plane plus a recording acknowledger
pub struct TestHarness {
    pub rancher: SimulatedRancher,
    pub acknowledger: Arc<RecordingAcknowledger>,
    pub fixtures: TestFixtures,
}

impl TestHarness {
    /// Start the simulated control plane with the given projects
    pub async fn setup(projects: &[&str]) -> Self {
        init_test_tracing();

        let rancher = SimulatedRancher::start().await;
        for project in projects {
            rancher.add_project(project);
        }

        Self {
            rancher,
            acknowledger: Arc::new(RecordingAcknowledger::default()),
            fixtures: TestFixtures::default(),
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            poll: PollSettings {
                interval: FAST_POLL_INTERVAL,
                max_attempts: FAST_POLL_ATTEMPTS,
            },
            ..PipelineSettings::default()
        }
    }

    /// Pipeline wired against the simulated control plane
    pub fn pipeline(&self) -> Result<DecommissionPipeline> {
        self.pipeline_with(self.settings())
    }

    pub fn pipeline_with(&self, settings: PipelineSettings) -> Result<DecommissionPipeline> {
        let client = RancherClient::new(&self.rancher.config())?;
        Ok(DecommissionPipeline::new(client, self.acknowledger.clone(), settings))
    }
}

/// Initialise tracing once per test binary; later calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
