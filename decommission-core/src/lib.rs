pub mod models;
pub mod error;

// Configuration
pub mod config;

// Control-plane access
pub mod control_plane;
pub mod poller;
pub mod action;
pub mod resolver;

// Inbound messages and the run itself
pub mod notification;
pub mod delivery;
pub mod lifecycle;
pub mod pipeline;

pub use action::{perform_action, ActionOutcome, PollableAction};
pub use config::{ControlPlaneConfig, PipelineSettings, PollSettings};
pub use control_plane::RancherClient;
pub use delivery::{parse_inbound, Disposition, Inbound};
pub use error::{AcknowledgmentError, DecommissionError, ValidationError};
pub use lifecycle::{LifecycleAcknowledger, LifecycleCompletion};
pub use notification::{LifecycleMessage, LifecycleNotification};
pub use pipeline::{DecommissionPipeline, PipelineFailure, PipelineOutcome, PipelineReport, Stage, StageRecord};
pub use poller::poll_until;
pub use resolver::NodeResolver;
