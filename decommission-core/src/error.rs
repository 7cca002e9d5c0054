use crate::models::HostState;
use thiserror::Error;

const MAX_BODY_IN_ERROR: usize = 256;

/// Failures talking to the Rancher control plane.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("pagination from {url} revisits a page or never ends")]
    Pagination { url: String },

    #[error("invalid control-plane url `{0}`")]
    InvalidUrl(String),

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ControlPlaneError {
    pub(crate) fn status(url: &str, status: u16, body: &str) -> Self {
        let mut body = body.trim().to_string();
        if body.len() > MAX_BODY_IN_ERROR {
            let mut cut = MAX_BODY_IN_ERROR;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("...");
        }
        ControlPlaneError::Status {
            url: url.to_string(),
            status,
            body,
        }
    }
}

/// Outcome of a convergence poll that never reached its target.
#[derive(Debug, Error)]
pub enum PollError<E: std::error::Error + 'static> {
    #[error("desired state `{desired}` not reached after {attempts} attempts")]
    Timeout { desired: String, attempts: u32 },

    #[error("status check failed on attempt {attempt}: {source}")]
    Check {
        attempt: u32,
        #[source]
        source: E,
    },
}

/// Errors from a state-mutating control-plane action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("`{action}` request failed: {source}")]
    Request {
        action: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("`{action}` did not converge: {source}")]
    Poll {
        action: String,
        #[source]
        source: PollError<ControlPlaneError>,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no partitions registered with the control plane")]
    NoPartitions,

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

/// Problems with an inbound lifecycle message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is not valid JSON: {0}")]
    Malformed(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
#[error("could not complete lifecycle action for hook `{hook}`: {reason}")]
pub struct AcknowledgmentError {
    pub hook: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("could not read config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Pipeline-level failure taxonomy.
#[derive(Debug, Error)]
pub enum DecommissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no host labelled {label}={value} is registered (already handled)")]
    NotFound { label: String, value: String },

    #[error("no partitions registered with the control plane")]
    NoPartitions,

    #[error("{} hosts carry {label}={value}: {}", .host_ids.len(), .host_ids.join(", "))]
    AmbiguousResolution {
        label: String,
        value: String,
        host_ids: Vec<String>,
    },

    #[error("control plane unavailable: {0}")]
    Transport(#[source] ControlPlaneError),

    #[error("timed out waiting for host to become `{desired}` after {attempts} polls")]
    Timeout { desired: HostState, attempts: u32 },
}

impl From<ResolveError> for DecommissionError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoPartitions => DecommissionError::NoPartitions,
            ResolveError::ControlPlane(e) => DecommissionError::Transport(e),
        }
    }
}

impl DecommissionError {
    pub(crate) fn from_action(err: ActionError, desired: &HostState) -> Self {
        match err {
            ActionError::Request { source, .. } => DecommissionError::Transport(source),
            ActionError::Poll { source, .. } => match source {
                PollError::Timeout { attempts, .. } => DecommissionError::Timeout {
                    desired: desired.clone(),
                    attempts,
                },
                PollError::Check { source, .. } => DecommissionError::Transport(source),
            },
        }
    }
}
