use crate::config::PollSettings;
use crate::control_plane::RancherClient;
use crate::error::ActionError;
use crate::models::{HostState, StateSnapshot};
use crate::poller::poll_until;
use tracing::info;

/// One state-changing request against a control-plane resource.
#[derive(Debug, Clone)]
pub struct PollableAction {
    pub target_url: String,
    pub action: String,
    pub desired_state: Option<HostState>,
    pub poll: PollSettings,
}

impl PollableAction {
    pub fn new(target_url: impl Into<String>, action: impl Into<String>, poll: PollSettings) -> Self {
        Self {
            target_url: target_url.into(),
            action: action.into(),
            desired_state: None,
            poll,
        }
    }

    pub fn awaiting(mut self, state: HostState) -> Self {
        self.desired_state = Some(state);
        self
    }

    pub fn deactivate(host_url: impl Into<String>, poll: PollSettings) -> Self {
        Self::new(host_url, "deactivate", poll).awaiting(HostState::Inactive)
    }

    pub fn remove(host_url: impl Into<String>, poll: PollSettings) -> Self {
        Self::new(host_url, "remove", poll).awaiting(HostState::Removed)
    }
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// Body of the mutating request's immediate response.
    pub response: StateSnapshot,
    pub final_state: HostState,
    /// Status checks issued after the request; zero when it converged synchronously.
    pub polls: u32,
}

/// Issues the action once, then polls the target until it settles in the
/// desired state (if one was requested and not already reached).
pub async fn perform_action(client: &RancherClient, action: &PollableAction) -> Result<ActionOutcome, ActionError> {
    info!(url = %action.target_url, action = %action.action, "submitting action");

    let response = client
        .post_action(&action.target_url, &action.action)
        .await
        .map_err(|source| ActionError::Request {
            action: action.action.clone(),
            source,
        })?;
    info!(action = %action.action, state = %response.state, "initial return state");

    let desired = match &action.desired_state {
        None => {
            return Ok(ActionOutcome {
                final_state: response.state.clone(),
                response,
                polls: 0,
            })
        }
        Some(desired) if *desired == response.state => {
            return Ok(ActionOutcome {
                final_state: response.state.clone(),
                response,
                polls: 0,
            })
        }
        Some(desired) => desired,
    };

    let converged = poll_until(
        || async {
            client
                .fetch_state(&action.target_url)
                .await
                .map(|snapshot| snapshot.state)
        },
        desired,
        &action.poll,
    )
    .await
    .map_err(|source| ActionError::Poll {
        action: action.action.clone(),
        source,
    })?;
    info!(action = %action.action, polls = converged.attempts, state = %converged.state, "desired state reached");

    Ok(ActionOutcome {
        response,
        final_state: converged.state,
        polls: converged.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlPlaneConfig;
    use crate::error::{ControlPlaneError, PollError};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poll() -> PollSettings {
        PollSettings::new(Duration::from_millis(1), 3).unwrap()
    }

    fn client_for(server: &MockServer) -> RancherClient {
        let cfg = ControlPlaneConfig::from_url(&format!("{}/v1", server.uri())).unwrap();
        RancherClient::new(&cfg).unwrap()
    }

    async fn mount_post(server: &MockServer, action: &str, state: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/hosts/1h9"))
            .and(query_param("action", action))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "1h9", "state": state})))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn immediate_match_skips_polling() {
        let server = MockServer::start().await;
        mount_post(&server, "deactivate", "inactive").await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = perform_action(&client, &PollableAction::deactivate(client.host_url("1h9"), poll()))
            .await
            .unwrap();

        assert_eq!(outcome.polls, 0);
        assert_eq!(outcome.final_state, HostState::Inactive);
    }

    #[tokio::test]
    async fn no_desired_state_returns_the_response() {
        let server = MockServer::start().await;
        mount_post(&server, "evacuate", "active").await;

        let client = client_for(&server);
        let outcome = perform_action(&client, &PollableAction::new(client.host_url("1h9"), "evacuate", poll()))
            .await
            .unwrap();

        assert_eq!(outcome.polls, 0);
        assert_eq!(outcome.response.id.as_deref(), Some("1h9"));
    }

    #[tokio::test]
    async fn polls_the_target_until_converged() {
        let server = MockServer::start().await;
        mount_post(&server, "remove", "removing").await;
        Mock::given(method("GET"))
            .and(path("/v1/hosts/1h9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1h9", "state": "removing"})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/hosts/1h9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1h9", "state": "removed"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = perform_action(&client, &PollableAction::remove(client.host_url("1h9"), poll()))
            .await
            .unwrap();

        assert_eq!(outcome.polls, 2);
        assert_eq!(outcome.final_state, HostState::Removed);
    }

    #[tokio::test]
    async fn never_converging_is_a_timeout() {
        let server = MockServer::start().await;
        mount_post(&server, "remove", "removing").await;
        Mock::given(method("GET"))
            .and(path("/v1/hosts/1h9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "removing"})))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = perform_action(&client, &PollableAction::remove(client.host_url("1h9"), poll()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ActionError::Poll { source: PollError::Timeout { attempts: 3, .. }, .. }
        ));
    }

    #[tokio::test]
    async fn failed_request_is_not_polled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = perform_action(&client, &PollableAction::deactivate(client.host_url("1h9"), poll()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ActionError::Request { source: ControlPlaneError::Status { status: 500, .. }, .. }
        ));
    }

    #[tokio::test]
    async fn status_check_failure_aborts_polling() {
        let server = MockServer::start().await;
        mount_post(&server, "remove", "removing").await;
        Mock::given(method("GET"))
            .and(path("/v1/hosts/1h9"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = perform_action(&client, &PollableAction::remove(client.host_url("1h9"), poll()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ActionError::Poll {
                source: PollError::Check { attempt: 1, source: ControlPlaneError::Status { status: 503, .. } },
                ..
            }
        ));
    }
}
