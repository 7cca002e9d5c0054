use crate::dispatch::{process_body, Handled};
use crate::logging::api_logging_middleware;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use decommission_core::delivery::Disposition;
use decommission_core::DecommissionPipeline;
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const SNS_HOST_SUFFIX: &str = ".amazonaws.com";
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub pipeline: DecommissionPipeline,
    pub confirmer: SubscriptionConfirmer,
}

/// Confirms SNS subscriptions by visiting the SubscribeURL SNS sent us.
#[derive(Clone)]
pub struct SubscriptionConfirmer {
    http: reqwest::Client,
    /// Only confirm against hosts ending in this suffix; `None` allows any.
    allowed_host_suffix: Option<String>,
}

impl SubscriptionConfirmer {
    pub fn new(allowed_host_suffix: Option<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(CONFIRM_TIMEOUT).build()?;
        Ok(Self {
            http,
            allowed_host_suffix,
        })
    }

    pub async fn confirm(&self, topic_arn: &str, subscribe_url: Option<&str>) -> Result<(), String> {
        let raw = subscribe_url.ok_or_else(|| "missing SubscribeURL".to_string())?;
        let url = Url::parse(raw).map_err(|e| format!("invalid SubscribeURL: {}", e))?;

        if let Some(suffix) = &self.allowed_host_suffix {
            let host = url.host_str().unwrap_or_default();
            if url.scheme() != "https" || !host.ends_with(suffix.as_str()) {
                return Err(format!("refusing to confirm subscription against {}", host));
            }
        }

        info!(%topic_arn, "attempting subscription confirmation");
        let response = self.http.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("confirmation returned HTTP {}", response.status()));
        }
        info!(%topic_arn, "subscription confirmed");
        Ok(())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/lifecycle", post(receive_lifecycle))
        .layer(middleware::from_fn(api_logging_middleware))
        .with_state(Arc::new(state))
}

async fn health_check() -> Json<Value> {
    Json(json!({"status": "healthy", "message": "decommission agent is running"}))
}

async fn receive_lifecycle(State(state): State<Arc<AppState>>, body: String) -> (StatusCode, Json<Value>) {
    info!("=> Received autoscaling lifecycle delivery");

    let handled = process_body(&state.pipeline, &body).await;

    if let Handled::SubscriptionConfirmation {
        topic_arn,
        subscribe_url,
        ..
    } = &handled
    {
        return match state.confirmer.confirm(topic_arn, subscribe_url.as_deref()).await {
            Ok(()) => (StatusCode::OK, Json(json!("ok"))),
            Err(reason) => {
                error!(%topic_arn, %reason, "subscription confirmation failed");
                (StatusCode::BAD_REQUEST, Json(json!({"error": reason})))
            }
        };
    }

    let status = if handled.is_validation_failure() {
        StatusCode::BAD_REQUEST
    } else {
        match handled.disposition() {
            Disposition::Acknowledge => StatusCode::OK,
            Disposition::Retry => StatusCode::SERVICE_UNAVAILABLE,
        }
    };

    (status, Json(handled.summary()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 Lifecycle webhook listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use decommission_core::{
        AcknowledgmentError, ControlPlaneConfig, LifecycleAcknowledger, LifecycleCompletion, PipelineSettings,
        PollSettings, RancherClient,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CountingAck(AtomicUsize);

    #[async_trait]
    impl LifecycleAcknowledger for CountingAck {
        async fn complete(&self, _: &LifecycleCompletion) -> Result<(), AcknowledgmentError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn router(server: &MockServer, ack: Arc<CountingAck>) -> Router {
        let cfg = ControlPlaneConfig::from_url(&format!("{}/v1", server.uri())).unwrap();
        let settings = PipelineSettings {
            poll: PollSettings::new(Duration::from_millis(1), 2).unwrap(),
            ..PipelineSettings::default()
        };
        let pipeline = DecommissionPipeline::new(RancherClient::new(&cfg).unwrap(), ack, settings);
        create_router(AppState {
            pipeline,
            confirmer: SubscriptionConfirmer::new(None).unwrap(),
        })
    }

    fn lifecycle_body(instance: &str) -> String {
        let inner = json!({
            "AutoScalingGroupName": "workers",
            "LifecycleHookName": "drain",
            "LifecycleActionToken": "tok",
            "LifecycleTransition": "autoscaling:EC2_INSTANCE_TERMINATING",
            "EC2InstanceId": instance
        });
        json!({"Type": "Notification", "Message": inner.to_string()}).to_string()
    }

    async fn post(router: Router, body: String) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::post("/lifecycle").body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let server = MockServer::start().await;
        let response = router(&server, Arc::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn completed_run_returns_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "p1"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/p1/hosts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "h-1", "state": "active", "labels": {"HOSTID": "i-9"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(query_param("action", "deactivate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "inactive"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(query_param("action", "remove"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "removed"})))
            .mount(&server)
            .await;
        let ack = Arc::new(CountingAck::default());

        let (status, body) = post(router(&server, ack.clone()), lifecycle_body("i-9")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "completed");
        assert_eq!(body["trace"], "[Resolved:h-1, Deactivated:0-polls, Deleted:0-polls, Acknowledged]");
        assert_eq!(ack.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_control_plane_asks_for_redelivery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let (status, body) = post(router(&server, Arc::default()), lifecycle_body("i-9")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["stage"], "Resolve");
    }

    #[tokio::test]
    async fn incomplete_message_is_a_bad_request() {
        let server = MockServer::start().await;
        let body = json!({
            "Type": "Notification",
            "Message": json!({"LifecycleTransition": "autoscaling:EC2_INSTANCE_TERMINATING"}).to_string()
        })
        .to_string();

        let (status, body) = post(router(&server, Arc::default()), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["stage"], "Validate");
    }

    #[tokio::test]
    async fn subscription_confirmation_visits_subscribe_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/confirm"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let body = json!({
            "Type": "SubscriptionConfirmation",
            "Token": "tok",
            "TopicArn": "arn:aws:sns:eu-west-1:123:lifecycle",
            "SubscribeURL": format!("{}/confirm", server.uri())
        })
        .to_string();

        let (status, _) = post(router(&server, Arc::default()), body).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn confirmation_against_foreign_host_is_refused() {
        let confirmer = SubscriptionConfirmer::new(Some(SNS_HOST_SUFFIX.to_string())).unwrap();
        let err = confirmer
            .confirm("arn", Some("http://attacker.example.com/confirm"))
            .await
            .unwrap_err();
        assert!(err.contains("refusing"));
    }

    #[tokio::test]
    async fn failed_confirmation_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/confirm"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let confirmer = SubscriptionConfirmer::new(None).expect("client builds");
        let err = confirmer
            .confirm("arn", Some(&format!("{}/confirm", server.uri())))
            .await
            .unwrap_err();
        assert!(err.contains("500"));
    }
}
