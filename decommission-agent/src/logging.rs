use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub matched_path: Option<String>,
    pub status_code: u16,
    pub duration_ms: u64,
    pub request_headers: Value,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub service: &'static str,
}

// Middleware to capture and log webhook requests/responses
pub async fn api_logging_middleware(request: Request, next: Next) -> Response {
    let start_time = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string());
    let request_headers = headers_to_json(request.headers());
    let client_ip = extract_client_ip(request.headers());
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let response = next.run(request).await;

    let entry = ApiLogEntry {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        method: method.to_string(),
        path,
        matched_path,
        status_code: response.status().as_u16(),
        duration_ms: start_time.elapsed().as_millis() as u64,
        request_headers,
        client_ip,
        user_agent,
        service: env!("CARGO_PKG_NAME"),
    };

    if response.status().is_server_error() {
        warn!(
            request_id = %entry.id,
            status = entry.status_code,
            "📡 {} {} -> {} ({} ms)",
            entry.method, entry.path, entry.status_code, entry.duration_ms
        );
    } else {
        info!(
            request_id = %entry.id,
            status = entry.status_code,
            "📡 {} {} -> {} ({} ms)",
            entry.method, entry.path, entry.status_code, entry.duration_ms
        );
    }
    tracing::debug!("📊 Detailed Log: {}", serde_json::to_string(&entry).unwrap_or_default());

    response
}

fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = serde_json::Map::new();

    for (name, value) in headers.iter() {
        // Skip sensitive headers
        let name_str = name.as_str().to_lowercase();
        if name_str.contains("authorization") || name_str.contains("cookie") || name_str.contains("token") {
            continue;
        }

        if let Ok(value_str) = value.to_str() {
            map.insert(name_str, Value::String(value_str.to_string()));
        }
    }

    Value::Object(map)
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let ip_headers = ["x-forwarded-for", "x-real-ip", "x-client-ip"];

    for header_name in &ip_headers {
        if let Some(ip_str) = headers.get(*header_name).and_then(|v| v.to_str().ok()) {
            // Take the first IP if there are multiple (comma-separated)
            let first_ip = ip_str.split(',').next().unwrap_or("").trim();
            if !first_ip.is_empty() {
                return Some(first_ip.to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn sensitive_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        headers.insert("x-amz-sns-message-type", HeaderValue::from_static("Notification"));
        headers.insert("x-api-token", HeaderValue::from_static("secret"));

        let json = headers_to_json(&headers);
        assert_eq!(json["x-amz-sns-message-type"], "Notification");
        assert!(json.get("authorization").is_none());
        assert!(json.get("x-api-token").is_none());
    }

    #[test]
    fn first_forwarded_ip_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 172.16.0.1"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.7"));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
