//! A stateful stand-in for the Rancher v1 API, served by wiremock.
//!
//! Hosts move through scripted states: each action has an immediate state
//! returned by the POST, followed by a queue of states handed out one per
//! status poll. Removed hosts disappear from project listings, so a second
//! run for the same instance finds nothing.

use decommission_core::ControlPlaneConfig;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// How the control plane reacts to one action on one host.
#[derive(Debug, Clone)]
pub struct ActionScript {
    pub immediate: String,
    pub then: Vec<String>,
}

impl ActionScript {
    pub fn immediate(state: &str) -> Self {
        Self {
            immediate: state.to_string(),
            then: Vec::new(),
        }
    }

    pub fn converging(immediate: &str, then: &[&str]) -> Self {
        Self {
            immediate: immediate.to_string(),
            then: then.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct SimHost {
    id: String,
    project: String,
    labels: Map<String, Value>,
    state: String,
    pending: VecDeque<String>,
    scripts: HashMap<String, ActionScript>,
}

impl SimHost {
    fn to_json(&self) -> Value {
        json!({"id": self.id, "type": "host", "state": self.state, "labels": self.labels})
    }

    fn listed(&self) -> bool {
        !matches!(self.state.as_str(), "removed" | "purging" | "purged")
    }
}

#[derive(Debug, Default)]
struct World {
    projects: Vec<String>,
    hosts: Vec<SimHost>,
    unreachable_projects: Vec<String>,
    requests: Vec<(String, String)>,
}

#[derive(Clone)]
struct Responder(Arc<Mutex<World>>);

impl Respond for Responder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut world = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let method = request.method.to_string().to_uppercase();
        let path = request.url.path().to_string();
        world.requests.push((method.clone(), request.url.to_string()));

        let segments: Vec<&str> = path.trim_start_matches("/v1").split('/').filter(|s| !s.is_empty()).collect();
        match (method.as_str(), segments.as_slice()) {
            ("GET", ["projects"]) => {
                let data: Vec<Value> = world.projects.iter().map(|id| json!({"id": id, "type": "project"})).collect();
                ResponseTemplate::new(200).set_body_json(json!({"type": "collection", "data": data}))
            }
            ("GET", ["projects", project, "hosts"]) => {
                if world.unreachable_projects.iter().any(|p| p == project) {
                    return ResponseTemplate::new(503).set_body_string("project unavailable");
                }
                let data: Vec<Value> = world
                    .hosts
                    .iter()
                    .filter(|h| h.project == *project && h.listed())
                    .map(SimHost::to_json)
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({"type": "collection", "data": data}))
            }
            ("GET", ["hosts", id]) => match world.hosts.iter_mut().find(|h| h.id == *id) {
                Some(host) => {
                    if let Some(next) = host.pending.pop_front() {
                        host.state = next;
                    }
                    ResponseTemplate::new(200).set_body_json(host.to_json())
                }
                None => ResponseTemplate::new(404).set_body_json(json!({"type": "error", "status": 404})),
            },
            ("POST", ["hosts", id]) => {
                let action = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "action")
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default();
                match world.hosts.iter_mut().find(|h| h.id == *id) {
                    Some(host) => {
                        if !host.listed() {
                            return ResponseTemplate::new(422).set_body_json(json!({"code": "ActionNotAvailable"}));
                        }
                        let script = host
                            .scripts
                            .get(&action)
                            .cloned()
                            .unwrap_or_else(|| ActionScript::immediate(default_target(&action)));
                        host.state = script.immediate;
                        host.pending = script.then.into_iter().collect();
                        ResponseTemplate::new(202).set_body_json(host.to_json())
                    }
                    None => ResponseTemplate::new(404).set_body_json(json!({"type": "error", "status": 404})),
                }
            }
            _ => ResponseTemplate::new(404),
        }
    }
}

fn default_target(action: &str) -> &'static str {
    match action {
        "deactivate" => "inactive",
        "remove" => "removed",
        "activate" => "active",
        _ => "active",
    }
}

/// Simulated Rancher server plus handles to script and inspect it.
pub struct SimulatedRancher {
    server: MockServer,
    world: Arc<Mutex<World>>,
}

impl SimulatedRancher {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let world = Arc::new(Mutex::new(World::default()));
        Mock::given(wiremock::matchers::any())
            .respond_with(Responder(world.clone()))
            .mount(&server)
            .await;
        Self { server, world }
    }

    pub fn api_url(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    pub fn config(&self) -> ControlPlaneConfig {
        // only a malformed mock uri could fail here
        ControlPlaneConfig::from_url(&self.api_url()).expect("mock server uri is a valid url")
    }

    fn world(&self) -> std::sync::MutexGuard<'_, World> {
        match self.world.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_project(&self, id: &str) -> &Self {
        self.world().projects.push(id.to_string());
        self
    }

    /// Registers an active host labelled `label=value` in `project`.
    pub fn add_host(&self, project: &str, id: &str, labels: &[(&str, &str)]) -> &Self {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        self.world().hosts.push(SimHost {
            id: id.to_string(),
            project: project.to_string(),
            labels,
            state: "active".to_string(),
            pending: VecDeque::new(),
            scripts: HashMap::new(),
        });
        self
    }

    pub fn script(&self, host_id: &str, action: &str, script: ActionScript) -> &Self {
        if let Some(host) = self.world().hosts.iter_mut().find(|h| h.id == host_id) {
            host.scripts.insert(action.to_string(), script);
        }
        self
    }

    pub fn make_unreachable(&self, project: &str) -> &Self {
        self.world().unreachable_projects.push(project.to_string());
        self
    }

    pub fn host_state(&self, host_id: &str) -> Option<String> {
        self.world().hosts.iter().find(|h| h.id == host_id).map(|h| h.state.clone())
    }

    /// Every request seen so far as `(METHOD, url)`.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.world().requests.clone()
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.world()
            .requests
            .iter()
            .filter(|(m, _)| m != "GET")
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn polls_of(&self, host_id: &str) -> usize {
        let suffix = format!("/v1/hosts/{}", host_id);
        self.world()
            .requests
            .iter()
            .filter(|(m, url)| m == "GET" && url.ends_with(&suffix))
            .count()
    }
}
