use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a Rancher host, using the control plane's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum HostState {
    Active,
    Activating,
    Deactivating,
    Inactive,
    Removing,
    Removed,
    Purging,
    Purged,
    /// The response carried no state, or a null one.
    #[default]
    Unknown,
    Other(String),
}

impl HostState {
    pub fn as_str(&self) -> &str {
        match self {
            HostState::Active => "active",
            HostState::Activating => "activating",
            HostState::Deactivating => "deactivating",
            HostState::Inactive => "inactive",
            HostState::Removing => "removing",
            HostState::Removed => "removed",
            HostState::Purging => "purging",
            HostState::Purged => "purged",
            HostState::Unknown => "",
            HostState::Other(s) => s,
        }
    }
}

impl From<String> for HostState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => HostState::Active,
            "activating" => HostState::Activating,
            "deactivating" => HostState::Deactivating,
            "inactive" => HostState::Inactive,
            "removing" => HostState::Removing,
            "removed" => HostState::Removed,
            "purging" => HostState::Purging,
            "purged" => HostState::Purged,
            "" => HostState::Unknown,
            _ => HostState::Other(s),
        }
    }
}

impl From<Option<String>> for HostState {
    fn from(s: Option<String>) -> Self {
        s.map(HostState::from).unwrap_or_default()
    }
}

impl From<&str> for HostState {
    fn from(s: &str) -> Self {
        HostState::from(s.to_string())
    }
}

impl From<HostState> for String {
    fn from(state: HostState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostState::Unknown => f.write_str("<unknown>"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A project (environment) registered with the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A host registered in one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    #[serde(default)]
    pub state: HostState,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub labels: Option<HashMap<String, Value>>,
}

impl Host {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.as_ref()?.get(name)?.as_str()
    }

    pub fn has_label(&self, name: &str, value: &str) -> bool {
        self.label(name) == Some(value)
    }
}

/// The part of a host resource the action/poll loop reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub state: HostState,
}

/// Rancher list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Collection<T> {
    pub fn next_page(&self) -> Option<&str> {
        self.pagination.as_ref()?.next.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn host_state_round_trips_control_plane_vocabulary() {
        for s in ["active", "deactivating", "inactive", "removing", "removed"] {
            let state = HostState::from(s);
            assert!(!matches!(state, HostState::Other(_)), "{} should be known", s);
            assert_eq!(String::from(state), s);
        }
        assert_eq!(HostState::from("reconnecting"), HostState::Other("reconnecting".into()));
    }

    #[test]
    fn host_without_state_or_labels_still_parses() {
        let host: Host = serde_json::from_value(json!({"id": "1h5", "labels": null})).unwrap();
        assert_eq!(host.state, HostState::Unknown);
        assert!(!host.has_label("HOSTID", "i-1"));
    }

    #[test]
    fn null_state_is_unknown_and_does_not_poison_the_listing() {
        let page: Collection<Host> = serde_json::from_value(json!({
            "data": [
                {"id": "1h1", "state": null, "labels": {"HOSTID": "i-1"}},
                {"id": "1h2", "state": "active", "labels": {"HOSTID": "i-2"}}
            ]
        }))
        .unwrap();
        assert_eq!(page.data[0].state, HostState::Unknown);
        assert_eq!(page.data[1].state, HostState::Active);

        let snapshot: StateSnapshot = serde_json::from_value(json!({"id": "1h1", "state": null})).unwrap();
        assert_eq!(snapshot.state, HostState::Unknown);
    }

    #[test]
    fn label_match_ignores_non_string_values() {
        let host: Host = serde_json::from_value(json!({
            "id": "1h5",
            "state": "active",
            "labels": {"HOSTID": "i-123", "weight": 3}
        }))
        .unwrap();
        assert!(host.has_label("HOSTID", "i-123"));
        assert!(!host.has_label("HOSTID", "i-124"));
        assert_eq!(host.label("weight"), None);
    }

    #[test]
    fn collection_exposes_next_page() {
        let page: Collection<Project> = serde_json::from_value(json!({
            "data": [{"id": "1a5"}],
            "pagination": {"next": "http://rancher/v1/projects?marker=m1", "partial": true}
        }))
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.next_page(), Some("http://rancher/v1/projects?marker=m1"));
    }
}
