use crate::control_plane::RancherClient;
use crate::error::ResolveError;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Finds hosts by correlation label across every project on the server.
#[derive(Clone)]
pub struct NodeResolver {
    client: RancherClient,
    concurrency: usize,
}

impl NodeResolver {
    pub fn new(client: RancherClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Returns the ids of every host whose `label_name` label equals
    /// `label_value`, in project order then listing order.
    ///
    /// A project that cannot be listed fails the whole lookup rather than
    /// being skipped.
    pub async fn resolve_by_label(&self, label_name: &str, label_value: &str) -> Result<Vec<String>, ResolveError> {
        let projects = self.client.list_projects().await?;
        if projects.is_empty() {
            return Err(ResolveError::NoPartitions);
        }
        debug!(projects = projects.len(), label = %label_name, value = %label_value, "searching projects for host");

        // `buffered` keeps results in project order regardless of completion order
        let per_project: Vec<Vec<String>> = stream::iter(projects)
            .map(|project| async move {
                let hosts = self.client.list_project_hosts(&project.id).await?;
                let matches: Vec<String> = hosts
                    .into_iter()
                    .filter(|host| host.has_label(label_name, label_value))
                    .map(|host| host.id)
                    .collect();
                if !matches.is_empty() {
                    info!(project = %project.id, hosts = ?matches, "found labelled host");
                }
                Ok::<_, ResolveError>(matches)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(per_project.into_iter().flatten().collect())
    }
}
