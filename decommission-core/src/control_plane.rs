use crate::config::ControlPlaneConfig;
use crate::error::ControlPlaneError;
use crate::models::{Collection, Host, Project, StateSnapshot};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 1000;

/// Thin client over the Rancher v1 REST API.
#[derive(Clone)]
pub struct RancherClient {
    http: Client,
    base_url: String,
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl RancherClient {
    pub fn new(config: &ControlPlaneConfig) -> Result<Self, ControlPlaneError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ControlPlaneError::Client)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn host_url(&self, host_id: &str) -> String {
        format!("{}/hosts/{}", self.base_url, host_id)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ControlPlaneError> {
        self.get_collection(format!("{}/projects", self.base_url)).await
    }

    pub async fn list_project_hosts(&self, project_id: &str) -> Result<Vec<Host>, ControlPlaneError> {
        self.get_collection(format!("{}/projects/{}/hosts", self.base_url, project_id))
            .await
    }

    /// Reads the current state of the resource at `url`.
    pub async fn fetch_state(&self, url: &str) -> Result<StateSnapshot, ControlPlaneError> {
        self.send(self.http.get(url), url).await
    }

    /// `POST {url}?action={action}`; returns the resource as the control plane
    /// reported it in the immediate response.
    pub async fn post_action(&self, url: &str, action: &str) -> Result<StateSnapshot, ControlPlaneError> {
        let request = self.http.post(url).query(&[("action", action)]);
        self.send(request, url).await
    }

    async fn get_collection<T: DeserializeOwned>(&self, url: String) -> Result<Vec<T>, ControlPlaneError> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(url);

        while let Some(page_url) = next.take() {
            // a truncated listing could hide the host we are looking for
            if !visited.insert(page_url.clone()) || visited.len() > MAX_PAGES {
                warn!(url = %page_url, pages = visited.len(), "pagination does not terminate");
                return Err(ControlPlaneError::Pagination { url: page_url });
            }

            let page: Collection<T> = self.send(self.http.get(&page_url), &page_url).await?;
            next = page.next_page().map(str::to_string);
            items.extend(page.data);
        }

        Ok(items)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> Result<T, ControlPlaneError> {
        let request = match &self.access_key {
            Some(key) => request.basic_auth(key, self.secret_key.as_ref()),
            None => request,
        };

        let response = request.send().await.map_err(|source| ControlPlaneError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ControlPlaneError::Request {
            url: url.to_string(),
            source,
        })?;
        debug!(%url, status = status.as_u16(), "control plane responded");

        if !status.is_success() {
            return Err(ControlPlaneError::status(url, status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|source| ControlPlaneError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
