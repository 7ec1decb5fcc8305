//! Projects API.

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{CreateProjectRequest, ListQuery, Page, Project, UpdateProjectRequest};

const BASE: &str = "/v1/projects";

/// Projects API client.
pub struct ProjectsApi {
    client: ApiClient,
}

impl ProjectsApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<Project>> {
        self.client.get_with_query(BASE, query).await
    }

    pub async fn get(&self, id: &str) -> Result<Project> {
        self.client.get(&format!("{BASE}/{id}")).await
    }

    pub async fn create(&self, request: &CreateProjectRequest) -> Result<Project> {
        self.client.post(BASE, request).await
    }

    pub async fn update(&self, id: &str, request: &UpdateProjectRequest) -> Result<Project> {
        self.client.put(&format!("{BASE}/{id}"), request).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("{BASE}/{id}")).await
    }
}
