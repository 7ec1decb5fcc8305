//! Teams API.

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{CreateTeamRequest, ListQuery, Page, Team, UpdateTeamRequest};

const BASE: &str = "/v1/teams";

/// Teams API client.
pub struct TeamsApi {
    client: ApiClient,
}

impl TeamsApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<Team>> {
        self.client.get_with_query(BASE, query).await
    }

    pub async fn get(&self, id: &str) -> Result<Team> {
        self.client.get(&format!("{BASE}/{id}")).await
    }

    pub async fn create(&self, request: &CreateTeamRequest) -> Result<Team> {
        self.client.post(BASE, request).await
    }

    pub async fn update(&self, id: &str, request: &UpdateTeamRequest) -> Result<Team> {
        self.client.put(&format!("{BASE}/{id}"), request).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("{BASE}/{id}")).await
    }
}
