//! Tasks API.

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{CreateTaskRequest, ListQuery, Page, Task, UpdateTaskRequest};

const BASE: &str = "/v1/tasks";

/// Tasks API client.
pub struct TasksApi {
    client: ApiClient,
}

impl TasksApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// List tasks, one page at a time.
    pub async fn list(&self, query: &ListQuery) -> Result<Page<Task>> {
        self.client.get_with_query(BASE, query).await
    }

    pub async fn get(&self, id: &str) -> Result<Task> {
        self.client.get(&format!("{BASE}/{id}")).await
    }

    pub async fn create(&self, request: &CreateTaskRequest) -> Result<Task> {
        self.client.post(BASE, request).await
    }

    pub async fn update(&self, id: &str, request: &UpdateTaskRequest) -> Result<Task> {
        self.client.put(&format!("{BASE}/{id}"), request).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("{BASE}/{id}")).await
    }
}
