//! Task collection operations against `/todos`.

use tasklist_types::{ListQuery, NewTask, Task, TaskId, TaskPatch};
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, Query};

#[derive(Debug, Clone)]
pub struct TodoService {
    api: ApiClient,
}

impl TodoService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Lists tasks in server order. A response that is not an array is
    /// treated as an empty list.
    ///
    /// # Errors
    /// Returns request or decode failures.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Task>, ApiError> {
        let params = Query::new()
            .with("search", query.search.clone())
            .with("status", query.status.map(|s| s.as_str()))
            .with("order_by", query.order_by.map(|o| o.as_str()))
            .with("order", query.order.map(|o| o.as_str()))
            .with("limit", query.limit)
            .with("offset", query.offset);

        let body: serde_json::Value = self.api.get("/todos", params).await?;
        if !body.is_array() {
            warn!("task listing was not an array; treating it as empty");
            return Ok(Vec::new());
        }
        let tasks: Vec<Task> = serde_json::from_value(body)?;
        debug!(count = tasks.len(), "listed tasks");
        Ok(tasks)
    }

    /// # Errors
    /// Returns request or decode failures.
    pub async fn create(&self, task: &NewTask) -> Result<Task, ApiError> {
        self.api.post("/todos", task).await
    }

    /// # Errors
    /// Returns request or decode failures.
    pub async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        self.api.patch(&format!("/todos/{id}"), patch).await
    }

    /// # Errors
    /// Returns request failures.
    pub async fn remove(&self, id: TaskId) -> Result<(), ApiError> {
        self.api.delete(&format!("/todos/{id}")).await?;
        Ok(())
    }
}
