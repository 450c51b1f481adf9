//! Where task operations go: the durable store (no session) or the server.

use std::sync::Arc;

use tasklist_types::{ListQuery, NewTask, StatusFilter, Task, TaskId, TaskPatch, Timestamp};
use tracing::{debug, warn};

use super::display;
use crate::api::ApiError;
use crate::config::ListConfig;
use crate::storage::{KeyValueStore, keys};
use crate::todos::TodoService;

/// The task capability, chosen when the session mode changes.
#[derive(Debug)]
pub enum TaskBackend {
    Local(LocalTasks),
    Remote(RemoteTasks),
}

impl TaskBackend {
    /// Tasks to show. Local tasks are filtered and sorted here; remote tasks
    /// were already filtered and ordered by the server.
    pub fn visible(&self, search: &str, status: StatusFilter) -> Vec<&Task> {
        match self {
            TaskBackend::Local(local) => display::visible_tasks(&local.tasks, search, status),
            TaskBackend::Remote(remote) => remote.tasks.iter().collect(),
        }
    }

    /// Reloads the collection. Only remote backends have anything to fetch.
    ///
    /// # Errors
    /// Returns listing failures.
    pub async fn refresh(&mut self, search: &str, status: StatusFilter) -> Result<(), ApiError> {
        match self {
            TaskBackend::Local(_) => Ok(()),
            TaskBackend::Remote(remote) => remote.refresh(search, status).await,
        }
    }

    /// # Errors
    /// Returns the server's error; local creation never fails.
    pub async fn create(&mut self, task: NewTask) -> Result<Task, ApiError> {
        match self {
            TaskBackend::Local(local) => Ok(local.create(task)),
            TaskBackend::Remote(remote) => remote.create(&task).await,
        }
    }

    /// Flips `done`. `Ok(None)` when no task has that id.
    ///
    /// # Errors
    /// Returns the server's error; local toggling never fails.
    pub async fn toggle(&mut self, id: TaskId) -> Result<Option<Task>, ApiError> {
        match self {
            TaskBackend::Local(local) => Ok(local.toggle(id)),
            TaskBackend::Remote(remote) => remote.toggle(id).await,
        }
    }

    /// Deletes a task. Returns whether it was in the collection.
    ///
    /// # Errors
    /// Returns the server's error; local deletion never fails.
    pub async fn remove(&mut self, id: TaskId) -> Result<bool, ApiError> {
        match self {
            TaskBackend::Local(local) => Ok(local.remove(id)),
            TaskBackend::Remote(remote) => remote.remove(id).await,
        }
    }
}

/// Tasks kept in the durable store under `todos`, saved after every change.
pub struct LocalTasks {
    tasks: Vec<Task>,
    storage: Arc<dyn KeyValueStore>,
}

impl LocalTasks {
    /// Loads the stored collection. Unreadable data yields an empty list.
    pub fn hydrate(storage: Arc<dyn KeyValueStore>) -> Self {
        let tasks = match storage.get(keys::TODOS) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "ignoring unreadable local tasks");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "failed to read local tasks");
                Vec::new()
            }
        };
        debug!(count = tasks.len(), "loaded local tasks");
        Self { tasks, storage }
    }

    fn persist(&self) {
        let saved = serde_json::to_string(&self.tasks)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set(keys::TODOS, &json));
        if let Err(err) = saved {
            warn!(error = %err, "failed to save local tasks");
        }
    }

    /// Millisecond timestamp, bumped past existing ids so rapid creations
    /// stay unique.
    fn next_id(&self) -> TaskId {
        let now = Timestamp::now().timestamp_millis();
        let max = self.tasks.iter().map(|t| t.id).max().unwrap_or(TaskId::MIN);
        now.max(max.saturating_add(1))
    }

    pub fn create(&mut self, new: NewTask) -> Task {
        let task = Task {
            id: self.next_id(),
            title: new.title,
            deadline: new.deadline,
            done: false,
            created_at: None,
            updated_at: None,
        };
        self.tasks.push(task.clone());
        self.persist();
        task
    }

    pub fn toggle(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.done = !task.done;
        let task = task.clone();
        self.persist();
        Some(task)
    }

    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            self.persist();
        }
        removed
    }
}

impl std::fmt::Debug for LocalTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTasks")
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

/// Server-backed tasks. The in-memory copy changes only after the server
/// confirms a mutation.
#[derive(Debug)]
pub struct RemoteTasks {
    tasks: Vec<Task>,
    todos: TodoService,
    list: ListConfig,
}

impl RemoteTasks {
    pub fn new(todos: TodoService, list: ListConfig) -> Self {
        Self {
            tasks: Vec::new(),
            todos,
            list,
        }
    }

    fn query(&self, search: &str, status: StatusFilter) -> ListQuery {
        ListQuery {
            status: (status != StatusFilter::All).then_some(status),
            ..self.list.query(search.trim())
        }
    }

    async fn refresh(&mut self, search: &str, status: StatusFilter) -> Result<(), ApiError> {
        self.tasks = self.todos.list(&self.query(search, status)).await?;
        Ok(())
    }

    async fn create(&mut self, task: &NewTask) -> Result<Task, ApiError> {
        let created = self.todos.create(task).await?;
        self.tasks.insert(0, created.clone());
        Ok(created)
    }

    async fn toggle(&mut self, id: TaskId) -> Result<Option<Task>, ApiError> {
        let Some(done) = self.tasks.iter().find(|t| t.id == id).map(|t| t.done) else {
            return Ok(None);
        };
        let updated = self.todos.update(id, &TaskPatch::done(!done)).await?;
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn remove(&mut self, id: TaskId) -> Result<bool, ApiError> {
        self.todos.remove(id).await?;
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        Ok(self.tasks.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            deadline: None,
        }
    }

    #[test]
    fn test_local_creations_keep_insertion_order_and_unique_ids() {
        let mut local = LocalTasks::hydrate(Arc::new(MemoryStore::new()));
        for title in ["one", "two", "three"] {
            local.create(new_task(title));
        }
        let titles: Vec<&str> = local.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "two", "three"]);

        let mut ids: Vec<TaskId> = local.tasks.iter().map(|t| t.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_local_round_trip_through_storage() {
        let storage = Arc::new(MemoryStore::new());
        let mut local = LocalTasks::hydrate(storage.clone());
        local.create(NewTask {
            title: "dated".to_string(),
            deadline: Some(Timestamp::parse("2030-01-01T08:30:00Z").unwrap()),
        });
        local.create(new_task("plain"));
        let id = local.tasks[1].id;
        local.toggle(id);

        let reloaded = LocalTasks::hydrate(storage);
        assert_eq!(reloaded.tasks, local.tasks);
        assert!(reloaded.tasks[1].done);
        assert_eq!(reloaded.tasks[1].deadline, None);
    }

    #[test]
    fn test_local_unknown_ids_are_noops() {
        let storage = Arc::new(MemoryStore::new());
        let mut local = LocalTasks::hydrate(storage.clone());
        local.create(new_task("keep"));

        assert_eq!(local.toggle(42), None);
        assert!(!local.remove(42));
        assert_eq!(local.tasks.len(), 1);
    }

    #[test]
    fn test_corrupt_local_tasks_hydrate_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(keys::TODOS, "{not json").unwrap();
        let local = LocalTasks::hydrate(storage);
        assert!(local.tasks.is_empty());
    }
}
