//! Application state: session mode, the signed-in user and the task list.
//!
//! Every user action goes through [`App`]. It picks a [`TaskBackend`] when
//! the session mode changes and sends task operations to it, so callers never
//! branch on the mode themselves.

mod backend;
mod display;
mod validation;

use std::sync::Arc;

use tasklist_types::{StatusFilter, Task, TaskId, User};
use thiserror::Error;
use tracing::{info, warn};

pub use backend::{LocalTasks, RemoteTasks, TaskBackend};
pub use display::{display_order, visible_tasks};
pub use validation::{ValidationError, validate_new_task};

use crate::api::{ApiClient, ApiError, CredentialKind, CredentialStore};
use crate::auth::AuthService;
use crate::config::{Config, ListConfig};
use crate::storage::{KeyValueStore, keys};
use crate::todos::TodoService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Before [`App::bootstrap`].
    #[default]
    Unknown,
    /// No session; tasks live in the durable store (or are gated).
    Local,
    /// Signed in; the server owns the tasks.
    Remote,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Unknown => "unknown",
            SessionMode::Local => "local",
            SessionMode::Remote => "remote",
        }
    }
}

/// What task operations do without a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignedOutPolicy {
    /// Keep tasks in the durable store.
    #[default]
    LocalFallback,
    /// Refuse until the user signs in.
    RequireSignIn,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Sign in to manage tasks")]
    SignInRequired,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub api_base: String,
    pub policy: SignedOutPolicy,
    pub list: ListConfig,
}

impl AppOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_base: config.effective_api_base(),
            policy: if config.require_sign_in {
                SignedOutPolicy::RequireSignIn
            } else {
                SignedOutPolicy::LocalFallback
            },
            list: config.list.clone(),
        }
    }
}

pub struct App {
    policy: SignedOutPolicy,
    list: ListConfig,
    storage: Arc<dyn KeyValueStore>,
    credentials: Arc<CredentialStore>,
    auth: AuthService,
    todos: TodoService,
    mode: SessionMode,
    /// `None` before bootstrap and while gated.
    backend: Option<TaskBackend>,
    user: Option<User>,
    search: String,
    status: StatusFilter,
}

impl App {
    /// # Errors
    /// Returns an error if the API base URL is invalid.
    pub fn new(options: AppOptions, storage: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let credentials = Arc::new(CredentialStore::init(Arc::clone(&storage)));
        let api = ApiClient::new(&options.api_base, Arc::clone(&credentials))?;
        Ok(Self {
            policy: options.policy,
            list: options.list,
            auth: AuthService::new(api.clone(), Arc::clone(&storage)),
            todos: TodoService::new(api),
            storage,
            credentials,
            mode: SessionMode::Unknown,
            backend: None,
            user: None,
            search: String::new(),
            status: StatusFilter::All,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn search_term(&self) -> &str {
        &self.search
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.status
    }

    /// Signed out under [`SignedOutPolicy::RequireSignIn`].
    pub fn is_gated(&self) -> bool {
        self.mode != SessionMode::Unknown && self.backend.is_none()
    }

    /// Decides the session mode from the stored credentials.
    ///
    /// A stored session is validated with an identity check and a task
    /// fetch; if either fails the app falls back to the signed-out state.
    /// Never fails.
    pub async fn bootstrap(&mut self) {
        if !self.credentials.has(CredentialKind::Access) {
            self.enter_signed_out();
            return;
        }

        self.mode = SessionMode::Remote;
        match self.start_remote_session(None).await {
            Ok(()) => info!(mode = "remote", "session restored"),
            Err(err) => {
                warn!(error = %err, "stored session is not usable; continuing signed out");
                self.enter_signed_out();
            }
        }
    }

    async fn start_remote_session(&mut self, user: Option<User>) -> Result<(), ApiError> {
        let user = match user {
            Some(user) => user,
            None => self.auth.identity().await?,
        };
        self.enter_signed_in(user);
        let (search, status) = (self.search.clone(), self.status);
        match self.backend.as_mut() {
            Some(backend) => backend.refresh(&search, status).await,
            None => Ok(()),
        }
    }

    /// Remote state with an empty list; the caller fetches the tasks.
    fn enter_signed_in(&mut self, user: User) {
        self.user = Some(user);
        self.mode = SessionMode::Remote;
        self.backend = Some(TaskBackend::Remote(RemoteTasks::new(
            self.todos.clone(),
            self.list.clone(),
        )));
    }

    /// Local (or gated) state with the stored tasks and search term.
    fn enter_signed_out(&mut self) {
        self.user = None;
        self.mode = SessionMode::Local;
        match self.policy {
            SignedOutPolicy::LocalFallback => {
                self.search = match self.storage.get(keys::SEARCH_TERM) {
                    Ok(term) => term.unwrap_or_default(),
                    Err(err) => {
                        warn!(error = %err, "failed to read saved search");
                        String::new()
                    }
                };
                self.backend = Some(TaskBackend::Local(LocalTasks::hydrate(Arc::clone(
                    &self.storage,
                ))));
            }
            SignedOutPolicy::RequireSignIn => {
                self.search.clear();
                self.backend = None;
            }
        }
        info!(mode = "local", gated = self.backend.is_none(), "signed out");
    }

    /// Drops to the signed-out state when the session expired underneath us.
    fn settle<T>(&mut self, result: Result<T, ApiError>) -> Result<T, AppError> {
        if let Err(err) = &result
            && err.is_auth_expired()
        {
            info!("session expired");
            self.enter_signed_out();
        }
        result.map_err(AppError::from)
    }

    /// Signs in and loads the server's tasks.
    ///
    /// The session is remote as soon as the server accepts the credentials;
    /// if the first task fetch then fails the error is returned and the list
    /// stays empty until the next refresh.
    ///
    /// # Errors
    /// Returns the server's message, e.g. for wrong credentials.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<&User, AppError> {
        let tokens = self.auth.login(email.trim(), password).await?;
        let user = match tokens.user {
            Some(user) => user,
            None => match self.auth.identity().await {
                Ok(user) => user,
                Err(err) => {
                    // No identity, no session: drop the credentials just stored.
                    self.credentials.clear();
                    self.enter_signed_out();
                    return Err(err.into());
                }
            },
        };
        let result = self.start_remote_session(Some(user)).await;
        self.settle(result)?;
        self.user.as_ref().ok_or(AppError::SignInRequired)
    }

    /// Creates the account, then signs in with it.
    ///
    /// # Errors
    /// Returns registration or login failures.
    pub async fn register(
        &mut self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<&User, AppError> {
        self.auth.register(email.trim(), password, name).await?;
        self.login(email, password).await
    }

    /// Signs out and switches to the signed-out state. Never fails.
    pub async fn logout(&mut self) {
        self.auth.logout().await;
        self.enter_signed_out();
    }

    fn backend_mut(&mut self) -> Result<&mut TaskBackend, AppError> {
        self.backend.as_mut().ok_or(AppError::SignInRequired)
    }

    /// Tasks to show, per the current search term and status filter.
    ///
    /// # Errors
    /// Fails only while gated.
    pub fn visible_tasks(&self) -> Result<Vec<&Task>, AppError> {
        let backend = self.backend.as_ref().ok_or(AppError::SignInRequired)?;
        Ok(backend.visible(&self.search, self.status))
    }

    /// Re-fetches remote tasks; nothing to do locally.
    ///
    /// # Errors
    /// Returns listing failures.
    pub async fn refresh_tasks(&mut self) -> Result<(), AppError> {
        let (search, status) = (self.search.clone(), self.status);
        let result = self.backend_mut()?.refresh(&search, status).await;
        self.settle(result)
    }

    /// Sets the search term. Saved without a session; re-fetched with one.
    ///
    /// # Errors
    /// Returns listing failures.
    pub async fn search(&mut self, term: &str) -> Result<(), AppError> {
        let remote = match &self.backend {
            Some(TaskBackend::Local(_)) => false,
            Some(TaskBackend::Remote(_)) => true,
            None => return Err(AppError::SignInRequired),
        };
        self.search = term.to_string();
        if remote {
            return self.refresh_tasks().await;
        }
        if let Err(err) = self.storage.set(keys::SEARCH_TERM, &self.search) {
            warn!(error = %err, "failed to save search");
        }
        Ok(())
    }

    /// Narrows the list by completion. With a session the list is re-fetched.
    ///
    /// # Errors
    /// Returns listing failures.
    pub async fn set_status_filter(&mut self, status: StatusFilter) -> Result<(), AppError> {
        self.status = status;
        self.refresh_tasks().await
    }

    /// # Errors
    /// Returns validation failures before anything is sent.
    pub async fn add_task(&mut self, title: &str, deadline: Option<&str>) -> Result<Task, AppError> {
        let backend = self.backend_mut()?;
        let task = validate_new_task(title, deadline)?;
        let result = backend.create(task).await;
        self.settle(result)
    }

    /// Flips a task's completion. `Ok(None)` when the id is unknown.
    ///
    /// # Errors
    /// Returns the server's error; the list is left unchanged.
    pub async fn toggle_task(&mut self, id: TaskId) -> Result<Option<Task>, AppError> {
        let result = self.backend_mut()?.toggle(id).await;
        self.settle(result)
    }

    /// Deletes a task. Returns whether it was in the list.
    ///
    /// # Errors
    /// Returns the server's error; the list is left unchanged.
    pub async fn delete_task(&mut self, id: TaskId) -> Result<bool, AppError> {
        let result = self.backend_mut()?.remove(id).await;
        self.settle(result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_support::can_bind_localhost;

    fn options(api_base: &str, policy: SignedOutPolicy) -> AppOptions {
        AppOptions {
            api_base: api_base.to_string(),
            policy,
            list: ListConfig::default(),
        }
    }

    async fn local_app(storage: Arc<MemoryStore>) -> App {
        let mut app = App::new(
            options("http://127.0.0.1:9/api", SignedOutPolicy::LocalFallback),
            storage,
        )
        .unwrap();
        app.bootstrap().await;
        app
    }

    fn titles(app: &App) -> Vec<String> {
        app.visible_tasks()
            .unwrap()
            .into_iter()
            .map(|t| t.title.clone())
            .collect()
    }

    fn server_task(id: i64, title: &str, done: bool) -> serde_json::Value {
        json!({"id": id, "title": title, "deadline": null, "done": done})
    }

    #[tokio::test]
    async fn test_no_credentials_starts_local_with_saved_state() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(keys::SEARCH_TERM, "milk").unwrap();
        storage
            .set(keys::TODOS, &json!([server_task(1, "Buy milk", false)]).to_string())
            .unwrap();

        let app = local_app(storage).await;
        assert_eq!(app.mode(), SessionMode::Local);
        assert_eq!(app.search_term(), "milk");
        assert_eq!(titles(&app), vec!["Buy milk"]);
        assert!(!app.is_gated());
    }

    #[tokio::test]
    async fn test_local_crud_persists() {
        let storage = Arc::new(MemoryStore::new());
        let mut app = local_app(storage.clone()).await;

        let first = app.add_task("  Write report ", Some("2030-01-01")).await.unwrap();
        let second = app.add_task("Call mom", None).await.unwrap();
        assert_eq!(first.title, "Write report");
        assert_eq!(second.deadline, None);

        assert!(app.toggle_task(first.id).await.unwrap().unwrap().done);
        assert_eq!(titles(&app), vec!["Call mom", "Write report"]);

        assert!(app.delete_task(second.id).await.unwrap());
        assert!(!app.delete_task(second.id).await.unwrap());
        assert_eq!(app.toggle_task(second.id).await.unwrap(), None);

        app.search("REPORT").await.unwrap();
        let reopened = local_app(storage).await;
        assert_eq!(reopened.search_term(), "REPORT");
        assert_eq!(titles(&reopened), vec!["Write report"]);
    }

    #[tokio::test]
    async fn test_validation_happens_before_backend() {
        let mut app = local_app(Arc::new(MemoryStore::new())).await;
        let err = app.add_task("   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::EmptyTitle)));
        let err = app.add_task(&"x".repeat(201), None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::TitleTooLong { .. })));
        assert!(app.visible_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gated_policy_refuses_task_operations() {
        let mut app = App::new(
            options("http://127.0.0.1:9/api", SignedOutPolicy::RequireSignIn),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        app.bootstrap().await;

        assert!(app.is_gated());
        assert!(matches!(app.visible_tasks(), Err(AppError::SignInRequired)));
        assert!(matches!(
            app.add_task("Something", None).await,
            Err(AppError::SignInRequired)
        ));
    }

    #[tokio::test]
    async fn test_invalid_stored_session_falls_back_to_local() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "bad"})))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        storage.set(keys::ACCESS_TOKEN, "revoked").unwrap();
        let mut app = App::new(
            options(&format!("{}/api", server.uri()), SignedOutPolicy::LocalFallback),
            storage,
        )
        .unwrap();
        app.bootstrap().await;

        assert_eq!(app.mode(), SessionMode::Local);
        assert_eq!(app.user(), None);
        assert!(app.visible_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_at_startup_falls_back_to_local() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(keys::ACCESS_TOKEN, "a1").unwrap();
        storage.set(keys::REFRESH_TOKEN, "r1").unwrap();
        storage
            .set(keys::TODOS, &json!([server_task(1, "Offline", false)]).to_string())
            .unwrap();

        let app = local_app(storage).await;

        assert_eq!(app.mode(), SessionMode::Local);
        assert_eq!(app.user(), None);
        assert_eq!(titles(&app), vec!["Offline"]);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_after_login_keeps_remote_backend() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a1",
                "refresh_token": "r1",
                "user": {"id": 1, "email": "a@b.com"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/todos"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "db down"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/todos"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(server_task(5, "Signed-in task", false)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let mut app = App::new(
            options(&format!("{}/api", server.uri()), SignedOutPolicy::RequireSignIn),
            storage.clone(),
        )
        .unwrap();
        app.bootstrap().await;

        let err = app.login("a@b.com", "x").await.unwrap_err();
        assert_eq!(err.to_string(), "db down");
        assert_eq!(app.mode(), SessionMode::Remote);
        assert!(!app.is_gated());
        assert!(app.visible_tasks().unwrap().is_empty());

        let created = app.add_task("Signed-in task", None).await.unwrap();
        assert_eq!(created.id, 5);
        assert_eq!(titles(&app), vec!["Signed-in task"]);
        assert_eq!(storage.get(keys::TODOS).unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_without_identity_drops_credentials() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "a1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "down"})))
            .mount(&server)
            .await;

        let mut app = App::new(
            options(&format!("{}/api", server.uri()), SignedOutPolicy::LocalFallback),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        app.bootstrap().await;

        assert!(app.login("a@b.com", "x").await.is_err());
        assert_eq!(app.mode(), SessionMode::Local);
        assert!(!app.credentials.has(CredentialKind::Access));
    }

    async fn signed_in_app(server: &MockServer) -> App {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"email": "a@b.com", "password": "x"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a1",
                "refresh_token": "r1",
                "user": {"id": 1, "email": "a@b.com"}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/todos"))
            .and(header("authorization", "Bearer a1"))
            .and(query_param("order_by", "deadline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                server_task(7, "Server B", false),
                server_task(3, "Server A", true),
            ])))
            .mount(server)
            .await;

        let mut app = App::new(
            options(&format!("{}/api", server.uri()), SignedOutPolicy::LocalFallback),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        app.bootstrap().await;
        let user = app.login("a@b.com", "x").await.unwrap();
        assert_eq!(user.email, "a@b.com");
        app
    }

    #[tokio::test]
    async fn test_login_switches_to_remote_and_trusts_server_order() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        let app = signed_in_app(&server).await;

        assert_eq!(app.mode(), SessionMode::Remote);
        assert_eq!(titles(&app), vec!["Server B", "Server A"]);
    }

    #[tokio::test]
    async fn test_remote_mutations_reconcile_after_success() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/todos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(server_task(9, "New", false)))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/todos/7"))
            .and(body_json(json!({"done": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_task(7, "Server B", true)))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/todos/3"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"})))
            .mount(&server)
            .await;

        app.add_task("New", None).await.unwrap();
        assert_eq!(titles(&app), vec!["New", "Server B", "Server A"]);

        assert!(app.toggle_task(7).await.unwrap().unwrap().done);

        let err = app.toggle_task(3).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        let task3 = app.visible_tasks().unwrap().into_iter().find(|t| t.id == 3).cloned();
        assert!(task3.unwrap().done, "failed toggle must not change the list");
    }

    #[tokio::test]
    async fn test_remote_delete_of_unknown_id_leaves_list_alone() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/api/todos/404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/todos/405"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(app.delete_task(404).await.is_err());
        assert!(!app.delete_task(405).await.unwrap());
        assert_eq!(titles(&app), vec!["Server B", "Server A"]);
    }

    #[tokio::test]
    async fn test_expired_session_forces_local_mode() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server).await;
        server.reset().await;

        Mock::given(method("POST"))
            .and(path("/api/todos"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "revoked"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = app.add_task("Doomed", None).await.unwrap_err();
        assert!(matches!(err, AppError::Api(ApiError::AuthExpired(_))));
        assert_eq!(app.mode(), SessionMode::Local);
        assert_eq!(app.user(), None);
        assert!(!app.credentials.has(CredentialKind::Access));
    }

    #[tokio::test]
    async fn test_logout_twice_returns_to_local() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        app.logout().await;
        app.logout().await;

        assert_eq!(app.mode(), SessionMode::Local);
        assert!(!app.credentials.has(CredentialKind::Access));
        assert!(!app.credentials.has(CredentialKind::Refresh));
    }
}
