//! Data model shared by the task list client layers.
//!
//! Everything here is plain serde data: the wire shapes of the REST API and
//! the records kept in durable storage while running without a session.

mod auth;
mod query;
mod task;
mod timestamp;

pub use auth::{LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, User};
pub use query::{ListQuery, OrderBy, SortOrder, StatusFilter};
pub use task::{MAX_TITLE_CHARS, NewTask, Task, TaskId, TaskPatch};
pub use timestamp::{Timestamp, TimestampParseError};
