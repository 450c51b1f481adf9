//! Core of the task-list client: storage, the REST API client with session
//! refresh, the auth and task services, and the application controller.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod logging;
pub mod storage;
pub mod todos;

#[cfg(test)]
mod test_support;

pub use app::{App, AppError, AppOptions, SessionMode, SignedOutPolicy};
pub use config::Config;
