//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod tasks;

use std::sync::Arc;

use anyhow::{Context, Result};
use tasklist_core::config::{Config, paths};
use tasklist_core::storage::FileStore;
use tasklist_core::{App, AppOptions};
use tracing::debug;

/// Builds the controller over `<home>/storage.json` and restores the session.
pub async fn open_app(config: &Config, api_base: Option<&str>) -> Result<App> {
    let storage = Arc::new(FileStore::new(paths::storage_path()));
    let mut options = AppOptions::from_config(config);
    if let Some(api_base) = api_base.map(str::trim).filter(|s| !s.is_empty()) {
        options.api_base = api_base.to_string();
    }
    let mut app = App::new(options, storage).context("create client")?;
    app.bootstrap().await;
    debug!(mode = app.mode().as_str(), "client ready");
    Ok(app)
}
