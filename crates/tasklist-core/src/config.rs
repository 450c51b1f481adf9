//! Configuration management for tasklist.
//!
//! Loads configuration from ${TASKLIST_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tasklist_types::{ListQuery, OrderBy, SortOrder};

/// Environment variable that overrides `api_base`.
pub const API_URL_ENV: &str = "TASKLIST_API_URL";

pub mod paths {
    //! Path resolution for tasklist configuration and data.
    //!
    //! TASKLIST_HOME resolution order:
    //! 1. TASKLIST_HOME environment variable (if set)
    //! 2. ~/.config/tasklist (default)

    use std::path::PathBuf;

    /// Returns the tasklist home directory.
    pub fn tasklist_home() -> PathBuf {
        if let Ok(home) = std::env::var("TASKLIST_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".tasklist"),
            |h| h.join(".config").join("tasklist"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        tasklist_home().join("config.toml")
    }

    /// Returns the path to the durable key-value store.
    pub fn storage_path() -> PathBuf {
        tasklist_home().join("storage.json")
    }

    /// Returns the directory log files are written to.
    pub fn logs_dir() -> PathBuf {
        tasklist_home().join("logs")
    }
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// New comments and sections from the template are always present, while
/// the user's customized values win.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            other => {
                target[key] = other.clone();
            }
        }
    }
}

/// Server-side ordering requested when listing tasks remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    pub order_by: OrderBy,
    pub order: SortOrder,
    pub limit: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            order_by: OrderBy::Deadline,
            order: SortOrder::Asc,
            limit: 200,
        }
    }
}

impl ListConfig {
    /// Builds the listing query for a search term; an empty term is left out.
    pub fn query(&self, search: &str) -> ListQuery {
        ListQuery {
            search: (!search.is_empty()).then(|| search.to_string()),
            order_by: Some(self.order_by),
            order: Some(self.order),
            limit: Some(self.limit),
            ..ListQuery::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when TASKLIST_LOG is unset.
    pub level: String,
    /// Mirror logs into `<home>/logs/tasklist.log`.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: false,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the task API
    pub api_base: String,

    /// Refuse task operations without a session instead of using local mode
    pub require_sign_in: bool,

    #[serde(default)]
    pub list: ListConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Returns the API base URL, preferring `TASKLIST_API_URL` when set.
    pub fn effective_api_base(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.api_base.clone())
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Saves only the `api_base` field to the config file.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, parsed or written.
    pub fn save_api_base(api_base: &str) -> Result<()> {
        Self::save_api_base_to(&paths::config_path(), api_base)
    }

    /// Saves only the `api_base` field to a specific config file path.
    ///
    /// Creates the file with default template if it doesn't exist.
    /// If file exists, merges user values into the latest template.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, parsed or written.
    pub fn save_api_base_to(path: &Path, api_base: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["api_base"] = value(api_base);

        Self::write_config(path, &doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            require_sign_in: false,
            list: ListConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
