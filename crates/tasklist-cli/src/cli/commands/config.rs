//! Config command handlers.

use anyhow::{Context, Result};
use tasklist_core::config;

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn set_api_base(url: &str) -> Result<()> {
    config::Config::save_api_base(url).context("save api_base")?;
    println!("API base set to {}", url.trim());
    Ok(())
}
