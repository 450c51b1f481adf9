//! Session command handlers.

use anyhow::{Context, Result};
use tasklist_core::{App, SessionMode};

pub async fn login(app: &mut App, email: &str, password: &str) -> Result<()> {
    let result = app.login(email, password).await.map(|user| user.display_label());
    match result {
        Ok(label) => {
            println!("Signed in as {label}");
            Ok(())
        }
        Err(err) if app.mode() == SessionMode::Remote => {
            if let Some(user) = app.user() {
                println!("Signed in as {}", user.display_label());
            }
            Err(err).context("could not load tasks")
        }
        Err(err) => Err(err).context("login failed"),
    }
}

pub async fn register(
    app: &mut App,
    email: &str,
    password: &str,
    name: Option<&str>,
) -> Result<()> {
    let user = app
        .register(email, password, name)
        .await
        .context("registration failed")?;
    println!("Registered and signed in as {}", user.display_label());
    Ok(())
}

pub async fn logout(app: &mut App) -> Result<()> {
    app.logout().await;
    println!("Signed out.");
    Ok(())
}

pub fn whoami(app: &App) {
    match (app.mode(), app.user()) {
        (SessionMode::Remote, Some(user)) => println!("Signed in as {}", user.display_label()),
        _ if app.is_gated() => println!("Not signed in. Run `tasklist login` to manage tasks."),
        _ => println!("Not signed in (local mode)"),
    }
}
