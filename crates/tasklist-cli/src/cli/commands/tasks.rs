//! Task command handlers.

use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table};
use tasklist_core::{App, AppError};
use tasklist_types::{StatusFilter, Task, TaskId};

const SIGN_IN_PROMPT: &str = "Sign in to manage tasks: tasklist login --email <EMAIL>";

pub async fn list(app: &mut App, search: Option<&str>, status: Option<StatusFilter>) -> Result<()> {
    if app.is_gated() {
        println!("{SIGN_IN_PROMPT}");
        return Ok(());
    }
    if let Some(term) = search {
        app.search(term.trim()).await.context("search tasks")?;
    }
    if let Some(status) = status {
        app.set_status_filter(status).await.context("filter tasks")?;
    }
    print_tasks(app)
}

pub async fn search(app: &mut App, term: Option<&str>) -> Result<()> {
    if app.is_gated() {
        println!("{SIGN_IN_PROMPT}");
        return Ok(());
    }
    let term = term.map(str::trim).unwrap_or_default();
    app.search(term).await.context("search tasks")?;
    if term.is_empty() {
        println!("Search cleared.");
    } else {
        println!("Searching for \"{term}\"");
    }
    print_tasks(app)
}

pub async fn add(app: &mut App, title: &str, deadline: Option<&str>) -> Result<()> {
    let task = app
        .add_task(title, deadline)
        .await
        .map_err(gated)
        .context("add task")?;
    println!("Added task {}: {}", task.id, task.title);
    Ok(())
}

pub async fn toggle(app: &mut App, id: TaskId) -> Result<()> {
    match app.toggle_task(id).await.map_err(gated).context("toggle task")? {
        Some(task) if task.done => println!("Task {id} marked done"),
        Some(_) => println!("Task {id} marked not done"),
        None => println!("No task with id {id}"),
    }
    Ok(())
}

pub async fn remove(app: &mut App, id: TaskId) -> Result<()> {
    if app.delete_task(id).await.map_err(gated).context("delete task")? {
        println!("Deleted task {id}");
    } else {
        println!("No task with id {id}");
    }
    Ok(())
}

/// Points signed-out users of a gated setup at `login`.
fn gated(err: AppError) -> anyhow::Error {
    match err {
        AppError::SignInRequired => anyhow::anyhow!(SIGN_IN_PROMPT),
        other => other.into(),
    }
}

fn print_tasks(app: &App) -> Result<()> {
    let tasks = app.visible_tasks().map_err(gated)?;
    if tasks.is_empty() {
        println!("No tasks found.");
    } else {
        println!("{}", render(&tasks));
    }
    Ok(())
}

fn render(tasks: &[&Task]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Done", "Title", "Deadline"]);
    for task in tasks {
        table.add_row(vec![
            task.id.to_string(),
            if task.done { "[x]" } else { "[ ]" }.to_string(),
            task.title.clone(),
            task.deadline
                .map(|d| d.to_short_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}
