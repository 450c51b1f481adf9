//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use tasklist_core::{config, logging};
use tasklist_types::{StatusFilter, TaskId};

mod commands;

#[derive(Parser)]
#[command(name = "tasklist")]
#[command(version)]
#[command(about = "Manage a task list locally or against the task API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the task API (overrides TASKLIST_API_URL and config)
    #[arg(long, global = true, value_name = "URL")]
    api_base: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in and switch to the server's task list
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TASKLIST_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TASKLIST_PASSWORD", hide_env_values = true)]
        password: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out and go back to the local task list
    Logout,
    /// Show the session mode and signed-in user
    Whoami,
    /// Show tasks
    List {
        /// Only titles containing this text (remembered)
        #[arg(long)]
        search: Option<String>,
        /// all, done or not_done
        #[arg(long)]
        status: Option<StatusFilter>,
    },
    /// Set or clear the remembered search term
    Search {
        term: Option<String>,
        #[arg(long, conflicts_with = "term")]
        clear: bool,
    },
    /// Add a task
    Add {
        title: String,
        /// ISO-8601 date or date-time, e.g. 2030-05-01T09:00
        #[arg(long)]
        deadline: Option<String>,
    },
    /// Mark a task done, or not done again
    Toggle { id: TaskId },
    /// Delete a task
    Rm { id: TaskId },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Print the config file path
    Path,
    /// Create a default config file
    Init,
    /// Save the API base URL to the config file
    SetApiBase { url: String },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config.logging);

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli, &config).await })
}

async fn dispatch(cli: Cli, config: &config::Config) -> Result<()> {
    let Cli { command, api_base } = cli;
    if let Commands::Config { command } = command {
        return config_command(command);
    }

    let mut app = commands::open_app(config, api_base.as_deref()).await?;
    match command {
        Commands::Login { email, password } => {
            commands::auth::login(&mut app, &email, &password).await
        }
        Commands::Register {
            email,
            password,
            name,
        } => commands::auth::register(&mut app, &email, &password, name.as_deref()).await,
        Commands::Logout => commands::auth::logout(&mut app).await,
        Commands::Whoami => {
            commands::auth::whoami(&app);
            Ok(())
        }
        Commands::List { search, status } => {
            commands::tasks::list(&mut app, search.as_deref(), status).await
        }
        Commands::Search { term, clear } => {
            let term = if clear { None } else { term };
            commands::tasks::search(&mut app, term.as_deref()).await
        }
        Commands::Add { title, deadline } => {
            commands::tasks::add(&mut app, &title, deadline.as_deref()).await
        }
        Commands::Toggle { id } => commands::tasks::toggle(&mut app, id).await,
        Commands::Rm { id } => commands::tasks::remove(&mut app, id).await,
        Commands::Config { command } => config_command(command),
    }
}

fn config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Path => {
            commands::config::path();
            Ok(())
        }
        ConfigCommands::Init => commands::config::init(),
        ConfigCommands::SetApiBase { url } => commands::config::set_api_base(&url),
    }
}
