//! Command-line front end for the TaskVault sync core.
//!
//! # Responsibility
//! - Wire config, cache, gateway and services the way an app shell would.
//! - Run the initial load, then one task command, and print the result.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use taskvault_core::{
    init_logging_from_config, open_cache, CoreConfig, HttpTaskGateway, MutationOutcome,
    StaticCredentials, SyncContext, SyncOrchestrator, SyncOutcome, Task, TaskFilter, TaskId,
    TaskService,
};

#[derive(Parser)]
#[command(
    name = "taskvault",
    about = "Offline-first personal task list",
    version = taskvault_core::core_version()
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API base url (overrides TASKVAULT_API_BASE_URL)
    #[arg(long, global = true)]
    api_base_url: Option<String>,

    /// SQLite cache file (overrides TASKVAULT_CACHE_PATH)
    #[arg(long, global = true)]
    cache_path: Option<PathBuf>,

    /// Bearer token
    #[arg(long, global = true, env = "TASKVAULT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Work from the cache only; changes are queued
    #[arg(long, global = true)]
    offline: bool,

    /// Request timeout in seconds (must be positive)
    #[arg(long, global = true, value_parser = taskvault_core::config::parse_timeout_secs)]
    timeout_secs: Option<Duration>,

    /// Directory for rolling log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Show tasks
    List {
        /// all, completed or pending
        #[arg(long, short, default_value = "all")]
        filter: TaskFilter,
    },
    /// Add a task
    Add {
        title: String,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Mark a task completed
    Done { id: TaskId },
    /// Mark a task not completed
    Undone { id: TaskId },
    /// Replace a task's title and due date
    Edit {
        id: TaskId,
        title: String,
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Delete a task
    Delete { id: TaskId },
    /// Flush queued changes and pull
    Sync,
    /// Show the cached user profile
    Whoami,
    /// Drop the cache and the session
    Logout,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = resolve_config(&cli)?;
    if let Err(err) = init_logging_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }

    let store = open_cache(&config.cache_path).map_err(|err| err.to_string())?;
    let credentials = Arc::new(StaticCredentials::new(cli.token.clone()));
    let gateway = HttpTaskGateway::from_config(&config, credentials.clone())
        .map_err(|err| err.to_string())?;
    let ctx = SyncContext::new(store, Arc::new(gateway), credentials, !cli.offline);
    let orchestrator = SyncOrchestrator::new(ctx.clone());
    let service = TaskService::new(ctx);

    if !matches!(cli.command, Command::Logout) {
        report_sync("load", orchestrator.load_and_sync().await);
    }

    match cli.command {
        Command::List { filter } => print_tasks(&service.visible_tasks(filter)),
        Command::Add { title, due } => report("add", service.add_task(&title, due).await),
        Command::Done { id } => report("done", service.toggle_complete(&id, true).await),
        Command::Undone { id } => report("undone", service.toggle_complete(&id, false).await),
        Command::Edit { id, title, due } => {
            if !service.begin_edit(&id) {
                return Err(format!("no task with id {id}"));
            }
            report("edit", service.edit_task(&id, &title, due).await)
        }
        Command::Delete { id } => report("delete", service.delete_task(&id).await),
        Command::Sync => report_sync("sync", orchestrator.on_connectivity_restored().await),
        Command::Whoami => match service.profile() {
            Some(profile) => println!("{}", profile.display_name()),
            None => println!("not signed in"),
        },
        Command::Logout => {
            service.logout();
            println!("logged out");
        }
    }

    let queued = service.pending_deletes().len();
    let pending = service.tasks().iter().filter(|task| task.pending_sync).count();
    if queued + pending > 0 {
        println!("{pending} task(s) and {queued} delete(s) waiting to sync");
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<CoreConfig, String> {
    let mut config = CoreConfig::from_env().map_err(|err| err.to_string())?;
    if let Some(url) = &cli.api_base_url {
        config.api_base_url =
            taskvault_core::config::normalize_base_url(url).map_err(|err| err.to_string())?;
    }
    if let Some(path) = &cli.cache_path {
        config.cache_path = path.clone();
    }
    if let Some(timeout) = cli.timeout_secs {
        config.request_timeout = Some(timeout);
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    Ok(config)
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        let due = task
            .due_date
            .map(|date| format!(" (due {date})"))
            .unwrap_or_default();
        let pending = if task.pending_sync { " *" } else { "" };
        println!("[{mark}] {:<14} {}{due}{pending}", task.id.to_string(), task.title);
    }
}

fn report(action: &str, outcome: MutationOutcome) {
    match outcome {
        MutationOutcome::Ignored => println!("{action}: nothing to do"),
        MutationOutcome::LocalOnly => println!("{action}: saved locally"),
        MutationOutcome::Queued => println!("{action}: queued for sync"),
        MutationOutcome::Confirmed => println!("{action}: ok"),
        MutationOutcome::Reverted(err) => println!("{action}: failed and reverted ({err})"),
        MutationOutcome::Dropped(err) => println!("{action}: rejected by server ({err})"),
        MutationOutcome::LoggedOut => println!("{action}: session expired, logged out"),
    }
}

fn report_sync(stage: &str, outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Completed(report) => {
            if let Some(err) = report.pull_error {
                warn!("event=cli_sync module=cli status=error stage={stage} error={err}");
                println!("{stage}: server unreachable, showing cached tasks");
            }
        }
        SyncOutcome::LoggedOut => println!("{stage}: session expired, logged out"),
        SyncOutcome::Skipped(reason) => {
            info!("event=cli_sync module=cli status=skipped stage={stage} reason={reason:?}");
        }
        SyncOutcome::Queued | SyncOutcome::AlreadyLoaded => {}
    }
}
