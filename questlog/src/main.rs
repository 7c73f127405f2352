//! `questlog` -- daily and weekly checklist tracker.
//!
//! Each invocation loads the record for this device's sync id, applies any
//! resets that came due, runs one command and writes the result back.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/questlog/config.toml`).
//!
//! ```bash
//! # Track a character against a local sync server
//! cargo run --bin questlog -- --server-url http://127.0.0.1:9100 add Mari
//! cargo run --bin questlog -- toggle Mari daily "Fergus exchange"
//!
//! # Link a second device
//! QUESTLOG_SERVER=http://127.0.0.1:9100 cargo run --bin questlog -- link AbCd1234
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;

use questlog::app::{SaveStatus, Tracker, TrackerError};
use questlog::clock::SystemClock;
use questlog::config::{CliArgs, ClientConfig};
use questlog::identity::IdentityFile;
use questlog::sync::SyncStore;
use questlog::sync::http::HttpSyncStore;
use questlog::sync::memory::MemorySyncStore;
use questlog_proto::model::{ResetScope, TaskKind, TaskValue};

#[derive(Parser, Debug)]
#[command(version, about = "Daily and weekly checklist tracker")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every entity and its progress (default).
    Show,
    /// Add an entity.
    Add { name: String },
    /// Rename an entity.
    Rename { entity: String, name: String },
    /// Delete an entity. Deleting the last one deletes the synced record.
    Remove { entity: String },
    /// Replace an entity's note.
    Note { entity: String, text: Vec<String> },
    /// Check or uncheck a task.
    Toggle {
        entity: String,
        scope: ResetScope,
        task: String,
    },
    /// Set a counter's remaining uses.
    Count {
        entity: String,
        scope: ResetScope,
        task: String,
        value: u32,
    },
    /// Edit the task lists.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Switch this device to the record behind a short code.
    Link { code: String },
    /// Print this device's short code.
    Code,
    /// Delete the synced record and forget the sync id.
    ResetAll {
        /// Skip the safety check.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Add a custom task.
    Add {
        scope: ResetScope,
        name: String,
        /// Make it a counter that refills to this many uses.
        #[arg(long, conflicts_with = "shared")]
        counter: Option<u32>,
        /// Checking it checks it for every entity.
        #[arg(long)]
        shared: bool,
    },
    /// Hide a built-in task or delete a custom one.
    Remove { scope: ResetScope, task: String },
    /// Move a task to a 1-based position.
    Move {
        scope: ResetScope,
        task: String,
        position: usize,
    },
    /// Restore the built-in task lists. Progress is kept.
    Restore,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ClientConfig::load(&cli.args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let settings = match config.tracker_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout only carries command output.
    let _log_guard = init_logging(&cli.args.log_level, cli.args.log_file.as_deref());
    tracing::info!("questlog starting");

    let command = cli.command.unwrap_or(Command::Show);
    let identity = IdentityFile::default_location();
    let clock = Arc::new(SystemClock);

    let result = match &config.server_url {
        Some(url) => match HttpSyncStore::new(url) {
            Ok(store) => {
                match Tracker::open(store, clock, &settings, identity).await {
                    Ok(tracker) => run(tracker, command).await,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e.into()),
        },
        None => {
            eprintln!("No sync server configured; changes will not be kept.");
            match Tracker::open(MemorySyncStore::new(), clock, &settings, None).await {
                Ok(tracker) => run(tracker, command).await,
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging via `tracing-appender`.
///
/// Returns a guard that must be held until the program exits to ensure
/// all buffered log lines are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("questlog.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run<S: SyncStore>(mut tracker: Tracker<S>, command: Command) -> Result<(), TrackerError> {
    match command {
        Command::Show => {
            print_session(&tracker);
            return Ok(());
        }
        Command::Add { name } => {
            let (index, status) = tracker.apply(|s| s.add_entity(&name)).await?;
            println!("Added #{} {}", index + 1, name.trim());
            report(&status);
            if let Some(code) = tracker.short_code() {
                println!("Sync code: {code}");
            }
        }
        Command::Rename { entity, name } => {
            let index = tracker.session().find_entity(&entity)?;
            let (_, status) = tracker.apply(|s| s.rename_entity(index, &name)).await?;
            report(&status);
        }
        Command::Remove { entity } => {
            let index = tracker.session().find_entity(&entity)?;
            let (removed, status) = tracker.apply(|s| s.remove_entity(index)).await?;
            println!("Removed {}", removed.name);
            report(&status);
        }
        Command::Note { entity, text } => {
            let index = tracker.session().find_entity(&entity)?;
            let note = text.join(" ");
            let (_, status) = tracker.apply(|s| s.set_note(index, &note)).await?;
            report(&status);
        }
        Command::Toggle {
            entity,
            scope,
            task,
        } => {
            let index = tracker.session().find_entity(&entity)?;
            let id = tracker.session().find_task(scope, &task)?;
            let (done, status) = tracker.apply(|s| s.toggle(index, scope, &id)).await?;
            println!("{} {}", checkbox(done), id);
            report(&status);
        }
        Command::Count {
            entity,
            scope,
            task,
            value,
        } => {
            let index = tracker.session().find_entity(&entity)?;
            let id = tracker.session().find_task(scope, &task)?;
            let (_, status) = tracker
                .apply(|s| s.set_count(index, scope, &id, value))
                .await?;
            report(&status);
        }
        Command::Task(task) => run_task_command(&mut tracker, task).await?,
        Command::Link { code } => {
            let id = tracker.link(&code).await?;
            println!("Linked to {id}");
            print_session(&tracker);
        }
        Command::Code => match tracker.short_code() {
            Some(code) => println!("{code}"),
            None => println!("No sync code yet; add an entity first."),
        },
        Command::ResetAll { yes } => {
            if !yes {
                eprintln!("This deletes the synced record for every device. Re-run with --yes.");
                return Ok(());
            }
            tracker.reset_all().await?;
            println!("All data has been reset.");
        }
    }
    Ok(())
}

async fn run_task_command<S: SyncStore>(
    tracker: &mut Tracker<S>,
    command: TaskCommand,
) -> Result<(), TrackerError> {
    let status = match command {
        TaskCommand::Add {
            scope,
            name,
            counter,
            shared,
        } => {
            let kind = match (counter, shared) {
                (Some(limit), _) => TaskKind::Counter { limit },
                (None, true) => TaskKind::SharedToggle,
                (None, false) => TaskKind::Toggle,
            };
            let (id, status) = tracker
                .apply(|s| s.add_custom_task(scope, &name, kind))
                .await?;
            println!("Added {scope} task {id}");
            status
        }
        TaskCommand::Remove { scope, task } => {
            let id = tracker.session().find_task(scope, &task)?;
            tracker.apply(|s| s.remove_task(scope, &id)).await?.1
        }
        TaskCommand::Move {
            scope,
            task,
            position,
        } => {
            let id = tracker.session().find_task(scope, &task)?;
            let to = position.saturating_sub(1);
            tracker.apply(|s| s.move_task(scope, &id, to)).await?.1
        }
        TaskCommand::Restore => {
            let (dropped, status) = tracker.apply(|s| Ok(s.restore_default_lists())).await?;
            println!("Task lists restored ({dropped} custom tasks dropped).");
            status
        }
    };
    report(&status);
    Ok(())
}

fn report(status: &SaveStatus) {
    match status {
        SaveStatus::Saved => tracing::debug!("saved"),
        SaveStatus::Deleted => println!("No entities left; synced record deleted."),
        SaveStatus::LocalOnly => {}
        SaveStatus::Pending(e) => eprintln!("Warning: change not synced ({e}). Try again later."),
    }
}

const fn checkbox(done: bool) -> &'static str {
    if done { "[x]" } else { "[ ]" }
}

fn print_session<S: SyncStore>(tracker: &Tracker<S>) {
    let session = tracker.session();
    match tracker.short_code() {
        Some(code) => println!("Sync code: {code}"),
        None => println!("Not synced yet."),
    }
    if session.is_empty() {
        println!("No entities. Add one with `questlog add <name>`.");
        return;
    }

    for (index, entity) in session.entities().iter().enumerate() {
        println!();
        if entity.note.is_empty() {
            println!("#{} {}", index + 1, entity.name);
        } else {
            println!("#{} {} ({})", index + 1, entity.name, entity.note);
        }
        for scope in ResetScope::ALL {
            println!("  {scope}:");
            for def in session.visible_tasks(scope) {
                let mark = match session.task_value(index, scope, &def.id) {
                    Ok(TaskValue::Count(n)) => {
                        format!("{n}/{}", def.limit().unwrap_or(n))
                    }
                    Ok(TaskValue::Done(done)) => checkbox(done).to_string(),
                    Err(_) => continue,
                };
                println!("    {mark:>5} {} [{}]", def.name, def.id);
            }
        }
    }
}
