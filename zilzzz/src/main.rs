//! `Zilzzz`: reminder tasks synced through a store server.
//!
//! Connects to a store server as one owner, mirrors that owner's tasks
//! locally, and schedules a desktop reminder for every task created here.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/zilzzz/config.toml`).
//!
//! ```bash
//! # Interactive shell
//! cargo run --bin zilzzz -- --owner alice
//!
//! # Print the current list as JSON and exit
//! ZILZZZ_OWNER=alice cargo run --bin zilzzz -- list --json
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use zilzzz::app::{App, Command, ParseError, format_task_line, parse_command};
use zilzzz::clock::SystemClock;
use zilzzz::config::{CliArgs, CliCommand, ClientConfig};
use zilzzz::identity::StaticIdentity;
use zilzzz::notify::{DesktopNotifier, NotificationScheduler};
use zilzzz::remote::{RemoteTaskChannel, WsTaskChannel};
use zilzzz::tasks::{LiveTaskCache, LocalTaskCache, TaskController};
use zilzzz_proto::task::OwnerId;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // The terminal belongs to the command loop, so logs go to a file.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("zilzzz starting");

    let Some(owner) = config
        .owner_id
        .clone()
        .map(OwnerId::new)
        .filter(|o| !o.is_blank())
    else {
        eprintln!("Not signed in: pass --owner, set ZILZZZ_OWNER, or set store.owner_id");
        std::process::exit(1);
    };

    let channel = match WsTaskChannel::connect(
        &config.store_url,
        owner.clone(),
        config.connect_timeout,
        config.request_timeout,
    )
    .await
    {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("Could not connect to {}: {e}", config.store_url);
            std::process::exit(1);
        }
    };

    let result = match cli.command.clone().unwrap_or(CliCommand::Shell) {
        CliCommand::List { json } => list_once(&channel, owner, &config, json).await,
        CliCommand::Shell => run_shell(channel, owner, &config).await,
    };

    tracing::info!("zilzzz exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("zilzzz.log");
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

/// Prints the owner's current tasks once.
async fn list_once(
    channel: &WsTaskChannel,
    owner: OwnerId,
    config: &ClientConfig,
    json: bool,
) -> io::Result<()> {
    let mut subscription = channel
        .subscribe(&owner)
        .await
        .map_err(|e| io::Error::other(e.to_string()))?;
    let snapshot = tokio::time::timeout(config.request_timeout, subscription.next())
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no task list received"))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "store closed the feed"))?;

    let mut cache = LocalTaskCache::new(owner);
    cache.apply(&snapshot);
    let tasks = cache.list();

    if json {
        let out = serde_json::to_string_pretty(&tasks).map_err(io::Error::other)?;
        println!("{out}");
    } else if tasks.is_empty() {
        println!("no reminders");
    } else {
        let zone = config.zone();
        for (i, task) in tasks.iter().enumerate() {
            println!("{}", format_task_line(i + 1, task, zone, &config.due_format));
        }
    }
    Ok(())
}

/// Interactive command loop.
///
/// Reads commands from stdin and reprints the list whenever the store
/// pushes a new snapshot.
async fn run_shell(channel: WsTaskChannel, owner: OwnerId, config: &ClientConfig) -> io::Result<()> {
    let zone = config.zone();
    let notifier = if config.notifications_enabled {
        DesktopNotifier::new(zone)
    } else {
        DesktopNotifier::disabled(zone)
    };
    let scheduler = NotificationScheduler::new(notifier, zone)
        .with_title(config.notification_title.clone())
        .with_sound(config.notification_sound);
    let controller = TaskController::new(
        channel,
        Arc::new(StaticIdentity::new(owner.clone())),
        scheduler,
        Arc::new(SystemClock),
    )
    .with_max_text_len(config.max_text_len);

    let mut app = App::new(
        controller,
        LiveTaskCache::new(owner.clone()),
        zone,
        config.due_format.clone(),
    );
    let mut changed = app.cache().changed();
    app.activate()
        .await
        .map_err(|e| io::Error::other(format!("could not subscribe: {e}")))?;

    println!("signed in as {owner}; type `help` for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => print_lines(&app.execute(command).await),
                    Err(ParseError::Empty) => {}
                    Err(e) => println!("{e}"),
                }
            }
            result = changed.changed() => {
                if result.is_err() {
                    break;
                }
                print_lines(&app.render_list());
            }
        }
    }

    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
