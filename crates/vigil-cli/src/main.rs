//! vigil daemon: wiring, lifecycle, and a console front end.
//!
//! A real deployment points the ports at a management server client and a
//! chat transport. This binary wires the simulator and stdin/stdout instead,
//! so the whole engine (commands, subscriptions, the reconciler) can be
//! driven end to end on a workstation.

mod config;
mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::info;

use vigil_core::access::{self, AllowList};
use vigil_core::domain::{Command, SubscriberId, VigilError};
use vigil_core::handlers::Context;
use vigil_core::ports::{Notifier, SubscriptionStore, TaskSource};
use vigil_core::reconciler::Reconciler;
use vigil_core::store::SqliteStore;

use config::Config;
use sim::SimSource;

#[derive(Parser, Debug)]
#[command(name = "vigil", about = "Task completion notification daemon")]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Console notifier: pushed notices go to stdout, tagged with the
/// subscriber they were addressed to.
struct ConsoleNotifier;

#[async_trait::async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, to: SubscriberId, text: &str) -> Result<(), VigilError> {
        println!("--- notification for {to} ---\n{text}\n");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    info!(store = %cfg.store.path.display(), "starting vigil");
    let store: Arc<dyn SubscriptionStore> = Arc::new(
        SqliteStore::open(&cfg.store.path)
            .map_err(|err| anyhow::anyhow!("opening subscription store: {err}"))?,
    );
    let source: Arc<dyn TaskSource> = Arc::new(SimSource::new(cfg.simulator.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);

    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&source),
        Arc::clone(&notifier),
    )
    .with_interval(Duration::from_secs(cfg.reconciler.interval_secs))
    .with_stale_after_misses(cfg.reconciler.stale_after_misses);
    let reconciler = reconciler.spawn();

    let allow = AllowList::new(cfg.access.allow.iter().copied().map(SubscriberId::new));
    let ctx = Context { store, source };

    info!("ready; `<chat-id> /command` or a bare /command, /help for the list, ctrl-c to exit");
    run_console(ctx, allow).await?;

    // Intake is closed; let the loop finish its current entry and exit.
    info!("shutting down");
    reconciler.shutdown_and_join().await;
    Ok(())
}

/// Read commands line by line until EOF or ctrl-c.
///
/// Each line is handled on its own task, so one slow command (a remote
/// round trip) never blocks the next, the same isolation the chat front
/// end gives concurrent users. In-flight commands are drained before
/// returning.
async fn run_console(ctx: Context, allow: AllowList) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break; // EOF
                };
                if line.trim().is_empty() {
                    continue;
                }

                let (subscriber, rest) = split_subscriber(&line);
                let command = Command::parse(rest);
                let ctx = ctx.clone();
                let allow = allow.clone();
                in_flight.push(tokio::spawn(async move {
                    let reply = access::guarded(&allow, &ctx, subscriber, command).await;
                    println!("{reply}\n");
                }));
                in_flight.retain(|join| !join.is_finished());
            }
        }
    }

    for join in in_flight {
        let _ = join.await;
    }
    Ok(())
}

/// `42 /sub task-1` addresses subscriber 42; a bare `/sub task-1` runs as
/// the default workstation identity 0.
fn split_subscriber(line: &str) -> (SubscriberId, &str) {
    let trimmed = line.trim();
    if let Some((head, rest)) = trimmed.split_once(char::is_whitespace)
        && let Ok(id) = head.parse::<i64>()
    {
        return (SubscriberId::new(id), rest.trim_start());
    }
    (SubscriberId::new(0), trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressed_lines_carry_their_subscriber() {
        let (id, rest) = split_subscriber("42 /sub task-1");
        assert_eq!(id, SubscriberId::new(42));
        assert_eq!(rest, "/sub task-1");
    }

    #[test]
    fn bare_lines_fall_back_to_the_default_identity() {
        let (id, rest) = split_subscriber("/tasks");
        assert_eq!(id, SubscriberId::new(0));
        assert_eq!(rest, "/tasks");
    }

    #[test]
    fn non_numeric_prefix_is_part_of_the_command() {
        let (id, rest) = split_subscriber("hello /tasks");
        assert_eq!(id, SubscriberId::new(0));
        assert_eq!(rest, "hello /tasks");
    }
}
