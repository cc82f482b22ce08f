//! Grades Bot Demo
//!
//! A console stand-in for a messaging platform drives a small grades bot.
//! Each stdin line becomes one event:
//!
//! ```text
//! /start            command
//! cb:/grades        callback with data "/grades"
//! alice             free-text message
//! @2 /start         the same, sent as user 2 (and every line after it)
//! ```
//!
//! Try `/start`, `alice`, `hunter2`, `Grades`, `cb:/grades/semester/2`.
//! Logins starting with `flaky` show the retrying transport at work.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package grades-bot -- --user 42
//! BRASS_LOGGING__LEVEL=debug cargo run --package grades-bot
//! ```

mod handlers;
mod portal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use brass::core::Event;
use brass::runtime::{BrassRuntime, ConfigLoader};
use brass::transport::RetryTransport;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use handlers::{Bot, Reply};
use portal::FakePortal;

#[derive(Debug, Parser)]
#[command(name = "grades-bot", about = "Console-driven grades bot")]
struct Args {
    /// Configuration file (searched for by default).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// User id for lines without an `@id` prefix.
    #[arg(short, long, default_value_t = 1)]
    user: i64,
}

/// Turns one console line into an event, updating the current user on `@id`.
fn parse_line(user: &mut i64, line: &str) -> Option<Event> {
    let mut line = line.trim();

    if let Some(rest) = line.strip_prefix('@') {
        let (id, tail) = rest.split_once(' ').unwrap_or((rest, ""));
        match id.parse() {
            Ok(id) => *user = id,
            Err(_) => {
                warn!(id, "Not a user id");
                return None;
            }
        }
        line = tail.trim();
    }

    if line.is_empty() {
        None
    } else if line.starts_with('/') {
        Some(Event::command(*user, line))
    } else if let Some(data) = line.strip_prefix("cb:") {
        Some(Event::callback(*user, data.trim()))
    } else {
        Some(Event::message(*user, line))
    }
}

async fn read_console(mut user: i64, events: mpsc::Sender<Event>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(event) = parse_line(&mut user, &line)
                    && events.send(event).await.is_err()
                {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
}

async fn print_replies(mut replies: mpsc::UnboundedReceiver<Reply>) {
    while let Some(reply) = replies.recv().await {
        println!("[to {}] {}", reply.user, reply.text);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let config = loader.load()?;

    let portal = Arc::new(RetryTransport::new(
        FakePortal::new(),
        config.transport.retry_policy(),
    ));
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let router = handlers::router(Bot::new(portal, reply_tx));

    let runtime = BrassRuntime::builder().config(config).build(router).await?;

    let (event_tx, event_rx) = mpsc::channel(64);
    tokio::spawn(read_console(args.user, event_tx));
    let printer = tokio::spawn(print_replies(reply_rx));

    let stats = runtime.run(event_rx).await;
    drop(runtime);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    info!(
        handled = stats.handled,
        unrouted = stats.unrouted,
        failed = stats.failed,
        "Grades bot stopped"
    );
    Ok(())
}
