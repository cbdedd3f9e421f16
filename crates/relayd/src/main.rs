use anyhow::{Context, Result};
use clap::Parser;
use relay_core::protocol::{clean_line, format_reply, parse_command_line, OperatorCmd, Reply};
use relay_core::{JournalOutbox, LogOutbox, Outbox, RateLimitConfig, RateLimiter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod dispatch;

use dispatch::Dispatcher;

#[derive(Parser, Debug)]
#[command(name = "relayd", version, about = "Rate-limited WhatsApp relay console")]
struct Cli {
    /// TOML file with `messages_per_second` / `messages_per_minute`.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "RATE_LIMIT_MESSAGES_PER_SECOND")]
    per_second: Option<u32>,

    #[arg(long, env = "RATE_LIMIT_MESSAGES_PER_MINUTE")]
    per_minute: Option<u32>,

    /// Maximum in-flight sends during a bulk run.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Append deliveries to this JSON-lines file instead of only logging them.
    #[arg(long)]
    journal: Option<PathBuf>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => RateLimitConfig::load(path)?,
        None => RateLimitConfig::default(),
    }
    .with_overrides(cli.per_second, cli.per_minute);

    let limiter =
        Arc::new(RateLimiter::from_config(&config).context("invalid rate limit configuration")?);
    info!(
        per_second = limiter.per_second_limit(),
        per_minute = limiter.per_minute_limit(),
        "rate limiter ready"
    );

    let outbox: Arc<dyn Outbox> = match cli.journal.clone() {
        Some(path) => {
            info!(journal = %path.display(), "journaling deliveries");
            Arc::new(JournalOutbox::new(path))
        }
        None => Arc::new(LogOutbox),
    };

    let dispatcher = Dispatcher::new(limiter, outbox, cli.concurrency);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let Some(clean) = clean_line(&line) else { continue; };

        let cmd = match parse_command_line(&clean) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(line = %clean, %err, "rejected command");
                println!(
                    "{}",
                    format_reply(&Reply::Sys {
                        text: format!("invalid command: {err}"),
                    })
                );
                continue;
            }
        };

        if cmd == OperatorCmd::Quit {
            break;
        }

        let reply = dispatcher.handle(cmd).await;
        println!("{}", format_reply(&reply));
    }

    info!("relayd exiting");
    Ok(())
}
