// Boundpool CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: All scheduling goes through boundpool::Pool; this binary only
// builds commands and prints results.
// Design Decision: Without --pool items run one at a time.

mod command;
mod input;
mod output;
mod progress;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use boundpool::{Pool, PoolConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use command::CommandTemplate;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "boundpool")]
#[command(about = "Run a command once per input line, a bounded number at a time")]
#[command(version)]
pub struct Cli {
    /// Read items from this file instead of stdin
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Run items concurrently; without a value (or with 0) uses one slot per CPU
    #[arg(
        long,
        env = "BOUNDPOOL_CONCURRENCY",
        num_args = 0..=1,
        default_missing_value = "0"
    )]
    pub pool: Option<usize>,

    /// Only process the first item
    #[arg(long)]
    pub first: bool,

    /// Skip items before this position (1-based)
    #[arg(long)]
    pub start: Option<usize>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress the progress bar
    #[arg(long, short)]
    pub quiet: bool,

    /// Command to run per item; `{}` is replaced with the item, otherwise the
    /// item is appended as the last argument
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boundpool=info,boundpool_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_str(&cli.output);
    let template = CommandTemplate::from_argv(cli.command).context("no command given")?;

    let items = input::read_items(cli.input.as_deref())?;
    let items = input::select(items, cli.start, cli.first);
    if items.is_empty() {
        tracing::warn!("No input items");
        return Ok(());
    }

    let bar = progress::total_bar(items.len() as u64, cli.quiet);
    let template = Arc::new(template);

    let pool = {
        let template = Arc::clone(&template);
        let bar = bar.clone();
        Pool::with_config(
            move |item: String| {
                let template = Arc::clone(&template);
                let bar = bar.clone();
                async move {
                    let result = command::execute(&template, item).await;
                    progress::record(&bar, &result);
                    result
                }
            },
            PoolConfig::new().with_name("commands").with_max_concurrency(1),
        )
    };
    if let Some(limit) = cli.pool {
        pool.set_concurrency_limit(limit);
    }

    tracing::info!(
        items = items.len(),
        limit = pool.concurrency_limit(),
        program = template.program(),
        "Running commands"
    );

    let reports = pool.run(items).await;
    bar.finish_and_clear();
    let reports = reports.context("command run aborted")?;

    output::write_reports(&mut io::stdout().lock(), format, &reports)?;
    Ok(())
}
