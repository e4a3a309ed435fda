// CLI modules
mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use cli::{args::Args, op::Op, Export, Keygen, Normalize, Version};

command_enum! {
    (Export, Export),
    (Keygen, Keygen),
    (Normalize, Normalize),
    (Version, Version),
}

/// Log to stderr so stdout only ever carries the command's output
fn init_tracing(log_level: &str) -> WorkerGuard {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let log_level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(&args.log_level);

    let ctx = cli::op::OpContext::new(args.config);
    let output = args.command.execute(&ctx).await?;
    println!("{}", output);
    Ok(())
}
