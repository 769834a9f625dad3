use std::path::PathBuf;

use avikon::{start, Configuration};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

fn init_logging() -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(".", "avikon.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let filter1 = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_owned()),
    );
    let filter2 = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_owned()),
    );

    Registry::default()
        .with(
            fmt::layer()
                .with_writer(non_blocking_appender)
                .with_ansi(false)
                .with_filter(filter1),
        )
        .with(fmt::layer().with_filter(filter2))
        .init();
    guard
}

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the controller configuration file.
    #[arg(long, short, default_value = "avikon.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> avikon::Result<()> {
    let args = Args::parse();
    let _guard = init_logging();
    let raw = std::fs::read_to_string(&args.config)?;
    let configuration: Configuration = serde_yaml::from_str(&raw)?;
    start(configuration).await
}
