use anyhow::Result;
use clap::Parser;
use cli::args::Cli;
use tracing_subscriber::EnvFilter;

// Single-threaded: images are annotated one after another.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the progress lines.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli::run::run(args, &mut out).await
}
