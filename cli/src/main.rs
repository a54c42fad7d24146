//! `servicedesk` entry point.
//!
//! Each invocation loads the board, performs one command, waits for the
//! resulting save, and exits. `watch` is the long-running exception: it
//! keeps the archival sweep alive until Ctrl-C.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cmd;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cmd::Cli::parse();
    cmd::run(cli).await
}
