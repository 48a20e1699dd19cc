//! CLI definition using clap.

use std::path::PathBuf;

use clap::Parser;

/// CFP controller
#[derive(Parser, Debug, Default)]
#[command(name = "cfp-controller")]
#[command(version)]
#[command(about = "Reconciles Speaker and Proposal resources against the CFP registry API")]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "CFP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registry API endpoint, including the `/api` prefix
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Workers per controller
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Seconds between full resyncs
    #[arg(long)]
    pub resync_secs: Option<u64>,
}
