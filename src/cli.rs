use clap::Parser;
use std::path::PathBuf;

/// FlowScope: offline pcap flow analyzer — flow reconstruction, TCP state
/// tracking, RTT estimation, and top-flow reports.
#[derive(Parser, Debug)]
#[command(name = "flowscope", version, about)]
pub struct Cli {
    /// Path to the pcap trace file to analyze.
    pub trace: PathBuf,

    /// Load settings from a TOML config file (CLI flags take precedence).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write a Markdown report to this path.
    #[arg(short = 'o', long)]
    pub report: Option<PathBuf>,

    /// Export per-flow metrics as pretty-printed JSON.
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export per-flow metrics as CSV.
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Skip RTT estimation.
    #[arg(long)]
    pub no_rtt: bool,

    /// Suppress the stdout summary.
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
