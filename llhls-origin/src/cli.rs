use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Output segment container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Ts,
    Fmp4,
}

/// Low-latency HLS origin server: ingests an MPEG-TS stream and serves a
/// blocking LL-HLS playlist plus addressable segments/parts over HTTP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input TS file; reads from stdin if omitted.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Program number to follow; the first non-zero program is used if omitted.
    #[arg(short, long)]
    pub sid: Option<u16>,

    /// Live playlist window size in segments. Absent means an event playlist
    /// (no eviction, no sliding window).
    #[arg(short, long)]
    pub window_size: Option<usize>,

    /// Target segment duration in seconds.
    #[arg(short, long, default_value_t = 1.0)]
    pub target_duration: f64,

    /// Target partial-segment duration in seconds.
    #[arg(short, long, default_value_t = 0.1)]
    pub part_duration: f64,

    /// HTTP listen port.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Segment container format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Fmp4)]
    pub format: OutputFormat,

    /// Log filter directive, overrides RUST_LOG when set.
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,
}
