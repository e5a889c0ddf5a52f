//! Offline analysis of the trace index: per-kind outcome summary and
//! success-rate drift between consecutive windows.

mod drift;
mod index;
mod report;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::info;

use workgate::io::config::{TRACE_ROOT_ENV, default_trace_root};
use workgate::io::trace_store::TraceStore;
use workgate::logging;

use crate::drift::detect_drift;
use crate::index::{load_index, since};
use crate::report::aggregate;

#[derive(Parser)]
#[command(name = "trace-report", version, about = "Summarize finalized workgate traces")]
struct Cli {
    /// Trace root (defaults to WORKGATE_TRACE_ROOT, then ~/.workgate/traces).
    #[arg(long)]
    trace_root: Option<PathBuf>,
    /// Only consider traces started within the last N days.
    #[arg(long)]
    since_days: Option<i64>,
    /// Traces per kind in each drift window.
    #[arg(long, default_value_t = 20)]
    window: usize,
    /// Success-rate drop that counts as drift.
    #[arg(long, default_value_t = 0.2)]
    threshold: f64,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let trace_root = match cli.trace_root {
        Some(root) => root,
        None => match std::env::var_os(TRACE_ROOT_ENV) {
            Some(root) => PathBuf::from(root),
            None => default_trace_root()?,
        },
    };

    let index_path = TraceStore::new(trace_root, std::time::Duration::ZERO).index_path();
    let (mut manifests, warnings) = load_index(&index_path)?;
    if let Some(days) = cli.since_days {
        manifests = since(manifests, Utc::now() - Duration::days(days));
    }
    info!(index = %index_path.display(), traces = manifests.len(), "index loaded");

    println!("report: traces={}", manifests.len());
    for (kind, summary) in aggregate(&manifests) {
        println!(
            "report: kind={} traces={} success={} partial={} crashed={} unknown={} crash_rate={:.2}",
            kind,
            summary.traces,
            summary.success,
            summary.partial,
            summary.crashed,
            summary.unknown,
            summary.crash_rate()
        );
        if let Some(avg) = summary.avg_duration_secs {
            println!("report: kind={} avg_duration_secs={:.2}", kind, avg);
        }
    }
    for drift in detect_drift(&manifests, cli.window, cli.threshold) {
        println!(
            "drift: kind={} window={} previous={:.2} recent={:.2}",
            drift.kind, drift.window, drift.previous_rate, drift.recent_rate
        );
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}
