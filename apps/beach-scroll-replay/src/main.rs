mod cli;
mod sim;
mod telemetry;
mod trace;

use anyhow::{Context, Result};
use beach_touch_scroll::{FixedGeometry, ScrollConfig};
use clap::Parser;
use cli::Cli;
use sim::{RemoteModel, Simulation};
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::logging::init(&cli.logging.to_config()).context("failed to initialise logging")?;

    let config = match &cli.config {
        Some(path) => ScrollConfig::load(path)?,
        None => ScrollConfig::default(),
    }
    .apply_env()?;
    let steps = trace::load(&cli.trace)?;
    info!(steps = steps.len(), trace = %cli.trace.display(), "replaying trace");

    let geometry = FixedGeometry {
        rows: cli.rows,
        line_height_px: cli.line_height,
    };
    let remote = RemoteModel {
        entry_latency: Duration::from_millis(cli.entry_latency_ms),
        rtt: Duration::from_millis(cli.rtt_ms),
    };
    let (events, summary) = Simulation::new(config, geometry, remote).run(steps)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in &events {
        if cli.json {
            writeln!(out, "{}", sim::event_json(event))?;
        } else {
            writeln!(out, "{}", sim::event_text(event))?;
        }
    }

    if cli.json {
        writeln!(out, "{}", serde_json::json!({ "kind": "summary", "summary": summary }))?;
    } else {
        writeln!(
            out,
            "summary: {} batches, {} lines ({} pages + {} lines), {} entry requests, \
             {} keystrokes, rtt {:.1}ms, final {} / {}",
            summary.batches,
            summary.total_lines,
            summary.pages,
            summary.lines,
            summary.entry_requests,
            summary.keystrokes,
            summary.rtt_estimate_ms,
            summary.final_gesture,
            summary.final_copy_mode,
        )?;
    }
    Ok(())
}
