use std::{
  fs::File,
  io::{self, BufReader, Write},
  path::PathBuf,
  sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use heapprof::{Event, Profiler, RecordingHost, Snapshot, SnapshotDelta};
use tracing_subscriber::EnvFilter;

/// Replay a recorded profiling trace through the heap profiler.
#[derive(Parser)]
#[command(name = "heapprof-replay")]
#[command(version)]
struct Cli {
  /// Newline-delimited JSON events
  trace: PathBuf,

  /// Agent option string, e.g. `format=text,log=/tmp/heap.txt`
  #[arg(short, long, default_value = "")]
  options: String,

  /// Print per-site growth between the last two collections
  #[arg(long)]
  delta: bool,

  /// Print JSON instead of fixed-width rows
  #[arg(long)]
  json: bool,

  /// Verbose output
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter)),
    )
    .with_writer(io::stderr)
    .init();

  let host = Arc::new(RecordingHost::new());
  let profiler = Profiler::from_options(&cli.options, host.clone())
    .context("failed to start profiler")?;

  let trace = File::open(&cli.trace)
    .with_context(|| format!("failed to open {}", cli.trace.display()))?;
  let events = serde_json::Deserializer::from_reader(BufReader::new(trace))
    .into_iter::<Event>();

  let mut applied = 0usize;
  for event in events {
    let event =
      event.with_context(|| format!("malformed event after #{applied}"))?;
    host.observe(&event);

    let name = event.name();
    profiler
      .handle(event)
      .with_context(|| format!("event #{applied} ({name}) failed"))?;
    applied += 1;
  }

  tracing::info!(
    events = applied,
    collections = profiler.gc_cycles(),
    replays = host.requests(),
    "trace replayed"
  );

  let stdout = io::stdout();
  let mut out = stdout.lock();

  let snapshot = profiler.snapshot();
  if cli.json {
    snapshot.export_json(&mut out)?;
    writeln!(out)?;
  } else {
    print_snapshot(&mut out, &snapshot)?;
  }

  if cli.delta {
    match profiler.last_delta() {
      Some(delta) if cli.json => {
        delta.export_json(&mut out)?;
        writeln!(out)?;
      }
      Some(delta) => print_delta(&mut out, &delta)?,
      None => writeln!(out, "fewer than two collections; no delta")?,
    }
  }

  Ok(())
}

fn print_snapshot(out: &mut impl Write, snapshot: &Snapshot) -> Result<()> {
  writeln!(
    out,
    "=== {} sites, {} objects, {} bytes live ===",
    snapshot.records().len(),
    snapshot.total_live_count(),
    snapshot.total_live_bytes()
  )?;
  snapshot.write_fixed_width(&mut *out)?;
  Ok(())
}

fn print_delta(out: &mut impl Write, delta: &SnapshotDelta) -> Result<()> {
  writeln!(out, "=== growth since previous collection ===")?;
  for record in delta.records() {
    writeln!(
      out,
      "{:<45} {:<61} {:>+8} {:>+12}",
      record.class, record.site, record.count_delta, record.bytes_delta
    )?;
  }
  Ok(())
}
