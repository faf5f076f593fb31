//! tracer-runner: headless runner for the point advection core.
//!
//! Usage:
//!   tracer-runner run.json
//!   tracer-runner run.json --db out.db --seed 7 --summary-json summary.json

use anyhow::{Context, Result};
use std::env;
use tracer_core::{
    config::{format_hms, SimConfig},
    engine::{RunSummary, SimEngine},
    met_field::HorizontalGrid,
    met_source::{MetSourceKind, UniformWindSource},
    store::SimStore,
};

#[derive(serde::Serialize)]
struct SummaryReport {
    run_id:     String,
    met_source: String,
    started_at: chrono::DateTime<chrono::Utc>,
    end_time:   chrono::DateTime<chrono::Utc>,
    steps:      u64,
    spawned:    u64,
    alive:      usize,
    flushes:    u64,
    /// Seconds of wall-clock time per phase.
    phases:     Vec<(String, f64)>,
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(config_path) = args.get(1).filter(|a| !a.starts_with("--")) else {
        eprintln!("usage: tracer-runner <config.json> [--db PATH] [--seed N] [--summary-json PATH]");
        std::process::exit(2);
    };

    let mut config = SimConfig::load(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    if let Some(seed) = find_arg(&args, "--seed") {
        config.seed = seed.parse().context("--seed expects an unsigned integer")?;
    }
    let db = find_arg(&args, "--db").unwrap_or(config.input_output.output_db.as_str()).to_string();

    let default_level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let kind = config.met_source_kind()?;
    let source = match &config.synthetic_met {
        Some(synthetic) => synthetic.build(kind),
        None => calm_source(kind),
    };

    println!("tracer-runner");
    println!("  config:     {config_path}");
    println!("  met source: {}", kind.label());
    println!("  period:     {} .. {}", config.timing.start_date, config.timing.end_date);
    println!("  output:     every {} to {db}", format_hms(config.dt_output_seconds()?));
    println!("  seed:       {}", config.seed);
    println!();

    let started_at = chrono::Utc::now();
    let store = SimStore::open(&db)?;
    store.migrate()?;
    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    store.insert_run(&run_id, config.seed, env!("CARGO_PKG_VERSION"))?;

    let mut engine = SimEngine::build(run_id.clone(), &config, store, Box::new(source))?;
    let summary = engine.run().with_context(|| format!("run {run_id} failed"))?;
    print_summary(&summary);

    if let Some(path) = find_arg(&args, "--summary-json") {
        let report = SummaryReport {
            run_id:     summary.run_id.clone(),
            met_source: kind.label().to_string(),
            started_at,
            end_time:   summary.end_time,
            steps:      summary.steps,
            spawned:    summary.spawned,
            alive:      summary.alive,
            flushes:    summary.flushes,
            phases:     summary
                .phases
                .iter()
                .map(|(name, d)| (name.to_string(), d.as_secs_f64()))
                .collect(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing summary to {path}"))?;
        log::info!("summary written to {path}");
    }
    Ok(())
}

/// Calm global field at 1° spacing on the reanalysis' native cadence.
fn calm_source(kind: MetSourceKind) -> UniformWindSource {
    log::warn!("no synthetic_met block; running with calm winds");
    UniformWindSource::calm(HorizontalGrid::global(1.0, 1.0)).with_interval(kind.native_interval())
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn print_summary(summary: &RunSummary) {
    println!("Run complete.");
    println!("  run id:     {}", summary.run_id);
    println!("  steps:      {}", summary.steps);
    println!("  ended at:   {}", summary.end_time);
    println!("  points:     {} spawned, {} alive", summary.spawned, summary.alive);
    println!("  flushes:    {}", summary.flushes);
    println!();
    println!("Timing:");
    for (phase, elapsed) in &summary.phases {
        println!("  {phase:<14} {:>10.3} s", elapsed.as_secs_f64());
    }
}
