//! L1 Muon Simulator CLI
//!
//! Run deterministic event scenarios, or replay recorded events, through the
//! aggregation engine.

use clap::Parser;
use l1mu_core::{AnalyzerConfig, EventProcessor};
use l1mu_env::JsonLinesReader;
use l1mu_sim::invariants;
use l1mu_sim::scenarios::ScenarioId;
use l1mu_sim::{write_events, ScenarioResult, ScenarioRunner, SimExport};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Replays a JSON-lines event file through the engine.
fn run_replay(input: &str, config: AnalyzerConfig, export_path: Option<&str>, json: bool) -> bool {
    let reader = match JsonLinesReader::open(input) {
        Ok(reader) => reader,
        Err(e) => {
            error!("Cannot open {}: {}", input, e);
            return false;
        }
    };

    let processor = EventProcessor::new(config.clone());
    let mut export = SimExport::new(input, 0).with_config(config);
    let mut unreadable = 0;
    let mut violations = 0;

    for event in reader {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping event: {}", e);
                unreadable += 1;
                continue;
            }
        };
        let output = processor.process(&event);
        for v in invariants::check_all(&processor, &event, &output) {
            error!("Event {}: {}", event.id, v);
            violations += 1;
        }
        export.add_event(output);
    }

    let passed = violations == 0;
    export.finalize(
        passed,
        (!passed).then(|| format!("{} invariant violation(s)", violations)),
    );

    if json {
        match serde_json::to_string_pretty(&export.summary) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        let s = &export.summary;
        info!("Replayed {} events ({} unreadable)", s.events, unreadable);
        info!("  links: {} resolved, {} unresolved", s.resolved_links, s.unresolved_links);
        for (label, tally) in &s.comparisons {
            info!(
                "  {}: {} compared, {} skipped, {:?}",
                label, tally.compared, tally.skipped, tally.records
            );
        }
        for (computation, n) in &s.aborted {
            warn!("  {} aborted in {} events", computation, n);
        }
    }

    if let Some(path) = export_path {
        if let Err(e) = export.write_to_file(path) {
            error!("Failed to write export: {:?}", e);
        } else {
            info!("Exported {} events to {}", export.events.len(), path);
        }
    }

    passed
}

/// L1 Muon Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "l1mu-sim")]
#[command(about = "Run deterministic event scenarios through the L1 muon aggregation engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Events generated per scenario
    #[arg(short, long, default_value = "20")]
    events: usize,

    /// Scenario to run (single_muon, dimuon, multi_bx, punch_through, ..., all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of random seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Analyzer configuration (JSON); defaults apply to missing fields
    #[arg(short, long)]
    config: Option<String>,

    /// Replay a JSON-lines event file instead of generating events
    #[arg(short, long)]
    input: Option<String>,

    /// Write the generated events of a single scenario as JSON lines
    #[arg(long)]
    dump_events: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-event outputs and the run summary to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("L1 Muon Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = match &args.config {
        Some(path) => AnalyzerConfig::from_json_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => AnalyzerConfig::default(),
    };

    // Replay mode
    if let Some(input) = &args.input {
        if !run_replay(input, config, args.export.as_deref(), args.json) {
            std::process::exit(1);
        }
        return;
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, all", names.join(", "));
            std::process::exit(1);
        })]
    };

    if (args.export.is_some() || args.dump_events.is_some()) && (scenarios.len() > 1 || args.seeds > 1) {
        eprintln!("Error: --export and --dump-events only support a single scenario and seed");
        std::process::exit(1);
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed)
            .with_events(args.events)
            .with_config(config.clone());

        for scenario in &scenarios {
            if let Some(path) = &args.dump_events {
                let (_, events) = runner.events_for(*scenario);
                match write_events(path, &events) {
                    Ok(()) => info!("Wrote {} events to {}", events.len(), path),
                    Err(e) => error!("Failed to write events: {}", e),
                }
            }

            let run = runner.run_detailed(*scenario);
            let result = run.result;

            if let Some(path) = &args.export {
                let mut export = SimExport::new(scenario.name(), seed).with_config(config.clone());
                for output in run.outputs {
                    export.add_event(output);
                }
                export.finalize(result.passed, result.failure_reason.clone());
                if let Err(e) = export.write_to_file(path) {
                    error!("Failed to write export: {:?}", e);
                } else {
                    info!("Exported {} events to {}", export.events.len(), path);
                }
            }

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                    debug!("  {:?}", result.metrics);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "events": r.events,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("All {} scenario runs passed", total);
        } else {
            error!("{}/{} scenario runs failed", failed_count, total);

            // List failed seeds
            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
