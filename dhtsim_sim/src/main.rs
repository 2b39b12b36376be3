//! dhtsim CLI
//!
//! Run the cell scenarios deterministically, one or many seeds at a time.

use anyhow::{bail, Context};
use clap::Parser;
use dhtsim_sim::scenarios::ScenarioId;
use dhtsim_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// dhtsim deterministic scenario CLI
#[derive(Parser, Debug)]
#[command(name = "dhtsim")]
#[command(about = "Run deterministic cell workflow scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of agents (cells) per scenario
    #[arg(short, long, default_value = "4")]
    agents: usize,

    /// Scenario to run (create_entry, peer_delete, missing_link_target,
    /// unauthorized_call, bad_agent_publish, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// How many agents hold each op
    #[arg(short, long, default_value = "3")]
    redundancy: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export chains and op ledgers of a single scenario run to a JSON file
    #[arg(long)]
    export: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if !args.json {
        info!("dhtsim v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        let scenario = args.scenario.parse::<ScenarioId>().map_err(anyhow::Error::msg).with_context(|| {
            let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
            format!("available scenarios: {}, all", names.join(", "))
        })?;
        vec![scenario]
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("system clock is before the Unix epoch")?
            .as_nanos() as u64
    } else {
        args.seed
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 || args.seeds > 1 {
            bail!("--export only supports a single scenario and seed");
        }
        let runner = ScenarioRunner::new(base_seed, args.agents).with_redundancy(args.redundancy);
        let (result, export) = runner.run_with_export(scenarios[0]).await;
        export
            .write_to_file(export_path)
            .with_context(|| format!("failed to write export to {}", export_path))?;
        info!(
            "Exported {} agents to {}",
            export.agents.len(),
            export_path
        );
        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed, args.agents).with_redundancy(args.redundancy);

        for scenario in &scenarios {
            let result = runner.run(*scenario).await;
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("All {} scenario runs passed", total);
        } else {
            error!("{}/{} scenario runs failed", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | calls={} integrated={} rejected={}",
            result.scenario.name(),
            result.seed,
            result.metrics.zome_calls,
            result.metrics.integrated_ops,
            result.metrics.rejected_ops
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
