//! Operator entry point: drive a scenario headless for a fixed number of
//! ticks and print a summary, or start the HTTP/SSE server (spec
//! SPEC_FULL §0 "cli").

use clap::{Parser, Subcommand};
use credit_sim_engine::models::owner::OwnerId;
use credit_sim_engine::models::run::{Run, RunMode};
use credit_sim_engine::models::scenario::Scenario;
use credit_sim_engine::orchestrator::{Orchestrator, OrchestratorConfig};
use credit_sim_server::{AppConfig, AppState};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "credit-sim", about = "Credit network simulator operator tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scenario file headless for a fixed number of ticks and
    /// print a summary to stdout.
    Run {
        /// Path to a JSON scenario file (see `engine::models::scenario::Scenario`).
        scenario: PathBuf,
        /// Number of ticks to run before stopping.
        #[clap(long, default_value_t = 100)]
        ticks: u64,
        /// Deterministic RNG seed (spec §4.3 "Determinism contract").
        #[clap(long, default_value_t = 1)]
        seed: u64,
        /// Intensity percent, 0-100 (spec §4.2 "actions_budget").
        #[clap(long, default_value_t = 100)]
        intensity: i32,
        /// Print every event body as it is emitted, not just the final summary.
        #[clap(long)]
        verbose: bool,
    },
    /// Start the HTTP/SSE server (same binary as `credit-sim-server`,
    /// provided here for a single operator entry point).
    Serve,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "credit_sim_cli=info,credit_sim_engine=info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            scenario,
            ticks,
            seed,
            intensity,
            verbose,
        } => run_headless(scenario, ticks, seed, intensity, verbose),
        Command::Serve => serve().await,
    }
}

fn run_headless(scenario_path: PathBuf, ticks: u64, seed: u64, intensity: i32, verbose: bool) {
    let raw = std::fs::read_to_string(&scenario_path).unwrap_or_else(|e| {
        tracing::error!(path = %scenario_path.display(), error = %e, "failed to read scenario file");
        std::process::exit(1);
    });
    let scenario: Scenario = serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to parse scenario file");
        std::process::exit(1);
    });

    let owner_id = OwnerId::cli("operator");
    let run = Run::new(
        format!("run-{seed}"),
        scenario.scenario_id.clone(),
        RunMode::Real,
        seed,
        owner_id,
        intensity,
    );
    let mut orchestrator = Orchestrator::new(run, scenario, OrchestratorConfig::default());

    let mut cleared_cycles_total = 0u64;

    for _ in 0..ticks {
        let outcome = orchestrator.tick();
        for event in &outcome.events {
            if verbose {
                println!("{}", serde_json::to_string(event).unwrap_or_default());
            }
            if let credit_sim_engine::models::event::EventBody::ClearingDone { cleared_cycles, .. } = event {
                cleared_cycles_total += cleared_cycles;
            }
        }
        if outcome.terminal {
            break;
        }
    }

    let run = &orchestrator.run;
    let committed_total = run.counters.committed_total;
    let rejected_total = run.counters.rejected_total;
    let errors_total = run.counters.errors_total;

    println!("run_id={} state={:?} tick_index={}", run.run_id, run.state, run.tick_index);
    println!(
        "committed={committed_total} rejected={rejected_total} errors={errors_total} cleared_cycles={cleared_cycles_total}"
    );
}

async fn serve() {
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "refusing to start with invalid configuration");
        std::process::exit(1);
    });
    let bind_addr = config.bind_addr;
    let state = AppState::new(config);
    let app = credit_sim_server::build_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));
    tracing::info!(bind_addr = %bind_addr, "starting simulator server");
    axum::serve(listener, app).await.expect("server error");
}
