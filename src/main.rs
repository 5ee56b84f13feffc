use anyhow::{Context, Result};
use chemotaxis_common::SimulationConfig;
use chemotaxis_engine::events::LogObserver;
use chemotaxis_engine::output::{save_final_positions, save_snapshots};
use chemotaxis_engine::{RunState, SimulationBuilder, SimulationRunner};
use clap::Parser;
use log::{debug, error, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Runs a chemotactic cell simulation described by a TOML configuration.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the simulation configuration.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `output.base_filename`.
    #[arg(short, long)]
    output: Option<String>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Chemotaxis Engine...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(base) = args.output {
        config.output.base_filename = base;
    }
    info!("Using {} Rayon threads.", rayon::current_num_threads());
    debug!("Run parameters: {:#?}", config.get_run_params());

    // --- Initialize Simulation ---
    let sim = SimulationBuilder::new(config)
        .observer(Box::new(LogObserver))
        .build()
        .context("initialising simulation")?;
    info!("Initialized with {} cells.", sim.cells().len());

    // --- Simulation Loop (dedicated thread) ---
    let start_time = Instant::now();
    let handle = SimulationRunner::spawn(sim)?;
    let print_interval = Duration::from_secs(5);
    let mut previous_print_time = start_time;
    while !handle.is_finished() {
        std::thread::sleep(Duration::from_millis(50));
        if previous_print_time.elapsed() >= print_interval {
            let (done, total) = handle.progress();
            info!(
                "Step [{}/{}] | State: {:?} | Elapsed: {:.2} s",
                done,
                total,
                handle.state(),
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = Instant::now();
        }
    }

    let sim = match handle.join() {
        Ok(sim) => sim,
        Err(e) => {
            error!("Simulation aborted: {}", e);
            return Err(e.into());
        }
    };
    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({} steps, {:.2} simulated minutes, {} cells).",
        total_duration.as_secs_f64(),
        sim.tick_count(),
        sim.time(),
        sim.cells().len()
    );
    if sim.state() != RunState::Closed {
        error!("Unexpected final state {:?}.", sim.state());
    }

    // --- Save Recorded Data ---
    let output = &sim.config().output;
    if output.save_stats {
        let format = output.format.as_deref().unwrap_or("json");
        if let Err(e) = save_snapshots(sim.get_recorded_snapshots(), &output.base_filename, format) {
            error!("Error saving snapshots: {:#}", e);
        }
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if output.save_positions {
        if let Err(e) = save_final_positions(sim.cells(), &output.base_filename) {
            error!("Error saving final positions: {:#}", e);
        }
    } else {
        info!("Skipping saving final positions as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}
