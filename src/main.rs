use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use log::{info, debug, trace};

use nasch_engine::output::{self, HistoryFormat};
use nasch_engine::sampler::{capacity_point, density_grid, FundamentalDiagramSampler};
use nasch_engine::Simulation;
use simulation_common::SimulationConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Nagel-Schreckenberg traffic simulation")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one simulation and export history, flow and heatmap
    Run,
    /// Sweep densities and export the fundamental diagram
    Sweep,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting NaSch engine...");

    // --- Load Configuration ---
    let config = SimulationConfig::load(&args.config)?;
    info!("Loaded configuration from {}", args.config.display());

    let calibration = config.calibration();
    let params = config.get_sim_params(&calibration);
    params.validate()?;
    info!(
        "Road: {} cells x {} lanes, v_max={}, p={:.3}, lane changing {}",
        params.length,
        params.n_lanes,
        params.v_max,
        params.p,
        if params.lane_change.is_some() { "on" } else { "off" }
    );
    debug!("Simulation Parameters: {:#?}", params);

    match args.command {
        Command::Run => run(&config, params),
        Command::Sweep => sweep(&config, params),
    }
}

fn run(config: &SimulationConfig, params: simulation_common::SimParams) -> Result<()> {
    let total_steps = config.timing.steps;
    let mut sim = Simulation::from_seed(params, config.initial_conditions.seed)?
        .record_history(config.output.save_history || config.output.save_heatmap);
    info!("Initial road holds {} vehicles.", sim.road().vehicle_count());

    info!("Starting simulation loop for {} steps...", total_steps);
    let start_time = Instant::now();
    for step in 0..total_steps {
        let outcome = sim.step();
        trace!(
            "Step [{}/{}] flow={} lane_changes={}",
            step + 1,
            total_steps,
            outcome.flow,
            outcome.lane_changes
        );
    }
    let total_duration = start_time.elapsed();
    info!("Simulation finished in {:.3} seconds.", total_duration.as_secs_f64());

    let summary = sim.summary(config.road.time_step_s);
    info!(
        "Mean flow: {:.3} veh/step ({:.1} veh/h) | Vehicles: {} | Lane changes: {} | Final mean velocity: {}",
        summary.mean_flow_per_step,
        summary.flow_veh_per_h,
        summary.vehicles,
        summary.total_lane_changes,
        summary
            .mean_velocity
            .map_or_else(|| "n/a".to_string(), |v| format!("{:.2} cells/step", v))
    );

    // --- Save Recorded Data ---
    let base = &config.output.base_filename;
    let run_output = sim.into_output();
    if config.output.save_history {
        let format = HistoryFormat::from_setting(config.output.format.as_deref());
        output::save_history(&run_output.history, base, format)?;
    } else {
        info!("Skipping saving history as per config (save_history is false).");
    }
    if config.output.save_flow {
        output::save_flow_series(&run_output.flow_series, format!("{}_flow.csv", base))?;
    }
    if config.output.save_heatmap {
        output::save_heatmap(&run_output.history, format!("{}_heatmap.csv", base))?;
    }

    info!("Simulation Complete.");
    Ok(())
}

fn sweep(config: &SimulationConfig, params: simulation_common::SimParams) -> Result<()> {
    let sweep = &config.sweep;
    let densities = density_grid(sweep.density_start, sweep.density_end, sweep.density_samples);
    let sampler = FundamentalDiagramSampler::new(params, config.road.cell_length_m, config.road.time_step_s)
        .with_phases(sweep.warmup_steps, sweep.measure_steps)
        .with_seed(config.initial_conditions.seed);

    info!("Using {} Rayon threads.", rayon::current_num_threads());
    info!(
        "Sampling {} densities in [{:.3}, {:.3}] ({} warm-up + {} measured steps each)...",
        densities.len(),
        sweep.density_start,
        sweep.density_end,
        sweep.warmup_steps,
        sweep.measure_steps
    );
    let start_time = Instant::now();
    let points = sampler.sample(&densities)?;
    info!("Sweep finished in {:.3} seconds.", start_time.elapsed().as_secs_f64());

    if let Some(peak) = capacity_point(&points) {
        info!(
            "Capacity: Q={:.1} veh/h at K={:.1} veh/km (density {:.3})",
            peak.q_veh_per_h, peak.k_veh_per_km, peak.density
        );
    }

    output::save_fundamental_diagram(&points, format!("{}_fundamental_diagram.csv", config.output.base_filename))?;
    info!("Sweep Complete.");
    Ok(())
}
