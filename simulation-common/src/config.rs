use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::calibration::Calibration;
use crate::sim_params::{LaneChangeOrder, LaneChangeParams, SimParams};
use std::path::{Path, PathBuf};

// Road geometry and initial occupancy
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RoadConfig {
    pub cell_length_m: f64,
    pub time_step_s: f64,
    pub sim_length_m: f64,
    #[serde(default = "default_lanes")]
    pub lanes: usize,
    pub initial_density: f64,
}

// Where v_max and p come from. Explicit values override the calibration file.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ModelConfig {
    #[serde(default)]
    pub calibration_file: Option<PathBuf>,
    #[serde(default)]
    pub v_max: Option<u32>,
    #[serde(default)]
    pub p: Option<f64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LaneChangeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_p_change")]
    pub p_change: f64,
    #[serde(default = "default_v_strat")]
    pub v_strat: f64,
    #[serde(default = "default_gap_rear")]
    pub gap_rear: u32,
    #[serde(default)]
    pub order: LaneChangeOrder,
}

impl Default for LaneChangeConfig {
    fn default() -> Self {
        LaneChangeConfig {
            enabled: true,
            p_change: default_p_change(),
            v_strat: default_v_strat(),
            gap_rear: default_gap_rear(),
            order: LaneChangeOrder::Sequential,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub steps: u32,
}

// Fundamental diagram sweep
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SweepConfig {
    #[serde(default = "default_warmup_steps")]
    pub warmup_steps: u32,
    #[serde(default = "default_measure_steps")]
    pub measure_steps: u32,
    #[serde(default)]
    pub density_start: f64,
    #[serde(default = "default_density_end")]
    pub density_end: f64,
    #[serde(default = "default_density_samples")]
    pub density_samples: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            warmup_steps: default_warmup_steps(),
            measure_steps: default_measure_steps(),
            density_start: 0.0,
            density_end: default_density_end(),
            density_samples: default_density_samples(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub seed: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_history: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default = "default_true")]
    pub save_flow: bool,
    #[serde(default)]
    pub save_heatmap: bool,
}

fn default_lanes() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_p_change() -> f64 {
    0.6
}

fn default_v_strat() -> f64 {
    1.0
}

fn default_gap_rear() -> u32 {
    2
}

fn default_warmup_steps() -> u32 {
    200
}

fn default_measure_steps() -> u32 {
    500
}

fn default_density_end() -> f64 {
    1.0
}

fn default_density_samples() -> usize {
    21
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub road: RoadConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub lane_change: LaneChangeConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    pub initial_conditions: InitialConditions,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;

        if !(config.road.cell_length_m > 0.0) {
            anyhow::bail!("cell_length_m must be positive.");
        }
        if !(config.road.time_step_s > 0.0) {
            anyhow::bail!("time_step_s must be positive.");
        }
        if config.road.sim_length_m < config.road.cell_length_m {
            anyhow::bail!("sim_length_m must cover at least one cell.");
        }
        if config.road.lanes == 0 {
            anyhow::bail!("lanes must be greater than 0.");
        }
        if config.sweep.measure_steps == 0 {
            anyhow::bail!("measure_steps must be greater than 0.");
        }
        if config.sweep.density_samples == 0 {
            anyhow::bail!("density_samples must be greater than 0.");
        }

        Ok(config)
    }

    /// Road length in whole cells (integer division of the simulated length).
    pub fn road_length_cells(&self) -> usize {
        (self.road.sim_length_m / self.road.cell_length_m).floor() as usize
    }

    /// Calibration from the configured summary file, or the defaults.
    pub fn calibration(&self) -> Calibration {
        match &self.model.calibration_file {
            Some(path) => Calibration::load_or_default(path),
            None => Calibration::default(),
        }
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self, calibration: &Calibration) -> SimParams {
        let lane_change = if self.road.lanes > 1 && self.lane_change.enabled {
            Some(LaneChangeParams {
                p_change: self.lane_change.p_change,
                v_strat: self.lane_change.v_strat,
                gap_rear: self.lane_change.gap_rear,
                order: self.lane_change.order,
            })
        } else {
            None
        };

        SimParams {
            v_max: self.model.v_max.unwrap_or(calibration.v_max),
            p: self.model.p.unwrap_or(calibration.p),
            length: self.road_length_cells(),
            n_lanes: self.road.lanes,
            initial_density: self.road.initial_density,
            lane_change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [road]
        cell_length_m = 7.5
        time_step_s = 1.6
        sim_length_m = 1000.0
        lanes = 2
        initial_density = 0.15

        [timing]
        steps = 300

        [initial_conditions]
        seed = 7

        [output]
        base_filename = "nasch"
        save_history = false
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = SimulationConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.road_length_cells(), 133);
        assert!(config.lane_change.enabled);
        assert_eq!(config.sweep.warmup_steps, 200);
        assert_eq!(config.sweep.measure_steps, 500);
        assert!(config.output.save_flow);

        let params = config.get_sim_params(&Calibration::default());
        assert_eq!(params.v_max, 10);
        assert_eq!(params.p, 0.2);
        assert_eq!(params.n_lanes, 2);
        let lc = params.lane_change.unwrap();
        assert_eq!(lc.gap_rear, 2);
        assert_eq!(lc.order, LaneChangeOrder::Sequential);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_model_overrides_calibration() {
        let text = format!("{}\n[model]\nv_max = 5\np = 0.1\n", MINIMAL);
        let config = SimulationConfig::from_toml_str(&text).unwrap();
        let params = config.get_sim_params(&Calibration { v_max: 8, p: 0.3 });
        assert_eq!(params.v_max, 5);
        assert_eq!(params.p, 0.1);
    }

    #[test]
    fn test_single_lane_has_no_lane_change() {
        let text = MINIMAL.replace("lanes = 2", "lanes = 1");
        let config = SimulationConfig::from_toml_str(&text).unwrap();
        assert!(config.get_sim_params(&Calibration::default()).lane_change.is_none());
    }

    #[test]
    fn test_shuffled_order_parses() {
        let text = format!("{}\n[lane_change]\norder = \"shuffled\"\n", MINIMAL);
        let config = SimulationConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.lane_change.order, LaneChangeOrder::Shuffled);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = SimulationConfig::from_toml_str(include_str!("../../config.toml")).unwrap();
        assert_eq!(config.road_length_cells(), 133);
        assert_eq!(config.output.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_bad_geometry_rejected() {
        let text = MINIMAL.replace("cell_length_m = 7.5", "cell_length_m = 0.0");
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }
}
