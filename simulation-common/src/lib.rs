pub mod calibration;
pub mod config;
pub mod error;
pub mod sim_params;

// Re-export key types for easier use by dependent crates
pub use calibration::{Calibration, DEFAULT_P, DEFAULT_V_MAX};
pub use config::{SimulationConfig, RoadConfig, ModelConfig, LaneChangeConfig, TimingConfig, SweepConfig, InitialConditions, OutputConfig};
pub use error::SimError;
pub use sim_params::{check_probability, LaneChangeOrder, LaneChangeParams, SimParams};
