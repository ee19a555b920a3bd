//! Nagel–Schreckenberg traffic cellular automaton with an optional two-lane
//! lane-changing extension, plus a fundamental-diagram sampler.

pub mod lane_change;
pub mod motion;
pub mod output;
pub mod road;
pub mod sampler;
pub mod simulation;
pub mod speed;
pub mod step;

pub use road::{distance_to_next, history_to_rows, Cell, RoadState};
pub use sampler::{capacity_point, density_grid, FundamentalDiagramPoint, FundamentalDiagramSampler};
pub use simulation::{run_simulation, RunOutput, RunSummary, Simulation};
pub use step::StepOutcome;
