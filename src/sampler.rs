//! Fundamental diagram (flow vs. density) measurement.
//!
//! Each density gets a fresh road and its own RNG, runs a warm-up phase whose
//! flow is discarded so the random initial placement can relax, then a
//! measurement phase whose boundary crossings are converted to vehicles/hour.
//! Samples are independent and are spread across the rayon thread pool.

use crate::simulation::Simulation;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use simulation_common::{check_probability, SimError, SimParams};

pub const DEFAULT_WARMUP_STEPS: u32 = 200;
pub const DEFAULT_MEASURE_STEPS: u32 = 500;

const SECONDS_PER_HOUR: f64 = 3600.0;
const METERS_PER_KM: f64 = 1000.0;

/// One point of the fundamental diagram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundamentalDiagramPoint {
    /// Initial occupancy probability the point was sampled at.
    pub density: f64,
    /// Density in vehicles/km.
    pub k_veh_per_km: f64,
    /// Flow in vehicles/hour.
    pub q_veh_per_h: f64,
}

/// Vehicles crossing the boundary over `steps` steps, as vehicles/hour.
pub fn flow_per_hour(vehicles: u64, steps: u32, time_step_s: f64) -> f64 {
    if steps == 0 {
        return 0.0;
    }
    vehicles as f64 / (steps as f64 * time_step_s) * SECONDS_PER_HOUR
}

/// Occupancy probability per cell as vehicles/km.
pub fn density_per_km(density: f64, cell_length_m: f64) -> f64 {
    density / cell_length_m * METERS_PER_KM
}

/// `samples` evenly spaced values from `start` to `end`, both included.
pub fn density_grid(start: f64, end: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| if i == n - 1 { end } else { start + step * i as f64 }).collect()
        }
    }
}

/// Runs the density sweep.
#[derive(Debug, Clone)]
pub struct FundamentalDiagramSampler {
    /// Template for every sample; `initial_density` is replaced per sample.
    pub params: SimParams,
    pub cell_length_m: f64,
    pub time_step_s: f64,
    pub warmup_steps: u32,
    pub measure_steps: u32,
    /// Sample `i` is seeded with `seed + i`.
    pub seed: u64,
}

impl FundamentalDiagramSampler {
    pub fn new(params: SimParams, cell_length_m: f64, time_step_s: f64) -> Self {
        FundamentalDiagramSampler {
            params,
            cell_length_m,
            time_step_s,
            warmup_steps: DEFAULT_WARMUP_STEPS,
            measure_steps: DEFAULT_MEASURE_STEPS,
            seed: 0,
        }
    }

    pub fn with_phases(mut self, warmup_steps: u32, measure_steps: u32) -> Self {
        self.warmup_steps = warmup_steps;
        self.measure_steps = measure_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self, densities: &[f64]) -> Result<(), SimError> {
        if !(self.cell_length_m.is_finite() && self.cell_length_m > 0.0) {
            return Err(SimError::invalid(format!(
                "cell_length_m must be positive, got {}",
                self.cell_length_m
            )));
        }
        if !(self.time_step_s.is_finite() && self.time_step_s > 0.0) {
            return Err(SimError::invalid(format!(
                "time_step_s must be positive, got {}",
                self.time_step_s
            )));
        }
        if self.measure_steps == 0 {
            return Err(SimError::invalid("measure_steps must be positive"));
        }
        for &density in densities {
            check_probability("density", density)?;
        }
        self.params.validate()
    }

    /// One (K, Q) point per density, in input order.
    pub fn sample(&self, densities: &[f64]) -> Result<Vec<FundamentalDiagramPoint>, SimError> {
        self.validate(densities)?;
        densities
            .par_iter()
            .enumerate()
            .map(|(index, &density)| self.sample_one(index, density))
            .collect()
    }

    /// Measures a single density. `index` selects the RNG stream.
    pub fn sample_one(&self, index: usize, density: f64) -> Result<FundamentalDiagramPoint, SimError> {
        let params = self.params.with_density(density);
        let rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
        let mut sim = Simulation::new(params, rng)?.record_history(false);

        if density > 0.0 && sim.road().vehicle_count() == 0 {
            warn!("Density {:.3} placed no vehicles; flow will be zero.", density);
        }

        sim.run(self.warmup_steps + self.measure_steps);
        let measured: u64 = sim.flow_series()[self.warmup_steps as usize..]
            .iter()
            .map(|&f| f as u64)
            .sum();

        let point = FundamentalDiagramPoint {
            density,
            k_veh_per_km: density_per_km(density, self.cell_length_m),
            q_veh_per_h: flow_per_hour(measured, self.measure_steps, self.time_step_s),
        };
        debug!(
            "Sample {}: density={:.3} K={:.1} veh/km Q={:.1} veh/h",
            index, density, point.k_veh_per_km, point.q_veh_per_h
        );
        Ok(point)
    }
}

/// The point with the highest flow (the road's capacity), if any.
pub fn capacity_point(points: &[FundamentalDiagramPoint]) -> Option<FundamentalDiagramPoint> {
    points
        .iter()
        .copied()
        .max_by(|a, b| a.q_veh_per_h.total_cmp(&b.q_veh_per_h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> FundamentalDiagramSampler {
        FundamentalDiagramSampler::new(SimParams::single_lane(5, 0.1, 100, 0.0), 7.5, 1.0).with_seed(2024)
    }

    #[test]
    fn test_unit_conversions() {
        assert!((density_per_km(0.15, 7.5) - 20.0).abs() < 1e-9);
        assert!((flow_per_hour(800, 500, 1.6) - 3600.0).abs() < 1e-9);
        assert_eq!(flow_per_hour(10, 0, 1.0), 0.0);
    }

    #[test]
    fn test_density_grid() {
        let grid = density_grid(0.0, 1.0, 11);
        assert_eq!(grid.len(), 11);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[10], 1.0);
        assert!((grid[3] - 0.3).abs() < 1e-12);
        assert_eq!(density_grid(0.2, 0.8, 1), vec![0.2]);
        assert!(density_grid(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_fundamental_diagram_is_unimodal() {
        let densities = density_grid(0.0, 1.0, 11);
        let points = sampler().sample(&densities).unwrap();
        assert_eq!(points.len(), 11);

        // Empty road and gridlock carry nothing.
        assert_eq!(points[0].q_veh_per_h, 0.0);
        assert_eq!(points[10].q_veh_per_h, 0.0);

        let peak = capacity_point(&points).unwrap();
        assert!(peak.density > 0.0 && peak.density < 1.0);
        assert!(peak.q_veh_per_h > 0.0);

        // Free-flow branch carries more than the congested branch.
        assert!(points[1].q_veh_per_h > points[9].q_veh_per_h);
        assert!(points[2].q_veh_per_h > points[8].q_veh_per_h);

        for (point, density) in points.iter().zip(&densities) {
            assert_eq!(point.density, *density);
            assert!((point.k_veh_per_km - density / 7.5 * 1000.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_parallel_sweep_matches_single_samples() {
        let s = sampler().with_phases(20, 50);
        let densities = [0.1, 0.4, 0.7];
        let points = s.sample(&densities).unwrap();
        for (i, &d) in densities.iter().enumerate() {
            assert_eq!(points[i], s.sample_one(i, d).unwrap());
        }
        assert_eq!(points, s.sample(&densities).unwrap());
    }

    #[test]
    fn test_rejects_bad_sweep() {
        assert!(sampler().sample(&[0.2, 1.3]).is_err());
        assert!(sampler().with_phases(10, 0).sample(&[0.2]).is_err());
        let mut bad = sampler();
        bad.cell_length_m = 0.0;
        assert!(bad.sample(&[0.2]).is_err());
    }
}
