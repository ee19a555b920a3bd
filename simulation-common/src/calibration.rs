use log::{debug, warn};
use serde::Deserialize;
use std::path::Path;

/// Fallback maximum velocity (cells/step) used when no calibration is available.
pub const DEFAULT_V_MAX: u32 = 10;
/// Fallback random slowdown probability.
pub const DEFAULT_P: f64 = 0.2;

const KEY_V_MAX: &str = "V_MAX_NASCH_FINAL";
const KEY_P: &str = "P_FINAL";

/// Calibrated NaSch scalars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub v_max: u32,
    pub p: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            v_max: DEFAULT_V_MAX,
            p: DEFAULT_P,
        }
    }
}

// One row of the two-column summary file.
#[derive(Debug, Deserialize)]
struct SummaryRow {
    #[serde(rename = "Parameter")]
    parameter: String,
    #[serde(rename = "Value")]
    value: String,
}

impl Calibration {
    /// Reads a `Parameter,Value` summary file.
    ///
    /// Never fails: an unreadable file, a missing key or an unparsable value
    /// falls back to the default for that key and logs a warning.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path_ref = path.as_ref();
        let mut reader = match csv::Reader::from_path(path_ref) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(
                    "Calibration file '{}' unreadable ({}). Using defaults v_max={}, p={}.",
                    path_ref.display(),
                    e,
                    DEFAULT_V_MAX,
                    DEFAULT_P
                );
                return Calibration::default();
            }
        };

        let mut v_max = None;
        let mut p = None;
        for row in reader.deserialize::<SummaryRow>() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed calibration row in '{}': {}", path_ref.display(), e);
                    continue;
                }
            };
            match row.parameter.trim() {
                KEY_V_MAX => v_max = parse_v_max(&row.value),
                KEY_P => p = parse_probability(&row.value),
                other => debug!("Ignoring calibration key '{}'", other),
            }
        }

        let v_max = v_max.unwrap_or_else(|| {
            warn!("{} missing or invalid, defaulting to {}", KEY_V_MAX, DEFAULT_V_MAX);
            DEFAULT_V_MAX
        });
        let p = p.unwrap_or_else(|| {
            warn!("{} missing or invalid, defaulting to {}", KEY_P, DEFAULT_P);
            DEFAULT_P
        });
        Calibration { v_max, p }
    }
}

// Calibration averages are rounded up to whole cells/step.
fn parse_v_max(raw: &str) -> Option<u32> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.is_finite() && value >= 1.0 {
        Some(value.ceil() as u32)
    } else {
        None
    }
}

fn parse_probability(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    (0.0..=1.0).contains(&value).then_some(value)
}
