use crate::road::{history_to_rows, RoadState};
use crate::sampler::FundamentalDiagramPoint;
use anyhow::{Context, Result};
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serialization format for recorded history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFormat {
    Json,
    Bincode,
    MessagePack,
}

impl HistoryFormat {
    /// Parses the `output.format` setting. Unknown names fall back to JSON.
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting.unwrap_or("json") {
            "json" => HistoryFormat::Json,
            "bincode" => HistoryFormat::Bincode,
            "messagepack" => HistoryFormat::MessagePack,
            other => {
                error!("Unknown output format: {}. Using JSON instead.", other);
                HistoryFormat::Json
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            HistoryFormat::Json => "json",
            HistoryFormat::Bincode => "bin",
            HistoryFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes the full history to `<base>_history.<ext>` and returns the path.
pub fn save_history(history: &[RoadState], base_filename: &str, format: HistoryFormat) -> Result<PathBuf> {
    let filename = PathBuf::from(format!("{}_history.{}", base_filename, format.extension()));
    let file = File::create(&filename)
        .with_context(|| format!("Error creating history file '{}'", filename.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        HistoryFormat::Json => serde_json::to_writer(&mut writer, history)
            .context("Error serializing history to JSON")?,
        HistoryFormat::Bincode => bincode::serialize_into(&mut writer, history)
            .context("Error serializing history to bincode")?,
        HistoryFormat::MessagePack => rmp_serde::encode::write(&mut writer, history)
            .context("Error serializing history to MessagePack")?,
    }
    writer.flush()?;
    info!("History ({} frames) saved to {}", history.len(), filename.display());
    Ok(filename)
}

/// Writes `step,flow` rows.
pub fn save_flow_series<P: AsRef<Path>>(flow_series: &[u32], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Error creating flow file '{}'", path.display()))?;
    writer.write_record(["step", "flow"])?;
    for (step, flow) in flow_series.iter().enumerate() {
        writer.write_record([step.to_string(), flow.to_string()])?;
    }
    writer.flush()?;
    info!("Flow series saved to {}", path.display());
    Ok(())
}

/// Writes the position-vs-time matrix: one row per step and lane, `-1` for empty cells.
pub fn save_heatmap<P: AsRef<Path>>(history: &[RoadState], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Error creating heatmap file '{}'", path.display()))?;
    for row in history_to_rows(history) {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Heatmap matrix saved to {}", path.display());
    Ok(())
}

/// Writes `density,k_veh_per_km,q_veh_per_h` rows.
pub fn save_fundamental_diagram<P: AsRef<Path>>(points: &[FundamentalDiagramPoint], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Error creating fundamental diagram file '{}'", path.display()))?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    info!("Fundamental diagram ({} points) saved to {}", points.len(), path.display());
    Ok(())
}
