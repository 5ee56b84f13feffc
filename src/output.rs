//! File outputs: the CSV position log observer, snapshot files and final positions.

use crate::cell::Cell;
use crate::error::{SimError, SimResult};
use crate::events::{PositionRecord, SimulationObserver};
use anyhow::{Context, Result};
use chemotaxis_common::Snapshot;
use log::{error, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Appends `time,cell_type,id,x,y,mean_weighted_activity` rows on every write-to-file
/// notification. A write failure disables the log for the rest of the run.
pub struct PositionLog {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    rows: u64,
}

impl PositionLog {
    pub fn create<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| SimError::Io { path: path.clone(), source })?;
        info!("Position log: {}", path.display());
        Ok(Self { path, writer: Some(csv::Writer::from_writer(file)), rows: 0 })
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn disable(&mut self, err: csv::Error) {
        error!("Error writing position log '{}': {}. Logging disabled.", self.path.display(), err);
        self.writer = None;
    }
}

impl SimulationObserver for PositionLog {
    fn write_to_file(&mut self, _time: f32, records: &[PositionRecord]) -> SimResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let result = records
            .iter()
            .try_for_each(|record| writer.serialize(record))
            .and_then(|()| writer.flush().map_err(csv::Error::from));
        match result {
            Ok(()) => self.rows += records.len() as u64,
            Err(e) => self.disable(e),
        }
        Ok(())
    }

    fn closed(&mut self, _time: f32) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                error!("Error flushing position log '{}': {}", self.path.display(), e);
            }
            info!("Position log closed after {} rows.", self.rows);
        }
    }
}

/// Saves the recorded snapshots as `{base}_snapshots.{json|bin|msgpack}`. Unknown formats fall
/// back to JSON.
pub fn save_snapshots(snapshots: &[Snapshot], base_filename: &str, format: &str) -> Result<PathBuf> {
    let (format, extension) = match format {
        "json" => ("json", "json"),
        "bincode" => ("bincode", "bin"),
        "messagepack" => ("messagepack", "msgpack"),
        other => {
            error!("Unknown output format: {}. Using JSON instead.", other);
            ("json", "json")
        }
    };
    let path = PathBuf::from(format!("{}_snapshots.{}", base_filename, extension));
    let file = File::create(&path).with_context(|| format!("creating snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        "bincode" => bincode::serialize_into(&mut writer, snapshots).context("serializing snapshots to bincode")?,
        "messagepack" => {
            rmp_serde::encode::write(&mut writer, snapshots).context("serializing snapshots to MessagePack")?
        }
        _ => serde_json::to_writer(&mut writer, snapshots).context("serializing snapshots to JSON")?,
    }
    std::io::Write::flush(&mut writer).with_context(|| format!("writing '{}'", path.display()))?;
    info!("{} snapshots saved to {} ({} format)", snapshots.len(), path.display(), format);
    Ok(path)
}

/// Writes `{base}_final_positions.csv` with one row per live cell.
pub fn save_final_positions(cells: &[Cell], base_filename: &str) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_final_positions.csv", base_filename));
    let mut writer =
        csv::Writer::from_path(&path).with_context(|| format!("creating '{}'", path.display()))?;
    writer.write_record(["id", "cell_type", "x_um", "y_um"])?;
    for cell in cells {
        writer.write_record(&[
            cell.id().0.to_string(),
            cell.cell_type().to_string(),
            format!("{:.4}", cell.position.x),
            format!("{:.4}", cell.position.y),
        ])?;
    }
    writer.flush()?;
    info!("Final positions saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64) -> PositionRecord {
        PositionRecord {
            time: 0.5,
            cell_type: "amoeba".into(),
            id,
            x: 1.0,
            y: 2.0,
            mean_weighted_activity: 0.25,
        }
    }

    #[test]
    fn position_log_writes_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.csv");
        let mut log = PositionLog::create(&path).expect("log");
        log.write_to_file(0.5, &[record(1), record(2)]).unwrap();
        log.closed(0.5);
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("time,cell_type,id,x,y,mean_weighted_activity"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn unopenable_log_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = PositionLog::create(dir.path().join("missing").join("log.csv")).err().expect("error");
        assert!(matches!(err, SimError::Io { .. }));
    }

    #[test]
    fn snapshots_round_trip_through_each_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("run");
        let base = base.to_str().unwrap();
        let snapshots = vec![Snapshot {
            time: 1.0,
            cell_count: 3,
            mean_concentrations: vec![0.5, 0.25],
            positions: None,
        }];

        let json = save_snapshots(&snapshots, base, "json").unwrap();
        let back: Vec<Snapshot> = serde_json::from_reader(File::open(json).unwrap()).unwrap();
        assert_eq!(back[0].cell_count, 3);

        let bin = save_snapshots(&snapshots, base, "bincode").unwrap();
        assert!(std::fs::metadata(&bin).unwrap().len() > 0);

        let msgpack = save_snapshots(&snapshots, base, "messagepack").unwrap();
        assert!(msgpack.extension().is_some_and(|e| e == "msgpack"));

        let fallback = save_snapshots(&snapshots, base, "yaml").unwrap();
        assert!(fallback.to_str().unwrap().ends_with("_snapshots.json"));
    }
}
