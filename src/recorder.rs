// src/recorder.rs
//! CSV export of a leakage run: a `Leakage Current,Time` header followed by
//! one `value,time` row per sample.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::drivers::{BenchError, SampleSeries};
use crate::types::LeakageSample;

pub const CURRENT_HEADER: &str = "Leakage Current";
pub const TIME_HEADER: &str = "Time";

/// Leakage values (mA) and their timestamps (s), as stored on disk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LeakageTable {
    pub currents_ma: Vec<f64>,
    pub times_s: Vec<f64>,
}

impl From<&SampleSeries> for LeakageTable {
    fn from(series: &SampleSeries) -> Self {
        Self {
            currents_ma: series.measured(),
            times_s: series.times(),
        }
    }
}

impl LeakageTable {
    /// The file has no reference column, so each reference mirrors its
    /// measured value.
    pub fn into_series(self) -> SampleSeries {
        self.times_s
            .into_iter()
            .zip(self.currents_ma)
            .map(|(time, current)| LeakageSample::new(time, current, current))
            .collect()
    }
}

/// Writes `series` to `path`, replacing any existing file.
pub fn write_csv(path: &Path, series: &SampleSeries) -> Result<(), BenchError> {
    let table = LeakageTable::from(series);
    write_columns(path, &table.currents_ma, &table.times_s)
}

pub fn write_columns(path: &Path, currents_ma: &[f64], times_s: &[f64]) -> Result<(), BenchError> {
    if currents_ma.len() != times_s.len() {
        return Err(BenchError::InvalidParameter(format!(
            "column length mismatch: {} values, {} timestamps",
            currents_ma.len(),
            times_s.len()
        )));
    }
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{CURRENT_HEADER},{TIME_HEADER}")?;
    for (value, time) in currents_ma.iter().zip(times_s) {
        writeln!(w, "{value},{time}")?;
    }
    w.flush()?;
    info!("CSV file '{}' saved with {} rows", path.display(), currents_ma.len());
    Ok(())
}

/// Reads a file written by [`write_csv`].
pub fn read_csv(path: &Path) -> Result<LeakageTable, BenchError> {
    let reader = BufReader::new(File::open(path)?);
    let mut table = LeakageTable::default();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line_num == 0 && line.starts_with(CURRENT_HEADER) {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 2 {
            return Err(BenchError::Csv {
                line: line_num + 1,
                message: format!("expected 2 columns, got {}", parts.len()),
            });
        }
        let parse = |field: &str| {
            field.trim().parse::<f64>().map_err(|_| BenchError::Csv {
                line: line_num + 1,
                message: format!("not a number: {field:?}"),
            })
        };
        table.currents_ma.push(parse(parts[0])?);
        table.times_s.push(parse(parts[1])?);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ldc_bench_{}_{name}", std::process::id()))
    }

    #[test]
    fn round_trip_preserves_values() {
        let series: SampleSeries = [
            LeakageSample::new(0.0, 1.0, 1.1),
            LeakageSample::new(0.1, 2.000123456789, 2.2),
            LeakageSample::new(0.2, -0.0031, 0.0),
        ]
        .into_iter()
        .collect();
        let path = temp_path("round_trip.csv");
        write_csv(&path, &series).unwrap();
        let table = read_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(table.currents_ma, series.measured());
        assert_eq!(table.times_s, series.times());
        let restored = table.into_series();
        assert_eq!(restored.len(), 3);
        assert!(restored.errors().iter().all(|e| *e == 0.0));
    }

    #[test]
    fn layout_matches_bench_format() {
        let series: SampleSeries = [LeakageSample::new(0.5, 1.25, 0.0)].into_iter().collect();
        let path = temp_path("layout.csv");
        write_csv(&path, &series).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(text, "Leakage Current,Time\n1.25,0.5\n");
    }

    #[test]
    fn existing_file_is_overwritten() {
        let path = temp_path("overwrite.csv");
        std::fs::write(&path, "stale contents\nmore\nlines\n").unwrap();
        write_columns(&path, &[3.0], &[0.0]).unwrap();
        let table = read_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(table.currents_ma, vec![3.0]);
    }

    #[test]
    fn bad_row_reports_line_number() {
        let path = temp_path("bad_row.csv");
        std::fs::write(&path, "Leakage Current,Time\n1.0,0.0\nabc,0.1\n").unwrap();
        let result = read_csv(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(BenchError::Csv { line: 3, .. })));
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let path = temp_path("mismatch.csv");
        assert!(matches!(
            write_columns(&path, &[1.0, 2.0], &[0.0]),
            Err(BenchError::InvalidParameter(_))
        ));
    }
}
