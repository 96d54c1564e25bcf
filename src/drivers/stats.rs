use std::fmt;

use chrono::{DateTime, Local};
use ndarray::Array1;

use crate::drivers::{BenchError, SampleSeries};

/// Summary of one completed acquisition, all values in mA.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub peak_to_peak: f64,
    /// Mean of `|reference - measured|`.
    pub mean_absolute_error: f64,
    /// Population standard deviation of the measured column.
    pub std_dev: f64,
    pub samples: usize,
    pub completed_at: DateTime<Local>,
}

impl SummaryStats {
    pub fn from_series(series: &SampleSeries) -> Result<Self, BenchError> {
        if series.is_empty() {
            return Err(BenchError::InvalidParameter(
                "cannot summarise an empty sample series".into(),
            ));
        }
        let measured = Array1::from_vec(series.measured());
        let abs_errors = Array1::from_vec(series.errors()).mapv(f64::abs);
        let max = measured.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let min = measured.fold(f64::INFINITY, |acc, &v| acc.min(v));
        Ok(Self {
            mean: measured.mean().unwrap_or(0.0),
            max,
            min,
            peak_to_peak: max - min,
            mean_absolute_error: abs_errors.mean().unwrap_or(0.0),
            std_dev: measured.std(0.0),
            samples: series.len(),
            completed_at: Local::now(),
        })
    }
}

impl fmt::Display for SummaryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mean: {:.3} mA", self.mean)?;
        writeln!(f, "Maximum: {:.3} mA", self.max)?;
        writeln!(f, "Minimum: {:.3} mA", self.min)?;
        writeln!(f, "Peak to peak: {:.3} mA", self.peak_to_peak)?;
        writeln!(f, "Mean Error: {:.3} mA", self.mean_absolute_error)?;
        write!(f, "Standard Deviation: {:.3} mA", self.std_dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeakageSample;

    fn series(rows: &[(f64, f64, f64)]) -> SampleSeries {
        rows.iter()
            .map(|&(t, m, r)| LeakageSample::new(t, m, r))
            .collect()
    }

    #[test]
    fn two_sample_reference_case() {
        let rows = [(0.0, 1.0, 1.1), (0.1, 2.0, 2.2)];
        let stats = SummaryStats::from_series(&series(&rows)).unwrap();
        assert!((stats.mean - 1.5).abs() < 1e-12);
        assert_eq!(stats.max, 2.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.peak_to_peak, 1.0);
        assert!((stats.mean_absolute_error - 0.15).abs() < 1e-9);
        assert!((stats.std_dev - 0.5).abs() < 1e-12);
        assert_eq!(stats.samples, 2);
    }

    #[test]
    fn absolute_error_ignores_sign() {
        // errors of +0.5 and -0.5 would cancel in a signed mean
        let rows = [(0.0, 1.0, 1.5), (0.1, 2.0, 1.5)];
        let stats = SummaryStats::from_series(&series(&rows)).unwrap();
        assert!((stats.mean_absolute_error - 0.5).abs() < 1e-12);
    }

    #[test]
    fn peak_to_peak_is_exact_difference() {
        let rows = [(0.0, 0.3, 0.0), (0.1, -0.7, 0.0), (0.2, 0.123456789, 0.0), (0.3, 0.1, 0.0)];
        let stats = SummaryStats::from_series(&series(&rows)).unwrap();
        assert_eq!(stats.max, 0.3);
        assert_eq!(stats.min, -0.7);
        assert_eq!(stats.peak_to_peak, stats.max - stats.min);
        assert!(stats.mean_absolute_error >= 0.0);
    }

    #[test]
    fn single_sample_has_zero_spread() {
        let stats = SummaryStats::from_series(&series(&[(0.0, 4.2, 4.0)])).unwrap();
        assert_eq!(stats.peak_to_peak, 0.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.mean, 4.2);
    }

    #[test]
    fn empty_series_is_rejected() {
        assert!(matches!(
            SummaryStats::from_series(&SampleSeries::new()),
            Err(BenchError::InvalidParameter(_))
        ));
    }

    #[test]
    fn report_uses_three_decimals() {
        let rows = [(0.0, 1.0, 1.1), (0.1, 2.0, 2.2)];
        let stats = SummaryStats::from_series(&series(&rows)).unwrap();
        let report = stats.to_string();
        assert!(report.starts_with("Mean: 1.500 mA\n"));
        assert!(report.contains("Peak to peak: 1.000 mA"));
        assert!(report.ends_with("Standard Deviation: 0.500 mA"));
    }
}
