use std::thread;
use std::time::Duration;

use log::{info, trace};

use crate::drivers::session::BenchSession;
use crate::drivers::source::{Board, Instrument};
use crate::drivers::stats::SummaryStats;
use crate::drivers::{BenchError, SampleSeries};
use crate::types::LeakageSample;

/// Validated duration/rate pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcquisitionPlan {
    pub duration_s: f64,
    pub sample_rate_hz: f64,
    pub count: usize,
}

impl AcquisitionPlan {
    pub fn new(duration_s: f64, sample_rate_hz: f64) -> Result<Self, BenchError> {
        if !(duration_s.is_finite() && duration_s > 0.0) {
            return Err(BenchError::InvalidParameter(format!(
                "duration must be a positive number of seconds, got {duration_s}"
            )));
        }
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(BenchError::InvalidParameter(format!(
                "sample rate must be a positive number of hertz, got {sample_rate_hz}"
            )));
        }
        let product = duration_s * sample_rate_hz;
        if !product.is_finite() || product < 1.0 {
            return Err(BenchError::InvalidParameter(format!(
                "{duration_s} s at {sample_rate_hz} Hz yields no samples"
            )));
        }
        if product >= usize::MAX as f64 {
            return Err(BenchError::InvalidParameter(format!(
                "{duration_s} s at {sample_rate_hz} Hz is too many samples"
            )));
        }
        Ok(Self {
            duration_s,
            sample_rate_hz,
            count: product.floor() as usize,
        })
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sample_rate_hz)
    }

    /// Scheduled offset of sample `index` from the acquisition start.
    pub fn offset_of(&self, index: usize) -> f64 {
        index as f64 / self.sample_rate_hz
    }
}

/// Waits between samples.
///
/// The wait is a fixed period after each sample; time spent talking to the
/// instrument and the board is not subtracted, so real spacing is
/// `period + query latency`.
pub trait Pacer {
    fn wait(&mut self, period: Duration);
}

pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn wait(&mut self, period: Duration) {
        thread::sleep(period);
    }
}

/// Timed leakage acquisition. Owns the sample series of the latest run.
pub struct Sampler<P = ThreadPacer> {
    series: SampleSeries,
    last_summary: Option<SummaryStats>,
    pacer: P,
}

impl Sampler<ThreadPacer> {
    pub fn new() -> Self {
        Self::with_pacer(ThreadPacer)
    }
}

impl Default for Sampler<ThreadPacer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Pacer> Sampler<P> {
    pub fn with_pacer(pacer: P) -> Self {
        Self {
            series: SampleSeries::new(),
            last_summary: None,
            pacer,
        }
    }

    /// Samples for `duration_s` seconds at `sample_rate_hz` and summarises the run.
    ///
    /// Any link error aborts the run: the series keeps the samples read so far
    /// and no summary is produced.
    pub fn acquire<I: Instrument, B: Board>(
        &mut self,
        session: &mut BenchSession<I, B>,
        duration_s: f64,
        sample_rate_hz: f64,
    ) -> Result<SummaryStats, BenchError> {
        let plan = AcquisitionPlan::new(duration_s, sample_rate_hz)?;
        self.run(session, &plan)
    }

    pub fn run<I: Instrument, B: Board>(
        &mut self,
        session: &mut BenchSession<I, B>,
        plan: &AcquisitionPlan,
    ) -> Result<SummaryStats, BenchError> {
        self.series.clear();
        self.last_summary = None;
        let period = plan.period();
        info!(
            "Waiting for acquisition: {} samples at {} Hz",
            plan.count, plan.sample_rate_hz
        );
        for index in 0..plan.count {
            let (measured_ma, reference_ma) = session.read_pair()?;
            let sample = LeakageSample::new(plan.offset_of(index), measured_ma, reference_ma);
            trace!("sample {index}: {sample:?}");
            self.series.push(sample);
            self.pacer.wait(period);
        }
        let summary = SummaryStats::from_series(&self.series)?;
        info!("Acquisition finished with {} samples", self.series.len());
        self.last_summary = Some(summary.clone());
        Ok(summary)
    }

    pub fn series(&self) -> &SampleSeries {
        &self.series
    }

    pub fn last_summary(&self) -> Option<&SummaryStats> {
        self.last_summary.as_ref()
    }

    #[cfg(test)]
    pub fn pacer(&self) -> &P {
        &self.pacer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::session::SessionSettings;
    use crate::drivers::source::fakes::{ScriptedBoard, ScriptedInstrument};
    use crate::drivers::LinkError;

    #[derive(Default)]
    struct RecordingPacer {
        waits: Vec<Duration>,
    }

    impl Pacer for RecordingPacer {
        fn wait(&mut self, period: Duration) {
            self.waits.push(period);
        }
    }

    fn session(
        reference_amps: Vec<f64>,
        board_amps: Vec<f64>,
    ) -> BenchSession<ScriptedInstrument, ScriptedBoard> {
        BenchSession::new(
            ScriptedInstrument::new(reference_amps),
            ScriptedBoard::new(board_amps),
            SessionSettings {
                settle: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    #[test]
    fn sample_count_is_floor_of_duration_times_rate() {
        let cases = [(1.0, 10.0, 10), (2.5, 2.0, 5), (0.35, 10.0, 3), (1.0, 1.0, 1)];
        for (duration, rate, expected) in cases {
            let mut sampler = Sampler::with_pacer(RecordingPacer::default());
            let mut bench = session(vec![0.0; expected], vec![0.0; expected]);
            let stats = sampler.acquire(&mut bench, duration, rate).unwrap();
            assert_eq!(sampler.series().len(), expected);
            assert_eq!(stats.samples, expected);
            assert_eq!(sampler.pacer().waits.len(), expected);
        }
    }

    #[test]
    fn records_scheduled_offsets_and_scaled_values() {
        let mut sampler = Sampler::with_pacer(RecordingPacer::default());
        let mut bench = session(vec![0.0011, 0.0022], vec![0.001, 0.002]);
        let stats = sampler.acquire(&mut bench, 0.2, 10.0).unwrap();
        let samples = sampler.series().samples();
        assert_eq!(samples[0].time_s, 0.0);
        assert_eq!(samples[1].time_s, 0.1);
        assert!((samples[1].measured_ma - 2.0).abs() < 1e-12);
        assert!((samples[1].reference_ma - 2.2).abs() < 1e-12);
        assert!((stats.mean - 1.5).abs() < 1e-12);
        assert!((stats.mean_absolute_error - 0.15).abs() < 1e-9);
        assert_eq!(sampler.last_summary(), Some(&stats));
        assert!(sampler
            .pacer()
            .waits
            .iter()
            .all(|w| *w == Duration::from_millis(100)));
    }

    #[test]
    fn rejects_non_positive_parameters_without_touching_series() {
        let mut sampler = Sampler::with_pacer(RecordingPacer::default());
        let mut bench = session(vec![0.001], vec![0.001]);
        sampler.acquire(&mut bench, 0.1, 10.0).unwrap();
        let before = sampler.series().clone();

        let rejected = [
            (0.0, 10.0),
            (1.0, 0.0),
            (-1.0, 10.0),
            (0.05, 10.0),
            (f64::NAN, 10.0),
            (1.0, f64::INFINITY),
            (1e30, 1.0),
        ];
        for (duration, rate) in rejected {
            assert!(matches!(
                sampler.acquire(&mut bench, duration, rate),
                Err(BenchError::InvalidParameter(_))
            ));
            assert_eq!(sampler.series(), &before);
        }
        assert!(sampler.last_summary().is_some());
    }

    #[test]
    fn link_failure_leaves_partial_series_and_no_summary() {
        let mut sampler = Sampler::with_pacer(RecordingPacer::default());
        let mut bench = BenchSession::new(
            ScriptedInstrument::new([0.001, 0.001, 0.001]),
            ScriptedBoard::with_results([Ok(0.001), Ok(0.001), Err(LinkError::Timeout)]),
            SessionSettings::default(),
        );
        let result = sampler.acquire(&mut bench, 0.5, 10.0);
        assert!(matches!(
            result,
            Err(BenchError::CommunicationFailure { .. })
        ));
        assert_eq!(sampler.series().len(), 2);
        assert!(sampler.last_summary().is_none());
    }

    #[test]
    fn next_acquisition_starts_from_empty_series() {
        let mut sampler = Sampler::with_pacer(RecordingPacer::default());
        let mut bench = session(vec![0.0; 5], vec![0.0; 5]);
        sampler.acquire(&mut bench, 0.3, 10.0).unwrap();
        sampler.acquire(&mut bench, 0.2, 10.0).unwrap();
        assert_eq!(sampler.series().len(), 2);
    }
}
