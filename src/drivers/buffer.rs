use crate::types::LeakageSample;

/// Ordered leakage samples of one acquisition; index order is time order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleSeries {
    samples: Vec<LeakageSample>,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: LeakageSample) {
        self.samples.push(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[LeakageSample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeakageSample> {
        self.samples.iter()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time_s).collect()
    }

    pub fn measured(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.measured_ma).collect()
    }

    /// `reference - measured` for every sample, in mA.
    pub fn errors(&self) -> Vec<f64> {
        self.samples.iter().map(LeakageSample::error_ma).collect()
    }

    /// Span covered by the time column, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.time_s - first.time_s,
            _ => 0.0,
        }
    }
}

impl FromIterator<LeakageSample> for SampleSeries {
    fn from_iter<I: IntoIterator<Item = LeakageSample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}
