use std::collections::VecDeque;
use crate::types::Sample;
/// Time-bounded ring of samples, oldest at the front.
///
/// Retention is by age: after every append, samples are dropped from the
/// front while the span between newest and oldest exceeds `horizon_secs`.
/// An optional count cap bounds memory independently of the age rule.
#[derive(Clone, Debug)]
pub struct RollingWindow {
    samples: VecDeque<Sample>,
    horizon_secs: f64,
    max_samples: Option<usize>,
}
impl RollingWindow {
    pub fn new(horizon_secs: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            horizon_secs: horizon_secs.max(0.0),
            max_samples: None,
        }
    }
    pub fn with_max_samples(mut self, max_samples: Option<usize>) -> Self {
        self.max_samples = max_samples.map(|n| n.max(1));
        if let Some(cap) = self.max_samples {
            self.samples.reserve(cap);
        }
        self
    }
    pub fn append(&mut self, sample: Sample) {
        let in_order = self
            .samples
            .back()
            .map_or(true, |last| last.timestamp <= sample.timestamp);
        if in_order {
            self.samples.push_back(sample);
        } else {
            // Late sample: keep the sequence sorted, equal timestamps stay in arrival order.
            let at = self
                .samples
                .partition_point(|s| s.timestamp <= sample.timestamp);
            self.samples.insert(at, sample);
        }
        self.evict();
    }
    /// Up to `n` most recent samples, oldest first.
    pub fn latest(&self, n: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }
    /// Chronological iteration over everything retained.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }
    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }
    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// `(first, last)` timestamps, used for the chart's x range.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        Some((self.oldest()?.timestamp, self.newest()?.timestamp))
    }
    fn evict(&mut self) {
        let Some(newest) = self.samples.back().map(|s| s.timestamp) else {
            return;
        };
        while let Some(front) = self.samples.front() {
            if newest - front.timestamp > self.horizon_secs {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        if let Some(cap) = self.max_samples {
            while self.samples.len() > cap {
                self.samples.pop_front();
            }
        }
    }
}
