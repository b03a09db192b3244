use std::collections::VecDeque;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, Normal};
use crate::config::Distribution;
/// Something that yields one (value A, value B) reading pair per tick.
pub trait SampleSource {
    fn next_pair(&mut self) -> (f64, f64);
}
/// Placeholder for real sensors: draws both streams from fixed distributions.
pub struct SimulatedSource {
    rng: StdRng,
    stream_a: Distribution,
    stream_b: Distribution,
}
impl SimulatedSource {
    pub fn new(stream_a: Distribution, stream_b: Distribution) -> Self {
        Self::with_rng(StdRng::from_entropy(), stream_a, stream_b)
    }
    pub fn seeded(seed: u64, stream_a: Distribution, stream_b: Distribution) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), stream_a, stream_b)
    }
    fn with_rng(rng: StdRng, stream_a: Distribution, stream_b: Distribution) -> Self {
        Self {
            rng,
            stream_a,
            stream_b,
        }
    }
    fn draw(rng: &mut StdRng, dist: Distribution) -> f64 {
        match dist {
            Distribution::Normal { mean, std_dev } => match Normal::new(mean, std_dev) {
                Ok(normal) => normal.sample(rng),
                // Negative or NaN spread: degenerate to the mean.
                Err(_) => mean,
            },
            Distribution::Uniform { low, high } if low < high => rng.gen_range(low..high),
            Distribution::Uniform { low, .. } => low,
        }
    }
}
impl SampleSource for SimulatedSource {
    fn next_pair(&mut self) -> (f64, f64) {
        let a = Self::draw(&mut self.rng, self.stream_a);
        let b = Self::draw(&mut self.rng, self.stream_b);
        (a, b)
    }
}
/// In-memory source useful for tests and deterministic playback.
/// Repeats the last pair once the queue runs dry.
pub struct ManualSource {
    queue: VecDeque<(f64, f64)>,
    last: (f64, f64),
}
impl ManualSource {
    pub fn new(pairs: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            queue: pairs.into_iter().collect(),
            last: (0.0, 0.0),
        }
    }
}
impl SampleSource for ManualSource {
    fn next_pair(&mut self) -> (f64, f64) {
        if let Some(pair) = self.queue.pop_front() {
            self.last = pair;
        }
        self.last
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn simulated_values_stay_in_configured_ranges() {
        let mut source = SimulatedSource::seeded(
            7,
            Distribution::Normal { mean: 10.0, std_dev: 2.0 },
            Distribution::Uniform { low: 20.0, high: 30.0 },
        );
        let pairs: Vec<(f64, f64)> = (0..2000).map(|_| source.next_pair()).collect();
        assert!(pairs.iter().all(|&(_, b)| (20.0..30.0).contains(&b)));
        let mean_a = pairs.iter().map(|&(a, _)| a).sum::<f64>() / pairs.len() as f64;
        assert!((mean_a - 10.0).abs() < 0.5, "mean was {mean_a}");
    }
    #[test]
    fn seeded_sources_repeat() {
        let dist = Distribution::Uniform { low: 0.0, high: 1.0 };
        let mut a = SimulatedSource::seeded(1, dist, dist);
        let mut b = SimulatedSource::seeded(1, dist, dist);
        for _ in 0..10 {
            assert_eq!(a.next_pair(), b.next_pair());
        }
    }
    #[test]
    fn manual_source_replays_then_holds() {
        let mut source = ManualSource::new(vec![(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(source.next_pair(), (1.0, 2.0));
        assert_eq!(source.next_pair(), (3.0, 4.0));
        assert_eq!(source.next_pair(), (3.0, 4.0));
    }
}
