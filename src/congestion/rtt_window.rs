//! A trailing-horizon RTT sample window
//!
//! Keeps the RTT samples of the last `horizon` of wall time in arrival order,
//! together with an ordered multiset of their values so the minimum and
//! maximum over the horizon stay cheap to maintain as old samples age out.
//! Unlike an estimator that only approximates the windowed extreme, the exact
//! values are needed here: evicting a sample recomputes the classifier's
//! minimum RTT and maximum queueing delay from what actually remains.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Sample {
    rtt: Duration,
    at: Instant,
}

#[derive(Debug, Clone)]
pub(super) struct RttWindow {
    samples: VecDeque<Sample>,
    by_rtt: BTreeMap<Duration, usize>,
}

impl RttWindow {
    pub(super) fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            by_rtt: BTreeMap::new(),
        }
    }

    pub(super) fn push(&mut self, rtt: Duration, now: Instant) {
        self.samples.push_back(Sample { rtt, at: now });
        *self.by_rtt.entry(rtt).or_insert(0) += 1;
    }

    /// Evict the oldest sample if it has aged out of `horizon`
    ///
    /// Returns the evicted RTT so the caller can adjust its running sum. The
    /// window never shrinks below two samples; its minimum and maximum stay
    /// defined.
    pub(super) fn evict_one(&mut self, now: Instant, horizon: Duration) -> Option<Duration> {
        if self.samples.len() <= 2 {
            return None;
        }
        let oldest = *self.samples.front()?;
        if now.duration_since(oldest.at) <= horizon {
            return None;
        }
        self.samples.pop_front();
        match self.by_rtt.get_mut(&oldest.rtt) {
            Some(count) if *count > 1 => *count -= 1,
            _ => {
                self.by_rtt.remove(&oldest.rtt);
            }
        }
        Some(oldest.rtt)
    }

    pub(super) fn len(&self) -> usize {
        self.samples.len()
    }

    /// Smallest RTT currently inside the window
    pub(super) fn min(&self) -> Option<Duration> {
        self.by_rtt.keys().next().copied()
    }

    /// Largest RTT currently inside the window
    pub(super) fn max(&self) -> Option<Duration> {
        self.by_rtt.keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HORIZON: Duration = Duration::from_secs(60);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn tracks_min_and_max_of_live_samples() {
        let t0 = Instant::now();
        let mut w = RttWindow::new();
        w.push(ms(200), t0);
        w.push(ms(100), t0 + Duration::from_secs(1));
        w.push(ms(300), t0 + Duration::from_secs(2));
        assert_eq!(w.min(), Some(ms(100)));
        assert_eq!(w.max(), Some(ms(300)));
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn evicts_only_aged_out_samples() {
        let t0 = Instant::now();
        let mut w = RttWindow::new();
        w.push(ms(200), t0);
        w.push(ms(100), t0 + Duration::from_secs(10));
        w.push(ms(300), t0 + Duration::from_secs(20));

        // At t=30 nothing is older than the horizon
        assert_eq!(w.evict_one(t0 + Duration::from_secs(30), HORIZON), None);

        // At t=70 the t=0 sample is 70s old and goes
        let now = t0 + Duration::from_secs(70);
        assert_eq!(w.evict_one(now, HORIZON), Some(ms(200)));
        assert_eq!(w.min(), Some(ms(100)));
        assert_eq!(w.max(), Some(ms(300)));
        // The remaining two samples are protected by the floor
        assert_eq!(w.evict_one(now, HORIZON), None);
    }

    #[test]
    fn never_shrinks_below_two_samples() {
        let t0 = Instant::now();
        let mut w = RttWindow::new();
        w.push(ms(100), t0);
        w.push(ms(200), t0 + Duration::from_secs(1));
        // Both are ancient by now, but the two-sample floor holds
        let now = t0 + Duration::from_secs(1000);
        assert_eq!(w.evict_one(now, HORIZON), None);
        assert_eq!(w.len(), 2);

        w.push(ms(300), now);
        assert_eq!(w.evict_one(now, HORIZON), Some(ms(100)));
        assert_eq!(w.evict_one(now, HORIZON), None);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn duplicate_rtts_survive_single_eviction() {
        let t0 = Instant::now();
        let mut w = RttWindow::new();
        w.push(ms(100), t0);
        w.push(ms(100), t0 + Duration::from_secs(1));
        w.push(ms(250), t0 + Duration::from_secs(2));
        let now = t0 + Duration::from_secs(100);
        assert_eq!(w.evict_one(now, HORIZON), Some(ms(100)));
        // The second 100ms sample still anchors the minimum
        assert_eq!(w.min(), Some(ms(100)));
    }
}
