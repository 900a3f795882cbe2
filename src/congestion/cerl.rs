//! CERL family of loss-classifying congestion controllers
//!
//! CERL (Congestion control Enhancement for Random Loss) keeps NewReno-style
//! window growth but refuses to shrink the window for losses it attributes to
//! the link rather than to queueing. The congestion signal is queueing delay:
//! the current RTT minus the smallest RTT seen. A loss that arrives while
//! queueing delay sits well below its observed maximum is treated as random
//! (e.g. radio corruption) and leaves the window alone.
//!
//! Three variants share the classifier:
//! - [`Cerl`] uses a fixed classification factor,
//! - [`CerlPlus`] derives the factor from the ratio of the minimum RTT to the
//!   mean RTT over the connection lifetime,
//! - [`CerlX`] bounds those statistics to a trailing time window so the
//!   classifier follows recent path conditions instead of ancient history.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::rtt_window::RttWindow;
use super::{Controller, ControllerFactory};
use crate::connection::{CongState, ConnectionState};

/// Classification factor used by [`Cerl`] and as the fallback for the
/// adaptive variants before their first RTT sample.
const DEFAULT_LOSS_FACTOR: f64 = 0.55;

/// Trailing horizon bounding the RTT statistics of [`CerlX`]
const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_secs(60);

/// Queueing-delay statistics and recovery bookkeeping shared by all variants
#[derive(Debug, Clone)]
struct LossEstimator {
    /// Minimum RTT within the applicable horizon
    rtt_min: Duration,
    /// Most recent RTT minus `rtt_min`
    queueing_delay: Duration,
    /// Maximum queueing delay within the applicable horizon
    max_queueing_delay: Duration,
    /// Latched when the connection reports entering recovery, cleared by the
    /// duplicate recovery trigger
    entered_recovery: bool,
    /// A congestion loss was detected inside an open episode; the window must
    /// be cut again on the next recovery entry
    decrease_cwnd: bool,
    /// High-water mark of transmitted data at the last congestion decision
    max_sent_seq: u64,
    /// Window to restore on recovery exit when the loss was not congestion
    saved_cwnd: Option<u32>,
}

impl Default for LossEstimator {
    fn default() -> Self {
        Self {
            rtt_min: Duration::MAX,
            queueing_delay: Duration::ZERO,
            max_queueing_delay: Duration::ZERO,
            entered_recovery: false,
            decrease_cwnd: false,
            max_sent_seq: 0,
            saved_cwnd: None,
        }
    }
}

impl LossEstimator {
    fn on_rtt(&mut self, rtt: Duration) {
        self.rtt_min = self.rtt_min.min(rtt);
        self.queueing_delay = rtt.saturating_sub(self.rtt_min);
        self.max_queueing_delay = self.max_queueing_delay.max(self.queueing_delay);
    }

    /// Whether the current loss should be blamed on congestion
    ///
    /// True when queueing delay has grown to at least `factor` of its
    /// observed maximum. With no dispersion at all (every RTT equal to the
    /// minimum) there is nothing to blame on queueing and the loss counts as
    /// random.
    fn is_congestion_loss(&self, factor: f64) -> bool {
        self.max_queueing_delay > Duration::ZERO
            && self.max_queueing_delay.as_secs_f64() * factor <= self.queueing_delay.as_secs_f64()
    }

    fn slow_start_threshold(
        &mut self,
        state: &ConnectionState,
        bytes_in_flight: u32,
        factor: f64,
    ) -> u32 {
        assert!(
            state.last_acked_seq > 0,
            "loss decision before any segment was acknowledged"
        );
        let halved = (2 * state.segment_size).max(bytes_in_flight / 2);
        if !self.entered_recovery {
            return halved;
        }
        let congestion = self.is_congestion_loss(factor);
        debug!(
            congestion,
            factor,
            queueing_delay = ?self.queueing_delay,
            max_queueing_delay = ?self.max_queueing_delay,
            "classified loss inside recovery"
        );
        if congestion && state.last_acked_seq - 1 > self.max_sent_seq {
            // New congestion loss: remember how far we had sent when we
            // decided, so stale signals for the same flight don't cut twice
            self.max_sent_seq = state.high_tx_mark;
            self.decrease_cwnd = true;
            halved
        } else {
            self.saved_cwnd = Some(state.cwnd);
            state.ssthresh
        }
    }

    fn on_congestion_state(&mut self, new_state: CongState) {
        if new_state == CongState::Recovery {
            self.entered_recovery = true;
        }
    }

    fn enter_recovery(&mut self, state: &mut ConnectionState) {
        if !self.entered_recovery {
            state.cwnd = state.ssthresh;
        } else {
            self.entered_recovery = false;
            if self.decrease_cwnd {
                state.cwnd = state.ssthresh;
                self.decrease_cwnd = false;
            }
        }
        trace!(cwnd = state.cwnd, "entered recovery");
    }

    fn exit_recovery(&mut self, state: &mut ConnectionState) {
        state.cwnd = match self.saved_cwnd.take() {
            Some(saved) => saved,
            None => state.ssthresh,
        };
        trace!(cwnd = state.cwnd, "exited recovery");
    }
}

/// Slow start: one segment of growth per call, consuming one segment credit
fn slow_start(state: &mut ConnectionState, segments_acked: u32) -> u32 {
    if segments_acked >= 1 {
        state.cwnd += state.segment_size;
        trace!(cwnd = state.cwnd, ssthresh = state.ssthresh, "slow start");
        return segments_acked - 1;
    }
    0
}

/// Congestion avoidance: linear growth of at least one byte per call
fn congestion_avoidance(state: &mut ConnectionState, segments_acked: u32) {
    if segments_acked > 0 {
        let seg = u64::from(state.segment_size);
        let adder = ((seg * seg) as f64 / f64::from(state.cwnd)).max(1.0);
        state.cwnd += adder as u32;
        trace!(
            cwnd = state.cwnd,
            ssthresh = state.ssthresh,
            "congestion avoidance"
        );
    }
}

fn increase_window(state: &mut ConnectionState, mut segments_acked: u32) {
    if state.cwnd < state.ssthresh {
        segments_acked = slow_start(state, segments_acked);
    }
    if state.cwnd >= state.ssthresh {
        congestion_avoidance(state, segments_acked);
    }
}

/// Running mean of RTT samples backing the adaptive classification factor
#[derive(Debug, Clone, Default)]
struct MeanRtt {
    rtt_sum: Duration,
    samples: u64,
}

impl MeanRtt {
    fn record(&mut self, rtt: Duration) {
        self.rtt_sum += rtt;
        self.samples += 1;
    }

    fn evict(&mut self, rtt: Duration) {
        self.rtt_sum = self.rtt_sum.saturating_sub(rtt);
        self.samples -= 1;
    }

    /// Ratio of the best-case RTT to the mean RTT, in (0, 1]
    ///
    /// `None` until the first sample exists; the ratio is undefined over an
    /// empty sample set.
    fn factor(&self, rtt_min: Duration) -> Option<f64> {
        if self.samples == 0 {
            return None;
        }
        Some(rtt_min.as_secs_f64() * self.samples as f64 / self.rtt_sum.as_secs_f64())
    }
}

/// Configuration for the fixed-factor [`Cerl`] controller
#[derive(Debug, Clone)]
pub struct CerlConfig {
    loss_factor: f64,
}

impl CerlConfig {
    /// Fraction of the maximum queueing delay the current queueing delay must
    /// reach for a loss to count as congestion; must lie in (0, 1]
    pub fn loss_factor(&mut self, value: f64) -> &mut Self {
        debug_assert!(value > 0.0 && value <= 1.0);
        self.loss_factor = value;
        self
    }
}

impl Default for CerlConfig {
    fn default() -> Self {
        Self {
            loss_factor: DEFAULT_LOSS_FACTOR,
        }
    }
}

impl ControllerFactory for CerlConfig {
    fn build(self: Arc<Self>) -> Box<dyn Controller> {
        Box::new(Cerl::new(self))
    }
}

/// Fixed-threshold loss classifier
#[derive(Debug, Clone)]
pub struct Cerl {
    config: Arc<CerlConfig>,
    loss: LossEstimator,
}

impl Cerl {
    /// Construct a controller using the given `config`
    pub fn new(config: Arc<CerlConfig>) -> Self {
        Self {
            config,
            loss: LossEstimator::default(),
        }
    }
}

impl Controller for Cerl {
    fn on_ack(&mut self, state: &mut ConnectionState, segments_acked: u32) {
        increase_window(state, segments_acked);
    }

    fn on_rtt_sample(&mut self, _now: Instant, _segments_acked: u32, rtt: Duration) {
        self.loss.on_rtt(rtt);
    }

    fn slow_start_threshold(&mut self, state: &ConnectionState, bytes_in_flight: u32) -> u32 {
        self.loss
            .slow_start_threshold(state, bytes_in_flight, self.config.loss_factor)
    }

    fn on_congestion_state(&mut self, new_state: CongState) {
        self.loss.on_congestion_state(new_state);
    }

    fn enter_recovery(&mut self, state: &mut ConnectionState) {
        self.loss.enter_recovery(state);
    }

    fn exit_recovery(&mut self, state: &mut ConnectionState) {
        self.loss.exit_recovery(state);
    }

    fn clone_box(&self) -> Box<dyn Controller> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Configuration for the [`CerlPlus`] controller
#[derive(Debug, Clone)]
pub struct CerlPlusConfig {
    /// Factor used until the first RTT sample makes the adaptive one defined
    fallback_loss_factor: f64,
}

impl CerlPlusConfig {
    /// Classification factor used before any RTT sample exists
    pub fn fallback_loss_factor(&mut self, value: f64) -> &mut Self {
        debug_assert!(value > 0.0 && value <= 1.0);
        self.fallback_loss_factor = value;
        self
    }
}

impl Default for CerlPlusConfig {
    fn default() -> Self {
        Self {
            fallback_loss_factor: DEFAULT_LOSS_FACTOR,
        }
    }
}

impl ControllerFactory for CerlPlusConfig {
    fn build(self: Arc<Self>) -> Box<dyn Controller> {
        Box::new(CerlPlus::new(self))
    }
}

/// Proportional-threshold refinement of [`Cerl`]
///
/// The classification factor is the ratio of the minimum RTT to the mean RTT
/// over every sample the connection has seen: the wider RTTs spread above
/// their floor, the lower the bar for calling a loss congestion.
#[derive(Debug, Clone)]
pub struct CerlPlus {
    config: Arc<CerlPlusConfig>,
    loss: LossEstimator,
    mean: MeanRtt,
}

impl CerlPlus {
    /// Construct a controller using the given `config`
    pub fn new(config: Arc<CerlPlusConfig>) -> Self {
        Self {
            config,
            loss: LossEstimator::default(),
            mean: MeanRtt::default(),
        }
    }

    fn factor(&self) -> f64 {
        self.mean
            .factor(self.loss.rtt_min)
            .unwrap_or(self.config.fallback_loss_factor)
    }
}

impl Controller for CerlPlus {
    fn on_ack(&mut self, state: &mut ConnectionState, segments_acked: u32) {
        increase_window(state, segments_acked);
    }

    fn on_rtt_sample(&mut self, _now: Instant, _segments_acked: u32, rtt: Duration) {
        self.loss.on_rtt(rtt);
        self.mean.record(rtt);
    }

    fn slow_start_threshold(&mut self, state: &ConnectionState, bytes_in_flight: u32) -> u32 {
        let factor = self.factor();
        self.loss
            .slow_start_threshold(state, bytes_in_flight, factor)
    }

    fn on_congestion_state(&mut self, new_state: CongState) {
        self.loss.on_congestion_state(new_state);
    }

    fn enter_recovery(&mut self, state: &mut ConnectionState) {
        self.loss.enter_recovery(state);
    }

    fn exit_recovery(&mut self, state: &mut ConnectionState) {
        self.loss.exit_recovery(state);
    }

    fn clone_box(&self) -> Box<dyn Controller> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Configuration for the [`CerlX`] controller
#[derive(Debug, Clone)]
pub struct CerlXConfig {
    fallback_loss_factor: f64,
    window: Duration,
}

impl CerlXConfig {
    /// Classification factor used before any RTT sample exists
    pub fn fallback_loss_factor(&mut self, value: f64) -> &mut Self {
        debug_assert!(value > 0.0 && value <= 1.0);
        self.fallback_loss_factor = value;
        self
    }

    /// Trailing horizon bounding the RTT statistics
    pub fn window(&mut self, value: Duration) -> &mut Self {
        self.window = value;
        self
    }
}

impl Default for CerlXConfig {
    fn default() -> Self {
        Self {
            fallback_loss_factor: DEFAULT_LOSS_FACTOR,
            window: DEFAULT_SAMPLE_WINDOW,
        }
    }
}

impl ControllerFactory for CerlXConfig {
    fn build(self: Arc<Self>) -> Box<dyn Controller> {
        Box::new(CerlX::new(self))
    }
}

/// Windowed refinement of [`CerlPlus`]
///
/// All RTT statistics are bounded to a trailing time horizon. When the oldest
/// sample ages out, the minimum RTT and maximum queueing delay are recomputed
/// from the samples that remain, so a path change stops haunting the
/// classifier after one horizon. The window never drops below two samples.
#[derive(Debug, Clone)]
pub struct CerlX {
    config: Arc<CerlXConfig>,
    loss: LossEstimator,
    mean: MeanRtt,
    window: RttWindow,
}

impl CerlX {
    /// Construct a controller using the given `config`
    pub fn new(config: Arc<CerlXConfig>) -> Self {
        Self {
            config,
            loss: LossEstimator::default(),
            mean: MeanRtt::default(),
            window: RttWindow::new(),
        }
    }

    /// Number of RTT samples currently inside the horizon
    pub fn sample_count(&self) -> u64 {
        self.mean.samples
    }

    fn factor(&self) -> f64 {
        self.mean
            .factor(self.loss.rtt_min)
            .unwrap_or(self.config.fallback_loss_factor)
    }
}

impl Controller for CerlX {
    fn on_ack(&mut self, state: &mut ConnectionState, segments_acked: u32) {
        increase_window(state, segments_acked);
    }

    fn on_rtt_sample(&mut self, now: Instant, _segments_acked: u32, rtt: Duration) {
        self.loss.on_rtt(rtt);
        self.mean.record(rtt);
        self.window.push(rtt, now);
        while let Some(evicted) = self.window.evict_one(now, self.config.window) {
            self.mean.evict(evicted);
            if let (Some(min), Some(max)) = (self.window.min(), self.window.max()) {
                self.loss.rtt_min = min;
                self.loss.max_queueing_delay = max - min;
            }
            trace!(?evicted, rtt_min = ?self.loss.rtt_min, "evicted stale rtt sample");
        }
    }

    fn slow_start_threshold(&mut self, state: &ConnectionState, bytes_in_flight: u32) -> u32 {
        let factor = self.factor();
        self.loss
            .slow_start_threshold(state, bytes_in_flight, factor)
    }

    fn on_congestion_state(&mut self, new_state: CongState) {
        self.loss.on_congestion_state(new_state);
    }

    fn enter_recovery(&mut self, state: &mut ConnectionState) {
        self.loss.enter_recovery(state);
    }

    fn exit_recovery(&mut self, state: &mut ConnectionState) {
        self.loss.exit_recovery(state);
    }

    fn clone_box(&self) -> Box<dyn Controller> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
