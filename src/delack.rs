//! Receiver-side adaptive delay window for delayed acknowledgments
//!
//! ADW (adaptive delay window) watches the inter-arrival timing of data
//! segments. Segments arriving near the fastest spacing ever observed signal
//! a sender in full flight, so ACKs may batch further; segments trickling in
//! signal the opposite and ACKs go out promptly. The delay window `dwnd` is
//! the number of in-order segments that may be acknowledged cumulatively
//! before an ACK becomes mandatory, and the delayed-ACK timeout itself is
//! derived from the smoothed inter-arrival time.
//!
//! The component is a synchronous decision function: the transport calls
//! [`AdwReceiver::on_segment`] for every received data segment and acts on
//! the returned [`AckDecision`]. The delayed-ACK timer is modelled as a
//! polled deadline ([`AdwReceiver::next_timeout`]), not a real timer.

use std::time::{Duration, Instant};

use tracing::trace;

/// Configuration for [`AdwReceiver`]
#[derive(Debug, Clone)]
pub struct AdwConfig {
    lambda: u32,
    alpha: f64,
    max_timeout: Duration,
}

impl AdwConfig {
    /// Sensitivity factor: arrivals faster than `lambda` times the base
    /// inter-arrival time count as bursty. Must be positive.
    pub fn lambda(&mut self, value: u32) -> &mut Self {
        debug_assert!(value > 0);
        self.lambda = value;
        self
    }

    /// Smoothing factor for the inter-arrival estimate, in [0, 1]
    pub fn alpha(&mut self, value: f64) -> &mut Self {
        debug_assert!((0.0..=1.0).contains(&value));
        self.alpha = value;
        self
    }

    /// Upper bound on how long a delayed ACK may wait
    pub fn max_timeout(&mut self, value: Duration) -> &mut Self {
        self.max_timeout = value;
        self
    }
}

impl Default for AdwConfig {
    fn default() -> Self {
        Self {
            lambda: 3,
            alpha: 0.75,
            max_timeout: Duration::from_millis(500),
        }
    }
}

/// How a received data segment relates to the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSeq {
    /// The next expected in-order segment
    InOrder,
    /// The segment opened a gap in the receive buffer, or filled one
    OutOfOrder,
}

/// What the transport should do about acknowledging the segment it just
/// delivered to [`AdwReceiver::on_segment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Send the cumulative ACK now
    Immediate,
    /// A delayed-ACK timer was armed for the returned deadline
    Scheduled(Instant),
    /// An earlier timer is still pending; nothing to do yet
    Deferred,
}

/// Adaptive delay-window decision state for one receiving connection
#[derive(Debug, Clone)]
pub struct AdwReceiver {
    config: AdwConfig,
    /// Minimum observed inter-arrival time, in seconds
    base_iat: f64,
    /// Last computed normalized timing ratio
    theta: f64,
    /// Segments that may be acknowledged cumulatively before a mandatory ACK
    dwnd: f64,
    last_arrival: Option<Instant>,
    /// In-order segments received since the last ACK
    delack_count: u32,
    /// Armed delayed-ACK deadline; `None` while idle-counting
    delack_timer: Option<Instant>,
    /// Last congestion window the sender piggybacked on an ACK segment
    peer_cwnd: Option<u32>,
    /// Trend of the peer's window between its last two reports
    cwnd_diff: i64,
}

impl AdwReceiver {
    /// Construct a receiver decision component with the given `config`
    pub fn new(config: AdwConfig) -> Self {
        let dwnd = f64::from(config.lambda);
        Self {
            config,
            base_iat: f64::INFINITY,
            theta: f64::INFINITY,
            dwnd,
            last_arrival: None,
            delack_count: 0,
            delack_timer: None,
            peer_cwnd: None,
            cwnd_diff: 0,
        }
    }

    /// Record the congestion window carried by the sender's wire option
    ///
    /// The sign of the change between consecutive reports steers the delay
    /// window: a non-shrinking sender lets it grow, a shrinking sender
    /// resets it.
    pub fn on_peer_cwnd(&mut self, cwnd: u32) {
        self.cwnd_diff = match self.peer_cwnd {
            Some(prev) => i64::from(cwnd) - i64::from(prev),
            None => 0,
        };
        self.peer_cwnd = Some(cwnd);
    }

    /// Current delay window
    pub fn delay_window(&self) -> f64 {
        self.dwnd
    }

    /// Deadline of the armed delayed-ACK timer, if any
    ///
    /// The transport calls [`Self::on_delack_timeout`] when the deadline
    /// passes and then emits the pending cumulative ACK.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.delack_timer
    }

    /// Decide how to acknowledge a data segment arriving at `now`
    ///
    /// `advertised_window` is our own advertised receive window; together
    /// with the sender's reported congestion window it bounds how far the
    /// delay window may grow.
    pub fn on_segment(
        &mut self,
        now: Instant,
        seq: SegmentSeq,
        advertised_window: u32,
    ) -> AckDecision {
        let mut iat = None;
        if let Some(prev) = self.last_arrival {
            let sample = now.duration_since(prev).as_secs_f64();
            self.base_iat = self.base_iat.min(sample);
            let theta = self.time_ratio(sample);
            self.update_delay_window(theta, advertised_window);
            iat = Some(sample);
        }
        self.last_arrival = Some(now);

        if seq == SegmentSeq::OutOfOrder {
            // A gap exists or was just filled: always ACK
            self.flush();
            return AckDecision::Immediate;
        }

        self.delack_count += 1;
        if f64::from(self.delack_count) >= self.dwnd {
            self.flush();
            return AckDecision::Immediate;
        }
        if self.delack_timer.is_some() {
            return AckDecision::Deferred;
        }
        let timeout = match iat {
            Some(iat) => self.delay_timeout(iat),
            // No inter-arrival sample yet
            None => self.config.max_timeout,
        };
        let deadline = now + timeout;
        self.delack_timer = Some(deadline);
        trace!(?timeout, "armed delayed-ack timer");
        AckDecision::Scheduled(deadline)
    }

    /// The armed delayed-ACK deadline passed
    ///
    /// Re-evaluates the delay window with the latest timing ratio before the
    /// caller emits the forced cumulative ACK.
    pub fn on_delack_timeout(&mut self, advertised_window: u32) {
        let theta = self.theta;
        self.update_delay_window(theta, advertised_window);
        self.flush();
    }

    /// Cancel the pending timer and reset the ACK counter; idempotent
    fn flush(&mut self) {
        self.delack_timer = None;
        self.delack_count = 0;
    }

    /// Normalized timing ratio for an inter-arrival time
    ///
    /// Arrivals at the base spacing map toward the top of the scale, arrivals
    /// slower than `lambda` times the base clamp to the bottom.
    fn time_ratio(&mut self, iat: f64) -> f64 {
        let lambda = f64::from(self.config.lambda);
        let ratio = if iat < lambda * self.base_iat {
            (self.base_iat - iat) / self.base_iat
        } else {
            1.0 - lambda
        };
        self.theta = (ratio - (lambda - 1.0)) / lambda;
        self.theta
    }

    fn update_delay_window(&mut self, theta: f64, advertised_window: u32) {
        if !theta.is_finite() {
            // No timing sample has been taken yet
            return;
        }
        let bound = self
            .peer_cwnd
            .map_or(advertised_window, |cwnd| cwnd.min(advertised_window));
        if self.cwnd_diff >= 0 {
            self.dwnd = (self.dwnd + (1.0 - theta)).min(f64::from(bound));
        } else {
            self.dwnd = f64::from(self.config.lambda);
        }
        trace!(dwnd = self.dwnd, theta, "updated delay window");
    }

    /// Delayed-ACK timeout from the smoothed inter-arrival time, capped at
    /// the configured maximum
    fn delay_timeout(&self, iat: f64) -> Duration {
        let smoothed = self.config.alpha * self.base_iat + (1.0 - self.config.alpha) * iat;
        let timeout = (f64::from(self.config.lambda) * smoothed).min(self.config.max_timeout.as_secs_f64());
        Duration::from_secs_f64(timeout)
    }
}
