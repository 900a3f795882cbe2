//! Transport-side state shared with the congestion controller

use std::sync::Arc;

use crate::congestion::{Controller, ControllerFactory};
use crate::options::CwndOption;

/// Congestion state machine positions reported to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongState {
    /// Normal operation, no reordering or loss observed
    Open,
    /// Duplicate ACKs or SACKs hint at reordering, nothing confirmed lost
    Disorder,
    /// Window reduced in response to explicit congestion notification
    Cwr,
    /// Fast recovery is in progress
    Recovery,
    /// Retransmission timeout, everything in flight presumed lost
    Loss,
}

/// Connection variables read and written by a [`Controller`]
///
/// Owned by the surrounding transport stack; the controller mutates `cwnd`
/// and `ssthresh` through its event hooks. Window and threshold are both in
/// bytes and stay positive.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    /// Congestion window in bytes
    pub cwnd: u32,
    /// Slow-start threshold in bytes
    pub ssthresh: u32,
    /// Sender maximum segment size in bytes
    pub segment_size: u32,
    /// Highest sequence number transmitted so far
    pub high_tx_mark: u64,
    /// Highest cumulatively acknowledged sequence number
    pub last_acked_seq: u64,
    /// Peer-advertised receive window in bytes
    pub advertised_window: u32,
}

impl ConnectionState {
    /// Initial state for a fresh connection
    ///
    /// The window starts at ten segments and the threshold effectively
    /// unbounded, so growth begins in slow start.
    pub fn new(segment_size: u32) -> Self {
        Self {
            cwnd: segment_size * INITIAL_WINDOW_SEGMENTS,
            ssthresh: u32::MAX,
            segment_size,
            high_tx_mark: 0,
            last_acked_seq: 0,
            advertised_window: u32::MAX,
        }
    }

    /// The congestion-window option to piggyback on the next outgoing ACK
    pub fn cwnd_option(&self) -> CwndOption {
        CwndOption { cwnd: self.cwnd }
    }
}

/// Congestion state for one connection: the transport variables plus the
/// controller driving them
pub struct CongestionPath {
    /// Window, threshold and sequence bookkeeping
    pub state: ConnectionState,
    /// Congestion controller state
    pub controller: Box<dyn Controller>,
}

impl CongestionPath {
    /// Build a path with a fresh controller from `factory`
    pub fn new(factory: Arc<dyn ControllerFactory>, segment_size: u32) -> Self {
        Self {
            state: ConnectionState::new(segment_size),
            controller: factory.build(),
        }
    }

    /// Duplicate this path for a connection forked on passive open
    ///
    /// The controller is deep-copied; the fork shares no mutable state with
    /// the original.
    pub fn fork(&self) -> Self {
        Self {
            state: self.state.clone(),
            controller: self.controller.clone_box(),
        }
    }
}

const INITIAL_WINDOW_SEGMENTS: u32 = 10;

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::congestion::{CerlX, CerlXConfig};

    #[test]
    fn fresh_state_starts_in_slow_start() {
        let state = ConnectionState::new(1448);
        assert_eq!(state.cwnd, 14480);
        assert!(state.cwnd < state.ssthresh);
    }

    #[test]
    fn cwnd_option_reflects_current_window() {
        let mut state = ConnectionState::new(1448);
        state.cwnd = 42_000;
        assert_eq!(state.cwnd_option().cwnd, 42_000);
    }

    #[test]
    fn fork_does_not_alias_controller_state() {
        let now = Instant::now();
        let mut path = CongestionPath::new(Arc::new(CerlXConfig::default()), 1448);
        path.controller
            .on_rtt_sample(now, 1, Duration::from_millis(100));

        let forked = path.fork();
        // Mutating the original afterwards must not show up in the fork
        path.controller
            .on_rtt_sample(now + Duration::from_secs(1), 1, Duration::from_millis(250));

        let original = path
            .controller
            .into_any()
            .downcast::<CerlX>()
            .expect("built from CerlXConfig");
        let forked = forked
            .controller
            .into_any()
            .downcast::<CerlX>()
            .expect("cloned from CerlX");
        assert_eq!(original.sample_count(), 2);
        assert_eq!(forked.sample_count(), 1);
    }

    #[test]
    fn fork_copies_window_variables() {
        let mut path = CongestionPath::new(Arc::new(CerlXConfig::default()), 1448);
        path.state.cwnd = 30_000;
        let forked = path.fork();
        assert_eq!(forked.state.cwnd, 30_000);
        assert_eq!(forked.state.segment_size, 1448);
    }
}
