//! Logic for classifying losses and adjusting the sender's congestion window

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::connection::{CongState, ConnectionState};

mod cerl;
mod rtt_window;

pub use cerl::{Cerl, CerlConfig, CerlPlus, CerlPlusConfig, CerlX, CerlXConfig};

/// Common interface for the loss-classifying congestion controllers
///
/// A controller is exclusively owned by one connection and invoked
/// sequentially; the connection owns the window and threshold variables in
/// [`ConnectionState`] and the controller mutates them through these hooks.
pub trait Controller: Send + Sync {
    /// One or more segments were cumulatively acknowledged
    ///
    /// Grows the congestion window: slow start below the threshold, then
    /// congestion avoidance with the remaining segment credits.
    fn on_ack(&mut self, state: &mut ConnectionState, segments_acked: u32);

    /// An RTT sample was taken for newly acknowledged segments
    #[allow(unused_variables)]
    fn on_rtt_sample(&mut self, now: Instant, segments_acked: u32, rtt: Duration) {}

    /// Compute the slow-start threshold for a loss-recovery decision
    ///
    /// Must not be called before the first segment has been cumulatively
    /// acknowledged; a loss decision needs at least one RTT/ack sample.
    fn slow_start_threshold(&mut self, state: &ConnectionState, bytes_in_flight: u32) -> u32;

    /// The connection's congestion state machine moved to `new_state`
    #[allow(unused_variables)]
    fn on_congestion_state(&mut self, new_state: CongState) {}

    /// A recovery episode begins
    fn enter_recovery(&mut self, state: &mut ConnectionState);

    /// The recovery episode ends
    fn exit_recovery(&mut self, state: &mut ConnectionState);

    /// Duplicate the controller's state
    ///
    /// Used when a connection forks on passive open; the copy must not alias
    /// any of the original's sample collections.
    fn clone_box(&self) -> Box<dyn Controller>;

    /// Returns Self for use in down-casting to extract implementation details
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Constructs controllers on demand
pub trait ControllerFactory {
    /// Construct a fresh `Controller`
    fn build(self: Arc<Self>) -> Box<dyn Controller>;
}
