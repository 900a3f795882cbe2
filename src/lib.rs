//! Loss-classifying TCP congestion control and adaptive delayed acknowledgment
//!
//! The sender side is the CERL family of congestion controllers (Congestion
//! control Enhancement for Random Loss): three variants behind a common
//! [`congestion::Controller`] interface that classify each loss as either
//! congestion (queueing delay has grown toward its observed maximum) or a
//! random link loss that should not shrink the window. The receiver side is
//! [`AdwReceiver`], which adapts the delayed-ACK window and timeout to the
//! inter-arrival timing of incoming segments.
//!
//! Both components are synchronous state machines driven by a surrounding
//! transport stack: the stack owns the [`ConnectionState`] variables, feeds
//! acknowledgment, RTT and recovery events to the controller, and polls the
//! receiver's delayed-ACK deadline instead of running a real timer. The
//! [`CwndOption`] wire option carries the sender's current window to the
//! receiver so its delay window can follow the sender's trend.

#![warn(missing_docs)]

pub mod congestion;
mod connection;
mod delack;
mod options;

pub use connection::{CongState, CongestionPath, ConnectionState};
pub use delack::{AckDecision, AdwConfig, AdwReceiver, SegmentSeq};
pub use options::{CwndOption, MalformedOption, CWND_OPTION_KIND};
