//! Structured packet observation, the Rust analogue of the Python `PySideLogger` /
//! `comm_logger` GUI-log sink (`spec.md` §1 "out of scope... GUI logging").
//!
//! The GUI/CSV sinks themselves stay external collaborators; what this crate carries
//! instead is the attachment point (`PacketSink`) plus `tracing` events at the bus
//! boundary, which is the idiomatic substitute per `SPEC_FULL.md` §0.

use crate::selector::WireFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Sent,
    Received,
}

/// Object-safe observer attached to a [`crate::Bus`] so an embedder can mirror packet
/// traffic somewhere other than `tracing` (a GUI log pane, a CSV file, ...).
pub trait PacketSink: Send + Sync {
    fn on_packet(&self, bus_name: &str, direction: PacketDirection, frame: &WireFrame);
}

/// Default sink: every packet is already traced by the bus itself, so this does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PacketSink for NullSink {
    fn on_packet(&self, _bus_name: &str, _direction: PacketDirection, _frame: &WireFrame) {}
}
