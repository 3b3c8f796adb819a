//! Structured error types for scenario setup and the kernel.
//!
//! Setup is fail-fast: every fallible configuration step returns
//! `SimResult<T>` and the first error aborts the scenario. Packet-level
//! problems during a run (no route, oversize frame) are not errors; they
//! are counted on the device or stack and logged.

use thiserror::Error;

use crate::app::AppId;
use crate::device::DeviceId;
use crate::node::NodeId;
use crate::simulation::Lifecycle;
use crate::time::VirtualTime;

#[derive(Debug, Error)]
pub enum SimError {
    // ── Configuration ─────────────────────────────────────

    /// A scenario configuration violates an invariant.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    // ── Lookups ───────────────────────────────────────────

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("application {0} not found")]
    AppNotFound(AppId),

    #[error("{collection} index {index} out of range (len {len})")]
    IndexOutOfRange {
        collection: &'static str,
        index: usize,
        len: usize,
    },

    // ── Installation ──────────────────────────────────────

    #[error("device {0} already carries an adaptation layer")]
    AdaptationAlreadyInstalled(DeviceId),

    #[error("device {0} already has a global IPv6 address")]
    AddressAlreadyAssigned(DeviceId),

    #[error("node {0} has no IPv6 stack installed")]
    StackNotInstalled(NodeId),

    #[error("node {0} already has an IPv6 stack installed")]
    StackAlreadyInstalled(NodeId),

    #[error("UDP port {port} already bound on node {node}")]
    PortInUse { node: NodeId, port: u16 },

    // ── Scheduling ────────────────────────────────────────

    #[error("cannot schedule event at {requested} when current time is {current}")]
    NonCausalEvent {
        requested: VirtualTime,
        current: VirtualTime,
    },

    #[error("cannot {operation} a simulation in state {state:?}")]
    InvalidLifecycle {
        state: Lifecycle,
        operation: &'static str,
    },

    // ── Wire format / I/O ─────────────────────────────────

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("capture i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_node_not_found() {
        let e = SimError::NodeNotFound(NodeId::new(5));
        assert_eq!(e.to_string(), "node N5 not found");
    }

    #[test]
    fn test_display_non_causal() {
        let e = SimError::NonCausalEvent {
            requested: VirtualTime::from_secs(1),
            current: VirtualTime::from_secs(3),
        };
        let s = e.to_string();
        assert!(s.contains("+1s"));
        assert!(s.contains("+3s"));
    }

    #[test]
    fn test_io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let e: SimError = io.into();
        assert!(matches!(e, SimError::Io(_)));
        assert!(e.to_string().contains("nope"));
    }
}
