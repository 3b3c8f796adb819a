//! Run trace: one record per link- or network-layer happening.
//!
//! The world appends to the trace on every frame sent, frame received,
//! relay, delivery, and drop. Tests assert on it; the report summarizes
//! it.

use serde::Serialize;

use crate::app::AppId;
use crate::device::{DeviceId, MacAddress};
use crate::event::EventId;
use crate::node::NodeId;
use crate::time::VirtualTime;

/// Why a frame or packet went no further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DropReason {
    /// 6LoWPAN frame reached a device without a shim.
    NoAdaptationLayer,
    Malformed,
    /// Mesh frame already seen.
    Duplicate,
    HopsExhausted,
    NoRoute,
    UnknownNeighbor,
    /// Larger than the device MTU and no shim to fragment it.
    Oversize,
    NoListener,
    HopLimitExceeded,
    NotForUs,
    NoStack,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::NoAdaptationLayer => "no adaptation layer",
            DropReason::Malformed => "malformed",
            DropReason::Duplicate => "duplicate",
            DropReason::HopsExhausted => "mesh hops exhausted",
            DropReason::NoRoute => "no route",
            DropReason::UnknownNeighbor => "unknown neighbor",
            DropReason::Oversize => "exceeds MTU",
            DropReason::NoListener => "no listener",
            DropReason::HopLimitExceeded => "hop limit exceeded",
            DropReason::NotForUs => "not for us",
            DropReason::NoStack => "no IPv6 stack",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TraceKind {
    FrameSent {
        device: DeviceId,
        dst: MacAddress,
        wire_bytes: usize,
    },
    FrameReceived {
        device: DeviceId,
        src: MacAddress,
        wire_bytes: usize,
    },
    FrameRelayed { device: DeviceId },
    FrameDropped { device: DeviceId, reason: DropReason },
    PacketForwarded { node: NodeId },
    PacketDelivered { node: NodeId, app: AppId, bytes: usize },
    PacketDropped { node: NodeId, reason: DropReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub time: VirtualTime,
    /// The event being handled when this was recorded.
    pub event_id: EventId,
    pub kind: TraceKind,
}

impl std::fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} E=#{}] ", self.time, self.event_id.raw())?;
        match &self.kind {
            TraceKind::FrameSent { device, dst, wire_bytes } => {
                write!(f, "{} tx {} bytes to {}", device, wire_bytes, dst)
            }
            TraceKind::FrameReceived { device, src, wire_bytes } => {
                write!(f, "{} rx {} bytes from {}", device, wire_bytes, src)
            }
            TraceKind::FrameRelayed { device } => write!(f, "{} relay", device),
            TraceKind::FrameDropped { device, reason } => write!(f, "{} drop: {}", device, reason),
            TraceKind::PacketForwarded { node } => write!(f, "{} forward", node),
            TraceKind::PacketDelivered { node, app, bytes } => {
                write!(f, "{} deliver {} bytes to {}", node, bytes, app)
            }
            TraceKind::PacketDropped { node, reason } => write!(f, "{} drop: {}", node, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let entry = TraceEntry {
            time: VirtualTime::from_secs(3),
            event_id: EventId::new(12),
            kind: TraceKind::FrameDropped {
                device: DeviceId::new(0),
                reason: DropReason::NoAdaptationLayer,
            },
        };
        assert_eq!(entry.to_string(), "[+3s E=#12] D0 drop: no adaptation layer");
    }
}
