/// Event system for the scenario kernel.
///
/// Every effect in a run is modeled as an `Event`. Events are immutable
/// records that are placed on the scheduler's priority queue and dispatched
/// in deterministic order.
use std::cmp::Ordering;
use std::net::SocketAddrV6;

use serde::Serialize;

use crate::app::AppId;
use crate::device::{DeviceId, Frame};
use crate::node::NodeId;
use crate::time::VirtualTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A unique, strictly increasing event identifier.
///
/// Two events scheduled at the same `VirtualTime` are ordered by their
/// `EventId`, which corresponds to creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Strictly increasing event-ID generator. One per `Scheduler`.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event Type ────────────────────────────────────────────────────────

/// The payload of an event.
///
/// Application lifecycle events (`AppStart`, `AppStop`, `AppTimer`) are
/// routed to the owning application. `DatagramSend` enters the sending
/// node's IPv6 stack; `FrameArrival` enters a device from its channel.
/// `Stop` ends the run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// Absolute stop time reached. The run loop returns after this event.
    Stop,

    /// An application enters its active window.
    AppStart { app: AppId },

    /// An application leaves its active window.
    AppStop { app: AppId },

    /// A timer previously armed by an application.
    AppTimer { app: AppId, timer_id: u64 },

    /// A UDP datagram handed to the node's IPv6 stack for output.
    DatagramSend {
        node: NodeId,
        src_port: u16,
        dst: SocketAddrV6,
        payload: Vec<u8>,
    },

    /// A link-layer frame finished propagating to `device`.
    FrameArrival { device: DeviceId, frame: Frame },
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Stop => write!(f, "Stop"),
            EventType::AppStart { app } => write!(f, "AppStart({})", app),
            EventType::AppStop { app } => write!(f, "AppStop({})", app),
            EventType::AppTimer { app, timer_id } => {
                write!(f, "AppTimer({}, #{})", app, timer_id)
            }
            EventType::DatagramSend {
                node, dst, payload, ..
            } => write!(f, "Send({} → {}, {} bytes)", node, dst, payload.len()),
            EventType::FrameArrival { device, frame } => {
                write!(f, "Arrive({}, {} bytes)", device, frame.wire_len())
            }
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single scheduled event, ordered by `(scheduled_at, id)`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub scheduled_at: VirtualTime,
    pub payload: EventType,
}

impl Event {
    pub fn new(id: EventId, scheduled_at: VirtualTime, payload: EventType) -> Self {
        Event {
            id,
            scheduled_at,
            payload,
        }
    }
}

/// Smallest `(scheduled_at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_monotonic() {
        let mut gen = EventIdGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(gen.peek().raw(), 2);
    }

    #[test]
    fn test_event_ordering_by_time() {
        let early = Event::new(EventId::new(1), VirtualTime::from_secs(1), EventType::Stop);
        let late = Event::new(EventId::new(0), VirtualTime::from_secs(2), EventType::Stop);
        // Reversed ordering: the earlier event compares greater.
        assert!(early > late);
    }

    #[test]
    fn test_event_ordering_tiebreak_by_id() {
        let at = VirtualTime::from_secs(1);
        let first = Event::new(EventId::new(0), at, EventType::AppStart { app: AppId::new(0) });
        let second = Event::new(EventId::new(1), at, EventType::Stop);
        assert!(first > second);
    }

    #[test]
    fn test_event_display() {
        let e = EventType::AppTimer {
            app: AppId::new(3),
            timer_id: 7,
        };
        assert_eq!(e.to_string(), "AppTimer(A3, #7)");
        assert_eq!(EventType::Stop.to_string(), "Stop");
    }
}
