/// Shared transmission media.
///
/// A channel is the medium every attached device hears. It models
/// serialization time at a fixed data rate, a propagation delay (fixed for
/// the wired medium, distance over the speed of light for radio), and
/// half-duplex occupancy: a frame cannot start until the medium is idle.
/// There is no loss, fading, or collision model.
use serde::Serialize;

use crate::device::DeviceId;
use crate::mobility::Position;
use crate::time::{serialization_delay, VirtualTime};

/// Speed of light in m/s.
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Index of a channel in the [`crate::world::World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChannelId(u32);

impl ChannelId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        ChannelId(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C{}", self.0)
    }
}

// ── Channel Kind ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChannelKind {
    /// CSMA-style wired segment.
    SharedMedium { data_rate_bps: u64, delay_ns: u64 },
    /// IEEE 802.15.4 radio channel.
    Radio { data_rate_bps: u64, channel_number: u8 },
}

impl ChannelKind {
    pub fn data_rate_bps(&self) -> u64 {
        match self {
            ChannelKind::SharedMedium { data_rate_bps, .. } => *data_rate_bps,
            ChannelKind::Radio { data_rate_bps, .. } => *data_rate_bps,
        }
    }
}

// ── Transmission Log ──────────────────────────────────────────────────

/// One frame put on the medium.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transmission {
    pub sender: DeviceId,
    /// When the first bit left the sender (after waiting for idle).
    pub start: VirtualTime,
    /// When the last bit left the sender.
    pub end: VirtualTime,
    pub wire_bytes: usize,
}

impl Transmission {
    /// Time spent waiting for the medium.
    pub fn deferral(&self, requested: VirtualTime) -> u64 {
        self.start.duration_since(requested).unwrap_or(0)
    }
}

// ── Channel ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    kind: ChannelKind,
    devices: Vec<DeviceId>,
    busy_until: VirtualTime,
    /// Append-only log of every transmission.
    log: Vec<Transmission>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, kind: ChannelKind) -> Self {
        Channel {
            id,
            kind,
            devices: Vec::new(),
            busy_until: VirtualTime::ZERO,
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    pub(crate) fn attach(&mut self, device: DeviceId) {
        self.devices.push(device);
    }

    /// Attached devices in attachment order.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Occupy the medium for `wire_bytes`, starting no earlier than `now`.
    pub(crate) fn reserve(&mut self, now: VirtualTime, sender: DeviceId, wire_bytes: usize) -> Transmission {
        let start = now.max(self.busy_until);
        let end = start.saturating_advance(serialization_delay(wire_bytes, self.kind.data_rate_bps()));
        self.busy_until = end;
        let tx = Transmission {
            sender,
            start,
            end,
            wire_bytes,
        };
        self.log.push(tx.clone());
        tx
    }

    /// Delay between the last bit leaving `from` and reaching `to`.
    pub fn propagation_delay(&self, from: Option<Position>, to: Option<Position>) -> u64 {
        match self.kind {
            ChannelKind::SharedMedium { delay_ns, .. } => delay_ns,
            ChannelKind::Radio { .. } => match (from, to) {
                (Some(a), Some(b)) => (a.distance(&b) / SPEED_OF_LIGHT * 1e9).round() as u64,
                _ => 0,
            },
        }
    }

    pub fn busy_until(&self) -> VirtualTime {
        self.busy_until
    }

    pub fn log(&self) -> &[Transmission] {
        &self.log
    }

    pub fn transmission_count(&self) -> usize {
        self.log.len()
    }

    /// Total bytes carried, including link-layer overhead.
    pub fn bytes_carried(&self) -> usize {
        self.log.iter().map(|t| t.wire_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::millis_to_nanos;

    fn csma() -> Channel {
        Channel::new(
            ChannelId::new(0),
            ChannelKind::SharedMedium {
                data_rate_bps: 5_000_000,
                delay_ns: millis_to_nanos(2),
            },
        )
    }

    #[test]
    fn test_reserve_on_idle_medium_starts_now() {
        let mut ch = csma();
        let now = VirtualTime::from_secs(2);
        let tx = ch.reserve(now, DeviceId::new(0), 625);
        assert_eq!(tx.start, now);
        // 625 bytes at 5 Mbit/s is 1 ms.
        assert_eq!(tx.end, VirtualTime::from_millis(2_001));
        assert_eq!(ch.busy_until(), tx.end);
    }

    #[test]
    fn test_back_to_back_frames_defer() {
        let mut ch = csma();
        let now = VirtualTime::from_secs(1);
        let first = ch.reserve(now, DeviceId::new(0), 625);
        let second = ch.reserve(now, DeviceId::new(1), 625);
        assert_eq!(second.start, first.end);
        assert_eq!(second.deferral(now), millis_to_nanos(1));
        assert_eq!(ch.transmission_count(), 2);
        assert_eq!(ch.bytes_carried(), 1250);
    }

    #[test]
    fn test_wired_propagation_is_fixed() {
        let ch = csma();
        let a = Some(Position::new(0.0, 0.0, 0.0));
        let b = Some(Position::new(40.0, 30.0, 0.0));
        assert_eq!(ch.propagation_delay(a, b), millis_to_nanos(2));
    }

    #[test]
    fn test_radio_propagation_follows_distance() {
        let ch = Channel::new(
            ChannelId::new(1),
            ChannelKind::Radio {
                data_rate_bps: 250_000,
                channel_number: 11,
            },
        );
        let a = Some(Position::new(0.0, 0.0, 0.0));
        let b = Some(Position::new(299.792458, 0.0, 0.0));
        // ~300 m is one microsecond of flight.
        assert_eq!(ch.propagation_delay(a, b), 1_000);
        assert_eq!(ch.propagation_delay(None, b), 0);
    }
}
