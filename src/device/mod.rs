//! Link-layer devices.
//!
//! A [`NetDevice`] binds one node to one [`crate::channel::Channel`]. Its
//! link flavor is either CSMA (48-bit MAC, Ethernet framing) or LR-WPAN
//! (16-bit short address, IEEE 802.15.4 framing). A device may carry a
//! 6LoWPAN shim, which owns fragmentation and mesh-under forwarding.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`address`] | [`MacAddress`] and interface-identifier mapping |
//! | [`frame`] | [`Frame`], [`LinkPayload`], wire encoding |
//! | [`csma`] | [`CsmaHelper`] |
//! | [`lrwpan`] | [`LrWpanHelper`], simulated PAN association |
//! | [`sixlowpan`] | [`SixLowPanHelper`], [`LowpanShim`] |

pub mod address;
pub mod csma;
pub mod frame;
pub mod lrwpan;
pub mod sixlowpan;

pub use address::MacAddress;
pub use csma::CsmaHelper;
pub use frame::{Frame, LinkPayload};
pub use lrwpan::LrWpanHelper;
pub use sixlowpan::{LowpanShim, SixLowPanHelper};

use serde::Serialize;

use crate::channel::ChannelId;
use crate::error::{SimError, SimResult};
use crate::node::NodeId;

/// Index of a device in the [`crate::world::World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceId(u32);

impl DeviceId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        DeviceId(raw)
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

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// What part a device plays in its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceRole {
    Station,
    /// Wired access point. Never wrapped with an adaptation shim.
    AccessPoint,
    /// LR-WPAN PAN coordinator.
    Coordinator,
}

/// LR-WPAN association state, filled in by [`LrWpanHelper::associate_to_pan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PanAssociation {
    pub pan_id: u16,
    pub coordinator: MacAddress,
}

/// Per-device counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
    /// Frames received but discarded (no shim, duplicate, malformed, ...).
    pub rx_dropped: u64,
    /// Packets refused on output (too large for the MTU, no neighbor).
    pub tx_dropped: u64,
    /// Mesh-under frames re-broadcast on behalf of other nodes.
    pub relayed: u64,
}

#[derive(Debug, Clone)]
pub struct NetDevice {
    pub id: DeviceId,
    pub node: NodeId,
    pub channel: ChannelId,
    pub address: MacAddress,
    pub role: DeviceRole,
    /// Largest network-layer payload one frame can carry.
    pub mtu: u16,
    pub association: Option<PanAssociation>,
    pub lowpan: Option<LowpanShim>,
    pub stats: DeviceStats,
    /// IEEE 802.15.4 data sequence number.
    pub(crate) next_seq: u8,
}

impl NetDevice {
    pub(crate) fn new(
        id: DeviceId,
        node: NodeId,
        channel: ChannelId,
        address: MacAddress,
        mtu: u16,
    ) -> Self {
        NetDevice {
            id,
            node,
            channel,
            address,
            role: DeviceRole::Station,
            mtu,
            association: None,
            lowpan: None,
            stats: DeviceStats::default(),
            next_seq: 0,
        }
    }

    pub fn is_adapted(&self) -> bool {
        self.lowpan.is_some()
    }

    /// Whether the shim has mesh-under forwarding enabled.
    pub fn mesh_under(&self) -> bool {
        self.lowpan.as_ref().is_some_and(|s| s.mesh_under())
    }

    /// Whether a frame addressed to `dst` is meant for this device.
    pub fn accepts(&self, dst: &MacAddress) -> bool {
        dst.is_broadcast() || *dst == self.address
    }

    pub(crate) fn take_seq(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}

/// Device handles, in node order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceContainer {
    devices: Vec<DeviceId>,
}

impl DeviceContainer {
    pub fn new() -> Self {
        DeviceContainer {
            devices: Vec::new(),
        }
    }

    pub fn from_devices(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        DeviceContainer {
            devices: devices.into_iter().collect(),
        }
    }

    pub fn push(&mut self, device: DeviceId) {
        self.devices.push(device);
    }

    pub fn get(&self, index: usize) -> SimResult<DeviceId> {
        self.devices
            .get(index)
            .copied()
            .ok_or(SimError::IndexOutOfRange {
                collection: "device",
                index,
                len: self.devices.len(),
            })
    }

    pub fn first(&self) -> Option<DeviceId> {
        self.devices.first().copied()
    }

    pub fn last(&self) -> Option<DeviceId> {
        self.devices.last().copied()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().copied()
    }
}
