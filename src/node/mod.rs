//! Nodes and the topology builder.
//!
//! A node is a bare simulation participant: an ordinal index plus the
//! devices, applications, and position later attached to it. Nodes are
//! created once per run and never removed.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`] newtype |
//! | [`container`] | [`NodeContainer`], the topology builder |

pub mod container;
pub mod id;

pub use container::NodeContainer;
pub use id::NodeId;

use crate::app::AppId;
use crate::device::DeviceId;
use crate::mobility::Position;

/// A simulated node. Owned by [`crate::world::World`].
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Devices in installation order.
    pub devices: Vec<DeviceId>,
    pub apps: Vec<AppId>,
    /// Set once by the mobility helper. `None` for unplaced nodes.
    pub position: Option<Position>,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Node {
            id,
            devices: Vec::new(),
            apps: Vec::new(),
            position: None,
        }
    }

    /// Position of `device` within this node's device list.
    ///
    /// Used to name capture files `<prefix>-<node>-<index>.pcap`.
    pub fn device_index(&self, device: DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| *d == device)
    }
}
