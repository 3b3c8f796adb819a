//! Wired shared-medium devices.

use tracing::debug;

use crate::channel::{ChannelId, ChannelKind};
use crate::error::SimResult;
use crate::node::NodeContainer;
use crate::time::millis_to_nanos;
use crate::world::World;

use super::{DeviceContainer, DeviceId, DeviceRole};

pub const DEFAULT_DATA_RATE_BPS: u64 = 5_000_000;
pub const DEFAULT_DELAY_MS: u64 = 2;
pub const DEFAULT_MTU: u16 = 1500;

/// Builds CSMA segments: one channel, any number of attached devices.
///
/// Unlike a helper that makes a fresh channel per `install`, the channel is
/// created explicitly and passed in, so access point and stations share
/// one medium.
#[derive(Debug, Clone)]
pub struct CsmaHelper {
    data_rate_bps: u64,
    delay_ns: u64,
    mtu: u16,
    role: DeviceRole,
}

impl Default for CsmaHelper {
    fn default() -> Self {
        CsmaHelper {
            data_rate_bps: DEFAULT_DATA_RATE_BPS,
            delay_ns: millis_to_nanos(DEFAULT_DELAY_MS),
            mtu: DEFAULT_MTU,
            role: DeviceRole::Station,
        }
    }
}

impl CsmaHelper {
    pub fn new(data_rate_bps: u64, delay_ns: u64) -> Self {
        CsmaHelper {
            data_rate_bps,
            delay_ns,
            ..Default::default()
        }
    }

    pub fn set_mtu(&mut self, mtu: u16) -> &mut Self {
        self.mtu = mtu;
        self
    }

    pub fn set_role(&mut self, role: DeviceRole) -> &mut Self {
        self.role = role;
        self
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn create_channel(&self, world: &mut World) -> ChannelId {
        world.add_channel(ChannelKind::SharedMedium {
            data_rate_bps: self.data_rate_bps,
            delay_ns: self.delay_ns,
        })
    }

    /// One device per node, attached to `channel`, with fresh 48-bit MACs.
    pub fn install(
        &self,
        world: &mut World,
        channel: ChannelId,
        nodes: &NodeContainer,
    ) -> SimResult<DeviceContainer> {
        let mut devices = DeviceContainer::new();
        for node in nodes.iter() {
            let address = world.allocate_mac48();
            let id: DeviceId = world.add_device(node, channel, address, self.mtu)?;
            world.device_mut(id)?.role = self.role;
            debug!(device = %id, %node, %address, mtu = self.mtu, role = ?self.role, "CSMA device installed");
            devices.push(id);
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MacAddress;

    #[test]
    fn test_access_point_and_stations_share_channel() {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 3).unwrap();
        let mut csma = CsmaHelper::default();
        let channel = csma.create_channel(&mut world);

        csma.set_role(DeviceRole::AccessPoint);
        let ap = csma.install(&mut world, channel, &nodes.single(0).unwrap()).unwrap();
        csma.set_role(DeviceRole::Station).set_mtu(150);
        let stations = csma.install(&mut world, channel, &nodes).unwrap();

        assert_eq!(world.channel(channel).unwrap().devices().len(), 4);
        let ap_dev = world.device(ap.get(0).unwrap()).unwrap();
        assert_eq!(ap_dev.role, DeviceRole::AccessPoint);
        assert_eq!(ap_dev.mtu, 1500);
        assert_eq!(ap_dev.address, MacAddress::allocate_mac48(1));

        let st = world.device(stations.get(0).unwrap()).unwrap();
        assert_eq!(st.mtu, 150);
        assert_eq!(st.address, MacAddress::allocate_mac48(2));
        // Node 0 carries the AP device first, then its station device.
        let node0 = world.node(nodes.get(0).unwrap()).unwrap();
        assert_eq!(node0.devices.len(), 2);
    }
}
