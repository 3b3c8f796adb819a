//! IEEE 802.15.4 (LR-WPAN) devices and simulated PAN association.

use tracing::{debug, info};

use crate::channel::{ChannelId, ChannelKind};
use crate::error::{SimError, SimResult};
use crate::node::NodeContainer;
use crate::world::World;

use super::address::{MacAddress, SHORT_ADDR_UNASSIGNED};
use super::{DeviceContainer, DeviceRole, PanAssociation};

pub const DEFAULT_DATA_RATE_BPS: u64 = 250_000;
pub const DEFAULT_CHANNEL_NUMBER: u8 = 11;
/// aMaxPHYPacketSize (127) less the MAC header and FCS used here.
pub const LRWPAN_MTU: u16 = 102;
/// Short addresses are handed out from here.
const FIRST_SHORT_ADDRESS: u16 = 0x0001;

#[derive(Debug, Clone)]
pub struct LrWpanHelper {
    data_rate_bps: u64,
    channel_number: u8,
}

impl Default for LrWpanHelper {
    fn default() -> Self {
        LrWpanHelper::new(DEFAULT_DATA_RATE_BPS, DEFAULT_CHANNEL_NUMBER)
    }
}

impl LrWpanHelper {
    pub fn new(data_rate_bps: u64, channel_number: u8) -> Self {
        LrWpanHelper {
            data_rate_bps,
            channel_number,
        }
    }

    /// Create one radio channel and attach a device on every node.
    ///
    /// Devices start unassociated (short address `0xfffe`).
    pub fn install(&self, world: &mut World, nodes: &NodeContainer) -> SimResult<DeviceContainer> {
        let channel: ChannelId = world.add_channel(ChannelKind::Radio {
            data_rate_bps: self.data_rate_bps,
            channel_number: self.channel_number,
        });
        let mut devices = DeviceContainer::new();
        for node in nodes.iter() {
            let id = world.add_device(node, channel, MacAddress::Short(SHORT_ADDR_UNASSIGNED), LRWPAN_MTU)?;
            debug!(device = %id, %node, %channel, "LR-WPAN device installed");
            devices.push(id);
        }
        Ok(devices)
    }

    /// Associate every device to `pan_id`.
    ///
    /// No beacons or association frames are exchanged. The first device
    /// becomes coordinator; short addresses are assigned sequentially from
    /// `0x0001` in container order.
    pub fn associate_to_pan(world: &mut World, devices: &DeviceContainer, pan_id: u16) -> SimResult<()> {
        if devices.is_empty() {
            return Err(SimError::InvalidScenario("cannot form a PAN with no devices".into()));
        }
        let coordinator = MacAddress::Short(FIRST_SHORT_ADDRESS);
        for (i, id) in devices.iter().enumerate() {
            let short = u16::try_from(i)
                .ok()
                .and_then(|i| FIRST_SHORT_ADDRESS.checked_add(i))
                .filter(|s| *s < SHORT_ADDR_UNASSIGNED)
                .ok_or_else(|| SimError::InvalidScenario("PAN short address space exhausted".into()))?;
            let device = world.device_mut(id)?;
            if !matches!(device.address, MacAddress::Short(_)) {
                return Err(SimError::InvalidScenario(format!("{} is not an LR-WPAN device", id)));
            }
            device.address = MacAddress::Short(short);
            device.role = if i == 0 { DeviceRole::Coordinator } else { DeviceRole::Station };
            device.association = Some(PanAssociation { pan_id, coordinator });
        }
        info!(pan_id, devices = devices.len(), "PAN associated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_leaves_devices_unassociated() {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 3).unwrap();
        let devices = LrWpanHelper::default().install(&mut world, &nodes).unwrap();
        assert_eq!(devices.len(), 3);
        for id in devices.iter() {
            let dev = world.device(id).unwrap();
            assert_eq!(dev.address, MacAddress::Short(SHORT_ADDR_UNASSIGNED));
            assert_eq!(dev.mtu, LRWPAN_MTU);
            assert!(dev.association.is_none());
        }
        assert_eq!(world.channels().len(), 1);
    }

    #[test]
    fn test_associate_assigns_sequential_short_addresses() {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 3).unwrap();
        let devices = LrWpanHelper::default().install(&mut world, &nodes).unwrap();
        LrWpanHelper::associate_to_pan(&mut world, &devices, 0).unwrap();

        let shorts: Vec<_> = devices.iter().map(|d| world.device(d).unwrap().address).collect();
        assert_eq!(
            shorts,
            vec![MacAddress::Short(1), MacAddress::Short(2), MacAddress::Short(3)]
        );
        let coord = world.device(devices.get(0).unwrap()).unwrap();
        assert_eq!(coord.role, DeviceRole::Coordinator);
        let other = world.device(devices.get(2).unwrap()).unwrap();
        assert_eq!(
            other.association,
            Some(PanAssociation {
                pan_id: 0,
                coordinator: MacAddress::Short(1)
            })
        );
    }

    #[test]
    fn test_associate_empty_is_rejected() {
        let mut world = World::new();
        let err = LrWpanHelper::associate_to_pan(&mut world, &DeviceContainer::new(), 0).unwrap_err();
        assert!(matches!(err, SimError::InvalidScenario(_)));
    }
}
