//! Wireless variant: one LR-WPAN PAN with 6LoWPAN on every device.
//!
//! Device 0 is the coordinator; its interface forwards and is every other
//! node's default route. The echo server runs on the last node, the
//! client on node 0. With mesh-under on, every shim re-broadcasts frames
//! for other nodes within the hop radius.

use tracing::info;

use crate::config::ScenarioConfig;
use crate::device::{DeviceContainer, LrWpanHelper, SixLowPanHelper};
use crate::error::{SimError, SimResult};
use crate::node::NodeContainer;
use crate::world::World;

use super::{address_helper, install_internet, Wiring};

pub(crate) fn wire(world: &mut World, nodes: &NodeContainer, config: &ScenarioConfig) -> SimResult<Wiring> {
    let cfg = &config.lrwpan;
    let radios = LrWpanHelper::new(cfg.data_rate_bps, cfg.channel_number).install(world, nodes)?;
    LrWpanHelper::associate_to_pan(world, &radios, cfg.pan_id)?;

    let devices = SixLowPanHelper::new().install(world, &radios)?;
    if config.mesh_under {
        SixLowPanHelper::enable_mesh_under(world, &devices, config.mesh_radius)?;
    }
    info!(
        target: "amisim::scenario",
        pan_id = cfg.pan_id,
        channel = cfg.channel_number,
        mesh_under = config.mesh_under,
        "LR-WPAN installed"
    );

    install_internet(world, nodes)?;
    let ifaces = address_helper().assign(world, &devices)?;
    ifaces.set_forwarding(world, 0, true)?;
    ifaces.set_default_route_in_all_nodes(world, 0)?;
    info!(target: "amisim::scenario", router = %ifaces.address(0)?, "addresses and default routes assigned");

    let last = ifaces.len().checked_sub(1).ok_or(SimError::IndexOutOfRange {
        collection: "interface",
        index: 0,
        len: 0,
    })?;
    let traced = DeviceContainer::from_devices([devices.get(0)?, devices.get(last)?]);
    Ok(Wiring {
        server_node: ifaces.node(last)?,
        server_address: ifaces.address(last)?,
        client_node: ifaces.node(0)?,
        devices,
        traced,
        interfaces: ifaces,
    })
}
