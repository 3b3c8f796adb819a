//! Wired variant: one CSMA segment.
//!
//! Node 0 carries the access point device (default MTU, no shim). Every
//! other node carries a station device with a small MTU wrapped by a
//! 6LoWPAN shim. Station addresses are tracked; the access point's is
//! not. The echo server runs on node 1, the client on node 0.

use tracing::info;

use crate::config::ScenarioConfig;
use crate::device::{CsmaHelper, DeviceContainer, DeviceRole, SixLowPanHelper};
use crate::error::{SimError, SimResult};
use crate::node::NodeContainer;
use crate::time::millis_to_nanos;
use crate::world::World;

use super::{address_helper, install_internet, Wiring};

pub(crate) fn wire(world: &mut World, nodes: &NodeContainer, config: &ScenarioConfig) -> SimResult<Wiring> {
    let cfg = &config.csma;
    let ap_node = nodes.single(0)?;
    let station_nodes = NodeContainer::from_nodes(nodes.iter().skip(1));
    if station_nodes.is_empty() {
        return Err(SimError::InvalidScenario("wired scenario needs at least one station".into()));
    }

    let mut csma = CsmaHelper::new(cfg.data_rate_bps, millis_to_nanos(cfg.delay_ms));
    let channel = csma.create_channel(world);
    csma.set_role(DeviceRole::AccessPoint).set_mtu(cfg.ap_mtu);
    let ap_devices = csma.install(world, channel, &ap_node)?;
    csma.set_role(DeviceRole::Station).set_mtu(cfg.station_mtu);
    let station_devices = csma.install(world, channel, &station_nodes)?;

    let station_devices = SixLowPanHelper::new()
        .force_ether_type(cfg.force_ether_type)
        .install(world, &station_devices)?;
    info!(
        target: "amisim::scenario",
        stations = station_devices.len(),
        station_mtu = cfg.station_mtu,
        "CSMA segment installed"
    );

    install_internet(world, nodes)?;
    let addresses = address_helper();
    let station_ifaces = addresses.assign(world, &station_devices)?;
    addresses.assign(world, &ap_devices)?;
    info!(target: "amisim::scenario", prefix = %addresses.prefix(), "addresses assigned");

    let server_node = station_ifaces.node(0)?;
    let server_address = station_ifaces.address(0)?;
    let client_node = nodes.get(0).ok_or(SimError::IndexOutOfRange {
        collection: "node",
        index: 0,
        len: nodes.len(),
    })?;

    let devices = DeviceContainer::from_devices(ap_devices.iter().chain(station_devices.iter()));
    Ok(Wiring {
        devices,
        traced: ap_devices,
        interfaces: station_ifaces,
        server_node,
        client_node,
        server_address,
    })
}
