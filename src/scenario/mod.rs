//! Scenario assembly and the run controller.
//!
//! [`Scenario::build`] walks the four setup phases for the configured
//! [`LinkVariant`]: topology, devices and links, addressing and routing,
//! applications. [`Scenario::run`] then sets the stop time, opens capture
//! files, runs the kernel, builds the [`ScenarioReport`], and destroys
//! the simulation.
//!
//! | Sub-module | Variant |
//! |---|---|
//! | [`wired`] | CSMA access point plus 6LoWPAN stations |
//! | [`wireless`] | LR-WPAN PAN, optional mesh-under |

pub mod wired;
pub mod wireless;

use std::net::Ipv6Addr;

use tracing::info;

use crate::app::{AppId, UdpEchoClientHelper, UdpEchoServerHelper};
use crate::config::{LinkVariant, ScenarioConfig};
use crate::device::DeviceContainer;
use crate::error::{SimError, SimResult};
use crate::internet::{
    InternetStackHelper, Ipv6AddressHelper, Ipv6InterfaceContainer, Ipv6ListRoutingHelper,
    Ipv6StaticRoutingHelper,
};
use crate::mobility::{MobilityHelper, RandomRectanglePositionAllocator};
use crate::node::{NodeContainer, NodeId};
use crate::report::ScenarioReport;
use crate::simulation::Simulation;
use crate::time::VirtualTime;
use crate::world::World;

/// Base of the single global prefix.
pub const GLOBAL_PREFIX: Ipv6Addr = Ipv6Addr::new(0x2001, 1, 0, 0, 0, 0, 0, 0);
pub const GLOBAL_PREFIX_LEN: u8 = 64;
/// Priority of the static table inside the list router.
const STATIC_ROUTING_PRIORITY: i16 = 1;

/// A fully configured, not yet run scenario.
#[derive(Debug)]
pub struct Scenario {
    config: ScenarioConfig,
    sim: Simulation,
    world: World,
    nodes: NodeContainer,
    /// Every device, in installation order.
    devices: DeviceContainer,
    /// Devices that get a capture file when tracing is on.
    traced: DeviceContainer,
    /// Addresses kept for later lookup (stations / all radios).
    interfaces: Ipv6InterfaceContainer,
    server: AppId,
    client: AppId,
}

/// What the variant builders hand back to [`Scenario::build`].
pub(crate) struct Wiring {
    pub devices: DeviceContainer,
    pub traced: DeviceContainer,
    pub interfaces: Ipv6InterfaceContainer,
    pub server_node: NodeId,
    pub client_node: NodeId,
    pub server_address: Ipv6Addr,
}

impl Scenario {
    pub fn build(config: ScenarioConfig) -> SimResult<Self> {
        config.validate()?;
        let mut world = World::new();
        let mut sim = Simulation::new();

        let nodes = NodeContainer::create(&mut world, config.nodes)?;
        info!(target: "amisim::scenario", variant = %config.variant, nodes = nodes.len(), "topology created");

        let allocator =
            RandomRectanglePositionAllocator::new(config.area.width, config.area.height, config.seed);
        MobilityHelper::new(allocator).install(&mut world, &nodes)?;

        let wiring = match config.variant {
            LinkVariant::Csma => wired::wire(&mut world, &nodes, &config)?,
            LinkVariant::LrWpan => wireless::wire(&mut world, &nodes, &config)?,
        };

        let (server, client) = install_echo(
            &mut sim,
            &mut world,
            &config,
            wiring.server_node,
            wiring.client_node,
            wiring.server_address,
        )?;

        Ok(Scenario {
            config,
            sim,
            world,
            nodes,
            devices: wiring.devices,
            traced: wiring.traced,
            interfaces: wiring.interfaces,
            server,
            client,
        })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn nodes(&self) -> &NodeContainer {
        &self.nodes
    }

    pub fn devices(&self) -> &DeviceContainer {
        &self.devices
    }

    pub fn traced_devices(&self) -> &DeviceContainer {
        &self.traced
    }

    pub fn interfaces(&self) -> &Ipv6InterfaceContainer {
        &self.interfaces
    }

    pub fn server(&self) -> AppId {
        self.server
    }

    pub fn client(&self) -> AppId {
        self.client
    }

    /// Every global address on every node, in node then interface order.
    pub fn global_addresses(&self) -> Vec<Ipv6Addr> {
        self.world
            .stacks()
            .flat_map(|s| s.interfaces().iter().map(|i| i.global))
            .collect()
    }

    /// Run to the configured duration and tear down.
    pub fn run(mut self) -> SimResult<ScenarioReport> {
        let stop = secs(self.config.duration_secs)?;
        self.sim.stop_at(stop)?;

        if self.config.tracing {
            std::fs::create_dir_all(&self.config.output_dir)?;
            let prefix = self.config.variant.capture_prefix();
            for device in self.traced.iter() {
                self.world
                    .enable_capture(device, &self.config.output_dir, prefix)?;
            }
        }

        info!(target: "amisim::scenario", stop = %stop, "running");
        let processed = self.sim.run(&mut self.world)?;
        info!(target: "amisim::scenario", events = processed, now = %self.sim.current_time(), "run finished");

        let mut report = ScenarioReport::collect(&self.config, &self.sim, &self.world, self.server, self.client)?;

        let discarded = self.sim.destroy();
        report.captures = self.world.destroy()?;
        info!(target: "amisim::scenario", discarded, captures = report.captures.len(), "simulation destroyed");
        Ok(report)
    }
}

/// IPv6-only stacks with a list router holding one static table.
pub(crate) fn install_internet(world: &mut World, nodes: &NodeContainer) -> SimResult<()> {
    let mut routing = Ipv6ListRoutingHelper::new();
    routing.add(Ipv6StaticRoutingHelper, STATIC_ROUTING_PRIORITY);
    let mut stack = InternetStackHelper::new();
    stack.set_ipv4_stack_install(false).set_routing_helper(routing);
    stack.install(world, nodes)
}

pub(crate) fn address_helper() -> Ipv6AddressHelper {
    Ipv6AddressHelper::new(GLOBAL_PREFIX, GLOBAL_PREFIX_LEN)
}

fn install_echo(
    sim: &mut Simulation,
    world: &mut World,
    config: &ScenarioConfig,
    server_node: NodeId,
    client_node: NodeId,
    server_address: Ipv6Addr,
) -> SimResult<(AppId, AppId)> {
    let echo = &config.echo;
    let stop = secs(config.duration_secs)?;

    let mut server_apps = UdpEchoServerHelper::new(echo.port).install(world, server_node)?;
    server_apps.start(sim, world, secs(echo.server_start_secs)?)?;
    server_apps.stop(sim, world, stop)?;

    let mut client = UdpEchoClientHelper::new(server_address, echo.port);
    client
        .set_max_packets(echo.max_packets)
        .set_interval(secs(echo.interval_secs)?.as_nanos())
        .set_packet_size(echo.packet_size);
    let mut client_apps = client.install(world, client_node)?;
    client_apps.start(sim, world, secs(echo.client_start_secs)?)?;
    client_apps.stop(sim, world, stop)?;

    info!(
        target: "amisim::scenario",
        server = %server_node,
        client = %client_node,
        target_addr = %server_address,
        port = echo.port,
        "echo applications installed"
    );
    Ok((server_apps.get(0)?, client_apps.get(0)?))
}

fn secs(value: f64) -> SimResult<VirtualTime> {
    VirtualTime::from_secs_f64(value)
        .ok_or_else(|| SimError::InvalidScenario(format!("{} is not a valid time in seconds", value)))
}

#[cfg(test)]
mod tests;
