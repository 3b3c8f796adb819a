//! Run report: a serializable snapshot taken after the kernel stops.

use std::net::Ipv6Addr;
use std::path::PathBuf;

use serde::Serialize;

use crate::app::echo::EchoRecord;
use crate::app::{AppId, UdpEchoClient, UdpEchoServer};
use crate::channel::ChannelKind;
use crate::config::{LinkVariant, ScenarioConfig};
use crate::device::sixlowpan::LowpanStats;
use crate::device::{DeviceRole, DeviceStats};
use crate::error::SimResult;
use crate::internet::{StackStats, StaticRouting};
use crate::mobility::Position;
use crate::simulation::Simulation;
use crate::time::VirtualTime;
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub id: u32,
    pub position: Option<Position>,
    pub addresses: Vec<Ipv6Addr>,
    pub default_gateway: Option<Ipv6Addr>,
    pub forwarding: bool,
    pub stack: Option<StackStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub id: u32,
    pub node: u32,
    pub address: String,
    pub role: DeviceRole,
    pub mtu: u16,
    pub pan_id: Option<u16>,
    pub adapted: bool,
    pub mesh_under: bool,
    pub mesh_radius: Option<u8>,
    pub stats: DeviceStats,
    pub lowpan: Option<LowpanStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppReport {
    pub id: u32,
    pub node: u32,
    pub kind: &'static str,
    pub port: u16,
    pub start: Option<VirtualTime>,
    pub stop: Option<VirtualTime>,
    pub sent: Vec<EchoRecord>,
    pub received: Vec<EchoRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelReport {
    pub id: u32,
    pub kind: ChannelKind,
    pub transmissions: usize,
    pub bytes_carried: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub variant: LinkVariant,
    pub seed: u64,
    pub mesh_under: bool,
    pub end_time: VirtualTime,
    pub events_processed: u64,
    pub nodes: Vec<NodeReport>,
    pub devices: Vec<DeviceReport>,
    pub channels: Vec<ChannelReport>,
    pub server: AppReport,
    pub client: AppReport,
    pub trace_entries: usize,
    /// Filled in when the world is destroyed.
    pub captures: Vec<PathBuf>,
}

impl ScenarioReport {
    pub fn collect(
        config: &ScenarioConfig,
        sim: &Simulation,
        world: &World,
        server: AppId,
        client: AppId,
    ) -> SimResult<Self> {
        let nodes = world
            .nodes()
            .iter()
            .map(|node| {
                let stack = world.stack(node.id).ok();
                let interfaces = stack.map(|s| s.interfaces()).unwrap_or_default();
                NodeReport {
                    id: node.id.raw(),
                    position: node.position,
                    addresses: interfaces.iter().map(|i| i.global).collect(),
                    default_gateway: stack
                        .and_then(|s| s.routing().protocol::<StaticRouting>())
                        .and_then(|r| r.default_route())
                        .and_then(|r| r.gateway),
                    forwarding: interfaces.iter().any(|i| i.forwarding),
                    stack: stack.map(|s| s.stats.clone()),
                }
            })
            .collect();

        let devices = world
            .devices()
            .iter()
            .map(|d| DeviceReport {
                id: d.id.raw(),
                node: d.node.raw(),
                address: d.address.to_string(),
                role: d.role,
                mtu: d.mtu,
                pan_id: d.association.map(|a| a.pan_id),
                adapted: d.is_adapted(),
                mesh_under: d.mesh_under(),
                mesh_radius: d.lowpan.as_ref().filter(|s| s.mesh_under()).map(|s| s.mesh_radius()),
                stats: d.stats.clone(),
                lowpan: d.lowpan.as_ref().map(|s| s.stats.clone()),
            })
            .collect();

        let channels = world
            .channels()
            .iter()
            .map(|c| ChannelReport {
                id: c.id().raw(),
                kind: c.kind().clone(),
                transmissions: c.transmission_count(),
                bytes_carried: c.bytes_carried(),
            })
            .collect();

        Ok(ScenarioReport {
            variant: config.variant,
            seed: config.seed,
            mesh_under: config.mesh_under,
            end_time: sim.current_time(),
            events_processed: sim.events_processed(),
            nodes,
            devices,
            channels,
            server: app_report(world, server)?,
            client: app_report(world, client)?,
            trace_entries: world.trace.len(),
            captures: Vec::new(),
        })
    }

    /// One line per echo application.
    pub fn summary(&self) -> Vec<String> {
        [&self.client, &self.server]
            .iter()
            .map(|a| {
                format!(
                    "{} on N{} port {}: sent {} / received {}",
                    a.kind,
                    a.node,
                    a.port,
                    a.sent.len(),
                    a.received.len()
                )
            })
            .collect()
    }
}

fn app_report(world: &World, id: AppId) -> SimResult<AppReport> {
    let slot = world.app_slot(id)?;
    let (sent, received) = if let Some(c) = world.app::<UdpEchoClient>(id) {
        (c.sent.clone(), c.received.clone())
    } else if let Some(s) = world.app::<UdpEchoServer>(id) {
        (s.sent.clone(), s.received.clone())
    } else {
        (Vec::new(), Vec::new())
    };
    Ok(AppReport {
        id: id.raw(),
        node: slot.node.raw(),
        kind: slot.kind(),
        port: slot.port,
        start: slot.start,
        stop: slot.stop,
        sent,
        received,
    })
}
