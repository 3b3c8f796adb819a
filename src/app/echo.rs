//! UDP echo server and client.
//!
//! The server returns every datagram it receives while active to its
//! sender. The client sends `max_packets` fixed-size datagrams at a fixed
//! interval and records the replies. Both log at `info` under the
//! `amisim::app` target.

use std::any::Any;
use std::net::{Ipv6Addr, SocketAddrV6};

use serde::Serialize;
use tracing::info;

use crate::error::SimResult;
use crate::node::NodeId;
use crate::simulation::SimulationContext;
use crate::time::{secs_to_nanos, VirtualTime};
use crate::world::World;

use super::{AppEvent, AppId, Application, ApplicationContainer};

pub const DEFAULT_ECHO_PORT: u16 = 9;

/// One datagram sent or received by an echo application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EchoRecord {
    pub time: VirtualTime,
    pub peer: SocketAddrV6,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
    id: AppId,
    node: NodeId,
    port: u16,
}

// ── Server ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UdpEchoServer {
    port: u16,
    binding: Option<Binding>,
    active: bool,
    pub received: Vec<EchoRecord>,
    pub sent: Vec<EchoRecord>,
}

impl UdpEchoServer {
    pub fn new(port: u16) -> Self {
        UdpEchoServer {
            port,
            binding: None,
            active: false,
            received: Vec::new(),
            sent: Vec::new(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Application for UdpEchoServer {
    fn kind(&self) -> &'static str {
        "echo-server"
    }

    fn requested_port(&self) -> Option<u16> {
        Some(self.port)
    }

    fn on_install(&mut self, id: AppId, node: NodeId, port: u16) {
        self.binding = Some(Binding { id, node, port });
    }

    fn on_event(&mut self, ctx: &mut SimulationContext, event: AppEvent) {
        let Some(binding) = self.binding else {
            return;
        };
        match event {
            AppEvent::Start => self.active = true,
            AppEvent::Stop => self.active = false,
            AppEvent::Timer { .. } => {}
            AppEvent::Datagram { from, payload } => {
                if !self.active {
                    return;
                }
                let now = ctx.now();
                let bytes = payload.len();
                info!(
                    target: "amisim::app",
                    "At time {} server received {} bytes from {}",
                    now, bytes, from
                );
                self.received.push(EchoRecord {
                    time: now,
                    peer: from,
                    bytes,
                });
                ctx.send_datagram(binding.node, binding.port, from, payload);
                info!(
                    target: "amisim::app",
                    "At time {} server sent {} bytes to {}",
                    now, bytes, from
                );
                self.sent.push(EchoRecord {
                    time: now,
                    peer: from,
                    bytes,
                });
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Client ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UdpEchoClient {
    remote: SocketAddrV6,
    packet_size: usize,
    /// Zero means no limit.
    max_packets: u32,
    interval_ns: u64,
    binding: Option<Binding>,
    active: bool,
    pending_timer: Option<u64>,
    pub sent: Vec<EchoRecord>,
    pub received: Vec<EchoRecord>,
}

impl UdpEchoClient {
    pub fn new(remote: SocketAddrV6, packet_size: usize, max_packets: u32, interval_ns: u64) -> Self {
        UdpEchoClient {
            remote,
            packet_size,
            max_packets,
            interval_ns,
            binding: None,
            active: false,
            pending_timer: None,
            sent: Vec::new(),
            received: Vec::new(),
        }
    }

    pub fn remote(&self) -> SocketAddrV6 {
        self.remote
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn local_port(&self) -> Option<u16> {
        self.binding.map(|b| b.port)
    }

    fn send(&mut self, ctx: &mut SimulationContext, binding: Binding) {
        let now = ctx.now();
        ctx.send_datagram(binding.node, binding.port, self.remote, vec![0; self.packet_size]);
        info!(
            target: "amisim::app",
            "At time {} client sent {} bytes to {}",
            now, self.packet_size, self.remote
        );
        self.sent.push(EchoRecord {
            time: now,
            peer: self.remote,
            bytes: self.packet_size,
        });

        let more = self.max_packets == 0 || (self.sent.len() as u64) < u64::from(self.max_packets);
        self.pending_timer = more.then(|| ctx.schedule_app_timer(binding.id, self.interval_ns));
    }
}

impl Application for UdpEchoClient {
    fn kind(&self) -> &'static str {
        "echo-client"
    }

    fn requested_port(&self) -> Option<u16> {
        None
    }

    fn on_install(&mut self, id: AppId, node: NodeId, port: u16) {
        self.binding = Some(Binding { id, node, port });
    }

    fn on_event(&mut self, ctx: &mut SimulationContext, event: AppEvent) {
        let Some(binding) = self.binding else {
            return;
        };
        match event {
            AppEvent::Start => {
                self.active = true;
                self.send(ctx, binding);
            }
            AppEvent::Stop => {
                self.active = false;
                self.pending_timer = None;
            }
            AppEvent::Timer { timer_id } => {
                if self.active && self.pending_timer == Some(timer_id) {
                    self.send(ctx, binding);
                }
            }
            AppEvent::Datagram { from, payload } => {
                let now = ctx.now();
                info!(
                    target: "amisim::app",
                    "At time {} client received {} bytes from {}",
                    now,
                    payload.len(),
                    from
                );
                self.received.push(EchoRecord {
                    time: now,
                    peer: from,
                    bytes: payload.len(),
                });
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Helpers ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UdpEchoServerHelper {
    port: u16,
}

impl UdpEchoServerHelper {
    pub fn new(port: u16) -> Self {
        UdpEchoServerHelper { port }
    }

    pub fn install(&self, world: &mut World, node: NodeId) -> SimResult<ApplicationContainer> {
        let id = world.install_app(node, Box::new(UdpEchoServer::new(self.port)))?;
        let mut apps = ApplicationContainer::new();
        apps.push(id);
        Ok(apps)
    }
}

#[derive(Debug, Clone)]
pub struct UdpEchoClientHelper {
    remote: SocketAddrV6,
    packet_size: usize,
    max_packets: u32,
    interval_ns: u64,
}

impl UdpEchoClientHelper {
    /// Defaults: 100 packets of 1024 bytes, one per second.
    pub fn new(address: Ipv6Addr, port: u16) -> Self {
        UdpEchoClientHelper {
            remote: SocketAddrV6::new(address, port, 0, 0),
            packet_size: 1024,
            max_packets: 100,
            interval_ns: secs_to_nanos(1),
        }
    }

    pub fn set_max_packets(&mut self, max_packets: u32) -> &mut Self {
        self.max_packets = max_packets;
        self
    }

    pub fn set_interval(&mut self, interval_ns: u64) -> &mut Self {
        self.interval_ns = interval_ns;
        self
    }

    pub fn set_packet_size(&mut self, packet_size: usize) -> &mut Self {
        self.packet_size = packet_size;
        self
    }

    pub fn install(&self, world: &mut World, node: NodeId) -> SimResult<ApplicationContainer> {
        let client = UdpEchoClient::new(self.remote, self.packet_size, self.max_packets, self.interval_ns);
        let id = world.install_app(node, Box::new(client))?;
        let mut apps = ApplicationContainer::new();
        apps.push(id);
        Ok(apps)
    }
}
