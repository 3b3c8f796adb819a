//! `World`: owns every simulated entity and dispatches events to them.
//!
//! Nodes, channels, devices, IPv6 stacks, applications, and capture
//! writers all live here, indexed by their typed ids. Helpers mutate the
//! world during setup; during a run the world is the kernel's
//! [`EventHandler`]. The send path is in [`egress`](self::egress), the
//! receive path in [`ingress`](self::ingress).

mod egress;
mod ingress;

use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::app::{AppEvent, AppId, Application};
use crate::capture::{capture_file_name, LinkType, PcapWriter};
use crate::channel::{Channel, ChannelId, ChannelKind};
use crate::device::{DeviceId, Frame, MacAddress, NetDevice};
use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventType};
use crate::internet::Ipv6Stack;
use crate::node::{Node, NodeId};
use crate::simulation::{EventHandler, SimulationContext};
use crate::time::VirtualTime;
use crate::trace::{TraceEntry, TraceKind};

/// An installed application and its bookkeeping.
#[derive(Debug)]
pub struct AppSlot {
    pub node: NodeId,
    pub port: u16,
    pub start: Option<VirtualTime>,
    pub stop: Option<VirtualTime>,
    /// Between `AppStart` and `AppStop`.
    pub active: bool,
    app: Box<dyn Application>,
}

impl AppSlot {
    pub fn kind(&self) -> &'static str {
        self.app.kind()
    }

    pub fn app(&self) -> &dyn Application {
        self.app.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct World {
    nodes: Vec<Node>,
    channels: Vec<Channel>,
    devices: Vec<NetDevice>,
    stacks: BTreeMap<NodeId, Ipv6Stack>,
    apps: Vec<AppSlot>,
    captures: BTreeMap<DeviceId, PcapWriter>,
    mac48_allocated: u64,
    /// Event currently being handled, stamped on trace entries.
    current_event: Option<EventId>,
    /// Append-only record of link and network activity.
    pub trace: Vec<TraceEntry>,
}

impl World {
    pub fn new() -> Self {
        World::default()
    }

    // ── Nodes ─────────────────────────────────────────────────────────

    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node::new(id));
        id
    }

    pub fn node(&self, id: NodeId) -> SimResult<&Node> {
        self.nodes.get(id.index()).ok_or(SimError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> SimResult<&mut Node> {
        self.nodes.get_mut(id.index()).ok_or(SimError::NodeNotFound(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    // ── Channels and devices ──────────────────────────────────────────

    pub fn add_channel(&mut self, kind: ChannelKind) -> ChannelId {
        let id = ChannelId::new(self.channels.len() as u32);
        debug!(channel = %id, ?kind, "channel created");
        self.channels.push(Channel::new(id, kind));
        id
    }

    pub fn channel(&self, id: ChannelId) -> SimResult<&Channel> {
        self.channels.get(id.index()).ok_or(SimError::IndexOutOfRange {
            collection: "channel",
            index: id.index(),
            len: self.channels.len(),
        })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Next 48-bit MAC, `00:00:00:00:00:01` onward.
    pub fn allocate_mac48(&mut self) -> MacAddress {
        self.mac48_allocated += 1;
        MacAddress::allocate_mac48(self.mac48_allocated)
    }

    /// Create a device on `node` attached to `channel`.
    pub fn add_device(
        &mut self,
        node: NodeId,
        channel: ChannelId,
        address: MacAddress,
        mtu: u16,
    ) -> SimResult<DeviceId> {
        self.channel(channel)?;
        let id = DeviceId::new(self.devices.len() as u32);
        self.node_mut(node)?.devices.push(id);
        self.channels[channel.index()].attach(id);
        self.devices.push(NetDevice::new(id, node, channel, address, mtu));
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> SimResult<&NetDevice> {
        self.devices.get(id.index()).ok_or(SimError::DeviceNotFound(id))
    }

    pub fn device_mut(&mut self, id: DeviceId) -> SimResult<&mut NetDevice> {
        self.devices.get_mut(id.index()).ok_or(SimError::DeviceNotFound(id))
    }

    pub fn devices(&self) -> &[NetDevice] {
        &self.devices
    }

    // ── Stacks ────────────────────────────────────────────────────────

    pub fn install_stack(&mut self, stack: Ipv6Stack) -> SimResult<()> {
        let node = stack.node();
        self.node(node)?;
        if self.stacks.contains_key(&node) {
            return Err(SimError::StackAlreadyInstalled(node));
        }
        self.stacks.insert(node, stack);
        Ok(())
    }

    pub fn stack(&self, node: NodeId) -> SimResult<&Ipv6Stack> {
        self.stacks.get(&node).ok_or(SimError::StackNotInstalled(node))
    }

    pub fn stack_mut(&mut self, node: NodeId) -> SimResult<&mut Ipv6Stack> {
        self.stacks.get_mut(&node).ok_or(SimError::StackNotInstalled(node))
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Ipv6Stack> + '_ {
        self.stacks.values()
    }

    // ── Applications ──────────────────────────────────────────────────

    /// Install `app` on `node`, binding its requested port (or an
    /// ephemeral one) in the node's stack.
    pub fn install_app(&mut self, node: NodeId, mut app: Box<dyn Application>) -> SimResult<AppId> {
        self.node(node)?;
        let id = AppId::new(self.apps.len() as u32);
        let stack = self.stack_mut(node)?;
        let port = match app.requested_port() {
            Some(port) => {
                stack.bind(port, id)?;
                port
            }
            None => stack.bind_ephemeral(id)?,
        };
        app.on_install(id, node, port);
        debug!(app = %id, %node, port, kind = app.kind(), "application installed");
        self.node_mut(node)?.apps.push(id);
        self.apps.push(AppSlot {
            node,
            port,
            start: None,
            stop: None,
            active: false,
            app,
        });
        Ok(id)
    }

    pub fn app_slot(&self, id: AppId) -> SimResult<&AppSlot> {
        self.apps.get(id.index()).ok_or(SimError::AppNotFound(id))
    }

    pub fn app_slot_mut(&mut self, id: AppId) -> SimResult<&mut AppSlot> {
        self.apps.get_mut(id.index()).ok_or(SimError::AppNotFound(id))
    }

    pub fn app_slots(&self) -> impl Iterator<Item = (AppId, &AppSlot)> + '_ {
        self.apps
            .iter()
            .enumerate()
            .map(|(i, s)| (AppId::new(i as u32), s))
    }

    /// Downcast an application for inspection.
    ///
    /// Returns `None` if the id is unknown or the type is wrong.
    pub fn app<T: Application + 'static>(&self, id: AppId) -> Option<&T> {
        let any: &dyn Any = self.apps.get(id.index())?.app.as_any();
        any.downcast_ref::<T>()
    }

    fn dispatch_app(&mut self, ctx: &mut SimulationContext, id: AppId, event: AppEvent) {
        let Some(slot) = self.apps.get_mut(id.index()) else {
            warn!(app = %id, "event for unknown application");
            return;
        };
        match event {
            AppEvent::Start => slot.active = true,
            AppEvent::Stop => slot.active = false,
            _ => {}
        }
        slot.app.on_event(ctx, event);
    }

    // ── Capture ───────────────────────────────────────────────────────

    /// Capture every frame `device` sends or accepts into
    /// `<dir>/<prefix>-<node>-<index>.pcap`.
    pub fn enable_capture(&mut self, device: DeviceId, dir: &Path, prefix: &str) -> SimResult<PathBuf> {
        if let Some(existing) = self.captures.get(&device) {
            return Ok(existing.path().to_path_buf());
        }
        let dev = self.device(device)?;
        let node = self.node(dev.node)?;
        let index = node
            .device_index(device)
            .ok_or(SimError::DeviceNotFound(device))?;
        let link_type = match dev.address {
            MacAddress::Mac48(_) => LinkType::Ethernet,
            MacAddress::Short(_) => LinkType::Ieee802154NoFcs,
        };
        let path = dir.join(capture_file_name(prefix, node.id.raw(), index));
        let writer = PcapWriter::create(&path, link_type)?;
        debug!(%device, path = %path.display(), "capture enabled");
        self.captures.insert(device, writer);
        Ok(path)
    }

    pub fn capture_paths(&self) -> Vec<PathBuf> {
        self.captures.values().map(|w| w.path().to_path_buf()).collect()
    }

    fn capture(&mut self, device: DeviceId, time: VirtualTime, frame: &Frame) {
        if let Some(writer) = self.captures.get_mut(&device) {
            writer.write_record(time, &frame.encode());
        }
    }

    /// Close capture files and release applications.
    ///
    /// Returns the capture files written.
    pub fn destroy(&mut self) -> SimResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (_, writer) in std::mem::take(&mut self.captures) {
            written.push(writer.finish()?);
        }
        for slot in &mut self.apps {
            slot.active = false;
        }
        Ok(written)
    }

    // ── Trace ─────────────────────────────────────────────────────────

    fn record(&mut self, time: VirtualTime, kind: TraceKind) {
        self.trace.push(TraceEntry {
            time,
            event_id: self.current_event.unwrap_or(EventId::new(0)),
            kind,
        });
    }
}

impl EventHandler for World {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        self.current_event = Some(event.id);
        match &event.payload {
            EventType::Stop => {}
            EventType::AppStart { app } => self.dispatch_app(ctx, *app, AppEvent::Start),
            EventType::AppStop { app } => self.dispatch_app(ctx, *app, AppEvent::Stop),
            EventType::AppTimer { app, timer_id } => {
                self.dispatch_app(ctx, *app, AppEvent::Timer { timer_id: *timer_id })
            }
            EventType::DatagramSend {
                node,
                src_port,
                dst,
                payload,
            } => self.output_datagram(ctx, *node, *src_port, *dst, payload.clone()),
            EventType::FrameArrival { device, frame } => self.input_frame(ctx, *device, frame),
        }
        self.current_event = None;
    }
}
