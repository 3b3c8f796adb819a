//! Send path: datagram → route → device → frames → channel.

use std::net::{Ipv6Addr, SocketAddrV6};

use tracing::{debug, trace, warn};

use crate::device::{DeviceId, Frame, LinkPayload, MacAddress};
use crate::event::EventType;
use crate::node::NodeId;
use crate::packet::{Ipv6Packet, UdpDatagram};
use crate::simulation::SimulationContext;
use crate::trace::{DropReason, TraceKind};

use super::World;

impl World {
    /// Route a UDP datagram out of `node`.
    pub(super) fn output_datagram(
        &mut self,
        ctx: &mut SimulationContext,
        node: NodeId,
        src_port: u16,
        dst: SocketAddrV6,
        payload: Vec<u8>,
    ) {
        let now = ctx.now();
        let dst_ip = *dst.ip();
        let Some(stack) = self.stacks.get_mut(&node) else {
            warn!(%node, "datagram from node without IPv6 stack");
            self.record(now, TraceKind::PacketDropped { node, reason: DropReason::NoStack });
            return;
        };
        let Some((route, iface)) = stack
            .route(&dst_ip)
            .and_then(|r| stack.interfaces().get(r.interface).map(|i| (r, i.clone())))
        else {
            stack.stats.no_route += 1;
            debug!(%node, dst = %dst_ip, "no route");
            self.record(now, TraceKind::PacketDropped { node, reason: DropReason::NoRoute });
            return;
        };
        stack.stats.tx_packets += 1;

        let packet = Ipv6Packet::udp(
            iface.source_for(&dst_ip),
            dst_ip,
            UdpDatagram {
                src_port,
                dst_port: dst.port(),
                payload,
            },
        );
        trace!(%node, src = %packet.src, dst = %packet.dst, bytes = packet.len(), "ipv6 output");
        self.output_packet(ctx, iface.device, route.next_hop(dst_ip), &packet.encode());
    }

    /// Hand an encoded IPv6 packet to `device` for `next_hop`.
    pub(super) fn output_packet(
        &mut self,
        ctx: &mut SimulationContext,
        device: DeviceId,
        next_hop: Ipv6Addr,
        bytes: &[u8],
    ) {
        let now = ctx.now();
        let Some(dev) = self.devices.get_mut(device.index()) else {
            return;
        };
        let own = dev.address;
        let Some(neighbor) = own.resolve_like(&next_hop) else {
            dev.stats.tx_dropped += 1;
            debug!(%device, %next_hop, "cannot resolve neighbor");
            self.record(now, TraceKind::FrameDropped { device, reason: DropReason::UnknownNeighbor });
            return;
        };
        let mtu = usize::from(dev.mtu);

        let frames: Vec<(MacAddress, LinkPayload)> = match dev.lowpan.as_mut() {
            Some(shim) => match shim.encapsulate(own, neighbor, bytes, mtu) {
                Ok(frames) => frames
                    .into_iter()
                    .map(|(dst, p)| (dst, LinkPayload::Lowpan(p)))
                    .collect(),
                Err(e) => {
                    dev.stats.tx_dropped += 1;
                    warn!(%device, error = %e, "6LoWPAN encapsulation failed");
                    self.record(now, TraceKind::FrameDropped { device, reason: DropReason::Oversize });
                    return;
                }
            },
            None if bytes.len() > mtu => {
                dev.stats.tx_dropped += 1;
                debug!(%device, bytes = bytes.len(), mtu, "packet exceeds MTU");
                self.record(now, TraceKind::FrameDropped { device, reason: DropReason::Oversize });
                return;
            }
            None => vec![(neighbor, LinkPayload::Ipv6(bytes.to_vec()))],
        };

        for (dst, payload) in frames {
            self.transmit(ctx, device, dst, payload);
        }
    }

    /// Put one frame on `device`'s channel and schedule its arrival at
    /// every other attached device.
    pub(super) fn transmit(
        &mut self,
        ctx: &mut SimulationContext,
        device: DeviceId,
        dst: MacAddress,
        payload: LinkPayload,
    ) {
        let now = ctx.now();
        let Some(dev) = self.devices.get_mut(device.index()) else {
            return;
        };
        let seq = match dev.address {
            MacAddress::Short(_) => dev.take_seq(),
            MacAddress::Mac48(_) => 0,
        };
        let frame = Frame {
            src: dev.address,
            dst,
            pan_id: dev.association.map(|a| a.pan_id),
            seq,
            payload,
        };
        let wire_bytes = frame.wire_len();
        dev.stats.tx_frames += 1;
        dev.stats.tx_bytes += wire_bytes as u64;
        let channel_id = dev.channel;
        let sender_node = dev.node;

        let Some(channel) = self.channels.get_mut(channel_id.index()) else {
            return;
        };
        let tx = channel.reserve(now, device, wire_bytes);
        let receivers: Vec<DeviceId> = channel
            .devices()
            .iter()
            .copied()
            .filter(|d| *d != device)
            .collect();

        self.capture(device, tx.start, &frame);
        self.record(now, TraceKind::FrameSent { device, dst, wire_bytes });
        trace!(%device, %dst, wire_bytes, start = %tx.start, end = %tx.end, "frame on medium");

        let from = self.nodes.get(sender_node.index()).and_then(|n| n.position);
        for rx in receivers {
            let to = self
                .devices
                .get(rx.index())
                .and_then(|d| self.nodes.get(d.node.index()))
                .and_then(|n| n.position);
            let delay = self.channels[channel_id.index()].propagation_delay(from, to);
            ctx.schedule_at(
                tx.end.saturating_advance(delay),
                EventType::FrameArrival {
                    device: rx,
                    frame: frame.clone(),
                },
            );
        }
    }
}
