//! Receive path: channel → device → shim → IPv6 → application.

use std::net::SocketAddrV6;

use tracing::{debug, trace, warn};

use crate::app::AppEvent;
use crate::device::sixlowpan::Decapsulated;
use crate::device::{DeviceId, Frame, LinkPayload};
use crate::node::NodeId;
use crate::packet::Ipv6Packet;
use crate::simulation::SimulationContext;
use crate::trace::{DropReason, TraceKind};

use super::World;

impl World {
    pub(super) fn input_frame(&mut self, ctx: &mut SimulationContext, device: DeviceId, frame: &Frame) {
        let now = ctx.now();
        let Some(dev) = self.devices.get_mut(device.index()) else {
            return;
        };
        if !dev.accepts(&frame.dst) {
            return;
        }
        if let (Some(pan), Some(assoc)) = (frame.pan_id, dev.association) {
            if pan != assoc.pan_id {
                return;
            }
        }
        let wire_bytes = frame.wire_len();
        dev.stats.rx_frames += 1;
        dev.stats.rx_bytes += wire_bytes as u64;
        let own = dev.address;
        let node = dev.node;

        self.capture(device, now, frame);
        self.record(
            now,
            TraceKind::FrameReceived {
                device,
                src: frame.src,
                wire_bytes,
            },
        );

        let bytes = match &frame.payload {
            LinkPayload::Ipv6(bytes) => {
                self.input_packet(ctx, device, node, bytes);
                return;
            }
            LinkPayload::Lowpan(bytes) => bytes,
        };

        let dev = &mut self.devices[device.index()];
        let Some(shim) = dev.lowpan.as_mut() else {
            dev.stats.rx_dropped += 1;
            debug!(%device, src = %frame.src, "6LoWPAN frame on device without shim");
            self.record(now, TraceKind::FrameDropped { device, reason: DropReason::NoAdaptationLayer });
            return;
        };
        match shim.decapsulate(now, own, frame.src, bytes) {
            Ok(Decapsulated::Datagram(packet)) => self.input_packet(ctx, device, node, &packet),
            Ok(Decapsulated::Incomplete) => {}
            Ok(Decapsulated::Relay(payload)) => {
                dev.stats.relayed += 1;
                trace!(%device, "mesh relay");
                self.record(now, TraceKind::FrameRelayed { device });
                self.transmit(ctx, device, own.broadcast_like(), LinkPayload::Lowpan(payload));
            }
            Ok(Decapsulated::Duplicate) => {
                self.record(now, TraceKind::FrameDropped { device, reason: DropReason::Duplicate });
            }
            Ok(Decapsulated::HopsExhausted) => {
                debug!(%device, "mesh hops exhausted");
                self.record(now, TraceKind::FrameDropped { device, reason: DropReason::HopsExhausted });
            }
            Ok(Decapsulated::NotForUs) => {
                self.record(now, TraceKind::FrameDropped { device, reason: DropReason::NotForUs });
            }
            Err(e) => {
                dev.stats.rx_dropped += 1;
                warn!(%device, error = %e, "dropping malformed 6LoWPAN frame");
                self.record(now, TraceKind::FrameDropped { device, reason: DropReason::Malformed });
            }
        }
    }

    /// Deliver locally, forward, or drop an IPv6 packet received on `device`.
    fn input_packet(&mut self, ctx: &mut SimulationContext, device: DeviceId, node: NodeId, bytes: &[u8]) {
        let now = ctx.now();
        let Some(stack) = self.stacks.get_mut(&node) else {
            self.record(now, TraceKind::PacketDropped { node, reason: DropReason::NoStack });
            return;
        };
        let mut packet = match Ipv6Packet::decode(bytes) {
            Ok(p) => p,
            Err(e) => {
                stack.stats.malformed += 1;
                debug!(%node, error = %e, "malformed IPv6 packet");
                self.record(now, TraceKind::PacketDropped { node, reason: DropReason::Malformed });
                return;
            }
        };

        if stack.is_local(&packet.dst) {
            stack.stats.rx_packets += 1;
            let target = stack
                .listener(packet.udp.dst_port)
                .filter(|app| self.apps.get(app.index()).is_some_and(|s| s.active));
            let Some(app) = target else {
                stack.stats.no_listener += 1;
                debug!(%node, port = packet.udp.dst_port, "no active listener");
                self.record(now, TraceKind::PacketDropped { node, reason: DropReason::NoListener });
                return;
            };
            let from = SocketAddrV6::new(packet.src, packet.udp.src_port, 0, 0);
            let size = packet.udp.payload.len();
            self.record(now, TraceKind::PacketDelivered { node, app, bytes: size });
            self.dispatch_app(
                ctx,
                app,
                AppEvent::Datagram {
                    from,
                    payload: packet.udp.payload,
                },
            );
            return;
        }

        let forwarding = stack
            .interface_for(device)
            .and_then(|i| stack.interfaces().get(i))
            .is_some_and(|i| i.forwarding);
        if !forwarding {
            stack.stats.not_for_us += 1;
            self.record(now, TraceKind::PacketDropped { node, reason: DropReason::NotForUs });
            return;
        }
        if packet.hop_limit <= 1 {
            stack.stats.hop_limit_exceeded += 1;
            debug!(%node, dst = %packet.dst, "hop limit exceeded");
            self.record(now, TraceKind::PacketDropped { node, reason: DropReason::HopLimitExceeded });
            return;
        }
        let Some((route, out)) = stack
            .route(&packet.dst)
            .and_then(|r| stack.interfaces().get(r.interface).map(|i| (r, i.device)))
        else {
            stack.stats.no_route += 1;
            self.record(now, TraceKind::PacketDropped { node, reason: DropReason::NoRoute });
            return;
        };
        stack.stats.forwarded += 1;
        packet.hop_limit -= 1;
        trace!(%node, dst = %packet.dst, hop_limit = packet.hop_limit, "forwarding");
        self.record(now, TraceKind::PacketForwarded { node });
        self.output_packet(ctx, out, route.next_hop(packet.dst), &packet.encode());
    }
}
