//! 6LoWPAN adaptation shim.
//!
//! Implements the parts of RFC 4944 the scenarios exercise:
//!
//! - uncompressed IPv6 dispatch (`0x41`);
//! - FRAG1 / FRAGN fragmentation and reassembly, keyed by
//!   `(originator, datagram size, tag)`, with a 60 s reassembly timeout;
//! - mesh-under forwarding: a mesh header (originator, final destination,
//!   hops left) plus a BC0 sequence number, sent to the link broadcast
//!   address and re-broadcast by every other shim until the hop budget
//!   runs out. Each `(originator, sequence)` is accepted once.
//!
//! IPHC header compression is not implemented.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::time::{secs_to_nanos, VirtualTime};
use crate::world::World;

use super::address::MacAddress;
use super::DeviceContainer;

pub const DISPATCH_IPV6: u8 = 0x41;
pub const DISPATCH_BC0: u8 = 0x50;
pub const FRAG1_HEADER_LEN: usize = 4;
pub const FRAGN_HEADER_LEN: usize = 5;
pub const DEFAULT_MESH_RADIUS: u8 = 10;

const MESH_MASK: u8 = 0xc0;
const MESH_PATTERN: u8 = 0x80;
const FRAG_MASK: u8 = 0xf8;
const FRAG1_PATTERN: u8 = 0xc0;
const FRAGN_PATTERN: u8 = 0xe0;
/// Largest datagram the 11-bit FRAG size field can describe.
pub const MAX_DATAGRAM_SIZE: usize = 0x7ff;
/// `0xF` in the hops field announces an extra byte; stay below it.
const MAX_MESH_HOPS: u8 = 14;
const MESH_CACHE_LEN: usize = 64;
const REASSEMBLY_TIMEOUT_SECS: u64 = 60;

// ── Mesh header ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshHeader {
    pub hops_left: u8,
    pub originator: MacAddress,
    pub final_dest: MacAddress,
}

impl MeshHeader {
    pub fn encoded_len(&self) -> usize {
        1 + self.originator.mesh_bytes().len() + self.final_dest.mesh_bytes().len()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let v = u8::from(matches!(self.originator, MacAddress::Short(_)));
        let f = u8::from(matches!(self.final_dest, MacAddress::Short(_)));
        out.push(MESH_PATTERN | (v << 5) | (f << 4) | (self.hops_left & 0x0f));
        out.extend_from_slice(&self.originator.mesh_bytes());
        out.extend_from_slice(&self.final_dest.mesh_bytes());
    }

    /// Decode from the front of `bytes`. Returns the header and its length.
    pub fn decode(bytes: &[u8]) -> SimResult<(Self, usize)> {
        let first = *bytes.first().ok_or(SimError::MalformedPacket("empty mesh header"))?;
        let orig_len = if first & 0x20 != 0 { 2 } else { 8 };
        let final_len = if first & 0x10 != 0 { 2 } else { 8 };
        let total = 1 + orig_len + final_len;
        if bytes.len() < total {
            return Err(SimError::MalformedPacket("truncated mesh header"));
        }
        let originator = MacAddress::from_mesh_bytes(&bytes[1..1 + orig_len])
            .ok_or(SimError::MalformedPacket("bad mesh originator"))?;
        let final_dest = MacAddress::from_mesh_bytes(&bytes[1 + orig_len..total])
            .ok_or(SimError::MalformedPacket("bad mesh final address"))?;
        Ok((
            MeshHeader {
                hops_left: first & 0x0f,
                originator,
                final_dest,
            },
            total,
        ))
    }
}

// ── Shim ──────────────────────────────────────────────────────────────

/// What the shim made of an incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decapsulated {
    /// A complete IPv6 packet.
    Datagram(Vec<u8>),
    /// A fragment was stored; the datagram is not complete yet.
    Incomplete,
    /// Re-broadcast this payload on the same link.
    Relay(Vec<u8>),
    /// Already seen this mesh frame.
    Duplicate,
    /// Mesh frame for another node and no hops remain.
    HopsExhausted,
    /// Mesh frame for another node and this shim does not forward.
    NotForUs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LowpanStats {
    pub frames_sent: u64,
    pub fragments_received: u64,
    pub datagrams_reassembled: u64,
    pub reassembly_timeouts: u64,
    pub mesh_duplicates: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ReassemblyKey {
    originator: MacAddress,
    size: u16,
    tag: u16,
}

#[derive(Debug, Clone)]
struct PartialDatagram {
    first_seen: VirtualTime,
    size: usize,
    received: usize,
    chunks: BTreeMap<usize, Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct LowpanShim {
    force_ether_type: bool,
    mesh_under: bool,
    mesh_radius: u8,
    next_tag: u16,
    next_bc_seq: u8,
    mesh_cache: VecDeque<(MacAddress, u8)>,
    reassembly: BTreeMap<ReassemblyKey, PartialDatagram>,
    pub stats: LowpanStats,
}

impl LowpanShim {
    pub fn new(force_ether_type: bool) -> Self {
        LowpanShim {
            force_ether_type,
            mesh_under: false,
            mesh_radius: DEFAULT_MESH_RADIUS,
            next_tag: 0,
            next_bc_seq: 0,
            mesh_cache: VecDeque::new(),
            reassembly: BTreeMap::new(),
            stats: LowpanStats::default(),
        }
    }

    pub fn force_ether_type(&self) -> bool {
        self.force_ether_type
    }

    pub fn mesh_under(&self) -> bool {
        self.mesh_under
    }

    pub fn mesh_radius(&self) -> u8 {
        self.mesh_radius
    }

    pub fn set_mesh_under(&mut self, enabled: bool, radius: u8) {
        self.mesh_under = enabled;
        self.mesh_radius = radius.min(MAX_MESH_HOPS);
    }

    /// Datagrams waiting for more fragments.
    pub fn pending_reassemblies(&self) -> usize {
        self.reassembly.len()
    }

    /// Split an IPv6 packet into link payloads no larger than `mtu`.
    ///
    /// Returns `(link destination, payload)` pairs in send order. With
    /// mesh-under on, every payload goes to the link broadcast address.
    pub fn encapsulate(
        &mut self,
        own: MacAddress,
        dst: MacAddress,
        ipv6: &[u8],
        mtu: usize,
    ) -> SimResult<Vec<(MacAddress, Vec<u8>)>> {
        let link_dst = if self.mesh_under { own.broadcast_like() } else { dst };
        let prefix_len = if self.mesh_under {
            let header = MeshHeader {
                hops_left: self.mesh_radius,
                originator: own,
                final_dest: dst,
            };
            header.encoded_len() + 2
        } else {
            0
        };

        if prefix_len + 1 + ipv6.len() <= mtu {
            let mut payload = self.mesh_prefix(own, dst);
            payload.push(DISPATCH_IPV6);
            payload.extend_from_slice(ipv6);
            self.stats.frames_sent += 1;
            return Ok(vec![(link_dst, payload)]);
        }

        if ipv6.len() > MAX_DATAGRAM_SIZE {
            return Err(SimError::MalformedPacket("datagram too large for 6LoWPAN fragmentation"));
        }
        let budget = mtu.saturating_sub(prefix_len + FRAGN_HEADER_LEN);
        let first_cap = floor8(mtu.saturating_sub(prefix_len + FRAG1_HEADER_LEN + 1));
        let next_cap = floor8(budget);
        if first_cap == 0 || next_cap == 0 {
            return Err(SimError::MalformedPacket("MTU too small for 6LoWPAN fragmentation"));
        }

        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        let size = ipv6.len() as u16;
        let [size_hi, size_lo] = size.to_be_bytes();
        let [tag_hi, tag_lo] = tag.to_be_bytes();

        let mut out = Vec::new();
        let mut offset = 0usize;
        while offset < ipv6.len() {
            let mut payload = self.mesh_prefix(own, dst);
            if offset == 0 {
                let end = first_cap.min(ipv6.len());
                payload.extend_from_slice(&[FRAG1_PATTERN | (size_hi & 0x07), size_lo, tag_hi, tag_lo]);
                payload.push(DISPATCH_IPV6);
                payload.extend_from_slice(&ipv6[..end]);
                offset = end;
            } else {
                let end = (offset + next_cap).min(ipv6.len());
                payload.extend_from_slice(&[
                    FRAGN_PATTERN | (size_hi & 0x07),
                    size_lo,
                    tag_hi,
                    tag_lo,
                    (offset / 8) as u8,
                ]);
                payload.extend_from_slice(&ipv6[offset..end]);
                offset = end;
            }
            out.push((link_dst, payload));
        }
        self.stats.frames_sent += out.len() as u64;
        trace!(tag, size, fragments = out.len(), "fragmented datagram");
        Ok(out)
    }

    /// Process one received link payload.
    pub fn decapsulate(
        &mut self,
        now: VirtualTime,
        own: MacAddress,
        link_src: MacAddress,
        payload: &[u8],
    ) -> SimResult<Decapsulated> {
        self.expire(now);

        let mut rest = payload;
        let mut originator = link_src;

        if rest.first().is_some_and(|b| b & MESH_MASK == MESH_PATTERN) {
            let (mesh, used) = MeshHeader::decode(rest)?;
            rest = &rest[used..];

            let mut seq = None;
            if rest.first() == Some(&DISPATCH_BC0) {
                let s = *rest.get(1).ok_or(SimError::MalformedPacket("truncated BC0 header"))?;
                rest = &rest[2..];
                seq = Some(s);
            }
            if mesh.originator == own {
                self.stats.mesh_duplicates += 1;
                return Ok(Decapsulated::Duplicate);
            }
            if let Some(s) = seq {
                if self.mesh_cache.contains(&(mesh.originator, s)) {
                    self.stats.mesh_duplicates += 1;
                    return Ok(Decapsulated::Duplicate);
                }
                self.remember(mesh.originator, s);
            }
            originator = mesh.originator;

            if mesh.final_dest != own && !mesh.final_dest.is_broadcast() {
                if !self.mesh_under {
                    return Ok(Decapsulated::NotForUs);
                }
                if mesh.hops_left <= 1 {
                    return Ok(Decapsulated::HopsExhausted);
                }
                let mut relay = Vec::with_capacity(payload.len());
                MeshHeader {
                    hops_left: mesh.hops_left - 1,
                    ..mesh
                }
                .encode(&mut relay);
                if let Some(s) = seq {
                    relay.extend_from_slice(&[DISPATCH_BC0, s]);
                }
                relay.extend_from_slice(rest);
                return Ok(Decapsulated::Relay(relay));
            }
        }

        match rest.first() {
            Some(&DISPATCH_IPV6) => Ok(Decapsulated::Datagram(rest[1..].to_vec())),
            Some(b) if b & FRAG_MASK == FRAG1_PATTERN => self.reassemble(now, originator, rest, true),
            Some(b) if b & FRAG_MASK == FRAGN_PATTERN => self.reassemble(now, originator, rest, false),
            _ => Err(SimError::MalformedPacket("unknown 6LoWPAN dispatch")),
        }
    }

    fn mesh_prefix(&mut self, own: MacAddress, dst: MacAddress) -> Vec<u8> {
        if !self.mesh_under {
            return Vec::new();
        }
        let seq = self.next_bc_seq;
        self.next_bc_seq = self.next_bc_seq.wrapping_add(1);
        let mut out = Vec::new();
        MeshHeader {
            hops_left: self.mesh_radius,
            originator: own,
            final_dest: dst,
        }
        .encode(&mut out);
        out.extend_from_slice(&[DISPATCH_BC0, seq]);
        out
    }

    fn remember(&mut self, originator: MacAddress, seq: u8) {
        if self.mesh_cache.len() == MESH_CACHE_LEN {
            self.mesh_cache.pop_front();
        }
        self.mesh_cache.push_back((originator, seq));
    }

    fn reassemble(
        &mut self,
        now: VirtualTime,
        originator: MacAddress,
        bytes: &[u8],
        first: bool,
    ) -> SimResult<Decapsulated> {
        let header_len = if first { FRAG1_HEADER_LEN } else { FRAGN_HEADER_LEN };
        if bytes.len() < header_len {
            return Err(SimError::MalformedPacket("truncated fragment header"));
        }
        let size = (usize::from(bytes[0] & 0x07) << 8) | usize::from(bytes[1]);
        let tag = u16::from_be_bytes([bytes[2], bytes[3]]);
        let (offset, data) = if first {
            if bytes.get(FRAG1_HEADER_LEN) != Some(&DISPATCH_IPV6) {
                return Err(SimError::MalformedPacket("FRAG1 without IPv6 dispatch"));
            }
            (0, &bytes[FRAG1_HEADER_LEN + 1..])
        } else {
            (usize::from(bytes[4]) * 8, &bytes[FRAGN_HEADER_LEN..])
        };
        if offset + data.len() > size {
            return Err(SimError::MalformedPacket("fragment extends past datagram size"));
        }

        let key = ReassemblyKey {
            originator,
            size: size as u16,
            tag,
        };
        let entry = self.reassembly.entry(key).or_insert_with(|| PartialDatagram {
            first_seen: now,
            size,
            received: 0,
            chunks: BTreeMap::new(),
        });
        if entry.chunks.contains_key(&offset) {
            return Ok(Decapsulated::Incomplete);
        }
        self.stats.fragments_received += 1;
        entry.received += data.len();
        entry.chunks.insert(offset, data.to_vec());
        if entry.received < entry.size {
            return Ok(Decapsulated::Incomplete);
        }

        let Some(done) = self.reassembly.remove(&key) else {
            return Ok(Decapsulated::Incomplete);
        };
        let mut datagram = Vec::with_capacity(done.size);
        for (off, chunk) in done.chunks {
            if off != datagram.len() {
                return Err(SimError::MalformedPacket("overlapping or missing fragments"));
            }
            datagram.extend_from_slice(&chunk);
        }
        self.stats.datagrams_reassembled += 1;
        trace!(tag, size, "reassembled datagram");
        Ok(Decapsulated::Datagram(datagram))
    }

    fn expire(&mut self, now: VirtualTime) {
        let timeout = secs_to_nanos(REASSEMBLY_TIMEOUT_SECS);
        let before = self.reassembly.len();
        self.reassembly
            .retain(|_, p| now.duration_since(p.first_seen).unwrap_or(0) < timeout);
        let expired = before - self.reassembly.len();
        if expired > 0 {
            debug!(expired, "reassembly timed out");
            self.stats.reassembly_timeouts += expired as u64;
        }
    }
}

fn floor8(n: usize) -> usize {
    n & !7
}

// ── Helper ────────────────────────────────────────────────────────────

/// Wraps devices with a [`LowpanShim`].
#[derive(Debug, Clone, Default)]
pub struct SixLowPanHelper {
    force_ether_type: bool,
}

impl SixLowPanHelper {
    pub fn new() -> Self {
        SixLowPanHelper {
            force_ether_type: false,
        }
    }

    /// Send 6LoWPAN over Ethernet with EtherType `0xA0ED`.
    pub fn force_ether_type(mut self, force: bool) -> Self {
        self.force_ether_type = force;
        self
    }

    /// Returns the adapted devices, same order as `devices`.
    pub fn install(&self, world: &mut World, devices: &DeviceContainer) -> SimResult<DeviceContainer> {
        for id in devices.iter() {
            let device = world.device_mut(id)?;
            if device.lowpan.is_some() {
                return Err(SimError::AdaptationAlreadyInstalled(id));
            }
            device.lowpan = Some(LowpanShim::new(self.force_ether_type));
            debug!(device = %id, node = %device.node, "6LoWPAN shim installed");
        }
        Ok(devices.clone())
    }

    /// Turn on mesh-under forwarding with `radius` hops on every device.
    pub fn enable_mesh_under(world: &mut World, devices: &DeviceContainer, radius: u8) -> SimResult<()> {
        for id in devices.iter() {
            let device = world.device_mut(id)?;
            let shim = device.lowpan.as_mut().ok_or_else(|| {
                SimError::InvalidScenario(format!("mesh-under requires a 6LoWPAN shim on {}", id))
            })?;
            shim.set_mesh_under(true, radius);
        }
        Ok(())
    }
}
