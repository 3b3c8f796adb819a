//! IPv6 / UDP wire format.
//!
//! Only what the echo scenarios carry: a fixed 40-byte IPv6 header with no
//! extension headers, followed by a UDP datagram. Encoding produces real
//! bytes (with a valid UDP checksum) so capture files decode in standard
//! tools.

use std::net::Ipv6Addr;

use crate::error::{SimError, SimResult};

pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;
pub const NEXT_HEADER_UDP: u8 = 17;
pub const DEFAULT_HOP_LIMIT: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl UdpDatagram {
    pub fn len(&self) -> usize {
        UDP_HEADER_LEN + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Packet {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub hop_limit: u8,
    pub udp: UdpDatagram,
}

impl Ipv6Packet {
    pub fn udp(src: Ipv6Addr, dst: Ipv6Addr, udp: UdpDatagram) -> Self {
        Ipv6Packet {
            src,
            dst,
            hop_limit: DEFAULT_HOP_LIMIT,
            udp,
        }
    }

    /// Total length on the wire, IPv6 header included.
    pub fn len(&self) -> usize {
        IPV6_HEADER_LEN + self.udp.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn encode(&self) -> Vec<u8> {
        let udp_len = self.udp.len();
        let mut out = Vec::with_capacity(IPV6_HEADER_LEN + udp_len);

        // Version 6, traffic class 0, flow label 0.
        out.extend_from_slice(&[0x60, 0, 0, 0]);
        out.extend_from_slice(&(udp_len as u16).to_be_bytes());
        out.push(NEXT_HEADER_UDP);
        out.push(self.hop_limit);
        out.extend_from_slice(&self.src.octets());
        out.extend_from_slice(&self.dst.octets());

        out.extend_from_slice(&self.udp.src_port.to_be_bytes());
        out.extend_from_slice(&self.udp.dst_port.to_be_bytes());
        out.extend_from_slice(&(udp_len as u16).to_be_bytes());
        let checksum = udp_checksum(&self.src, &self.dst, &self.udp);
        out.extend_from_slice(&checksum.to_be_bytes());
        out.extend_from_slice(&self.udp.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> SimResult<Self> {
        if bytes.len() < IPV6_HEADER_LEN + UDP_HEADER_LEN {
            return Err(SimError::MalformedPacket("truncated IPv6/UDP header"));
        }
        if bytes[0] >> 4 != 6 {
            return Err(SimError::MalformedPacket("not an IPv6 packet"));
        }
        let payload_len = usize::from(u16::from_be_bytes([bytes[4], bytes[5]]));
        if bytes[6] != NEXT_HEADER_UDP {
            return Err(SimError::MalformedPacket("next header is not UDP"));
        }
        if bytes.len() != IPV6_HEADER_LEN + payload_len {
            return Err(SimError::MalformedPacket("IPv6 payload length mismatch"));
        }
        let hop_limit = bytes[7];
        let src = ipv6_at(bytes, 8);
        let dst = ipv6_at(bytes, 24);

        let udp = &bytes[IPV6_HEADER_LEN..];
        let udp_len = usize::from(u16::from_be_bytes([udp[4], udp[5]]));
        if udp_len != payload_len {
            return Err(SimError::MalformedPacket("UDP length mismatch"));
        }
        let datagram = UdpDatagram {
            src_port: u16::from_be_bytes([udp[0], udp[1]]),
            dst_port: u16::from_be_bytes([udp[2], udp[3]]),
            payload: udp[UDP_HEADER_LEN..].to_vec(),
        };
        let checksum = u16::from_be_bytes([udp[6], udp[7]]);
        if checksum != udp_checksum(&src, &dst, &datagram) {
            return Err(SimError::MalformedPacket("bad UDP checksum"));
        }

        Ok(Ipv6Packet {
            src,
            dst,
            hop_limit,
            udp: datagram,
        })
    }
}

fn ipv6_at(bytes: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&bytes[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

/// RFC 8200 §8.1 pseudo-header checksum. Zero is sent as `0xffff`.
fn udp_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, udp: &UdpDatagram) -> u16 {
    let len = udp.len() as u32;
    let mut sum: u32 = 0;
    let mut add = |chunk: &[u8]| {
        for pair in chunk.chunks(2) {
            let word = match pair {
                [hi, lo] => u16::from_be_bytes([*hi, *lo]),
                [hi] => u16::from_be_bytes([*hi, 0]),
                _ => 0,
            };
            sum += u32::from(word);
        }
    };
    add(&src.octets());
    add(&dst.octets());
    add(&len.to_be_bytes());
    add(&[0, 0, 0, NEXT_HEADER_UDP]);
    add(&udp.src_port.to_be_bytes());
    add(&udp.dst_port.to_be_bytes());
    add(&(len as u16).to_be_bytes());
    add(&udp.payload);

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    match !(sum as u16) {
        0 => 0xffff,
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(payload: Vec<u8>) -> Ipv6Packet {
        Ipv6Packet::udp(
            "2001:1::200:ff:fe00:1".parse().unwrap(),
            "2001:1::200:ff:fe00:3".parse().unwrap(),
            UdpDatagram {
                src_port: 49153,
                dst_port: 9,
                payload,
            },
        )
    }

    #[test]
    fn test_echo_request_length() {
        let pkt = sample(vec![0; 1024]);
        assert_eq!(pkt.len(), 1072);
        let bytes = pkt.encode();
        assert_eq!(bytes.len(), 1072);
        assert_eq!(bytes[0], 0x60);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 1032);
        assert_eq!(bytes[6], NEXT_HEADER_UDP);
        assert_eq!(bytes[7], DEFAULT_HOP_LIMIT);
    }

    #[test]
    fn test_decode_recovers_fields() {
        let pkt = sample(b"odd-length!".to_vec());
        let decoded = Ipv6Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let mut bytes = sample(vec![7; 32]).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = Ipv6Packet::decode(&bytes).unwrap_err();
        assert!(matches!(err, SimError::MalformedPacket("bad UDP checksum")));
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = sample(vec![0; 16]).encode();
        assert!(Ipv6Packet::decode(&bytes[..30]).is_err());
        assert!(Ipv6Packet::decode(&bytes[..bytes.len() - 1]).is_err());
    }
}
