//! Link-layer frames and their wire encoding.
//!
//! Mac48 frames encode as Ethernet II; short-address frames encode as
//! IEEE 802.15.4 data frames with PAN-ID compression. `encode` yields the
//! bytes a capture file stores (no FCS); `wire_len` adds the overhead
//! that occupies the medium but is not captured.

use super::address::MacAddress;

pub const ETHERTYPE_IPV6: u16 = 0x86dd;
/// EtherType used by 6LoWPAN over Ethernet when forced.
pub const ETHERTYPE_LOWPAN: u16 = 0xa0ed;

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERNET_MIN_PAYLOAD: usize = 46;
const ETHERNET_FCS_LEN: usize = 4;

/// FCF: data frame, PAN-ID compression, short destination and source.
const IEEE802154_FCF_DATA_SHORT: u16 = 0x8841;
const IEEE802154_HEADER_LEN: usize = 9;
const IEEE802154_FCS_LEN: usize = 2;
/// Synchronization header (preamble + SFD) plus PHY header.
const IEEE802154_PHY_OVERHEAD: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPayload {
    /// Uncompressed IPv6 (EtherType 0x86DD on Ethernet).
    Ipv6(Vec<u8>),
    /// 6LoWPAN dispatch-prefixed payload.
    Lowpan(Vec<u8>),
}

impl LinkPayload {
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            LinkPayload::Ipv6(b) | LinkPayload::Lowpan(b) => b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub src: MacAddress,
    pub dst: MacAddress,
    /// Destination PAN (802.15.4 only).
    pub pan_id: Option<u16>,
    /// Data sequence number (802.15.4 only).
    pub seq: u8,
    pub payload: LinkPayload,
}

impl Frame {
    /// Capture bytes: link header plus payload, without FCS.
    pub fn encode(&self) -> Vec<u8> {
        match (self.src, self.dst) {
            (MacAddress::Short(src), MacAddress::Short(dst)) => {
                let body = self.payload.bytes();
                let mut out = Vec::with_capacity(IEEE802154_HEADER_LEN + body.len());
                out.extend_from_slice(&IEEE802154_FCF_DATA_SHORT.to_le_bytes());
                out.push(self.seq);
                out.extend_from_slice(&self.pan_id.unwrap_or(0).to_le_bytes());
                out.extend_from_slice(&dst.to_le_bytes());
                out.extend_from_slice(&src.to_le_bytes());
                out.extend_from_slice(body);
                out
            }
            _ => {
                let body = self.payload.bytes();
                let ethertype = match self.payload {
                    LinkPayload::Ipv6(_) => ETHERTYPE_IPV6,
                    LinkPayload::Lowpan(_) => ETHERTYPE_LOWPAN,
                };
                let mut out = Vec::with_capacity(ETHERNET_HEADER_LEN + body.len().max(ETHERNET_MIN_PAYLOAD));
                out.extend_from_slice(&mac48_bytes(&self.dst));
                out.extend_from_slice(&mac48_bytes(&self.src));
                out.extend_from_slice(&ethertype.to_be_bytes());
                out.extend_from_slice(body);
                out.resize(out.len().max(ETHERNET_HEADER_LEN + ETHERNET_MIN_PAYLOAD), 0);
                out
            }
        }
    }

    /// Bytes that occupy the medium.
    pub fn wire_len(&self) -> usize {
        let body = self.payload.len();
        match self.src {
            MacAddress::Short(_) => {
                IEEE802154_PHY_OVERHEAD + IEEE802154_HEADER_LEN + body + IEEE802154_FCS_LEN
            }
            MacAddress::Mac48(_) => {
                ETHERNET_HEADER_LEN + body.max(ETHERNET_MIN_PAYLOAD) + ETHERNET_FCS_LEN
            }
        }
    }
}

fn mac48_bytes(addr: &MacAddress) -> [u8; 6] {
    match addr {
        MacAddress::Mac48(b) => *b,
        MacAddress::Short(s) => {
            let [hi, lo] = s.to_be_bytes();
            [0, 0, 0, 0, hi, lo]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_encoding() {
        let frame = Frame {
            src: MacAddress::allocate_mac48(1),
            dst: MacAddress::allocate_mac48(2),
            pan_id: None,
            seq: 0,
            payload: LinkPayload::Lowpan(vec![0xaa; 100]),
        };
        let bytes = frame.encode();
        assert_eq!(bytes.len(), 114);
        assert_eq!(&bytes[0..6], &[0, 0, 0, 0, 0, 2]);
        assert_eq!(&bytes[6..12], &[0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[12..14], &[0xa0, 0xed]);
        assert_eq!(frame.wire_len(), 118);
    }

    #[test]
    fn test_short_ethernet_payload_is_padded() {
        let frame = Frame {
            src: MacAddress::allocate_mac48(1),
            dst: MacAddress::allocate_mac48(2),
            pan_id: None,
            seq: 0,
            payload: LinkPayload::Ipv6(vec![0x60; 10]),
        };
        assert_eq!(frame.encode().len(), 60);
        assert_eq!(frame.wire_len(), 64);
    }

    #[test]
    fn test_ieee802154_encoding() {
        let frame = Frame {
            src: MacAddress::Short(0x0001),
            dst: MacAddress::Short(0x0003),
            pan_id: Some(0),
            seq: 7,
            payload: LinkPayload::Lowpan(vec![0x41; 10]),
        };
        let bytes = frame.encode();
        assert_eq!(&bytes[0..2], &[0x41, 0x88]);
        assert_eq!(bytes[2], 7);
        assert_eq!(&bytes[3..5], &[0x00, 0x00]);
        assert_eq!(&bytes[5..7], &[0x03, 0x00]);
        assert_eq!(&bytes[7..9], &[0x01, 0x00]);
        assert_eq!(bytes.len(), 19);
        assert_eq!(frame.wire_len(), 6 + 9 + 10 + 2);
    }
}
