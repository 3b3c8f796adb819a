//! Link-layer addresses and their IPv6 interface identifiers.

use std::net::Ipv6Addr;

use serde::Serialize;

/// Short address meaning "not associated" in IEEE 802.15.4.
pub const SHORT_ADDR_UNASSIGNED: u16 = 0xfffe;
pub const SHORT_ADDR_BROADCAST: u16 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MacAddress {
    /// 48-bit IEEE 802 MAC (CSMA).
    Mac48([u8; 6]),
    /// 16-bit IEEE 802.15.4 short address.
    Short(u16),
}

impl MacAddress {
    /// The `n`-th locally allocated MAC, `00:00:00:00:00:01` onward.
    pub fn allocate_mac48(n: u64) -> Self {
        let b = n.to_be_bytes();
        MacAddress::Mac48([b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    /// The broadcast address of the same flavor.
    pub fn broadcast_like(&self) -> Self {
        match self {
            MacAddress::Mac48(_) => MacAddress::Mac48([0xff; 6]),
            MacAddress::Short(_) => MacAddress::Short(SHORT_ADDR_BROADCAST),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        match self {
            MacAddress::Mac48(b) => *b == [0xff; 6],
            MacAddress::Short(s) => *s == SHORT_ADDR_BROADCAST,
        }
    }

    /// IPv6 interface identifier.
    ///
    /// Mac48 maps to modified EUI-64 (RFC 4291 App. A). A short address
    /// maps to `0000:00ff:fe00:XXXX` (RFC 4944 §6).
    pub fn interface_id(&self) -> [u8; 8] {
        match *self {
            MacAddress::Mac48(m) => [m[0] ^ 0x02, m[1], m[2], 0xff, 0xfe, m[3], m[4], m[5]],
            MacAddress::Short(s) => {
                let [hi, lo] = s.to_be_bytes();
                [0, 0, 0, 0xff, 0xfe, 0, hi, lo]
            }
        }
    }

    /// Recover the link address of the same flavor as `self` from the low
    /// 64 bits of `addr`. This stands in for neighbor discovery.
    pub fn resolve_like(&self, addr: &Ipv6Addr) -> Option<MacAddress> {
        let o = addr.octets();
        let iid = &o[8..];
        if iid[3] != 0xff || iid[4] != 0xfe {
            return None;
        }
        match self {
            MacAddress::Mac48(_) => Some(MacAddress::Mac48([
                iid[0] ^ 0x02,
                iid[1],
                iid[2],
                iid[5],
                iid[6],
                iid[7],
            ])),
            MacAddress::Short(_) => {
                if iid[0..3] != [0, 0, 0] || iid[5] != 0 {
                    return None;
                }
                Some(MacAddress::Short(u16::from_be_bytes([iid[6], iid[7]])))
            }
        }
    }

    /// Bytes as carried in a 6LoWPAN mesh header: 2 for short, 8 (EUI-64)
    /// for Mac48.
    pub(crate) fn mesh_bytes(&self) -> Vec<u8> {
        match self {
            MacAddress::Short(s) => s.to_be_bytes().to_vec(),
            MacAddress::Mac48(_) => self.interface_id().to_vec(),
        }
    }

    pub(crate) fn from_mesh_bytes(bytes: &[u8]) -> Option<MacAddress> {
        match bytes.len() {
            2 => Some(MacAddress::Short(u16::from_be_bytes([bytes[0], bytes[1]]))),
            8 => {
                let mut octets = [0u8; 16];
                octets[8..].copy_from_slice(bytes);
                MacAddress::Mac48([0; 6]).resolve_like(&Ipv6Addr::from(octets))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacAddress::Mac48(b) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                b[0], b[1], b[2], b[3], b[4], b[5]
            ),
            MacAddress::Short(s) => write!(f, "{:02x}:{:02x}", s >> 8, s & 0xff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_iid(iid: [u8; 8]) -> Ipv6Addr {
        let mut o = [0u8; 16];
        o[0] = 0x20;
        o[1] = 0x01;
        o[3] = 0x01;
        o[8..].copy_from_slice(&iid);
        Ipv6Addr::from(o)
    }

    #[test]
    fn test_allocate_mac48() {
        assert_eq!(MacAddress::allocate_mac48(1).to_string(), "00:00:00:00:00:01");
        assert_eq!(MacAddress::allocate_mac48(0x1_02).to_string(), "00:00:00:00:01:02");
    }

    #[test]
    fn test_mac48_eui64_flips_universal_bit() {
        let mac = MacAddress::allocate_mac48(3);
        assert_eq!(mac.interface_id(), [0x02, 0, 0, 0xff, 0xfe, 0, 0, 3]);
        assert_eq!(mac.resolve_like(&with_iid(mac.interface_id())), Some(mac));
    }

    #[test]
    fn test_short_rfc4944_mapping() {
        let short = MacAddress::Short(0x0002);
        assert_eq!(short.interface_id(), [0, 0, 0, 0xff, 0xfe, 0, 0, 2]);
        let addr = with_iid(short.interface_id());
        assert_eq!(addr.to_string(), "2001:1::ff:fe00:2");
        assert_eq!(short.resolve_like(&addr), Some(short));
    }

    #[test]
    fn test_resolve_rejects_foreign_iid() {
        let addr: Ipv6Addr = "2001:1::1".parse().unwrap();
        assert_eq!(MacAddress::Short(1).resolve_like(&addr), None);
        assert_eq!(MacAddress::allocate_mac48(1).resolve_like(&addr), None);
    }

    #[test]
    fn test_mesh_bytes() {
        let short = MacAddress::Short(0x1234);
        assert_eq!(MacAddress::from_mesh_bytes(&short.mesh_bytes()), Some(short));
        let mac = MacAddress::allocate_mac48(9);
        assert_eq!(mac.mesh_bytes().len(), 8);
        assert_eq!(MacAddress::from_mesh_bytes(&mac.mesh_bytes()), Some(mac));
    }

    #[test]
    fn test_broadcast() {
        assert!(MacAddress::Short(1).broadcast_like().is_broadcast());
        assert!(MacAddress::allocate_mac48(1).broadcast_like().is_broadcast());
        assert!(!MacAddress::Short(SHORT_ADDR_UNASSIGNED).is_broadcast());
    }
}
