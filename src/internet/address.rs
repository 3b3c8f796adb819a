//! Prefixes and address assignment.

use std::net::Ipv6Addr;

use serde::Serialize;
use tracing::debug;

use crate::device::DeviceContainer;
use crate::error::{SimError, SimResult};
use crate::node::NodeId;
use crate::world::World;

use super::routing::StaticRouting;

/// An IPv6 network prefix, host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Ipv6Prefix {
    network: Ipv6Addr,
    len: u8,
}

impl Ipv6Prefix {
    /// `len` is clamped to 128; host bits of `addr` are masked off.
    pub fn new(addr: Ipv6Addr, len: u8) -> Self {
        let len = len.min(128);
        Ipv6Prefix {
            network: Ipv6Addr::from(u128::from(addr) & mask(len)),
            len,
        }
    }

    /// The link-local prefix `fe80::/64`.
    pub fn link_local() -> Self {
        Ipv6Prefix::new(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 64)
    }

    pub fn host(addr: Ipv6Addr) -> Self {
        Ipv6Prefix::new(addr, 128)
    }

    pub fn network(&self) -> Ipv6Addr {
        self.network
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        u128::from(*addr) & mask(self.len) == u128::from(self.network)
    }

    /// Combine the prefix with a 64-bit interface identifier.
    pub fn with_interface_id(&self, iid: [u8; 8]) -> Ipv6Addr {
        let mut octets = self.network.octets();
        octets[8..].copy_from_slice(&iid);
        Ipv6Addr::from(octets)
    }
}

impl std::fmt::Display for Ipv6Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

fn mask(len: u8) -> u128 {
    match len {
        0 => 0,
        n => u128::MAX << (128 - u32::from(n)),
    }
}

/// Global addresses handed out by one [`Ipv6AddressHelper::assign`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ipv6InterfaceContainer {
    entries: Vec<InterfaceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InterfaceEntry {
    node: NodeId,
    interface: usize,
    address: Ipv6Addr,
}

impl Ipv6InterfaceContainer {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, index: usize) -> SimResult<InterfaceEntry> {
        self.entries
            .get(index)
            .copied()
            .ok_or(SimError::IndexOutOfRange {
                collection: "interface",
                index,
                len: self.entries.len(),
            })
    }

    /// Global address of the `index`-th interface.
    pub fn address(&self, index: usize) -> SimResult<Ipv6Addr> {
        Ok(self.entry(index)?.address)
    }

    pub fn node(&self, index: usize) -> SimResult<NodeId> {
        Ok(self.entry(index)?.node)
    }

    pub fn addresses(&self) -> impl Iterator<Item = Ipv6Addr> + '_ {
        self.entries.iter().map(|e| e.address)
    }

    /// Let the `index`-th interface relay packets not addressed to it.
    pub fn set_forwarding(&self, world: &mut World, index: usize, enabled: bool) -> SimResult<()> {
        let entry = self.entry(index)?;
        let stack = world.stack_mut(entry.node)?;
        let iface = stack.interface_mut(entry.interface)?;
        iface.forwarding = enabled;
        debug!(node = %entry.node, interface = entry.interface, enabled, "forwarding set");
        Ok(())
    }

    /// Point the default route of every other node in this container at
    /// the `router`-th interface's address.
    pub fn set_default_route_in_all_nodes(&self, world: &mut World, router: usize) -> SimResult<()> {
        let gateway = self.entry(router)?;
        for entry in &self.entries {
            if entry.node == gateway.node {
                continue;
            }
            let stack = world.stack_mut(entry.node)?;
            let routing = stack
                .routing_mut()
                .protocol_mut::<StaticRouting>()
                .ok_or_else(|| {
                    SimError::InvalidScenario(format!("node {} has no static routing", entry.node))
                })?;
            routing.set_default_route(gateway.address, entry.interface);
            debug!(node = %entry.node, gateway = %gateway.address, "default route set");
        }
        Ok(())
    }
}

/// Assigns addresses from one prefix, host part from the device's
/// interface identifier.
#[derive(Debug, Clone)]
pub struct Ipv6AddressHelper {
    prefix: Ipv6Prefix,
}

impl Ipv6AddressHelper {
    pub fn new(network: Ipv6Addr, prefix_len: u8) -> Self {
        Ipv6AddressHelper {
            prefix: Ipv6Prefix::new(network, prefix_len),
        }
    }

    pub fn prefix(&self) -> Ipv6Prefix {
        self.prefix
    }

    /// Give every device in `devices` a global and a link-local address,
    /// in container order, and install the on-link route for the prefix.
    pub fn assign(&self, world: &mut World, devices: &DeviceContainer) -> SimResult<Ipv6InterfaceContainer> {
        let mut container = Ipv6InterfaceContainer::default();
        for id in devices.iter() {
            let device = world.device(id)?;
            let node = device.node;
            let iid = device.address.interface_id();
            let global = self.prefix.with_interface_id(iid);
            let link_local = Ipv6Prefix::link_local().with_interface_id(iid);

            let stack = world.stack_mut(node)?;
            if stack.interface_for(id).is_some() {
                return Err(SimError::AddressAlreadyAssigned(id));
            }
            let interface = stack.add_interface(id, global, self.prefix, link_local);
            if let Some(routing) = stack.routing_mut().protocol_mut::<StaticRouting>() {
                routing.add_network_route(self.prefix, interface);
                routing.add_network_route(Ipv6Prefix::link_local(), interface);
            }
            debug!(device = %id, %node, address = %global, "address assigned");
            container.entries.push(InterfaceEntry {
                node,
                interface,
                address: global,
            });
        }
        Ok(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_masks_host_bits() {
        let p = Ipv6Prefix::new("2001:1::1234".parse().unwrap(), 64);
        assert_eq!(p.to_string(), "2001:1::/64");
        assert!(p.contains(&"2001:1::ff:fe00:2".parse().unwrap()));
        assert!(!p.contains(&"2001:2::1".parse().unwrap()));
    }

    #[test]
    fn test_zero_length_prefix_matches_everything() {
        let p = Ipv6Prefix::new(Ipv6Addr::UNSPECIFIED, 0);
        assert!(p.is_empty());
        assert!(p.contains(&"fe80::1".parse().unwrap()));
    }

    #[test]
    fn test_with_interface_id() {
        let p = Ipv6Prefix::new("2001:1::".parse().unwrap(), 64);
        let addr = p.with_interface_id([0, 0, 0, 0xff, 0xfe, 0, 0, 3]);
        assert_eq!(addr.to_string(), "2001:1::ff:fe00:3");
    }
}
