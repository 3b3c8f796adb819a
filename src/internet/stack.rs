//! Per-node IPv6 stack: interfaces, routing, UDP port table.

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use serde::Serialize;
use tracing::{debug, info};

use crate::app::AppId;
use crate::device::DeviceId;
use crate::error::{SimError, SimResult};
use crate::node::{NodeContainer, NodeId};
use crate::world::World;

use super::address::Ipv6Prefix;
use super::routing::{Ipv6ListRoutingHelper, Ipv6StaticRoutingHelper, ListRouting, Route};

/// First port handed out to unbound senders (IANA dynamic range).
const EPHEMERAL_PORT_START: u16 = 49153;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv6Interface {
    pub device: DeviceId,
    pub global: Ipv6Addr,
    pub prefix: Ipv6Prefix,
    pub link_local: Ipv6Addr,
    /// Relay packets received here that are addressed elsewhere.
    pub forwarding: bool,
}

impl Ipv6Interface {
    pub fn owns(&self, addr: &Ipv6Addr) -> bool {
        *addr == self.global || *addr == self.link_local
    }

    /// Source address to use toward `dst`.
    pub fn source_for(&self, dst: &Ipv6Addr) -> Ipv6Addr {
        if Ipv6Prefix::link_local().contains(dst) {
            self.link_local
        } else {
            self.global
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackStats {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub forwarded: u64,
    pub no_route: u64,
    pub hop_limit_exceeded: u64,
    pub no_listener: u64,
    pub malformed: u64,
    /// Addressed to someone else, received on a non-forwarding interface.
    pub not_for_us: u64,
}

#[derive(Debug)]
pub struct Ipv6Stack {
    node: NodeId,
    interfaces: Vec<Ipv6Interface>,
    routing: ListRouting,
    bindings: BTreeMap<u16, AppId>,
    next_ephemeral: u16,
    pub stats: StackStats,
}

impl Ipv6Stack {
    pub fn new(node: NodeId, routing: ListRouting) -> Self {
        Ipv6Stack {
            node,
            interfaces: Vec::new(),
            routing,
            bindings: BTreeMap::new(),
            next_ephemeral: EPHEMERAL_PORT_START,
            stats: StackStats::default(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn interfaces(&self) -> &[Ipv6Interface] {
        &self.interfaces
    }

    pub fn interface(&self, index: usize) -> SimResult<&Ipv6Interface> {
        let len = self.interfaces.len();
        self.interfaces.get(index).ok_or(SimError::IndexOutOfRange {
            collection: "interface",
            index,
            len,
        })
    }

    pub fn interface_mut(&mut self, index: usize) -> SimResult<&mut Ipv6Interface> {
        let len = self.interfaces.len();
        self.interfaces.get_mut(index).ok_or(SimError::IndexOutOfRange {
            collection: "interface",
            index,
            len,
        })
    }

    pub fn interface_for(&self, device: DeviceId) -> Option<usize> {
        self.interfaces.iter().position(|i| i.device == device)
    }

    pub(crate) fn add_interface(
        &mut self,
        device: DeviceId,
        global: Ipv6Addr,
        prefix: Ipv6Prefix,
        link_local: Ipv6Addr,
    ) -> usize {
        self.interfaces.push(Ipv6Interface {
            device,
            global,
            prefix,
            link_local,
            forwarding: false,
        });
        self.interfaces.len() - 1
    }

    pub fn routing(&self) -> &ListRouting {
        &self.routing
    }

    pub fn routing_mut(&mut self) -> &mut ListRouting {
        &mut self.routing
    }

    pub fn route(&self, dst: &Ipv6Addr) -> Option<Route> {
        self.routing.route_output(dst)
    }

    /// Whether any interface on this node owns `addr`.
    pub fn is_local(&self, addr: &Ipv6Addr) -> bool {
        self.interfaces.iter().any(|i| i.owns(addr))
    }

    /// First global address, if any interface is configured.
    pub fn primary_address(&self) -> Option<Ipv6Addr> {
        self.interfaces.first().map(|i| i.global)
    }

    pub fn bind(&mut self, port: u16, app: AppId) -> SimResult<()> {
        if self.bindings.contains_key(&port) {
            return Err(SimError::PortInUse {
                node: self.node,
                port,
            });
        }
        self.bindings.insert(port, app);
        Ok(())
    }

    /// Bind `app` to the next free ephemeral port.
    pub fn bind_ephemeral(&mut self, app: AppId) -> SimResult<u16> {
        let start = self.next_ephemeral;
        loop {
            let port = self.next_ephemeral;
            self.next_ephemeral = match self.next_ephemeral.checked_add(1) {
                Some(p) => p,
                None => EPHEMERAL_PORT_START,
            };
            if !self.bindings.contains_key(&port) {
                self.bindings.insert(port, app);
                return Ok(port);
            }
            if self.next_ephemeral == start {
                return Err(SimError::PortInUse {
                    node: self.node,
                    port,
                });
            }
        }
    }

    pub fn unbind(&mut self, port: u16) {
        self.bindings.remove(&port);
    }

    pub fn listener(&self, port: u16) -> Option<AppId> {
        self.bindings.get(&port).copied()
    }
}

/// Installs an [`Ipv6Stack`] on nodes.
#[derive(Debug)]
pub struct InternetStackHelper {
    ipv4: bool,
    routing: Ipv6ListRoutingHelper,
}

impl Default for InternetStackHelper {
    fn default() -> Self {
        let mut routing = Ipv6ListRoutingHelper::new();
        routing.add(Ipv6StaticRoutingHelper, 0);
        InternetStackHelper {
            ipv4: true,
            routing,
        }
    }
}

impl InternetStackHelper {
    pub fn new() -> Self {
        InternetStackHelper::default()
    }

    /// Only `false` is supported; IPv4 is not modelled.
    pub fn set_ipv4_stack_install(&mut self, enable: bool) -> &mut Self {
        self.ipv4 = enable;
        self
    }

    pub fn set_routing_helper(&mut self, routing: Ipv6ListRoutingHelper) -> &mut Self {
        self.routing = routing;
        self
    }

    pub fn install(&self, world: &mut World, nodes: &NodeContainer) -> SimResult<()> {
        if self.ipv4 {
            return Err(SimError::InvalidScenario(
                "IPv4 is not supported; disable it with set_ipv4_stack_install(false)".into(),
            ));
        }
        for node in nodes.iter() {
            world.install_stack(Ipv6Stack::new(node, self.routing.create()))?;
            debug!(%node, "IPv6 stack installed");
        }
        info!(target: "amisim::scenario", nodes = nodes.len(), "internet stack installed (IPv6 only)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internet::{Ipv6AddressHelper, StaticRouting};

    fn stack() -> Ipv6Stack {
        Ipv6Stack::new(NodeId::new(0), ListRouting::new())
    }

    #[test]
    fn test_bind_rejects_duplicate_port() {
        let mut s = stack();
        s.bind(9, AppId::new(0)).unwrap();
        let err = s.bind(9, AppId::new(1)).unwrap_err();
        assert!(matches!(err, SimError::PortInUse { port: 9, .. }));
        assert_eq!(s.listener(9), Some(AppId::new(0)));
    }

    #[test]
    fn test_ephemeral_ports_skip_bound() {
        let mut s = stack();
        s.bind(EPHEMERAL_PORT_START, AppId::new(0)).unwrap();
        assert_eq!(s.bind_ephemeral(AppId::new(1)).unwrap(), EPHEMERAL_PORT_START + 1);
        assert_eq!(s.bind_ephemeral(AppId::new(2)).unwrap(), EPHEMERAL_PORT_START + 2);
    }

    #[test]
    fn test_ipv4_must_be_disabled() {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 1).unwrap();
        let err = InternetStackHelper::new().install(&mut world, &nodes).unwrap_err();
        assert!(matches!(err, SimError::InvalidScenario(_)));
    }

    #[test]
    fn test_assign_installs_addresses_and_on_link_routes() {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 2).unwrap();
        let devices = crate::device::LrWpanHelper::default().install(&mut world, &nodes).unwrap();
        crate::device::LrWpanHelper::associate_to_pan(&mut world, &devices, 0).unwrap();

        let mut routing = Ipv6ListRoutingHelper::new();
        routing.add(Ipv6StaticRoutingHelper, 1);
        let mut internet = InternetStackHelper::new();
        internet.set_ipv4_stack_install(false).set_routing_helper(routing);
        internet.install(&mut world, &nodes).unwrap();

        let helper = Ipv6AddressHelper::new("2001:1::".parse().unwrap(), 64);
        let ifaces = helper.assign(&mut world, &devices).unwrap();
        assert_eq!(ifaces.len(), 2);
        assert_eq!(ifaces.address(1).unwrap().to_string(), "2001:1::ff:fe00:2");

        let stack = world.stack(nodes.get(1).unwrap()).unwrap();
        assert_eq!(stack.interfaces()[0].link_local.to_string(), "fe80::ff:fe00:2");
        assert!(stack.route(&"2001:1::ff:fe00:1".parse().unwrap()).is_some());
        assert!(stack.routing().protocol::<StaticRouting>().is_some());

        let err = helper.assign(&mut world, &devices).unwrap_err();
        assert!(matches!(err, SimError::AddressAlreadyAssigned(_)));
    }

    #[test]
    fn test_assign_without_stack_fails() {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 1).unwrap();
        let devices = crate::device::LrWpanHelper::default().install(&mut world, &nodes).unwrap();
        let helper = Ipv6AddressHelper::new("2001:1::".parse().unwrap(), 64);
        let err = helper.assign(&mut world, &devices).unwrap_err();
        assert!(matches!(err, SimError::StackNotInstalled(_)));
    }

    #[test]
    fn test_default_route_set_on_other_nodes_only() {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 3).unwrap();
        let devices = crate::device::LrWpanHelper::default().install(&mut world, &nodes).unwrap();
        crate::device::LrWpanHelper::associate_to_pan(&mut world, &devices, 0).unwrap();
        let mut internet = InternetStackHelper::new();
        internet.set_ipv4_stack_install(false);
        internet.install(&mut world, &nodes).unwrap();
        let ifaces = Ipv6AddressHelper::new("2001:1::".parse().unwrap(), 64)
            .assign(&mut world, &devices)
            .unwrap();

        ifaces.set_forwarding(&mut world, 0, true).unwrap();
        ifaces.set_default_route_in_all_nodes(&mut world, 0).unwrap();

        let gw = ifaces.address(0).unwrap();
        let router = world.stack(nodes.get(0).unwrap()).unwrap();
        assert!(router.interfaces()[0].forwarding);
        assert!(router.routing().protocol::<StaticRouting>().unwrap().default_route().is_none());
        for i in 1..3 {
            let s = world.stack(nodes.get(i).unwrap()).unwrap();
            let def = s.routing().protocol::<StaticRouting>().unwrap().default_route().copied();
            assert_eq!(def.and_then(|r| r.gateway), Some(gw));
        }
    }
}
