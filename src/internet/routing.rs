//! Route selection.
//!
//! A node's routing is a [`ListRouting`]: a priority-ordered list of
//! [`Ipv6RoutingProtocol`]s, consulted highest priority first until one
//! returns a route. The only protocol provided is [`StaticRouting`].

use std::any::Any;
use std::net::Ipv6Addr;

use serde::Serialize;

use super::address::Ipv6Prefix;

/// Output decision for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub destination: Ipv6Prefix,
    /// Index into the node's interface list.
    pub interface: usize,
    /// `None` for on-link destinations.
    pub gateway: Option<Ipv6Addr>,
}

impl Route {
    /// Where the frame is addressed on the link.
    pub fn next_hop(&self, dst: Ipv6Addr) -> Ipv6Addr {
        self.gateway.unwrap_or(dst)
    }
}

pub trait Ipv6RoutingProtocol: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn route_output(&self, dst: &Ipv6Addr) -> Option<Route>;

    /// Downcast support for configuration and inspection.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ── Static Routing ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct StaticRouting {
    routes: Vec<Route>,
    default: Option<Route>,
}

impl StaticRouting {
    pub fn new() -> Self {
        StaticRouting::default()
    }

    pub fn add_network_route(&mut self, destination: Ipv6Prefix, interface: usize) {
        self.routes.push(Route {
            destination,
            interface,
            gateway: None,
        });
    }

    pub fn add_host_route(&mut self, dst: Ipv6Addr, interface: usize, gateway: Option<Ipv6Addr>) {
        self.routes.push(Route {
            destination: Ipv6Prefix::host(dst),
            interface,
            gateway,
        });
    }

    /// Replaces any earlier default route.
    pub fn set_default_route(&mut self, gateway: Ipv6Addr, interface: usize) {
        self.default = Some(Route {
            destination: Ipv6Prefix::new(Ipv6Addr::UNSPECIFIED, 0),
            interface,
            gateway: Some(gateway),
        });
    }

    pub fn default_route(&self) -> Option<&Route> {
        self.default.as_ref()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl Ipv6RoutingProtocol for StaticRouting {
    fn name(&self) -> &'static str {
        "static"
    }

    /// Longest prefix wins; ties go to the earliest added. Falls back to
    /// the default route.
    fn route_output(&self, dst: &Ipv6Addr) -> Option<Route> {
        self.routes
            .iter()
            .filter(|r| r.destination.contains(dst))
            .fold(None::<&Route>, |best, r| match best {
                Some(b) if b.destination.len() >= r.destination.len() => Some(b),
                _ => Some(r),
            })
            .or(self.default.as_ref())
            .copied()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── List Routing ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ListRouting {
    /// Sorted by descending priority; equal priorities keep insertion order.
    protocols: Vec<(i16, Box<dyn Ipv6RoutingProtocol>)>,
}

impl ListRouting {
    pub fn new() -> Self {
        ListRouting::default()
    }

    pub fn add_routing_protocol(&mut self, protocol: Box<dyn Ipv6RoutingProtocol>, priority: i16) {
        let at = self
            .protocols
            .iter()
            .position(|(p, _)| *p < priority)
            .unwrap_or(self.protocols.len());
        self.protocols.insert(at, (priority, protocol));
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// `(priority, name)` in consultation order.
    pub fn entries(&self) -> impl Iterator<Item = (i16, &'static str)> + '_ {
        self.protocols.iter().map(|(p, r)| (*p, r.name()))
    }

    /// First protocol of type `T`.
    pub fn protocol<T: Ipv6RoutingProtocol + 'static>(&self) -> Option<&T> {
        self.protocols
            .iter()
            .find_map(|(_, r)| r.as_any().downcast_ref::<T>())
    }

    pub fn protocol_mut<T: Ipv6RoutingProtocol + 'static>(&mut self) -> Option<&mut T> {
        self.protocols
            .iter_mut()
            .find_map(|(_, r)| r.as_any_mut().downcast_mut::<T>())
    }

    pub fn route_output(&self, dst: &Ipv6Addr) -> Option<Route> {
        self.protocols.iter().find_map(|(_, r)| r.route_output(dst))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Builds a routing protocol instance for one node.
pub trait RoutingHelper: std::fmt::Debug {
    fn create(&self) -> Box<dyn Ipv6RoutingProtocol>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv6StaticRoutingHelper;

impl RoutingHelper for Ipv6StaticRoutingHelper {
    fn create(&self) -> Box<dyn Ipv6RoutingProtocol> {
        Box::new(StaticRouting::new())
    }
}

#[derive(Debug, Default)]
pub struct Ipv6ListRoutingHelper {
    entries: Vec<(Box<dyn RoutingHelper>, i16)>,
}

impl Ipv6ListRoutingHelper {
    pub fn new() -> Self {
        Ipv6ListRoutingHelper::default()
    }

    pub fn add(&mut self, helper: impl RoutingHelper + 'static, priority: i16) -> &mut Self {
        self.entries.push((Box::new(helper), priority));
        self
    }

    pub fn create(&self) -> ListRouting {
        let mut list = ListRouting::new();
        for (helper, priority) in &self.entries {
            list.add_routing_protocol(helper.create(), *priority);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut r = StaticRouting::new();
        r.add_network_route(Ipv6Prefix::new(addr("2001:1::"), 64), 0);
        r.add_host_route(addr("2001:1::5"), 1, Some(addr("2001:1::9")));

        let host = r.route_output(&addr("2001:1::5")).unwrap();
        assert_eq!(host.interface, 1);
        assert_eq!(host.next_hop(addr("2001:1::5")), addr("2001:1::9"));

        let net = r.route_output(&addr("2001:1::6")).unwrap();
        assert_eq!(net.interface, 0);
        assert_eq!(net.next_hop(addr("2001:1::6")), addr("2001:1::6"));
    }

    #[test]
    fn test_default_route_fallback() {
        let mut r = StaticRouting::new();
        r.add_network_route(Ipv6Prefix::new(addr("2001:1::"), 64), 0);
        assert!(r.route_output(&addr("2001:2::1")).is_none());

        r.set_default_route(addr("2001:1::1"), 0);
        let route = r.route_output(&addr("2001:2::1")).unwrap();
        assert_eq!(route.gateway, Some(addr("2001:1::1")));
        // On-link still preferred over the default.
        assert_eq!(r.route_output(&addr("2001:1::3")).unwrap().gateway, None);
    }

    #[test]
    fn test_list_routing_priority_order_and_downcast() {
        let mut helper = Ipv6ListRoutingHelper::new();
        helper.add(Ipv6StaticRoutingHelper, 1).add(Ipv6StaticRoutingHelper, 10);
        let mut list = helper.create();
        assert_eq!(list.entries().map(|(p, _)| p).collect::<Vec<_>>(), vec![10, 1]);

        list.protocol_mut::<StaticRouting>()
            .unwrap()
            .set_default_route(addr("2001:1::1"), 0);
        assert!(list.protocol::<StaticRouting>().unwrap().default_route().is_some());
        assert!(list.route_output(&addr("2001:9::1")).is_some());
    }

    #[test]
    fn test_empty_list_has_no_route() {
        let list = ListRouting::new();
        assert!(list.is_empty());
        assert!(list.route_output(&addr("2001:1::1")).is_none());
    }
}
