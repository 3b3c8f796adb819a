//! IPv6 network layer.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`address`] | [`Ipv6Prefix`], [`Ipv6AddressHelper`], [`Ipv6InterfaceContainer`] |
//! | [`routing`] | [`Ipv6RoutingProtocol`], [`StaticRouting`], [`ListRouting`] |
//! | [`stack`] | [`Ipv6Stack`], [`InternetStackHelper`] |

pub mod address;
pub mod routing;
pub mod stack;

pub use address::{Ipv6AddressHelper, Ipv6InterfaceContainer, Ipv6Prefix};
pub use routing::{
    Ipv6ListRoutingHelper, Ipv6RoutingProtocol, Ipv6StaticRoutingHelper, ListRouting, Route,
    RoutingHelper, StaticRouting,
};
pub use stack::{InternetStackHelper, Ipv6Interface, Ipv6Stack, StackStats};
