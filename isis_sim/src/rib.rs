// IsisSim: Link-State Routing on a Simulated Network
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Routing table
//!
//! Each router owns one [`RoutingTable`], mapping prefixes to a single selected route. Routes are
//! installed by different protocols; connected subnets and the loopback are `Direct`, configured
//! routes are `Static` and routes computed by the link-state protocol are `Isis`. The table keeps
//! the route of the most preferred protocol and, for routes of the same protocol, the cheapest
//! one. Equal-cost routes of the same protocol are merged into one route with multiple next hops.

use crate::netsim::{Cost, IfIndex, Prefix};
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;

/// Source protocol of a route. The declaration order is the preference order: `Direct` routes
/// are preferred over `Static` routes, which are preferred over `Isis` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// Connected subnet or local address
    Direct,
    /// Configured static route
    Static,
    /// Route computed by the link-state protocol
    Isis,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Direct => write!(f, "direct"),
            Protocol::Static => write!(f, "static"),
            Protocol::Isis => write!(f, "isis"),
        }
    }
}

/// Next hop of a route: the outgoing interface, and the gateway (if the destination is not
/// directly connected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NextHop {
    /// Outgoing interface
    pub ifindex: IfIndex,
    /// Gateway address on the subnet of the outgoing interface
    pub gateway: Option<Ipv4Addr>,
}

/// A route in the routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination prefix
    pub prefix: Prefix,
    /// Protocol which installed the route
    pub protocol: Protocol,
    /// Cost to reach the destination
    pub cost: Cost,
    /// Set of equal-cost next hops. Local routes (the loopback address) have no next hop.
    pub next_hops: BTreeSet<NextHop>,
}

/// Result of adding a route to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteUpdate {
    /// No route existed for the prefix
    Installed,
    /// The new route replaced the existing one
    Replaced,
    /// The next hops of the new route were merged into the existing equal-cost route
    Merged,
    /// The existing route is better, the new one was ignored
    Rejected,
}

/// Routing table of a single router
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingTable {
    routes: BTreeMap<Prefix, Route>,
}

impl RoutingTable {
    /// Create an empty routing table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Routes of a more preferred protocol are never overwritten. For routes of the
    /// same protocol, a strictly cheaper route replaces the existing one, and an equal-cost route
    /// merges its next hops into the existing one.
    pub fn add_route(&mut self, route: Route) -> RouteUpdate {
        let update = match self.routes.get_mut(&route.prefix) {
            None => {
                self.routes.insert(route.prefix, route);
                return RouteUpdate::Installed;
            }
            Some(old) if route.protocol < old.protocol => {
                *old = route;
                RouteUpdate::Replaced
            }
            Some(old) if route.protocol > old.protocol => RouteUpdate::Rejected,
            Some(old) if route.cost < old.cost => {
                *old = route;
                RouteUpdate::Replaced
            }
            Some(old) if route.cost == old.cost => {
                old.next_hops.extend(route.next_hops);
                RouteUpdate::Merged
            }
            Some(_) => RouteUpdate::Rejected,
        };
        trace!("route update: {:?}", update);
        update
    }

    /// Delete the route for the prefix, but only if it was installed by `protocol`.
    pub fn delete_route(&mut self, prefix: Prefix, protocol: Protocol) -> Option<Route> {
        match self.routes.get(&prefix) {
            Some(r) if r.protocol == protocol => self.routes.remove(&prefix),
            _ => None,
        }
    }

    /// Remove all routes of a protocol, returning them.
    pub fn remove_protocol(&mut self, protocol: Protocol) -> Vec<Route> {
        let prefixes: Vec<Prefix> = self
            .routes
            .values()
            .filter(|r| r.protocol == protocol)
            .map(|r| r.prefix)
            .collect();
        prefixes.into_iter().filter_map(|p| self.routes.remove(&p)).collect()
    }

    /// Exact match lookup
    pub fn get(&self, prefix: &Prefix) -> Option<&Route> {
        self.routes.get(prefix)
    }

    /// Longest prefix match lookup
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&Route> {
        (0..=32u8).rev().find_map(|len| self.routes.get(&Prefix::new(addr, len)))
    }

    /// Iterate over all routes, ordered by prefix
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Iterate over all routes of one protocol
    pub fn routes_of(&self, protocol: Protocol) -> impl Iterator<Item = &Route> {
        self.routes.values().filter(move |r| r.protocol == protocol)
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
