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

//! Module defining a router: interfaces, routing table, static routes and the (optional)
//! link-state protocol instance.

use crate::isis::{IsisConfig, IsisInstance, RouterCtx};
use crate::netsim::route_map::{RouteMap, RouteMapDirection};
use crate::netsim::{Cost, DeviceError, DeviceId, IfIndex, LinkId, MacAddr, Prefix, RouterId};
use crate::netsim::{Event, EventQueue, Job};
use crate::rib::{NextHop, Protocol, Route, RoutingTable};
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;

/// Type of the link an interface is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// Point to point link with exactly one neighbor
    PointToPoint,
    /// Multi-access segment
    Lan,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceKind::PointToPoint => write!(f, "p2p"),
            InterfaceKind::Lan => write!(f, "lan"),
        }
    }
}

/// Interface of a router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Index, unique on the router
    pub ifindex: IfIndex,
    /// Name
    pub name: String,
    /// Address
    pub addr: Ipv4Addr,
    /// Mask length of the subnet
    pub mask_len: u8,
    /// MAC address
    pub mac: MacAddr,
    /// Link the interface is attached to
    pub link: LinkId,
    /// Point to point or LAN
    pub kind: InterfaceKind,
    /// State of the link
    pub up: bool,
}

impl Interface {
    /// Subnet of the interface
    pub fn prefix(&self) -> Prefix {
        Prefix::new(self.addr, self.mask_len)
    }
}

/// Configured static route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRoute {
    /// Destination
    pub prefix: Prefix,
    /// Gateway
    pub next_hop: Ipv4Addr,
    /// Interface on the subnet of the gateway
    pub ifindex: IfIndex,
    /// Cost
    pub cost: Cost,
}

/// Router
#[derive(Debug)]
pub struct Router {
    /// Name of the router
    name: String,
    /// ID of the device in the network
    device_id: DeviceId,
    /// Loopback address, also used as router id
    loopback: Ipv4Addr,
    interfaces: BTreeMap<IfIndex, Interface>,
    next_ifindex: u32,
    rib: RoutingTable,
    static_routes: BTreeMap<Prefix, StaticRoute>,
    isis: Option<IsisInstance>,
}

impl Router {
    pub(crate) fn new(name: String, device_id: DeviceId, loopback: Ipv4Addr) -> Router {
        let mut rib = RoutingTable::new();
        rib.add_route(Route {
            prefix: Prefix::host(loopback),
            protocol: Protocol::Direct,
            cost: 0,
            next_hops: BTreeSet::new(),
        });
        Router {
            name,
            device_id,
            loopback,
            interfaces: BTreeMap::new(),
            next_ifindex: 1,
            rib,
            static_routes: BTreeMap::new(),
            isis: None,
        }
    }

    /// Return the name of the Router
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Return the device id of the router
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Router id, derived from the loopback address
    pub fn router_id(&self) -> RouterId {
        RouterId::from(self.loopback)
    }

    /// Loopback address
    pub fn loopback(&self) -> Ipv4Addr {
        self.loopback
    }

    /// All interfaces
    pub fn interfaces(&self) -> &BTreeMap<IfIndex, Interface> {
        &self.interfaces
    }

    /// Get one interface
    pub fn interface(&self, ifindex: IfIndex) -> Option<&Interface> {
        self.interfaces.get(&ifindex)
    }

    /// Interface with the given address
    pub fn interface_by_addr(&self, addr: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.values().find(|i| i.addr == addr)
    }

    /// Routing table
    pub fn rib(&self) -> &RoutingTable {
        &self.rib
    }

    /// Configured static routes
    pub fn static_routes(&self) -> &BTreeMap<Prefix, StaticRoute> {
        &self.static_routes
    }

    /// Protocol instance, if the protocol is enabled
    pub fn isis(&self) -> Option<&IsisInstance> {
        self.isis.as_ref()
    }

    /// Add an interface attached to `link`, and install the connected route.
    pub(crate) fn add_interface(
        &mut self,
        addr: Ipv4Addr,
        mask_len: u8,
        link: LinkId,
        kind: InterfaceKind,
    ) -> IfIndex {
        let ifindex = IfIndex(self.next_ifindex);
        self.next_ifindex += 1;
        let mac = interface_mac(self.device_id, ifindex);
        let iface = Interface {
            ifindex,
            name: format!("eth{}", ifindex.0),
            addr,
            mask_len,
            mac,
            link,
            kind,
            up: true,
        };
        self.rib.add_route(connected_route(&iface));
        debug!(target: "netsim", "{}: added interface {} {}/{}", self.name, iface.name, addr, mask_len);
        self.interfaces.insert(ifindex, iface);
        ifindex
    }

    /// Split the router into the protocol instance and the context lent to it.
    fn split<'a>(
        &'a mut self,
        queue: &'a mut EventQueue,
    ) -> (&'a mut Option<IsisInstance>, RouterCtx<'a>) {
        let Router { name, device_id, loopback, interfaces, static_routes, rib, isis, .. } = self;
        let ctx = RouterCtx {
            device: *device_id,
            name: name.as_str(),
            loopback: *loopback,
            interfaces,
            static_routes,
            rib,
            queue,
        };
        (isis, ctx)
    }

    fn with_isis<T, F>(&mut self, queue: &mut EventQueue, f: F) -> Result<T, DeviceError>
    where
        F: FnOnce(&mut IsisInstance, &mut RouterCtx) -> Result<T, DeviceError>,
    {
        let (isis, mut ctx) = self.split(queue);
        match isis {
            Some(isis) => f(isis, &mut ctx),
            None => Err(DeviceError::IsisNotEnabled),
        }
    }

    /// handle an `Event`. Events for a disabled protocol are ignored.
    pub(crate) fn handle_event(&mut self, event: Event, queue: &mut EventQueue) {
        let (isis, mut ctx) = self.split(queue);
        let isis = match isis {
            Some(isis) => isis,
            None => {
                trace!(target: "netsim", "{}: protocol disabled, ignoring {:?}", ctx.name, event);
                return;
            }
        };
        match event {
            Event::Deliver { ifindex, frame, .. } => {
                if ctx.is_up(ifindex) {
                    isis.receive(&mut ctx, ifindex, frame);
                }
            }
            Event::Timer { handle, timer, .. } => isis.handle_timer(&mut ctx, handle, timer),
            Event::Job { job, .. } => isis.handle_job(&mut ctx, job),
        }
    }

    /// Enable the protocol on the router
    pub(crate) fn enable_isis(
        &mut self,
        queue: &mut EventQueue,
        config: IsisConfig,
    ) -> Result<(), DeviceError> {
        if self.isis.is_some() {
            return Err(DeviceError::IsisAlreadyEnabled);
        }
        let router_id = self.router_id();
        info!(target: "netsim", "{}: enabling IS-IS", self.name);
        let mut instance = IsisInstance::new(config, router_id, &self.name);
        let (isis, mut ctx) = self.split(queue);
        instance.start(&mut ctx);
        *isis = Some(instance);
        Ok(())
    }

    /// Disable the protocol on the router. All of its state is dropped.
    pub(crate) fn disable_isis(&mut self, queue: &mut EventQueue) -> Result<(), DeviceError> {
        let (isis, mut ctx) = self.split(queue);
        let mut instance = isis.take().ok_or(DeviceError::IsisNotEnabled)?;
        info!(target: "netsim", "{}: disabling IS-IS", ctx.name);
        instance.shutdown(&mut ctx);
        Ok(())
    }

    /// Enable the protocol on an interface
    pub(crate) fn enable_isis_interface(
        &mut self,
        queue: &mut EventQueue,
        ifindex: IfIndex,
    ) -> Result<(), DeviceError> {
        self.with_isis(queue, |isis, ctx| isis.enable_interface(ctx, ifindex))
    }

    /// Disable the protocol on an interface
    pub(crate) fn disable_isis_interface(
        &mut self,
        queue: &mut EventQueue,
        ifindex: IfIndex,
    ) -> Result<(), DeviceError> {
        self.with_isis(queue, |isis, ctx| isis.disable_interface(ctx, ifindex))
    }

    /// Set the cost of an interface, `None` restores the default
    pub(crate) fn set_interface_cost(
        &mut self,
        queue: &mut EventQueue,
        ifindex: IfIndex,
        cost: Option<Cost>,
    ) -> Result<(), DeviceError> {
        self.with_isis(queue, |isis, ctx| isis.set_interface_cost(ctx, ifindex, cost))
    }

    /// Set the DIS priority of an interface, `None` restores the default
    pub(crate) fn set_interface_priority(
        &mut self,
        queue: &mut EventQueue,
        ifindex: IfIndex,
        priority: Option<u8>,
    ) -> Result<(), DeviceError> {
        self.with_isis(queue, |isis, ctx| isis.set_interface_priority(ctx, ifindex, priority))
    }

    /// Set the flooding group of an interface
    pub(crate) fn set_interface_group(
        &mut self,
        queue: &mut EventQueue,
        ifindex: IfIndex,
        group: Option<String>,
    ) -> Result<(), DeviceError> {
        self.with_isis(queue, |isis, _| isis.set_interface_group(ifindex, group))
    }

    /// Set (`Some(timeout)`) or clear (`None`) administrative overload
    pub(crate) fn set_overload(
        &mut self,
        queue: &mut EventQueue,
        overload: Option<Option<u32>>,
    ) -> Result<(), DeviceError> {
        self.with_isis(queue, |isis, ctx| {
            match overload {
                Some(timeout) => isis.set_overload(ctx, timeout),
                None => isis.clear_overload(ctx),
            }
            Ok(())
        })
    }

    /// Add a route map to the import or export policy
    pub(crate) fn add_policy(
        &mut self,
        queue: &mut EventQueue,
        map: RouteMap,
        direction: RouteMapDirection,
    ) -> Result<(), DeviceError> {
        let import = direction == RouteMapDirection::Import;
        self.with_isis(queue, |isis, ctx| isis.add_policy(ctx, map, import))
    }

    /// Remove a route map from the import or export policy
    pub(crate) fn remove_policy(
        &mut self,
        queue: &mut EventQueue,
        order: usize,
        direction: RouteMapDirection,
    ) -> Result<RouteMap, DeviceError> {
        let import = direction == RouteMapDirection::Import;
        self.with_isis(queue, |isis, ctx| isis.remove_policy(ctx, order, import))
    }

    /// Replace a route map of the import or export policy
    pub(crate) fn modify_policy(
        &mut self,
        queue: &mut EventQueue,
        map: RouteMap,
        direction: RouteMapDirection,
    ) -> Result<RouteMap, DeviceError> {
        let import = direction == RouteMapDirection::Import;
        self.with_isis(queue, |isis, ctx| isis.modify_policy(ctx, map, import))
    }

    /// Add a static route. The gateway must be on a connected subnet.
    pub(crate) fn add_static_route(
        &mut self,
        queue: &mut EventQueue,
        prefix: Prefix,
        next_hop: Ipv4Addr,
        cost: Cost,
    ) -> Result<(), DeviceError> {
        if self.static_routes.contains_key(&prefix) {
            return Err(DeviceError::StaticRouteAlreadyExists(prefix));
        }
        let ifindex = self
            .interfaces
            .values()
            .find(|i| i.prefix().contains(next_hop) && i.addr != next_hop)
            .map(|i| i.ifindex)
            .ok_or(DeviceError::NextHopNotConnected(next_hop))?;
        let route = StaticRoute { prefix, next_hop, ifindex, cost };
        debug!(target: "netsim", "{}: static route {} via {}", self.name, prefix, next_hop);
        self.static_routes.insert(prefix, route);
        self.rib.add_route(static_route(&route));
        self.static_routes_changed(queue);
        Ok(())
    }

    /// Remove a static route
    pub(crate) fn remove_static_route(
        &mut self,
        queue: &mut EventQueue,
        prefix: Prefix,
    ) -> Result<(), DeviceError> {
        if self.static_routes.remove(&prefix).is_none() {
            return Err(DeviceError::NoStaticRoute(prefix));
        }
        self.rib.delete_route(prefix, Protocol::Static);
        self.static_routes_changed(queue);
        Ok(())
    }

    fn static_routes_changed(&mut self, queue: &mut EventQueue) {
        let (isis, mut ctx) = self.split(queue);
        if let Some(isis) = isis {
            isis.export_static_routes(&mut ctx);
            isis.flush(&mut ctx);
            // a removed static route may uncover a protocol route
            isis.schedule_job(&mut ctx, Job::Spf);
        }
    }

    /// The link of an interface went up or down
    pub(crate) fn set_interface_up(&mut self, queue: &mut EventQueue, ifindex: IfIndex, up: bool) {
        let route = match self.interfaces.get_mut(&ifindex) {
            Some(i) if i.up != up => {
                i.up = up;
                connected_route(i)
            }
            _ => return,
        };
        info!(target: "netsim", "{}: interface {} is {}", self.name, ifindex, if up { "up" } else { "down" });
        if up {
            self.rib.add_route(route);
        } else {
            self.rib.delete_route(route.prefix, Protocol::Direct);
        }
        let (isis, mut ctx) = self.split(queue);
        if let Some(isis) = isis {
            isis.set_interface_state(&mut ctx, ifindex, up);
            isis.schedule_job(&mut ctx, Job::Spf);
        }
    }

    /// Remove the adjacencies of one interface, or of all interfaces
    pub(crate) fn clear_adjacency(
        &mut self,
        queue: &mut EventQueue,
        ifindex: Option<IfIndex>,
    ) -> Result<(), DeviceError> {
        self.with_isis(queue, |isis, ctx| isis.clear_adjacency(ctx, ifindex))
    }
}

/// Locally administered MAC address of an interface: 24 bits of the device index, followed by
/// 16 bits of the interface index.
pub(crate) fn interface_mac(device: DeviceId, ifindex: IfIndex) -> MacAddr {
    let dev = (device.index() as u32).to_be_bytes();
    let ifi = ifindex.0.to_be_bytes();
    assert!(dev[0] == 0, "device index {} does not fit into a MAC address", device.index());
    assert!(
        ifi[0] == 0 && ifi[1] == 0,
        "interface index {} does not fit into a MAC address",
        ifindex
    );
    MacAddr([0x02, dev[1], dev[2], dev[3], ifi[2], ifi[3]])
}

fn connected_route(iface: &Interface) -> Route {
    let mut next_hops = BTreeSet::new();
    next_hops.insert(NextHop { ifindex: iface.ifindex, gateway: None });
    Route { prefix: iface.prefix(), protocol: Protocol::Direct, cost: 0, next_hops }
}

fn static_route(route: &StaticRoute) -> Route {
    let mut next_hops = BTreeSet::new();
    next_hops.insert(NextHop { ifindex: route.ifindex, gateway: Some(route.next_hop) });
    Route { prefix: route.prefix, protocol: Protocol::Static, cost: route.cost, next_hops }
}
