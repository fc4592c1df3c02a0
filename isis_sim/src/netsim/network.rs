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

//! # Top-level Network module
//!
//! This module represents the network topology, applies the configuration, and simulates the
//! network.

use crate::isis::IsisConfig;
use crate::netsim::config::{Config, ConfigExpr, ConfigExprKey, ConfigModifier, ConfigPatch};
use crate::netsim::event::{Event, EventQueue, Transmission};
use crate::netsim::printer;
use crate::netsim::route_map::RouteMapDirection;
use crate::netsim::router::{InterfaceKind, Router};
use crate::netsim::{
    ConfigError, DeviceError, DeviceId, IfIndex, LinkId, NetworkError, PhysicalNetwork, Prefix,
    SimTime,
};

use log::*;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::time::Duration;

static DEFAULT_STOP_AFTER: usize = 1_000_000;
/// Delay of every link in milliseconds
pub const LINK_DELAY: SimTime = 1;

/// A point to point link or a LAN segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Identification of the link
    pub id: LinkId,
    /// Point to point or LAN
    pub kind: InterfaceKind,
    /// Subnet of the link
    pub prefix: Prefix,
    /// State of the link. A down link drops all frames.
    pub up: bool,
    /// Router interfaces attached to the link
    pub attachments: Vec<(DeviceId, IfIndex)>,
}

/// Random disturbance of frame delivery
#[derive(Debug)]
struct Disturbance {
    rng: StdRng,
    max_jitter: SimTime,
    duplication: f64,
}

#[derive(Debug)]
/// # Network struct
/// The struct contains all information about the underlying physical network (links and LAN
/// segments), manages all routers, and handles all events between them. Configuration is applied
/// on the network itself, treated as network-wide configuration.
///
/// Time only advances in [`Network::run_for`]. Configuration changes and link state changes take
/// effect immediately on the devices, but the messages they cause are only exchanged while the
/// network runs.
///
/// ## Frame delivery
///
/// A frame sent on an interface is delivered to every other interface attached to the same link,
/// [`LINK_DELAY`] milliseconds later. Frames on a link that is down are dropped. With
/// [`Network::set_jitter`], every delivery is delayed by an additional random amount, which
/// reorders frames. With [`Network::set_duplication`], frames are randomly delivered twice.
pub struct Network {
    net: PhysicalNetwork,
    links: Vec<Link>,
    routers: HashMap<DeviceId, Router>,
    addresses: HashMap<Ipv4Addr, DeviceId>,
    stop_after: Option<usize>,
    config: Config,
    isis_config: IsisConfig,
    queue: EventQueue,
    disturbance: Option<Disturbance>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Generate an empty Network
    pub fn new() -> Self {
        Self {
            net: PhysicalNetwork::default(),
            links: Vec::new(),
            routers: HashMap::new(),
            addresses: HashMap::new(),
            stop_after: Some(DEFAULT_STOP_AFTER),
            config: Config::new(),
            isis_config: IsisConfig::default(),
            queue: EventQueue::new(),
            disturbance: None,
        }
    }

    /// Add a new router to the topology. The loopback address is also used as router id, and must
    /// therefore be unique in the network. This function returns the ID of the router, which can
    /// be used to reference it while configuring the network.
    pub fn add_router<S: Into<String>>(&mut self, name: S, loopback: Ipv4Addr) -> DeviceId {
        let device_id = self.net.add_node(());
        let router = Router::new(name.into(), device_id, loopback);
        if let Some(other) = self.addresses.insert(loopback, device_id) {
            warn!(target: "netsim", "loopback {} is already used by {:?}", loopback, other);
        }
        self.routers.insert(device_id, router);
        device_id
    }

    /// Create a point to point link between `a` and `b`. Both interfaces are in the same subnet
    /// with mask length `mask_len`. Returns the id of the link and the interface indices on `a`
    /// and `b`.
    ///
    /// ```rust
    /// # use isis_sim::netsim::Network;
    /// # use std::net::Ipv4Addr;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut net = Network::new();
    /// let r1 = net.add_router("r1", Ipv4Addr::new(1, 1, 1, 1));
    /// let r2 = net.add_router("r2", Ipv4Addr::new(2, 2, 2, 2));
    /// let (_, i1, i2) =
    ///     net.add_link(r1, Ipv4Addr::new(10, 0, 0, 1), r2, Ipv4Addr::new(10, 0, 0, 2), 30)?;
    /// assert_eq!(net.get_router(r1)?.interface(i1).unwrap().addr, Ipv4Addr::new(10, 0, 0, 1));
    /// assert_eq!(net.get_router(r2)?.interface(i2).unwrap().addr, Ipv4Addr::new(10, 0, 0, 2));
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_link(
        &mut self,
        a: DeviceId,
        a_ip: Ipv4Addr,
        b: DeviceId,
        b_ip: Ipv4Addr,
        mask_len: u8,
    ) -> Result<(LinkId, IfIndex, IfIndex), NetworkError> {
        let (link, ifaces) =
            self.create_link(&[(a, a_ip), (b, b_ip)], mask_len, InterfaceKind::PointToPoint)?;
        Ok((link, ifaces[0], ifaces[1]))
    }

    /// Create a LAN segment connecting all given routers. Returns the id of the segment and the
    /// interface index on every router, in the same order.
    pub fn add_lan(
        &mut self,
        members: &[(DeviceId, Ipv4Addr)],
        mask_len: u8,
    ) -> Result<(LinkId, Vec<IfIndex>), NetworkError> {
        self.create_link(members, mask_len, InterfaceKind::Lan)
    }

    fn create_link(
        &mut self,
        members: &[(DeviceId, Ipv4Addr)],
        mask_len: u8,
        kind: InterfaceKind,
    ) -> Result<(LinkId, Vec<IfIndex>), NetworkError> {
        // validate everything before changing anything
        let mut seen = HashSet::new();
        for (r, ip) in members {
            if !self.routers.contains_key(r) {
                return Err(NetworkError::DeviceNotFound(*r));
            }
            if self.addresses.contains_key(ip) || !seen.insert(*ip) {
                return Err(NetworkError::AddressInUse(*ip));
            }
        }
        let id = LinkId(self.links.len());
        let prefix = match members.first() {
            Some((_, ip)) => Prefix::new(*ip, mask_len),
            None => Prefix::new(Ipv4Addr::UNSPECIFIED, mask_len),
        };
        let mut attachments = Vec::with_capacity(members.len());
        for (r, ip) in members {
            let router = self.routers.get_mut(r).ok_or(NetworkError::DeviceNotFound(*r))?;
            let ifindex = router.add_interface(*ip, mask_len, id, kind);
            self.addresses.insert(*ip, *r);
            attachments.push((*r, ifindex));
        }
        for (i, (a, _)) in members.iter().enumerate() {
            for (b, _) in members.iter().skip(i + 1) {
                self.net.add_edge(*a, *b, id);
            }
        }
        info!(target: "netsim", "added {} {} with {} attachments", kind, prefix, members.len());
        let ifaces = attachments.iter().map(|(_, i)| *i).collect();
        self.links.push(Link { id, kind, prefix, up: true, attachments });
        Ok((id, ifaces))
    }

    /// Bring a link up or down. All attached interfaces follow the state of the link.
    pub fn set_link_state(&mut self, link: LinkId, up: bool) -> Result<(), NetworkError> {
        let l = self.links.get_mut(link.0).ok_or(NetworkError::LinkNotFound(link))?;
        if l.up == up {
            return Ok(());
        }
        info!(target: "netsim", "link {} goes {}", link, if up { "up" } else { "down" });
        l.up = up;
        let attachments = l.attachments.clone();
        for (r, ifindex) in attachments {
            if let Some(router) = self.routers.get_mut(&r) {
                router.set_interface_up(&mut self.queue, ifindex, up);
            }
        }
        self.flush_outbox();
        Ok(())
    }

    /// Set the provided network-wide configuration. The network first computes the patch from the
    /// current configuration to the next one, and applies the patch. If the patch cannot be
    /// applied, then an error is returned, and all modifiers before the failing one stay applied.
    pub fn set_config(&mut self, config: &Config) -> Result<(), NetworkError> {
        let patch = self.config.get_diff(config);
        self.apply_patch(&patch)
    }

    /// Apply a configuration patch. The modifications of the patch are applied to the network in
    /// the order in which they appear in `patch.modifiers`.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) -> Result<(), NetworkError> {
        for modifier in patch.modifiers.iter() {
            self.apply_modifier(modifier)?;
        }
        Ok(())
    }

    /// Apply a single configuration modification. The modification must be applicable to the
    /// current configuration. If it fails, neither the configuration nor any device is changed.
    ///
    /// Expressions depend on each other: everything on a router requires `IsisRouter` (except
    /// static routes), and the interface settings require `IsisInterface` of the same interface.
    /// Removing an expression others depend on is rejected.
    pub fn apply_modifier(&mut self, modifier: &ConfigModifier) -> Result<(), NetworkError> {
        debug!(target: "netsim", "Applying modifier: {}", printer::config_modifier(self, modifier)?);

        let mut new_config = self.config.clone();
        new_config.apply_modifier(modifier)?;
        if let ConfigModifier::Remove(expr) = modifier {
            if has_dependents(&new_config, expr) {
                return Err(ConfigError::ConfigModifierError(modifier.clone()).into());
            }
        }

        let router = modifier.router();
        let r = self.routers.get_mut(&router).ok_or(NetworkError::DeviceNotFound(router))?;
        let queue = &mut self.queue;

        match modifier {
            ConfigModifier::Insert(expr) => match expr {
                ConfigExpr::IsisRouter { .. } => r.enable_isis(queue, self.isis_config.clone())?,
                ConfigExpr::IsisInterface { ifindex, .. } => {
                    r.enable_isis_interface(queue, *ifindex)?
                }
                ConfigExpr::InterfaceCost { ifindex, cost, .. } => {
                    r.set_interface_cost(queue, *ifindex, Some(*cost))?
                }
                ConfigExpr::InterfacePriority { ifindex, priority, .. } => {
                    r.set_interface_priority(queue, *ifindex, Some(*priority))?
                }
                ConfigExpr::InterfaceGroup { ifindex, group, .. } => {
                    r.set_interface_group(queue, *ifindex, Some(group.clone()))?
                }
                ConfigExpr::Overload { timeout, .. } => r.set_overload(queue, Some(*timeout))?,
                ConfigExpr::ImportPolicy { map, .. } => {
                    r.add_policy(queue, map.clone(), RouteMapDirection::Import)?
                }
                ConfigExpr::ExportPolicy { map, .. } => {
                    r.add_policy(queue, map.clone(), RouteMapDirection::Export)?
                }
                ConfigExpr::StaticRoute { prefix, next_hop, cost, .. } => {
                    r.add_static_route(queue, *prefix, *next_hop, *cost)?
                }
            },
            ConfigModifier::Remove(expr) => match expr {
                ConfigExpr::IsisRouter { .. } => r.disable_isis(queue)?,
                ConfigExpr::IsisInterface { ifindex, .. } => {
                    r.disable_isis_interface(queue, *ifindex)?
                }
                ConfigExpr::InterfaceCost { ifindex, .. } => {
                    r.set_interface_cost(queue, *ifindex, None)?
                }
                ConfigExpr::InterfacePriority { ifindex, .. } => {
                    r.set_interface_priority(queue, *ifindex, None)?
                }
                ConfigExpr::InterfaceGroup { ifindex, .. } => {
                    r.set_interface_group(queue, *ifindex, None)?
                }
                ConfigExpr::Overload { .. } => r.set_overload(queue, None)?,
                ConfigExpr::ImportPolicy { map, .. } => {
                    r.remove_policy(queue, map.order, RouteMapDirection::Import).map(|_| ())?
                }
                ConfigExpr::ExportPolicy { map, .. } => {
                    r.remove_policy(queue, map.order, RouteMapDirection::Export).map(|_| ())?
                }
                ConfigExpr::StaticRoute { prefix, .. } => r.remove_static_route(queue, *prefix)?,
            },
            ConfigModifier::Update { from, to } => match (from, to) {
                (ConfigExpr::IsisRouter { .. }, ConfigExpr::IsisRouter { .. })
                | (ConfigExpr::IsisInterface { .. }, ConfigExpr::IsisInterface { .. }) => {}
                (ConfigExpr::InterfaceCost { .. }, ConfigExpr::InterfaceCost { ifindex, cost, .. }) => {
                    r.set_interface_cost(queue, *ifindex, Some(*cost))?
                }
                (
                    ConfigExpr::InterfacePriority { .. },
                    ConfigExpr::InterfacePriority { ifindex, priority, .. },
                ) => r.set_interface_priority(queue, *ifindex, Some(*priority))?,
                (
                    ConfigExpr::InterfaceGroup { .. },
                    ConfigExpr::InterfaceGroup { ifindex, group, .. },
                ) => r.set_interface_group(queue, *ifindex, Some(group.clone()))?,
                (ConfigExpr::Overload { .. }, ConfigExpr::Overload { timeout, .. }) => {
                    r.set_overload(queue, Some(*timeout))?
                }
                (ConfigExpr::ImportPolicy { .. }, ConfigExpr::ImportPolicy { map, .. }) => {
                    r.modify_policy(queue, map.clone(), RouteMapDirection::Import).map(|_| ())?
                }
                (ConfigExpr::ExportPolicy { .. }, ConfigExpr::ExportPolicy { map, .. }) => {
                    r.modify_policy(queue, map.clone(), RouteMapDirection::Export).map(|_| ())?
                }
                (
                    ConfigExpr::StaticRoute { prefix: old, .. },
                    ConfigExpr::StaticRoute { prefix, next_hop, cost, .. },
                ) => {
                    if r.static_routes().get(old).map(|s| s.next_hop) != Some(*next_hop) {
                        // the new gateway must be valid before the old route goes away
                        let connected = r
                            .interfaces()
                            .values()
                            .any(|i| i.prefix().contains(*next_hop) && i.addr != *next_hop);
                        if !connected {
                            return Err(DeviceError::NextHopNotConnected(*next_hop).into());
                        }
                    }
                    r.remove_static_route(queue, *old)?;
                    r.add_static_route(queue, *prefix, *next_hop, *cost)?
                }
                _ => {
                    return Err(NetworkError::ConfigError(ConfigError::ConfigModifierError(
                        modifier.clone(),
                    )))
                }
            },
        }

        self.config = new_config;
        self.flush_outbox();
        Ok(())
    }

    /// Remove all adjacencies of a router on one interface, or on all interfaces if `ifindex` is
    /// `None`. They form again with the next Hellos.
    pub fn clear_adjacency(
        &mut self,
        router: DeviceId,
        ifindex: Option<IfIndex>,
    ) -> Result<(), NetworkError> {
        self.routers
            .get_mut(&router)
            .ok_or(NetworkError::DeviceNotFound(router))?
            .clear_adjacency(&mut self.queue, ifindex)?;
        self.flush_outbox();
        Ok(())
    }

    /// Run the simulation for the given (simulated) duration. All events scheduled up to then are
    /// processed, and the clock is advanced to the end of the duration.
    ///
    /// Returns `NetworkError::NoConvergence` if more than `stop_after` events (see
    /// [`Network::set_msg_limit`]) are processed in this call.
    pub fn run_for(&mut self, duration: Duration) -> Result<(), NetworkError> {
        let until = self.queue.now() + duration.as_millis() as SimTime;
        self.flush_outbox();
        let mut processed: usize = 0;
        while let Some(event) = self.queue.pop_until(until) {
            processed += 1;
            if let Some(limit) = self.stop_after {
                if processed > limit {
                    warn!(target: "netsim", "stopping after {} events", limit);
                    return Err(NetworkError::NoConvergence);
                }
            }
            trace!(target: "netsim", "t={} {:?}", self.queue.now(), event);
            let device = event.device();
            match self.routers.get_mut(&device) {
                Some(r) => r.handle_event(event, &mut self.queue),
                None => return Err(NetworkError::InvalidEvent(event)),
            }
            self.flush_outbox();
        }
        self.queue.advance_to(until);
        Ok(())
    }

    /// Put all frames sent by the devices on their links.
    fn flush_outbox(&mut self) {
        for Transmission { from, ifindex, frame } in self.queue.take_outbox() {
            let link_idx = match self.routers.get(&from).and_then(|r| r.interface(ifindex)) {
                Some(i) => i.link.0,
                None => continue,
            };
            let link = match self.links.get(link_idx) {
                Some(l) => l,
                None => continue,
            };
            if !link.up {
                trace!(target: "netsim", "link {} is down, dropping frame", link.id);
                continue;
            }
            for (to, to_if) in link.attachments.iter().filter(|(r, i)| (*r, *i) != (from, ifindex)) {
                let mut delays = vec![LINK_DELAY];
                if let Some(d) = self.disturbance.as_mut() {
                    if d.duplication > 0.0 && d.rng.gen_bool(d.duplication) {
                        delays.push(LINK_DELAY);
                    }
                    if d.max_jitter > 0 {
                        for delay in delays.iter_mut() {
                            *delay += d.rng.gen_range(0, d.max_jitter + 1);
                        }
                    }
                }
                for delay in delays {
                    self.queue.schedule(
                        delay,
                        Event::Deliver { to: *to, ifindex: *to_if, frame: frame.clone() },
                    );
                }
            }
        }
    }

    // ********************
    // * Helper Functions *
    // ********************

    /// Current simulated time in milliseconds
    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// Returns a reference to the network topology (PetGraph struct)
    pub fn get_topology(&self) -> &PhysicalNetwork {
        &self.net
    }

    /// Returns all links of the network
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Returns a single link
    pub fn get_link(&self, link: LinkId) -> Result<&Link, NetworkError> {
        self.links.get(link.0).ok_or(NetworkError::LinkNotFound(link))
    }

    /// Returns the number of devices in the topology
    pub fn num_devices(&self) -> usize {
        self.routers.len()
    }

    /// Returns a reference to the router.
    pub fn get_router(&self, id: DeviceId) -> Result<&Router, NetworkError> {
        self.routers.get(&id).ok_or(NetworkError::DeviceNotFound(id))
    }

    /// Returns a list of all router IDs in the network, sorted.
    pub fn get_routers(&self) -> Vec<DeviceId> {
        let mut routers: Vec<DeviceId> = self.routers.keys().cloned().collect();
        routers.sort();
        routers
    }

    /// Get the DeviceId with the given name. If multiple routers have the same name, then the
    /// first occurence of this name is returned. If the name was not found, an error is returned.
    pub fn get_router_id(&self, name: impl AsRef<str>) -> Result<DeviceId, NetworkError> {
        self.routers
            .values()
            .filter(|r| r.name() == name.as_ref())
            .map(|r| r.device_id())
            .min()
            .ok_or_else(|| NetworkError::DeviceNameNotFound(name.as_ref().to_string()))
    }

    /// Returns the name of the router, if the ID was found.
    pub fn get_router_name(&self, router_id: DeviceId) -> Result<&str, NetworkError> {
        Ok(self.get_router(router_id)?.name())
    }

    /// Returns the device owning the address (loopback or interface address).
    pub fn get_address_owner(&self, addr: Ipv4Addr) -> Option<DeviceId> {
        self.addresses.get(&addr).copied()
    }

    /// Return a reference to the current config.
    pub fn current_config(&self) -> &Config {
        &self.config
    }

    /// Returns a reference to the event queue
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Protocol parameters for routers on which the protocol is enabled later
    pub fn set_isis_config(&mut self, config: IsisConfig) {
        self.isis_config = config;
    }

    /// Protocol parameters for routers on which the protocol is enabled later
    pub fn isis_config(&self) -> &IsisConfig {
        &self.isis_config
    }

    /// Configure the network to stop `run_for` with `NetworkError::NoConvergence` after a
    /// certain number of events. If set to None, the network runs until the end of the duration.
    pub fn set_msg_limit(&mut self, stop_after: Option<usize>) {
        self.stop_after = stop_after;
    }

    /// Delay every delivered frame by an additional random time of up to `max_jitter`
    /// milliseconds. The randomness is seeded, so runs are reproducible.
    pub fn set_jitter(&mut self, max_jitter: SimTime, seed: u64) {
        self.disturbance_mut(seed).max_jitter = max_jitter;
    }

    /// Deliver every frame twice with the given probability.
    pub fn set_duplication(&mut self, probability: f64, seed: u64) {
        self.disturbance_mut(seed).duplication = probability.max(0.0).min(1.0);
    }

    fn disturbance_mut(&mut self, seed: u64) -> &mut Disturbance {
        let d = self.disturbance.get_or_insert_with(|| Disturbance {
            rng: StdRng::seed_from_u64(seed),
            max_jitter: 0,
            duplication: 0.0,
        });
        d.rng = StdRng::seed_from_u64(seed);
        d
    }

    /// Return the path a packet to `addr` takes through the network, starting at the source
    /// router, as a list of `DeviceId`s. The path ends at the router owning the address. When
    /// several equal-cost next hops exist, the first one is followed.
    pub fn get_route(&self, source: DeviceId, addr: Ipv4Addr) -> Result<Vec<DeviceId>, NetworkError> {
        let mut visited: HashSet<DeviceId> = HashSet::new();
        let mut path: Vec<DeviceId> = Vec::new();
        let mut current = source;
        loop {
            let router = self.get_router(current)?;
            path.push(current);
            if !visited.insert(current) {
                debug!(target: "netsim", "Forwarding loop detected: {}", self.path_names(&path));
                return Err(NetworkError::ForwardingLoop(path));
            }
            if router.loopback() == addr || router.interface_by_addr(addr).is_some() {
                return Ok(path);
            }
            let next = router.rib().lookup(addr).and_then(|r| r.next_hops.iter().next()).and_then(
                |nh| match nh.gateway {
                    Some(gw) => self.get_address_owner(gw),
                    // directly connected: the destination must be on the subnet
                    None => self.get_address_owner(addr).filter(|d| *d != current),
                },
            );
            current = match next {
                Some(n) => n,
                None => {
                    debug!(target: "netsim", "Black hole detected: {}", self.path_names(&path));
                    return Err(NetworkError::ForwardingBlackHole(path));
                }
            };
        }
    }

    fn path_names(&self, path: &[DeviceId]) -> String {
        path.iter().map(|r| self.get_router_name(*r).unwrap_or("?")).collect::<Vec<_>>().join(" => ")
    }
}

/// Returns `true` if some expression in `config` depends on `expr`.
fn has_dependents(config: &Config, expr: &ConfigExpr) -> bool {
    match expr.key() {
        ConfigExprKey::IsisRouter { router } => config.iter().any(|e| {
            e.router() == router
                && !matches!(e, ConfigExpr::StaticRoute { .. } | ConfigExpr::IsisRouter { .. })
        }),
        ConfigExprKey::IsisInterface { router, ifindex } => config.iter().any(|e| match e {
            ConfigExpr::InterfaceCost { router: r, ifindex: i, .. }
            | ConfigExpr::InterfacePriority { router: r, ifindex: i, .. }
            | ConfigExpr::InterfaceGroup { router: r, ifindex: i, .. } => {
                *r == router && *i == ifindex
            }
            _ => false,
        }),
        _ => false,
    }
}
