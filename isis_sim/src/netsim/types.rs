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

//! Module containing all type definitions

use crate::netsim::config::ConfigModifier;
use crate::netsim::event::Event;
use petgraph::prelude::*;
use petgraph::stable_graph::StableGraph;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

type IndexType = u32;
/// Device Identification (and index into the physical graph)
pub type DeviceId = NodeIndex<IndexType>;
/// Physical network graph. Each edge is labelled with the link it belongs to. A LAN segment with
/// `n` attachments produces an edge between every pair of attached routers.
pub type PhysicalNetwork = StableGraph<(), LinkId, Undirected, IndexType>;
/// Cost (metric) of a link or a route
pub type Cost = u32;
/// Simulated time in milliseconds
pub type SimTime = u64;

/// Identification of a link (point to point or LAN segment).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct LinkId(pub usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link{}", self.0)
    }
}

/// Interface index, local to a router.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct IfIndex(pub u32);

impl fmt::Display for IfIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-bit protocol router identifier, written as a dotted quad.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct RouterId(pub u32);

impl RouterId {
    /// Returns the router id as an IPv4 address
    pub fn to_ipv4(self) -> Ipv4Addr {
        Ipv4Addr::from(self.0)
    }
}

impl From<Ipv4Addr> for RouterId {
    fn from(addr: Ipv4Addr) -> Self {
        Self(u32::from(addr))
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ipv4())
    }
}

/// System identifier: a router id together with a pseudonode id. Real routers have pseudonode id
/// `0`, pseudonodes representing a LAN segment have a non-zero id allocated by their DIS.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct SystemId {
    /// Router id of the system (or of the DIS that represents the pseudonode)
    pub rtr_id: RouterId,
    /// Pseudonode id, `0` for real routers
    pub pn_id: u8,
}

impl SystemId {
    /// Create the system id of a real router
    pub fn router(rtr_id: RouterId) -> Self {
        Self { rtr_id, pn_id: 0 }
    }

    /// Create the system id of a pseudonode
    pub fn pseudonode(rtr_id: RouterId, pn_id: u8) -> Self {
        Self { rtr_id, pn_id }
    }

    /// Returns `true` if the system is a pseudonode
    pub fn is_pseudonode(&self) -> bool {
        self.pn_id != 0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.rtr_id, self.pn_id)
    }
}

/// Identifier of a single LSP fragment: `(router-id, pseudonode, fragment-number)`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct LspId {
    /// Originating system
    pub system: SystemId,
    /// Fragment number
    pub fragment: u8,
}

impl LspId {
    /// Create a new LSP id
    pub fn new(rtr_id: RouterId, pn_id: u8, fragment: u8) -> Self {
        Self { system: SystemId { rtr_id, pn_id }, fragment }
    }
}

impl fmt::Display for LspId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.system, self.fragment)
    }
}

/// IPv4 prefix. The address is always stored with the host bits cleared.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct Prefix {
    addr: Ipv4Addr,
    len: u8,
}

impl Prefix {
    /// Create a new prefix. The host bits of `addr` are cleared, and `len` is capped at 32.
    pub fn new(addr: Ipv4Addr, len: u8) -> Self {
        let len = len.min(32);
        Self { addr: Ipv4Addr::from(u32::from(addr) & Self::mask_of(len)), len }
    }

    /// Create the host route (`/32`) for the address
    pub fn host(addr: Ipv4Addr) -> Self {
        Self::new(addr, 32)
    }

    /// Create a prefix from an address and a netmask. Non-contiguous masks are rounded down to
    /// their leading ones.
    pub fn from_netmask(addr: Ipv4Addr, mask: u32) -> Self {
        Self::new(addr, mask.leading_ones() as u8)
    }

    fn mask_of(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (32 - len as u32)
        }
    }

    /// Network address
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// Prefix length
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Returns `true` for the default route `0.0.0.0/0`
    pub fn is_default(&self) -> bool {
        self.len == 0
    }

    /// Netmask as a 32-bit number
    pub fn netmask(&self) -> u32 {
        Self::mask_of(self.len)
    }

    /// Returns `true` if the address is inside the prefix
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.netmask() == u32::from(self.addr)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// Ethernet MAC address
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Broadcast address `ff:ff:ff:ff:ff:ff`
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    /// Returns `true` if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", m[0], m[1], m[2], m[3], m[4], m[5])
    }
}

/// Configuration Error
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// The added expression would overwrite an existing expression
    #[error("The new ConfigExpr would overwrite an existing one!")]
    ConfigExprOverload,
    /// The ConfigModifier cannot be applied. There are three cases why this is the case:
    /// 1. The ConfigModifier::Insert would insert an already existing expression
    /// 2. The ConfigModifier::Remove would remove an non-existing expression
    /// 3. The ConfigModifier::Update would update an non-existing expression
    #[error("The ConfigModifier cannot be applied: {0:?}")]
    ConfigModifierError(ConfigModifier),
}

/// Router Errors
#[derive(Error, Debug, PartialEq)]
pub enum DeviceError {
    /// The protocol is not enabled on the router
    #[error("IS-IS is not enabled on this router")]
    IsisNotEnabled,
    /// The protocol is already enabled on the router
    #[error("IS-IS is already enabled on this router")]
    IsisAlreadyEnabled,
    /// The interface does not exist
    #[error("Interface {0} does not exist")]
    InterfaceNotFound(IfIndex),
    /// The protocol is not enabled on the interface
    #[error("IS-IS is not enabled on interface {0}")]
    InterfaceNotEnabled(IfIndex),
    /// The protocol is already enabled on the interface
    #[error("IS-IS is already enabled on interface {0}")]
    InterfaceAlreadyEnabled(IfIndex),
    /// All interface group slots are in use
    #[error("No free interface group for {0}")]
    InterfaceGroupsExhausted(String),
    /// Static Route already exists
    #[error("Static route for {0} does already exist")]
    StaticRouteAlreadyExists(Prefix),
    /// Static Route doesn't exists
    #[error("Static route for {0} does not yet exist")]
    NoStaticRoute(Prefix),
    /// The next hop of a static route is not on a connected subnet
    #[error("Next hop {0} is not on a connected subnet")]
    NextHopNotConnected(Ipv4Addr),
    /// Route Map with the same order already exists
    #[error("Policy at order {0} already exists")]
    PolicyAlreadyExists(usize),
    /// Route Map with the chosen order does not exist
    #[error("Policy at order {0} doesn't exists")]
    NoPolicy(usize),
}

/// Network Errors
#[derive(Error, Debug, PartialEq)]
pub enum NetworkError {
    /// Device Error which cannot be handled
    #[error("Device Error: {0}")]
    DeviceError(#[from] DeviceError),
    /// Configuration error
    #[error("Configuration Error: {0}")]
    ConfigError(#[from] ConfigError),
    /// Device is not present in the topology
    #[error("Network device was not found in topology: {0:?}")]
    DeviceNotFound(DeviceId),
    /// Device name is not present in the topology
    #[error("Network device name was not found in topology: {0}")]
    DeviceNameNotFound(String),
    /// Link is not present in the topology
    #[error("Network link does not exist: {0}")]
    LinkNotFound(LinkId),
    /// The address is already used by another interface
    #[error("Address {0} is already in use")]
    AddressInUse(Ipv4Addr),
    /// Forwarding loop detected
    #[error("Forwarding Loop occurred! path: {0:?}")]
    ForwardingLoop(Vec<DeviceId>),
    /// Black hole detected
    #[error("Black hole occurred! path: {0:?}")]
    ForwardingBlackHole(Vec<DeviceId>),
    /// Convergence Problem
    #[error("Network cannot converge in the given time!")]
    NoConvergence,
    /// Event cannot be handled by the network
    #[error("Cannot handle the event: {0:?}")]
    InvalidEvent(Event),
}
