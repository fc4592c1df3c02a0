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

//! # Adjacency state machine
//!
//! One adjacency exists per (interface, neighbor). It is created by the first Hello of an unknown
//! neighbor and walks through the states
//!
//! ```text
//!   Down --Hello--> Init --Hello--> Up --Hello--> Up
//!    ^                |               |
//!    +----expiry------+---------------+
//! ```
//!
//! A down adjacency is deleted once its delete timer fires. An adjacency holds at most one live
//! timer: the expiry timer while `Init` or `Up`, the delete timer while `Down`.
//!
//! Hellos are validated before they touch any state: they must be sent to the broadcast address,
//! carry the interface address of the sender, that address must be in the subnet of the receiving
//! interface, and the protocol must be enabled on the receiving interface. A change of the
//! neighbor's identity (interface address or MAC) forces the adjacency down. Any other change is
//! just re-advertised.

use crate::isis::packet::{HelloPdu, IsReach, SubTlv, Tlv};
use crate::isis::{secs, AdvtData, DatumId, IsisInstance, RouterCtx};
use crate::netsim::router::InterfaceKind;
use crate::netsim::{Cost, Frame, IfIndex, Job, MacAddr, Prefix, RouterId, SimTime, SystemId};
use crate::netsim::{Timer, TimerHandle};
use log::*;
use std::fmt;
use std::net::Ipv4Addr;

/// State of an adjacency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdjState {
    /// Neighbor lost, waiting for deletion or a new Hello
    Down,
    /// One Hello received
    Init,
    /// Adjacency established
    Up,
}

impl fmt::Display for AdjState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjState::Down => write!(f, "Down"),
            AdjState::Init => write!(f, "Init"),
            AdjState::Up => write!(f, "Up"),
        }
    }
}

/// The single live timer of an adjacency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdjTimer {
    Expiry(TimerHandle),
    Delete(TimerHandle),
}

/// Content of a Hello, as far as the adjacency is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HelloInfo {
    pub(crate) rtr_id: RouterId,
    pub(crate) hostname: Option<String>,
    pub(crate) addr: Option<(Ipv4Addr, u8)>,
    pub(crate) ifindex: Option<IfIndex>,
    pub(crate) hold_time: Option<u16>,
    pub(crate) metric: Option<Cost>,
    pub(crate) mac: MacAddr,
    pub(crate) priority: Option<u8>,
    pub(crate) lan_id: Option<SystemId>,
}

impl HelloInfo {
    pub(crate) fn parse(hello: &HelloPdu, src: MacAddr) -> Self {
        let mut info = Self {
            rtr_id: hello.rtr_id,
            hostname: None,
            addr: None,
            ifindex: None,
            hold_time: None,
            metric: None,
            mac: src,
            priority: None,
            lan_id: None,
        };
        for tlv in hello.tlvs.iter() {
            match tlv {
                Tlv::Hostname(h) => info.hostname = Some(h.clone()),
                Tlv::RouterId(r) => info.rtr_id = *r,
                Tlv::InterfaceIp { addr, mask_len } => info.addr = Some((*addr, *mask_len)),
                Tlv::InterfaceIndex(i) => info.ifindex = Some(*i),
                Tlv::HoldTime(t) => info.hold_time = Some(*t),
                Tlv::Metric(m) => info.metric = Some(*m),
                Tlv::InterfaceMac(m) => info.mac = *m,
                Tlv::Priority(p) => info.priority = Some(*p),
                Tlv::LanId(l) => info.lan_id = Some(*l),
                _ => {}
            }
        }
        info
    }
}

/// Adjacency with one neighbor on one interface
#[derive(Debug, Clone)]
pub struct Adjacency {
    neighbor: RouterId,
    state: AdjState,
    hostname: Option<String>,
    remote_if: Option<IfIndex>,
    remote_ip: Ipv4Addr,
    remote_mac: MacAddr,
    cost: Option<Cost>,
    priority: u8,
    hold_time: u16,
    lan_id: Option<SystemId>,
    last_transition: SimTime,
    uptime: Option<SimTime>,
    pub(crate) timer: Option<AdjTimer>,
    /// point to point reachability, while up
    pub(crate) reach_datum: Option<DatumId>,
    /// pseudonode to neighbor reachability, while up and DIS
    pub(crate) pn_datum: Option<DatumId>,
}

/// Which attributes changed with a Hello
#[derive(Debug, Default)]
struct HelloDiff {
    any: bool,
    remote_if: bool,
    election: bool,
}

impl Adjacency {
    fn new(info: &HelloInfo, addr: Ipv4Addr, default_priority: u8, now: SimTime) -> Self {
        Self {
            neighbor: info.rtr_id,
            state: AdjState::Down,
            hostname: info.hostname.clone(),
            remote_if: info.ifindex,
            remote_ip: addr,
            remote_mac: info.mac,
            cost: info.metric,
            priority: info.priority.unwrap_or(default_priority),
            hold_time: info.hold_time.unwrap_or(0),
            lan_id: info.lan_id,
            last_transition: now,
            uptime: None,
            timer: None,
            reach_datum: None,
            pn_datum: None,
        }
    }

    /// Returns `true` if the Hello comes from a different interface than the one we know
    fn identity_changed(&self, info: &HelloInfo, addr: Ipv4Addr) -> bool {
        self.remote_ip != addr || self.remote_mac != info.mac
    }

    /// Take over the attributes of the Hello
    fn update(&mut self, info: &HelloInfo, addr: Ipv4Addr, default_priority: u8) -> HelloDiff {
        let priority = info.priority.unwrap_or(default_priority);
        let diff = HelloDiff {
            any: self.hostname != info.hostname
                || self.cost != info.metric
                || self.remote_if != info.ifindex
                || self.priority != priority
                || self.lan_id != info.lan_id,
            remote_if: self.remote_if != info.ifindex,
            election: self.priority != priority || self.lan_id != info.lan_id,
        };
        self.hostname = info.hostname.clone();
        self.cost = info.metric;
        self.remote_if = info.ifindex;
        self.priority = priority;
        self.lan_id = info.lan_id;
        self.remote_ip = addr;
        self.remote_mac = info.mac;
        if let Some(t) = info.hold_time {
            self.hold_time = t;
        }
        diff
    }

    /// Router id of the neighbor
    pub fn neighbor(&self) -> RouterId {
        self.neighbor
    }

    /// Current state
    pub fn state(&self) -> AdjState {
        self.state
    }

    /// Hostname of the neighbor
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Interface index of the neighbor
    pub fn remote_if(&self) -> Option<IfIndex> {
        self.remote_if
    }

    /// Address of the neighbor on the link
    pub fn remote_ip(&self) -> Ipv4Addr {
        self.remote_ip
    }

    /// MAC address of the neighbor
    pub fn remote_mac(&self) -> MacAddr {
        self.remote_mac
    }

    /// Cost the neighbor announces for its interface
    pub fn cost(&self) -> Option<Cost> {
        self.cost
    }

    /// DIS priority of the neighbor
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Hold time announced by the neighbor, in seconds
    pub fn hold_time(&self) -> u16 {
        self.hold_time
    }

    /// LAN-ID announced by the neighbor
    pub fn lan_id(&self) -> Option<SystemId> {
        self.lan_id
    }

    /// Time of the last state transition
    pub fn last_transition(&self) -> SimTime {
        self.last_transition
    }

    /// Time at which the adjacency came up
    pub fn uptime(&self) -> Option<SimTime> {
        self.uptime
    }

    /// Returns `true` if the expiry timer is running
    pub fn has_expiry_timer(&self) -> bool {
        matches!(self.timer, Some(AdjTimer::Expiry(_)))
    }

    /// Returns `true` if the delete timer is running
    pub fn has_delete_timer(&self) -> bool {
        matches!(self.timer, Some(AdjTimer::Delete(_)))
    }
}

impl IsisInstance {
    /// Validate a Hello and drive the state machine of the adjacency.
    pub(crate) fn process_hello(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
        frame: &Frame,
        hello: HelloPdu,
    ) {
        self.stats.hello_rx += 1;
        let interfaces = ctx.interfaces;
        let phys = match interfaces.get(&ifindex) {
            Some(i) => i,
            None => return,
        };
        if !frame.dst.is_broadcast() {
            self.stats.bad_hello_not_broadcast += 1;
            debug!(target: "isis::adj", "{}: Hello on {} not sent to broadcast", self.hostname, phys.name);
            return;
        }
        let info = HelloInfo::parse(&hello, frame.src);
        let addr = match info.addr {
            Some((addr, _)) => addr,
            None => {
                self.stats.bad_hello_no_if_ip += 1;
                debug!(target: "isis::adj", "{}: Hello on {} without interface address", self.hostname, phys.name);
                return;
            }
        };
        if !Prefix::new(phys.addr, phys.mask_len).contains(addr) {
            self.stats.bad_hello_subnet += 1;
            debug!(target: "isis::adj", "{}: Hello on {} from {} outside of the subnet", self.hostname, phys.name, addr);
            return;
        }
        let kind = match self.interfaces.get(&ifindex) {
            Some(i) => i.kind,
            None => {
                self.stats.bad_hello_disabled += 1;
                trace!(target: "isis::adj", "{}: Hello on disabled interface {}", self.hostname, phys.name);
                return;
            }
        };
        if info.rtr_id == self.rtr_id {
            self.stats.bad_hello_own += 1;
            return;
        }
        let nbr = info.rtr_id;
        trace!(target: "isis::adj", "{}: Hello from {} on {}", self.hostname, nbr, phys.name);

        // a point to point link has a single neighbor; a new one replaces the old one
        if kind == InterfaceKind::PointToPoint {
            let others: Vec<RouterId> = self.interfaces[&ifindex]
                .adjacencies
                .keys()
                .copied()
                .filter(|r| *r != nbr)
                .collect();
            for other in others {
                info!(target: "isis::adj", "{}: neighbor on {} changed from {} to {}", self.hostname, phys.name, other, nbr);
                self.remove_adjacency(ctx, ifindex, other);
            }
        }

        let default_priority = self.config.default_priority;
        let now = ctx.now();
        let state = {
            let iface = match self.interfaces.get_mut(&ifindex) {
                Some(i) => i,
                None => return,
            };
            let adj = iface
                .adjacencies
                .entry(nbr)
                .or_insert_with(|| Adjacency::new(&info, addr, default_priority, now));
            adj.state
        };

        match state {
            AdjState::Down => {
                if let Some(adj) = self.adjacency_mut(ifindex, nbr) {
                    adj.update(&info, addr, default_priority);
                    adj.state = AdjState::Init;
                    adj.last_transition = now;
                }
                debug!(target: "isis::adj", "{}: adjacency to {} on {}: Down -> Init", self.hostname, nbr, phys.name);
                self.start_expiry_timer(ctx, ifindex, nbr);
            }
            AdjState::Init | AdjState::Up => {
                let identity_changed = self
                    .adjacency(ifindex, nbr)
                    .map(|a| a.identity_changed(&info, addr))
                    .unwrap_or(false);
                if identity_changed {
                    info!(target: "isis::adj", "{}: identity of {} on {} changed", self.hostname, nbr, phys.name);
                    self.adjacency_down(ctx, ifindex, nbr);
                    if let Some(adj) = self.adjacency_mut(ifindex, nbr) {
                        adj.update(&info, addr, default_priority);
                    }
                    return;
                }
                let diff = match self.adjacency_mut(ifindex, nbr) {
                    Some(adj) => adj.update(&info, addr, default_priority),
                    None => return,
                };
                self.start_expiry_timer(ctx, ifindex, nbr);
                if state == AdjState::Init {
                    self.adjacency_up(ctx, ifindex, nbr);
                } else if diff.any {
                    self.neighbor_changed(ctx, ifindex, nbr, &diff, kind);
                }
            }
        }
    }

    fn adjacency_mut(&mut self, ifindex: IfIndex, nbr: RouterId) -> Option<&mut Adjacency> {
        self.interfaces.get_mut(&ifindex).and_then(|i| i.adjacencies.get_mut(&nbr))
    }

    fn start_expiry_timer(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, nbr: RouterId) {
        let default_hold = self.config.hold_time();
        if let Some(adj) = self.adjacency_mut(ifindex, nbr) {
            let hold = if adj.hold_time == 0 { default_hold } else { adj.hold_time };
            let handle = ctx.queue.schedule_timer(
                ctx.device,
                secs(hold as u32),
                Timer::AdjacencyExpiry(ifindex, nbr),
            );
            adj.timer = Some(AdjTimer::Expiry(handle));
        }
    }

    /// Reachability of a point to point neighbor
    fn p2p_reach(&self, ctx: &RouterCtx, ifindex: IfIndex, adj: &Adjacency) -> Option<IsReach> {
        let phys = ctx.interfaces.get(&ifindex)?;
        let iface = self.interfaces.get(&ifindex)?;
        Some(IsReach {
            neighbor: SystemId::router(adj.neighbor),
            metric: iface.cost,
            sub_tlvs: vec![
                SubTlv::LinkIds { local: ifindex, remote: adj.remote_if.unwrap_or_default() },
                SubTlv::LocalIp(phys.addr),
                SubTlv::RemoteIp(adj.remote_ip),
            ],
        })
    }

    /// `Init -> Up`
    fn adjacency_up(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, nbr: RouterId) {
        let now = ctx.now();
        let kind = match self.interfaces.get(&ifindex) {
            Some(i) => i.kind,
            None => return,
        };
        if let Some(adj) = self.adjacency_mut(ifindex, nbr) {
            adj.state = AdjState::Up;
            adj.uptime = Some(now);
            adj.last_transition = now;
        }
        self.up_adjacencies += 1;
        self.stats.adj_up += 1;
        info!(target: "isis::adj", "{}: adjacency to {} on {} is Up", self.hostname, nbr, ifindex);

        match kind {
            InterfaceKind::PointToPoint => {
                let reach = match self.adjacency(ifindex, nbr) {
                    Some(a) => self.p2p_reach(ctx, ifindex, a),
                    None => None,
                };
                if let Some(reach) = reach {
                    let id = self.advt.advertise(AdvtData::IsReach(reach), 0);
                    if let Some(adj) = self.adjacency_mut(ifindex, nbr) {
                        adj.reach_datum = Some(id);
                    }
                }
            }
            InterfaceKind::Lan => {
                self.reelect_dis(ctx, ifindex);
            }
        }
        self.schedule_job(ctx, Job::RegenerateDirty);
        self.schedule_job(ctx, Job::Spf);
        self.sync_database(ctx, ifindex);
    }

    /// A non-identity attribute of an up neighbor changed
    fn neighbor_changed(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
        nbr: RouterId,
        diff: &HelloDiff,
        kind: InterfaceKind,
    ) {
        debug!(target: "isis::adj", "{}: attributes of {} on {} changed", self.hostname, nbr, ifindex);
        let mut replaced = false;
        if kind == InterfaceKind::PointToPoint && diff.remote_if {
            let old = self.adjacency(ifindex, nbr).and_then(|a| a.reach_datum);
            let reach = match self.adjacency(ifindex, nbr) {
                Some(a) => self.p2p_reach(ctx, ifindex, a),
                None => None,
            };
            if let (Some(old), Some(reach)) = (old, reach) {
                let id = self.advt.replace(old, AdvtData::IsReach(reach));
                if let Some(adj) = self.adjacency_mut(ifindex, nbr) {
                    adj.reach_datum = Some(id);
                }
                replaced = true;
            }
        }
        if !replaced {
            self.advt.mark_dirty(0, 0);
        }
        if kind == InterfaceKind::Lan && diff.election {
            self.reelect_dis(ctx, ifindex);
        }
        self.schedule_job(ctx, Job::RegenerateDirty);
    }

    /// Bring an adjacency down without scheduling anything. Returns `true` if it was up.
    fn take_down(&mut self, now: SimTime, ifindex: IfIndex, nbr: RouterId) -> bool {
        let (was_up, data) = match self.adjacency_mut(ifindex, nbr) {
            Some(adj) => {
                let was_up = adj.state == AdjState::Up;
                adj.state = AdjState::Down;
                adj.uptime = None;
                adj.last_transition = now;
                adj.timer = None;
                (was_up, [adj.reach_datum.take(), adj.pn_datum.take()])
            }
            None => return false,
        };
        for id in data.iter().flatten() {
            self.advt.withdraw(*id);
        }
        if was_up {
            self.up_adjacencies -= 1;
            self.stats.adj_down += 1;
        }
        was_up
    }

    /// `any -> Down`: withdraw reachability, start the delete timer and re-elect the DIS.
    pub(crate) fn adjacency_down(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, nbr: RouterId) {
        let was_up = self.take_down(ctx.now(), ifindex, nbr);
        info!(target: "isis::adj", "{}: adjacency to {} on {} is Down", self.hostname, nbr, ifindex);
        let delay = secs(self.config.adjacency_delete_time);
        let handle = ctx.queue.schedule_timer(ctx.device, delay, Timer::AdjacencyDelete(ifindex, nbr));
        if let Some(adj) = self.adjacency_mut(ifindex, nbr) {
            adj.timer = Some(AdjTimer::Delete(handle));
        }
        let is_lan = self.interfaces.get(&ifindex).map(|i| i.kind == InterfaceKind::Lan);
        if is_lan == Some(true) && ctx.is_up(ifindex) {
            self.reelect_dis(ctx, ifindex);
        }
        if was_up {
            self.schedule_job(ctx, Job::Spf);
        }
    }

    /// Destroy an adjacency right away
    pub(crate) fn remove_adjacency(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, nbr: RouterId) {
        self.take_down(ctx.now(), ifindex, nbr);
        if let Some(i) = self.interfaces.get_mut(&ifindex) {
            i.adjacencies.remove(&nbr);
        }
        debug!(target: "isis::adj", "{}: removed adjacency to {} on {}", self.hostname, nbr, ifindex);
    }

    pub(crate) fn adjacency_expired(
        &mut self,
        ctx: &mut RouterCtx,
        handle: TimerHandle,
        ifindex: IfIndex,
        nbr: RouterId,
    ) {
        let current = self.adjacency(ifindex, nbr).and_then(|a| a.timer);
        if current != Some(AdjTimer::Expiry(handle)) {
            return;
        }
        info!(target: "isis::adj", "{}: hold time of {} on {} expired", self.hostname, nbr, ifindex);
        self.adjacency_down(ctx, ifindex, nbr);
    }

    pub(crate) fn adjacency_deleted(&mut self, handle: TimerHandle, ifindex: IfIndex, nbr: RouterId) {
        let adj = match self.adjacency(ifindex, nbr) {
            Some(a) => a,
            None => return,
        };
        if adj.timer != Some(AdjTimer::Delete(handle)) || adj.state != AdjState::Down {
            return;
        }
        debug!(target: "isis::adj", "{}: deleting adjacency to {} on {}", self.hostname, nbr, ifindex);
        if let Some(i) = self.interfaces.get_mut(&ifindex) {
            i.adjacencies.remove(&nbr);
        }
    }

    pub(crate) fn hello_timer_fired(&mut self, ctx: &mut RouterCtx, handle: TimerHandle, ifindex: IfIndex) {
        match self.interfaces.get(&ifindex) {
            Some(i) if i.hello_timer == Some(handle) => {}
            _ => return,
        }
        if ctx.is_up(ifindex) {
            self.send_hello(ctx, ifindex);
        }
        let delay = secs(self.config.hello_interval);
        let handle = ctx.queue.schedule_timer(ctx.device, delay, Timer::Hello(ifindex));
        if let Some(i) = self.interfaces.get_mut(&ifindex) {
            i.hello_timer = Some(handle);
        }
    }

    /// Send a Hello on an interface
    pub(crate) fn send_hello(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex) {
        let interfaces = ctx.interfaces;
        let phys = match interfaces.get(&ifindex) {
            Some(p) if p.up => p,
            _ => return,
        };
        let hold_time = self.config.hold_time();
        let iface = match self.interfaces.get_mut(&ifindex) {
            Some(i) => i,
            None => return,
        };
        let mut tlvs = vec![
            Tlv::Hostname(self.hostname.clone()),
            Tlv::RouterId(self.rtr_id),
            Tlv::InterfaceIp { addr: phys.addr, mask_len: phys.mask_len },
            Tlv::InterfaceIndex(ifindex),
            Tlv::HoldTime(hold_time),
            Tlv::Metric(iface.cost),
            Tlv::InterfaceMac(phys.mac),
            Tlv::Priority(iface.priority),
        ];
        if let Some(lan_id) = iface.dis {
            tlvs.push(Tlv::LanId(lan_id));
        }
        iface.hello_seq = iface.hello_seq.wrapping_add(1);
        let hello = HelloPdu { seq: iface.hello_seq, rtr_id: self.rtr_id, tlvs };
        let frame = Frame { dst: MacAddr::BROADCAST, src: phys.mac, payload: hello.encode() };
        ctx.queue.transmit(ctx.device, ifindex, frame);
        self.stats.hello_tx += 1;
        trace!(target: "isis::pkt", "{}: sent Hello on {}", self.hostname, phys.name);
    }
}
