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

//! # Link-state protocol instance
//!
//! One [`IsisInstance`] runs on every router that has the protocol enabled. It owns the
//! adjacencies of its interfaces, the advertisement manager with the self-originated fragments,
//! the link-state database, the TED and the flood queues. It does not own the interfaces or the
//! routing table of the router; those are lent to it on every call through a [`RouterCtx`].
//!
//! All work is driven by events of the simulator: received frames, timers, and one-shot jobs.
//! Scheduling a job that is already pending is a no-op, so any number of changes within the same
//! event collapse into one fragment regeneration, one flood run per interface and one SPF run.

use crate::netsim::route_map::{self, RouteMap};
use crate::netsim::router::{Interface, InterfaceKind, StaticRoute};
use crate::netsim::{
    Cost, DeviceError, DeviceId, EventQueue, Frame, IfIndex, Job, Prefix, RouterId, SimTime,
    SystemId, Timer, TimerHandle,
};
use crate::rib::RoutingTable;
use log::*;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;

pub mod adjacency;
pub mod advt;
pub(crate) mod dis;
pub mod flood;
pub mod lsdb;
pub mod lsp;
pub mod packet;
pub(crate) mod routes;
pub mod spf;
pub mod ted;

pub use adjacency::{AdjState, Adjacency};
pub use advt::{AdvtData, AdvtManager, DatumId, Fragment, LspParams};
pub use lsdb::{Freshness, Lsdb, LsdbEntry};
pub use lsp::Lsp;
pub use packet::DecodeError;
pub use spf::{SpfNextHop, SpfResult};
pub use ted::{Ted, TedLink, TedNode, TedPrefix};

use advt::AdvtData as Data;
use packet::{IpReach, PrefixFlags, Pdu, MAX_LSP_SIZE, MAX_TLV_VALUE_LEN};

/// Protocol parameters. All times are in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsisConfig {
    /// Interval between two Hellos on an interface
    pub hello_interval: u32,
    /// Hold time announced in Hellos, as a multiple of the hello interval
    pub hold_multiplier: u32,
    /// Time a down adjacency is kept before it is deleted
    pub adjacency_delete_time: u32,
    /// Remaining lifetime of self-originated LSPs
    pub lsp_lifetime: u32,
    /// Interval between two refreshes of all self-originated fragments
    pub lsp_refresh_interval: u32,
    /// Time a purged LSP stays in the database
    pub purge_hold_time: u32,
    /// Maximum number of fragments per pseudonode
    pub max_fragments: usize,
    /// Size of a fragment. Values above 1492 are capped.
    pub lsp_size: usize,
    /// Cost of an interface without configured cost
    pub default_cost: Cost,
    /// DIS priority of an interface without configured priority
    pub default_priority: u8,
    /// Originate LSPs that are only refreshed on demand and never age out
    pub on_demand: bool,
    /// Maximum number of distinct interface groups
    pub max_interface_groups: usize,
}

impl Default for IsisConfig {
    fn default() -> Self {
        Self {
            hello_interval: 3,
            hold_multiplier: 3,
            adjacency_delete_time: 10,
            lsp_lifetime: 1200,
            lsp_refresh_interval: 900,
            purge_hold_time: 60,
            max_fragments: 32,
            lsp_size: MAX_LSP_SIZE,
            default_cost: 10,
            default_priority: 64,
            on_demand: false,
            max_interface_groups: 16,
        }
    }
}

impl IsisConfig {
    /// Hold time announced in Hellos, in seconds
    pub fn hold_time(&self) -> u16 {
        (self.hello_interval * self.hold_multiplier).min(u16::MAX as u32) as u16
    }
}

pub(crate) fn secs(s: u32) -> SimTime {
    s as SimTime * 1000
}

/// Counters of a protocol instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsisStats {
    /// Hellos received
    pub hello_rx: u64,
    /// Hellos sent
    pub hello_tx: u64,
    /// Hellos not sent to the broadcast address
    pub bad_hello_not_broadcast: u64,
    /// Hellos without interface address
    pub bad_hello_no_if_ip: u64,
    /// Hellos from an address outside of the interface subnet
    pub bad_hello_subnet: u64,
    /// Hellos received on an interface without the protocol
    pub bad_hello_disabled: u64,
    /// Hellos sent by this router itself
    pub bad_hello_own: u64,
    /// LSPs received
    pub lsp_rx: u64,
    /// LSPs sent
    pub lsp_tx: u64,
    /// Received LSPs newer than the database copy
    pub lsp_new: u64,
    /// Received LSPs equal to the database copy
    pub lsp_duplicate: u64,
    /// Received LSPs older than the database copy
    pub lsp_old: u64,
    /// Received self-originated LSPs newer than ours
    pub lsp_self_conflict: u64,
    /// LSPs received on an interface without up adjacency
    pub lsp_dropped: u64,
    /// Purges originated
    pub lsp_purged: u64,
    /// LSPs removed because their lifetime ran out
    pub lsp_expired: u64,
    /// SPF runs
    pub spf_runs: u64,
    /// LSPs whose last flood reference was released
    pub flood_complete: u64,
    /// Packets that could not be decoded
    pub decode_errors: u64,
    /// LAN segments that could not get a pseudonode id
    pub pn_exhausted: u64,
    /// Adjacencies that came up
    pub adj_up: u64,
    /// Adjacencies that went down
    pub adj_down: u64,
}

impl fmt::Display for IsisStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "hello:  rx {} tx {}", self.hello_rx, self.hello_tx)?;
        writeln!(
            f,
            "bad hello: not-broadcast {} no-if-ip {} subnet {} disabled {} own {}",
            self.bad_hello_not_broadcast,
            self.bad_hello_no_if_ip,
            self.bad_hello_subnet,
            self.bad_hello_disabled,
            self.bad_hello_own
        )?;
        writeln!(
            f,
            "lsp:    rx {} tx {} new {} duplicate {} old {} self-conflict {} dropped {}",
            self.lsp_rx,
            self.lsp_tx,
            self.lsp_new,
            self.lsp_duplicate,
            self.lsp_old,
            self.lsp_self_conflict,
            self.lsp_dropped
        )?;
        writeln!(f, "        purged {} expired {}", self.lsp_purged, self.lsp_expired)?;
        writeln!(f, "adjacency: up {} down {}", self.adj_up, self.adj_down)?;
        write!(
            f,
            "spf runs {} flood-complete {} decode-errors {} pn-exhausted {}",
            self.spf_runs, self.flood_complete, self.decode_errors, self.pn_exhausted
        )
    }
}

/// Parts of the router lent to the protocol instance for the duration of one call.
#[derive(Debug)]
pub struct RouterCtx<'a> {
    /// Device of the router
    pub device: DeviceId,
    /// Name of the router, advertised as hostname
    pub name: &'a str,
    /// Loopback address (and router id) of the router
    pub loopback: Ipv4Addr,
    /// Interfaces of the router
    pub interfaces: &'a BTreeMap<IfIndex, Interface>,
    /// Configured static routes
    pub static_routes: &'a BTreeMap<Prefix, StaticRoute>,
    /// Routing table of the router
    pub rib: &'a mut RoutingTable,
    /// Event queue of the network
    pub queue: &'a mut EventQueue,
}

impl<'a> RouterCtx<'a> {
    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// Returns `true` if the interface exists and its link is up
    pub fn is_up(&self, ifindex: IfIndex) -> bool {
        self.interfaces.get(&ifindex).map(|i| i.up).unwrap_or(false)
    }
}

/// Protocol state of an interface
#[derive(Debug)]
pub struct IsisInterface {
    pub(crate) ifindex: IfIndex,
    pub(crate) kind: InterfaceKind,
    pub(crate) cost: Cost,
    pub(crate) priority: u8,
    pub(crate) group: Option<String>,
    pub(crate) adjacencies: BTreeMap<RouterId, Adjacency>,
    /// pseudonode of the LAN segment, as elected
    pub(crate) dis: Option<SystemId>,
    /// pseudonode id allocated while this router is DIS
    pub(crate) own_pn: Option<u8>,
    pub(crate) hello_timer: Option<TimerHandle>,
    pub(crate) hello_seq: u32,
    pub(crate) flood_queue: VecDeque<Rc<Lsp>>,
    pub(crate) subnet_datum: Option<DatumId>,
    /// self to pseudonode reachability
    pub(crate) lan_reach: Option<DatumId>,
    /// pseudonode to self reachability, while DIS
    pub(crate) pn_self: Option<DatumId>,
}

impl IsisInterface {
    fn new(ifindex: IfIndex, kind: InterfaceKind, config: &IsisConfig) -> Self {
        Self {
            ifindex,
            kind,
            cost: config.default_cost,
            priority: config.default_priority,
            group: None,
            adjacencies: BTreeMap::new(),
            dis: None,
            own_pn: None,
            hello_timer: None,
            hello_seq: 0,
            flood_queue: VecDeque::new(),
            subnet_datum: None,
            lan_reach: None,
            pn_self: None,
        }
    }

    /// Interface index
    pub fn ifindex(&self) -> IfIndex {
        self.ifindex
    }

    /// Point to point or LAN
    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    /// Cost of the interface
    pub fn cost(&self) -> Cost {
        self.cost
    }

    /// DIS priority of the interface
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Flooding group
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Adjacencies, by neighbor router id
    pub fn adjacencies(&self) -> &BTreeMap<RouterId, Adjacency> {
        &self.adjacencies
    }

    /// Returns `true` if at least one adjacency is up
    pub fn has_up_adjacency(&self) -> bool {
        self.adjacencies.values().any(|a| a.state() == AdjState::Up)
    }

    /// Returns `true` if some neighbor has been heard from and not timed out (Init or Up)
    pub fn has_live_adjacency(&self) -> bool {
        self.adjacencies.values().any(|a| a.state() != AdjState::Down)
    }

    /// The pseudonode of the LAN segment, if one is elected
    pub fn dis(&self) -> Option<SystemId> {
        self.dis
    }

    /// Returns `true` if this router is the DIS of the segment
    pub fn is_dis(&self) -> bool {
        self.own_pn.is_some()
    }

    /// Number of LSPs waiting for transmission
    pub fn flood_queue_len(&self) -> usize {
        self.flood_queue.len()
    }
}

impl Drop for IsisInterface {
    fn drop(&mut self) {
        // queued LSPs hold a flood reference each
        for lsp in self.flood_queue.drain(..) {
            lsp.flood_unref();
        }
    }
}

/// The protocol instance of one router
#[derive(Debug)]
pub struct IsisInstance {
    pub(crate) config: IsisConfig,
    pub(crate) rtr_id: RouterId,
    pub(crate) hostname: String,
    pub(crate) interfaces: BTreeMap<IfIndex, IsisInterface>,
    pub(crate) advt: AdvtManager,
    pub(crate) lsdb: Lsdb,
    pub(crate) ted: Ted,
    pub(crate) spf_results: Vec<SpfResult>,
    pending_jobs: HashSet<Job>,
    pub(crate) up_adjacencies: usize,
    hostname_datum: Option<DatumId>,
    loopback_datum: Option<DatumId>,
    exported: BTreeMap<Prefix, (IpReach, DatumId)>,
    pub(crate) import_maps: Vec<RouteMap>,
    pub(crate) export_maps: Vec<RouteMap>,
    pub(crate) pn_ids: BTreeSet<u8>,
    admin_overload: bool,
    overload_timer: Option<TimerHandle>,
    refresh_timer: Option<TimerHandle>,
    pub(crate) stats: IsisStats,
}

impl IsisInstance {
    /// Create a new instance. Call [`IsisInstance::start`] afterwards.
    pub(crate) fn new(config: IsisConfig, rtr_id: RouterId, hostname: &str) -> Self {
        let capacity = config.lsp_size.min(MAX_LSP_SIZE);
        let advt = AdvtManager::new(capacity, config.max_fragments);
        Self {
            config,
            rtr_id,
            hostname: hostname.to_string(),
            interfaces: BTreeMap::new(),
            advt,
            lsdb: Lsdb::new(),
            ted: Ted::new(),
            spf_results: Vec::new(),
            pending_jobs: HashSet::new(),
            up_adjacencies: 0,
            hostname_datum: None,
            loopback_datum: None,
            exported: BTreeMap::new(),
            import_maps: Vec::new(),
            export_maps: Vec::new(),
            pn_ids: BTreeSet::new(),
            admin_overload: false,
            overload_timer: None,
            refresh_timer: None,
            stats: IsisStats::default(),
        }
    }

    /// Advertise the hostname and the loopback, export static routes and start refreshing.
    pub(crate) fn start(&mut self, ctx: &mut RouterCtx) {
        debug!(target: "isis::adj", "{}: starting protocol instance {}", self.hostname, self.rtr_id);
        if self.hostname.len() > MAX_TLV_VALUE_LEN {
            warn!(target: "isis::adj", "{}: hostname is advertised truncated", self.hostname);
        }
        self.hostname_datum = Some(self.advt.advertise(Data::Hostname(self.hostname.clone()), 0));
        let loopback = IpReach {
            prefix: Prefix::host(ctx.loopback),
            metric: 0,
            flags: PrefixFlags::empty(),
        };
        self.loopback_datum = Some(self.advt.advertise(Data::IpReach(loopback), 0));
        self.export_static_routes(ctx);
        if !self.config.on_demand {
            let delay = secs(self.config.lsp_refresh_interval);
            self.refresh_timer = Some(ctx.queue.schedule_timer(ctx.device, delay, Timer::LspRefresh));
        }
        self.flush(ctx);
    }

    /// Stop the instance. Routes of the protocol are removed, flood queues are drained and all
    /// pending jobs are cancelled. Timers become stale, since their owner disappears.
    pub(crate) fn shutdown(&mut self, ctx: &mut RouterCtx) {
        debug!(target: "isis::adj", "{}: stopping protocol instance", self.hostname);
        ctx.rib.remove_protocol(crate::rib::Protocol::Isis);
        let ifaces: Vec<IfIndex> = self.interfaces.keys().copied().collect();
        for ifindex in ifaces {
            self.drain_flood_queue(ifindex);
        }
        self.pending_jobs.clear();
        self.overload_timer = None;
        self.refresh_timer = None;
    }

    /// Router id
    pub fn rtr_id(&self) -> RouterId {
        self.rtr_id
    }

    /// System id of the router itself
    pub fn system_id(&self) -> SystemId {
        SystemId::router(self.rtr_id)
    }

    /// Hostname
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Protocol parameters
    pub fn config(&self) -> &IsisConfig {
        &self.config
    }

    /// Protocol state of the interfaces
    pub fn interfaces(&self) -> &BTreeMap<IfIndex, IsisInterface> {
        &self.interfaces
    }

    /// Protocol state of one interface
    pub fn interface(&self, ifindex: IfIndex) -> Option<&IsisInterface> {
        self.interfaces.get(&ifindex)
    }

    /// Adjacency with `neighbor` on interface `ifindex`
    pub fn adjacency(&self, ifindex: IfIndex, neighbor: RouterId) -> Option<&Adjacency> {
        self.interfaces.get(&ifindex).and_then(|i| i.adjacencies.get(&neighbor))
    }

    /// Number of adjacencies in state up
    pub fn up_adjacencies(&self) -> usize {
        self.up_adjacencies
    }

    /// Advertisement manager
    pub fn advt(&self) -> &AdvtManager {
        &self.advt
    }

    /// Link-state database
    pub fn lsdb(&self) -> &Lsdb {
        &self.lsdb
    }

    /// Traffic engineering database
    pub fn ted(&self) -> &Ted {
        &self.ted
    }

    /// Result of the last SPF run
    pub fn spf_results(&self) -> &[SpfResult] {
        &self.spf_results
    }

    /// Counters
    pub fn stats(&self) -> &IsisStats {
        &self.stats
    }

    /// Import policy, ordered
    pub fn import_maps(&self) -> &[RouteMap] {
        &self.import_maps
    }

    /// Export policy, ordered
    pub fn export_maps(&self) -> &[RouteMap] {
        &self.export_maps
    }

    /// Returns `true` if the router advertises overload, either configured or because it ran
    /// out of fragment space
    pub fn is_overloaded(&self) -> bool {
        self.admin_overload || self.advt.is_dyn_overloaded()
    }

    /// Returns `true` if administrative overload is set
    pub fn is_admin_overloaded(&self) -> bool {
        self.admin_overload
    }

    /// Returns `true` if the job is pending
    pub fn is_pending(&self, job: Job) -> bool {
        self.pending_jobs.contains(&job)
    }

    pub(crate) fn lsp_params(&self) -> LspParams {
        LspParams {
            rtr_id: self.rtr_id,
            overload: self.admin_overload,
            lifetime: self.config.lsp_lifetime.min(u16::MAX as u32) as u16,
            on_demand: self.config.on_demand,
        }
    }

    /// Schedule a job. Nothing happens if the job is already pending.
    pub(crate) fn schedule_job(&mut self, ctx: &mut RouterCtx, job: Job) {
        if self.pending_jobs.insert(job) {
            ctx.queue.schedule_job(ctx.device, job);
        }
    }

    /// Schedule the regeneration of dirty fragments, if there are any.
    pub(crate) fn flush(&mut self, ctx: &mut RouterCtx) {
        if self.advt.is_dirty() {
            self.schedule_job(ctx, Job::RegenerateDirty);
        }
    }

    /// Handle a frame received on an interface
    pub(crate) fn receive(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, frame: Frame) {
        match packet::decode(&frame.payload) {
            Ok(Pdu::Hello(hello)) => self.process_hello(ctx, ifindex, &frame, hello),
            Ok(Pdu::Lsp(pdu)) => self.process_lsp(ctx, ifindex, pdu, frame.payload),
            Err(e) => {
                self.stats.decode_errors += 1;
                debug!(target: "isis::pkt", "{}: dropping packet on {}: {}", self.hostname, ifindex, e);
            }
        }
        self.flush(ctx);
    }

    /// Handle a timer
    pub(crate) fn handle_timer(&mut self, ctx: &mut RouterCtx, handle: TimerHandle, timer: Timer) {
        match timer {
            Timer::Hello(ifindex) => self.hello_timer_fired(ctx, handle, ifindex),
            Timer::AdjacencyExpiry(ifindex, nbr) => self.adjacency_expired(ctx, handle, ifindex, nbr),
            Timer::AdjacencyDelete(ifindex, nbr) => self.adjacency_deleted(handle, ifindex, nbr),
            Timer::LspAging(id) => self.lsp_aged(ctx, handle, id),
            Timer::LspRefresh => {
                if self.refresh_timer == Some(handle) {
                    debug!(target: "isis::advt", "{}: refreshing all fragments", self.hostname);
                    self.advt.mark_all_dirty();
                    let delay = secs(self.config.lsp_refresh_interval);
                    self.refresh_timer =
                        Some(ctx.queue.schedule_timer(ctx.device, delay, Timer::LspRefresh));
                }
            }
            Timer::OverloadTimeout => {
                if self.overload_timer == Some(handle) {
                    info!(target: "isis::advt", "{}: overload timed out", self.hostname);
                    self.overload_timer = None;
                    self.set_admin_overload(false);
                }
            }
        }
        self.flush(ctx);
    }

    /// Run a job, if it is still pending
    pub(crate) fn handle_job(&mut self, ctx: &mut RouterCtx, job: Job) {
        if !self.pending_jobs.remove(&job) {
            return;
        }
        match job {
            Job::RegenerateDirty => self.regenerate(ctx),
            Job::RegenerateAll => {
                self.advt.mark_all_dirty();
                self.regenerate(ctx);
            }
            Job::Spf => self.run_spf(ctx),
            Job::Flood(ifindex) => self.run_flood(ctx, ifindex),
        }
        self.flush(ctx);
    }

    /// Regenerate dirty fragments, install them and flood them.
    fn regenerate(&mut self, ctx: &mut RouterCtx) {
        let params = self.lsp_params();
        let lsps = self.advt.regenerate_dirty(&params);
        if lsps.is_empty() {
            return;
        }
        debug!(target: "isis::advt", "{}: regenerated {} fragment(s)", self.hostname, lsps.len());
        for lsp in lsps {
            self.install_self_lsp(ctx, lsp);
        }
        self.schedule_job(ctx, Job::Spf);
    }

    fn set_admin_overload(&mut self, overload: bool) {
        if self.admin_overload != overload {
            self.admin_overload = overload;
            self.advt.mark_dirty(0, 0);
        }
    }

    /// Set administrative overload, optionally clearing itself after `timeout` seconds.
    pub(crate) fn set_overload(&mut self, ctx: &mut RouterCtx, timeout: Option<u32>) {
        info!(target: "isis::advt", "{}: setting overload (timeout {:?})", self.hostname, timeout);
        self.set_admin_overload(true);
        self.overload_timer = timeout
            .map(|t| ctx.queue.schedule_timer(ctx.device, secs(t), Timer::OverloadTimeout));
        self.flush(ctx);
    }

    /// Clear administrative overload
    pub(crate) fn clear_overload(&mut self, ctx: &mut RouterCtx) {
        info!(target: "isis::advt", "{}: clearing overload", self.hostname);
        self.overload_timer = None;
        self.set_admin_overload(false);
        self.flush(ctx);
    }

    /// Enable the protocol on an interface
    pub(crate) fn enable_interface(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
    ) -> Result<(), DeviceError> {
        let iface = ctx.interfaces.get(&ifindex).ok_or(DeviceError::InterfaceNotFound(ifindex))?;
        if self.interfaces.contains_key(&ifindex) {
            return Err(DeviceError::InterfaceAlreadyEnabled(ifindex));
        }
        debug!(target: "isis::adj", "{}: enabling interface {}", self.hostname, iface.name);
        self.interfaces.insert(ifindex, IsisInterface::new(ifindex, iface.kind, &self.config));
        if iface.up {
            self.interface_up(ctx, ifindex);
        }
        self.flush(ctx);
        Ok(())
    }

    /// Disable the protocol on an interface. All adjacencies are removed immediately.
    pub(crate) fn disable_interface(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
    ) -> Result<(), DeviceError> {
        if !self.interfaces.contains_key(&ifindex) {
            return Err(DeviceError::InterfaceNotEnabled(ifindex));
        }
        debug!(target: "isis::adj", "{}: disabling interface {}", self.hostname, ifindex);
        self.interface_down(ctx, ifindex);
        self.interfaces.remove(&ifindex);
        self.flush(ctx);
        Ok(())
    }

    /// The link of an interface changed its state
    pub(crate) fn set_interface_state(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, up: bool) {
        if !self.interfaces.contains_key(&ifindex) {
            return;
        }
        if up {
            self.interface_up(ctx, ifindex);
        } else {
            self.interface_down(ctx, ifindex);
        }
        self.flush(ctx);
    }

    fn interface_up(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex) {
        let iface = match ctx.interfaces.get(&ifindex) {
            Some(i) => i,
            None => return,
        };
        let prefix = Prefix::new(iface.addr, iface.mask_len);
        let is_lan = iface.kind == InterfaceKind::Lan;
        let cost = match self.interfaces.get(&ifindex) {
            Some(i) => i.cost,
            None => return,
        };
        let reach = IpReach { prefix, metric: cost, flags: PrefixFlags::empty() };
        let datum = self.advt.advertise(Data::IpReach(reach), 0);
        if let Some(i) = self.interfaces.get_mut(&ifindex) {
            if let Some(old) = i.subnet_datum.replace(datum) {
                self.advt.withdraw(old);
            }
        }
        if is_lan {
            self.reelect_dis(ctx, ifindex);
        }
        // the first Hello goes out right away
        let handle = ctx.queue.schedule_timer(ctx.device, 0, Timer::Hello(ifindex));
        if let Some(i) = self.interfaces.get_mut(&ifindex) {
            i.hello_timer = Some(handle);
        }
    }

    fn interface_down(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex) {
        let nbrs: Vec<RouterId> = match self.interfaces.get_mut(&ifindex) {
            Some(i) => {
                i.hello_timer = None;
                i.adjacencies.keys().copied().collect()
            }
            None => return,
        };
        for nbr in nbrs {
            self.remove_adjacency(ctx, ifindex, nbr);
        }
        self.resign_dis(ifindex);
        self.drain_flood_queue(ifindex);
        if let Some(datum) = self.interfaces.get_mut(&ifindex).and_then(|i| i.subnet_datum.take()) {
            self.advt.withdraw(datum);
        }
        self.schedule_job(ctx, Job::Spf);
    }

    /// Set the cost of an interface. `None` restores the default.
    pub(crate) fn set_interface_cost(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
        cost: Option<Cost>,
    ) -> Result<(), DeviceError> {
        let cost = cost.unwrap_or(self.config.default_cost);
        let iface =
            self.interfaces.get_mut(&ifindex).ok_or(DeviceError::InterfaceNotEnabled(ifindex))?;
        if iface.cost == cost {
            return Ok(());
        }
        debug!(target: "isis::adj", "{}: cost of {} set to {}", self.hostname, ifindex, cost);
        iface.cost = cost;
        let subnet = iface.subnet_datum;
        let lan_reach = iface.lan_reach;
        let p2p: Vec<(RouterId, DatumId)> =
            iface.adjacencies.iter().filter_map(|(r, a)| a.reach_datum.map(|d| (*r, d))).collect();

        if let Some(id) = subnet {
            let new = match self.advt.datum(id) {
                Some(Data::IpReach(r)) => Data::IpReach(IpReach { metric: cost, ..r.clone() }),
                _ => return Ok(()),
            };
            let new_id = self.advt.replace(id, new);
            if let Some(i) = self.interfaces.get_mut(&ifindex) {
                i.subnet_datum = Some(new_id);
            }
        }
        if let Some(id) = lan_reach {
            let new_id = self.replace_reach_metric(id, cost);
            if let Some(i) = self.interfaces.get_mut(&ifindex) {
                i.lan_reach = new_id;
            }
        }
        for (nbr, id) in p2p {
            let new_id = self.replace_reach_metric(id, cost);
            if let Some(a) =
                self.interfaces.get_mut(&ifindex).and_then(|i| i.adjacencies.get_mut(&nbr))
            {
                a.reach_datum = new_id;
            }
        }
        self.flush(ctx);
        Ok(())
    }

    fn replace_reach_metric(&mut self, id: DatumId, metric: Cost) -> Option<DatumId> {
        let new = match self.advt.datum(id) {
            Some(Data::IsReach(r)) => {
                let mut r = r.clone();
                r.metric = metric;
                Data::IsReach(r)
            }
            _ => return Some(id),
        };
        Some(self.advt.replace(id, new))
    }

    /// Set the DIS priority of an interface. `None` restores the default.
    pub(crate) fn set_interface_priority(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
        priority: Option<u8>,
    ) -> Result<(), DeviceError> {
        let priority = priority.unwrap_or(self.config.default_priority);
        let iface =
            self.interfaces.get_mut(&ifindex).ok_or(DeviceError::InterfaceNotEnabled(ifindex))?;
        if iface.priority == priority {
            return Ok(());
        }
        iface.priority = priority;
        if iface.kind == InterfaceKind::Lan && ctx.is_up(ifindex) {
            self.reelect_dis(ctx, ifindex);
            self.send_hello(ctx, ifindex);
        }
        self.flush(ctx);
        Ok(())
    }

    /// Put an interface into a flooding group, or remove it from its group.
    pub(crate) fn set_interface_group(
        &mut self,
        ifindex: IfIndex,
        group: Option<String>,
    ) -> Result<(), DeviceError> {
        if !self.interfaces.contains_key(&ifindex) {
            return Err(DeviceError::InterfaceNotEnabled(ifindex));
        }
        if let Some(name) = group.as_ref() {
            let groups: BTreeSet<&str> = self
                .interfaces
                .values()
                .filter(|i| i.ifindex != ifindex)
                .filter_map(|i| i.group.as_deref())
                .collect();
            if !groups.contains(name.as_str()) && groups.len() >= self.config.max_interface_groups {
                warn!(target: "isis::flood", "{}: no free interface group for {}", self.hostname, name);
                return Err(DeviceError::InterfaceGroupsExhausted(name.clone()));
            }
        }
        if let Some(i) = self.interfaces.get_mut(&ifindex) {
            i.group = group;
        }
        Ok(())
    }

    /// Remove the adjacencies of one interface, or of all interfaces. They re-form with the
    /// next Hellos.
    pub(crate) fn clear_adjacency(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: Option<IfIndex>,
    ) -> Result<(), DeviceError> {
        let ifaces: Vec<IfIndex> = match ifindex {
            Some(i) if self.interfaces.contains_key(&i) => vec![i],
            Some(i) => return Err(DeviceError::InterfaceNotEnabled(i)),
            None => self.interfaces.keys().copied().collect(),
        };
        for ifindex in ifaces {
            let nbrs: Vec<RouterId> = self.interfaces[&ifindex].adjacencies.keys().copied().collect();
            info!(target: "isis::adj", "{}: clearing {} adjacencies on {}", self.hostname, nbrs.len(), ifindex);
            for nbr in nbrs {
                self.remove_adjacency(ctx, ifindex, nbr);
            }
            if self.interfaces[&ifindex].kind == InterfaceKind::Lan && ctx.is_up(ifindex) {
                self.reelect_dis(ctx, ifindex);
            }
        }
        self.schedule_job(ctx, Job::Spf);
        self.flush(ctx);
        Ok(())
    }

    /// Add a route map to the import or export policy
    pub(crate) fn add_policy(
        &mut self,
        ctx: &mut RouterCtx,
        map: RouteMap,
        import: bool,
    ) -> Result<(), DeviceError> {
        let maps = if import { &mut self.import_maps } else { &mut self.export_maps };
        route_map::insert_route_map(maps, map).map_err(DeviceError::PolicyAlreadyExists)?;
        self.policy_changed(ctx, import);
        Ok(())
    }

    /// Remove the route map with the given order from the import or export policy
    pub(crate) fn remove_policy(
        &mut self,
        ctx: &mut RouterCtx,
        order: usize,
        import: bool,
    ) -> Result<RouteMap, DeviceError> {
        let maps = if import { &mut self.import_maps } else { &mut self.export_maps };
        let old = route_map::remove_route_map(maps, order).ok_or(DeviceError::NoPolicy(order))?;
        self.policy_changed(ctx, import);
        Ok(old)
    }

    /// Replace a route map of the import or export policy
    pub(crate) fn modify_policy(
        &mut self,
        ctx: &mut RouterCtx,
        map: RouteMap,
        import: bool,
    ) -> Result<RouteMap, DeviceError> {
        let maps = if import { &mut self.import_maps } else { &mut self.export_maps };
        let slot = maps
            .iter_mut()
            .find(|m| m.order == map.order)
            .ok_or(DeviceError::NoPolicy(map.order))?;
        // same order, so the policy stays sorted
        let old = std::mem::replace(slot, map);
        self.policy_changed(ctx, import);
        Ok(old)
    }

    fn policy_changed(&mut self, ctx: &mut RouterCtx, import: bool) {
        if import {
            self.schedule_job(ctx, Job::Spf);
        } else {
            self.export_static_routes(ctx);
            self.flush(ctx);
        }
    }

    /// Advertise the static routes of the router that pass the export policy, and withdraw the
    /// ones that no longer do.
    pub(crate) fn export_static_routes(&mut self, ctx: &mut RouterCtx) {
        let wanted: BTreeMap<Prefix, IpReach> = ctx
            .static_routes
            .values()
            .filter_map(|s| self.export_route(s))
            .map(|r| (r.prefix, r))
            .collect();
        let stale: Vec<Prefix> = self
            .exported
            .iter()
            .filter(|(p, (r, _))| wanted.get(*p) != Some(r))
            .map(|(p, _)| *p)
            .collect();
        for p in stale {
            if let Some((_, id)) = self.exported.remove(&p) {
                debug!(target: "isis::advt", "{}: no longer exporting {}", self.hostname, p);
                self.advt.withdraw(id);
            }
        }
        for (p, r) in wanted {
            if !self.exported.contains_key(&p) {
                debug!(target: "isis::advt", "{}: exporting {} at {}", self.hostname, p, r.metric);
                let id = self.advt.advertise(Data::IpReach(r.clone()), 0);
                self.exported.insert(p, (r, id));
            }
        }
    }

    fn export_route(&self, s: &StaticRoute) -> Option<IpReach> {
        let route = route_map::PolicyRoute {
            prefix: s.prefix,
            originator: self.rtr_id,
            cost: s.cost,
            external: true,
        };
        route_map::apply_route_maps(&self.export_maps, route).map(|r| IpReach {
            prefix: r.prefix,
            metric: r.cost,
            flags: PrefixFlags::EXTERNAL,
        })
    }

    /// Prefixes currently exported into the protocol
    pub fn exported(&self) -> impl Iterator<Item = &IpReach> {
        self.exported.values().map(|(r, _)| r)
    }

    /// Allocate a pseudonode id. Returns `None` if all ids are in use.
    pub(crate) fn alloc_pn_id(&mut self) -> Option<u8> {
        let id = (1..=u8::MAX).find(|id| !self.pn_ids.contains(id))?;
        self.pn_ids.insert(id);
        Some(id)
    }

    pub(crate) fn free_pn_id(&mut self, id: u8) {
        self.pn_ids.remove(&id);
    }
}
