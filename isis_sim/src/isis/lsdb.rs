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

//! # Link-state database
//!
//! The LSDB keeps the most recent LSP of every fragment `(router-id, pseudonode, fragment)`. A
//! received LSP is classified against the database copy:
//!
//! - *newer*: installed, applied to the TED, flooded on all other interfaces, SPF scheduled;
//! - *duplicate*: ignored;
//! - *older*: dropped, and our newer copy is flooded back out of the receiving interface.
//!
//! Self-originated LSPs are special. A received copy of one of our fragments that is newer than
//! ours means that the network still remembers an earlier incarnation of us: we continue our
//! sequence above it and regenerate. A received fragment that we no longer own is purged.

use crate::isis::lsp::Lsp;
use crate::isis::packet::{LspFlags, LspPdu};
use crate::isis::{secs, IsisInstance, RouterCtx};
use crate::netsim::{IfIndex, Job, LspId, SimTime, Timer, TimerHandle};
use log::*;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Classification of a received LSP against the database copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No copy, or the copy has a lower sequence number
    Newer,
    /// The copy has the same sequence number
    Duplicate,
    /// The copy has a higher sequence number
    Older,
}

/// Entry of the database
#[derive(Debug)]
pub struct LsdbEntry {
    lsp: Rc<Lsp>,
    installed: SimTime,
    expires: Option<SimTime>,
    aging_timer: Option<TimerHandle>,
}

impl LsdbEntry {
    /// The LSP
    pub fn lsp(&self) -> &Rc<Lsp> {
        &self.lsp
    }

    /// Time of installation
    pub fn installed(&self) -> SimTime {
        self.installed
    }

    /// Time at which the entry ages out, `None` if it never does
    pub fn expires(&self) -> Option<SimTime> {
        self.expires
    }
}

/// The link-state database
#[derive(Debug, Default)]
pub struct Lsdb {
    entries: BTreeMap<LspId, LsdbEntry>,
}

impl Lsdb {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a received LSP
    pub fn classify(&self, id: LspId, seq: u32) -> Freshness {
        match self.entries.get(&id) {
            None => Freshness::Newer,
            Some(e) if seq > e.lsp.seq() => Freshness::Newer,
            Some(e) if seq == e.lsp.seq() => Freshness::Duplicate,
            Some(_) => Freshness::Older,
        }
    }

    /// Install an LSP. An LSP with a sequence number equal to or lower than the database copy is
    /// rejected (`false`). Otherwise it replaces the copy; its aging timer must be set with
    /// [`Lsdb::set_aging`].
    pub fn install(&mut self, lsp: Rc<Lsp>, now: SimTime) -> bool {
        if self.classify(lsp.id(), lsp.seq()) != Freshness::Newer {
            return false;
        }
        let entry = LsdbEntry { lsp, installed: now, expires: None, aging_timer: None };
        self.entries.insert(entry.lsp.id(), entry);
        true
    }

    /// Set the aging timer of an entry. The previous timer becomes stale.
    pub(crate) fn set_aging(&mut self, id: LspId, timer: Option<(TimerHandle, SimTime)>) {
        if let Some(e) = self.entries.get_mut(&id) {
            e.aging_timer = timer.map(|(h, _)| h);
            e.expires = timer.map(|(_, t)| t);
        }
    }

    /// Remove an entry
    pub fn remove(&mut self, id: LspId) -> Option<Rc<Lsp>> {
        self.entries.remove(&id).map(|e| e.lsp)
    }

    /// Get the LSP of a fragment
    pub fn get(&self, id: LspId) -> Option<&Rc<Lsp>> {
        self.entries.get(&id).map(|e| &e.lsp)
    }

    /// Get an entry
    pub fn entry(&self, id: LspId) -> Option<&LsdbEntry> {
        self.entries.get(&id)
    }

    /// Returns `true` if the LSP is the one in the database, i.e., it was not superseded.
    pub fn is_current(&self, lsp: &Rc<Lsp>) -> bool {
        self.entries.get(&lsp.id()).map(|e| Rc::ptr_eq(&e.lsp, lsp)).unwrap_or(false)
    }

    /// Iterate over all entries, ordered by LSP id
    pub fn iter(&self) -> impl Iterator<Item = (&LspId, &LsdbEntry)> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the database is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IsisInstance {
    /// Handle a received LSP
    pub(crate) fn process_lsp(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
        pdu: LspPdu,
        raw: Vec<u8>,
    ) {
        self.stats.lsp_rx += 1;
        // the sender may reach Up one Hello before we do
        let accepted = self
            .interfaces
            .get(&ifindex)
            .map(|i| i.has_live_adjacency())
            .unwrap_or(false);
        if !accepted {
            self.stats.lsp_dropped += 1;
            trace!(target: "isis::lsdb", "{}: LSP {} on {} without adjacency", self.hostname, pdu.id, ifindex);
            return;
        }
        let id = pdu.id;
        let seq = pdu.seq;
        let freshness = self.lsdb.classify(id, seq);
        trace!(target: "isis::lsdb", "{}: LSP {} seq {} is {:?}", self.hostname, id, seq, freshness);

        match freshness {
            Freshness::Duplicate => {
                self.stats.lsp_duplicate += 1;
            }
            Freshness::Older => {
                self.stats.lsp_old += 1;
                if let Some(ours) = self.lsdb.get(id).cloned() {
                    self.queue_for_flood(ctx, ifindex, ours);
                }
            }
            Freshness::Newer if id.system.rtr_id == self.rtr_id => {
                self.stats.lsp_self_conflict += 1;
                let (pn_id, number) = (id.system.pn_id, id.fragment);
                if self.advt.owns(pn_id, number) {
                    info!(target: "isis::lsdb", "{}: received own LSP {} with seq {}, advancing", self.hostname, id, seq);
                    self.advt.bump_sequence(pn_id, number, seq);
                    self.schedule_job(ctx, Job::RegenerateDirty);
                } else if pdu.flags.contains(LspFlags::PURGE) {
                    // someone else purged a stale fragment of ours: take it over as is
                    self.advt.bump_sequence(pn_id, number, seq);
                    let lsp = Rc::new(Lsp::from_parts(pdu, raw));
                    self.install_received(ctx, ifindex, lsp);
                } else {
                    info!(target: "isis::lsdb", "{}: purging stale own LSP {}", self.hostname, id);
                    let params = self.lsp_params();
                    let purge = self.advt.purge_foreign(pn_id, number, seq, &params);
                    self.install_self_lsp(ctx, purge);
                }
            }
            Freshness::Newer => {
                self.stats.lsp_new += 1;
                let lsp = Rc::new(Lsp::from_parts(pdu, raw));
                self.install_received(ctx, ifindex, lsp);
            }
        }
    }

    /// Aging timer of an LSP of another router
    fn aging_timer(&self, ctx: &mut RouterCtx, lsp: &Lsp) -> Option<(TimerHandle, SimTime)> {
        let lifetime = if lsp.is_purge() {
            self.config.purge_hold_time
        } else if lsp.is_on_demand() {
            return None;
        } else {
            lsp.lifetime() as u32
        };
        let delay = secs(lifetime);
        let handle = ctx.queue.schedule_timer(ctx.device, delay, Timer::LspAging(lsp.id()));
        Some((handle, ctx.now() + delay))
    }

    fn install_received(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, lsp: Rc<Lsp>) {
        let id = lsp.id();
        if !self.lsdb.install(lsp.clone(), ctx.now()) {
            return;
        }
        let timer = self.aging_timer(ctx, &lsp);
        self.lsdb.set_aging(id, timer);
        self.ted.update(&lsp);
        debug!(target: "isis::lsdb", "{}: installed LSP {} seq {}", self.hostname, id, lsp.seq());
        self.schedule_flood(ctx, lsp, Some(ifindex));
        self.schedule_job(ctx, Job::Spf);
    }

    /// Install a self-originated LSP (or a purge we originate) and flood it everywhere.
    pub(crate) fn install_self_lsp(&mut self, ctx: &mut RouterCtx, lsp: Rc<Lsp>) {
        let id = lsp.id();
        if !self.lsdb.install(lsp.clone(), ctx.now()) {
            // our sequence floor always lies above anything in the database
            warn!(target: "isis::lsdb", "{}: own LSP {} seq {} is not newer", self.hostname, id, lsp.seq());
            return;
        }
        // our own fragments never age, only our purges do
        let timer = if lsp.is_purge() {
            self.stats.lsp_purged += 1;
            self.aging_timer(ctx, &lsp)
        } else {
            None
        };
        self.lsdb.set_aging(id, timer);
        self.ted.update(&lsp);
        trace!(target: "isis::lsdb", "{}: installed own LSP {} seq {}", self.hostname, id, lsp.seq());
        self.schedule_flood(ctx, lsp, None);
        self.schedule_job(ctx, Job::Spf);
    }

    /// The aging timer of an entry fired
    pub(crate) fn lsp_aged(&mut self, ctx: &mut RouterCtx, handle: TimerHandle, id: LspId) {
        match self.lsdb.entries.get(&id) {
            Some(e) if e.aging_timer == Some(handle) => {}
            _ => return,
        }
        if let Some(lsp) = self.lsdb.remove(id) {
            if lsp.is_purge() {
                trace!(target: "isis::lsdb", "{}: purge hold of {} over", self.hostname, id);
            } else {
                self.stats.lsp_expired += 1;
                info!(target: "isis::lsdb", "{}: LSP {} expired", self.hostname, id);
            }
            self.ted.detach_fragment(id);
            self.schedule_job(ctx, Job::Spf);
        }
    }
}
