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

//! # Flooding
//!
//! Every enabled interface has a FIFO of LSPs waiting for transmission. Queueing an LSP takes a
//! flood reference on it and schedules the flood job of the interface; the job sends every queued
//! LSP that is still current, as long as the interface has an up adjacency, and releases the
//! references. Interfaces in the same group share one representative: an LSP is only queued on
//! the lowest interface of the group that has an up adjacency.

use crate::isis::lsp::Lsp;
use crate::isis::{IsisInstance, RouterCtx};
use crate::netsim::{Frame, IfIndex, Job, MacAddr};
use itertools::Itertools;
use log::*;
use std::rc::Rc;

impl IsisInstance {
    /// Queue an LSP on every enabled interface, except the `exempt` one. Of every interface
    /// group, only the representative gets it, and no member does if the exempt interface is
    /// part of the group.
    pub(crate) fn schedule_flood(&mut self, ctx: &mut RouterCtx, lsp: Rc<Lsp>, exempt: Option<IfIndex>) {
        let targets = self.flood_targets(exempt);
        trace!(
            target: "isis::flood",
            "{}: flooding {} seq {} on {:?}",
            self.hostname,
            lsp.id(),
            lsp.seq(),
            targets.iter().map(|i| i.0).collect::<Vec<_>>()
        );
        for ifindex in targets {
            self.queue_for_flood(ctx, ifindex, lsp.clone());
        }
    }

    /// Interfaces an LSP is flooded on
    pub fn flood_targets(&self, exempt: Option<IfIndex>) -> Vec<IfIndex> {
        let mut targets: Vec<IfIndex> = self
            .interfaces
            .values()
            .filter(|i| i.group.is_none() && Some(i.ifindex) != exempt)
            .map(|i| i.ifindex)
            .collect();
        let groups = self
            .interfaces
            .values()
            .filter_map(|i| i.group.as_deref().map(|g| (g, i)))
            .into_group_map();
        for (_, members) in groups.into_iter().sorted_by_key(|(g, _)| *g) {
            if members.iter().any(|i| Some(i.ifindex) == exempt) {
                continue;
            }
            let representative = members
                .iter()
                .filter(|i| i.has_up_adjacency())
                .map(|i| i.ifindex)
                .min()
                .or_else(|| members.iter().map(|i| i.ifindex).min());
            targets.extend(representative);
        }
        targets.sort();
        targets
    }

    /// Append an LSP to the flood queue of an interface and schedule its transmission.
    pub(crate) fn queue_for_flood(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex, lsp: Rc<Lsp>) {
        let iface = match self.interfaces.get_mut(&ifindex) {
            Some(i) => i,
            None => return,
        };
        lsp.flood_ref();
        iface.flood_queue.push_back(lsp);
        self.schedule_job(ctx, Job::Flood(ifindex));
    }

    /// Transmit the flood queue of an interface
    pub(crate) fn run_flood(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex) {
        let phys = match ctx.interfaces.get(&ifindex) {
            Some(p) => p,
            None => return,
        };
        let (up, mac) = (phys.up, phys.mac);
        let iface = match self.interfaces.get_mut(&ifindex) {
            Some(i) => i,
            None => return,
        };
        let sendable = up && iface.has_up_adjacency();
        let queue = std::mem::take(&mut iface.flood_queue);
        let mut sent = 0;
        for lsp in queue {
            if sendable && self.lsdb.is_current(&lsp) {
                let frame = Frame { dst: MacAddr::BROADCAST, src: mac, payload: lsp.raw().to_vec() };
                ctx.queue.transmit(ctx.device, ifindex, frame);
                self.stats.lsp_tx += 1;
                sent += 1;
            }
            self.release_flood_ref(&lsp);
        }
        if sent > 0 {
            trace!(target: "isis::flood", "{}: sent {} LSP(s) on {}", self.hostname, sent, ifindex);
        }
    }

    /// Drop everything queued on an interface
    pub(crate) fn drain_flood_queue(&mut self, ifindex: IfIndex) {
        let queue = match self.interfaces.get_mut(&ifindex) {
            Some(i) => std::mem::take(&mut i.flood_queue),
            None => return,
        };
        for lsp in queue {
            self.release_flood_ref(&lsp);
        }
    }

    fn release_flood_ref(&mut self, lsp: &Lsp) {
        if lsp.flood_unref() == 0 {
            self.stats.flood_complete += 1;
            trace!(target: "isis::flood", "{}: flooding of {} seq {} complete", self.hostname, lsp.id(), lsp.seq());
        }
    }

    /// Queue the whole database on an interface, for a neighbor that just came up.
    pub(crate) fn sync_database(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex) {
        let lsps: Vec<Rc<Lsp>> = self.lsdb.iter().map(|(_, e)| e.lsp().clone()).collect();
        debug!(target: "isis::flood", "{}: synchronizing {} LSP(s) on {}", self.hostname, lsps.len(), ifindex);
        for lsp in lsps {
            self.queue_for_flood(ctx, ifindex, lsp);
        }
    }
}
