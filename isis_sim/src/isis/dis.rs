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

//! # DIS election
//!
//! On a LAN segment, one router (the DIS) represents the segment as a pseudonode. Every router
//! advertises a link to the pseudonode, and the DIS additionally advertises, on behalf of the
//! pseudonode, a link back to every router with an up adjacency (and to itself). The pseudonode
//! links have metric 0.
//!
//! The router with the highest `(priority, router-id)` among itself and its up neighbors wins.
//! A router that wins allocates a pseudonode id; a router that loses learns the pseudonode from
//! the LAN-ID in the Hellos of the winner.

use crate::isis::adjacency::AdjState;
use crate::isis::packet::{IsReach, SubTlv};
use crate::isis::{AdvtData, IsisInstance, RouterCtx};
use crate::netsim::router::InterfaceKind;
use crate::netsim::{IfIndex, SystemId};
use log::*;

enum Winner {
    Myself,
    Neighbor(Option<SystemId>),
    Nobody,
}

impl IsisInstance {
    /// Elect the DIS of a LAN interface and update the advertisements. Returns `true` if the
    /// pseudonode of the segment changed. Repeating the election without any change of its
    /// inputs does nothing.
    pub(crate) fn reelect_dis(&mut self, ctx: &mut RouterCtx, ifindex: IfIndex) -> bool {
        let up = ctx.is_up(ifindex);
        let iface = match self.interfaces.get(&ifindex) {
            Some(i) if i.kind == InterfaceKind::Lan => i,
            _ => return false,
        };
        let best = iface
            .adjacencies
            .values()
            .filter(|a| a.state() == AdjState::Up)
            .max_by_key(|a| (a.priority(), a.neighbor()));
        let winner = match best {
            _ if !up => Winner::Nobody,
            None => Winner::Myself,
            Some(b) if (iface.priority, self.rtr_id) > (b.priority(), b.neighbor()) => {
                Winner::Myself
            }
            Some(b) => Winner::Neighbor(
                b.lan_id().filter(|l| l.rtr_id == b.neighbor() && l.is_pseudonode()),
            ),
        };
        let old = iface.dis;
        let own_pn = iface.own_pn;

        let (new_dis, new_pn) = match winner {
            Winner::Myself => match own_pn {
                Some(pn) => (Some(SystemId::pseudonode(self.rtr_id, pn)), Some(pn)),
                None => match self.alloc_pn_id() {
                    Some(pn) => (Some(SystemId::pseudonode(self.rtr_id, pn)), Some(pn)),
                    None => {
                        self.stats.pn_exhausted += 1;
                        warn!(target: "isis::dis", "{}: no pseudonode id left for {}", self.hostname, ifindex);
                        (None, None)
                    }
                },
            },
            Winner::Neighbor(lan_id) => (lan_id, None),
            Winner::Nobody => (None, None),
        };

        if new_dis == old {
            self.sync_pseudonode(ifindex);
            return false;
        }
        info!(
            target: "isis::dis",
            "{}: DIS on {} changed from {} to {}",
            self.hostname,
            ifindex,
            old.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
            new_dis.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
        );
        self.resign_dis(ifindex);
        self.assign_new_dis(ctx, ifindex, new_dis, new_pn);
        // announce the new LAN-ID right away
        self.send_hello(ctx, ifindex);
        true
    }

    /// Withdraw everything advertised for the pseudonode of the segment, and release our
    /// pseudonode id if we were DIS.
    pub(crate) fn resign_dis(&mut self, ifindex: IfIndex) {
        let iface = match self.interfaces.get_mut(&ifindex) {
            Some(i) => i,
            None => return,
        };
        let mut data = vec![iface.lan_reach.take(), iface.pn_self.take()];
        data.extend(iface.adjacencies.values_mut().map(|a| a.pn_datum.take()));
        let own_pn = iface.own_pn.take();
        if let Some(dis) = iface.dis.take() {
            debug!(target: "isis::dis", "{}: leaving pseudonode {} on {}", self.hostname, dis, ifindex);
        }
        for id in data.into_iter().flatten() {
            self.advt.withdraw(id);
        }
        if let Some(pn) = own_pn {
            self.free_pn_id(pn);
        }
    }

    /// Advertise the link to the new pseudonode, and as DIS, the pseudonode itself.
    pub(crate) fn assign_new_dis(
        &mut self,
        ctx: &mut RouterCtx,
        ifindex: IfIndex,
        dis: Option<SystemId>,
        own_pn: Option<u8>,
    ) {
        let dis = match dis {
            Some(d) => d,
            None => return,
        };
        let addr = match ctx.interfaces.get(&ifindex) {
            Some(p) => p.addr,
            None => return,
        };
        let cost = match self.interfaces.get_mut(&ifindex) {
            Some(i) => {
                i.dis = Some(dis);
                i.own_pn = own_pn;
                i.cost
            }
            None => return,
        };
        let reach = IsReach {
            neighbor: dis,
            metric: cost,
            sub_tlvs: vec![
                SubTlv::LinkIds { local: ifindex, remote: IfIndex(0) },
                SubTlv::LocalIp(addr),
            ],
        };
        let lan_reach = self.advt.advertise(AdvtData::IsReach(reach), 0);
        let system = self.system_id();
        let pn_self = own_pn.map(|pn| {
            let reach = IsReach { neighbor: system, metric: 0, sub_tlvs: Vec::new() };
            self.advt.advertise(AdvtData::IsReach(reach), pn)
        });
        if let Some(i) = self.interfaces.get_mut(&ifindex) {
            i.lan_reach = Some(lan_reach);
            i.pn_self = pn_self;
        }
        if own_pn.is_some() {
            info!(target: "isis::dis", "{}: elected DIS on {} as {}", self.hostname, ifindex, dis);
        }
        self.sync_pseudonode(ifindex);
    }

    /// As DIS, make sure the pseudonode advertises exactly the up neighbors of the segment.
    fn sync_pseudonode(&mut self, ifindex: IfIndex) {
        let iface = match self.interfaces.get_mut(&ifindex) {
            Some(i) => i,
            None => return,
        };
        let pn = iface.own_pn;
        let mut add = Vec::new();
        let mut remove = Vec::new();
        for (nbr, adj) in iface.adjacencies.iter_mut() {
            let wanted = pn.is_some() && adj.state() == AdjState::Up;
            match (wanted, adj.pn_datum.is_some()) {
                (true, false) => add.push(*nbr),
                (false, true) => remove.extend(adj.pn_datum.take()),
                _ => {}
            }
        }
        for id in remove {
            self.advt.withdraw(id);
        }
        let pn = match pn {
            Some(pn) => pn,
            None => return,
        };
        for nbr in add {
            let reach =
                IsReach { neighbor: SystemId::router(nbr), metric: 0, sub_tlvs: Vec::new() };
            let id = self.advt.advertise(AdvtData::IsReach(reach), pn);
            if let Some(adj) =
                self.interfaces.get_mut(&ifindex).and_then(|i| i.adjacencies.get_mut(&nbr))
            {
                adj.pn_datum = Some(id);
            }
            trace!(target: "isis::dis", "{}: pseudonode {} reaches {}", self.hostname, pn, nbr);
        }
    }
}
