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

//! # Shortest path first
//!
//! Dijkstra over the TED, computing the cost and the set of equal-cost next hops for every
//! reachable system. A half-link is only used if its reverse half exists. Pseudonodes are
//! transparent hops: the next hop of a system behind a pseudonode that is directly attached to the
//! root is the address of that system on the LAN. Overloaded routers are reachable but never
//! transited.

use crate::isis::ted::{Ted, TedLink};
use crate::netsim::{Cost, IfIndex, RouterId, SystemId};
use log::*;
use petgraph::prelude::*;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::net::Ipv4Addr;

/// Next hop computed by SPF
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpfNextHop {
    /// Outgoing interface of the root
    pub ifindex: IfIndex,
    /// Address of the neighbor on that interface
    pub gateway: Ipv4Addr,
    /// Router id of the neighbor
    pub neighbor: RouterId,
}

/// Per-node working set of the SPF computation, reset before every run.
#[derive(Debug, Clone, Default)]
pub(crate) struct SpfData {
    cost: Option<Cost>,
    next_hops: BTreeSet<SpfNextHop>,
    processed: bool,
    /// interface of the root on the LAN, for pseudonodes directly attached to the root
    direct_if: Option<IfIndex>,
}

/// Result of the SPF computation for one system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfResult {
    /// The system
    pub system: SystemId,
    /// Hostname of the system, if known
    pub hostname: Option<String>,
    /// Cost from the root
    pub cost: Cost,
    /// Equal-cost next hops. Empty for the root and for pseudonodes attached to the root.
    pub next_hops: BTreeSet<SpfNextHop>,
}

impl Ted {
    /// Compute the shortest paths from `root`. The result contains every reachable system,
    /// including the root, ordered by cost and system id.
    ///
    /// # Panics
    /// Panics if the root is a pseudonode.
    pub fn compute_spf(&mut self, root: SystemId) -> Vec<SpfResult> {
        assert!(!root.is_pseudonode(), "SPF root must be a router");
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for ix in indices.iter() {
            self.graph[*ix].spf = SpfData::default();
        }
        let root_ix = match self.node_index(root) {
            Some(ix) => ix,
            None => return Vec::new(),
        };

        let mut results = Vec::new();
        let mut heap = BinaryHeap::new();
        self.graph[root_ix].spf.cost = Some(0);
        heap.push(Reverse((0, root_ix)));

        while let Some(Reverse((cost, u))) = heap.pop() {
            {
                let data = &self.graph[u].spf;
                if data.processed || data.cost != Some(cost) {
                    continue;
                }
            }
            self.graph[u].spf.processed = true;
            let node = &self.graph[u];
            results.push(SpfResult {
                system: node.system(),
                hostname: node.hostname().map(String::from),
                cost,
                next_hops: node.spf.next_hops.clone(),
            });
            if u != root_ix && node.is_overloaded() && !node.system().is_pseudonode() {
                trace!(target: "isis::spf", "not transiting overloaded {}", node.system());
                continue;
            }

            let edges: Vec<(EdgeIndex, NodeIndex)> =
                self.graph.edges_directed(u, Outgoing).map(|e| (e.id(), e.target())).collect();
            for (e, v) in edges {
                if v == root_ix || self.graph[v].spf.processed {
                    continue;
                }
                let reverse = match self.reverse_link(e) {
                    Some(r) => r,
                    None => continue,
                };
                let link = &self.graph[e];
                let new_cost = cost.saturating_add(link.cost);
                let (candidate, direct_if) =
                    self.candidate_next_hops(u, v, root_ix, link, &self.graph[reverse]);

                let data = &mut self.graph[v].spf;
                match data.cost {
                    Some(old) if new_cost > old => continue,
                    Some(old) if new_cost == old => {
                        data.next_hops.extend(candidate);
                        data.direct_if = data.direct_if.or(direct_if);
                    }
                    _ => {
                        data.cost = Some(new_cost);
                        data.next_hops = candidate;
                        data.direct_if = direct_if;
                        heap.push(Reverse((new_cost, v)));
                    }
                }
            }
        }

        results.sort_by_key(|r| (r.cost, r.system));
        debug!(target: "isis::spf", "SPF from {}: {} systems reachable", root, results.len());
        results
    }

    /// Next hops of `v` when reached over the half-link `u -> v`.
    fn candidate_next_hops(
        &self,
        u: NodeIndex,
        v: NodeIndex,
        root: NodeIndex,
        link: &TedLink,
        reverse: &TedLink,
    ) -> (BTreeSet<SpfNextHop>, Option<IfIndex>) {
        let v_system = self.graph[v].system();
        let u_data = &self.graph[u].spf;
        if u == root {
            if v_system.is_pseudonode() {
                return (BTreeSet::new(), link.local_if);
            }
            let mut next_hops = BTreeSet::new();
            if let (Some(ifindex), Some(gateway)) = (link.local_if, link.remote_ip) {
                next_hops.insert(SpfNextHop { ifindex, gateway, neighbor: v_system.rtr_id });
            }
            return (next_hops, None);
        }
        let mut next_hops = u_data.next_hops.clone();
        if let (Some(ifindex), Some(gateway)) = (u_data.direct_if, reverse.local_ip) {
            next_hops.insert(SpfNextHop { ifindex, gateway, neighbor: v_system.rtr_id });
        }
        (next_hops, None)
    }
}
