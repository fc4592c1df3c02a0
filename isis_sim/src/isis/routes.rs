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

//! Route installation from the SPF result.

use crate::isis::packet::PrefixFlags;
use crate::isis::{IsisInstance, RouterCtx};
use crate::netsim::route_map::{apply_route_maps, PolicyRoute};
use crate::rib::{NextHop, Protocol, Route};
use log::*;
use std::collections::BTreeSet;

impl IsisInstance {
    /// Run SPF over the TED and replace the routes of the protocol in the routing table. Every
    /// prefix advertised by a reachable router is a candidate at the cost of the path plus the
    /// advertised metric, subject to the import policy.
    pub(crate) fn run_spf(&mut self, ctx: &mut RouterCtx) {
        let root = self.system_id();
        let results = self.ted.compute_spf(root);
        self.stats.spf_runs += 1;

        ctx.rib.remove_protocol(Protocol::Isis);
        let mut installed = 0;
        for result in results.iter() {
            if result.system == root || result.system.is_pseudonode() || result.next_hops.is_empty()
            {
                continue;
            }
            let node = match self.ted.node(result.system) {
                Some(n) => n,
                None => continue,
            };
            let next_hops: BTreeSet<NextHop> = result
                .next_hops
                .iter()
                .map(|nh| NextHop { ifindex: nh.ifindex, gateway: Some(nh.gateway) })
                .collect();
            for (prefix, _, advertised) in node.prefixes() {
                let candidate = PolicyRoute {
                    prefix,
                    originator: result.system.rtr_id,
                    cost: result.cost.saturating_add(advertised.metric),
                    external: advertised.flags.contains(PrefixFlags::EXTERNAL),
                };
                let route = match apply_route_maps(&self.import_maps, candidate) {
                    Some(r) => r,
                    None => {
                        trace!(target: "isis::spf", "{}: import policy denies {} from {}", self.hostname, prefix, result.system);
                        continue;
                    }
                };
                ctx.rib.add_route(Route {
                    prefix: route.prefix,
                    protocol: Protocol::Isis,
                    cost: route.cost,
                    next_hops: next_hops.clone(),
                });
                installed += 1;
            }
        }
        debug!(
            target: "isis::spf",
            "{}: SPF run {}: {} systems, {} route candidates",
            self.hostname,
            self.stats.spf_runs,
            results.len(),
            installed
        );
        self.spf_results = results;
    }
}
