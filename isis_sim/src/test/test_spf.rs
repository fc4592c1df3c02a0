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

//! Test the TED and the SPF computation on hand-made LSPs.

use crate::isis::lsp::Lsp;
use crate::isis::packet::{IpReach, IsReach, LspFlags, LspPdu, PrefixFlags, SubTlv, Tlv};
use crate::isis::spf::SpfResult;
use crate::isis::ted::Ted;
use crate::netsim::{Cost, IfIndex, LspId, Prefix, RouterId, SystemId};
use maplit::{btreemap, btreeset};
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

fn rid(n: u8) -> RouterId {
    Ipv4Addr::new(n, n, n, n).into()
}

fn sys(n: u8) -> SystemId {
    SystemId::router(rid(n))
}

/// Address of router `x` on the link between `a` and `b`
fn link_ip(a: u8, b: u8, x: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, a.min(b), a.max(b), x)
}

/// Builds the LSPs of a set of routers, one fragment each.
#[derive(Default)]
struct TopoBuilder {
    tlvs: BTreeMap<u8, Vec<Tlv>>,
    next_if: BTreeMap<u8, u32>,
    pseudonodes: BTreeMap<(u8, u8), Vec<Tlv>>,
}

impl TopoBuilder {
    fn ifindex(&mut self, r: u8) -> IfIndex {
        let i = self.next_if.entry(r).or_insert(0);
        *i += 1;
        IfIndex(*i)
    }

    fn router(&mut self, r: u8) -> &mut Self {
        self.tlvs.entry(r).or_default();
        self
    }

    /// Point to point link, advertised by both sides
    fn link(&mut self, a: u8, b: u8, cost_ab: Cost, cost_ba: Cost) -> &mut Self {
        self.half_link(a, b, cost_ab);
        self.half_link(b, a, cost_ba);
        self
    }

    /// Advertise the half-link `a -> b` only. Interface indices are derived from the pair, such
    /// that both halves agree.
    fn half_link(&mut self, a: u8, b: u8, cost: Cost) -> &mut Self {
        let local = IfIndex(a as u32 * 256 + b as u32);
        let remote = IfIndex(b as u32 * 256 + a as u32);
        self.tlvs.entry(a).or_default().push(Tlv::IsReach(IsReach {
            neighbor: sys(b),
            metric: cost,
            sub_tlvs: vec![
                SubTlv::LinkIds { local, remote },
                SubTlv::LocalIp(link_ip(a, b, a)),
                SubTlv::RemoteIp(link_ip(a, b, b)),
            ],
        }));
        self.tlvs.entry(b).or_default();
        self
    }

    /// Attach router `r` to the pseudonode `pn` of router `dis`
    fn lan(&mut self, dis: u8, pn: u8, r: u8, cost: Cost) -> &mut Self {
        let ifindex = self.ifindex(r);
        self.tlvs.entry(r).or_default().push(Tlv::IsReach(IsReach {
            neighbor: SystemId::pseudonode(rid(dis), pn),
            metric: cost,
            sub_tlvs: vec![
                SubTlv::LinkIds { local: ifindex, remote: IfIndex(0) },
                SubTlv::LocalIp(Ipv4Addr::new(192, 168, pn, r)),
            ],
        }));
        self.pseudonodes.entry((dis, pn)).or_default().push(Tlv::IsReach(IsReach {
            neighbor: sys(r),
            metric: 0,
            sub_tlvs: vec![],
        }));
        self
    }

    fn lsps(&self, overloaded: &[u8]) -> Vec<Lsp> {
        let mut lsps = Vec::new();
        for (r, tlvs) in self.tlvs.iter() {
            let mut body = vec![
                Tlv::Hostname(format!("r{}", r)),
                Tlv::IpReach(IpReach {
                    prefix: Prefix::host(rid(*r).to_ipv4()),
                    metric: 0,
                    flags: PrefixFlags::empty(),
                }),
            ];
            body.extend(tlvs.iter().cloned());
            let flags =
                if overloaded.contains(r) { LspFlags::OVERLOAD } else { LspFlags::empty() };
            lsps.push(Lsp::new(LspPdu {
                id: LspId::new(rid(*r), 0, 0),
                seq: 1,
                flags,
                lifetime: 1200,
                tlvs: body,
            }));
        }
        for ((dis, pn), tlvs) in self.pseudonodes.iter() {
            lsps.push(Lsp::new(LspPdu {
                id: LspId::new(rid(*dis), *pn, 0),
                seq: 1,
                flags: LspFlags::empty(),
                lifetime: 1200,
                tlvs: tlvs.clone(),
            }));
        }
        lsps
    }

    fn build(&self, overloaded: &[u8]) -> Ted {
        let mut ted = Ted::new();
        for lsp in self.lsps(overloaded) {
            ted.update(&lsp);
        }
        ted
    }
}

fn cost_of(results: &[SpfResult], s: SystemId) -> Option<Cost> {
    results.iter().find(|r| r.system == s).map(|r| r.cost)
}

fn neighbors_of(results: &[SpfResult], s: SystemId) -> BTreeSet<RouterId> {
    results
        .iter()
        .find(|r| r.system == s)
        .map(|r| r.next_hops.iter().map(|nh| nh.neighbor).collect())
        .unwrap_or_default()
}

/// # Test network
///
/// ```text
///       1     1
///   r1 --- r2 --- r4
///    |             |
///  2 |             | 2
///    |             |
///   r3 ----------- +
/// ```
fn diamond() -> TopoBuilder {
    let mut t = TopoBuilder::default();
    t.link(1, 2, 1, 1).link(2, 4, 1, 1).link(1, 3, 2, 2).link(3, 4, 2, 2);
    t
}

#[test]
fn test_line() {
    let mut t = TopoBuilder::default();
    t.link(1, 2, 10, 10).link(2, 3, 5, 5);
    let mut ted = t.build(&[]);
    let results = ted.compute_spf(sys(1));

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].system, sys(1));
    assert_eq!(results[0].cost, 0);
    assert!(results[0].next_hops.is_empty());
    assert_eq!(cost_of(&results, sys(2)), Some(10));
    assert_eq!(cost_of(&results, sys(3)), Some(15));
    assert_eq!(results[2].hostname.as_deref(), Some("r3"));

    let nh = results[2].next_hops.iter().next().unwrap();
    assert_eq!(nh.neighbor, rid(2));
    assert_eq!(nh.gateway, link_ip(1, 2, 2));
    assert_eq!(nh.ifindex, IfIndex(256 + 2));
}

#[test]
fn test_asymmetric_cost() {
    let mut t = TopoBuilder::default();
    t.link(1, 2, 10, 1);
    let mut ted = t.build(&[]);
    assert_eq!(cost_of(&ted.compute_spf(sys(1)), sys(2)), Some(10));
    assert_eq!(cost_of(&ted.compute_spf(sys(2)), sys(1)), Some(1));
}

#[test]
fn test_ecmp() {
    let mut t = TopoBuilder::default();
    t.link(1, 2, 1, 1).link(2, 4, 1, 1).link(1, 3, 1, 1).link(3, 4, 1, 1);
    let mut ted = t.build(&[]);
    let results = ted.compute_spf(sys(1));
    assert_eq!(cost_of(&results, sys(4)), Some(2));
    assert_eq!(neighbors_of(&results, sys(4)), btreeset! {rid(2), rid(3)});
    assert_eq!(neighbors_of(&results, sys(2)), btreeset! {rid(2)});
}

#[test]
fn test_one_sided_link_is_ignored() {
    let mut t = TopoBuilder::default();
    t.link(1, 2, 1, 1).half_link(2, 3, 1);
    let mut ted = t.build(&[]);
    assert!(!ted.is_bidirectional(sys(2), sys(3)));
    assert!(ted.is_bidirectional(sys(1), sys(2)));
    let results = ted.compute_spf(sys(1));
    assert_eq!(cost_of(&results, sys(3)), None);
    assert_eq!(results.len(), 2);
}

#[test]
fn test_overload_is_not_transited() {
    let mut ted = diamond().build(&[2]);
    let results = ted.compute_spf(sys(1));
    // r2 itself is reachable, but r4 is reached over r3
    assert_eq!(cost_of(&results, sys(2)), Some(1));
    assert_eq!(cost_of(&results, sys(4)), Some(4));
    assert_eq!(neighbors_of(&results, sys(4)), btreeset! {rid(3)});

    // the root may be overloaded itself
    let mut ted = diamond().build(&[1]);
    let results = ted.compute_spf(sys(1));
    assert_eq!(cost_of(&results, sys(4)), Some(2));
}

#[test]
fn test_pseudonode() {
    let mut t = TopoBuilder::default();
    t.lan(2, 1, 1, 10).lan(2, 1, 2, 10).lan(2, 1, 3, 10).link(3, 4, 5, 5);
    let mut ted = t.build(&[]);
    let results = ted.compute_spf(sys(1));
    let pn = SystemId::pseudonode(rid(2), 1);

    assert_eq!(cost_of(&results, pn), Some(10));
    assert!(results.iter().find(|r| r.system == pn).unwrap().next_hops.is_empty());
    assert_eq!(cost_of(&results, sys(2)), Some(10));
    assert_eq!(cost_of(&results, sys(3)), Some(10));
    assert_eq!(cost_of(&results, sys(4)), Some(15));

    // the next hop is the address of the router on the LAN, not the pseudonode
    let nh = *results.iter().find(|r| r.system == sys(4)).unwrap().next_hops.iter().next().unwrap();
    assert_eq!(nh.neighbor, rid(3));
    assert_eq!(nh.gateway, Ipv4Addr::new(192, 168, 1, 3));
    assert_eq!(nh.ifindex, IfIndex(1));

    // seen from behind the LAN, the pseudonode is transparent
    let results = ted.compute_spf(sys(4));
    assert_eq!(cost_of(&results, sys(1)), Some(15));
    assert_eq!(neighbors_of(&results, sys(1)), btreeset! {rid(3)});
}

#[test]
fn test_unknown_root() {
    let mut ted = diamond().build(&[]);
    assert!(ted.compute_spf(sys(9)).is_empty());
}

#[test]
#[should_panic]
fn test_pseudonode_root() {
    let mut ted = diamond().build(&[]);
    ted.compute_spf(SystemId::pseudonode(rid(1), 1));
}

#[test]
fn test_ted_update_and_purge() {
    let t = diamond();
    let lsps = t.lsps(&[]);
    let mut ted = Ted::new();
    ted.update(&lsps[0]);
    // r1 and its two (still unknown) neighbors
    assert_eq!(ted.num_nodes(), 3);
    assert_eq!(ted.num_links(), 2);
    assert!(ted.node(sys(2)).unwrap().fragments().is_empty());

    let r1 = ted.node(sys(1)).unwrap();
    assert_eq!(r1.hostname(), Some("r1"));
    let prefixes: Vec<Prefix> = r1.prefixes().map(|(p, _, _)| p).collect();
    assert_eq!(prefixes, vec![Prefix::host(rid(1).to_ipv4())]);

    // a purge of the fragment removes r1, and with it the nodes nothing refers to anymore
    let purge = Lsp::new(LspPdu {
        id: LspId::new(rid(1), 0, 0),
        seq: 2,
        flags: LspFlags::PURGE,
        lifetime: 1200,
        tlvs: vec![],
    });
    ted.update(&purge);
    assert_eq!(ted.num_nodes(), 0);
    assert_eq!(ted.num_links(), 0);
}

#[test]
fn test_ted_fragment_replacement() {
    let mut ted = diamond().build(&[]);
    assert_eq!(ted.num_nodes(), 4);
    assert_eq!(ted.num_links(), 8);

    // a new version of r4 without its link to r3
    let lsp = Lsp::new(LspPdu {
        id: LspId::new(rid(4), 0, 0),
        seq: 2,
        flags: LspFlags::empty(),
        lifetime: 1200,
        tlvs: vec![Tlv::IsReach(IsReach {
            neighbor: sys(2),
            metric: 1,
            sub_tlvs: vec![
                SubTlv::LinkIds { local: IfIndex(4 * 256 + 2), remote: IfIndex(2 * 256 + 4) },
                SubTlv::LocalIp(link_ip(2, 4, 4)),
                SubTlv::RemoteIp(link_ip(2, 4, 2)),
            ],
        })],
    });
    ted.update(&lsp);
    assert_eq!(ted.num_links(), 7);
    assert!(!ted.is_bidirectional(sys(3), sys(4)));
    assert_eq!(ted.node(sys(4)).unwrap().hostname(), None);
    assert_eq!(ted.out_links(sys(4)).len(), 1);

    let results = ted.compute_spf(sys(3));
    assert_eq!(cost_of(&results, sys(4)), Some(4));
}

/// Compare SPF against Bellman-Ford on random graphs
#[test]
fn test_random_graphs() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let n: u8 = rng.gen_range(2, 9);
        let mut t = TopoBuilder::default();
        let mut costs: BTreeMap<(u8, u8), Cost> = btreemap! {};
        for a in 1..=n {
            t.router(a);
            for b in (a + 1)..=n {
                if rng.gen_bool(0.4) {
                    let ab = rng.gen_range(1, 6);
                    let ba = rng.gen_range(1, 6);
                    t.link(a, b, ab, ba);
                    costs.insert((a, b), ab);
                    costs.insert((b, a), ba);
                }
            }
        }
        let dist = bellman_ford(n, &costs);
        let mut ted = t.build(&[]);
        let results = ted.compute_spf(sys(1));

        for v in 1..=n {
            assert_eq!(cost_of(&results, sys(v)), dist[&(1, v)], "cost of r{} (n = {})", v, n);
            if v == 1 || dist[&(1, v)].is_none() {
                continue;
            }
            let d = dist[&(1, v)].unwrap();
            let expected: BTreeSet<RouterId> = costs
                .iter()
                .filter(|((a, _), _)| *a == 1)
                .filter(|((_, b), c)| dist[&(*b, v)].map(|x| x + **c) == Some(d))
                .map(|((_, b), _)| rid(*b))
                .collect();
            assert_eq!(neighbors_of(&results, sys(v)), expected, "next hops of r{}", v);
        }
    }
}

fn bellman_ford(n: u8, costs: &BTreeMap<(u8, u8), Cost>) -> BTreeMap<(u8, u8), Option<Cost>> {
    let mut dist = BTreeMap::new();
    for s in 1..=n {
        let mut d: BTreeMap<u8, Option<Cost>> = (1..=n).map(|v| (v, None)).collect();
        d.insert(s, Some(0));
        for _ in 0..n {
            for ((a, b), c) in costs.iter() {
                if let Some(da) = d[a] {
                    if d[b].map(|db| da + c < db).unwrap_or(true) {
                        d.insert(*b, Some(da + c));
                    }
                }
            }
        }
        for (v, x) in d {
            dist.insert((s, v), x);
        }
    }
    dist
}
