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

//! # Traffic Engineering Database
//!
//! The TED is the graph view of the link-state database. Nodes are systems (routers and
//! pseudonodes), edges are directed half-links advertised by their source, and every node stores
//! the prefixes it advertises. Every fact remembers the fragment it came from, such that a new
//! version of a fragment replaces exactly the facts of the old version.

use crate::isis::lsp::Lsp;
use crate::isis::packet::{PrefixFlags, Tlv};
use crate::isis::spf::SpfData;
use crate::netsim::{Cost, IfIndex, LspId, Prefix, SystemId};
use log::*;
use petgraph::prelude::*;
use petgraph::stable_graph::StableGraph;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;

/// Graph of the TED
pub type TedGraph = StableGraph<TedNode, TedLink, Directed, u32>;

/// Prefix advertised by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TedPrefix {
    /// Metric from the advertising node to the prefix
    pub metric: Cost,
    /// Flags of the advertisement
    pub flags: PrefixFlags,
}

/// A system in the TED
#[derive(Debug, Clone)]
pub struct TedNode {
    system: SystemId,
    hostname: Option<String>,
    overloaded: bool,
    fragments: BTreeSet<u8>,
    prefixes: BTreeMap<(Prefix, u8), TedPrefix>,
    pub(crate) spf: SpfData,
}

impl TedNode {
    fn new(system: SystemId) -> Self {
        Self {
            system,
            hostname: None,
            overloaded: false,
            fragments: BTreeSet::new(),
            prefixes: BTreeMap::new(),
            spf: SpfData::default(),
        }
    }

    /// System id of the node
    pub fn system(&self) -> SystemId {
        self.system
    }

    /// Hostname, as advertised in fragment 0
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Returns `true` if the node is overloaded
    pub fn is_overloaded(&self) -> bool {
        self.overloaded
    }

    /// Fragments of the node that are present in the LSDB
    pub fn fragments(&self) -> &BTreeSet<u8> {
        &self.fragments
    }

    /// Advertised prefixes, together with the fragment they were advertised in
    pub fn prefixes(&self) -> impl Iterator<Item = (Prefix, u8, &TedPrefix)> {
        self.prefixes.iter().map(|((p, f), tp)| (*p, *f, tp))
    }
}

/// A directed half-link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TedLink {
    /// Cost of the half-link
    pub cost: Cost,
    /// Fragment of the source that advertises it
    pub fragment: u8,
    /// Interface index on the source
    pub local_if: Option<IfIndex>,
    /// Interface index on the target
    pub remote_if: Option<IfIndex>,
    /// Address of the source on the link
    pub local_ip: Option<Ipv4Addr>,
    /// Address of the target on the link
    pub remote_ip: Option<Ipv4Addr>,
}

/// The traffic engineering database of one protocol instance
#[derive(Debug, Clone, Default)]
pub struct Ted {
    pub(crate) graph: TedGraph,
    index: HashMap<SystemId, NodeIndex>,
}

impl Ted {
    /// Create an empty TED
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a node
    pub fn node(&self, system: SystemId) -> Option<&TedNode> {
        self.index.get(&system).map(|ix| &self.graph[*ix])
    }

    pub(crate) fn node_index(&self, system: SystemId) -> Option<NodeIndex> {
        self.index.get(&system).copied()
    }

    /// Iterate over all nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &TedNode> {
        self.graph.node_indices().map(move |ix| &self.graph[ix])
    }

    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of half-links
    pub fn num_links(&self) -> usize {
        self.graph.edge_count()
    }

    /// All half-links from `a` to `b`
    pub fn links(&self, a: SystemId, b: SystemId) -> Vec<&TedLink> {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(a), Some(b)) => {
                self.edges_between(*a, *b).map(|e| e.weight()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// All outgoing half-links of a node, together with their target
    pub fn out_links(&self, a: SystemId) -> Vec<(SystemId, &TedLink)> {
        match self.index.get(&a) {
            Some(ix) => self
                .graph
                .edges_directed(*ix, Outgoing)
                .map(|e| (self.graph[e.target()].system, e.weight()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns the reverse half-link of `e`, if it exists. When both halves carry interface
    /// indices, they must describe the same link.
    pub(crate) fn reverse_link(&self, e: EdgeIndex) -> Option<EdgeIndex> {
        let (a, b) = self.graph.edge_endpoints(e)?;
        let link = &self.graph[e];
        self.edges_between(b, a)
            .find(|r| {
                let rev = r.weight();
                match (link.local_if, link.remote_if, rev.local_if, rev.remote_if) {
                    (Some(l), Some(r_if), Some(rl), Some(rr)) if r_if.0 != 0 && rr.0 != 0 => {
                        l == rr && r_if == rl
                    }
                    _ => true,
                }
            })
            .map(|r| r.id())
    }

    /// Returns `true` if there is a usable (bidirectional) link between `a` and `b`.
    pub fn is_bidirectional(&self, a: SystemId, b: SystemId) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(a), Some(b)) => self
                .edges_between(*a, *b)
                .any(|e| self.reverse_link(e.id()).is_some()),
            _ => false,
        }
    }

    fn edges_between(
        &self,
        a: NodeIndex,
        b: NodeIndex,
    ) -> impl Iterator<Item = petgraph::stable_graph::EdgeReference<'_, TedLink>> {
        self.graph.edges_directed(a, Outgoing).filter(move |e| e.target() == b)
    }

    fn get_or_insert(&mut self, system: SystemId) -> NodeIndex {
        if let Some(ix) = self.index.get(&system) {
            return *ix;
        }
        let ix = self.graph.add_node(TedNode::new(system));
        self.index.insert(system, ix);
        trace!(target: "isis::lsdb", "TED: new node {}", system);
        ix
    }

    /// Replace the facts of a fragment with the content of the LSP. Purges only remove facts.
    pub fn update(&mut self, lsp: &Lsp) {
        let id = lsp.id();
        self.detach_fragment(id);
        if lsp.is_purge() {
            return;
        }
        let ix = self.get_or_insert(id.system);
        let node = &mut self.graph[ix];
        node.fragments.insert(id.fragment);
        if id.fragment == 0 {
            node.overloaded = lsp.is_overloaded();
            node.hostname = lsp.hostname().map(String::from);
        }
        for tlv in lsp.tlvs() {
            match tlv {
                Tlv::IsReach(r) => {
                    if r.neighbor == id.system {
                        continue;
                    }
                    let target = self.get_or_insert(r.neighbor);
                    let (local_if, remote_if) = match r.link_ids() {
                        Some((l, r)) => (Some(l), Some(r)),
                        None => (None, None),
                    };
                    self.graph.add_edge(
                        ix,
                        target,
                        TedLink {
                            cost: r.metric,
                            fragment: id.fragment,
                            local_if,
                            remote_if,
                            local_ip: r.local_ip(),
                            remote_ip: r.remote_ip(),
                        },
                    );
                }
                Tlv::IpReach(r) => {
                    self.graph[ix]
                        .prefixes
                        .insert((r.prefix, id.fragment), TedPrefix { metric: r.metric, flags: r.flags });
                }
                _ => {}
            }
        }
    }

    /// Remove all facts of a fragment
    pub fn detach_fragment(&mut self, id: LspId) {
        let ix = match self.index.get(&id.system) {
            Some(ix) => *ix,
            None => return,
        };
        let node = &mut self.graph[ix];
        node.fragments.remove(&id.fragment);
        node.prefixes.retain(|(_, f), _| *f != id.fragment);
        if id.fragment == 0 {
            node.overloaded = false;
            node.hostname = None;
        }
        let edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(ix, Outgoing)
            .filter(|e| e.weight().fragment == id.fragment)
            .map(|e| (e.id(), e.target()))
            .collect();
        for (e, target) in edges {
            self.graph.remove_edge(e);
            self.collect(target);
        }
        self.collect(ix);
    }

    /// Remove the node if nothing refers to it anymore
    fn collect(&mut self, ix: NodeIndex) {
        let unused = match self.graph.node_weight(ix) {
            Some(node) => {
                node.fragments.is_empty()
                    && self.graph.edges_directed(ix, Incoming).next().is_none()
            }
            None => false,
        };
        if unused {
            assert!(
                self.graph.edges_directed(ix, Outgoing).next().is_none(),
                "removing a TED node with live links"
            );
            if let Some(node) = self.graph.remove_node(ix) {
                self.index.remove(&node.system);
                trace!(target: "isis::lsdb", "TED: removed node {}", node.system);
            }
        }
    }
}
