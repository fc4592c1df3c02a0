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

//! # Advertisement (fragmentation) manager
//!
//! Every routing fact a router advertises (adjacencies, prefixes, its hostname, opaque data) is a
//! *datum*. Data are packed into fragments of bounded size, one set of fragments per pseudonode
//! (pseudonode `0` is the router itself). Each fragment is regenerated into one LSP.
//!
//! Placement is best-fit: a datum goes into the fragment with the least free space that still
//! fits it. Fragments of a pseudonode are kept ordered by ascending fill, and ties are resolved by
//! that order. If no fragment fits, a new one is allocated, up to `max_fragments` per pseudonode.
//! If that fails as well, the datum is put on a wait-list and the manager enters *dynamic
//! overload*, which is advertised in fragment `(0, 0)`. Withdrawing data retries the wait-list in
//! FIFO order, and dynamic overload clears once the wait-list is empty.
//!
//! The hostname is compulsory in fragment `(0, 0)`. If it does not fit, relocatable data
//! (reachability) is evicted from that fragment into other fragments.
//!
//! Fragment `(0, 0)` always exists. Any other fragment that becomes empty is purged: it is
//! regenerated one last time with the purge flag and then forgotten. The last sequence number of
//! every fragment is remembered, such that a fragment re-created later continues above it.

use crate::isis::lsp::Lsp;
use crate::isis::packet::{IpReach, IsReach, LspFlags, LspPdu, Tlv, LSP_HEADER_LEN};
use crate::netsim::{LspId, RouterId};
use log::*;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Identifier of an advertised datum. Identifiers are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatumId(u64);

/// Content of an advertised datum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvtData {
    /// Hostname of the router, compulsory in fragment `(0, 0)`
    Hostname(String),
    /// Neighbor reachability
    IsReach(IsReach),
    /// Prefix reachability
    IpReach(IpReach),
    /// Opaque TLV
    Opaque {
        /// TLV type code
        tlv_type: u8,
        /// Raw value
        value: Vec<u8>,
    },
}

impl AdvtData {
    /// TLV representation of the datum
    pub fn to_tlv(&self) -> Tlv {
        match self {
            AdvtData::Hostname(h) => Tlv::Hostname(h.clone()),
            AdvtData::IsReach(r) => Tlv::IsReach(r.clone()),
            AdvtData::IpReach(r) => Tlv::IpReach(r.clone()),
            AdvtData::Opaque { tlv_type, value } => {
                Tlv::Opaque { tlv_type: *tlv_type, value: value.clone() }
            }
        }
    }

    /// Size of the datum on the wire
    pub fn size(&self) -> usize {
        self.to_tlv().len()
    }

    /// Reachability data may be moved to another fragment to make room for compulsory data.
    pub fn is_relocatable(&self) -> bool {
        matches!(self, AdvtData::IsReach(_) | AdvtData::IpReach(_))
    }

    fn is_compulsory(&self) -> bool {
        matches!(self, AdvtData::Hostname(_))
    }

    /// TLV section of the LSP: other TLVs, then neighbor reachability, then prefix reachability
    fn section(&self) -> u8 {
        match self {
            AdvtData::Hostname(_) | AdvtData::Opaque { .. } => 0,
            AdvtData::IsReach(_) => 1,
            AdvtData::IpReach(_) => 2,
        }
    }
}

#[derive(Debug, Clone)]
struct AdvtDatum {
    data: AdvtData,
    size: usize,
    pn_id: u8,
    fragment: Option<u8>,
}

/// A fragment: a bounded container of data, regenerated into one LSP.
#[derive(Debug)]
pub struct Fragment {
    pn_id: u8,
    number: u8,
    data: Vec<DatumId>,
    bytes_filled: usize,
    seq: u32,
    dirty: bool,
    lsp: Option<Rc<Lsp>>,
}

impl Fragment {
    fn new(pn_id: u8, number: u8) -> Self {
        Self {
            pn_id,
            number,
            data: Vec::new(),
            bytes_filled: LSP_HEADER_LEN,
            seq: 0,
            dirty: true,
            lsp: None,
        }
    }

    /// Pseudonode id
    pub fn pn_id(&self) -> u8 {
        self.pn_id
    }

    /// Fragment number
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Bound data, in the order in which they were bound
    pub fn data(&self) -> &[DatumId] {
        &self.data
    }

    /// Bytes used, including the LSP header
    pub fn bytes_filled(&self) -> usize {
        self.bytes_filled
    }

    /// Sequence number of the last regeneration
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Returns `true` if the fragment changed since its last regeneration
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Last regenerated LSP
    pub fn lsp(&self) -> Option<&Rc<Lsp>> {
        self.lsp.as_ref()
    }
}

#[derive(Debug, Default)]
struct PseudonodeDb {
    fragments: BTreeMap<u8, Fragment>,
    /// fragment numbers, ordered by ascending fill (stable on ties)
    order: Vec<u8>,
}

impl PseudonodeDb {
    fn reorder(&mut self, number: u8) {
        let PseudonodeDb { fragments, order } = self;
        order.retain(|f| *f != number);
        if let Some(frag) = fragments.get(&number) {
            let fill = frag.bytes_filled;
            let pos = order.partition_point(|f| fragments[f].bytes_filled <= fill);
            order.insert(pos, number);
        }
    }
}

/// Parameters needed to regenerate fragments into LSPs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LspParams {
    /// Router id of the originator
    pub rtr_id: RouterId,
    /// Administrative overload
    pub overload: bool,
    /// Remaining lifetime in seconds
    pub lifetime: u16,
    /// Set the on-demand flag
    pub on_demand: bool,
}

/// The advertisement manager of one protocol instance
#[derive(Debug)]
pub struct AdvtManager {
    capacity: usize,
    max_fragments: usize,
    data: BTreeMap<DatumId, AdvtDatum>,
    next_id: u64,
    pseudonodes: BTreeMap<u8, PseudonodeDb>,
    wait_list: VecDeque<DatumId>,
    dyn_overload: bool,
    seq_floor: BTreeMap<(u8, u8), u32>,
    purges: Vec<(u8, u8)>,
}

impl AdvtManager {
    /// Create an empty manager. Fragment `(0, 0)` is created right away.
    pub fn new(capacity: usize, max_fragments: usize) -> Self {
        assert!(capacity > LSP_HEADER_LEN, "fragment capacity too small");
        assert!((1..=256).contains(&max_fragments), "invalid number of fragments");
        let mut m = Self {
            capacity,
            max_fragments,
            data: BTreeMap::new(),
            next_id: 0,
            pseudonodes: BTreeMap::new(),
            wait_list: VecDeque::new(),
            dyn_overload: false,
            seq_floor: BTreeMap::new(),
            purges: Vec::new(),
        };
        m.create_fragment(0, 0);
        m
    }

    /// Advertise a datum in the fragments of pseudonode `pn_id`. If it does not fit anywhere, it
    /// is wait-listed.
    ///
    /// # Panics
    /// Panics if the datum is larger than an empty fragment, or if compulsory data is advertised
    /// for a pseudonode.
    pub fn advertise(&mut self, data: AdvtData, pn_id: u8) -> DatumId {
        let size = data.size();
        assert!(LSP_HEADER_LEN + size <= self.capacity, "datum does not fit into any fragment");
        assert!(!data.is_compulsory() || pn_id == 0, "compulsory data belongs to pseudonode 0");
        let id = DatumId(self.next_id);
        self.next_id += 1;
        self.data.insert(id, AdvtDatum { data, size, pn_id, fragment: None });
        if !self.place(id) {
            debug!(target: "isis::advt", "no space for datum {:?} ({} bytes), wait-listed", id, size);
            self.wait_list.push_back(id);
            self.set_dyn_overload(true);
        }
        id
    }

    /// Withdraw a datum. An emptied fragment other than `(0, 0)` is purged. Afterwards, the
    /// wait-list is retried.
    ///
    /// # Panics
    /// Panics if the datum is unknown.
    pub fn withdraw(&mut self, id: DatumId) {
        let location = match self.data.get(&id) {
            Some(d) => d.fragment.map(|f| (d.pn_id, f)),
            None => panic!("withdrawing unknown datum {:?}", id),
        };
        match location {
            Some((pn_id, number)) => {
                self.unbind(id);
                self.release_if_empty(pn_id, number);
            }
            None => {
                let before = self.wait_list.len();
                self.wait_list.retain(|d| *d != id);
                assert_eq!(before, self.wait_list.len() + 1, "datum neither bound nor waiting");
            }
        }
        self.data.remove(&id);
        self.drain_wait_list();
    }

    /// Replace the content of a datum. The datum keeps its pseudonode but may change fragment.
    /// Returns the id of the new datum.
    pub fn replace(&mut self, id: DatumId, data: AdvtData) -> DatumId {
        let pn_id = match self.data.get(&id) {
            Some(d) => d.pn_id,
            None => panic!("replacing unknown datum {:?}", id),
        };
        self.withdraw(id);
        self.advertise(data, pn_id)
    }

    fn place(&mut self, id: DatumId) -> bool {
        let (pn_id, size, compulsory) = match self.data.get(&id) {
            Some(d) => (d.pn_id, d.size, d.data.is_compulsory()),
            None => return false,
        };
        if compulsory {
            return self.place_compulsory(id, pn_id, size);
        }
        if let Some(number) = self.best_fit(pn_id, size, None) {
            self.bind(id, number);
            return true;
        }
        match self.free_fragment_number(pn_id) {
            Some(number) => {
                self.create_fragment(pn_id, number);
                self.bind(id, number);
                true
            }
            None => false,
        }
    }

    fn place_compulsory(&mut self, id: DatumId, pn_id: u8, size: usize) -> bool {
        if self.fragment(pn_id, 0).is_none() {
            self.create_fragment(pn_id, 0);
        }
        loop {
            let frag = &self.pseudonodes[&pn_id].fragments[&0];
            if self.capacity - frag.bytes_filled >= size {
                self.bind(id, 0);
                return true;
            }
            let victim = frag.data.iter().rev().copied().find(|d| self.data[d].data.is_relocatable());
            let victim = match victim {
                Some(v) => v,
                None => return false,
            };
            let victim_size = self.data[&victim].size;
            self.unbind(victim);
            debug!(target: "isis::advt", "evicting datum {:?} from fragment 0", victim);
            let target = match self.best_fit(pn_id, victim_size, Some(0)) {
                Some(number) => Some(number),
                None => self.free_fragment_number(pn_id).map(|number| {
                    self.create_fragment(pn_id, number);
                    number
                }),
            };
            match target {
                Some(number) => self.bind(victim, number),
                None => {
                    self.wait_list.push_front(victim);
                    self.set_dyn_overload(true);
                }
            }
        }
    }

    fn best_fit(&self, pn_id: u8, size: usize, exclude: Option<u8>) -> Option<u8> {
        let db = self.pseudonodes.get(&pn_id)?;
        db.order
            .iter()
            .filter(|f| Some(**f) != exclude)
            .map(|f| (self.capacity - db.fragments[f].bytes_filled, *f))
            .filter(|(free, _)| *free >= size)
            .min_by_key(|(free, _)| *free)
            .map(|(_, f)| f)
    }

    fn free_fragment_number(&self, pn_id: u8) -> Option<u8> {
        let db = self.pseudonodes.get(&pn_id);
        (0..self.max_fragments)
            .map(|n| n as u8)
            .find(|n| db.map(|db| !db.fragments.contains_key(n)).unwrap_or(true))
    }

    fn create_fragment(&mut self, pn_id: u8, number: u8) {
        let db = self.pseudonodes.entry(pn_id).or_default();
        assert!(!db.fragments.contains_key(&number), "fragment created twice");
        db.fragments.insert(number, Fragment::new(pn_id, number));
        db.reorder(number);
        trace!(target: "isis::advt", "created fragment ({}, {})", pn_id, number);
    }

    fn bind(&mut self, id: DatumId, number: u8) {
        let capacity = self.capacity;
        let datum = match self.data.get_mut(&id) {
            Some(d) => d,
            None => panic!("binding unknown datum {:?}", id),
        };
        assert!(datum.fragment.is_none(), "datum {:?} bound twice", id);
        datum.fragment = Some(number);
        let (pn_id, size) = (datum.pn_id, datum.size);
        let db = match self.pseudonodes.get_mut(&pn_id) {
            Some(db) => db,
            None => panic!("binding to a missing pseudonode {}", pn_id),
        };
        let frag = match db.fragments.get_mut(&number) {
            Some(f) => f,
            None => panic!("binding to a missing fragment ({}, {})", pn_id, number),
        };
        assert!(frag.bytes_filled + size <= capacity, "fragment overflow");
        frag.data.push(id);
        frag.bytes_filled += size;
        frag.dirty = true;
        db.reorder(number);
    }

    fn unbind(&mut self, id: DatumId) {
        let datum = match self.data.get_mut(&id) {
            Some(d) => d,
            None => panic!("unbinding unknown datum {:?}", id),
        };
        let number = match datum.fragment.take() {
            Some(n) => n,
            None => panic!("unbinding datum {:?} which is not bound", id),
        };
        let (pn_id, size) = (datum.pn_id, datum.size);
        let db = match self.pseudonodes.get_mut(&pn_id) {
            Some(db) => db,
            None => panic!("unbinding from a missing pseudonode {}", pn_id),
        };
        if let Some(frag) = db.fragments.get_mut(&number) {
            let pos = frag.data.iter().position(|d| *d == id);
            assert!(pos.is_some(), "datum {:?} not in its fragment", id);
            if let Some(pos) = pos {
                frag.data.remove(pos);
            }
            frag.bytes_filled -= size;
            frag.dirty = true;
        }
        db.reorder(number);
    }

    fn release_if_empty(&mut self, pn_id: u8, number: u8) {
        if pn_id == 0 && number == 0 {
            return;
        }
        let db = match self.pseudonodes.get_mut(&pn_id) {
            Some(db) => db,
            None => return,
        };
        if db.fragments.get(&number).map(|f| f.data.is_empty()).unwrap_or(false) {
            db.fragments.remove(&number);
            db.order.retain(|f| *f != number);
            self.purges.push((pn_id, number));
            debug!(target: "isis::advt", "fragment ({}, {}) is empty, purging", pn_id, number);
            if db.fragments.is_empty() {
                self.pseudonodes.remove(&pn_id);
            }
        }
    }

    fn drain_wait_list(&mut self) {
        while let Some(id) = self.wait_list.pop_front() {
            if !self.place(id) {
                self.wait_list.push_front(id);
                break;
            }
            debug!(target: "isis::advt", "placed wait-listed datum {:?}", id);
        }
        if self.wait_list.is_empty() {
            self.set_dyn_overload(false);
        }
    }

    fn set_dyn_overload(&mut self, overload: bool) {
        if self.dyn_overload != overload {
            self.dyn_overload = overload;
            if overload {
                warn!(target: "isis::advt", "fragment space exhausted, entering overload");
            } else {
                info!(target: "isis::advt", "fragment space available again, leaving overload");
            }
            self.mark_dirty(0, 0);
        }
    }

    /// Mark a fragment for regeneration. Returns `false` if the fragment does not exist.
    pub fn mark_dirty(&mut self, pn_id: u8, number: u8) -> bool {
        match self.pseudonodes.get_mut(&pn_id).and_then(|db| db.fragments.get_mut(&number)) {
            Some(frag) => {
                frag.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Mark every fragment for regeneration
    pub fn mark_all_dirty(&mut self) {
        for frag in self.pseudonodes.values_mut().flat_map(|db| db.fragments.values_mut()) {
            frag.dirty = true;
        }
    }

    /// Make sure that the next regeneration of the fragment uses a sequence number above `seq`.
    /// Returns `true` if the fragment exists (and is now marked dirty).
    pub fn bump_sequence(&mut self, pn_id: u8, number: u8, seq: u32) -> bool {
        let floor = self.seq_floor.entry((pn_id, number)).or_insert(0);
        *floor = (*floor).max(seq);
        self.mark_dirty(pn_id, number)
    }

    /// Build a purge for a fragment we do not own, with a sequence number above `seq`.
    pub fn purge_foreign(&mut self, pn_id: u8, number: u8, seq: u32, params: &LspParams) -> Rc<Lsp> {
        self.bump_sequence(pn_id, number, seq);
        Rc::new(self.build_purge(pn_id, number, params))
    }

    fn next_seq(seq_floor: &mut BTreeMap<(u8, u8), u32>, pn_id: u8, number: u8) -> u32 {
        let seq = seq_floor.entry((pn_id, number)).or_insert(0);
        *seq = seq.saturating_add(1);
        *seq
    }

    fn build_purge(&mut self, pn_id: u8, number: u8, params: &LspParams) -> Lsp {
        let seq = Self::next_seq(&mut self.seq_floor, pn_id, number);
        Lsp::new(LspPdu {
            id: LspId::new(params.rtr_id, pn_id, number),
            seq,
            flags: LspFlags::PURGE,
            lifetime: params.lifetime,
            tlvs: Vec::new(),
        })
    }

    /// Regenerate all pending purges and dirty fragments into LSPs. The purges come first.
    pub fn regenerate_dirty(&mut self, params: &LspParams) -> Vec<Rc<Lsp>> {
        let mut result = Vec::new();
        for (pn_id, number) in std::mem::take(&mut self.purges) {
            if self.fragment(pn_id, number).is_some() {
                // re-created in the meantime, its regeneration replaces the old content
                continue;
            }
            result.push(Rc::new(self.build_purge(pn_id, number, params)));
        }

        let overload = params.overload || self.dyn_overload;
        let Self { data, pseudonodes, seq_floor, capacity, .. } = self;
        for frag in pseudonodes.values_mut().flat_map(|db| db.fragments.values_mut()) {
            if !frag.dirty {
                continue;
            }
            let mut flags = LspFlags::empty();
            if params.on_demand {
                flags |= LspFlags::ON_DEMAND;
            }
            if overload && frag.pn_id == 0 && frag.number == 0 {
                flags |= LspFlags::OVERLOAD;
            }
            let mut tlvs = Vec::with_capacity(frag.data.len());
            for section in 0..3 {
                tlvs.extend(
                    frag.data
                        .iter()
                        .map(|id| &data[id].data)
                        .filter(|d| d.section() == section)
                        .map(AdvtData::to_tlv),
                );
            }
            let seq = Self::next_seq(seq_floor, frag.pn_id, frag.number);
            let lsp = Lsp::new(LspPdu {
                id: LspId::new(params.rtr_id, frag.pn_id, frag.number),
                seq,
                flags,
                lifetime: params.lifetime,
                tlvs,
            });
            assert!(lsp.len() <= *capacity, "regenerated LSP exceeds the fragment capacity");
            debug_assert_eq!(lsp.len(), frag.bytes_filled);
            trace!(
                target: "isis::advt",
                "regenerated fragment ({}, {}) seq {} ({} bytes)",
                frag.pn_id,
                frag.number,
                seq,
                lsp.len()
            );
            let lsp = Rc::new(lsp);
            frag.seq = seq;
            frag.dirty = false;
            frag.lsp = Some(lsp.clone());
            result.push(lsp);
        }
        result
    }

    /// Returns `true` if any fragment needs to be regenerated
    pub fn is_dirty(&self) -> bool {
        !self.purges.is_empty() || self.fragments().any(|f| f.dirty)
    }

    /// Returns `true` if the fragment `(pn_id, number)` exists
    pub fn owns(&self, pn_id: u8, number: u8) -> bool {
        self.fragment(pn_id, number).is_some()
    }

    /// Get a fragment
    pub fn fragment(&self, pn_id: u8, number: u8) -> Option<&Fragment> {
        self.pseudonodes.get(&pn_id).and_then(|db| db.fragments.get(&number))
    }

    /// Iterate over all fragments, ordered by pseudonode and fragment number
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.pseudonodes.values().flat_map(|db| db.fragments.values())
    }

    /// Fragment numbers of a pseudonode, ordered by ascending fill
    pub fn fill_order(&self, pn_id: u8) -> Vec<u8> {
        self.pseudonodes.get(&pn_id).map(|db| db.order.clone()).unwrap_or_default()
    }

    /// Content of a datum
    pub fn datum(&self, id: DatumId) -> Option<&AdvtData> {
        self.data.get(&id).map(|d| &d.data)
    }

    /// Fragment `(pn_id, number)` a datum is bound to, `None` if it is wait-listed or unknown
    pub fn location(&self, id: DatumId) -> Option<(u8, u8)> {
        self.data.get(&id).and_then(|d| d.fragment.map(|f| (d.pn_id, f)))
    }

    /// Returns `true` if the datum is on the wait-list
    pub fn is_waiting(&self, id: DatumId) -> bool {
        self.wait_list.contains(&id)
    }

    /// Number of wait-listed data
    pub fn wait_list_len(&self) -> usize {
        self.wait_list.len()
    }

    /// Number of advertised data (bound or waiting)
    pub fn num_data(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the manager ran out of fragment space
    pub fn is_dyn_overloaded(&self) -> bool {
        self.dyn_overload
    }

    /// Size of a fragment
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check the internal invariants, panicking on violation.
    pub fn check_invariants(&self) {
        assert!(self.fragment(0, 0).is_some(), "fragment (0, 0) is missing");
        let mut seen = 0;
        for (pn_id, db) in self.pseudonodes.iter() {
            assert_eq!(db.order.len(), db.fragments.len(), "fill order out of sync");
            for w in db.order.windows(2) {
                assert!(db.fragments[&w[0]].bytes_filled <= db.fragments[&w[1]].bytes_filled);
            }
            for frag in db.fragments.values() {
                let sum: usize = frag.data.iter().map(|id| self.data[id].size).sum();
                assert_eq!(frag.bytes_filled, LSP_HEADER_LEN + sum, "fill counter out of sync");
                assert!(frag.bytes_filled <= self.capacity);
                for id in frag.data.iter() {
                    let d = &self.data[id];
                    assert_eq!((d.pn_id, d.fragment), (*pn_id, Some(frag.number)));
                }
                seen += frag.data.len();
            }
        }
        for id in self.wait_list.iter() {
            assert!(self.data[id].fragment.is_none(), "wait-listed datum is bound");
        }
        assert_eq!(seen + self.wait_list.len(), self.data.len(), "datum lost or duplicated");
        assert_eq!(self.dyn_overload, !self.wait_list.is_empty());
    }
}
