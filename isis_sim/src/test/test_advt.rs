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

//! Test the placement of data into fragments.

use crate::isis::advt::*;
use crate::isis::packet::{IpReach, LspFlags, PrefixFlags, Tlv, LSP_HEADER_LEN};
use crate::netsim::{LspId, Prefix, RouterId};
use lazy_static::lazy_static;
use std::net::Ipv4Addr;

lazy_static! {
    static ref R1: RouterId = Ipv4Addr::new(1, 1, 1, 1).into();
    static ref PARAMS: LspParams =
        LspParams { rtr_id: *R1, overload: false, lifetime: 1200, on_demand: false };
}

/// Prefix reachability of `10.0.x.0/24`. Every one of them takes 15 bytes.
fn ip(x: u8) -> AdvtData {
    AdvtData::IpReach(IpReach {
        prefix: Prefix::new(Ipv4Addr::new(10, 0, x, 0), 24),
        metric: 10,
        flags: PrefixFlags::empty(),
    })
}

/// Fragments with room for exactly two prefixes
fn two_slot_manager(max_fragments: usize) -> AdvtManager {
    AdvtManager::new(LSP_HEADER_LEN + 30, max_fragments)
}

#[test]
fn test_datum_size() {
    assert_eq!(ip(0).size(), 15);
    assert_eq!(AdvtData::Hostname("r1".to_string()).size(), 4);
    assert!(ip(0).is_relocatable());
    assert!(!AdvtData::Hostname("r1".to_string()).is_relocatable());
}

#[test]
fn test_initial_state() {
    let m = two_slot_manager(2);
    let f = m.fragment(0, 0).unwrap();
    assert_eq!(f.bytes_filled(), LSP_HEADER_LEN);
    assert!(f.is_dirty());
    assert_eq!(m.fragments().count(), 1);
    assert!(!m.is_dyn_overloaded());
    m.check_invariants();
}

#[test]
fn test_exact_fit_and_new_fragment() {
    let mut m = two_slot_manager(2);
    let a = m.advertise(ip(1), 0);
    let b = m.advertise(ip(2), 0);
    assert_eq!(m.location(a), Some((0, 0)));
    assert_eq!(m.location(b), Some((0, 0)));
    assert_eq!(m.fragment(0, 0).unwrap().bytes_filled(), m.capacity());

    let c = m.advertise(ip(3), 0);
    assert_eq!(m.location(c), Some((0, 1)));
    assert_eq!(m.fill_order(0), vec![1, 0]);
    m.check_invariants();
}

#[test]
fn test_best_fit() {
    let mut m = AdvtManager::new(LSP_HEADER_LEN + 45, 3);
    let a = m.advertise(ip(1), 0);
    m.advertise(ip(2), 0);
    m.advertise(ip(3), 0);
    let d = m.advertise(ip(4), 0);
    assert_eq!(m.location(d), Some((0, 1)));

    // (0, 0) now has 15 bytes free, (0, 1) has 30. The tighter one wins.
    m.withdraw(a);
    let e = m.advertise(ip(5), 0);
    assert_eq!(m.location(e), Some((0, 0)));
    m.check_invariants();
}

#[test]
fn test_wait_list_and_overload() {
    let mut m = two_slot_manager(2);
    let a = m.advertise(ip(1), 0);
    m.advertise(ip(2), 0);
    m.advertise(ip(3), 0);
    m.advertise(ip(4), 0);
    m.regenerate_dirty(&PARAMS);

    let e = m.advertise(ip(5), 0);
    assert!(m.is_waiting(e));
    assert_eq!(m.location(e), None);
    assert_eq!(m.wait_list_len(), 1);
    assert!(m.is_dyn_overloaded());
    m.check_invariants();

    // the first fragment carries the overload bit
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 1);
    assert_eq!(lsps[0].id(), LspId::new(*R1, 0, 0));
    assert!(lsps[0].is_overloaded());

    // space becomes available, the waiting datum is placed and overload is cleared
    m.withdraw(a);
    assert!(!m.is_waiting(e));
    assert_eq!(m.location(e), Some((0, 0)));
    assert!(!m.is_dyn_overloaded());
    m.check_invariants();

    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 1);
    assert!(!lsps[0].is_overloaded());
}

#[test]
fn test_wait_list_is_fifo() {
    let mut m = two_slot_manager(1);
    let a = m.advertise(ip(1), 0);
    let b = m.advertise(ip(2), 0);
    let c = m.advertise(ip(3), 0);
    let d = m.advertise(ip(4), 0);
    assert!(m.is_waiting(c) && m.is_waiting(d));

    m.withdraw(a);
    assert_eq!(m.location(c), Some((0, 0)));
    assert!(m.is_waiting(d));
    assert!(m.is_dyn_overloaded());

    m.withdraw(b);
    assert_eq!(m.location(d), Some((0, 0)));
    assert!(!m.is_dyn_overloaded());
    m.check_invariants();
}

#[test]
fn test_withdraw_waiting_datum() {
    let mut m = two_slot_manager(1);
    m.advertise(ip(1), 0);
    m.advertise(ip(2), 0);
    let c = m.advertise(ip(3), 0);
    assert!(m.is_dyn_overloaded());
    m.withdraw(c);
    assert_eq!(m.num_data(), 2);
    assert!(!m.is_dyn_overloaded());
    m.check_invariants();
}

#[test]
fn test_compulsory_eviction() {
    let mut m = two_slot_manager(2);
    let a = m.advertise(ip(1), 0);
    let b = m.advertise(ip(2), 0);
    let h = m.advertise(AdvtData::Hostname("host".to_string()), 0);

    assert_eq!(m.location(h), Some((0, 0)));
    assert_eq!(m.location(a), Some((0, 0)));
    // the last relocatable datum made room
    assert_eq!(m.location(b), Some((0, 1)));
    assert!(!m.is_dyn_overloaded());
    m.check_invariants();

    let lsps = m.regenerate_dirty(&PARAMS);
    let first = lsps.iter().find(|l| l.id() == LspId::new(*R1, 0, 0)).unwrap();
    // other TLVs come before prefix reachability
    assert_eq!(first.tlvs()[0], Tlv::Hostname("host".to_string()));
    assert!(matches!(first.tlvs()[1], Tlv::IpReach(_)));
    assert_eq!(first.hostname(), Some("host"));
}

#[test]
fn test_compulsory_eviction_to_wait_list() {
    let mut m = two_slot_manager(1);
    let a = m.advertise(ip(1), 0);
    let b = m.advertise(ip(2), 0);
    let h = m.advertise(AdvtData::Hostname("host".to_string()), 0);
    assert_eq!(m.location(h), Some((0, 0)));
    assert_eq!(m.location(a), Some((0, 0)));
    assert!(m.is_waiting(b));
    assert!(m.is_dyn_overloaded());
    m.check_invariants();
}

#[test]
fn test_purge_of_empty_fragment() {
    let mut m = two_slot_manager(2);
    m.advertise(ip(1), 0);
    m.advertise(ip(2), 0);
    let c = m.advertise(ip(3), 0);
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 2);
    assert!(lsps.iter().all(|l| l.seq() == 1));

    m.withdraw(c);
    assert!(m.fragment(0, 1).is_none());
    assert!(m.is_dirty());
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 1);
    assert_eq!(lsps[0].id(), LspId::new(*R1, 0, 1));
    assert!(lsps[0].is_purge());
    assert!(lsps[0].tlvs().is_empty());
    assert_eq!(lsps[0].seq(), 2);

    // the fragment comes back with a sequence number above the purge
    let d = m.advertise(ip(4), 0);
    assert_eq!(m.location(d), Some((0, 1)));
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 1);
    assert!(!lsps[0].is_purge());
    assert_eq!(lsps[0].seq(), 3);
    m.check_invariants();
}

#[test]
fn test_fragment_zero_is_never_purged() {
    let mut m = two_slot_manager(2);
    let a = m.advertise(ip(1), 0);
    m.regenerate_dirty(&PARAMS);
    m.withdraw(a);
    assert!(m.fragment(0, 0).is_some());
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 1);
    assert!(!lsps[0].is_purge());
    assert_eq!(lsps[0].len(), LSP_HEADER_LEN);
}

#[test]
fn test_recreated_fragment_skips_purge() {
    let mut m = two_slot_manager(2);
    m.advertise(ip(1), 0);
    m.advertise(ip(2), 0);
    let c = m.advertise(ip(3), 0);
    m.regenerate_dirty(&PARAMS);

    m.withdraw(c);
    let d = m.advertise(ip(4), 0);
    assert_eq!(m.location(d), Some((0, 1)));
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 1);
    assert!(!lsps[0].is_purge());
    assert_eq!(lsps[0].seq(), 2);
}

#[test]
fn test_pseudonode_fragments() {
    let mut m = two_slot_manager(2);
    let a = m.advertise(ip(1), 3);
    assert_eq!(m.location(a), Some((3, 0)));
    let lsps = m.regenerate_dirty(&PARAMS);
    assert!(lsps.iter().any(|l| l.id() == LspId::new(*R1, 3, 0)));

    // the last datum of a pseudonode removes its only fragment
    m.withdraw(a);
    assert!(m.fragment(3, 0).is_none());
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps.len(), 1);
    assert!(lsps[0].is_purge());
    assert_eq!(lsps[0].id(), LspId::new(*R1, 3, 0));
    m.check_invariants();
}

#[test]
fn test_admin_overload_and_flags() {
    let mut m = two_slot_manager(2);
    m.advertise(ip(1), 0);
    m.advertise(ip(2), 0);
    m.advertise(ip(3), 0);
    let params = LspParams { overload: true, on_demand: true, ..*PARAMS };
    let lsps = m.regenerate_dirty(&params);
    for lsp in lsps.iter() {
        assert!(lsp.flags().contains(LspFlags::ON_DEMAND));
        let first = lsp.id().fragment == 0;
        assert_eq!(lsp.is_overloaded(), first);
    }
}

#[test]
fn test_bump_sequence() {
    let mut m = two_slot_manager(2);
    m.regenerate_dirty(&PARAMS);
    assert!(m.bump_sequence(0, 0, 100));
    let lsps = m.regenerate_dirty(&PARAMS);
    assert_eq!(lsps[0].seq(), 101);

    assert!(!m.bump_sequence(0, 5, 7));
    let purge = m.purge_foreign(0, 5, 7, &PARAMS);
    assert!(purge.is_purge());
    assert_eq!(purge.seq(), 8);
}

#[test]
fn test_replace() {
    let mut m = two_slot_manager(2);
    let a = m.advertise(ip(1), 0);
    let new = AdvtData::IpReach(IpReach {
        prefix: Prefix::new(Ipv4Addr::new(10, 0, 1, 0), 24),
        metric: 20,
        flags: PrefixFlags::empty(),
    });
    let b = m.replace(a, new.clone());
    assert_ne!(a, b);
    assert_eq!(m.datum(a), None);
    assert_eq!(m.datum(b), Some(&new));
    assert_eq!(m.num_data(), 1);
    m.check_invariants();
}

#[test]
#[should_panic]
fn test_oversized_datum() {
    let mut m = two_slot_manager(2);
    m.advertise(AdvtData::Opaque { tlv_type: 250, value: vec![0; 40] }, 0);
}

#[test]
#[should_panic]
fn test_hostname_on_pseudonode() {
    let mut m = two_slot_manager(2);
    m.advertise(AdvtData::Hostname("r1".to_string()), 1);
}
