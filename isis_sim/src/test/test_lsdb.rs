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

//! Test the link-state database on its own.

use crate::isis::lsdb::{Freshness, Lsdb};
use crate::isis::lsp::Lsp;
use crate::isis::packet::{LspFlags, LspPdu, Tlv};
use crate::netsim::{LspId, RouterId};
use lazy_static::lazy_static;
use std::net::Ipv4Addr;
use std::rc::Rc;

lazy_static! {
    static ref R1: RouterId = Ipv4Addr::new(1, 1, 1, 1).into();
    static ref ID: LspId = LspId::new(*R1, 0, 0);
}

fn lsp(seq: u32, flags: LspFlags) -> Rc<Lsp> {
    Rc::new(Lsp::new(LspPdu {
        id: *ID,
        seq,
        flags,
        lifetime: 1200,
        tlvs: vec![Tlv::Hostname("r1".to_string())],
    }))
}

#[test]
fn test_classify() {
    let mut db = Lsdb::new();
    assert_eq!(db.classify(*ID, 1), Freshness::Newer);
    assert!(db.install(lsp(5, LspFlags::empty()), 0));
    assert_eq!(db.classify(*ID, 4), Freshness::Older);
    assert_eq!(db.classify(*ID, 5), Freshness::Duplicate);
    assert_eq!(db.classify(*ID, 6), Freshness::Newer);
    assert_eq!(db.classify(LspId::new(*R1, 0, 1), 1), Freshness::Newer);
}

#[test]
fn test_install_only_newer() {
    let mut db = Lsdb::new();
    let first = lsp(5, LspFlags::empty());
    assert!(db.install(first.clone(), 10));
    assert!(db.is_current(&first));

    // same or lower sequence number: the database is untouched
    let dup = lsp(5, LspFlags::empty());
    assert!(!db.install(dup.clone(), 20));
    assert!(!db.install(lsp(3, LspFlags::empty()), 20));
    assert!(db.is_current(&first));
    assert!(!db.is_current(&dup));
    assert_eq!(db.entry(*ID).unwrap().installed(), 10);

    let second = lsp(6, LspFlags::PURGE);
    assert!(db.install(second.clone(), 30));
    assert!(!db.is_current(&first));
    assert!(db.get(*ID).unwrap().is_purge());
    assert_eq!(db.len(), 1);
}

#[test]
fn test_remove() {
    let mut db = Lsdb::new();
    assert!(db.is_empty());
    db.install(lsp(1, LspFlags::empty()), 0);
    assert_eq!(db.entry(*ID).unwrap().expires(), None);
    let old = db.remove(*ID).unwrap();
    assert_eq!(old.seq(), 1);
    assert!(db.is_empty());
    assert_eq!(db.classify(*ID, 1), Freshness::Newer);
}

#[test]
fn test_lsp_accessors() {
    let l = lsp(9, LspFlags::OVERLOAD | LspFlags::ON_DEMAND);
    assert_eq!(l.id(), *ID);
    assert!(l.is_overloaded());
    assert!(l.is_on_demand());
    assert!(!l.is_purge());
    assert_eq!(l.lifetime(), 1200);
    assert_eq!(l.hostname(), Some("r1"));
    assert_eq!(l.raw().len(), l.len());
    assert_eq!(l.flood_refs(), 0);
}
