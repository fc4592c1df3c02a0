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

//! Drive a single protocol instance directly with hand-made Hellos, without a network around it.

use crate::isis::packet::{HelloPdu, Tlv};
use crate::isis::{AdjState, IsisConfig, IsisInstance, RouterCtx};
use crate::netsim::router::Interface;
use crate::netsim::{
    DeviceId, Event, EventQueue, Frame, IfIndex, InterfaceKind, LinkId, LspId, MacAddr, Prefix,
    RouterId, StaticRoute, SystemId,
};
use crate::rib::RoutingTable;
use maplit::btreemap;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

const IF: IfIndex = IfIndex(1);

fn rid(n: u8) -> RouterId {
    Ipv4Addr::new(n, n, n, n).into()
}

fn addr(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, n)
}

fn mac(n: u8) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, n, 1])
}

/// Router `r1` with a single interface `10.0.0.1/24`, running the protocol on it.
struct Harness {
    isis: IsisInstance,
    interfaces: BTreeMap<IfIndex, Interface>,
    static_routes: BTreeMap<Prefix, StaticRoute>,
    rib: RoutingTable,
    queue: EventQueue,
}

impl Harness {
    fn new(kind: InterfaceKind) -> Self {
        let iface = Interface {
            ifindex: IF,
            name: "eth1".to_string(),
            addr: addr(1),
            mask_len: 24,
            mac: mac(1),
            link: LinkId(0),
            kind,
            up: true,
        };
        let mut h = Self {
            isis: IsisInstance::new(IsisConfig::default(), rid(1), "r1"),
            interfaces: btreemap! {IF => iface},
            static_routes: BTreeMap::new(),
            rib: RoutingTable::new(),
            queue: EventQueue::new(),
        };
        h.with(|isis, ctx| {
            isis.start(ctx);
            isis.enable_interface(ctx, IF).unwrap();
        });
        h.settle();
        h
    }

    fn with<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut IsisInstance, &mut RouterCtx) -> T,
    {
        let Harness { isis, interfaces, static_routes, rib, queue } = self;
        let mut ctx = RouterCtx {
            device: DeviceId::new(0),
            name: "r1",
            loopback: rid(1).to_ipv4(),
            interfaces: &*interfaces,
            static_routes: &*static_routes,
            rib,
            queue,
        };
        f(isis, &mut ctx)
    }

    /// Run every job and timer that is due, and drop what was transmitted.
    fn settle(&mut self) {
        let now = self.queue.now();
        while let Some(event) = self.queue.pop_until(now) {
            match event {
                Event::Job { job, .. } => self.with(|isis, ctx| isis.handle_job(ctx, job)),
                Event::Timer { handle, timer, .. } => {
                    self.with(|isis, ctx| isis.handle_timer(ctx, handle, timer))
                }
                Event::Deliver { .. } => unreachable!("nothing delivers frames here"),
            }
        }
        self.queue.take_outbox();
    }

    fn receive(&mut self, hello: &HelloPdu, src: MacAddr) {
        let frame = Frame { dst: MacAddr::BROADCAST, src, payload: hello.encode() };
        self.with(|isis, ctx| isis.receive(ctx, IF, frame));
        self.settle();
    }

    fn state(&self, n: u8) -> Option<AdjState> {
        self.isis.adjacency(IF, rid(n)).map(|a| a.state())
    }

    /// Sequence number of our own LSP in the database
    fn seq(&self, pn_id: u8) -> Option<u32> {
        self.isis.lsdb().get(LspId::new(rid(1), pn_id, 0)).map(|l| l.seq())
    }

    fn reaches(&self, pn_id: u8, neighbor: SystemId) -> bool {
        self.isis.lsdb().get(LspId::new(rid(1), pn_id, 0)).map_or(false, |l| {
            l.tlvs().iter().any(|t| matches!(t, Tlv::IsReach(r) if r.neighbor == neighbor))
        })
    }
}

/// Hello of router `n` with address `10.0.0.{ip}` and MAC `mac`
fn hello(n: u8, ip: u8, mac: MacAddr, priority: u8, lan_id: Option<SystemId>) -> HelloPdu {
    let mut tlvs = vec![
        Tlv::Hostname(format!("r{}", n)),
        Tlv::RouterId(rid(n)),
        Tlv::InterfaceIp { addr: addr(ip), mask_len: 24 },
        Tlv::InterfaceIndex(IfIndex(1)),
        Tlv::HoldTime(9),
        Tlv::Metric(10),
        Tlv::InterfaceMac(mac),
        Tlv::Priority(priority),
    ];
    tlvs.extend(lan_id.map(Tlv::LanId));
    HelloPdu { seq: 1, rtr_id: rid(n), tlvs }
}

#[test]
fn test_down_init_up() {
    let mut h = Harness::new(InterfaceKind::PointToPoint);
    assert_eq!(h.state(2), None);

    // the first Hello only creates the adjacency in Init
    h.receive(&hello(2, 2, mac(2), 64, None), mac(2));
    assert_eq!(h.state(2), Some(AdjState::Init));
    assert_eq!(h.isis.up_adjacencies(), 0);
    assert!(!h.reaches(0, SystemId::router(rid(2))));

    h.receive(&hello(2, 2, mac(2), 64, None), mac(2));
    assert_eq!(h.state(2), Some(AdjState::Up));
    assert_eq!(h.isis.up_adjacencies(), 1);
    assert_eq!(h.isis.stats().adj_up, 1);
    assert!(h.reaches(0, SystemId::router(rid(2))));

    // more Hellos keep it up
    h.receive(&hello(2, 2, mac(2), 64, None), mac(2));
    assert_eq!(h.state(2), Some(AdjState::Up));
    assert_eq!(h.isis.stats().adj_up, 1);
}

#[test]
fn test_invalid_hellos_create_nothing() {
    let mut h = Harness::new(InterfaceKind::PointToPoint);
    h.receive(&hello(2, 2, mac(2), 64, None), mac(2));
    // outside of the subnet
    let mut far = hello(3, 3, mac(3), 64, None);
    far.tlvs[2] = Tlv::InterfaceIp { addr: Ipv4Addr::new(10, 9, 0, 3), mask_len: 24 };
    h.receive(&far, mac(3));
    assert_eq!(h.state(3), None);
    assert_eq!(h.isis.stats().bad_hello_subnet, 1);

    // without an interface address
    let mut anonymous = hello(3, 3, mac(3), 64, None);
    anonymous.tlvs.remove(2);
    h.receive(&anonymous, mac(3));
    assert_eq!(h.state(3), None);
    assert_eq!(h.isis.stats().bad_hello_no_if_ip, 1);

    // our own Hello, looped back
    h.receive(&hello(1, 1, mac(1), 64, None), mac(1));
    assert_eq!(h.isis.stats().bad_hello_own, 1);
    assert_eq!(h.state(2), Some(AdjState::Init));
}

#[test]
fn test_identity_change_forces_down() {
    let mut h = Harness::new(InterfaceKind::PointToPoint);
    h.receive(&hello(2, 2, mac(2), 64, None), mac(2));
    h.receive(&hello(2, 2, mac(2), 64, None), mac(2));
    assert_eq!(h.state(2), Some(AdjState::Up));

    // same router id, new address
    h.receive(&hello(2, 5, mac(2), 64, None), mac(2));
    assert_eq!(h.state(2), Some(AdjState::Down));
    assert_eq!(h.isis.up_adjacencies(), 0);
    assert_eq!(h.isis.stats().adj_down, 1);
    assert!(h.isis.adjacency(IF, rid(2)).unwrap().has_delete_timer());
    assert!(!h.reaches(0, SystemId::router(rid(2))));

    // it comes back through Init
    h.receive(&hello(2, 5, mac(2), 64, None), mac(2));
    assert_eq!(h.state(2), Some(AdjState::Init));
    h.receive(&hello(2, 5, mac(2), 64, None), mac(2));
    assert_eq!(h.state(2), Some(AdjState::Up));
    assert_eq!(h.isis.adjacency(IF, rid(2)).unwrap().remote_ip(), addr(5));

    // same address, new MAC
    h.receive(&hello(2, 5, mac(9), 64, None), mac(9));
    assert_eq!(h.state(2), Some(AdjState::Down));
    assert_eq!(h.isis.stats().adj_down, 2);
    h.receive(&hello(2, 5, mac(9), 64, None), mac(9));
    assert_eq!(h.state(2), Some(AdjState::Init));
    h.receive(&hello(2, 5, mac(9), 64, None), mac(9));
    assert_eq!(h.state(2), Some(AdjState::Up));
    assert_eq!(h.isis.stats().adj_up, 3);
}

#[test]
fn test_dis_is_stable() {
    let mut h = Harness::new(InterfaceKind::Lan);
    // alone on the LAN, we are DIS right away
    let pn = h.isis.interface(IF).unwrap().own_pn.unwrap();
    let dis = SystemId::pseudonode(rid(1), pn);
    assert_eq!(h.isis.interface(IF).unwrap().dis(), Some(dis));

    // the higher priority wins over the higher router id
    for _ in 0..2 {
        h.receive(&hello(2, 2, mac(2), 10, Some(dis)), mac(2));
        h.receive(&hello(3, 3, mac(3), 10, Some(dis)), mac(3));
    }
    assert_eq!(h.isis.up_adjacencies(), 2);
    assert_eq!(h.isis.interface(IF).unwrap().dis(), Some(dis));
    assert!(h.reaches(pn, SystemId::router(rid(2))));
    assert!(h.reaches(pn, SystemId::router(rid(3))));
    assert!(h.reaches(pn, SystemId::router(rid(1))));
    assert!(h.reaches(0, dis));
    let (seq0, seq_pn) = (h.seq(0), h.seq(pn));
    assert!(seq_pn.is_some());

    // running the election again changes nothing
    assert!(!h.with(|isis, ctx| isis.reelect_dis(ctx, IF)));
    assert!(!h.with(|isis, ctx| isis.reelect_dis(ctx, IF)));
    h.settle();
    // and neither do the same Hellos again
    for _ in 0..3 {
        h.receive(&hello(2, 2, mac(2), 10, Some(dis)), mac(2));
        h.receive(&hello(3, 3, mac(3), 10, Some(dis)), mac(3));
    }
    assert_eq!(h.isis.interface(IF).unwrap().own_pn, Some(pn));
    assert_eq!(h.isis.interface(IF).unwrap().dis(), Some(dis));
    assert_eq!(h.seq(0), seq0);
    assert_eq!(h.seq(pn), seq_pn);
}

#[test]
fn test_dis_follows_neighbor() {
    let mut h = Harness::new(InterfaceKind::Lan);
    // alone on the LAN, we are DIS
    let own = h.isis.interface(IF).unwrap().own_pn.unwrap();
    assert!(h.seq(own).is_some());

    let theirs = SystemId::pseudonode(rid(2), 7);
    h.receive(&hello(2, 2, mac(2), 100, Some(theirs)), mac(2));
    h.receive(&hello(2, 2, mac(2), 100, Some(theirs)), mac(2));
    let iface = h.isis.interface(IF).unwrap();
    assert_eq!(iface.dis(), Some(theirs));
    assert!(!iface.is_dis());
    assert!(h.reaches(0, theirs));
    // our old pseudonode is purged
    assert!(h.isis.lsdb().get(LspId::new(rid(1), own, 0)).map_or(true, |l| l.is_purge()));

    let seq0 = h.seq(0);
    assert!(!h.with(|isis, ctx| isis.reelect_dis(ctx, IF)));
    h.receive(&hello(2, 2, mac(2), 100, Some(theirs)), mac(2));
    h.settle();
    assert_eq!(h.isis.interface(IF).unwrap().dis(), Some(theirs));
    assert_eq!(h.seq(0), seq0);
}

#[test]
fn test_policy_update() {
    use crate::netsim::route_map::RouteMapBuilder;
    use crate::netsim::DeviceError;

    let mut h = Harness::new(InterfaceKind::PointToPoint);
    let first = RouteMapBuilder::new().order(10).deny().build();
    let last = RouteMapBuilder::new().order(30).allow().build();
    let updated = RouteMapBuilder::new().order(10).allow().set_cost(5).build();
    h.with(|isis, ctx| {
        isis.add_policy(ctx, last.clone(), true).unwrap();
        isis.add_policy(ctx, first.clone(), true).unwrap();
        assert_eq!(isis.modify_policy(ctx, updated.clone(), true), Ok(first));
        let missing = RouteMapBuilder::new().order(20).deny().build();
        assert_eq!(isis.modify_policy(ctx, missing, true), Err(DeviceError::NoPolicy(20)));
    });
    assert_eq!(h.isis.import_maps(), &[updated, last]);
    assert!(h.isis.export_maps().is_empty());
}
