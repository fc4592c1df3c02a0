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

use crate::netsim::config::{Config, ConfigExpr::*, ConfigExprKey, ConfigModifier::*, ConfigPatch};
use crate::netsim::route_map::*;
use crate::netsim::{ConfigError, DeviceError, DeviceId, IfIndex, Network, NetworkError, Prefix};
use std::net::Ipv4Addr;

fn r(x: u32) -> DeviceId {
    x.into()
}

#[test]
fn test_config_add() {
    let mut c = Config::new();
    assert!(c.is_empty());
    c.add(IsisRouter { router: r(0) }).unwrap();
    c.add(IsisInterface { router: r(0), ifindex: IfIndex(1) }).unwrap();
    c.add(InterfaceCost { router: r(0), ifindex: IfIndex(1), cost: 5 }).unwrap();
    assert_eq!(c.len(), 3);

    // same key, different value
    assert_eq!(
        c.add(InterfaceCost { router: r(0), ifindex: IfIndex(1), cost: 7 }),
        Err(ConfigError::ConfigExprOverload)
    );
    assert_eq!(
        c.get(&ConfigExprKey::InterfaceCost { router: r(0), ifindex: IfIndex(1) }),
        Some(&InterfaceCost { router: r(0), ifindex: IfIndex(1), cost: 5 })
    );
}

#[test]
fn test_config_diff() {
    let mut c1 = Config::new();
    let mut c2 = Config::new();

    // the same in both
    let rtr = IsisRouter { router: r(0) };
    c1.add(rtr.clone()).unwrap();
    c2.add(rtr.clone()).unwrap();

    // only in c1
    let if1 = IsisInterface { router: r(0), ifindex: IfIndex(1) };
    c1.add(if1.clone()).unwrap();

    // only in c2
    let if2 = IsisInterface { router: r(0), ifindex: IfIndex(2) };
    c2.add(if2.clone()).unwrap();

    // in both, but different
    let ol_a = Overload { router: r(0), timeout: None };
    let ol_b = Overload { router: r(0), timeout: Some(60) };
    c1.add(ol_a.clone()).unwrap();
    c2.add(ol_b.clone()).unwrap();

    let patch = c1.get_diff(&c2);
    let expected_patch =
        vec![Remove(if1.clone()), Update { from: ol_a.clone(), to: ol_b.clone() }, Insert(if2)];
    assert_eq!(patch.modifiers, expected_patch);

    c1.apply_patch(&patch).unwrap();
    assert_eq!(c1, c2);
}

#[test]
fn test_config_diff_order() {
    let mut full = Config::new();
    full.add(InterfaceCost { router: r(0), ifindex: IfIndex(1), cost: 5 }).unwrap();
    full.add(IsisInterface { router: r(0), ifindex: IfIndex(1) }).unwrap();
    full.add(IsisRouter { router: r(0) }).unwrap();
    let empty = Config::new();

    // removal: most specific first
    let patch = full.get_diff(&empty);
    let ranks: Vec<u8> = patch.modifiers.iter().map(|m| m.key().rank()).collect();
    assert_eq!(ranks, vec![2, 1, 0]);

    // insertion: protocol instance first
    let patch = empty.get_diff(&full);
    let ranks: Vec<u8> = patch.modifiers.iter().map(|m| m.key().rank()).collect();
    assert_eq!(ranks, vec![0, 1, 2]);
    assert!(patch.modifiers.iter().all(|m| matches!(m, Insert(_))));
}

#[test]
fn test_apply_modifier_errors() {
    let mut c = Config::new();
    let rtr = IsisRouter { router: r(0) };
    let cost_a = InterfaceCost { router: r(0), ifindex: IfIndex(1), cost: 5 };
    let cost_b = InterfaceCost { router: r(0), ifindex: IfIndex(1), cost: 7 };

    // remove or update something that does not exist
    assert!(c.apply_modifier(&Remove(rtr.clone())).is_err());
    assert!(c.apply_modifier(&Update { from: cost_a.clone(), to: cost_b.clone() }).is_err());

    c.apply_modifier(&Insert(rtr.clone())).unwrap();
    c.apply_modifier(&Insert(cost_a.clone())).unwrap();
    // insert twice
    assert!(c.apply_modifier(&Insert(rtr.clone())).is_err());
    // update with the wrong original
    assert!(c.apply_modifier(&Update { from: cost_b.clone(), to: cost_a.clone() }).is_err());
    // update changing the key
    assert!(c.apply_modifier(&Update { from: cost_a.clone(), to: rtr.clone() }).is_err());
    // remove with a different value
    assert!(c.apply_modifier(&Remove(cost_b.clone())).is_err());
    assert_eq!(c.len(), 2);

    c.apply_modifier(&Update { from: cost_a.clone(), to: cost_b.clone() }).unwrap();
    assert_eq!(c.get(&cost_b.key()), Some(&cost_b));
}

#[test]
fn test_apply_patch_is_atomic() {
    let mut c = Config::new();
    let before = c.clone();
    let mut patch = ConfigPatch::new();
    patch.add(Insert(IsisRouter { router: r(0) }));
    patch.add(Insert(IsisRouter { router: r(0) }));
    assert!(c.apply_patch(&patch).is_err());
    assert_eq!(c, before);
}

#[test]
fn test_modifier_reverse() {
    let map = RouteMapBuilder::new().order(10).deny().match_external(true).build();
    let a = ExportPolicy { router: r(1), map: map.clone() };
    assert_eq!(Insert(a.clone()).reverse(), Remove(a.clone()));
    assert_eq!(Remove(a.clone()).reverse(), Insert(a.clone()));
    let b = ExportPolicy { router: r(1), map: RouteMapBuilder::new().order(10).allow().build() };
    assert_eq!(
        Update { from: a.clone(), to: b.clone() }.reverse(),
        Update { from: b, to: a.clone() }
    );
    assert_eq!(Insert(a).router(), r(1));
}

/// Two routers with one link, without any configuration
fn two_routers() -> (Network, DeviceId, DeviceId, IfIndex, IfIndex) {
    let mut net = Network::new();
    let a = net.add_router("a", Ipv4Addr::new(1, 1, 1, 1));
    let b = net.add_router("b", Ipv4Addr::new(2, 2, 2, 2));
    let (_, ia, ib) =
        net.add_link(a, Ipv4Addr::new(10, 0, 0, 1), b, Ipv4Addr::new(10, 0, 0, 2), 30).unwrap();
    (net, a, b, ia, ib)
}

#[test]
fn test_network_rejects_missing_dependency() {
    let (mut net, a, _, ia, _) = two_routers();
    // interface without the protocol on the router
    let e = net.apply_modifier(&Insert(IsisInterface { router: a, ifindex: ia }));
    assert_eq!(e, Err(NetworkError::DeviceError(DeviceError::IsisNotEnabled)));
    assert!(net.current_config().is_empty());

    net.apply_modifier(&Insert(IsisRouter { router: a })).unwrap();
    // settings on an interface without the protocol
    let e = net.apply_modifier(&Insert(InterfaceCost { router: a, ifindex: ia, cost: 3 }));
    assert_eq!(e, Err(NetworkError::DeviceError(DeviceError::InterfaceNotEnabled(ia))));
    // unknown interface
    let e = net.apply_modifier(&Insert(IsisInterface { router: a, ifindex: IfIndex(9) }));
    assert_eq!(e, Err(NetworkError::DeviceError(DeviceError::InterfaceNotFound(IfIndex(9)))));
    assert_eq!(net.current_config().len(), 1);
}

#[test]
fn test_network_rejects_removing_dependencies() {
    let (mut net, a, _, ia, _) = two_routers();
    let mut c = Config::new();
    c.add(IsisRouter { router: a }).unwrap();
    c.add(IsisInterface { router: a, ifindex: ia }).unwrap();
    c.add(InterfaceCost { router: a, ifindex: ia, cost: 3 }).unwrap();
    net.set_config(&c).unwrap();

    let e = net.apply_modifier(&Remove(IsisInterface { router: a, ifindex: ia }));
    assert!(matches!(e, Err(NetworkError::ConfigError(ConfigError::ConfigModifierError(_)))));
    let e = net.apply_modifier(&Remove(IsisRouter { router: a }));
    assert!(matches!(e, Err(NetworkError::ConfigError(ConfigError::ConfigModifierError(_)))));
    assert_eq!(net.current_config(), &c);

    // removing everything at once works, since the patch is ordered
    net.set_config(&Config::new()).unwrap();
    assert!(net.current_config().is_empty());
    assert!(net.get_router(a).unwrap().isis().is_none());
}

#[test]
fn test_static_route_next_hop() {
    let (mut net, a, _, _, _) = two_routers();
    let prefix = Prefix::new(Ipv4Addr::new(172, 16, 0, 0), 16);

    let e = net.apply_modifier(&Insert(StaticRoute {
        router: a,
        prefix,
        next_hop: Ipv4Addr::new(10, 9, 9, 9),
        cost: 1,
    }));
    assert_eq!(
        e,
        Err(NetworkError::DeviceError(DeviceError::NextHopNotConnected(Ipv4Addr::new(10, 9, 9, 9))))
    );

    let good = StaticRoute { router: a, prefix, next_hop: Ipv4Addr::new(10, 0, 0, 2), cost: 1 };
    net.apply_modifier(&Insert(good.clone())).unwrap();
    assert!(net.get_router(a).unwrap().static_routes().contains_key(&prefix));

    // an update to an unreachable gateway leaves the old route in place
    let bad = StaticRoute { router: a, prefix, next_hop: Ipv4Addr::new(10, 9, 9, 9), cost: 1 };
    assert!(net.apply_modifier(&Update { from: good.clone(), to: bad }).is_err());
    assert_eq!(
        net.get_router(a).unwrap().static_routes()[&prefix].next_hop,
        Ipv4Addr::new(10, 0, 0, 2)
    );
    assert_eq!(net.current_config().get(&good.key()), Some(&good));
}
