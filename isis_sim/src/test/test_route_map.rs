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

use crate::netsim::route_map::*;
use crate::netsim::{Prefix, RouterId};
use std::net::Ipv4Addr;

fn route(prefix: Prefix, originator: RouterId, cost: u32, external: bool) -> PolicyRoute {
    PolicyRoute { prefix, originator, cost, external }
}

fn p(a: u8, b: u8, len: u8) -> Prefix {
    Prefix::new(Ipv4Addr::new(10, a, b, 0), len)
}

#[test]
fn simple_matches() {
    let r1: RouterId = Ipv4Addr::new(1, 1, 1, 1).into();
    let r2: RouterId = Ipv4Addr::new(2, 2, 2, 2).into();
    let default_route = route(p(1, 0, 16), r1, 10, false);

    // Match on prefix
    let map = RouteMapBuilder::new().order(10).deny().match_prefix(p(1, 0, 16)).build();
    assert_eq!(map.apply(default_route), (true, None));
    let other = route(p(2, 0, 16), r1, 10, false);
    assert_eq!(map.apply(other), (false, Some(other)));

    // Match on prefix within a supernet
    let supernet = Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 8);
    let map = RouteMapBuilder::new().order(10).deny().match_prefix_within(supernet).build();
    assert!(map.matches(&default_route));
    assert!(map.matches(&route(p(1, 1, 24), r1, 10, false)));
    // a shorter prefix is not inside the supernet, even if it contains it
    assert!(!map.matches(&route(Prefix::new(Ipv4Addr::new(0, 0, 0, 0), 0), r1, 10, false)));
    assert!(!map.matches(&route(Prefix::new(Ipv4Addr::new(11, 0, 0, 0), 8), r1, 10, false)));

    // Match on originator
    let map = RouteMapBuilder::new().order(10).deny().match_originator(r1).build();
    assert!(map.matches(&default_route));
    assert!(!map.matches(&route(p(1, 0, 16), r2, 10, false)));

    // Match on cost range
    let map = RouteMapBuilder::new().order(10).deny().match_cost_range(5, 10).build();
    assert!(map.matches(&default_route));
    assert!(map.matches(&route(p(1, 0, 16), r1, 5, false)));
    assert!(!map.matches(&route(p(1, 0, 16), r1, 11, false)));

    // Match on external routes
    let map = RouteMapBuilder::new().order(10).deny().match_external(true).build();
    assert!(!map.matches(&default_route));
    assert!(map.matches(&route(p(1, 0, 16), r1, 10, true)));

    // All conditions must match
    let map = RouteMapBuilder::new()
        .order(10)
        .deny()
        .match_originator(r1)
        .match_external(true)
        .build();
    assert!(!map.matches(&default_route));
    assert!(map.matches(&route(p(1, 0, 16), r1, 10, true)));
    assert!(!map.matches(&route(p(1, 0, 16), r2, 10, true)));

    // No condition matches everything
    let map = RouteMapBuilder::new().order(10).deny().build();
    assert!(map.matches(&default_route));
}

#[test]
fn match_clauses() {
    assert!(RouteMapMatchClause::Range(5, 10).matches(&10));
    assert!(!RouteMapMatchClause::RangeExclusive(5, 10).matches(&10));
    assert!(RouteMapMatchClause::RangeExclusive(5, 10).matches(&5));
    assert!(RouteMapMatchClause::Equal(7).matches(&7));
    assert!(!RouteMapMatchClause::Equal(7).matches(&8));
}

#[test]
fn set_actions() {
    let r1: RouterId = Ipv4Addr::new(1, 1, 1, 1).into();
    let map = RouteMapBuilder::new().order(10).allow().set_cost(100).build();
    assert_eq!(
        map.apply(route(p(1, 0, 16), r1, 10, false)),
        (true, Some(route(p(1, 0, 16), r1, 100, false)))
    );

    let map = RouteMapBuilder::new().order(10).allow().add_cost(5).build();
    assert_eq!(map.apply(route(p(1, 0, 16), r1, 10, false)).1.map(|r| r.cost), Some(15));

    // adding never overflows
    let expensive = route(p(1, 0, 16), r1, u32::MAX, false);
    assert_eq!(map.apply(expensive).1.map(|r| r.cost), Some(u32::MAX));
}

#[test]
fn first_match_decides() {
    let r1: RouterId = Ipv4Addr::new(1, 1, 1, 1).into();
    let maps = vec![
        RouteMapBuilder::new().order(10).allow().match_prefix(p(1, 0, 16)).set_cost(1).build(),
        RouteMapBuilder::new().order(20).deny().match_prefix_within(p(0, 0, 8)).build(),
        RouteMapBuilder::new().order(30).allow().add_cost(1000).build(),
    ];

    // matched by the first map only
    let first = route(p(1, 0, 16), r1, 10, false);
    assert_eq!(apply_route_maps(&maps, first).map(|r| r.cost), Some(1));
    // denied by the second one, the third one is never reached
    assert_eq!(apply_route_maps(&maps, route(p(2, 0, 16), r1, 10, false)), None);
    // only the last one matches
    let outside = route(Prefix::new(Ipv4Addr::new(172, 16, 0, 0), 12), r1, 10, false);
    assert_eq!(apply_route_maps(&maps, outside).map(|r| r.cost), Some(1010));
    // no maps: allowed unchanged
    assert_eq!(apply_route_maps(&[], outside), Some(outside));
}

#[test]
fn insert_and_remove_maps() {
    let mut maps = Vec::new();
    insert_route_map(&mut maps, RouteMapBuilder::new().order(20).deny().build()).unwrap();
    insert_route_map(&mut maps, RouteMapBuilder::new().order(10).allow().build()).unwrap();
    insert_route_map(&mut maps, RouteMapBuilder::new().order(30).allow().build()).unwrap();
    assert_eq!(maps.iter().map(|m| m.order()).collect::<Vec<_>>(), vec![10, 20, 30]);

    // the order must be unique
    let duplicate = RouteMapBuilder::new().order(20).allow().build();
    assert_eq!(insert_route_map(&mut maps, duplicate), Err(20));

    let removed = remove_route_map(&mut maps, 20).unwrap();
    assert!(removed.state().is_deny());
    assert!(remove_route_map(&mut maps, 20).is_none());
    assert_eq!(maps.len(), 2);
}

#[test]
fn display() {
    let r1: RouterId = Ipv4Addr::new(1, 1, 1, 1).into();
    let map = RouteMapBuilder::new()
        .order(10)
        .allow()
        .match_originator(r1)
        .match_cost_range(1, 5)
        .set_cost(7)
        .build();
    assert_eq!(map.conds()[1].to_string(), "cost in (1..5)");
    assert_eq!(map.actions()[0].to_string(), "set cost 7");
    assert_eq!(RouteMapDirection::Export.to_string(), "export");
}
