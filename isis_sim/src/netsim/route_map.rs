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

//! # Route-Maps
//!
//! This module contains the route maps used as import and export policy of the link-state
//! protocol. An import policy filters (and re-prices) the routes computed by SPF before they are
//! installed into the routing table. An export policy decides which externally learned (static)
//! routes a router advertises into the protocol.

use crate::netsim::{Cost, Prefix, RouterId};
use std::fmt;

/// A route as seen by a route map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyRoute {
    /// Destination prefix
    pub prefix: Prefix,
    /// Router id of the originator. For exported routes, this is the exporting router itself.
    pub originator: RouterId,
    /// Cost of the route
    pub cost: Cost,
    /// Whether the route was learned from outside of the protocol
    pub external: bool,
}

/// # Main RouteMap structure
/// A route map can match on a route, to change its cost, or to block it. Use the
/// [`RouteMapBuilder`] type to conveniently build a route map:
///
/// ```
/// # use isis_sim::netsim::route_map::*;
/// # use isis_sim::netsim::{RouterId, Prefix};
/// # use std::net::Ipv4Addr;
/// let map = RouteMapBuilder::new()
///     .order(10)
///     .allow()
///     .match_originator(RouterId::from(Ipv4Addr::new(2, 2, 2, 2)))
///     .match_prefix_within(Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 8))
///     .set_cost(100)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMap {
    /// In which order should the route maps be checked. Lower values mean that they are checked
    /// earlier.
    pub(crate) order: usize,
    /// Either Allow or Deny. If the first matching RouteMap is deny, the route is denied.
    pub(crate) state: RouteMapState,
    /// Match statements of the RouteMap, connected in an and
    pub(crate) conds: Vec<RouteMapMatch>,
    /// Set actions of the RouteMap
    pub(crate) set: Vec<RouteMapSet>,
}

impl RouteMap {
    /// Generate a new route map
    pub fn new(
        order: usize,
        state: RouteMapState,
        conds: Vec<RouteMapMatch>,
        set: Vec<RouteMapSet>,
    ) -> Self {
        Self { order, state, conds, set }
    }

    /// Apply the route map on a route. The first element tells whether the route map matched.
    /// The second is `None` if the route matched and the state is `Deny`, or the (possibly
    /// modified) route otherwise.
    pub fn apply(&self, mut route: PolicyRoute) -> (bool, Option<PolicyRoute>) {
        match self.conds.iter().all(|c| c.matches(&route)) {
            true => {
                if self.state.is_deny() {
                    (true, None)
                } else {
                    self.set.iter().for_each(|s| s.apply(&mut route));
                    (true, Some(route))
                }
            }
            false => (false, Some(route)),
        }
    }

    /// Returns the order of the RouteMap.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns the state, either Allow or Deny.
    pub fn state(&self) -> RouteMapState {
        self.state
    }

    /// Return a reference to the conditions
    pub fn conds(&self) -> &Vec<RouteMapMatch> {
        &self.conds
    }

    /// Return a reference to the actions
    pub fn actions(&self) -> &Vec<RouteMapSet> {
        &self.set
    }

    /// Returns wether the Route Map matches the given route
    pub fn matches(&self, route: &PolicyRoute) -> bool {
        self.conds.iter().all(|c| c.matches(route))
    }
}

/// Apply a list of route maps, sorted by their order. The first matching route map decides. A
/// route that matches no route map is allowed unchanged.
pub fn apply_route_maps(maps: &[RouteMap], mut route: PolicyRoute) -> Option<PolicyRoute> {
    for map in maps.iter() {
        route = match map.apply(route) {
            (true, result) => return result,
            (false, Some(r)) => r,
            (false, None) => unreachable!(),
        };
    }
    Some(route)
}

/// Insert a route map into a list sorted by order. Fails if the order is already taken.
pub(crate) fn insert_route_map(maps: &mut Vec<RouteMap>, map: RouteMap) -> Result<(), usize> {
    match maps.binary_search_by(|probe| probe.order.cmp(&map.order)) {
        Ok(_) => Err(map.order),
        Err(pos) => {
            maps.insert(pos, map);
            Ok(())
        }
    }
}

/// Remove the route map with the given order. Returns `None` if it does not exist.
pub(crate) fn remove_route_map(maps: &mut Vec<RouteMap>, order: usize) -> Option<RouteMap> {
    match maps.binary_search_by(|probe| probe.order.cmp(&order)) {
        Ok(pos) => Some(maps.remove(pos)),
        Err(_) => None,
    }
}

/// # Route Map Builder
///
/// Convenience type to build a route map. You are required to at least call `order` and `state`
/// once on the builder, before you can call `build`. If you don't call `cond` (or any function
/// adding a `match` statement) on the builder, it will match on any route.
#[derive(Debug, Default)]
pub struct RouteMapBuilder {
    order: Option<usize>,
    state: Option<RouteMapState>,
    conds: Vec<RouteMapMatch>,
    set: Vec<RouteMapSet>,
}

impl RouteMapBuilder {
    /// Create an empty RouteMapBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the order of the Route-Map.
    pub fn order(&mut self, order: usize) -> &mut Self {
        self.order = Some(order);
        self
    }

    /// Set the state of the Route-Map.
    pub fn state(&mut self, state: RouteMapState) -> &mut Self {
        self.state = Some(state);
        self
    }

    /// Set the state of the Route-Map to allow.
    pub fn allow(&mut self) -> &mut Self {
        self.state = Some(RouteMapState::Allow);
        self
    }

    /// Set the state of the Route-Map to deny.
    pub fn deny(&mut self) -> &mut Self {
        self.state = Some(RouteMapState::Deny);
        self
    }

    /// Add a match condition to the Route-Map.
    pub fn cond(&mut self, cond: RouteMapMatch) -> &mut Self {
        self.conds.push(cond);
        self
    }

    /// Match on the exact prefix
    pub fn match_prefix(&mut self, prefix: Prefix) -> &mut Self {
        self.conds.push(RouteMapMatch::Prefix(RouteMapMatchClause::Equal(prefix)));
        self
    }

    /// Match on every prefix inside the given supernet (including the supernet itself)
    pub fn match_prefix_within(&mut self, supernet: Prefix) -> &mut Self {
        self.conds.push(RouteMapMatch::PrefixWithin(supernet));
        self
    }

    /// Match on the originating router
    pub fn match_originator(&mut self, originator: RouterId) -> &mut Self {
        self.conds.push(RouteMapMatch::Originator(originator));
        self
    }

    /// Match on the cost, with an inclusive range
    pub fn match_cost_range(&mut self, from: Cost, to: Cost) -> &mut Self {
        self.conds.push(RouteMapMatch::Cost(RouteMapMatchClause::Range(from, to)));
        self
    }

    /// Match on external routes
    pub fn match_external(&mut self, external: bool) -> &mut Self {
        self.conds.push(RouteMapMatch::External(external));
        self
    }

    /// Add a set expression to the Route-Map.
    pub fn add_set(&mut self, set: RouteMapSet) -> &mut Self {
        self.set.push(set);
        self
    }

    /// Add a set expression, overwriting the cost
    pub fn set_cost(&mut self, cost: Cost) -> &mut Self {
        self.set.push(RouteMapSet::Cost(cost));
        self
    }

    /// Add a set expression, adding to the cost
    pub fn add_cost(&mut self, cost: Cost) -> &mut Self {
        self.set.push(RouteMapSet::AddCost(cost));
        self
    }

    /// Build the route-map.
    ///
    /// # Panics
    /// The function panics in the following cases:
    /// - The order is not set (`order` was not called),
    /// - The state is not set (neither `state`, `allow` nor `deny` were called),
    pub fn build(&self) -> RouteMap {
        let order = match self.order {
            Some(o) => o,
            None => panic!("Order was not set for a Route-Map!"),
        };
        let state = match self.state {
            Some(s) => s,
            None => panic!("State was not set for a Route-Map!"),
        };
        let conds = self.conds.clone();
        let set = if state.is_deny() { vec![] } else { self.set.clone() };
        RouteMap::new(order, state, conds, set)
    }
}

/// State of a route map, which can either be allow or deny
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMapState {
    /// Set the state to allow
    Allow,
    /// Set the state to deny
    Deny,
}

impl RouteMapState {
    /// Returns `true` if the state is set to `Allow`.
    pub fn is_allow(&self) -> bool {
        self == &Self::Allow
    }

    /// Returns `true` if the state is set to `Deny`.
    pub fn is_deny(&self) -> bool {
        self == &Self::Deny
    }
}

/// Match statement of the route map. Can be combined to generate complex match statements
#[derive(Debug, Clone, PartialEq)]
pub enum RouteMapMatch {
    /// Matches on the Prefix (exact value or a range)
    Prefix(RouteMapMatchClause<Prefix>),
    /// Matches on every prefix inside a supernet
    PrefixWithin(Prefix),
    /// Matches on the originating router
    Originator(RouterId),
    /// Matches on the cost (exact value or a range)
    Cost(RouteMapMatchClause<Cost>),
    /// Matches on external (or internal) routes
    External(bool),
}

impl RouteMapMatch {
    /// Returns true if the route matches the expression
    pub fn matches(&self, route: &PolicyRoute) -> bool {
        match self {
            Self::Prefix(clause) => clause.matches(&route.prefix),
            Self::PrefixWithin(net) => {
                route.prefix.len() >= net.len() && net.contains(route.prefix.addr())
            }
            Self::Originator(r) => route.originator == *r,
            Self::Cost(clause) => clause.matches(&route.cost),
            Self::External(e) => route.external == *e,
        }
    }
}

/// Generic RouteMapMatchClause to match on all, a range or on a specific element
#[derive(Debug, Clone, PartialEq)]
pub enum RouteMapMatchClause<T> {
    /// Matches a range of values (inclusive)
    Range(T, T),
    /// Matches a range of values (exclusive)
    RangeExclusive(T, T),
    /// Matches the exact value
    Equal(T),
}

impl<T> RouteMapMatchClause<T>
where
    T: PartialOrd + PartialEq,
{
    /// Returns true if the value matches the clause.
    pub fn matches(&self, val: &T) -> bool {
        match self {
            Self::Range(min, max) => val >= min && val <= max,
            Self::RangeExclusive(min, max) => val >= min && val < max,
            Self::Equal(x) => val == x,
        }
    }
}

impl<T> fmt::Display for RouteMapMatchClause<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMapMatchClause::Range(a, b) => write!(f, "in ({}..{})", a, b),
            RouteMapMatchClause::RangeExclusive(a, b) => write!(f, "in [{}..{})", a, b),
            RouteMapMatchClause::Equal(a) => write!(f, "== {}", a),
        }
    }
}

impl fmt::Display for RouteMapMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(c) => write!(f, "prefix {}", c),
            Self::PrefixWithin(p) => write!(f, "prefix within {}", p),
            Self::Originator(r) => write!(f, "originator == {}", r),
            Self::Cost(c) => write!(f, "cost {}", c),
            Self::External(true) => write!(f, "external"),
            Self::External(false) => write!(f, "internal"),
        }
    }
}

/// Set action, if a route map matches
#[derive(Debug, Clone, PartialEq)]
pub enum RouteMapSet {
    /// overwrite the cost
    Cost(Cost),
    /// add to the cost
    AddCost(Cost),
}

impl RouteMapSet {
    /// Apply the set statement to a route
    pub fn apply(&self, route: &mut PolicyRoute) {
        match self {
            Self::Cost(c) => route.cost = *c,
            Self::AddCost(c) => route.cost = route.cost.saturating_add(*c),
        }
    }
}

impl fmt::Display for RouteMapSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cost(c) => write!(f, "set cost {}", c),
            Self::AddCost(c) => write!(f, "add cost {}", c),
        }
    }
}

/// Direction of the Route Map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMapDirection {
    /// Import policy: filters routes computed by SPF
    Import,
    /// Export policy: filters external routes advertised into the protocol
    Export,
}

impl fmt::Display for RouteMapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Export => write!(f, "export"),
        }
    }
}
