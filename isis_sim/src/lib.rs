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

#![deny(missing_docs)]

//! # IsisSim: a link-state routing engine on a simulated network
//! This library implements an IS-IS-like interior gateway protocol and runs it on a discrete-event
//! network simulator. Routers discover their neighbors with Hellos, pack their routing facts into
//! size-bounded link-state packets, flood them reliably, and compute shortest-path routes from the
//! resulting link-state database.
//!
//! ## Structure
//!
//! - **[`NetSim`](netsim)**: The network simulator. See the main structure
//!   [`Network`](netsim::Network). It owns the routers, the links between them, the event queue
//!   and the network-wide [`Config`](netsim::config::Config).
//!
//! - **[`Isis`](isis)**: The link-state protocol instance running on every router. It contains
//!   the adjacency state machine, DIS election on LAN segments, the advertisement (fragmentation)
//!   manager, the link-state database, the flooding engine, the traffic engineering database and
//!   the SPF computation.
//!
//! - **[`Rib`](rib)**: The routing table of a router, with protocol preference and longest prefix
//!   match lookup.
//!
//! ## Example usage
//!
//! ```rust
//! use isis_sim::netsim::{Network, config::{Config, ConfigExpr}};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut net = Network::new();
//!     let a = net.add_router("A", Ipv4Addr::new(1, 1, 1, 1));
//!     let b = net.add_router("B", Ipv4Addr::new(2, 2, 2, 2));
//!     let (_, a_if, b_if) =
//!         net.add_link(a, Ipv4Addr::new(10, 0, 0, 1), b, Ipv4Addr::new(10, 0, 0, 2), 30)?;
//!
//!     let mut c = Config::new();
//!     c.add(ConfigExpr::IsisRouter { router: a })?;
//!     c.add(ConfigExpr::IsisRouter { router: b })?;
//!     c.add(ConfigExpr::IsisInterface { router: a, ifindex: a_if })?;
//!     c.add(ConfigExpr::IsisInterface { router: b, ifindex: b_if })?;
//!     net.set_config(&c)?;
//!
//!     net.run_for(Duration::from_secs(30))?;
//!     assert_eq!(net.get_route(a, Ipv4Addr::new(2, 2, 2, 2))?, vec![a, b]);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod isis;
pub mod netsim;
pub mod rib;

pub use error::Error;

mod test;
