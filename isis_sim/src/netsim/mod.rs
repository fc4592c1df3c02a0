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

#![deny(missing_docs, missing_debug_implementations)]

//! # NetSim
//!
//! This is a discrete-event simulator for networks of routers running the link-state protocol.
//! Routers are connected by point-to-point links or by multi-access LAN segments. Every frame a
//! router sends travels over the link with a fixed delay, and is then handed to every other
//! router attached to it.
//!
//! ## Example usage
//!
//! The following example builds a line of three routers `A - B - C`, enables the protocol
//! everywhere, and checks the forwarding path before and after the link `A - B` fails.
//!
//! ```rust
//! use isis_sim::netsim::{Network, NetworkError};
//! use isis_sim::netsim::config::{Config, ConfigExpr};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut t = Network::new();
//!
//!     let a = t.add_router("A", Ipv4Addr::new(1, 1, 1, 1));
//!     let b = t.add_router("B", Ipv4Addr::new(2, 2, 2, 2));
//!     let c = t.add_router("C", Ipv4Addr::new(3, 3, 3, 3));
//!
//!     let (ab, a_ab, b_ab) =
//!         t.add_link(a, Ipv4Addr::new(10, 0, 0, 1), b, Ipv4Addr::new(10, 0, 0, 2), 30)?;
//!     let (_, b_bc, c_bc) =
//!         t.add_link(b, Ipv4Addr::new(10, 0, 1, 1), c, Ipv4Addr::new(10, 0, 1, 2), 30)?;
//!
//!     let mut conf = Config::new();
//!     for r in [a, b, c].iter() {
//!         conf.add(ConfigExpr::IsisRouter { router: *r })?;
//!     }
//!     for (r, i) in [(a, a_ab), (b, b_ab), (b, b_bc), (c, c_bc)].iter() {
//!         conf.add(ConfigExpr::IsisInterface { router: *r, ifindex: *i })?;
//!     }
//!     t.set_config(&conf)?;
//!     t.run_for(Duration::from_secs(30))?;
//!
//!     let c_lo = Ipv4Addr::new(3, 3, 3, 3);
//!     assert_eq!(t.get_route(a, c_lo)?, vec![a, b, c]);
//!
//!     t.set_link_state(ab, false)?;
//!     t.run_for(Duration::from_secs(30))?;
//!     assert!(matches!(t.get_route(a, c_lo), Err(NetworkError::ForwardingBlackHole(_))));
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod event;
pub(crate) mod network;
pub mod printer;
pub mod route_map;
pub mod router;
pub(crate) mod types;

pub use event::{Event, EventQueue, Frame, Job, Timer, TimerHandle};
pub use network::{Link, Network, LINK_DELAY};
pub use router::{Interface, InterfaceKind, Router, StaticRoute};
pub use types::{
    ConfigError, Cost, DeviceError, DeviceId, IfIndex, LinkId, LspId, MacAddr, NetworkError,
    PhysicalNetwork, Prefix, RouterId, SimTime, SystemId,
};
