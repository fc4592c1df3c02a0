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

//! Example topologies, built and configured, ready to be simulated.

use isis_sim::netsim::config::{Config, ConfigExpr::*, ConfigExprKey};
use isis_sim::netsim::route_map::RouteMapBuilder;
use isis_sim::netsim::{DeviceId, Network, Prefix};
use isis_sim::Error;

use clap::ArgEnum;
use std::fmt;
use std::net::Ipv4Addr;

#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Four routers in a line
    Line,
    /// Six routers in a ring, with one chord
    Ring,
    /// Four routers on a LAN segment, one of them connected to a stub router
    Lan,
    /// The Abilene network, with weights roughly following the distances
    Abilene,
    /// Two sites, each a LAN, connected by two point to point links. One border router exports a
    /// static route, the other site prefers it less.
    Campus,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Topology::Line => write!(f, "Line"),
            Topology::Ring => write!(f, "Ring"),
            Topology::Lan => write!(f, "Lan"),
            Topology::Abilene => write!(f, "Abilene"),
            Topology::Campus => write!(f, "Campus"),
        }
    }
}

impl Topology {
    /// Build the network and apply its configuration. Nothing is simulated yet.
    pub fn build(&self) -> Result<Network, Error> {
        let mut b = Builder::default();
        match self {
            Topology::Line => {
                let r = b.routers(&["r1", "r2", "r3", "r4"]);
                b.p2p(r[0], r[1], 10)?;
                b.p2p(r[1], r[2], 10)?;
                b.p2p(r[2], r[3], 10)?;
            }
            Topology::Ring => {
                let r = b.routers(&["r1", "r2", "r3", "r4", "r5", "r6"]);
                for i in 0..r.len() {
                    b.p2p(r[i], r[(i + 1) % r.len()], 10)?;
                }
                b.p2p(r[0], r[3], 25)?;
            }
            Topology::Lan => {
                let r = b.routers(&["r1", "r2", "r3", "r4", "stub"]);
                b.lan(&r[0..4], &[64, 64, 100, 64], 10)?;
                b.p2p(r[3], r[4], 5)?;
            }
            Topology::Abilene => {
                let r = b.routers(&[
                    "Sunnyvale",
                    "Seattle",
                    "Denver",
                    "LosAngeles",
                    "Houston",
                    "KansasCity",
                    "Indianapolis",
                    "Atlanta",
                    "WashingtonDC",
                    "NewYork",
                    "Chicago",
                ]);
                let (sv, se, dv, la, hs, ks, ip, at, dc, ny, ch) =
                    (r[0], r[1], r[2], r[3], r[4], r[5], r[6], r[7], r[8], r[9], r[10]);
                b.p2p(sv, se, 11)?;
                b.p2p(sv, dv, 15)?;
                b.p2p(sv, la, 5)?;
                b.p2p(se, dv, 16)?;
                b.p2p(dv, ks, 9)?;
                b.p2p(la, hs, 22)?;
                b.p2p(ks, hs, 10)?;
                b.p2p(ks, ip, 7)?;
                b.p2p(hs, at, 12)?;
                b.p2p(ip, at, 7)?;
                b.p2p(ip, ch, 3)?;
                b.p2p(at, dc, 9)?;
                b.p2p(ch, ny, 11)?;
                b.p2p(dc, ny, 3)?;
            }
            Topology::Campus => {
                let r = b.routers(&["a1", "a2", "a3", "b1", "b2", "b3", "ext"]);
                b.lan(&r[0..3], &[64, 64, 64], 10)?;
                b.lan(&r[3..6], &[64, 64, 64], 10)?;
                b.p2p(r[0], r[3], 20)?;
                b.p2p(r[1], r[4], 30)?;
                // ext does not run the protocol
                let gw = b.stub(r[2], r[6])?;
                let internet = Prefix::new(Ipv4Addr::new(0, 0, 0, 0), 0);
                let border = r[2];
                b.config.add(StaticRoute { router: border, prefix: internet, next_hop: gw, cost: 1 })?;
                b.config.add(ImportPolicy {
                    router: r[4],
                    map: RouteMapBuilder::new()
                        .order(10)
                        .allow()
                        .match_external(true)
                        .add_cost(50)
                        .build(),
                })?;
            }
        }
        b.finish()
    }
}

/// Adds routers and links, numbering loopbacks and subnets, and collects the configuration.
#[derive(Default)]
struct Builder {
    net: Network,
    config: Config,
    routers: Vec<DeviceId>,
    subnets: u8,
}

impl Builder {
    fn routers(&mut self, names: &[&str]) -> Vec<DeviceId> {
        names
            .iter()
            .map(|name| {
                let n = self.routers.len() as u8 + 1;
                let r = self.net.add_router(*name, Ipv4Addr::new(n, n, n, n));
                self.routers.push(r);
                r
            })
            .collect()
    }

    fn next_subnet(&mut self) -> u8 {
        self.subnets += 1;
        self.subnets
    }

    fn enable(&mut self, router: DeviceId) -> Result<(), Error> {
        if self.config.get(&ConfigExprKey::IsisRouter { router }).is_none() {
            self.config.add(IsisRouter { router })?;
        }
        Ok(())
    }

    fn p2p(&mut self, a: DeviceId, b: DeviceId, cost: u32) -> Result<(), Error> {
        let s = self.next_subnet();
        let (_, ia, ib) =
            self.net.add_link(a, Ipv4Addr::new(10, 0, s, 1), b, Ipv4Addr::new(10, 0, s, 2), 30)?;
        for (router, ifindex) in [(a, ia), (b, ib)] {
            self.enable(router)?;
            self.config.add(IsisInterface { router, ifindex })?;
            self.config.add(InterfaceCost { router, ifindex, cost })?;
        }
        Ok(())
    }

    fn lan(&mut self, members: &[DeviceId], priorities: &[u8], cost: u32) -> Result<(), Error> {
        let s = self.next_subnet();
        let addrs: Vec<(DeviceId, Ipv4Addr)> = members
            .iter()
            .enumerate()
            .map(|(i, r)| (*r, Ipv4Addr::new(192, 168, s, i as u8 + 1)))
            .collect();
        let (_, ifaces) = self.net.add_lan(&addrs, 24)?;
        for ((router, ifindex), priority) in members.iter().zip(ifaces).zip(priorities) {
            let (router, priority) = (*router, *priority);
            self.enable(router)?;
            self.config.add(IsisInterface { router, ifindex })?;
            self.config.add(InterfaceCost { router, ifindex, cost })?;
            self.config.add(InterfacePriority { router, ifindex, priority })?;
        }
        Ok(())
    }

    /// Link to a router outside of the protocol. Returns the address of the far end.
    fn stub(&mut self, a: DeviceId, b: DeviceId) -> Result<Ipv4Addr, Error> {
        let s = self.next_subnet();
        let far = Ipv4Addr::new(10, 0, s, 2);
        self.net.add_link(a, Ipv4Addr::new(10, 0, s, 1), b, far, 30)?;
        Ok(far)
    }

    fn finish(mut self) -> Result<Network, Error> {
        self.net.set_config(&self.config)?;
        Ok(self.net)
    }
}
