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

use isis_sim::netsim::{printer, DeviceError, DeviceId, LinkId, Network, NetworkError};

use clap::{ArgEnum, Parser};
use log::*;
use rand::prelude::*;
use std::error::Error;
use std::time::Duration;

mod example_topologies;
use example_topologies::*;

fn main() -> Result<(), Box<dyn Error>> {
    // run clap
    let args = CommandLineArguments::parse();

    // initialize the env logger
    pretty_env_logger::init();

    let mut net = args.topology.build()?;
    let seed = args.seed.unwrap_or_else(|| thread_rng().gen());
    if args.jitter > 0 {
        net.set_jitter(args.jitter, seed);
    }
    if args.duplication > 0.0 {
        net.set_duplication(args.duplication, seed);
    }
    if let Some(limit) = args.msg_limit {
        net.set_msg_limit(Some(limit));
    }

    info!("Simulating {} for {}s (seed {})", args.topology, args.duration, seed);
    let total = Duration::from_secs(args.duration);
    match args.fail_link {
        Some(link) => {
            net.run_for(total / 2)?;
            info!("Taking down link {}", link);
            net.set_link_state(LinkId(link), false)?;
            net.run_for(total - total / 2)?;
        }
        None => net.run_for(total)?,
    }

    let routers = match args.router.as_ref() {
        Some(name) => vec![net.get_router_id(name)?],
        None => net.get_routers(),
    };
    for show in args.show.iter() {
        if *show == Show::Config {
            printer::print_config(&net, net.current_config())?;
            continue;
        }
        for router in routers.iter() {
            for line in show_lines(&net, *show, *router)? {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn show_lines(net: &Network, show: Show, router: DeviceId) -> Result<Vec<String>, NetworkError> {
    let r = net.get_router(router)?;
    let result = match show {
        Show::Interfaces => Ok(printer::interfaces(r)),
        Show::Adjacencies => printer::adjacencies(r),
        Show::Lsdb => printer::lsdb(r, false),
        Show::LsdbDetail => printer::lsdb(r, true),
        Show::Ted => printer::ted(r),
        Show::Spf => printer::spf(r),
        Show::Routes => Ok(printer::routing_table(r)),
        Show::Stats => printer::stats(r),
        Show::Advt => printer::advt(r),
        Show::Paths => {
            let mut lines = vec![format!("Paths from {}", r.name())];
            for target in net.get_routers().into_iter().filter(|t| *t != router) {
                let dst = net.get_router(target)?.loopback();
                lines.push(format!("  {:<15} {}", dst, printer::route(net, router, dst)?));
            }
            Ok(lines)
        }
        Show::Config => Ok(Vec::new()),
    };
    match result {
        Err(NetworkError::DeviceError(DeviceError::IsisNotEnabled)) => {
            Ok(vec![format!("{}: IS-IS is not enabled", r.name())])
        }
        result => result,
    }
}

/// Simulate one of the example topologies, and show the state of the routers afterwards. Set
/// `RUST_LOG` (for instance `RUST_LOG=isis::adj=info,isis::spf=debug`) to follow the protocol.
#[derive(Parser, Debug)]
#[clap(name = "IsisSim", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Topology to simulate
    #[clap(arg_enum)]
    topology: Topology,
    /// Simulated time in seconds
    #[clap(short = 'd', long, default_value = "60")]
    duration: u64,
    /// Maximum additional delay of every frame, in milliseconds
    #[clap(short = 'j', long, default_value = "0")]
    jitter: u64,
    /// Probability to deliver a frame twice
    #[clap(long, default_value = "0")]
    duplication: f64,
    /// Random seed for jitter and duplication. A random one is chosen if not set
    #[clap(short = 's', long)]
    seed: Option<u64>,
    /// Take this link down after half of the simulated time
    #[clap(short = 'f', long)]
    fail_link: Option<usize>,
    /// Stop with an error after this many events
    #[clap(short = 'm', long)]
    msg_limit: Option<usize>,
    /// Only show this router
    #[clap(short = 'r', long)]
    router: Option<String>,
    /// What to show after the simulation (can be given multiple times)
    #[clap(arg_enum, short = 'S', long, default_value = "routes")]
    show: Vec<Show>,
}

#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Show {
    Interfaces,
    Adjacencies,
    Lsdb,
    LsdbDetail,
    Ted,
    Spf,
    Routes,
    Stats,
    Advt,
    Paths,
    Config,
}
