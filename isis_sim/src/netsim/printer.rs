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

//! # Helper (printer) functions for the Network
//! Module containing helper functions to get formatted strings and print information about the
//! network. Every `show` function returns one `String` per line.

use crate::isis::packet::{IsReach, Tlv};
use crate::isis::{IsisInstance, Lsp};
use crate::netsim::config::{Config, ConfigExpr, ConfigModifier, ConfigPatch};
use crate::netsim::network::Network;
use crate::netsim::route_map::*;
use crate::netsim::router::Router;
use crate::netsim::{DeviceError, DeviceId, NetworkError};
use std::net::Ipv4Addr;

fn isis(router: &Router) -> Result<&IsisInstance, NetworkError> {
    router.isis().ok_or(NetworkError::DeviceError(DeviceError::IsisNotEnabled))
}

fn secs(ms: u64) -> String {
    format!("{}.{:03}s", ms / 1000, ms % 1000)
}

/// Interfaces of the router, together with their protocol state.
pub fn interfaces(router: &Router) -> Vec<String> {
    let isis = router.isis();
    let mut result = vec![format!("Interfaces of {}", router.name())];
    for iface in router.interfaces().values() {
        let mut line = format!(
            "  {} [{}] {}/{} {} {} {}",
            iface.name,
            iface.ifindex,
            iface.addr,
            iface.mask_len,
            iface.mac,
            iface.kind,
            if iface.up { "up" } else { "down" }
        );
        match isis.and_then(|i| i.interface(iface.ifindex)) {
            Some(i) => {
                line.push_str(&format!(", cost {}, priority {}", i.cost(), i.priority()));
                if let Some(group) = i.group() {
                    line.push_str(&format!(", group {}", group));
                }
                if let Some(dis) = i.dis() {
                    line.push_str(&format!(", DIS {}", dis));
                }
            }
            None => line.push_str(", IS-IS disabled"),
        }
        result.push(line);
    }
    result
}

/// Adjacencies of the router
pub fn adjacencies(router: &Router) -> Result<Vec<String>, NetworkError> {
    let isis = isis(router)?;
    let mut result = vec![format!("Adjacencies of {}", router.name())];
    for (ifindex, iface) in isis.interfaces() {
        for adj in iface.adjacencies().values() {
            result.push(format!(
                "  {} {} ({}) state {}, ip {}, mac {}, priority {}, hold {}s{}",
                ifindex,
                adj.neighbor(),
                adj.hostname().unwrap_or("?"),
                adj.state(),
                adj.remote_ip(),
                adj.remote_mac(),
                adj.priority(),
                adj.hold_time(),
                match adj.uptime() {
                    Some(t) => format!(", up for {}", secs(t)),
                    None => String::new(),
                }
            ));
        }
    }
    Ok(result)
}

/// The link-state database of the router. With `detail`, the TLVs of every LSP are listed.
pub fn lsdb(router: &Router, detail: bool) -> Result<Vec<String>, NetworkError> {
    let isis = isis(router)?;
    let mut result = vec![format!("LSDB of {} ({} LSPs)", router.name(), isis.lsdb().len())];
    for (id, entry) in isis.lsdb().iter() {
        let lsp = entry.lsp();
        let mut flags = Vec::new();
        if lsp.is_purge() {
            flags.push("purge");
        }
        if lsp.is_overloaded() {
            flags.push("overload");
        }
        if lsp.is_on_demand() {
            flags.push("on-demand");
        }
        result.push(format!(
            "  {} {:<12} seq {:#010x} len {:>4} lifetime {:>4}s{}{}",
            id,
            lsp.hostname().unwrap_or(""),
            lsp.seq(),
            lsp.len(),
            lsp.lifetime(),
            match entry.expires() {
                Some(t) => format!(" expires {}", secs(t)),
                None => String::new(),
            },
            if flags.is_empty() { String::new() } else { format!(" [{}]", flags.join(", ")) }
        ));
        if detail {
            result.extend(lsp_detail(lsp).into_iter().map(|l| format!("      {}", l)));
        }
    }
    Ok(result)
}

/// One line per TLV of the LSP
pub fn lsp_detail(lsp: &Lsp) -> Vec<String> {
    lsp.tlvs().iter().map(tlv).collect()
}

fn tlv(tlv: &Tlv) -> String {
    match tlv {
        Tlv::Hostname(h) => format!("hostname {}", h),
        Tlv::RouterId(r) => format!("router-id {}", r),
        Tlv::InterfaceIp { addr, mask_len } => format!("interface ip {}/{}", addr, mask_len),
        Tlv::InterfaceIndex(i) => format!("interface index {}", i),
        Tlv::HoldTime(t) => format!("hold time {}s", t),
        Tlv::Metric(m) => format!("metric {}", m),
        Tlv::InterfaceMac(m) => format!("interface mac {}", m),
        Tlv::Priority(p) => format!("priority {}", p),
        Tlv::LanId(s) => format!("lan-id {}", s),
        Tlv::IsReach(r) => is_reach(r),
        Tlv::IpReach(r) => format!(
            "ip reach {} metric {}{}",
            r.prefix,
            r.metric,
            if r.flags.is_empty() { "" } else { " external" }
        ),
        Tlv::Opaque { tlv_type, value } => format!("unknown tlv {} ({} bytes)", tlv_type, value.len()),
    }
}

fn is_reach(r: &IsReach) -> String {
    let mut s = format!("is reach {} metric {}", r.neighbor, r.metric);
    if let Some((local, remote)) = r.link_ids() {
        s.push_str(&format!(" if {} -> {}", local, remote));
    }
    if let Some(ip) = r.local_ip() {
        s.push_str(&format!(" local {}", ip));
    }
    if let Some(ip) = r.remote_ip() {
        s.push_str(&format!(" remote {}", ip));
    }
    s
}

/// Nodes, links and prefixes of the traffic engineering database
pub fn ted(router: &Router) -> Result<Vec<String>, NetworkError> {
    let isis = isis(router)?;
    let ted = isis.ted();
    let mut result = vec![format!(
        "TED of {} ({} nodes, {} links)",
        router.name(),
        ted.num_nodes(),
        ted.num_links()
    )];
    let mut nodes: Vec<_> = ted.nodes().collect();
    nodes.sort_by_key(|n| n.system());
    for node in nodes {
        result.push(format!(
            "  {} {}{}",
            node.system(),
            node.hostname().unwrap_or(""),
            if node.is_overloaded() { " [overload]" } else { "" }
        ));
        for (target, link) in ted.out_links(node.system()) {
            result.push(format!(
                "    -> {} cost {}{}",
                target,
                link.cost,
                if ted.is_bidirectional(node.system(), target) { "" } else { " (one-way)" }
            ));
        }
        for (prefix, _, p) in node.prefixes() {
            result.push(format!("    {} metric {}", prefix, p.metric));
        }
    }
    Ok(result)
}

/// Results of the last SPF run
pub fn spf(router: &Router) -> Result<Vec<String>, NetworkError> {
    let isis = isis(router)?;
    let mut result = vec![format!("SPF results of {}", router.name())];
    for r in isis.spf_results() {
        let hops = r
            .next_hops
            .iter()
            .map(|nh| format!("{} via {}", nh.gateway, nh.ifindex))
            .collect::<Vec<_>>();
        result.push(format!(
            "  {} {:<12} cost {:>5} {}",
            r.system,
            r.hostname.as_deref().unwrap_or(""),
            r.cost,
            hops.join(", ")
        ));
    }
    Ok(result)
}

/// Routing table of the router
pub fn routing_table(router: &Router) -> Vec<String> {
    let mut result = vec![format!("Routing table of {}", router.name())];
    for route in router.rib().iter() {
        let hops = route
            .next_hops
            .iter()
            .map(|nh| match nh.gateway {
                Some(gw) => format!("via {} on {}", gw, nh.ifindex),
                None => format!("connected on {}", nh.ifindex),
            })
            .collect::<Vec<_>>();
        result.push(format!(
            "  {:<18} {:<6} cost {:>5} {}",
            route.prefix.to_string(),
            route.protocol.to_string(),
            route.cost,
            if hops.is_empty() { String::from("local") } else { hops.join(", ") }
        ));
    }
    result
}

/// Protocol counters of the router
pub fn stats(router: &Router) -> Result<Vec<String>, NetworkError> {
    let isis = isis(router)?;
    let mut result = vec![format!("Statistics of {}", router.name())];
    result.extend(isis.stats().to_string().lines().map(|l| format!("  {}", l)));
    Ok(result)
}

/// Fragments of the advertisement database, with their fill level
pub fn advt(router: &Router) -> Result<Vec<String>, NetworkError> {
    let isis = isis(router)?;
    let advt = isis.advt();
    let mut result = vec![format!(
        "Advertisements of {} ({} data, {} waiting{})",
        router.name(),
        advt.num_data(),
        advt.wait_list_len(),
        if advt.is_dyn_overloaded() { ", overloaded" } else { "" }
    )];
    for frag in advt.fragments() {
        result.push(format!(
            "  {:02}-{:02} seq {:#010x} {:>4}/{} bytes, {} data{}",
            frag.pn_id(),
            frag.number(),
            frag.seq(),
            frag.bytes_filled(),
            advt.capacity(),
            frag.data().len(),
            if frag.is_dirty() { " [dirty]" } else { "" }
        ));
    }
    Ok(result)
}

/// Path a packet from `source` to `addr` takes, with router names inserted.
pub fn route(net: &Network, source: DeviceId, addr: Ipv4Addr) -> Result<String, NetworkError> {
    let names = |path: &[DeviceId]| -> Result<String, NetworkError> {
        Ok(path
            .iter()
            .map(|r| net.get_router_name(*r))
            .collect::<Result<Vec<&str>, NetworkError>>()?
            .join(" => "))
    };
    Ok(match net.get_route(source, addr) {
        Ok(path) => names(&path)?,
        Err(NetworkError::ForwardingLoop(path)) => format!("{} FORWARDING LOOP!", names(&path)?),
        Err(NetworkError::ForwardingBlackHole(path)) => format!("{} BLACK HOLE!", names(&path)?),
        Err(e) => return Err(e),
    })
}

/// Returns the config expr as a string, where all router names are inserted.
pub fn config_expr(net: &Network, expr: &ConfigExpr) -> Result<String, NetworkError> {
    let name = net.get_router_name(expr.router())?;
    Ok(match expr {
        ConfigExpr::IsisRouter { .. } => format!("IS-IS on {}", name),
        ConfigExpr::IsisInterface { ifindex, .. } => format!("IS-IS on {} {}", name, ifindex),
        ConfigExpr::InterfaceCost { ifindex, cost, .. } => {
            format!("Interface Cost: {} {}: {}", name, ifindex, cost)
        }
        ConfigExpr::InterfacePriority { ifindex, priority, .. } => {
            format!("Interface Priority: {} {}: {}", name, ifindex, priority)
        }
        ConfigExpr::InterfaceGroup { ifindex, group, .. } => {
            format!("Interface Group: {} {}: {}", name, ifindex, group)
        }
        ConfigExpr::Overload { timeout: Some(t), .. } => format!("Overload on {} for {}s", name, t),
        ConfigExpr::Overload { timeout: None, .. } => format!("Overload on {}", name),
        ConfigExpr::ImportPolicy { map, .. } => {
            format!("Route Map on {} [import]: {}", name, route_map(map))
        }
        ConfigExpr::ExportPolicy { map, .. } => {
            format!("Route Map on {} [export]: {}", name, route_map(map))
        }
        ConfigExpr::StaticRoute { prefix, next_hop, cost, .. } => {
            format!("Static Route: {}: Prefix {} via {} cost {}", name, prefix, next_hop, cost)
        }
    })
}

/// Returns a formatted string for the given modifier, where all router names are inserted.
pub fn config_modifier(net: &Network, modifier: &ConfigModifier) -> Result<String, NetworkError> {
    Ok(match modifier {
        ConfigModifier::Insert(e) => format!("INSERT {}", config_expr(net, e)?),
        ConfigModifier::Remove(e) => format!("REMOVE {}", config_expr(net, e)?),
        ConfigModifier::Update { from: _, to } => format!("MODIFY {}", config_expr(net, to)?),
    })
}

/// Returns a formatted string of the route map
pub fn route_map(map: &RouteMap) -> String {
    format!(
        "{} {} {} set [{}]",
        match map.state() {
            RouteMapState::Allow => "allow",
            RouteMapState::Deny => "deny ",
        },
        map.order(),
        if map.conds().is_empty() {
            String::from("*")
        } else {
            map.conds().iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" AND ")
        },
        map.actions().iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
    )
}

/// Print the complete configuration to stdout
pub fn print_config(net: &Network, config: &Config) -> Result<(), NetworkError> {
    println!("Config {{");
    for expr in config.iter() {
        println!("    {}", config_expr(net, expr)?);
    }
    println!("}}");
    Ok(())
}

/// Print the configuration patch to stdout
pub fn print_config_patch(net: &Network, patch: &ConfigPatch) -> Result<(), NetworkError> {
    println!("ConfigPatch {{");
    for modifier in patch.modifiers.iter() {
        println!("    {}", config_modifier(net, modifier)?);
    }
    println!("}}");
    Ok(())
}
