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

//! # Wire format
//!
//! All packets start with the common header `{pdu-type:16, sequence:32, router-id:32, flags:8}`
//! (11 bytes, big endian). LSPs extend it with `{pseudonode:8, fragment:8, lifetime:16}`, so the
//! fixed overhead of a fragment is [`LSP_HEADER_LEN`] bytes. The body is a sequence of TLVs
//! `{type:8, length:8, value}`. Unknown TLVs are kept verbatim as [`Tlv::Opaque`].

use crate::netsim::{IfIndex, LspId, MacAddr, Prefix, RouterId, SystemId};
use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use std::net::Ipv4Addr;
use thiserror::Error;

/// PDU type of a Hello
pub const PDU_HELLO: u16 = 0x0083;
/// PDU type of an LSP
pub const PDU_LSP: u16 = 0x0084;
/// Length of the common header
pub const COMMON_HEADER_LEN: usize = 11;
/// Length of the LSP header (common header plus LSP extension)
pub const LSP_HEADER_LEN: usize = COMMON_HEADER_LEN + 4;
/// Length of a TLV header
pub const TLV_HEADER_LEN: usize = 2;
/// Maximum length of a TLV value
pub const MAX_TLV_VALUE_LEN: usize = u8::MAX as usize;
/// No LSP is ever larger than this
pub const MAX_LSP_SIZE: usize = 1492;

/// TLV type codes
pub mod tlv_type {
    /// Interface index of the sender
    pub const INTERFACE_INDEX: u8 = 4;
    /// Hold time of the sender
    pub const HOLD_TIME: u8 = 5;
    /// Metric of the sending interface
    pub const METRIC: u8 = 6;
    /// DIS priority
    pub const PRIORITY: u8 = 7;
    /// LAN-ID, the system id of the pseudonode of a LAN segment
    pub const LAN_ID: u8 = 8;
    /// Neighbor reachability
    pub const IS_REACH: u8 = 22;
    /// Prefix reachability
    pub const IP_REACH: u8 = 130;
    /// MAC address of the sending interface
    pub const INTERFACE_MAC: u8 = 131;
    /// IP address and mask length of the sending interface
    pub const INTERFACE_IP: u8 = 132;
    /// Router id
    pub const ROUTER_ID: u8 = 134;
    /// Dynamic hostname
    pub const HOSTNAME: u8 = 137;
}

/// Sub-TLV type codes inside a neighbor reachability TLV
pub mod sub_tlv_type {
    /// Local and remote interface index
    pub const LINK_IDS: u8 = 4;
    /// Local interface address
    pub const LOCAL_IP: u8 = 6;
    /// Remote interface address
    pub const REMOTE_IP: u8 = 8;
}

bitflags! {
    /// Flags in the common header of an LSP
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct LspFlags: u8 {
        /// The LSP is a purge: it carries no content and removes the fragment
        const PURGE = 0x01;
        /// The originator is overloaded and must not be used for transit
        const OVERLOAD = 0x02;
        /// The LSP is only refreshed on demand and never ages out
        const ON_DEMAND = 0x04;
    }
}

bitflags! {
    /// Flags of a prefix reachability TLV
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct PrefixFlags: u8 {
        /// The prefix was learned from outside of the protocol
        const EXTERNAL = 0x01;
    }
}

/// Errors while decoding a packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The packet ended in the middle of a field
    #[error("Packet is truncated")]
    Truncated,
    /// The PDU type is unknown
    #[error("Unknown PDU type: {0:#06x}")]
    UnknownPduType(u16),
    /// The LSP is larger than allowed
    #[error("LSP of {0} bytes exceeds the maximum size")]
    TooLong(usize),
    /// A TLV with a fixed size has the wrong length
    #[error("TLV {tlv_type} has invalid length {len}")]
    InvalidTlvLength {
        /// Type of the TLV
        tlv_type: u8,
        /// Length found in the packet
        len: usize,
    },
    /// The hostname is not valid UTF-8
    #[error("Hostname is not valid UTF-8")]
    InvalidHostname,
}

impl From<io::Error> for DecodeError {
    fn from(_: io::Error) -> Self {
        DecodeError::Truncated
    }
}

/// Sub-TLV of a neighbor reachability TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubTlv {
    /// Local and remote interface index of the link
    LinkIds {
        /// Interface index on the advertising router
        local: IfIndex,
        /// Interface index on the neighbor
        remote: IfIndex,
    },
    /// Address of the advertising router on the link
    LocalIp(Ipv4Addr),
    /// Address of the neighbor on the link
    RemoteIp(Ipv4Addr),
    /// Unknown sub-TLV, kept verbatim
    Opaque {
        /// Type code
        sub_type: u8,
        /// Raw value
        value: Vec<u8>,
    },
}

impl SubTlv {
    /// Encoded length including the header
    pub fn len(&self) -> usize {
        TLV_HEADER_LEN
            + match self {
                SubTlv::LinkIds { .. } => 8,
                SubTlv::LocalIp(_) | SubTlv::RemoteIp(_) => 4,
                SubTlv::Opaque { value, .. } => value.len(),
            }
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            SubTlv::LinkIds { local, remote } => {
                w.write_u8(sub_tlv_type::LINK_IDS)?;
                w.write_u8(8)?;
                w.write_u32::<BigEndian>(local.0)?;
                w.write_u32::<BigEndian>(remote.0)?;
            }
            SubTlv::LocalIp(ip) => {
                w.write_u8(sub_tlv_type::LOCAL_IP)?;
                w.write_u8(4)?;
                w.write_u32::<BigEndian>(u32::from(*ip))?;
            }
            SubTlv::RemoteIp(ip) => {
                w.write_u8(sub_tlv_type::REMOTE_IP)?;
                w.write_u8(4)?;
                w.write_u32::<BigEndian>(u32::from(*ip))?;
            }
            SubTlv::Opaque { sub_type, value } => {
                w.write_u8(*sub_type)?;
                w.write_u8(value.len() as u8)?;
                w.write_all(value)?;
            }
        }
        Ok(())
    }

    fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let sub_type = cur.read_u8()?;
        let len = cur.read_u8()? as usize;
        let mut value = vec![0u8; len];
        cur.read_exact(&mut value)?;
        let mut p = Cursor::new(value.as_slice());
        let invalid = DecodeError::InvalidTlvLength { tlv_type: sub_type, len };
        Ok(match sub_type {
            sub_tlv_type::LINK_IDS if len == 8 => SubTlv::LinkIds {
                local: IfIndex(p.read_u32::<BigEndian>()?),
                remote: IfIndex(p.read_u32::<BigEndian>()?),
            },
            sub_tlv_type::LOCAL_IP if len == 4 => {
                SubTlv::LocalIp(Ipv4Addr::from(p.read_u32::<BigEndian>()?))
            }
            sub_tlv_type::REMOTE_IP if len == 4 => {
                SubTlv::RemoteIp(Ipv4Addr::from(p.read_u32::<BigEndian>()?))
            }
            sub_tlv_type::LINK_IDS | sub_tlv_type::LOCAL_IP | sub_tlv_type::REMOTE_IP => {
                return Err(invalid)
            }
            _ => SubTlv::Opaque { sub_type, value },
        })
    }
}

/// Neighbor reachability: the advertising system reaches `neighbor` at `metric`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsReach {
    /// Neighbor system (router or pseudonode)
    pub neighbor: SystemId,
    /// Metric of the half-link
    pub metric: u32,
    /// Nested sub-TLVs describing the link
    pub sub_tlvs: Vec<SubTlv>,
}

impl IsReach {
    /// Length of the fixed part of the value: system id (5), metric (4), sub-TLV length (1)
    pub const FIXED_LEN: usize = 10;

    /// Local and remote interface index, if advertised
    pub fn link_ids(&self) -> Option<(IfIndex, IfIndex)> {
        self.sub_tlvs.iter().find_map(|s| match s {
            SubTlv::LinkIds { local, remote } => Some((*local, *remote)),
            _ => None,
        })
    }

    /// Local address, if advertised
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.sub_tlvs.iter().find_map(|s| match s {
            SubTlv::LocalIp(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Remote address, if advertised
    pub fn remote_ip(&self) -> Option<Ipv4Addr> {
        self.sub_tlvs.iter().find_map(|s| match s {
            SubTlv::RemoteIp(ip) => Some(*ip),
            _ => None,
        })
    }

    fn sub_tlv_len(&self) -> usize {
        self.sub_tlvs.iter().map(|s| s.len()).sum()
    }
}

/// Prefix reachability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpReach {
    /// Advertised prefix
    pub prefix: Prefix,
    /// Metric to reach the prefix from the advertising system
    pub metric: u32,
    /// Flags
    pub flags: PrefixFlags,
}

impl IpReach {
    /// Length of the value: prefix (4), netmask (4), metric (4), flags (1)
    pub const LEN: usize = 13;
}

/// A single TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tlv {
    /// Dynamic hostname
    Hostname(String),
    /// Router id
    RouterId(RouterId),
    /// Interface address and mask length
    InterfaceIp {
        /// Address of the interface
        addr: Ipv4Addr,
        /// Mask length of the subnet
        mask_len: u8,
    },
    /// Interface index
    InterfaceIndex(IfIndex),
    /// Hold time in seconds
    HoldTime(u16),
    /// Metric of the interface
    Metric(u32),
    /// MAC address of the interface
    InterfaceMac(MacAddr),
    /// DIS priority
    Priority(u8),
    /// System id of the pseudonode of the LAN
    LanId(SystemId),
    /// Neighbor reachability
    IsReach(IsReach),
    /// Prefix reachability
    IpReach(IpReach),
    /// Any TLV not understood by this implementation, kept verbatim
    Opaque {
        /// Type code
        tlv_type: u8,
        /// Raw value
        value: Vec<u8>,
    },
}

impl Tlv {
    /// Type code of the TLV
    pub fn tlv_type(&self) -> u8 {
        match self {
            Tlv::Hostname(_) => tlv_type::HOSTNAME,
            Tlv::RouterId(_) => tlv_type::ROUTER_ID,
            Tlv::InterfaceIp { .. } => tlv_type::INTERFACE_IP,
            Tlv::InterfaceIndex(_) => tlv_type::INTERFACE_INDEX,
            Tlv::HoldTime(_) => tlv_type::HOLD_TIME,
            Tlv::Metric(_) => tlv_type::METRIC,
            Tlv::InterfaceMac(_) => tlv_type::INTERFACE_MAC,
            Tlv::Priority(_) => tlv_type::PRIORITY,
            Tlv::LanId(_) => tlv_type::LAN_ID,
            Tlv::IsReach(_) => tlv_type::IS_REACH,
            Tlv::IpReach(_) => tlv_type::IP_REACH,
            Tlv::Opaque { tlv_type, .. } => *tlv_type,
        }
    }

    fn value_len(&self) -> usize {
        match self {
            Tlv::Hostname(name) => hostname_len(name),
            Tlv::RouterId(_) => 4,
            Tlv::InterfaceIp { .. } => 5,
            Tlv::InterfaceIndex(_) => 4,
            Tlv::HoldTime(_) => 2,
            Tlv::Metric(_) => 4,
            Tlv::InterfaceMac(_) => 6,
            Tlv::Priority(_) => 1,
            Tlv::LanId(_) => 5,
            Tlv::IsReach(r) => IsReach::FIXED_LEN + r.sub_tlv_len(),
            Tlv::IpReach(_) => IpReach::LEN,
            Tlv::Opaque { value, .. } => value.len(),
        }
    }

    /// Encoded length including the TLV header
    pub fn len(&self) -> usize {
        TLV_HEADER_LEN + self.value_len()
    }

    /// Write the TLV in wire format
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        debug_assert!(self.value_len() <= MAX_TLV_VALUE_LEN);
        w.write_u8(self.tlv_type())?;
        w.write_u8(self.value_len() as u8)?;
        match self {
            Tlv::Hostname(name) => w.write_all(&name.as_bytes()[..hostname_len(name)])?,
            Tlv::RouterId(id) => w.write_u32::<BigEndian>(id.0)?,
            Tlv::InterfaceIp { addr, mask_len } => {
                w.write_u32::<BigEndian>(u32::from(*addr))?;
                w.write_u8(*mask_len)?;
            }
            Tlv::InterfaceIndex(i) => w.write_u32::<BigEndian>(i.0)?,
            Tlv::HoldTime(t) => w.write_u16::<BigEndian>(*t)?,
            Tlv::Metric(m) => w.write_u32::<BigEndian>(*m)?,
            Tlv::InterfaceMac(mac) => w.write_all(&mac.0)?,
            Tlv::Priority(p) => w.write_u8(*p)?,
            Tlv::LanId(sys) => write_system_id(w, sys)?,
            Tlv::IsReach(r) => {
                write_system_id(w, &r.neighbor)?;
                w.write_u32::<BigEndian>(r.metric)?;
                w.write_u8(r.sub_tlv_len() as u8)?;
                for s in r.sub_tlvs.iter() {
                    s.write_to(w)?;
                }
            }
            Tlv::IpReach(r) => {
                w.write_u32::<BigEndian>(u32::from(r.prefix.addr()))?;
                w.write_u32::<BigEndian>(r.prefix.netmask())?;
                w.write_u32::<BigEndian>(r.metric)?;
                w.write_u8(r.flags.bits())?;
            }
            Tlv::Opaque { value, .. } => w.write_all(value)?,
        }
        Ok(())
    }

    /// Decode a single TLV at the position of the cursor
    pub fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        let t = cur.read_u8()?;
        let len = cur.read_u8()? as usize;
        let mut value = vec![0u8; len];
        cur.read_exact(&mut value)?;
        let mut p = Cursor::new(value.as_slice());
        let expect_len = |expected: usize| {
            if len == expected {
                Ok(())
            } else {
                Err(DecodeError::InvalidTlvLength { tlv_type: t, len })
            }
        };
        let tlv = match t {
            tlv_type::HOSTNAME => {
                Tlv::Hostname(String::from_utf8(value).map_err(|_| DecodeError::InvalidHostname)?)
            }
            tlv_type::ROUTER_ID => {
                expect_len(4)?;
                Tlv::RouterId(RouterId(p.read_u32::<BigEndian>()?))
            }
            tlv_type::INTERFACE_IP => {
                expect_len(5)?;
                let addr = Ipv4Addr::from(p.read_u32::<BigEndian>()?);
                let mask_len = p.read_u8()?;
                Tlv::InterfaceIp { addr, mask_len }
            }
            tlv_type::INTERFACE_INDEX => {
                expect_len(4)?;
                Tlv::InterfaceIndex(IfIndex(p.read_u32::<BigEndian>()?))
            }
            tlv_type::HOLD_TIME => {
                expect_len(2)?;
                Tlv::HoldTime(p.read_u16::<BigEndian>()?)
            }
            tlv_type::METRIC => {
                expect_len(4)?;
                Tlv::Metric(p.read_u32::<BigEndian>()?)
            }
            tlv_type::INTERFACE_MAC => {
                expect_len(6)?;
                let mut mac = [0u8; 6];
                p.read_exact(&mut mac)?;
                Tlv::InterfaceMac(MacAddr(mac))
            }
            tlv_type::PRIORITY => {
                expect_len(1)?;
                Tlv::Priority(p.read_u8()?)
            }
            tlv_type::LAN_ID => {
                expect_len(5)?;
                Tlv::LanId(read_system_id(&mut p)?)
            }
            tlv_type::IS_REACH => {
                if len < IsReach::FIXED_LEN {
                    return Err(DecodeError::InvalidTlvLength { tlv_type: t, len });
                }
                let neighbor = read_system_id(&mut p)?;
                let metric = p.read_u32::<BigEndian>()?;
                let sub_len = p.read_u8()? as usize;
                expect_len(IsReach::FIXED_LEN + sub_len)?;
                let mut sub_tlvs = Vec::new();
                while (p.position() as usize) < len {
                    sub_tlvs.push(SubTlv::decode(&mut p)?);
                }
                Tlv::IsReach(IsReach { neighbor, metric, sub_tlvs })
            }
            tlv_type::IP_REACH => {
                expect_len(IpReach::LEN)?;
                let addr = Ipv4Addr::from(p.read_u32::<BigEndian>()?);
                let mask = p.read_u32::<BigEndian>()?;
                let metric = p.read_u32::<BigEndian>()?;
                let flags = PrefixFlags::from_bits_truncate(p.read_u8()?);
                Tlv::IpReach(IpReach { prefix: Prefix::from_netmask(addr, mask), metric, flags })
            }
            _ => Tlv::Opaque { tlv_type: t, value },
        };
        Ok(tlv)
    }

    /// Decode all TLVs of a buffer
    pub fn decode_all(buf: &[u8]) -> Result<Vec<Self>, DecodeError> {
        let mut cur = Cursor::new(buf);
        let mut tlvs = Vec::new();
        while (cur.position() as usize) < buf.len() {
            tlvs.push(Tlv::decode(&mut cur)?);
        }
        Ok(tlvs)
    }
}

fn write_system_id<W: Write>(w: &mut W, sys: &SystemId) -> io::Result<()> {
    w.write_u32::<BigEndian>(sys.rtr_id.0)?;
    w.write_u8(sys.pn_id)
}

fn read_system_id(cur: &mut Cursor<&[u8]>) -> Result<SystemId, DecodeError> {
    let rtr_id = RouterId(cur.read_u32::<BigEndian>()?);
    let pn_id = cur.read_u8()?;
    Ok(SystemId { rtr_id, pn_id })
}

/// Common packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// PDU type
    pub pdu_type: u16,
    /// Sequence number
    pub seq: u32,
    /// Router id of the sender (or originator)
    pub rtr_id: RouterId,
    /// Flags
    pub flags: u8,
}

impl Header {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<BigEndian>(self.pdu_type)?;
        w.write_u32::<BigEndian>(self.seq)?;
        w.write_u32::<BigEndian>(self.rtr_id.0)?;
        w.write_u8(self.flags)
    }

    fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
        Ok(Self {
            pdu_type: cur.read_u16::<BigEndian>()?,
            seq: cur.read_u32::<BigEndian>()?,
            rtr_id: RouterId(cur.read_u32::<BigEndian>()?),
            flags: cur.read_u8()?,
        })
    }
}

/// Hello PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloPdu {
    /// Per-interface Hello sequence number
    pub seq: u32,
    /// Router id of the sender
    pub rtr_id: RouterId,
    /// Body
    pub tlvs: Vec<Tlv>,
}

impl HelloPdu {
    /// Encode the Hello
    pub fn encode(&self) -> Vec<u8> {
        let header = Header { pdu_type: PDU_HELLO, seq: self.seq, rtr_id: self.rtr_id, flags: 0 };
        let len = COMMON_HEADER_LEN + self.tlvs.iter().map(Tlv::len).sum::<usize>();
        to_vec(len, |w| {
            header.write_to(w)?;
            self.tlvs.iter().try_for_each(|t| t.write_to(w))
        })
    }
}

/// LSP PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspPdu {
    /// Fragment identifier
    pub id: LspId,
    /// Sequence number
    pub seq: u32,
    /// Flags
    pub flags: LspFlags,
    /// Remaining lifetime in seconds
    pub lifetime: u16,
    /// Body
    pub tlvs: Vec<Tlv>,
}

impl LspPdu {
    /// Encoded length of the LSP
    pub fn len(&self) -> usize {
        LSP_HEADER_LEN + self.tlvs.iter().map(Tlv::len).sum::<usize>()
    }

    /// Encode the LSP
    pub fn encode(&self) -> Vec<u8> {
        let header = Header {
            pdu_type: PDU_LSP,
            seq: self.seq,
            rtr_id: self.id.system.rtr_id,
            flags: self.flags.bits(),
        };
        to_vec(self.len(), |w| {
            header.write_to(w)?;
            w.write_u8(self.id.system.pn_id)?;
            w.write_u8(self.id.fragment)?;
            w.write_u16::<BigEndian>(self.lifetime)?;
            self.tlvs.iter().try_for_each(|t| t.write_to(w))
        })
    }
}

/// A decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    /// Hello
    Hello(HelloPdu),
    /// LSP
    Lsp(LspPdu),
}

/// Number of bytes of the hostname that fit into one TLV. Longer names are cut at the last
/// character boundary, such that the receiver still gets valid UTF-8.
fn hostname_len(name: &str) -> usize {
    let mut len = name.len().min(MAX_TLV_VALUE_LEN);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Decode a packet, dispatching on the PDU type of the common header
pub fn decode(data: &[u8]) -> Result<Pdu, DecodeError> {
    let mut cur = Cursor::new(data);
    let header = Header::decode(&mut cur)?;
    match header.pdu_type {
        PDU_HELLO => Ok(Pdu::Hello(HelloPdu {
            seq: header.seq,
            rtr_id: header.rtr_id,
            tlvs: Tlv::decode_all(&data[COMMON_HEADER_LEN..])?,
        })),
        PDU_LSP => {
            if data.len() > MAX_LSP_SIZE {
                return Err(DecodeError::TooLong(data.len()));
            }
            let pn_id = cur.read_u8()?;
            let fragment = cur.read_u8()?;
            let lifetime = cur.read_u16::<BigEndian>()?;
            Ok(Pdu::Lsp(LspPdu {
                id: LspId::new(header.rtr_id, pn_id, fragment),
                seq: header.seq,
                flags: LspFlags::from_bits_truncate(header.flags),
                lifetime,
                tlvs: Tlv::decode_all(&data[LSP_HEADER_LEN..])?,
            }))
        }
        t => Err(DecodeError::UnknownPduType(t)),
    }
}

fn to_vec<F>(len: usize, f: F) -> Vec<u8>
where
    F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
{
    let mut buf = Vec::with_capacity(len);
    // writes into a Vec cannot fail
    f(&mut buf).expect("writing into a Vec failed");
    debug_assert_eq!(buf.len(), len);
    buf
}
