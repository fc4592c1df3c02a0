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

//! Test the wire format of Hellos and LSPs.

use crate::isis::packet::*;
use crate::netsim::{IfIndex, LspId, MacAddr, Prefix, RouterId, SystemId};
use lazy_static::lazy_static;
use std::net::Ipv4Addr;

lazy_static! {
    static ref R1: RouterId = Ipv4Addr::new(1, 1, 1, 1).into();
    static ref R2: RouterId = Ipv4Addr::new(2, 2, 2, 2).into();
}

fn sample_lsp() -> LspPdu {
    LspPdu {
        id: LspId::new(*R1, 0, 3),
        seq: 42,
        flags: LspFlags::OVERLOAD,
        lifetime: 1200,
        tlvs: vec![
            Tlv::Hostname("r1".to_string()),
            Tlv::IsReach(IsReach {
                neighbor: SystemId::router(*R2),
                metric: 10,
                sub_tlvs: vec![
                    SubTlv::LinkIds { local: IfIndex(1), remote: IfIndex(4) },
                    SubTlv::LocalIp(Ipv4Addr::new(10, 0, 0, 1)),
                    SubTlv::RemoteIp(Ipv4Addr::new(10, 0, 0, 2)),
                ],
            }),
            Tlv::IpReach(IpReach {
                prefix: Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 30),
                metric: 10,
                flags: PrefixFlags::empty(),
            }),
            Tlv::IpReach(IpReach {
                prefix: Prefix::new(Ipv4Addr::new(192, 168, 0, 0), 16),
                metric: 100,
                flags: PrefixFlags::EXTERNAL,
            }),
        ],
    }
}

#[test]
fn test_lsp_encoding() {
    let pdu = sample_lsp();
    let raw = pdu.encode();
    assert_eq!(raw.len(), pdu.len());
    // hostname: 2 + 2, is-reach: 2 + 10 + 10 + 6 + 6, ip-reach: 2 * 15
    assert_eq!(raw.len(), LSP_HEADER_LEN + 4 + 34 + 30);
    assert_eq!(&raw[0..2], &[0x00, 0x84]);
    assert_eq!(&raw[2..6], &42u32.to_be_bytes());
    assert_eq!(&raw[6..10], &[1, 1, 1, 1]);
    assert_eq!(raw[10], LspFlags::OVERLOAD.bits());
    assert_eq!(raw[11], 0);
    assert_eq!(raw[12], 3);
    assert_eq!(&raw[13..15], &1200u16.to_be_bytes());
    assert_eq!(&raw[15..19], &[tlv_type::HOSTNAME, 2, b'r', b'1']);

    assert_eq!(decode(&raw), Ok(Pdu::Lsp(pdu)));
}

#[test]
fn test_hello_encoding() {
    let hello = HelloPdu {
        seq: 7,
        rtr_id: *R2,
        tlvs: vec![
            Tlv::Hostname("r2".to_string()),
            Tlv::InterfaceIp { addr: Ipv4Addr::new(10, 0, 0, 2), mask_len: 30 },
            Tlv::InterfaceIndex(IfIndex(4)),
            Tlv::HoldTime(9),
            Tlv::Metric(10),
            Tlv::InterfaceMac(MacAddr([2, 0, 0, 1, 0, 4])),
            Tlv::Priority(64),
            Tlv::LanId(SystemId::pseudonode(*R1, 1)),
        ],
    };
    let raw = hello.encode();
    assert_eq!(&raw[0..2], &[0x00, 0x83]);
    assert_eq!(raw.len(), COMMON_HEADER_LEN + hello.tlvs.iter().map(Tlv::len).sum::<usize>());
    assert_eq!(decode(&raw), Ok(Pdu::Hello(hello)));
}

#[test]
fn test_unknown_tlv_is_kept() {
    let pdu = LspPdu {
        id: LspId::new(*R1, 2, 0),
        seq: 1,
        flags: LspFlags::empty(),
        lifetime: 30,
        tlvs: vec![Tlv::Opaque { tlv_type: 250, value: vec![1, 2, 3] }],
    };
    let raw = pdu.encode();
    match decode(&raw) {
        Ok(Pdu::Lsp(decoded)) => {
            assert_eq!(decoded.id.system, SystemId::pseudonode(*R1, 2));
            assert_eq!(decoded.tlvs, vec![Tlv::Opaque { tlv_type: 250, value: vec![1, 2, 3] }]);
        }
        x => panic!("unexpected result: {:?}", x),
    }
}

#[test]
fn test_truncated() {
    let raw = sample_lsp().encode();
    // header cut in half
    assert_eq!(decode(&raw[..5]), Err(DecodeError::Truncated));
    // last TLV cut
    assert_eq!(decode(&raw[..raw.len() - 3]), Err(DecodeError::Truncated));
    // empty buffer
    assert_eq!(decode(&[]), Err(DecodeError::Truncated));
}

#[test]
fn test_unknown_pdu_type() {
    let mut raw = sample_lsp().encode();
    raw[0] = 0x12;
    raw[1] = 0x34;
    assert_eq!(decode(&raw), Err(DecodeError::UnknownPduType(0x1234)));
}

#[test]
fn test_lsp_too_long() {
    let mut pdu = sample_lsp();
    pdu.tlvs = (0..7).map(|_| Tlv::Opaque { tlv_type: 251, value: vec![0; 250] }).collect();
    let raw = pdu.encode();
    assert!(raw.len() > MAX_LSP_SIZE);
    assert_eq!(decode(&raw), Err(DecodeError::TooLong(raw.len())));
}

#[test]
fn test_invalid_tlv_length() {
    let mut raw = LspPdu {
        id: LspId::new(*R1, 0, 0),
        seq: 1,
        flags: LspFlags::empty(),
        lifetime: 30,
        tlvs: vec![Tlv::Metric(5)],
    }
    .encode();
    // rewrite the metric TLV to a length of 3, and drop the last byte
    raw[LSP_HEADER_LEN + 1] = 3;
    raw.pop();
    assert_eq!(
        decode(&raw),
        Err(DecodeError::InvalidTlvLength { tlv_type: tlv_type::METRIC, len: 3 })
    );
}

#[test]
fn test_invalid_hostname() {
    let mut raw = LspPdu {
        id: LspId::new(*R1, 0, 0),
        seq: 1,
        flags: LspFlags::empty(),
        lifetime: 30,
        tlvs: vec![Tlv::Hostname("ab".to_string())],
    }
    .encode();
    raw[LSP_HEADER_LEN + 2] = 0xff;
    assert_eq!(decode(&raw), Err(DecodeError::InvalidHostname));
}

#[test]
fn test_prefix_normalized() {
    let pdu = LspPdu {
        id: LspId::new(*R1, 0, 0),
        seq: 1,
        flags: LspFlags::empty(),
        lifetime: 30,
        tlvs: vec![Tlv::IpReach(IpReach {
            prefix: Prefix::new(Ipv4Addr::new(10, 1, 2, 3), 24),
            metric: 1,
            flags: PrefixFlags::empty(),
        })],
    };
    match decode(&pdu.encode()) {
        Ok(Pdu::Lsp(decoded)) => match &decoded.tlvs[0] {
            Tlv::IpReach(r) => {
                assert_eq!(r.prefix.addr(), Ipv4Addr::new(10, 1, 2, 0));
                assert_eq!(r.prefix.len(), 24);
            }
            t => panic!("unexpected TLV: {:?}", t),
        },
        x => panic!("unexpected result: {:?}", x),
    }
}

#[test]
fn test_long_hostname_is_cut_at_char_boundary() {
    let lsp = |name: String| LspPdu {
        id: LspId::new(*R1, 0, 0),
        seq: 1,
        flags: LspFlags::empty(),
        lifetime: 30,
        tlvs: vec![Tlv::Hostname(name)],
    };
    let hostname = |raw: &[u8]| match decode(raw) {
        Ok(Pdu::Lsp(decoded)) => match &decoded.tlvs[..] {
            [Tlv::Hostname(h)] => h.clone(),
            tlvs => panic!("unexpected TLVs {:?}", tlvs),
        },
        other => panic!("unexpected decode result {:?}", other),
    };

    // 256 bytes of two-byte characters: the last one does not fit
    let pdu = lsp("é".repeat(128));
    let raw = pdu.encode();
    assert_eq!(raw.len(), pdu.len());
    assert_eq!(raw.len(), LSP_HEADER_LEN + TLV_HEADER_LEN + 254);
    assert_eq!(raw[LSP_HEADER_LEN + 1], 254);
    assert_eq!(hostname(&raw), "é".repeat(127));

    // plain ASCII uses the full TLV
    let pdu = lsp("x".repeat(300));
    let raw = pdu.encode();
    assert_eq!(raw.len(), pdu.len());
    assert_eq!(hostname(&raw), "x".repeat(MAX_TLV_VALUE_LEN));

    // a three-byte character straddling the limit
    let name = format!("{}€", "a".repeat(254));
    assert_eq!(hostname(&lsp(name).encode()), "a".repeat(254));
}
