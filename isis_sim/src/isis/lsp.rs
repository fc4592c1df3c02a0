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

//! Shared, wire-encoded link-state packet.

use crate::isis::packet::{LspFlags, LspPdu, Tlv};
use crate::netsim::LspId;
use std::cell::Cell;

/// A regenerated or received LSP. It is shared (`Rc<Lsp>`) between the LSDB entry, the flood
/// queues and (for self-originated LSPs) the owning fragment. The encoded bytes are kept next to
/// the decoded content, so flooding never re-encodes.
#[derive(Debug)]
pub struct Lsp {
    pdu: LspPdu,
    raw: Vec<u8>,
    flood_refs: Cell<usize>,
}

impl Lsp {
    /// Encode a PDU into a new LSP
    pub fn new(pdu: LspPdu) -> Self {
        let raw = pdu.encode();
        Self { pdu, raw, flood_refs: Cell::new(0) }
    }

    /// Create an LSP from a decoded PDU and the bytes it was decoded from
    pub(crate) fn from_parts(pdu: LspPdu, raw: Vec<u8>) -> Self {
        Self { pdu, raw, flood_refs: Cell::new(0) }
    }

    /// Fragment identifier
    pub fn id(&self) -> LspId {
        self.pdu.id
    }

    /// Sequence number
    pub fn seq(&self) -> u32 {
        self.pdu.seq
    }

    /// Flags
    pub fn flags(&self) -> LspFlags {
        self.pdu.flags
    }

    /// Returns `true` if this LSP is a purge
    pub fn is_purge(&self) -> bool {
        self.pdu.flags.contains(LspFlags::PURGE)
    }

    /// Returns `true` if the originator is overloaded
    pub fn is_overloaded(&self) -> bool {
        self.pdu.flags.contains(LspFlags::OVERLOAD)
    }

    /// Returns `true` if the LSP never ages out
    pub fn is_on_demand(&self) -> bool {
        self.pdu.flags.contains(LspFlags::ON_DEMAND)
    }

    /// Remaining lifetime in seconds, as set by the originator
    pub fn lifetime(&self) -> u16 {
        self.pdu.lifetime
    }

    /// Content of the LSP
    pub fn tlvs(&self) -> &[Tlv] {
        &self.pdu.tlvs
    }

    /// Wire-encoded bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Hostname carried in the LSP, if any
    pub fn hostname(&self) -> Option<&str> {
        self.pdu.tlvs.iter().find_map(|t| match t {
            Tlv::Hostname(h) => Some(h.as_str()),
            _ => None,
        })
    }

    /// Number of flood queue entries referencing this LSP
    pub fn flood_refs(&self) -> usize {
        self.flood_refs.get()
    }

    pub(crate) fn flood_ref(&self) {
        self.flood_refs.set(self.flood_refs.get() + 1);
    }

    /// Release one flood reference. Returns the number of references left.
    pub(crate) fn flood_unref(&self) -> usize {
        let refs = self.flood_refs.get();
        assert!(refs > 0, "flood reference released twice for {}", self.pdu.id);
        self.flood_refs.set(refs - 1);
        refs - 1
    }
}

impl Drop for Lsp {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        debug_assert_eq!(
            self.flood_refs.get(),
            0,
            "LSP {} dropped while still queued for flooding",
            self.pdu.id
        );
    }
}
