//! Protocol dissectors rooted at a captured record's payload.
//!
//! [`Root`] is attached to a record header by the reader's `dissect`.  It
//! picks the link-layer decoder from the capture's link type and lets the
//! generic engine drive it.  Each layer attaches the next one itself once
//! the field that names it has been decoded.

use crate::packet::{
    self, DecodeError, Endian, FieldDescriptor as F, FieldKind, Layout, NodeId, RecordType,
    SizeRule, Tree,
};
use crate::registry;
use crate::stream::Stream;

pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_RAW:      u32 = 101;
pub const LINKTYPE_IPV4:     u32 = 228;

pub const ETHERTYPE_IPV4: u64 = 0x0800;

// ── Root ─────────────────────────────────────────────────────────────────────

static ROOT_FIELDS: [F; 3] = [
    F::attached("link_type", FieldKind::Int, SizeRule::Fixed(4)),
    F::attached("packet_id", FieldKind::Int, SizeRule::Fixed(4)),
    F::packed("link", FieldKind::Record(None), 0),
];

pub static ROOT: Layout = Layout { name: "Root", endian: Endian::Big, fields: &ROOT_FIELDS };

pub struct Root;

impl RecordType for Root {
    fn name(&self) -> &'static str {
        "Root"
    }

    fn layout(&self) -> &'static Layout {
        &ROOT
    }

    fn read(&self, tree: &mut Tree, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
        let link_type = tree.int(id, "link_type").unwrap_or(0) as u32;
        match registry::for_link_type(link_type) {
            Some(ty) => {
                tree.attach(id, "link", ty);
            }
            None => {
                log::debug!("no dissector for link type {link_type}");
                tree.detach(id, "link");
            }
        }
        packet::read(tree, id, input)
    }
}

// ── Ethernet ─────────────────────────────────────────────────────────────────

static ETHERNET_FIELDS: [F; 4] = [
    F::packed("dst",       FieldKind::HexString, 6),
    F::packed("src",       FieldKind::HexString, 6),
    F::packed("ethertype", FieldKind::HexInt,    2),
    F::packed("ip",        FieldKind::Record(None), 0),
];

pub static ETHERNET: Layout = Layout { name: "Ethernet", endian: Endian::Big, fields: &ETHERNET_FIELDS };

pub struct Ethernet;

impl RecordType for Ethernet {
    fn name(&self) -> &'static str {
        "Ethernet"
    }

    fn layout(&self) -> &'static Layout {
        &ETHERNET
    }

    fn read(&self, tree: &mut Tree, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
        // A child left from an earlier read would be decoded before the
        // ethertype that selects it.
        tree.detach(id, "ip");
        let mut len = packet::read(tree, id, input)?;

        if tree.int(id, "ethertype") == Some(ETHERTYPE_IPV4) {
            if let Some(ip) = tree.attach(id, "ip", &Ipv4Header) {
                len += tree.read(ip, input)?;
            }
        }
        Ok(len)
    }
}

// ── IPv4 ─────────────────────────────────────────────────────────────────────

static IPV4_FIELDS: [F; 10] = [
    F::packed("version_ihl",  FieldKind::HexInt, 1),
    F::packed("tos",          FieldKind::Int,    1),
    F::packed("total_length", FieldKind::Int,    2),
    F::packed("id",           FieldKind::HexInt, 2),
    F::packed("frag_off",     FieldKind::Int,    2),
    F::packed("ttl",          FieldKind::Int,    1),
    F::packed("protocol",     FieldKind::Int,    1),
    F::packed("checksum",     FieldKind::HexInt, 2),
    F::packed("src",          FieldKind::Ipv4,   4),
    F::packed("dst",          FieldKind::Ipv4,   4),
];

pub static IPV4: Layout = Layout { name: "IPv4", endian: Endian::Big, fields: &IPV4_FIELDS };

/// Fixed 20-byte IPv4 header; options and payload stay in the stream.
pub struct Ipv4Header;

impl Ipv4Header {
    pub fn version(tree: &Tree, id: NodeId) -> Option<u8> {
        tree.int(id, "version_ihl").map(|v| (v >> 4) as u8)
    }

    pub fn header_len(tree: &Tree, id: NodeId) -> Option<usize> {
        tree.int(id, "version_ihl").map(|v| (v as usize & 0x0f) * 4)
    }
}

impl RecordType for Ipv4Header {
    fn name(&self) -> &'static str {
        "IPv4"
    }

    fn layout(&self) -> &'static Layout {
        &IPV4
    }
}
