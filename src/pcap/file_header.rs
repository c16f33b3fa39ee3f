use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;

use crate::packet::{self, DecodeError, Endian, FieldDescriptor as F, FieldKind, Layout, NodeId, Record, RecordType, Tree, Value};
use crate::stream::{Stream, StreamError};

/// Magic as it reads when file and decoder agree on byte order.
pub const MAGIC: u32 = 0xA1B2C3D4;
/// Magic as it reads when a little-endian file is decoded as big-endian.
pub const MAGIC_SWAPPED: u32 = 0xD4C3B2A1;
pub const FILE_HEADER_SIZE: usize = 24;

static FIELDS: [F; 7] = [
    F::packed("magic",         FieldKind::HexInt, 4),
    F::packed("version_major", FieldKind::Int,    2),
    F::packed("version_minor", FieldKind::Int,    2),
    F::packed("thiszone",      FieldKind::Int,    4),
    F::packed("sigfigs",       FieldKind::Int,    4),
    F::packed("snaplen",       FieldKind::Int,    4),
    F::packed("linktype",      FieldKind::Int,    4),
];

pub static FILE_HEADER_BE: Layout = Layout { name: "FileHeader", endian: Endian::Big,    fields: &FIELDS };
pub static FILE_HEADER_LE: Layout = Layout { name: "FileHeader", endian: Endian::Little, fields: &FIELDS };

/// Global capture header.  Detects the file's byte order from the magic.
pub struct FileHeader;

impl FileHeader {
    pub fn layout_for(endian: Endian) -> &'static Layout {
        match endian {
            Endian::Big    => &FILE_HEADER_BE,
            Endian::Little => &FILE_HEADER_LE,
        }
    }

    pub fn is_little_endian(tree: &Tree, id: NodeId) -> bool {
        tree.node(id).layout.endian == Endian::Little
    }
}

impl RecordType for FileHeader {
    fn name(&self) -> &'static str {
        "FileHeader"
    }

    fn layout(&self) -> &'static Layout {
        &FILE_HEADER_BE
    }

    /// Decode as big-endian first; a byte-swapped magic means the file is
    /// little-endian, so switch tables, rewind and decode again.
    ///
    /// A magic matching neither form is rejected before anything is consumed.
    fn read(&self, tree: &mut Tree, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
        let offset = input.position() as u64;
        let magic = match input.unread().get(..4) {
            Some(head) => BigEndian::read_u32(head),
            None => {
                return Err(StreamError::Exhausted { wanted: 4, available: input.remaining() }.into());
            }
        };
        if magic != MAGIC && magic != MAGIC_SWAPPED {
            return Err(DecodeError::BadMagic(magic));
        }

        tree.set_layout(id, &FILE_HEADER_BE);
        let mut len = packet::read(tree, id, input)?;

        if tree.int(id, "magic") == Some(MAGIC_SWAPPED as u64) {
            log::debug!("byte-swapped magic at offset {offset}, re-reading as little-endian");
            tree.set_layout(id, &FILE_HEADER_LE);
            input.seek(SeekFrom::Start(offset))?;
            len = packet::read(tree, id, input)?;
        }
        Ok(len)
    }
}

/// Plain copy of the file header's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeaderFields {
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone:      i32,
    pub sigfigs:       u32,
    pub snaplen:       u32,
    pub linktype:      u32,
}

impl Default for FileHeaderFields {
    fn default() -> Self {
        Self {
            version_major: 2,
            version_minor: 4,
            thiszone:      0,
            sigfigs:       0,
            snaplen:       65535,
            linktype:      crate::net::LINKTYPE_ETHERNET,
        }
    }
}

impl FileHeaderFields {
    pub fn from_record(rec: &Record<'_>) -> Option<Self> {
        Some(Self {
            version_major: rec.int("version_major")? as u16,
            version_minor: rec.int("version_minor")? as u16,
            thiszone:      rec.int("thiszone")? as u32 as i32,
            sigfigs:       rec.int("sigfigs")? as u32,
            snaplen:       rec.int("snaplen")? as u32,
            linktype:      rec.int("linktype")? as u32,
        })
    }

    /// Store these fields (and the canonical magic) into a file header node.
    pub fn apply(&self, tree: &mut Tree, id: NodeId) {
        tree.set(id, "magic",         Value::Int(MAGIC as u64));
        tree.set(id, "version_major", Value::Int(self.version_major as u64));
        tree.set(id, "version_minor", Value::Int(self.version_minor as u64));
        tree.set(id, "thiszone",      Value::Int(self.thiszone as u32 as u64));
        tree.set(id, "sigfigs",       Value::Int(self.sigfigs as u64));
        tree.set(id, "snaplen",       Value::Int(self.snaplen as u64));
        tree.set(id, "linktype",      Value::Int(self.linktype as u64));
    }
}
