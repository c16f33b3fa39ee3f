use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::packet::{
    self, DecodeError, EncodeError, Endian, FieldDescriptor as F, FieldKind, Layout, NodeId, Record,
    RecordType, SizeRule, Tree, Value,
};
use crate::stream::Stream;

pub const RECORD_HEADER_SIZE: usize = 16;

static FIELDS: [F; 8] = [
    F::packed("ts_sec",  FieldKind::Int, 4),
    F::packed("ts_usec", FieldKind::Int, 4),
    F::packed("caplen",  FieldKind::Int, 4),
    F::packed("len",     FieldKind::Int, 4),
    // Set by the reader / dissector, never on the wire.
    F::attached("offset", FieldKind::Int,          SizeRule::Fixed(8)),
    F::attached("id",     FieldKind::Int,          SizeRule::Fixed(4)),
    F::attached("root",   FieldKind::Record(None), SizeRule::Fixed(0)),
    // Follows the fixed header on the wire; moved by read/write below.
    F::attached("data",   FieldKind::String,       SizeRule::Field("caplen")),
];

pub static RECORD_HEADER_BE: Layout = Layout { name: "RecordHeader", endian: Endian::Big,    fields: &FIELDS };
pub static RECORD_HEADER_LE: Layout = Layout { name: "RecordHeader", endian: Endian::Little, fields: &FIELDS };

/// Per-record header followed by `caplen` bytes of captured data.
pub struct RecordHeader;

impl RecordHeader {
    pub fn layout_for(endian: Endian) -> &'static Layout {
        match endian {
            Endian::Big    => &RECORD_HEADER_BE,
            Endian::Little => &RECORD_HEADER_LE,
        }
    }
}

impl RecordType for RecordHeader {
    fn name(&self) -> &'static str {
        "RecordHeader"
    }

    fn layout(&self) -> &'static Layout {
        &RECORD_HEADER_BE
    }

    fn read(&self, tree: &mut Tree, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
        tree.set(id, "data", Value::Bytes(Vec::new()));
        let len = packet::read(tree, id, input)?;

        // A length this large cannot be trusted to locate the next record.
        let caplen  = tree.int(id, "caplen").unwrap_or(0);
        let ceiling = tree.limits().max_caplen;
        if caplen > ceiling as u64 {
            log::warn!("record at stream offset {} declares caplen {caplen} > {ceiling}", input.position() - len);
            return Err(DecodeError::CaptureTooLarge { caplen, ceiling });
        }

        let data = input.read_exact(caplen as usize)?.to_vec();
        tree.set(id, "data", Value::Bytes(data));
        Ok(len + caplen as usize)
    }

    fn write(&self, tree: &Tree, id: NodeId, output: &mut Stream) -> Result<usize, EncodeError> {
        let data   = tree.bytes(id, "data").unwrap_or(&[]);
        let caplen = tree.int(id, "caplen").unwrap_or(0) as usize;
        if data.len() != caplen {
            return Err(EncodeError::LengthMismatch { field: "data", expected: caplen, actual: data.len() });
        }
        // Refuse what a reader with the same limits would reject as corrupt.
        let ceiling = tree.limits().max_caplen;
        if caplen > ceiling as usize {
            return Err(EncodeError::CaptureTooLarge { caplen: caplen as u64, ceiling });
        }

        let len = packet::write(tree, id, output)?;
        Ok(len + output.write(data))
    }
}

/// One line's worth of record metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub offset:  u64,
    pub ts_sec:  u32,
    pub ts_usec: u32,
    pub caplen:  u32,
    pub len:     u32,
}

impl RecordSummary {
    pub fn from_record(rec: &Record<'_>) -> Option<Self> {
        Some(Self {
            offset:  rec.int("offset")?,
            ts_sec:  rec.int("ts_sec")? as u32,
            ts_usec: rec.int("ts_usec")? as u32,
            caplen:  rec.int("caplen")? as u32,
            len:     rec.int("len")? as u32,
        })
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.ts_sec as i64, self.ts_usec.saturating_mul(1000))
    }

    /// True when the capture was cut short by the snapshot length.
    pub fn is_truncated(&self) -> bool {
        self.caplen < self.len
    }
}
