use std::io::Write;

use super::file_header::{FileHeader, FileHeaderFields};
use super::record_header::RecordHeader;
use crate::packet::{EncodeError, Endian, Limits, NodeId, Record, Tree, Value};
use crate::stream::Stream;

/// Writes a capture through the same descriptor tables the reader uses.
pub struct PcapWriter<W: Write> {
    writer:  W,
    tree:    Tree,
    header:  NodeId,
    record:  NodeId,
    scratch: Stream,
    records: u64,
}

impl<W: Write> PcapWriter<W> {
    /// Emit the file header immediately in the requested byte order.
    pub fn new(writer: W, fields: FileHeaderFields, endian: Endian) -> Result<Self, EncodeError> {
        Self::with_limits(writer, fields, endian, Limits::default())
    }

    /// Like [`new`](Self::new).  Records longer than `limits.max_caplen`
    /// are refused with [`EncodeError::CaptureTooLarge`].
    pub fn with_limits(writer: W, fields: FileHeaderFields, endian: Endian, limits: Limits) -> Result<Self, EncodeError> {
        let mut tree = Tree::with_limits(limits);
        let header = tree.construct(&FileHeader, None);
        tree.set_layout(header, FileHeader::layout_for(endian));
        fields.apply(&mut tree, header);

        let record = tree.construct(&RecordHeader, None);
        tree.set_layout(record, RecordHeader::layout_for(endian));

        let mut out = Self { writer, tree, header, record, scratch: Stream::new(), records: 0 };
        out.emit(header)?;
        Ok(out)
    }

    /// Append one record.  `orig_len` is the length on the wire, which may
    /// exceed `data.len()` for snapped captures.
    pub fn write_record(&mut self, ts_sec: u32, ts_usec: u32, orig_len: u32, data: &[u8]) -> Result<usize, EncodeError> {
        let id = self.record;
        self.tree.set(id, "ts_sec",  Value::Int(ts_sec as u64));
        self.tree.set(id, "ts_usec", Value::Int(ts_usec as u64));
        self.tree.set(id, "caplen",  Value::Int(data.len() as u64));
        self.tree.set(id, "len",     Value::Int(orig_len as u64));
        self.tree.set(id, "data",    Value::Bytes(data.to_vec()));
        let n = self.emit(id)?;
        self.records += 1;
        Ok(n)
    }

    /// Re-emit a decoded record header (from any tree) in this writer's
    /// byte order.
    pub fn write_tree_record(&mut self, rec: &Record<'_>) -> Result<usize, EncodeError> {
        let ts_sec  = rec.int("ts_sec").unwrap_or(0) as u32;
        let ts_usec = rec.int("ts_usec").unwrap_or(0) as u32;
        let len     = rec.int("len").unwrap_or(0) as u32;
        let data    = rec.bytes("data").unwrap_or(&[]);
        self.write_record(ts_sec, ts_usec, len, data)
    }

    fn emit(&mut self, id: NodeId) -> Result<usize, EncodeError> {
        self.scratch.truncate(0);
        let n = self.tree.write(id, &mut self.scratch)?;
        self.writer.write_all(self.scratch.as_slice())?;
        Ok(n)
    }

    pub fn endian(&self) -> Endian {
        self.tree.node(self.header).layout.endian
    }

    pub fn limits(&self) -> Limits {
        self.tree.limits()
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
