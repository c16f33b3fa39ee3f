//! Sequential capture reader.
//!
//! [`PcapReader`] pulls bytes from any `Read + Seek` source into an internal
//! [`Stream`] and decodes one record header at a time from it.
//!
//! # Buffering
//! Before each record the buffer is topped up until it holds a full record
//! header plus the largest payload the ceiling allows, or the source runs
//! dry.  Consumed bytes are dropped from the front of the buffer, so the
//! logical offset reported by [`PcapReader::current_offset`] is tracked
//! separately from the source position.
//!
//! # Record lifetime
//! Only one record header is alive at a time: [`PcapReader::next_record`]
//! releases the previous one before decoding the next.  Returned
//! [`Record`]s borrow the reader, so the compiler rejects any use of a
//! record after the next call.  Use [`Tree::clone_subtree`] to keep one.
//!
//! # Stopping
//! Iteration ends at the first record that cannot be decoded, whether the
//! input ran out or the data is corrupt.  [`PcapReader::stop_reason`] keeps
//! the error; see [`super::scanner`] for telling the cases apart.

use std::io::{self, Read, Seek, SeekFrom};

use super::file_header::{FileHeader, FileHeaderFields};
use super::record_header::{RecordHeader, RecordSummary, RECORD_HEADER_SIZE};
use crate::net::Root;
use crate::packet::{DecodeError, Endian, Limits, NodeId, Record, Tree, Value};
use crate::stream::Stream;

/// Bytes requested from the source per read call: 64 KiB.
pub const DEFAULT_FILL_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub fill_size: usize,
    pub limits:    Limits,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            fill_size: DEFAULT_FILL_SIZE,
            limits:    Limits::default(),
        }
    }
}

pub struct PcapReader<R: Read + Seek> {
    source:      R,
    options:     ReaderOptions,
    buffer:      Stream,
    dissection:  Stream,
    tree:        Tree,
    file_header: NodeId,
    current:     Option<NodeId>,
    /// Logical offset of the next undecoded byte in the capture.
    offset:      u64,
    /// Offset of the first record, just past the file header.
    data_start:  u64,
    next_id:     u32,
    drained:     bool,
    stop:        Option<DecodeError>,
}

impl<R: Read + Seek> PcapReader<R> {
    pub fn open(source: R) -> Result<Self, DecodeError> {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Decode the file header from the start of `source`.  Fails if the
    /// magic is not a pcap magic in either byte order.
    pub fn with_options(source: R, options: ReaderOptions) -> Result<Self, DecodeError> {
        let mut tree = Tree::with_limits(options.limits);
        let file_header = tree.construct(&FileHeader, None);

        let mut reader = Self {
            source,
            options,
            buffer:      Stream::new(),
            dissection:  Stream::new(),
            tree,
            file_header,
            current:     None,
            offset:      0,
            data_start:  0,
            next_id:     0,
            drained:     false,
            stop:        None,
        };

        reader.fill(super::FILE_HEADER_SIZE)?;
        let len = reader.tree.read(file_header, &mut reader.buffer)?;
        reader.buffer.skip(len);
        reader.offset     = len as u64;
        reader.data_start = len as u64;

        log::debug!(
            "opened {}-endian capture, link type {}",
            reader.endian().name(),
            reader.tree.int(file_header, "linktype").unwrap_or(0),
        );
        Ok(reader)
    }

    // ── Iteration ────────────────────────────────────────────────────────────

    /// Decode the next record header and its payload.
    ///
    /// Returns `None` at the end of the capture or at the first record that
    /// cannot be decoded.
    pub fn next_record(&mut self) -> Option<Record<'_>> {
        let id = self.advance()?;
        Some(self.tree.record(id))
    }

    /// Like [`next_record`](Self::next_record), and additionally decode the
    /// payload with the dissector registered for the capture's link type.
    ///
    /// `packet_id` defaults to a counter starting at zero.  A payload the
    /// dissector cannot decode leaves the record's `root` empty.
    pub fn dissect(&mut self, packet_id: Option<u32>) -> Option<Record<'_>> {
        let packet_id = packet_id.unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        });
        let header = self.advance()?;

        self.dissection.truncate(0);
        self.dissection.write(self.tree.bytes(header, "data").unwrap_or(&[]));
        self.dissection.seek(SeekFrom::Start(0)).ok()?;

        let link_type = self.tree.int(self.file_header, "linktype").unwrap_or(0);
        let root = self.tree.construct(&Root, Some(header));
        self.tree.set(root, "link_type", Value::Int(link_type));
        self.tree.set(root, "packet_id", Value::Int(packet_id as u64));

        match self.tree.read(root, &mut self.dissection) {
            Ok(_) => {
                self.tree.set(header, "root", Value::Record(Some(root)));
            }
            Err(e) => {
                log::debug!("packet {packet_id}: dissection failed: {e}");
                self.tree.release(root);
            }
        }
        self.tree.set(header, "id", Value::Int(packet_id as u64));
        Some(self.tree.record(header))
    }

    /// Drain the remaining records as plain summaries.
    pub fn summaries(&mut self) -> impl Iterator<Item = RecordSummary> + '_ {
        std::iter::from_fn(move || {
            let id = self.advance()?;
            RecordSummary::from_record(&self.tree.record(id))
        })
    }

    fn advance(&mut self) -> Option<NodeId> {
        if let Some(old) = self.current.take() {
            self.tree.release(old);
        }

        let want = RECORD_HEADER_SIZE + self.options.limits.max_caplen as usize;
        if let Err(e) = self.fill(want) {
            self.stop = Some(e.into());
            return None;
        }

        let id = self.tree.construct(&RecordHeader, None);
        self.tree.set_layout(id, RecordHeader::layout_for(self.endian()));

        match self.tree.read(id, &mut self.buffer) {
            Ok(len) => {
                self.tree.set(id, "offset", Value::Int(self.offset));
                self.offset += len as u64;
                self.buffer.skip(self.buffer.position());
                self.current = Some(id);
                Some(id)
            }
            Err(e) => {
                log::debug!("stopped at offset {}: {e}", self.offset);
                self.stop = Some(e);
                self.tree.release(id);
                None
            }
        }
    }

    /// Top the buffer up to `want` unread bytes, or until the source is dry.
    fn fill(&mut self, want: usize) -> io::Result<()> {
        let mut chunk = vec![0u8; self.options.fill_size.max(1)];
        while self.buffer.remaining() < want && !self.drained {
            match self.source.read(&mut chunk) {
                Ok(0) => self.drained = true,
                Ok(n) => self.buffer.append(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // ── Positioning ──────────────────────────────────────────────────────────

    /// Resume decoding at logical `offset`, dropping any buffered lookahead.
    pub fn seek(&mut self, offset: u64) -> io::Result<u64> {
        if let Some(old) = self.current.take() {
            self.tree.release(old);
        }
        self.buffer.truncate(0);
        self.drained = false;
        self.stop    = None;
        self.offset  = offset;
        self.source.seek(SeekFrom::Start(offset))
    }

    /// Go back to the first record.
    pub fn rewind(&mut self) -> io::Result<u64> {
        self.seek(self.data_start)
    }

    /// Logical offset of the next record; pass it to [`seek`](Self::seek)
    /// to resume here later.
    pub fn current_offset(&self) -> u64 {
        self.offset
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn file_header(&self) -> Record<'_> {
        self.tree.record(self.file_header)
    }

    pub fn file_fields(&self) -> Option<FileHeaderFields> {
        FileHeaderFields::from_record(&self.file_header())
    }

    pub fn endian(&self) -> Endian {
        self.tree.node(self.file_header).layout.endian
    }

    pub fn is_little_endian(&self) -> bool {
        FileHeader::is_little_endian(&self.tree, self.file_header)
    }

    /// The record returned by the last successful call, if still alive.
    pub fn current(&self) -> Option<Record<'_>> {
        self.current.map(|id| self.tree.record(id))
    }

    /// Why the last call returned `None`.
    pub fn stop_reason(&self) -> Option<&DecodeError> {
        self.stop.as_ref()
    }

    /// Unconsumed bytes sitting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.remaining()
    }

    /// True once the source has reported end of file.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn options(&self) -> ReaderOptions {
        self.options
    }
}
