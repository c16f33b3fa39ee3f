//! libpcap capture format.
//!
//! A capture is a 24-byte [`FileHeader`] followed by records, each a
//! 16-byte [`RecordHeader`] and `caplen` bytes of data.  The file may be
//! written in either byte order; the magic tells which, and every record
//! header is decoded with the same byte order as the file header.
//!
//! | File header | bytes |
//! |-------------|-------|
//! | magic | 4 |
//! | version_major / version_minor | 2 + 2 |
//! | thiszone / sigfigs / snaplen / linktype | 4 each |
//!
//! | Record header | bytes |
//! |---------------|-------|
//! | ts_sec / ts_usec | 4 + 4 |
//! | caplen / len | 4 + 4 |
//! | data | caplen |

pub mod file_header;
pub mod reader;
pub mod record_header;
pub mod scanner;
pub mod writer;

pub use file_header::{FileHeader, FileHeaderFields, FILE_HEADER_SIZE, MAGIC, MAGIC_SWAPPED};
pub use reader::{PcapReader, ReaderOptions, DEFAULT_FILL_SIZE};
pub use record_header::{RecordHeader, RecordSummary, RECORD_HEADER_SIZE};
pub use scanner::{scan, ScanEnd, ScanReport};
pub use writer::PcapWriter;
