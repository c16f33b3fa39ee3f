pub mod stream;
pub mod packet;
pub mod registry;
pub mod net;
pub mod pcap;
pub mod capture;

pub use stream::{Stream, StreamError};
pub use packet::{DecodeError, EncodeError, Endian, Limits, NodeId, Record, RecordType, Tree, Value};
pub use packet::lookup::{find_field_by_name, find_field_recursive, find_record, resolve_path};
pub use pcap::{FileHeader, PcapReader, PcapWriter, ReaderOptions, RecordHeader};
pub use capture::Capture;
