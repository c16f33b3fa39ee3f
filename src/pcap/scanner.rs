//! Whole-capture scan that explains why decoding stopped.
//!
//! The reader treats every failure as "no more records".  Whether that was
//! a clean end of file, a capture cut off mid-record, or a corrupt header is
//! decided here from the stop reason and the bytes left unconsumed.
//!
//! | End | Meaning |
//! |-----|---------|
//! | `Clean` | Input ended exactly on a record boundary |
//! | `Truncated` | Input ended inside a record header or payload |
//! | `Corrupt` | A header was readable but not plausible |

use serde::Serialize;
use std::io::{Read, Seek};

use super::reader::PcapReader;
use super::record_header::RecordSummary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScanEnd {
    Clean,
    Truncated { offset: u64, leftover: usize },
    Corrupt { offset: u64, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub records:        u64,
    pub payload_bytes:  u64,
    /// Records whose capture length is below their original length.
    pub snapped:        u64,
    pub first_ts:       Option<u32>,
    pub last_ts:        Option<u32>,
    /// Logical offset just past the last good record.
    pub end_offset:     u64,
    pub end:            ScanEnd,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.end == ScanEnd::Clean
    }

    pub fn summary(&self) -> String {
        let end = match &self.end {
            ScanEnd::Clean => String::from("clean end"),
            ScanEnd::Truncated { offset, leftover } => {
                format!("truncated at offset {offset} ({leftover} stray bytes)")
            }
            ScanEnd::Corrupt { offset, reason } => format!("corrupt at offset {offset}: {reason}"),
        };
        format!(
            "{} record(s), {} payload bytes, {} snapped; {}",
            self.records, self.payload_bytes, self.snapped, end,
        )
    }
}

/// Scan every remaining record of `reader`.
///
/// `progress`, if given, is called after each record with
/// `(records_so_far, current_offset)`.
pub fn scan<R, F>(reader: &mut PcapReader<R>, mut progress: Option<&mut F>) -> ScanReport
where
    R: Read + Seek,
    F: FnMut(u64, u64),
{
    let mut records       = 0u64;
    let mut payload_bytes = 0u64;
    let mut snapped       = 0u64;
    let mut first_ts      = None;
    let mut last_ts       = None;

    while let Some(rec) = reader.next_record() {
        let Some(summary) = RecordSummary::from_record(&rec) else {
            break;
        };
        records       += 1;
        payload_bytes += summary.caplen as u64;
        if summary.is_truncated() {
            snapped += 1;
        }
        first_ts.get_or_insert(summary.ts_sec);
        last_ts = Some(summary.ts_sec);

        if let Some(ref mut cb) = progress {
            cb(records, reader.current_offset());
        }
    }

    let end_offset = reader.current_offset();
    let end = match reader.stop_reason() {
        None => ScanEnd::Clean,
        Some(e) if e.is_exhausted() && reader.buffered() == 0 => ScanEnd::Clean,
        Some(e) if e.is_exhausted() => ScanEnd::Truncated { offset: end_offset, leftover: reader.buffered() },
        Some(e) => ScanEnd::Corrupt { offset: end_offset, reason: e.to_string() },
    };

    ScanReport { records, payload_bytes, snapped, first_ts, last_ts, end_offset, end }
}
