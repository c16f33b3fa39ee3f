//! High-level [`Capture`] API over capture files on disk.
//!
//! ```no_run
//! use pktframe::capture::Capture;
//!
//! let mut cap = Capture::open("trace.pcap")?;
//! println!("{} byte order", cap.endian().name());
//! while let Some(rec) = cap.reader().dissect(None) {
//!     if let Some(line) = rec.print("IPv4.src") {
//!         println!("{line}");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::packet::{DecodeError, EncodeError, Endian};
use crate::pcap::{scan, FileHeaderFields, PcapReader, PcapWriter, ReaderOptions, RecordSummary, ScanReport};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("{path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Metadata shown by `info`.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureInfo {
    pub path:       PathBuf,
    pub file_size:  u64,
    pub byte_order: Endian,
    #[serde(flatten)]
    pub header:     FileHeaderFields,
}

pub struct Capture {
    path:   PathBuf,
    reader: PcapReader<File>,
}

impl Capture {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        Self::open_with(path, ReaderOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path).map_err(|source| CaptureError::Open { path: path.clone(), source })?;
        let reader = PcapReader::with_options(file, options)?;
        Ok(Self { path, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn endian(&self) -> Endian {
        self.reader.endian()
    }

    pub fn reader(&mut self) -> &mut PcapReader<File> {
        &mut self.reader
    }

    pub fn stop_reason(&self) -> Option<&DecodeError> {
        self.reader.stop_reason()
    }

    pub fn info(&self) -> Result<CaptureInfo, CaptureError> {
        let file_size = std::fs::metadata(&self.path)?.len();
        Ok(CaptureInfo {
            path:       self.path.clone(),
            file_size,
            byte_order: self.endian(),
            header:     self.reader.file_fields().unwrap_or_default(),
        })
    }

    /// Summaries of every record from the start of the capture.
    pub fn list(&mut self) -> Result<Vec<RecordSummary>, CaptureError> {
        self.reader.rewind()?;
        Ok(self.reader.summaries().collect())
    }

    /// Scan from the start of the capture.
    pub fn scan(&mut self) -> Result<ScanReport, CaptureError> {
        self.reader.rewind()?;
        Ok(scan::<_, fn(u64, u64)>(&mut self.reader, None))
    }

    /// Copy every decodable record into a new capture at `output`, written
    /// in `endian` byte order.  Returns the number of records written.
    pub fn rewrite<P: AsRef<Path>>(&mut self, output: P, endian: Endian) -> Result<u64, CaptureError> {
        let output = output.as_ref();
        let file = File::create(output).map_err(|source| CaptureError::Open { path: output.to_owned(), source })?;
        let fields = self.reader.file_fields().unwrap_or_default();
        let limits = self.reader.options().limits;
        let mut writer = PcapWriter::with_limits(BufWriter::new(file), fields, endian, limits)?;

        self.reader.rewind()?;
        while let Some(rec) = self.reader.next_record() {
            writer.write_tree_record(&rec)?;
        }
        if let Some(reason) = self.reader.stop_reason().filter(|e| !e.is_exhausted()) {
            log::warn!("{}: rewrite stopped early: {reason}", self.path.display());
        }

        writer.flush()?;
        Ok(writer.records_written())
    }
}
