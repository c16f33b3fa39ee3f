use pktframe::packet::lookup::{find_field_recursive, find_record, path_of, resolve_path};
use pktframe::net::Ipv4Header;
use pktframe::packet::{EncodeError, FieldDescriptor, FieldKind, Layout, Limits, RecordType, Tree, DEFAULT_MAX_CAPLEN};
use pktframe::pcap::{scan, FileHeaderFields, PcapReader, PcapWriter, ScanEnd, FILE_HEADER_SIZE, RECORD_HEADER_SIZE};
use pktframe::{Capture, DecodeError, Endian, FileHeader, RecordHeader, Stream};
use std::io::Cursor;
use tempfile::NamedTempFile;

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn u16b(v: u16, e: Endian) -> [u8; 2] {
    match e { Endian::Big => v.to_be_bytes(), Endian::Little => v.to_le_bytes() }
}

fn u32b(v: u32, e: Endian) -> [u8; 4] {
    match e { Endian::Big => v.to_be_bytes(), Endian::Little => v.to_le_bytes() }
}

fn file_header(e: Endian, snaplen: u32, linktype: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(u32b(0xA1B2C3D4, e));
    out.extend(u16b(2, e));
    out.extend(u16b(4, e));
    out.extend(u32b(0, e));
    out.extend(u32b(0, e));
    out.extend(u32b(snaplen, e));
    out.extend(u32b(linktype, e));
    out
}

fn record(e: Endian, ts_sec: u32, caplen: u32, len: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(u32b(ts_sec, e));
    out.extend(u32b(500, e));
    out.extend(u32b(caplen, e));
    out.extend(u32b(len, e));
    out.extend_from_slice(data);
    out
}

fn capture(e: Endian, payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = file_header(e, 65535, 1);
    for (i, p) in payloads.iter().enumerate() {
        out.extend(record(e, 1_700_000_000 + i as u32, p.len() as u32, p.len() as u32, p));
    }
    out
}

/// Ethernet + 20-byte IPv4 header, 10.0.0.1 → 192.168.1.20, TTL 64, UDP.
fn ipv4_frame() -> Vec<u8> {
    let mut f = Vec::new();
    f.extend([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    f.extend([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    f.extend([0x08, 0x00]);
    f.extend([0x45, 0x00, 0x00, 0x1c, 0xbe, 0xef, 0x40, 0x00, 64, 17, 0x12, 0x34]);
    f.extend([10, 0, 0, 1]);
    f.extend([192, 168, 1, 20]);
    f.extend(b"payload!");
    f
}

// ── End to end ───────────────────────────────────────────────────────────────

#[test]
fn test_single_record_then_end_of_stream() {
    let payload = [0xABu8; 14];
    let bytes = capture(Endian::Big, &[&payload]);

    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();
    let fields = reader.file_fields().unwrap();
    assert_eq!(fields.snaplen, 65535);
    assert_eq!(fields.linktype, 1);
    assert!(!reader.is_little_endian());

    let mut count = 0;
    while let Some(rec) = reader.next_record() {
        assert_eq!(rec.int("caplen"), Some(14));
        assert_eq!(rec.bytes("data"), Some(&payload[..]));
        assert_eq!(rec.int("offset"), Some(FILE_HEADER_SIZE as u64));
        count += 1;
    }

    assert_eq!(count, 1);
    assert_eq!(reader.current_offset(), (FILE_HEADER_SIZE + RECORD_HEADER_SIZE + 14) as u64);
    assert!(reader.stop_reason().unwrap().is_exhausted());
    assert_eq!(reader.buffered(), 0);
    assert!(reader.is_drained());
    assert!(reader.current().is_none());
}

#[test]
fn test_small_fill_size_still_reads_every_record() {
    let payloads: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; 100 + i as usize]).collect();
    let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
    let bytes = capture(Endian::Little, &refs);

    let options = pktframe::ReaderOptions { fill_size: 7, limits: Limits { max_caplen: 512 } };
    let mut reader = PcapReader::with_options(Cursor::new(bytes), options).unwrap();
    assert_eq!(reader.options(), options);
    let summaries: Vec<_> = reader.summaries().collect();
    assert_eq!(summaries.len(), 20);
    assert_eq!(summaries[19].caplen, 119);
}

// ── Endianness detection ─────────────────────────────────────────────────────

#[test]
fn test_layout_fixed_sizes_match_wire_sizes() {
    for e in [Endian::Big, Endian::Little] {
        assert_eq!(FileHeader::layout_for(e).fixed_size(), FILE_HEADER_SIZE);
        assert_eq!(RecordHeader::layout_for(e).fixed_size(), RECORD_HEADER_SIZE);
    }
    assert_eq!(Ipv4Header.layout().fixed_size(), 20);
}

#[test]
fn test_little_endian_header_is_detected() {
    let bytes = file_header(Endian::Little, 262144, 101);
    let mut tree = Tree::new();
    let id = tree.construct(&FileHeader, None);
    let mut input = Stream::from_bytes(bytes.clone());

    assert_eq!(tree.read(id, &mut input).unwrap(), FILE_HEADER_SIZE);
    assert!(FileHeader::is_little_endian(&tree, id));
    assert_eq!(tree.int(id, "magic"), Some(0xA1B2C3D4));

    // Every field agrees with a manual byte swap of the big-endian reading.
    let swapped = |at: usize| u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap()).swap_bytes() as u64;
    assert_eq!(tree.int(id, "snaplen"), Some(swapped(16)));
    assert_eq!(tree.int(id, "linktype"), Some(swapped(20)));
    let major = u16::from_be_bytes([bytes[4], bytes[5]]).swap_bytes() as u64;
    assert_eq!(tree.int(id, "version_major"), Some(major));
    assert_eq!(tree.int(id, "snaplen"), Some(262144));
}

#[test]
fn test_unknown_magic_consumes_nothing() {
    let mut bytes = file_header(Endian::Big, 65535, 1);
    bytes[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

    let mut tree = Tree::new();
    let id = tree.construct(&FileHeader, None);
    let mut input = Stream::from_bytes(bytes);

    match tree.read(id, &mut input) {
        Err(DecodeError::BadMagic(m)) => assert_eq!(m, 0xDEADBEEF),
        other => panic!("expected BadMagic, got {other:?}"),
    }
    assert_eq!(input.position(), 0);

    // Only the magic present: still rejected as a format mismatch.
    let mut four = Stream::from_bytes(vec![1, 2, 3, 4]);
    assert!(matches!(tree.read(id, &mut four), Err(DecodeError::BadMagic(0x01020304))));
    assert_eq!(four.position(), 0);

    assert!(PcapReader::open(Cursor::new(vec![0u8; 64])).is_err());
}

#[test]
fn test_little_endian_capture_records() {
    let bytes = capture(Endian::Little, &[b"first", b"second"]);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();
    assert!(reader.is_little_endian());

    let first = reader.next_record().unwrap();
    assert_eq!(first.int("ts_sec"), Some(1_700_000_000));
    assert_eq!(first.int("ts_usec"), Some(500));
    assert_eq!(first.bytes("data"), Some(&b"first"[..]));
    let second = reader.next_record().unwrap();
    assert_eq!(second.bytes("data"), Some(&b"second"[..]));
    assert!(reader.next_record().is_none());
}

// ── Sanity ceiling ───────────────────────────────────────────────────────────

#[test]
fn test_caplen_above_ceiling_is_rejected() {
    let bytes = record(Endian::Big, 1, DEFAULT_MAX_CAPLEN + 1, 60, &[]);
    let mut tree = Tree::new();
    let id = tree.construct(&RecordHeader, None);
    let mut input = Stream::from_bytes(bytes);

    match tree.read(id, &mut input) {
        Err(DecodeError::CaptureTooLarge { caplen, ceiling }) => {
            assert_eq!(caplen, DEFAULT_MAX_CAPLEN as u64 + 1);
            assert_eq!(ceiling, DEFAULT_MAX_CAPLEN);
        }
        other => panic!("expected CaptureTooLarge, got {other:?}"),
    }
    assert_eq!(tree.bytes(id, "data"), Some(&[][..]));
    assert_eq!(input.position(), 0);
}

#[test]
fn test_ceiling_is_configurable() {
    let data = [7u8; 200];
    let bytes = record(Endian::Big, 1, 200, 200, &data);

    let mut strict = Tree::with_limits(Limits { max_caplen: 100 });
    let id = strict.construct(&RecordHeader, None);
    assert!(matches!(
        strict.read(id, &mut Stream::from_bytes(bytes.clone())),
        Err(DecodeError::CaptureTooLarge { caplen: 200, ceiling: 100 })
    ));

    let mut lenient = Tree::with_limits(Limits { max_caplen: 200 });
    let id = lenient.construct(&RecordHeader, None);
    assert_eq!(lenient.read(id, &mut Stream::from_bytes(bytes)).unwrap(), RECORD_HEADER_SIZE + 200);
}

#[test]
fn test_short_payload_is_not_a_record() {
    let bytes = record(Endian::Big, 1, 10, 10, b"abc");
    let mut tree = Tree::new();
    let id = tree.construct(&RecordHeader, None);
    let mut input = Stream::from_bytes(bytes);

    let err = tree.read(id, &mut input).unwrap_err();
    assert!(err.is_exhausted());
    assert_eq!(input.position(), 0);
    assert_eq!(tree.node(id).length, 0);
}

// ── Lookup ───────────────────────────────────────────────────────────────────

struct Frame;

static FRAME_FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor::packed("seq", FieldKind::Int, 2),
    FieldDescriptor::packed("header", FieldKind::Record(Some(&RecordHeader)), 0),
];
static FRAME: Layout = Layout { name: "Frame", endian: Endian::Big, fields: &FRAME_FIELDS };

impl RecordType for Frame {
    fn name(&self) -> &'static str {
        "Frame"
    }

    fn layout(&self) -> &'static Layout {
        &FRAME
    }
}

#[test]
fn test_resolve_path_into_nested_record() {
    let mut bytes = vec![0x00, 0x07];
    bytes.extend(record(Endian::Big, 9, 4, 4, b"\x00abc"));

    let mut tree = Tree::new();
    let root = tree.construct(&Frame, None);
    assert_eq!(tree.read(root, &mut Stream::from_bytes(bytes.clone())).unwrap(), bytes.len());

    let header = tree.child(root, "header").unwrap();
    let (node, desc) = resolve_path(&tree, root, "RecordHeader.caplen").unwrap();
    assert_eq!(node, header);
    assert_eq!(desc.unwrap().name, "caplen");

    let (node, desc) = resolve_path(&tree, root, "recordheader.caplen").unwrap();
    assert_eq!((node, desc.map(|d| d.name)), (header, Some("caplen")));
    assert_eq!(resolve_path(&tree, root, "RecordHeader").map(|(n, d)| (n, d.is_none())), Some((header, true)));
    assert!(resolve_path(&tree, root, "NoSuchType.x").is_none());
    assert!(resolve_path(&tree, root, "RecordHeader.nope").is_none());
    assert_eq!(resolve_path(&tree, root, "Frame.seq").map(|(n, _)| n), Some(root));

    assert_eq!(tree.print(root, "RecordHeader.caplen").unwrap(), "RecordHeader.caplen = 4");
    assert_eq!(tree.print(root, "RecordHeader.data").unwrap(), "RecordHeader.data = \\x00abc");
    assert_eq!(find_record(&tree, root, "recordheader"), Some(header));
    assert_eq!(find_field_recursive(&tree, root, "ts_sec").map(|(n, _)| n), Some(header));

    let mut out = Stream::new();
    assert_eq!(tree.write(root, &mut out).unwrap(), bytes.len());
    assert_eq!(out.as_slice(), &bytes[..]);
}

#[test]
fn test_dissect_ethernet_ipv4() {
    let frame = ipv4_frame();
    let bytes = capture(Endian::Big, &[&frame, &frame]);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    let rec = reader.dissect(None).unwrap();
    assert_eq!(rec.print("IPv4.src").unwrap(), "IPv4.src = 10.0.0.1");
    assert_eq!(rec.print("ipv4.dst").unwrap(), "ipv4.dst = 192.168.1.20");
    assert_eq!(rec.print("IPv4.ttl").unwrap(), "IPv4.ttl = 64");
    assert_eq!(rec.print("IPv4.id").unwrap(), "IPv4.id = 0xbeef");
    assert_eq!(rec.print("IPv4.version_ihl").unwrap(), "IPv4.version_ihl = 0x45");
    assert_eq!(rec.print("Ethernet.ethertype").unwrap(), "Ethernet.ethertype = 0x0800");
    assert_eq!(rec.print("Ethernet.src").unwrap(), "Ethernet.src = 0x001122334455");
    assert_eq!(rec.print("Root.packet_id").unwrap(), "Root.packet_id = 0");
    assert_eq!(rec.print("Root.link").unwrap(), "Root.link = <Ethernet>");
    assert!(rec.print("Tcp.sport").is_none());

    let tree = rec.tree();
    let (ip, desc) = find_field_recursive(tree, rec.id(), "protocol").unwrap();
    assert_eq!(desc.name, "protocol");
    assert_eq!(tree.int(ip, "protocol"), Some(17));
    assert_eq!(path_of(tree, ip), "RecordHeader.Root.Ethernet.IPv4");
    assert_eq!(tree.node(ip).length, 20);
    assert_eq!(Ipv4Header::version(tree, ip), Some(4));
    assert_eq!(Ipv4Header::header_len(tree, ip), Some(20));

    let (found, field) = rec.resolve("IPv4.src").unwrap();
    assert_eq!(found.id(), ip);
    assert_eq!(found.type_name(), "IPv4");
    assert_eq!(
        resolve_path(tree, rec.id(), "IPv4.src").map(|(n, d)| (n, d.map(|d| d.name))),
        Some((found.id(), field.map(|d| d.name))),
    );
    assert_eq!(found.format("src").as_deref(), Some("10.0.0.1"));
    assert_eq!(rec.format("caplen").as_deref(), Some("42"));
    assert!(rec.format("nope").is_none());

    // Re-encoding the record header reproduces its bytes on the wire.
    assert_eq!(rec.encode().unwrap(), record(Endian::Big, 1_700_000_000, 42, 42, &frame));

    let second = reader.dissect(None).unwrap();
    assert_eq!(second.int("id"), Some(1));
    assert_eq!(second.print("Root.packet_id").unwrap(), "Root.packet_id = 1");

    // Explicit ids are used as given.
    reader.rewind().unwrap();
    let rec = reader.dissect(Some(42)).unwrap();
    assert_eq!(rec.int("id"), Some(42));
}

#[test]
fn test_dissect_failure_keeps_record() {
    let bytes = capture(Endian::Big, &[b"short"]);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    let rec = reader.dissect(None).unwrap();
    assert_eq!(rec.bytes("data"), Some(&b"short"[..]));
    assert!(rec.child("root").is_none());
    assert!(rec.print("Ethernet.src").is_none());
}

// ── Record lifetime ──────────────────────────────────────────────────────────

#[test]
fn test_previous_record_is_released() {
    let bytes = capture(Endian::Big, &[b"aaaa", b"bbbb", b"cccc"]);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    let (kept, kept_id) = {
        let first = reader.next_record().unwrap();
        first.tree().clone_subtree(first.id())
    };
    let live_before = reader.tree().len();
    reader.next_record().unwrap();
    reader.next_record().unwrap();

    // File header plus one current record header.
    assert_eq!(reader.tree().len(), live_before);
    assert_eq!(reader.tree().len(), 2);
    assert_eq!(kept.bytes(kept_id, "data"), Some(&b"aaaa"[..]));
}

#[test]
fn test_dissected_layers_are_released_with_their_record() {
    let frame = ipv4_frame();
    let frames: Vec<&[u8]> = (0..50).map(|_| frame.as_slice()).collect();
    let bytes = capture(Endian::Big, &frames);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    let mut records = 0;
    let mut max_live = 0;
    let mut ip_ids = Vec::new();
    while let Some(rec) = reader.dissect(None) {
        assert!(rec.print("IPv4.src").is_some());
        ip_ids.push(find_record(rec.tree(), rec.id(), "IPv4").unwrap());
        records += 1;
        max_live = max_live.max(rec.tree().len());
    }

    // File header, record header, Root, Ethernet, IPv4.
    assert_eq!(records, 50);
    assert_eq!(max_live, 5);
    assert_eq!(reader.tree().len(), 1);
    assert!(ip_ids.iter().all(|id| !reader.tree().contains(*id)));
}

#[test]
fn test_stale_id_does_not_alias_reused_slot() {
    let bytes = capture(Endian::Big, &[b"abcd", b"efghijkl"]);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    let first = reader.next_record().unwrap().id();
    assert!(reader.tree().contains(first));
    let second = reader.next_record().unwrap().id();

    assert_eq!(second.index(), first.index());
    assert_ne!(second, first);
    assert!(!reader.tree().contains(first));
    assert_eq!(reader.tree().int(second, "caplen"), Some(8));
}

#[test]
#[should_panic(expected = "stale NodeId")]
fn test_stale_id_access_panics() {
    let bytes = capture(Endian::Big, &[b"abcd", b"efghijkl"]);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    let first = reader.next_record().unwrap().id();
    reader.next_record().unwrap();
    let _ = reader.tree().int(first, "caplen");
}

#[test]
fn test_seek_resumes_at_saved_offset() {
    let bytes = capture(Endian::Big, &[b"one", b"two", b"three"]);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    reader.next_record().unwrap();
    assert_eq!(reader.current().unwrap().bytes("data"), Some(&b"one"[..]));
    let saved = reader.current_offset();
    assert_eq!(reader.next_record().unwrap().bytes("data"), Some(&b"two"[..]));

    reader.seek(saved).unwrap();
    assert_eq!(reader.current_offset(), saved);
    assert_eq!(reader.next_record().unwrap().bytes("data"), Some(&b"two"[..]));

    reader.rewind().unwrap();
    assert_eq!(reader.next_record().unwrap().bytes("data"), Some(&b"one"[..]));
}

// ── Writer ───────────────────────────────────────────────────────────────────

#[test]
fn test_writer_output_matches_hand_built_capture() {
    for endian in [Endian::Big, Endian::Little] {
        let mut w = PcapWriter::new(Vec::new(), FileHeaderFields::default(), endian).unwrap();
        w.write_record(1_700_000_000, 500, 5, b"first").unwrap();
        w.write_record(1_700_000_001, 500, 6, b"second").unwrap();
        assert_eq!(w.records_written(), 2);
        assert_eq!(w.into_inner(), capture(endian, &[b"first", b"second"]));
    }
}

#[test]
fn test_writer_refuses_records_over_ceiling() {
    let big = vec![0u8; DEFAULT_MAX_CAPLEN as usize + 1];

    let mut w = PcapWriter::new(Vec::new(), FileHeaderFields::default(), Endian::Big).unwrap();
    assert!(matches!(
        w.write_record(0, 0, big.len() as u32, &big),
        Err(EncodeError::CaptureTooLarge { ceiling: DEFAULT_MAX_CAPLEN, .. })
    ));
    assert_eq!(w.records_written(), 0);
    assert_eq!(w.into_inner().len(), FILE_HEADER_SIZE);

    // A writer and reader sharing a raised ceiling agree.
    let limits = Limits { max_caplen: big.len() as u32 };
    let mut w = PcapWriter::with_limits(Vec::new(), FileHeaderFields::default(), Endian::Big, limits).unwrap();
    assert_eq!(w.limits(), limits);
    w.write_record(0, 0, big.len() as u32, &big).unwrap();

    let options = pktframe::ReaderOptions { limits, ..Default::default() };
    let mut reader = PcapReader::with_options(Cursor::new(w.into_inner()), options).unwrap();
    assert_eq!(reader.next_record().unwrap().bytes("data").map(<[u8]>::len), Some(big.len()));
}

#[test]
fn test_writer_little_endian_magic() {
    let w = PcapWriter::new(Vec::new(), FileHeaderFields::default(), Endian::Little).unwrap();
    assert_eq!(&w.into_inner()[..4], &[0xD4, 0xC3, 0xB2, 0xA1]);
}

#[test]
fn test_rewrite_swaps_byte_order() {
    let src = NamedTempFile::new().unwrap();
    let dst = NamedTempFile::new().unwrap();
    std::fs::write(src.path(), capture(Endian::Big, &[b"alpha", b"beta", b"gamma"])).unwrap();

    let mut cap = Capture::open(src.path()).unwrap();
    assert_eq!(cap.endian(), Endian::Big);
    assert_eq!(cap.rewrite(dst.path(), Endian::Little).unwrap(), 3);

    let original = cap.list().unwrap();
    let mut copy = Capture::open(dst.path()).unwrap();
    assert_eq!(copy.endian(), Endian::Little);
    assert_eq!(copy.list().unwrap(), original);
    assert_eq!(std::fs::read(dst.path()).unwrap(), capture(Endian::Little, &[b"alpha", b"beta", b"gamma"]));

    let info = copy.info().unwrap();
    assert_eq!(info.header.snaplen, 65535);
    assert_eq!(info.file_size, std::fs::metadata(dst.path()).unwrap().len());
}

// ── Scanner ──────────────────────────────────────────────────────────────────

#[test]
fn test_scan_clean_end() {
    let bytes = capture(Endian::Big, &[b"a", b"bb", b"ccc"]);
    let mut reader = PcapReader::open(Cursor::new(bytes.clone())).unwrap();
    let report = scan::<_, fn(u64, u64)>(&mut reader, None);

    assert_eq!(report.records, 3);
    assert_eq!(report.payload_bytes, 6);
    assert_eq!(report.end, ScanEnd::Clean);
    assert_eq!(report.end_offset, bytes.len() as u64);
    assert_eq!(report.first_ts, Some(1_700_000_000));
    assert_eq!(report.last_ts, Some(1_700_000_002));
}

#[test]
fn test_scan_truncated_capture() {
    let mut bytes = capture(Endian::Big, &[b"hello", b"world"]);
    bytes.truncate(bytes.len() - 2);
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();

    let mut calls = 0;
    let mut progress = |_records: u64, _offset: u64| calls += 1;
    let report = scan(&mut reader, Some(&mut progress));

    assert_eq!(report.records, 1);
    assert_eq!(calls, 1);
    assert_eq!(report.end, ScanEnd::Truncated {
        offset:   (FILE_HEADER_SIZE + RECORD_HEADER_SIZE + 5) as u64,
        leftover: RECORD_HEADER_SIZE + 3,
    });
}

#[test]
fn test_scan_corrupt_record() {
    let mut bytes = capture(Endian::Big, &[b"good"]);
    bytes.extend(record(Endian::Big, 0, 0x7FFF_FFFF, 0, b"junk"));
    let mut reader = PcapReader::open(Cursor::new(bytes)).unwrap();
    let report = scan::<_, fn(u64, u64)>(&mut reader, None);

    assert_eq!(report.records, 1);
    assert!(matches!(report.end, ScanEnd::Corrupt { .. }));
    assert!(!report.is_clean());
    assert!(report.summary().contains("corrupt"));
}
