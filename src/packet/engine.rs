//! Generic pack/unpack over a node's active [`Layout`].
//!
//! Both directions walk the `Packed` descriptors in declared order.  Later
//! fields may take their size from earlier ones, so the walk is strictly
//! sequential.  Nested records are handed to their own type's read/write so
//! overrides apply at every depth.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{DecodeError, EncodeError, FieldDescriptor, FieldKind, NodeId, SizeRule, Tree, Value};
use super::layout::Endian;
use crate::stream::Stream;

/// Decode every packed field of `id` from `input`.
///
/// Returns the number of bytes consumed, nested records included.  On error
/// the node may be partially filled and the cursor is wherever the failing
/// field left it; [`Tree::read`] rewinds it.
pub fn unpack(tree: &mut Tree, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
    let layout = tree.node(id).layout;
    let mut consumed = 0usize;

    for (i, desc) in layout.fields.iter().enumerate() {
        if !desc.is_packed() {
            continue;
        }

        if let FieldKind::Record(_) = desc.kind {
            // Empty nested slots belong to types that attach children later.
            if let Some(child) = tree.node(id).slots[i].as_record() {
                consumed += tree.read(child, input)?;
            }
            continue;
        }

        let size = decode_size(tree, id, desc)?;
        let raw  = input.read_exact(size)?;
        let value = if desc.kind.is_integer() {
            Value::Int(read_uint(layout.endian, raw, desc)?)
        } else {
            Value::Bytes(raw.to_vec())
        };
        log::trace!("{}.{} <- {:?} ({} bytes)", layout.name, desc.name, value, size);

        tree.node_mut(id).slots[i] = value;
        consumed += size;
    }

    Ok(consumed)
}

/// Encode every packed field of `id` onto `output`.
pub fn pack(tree: &Tree, id: NodeId, output: &mut Stream) -> Result<usize, EncodeError> {
    let node = tree.node(id);
    let layout = node.layout;
    let mut written = 0usize;

    for (i, desc) in layout.fields.iter().enumerate() {
        if !desc.is_packed() {
            continue;
        }

        match &node.slots[i] {
            Value::Record(Some(child)) => {
                written += tree.write(*child, output)?;
            }
            Value::Record(None) => {}
            Value::Int(v) => {
                let size = encode_size(tree, id, desc)?;
                let mut buf = [0u8; 8];
                let buf = buf.get_mut(..size).ok_or(EncodeError::UnsupportedWidth {
                    field: desc.name,
                    width: size,
                })?;
                write_uint(layout.endian, buf, *v, desc)?;
                written += output.write(buf);
            }
            Value::Bytes(bytes) => {
                let size = encode_size(tree, id, desc)?;
                if bytes.len() != size {
                    return Err(EncodeError::LengthMismatch {
                        field:    desc.name,
                        expected: size,
                        actual:   bytes.len(),
                    });
                }
                written += output.write(bytes);
            }
        }
    }

    Ok(written)
}

// ── Size rules ───────────────────────────────────────────────────────────────

/// Byte count of a field as currently stored in `id`.
pub fn resolve_size(tree: &Tree, id: NodeId, desc: &FieldDescriptor) -> Option<usize> {
    match desc.size {
        SizeRule::Fixed(n)   => Some(n),
        SizeRule::Field(src) => tree.int(id, src).map(|v| v as usize),
    }
}

fn decode_size(tree: &Tree, id: NodeId, desc: &FieldDescriptor) -> Result<usize, DecodeError> {
    resolve_size(tree, id, desc).ok_or(DecodeError::SizeField {
        field:      desc.name,
        size_field: size_field_name(desc),
    })
}

fn encode_size(tree: &Tree, id: NodeId, desc: &FieldDescriptor) -> Result<usize, EncodeError> {
    resolve_size(tree, id, desc).ok_or(EncodeError::SizeField {
        field:      desc.name,
        size_field: size_field_name(desc),
    })
}

fn size_field_name(desc: &FieldDescriptor) -> &'static str {
    match desc.size {
        SizeRule::Field(src) => src,
        SizeRule::Fixed(_)   => desc.name,
    }
}

// ── Integer codec ────────────────────────────────────────────────────────────

fn read_uint(endian: Endian, raw: &[u8], desc: &FieldDescriptor) -> Result<u64, DecodeError> {
    if raw.is_empty() || raw.len() > 8 {
        return Err(DecodeError::UnsupportedWidth { field: desc.name, width: raw.len() });
    }
    Ok(match endian {
        Endian::Big    => BigEndian::read_uint(raw, raw.len()),
        Endian::Little => LittleEndian::read_uint(raw, raw.len()),
    })
}

fn write_uint(endian: Endian, buf: &mut [u8], value: u64, desc: &FieldDescriptor) -> Result<(), EncodeError> {
    let width = buf.len();
    if width == 0 || width > 8 {
        return Err(EncodeError::UnsupportedWidth { field: desc.name, width });
    }
    if width < 8 && value >> (width * 8) != 0 {
        return Err(EncodeError::Overflow { field: desc.name, value, width });
    }
    match endian {
        Endian::Big    => BigEndian::write_uint(buf, value, width),
        Endian::Little => LittleEndian::write_uint(buf, value, width),
    }
    Ok(())
}
