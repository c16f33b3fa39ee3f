//! Field descriptor tables.
//!
//! A [`Layout`] is the single description of a record's wire format: an
//! ordered slice of [`FieldDescriptor`]s plus the byte order the integers
//! are stored in.  Layouts are `'static` and declared once per record type;
//! a type that supports both byte orders declares two layouts with the same
//! field list and switches between them at runtime.
//!
//! The position of a descriptor inside its layout doubles as the index of
//! the value slot holding that field in a decoded node, so two layouts of
//! the same record type must list their fields in the same order.

use std::fmt;

use super::RecordType;

/// Byte order of the integer fields of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn name(self) -> &'static str {
        match self {
            Endian::Big    => "big",
            Endian::Little => "little",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "big" | "be"    => Some(Endian::Big),
            "little" | "le" => Some(Endian::Little),
            _               => None,
        }
    }
}

/// Semantic kind of a field; drives both the codec and the printer.
#[derive(Clone, Copy)]
pub enum FieldKind {
    /// Unsigned integer, printed in decimal.
    Int,
    /// Unsigned integer, printed as zero-padded hex.
    HexInt,
    /// Four-byte IPv4 address, printed as a dotted quad.
    Ipv4,
    /// Raw bytes, printed as text with `\xHH` escapes.
    String,
    /// Raw bytes, printed as one hex run.
    HexString,
    /// Nested record.  The type, when known statically, is used to build the
    /// child when the owner is constructed; otherwise the owner's read
    /// override attaches one.
    Record(Option<&'static dyn RecordType>),
}

impl FieldKind {
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::HexInt | FieldKind::Ipv4)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Int       => "int",
            FieldKind::HexInt    => "hex",
            FieldKind::Ipv4      => "ipv4",
            FieldKind::String    => "string",
            FieldKind::HexString => "hexstring",
            FieldKind::Record(_) => "record",
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Record(Some(ty)) => write!(f, "Record({})", ty.name()),
            other                       => f.write_str(other.name()),
        }
    }
}

/// Where a field's byte count comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeRule {
    /// Literal byte count.
    Fixed(usize),
    /// Current value of the named integer field of the same record.
    Field(&'static str),
}

/// Whether the generic engine walks a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Encoded and decoded by the engine in descriptor order.
    Packed,
    /// Held in the record but moved on and off the wire (if at all) by the
    /// record type's own read/write.
    Attached,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name:    &'static str,
    pub kind:    FieldKind,
    pub size:    SizeRule,
    pub storage: Storage,
}

impl FieldDescriptor {
    pub const fn packed(name: &'static str, kind: FieldKind, size: usize) -> Self {
        Self { name, kind, size: SizeRule::Fixed(size), storage: Storage::Packed }
    }

    pub const fn sized_by(name: &'static str, kind: FieldKind, size_field: &'static str) -> Self {
        Self { name, kind, size: SizeRule::Field(size_field), storage: Storage::Packed }
    }

    pub const fn attached(name: &'static str, kind: FieldKind, size: SizeRule) -> Self {
        Self { name, kind, size, storage: Storage::Attached }
    }

    pub fn is_packed(&self) -> bool {
        self.storage == Storage::Packed
    }
}

#[derive(Debug)]
pub struct Layout {
    pub name:   &'static str,
    pub endian: Endian,
    pub fields: &'static [FieldDescriptor],
}

impl Layout {
    /// Slot index of the named field (case-sensitive).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Sum of the literal sizes of the packed, non-record fields.
    ///
    /// Equals the wire size for layouts without dynamic or nested fields.
    pub fn fixed_size(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.is_packed())
            .map(|f| match (f.kind, f.size) {
                (FieldKind::Record(_), _) => 0,
                (_, SizeRule::Fixed(n))   => n,
                (_, SizeRule::Field(_))   => 0,
            })
            .sum()
    }
}
