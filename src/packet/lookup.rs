//! Field lookup by name or dotted path, and per-kind formatting.
//!
//! Lookups never fail loudly: a missing field or type is `None`.

use std::net::Ipv4Addr;

use super::engine::resolve_size;
use super::{FieldDescriptor, FieldKind, NodeId, Tree, Value};

/// Field of `id`'s active layout with exactly this name.
pub fn find_field_by_name(tree: &Tree, id: NodeId, name: &str) -> Option<&'static FieldDescriptor> {
    tree.node(id).layout.field(name)
}

/// Search `id` and its nested records for a field called `name`.
///
/// Fields are visited in declared order; a nested record is searched in full
/// before the scan moves on to its owner's next field.
pub fn find_field_recursive(tree: &Tree, id: NodeId, name: &str) -> Option<(NodeId, &'static FieldDescriptor)> {
    let node = tree.node(id);
    for (i, desc) in node.layout.fields.iter().enumerate() {
        if desc.name == name {
            return Some((id, desc));
        }
        if let Value::Record(Some(child)) = node.slots[i] {
            if let Some(hit) = find_field_recursive(tree, child, name) {
                return Some(hit);
            }
        }
    }
    None
}

/// First record strictly below `id` whose type name matches (ignoring case).
pub fn find_record(tree: &Tree, id: NodeId, type_name: &str) -> Option<NodeId> {
    for child in children(tree, id) {
        if tree.node(child).ty.name().eq_ignore_ascii_case(type_name) {
            return Some(child);
        }
        if let Some(hit) = find_record(tree, child, type_name) {
            return Some(hit);
        }
    }
    None
}

/// Resolve `"TypeName.field"` against the tree rooted at `root`.
///
/// The first node (depth first, `root` included) whose type name matches
/// `TypeName` is the only candidate: its field is returned, or `None` if it
/// has no such field.  An empty field segment, or a path with no dot at all,
/// yields the node itself with no descriptor.
pub fn resolve_path(tree: &Tree, root: NodeId, path: &str) -> Option<(NodeId, Option<&'static FieldDescriptor>)> {
    let (type_name, field) = path.split_once('.').unwrap_or((path, ""));
    resolve(tree, root, type_name, field)
}

fn resolve(
    tree:      &Tree,
    id:        NodeId,
    type_name: &str,
    field:     &str,
) -> Option<(NodeId, Option<&'static FieldDescriptor>)> {
    if tree.node(id).ty.name().eq_ignore_ascii_case(type_name) {
        if field.is_empty() {
            return Some((id, None));
        }
        return find_field_by_name(tree, id, field).map(|d| (id, Some(d)));
    }
    children(tree, id).find_map(|child| resolve(tree, child, type_name, field))
}

/// Dotted chain of type names from the tree root down to `id`.
pub fn path_of(tree: &Tree, id: NodeId) -> String {
    let mut names = vec![tree.node(id).ty.name()];
    let mut cur = tree.node(id).parent;
    while let Some(p) = cur {
        names.push(tree.node(p).ty.name());
        cur = tree.node(p).parent;
    }
    names.reverse();
    names.join(".")
}

fn children(tree: &Tree, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    tree.node(id).slots.iter().filter_map(Value::as_record)
}

// ── Formatting ───────────────────────────────────────────────────────────────

/// Render one field of `id` according to its kind.
pub fn format_field(tree: &Tree, id: NodeId, desc: &FieldDescriptor) -> String {
    let node = tree.node(id);
    let Some(i) = node.layout.index_of(desc.name) else {
        return String::from("<absent>");
    };

    match (&desc.kind, &node.slots[i]) {
        (FieldKind::Int, Value::Int(v)) => v.to_string(),
        (FieldKind::HexInt, Value::Int(v)) => {
            let digits = resolve_size(tree, id, desc).unwrap_or(4) * 2;
            format!("0x{v:0digits$x}")
        }
        (FieldKind::Ipv4, Value::Int(v)) => Ipv4Addr::from(*v as u32).to_string(),
        (FieldKind::String, Value::Bytes(b)) => escape_bytes(sized(tree, id, desc, b)),
        (FieldKind::HexString, Value::Bytes(b)) => format!("0x{}", hex::encode(sized(tree, id, desc, b))),
        (FieldKind::Record(_), Value::Record(Some(child))) => format!("<{}>", tree.node(*child).ty.name()),
        (FieldKind::Record(_), Value::Record(None)) => String::from("<none>"),
        (_, other) => format!("{other:?}"),
    }
}

fn sized<'a>(tree: &Tree, id: NodeId, desc: &FieldDescriptor, bytes: &'a [u8]) -> &'a [u8] {
    let n = resolve_size(tree, id, desc).unwrap_or(bytes.len());
    &bytes[..n.min(bytes.len())]
}

/// Printable ASCII verbatim, everything else as `\xHH`.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..=0x7e).contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}
