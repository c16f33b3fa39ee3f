//! Record trees and the record-type capability table.
//!
//! # Record types
//! Every concrete record type implements [`RecordType`].  Each operation has
//! a default that runs the generic engine against the type's [`Layout`]; a
//! type overrides only what its wire format needs.  There is no implicit
//! call-through: an override that wants the generic behaviour calls the
//! matching free function of this module ([`read`], [`write`], [`print`],
//! [`destroy`]) explicitly, usually as its first step.
//!
//! # Trees
//! Decoded records live in a [`Tree`] arena and refer to each other by
//! [`NodeId`].  A nested record is owned by the slot of its containing
//! record; the `parent` link is a plain index kept for diagnostics only.
//! Releasing a node releases everything nested beneath it.

pub mod engine;
pub mod layout;
pub mod lookup;

use std::io;
use std::io::SeekFrom;
use thiserror::Error;

use crate::stream::{Stream, StreamError};
pub use layout::{Endian, FieldDescriptor, FieldKind, Layout, SizeRule, Storage};

/// Default ceiling for a declared capture length.  Anything above it is
/// taken as a sign of corruption or a desynchronised cursor.
pub const DEFAULT_MAX_CAPLEN: u32 = 0x1FFFF;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Input exhausted: {0}")]
    Stream(#[from] StreamError),
    #[error("Unrecognised magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("Declared capture length {caplen} exceeds ceiling {ceiling}")]
    CaptureTooLarge { caplen: u64, ceiling: u32 },
    #[error("Field '{field}' is sized by '{size_field}', which is not a decoded integer")]
    SizeField { field: &'static str, size_field: &'static str },
    #[error("Field '{field}' has unsupported integer width {width}")]
    UnsupportedWidth { field: &'static str, width: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// True when decoding stopped only because the input ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, DecodeError::Stream(StreamError::Exhausted { .. }))
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Value {value} of field '{field}' does not fit in {width} bytes")]
    Overflow { field: &'static str, value: u64, width: usize },
    #[error("Field '{field}' holds {actual} bytes but its size rule requires {expected}")]
    LengthMismatch { field: &'static str, expected: usize, actual: usize },
    #[error("Field '{field}' is sized by '{size_field}', which is not an integer")]
    SizeField { field: &'static str, size_field: &'static str },
    #[error("Field '{field}' has unsupported integer width {width}")]
    UnsupportedWidth { field: &'static str, width: usize },
    #[error("Capture length {caplen} exceeds ceiling {ceiling}")]
    CaptureTooLarge { caplen: u64, ceiling: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Values ───────────────────────────────────────────────────────────────────

/// Arena handle.  The generation makes a handle to a released node stale
/// even after its slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    gen:   u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index
    }
}

/// Typed storage for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(u64),
    Bytes(Vec<u8>),
    Record(Option<NodeId>),
}

impl Value {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int(v) => Some(*v),
            _             => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _               => None,
        }
    }

    pub fn as_record(&self) -> Option<NodeId> {
        match self {
            Value::Record(r) => *r,
            _                => None,
        }
    }
}

/// Decode limits shared by every record of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest capture length a record header may declare.
    pub max_caplen: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_caplen: DEFAULT_MAX_CAPLEN }
    }
}

// ── Capability table ─────────────────────────────────────────────────────────

/// Overridable operations of a record type.
pub trait RecordType: Sync {
    /// Type identifier; matched case-insensitively by dotted paths.
    fn name(&self) -> &'static str;

    /// Descriptor table a freshly constructed node starts with.
    fn layout(&self) -> &'static Layout;

    /// Runs after the node's storage has been initialised.
    fn construct(&self, _tree: &mut Tree, _id: NodeId) {}

    fn read(&self, tree: &mut Tree, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
        read(tree, id, input)
    }

    fn write(&self, tree: &Tree, id: NodeId, output: &mut Stream) -> Result<usize, EncodeError> {
        write(tree, id, output)
    }

    fn print(&self, tree: &Tree, id: NodeId, element: &str) -> Option<String> {
        print(tree, id, element)
    }

    fn destroy(&self, tree: &mut Tree, id: NodeId) {
        destroy(tree, id)
    }
}

/// Generic read: unpack the active layout.
pub fn read(tree: &mut Tree, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
    engine::unpack(tree, id, input)
}

/// Generic write: pack the active layout.
pub fn write(tree: &Tree, id: NodeId, output: &mut Stream) -> Result<usize, EncodeError> {
    engine::pack(tree, id, output)
}

/// Generic print: resolve `Type.field` under `id` and format it.
pub fn print(tree: &Tree, id: NodeId, element: &str) -> Option<String> {
    let (node, field) = lookup::resolve_path(tree, id, element)?;
    let value = match field {
        Some(desc) => lookup::format_field(tree, node, desc),
        None       => format!("<{}>", tree.node(node).ty.name()),
    };
    Some(format!("{element} = {value}"))
}

/// Generic destroy: release every nested record, then clear own storage.
pub fn destroy(tree: &mut Tree, id: NodeId) {
    let children: Vec<NodeId> = tree.node(id).slots.iter().filter_map(Value::as_record).collect();
    for child in children {
        tree.release(child);
    }
    let node = tree.node_mut(id);
    for slot in node.slots.iter_mut() {
        *slot = match slot {
            Value::Int(_)    => Value::Int(0),
            Value::Bytes(_)  => Value::Bytes(Vec::new()),
            Value::Record(_) => Value::Record(None),
        };
    }
}

// ── Tree ─────────────────────────────────────────────────────────────────────

pub struct Node {
    pub ty:     &'static dyn RecordType,
    pub layout: &'static Layout,
    pub slots:  Vec<Value>,
    pub parent: Option<NodeId>,
    /// Stream offset the node was last decoded from.
    pub start:  usize,
    /// Bytes consumed by the last successful decode.
    pub length: usize,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("ty", &self.ty.name())
            .field("layout", &self.layout.name)
            .field("slots", &self.slots)
            .field("parent", &self.parent)
            .field("start", &self.start)
            .field("length", &self.length)
            .finish()
    }
}

#[derive(Debug)]
struct Entry {
    gen:  u32,
    node: Option<Node>,
}

#[derive(Debug, Default)]
pub struct Tree {
    entries: Vec<Entry>,
    free:    Vec<usize>,
    limits:  Limits,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self { limits, ..Self::default() }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// False once `id` has been released, even if its slot was reused.
    pub fn contains(&self, id: NodeId) -> bool {
        self.live(id).is_some()
    }

    fn live(&self, id: NodeId) -> Option<&Node> {
        self.entries.get(id.index).filter(|e| e.gen == id.gen).and_then(|e| e.node.as_ref())
    }

    fn live_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.entries.get_mut(id.index).filter(|e| e.gen == id.gen).and_then(|e| e.node.as_mut())
    }

    fn insert(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.node = Some(node);
                NodeId { index, gen: entry.gen }
            }
            None => {
                self.entries.push(Entry { gen: 0, node: Some(node) });
                NodeId { index: self.entries.len() - 1, gen: 0 }
            }
        }
    }

    /// Build a node of type `ty` with default storage, then run the type's
    /// `construct` hook.  Nested fields with a static type get a child.
    pub fn construct(&mut self, ty: &'static dyn RecordType, parent: Option<NodeId>) -> NodeId {
        let layout = ty.layout();
        let slots = layout.fields.iter().map(default_value).collect();
        let node = Node { ty, layout, slots, parent, start: 0, length: 0 };

        let id = self.insert(node);

        for (i, desc) in layout.fields.iter().enumerate() {
            if let FieldKind::Record(Some(child_ty)) = desc.kind {
                let child = self.construct(child_ty, Some(id));
                self.node_mut(id).slots[i] = Value::Record(Some(child));
            }
        }

        ty.construct(self, id);
        id
    }

    /// Destroy a node through its type, then free its arena slot.
    pub fn release(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        let ty = self.node(id).ty;
        ty.destroy(self, id);
        let entry = &mut self.entries[id.index];
        entry.node = None;
        entry.gen  = entry.gen.wrapping_add(1);
        self.free.push(id.index);
    }

    /// # Panics
    /// If `id` has been released, including when its slot now holds a
    /// newer node.
    pub fn node(&self, id: NodeId) -> &Node {
        self.live(id).expect("stale NodeId")
    }

    /// # Panics
    /// As [`node`](Self::node).
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.live_mut(id).expect("stale NodeId")
    }

    /// Swap the node's active descriptor table.  The new layout must list the
    /// same fields in the same order.
    pub fn set_layout(&mut self, id: NodeId, layout: &'static Layout) {
        debug_assert_eq!(layout.fields.len(), self.node(id).layout.fields.len());
        self.node_mut(id).layout = layout;
    }

    // ── Field access ─────────────────────────────────────────────────────────

    pub fn get(&self, id: NodeId, name: &str) -> Option<&Value> {
        let node = self.node(id);
        node.layout.index_of(name).map(|i| &node.slots[i])
    }

    /// Store `value` in the named field.  Returns false if there is no such field.
    pub fn set(&mut self, id: NodeId, name: &str, value: Value) -> bool {
        let node = self.node_mut(id);
        match node.layout.index_of(name) {
            Some(i) => {
                node.slots[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn int(&self, id: NodeId, name: &str) -> Option<u64> {
        self.get(id, name).and_then(Value::as_int)
    }

    pub fn bytes(&self, id: NodeId, name: &str) -> Option<&[u8]> {
        self.get(id, name).and_then(Value::as_bytes)
    }

    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.get(id, name).and_then(Value::as_record)
    }

    /// Construct a `ty` node under `id` and store it in the named nested
    /// field, releasing whatever the field held before.
    pub fn attach(&mut self, id: NodeId, name: &str, ty: &'static dyn RecordType) -> Option<NodeId> {
        self.node(id).layout.index_of(name)?;
        if let Some(old) = self.child(id, name) {
            self.release(old);
        }
        let child = self.construct(ty, Some(id));
        self.set(id, name, Value::Record(Some(child)));
        Some(child)
    }

    /// Release whatever the named nested field holds and leave it empty.
    pub fn detach(&mut self, id: NodeId, name: &str) {
        if let Some(old) = self.child(id, name) {
            self.release(old);
            self.set(id, name, Value::Record(None));
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Decode `id` through its type's `read`.
    ///
    /// Records the span the node was decoded from.  On failure the cursor is
    /// moved back to where it started, so the caller never sees a partially
    /// consumed record.
    pub fn read(&mut self, id: NodeId, input: &mut Stream) -> Result<usize, DecodeError> {
        let ty    = self.node(id).ty;
        let start = input.position();
        match ty.read(self, id, input) {
            Ok(len) => {
                let node = self.node_mut(id);
                node.start  = start;
                node.length = len;
                Ok(len)
            }
            Err(e) => {
                input.seek(SeekFrom::Start(start as u64))?;
                self.node_mut(id).length = 0;
                Err(e)
            }
        }
    }

    pub fn write(&self, id: NodeId, output: &mut Stream) -> Result<usize, EncodeError> {
        self.node(id).ty.write(self, id, output)
    }

    pub fn print(&self, id: NodeId, element: &str) -> Option<String> {
        self.node(id).ty.print(self, id, element)
    }

    pub fn record(&self, id: NodeId) -> Record<'_> {
        Record { tree: self, id }
    }

    /// Copy the subtree rooted at `id` into a fresh tree so it outlives any
    /// release performed on this one.
    pub fn clone_subtree(&self, id: NodeId) -> (Tree, NodeId) {
        let mut out = Tree::with_limits(self.limits);
        let root = self.copy_into(&mut out, id, None);
        (out, root)
    }

    fn copy_into(&self, out: &mut Tree, id: NodeId, parent: Option<NodeId>) -> NodeId {
        let src = self.node(id);
        let new_id = out.insert(Node {
            ty:     src.ty,
            layout: src.layout,
            slots:  src.slots.clone(),
            parent,
            start:  src.start,
            length: src.length,
        });
        for i in 0..src.slots.len() {
            if let Value::Record(Some(child)) = src.slots[i] {
                let copied = self.copy_into(out, child, Some(new_id));
                out.node_mut(new_id).slots[i] = Value::Record(Some(copied));
            }
        }
        new_id
    }
}

fn default_value(desc: &FieldDescriptor) -> Value {
    match (desc.kind, desc.size) {
        (FieldKind::Record(_), _)                   => Value::Record(None),
        (k, _) if k.is_integer()                    => Value::Int(0),
        (_, SizeRule::Fixed(n)) if desc.is_packed() => Value::Bytes(vec![0; n]),
        _                                           => Value::Bytes(Vec::new()),
    }
}

// ── Borrowed view ────────────────────────────────────────────────────────────

/// Read-only handle on one node of a tree.
#[derive(Clone, Copy)]
pub struct Record<'t> {
    tree: &'t Tree,
    id:   NodeId,
}

impl<'t> Record<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    pub fn type_name(&self) -> &'static str {
        self.tree.node(self.id).ty.name()
    }

    pub fn layout(&self) -> &'static Layout {
        self.tree.node(self.id).layout
    }

    pub fn parent(&self) -> Option<Record<'t>> {
        self.tree.node(self.id).parent.map(|p| self.tree.record(p))
    }

    pub fn start(&self) -> usize {
        self.tree.node(self.id).start
    }

    pub fn length(&self) -> usize {
        self.tree.node(self.id).length
    }

    pub fn int(&self, name: &str) -> Option<u64> {
        self.tree.int(self.id, name)
    }

    pub fn bytes(&self, name: &str) -> Option<&'t [u8]> {
        self.tree.bytes(self.id, name)
    }

    pub fn child(&self, name: &str) -> Option<Record<'t>> {
        self.tree.child(self.id, name).map(|c| self.tree.record(c))
    }

    pub fn print(&self, element: &str) -> Option<String> {
        self.tree.print(self.id, element)
    }

    pub fn resolve(&self, path: &str) -> Option<(Record<'t>, Option<&'static FieldDescriptor>)> {
        lookup::resolve_path(self.tree, self.id, path).map(|(n, f)| (self.tree.record(n), f))
    }

    /// Format one field of this node by name.
    pub fn format(&self, name: &str) -> Option<String> {
        let desc = lookup::find_field_by_name(self.tree, self.id, name)?;
        Some(lookup::format_field(self.tree, self.id, desc))
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Stream::new();
        self.tree.write(self.id, &mut out)?;
        Ok(out.into_inner())
    }
}

impl std::fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Record").field(&self.type_name()).field(&self.id).finish()
    }
}
