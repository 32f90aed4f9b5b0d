//! The node universe: one abstraction node per scalar value.
//!
//! Nodes are identified by dense [`NodeId`]s. Id 0 is the sentinel for
//! "analytically uninteresting": values of empty-flattening types map to
//! it, and it is never a legal endpoint of a nontrivial constraint.
//!
//! A contiguous run of nodes can be promoted into an *object* — the unit
//! of allocation, and the thing points-to sets contain. The object header
//! lives on the first node of the run only.

use std::fmt;
use std::rc::Rc;

use crate::analysis::CgnId;
use crate::flatten::FieldInfo;
use crate::nodeset::NodeSet;
use crate::ssa::{FuncId, GlobalId, InstrRef};
use crate::types::TypeId;

/// A dense handle to a node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The sentinel node: "uninteresting / non-pointer-like".
    pub const ZERO: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The node `offset` slots after this one, for stepping through
    /// object blocks and flattened aggregates.
    pub fn offset(self, offset: u32) -> NodeId {
        NodeId(self.0 + offset)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Object flag bits.
pub mod obj_flags {
    /// The object is a function contour.
    pub const FUNCTION: u8 = 1 << 0;
    /// The object is a tagged object (interface / reflection value).
    pub const TAGGED: u8 = 1 << 1;
    /// The tagged object's payload is held indirectly.
    pub const INDIRECT: u8 = 1 << 2;
}

/// What an object denotes; this is the client-visible allocation site.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjData {
    None,
    /// An allocation instruction.
    Site(InstrRef),
    Global(GlobalId),
    Func(FuncId),
    /// The canonical type object for a type (reflection).
    Rtype(TypeId),
    /// A synthesized allocation with a fixed caption.
    Caption(&'static str),
}

/// Header of an object: a block of `size` nodes starting at its head.
#[derive(Debug, Clone)]
pub struct Object {
    /// Number of nodes in the block, excluding padding.
    pub size: u32,
    /// The contour that allocated this object, if any.
    pub cgn: Option<CgnId>,
    pub data: ObjData,
    pub flags: u8,
}

impl Object {
    pub fn is_function(&self) -> bool {
        self.flags & obj_flags::FUNCTION != 0
    }
    pub fn is_tagged(&self) -> bool {
        self.flags & obj_flags::TAGGED != 0
    }
    pub fn is_indirect(&self) -> bool {
        self.flags & obj_flags::INDIRECT != 0
    }
}

/// One node of the universe.
#[derive(Debug)]
pub struct Node {
    /// The scalar type this node abstracts.
    pub ty: TypeId,
    /// Subelement within the enclosing flattened aggregate, if any.
    pub sub: Option<Rc<FieldInfo>>,
    /// Object header; present on head nodes only.
    pub obj: Option<Box<Object>>,
    /// True for every node inside some object block (head or interior).
    pub in_object: bool,
    /// Points-to set, populated by the solver.
    pub pts: NodeSet,
    /// Members already propagated; `pts − prev_pts` is the pending delta.
    pub prev_pts: NodeSet,
}

impl Node {
    fn new(ty: TypeId, sub: Option<Rc<FieldInfo>>) -> Self {
        Node {
            ty,
            sub,
            obj: None,
            in_object: false,
            pts: NodeSet::new(),
            prev_pts: NodeSet::new(),
        }
    }
}

/// The append-only table of all nodes.
///
/// Ids are never reused or renumbered; the table grows during constraint
/// generation and, through reflection constraints, during solving.
#[derive(Default, Debug)]
pub struct NodeTable {
    nodes: Vec<Node>,
}

impl NodeTable {
    pub fn new() -> Self {
        NodeTable { nodes: Vec::new() }
    }

    /// The id the next added node will get.
    pub fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Appends a single node and returns its id.
    pub fn add_one(&mut self, ty: TypeId, sub: Option<Rc<FieldInfo>>) -> NodeId {
        let id = self.next_id();
        self.nodes.push(Node::new(ty, sub));
        id
    }

    /// Promotes the block `head..next_id()` into an object. An empty block
    /// is padded with one invalid node so every object occupies at least
    /// one slot; the padding is excluded from `size`.
    pub fn end_object(&mut self, head: NodeId, cgn: Option<CgnId>, data: ObjData) -> &mut Object {
        let size = self.next_id().0 - head.0;
        if size == 0 {
            self.add_one(TypeId::INVALID, None);
        }
        for i in head.0..self.next_id().0 {
            self.nodes[i as usize].in_object = true;
        }
        let head_node = &mut self.nodes[head.index()];
        assert!(
            head_node.obj.is_none(),
            "end_object: {} already heads an object",
            head
        );
        head_node.obj = Some(Box::new(Object {
            size,
            cgn,
            data,
            flags: 0,
        }));
        head_node.obj.as_deref_mut().unwrap()
    }

    /// Iterates all nodes with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// For a tagged object starting at `id`, returns its dynamic type,
    /// the first payload node, and the indirect flag. `None` if `id` is
    /// not the head of a tagged object.
    pub fn tagged_value(&self, id: NodeId) -> Option<(TypeId, NodeId, bool)> {
        let n = self.node(id);
        match &n.obj {
            Some(obj) if obj.is_tagged() => Some((n.ty, id.offset(1), obj.is_indirect())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense() {
        let mut table = NodeTable::new();
        let a = table.add_one(TypeId::INVALID, None);
        let b = table.add_one(TypeId::INVALID, None);
        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(table.next_id(), NodeId(2));
    }

    #[test]
    fn empty_object_is_padded() {
        let mut table = NodeTable::new();
        let head = table.next_id();
        let obj = table.end_object(head, None, ObjData::None);
        assert_eq!(obj.size, 0);
        // The pad occupies the slot, so the next object gets a fresh id.
        assert_eq!(table.next_id(), head.offset(1));
        assert!(table.node(head).in_object);
    }

    #[test]
    fn header_only_on_head() {
        let mut table = NodeTable::new();
        let head = table.next_id();
        table.add_one(TypeId::INVALID, None);
        table.add_one(TypeId::INVALID, None);
        table.end_object(head, None, ObjData::Caption("x"));
        assert!(table.node(head).obj.is_some());
        assert!(table.node(head.offset(1)).obj.is_none());
        assert!(table.node(head.offset(1)).in_object);
    }

    #[test]
    #[should_panic(expected = "already heads an object")]
    fn double_end_object_panics() {
        let mut table = NodeTable::new();
        let head = table.next_id();
        table.add_one(TypeId::INVALID, None);
        table.end_object(head, None, ObjData::None);
        table.end_object(head, None, ObjData::None);
    }

    #[test]
    fn tagged_value_unpacks() {
        let mut table = NodeTable::new();
        let head = table.next_id();
        table.add_one(TypeId::INVALID, None);
        table.add_one(TypeId::INVALID, None);
        let obj = table.end_object(head, None, ObjData::None);
        obj.flags |= obj_flags::TAGGED;
        let (_, payload, indirect) = table.tagged_value(head).unwrap();
        assert_eq!(payload, head.offset(1));
        assert!(!indirect);
        assert!(table.tagged_value(payload).is_none());
    }
}
