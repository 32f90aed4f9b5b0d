//! The constraint algebra.
//!
//! Five primitive inclusion constraints plus the two specialized kinds
//! (`TypeAssert`, `Invoke`) and the reflection intrinsic constraints. The
//! set is closed: each variant's propagation rule lives with the solver
//! (`solve` in the `solve` module; reflection variants solve in
//! `intrinsics`).

use std::fmt;

use crate::intrinsics::ReflectConstraint;
use crate::node::NodeId;
use crate::types::TypeId;

#[derive(Debug, Clone)]
pub enum Constraint {
    /// `pts(dst) ∋ obj` — the one-time initial fact.
    Addr { dst: NodeId, obj: NodeId },
    /// `pts(dst) ⊇ pts(src)`.
    Copy { dst: NodeId, src: NodeId },
    /// `pts(dst) ⊇ pts(o + offset)` for each `o ∈ pts(src)`.
    Load {
        offset: u32,
        dst: NodeId,
        src: NodeId,
    },
    /// `pts(o + offset) ⊇ pts(src)` for each `o ∈ pts(dst)`.
    Store {
        offset: u32,
        dst: NodeId,
        src: NodeId,
    },
    /// `pts(dst) ⊇ {o + offset | o ∈ pts(src)}`.
    OffsetAddr {
        offset: u32,
        dst: NodeId,
        src: NodeId,
    },
    /// `dst = src.(ty)`: filters tagged labels by dynamic type.
    TypeAssert {
        ty: TypeId,
        dst: NodeId,
        src: NodeId,
    },
    /// Dynamic method dispatch: for each tagged label of `iface`, resolve
    /// `method` on its dynamic type and wire the call block at `block`.
    Invoke {
        method: String,
        iface: NodeId,
        block: NodeId,
    },
    /// A reflection intrinsic with its own propagation rule.
    Reflect(ReflectConstraint),
}

impl Constraint {
    /// The node whose points-to deltas trigger this constraint; `None`
    /// for `Addr`, which fires once at solver initialization.
    pub fn ptr(&self) -> Option<NodeId> {
        match self {
            Constraint::Addr { .. } => None,
            Constraint::Copy { src, .. }
            | Constraint::Load { src, .. }
            | Constraint::OffsetAddr { src, .. }
            | Constraint::TypeAssert { src, .. } => Some(*src),
            Constraint::Store { dst, .. } => Some(*dst),
            Constraint::Invoke { iface, .. } => Some(*iface),
            Constraint::Reflect(r) => Some(r.ptr()),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Addr { dst, obj } => write!(f, "{} = &{}", dst, obj),
            Constraint::Copy { dst, src } => write!(f, "{} = {}", dst, src),
            Constraint::Load { offset, dst, src } => {
                write!(f, "{} = {}[{}]", dst, src, offset)
            }
            Constraint::Store { offset, dst, src } => {
                write!(f, "{}[{}] = {}", dst, offset, src)
            }
            Constraint::OffsetAddr { offset, dst, src } => {
                write!(f, "{} = &{}.#{}", dst, src, offset)
            }
            Constraint::TypeAssert { ty, dst, src } => {
                write!(f, "{} = {}.({})", dst, src, ty)
            }
            Constraint::Invoke {
                method,
                iface,
                block,
            } => write!(f, "invoke {}.{}() block={}", iface, method, block),
            Constraint::Reflect(r) => r.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptr_indexes_the_trigger_node() {
        let c = Constraint::Copy {
            dst: NodeId(1),
            src: NodeId(2),
        };
        assert_eq!(c.ptr(), Some(NodeId(2)));

        let c = Constraint::Store {
            offset: 0,
            dst: NodeId(3),
            src: NodeId(4),
        };
        assert_eq!(c.ptr(), Some(NodeId(3)));

        let c = Constraint::Addr {
            dst: NodeId(1),
            obj: NodeId(2),
        };
        assert_eq!(c.ptr(), None);
    }

    #[test]
    fn display_is_compact() {
        let c = Constraint::Load {
            offset: 2,
            dst: NodeId(5),
            src: NodeId(7),
        };
        assert_eq!(c.to_string(), "n5 = n7[2]");
    }
}
