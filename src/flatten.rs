//! Type flattening: the scalar decomposition every allocation and copy
//! steps through.
//!
//! `flatten(T)` lists the scalar field positions of `T` in preorder.
//! Structs and arrays are prefixed with an identity node, so a pointer to
//! the whole object is distinguishable from a pointer to its first field;
//! tuples are never address-taken and get none. Arrays are
//! element-collapsed: all indices share one flattening of the element.
//!
//! `sizeof(T)` is the flattening length and `offset_of(T, i)` the node
//! offset of field `i`. All three are pure and memoized per type.

use std::collections::HashMap;
use std::rc::Rc;

use crate::types::{TypeId, TypeKind, TypeTable};

/// One scalar position within a flattened type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub typ: TypeId,
    /// Subelement path, e.g. `.a[*].b` or `#1`; empty for the whole value
    /// or an identity node.
    pub path: String,
}

/// Memoizing flattener.
#[derive(Default)]
pub struct Flattener {
    memo: HashMap<TypeId, Rc<Vec<Rc<FieldInfo>>>>,
}

impl Flattener {
    pub fn new() -> Self {
        Flattener {
            memo: HashMap::new(),
        }
    }

    /// The ordered scalar decomposition of `t`.
    pub fn flatten(&mut self, tt: &TypeTable, t: TypeId) -> Rc<Vec<Rc<FieldInfo>>> {
        if let Some(fl) = self.memo.get(&t) {
            return fl.clone();
        }

        let mut fl: Vec<Rc<FieldInfo>> = Vec::new();
        match tt.kind(t).clone() {
            TypeKind::Named(_, u) => {
                if tt.is_interface(u) {
                    // Keep the named form on interface nodes; it reads
                    // better in logs and labels.
                    fl.push(Rc::new(FieldInfo {
                        typ: t,
                        path: String::new(),
                    }));
                } else {
                    fl = self.flatten(tt, u).as_ref().clone();
                }
            }

            TypeKind::Invalid
            | TypeKind::Bool
            | TypeKind::Int
            | TypeKind::Float
            | TypeKind::String
            | TypeKind::UnsafePointer
            | TypeKind::Pointer(_)
            | TypeKind::Slice(_)
            | TypeKind::Map(..)
            | TypeKind::Chan(..)
            | TypeKind::Func(_)
            | TypeKind::Interface(_) => {
                fl.push(Rc::new(FieldInfo {
                    typ: t,
                    path: String::new(),
                }));
            }

            TypeKind::Array(elem) => {
                // Identity node, then the element-collapsed flattening.
                fl.push(Rc::new(FieldInfo {
                    typ: t,
                    path: String::new(),
                }));
                for fi in self.flatten(tt, elem).iter() {
                    fl.push(Rc::new(FieldInfo {
                        typ: fi.typ,
                        path: format!("[*]{}", fi.path),
                    }));
                }
            }

            TypeKind::Struct(fields) => {
                fl.push(Rc::new(FieldInfo {
                    typ: t,
                    path: String::new(),
                }));
                for (name, fty) in &fields {
                    for fi in self.flatten(tt, *fty).iter() {
                        fl.push(Rc::new(FieldInfo {
                            typ: fi.typ,
                            path: format!(".{}{}", name, fi.path),
                        }));
                    }
                }
            }

            TypeKind::Tuple(parts) => {
                for (i, pty) in parts.iter().enumerate() {
                    for fi in self.flatten(tt, *pty).iter() {
                        fl.push(Rc::new(FieldInfo {
                            typ: fi.typ,
                            path: format!("#{}{}", i, fi.path),
                        }));
                    }
                }
            }
        }

        let fl = Rc::new(fl);
        self.memo.insert(t, fl.clone());
        fl
    }

    /// Number of scalar nodes a value of type `t` occupies.
    pub fn sizeof(&mut self, tt: &TypeTable, t: TypeId) -> u32 {
        self.flatten(tt, t).len() as u32
    }

    /// Node offset of field `index` within struct or tuple type `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t` is not a struct or tuple.
    pub fn offset_of(&mut self, tt: &TypeTable, t: TypeId, index: usize) -> u32 {
        match tt.kind(tt.underlying(t)).clone() {
            TypeKind::Struct(fields) => {
                let mut offset = 1; // the identity node
                for (_, fty) in fields.iter().take(index) {
                    offset += self.sizeof(tt, *fty);
                }
                offset
            }
            TypeKind::Tuple(parts) => {
                let mut offset = 0;
                for pty in parts.iter().take(index) {
                    offset += self.sizeof(tt, *pty);
                }
                offset
            }
            k => panic!("offset_of: not a struct or tuple: {:?}", k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_one_node() {
        let mut tt = TypeTable::new();
        let mut fl = Flattener::new();
        let int = tt.int_type();
        let ptr = tt.pointer_to(int);
        assert_eq!(fl.sizeof(&tt, int), 1);
        assert_eq!(fl.sizeof(&tt, ptr), 1);
        assert_eq!(fl.sizeof(&tt, tt.eface()), 1);
    }

    #[test]
    fn struct_has_identity_node() {
        let mut tt = TypeTable::new();
        let mut fl = Flattener::new();
        let int = tt.int_type();
        let ptr = tt.pointer_to(int);
        let st = tt.struct_of(vec![("a".into(), int), ("b".into(), ptr)]);
        let flat = fl.flatten(&tt, st);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].path, "");
        assert_eq!(flat[1].path, ".a");
        assert_eq!(flat[2].path, ".b");
        assert_eq!(fl.offset_of(&tt, st, 0), 1);
        assert_eq!(fl.offset_of(&tt, st, 1), 2);
    }

    #[test]
    fn array_collapses_elements() {
        let mut tt = TypeTable::new();
        let mut fl = Flattener::new();
        let int = tt.int_type();
        let ptr = tt.pointer_to(int);
        let st = tt.struct_of(vec![("g".into(), ptr)]);
        let arr = tt.array_of(st);
        let flat = fl.flatten(&tt, arr);
        // identity, element identity, element field
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[1].path, "[*]");
        assert_eq!(flat[2].path, "[*].g");
    }

    #[test]
    fn tuple_has_no_identity() {
        let mut tt = TypeTable::new();
        let mut fl = Flattener::new();
        let int = tt.int_type();
        let b = tt.bool_type();
        let tup = tt.tuple_of(vec![int, b]);
        let flat = fl.flatten(&tt, tup);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].path, "#0");
        assert_eq!(flat[1].path, "#1");
        assert_eq!(fl.offset_of(&tt, tup, 1), 1);
    }

    #[test]
    fn empty_tuple_is_uninteresting() {
        let mut tt = TypeTable::new();
        let mut fl = Flattener::new();
        let unit = tt.tuple_of(vec![]);
        assert_eq!(fl.sizeof(&tt, unit), 0);
    }

    #[test]
    fn nested_paths_compose() {
        let mut tt = TypeTable::new();
        let mut fl = Flattener::new();
        let int = tt.int_type();
        let ptr = tt.pointer_to(int);
        let inner = tt.struct_of(vec![("g".into(), ptr)]);
        let arr = tt.array_of(inner);
        let outer = tt.struct_of(vec![("f".into(), arr)]);
        let flat = fl.flatten(&tt, outer);
        let paths: Vec<_> = flat.iter().map(|fi| fi.path.as_str()).collect();
        assert_eq!(paths, vec!["", ".f", ".f[*]", ".f[*].g"]);
    }

    #[test]
    fn flatten_is_idempotent() {
        let mut tt = TypeTable::new();
        let mut fl = Flattener::new();
        let int = tt.int_type();
        let ptr = tt.pointer_to(int);
        let st = tt.struct_of(vec![("a".into(), ptr)]);
        let once = fl.flatten(&tt, st);
        // Flattening each leaf type again yields the leaves themselves.
        for fi in once.iter().skip(1) {
            let again = fl.flatten(&tt, fi.typ);
            assert_eq!(again.len(), 1);
            assert_eq!(again[0].typ, fi.typ);
        }
    }
}
