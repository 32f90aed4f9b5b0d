//! Interned type universe for the analyzed program.
//!
//! Every type that appears in the input SSA (and every type the analysis
//! synthesizes while modeling reflection) lives in a [`TypeTable`] and is
//! referred to by a dense [`TypeId`] handle. Interning makes type identity
//! a cheap integer comparison, which the constraint solver relies on when
//! filtering tagged objects.
//!
//! The table also owns the program's method sets: the mapping from a
//! concrete type and method name to the function implementing it. Dynamic
//! dispatch and interface satisfaction are resolved against these sets.

use std::collections::HashMap;
use std::fmt;

use crate::ssa::FuncId;

/// A dense handle to an interned type.
///
/// Id 0 is always the `Invalid` type, created when the table is built.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// The `Invalid` type.
    pub const INVALID: TypeId = TypeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Channel directionality.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChanDir {
    Recv,
    Send,
    Both,
}

/// A function signature: optional receiver, parameters, results.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Signature {
    pub recv: Option<TypeId>,
    pub params: Vec<TypeId>,
    pub results: Vec<TypeId>,
}

/// The structure of an interned type.
///
/// `Named` wraps an underlying type with a name; method sets are usually
/// registered against the named form. `Interface` carries its methods as
/// `(name, receiver-less signature type)` pairs.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum TypeKind {
    Invalid,
    Bool,
    Int,
    Float,
    String,
    UnsafePointer,
    Pointer(TypeId),
    Slice(TypeId),
    Array(TypeId),
    Map(TypeId, TypeId),
    Chan(ChanDir, TypeId),
    Func(Signature),
    Interface(Vec<(String, TypeId)>),
    Tuple(Vec<TypeId>),
    Struct(Vec<(String, TypeId)>),
    Named(String, TypeId),
}

/// One entry of a concrete type's method set.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    /// Signature type of the method, including the receiver.
    pub sig: TypeId,
    pub func: FuncId,
}

/// The interning table for types and method sets.
#[derive(Debug)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    interned: HashMap<TypeKind, TypeId>,
    methods: HashMap<TypeId, Vec<Method>>,

    // Commonly used types, interned at construction.
    t_bool: TypeId,
    t_int: TypeId,
    t_string: TypeId,
    t_unsafe_ptr: TypeId,
    t_eface: TypeId,

    // The reflection stand-ins (see module docs of `intrinsics`).
    t_rtype: TypeId,
    t_rtype_ptr: TypeId,
    t_reflect_type: TypeId,
    t_reflect_value: TypeId,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            kinds: Vec::new(),
            interned: HashMap::new(),
            methods: HashMap::new(),
            t_bool: TypeId::INVALID,
            t_int: TypeId::INVALID,
            t_string: TypeId::INVALID,
            t_unsafe_ptr: TypeId::INVALID,
            t_eface: TypeId::INVALID,
            t_rtype: TypeId::INVALID,
            t_rtype_ptr: TypeId::INVALID,
            t_reflect_type: TypeId::INVALID,
            t_reflect_value: TypeId::INVALID,
        };

        let invalid = table.intern(TypeKind::Invalid);
        assert_eq!(invalid, TypeId::INVALID);

        table.t_bool = table.intern(TypeKind::Bool);
        table.t_int = table.intern(TypeKind::Int);
        table.t_string = table.intern(TypeKind::String);
        table.t_unsafe_ptr = table.intern(TypeKind::UnsafePointer);
        table.t_eface = table.intern(TypeKind::Interface(Vec::new()));

        // The reflection model: `rtype` is an opaque struct, `Type` is the
        // interface over it, and `Value` behaves like an interface (one
        // scalar holding tagged objects).
        let rtype_underlying = table.intern(TypeKind::Struct(Vec::new()));
        table.t_rtype = table.intern(TypeKind::Named("reflect.rtype".into(), rtype_underlying));
        table.t_rtype_ptr = table.pointer_to(table.t_rtype);
        table.t_reflect_type = {
            let eface = table.t_eface;
            table.intern(TypeKind::Named("reflect.Type".into(), eface))
        };
        table.t_reflect_value = {
            let eface = table.t_eface;
            table.intern(TypeKind::Named("reflect.Value".into(), eface))
        };

        table
    }

    /// Interns `kind` and returns its handle. Idempotent.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    // ---------- pre-interned singletons ----------

    pub fn bool_type(&self) -> TypeId {
        self.t_bool
    }
    pub fn int_type(&self) -> TypeId {
        self.t_int
    }
    pub fn string_type(&self) -> TypeId {
        self.t_string
    }
    pub fn unsafe_pointer(&self) -> TypeId {
        self.t_unsafe_ptr
    }
    /// The empty interface.
    pub fn eface(&self) -> TypeId {
        self.t_eface
    }
    pub fn rtype(&self) -> TypeId {
        self.t_rtype
    }
    /// `*reflect.rtype`, the tag type of canonical type objects.
    pub fn rtype_ptr(&self) -> TypeId {
        self.t_rtype_ptr
    }
    /// The `reflect.Type` interface.
    pub fn reflect_type(&self) -> TypeId {
        self.t_reflect_type
    }
    /// The `reflect.Value` stand-in.
    pub fn reflect_value(&self) -> TypeId {
        self.t_reflect_value
    }

    // ---------- constructors ----------

    pub fn pointer_to(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer(elem))
    }
    pub fn slice_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Slice(elem))
    }
    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Array(elem))
    }
    pub fn map_of(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern(TypeKind::Map(key, value))
    }
    pub fn chan_of(&mut self, dir: ChanDir, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Chan(dir, elem))
    }
    pub fn func_of(&mut self, sig: Signature) -> TypeId {
        self.intern(TypeKind::Func(sig))
    }
    pub fn tuple_of(&mut self, parts: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Tuple(parts))
    }
    pub fn struct_of(&mut self, fields: Vec<(String, TypeId)>) -> TypeId {
        self.intern(TypeKind::Struct(fields))
    }
    pub fn interface_of(&mut self, methods: Vec<(String, TypeId)>) -> TypeId {
        self.intern(TypeKind::Interface(methods))
    }
    pub fn named(&mut self, name: &str, underlying: TypeId) -> TypeId {
        self.intern(TypeKind::Named(name.to_string(), underlying))
    }

    // ---------- structural accessors ----------

    /// Resolves `Named` wrappers to the underlying type id.
    pub fn underlying(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Named(_, u) => self.underlying(*u),
            _ => id,
        }
    }

    /// The pointee of a pointer type.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a pointer type.
    pub fn must_deref(&self, id: TypeId) -> TypeId {
        match self.kind(self.underlying(id)) {
            TypeKind::Pointer(elem) => *elem,
            k => panic!("must_deref: not a pointer type: {:?}", k),
        }
    }

    /// The element type of a pointer, slice, array, or channel, or the
    /// value type of a map. `None` for anything else.
    pub fn elem(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(self.underlying(id)) {
            TypeKind::Pointer(e)
            | TypeKind::Slice(e)
            | TypeKind::Array(e)
            | TypeKind::Chan(_, e) => Some(*e),
            TypeKind::Map(_, v) => Some(*v),
            _ => None,
        }
    }

    /// The key type of a map, `None` for anything else.
    pub fn key(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(self.underlying(id)) {
            TypeKind::Map(k, _) => Some(*k),
            _ => None,
        }
    }

    /// Converts a slice type to the type of its backing array.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a slice type.
    pub fn slice_to_array(&mut self, id: TypeId) -> TypeId {
        match self.kind(self.underlying(id)) {
            TypeKind::Slice(elem) => {
                let elem = *elem;
                self.array_of(elem)
            }
            k => panic!("slice_to_array: not a slice type: {:?}", k),
        }
    }

    pub fn signature(&self, id: TypeId) -> &Signature {
        match self.kind(self.underlying(id)) {
            TypeKind::Func(sig) => sig,
            k => panic!("signature: not a function type: {:?}", k),
        }
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        matches!(self.kind(self.underlying(id)), TypeKind::Interface(_))
    }

    /// Re-interns a function type with the receiver dropped, for
    /// signature comparison against interface methods.
    pub fn sig_without_recv(&mut self, id: TypeId) -> TypeId {
        let sig = self.signature(id).clone();
        if sig.recv.is_none() {
            return id;
        }
        self.func_of(Signature { recv: None, ..sig })
    }

    // ---------- method sets ----------

    /// Registers `func` as method `name` on concrete type `recv`.
    pub fn add_method(&mut self, recv: TypeId, name: &str, sig: TypeId, func: FuncId) {
        self.methods.entry(recv).or_default().push(Method {
            name: name.to_string(),
            sig,
            func,
        });
    }

    pub fn method_set(&self, recv: TypeId) -> &[Method] {
        self.methods.get(&recv).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lookup_method(&self, recv: TypeId, name: &str) -> Option<&Method> {
        self.method_set(recv).iter().find(|m| m.name == name)
    }

    /// Reports whether concrete type `concrete` satisfies interface type
    /// `iface`: every interface method must appear in the concrete method
    /// set with an identical receiver-less signature.
    pub fn implements(&mut self, concrete: TypeId, iface: TypeId) -> bool {
        let methods = match self.kind(self.underlying(iface)) {
            TypeKind::Interface(methods) => methods.clone(),
            k => panic!("implements: not an interface type: {:?}", k),
        };
        for (name, want_sig) in &methods {
            match self.lookup_method(concrete, name) {
                Some(m) => {
                    let sig = m.sig;
                    let got = self.sig_without_recv(sig);
                    if got != *want_sig {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    // ---------- display ----------

    /// Renders a type the way the analyzed language writes it.
    pub fn type_string(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Invalid => "invalid".into(),
            TypeKind::Bool => "bool".into(),
            TypeKind::Int => "int".into(),
            TypeKind::Float => "float".into(),
            TypeKind::String => "string".into(),
            TypeKind::UnsafePointer => "unsafe.Pointer".into(),
            TypeKind::Pointer(e) => format!("*{}", self.type_string(*e)),
            TypeKind::Slice(e) => format!("[]{}", self.type_string(*e)),
            TypeKind::Array(e) => format!("[...]{}", self.type_string(*e)),
            TypeKind::Map(k, v) => {
                format!("map[{}]{}", self.type_string(*k), self.type_string(*v))
            }
            TypeKind::Chan(dir, e) => match dir {
                ChanDir::Recv => format!("<-chan {}", self.type_string(*e)),
                ChanDir::Send => format!("chan<- {}", self.type_string(*e)),
                ChanDir::Both => format!("chan {}", self.type_string(*e)),
            },
            TypeKind::Func(sig) => {
                let params: Vec<_> = sig.params.iter().map(|p| self.type_string(*p)).collect();
                let results: Vec<_> = sig.results.iter().map(|r| self.type_string(*r)).collect();
                match results.len() {
                    0 => format!("func({})", params.join(", ")),
                    1 => format!("func({}) {}", params.join(", "), results[0]),
                    _ => format!("func({}) ({})", params.join(", "), results.join(", ")),
                }
            }
            TypeKind::Interface(methods) => {
                if methods.is_empty() {
                    "interface{}".into()
                } else {
                    let names: Vec<_> = methods.iter().map(|(n, _)| n.clone()).collect();
                    format!("interface{{{}}}", names.join("; "))
                }
            }
            TypeKind::Tuple(parts) => {
                let parts: Vec<_> = parts.iter().map(|p| self.type_string(*p)).collect();
                format!("({})", parts.join(", "))
            }
            TypeKind::Struct(fields) => {
                let fields: Vec<_> = fields
                    .iter()
                    .map(|(n, t)| format!("{} {}", n, self.type_string(*t)))
                    .collect();
                format!("struct{{{}}}", fields.join("; "))
            }
            TypeKind::Named(name, _) => name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut tt = TypeTable::new();
        let int = tt.int_type();
        let p1 = tt.pointer_to(int);
        let p2 = tt.pointer_to(int);
        assert_eq!(p1, p2);
        let s1 = tt.slice_of(p1);
        let s2 = tt.slice_of(p2);
        assert_eq!(s1, s2);
    }

    #[test]
    fn invalid_is_zero() {
        let mut tt = TypeTable::new();
        assert_eq!(tt.intern(TypeKind::Invalid), TypeId::INVALID);
        assert_eq!(TypeId::INVALID.index(), 0);
    }

    #[test]
    fn underlying_resolves_named_chains() {
        let mut tt = TypeTable::new();
        let int = tt.int_type();
        let a = tt.named("A", int);
        let b = tt.named("B", a);
        assert_eq!(tt.underlying(b), int);
    }

    #[test]
    fn must_deref_through_named() {
        let mut tt = TypeTable::new();
        let int = tt.int_type();
        let ptr = tt.pointer_to(int);
        let named = tt.named("IntPtr", ptr);
        assert_eq!(tt.must_deref(named), int);
    }

    #[test]
    fn implements_checks_names_and_signatures() {
        let mut tt = TypeTable::new();
        let int = tt.int_type();
        let msig = tt.func_of(Signature {
            recv: None,
            params: vec![],
            results: vec![int],
        });
        let iface = tt.interface_of(vec![("Get".into(), msig)]);

        let underlying = tt.struct_of(vec![("x".into(), int)]);
        let conc = tt.named("D", underlying);
        let recv_sig = tt.func_of(Signature {
            recv: Some(conc),
            params: vec![],
            results: vec![int],
        });
        assert!(!tt.implements(conc, iface));
        tt.add_method(conc, "Get", recv_sig, crate::ssa::FuncId(0));
        assert!(tt.implements(conc, iface));
    }

    #[test]
    fn type_strings() {
        let mut tt = TypeTable::new();
        let int = tt.int_type();
        let str_ = tt.string_type();
        let p = tt.pointer_to(int);
        let m = tt.map_of(str_, p);
        assert_eq!(tt.type_string(m), "map[string]*int");
        assert_eq!(tt.type_string(tt.rtype_ptr()), "*reflect.rtype");
    }
}
