//! Typed SSA input model.
//!
//! The analysis consumes a whole program already lowered to typed SSA:
//! packages of functions, basic blocks of instructions, and a
//! function-scoped arena of values. This module defines that input shape
//! together with a builder API that computes result types and validates
//! instruction shapes, so test programs and front ends construct
//! well-typed inputs by construction.
//!
//! Only the instruction forms the analysis understands exist here;
//! anything else the source language has must be lowered away first.
//! Control-flow terminators (`Jump`, `If`) are carried for completeness
//! but are inert: the analysis is flow-insensitive.

use std::fmt;

use crate::types::{Signature, TypeId, TypeKind, TypeTable};

/// Index of a function in [`Program::funcs`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FuncId(pub(crate) u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Index of a global in [`Program::globals`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct GlobalId(pub(crate) u32);

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a value in its function's value arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A stable reference to one instruction: allocation sites and call sites
/// are identified this way across contexts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InstrRef {
    pub func: FuncId,
    pub block: u32,
    pub index: u32,
}

impl fmt::Display for InstrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:b{}:{}", self.func, self.block, self.index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstKind {
    Nil,
    Int(i64),
    Str(String),
}

/// What a value in the arena is.
#[derive(Debug, Clone)]
pub enum ValueDef {
    Param { index: usize, ty: TypeId },
    FreeVar { index: usize, ty: TypeId },
    Const { kind: ConstKind, ty: TypeId },
    Global(GlobalId),
    Func(FuncId),
    /// Result of an instruction.
    Instr { ty: TypeId },
}

impl ValueDef {
    pub fn ty(&self, prog: &Program) -> TypeId {
        match self {
            ValueDef::Param { ty, .. }
            | ValueDef::FreeVar { ty, .. }
            | ValueDef::Const { ty, .. }
            | ValueDef::Instr { ty } => *ty,
            ValueDef::Global(g) => prog.globals[g.index()].ty,
            ValueDef::Func(f) => prog.funcs[f.index()].sig,
        }
    }
}

/// Built-in functions with analysis-defined semantics.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Builtin {
    Append,
    Copy,
    Recover,
    Print,
    Println,
    Len,
    Cap,
    Close,
    Delete,
    Real,
    Imag,
    Complex,
}

/// The callee of a call instruction.
#[derive(Debug, Clone)]
pub enum Callee {
    /// Statically dispatched call of a known function.
    Static(FuncId),
    /// Call through a first-class function value.
    Dynamic(ValueId),
    /// Dynamic method invocation through an interface value.
    Invoke { value: ValueId, method: String },
    Builtin(Builtin),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<ValueId>,
    pub dst: Option<ValueId>,
    /// Signature type of the callee; `Invalid` for builtins.
    pub sig: TypeId,
}

#[derive(Debug, Clone)]
pub enum Instr {
    Alloc { dst: ValueId, ty: TypeId },
    MakeSlice { dst: ValueId, ty: TypeId },
    MakeChan { dst: ValueId, ty: TypeId },
    MakeMap { dst: ValueId, ty: TypeId },
    MakeInterface { dst: ValueId, x: ValueId },
    MakeClosure { dst: ValueId, func: FuncId, bindings: Vec<ValueId> },
    Load { dst: ValueId, ptr: ValueId },
    Store { ptr: ValueId, val: ValueId },
    FieldAddr { dst: ValueId, x: ValueId, field: usize },
    Field { dst: ValueId, x: ValueId, field: usize },
    IndexAddr { dst: ValueId, x: ValueId, index: ValueId },
    Index { dst: ValueId, x: ValueId, index: ValueId },
    Slice { dst: ValueId, x: ValueId },
    Extract { dst: ValueId, tuple: ValueId, index: usize },
    Phi { dst: ValueId, edges: Vec<ValueId> },
    /// Value select: `dst` is one of `values` depending on `cond`.
    Select { dst: ValueId, cond: ValueId, values: Vec<ValueId> },
    ChangeType { dst: ValueId, x: ValueId },
    ChangeInterface { dst: ValueId, x: ValueId },
    Convert { dst: ValueId, x: ValueId },
    TypeAssert { dst: ValueId, x: ValueId, ty: TypeId },
    Call(Call),
    Send { chan: ValueId, x: ValueId },
    Recv { dst: ValueId, chan: ValueId },
    Lookup { dst: ValueId, map: ValueId, key: ValueId },
    MapUpdate { map: ValueId, key: ValueId, value: ValueId },
    /// Map iteration step: `dst` is `(ok, k, v)`.
    Next { dst: ValueId, map: ValueId },
    Return { results: Vec<ValueId> },
    Panic { x: ValueId },
    Jump { target: usize },
    If { cond: ValueId, then_target: usize, else_target: usize },
}

impl Instr {
    /// The value this instruction defines, if any.
    pub fn def(&self) -> Option<ValueId> {
        match self {
            Instr::Alloc { dst, .. }
            | Instr::MakeSlice { dst, .. }
            | Instr::MakeChan { dst, .. }
            | Instr::MakeMap { dst, .. }
            | Instr::MakeInterface { dst, .. }
            | Instr::MakeClosure { dst, .. }
            | Instr::Load { dst, .. }
            | Instr::FieldAddr { dst, .. }
            | Instr::Field { dst, .. }
            | Instr::IndexAddr { dst, .. }
            | Instr::Index { dst, .. }
            | Instr::Slice { dst, .. }
            | Instr::Extract { dst, .. }
            | Instr::Phi { dst, .. }
            | Instr::Select { dst, .. }
            | Instr::ChangeType { dst, .. }
            | Instr::ChangeInterface { dst, .. }
            | Instr::Convert { dst, .. }
            | Instr::TypeAssert { dst, .. }
            | Instr::Recv { dst, .. }
            | Instr::Lookup { dst, .. }
            | Instr::Next { dst, .. } => Some(*dst),
            Instr::Call(call) => call.dst,
            Instr::Store { .. }
            | Instr::Send { .. }
            | Instr::MapUpdate { .. }
            | Instr::Return { .. }
            | Instr::Panic { .. }
            | Instr::Jump { .. }
            | Instr::If { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub instrs: Vec<Instr>,
}

/// A global variable; its type is the pointer to its storage.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug)]
pub struct Function {
    pub pkg: String,
    pub name: String,
    /// Function type of this function (including receiver for methods).
    pub sig: TypeId,
    /// Parameter values, receiver first for methods.
    pub params: Vec<ValueId>,
    pub free_vars: Vec<ValueId>,
    pub values: Vec<ValueDef>,
    /// Empty for external (bodyless) functions.
    pub blocks: Vec<Block>,
    /// Synthetic wrappers (bound methods, interface shims) are always
    /// analyzed context-sensitively.
    pub synthetic: bool,
}

impl Function {
    /// The key used for intrinsic lookup: `pkg.name` for plain functions,
    /// `(T).name` for methods (the receiver type string already carries
    /// its package).
    pub fn qualified_name(&self) -> String {
        if self.pkg.is_empty() || self.name.starts_with('(') {
            self.name.clone()
        } else {
            format!("{}.{}", self.pkg, self.name)
        }
    }

    pub fn is_external(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn num_instrs(&self) -> usize {
        self.blocks.iter().map(|b| b.instrs.len()).sum()
    }
}

/// A whole program: the unit of analysis.
#[derive(Debug)]
pub struct Program {
    pub types: TypeTable,
    pub funcs: Vec<Function>,
    pub globals: Vec<Global>,
}

impl Program {
    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.index()]
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn value_type(&self, func: FuncId, v: ValueId) -> TypeId {
        self.funcs[func.index()].values[v.index()].ty(self)
    }

    pub fn value_def(&self, func: FuncId, v: ValueId) -> &ValueDef {
        &self.funcs[func.index()].values[v.index()]
    }

    pub fn func_by_name(&self, pkg: &str, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|f| f.pkg == pkg && f.name == name)
            .map(|i| FuncId(i as u32))
    }

    /// Human-readable position of an instruction, e.g. `main.main:b0:2`.
    pub fn instr_string(&self, site: InstrRef) -> String {
        format!(
            "{}:b{}:{}",
            self.func(site.func).qualified_name(),
            site.block,
            site.index
        )
    }
}

// ---------- construction ----------

/// Builds a [`Program`] incrementally.
pub struct ProgramBuilder {
    prog: Program,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        ProgramBuilder {
            prog: Program {
                types: TypeTable::new(),
                funcs: Vec::new(),
                globals: Vec::new(),
            },
        }
    }

    pub fn types(&mut self) -> &mut TypeTable {
        &mut self.prog.types
    }

    /// Declares a global variable holding a `pointee` value; the global's
    /// own type is `*pointee`.
    pub fn global(&mut self, name: &str, pointee: TypeId) -> GlobalId {
        let ty = self.prog.types.pointer_to(pointee);
        let id = GlobalId(self.prog.globals.len() as u32);
        self.prog.globals.push(Global {
            name: name.to_string(),
            ty,
        });
        id
    }

    /// Declares a function. It stays external (bodyless) until a body is
    /// built for it.
    pub fn declare(&mut self, pkg: &str, name: &str, sig: Signature) -> FuncId {
        self.declare_inner(pkg, name, sig, false)
    }

    /// Declares a synthetic wrapper function.
    pub fn declare_synthetic(&mut self, pkg: &str, name: &str, sig: Signature) -> FuncId {
        self.declare_inner(pkg, name, sig, true)
    }

    fn declare_inner(&mut self, pkg: &str, name: &str, sig: Signature, synthetic: bool) -> FuncId {
        let sig_ty = self.prog.types.func_of(sig.clone());
        let id = FuncId(self.prog.funcs.len() as u32);
        let mut values = Vec::new();
        let mut params = Vec::new();
        let mut index = 0;
        if let Some(recv) = sig.recv {
            params.push(ValueId(values.len() as u32));
            values.push(ValueDef::Param { index, ty: recv });
            index += 1;
        }
        for &p in &sig.params {
            params.push(ValueId(values.len() as u32));
            values.push(ValueDef::Param { index, ty: p });
            index += 1;
        }
        self.prog.funcs.push(Function {
            pkg: pkg.to_string(),
            name: name.to_string(),
            sig: sig_ty,
            params,
            free_vars: Vec::new(),
            values,
            blocks: Vec::new(),
            synthetic,
        });
        id
    }

    /// Declares a method on concrete type `recv` and registers it in the
    /// receiver's method set. The function is named `(T).name`.
    pub fn declare_method(&mut self, pkg: &str, recv: TypeId, name: &str, sig: Signature) -> FuncId {
        assert_eq!(sig.recv, Some(recv), "method signature must carry its receiver");
        let recv_str = self.prog.types.type_string(recv);
        let qual = format!("({}).{}", recv_str, name);
        let id = self.declare_inner(pkg, &qual, sig.clone(), false);
        let sig_ty = self.prog.types.func_of(sig);
        self.prog.types.add_method(recv, name, sig_ty, id);
        id
    }

    /// Opens a body builder for `func`. The first block is created
    /// implicitly.
    pub fn body(&mut self, func: FuncId) -> FuncBuilder<'_> {
        let f = &mut self.prog.funcs[func.index()];
        assert!(f.blocks.is_empty(), "function {} already has a body", f.name);
        f.blocks.push(Block::default());
        FuncBuilder {
            prog: &mut self.prog,
            func,
            block: 0,
        }
    }

    pub fn finish(self) -> Program {
        self.prog
    }
}

/// Appends instructions to one function, computing result types.
///
/// All `ValueId`s passed in must belong to the same function.
pub struct FuncBuilder<'a> {
    prog: &'a mut Program,
    func: FuncId,
    block: usize,
}

impl FuncBuilder<'_> {
    fn f(&mut self) -> &mut Function {
        &mut self.prog.funcs[self.func.index()]
    }

    fn ty_of(&self, v: ValueId) -> TypeId {
        self.prog.value_type(self.func, v)
    }

    fn new_value(&mut self, ty: TypeId) -> ValueId {
        let f = self.f();
        let id = ValueId(f.values.len() as u32);
        f.values.push(ValueDef::Instr { ty });
        id
    }

    fn push(&mut self, instr: Instr) {
        let block = self.block;
        self.f().blocks[block].instrs.push(instr);
    }

    /// The `i`-th parameter (receiver first for methods).
    pub fn param(&mut self, i: usize) -> ValueId {
        self.f().params[i]
    }

    /// Adds a free variable of type `ty` (captured by enclosing
    /// `MakeClosure` bindings).
    pub fn free_var(&mut self, ty: TypeId) -> ValueId {
        let f = self.f();
        let index = f.free_vars.len();
        let id = ValueId(f.values.len() as u32);
        f.values.push(ValueDef::FreeVar { index, ty });
        f.free_vars.push(id);
        id
    }

    /// Starts a new basic block and returns its index. Subsequent
    /// instructions go to the new block.
    pub fn new_block(&mut self) -> usize {
        let f = self.f();
        f.blocks.push(Block::default());
        self.block = f.blocks.len() - 1;
        self.block
    }

    // ---------- constants and references ----------

    pub fn const_nil(&mut self, ty: TypeId) -> ValueId {
        let f = self.f();
        let id = ValueId(f.values.len() as u32);
        f.values.push(ValueDef::Const {
            kind: ConstKind::Nil,
            ty,
        });
        id
    }

    pub fn const_int(&mut self, v: i64) -> ValueId {
        let ty = self.prog.types.int_type();
        let f = self.f();
        let id = ValueId(f.values.len() as u32);
        f.values.push(ValueDef::Const {
            kind: ConstKind::Int(v),
            ty,
        });
        id
    }

    pub fn const_str(&mut self, s: &str) -> ValueId {
        let ty = self.prog.types.string_type();
        let f = self.f();
        let id = ValueId(f.values.len() as u32);
        f.values.push(ValueDef::Const {
            kind: ConstKind::Str(s.to_string()),
            ty,
        });
        id
    }

    pub fn global_ref(&mut self, g: GlobalId) -> ValueId {
        let f = self.f();
        let id = ValueId(f.values.len() as u32);
        f.values.push(ValueDef::Global(g));
        id
    }

    pub fn func_ref(&mut self, callee: FuncId) -> ValueId {
        let f = self.f();
        let id = ValueId(f.values.len() as u32);
        f.values.push(ValueDef::Func(callee));
        id
    }

    // ---------- allocation ----------

    /// `dst = new(ty)`; the result has type `*ty`.
    pub fn alloc(&mut self, ty: TypeId) -> ValueId {
        let ptr = self.prog.types.pointer_to(ty);
        let dst = self.new_value(ptr);
        self.push(Instr::Alloc { dst, ty });
        dst
    }

    pub fn make_slice(&mut self, ty: TypeId) -> ValueId {
        assert!(
            matches!(self.prog.types.kind(self.prog.types.underlying(ty)), TypeKind::Slice(_)),
            "make_slice needs a slice type"
        );
        let dst = self.new_value(ty);
        self.push(Instr::MakeSlice { dst, ty });
        dst
    }

    pub fn make_chan(&mut self, ty: TypeId) -> ValueId {
        assert!(
            matches!(self.prog.types.kind(self.prog.types.underlying(ty)), TypeKind::Chan(..)),
            "make_chan needs a channel type"
        );
        let dst = self.new_value(ty);
        self.push(Instr::MakeChan { dst, ty });
        dst
    }

    pub fn make_map(&mut self, ty: TypeId) -> ValueId {
        assert!(
            matches!(self.prog.types.kind(self.prog.types.underlying(ty)), TypeKind::Map(..)),
            "make_map needs a map type"
        );
        let dst = self.new_value(ty);
        self.push(Instr::MakeMap { dst, ty });
        dst
    }

    pub fn make_interface(&mut self, iface: TypeId, x: ValueId) -> ValueId {
        let dst = self.new_value(iface);
        self.push(Instr::MakeInterface { dst, x });
        dst
    }

    pub fn make_closure(&mut self, callee: FuncId, bindings: &[ValueId]) -> ValueId {
        let ty = self.prog.funcs[callee.index()].sig;
        assert_eq!(
            self.prog.funcs[callee.index()].free_vars.len(),
            bindings.len(),
            "closure bindings must match the callee's free variables"
        );
        let dst = self.new_value(ty);
        self.push(Instr::MakeClosure {
            dst,
            func: callee,
            bindings: bindings.to_vec(),
        });
        dst
    }

    // ---------- memory ----------

    /// `dst = *ptr`.
    pub fn load(&mut self, ptr: ValueId) -> ValueId {
        let ty = self.prog.types.must_deref(self.ty_of(ptr));
        let dst = self.new_value(ty);
        self.push(Instr::Load { dst, ptr });
        dst
    }

    /// `*ptr = val`.
    pub fn store(&mut self, ptr: ValueId, val: ValueId) {
        self.push(Instr::Store { ptr, val });
    }

    fn struct_field(&self, st: TypeId, field: usize) -> TypeId {
        match self.prog.types.kind(self.prog.types.underlying(st)) {
            TypeKind::Struct(fields) => fields[field].1,
            k => panic!("not a struct type: {:?}", k),
        }
    }

    /// `dst = &x.f`; `x` must be a pointer to struct.
    pub fn field_addr(&mut self, x: ValueId, field: usize) -> ValueId {
        let st = self.prog.types.must_deref(self.ty_of(x));
        let fty = self.struct_field(st, field);
        let ptr = self.prog.types.pointer_to(fty);
        let dst = self.new_value(ptr);
        self.push(Instr::FieldAddr { dst, x, field });
        dst
    }

    /// `dst = x.f`; `x` must be a struct value.
    pub fn field(&mut self, x: ValueId, field: usize) -> ValueId {
        let fty = self.struct_field(self.ty_of(x), field);
        let dst = self.new_value(fty);
        self.push(Instr::Field { dst, x, field });
        dst
    }

    /// `dst = &x[i]`; `x` is a slice or pointer-to-array.
    pub fn index_addr(&mut self, x: ValueId, index: ValueId) -> ValueId {
        let xty = self.ty_of(x);
        let elem = match self.prog.types.kind(self.prog.types.underlying(xty)) {
            TypeKind::Slice(e) => *e,
            TypeKind::Pointer(a) => self
                .prog
                .types
                .elem(*a)
                .expect("index_addr through pointer needs an array pointee"),
            k => panic!("index_addr: not indexable: {:?}", k),
        };
        let ptr = self.prog.types.pointer_to(elem);
        let dst = self.new_value(ptr);
        self.push(Instr::IndexAddr { dst, x, index });
        dst
    }

    /// `dst = x[i]`; `x` is an array value.
    pub fn index(&mut self, x: ValueId, index: ValueId) -> ValueId {
        let elem = self
            .prog
            .types
            .elem(self.ty_of(x))
            .expect("index needs an array");
        let dst = self.new_value(elem);
        self.push(Instr::Index { dst, x, index });
        dst
    }

    /// `dst = x[:]`.
    pub fn slice(&mut self, x: ValueId) -> ValueId {
        let xty = self.ty_of(x);
        let under = self.prog.types.underlying(xty);
        let ty = match self.prog.types.kind(under).clone() {
            TypeKind::Slice(_) | TypeKind::String => xty,
            TypeKind::Pointer(a) => {
                let elem = self
                    .prog
                    .types
                    .elem(a)
                    .expect("slice of pointer needs an array pointee");
                self.prog.types.slice_of(elem)
            }
            k => panic!("slice: not sliceable: {:?}", k),
        };
        let dst = self.new_value(ty);
        self.push(Instr::Slice { dst, x });
        dst
    }

    /// `dst = tuple#index`.
    pub fn extract(&mut self, tuple: ValueId, index: usize) -> ValueId {
        let ty = match self.prog.types.kind(self.prog.types.underlying(self.ty_of(tuple))) {
            TypeKind::Tuple(parts) => parts[index],
            k => panic!("extract: not a tuple: {:?}", k),
        };
        let dst = self.new_value(ty);
        self.push(Instr::Extract { dst, tuple, index });
        dst
    }

    pub fn phi(&mut self, edges: &[ValueId]) -> ValueId {
        assert!(!edges.is_empty(), "phi needs at least one edge");
        let ty = self.ty_of(edges[0]);
        let dst = self.new_value(ty);
        self.push(Instr::Phi {
            dst,
            edges: edges.to_vec(),
        });
        dst
    }

    /// `dst = cond ? values[0] : values[1] ...`.
    pub fn select(&mut self, cond: ValueId, values: &[ValueId]) -> ValueId {
        assert!(!values.is_empty(), "select needs at least one value");
        let ty = self.ty_of(values[0]);
        let dst = self.new_value(ty);
        self.push(Instr::Select {
            dst,
            cond,
            values: values.to_vec(),
        });
        dst
    }

    // ---------- conversions ----------

    pub fn change_type(&mut self, ty: TypeId, x: ValueId) -> ValueId {
        let dst = self.new_value(ty);
        self.push(Instr::ChangeType { dst, x });
        dst
    }

    pub fn change_interface(&mut self, iface: TypeId, x: ValueId) -> ValueId {
        let dst = self.new_value(iface);
        self.push(Instr::ChangeInterface { dst, x });
        dst
    }

    pub fn convert(&mut self, ty: TypeId, x: ValueId) -> ValueId {
        let dst = self.new_value(ty);
        self.push(Instr::Convert { dst, x });
        dst
    }

    /// `dst = x.(ty)`; with `comma_ok` the result is `(ty, bool)`.
    pub fn type_assert(&mut self, x: ValueId, ty: TypeId, comma_ok: bool) -> ValueId {
        let rty = if comma_ok {
            let b = self.prog.types.bool_type();
            self.prog.types.tuple_of(vec![ty, b])
        } else {
            ty
        };
        let dst = self.new_value(rty);
        self.push(Instr::TypeAssert { dst, x, ty });
        dst
    }

    // ---------- calls ----------

    fn call_result(&mut self, sig_ty: TypeId) -> Option<ValueId> {
        let results = self.prog.types.signature(sig_ty).results.clone();
        match results.len() {
            0 => None,
            1 => Some(self.new_value(results[0])),
            _ => {
                let tuple = self.prog.types.tuple_of(results);
                Some(self.new_value(tuple))
            }
        }
    }

    /// Statically dispatched call; `args` excludes the receiver for plain
    /// functions and includes it (first) for methods.
    pub fn call_static(&mut self, callee: FuncId, args: &[ValueId]) -> Option<ValueId> {
        let sig = self.prog.funcs[callee.index()].sig;
        let dst = self.call_result(sig);
        self.push(Instr::Call(Call {
            callee: Callee::Static(callee),
            args: args.to_vec(),
            dst,
            sig,
        }));
        dst
    }

    /// Call through a function value.
    pub fn call_dynamic(&mut self, f: ValueId, args: &[ValueId]) -> Option<ValueId> {
        let sig = self.ty_of(f);
        let dst = self.call_result(sig);
        self.push(Instr::Call(Call {
            callee: Callee::Dynamic(f),
            args: args.to_vec(),
            dst,
            sig,
        }));
        dst
    }

    /// Interface method invocation `value.method(args)`.
    pub fn call_invoke(&mut self, value: ValueId, method: &str, args: &[ValueId]) -> Option<ValueId> {
        let iface = self.ty_of(value);
        let under = self.prog.types.underlying(iface);
        let listed = match self.prog.types.kind(under) {
            TypeKind::Interface(methods) => methods
                .iter()
                .find(|(n, _)| n == method)
                .map(|(_, sig)| *sig),
            k => panic!("invoke on non-interface: {:?}", k),
        };
        let sig = match listed {
            Some(sig) => sig,
            // reflect.Type is modeled as an opaque interface; its method
            // signatures come from the sole implementation, *rtype.
            None if iface == self.prog.types.reflect_type() => {
                let rtype_ptr = self.prog.types.rtype_ptr();
                let m = self
                    .prog
                    .types
                    .lookup_method(rtype_ptr, method)
                    .unwrap_or_else(|| panic!("reflect.Type has no method {}", method));
                let sig = m.sig;
                self.prog.types.sig_without_recv(sig)
            }
            None => panic!(
                "interface {} has no method {}",
                self.prog.types.type_string(iface),
                method
            ),
        };
        let dst = self.call_result(sig);
        self.push(Instr::Call(Call {
            callee: Callee::Invoke {
                value,
                method: method.to_string(),
            },
            args: args.to_vec(),
            dst,
            sig,
        }));
        dst
    }

    pub fn call_builtin(&mut self, builtin: Builtin, args: &[ValueId]) -> Option<ValueId> {
        let dst = match builtin {
            Builtin::Append => {
                let ty = self.ty_of(args[0]);
                Some(self.new_value(ty))
            }
            Builtin::Recover => {
                let eface = self.prog.types.eface();
                Some(self.new_value(eface))
            }
            Builtin::Len | Builtin::Cap | Builtin::Copy => {
                let int = self.prog.types.int_type();
                Some(self.new_value(int))
            }
            _ => None,
        };
        self.push(Instr::Call(Call {
            callee: Callee::Builtin(builtin),
            args: args.to_vec(),
            dst,
            sig: TypeId::INVALID,
        }));
        dst
    }

    // ---------- channels, maps ----------

    pub fn send(&mut self, chan: ValueId, x: ValueId) {
        self.push(Instr::Send { chan, x });
    }

    /// `dst = <-chan`; with `comma_ok` the result is `(elem, bool)`.
    pub fn recv(&mut self, chan: ValueId, comma_ok: bool) -> ValueId {
        let elem = self
            .prog
            .types
            .elem(self.ty_of(chan))
            .expect("recv needs a channel");
        let rty = if comma_ok {
            let b = self.prog.types.bool_type();
            self.prog.types.tuple_of(vec![elem, b])
        } else {
            elem
        };
        let dst = self.new_value(rty);
        self.push(Instr::Recv { dst, chan });
        dst
    }

    /// `dst = m[k]`; with `comma_ok` the result is `(value, bool)`.
    pub fn lookup(&mut self, map: ValueId, key: ValueId, comma_ok: bool) -> ValueId {
        let vty = self
            .prog
            .types
            .elem(self.ty_of(map))
            .expect("lookup needs a map");
        let rty = if comma_ok {
            let b = self.prog.types.bool_type();
            self.prog.types.tuple_of(vec![vty, b])
        } else {
            vty
        };
        let dst = self.new_value(rty);
        self.push(Instr::Lookup { dst, map, key });
        dst
    }

    /// `m[k] = v`.
    pub fn map_update(&mut self, map: ValueId, key: ValueId, value: ValueId) {
        self.push(Instr::MapUpdate { map, key, value });
    }

    /// One map-iteration step; the result is `(ok, k, v)`.
    pub fn next(&mut self, map: ValueId) -> ValueId {
        let mty = self.ty_of(map);
        let k = self.prog.types.key(mty).expect("next needs a map");
        let v = self.prog.types.elem(mty).expect("next needs a map");
        let b = self.prog.types.bool_type();
        let rty = self.prog.types.tuple_of(vec![b, k, v]);
        let dst = self.new_value(rty);
        self.push(Instr::Next { dst, map });
        dst
    }

    // ---------- control ----------

    pub fn ret(&mut self, results: &[ValueId]) {
        self.push(Instr::Return {
            results: results.to_vec(),
        });
    }

    pub fn panic_value(&mut self, x: ValueId) {
        self.push(Instr::Panic { x });
    }

    pub fn jump(&mut self, target: usize) {
        self.push(Instr::Jump { target });
    }

    pub fn branch(&mut self, cond: ValueId, then_target: usize, else_target: usize) {
        self.push(Instr::If {
            cond,
            then_target,
            else_target,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signature;

    fn void_sig() -> Signature {
        Signature {
            recv: None,
            params: vec![],
            results: vec![],
        }
    }

    #[test]
    fn builder_types_flow_through() {
        let mut pb = ProgramBuilder::new();
        let int = pb.types().int_type();
        let main = pb.declare("main", "main", void_sig());
        {
            let mut b = pb.body(main);
            let p = b.alloc(int); // *int
            let v = b.load(p); // int
            b.store(p, v);
            b.ret(&[]);
        }
        let prog = pb.finish();
        let f = prog.func(main);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].instrs.len(), 4);
        // alloc result is *int
        let dst = f.blocks[0].instrs[0].def().unwrap();
        let ptr_int = prog.types.underlying(prog.value_type(main, dst));
        assert!(matches!(prog.types.kind(ptr_int), TypeKind::Pointer(_)));
    }

    #[test]
    fn params_include_receiver() {
        let mut pb = ProgramBuilder::new();
        let int = pb.types().int_type();
        let under = pb.types().struct_of(vec![("x".into(), int)]);
        let d = pb.types().named("D", under);
        let sig = Signature {
            recv: Some(d),
            params: vec![int],
            results: vec![],
        };
        let m = pb.declare_method("main", d, "Set", sig);
        let prog = pb.finish();
        let f = prog.func(m);
        assert_eq!(f.params.len(), 2);
        assert_eq!(prog.value_type(m, f.params[0]), d);
        assert_eq!(f.name, "(D).Set");
        assert!(prog.types.lookup_method(d, "Set").is_some());
    }

    #[test]
    fn call_results_are_tupled() {
        let mut pb = ProgramBuilder::new();
        let int = pb.types().int_type();
        let ptr = pb.types().pointer_to(int);
        let sig = Signature {
            recv: None,
            params: vec![],
            results: vec![ptr, ptr],
        };
        let g = pb.declare("main", "g", sig);
        let main = pb.declare("main", "main", void_sig());
        {
            let mut b = pb.body(main);
            let r = b.call_static(g, &[]).unwrap();
            let first = b.extract(r, 0);
            b.store(first, first); // nonsense, but type-checks the builder
            b.ret(&[]);
        }
        let prog = pb.finish();
        let r_ty = prog.value_type(main, ValueId(0));
        assert!(matches!(
            prog.types.kind(prog.types.underlying(r_ty)),
            TypeKind::Tuple(parts) if parts.len() == 2
        ));
    }

    #[test]
    #[should_panic(expected = "already has a body")]
    fn double_body_panics() {
        let mut pb = ProgramBuilder::new();
        let main = pb.declare("main", "main", void_sig());
        {
            let mut b = pb.body(main);
            b.ret(&[]);
        }
        pb.body(main);
    }
}
