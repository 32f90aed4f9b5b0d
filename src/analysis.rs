//! The analysis manager: one instance owns every table of a run.
//!
//! All mutable state — the node universe, the constraint list, value and
//! object maps, intrinsic caches, the solver worklist — hangs off
//! [`Analysis`]. Constraint generation (`generate` module), the intrinsic
//! library (`intrinsics`) and the solver (`solve`) are all methods and
//! functions over this one struct; nothing is shared, nothing is locked.
//!
//! The entry point is [`analyze`]: validate the configuration, generate
//! constraints for the reachable program, solve to a fixed point, and
//! translate the final state into an [`AnalysisResult`].

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use log::debug;

use crate::config::Config;
use crate::constraint::Constraint;
use crate::error::{AnalysisError, Warning};
use crate::flatten::{FieldInfo, Flattener};
use crate::node::{obj_flags, NodeId, NodeTable, ObjData, Object};
use crate::nodeset::NodeSet;
use crate::result::AnalysisResult;
use crate::solve::UnionFind;
use crate::ssa::{ConstKind, FuncId, GlobalId, Instr, InstrRef, Program, ValueDef, ValueId};
use crate::types::TypeId;

/// Index of a call-graph node (contour) in [`Analysis::cgnodes`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CgnId(pub(crate) u32);

impl CgnId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CgnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cg{}", self.0)
    }
}

/// One call site: the instruction (absent for the synthetic root) and the
/// node whose final points-to set names every callable reached here.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub instr: Option<InstrRef>,
    pub targets: NodeId,
}

/// A contour: one context-sensitive instantiation of a function.
#[derive(Debug)]
pub struct CgNode {
    pub func: FuncId,
    /// Head node of the function object.
    pub obj: NodeId,
    /// The sole callsite for per-callsite contours; `None` for shared
    /// contours and the root.
    pub callersite: Option<InstrRef>,
    pub sites: Vec<CallSite>,
}

/// Keys for program-level (context-insensitive) values.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum GlobalKey {
    Global(GlobalId),
    Func(FuncId),
    /// Free variables are treated like globals: set by the enclosing
    /// `MakeClosure`, read by the inner function.
    FreeVar(FuncId, usize),
}

/// Runs the whole pipeline over `prog` and returns the result bundle.
pub fn analyze(prog: Program, config: Config) -> Result<AnalysisResult, AnalysisError> {
    let mut a = Analysis::new(prog, config)?;
    let root = a.generate()?;
    a.solve();
    Ok(a.into_result(root))
}

pub struct Analysis {
    pub(crate) prog: Program,
    pub(crate) config: Config,
    pub(crate) flat: Flattener,
    pub(crate) nodes: NodeTable,

    /// Append-only constraint log; the solver consumes `processed..`.
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) processed: usize,

    pub(crate) cgnodes: Vec<CgNode>,
    /// Contours whose bodies still need constraint generation.
    pub(crate) genq: VecDeque<CgnId>,

    // Per-contour value maps, reset by gen_func.
    pub(crate) localval: HashMap<ValueId, NodeId>,
    pub(crate) localobj: HashMap<ValueId, NodeId>,
    // Program-level value maps.
    pub(crate) globalval: HashMap<GlobalKey, NodeId>,
    pub(crate) globalobj: HashMap<GlobalKey, NodeId>,

    /// Canonical `*rtype` tagged object per type.
    pub(crate) rtypes: HashMap<TypeId, NodeId>,
    /// Recorded but deliberately never consulted; see DESIGN.md.
    pub(crate) reflect_zeros: HashMap<TypeId, NodeId>,
    /// Canonical probe node per `print` call site.
    pub(crate) probes: HashMap<InstrRef, NodeId>,
    pub(crate) warned_externals: HashSet<FuncId>,

    /// Process-global node receiving every panicked value.
    pub(crate) panic_node: NodeId,
    pub(crate) warnings: Vec<Warning>,

    pub(crate) query_specs: HashMap<(FuncId, ValueId), bool>,
    pub(crate) query_results: HashMap<(FuncId, ValueId), Vec<(Option<CgnId>, NodeId)>>,

    // Solver state.
    pub(crate) work: NodeSet,
    pub(crate) complex: HashMap<NodeId, Vec<usize>>,
    pub(crate) copy_to: HashMap<NodeId, NodeSet>,
    pub(crate) rep: UnionFind,
}

impl Analysis {
    pub fn new(prog: Program, config: Config) -> Result<Self, AnalysisError> {
        if config.entry_packages.is_empty() {
            return Err(AnalysisError::NoEntryPackages);
        }
        for (i, pkg) in config.entry_packages.iter().enumerate() {
            if config.entry_packages[..i].contains(pkg) {
                return Err(AnalysisError::DuplicateEntryPackage(pkg.clone()));
            }
            if prog.func_by_name(pkg, "main").is_none() {
                return Err(AnalysisError::NoMainFunction(pkg.clone()));
            }
        }

        let mut query_specs = HashMap::new();
        for q in &config.queries {
            if q.func.index() >= prog.funcs.len() {
                return Err(AnalysisError::MalformedQuery(format!(
                    "no such function {}",
                    q.func
                )));
            }
            if q.value.index() >= prog.func(q.func).values.len() {
                return Err(AnalysisError::MalformedQuery(format!(
                    "no value {} in {}",
                    q.value,
                    prog.func(q.func).qualified_name()
                )));
            }
            if query_specs.insert((q.func, q.value), q.indirect).is_some() {
                return Err(AnalysisError::MalformedQuery(format!(
                    "duplicate query for {} in {}",
                    q.value,
                    prog.func(q.func).qualified_name()
                )));
            }
        }

        Ok(Analysis {
            prog,
            config,
            flat: Flattener::new(),
            nodes: NodeTable::new(),
            constraints: Vec::new(),
            processed: 0,
            cgnodes: Vec::new(),
            genq: VecDeque::new(),
            localval: HashMap::new(),
            localobj: HashMap::new(),
            globalval: HashMap::new(),
            globalobj: HashMap::new(),
            rtypes: HashMap::new(),
            reflect_zeros: HashMap::new(),
            probes: HashMap::new(),
            warned_externals: HashSet::new(),
            panic_node: NodeId::ZERO,
            warnings: Vec::new(),
            query_specs,
            query_results: HashMap::new(),
            work: NodeSet::new(),
            complex: HashMap::new(),
            copy_to: HashMap::new(),
            rep: UnionFind::new(),
        })
    }

    // ---------- type measures ----------

    pub(crate) fn flatten(&mut self, t: TypeId) -> Rc<Vec<Rc<FieldInfo>>> {
        self.flat.flatten(&self.prog.types, t)
    }

    pub(crate) fn sizeof(&mut self, t: TypeId) -> u32 {
        self.flat.sizeof(&self.prog.types, t)
    }

    pub(crate) fn offset_of(&mut self, t: TypeId, index: usize) -> u32 {
        self.flat.offset_of(&self.prog.types, t, index)
    }

    /// `(receiver, params, results)` sizes of a function type, in nodes.
    pub(crate) fn sig_sizes(&mut self, sig_ty: TypeId) -> (u32, u32, u32) {
        let sig = self.prog.types.signature(sig_ty).clone();
        let recv = sig.recv.map_or(0, |r| self.sizeof(r));
        let params = sig.params.iter().map(|p| self.sizeof(*p)).sum();
        let results = sig.results.iter().map(|r| self.sizeof(*r)).sum();
        (recv, params, results)
    }

    // ---------- node creation ----------

    pub(crate) fn next_node(&self) -> NodeId {
        self.nodes.next_id()
    }

    /// Appends a single node. `comment` explains its origin in the trace.
    pub(crate) fn add_one_node(
        &mut self,
        ty: TypeId,
        comment: &str,
        sub: Option<Rc<FieldInfo>>,
    ) -> NodeId {
        let id = self.nodes.add_one(ty, sub);
        debug!(
            "create {} {} for {}",
            id,
            self.prog.types.type_string(ty),
            comment
        );
        id
    }

    /// Appends `flatten(ty)` nodes; returns the first id, or zero if the
    /// type was analytically uninteresting.
    pub(crate) fn add_nodes(&mut self, ty: TypeId, comment: &str) -> NodeId {
        let id = self.next_node();
        let flat = self.flatten(ty);
        for fi in flat.iter() {
            self.add_one_node(fi.typ, comment, Some(fi.clone()));
        }
        if id == self.next_node() {
            return NodeId::ZERO; // type contained no scalars
        }
        id
    }

    pub(crate) fn end_object(
        &mut self,
        obj: NodeId,
        cgn: Option<CgnId>,
        data: ObjData,
    ) -> &mut Object {
        debug!("object {} {:?}", obj, data);
        self.nodes.end_object(obj, cgn, data)
    }

    // ---------- contours ----------

    pub(crate) fn make_cgnode(
        &mut self,
        func: FuncId,
        obj: NodeId,
        callersite: Option<InstrRef>,
    ) -> CgnId {
        let id = CgnId(self.cgnodes.len() as u32);
        self.cgnodes.push(CgNode {
            func,
            obj,
            callersite,
            sites: Vec::new(),
        });
        id
    }

    /// Creates a function object (contour) for `func` and returns the id
    /// of its head node. The new contour is queued for generation.
    ///
    /// `callersite` identifies the sole callsite of a per-callsite
    /// contour; shared contours pass `None`.
    pub(crate) fn make_function_object(
        &mut self,
        func: FuncId,
        callersite: Option<InstrRef>,
    ) -> NodeId {
        debug!(
            "---- make_function_object {}",
            self.prog.func(func).qualified_name()
        );
        let obj = self.next_node();
        let cgn = self.make_cgnode(func, obj, callersite);
        let sig_ty = self.prog.func(func).sig;
        self.add_one_node(sig_ty, "func.cgnode", None);
        let sig = self.prog.types.signature(sig_ty).clone();
        if let Some(recv) = sig.recv {
            self.add_nodes(recv, "func.recv");
        }
        for p in &sig.params {
            self.add_nodes(*p, "func.params");
        }
        for r in &sig.results {
            self.add_nodes(*r, "func.results");
        }
        self.end_object(obj, Some(cgn), ObjData::Func(func)).flags |= obj_flags::FUNCTION;

        self.genq.push_back(cgn);
        obj
    }

    /// The shared (context-insensitive) contour for `func`.
    pub(crate) fn shared_contour(&mut self, func: FuncId) -> NodeId {
        if let Some(&obj) = self.globalobj.get(&GlobalKey::Func(func)) {
            return obj;
        }
        let obj = self.make_function_object(func, None);
        self.globalobj.insert(GlobalKey::Func(func), obj);
        obj
    }

    /// Creates a tagged object of dynamic type `ty`.
    pub(crate) fn make_tagged(&mut self, ty: TypeId, cgn: Option<CgnId>, data: ObjData) -> NodeId {
        let obj = self.add_one_node(ty, "tagged.T", None); // type may be non-scalar
        self.add_nodes(ty, "tagged.v");
        self.end_object(obj, cgn, data).flags |= obj_flags::TAGGED;
        obj
    }

    /// The canonical `*rtype` tagged object for `ty`, created on first
    /// demand.
    pub(crate) fn make_rtype(&mut self, ty: TypeId) -> NodeId {
        if let Some(&id) = self.rtypes.get(&ty) {
            return id;
        }

        // The object for the rtype itself; a single node stands in for
        // the whole runtime type descriptor.
        let obj = self.next_node();
        self.add_one_node(ty, "reflect.rtype", None);
        self.end_object(obj, None, ObjData::Rtype(ty));

        let rtype_ptr = self.prog.types.rtype_ptr();
        let id = self.make_tagged(rtype_ptr, None, ObjData::Rtype(ty));
        // Each *rtype tagged object is a singleton, so the payload node
        // records the described type itself.
        self.nodes.node_mut(id.offset(1)).ty = ty;
        self.address_of(id.offset(1), obj);

        self.rtypes.insert(ty, id);
        id
    }

    /// The type described by a `*rtype` tagged object.
    ///
    /// # Panics
    ///
    /// Panics if `obj` is not a `*rtype`-tagged object.
    pub(crate) fn rtype_tagged_value(&self, obj: NodeId) -> TypeId {
        let (tag, payload, _) = self
            .nodes
            .tagged_value(obj)
            .unwrap_or_else(|| panic!("not a tagged object: {}", obj));
        assert_eq!(
            tag,
            self.prog.types.rtype_ptr(),
            "not a *rtype-tagged value: obj={} payload={}",
            obj,
            payload
        );
        self.nodes.node(payload).ty
    }

    // ---------- function object layout ----------

    /// First node of the params block (receiver first) of the function
    /// object headed at `obj`.
    pub(crate) fn func_params(&self, obj: NodeId) -> NodeId {
        let n = self.nodes.node(obj);
        match &n.obj {
            Some(o) if o.is_function() => obj.offset(1),
            _ => panic!("func_params({}): not a function object block", obj),
        }
    }

    /// First node of the results block of the function object headed at
    /// `obj`.
    pub(crate) fn func_results(&mut self, obj: NodeId) -> NodeId {
        let n = self.nodes.node(obj);
        let sig_ty = match &n.obj {
            Some(o) if o.is_function() => n.ty,
            _ => panic!("func_results({}): not a function object block", obj),
        };
        let (recv, params, _) = self.sig_sizes(sig_ty);
        obj.offset(1 + recv + params)
    }

    // ---------- value nodes ----------

    /// The node for the function value of `func` (a pointer to its shared
    /// contour).
    pub(crate) fn func_value_node(&mut self, func: FuncId) -> NodeId {
        if let Some(&id) = self.globalval.get(&GlobalKey::Func(func)) {
            return id;
        }
        let sig = self.prog.func(func).sig;
        let comment = self.prog.func(func).qualified_name();
        let id = self.add_nodes(sig, &comment);
        let obj = self.shared_contour(func);
        self.address_of(id, obj);
        self.globalval.insert(GlobalKey::Func(func), id);
        id
    }

    /// The node for value `v` of function `f`, creating program-level
    /// value nodes on demand. Returns zero for uninteresting values.
    ///
    /// Local value nodes are created en masse by `gen_func`; `cgn` is the
    /// current contour, or `None` outside any function body.
    pub(crate) fn value_node(&mut self, cgn: Option<CgnId>, f: FuncId, v: ValueId) -> NodeId {
        match self.prog.value_def(f, v).clone() {
            ValueDef::Param { .. } | ValueDef::Instr { .. } => {
                *self.localval.get(&v).unwrap_or_else(|| {
                    panic!(
                        "no value node for {} in {}",
                        v,
                        self.prog.func(f).qualified_name()
                    )
                })
            }

            ValueDef::FreeVar { index, ty } => {
                let key = GlobalKey::FreeVar(f, index);
                if let Some(&id) = self.globalval.get(&key) {
                    return id;
                }
                let id = self.add_nodes(ty, "freevar");
                self.globalval.insert(key, id);
                self.record_query(f, v, id, cgn);
                id
            }

            ValueDef::Const { ty, .. } => {
                if let Some(&id) = self.localval.get(&v) {
                    return id;
                }
                let id = self.add_nodes(ty, "const");
                self.localval.insert(v, id);
                self.record_query(f, v, id, cgn);
                id
            }

            ValueDef::Global(g) => {
                let key = GlobalKey::Global(g);
                if let Some(&id) = self.globalval.get(&key) {
                    return id;
                }
                let ty = self.prog.global(g).ty;
                let name = self.prog.global(g).name.clone();
                let id = self.add_nodes(ty, &name);
                let obj = self.global_object(g);
                self.address_of(id, obj);
                self.globalval.insert(key, id);
                self.record_query(f, v, id, None);
                id
            }

            ValueDef::Func(callee) => self.func_value_node(callee),
        }
    }

    /// The node for subfield `index` of tuple/struct value `v`.
    pub(crate) fn value_offset_node(
        &mut self,
        cgn: Option<CgnId>,
        f: FuncId,
        v: ValueId,
        index: usize,
    ) -> NodeId {
        let id = self.value_node(cgn, f, v);
        assert!(!id.is_zero(), "cannot offset within n0: {} of {}", v, f);
        let ty = self.prog.value_type(f, v);
        let off = self.offset_of(ty, index);
        id.offset(off)
    }

    /// Associates `id` with local value `v` and records it against any
    /// pending query.
    pub(crate) fn set_value_node(&mut self, f: FuncId, v: ValueId, id: NodeId, cgn: Option<CgnId>) {
        debug!("val[{}] = {}", v, id);
        self.localval.insert(v, id);
        self.record_query(f, v, id, cgn);
    }

    pub(crate) fn record_query(
        &mut self,
        f: FuncId,
        v: ValueId,
        id: NodeId,
        cgn: Option<CgnId>,
    ) {
        if let Some(&indirect) = self.query_specs.get(&(f, v)) {
            let id = if indirect {
                let ty = self.prog.value_type(f, v);
                let tmp = self.add_nodes(ty, "query.indirect");
                let sz = self.sizeof(ty);
                self.gen_load(cgn, f, tmp, v, 0, sz);
                tmp
            } else {
                id
            };
            self.query_results.entry((f, v)).or_default().push((cgn, id));
        }
    }

    // ---------- object nodes ----------

    /// The object for global `g`, created on first use.
    pub(crate) fn global_object(&mut self, g: GlobalId) -> NodeId {
        let key = GlobalKey::Global(g);
        if let Some(&obj) = self.globalobj.get(&key) {
            return obj;
        }
        let ty = self.prog.global(g).ty;
        let pointee = self.prog.types.must_deref(ty);
        let obj = self.next_node();
        self.add_nodes(pointee, "global");
        self.end_object(obj, None, ObjData::Global(g));
        self.globalobj.insert(key, obj);
        obj
    }

    /// The object `v` points to, if its points-to set is known to be a
    /// singleton a priori; zero otherwise.
    ///
    /// Allocation-like instructions always have singleton sets; address
    /// arithmetic (`FieldAddr`, `IndexAddr`, `Slice`) is a singleton when
    /// its operand is. The generator uses this to pre-apply load/store
    /// propagation and shrink the constraint set.
    pub(crate) fn object_node(&mut self, cgn: Option<CgnId>, f: FuncId, v: ValueId) -> NodeId {
        match self.prog.value_def(f, v).clone() {
            ValueDef::Global(g) => self.global_object(g),
            ValueDef::Func(callee) => self.shared_contour(callee),
            ValueDef::Const { .. } | ValueDef::Param { .. } | ValueDef::FreeVar { .. } => {
                NodeId::ZERO
            }
            ValueDef::Instr { .. } => {
                let cgn = match cgn {
                    Some(cgn) => cgn,
                    None => return NodeId::ZERO,
                };
                if let Some(&obj) = self.localobj.get(&v) {
                    return obj;
                }
                let obj = self.local_object(cgn, f, v);
                debug!("localobj[{}] = {}", v, obj);
                self.localobj.insert(v, obj);
                obj
            }
        }
    }

    /// Computes the singleton object for a local value-defining
    /// instruction, possibly recursing down the value graph
    /// (e.g. `IndexAddr(FieldAddr(Alloc))`).
    fn local_object(&mut self, cgn: CgnId, f: FuncId, v: ValueId) -> NodeId {
        let Some((instr, site)) = self.defining_instr(f, v) else {
            return NodeId::ZERO;
        };
        match instr {
            Instr::Alloc { ty, .. } => {
                let obj = self.next_node();
                self.add_nodes(ty, "alloc");
                self.end_object(obj, Some(cgn), ObjData::Site(site));
                obj
            }
            Instr::MakeSlice { ty, .. } => {
                let arr = self.prog.types.slice_to_array(ty);
                let obj = self.next_node();
                self.add_nodes(arr, "makeslice");
                self.end_object(obj, Some(cgn), ObjData::Site(site));
                obj
            }
            Instr::MakeChan { ty, .. } => {
                let elem = self.prog.types.elem(ty).expect("channel element");
                let obj = self.next_node();
                self.add_nodes(elem, "makechan");
                self.end_object(obj, Some(cgn), ObjData::Site(site));
                obj
            }
            Instr::MakeMap { ty, .. } => {
                let key = self.prog.types.key(ty).expect("map key");
                let val = self.prog.types.elem(ty).expect("map value");
                let obj = self.next_node();
                self.add_nodes(key, "makemap.key");
                self.add_nodes(val, "makemap.value");
                self.end_object(obj, Some(cgn), ObjData::Site(site));
                obj
            }
            Instr::MakeInterface { x, .. } => {
                let conc = self.prog.value_type(f, x);
                // Create nodes and constraints for all methods of the
                // type: which will be needed is undecidable in general.
                let methods: Vec<FuncId> = self
                    .prog
                    .types
                    .method_set(conc)
                    .iter()
                    .map(|m| m.func)
                    .collect();
                for m in methods {
                    self.func_value_node(m);
                }

                let obj = self.make_tagged(conc, Some(cgn), ObjData::Site(site));

                // Copy the value into it, if nontrivial.
                let x_node = self.value_node(Some(cgn), f, x);
                if !x_node.is_zero() {
                    let sz = self.sizeof(conc);
                    self.copy(obj.offset(1), x_node, sz);
                }
                obj
            }
            Instr::FieldAddr { x, field, .. } => {
                let xobj = self.object_node(Some(cgn), f, x);
                if xobj.is_zero() {
                    return NodeId::ZERO;
                }
                let st = self.prog.types.must_deref(self.prog.value_type(f, x));
                let off = self.offset_of(st, field);
                xobj.offset(off)
            }
            Instr::IndexAddr { x, .. } => {
                let xobj = self.object_node(Some(cgn), f, x);
                if xobj.is_zero() {
                    return NodeId::ZERO;
                }
                xobj.offset(1)
            }
            Instr::Slice { x, .. } => self.object_node(Some(cgn), f, x),
            _ => NodeId::ZERO,
        }
    }

    /// Finds the instruction defining local value `v`, with its site.
    pub(crate) fn defining_instr(&self, f: FuncId, v: ValueId) -> Option<(Instr, InstrRef)> {
        let func = self.prog.func(f);
        for (bi, block) in func.blocks.iter().enumerate() {
            for (ii, instr) in block.instrs.iter().enumerate() {
                if instr.def() == Some(v) {
                    let site = InstrRef {
                        func: f,
                        block: bi as u32,
                        index: ii as u32,
                    };
                    return Some((instr.clone(), site));
                }
            }
        }
        None
    }

    // ---------- constraint creation ----------

    pub(crate) fn add_constraint(&mut self, c: Constraint) {
        debug!("{}", c);
        self.constraints.push(c);
    }

    /// `dst = src`, copying `sizeof` logical fields.
    pub(crate) fn copy(&mut self, dst: NodeId, src: NodeId, sizeof: u32) {
        if src == dst || sizeof == 0 {
            return; // trivial
        }
        assert!(
            !src.is_zero() && !dst.is_zero(),
            "ill-typed copy dst={} src={}",
            dst,
            src
        );
        for i in 0..sizeof {
            self.add_constraint(Constraint::Copy {
                dst: dst.offset(i),
                src: src.offset(i),
            });
        }
    }

    /// `dst = &obj`.
    pub(crate) fn address_of(&mut self, dst: NodeId, obj: NodeId) {
        assert!(!dst.is_zero(), "address_of: zero dst");
        assert!(!obj.is_zero(), "address_of: zero obj");
        self.add_constraint(Constraint::Addr { dst, obj });
    }

    /// `dst = src[offset]`, loading `sizeof` logical fields.
    pub(crate) fn load(&mut self, dst: NodeId, src: NodeId, offset: u32, sizeof: u32) {
        if dst.is_zero() {
            return; // load of non-pointerlike value
        }
        assert!(!src.is_zero(), "ill-typed load dst={} src=n0", dst);
        for i in 0..sizeof {
            self.add_constraint(Constraint::Load {
                offset: offset + i,
                dst: dst.offset(i),
                src,
            });
        }
    }

    /// `dst[offset] = src`, storing `sizeof` logical fields.
    pub(crate) fn store(&mut self, dst: NodeId, src: NodeId, offset: u32, sizeof: u32) {
        if src.is_zero() {
            return; // store of non-pointerlike value
        }
        assert!(!dst.is_zero(), "ill-typed store dst=n0 src={}", src);
        for i in 0..sizeof {
            self.add_constraint(Constraint::Store {
                offset: offset + i,
                dst,
                src: src.offset(i),
            });
        }
    }

    /// `dst = &src.#offset`.
    pub(crate) fn offset_addr(&mut self, dst: NodeId, src: NodeId, offset: u32) {
        if offset == 0 {
            // Simplify dst = &src->f0 to dst = src. (Defeated for struct
            // and array objects by their identity nodes.)
            self.copy(dst, src, 1);
        } else {
            self.add_constraint(Constraint::OffsetAddr { offset, dst, src });
        }
    }

    /// `dst = src.(ty)`.
    pub(crate) fn type_assert_constraint(&mut self, ty: TypeId, dst: NodeId, src: NodeId) {
        self.add_constraint(Constraint::TypeAssert { ty, dst, src });
    }

    // ---------- pre-applied generation ----------

    /// Constraints for `result = *(ptr + offset)`; collapses to a copy
    /// when `ptr`'s sole object is known.
    pub(crate) fn gen_load(
        &mut self,
        cgn: Option<CgnId>,
        f: FuncId,
        result: NodeId,
        ptr: ValueId,
        offset: u32,
        sizeof: u32,
    ) {
        let obj = self.object_node(cgn, f, ptr);
        if !obj.is_zero() {
            self.copy(result, obj.offset(offset), sizeof);
        } else {
            let src = self.value_node(cgn, f, ptr);
            self.load(result, src, offset, sizeof);
        }
    }

    /// Constraints for `*(ptr + offset) = val`.
    pub(crate) fn gen_store(
        &mut self,
        cgn: Option<CgnId>,
        f: FuncId,
        ptr: ValueId,
        val: NodeId,
        offset: u32,
        sizeof: u32,
    ) {
        let obj = self.object_node(cgn, f, ptr);
        if !obj.is_zero() {
            self.copy(obj.offset(offset), val, sizeof);
        } else {
            let dst = self.value_node(cgn, f, ptr);
            self.store(dst, val, offset, sizeof);
        }
    }

    /// Constraints for a field- or index-address instruction `v`.
    pub(crate) fn gen_offset_addr(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        v: ValueId,
        ptr: NodeId,
        offset: u32,
    ) {
        let dst = self.value_node(Some(cgn), f, v);
        let obj = self.object_node(Some(cgn), f, v);
        if !obj.is_zero() {
            // Pre-apply the offsetAddr propagation rule.
            self.address_of(dst, obj);
        } else {
            self.offset_addr(dst, ptr, offset);
        }
    }

    // ---------- misc ----------

    pub(crate) fn warnf(&mut self, site: Option<InstrRef>, message: String) {
        debug!("warning: {}", message);
        self.warnings.push(Warning { site, message });
    }

    /// The constant value of argument `index` at call site `site`, if the
    /// argument is a constant.
    pub(crate) fn callsite_const_arg(&self, site: InstrRef, index: usize) -> Option<ConstKind> {
        let func = self.prog.func(site.func);
        let instr = &func.blocks[site.block as usize].instrs[site.index as usize];
        if let Instr::Call(call) = instr {
            if let Some(&arg) = call.args.get(index) {
                if let ValueDef::Const { kind, .. } = self.prog.value_def(site.func, arg) {
                    return Some(kind.clone());
                }
            }
        }
        None
    }
}
