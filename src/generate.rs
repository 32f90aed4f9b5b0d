//! Constraint generation over the reachable program.
//!
//! Generation is RTA-style: a worklist of contours (`genq`) grows as
//! function objects are materialized, starting from the synthetic root's
//! calls to each entry package. Within a function the walk is
//! flow-insensitive; instruction order never matters.

use log::debug;

use crate::analysis::{Analysis, CallSite, CgnId};
use crate::constraint::Constraint;
use crate::error::AnalysisError;
use crate::node::{NodeId, ObjData};
use crate::ssa::{Builtin, Call, Callee, FuncId, Function, Instr, InstrRef, ValueId};
use crate::types::{Signature, TypeId, TypeKind};

impl Analysis {
    /// Generates offline constraints for the entire reachable program and
    /// returns the synthetic root of the call graph.
    pub(crate) fn generate(&mut self) -> Result<CgnId, AnalysisError> {
        // The dummy node: id 0 stands for non-pointerlike values.
        let zero = self.add_nodes(TypeId::INVALID, "(zero)");
        assert!(zero.is_zero() && self.nodes.len() == 1);

        // The global node for panicked values.
        let eface = self.prog.types.eface();
        self.panic_node = self.add_nodes(eface, "panic");

        // Shared contours for all methods of *rtype: dynamic calls to
        // reflect.Type methods dispatch through them.
        let rtype_ptr = self.prog.types.rtype_ptr();
        let methods: Vec<FuncId> = self
            .prog
            .types
            .method_set(rtype_ptr)
            .iter()
            .map(|m| m.func)
            .collect();
        for m in methods {
            self.func_value_node(m);
        }

        let root = self.gen_root_calls();

        // Generate constraints for the RTA-reachable portion of the
        // program (Bacon & Sweeney, OOPSLA'96).
        while let Some(cgn) = self.genq.pop_front() {
            self.gen_func(cgn)?;
        }

        Ok(root)
    }

    /// Creates the synthetic root and its calls to `init` and `main` of
    /// each entry package.
    fn gen_root_calls(&mut self) -> CgnId {
        let root_sig = Signature {
            recv: None,
            params: vec![],
            results: vec![],
        };
        let sig_ty = self.prog.types.func_of(root_sig);
        let root_func = FuncId(self.prog.funcs.len() as u32);
        self.prog.funcs.push(Function {
            pkg: String::new(),
            name: "<root>".to_string(),
            sig: sig_ty,
            params: Vec::new(),
            free_vars: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            synthetic: true,
        });
        let root = self.make_cgnode(root_func, NodeId::ZERO, None);

        for pkg in self.config.entry_packages.clone() {
            // Presence of main was validated up front.
            let main = self.prog.func_by_name(&pkg, "main").unwrap();
            let main_sig = self.prog.func(main).sig;
            let targets = self.add_one_node(main_sig, "root.targets", None);
            self.cgnodes[root.index()].sites.push(CallSite {
                instr: None,
                targets,
            });

            let init = self.prog.func_by_name(&pkg, "init");
            for func in init.into_iter().chain(Some(main)) {
                debug!("root call to {}", self.prog.func(func).qualified_name());
                let v = self.func_value_node(func);
                self.copy(targets, v, 1);
            }
        }

        root
    }

    /// Generates constraints for one contour of one function.
    pub(crate) fn gen_func(&mut self, cgn: CgnId) -> Result<(), AnalysisError> {
        let f = self.cgnodes[cgn.index()].func;
        let qname = self.prog.func(f).qualified_name();
        debug!("---- gen_func {} {}", cgn, qname);

        if let Some(intrinsic) = crate::intrinsics::find_intrinsic(&qname) {
            intrinsic(self, cgn);
            return Ok(());
        }

        if self.prog.func(f).is_external() {
            // No body and no intrinsic model: the contour's P/R blocks
            // exist but nothing connects them.
            if self.warned_externals.insert(f) {
                self.warnf(
                    None,
                    format!("unsound: external function {} is not modeled", qname),
                );
            }
            return Ok(());
        }

        self.localval.clear();
        self.localobj.clear();

        // The value nodes for the params live in the function object.
        let obj = self.cgnodes[cgn.index()].obj;
        let mut p = self.func_params(obj);
        for v in self.prog.func(f).params.clone() {
            self.set_value_node(f, v, p, Some(cgn));
            let ty = self.prog.value_type(f, v);
            let sz = self.sizeof(ty);
            p = p.offset(sz);
        }

        // Free variables are treated like globals: the enclosing function
        // sets them via MakeClosure bindings, this one reads them.

        // Create value nodes for all defining instructions up front,
        // since SSA may contain forward references.
        let nblocks = self.prog.func(f).blocks.len();
        for bi in 0..nblocks {
            let ninstrs = self.prog.func(f).blocks[bi].instrs.len();
            for ii in 0..ninstrs {
                if let Some(dst) = self.prog.func(f).blocks[bi].instrs[ii].def() {
                    let ty = self.prog.value_type(f, dst);
                    let comment = dst.to_string();
                    let id = self.add_nodes(ty, &comment);
                    self.set_value_node(f, dst, id, Some(cgn));
                }
            }
        }

        for bi in 0..nblocks {
            let ninstrs = self.prog.func(f).blocks[bi].instrs.len();
            for ii in 0..ninstrs {
                let instr = self.prog.func(f).blocks[bi].instrs[ii].clone();
                let site = InstrRef {
                    func: f,
                    block: bi as u32,
                    index: ii as u32,
                };
                self.gen_instr(cgn, f, instr, site)?;
            }
        }

        // Local value maps are per-contour; release them.
        self.localval.clear();
        self.localobj.clear();
        Ok(())
    }

    fn gen_instr(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        instr: Instr,
        site: InstrRef,
    ) -> Result<(), AnalysisError> {
        match instr {
            Instr::Alloc { dst, .. }
            | Instr::MakeSlice { dst, .. }
            | Instr::MakeChan { dst, .. }
            | Instr::MakeMap { dst, .. }
            | Instr::MakeInterface { dst, .. } => {
                let v = self.value_node(Some(cgn), f, dst);
                let obj = self.object_node(Some(cgn), f, dst);
                self.address_of(v, obj);
            }

            Instr::Load { dst, ptr } => {
                let d = self.value_node(Some(cgn), f, dst);
                let sz = self.sizeof(self.prog.value_type(f, dst));
                self.gen_load(Some(cgn), f, d, ptr, 0, sz);
            }

            Instr::Store { ptr, val } => {
                let v = self.value_node(Some(cgn), f, val);
                let sz = self.sizeof(self.prog.value_type(f, val));
                self.gen_store(Some(cgn), f, ptr, v, 0, sz);
            }

            Instr::Send { chan, x } => {
                let v = self.value_node(Some(cgn), f, x);
                let sz = self.sizeof(self.prog.value_type(f, x));
                self.gen_store(Some(cgn), f, chan, v, 0, sz);
            }

            Instr::Recv { dst, chan } => {
                // The received element sits at offset 0 of the result
                // even for the comma-ok form.
                let d = self.value_node(Some(cgn), f, dst);
                let elem = self
                    .prog
                    .types
                    .elem(self.prog.value_type(f, chan))
                    .expect("receive from non-channel");
                let sz = self.sizeof(elem);
                self.gen_load(Some(cgn), f, d, chan, 0, sz);
            }

            Instr::FieldAddr { dst, x, field } => {
                let ptr = self.value_node(Some(cgn), f, x);
                let st = self.prog.types.must_deref(self.prog.value_type(f, x));
                let off = self.offset_of(st, field);
                self.gen_offset_addr(cgn, f, dst, ptr, off);
            }

            Instr::IndexAddr { dst, x, .. } => {
                // Arrays are element-collapsed: all indices share the
                // node at offset 1, past the identity node.
                let ptr = self.value_node(Some(cgn), f, x);
                self.gen_offset_addr(cgn, f, dst, ptr, 1);
            }

            Instr::Field { dst, x, field } => {
                let d = self.value_node(Some(cgn), f, dst);
                let src = self.value_offset_node(Some(cgn), f, x, field);
                let sz = self.sizeof(self.prog.value_type(f, dst));
                self.copy(d, src, sz);
            }

            Instr::Index { dst, x, .. } => {
                let d = self.value_node(Some(cgn), f, dst);
                let src = self.value_node(Some(cgn), f, x).offset(1);
                let sz = self.sizeof(self.prog.value_type(f, dst));
                self.copy(d, src, sz);
            }

            Instr::Slice { dst, x } => {
                let d = self.value_node(Some(cgn), f, dst);
                let src = self.value_node(Some(cgn), f, x);
                self.copy(d, src, 1);
            }

            Instr::Extract { dst, tuple, index } => {
                let d = self.value_node(Some(cgn), f, dst);
                let src = self.value_offset_node(Some(cgn), f, tuple, index);
                let sz = self.sizeof(self.prog.value_type(f, dst));
                self.copy(d, src, sz);
            }

            Instr::Phi { dst, edges } => {
                let d = self.value_node(Some(cgn), f, dst);
                let sz = self.sizeof(self.prog.value_type(f, dst));
                for e in edges {
                    let src = self.value_node(Some(cgn), f, e);
                    self.copy(d, src, sz);
                }
            }

            Instr::Select { dst, values, .. } => {
                // The condition never carries pointers; either operand
                // may flow to the result.
                let d = self.value_node(Some(cgn), f, dst);
                let sz = self.sizeof(self.prog.value_type(f, dst));
                for v in values {
                    let src = self.value_node(Some(cgn), f, v);
                    self.copy(d, src, sz);
                }
            }

            Instr::ChangeType { dst, x } | Instr::ChangeInterface { dst, x } => {
                let d = self.value_node(Some(cgn), f, dst);
                let src = self.value_node(Some(cgn), f, x);
                self.copy(d, src, 1);
            }

            Instr::Convert { dst, x } => {
                self.gen_conv(cgn, f, dst, x, site)?;
            }

            Instr::TypeAssert { dst, x, ty } => {
                let d = self.value_node(Some(cgn), f, dst);
                let src = self.value_node(Some(cgn), f, x);
                self.type_assert_constraint(ty, d, src);
            }

            Instr::MakeClosure { dst, func, bindings } => {
                let d = self.value_node(Some(cgn), f, dst);
                let fv = self.func_value_node(func);
                self.copy(d, fv, 1);
                // Free variables are treated like global variables.
                let free_vars = self.prog.func(func).free_vars.clone();
                for (i, b) in bindings.iter().enumerate() {
                    let fv_node = self.value_node(None, func, free_vars[i]);
                    let b_node = self.value_node(Some(cgn), f, *b);
                    let sz = self.sizeof(self.prog.value_type(f, *b));
                    self.copy(fv_node, b_node, sz);
                }
            }

            Instr::Lookup { dst, map, key: _ } => {
                let mty = self.prog.value_type(f, map);
                if let (Some(k), Some(v)) = (self.prog.types.key(mty), self.prog.types.elem(mty)) {
                    // The comma-ok flag is at a nonzero offset and loads
                    // nothing.
                    let d = self.value_node(Some(cgn), f, dst);
                    let ksize = self.sizeof(k);
                    let vsize = self.sizeof(v);
                    self.gen_load(Some(cgn), f, d, map, ksize, vsize);
                }
            }

            Instr::MapUpdate { map, key, value } => {
                let mty = self.prog.value_type(f, map);
                let k = self.prog.types.key(mty).expect("update of non-map");
                let v = self.prog.types.elem(mty).expect("update of non-map");
                let ksize = self.sizeof(k);
                let vsize = self.sizeof(v);
                let kn = self.value_node(Some(cgn), f, key);
                let vn = self.value_node(Some(cgn), f, value);
                self.gen_store(Some(cgn), f, map, kn, 0, ksize);
                self.gen_store(Some(cgn), f, map, vn, ksize, vsize);
            }

            Instr::Next { dst, map } => {
                // Load the map's (k, v) into the tuple's (ok, k, v).
                let mty = self.prog.value_type(f, map);
                let k = self.prog.types.key(mty).expect("next of non-map");
                let v = self.prog.types.elem(mty).expect("next of non-map");
                let ksize = self.sizeof(k);
                let vsize = self.sizeof(v);
                let d = self.value_node(Some(cgn), f, dst);
                self.gen_load(Some(cgn), f, d.offset(1), map, 0, ksize + vsize);
            }

            Instr::Return { results } => {
                let obj = self.cgnodes[cgn.index()].obj;
                let mut out = self.func_results(obj);
                for r in results {
                    let src = self.value_node(Some(cgn), f, r);
                    let sz = self.sizeof(self.prog.value_type(f, r));
                    self.copy(out, src, sz);
                    out = out.offset(sz);
                }
            }

            Instr::Panic { x } => {
                let src = self.value_node(Some(cgn), f, x);
                let panic_node = self.panic_node;
                self.copy(panic_node, src, 1);
            }

            Instr::Call(call) => {
                self.gen_call(cgn, f, &call, site);
            }

            Instr::Jump { .. } | Instr::If { .. } => {
                // Control flow is irrelevant to a flow-insensitive
                // analysis.
            }
        }
        Ok(())
    }

    // ---------- calls ----------

    fn gen_call(&mut self, cgn: CgnId, f: FuncId, call: &Call, site: InstrRef) {
        if let Callee::Builtin(b) = &call.callee {
            self.gen_builtin_call(cgn, f, call, *b, site);
            return;
        }

        let result = match call.dst {
            Some(dst) => self.value_node(Some(cgn), f, dst),
            None => NodeId::ZERO,
        };

        let mut cs = CallSite {
            instr: Some(site),
            targets: NodeId::ZERO,
        };

        match &call.callee {
            Callee::Static(callee) => {
                self.gen_static_call(cgn, f, &mut cs, call, *callee, result, site);
            }
            Callee::Invoke { value, method } => {
                if self.prog.value_type(f, *value) == self.prog.types.reflect_type() {
                    self.gen_invoke_reflect_type(cgn, f, &mut cs, call, *value, method.clone(), result, site);
                } else {
                    self.gen_invoke(cgn, f, &mut cs, call, *value, method.clone(), result);
                }
            }
            Callee::Dynamic(fv) => {
                self.gen_dynamic_call(cgn, f, &mut cs, call, *fv, result);
            }
            Callee::Builtin(_) => unreachable!(),
        }

        debug!("call at {} targets {}", site, cs.targets);
        self.cgnodes[cgn.index()].sites.push(cs);
    }

    /// Context-sensitivity policy: clone per callsite for intrinsics,
    /// synthetic wrappers, and short call-free single-block functions.
    pub(crate) fn should_use_context(&mut self, func: FuncId) -> bool {
        let qname = self.prog.func(func).qualified_name();
        if crate::intrinsics::find_intrinsic(&qname).is_some() {
            return true; // treat intrinsics context-sensitively
        }
        let f = self.prog.func(func);
        if f.blocks.len() != 1 {
            return false; // too expensive
        }
        let blk = &f.blocks[0];
        if blk.instrs.len() > 10 {
            return false; // too expensive
        }
        if f.synthetic && f.name != "init" {
            return true; // treat synthetic wrappers context-sensitively
        }
        for instr in &blk.instrs {
            if let Instr::Call(call) = instr {
                // Disallow function calls (except to built-ins) because
                // of the danger of unbounded recursion.
                if !matches!(call.callee, Callee::Builtin(_)) {
                    return false;
                }
            }
        }
        true
    }

    fn gen_static_call(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        cs: &mut CallSite,
        call: &Call,
        callee: FuncId,
        result: NodeId,
        site: InstrRef,
    ) {
        // Ascertain the contour for this call.
        let obj = if self.should_use_context(callee) {
            self.make_function_object(callee, Some(site))
        } else {
            self.shared_contour(callee)
        };

        let sig_ty = self.prog.func(callee).sig;
        let targets = self.add_one_node(sig_ty, "call.targets", None);
        self.address_of(targets, obj); // (a singleton)

        let sig = self.prog.types.signature(sig_ty).clone();
        let mut params = self.func_params(obj);
        let mut args = call.args.as_slice();

        // Copy receiver, if any.
        if let Some(recv) = sig.recv {
            let sz = self.sizeof(recv);
            let a0 = self.value_node(Some(cgn), f, args[0]);
            self.copy(params, a0, sz);
            params = params.offset(sz);
            args = &args[1..];
        }

        // Copy actual parameters into the formal params block. The
        // actuals aren't contiguous, so loop.
        for (i, &arg) in args.iter().enumerate() {
            let sz = self.sizeof(sig.params[i]);
            let an = self.value_node(Some(cgn), f, arg);
            self.copy(params, an, sz);
            params = params.offset(sz);
        }

        // Copy the formal results block to the actual result.
        if !result.is_zero() {
            let (_, _, rsize) = self.sig_sizes(sig_ty);
            let out = self.func_results(obj);
            self.copy(result, out, rsize);
        }

        // pts(targets) is the (singleton) set of call targets.
        cs.targets = targets;
    }

    fn gen_dynamic_call(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        cs: &mut CallSite,
        call: &Call,
        fv: ValueId,
        result: NodeId,
    ) {
        // Store arguments into, and load results from, the P/R block of
        // each function discovered in pts(fv).
        let sig = self.prog.types.signature(call.sig).clone();
        let fv_node = self.value_node(Some(cgn), f, fv);

        let mut offset = 1u32; // P/R block starts at offset 1
        for (i, &arg) in call.args.iter().enumerate() {
            let sz = self.sizeof(sig.params[i]);
            let an = self.value_node(Some(cgn), f, arg);
            self.gen_store(Some(cgn), f, fv, an, offset, sz);
            offset += sz;
        }
        if !result.is_zero() {
            let rsize: u32 = sig.results.iter().map(|r| self.sizeof(*r)).sum();
            self.gen_load(Some(cgn), f, result, fv, offset, rsize);
        }

        cs.targets = fv_node;
    }

    #[allow(clippy::too_many_arguments)]
    fn gen_invoke(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        cs: &mut CallSite,
        call: &Call,
        value: ValueId,
        method: String,
        result: NodeId,
    ) {
        let sig = self.prog.types.signature(call.sig).clone();

        // Allocate a contiguous targets/params/results block for this
        // call site.
        let block = self.next_node();
        cs.targets = self.add_one_node(call.sig, "invoke.targets", None);
        let p = self.next_node();
        for pt in &sig.params {
            self.add_nodes(*pt, "invoke.params");
        }
        let r = self.next_node();
        for rt in &sig.results {
            self.add_nodes(*rt, "invoke.results");
        }

        // Copy the actual parameters into the call's params block.
        let mut pp = p;
        for (i, &arg) in call.args.iter().enumerate() {
            let sz = self.sizeof(sig.params[i]);
            let an = self.value_node(Some(cgn), f, arg);
            self.copy(pp, an, sz);
            pp = pp.offset(sz);
        }
        // Copy the call's results block to the actual results.
        if !result.is_zero() {
            let rsize: u32 = sig.results.iter().map(|rt| self.sizeof(*rt)).sum();
            self.copy(result, r, rsize);
        }

        // The invoke constraint wires the P/R block to each discovered
        // concrete method's contour during solving.
        let iface = self.value_node(Some(cgn), f, value);
        self.add_constraint(Constraint::Invoke {
            method,
            iface,
            block,
        });
    }

    /// Specialization of invoke for `reflect.Type` receivers, which have
    /// exactly one implementation: `*reflect.rtype`. In effect `rt.F()`
    /// becomes `rt.(*rtype).F()` plus a static call.
    #[allow(clippy::too_many_arguments)]
    fn gen_invoke_reflect_type(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        cs: &mut CallSite,
        call: &Call,
        value: ValueId,
        method: String,
        result: NodeId,
        site: InstrRef,
    ) {
        // Unpack the receiver into an rtype pointer.
        let rtype_ptr = self.prog.types.rtype_ptr();
        let rtype_recv = self.add_one_node(rtype_ptr, "rtype.recv", None);
        let recv = self.value_node(Some(cgn), f, value);
        self.type_assert_constraint(rtype_ptr, rtype_recv, recv);

        // Look up the concrete method.
        let m = match self.prog.types.lookup_method(rtype_ptr, &method) {
            Some(m) => m.func,
            None => {
                self.warnf(
                    Some(site),
                    format!("unsound: unmodeled reflect.Type method {}", method),
                );
                return;
            }
        };

        let obj = self.make_function_object(m, Some(site)); // new contour

        let sig_ty = self.prog.func(m).sig;
        let targets = self.add_one_node(sig_ty, "call.targets", None);
        self.address_of(targets, obj); // (a singleton)
        cs.targets = targets;

        // From here on it is essentially a static call.
        let sig = self.prog.types.signature(sig_ty).clone();
        let mut params = self.func_params(obj);
        self.copy(params, rtype_recv, 1);
        params = params.offset(1);

        for (i, &arg) in call.args.iter().enumerate() {
            let sz = self.sizeof(sig.params[i]);
            let an = self.value_node(Some(cgn), f, arg);
            self.copy(params, an, sz);
            params = params.offset(sz);
        }

        if !result.is_zero() {
            let (_, _, rsize) = self.sig_sizes(sig_ty);
            let out = self.func_results(obj);
            self.copy(result, out, rsize);
        }
    }

    // ---------- builtins ----------

    fn gen_builtin_call(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        call: &Call,
        builtin: Builtin,
        site: InstrRef,
    ) {
        match builtin {
            Builtin::Append => self.gen_append(cgn, f, call, site),

            Builtin::Copy => {
                let elem = self
                    .prog
                    .types
                    .elem(self.prog.value_type(f, call.args[0]))
                    .expect("copy of non-slice");
                self.copy_elems(cgn, f, elem, call.args[0], call.args[1]);
            }

            Builtin::Recover => {
                if let Some(dst) = call.dst {
                    let d = self.value_node(Some(cgn), f, dst);
                    let panic_node = self.panic_node;
                    self.copy(d, panic_node, 1);
                }
            }

            Builtin::Print | Builtin::Println => {
                // Analytically a no-op, but a convenient hook for
                // observing the pts of an expression; notify the client.
                if self.config.print_hook.is_none() || call.args.is_empty() {
                    return;
                }
                let arg = call.args[0];
                let t = self.prog.value_type(f, arg);

                // Context-sensitivity can visit the same call many
                // times; merge them into one canonical probe per site.
                let probe = match self.probes.get(&site) {
                    Some(&probe) => probe,
                    None => {
                        let probe = self.add_nodes(t, "print");
                        self.probes.insert(site, probe);
                        let mut hook = self.config.print_hook.take().unwrap();
                        hook(site, probe);
                        self.config.print_hook = Some(hook);
                        probe
                    }
                };

                let an = self.value_node(Some(cgn), f, arg);
                let sz = self.sizeof(t);
                self.copy(probe, an, sz);
            }

            // No-ops: close len cap real imag complex delete.
            Builtin::Len
            | Builtin::Cap
            | Builtin::Close
            | Builtin::Delete
            | Builtin::Real
            | Builtin::Imag
            | Builtin::Complex => {}
        }
    }

    /// Constraints for `z = append(x, y)`:
    /// `z = x; *z = *y; z = &w` for a fresh backing array `w`.
    fn gen_append(&mut self, cgn: CgnId, f: FuncId, call: &Call, site: InstrRef) {
        let Some(z) = call.dst else { return };
        let x = call.args[0];

        let zn = self.value_node(Some(cgn), f, z);
        let xn = self.value_node(Some(cgn), f, x);
        self.copy(zn, xn, 1); // z = x

        if call.args.len() == 1 {
            return; // no allocation for z = append(x)
        }

        let y = call.args[1];
        let t_array = self.prog.types.slice_to_array(self.prog.value_type(f, x));
        let elem = self.prog.types.elem(t_array).unwrap();

        let w = self.next_node();
        self.add_nodes(t_array, "append");
        self.end_object(w, Some(cgn), ObjData::Site(site));

        self.copy_elems(cgn, f, elem, z, y); // *z = *y
        self.address_of(zn, w); //  z = &w
    }

    /// Load/store constraints for `*dst = *src` over slice payloads; the
    /// element block starts at offset 1, past the array identity node.
    fn copy_elems(&mut self, cgn: CgnId, f: FuncId, elem: TypeId, dst: ValueId, src: ValueId) {
        let tmp = self.add_nodes(elem, "copy");
        let sz = self.sizeof(elem);
        self.gen_load(Some(cgn), f, tmp, src, 1, sz);
        self.gen_store(Some(cgn), f, dst, tmp, 1, sz);
    }

    // ---------- conversions ----------

    fn gen_conv(
        &mut self,
        cgn: CgnId,
        f: FuncId,
        dst: ValueId,
        x: ValueId,
        site: InstrRef,
    ) -> Result<(), AnalysisError> {
        let res = self.value_node(Some(cgn), f, dst);
        if res.is_zero() {
            return Ok(()); // result is non-pointerlike
        }

        let t_src = self.prog.value_type(f, x);
        let t_dst = self.prog.value_type(f, dst);
        let u_src = self.prog.types.underlying(t_src);
        let u_dst = self.prog.types.underlying(t_dst);

        match (
            self.prog.types.kind(u_src).clone(),
            self.prog.types.kind(u_dst).clone(),
        ) {
            // []byte/[]rune -> string: the result is not pointerlike.
            (TypeKind::Slice(_), _) => Ok(()),

            // *T -> unsafe.Pointer: lose the pointer.
            (TypeKind::Pointer(_), TypeKind::UnsafePointer) => Ok(()),

            // unsafe.Pointer -> *T: treated like new(T), an unaliased
            // object, and reported unless the package is allow-listed.
            (TypeKind::UnsafePointer, TypeKind::Pointer(pointee)) => {
                if self.prog.func(f).pkg != "syscall" {
                    let to = self.prog.types.type_string(t_dst);
                    let func = self.prog.func(f).qualified_name();
                    self.warnf(
                        Some(site),
                        format!(
                            "unsound: {} contains an unsafe.Pointer conversion (to {})",
                            func, to
                        ),
                    );
                }
                let obj = self.next_node();
                self.add_nodes(pointee, "unsafe.Pointer conversion");
                self.end_object(obj, Some(cgn), ObjData::Site(site));
                self.address_of(res, obj);
                Ok(())
            }

            // string -> []byte/[]rune: a fresh backing array.
            (TypeKind::String, TypeKind::Slice(_)) => {
                let arr = self.prog.types.slice_to_array(u_dst);
                let obj = self.next_node();
                self.add_nodes(arr, "convert");
                self.end_object(obj, Some(cgn), ObjData::Site(site));
                self.address_of(res, obj);
                Ok(())
            }

            // Basic-to-basic conversions never move pointers.
            (
                TypeKind::Bool
                | TypeKind::Int
                | TypeKind::Float
                | TypeKind::String
                | TypeKind::UnsafePointer,
                TypeKind::Bool
                | TypeKind::Int
                | TypeKind::Float
                | TypeKind::String
                | TypeKind::UnsafePointer,
            ) => Ok(()),

            (from, to) => Err(AnalysisError::UnsupportedConversion {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
                func: self.prog.func(f).qualified_name(),
            }),
        }
    }
}
