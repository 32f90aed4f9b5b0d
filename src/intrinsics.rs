//! The intrinsic library: hand-written constraint generators substituted
//! for the bodies of recognized standard-library functions, chiefly the
//! reflection API.
//!
//! The registry is a process-wide read-only table keyed by fully
//! qualified name, set up once; clients cannot extend it. Each intrinsic
//! either emits a specialized [`ReflectConstraint`] whose propagation
//! rule lives in [`solve_reflect`], or is a (possibly warning) no-op.
//!
//! Reflection works over the tagged-object representation: a
//! `reflect.Value` holds tagged objects exactly like an interface, and a
//! `reflect.Type` holds the canonical `*rtype` tagged object of the type
//! it describes ([`Analysis::make_rtype`]). Intrinsics memoize where
//! safe; `Zero` deliberately does not (see DESIGN.md).

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::analysis::{Analysis, CgnId};
use crate::constraint::Constraint;
use crate::node::{NodeId, ObjData};
use crate::nodeset::NodeSet;
use crate::ssa::ConstKind;
use crate::types::{ChanDir, Signature, TypeKind};

/// A hand-written constraint generator standing in for a function body.
pub(crate) type Intrinsic = fn(&mut Analysis, CgnId);

/// Looks up the intrinsic for a fully qualified function name.
pub(crate) fn find_intrinsic(qualified_name: &str) -> Option<Intrinsic> {
    INTRINSICS.get(qualified_name).copied()
}

static INTRINSICS: Lazy<HashMap<&'static str, Intrinsic>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Intrinsic> = HashMap::new();

    // Standalone reflect functions.
    m.insert("reflect.TypeOf", ext_reflect_type_of);
    m.insert("reflect.ValueOf", ext_reflect_value_of);
    m.insert("reflect.Zero", ext_reflect_zero);
    m.insert("reflect.Indirect", ext_reflect_indirect);
    m.insert("reflect.New", ext_reflect_new);
    m.insert("reflect.NewAt", ext_reflect_new_at);
    m.insert("reflect.MakeChan", ext_reflect_make_chan);
    m.insert("reflect.MakeMap", ext_reflect_make_map);
    m.insert("reflect.ChanOf", ext_reflect_chan_of);

    // Not yet modeled; calls are unsound and reported.
    m.insert("reflect.MakeFunc", ext_warn_unsound);
    m.insert("reflect.Select", ext_warn_unsound);
    m.insert("(reflect.Value).Call", ext_warn_unsound);
    m.insert("(reflect.Value).CallSlice", ext_warn_unsound);
    m.insert("(reflect.Value).Method", ext_warn_unsound);
    m.insert("(reflect.Value).MethodByName", ext_warn_unsound);

    // Harmless no-ops.
    m.insert("reflect.Append", ext_no_op);
    m.insert("reflect.AppendSlice", ext_no_op);
    m.insert("reflect.Copy", ext_no_op);
    m.insert("reflect.MakeSlice", ext_no_op);
    m.insert("reflect.MapOf", ext_no_op);
    m.insert("reflect.PtrTo", ext_no_op);
    m.insert("reflect.SliceOf", ext_no_op);
    m.insert("(reflect.Value).Addr", ext_no_op);
    m.insert("(reflect.Value).Bytes", ext_no_op);
    m.insert("(reflect.Value).Elem", ext_no_op);
    m.insert("(reflect.Value).Field", ext_no_op);
    m.insert("(reflect.Value).Index", ext_no_op);
    m.insert("(reflect.Value).Set", ext_no_op);
    m.insert("(reflect.Value).SetBytes", ext_no_op);
    m.insert("(reflect.Value).SetPointer", ext_no_op);
    m.insert("(reflect.Value).Slice", ext_no_op);
    m.insert("(*reflect.rtype).Field", ext_no_op);
    m.insert("(*reflect.rtype).FieldByName", ext_no_op);

    // reflect.Value methods.
    m.insert("(reflect.Value).Interface", ext_value_interface);
    m.insert("(reflect.Value).MapIndex", ext_value_map_index);
    m.insert("(reflect.Value).MapKeys", ext_value_map_keys);
    m.insert("(reflect.Value).Recv", ext_value_recv);
    m.insert("(reflect.Value).Send", ext_value_send);
    m.insert("(reflect.Value).SetMapIndex", ext_value_set_map_index);

    // *rtype methods.
    m.insert("(*reflect.rtype).Elem", ext_rtype_elem);
    m.insert("(*reflect.rtype).Key", ext_rtype_key);
    m.insert("(*reflect.rtype).In", ext_rtype_in);
    m.insert("(*reflect.rtype).Out", ext_rtype_out);
    m.insert("(*reflect.rtype).Method", ext_rtype_method);
    m.insert("(*reflect.rtype).MethodByName", ext_rtype_method_by_name);

    m
});

/// A reflection constraint; each variant carries its own `solve` rule in
/// [`solve_reflect`].
#[derive(Debug, Clone)]
pub enum ReflectConstraint {
    /// `result = TypeOf(i)`.
    TypeOf { i: NodeId, result: NodeId },
    /// `result = v.Interface()`.
    VInterface { v: NodeId, result: NodeId },
    /// `result = v.MapIndex(_)`.
    VMapIndex {
        cgn: CgnId,
        v: NodeId,
        result: NodeId,
    },
    /// `result = v.MapKeys()`.
    VMapKeys {
        cgn: CgnId,
        v: NodeId,
        result: NodeId,
    },
    /// `result, _ = v.Recv()`.
    VRecv {
        cgn: CgnId,
        v: NodeId,
        result: NodeId,
    },
    /// `v.Send(x)`.
    VSend { cgn: CgnId, v: NodeId, x: NodeId },
    /// `v.SetMapIndex(key, val)`.
    VSetMapIndex {
        cgn: CgnId,
        v: NodeId,
        key: NodeId,
        val: NodeId,
    },
    /// `result = ChanOf(dir, t)`.
    ChanOf {
        t: NodeId,
        result: NodeId,
        dirs: Vec<ChanDir>,
    },
    /// `result = Indirect(v)`.
    Indirect {
        cgn: CgnId,
        v: NodeId,
        result: NodeId,
    },
    /// `result = MakeChan(typ)`.
    MakeChan {
        cgn: CgnId,
        typ: NodeId,
        result: NodeId,
    },
    /// `result = MakeMap(typ)`.
    MakeMap {
        cgn: CgnId,
        typ: NodeId,
        result: NodeId,
    },
    /// `result = New(typ)`.
    New {
        cgn: CgnId,
        typ: NodeId,
        result: NodeId,
    },
    /// `result = Zero(typ)`.
    Zero {
        cgn: CgnId,
        typ: NodeId,
        result: NodeId,
    },
    /// `result = t.Elem()`.
    RtypeElem { t: NodeId, result: NodeId },
    /// `result = t.Key()`.
    RtypeKey { t: NodeId, result: NodeId },
    /// `result = t.In(_)` / `t.Out(_)`.
    RtypeInOut {
        t: NodeId,
        result: NodeId,
        out: bool,
    },
    /// `result = t.Method(_)` / `t.MethodByName(name)`.
    RtypeMethod {
        name: Option<String>,
        t: NodeId,
        result: NodeId,
    },
}

impl ReflectConstraint {
    /// The node whose deltas trigger this constraint.
    pub fn ptr(&self) -> NodeId {
        match self {
            ReflectConstraint::TypeOf { i, .. } => *i,
            ReflectConstraint::VInterface { v, .. }
            | ReflectConstraint::VMapIndex { v, .. }
            | ReflectConstraint::VMapKeys { v, .. }
            | ReflectConstraint::VRecv { v, .. }
            | ReflectConstraint::VSend { v, .. }
            | ReflectConstraint::VSetMapIndex { v, .. }
            | ReflectConstraint::Indirect { v, .. } => *v,
            ReflectConstraint::ChanOf { t, .. }
            | ReflectConstraint::RtypeElem { t, .. }
            | ReflectConstraint::RtypeKey { t, .. }
            | ReflectConstraint::RtypeInOut { t, .. }
            | ReflectConstraint::RtypeMethod { t, .. } => *t,
            ReflectConstraint::MakeChan { typ, .. }
            | ReflectConstraint::MakeMap { typ, .. }
            | ReflectConstraint::New { typ, .. }
            | ReflectConstraint::Zero { typ, .. } => *typ,
        }
    }
}

impl fmt::Display for ReflectConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ReflectConstraint::*;
        match self {
            TypeOf { i, result } => write!(f, "{} = reflect.TypeOf({})", result, i),
            VInterface { v, result } => write!(f, "{} = reflect {}.Interface()", result, v),
            VMapIndex { v, result, .. } => write!(f, "{} = reflect {}.MapIndex(_)", result, v),
            VMapKeys { v, result, .. } => write!(f, "{} = reflect {}.MapKeys()", result, v),
            VRecv { v, result, .. } => write!(f, "{} = reflect {}.Recv()", result, v),
            VSend { v, x, .. } => write!(f, "reflect {}.Send({})", v, x),
            VSetMapIndex { v, key, val, .. } => {
                write!(f, "reflect {}.SetMapIndex({}, {})", v, key, val)
            }
            ChanOf { t, result, .. } => write!(f, "{} = reflect.ChanOf({})", result, t),
            Indirect { v, result, .. } => write!(f, "{} = reflect.Indirect({})", result, v),
            MakeChan { typ, result, .. } => write!(f, "{} = reflect.MakeChan({})", result, typ),
            MakeMap { typ, result, .. } => write!(f, "{} = reflect.MakeMap({})", result, typ),
            New { typ, result, .. } => write!(f, "{} = reflect.New({})", result, typ),
            Zero { typ, result, .. } => write!(f, "{} = reflect.Zero({})", result, typ),
            RtypeElem { t, result } => write!(f, "{} = (*rtype).Elem({})", result, t),
            RtypeKey { t, result } => write!(f, "{} = (*rtype).Key({})", result, t),
            RtypeInOut { t, result, out } => {
                write!(f, "{} = (*rtype).{}({})", result, if *out { "Out" } else { "In" }, t)
            }
            RtypeMethod { name, t, result } => match name {
                Some(n) => write!(f, "{} = (*rtype).MethodByName({}, {:?})", result, t, n),
                None => write!(f, "{} = (*rtype).Method({}, _)", result, t),
            },
        }
    }
}

// ---------- intrinsic generators ----------

fn params_and_results(a: &mut Analysis, cgn: CgnId) -> (NodeId, NodeId) {
    let obj = a.cgnodes[cgn.index()].obj;
    (a.func_params(obj), a.func_results(obj))
}

fn ext_no_op(_a: &mut Analysis, _cgn: CgnId) {}

fn ext_warn_unsound(a: &mut Analysis, cgn: CgnId) {
    let f = a.cgnodes[cgn.index()].func;
    let name = a.prog.func(f).qualified_name();
    let site = a.cgnodes[cgn.index()].callersite;
    a.warnf(site, format!("unsound: call to unmodeled intrinsic {}", name));
}

fn ext_reflect_type_of(a: &mut Analysis, cgn: CgnId) {
    let (i, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::TypeOf { i, result }));
}

fn ext_reflect_value_of(a: &mut Analysis, cgn: CgnId) {
    let (params, results) = params_and_results(a, cgn);
    // A Value holds tagged objects just like an interface does.
    a.copy(results, params, 1);
}

fn ext_reflect_zero(a: &mut Analysis, cgn: CgnId) {
    let (typ, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::Zero {
        cgn,
        typ,
        result,
    }));
}

fn ext_reflect_indirect(a: &mut Analysis, cgn: CgnId) {
    let (v, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::Indirect {
        cgn,
        v,
        result,
    }));
}

fn ext_reflect_new(a: &mut Analysis, cgn: CgnId) {
    let (typ, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::New {
        cgn,
        typ,
        result,
    }));
}

fn ext_reflect_new_at(a: &mut Analysis, cgn: CgnId) {
    ext_reflect_new(a, cgn);
    let site = a.cgnodes[cgn.index()].callersite;
    a.warnf(site, "unsound: call to reflect.NewAt".to_string());
}

fn ext_reflect_make_chan(a: &mut Analysis, cgn: CgnId) {
    let (typ, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::MakeChan {
        cgn,
        typ,
        result,
    }));
}

fn ext_reflect_make_map(a: &mut Analysis, cgn: CgnId) {
    let (typ, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::MakeMap {
        cgn,
        typ,
        result,
    }));
}

fn ext_reflect_chan_of(a: &mut Analysis, cgn: CgnId) {
    let (params, result) = params_and_results(a, cgn);

    // If the direction argument is a constant at the callsite (as is
    // usual), generate only the requested direction.
    let dirs = match a.cgnodes[cgn.index()]
        .callersite
        .and_then(|site| a.callsite_const_arg(site, 0))
    {
        Some(ConstKind::Int(1)) => vec![ChanDir::Recv],
        Some(ConstKind::Int(2)) => vec![ChanDir::Send],
        Some(ConstKind::Int(3)) => vec![ChanDir::Both],
        _ => vec![ChanDir::Recv, ChanDir::Send, ChanDir::Both],
    };

    a.add_constraint(Constraint::Reflect(ReflectConstraint::ChanOf {
        t: params.offset(1),
        result,
        dirs,
    }));
}

fn ext_value_interface(a: &mut Analysis, cgn: CgnId) {
    let (v, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::VInterface {
        v,
        result,
    }));
}

fn ext_value_map_index(a: &mut Analysis, cgn: CgnId) {
    let (v, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::VMapIndex {
        cgn,
        v,
        result,
    }));
}

fn ext_value_map_keys(a: &mut Analysis, cgn: CgnId) {
    // Allocate an array for the result.
    let rv = a.prog.types.reflect_value();
    let arr = a.prog.types.array_of(rv);
    let obj = a.next_node();
    a.add_nodes(arr, "reflect.MapKeys result");
    a.end_object(obj, Some(cgn), ObjData::None);
    let (v, results) = params_and_results(a, cgn);
    a.address_of(results, obj);

    a.add_constraint(Constraint::Reflect(ReflectConstraint::VMapKeys {
        cgn,
        v,
        result: obj.offset(1), // keys land in the array elements
    }));
}

fn ext_value_recv(a: &mut Analysis, cgn: CgnId) {
    let (v, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::VRecv {
        cgn,
        v,
        result,
    }));
}

fn ext_value_send(a: &mut Analysis, cgn: CgnId) {
    let (params, _) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::VSend {
        cgn,
        v: params,
        x: params.offset(1),
    }));
}

fn ext_value_set_map_index(a: &mut Analysis, cgn: CgnId) {
    let (params, _) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::VSetMapIndex {
        cgn,
        v: params,
        key: params.offset(1),
        val: params.offset(2),
    }));
}

fn ext_rtype_elem(a: &mut Analysis, cgn: CgnId) {
    let (t, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::RtypeElem {
        t,
        result,
    }));
}

fn ext_rtype_key(a: &mut Analysis, cgn: CgnId) {
    let (t, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::RtypeKey {
        t,
        result,
    }));
}

fn ext_rtype_in(a: &mut Analysis, cgn: CgnId) {
    let (t, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::RtypeInOut {
        t,
        result,
        out: false,
    }));
}

fn ext_rtype_out(a: &mut Analysis, cgn: CgnId) {
    let (t, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::RtypeInOut {
        t,
        result,
        out: true,
    }));
}

fn ext_rtype_method(a: &mut Analysis, cgn: CgnId) {
    // No-one calls Method with a constant argument, so the constant case
    // is not specialized.
    let (t, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::RtypeMethod {
        name: None,
        t,
        result,
    }));
}

fn ext_rtype_method_by_name(a: &mut Analysis, cgn: CgnId) {
    // If the name argument is a string constant, return only that
    // method.
    let name = match a.cgnodes[cgn.index()]
        .callersite
        .and_then(|site| a.callsite_const_arg(site, 0))
    {
        Some(ConstKind::Str(s)) => Some(s),
        _ => None,
    };
    let (t, result) = params_and_results(a, cgn);
    a.add_constraint(Constraint::Reflect(ReflectConstraint::RtypeMethod {
        name,
        t,
        result,
    }));
}

// ---------- propagation rules ----------

/// Applies `c` to the labels in `delta`.
pub(crate) fn solve_reflect(a: &mut Analysis, c: &ReflectConstraint, delta: &NodeSet) {
    match c {
        ReflectConstraint::TypeOf { result, .. } => {
            let mut changed = false;
            for i_obj in delta.iter() {
                let (t_dyn, _, _) = a
                    .nodes
                    .tagged_value(i_obj)
                    .unwrap_or_else(|| panic!("not a tagged object: {}", i_obj));
                let rt = a.make_rtype(t_dyn);
                changed |= a.add_label(*result, rt);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::VInterface { result, .. } => {
            let mut changed = false;
            for v_obj in delta.iter() {
                let (_, _, indirect) = a
                    .nodes
                    .tagged_value(v_obj)
                    .unwrap_or_else(|| panic!("not a tagged object: {}", v_obj));
                assert!(!indirect, "indirect tagged object");
                changed |= a.add_label(*result, v_obj);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::VMapIndex { cgn, result, .. } => {
            let mut changed = false;
            for v_obj in delta.iter() {
                let Some((t_dyn, m, indirect)) = a.nodes.tagged_value(v_obj) else {
                    continue;
                };
                let (Some(key), Some(val)) = (a.prog.types.key(t_dyn), a.prog.types.elem(t_dyn))
                else {
                    continue; // not a map
                };
                assert!(!indirect, "indirect tagged object");

                let obj = a.make_tagged(val, Some(*cgn), ObjData::None);
                let ksize = a.sizeof(key);
                let vsize = a.sizeof(val);
                a.load(obj.offset(1), m, ksize, vsize);
                changed |= a.add_label(*result, obj);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::VMapKeys { cgn, result, .. } => {
            let mut changed = false;
            for v_obj in delta.iter() {
                let Some((t_dyn, m, indirect)) = a.nodes.tagged_value(v_obj) else {
                    continue;
                };
                let Some(key) = a.prog.types.key(t_dyn) else {
                    continue; // not a map
                };
                assert!(!indirect, "indirect tagged object");

                let k_obj = a.make_tagged(key, Some(*cgn), ObjData::None);
                let ksize = a.sizeof(key);
                a.load(k_obj.offset(1), m, 0, ksize);
                changed |= a.add_label(*result, k_obj);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::VRecv { cgn, result, .. } => {
            let mut changed = false;
            for v_obj in delta.iter() {
                let Some((t_dyn, ch, indirect)) = a.nodes.tagged_value(v_obj) else {
                    continue;
                };
                let under = a.prog.types.underlying(t_dyn);
                if !matches!(a.prog.types.kind(under), TypeKind::Chan(..)) {
                    continue; // not a channel
                }
                assert!(!indirect, "indirect tagged object");

                let elem = a.prog.types.elem(t_dyn).unwrap();
                let elem_obj = a.make_tagged(elem, Some(*cgn), ObjData::None);
                let sz = a.sizeof(elem);
                a.load(elem_obj.offset(1), ch, 0, sz);
                changed |= a.add_label(*result, elem_obj);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::VSend { x, .. } => {
            for v_obj in delta.iter() {
                let Some((t_dyn, ch, indirect)) = a.nodes.tagged_value(v_obj) else {
                    continue;
                };
                let under = a.prog.types.underlying(t_dyn);
                if !matches!(a.prog.types.kind(under), TypeKind::Chan(..)) {
                    continue; // not a channel
                }
                assert!(!indirect, "indirect tagged object");

                // Extract x's payload to a temporary, then store it to
                // the channel.
                let elem = a.prog.types.elem(t_dyn).unwrap();
                let xtmp = a.add_nodes(elem, "Send.xtmp");
                a.type_assert_constraint(elem, xtmp, *x);
                let sz = a.sizeof(elem);
                a.store(ch, xtmp, 0, sz);
            }
        }

        ReflectConstraint::VSetMapIndex { key, val, .. } => {
            for v_obj in delta.iter() {
                let Some((t_dyn, m, indirect)) = a.nodes.tagged_value(v_obj) else {
                    continue;
                };
                let (Some(kt), Some(vt)) = (a.prog.types.key(t_dyn), a.prog.types.elem(t_dyn))
                else {
                    continue; // not a map
                };
                assert!(!indirect, "indirect tagged object");

                let ksize = a.sizeof(kt);
                let vsize = a.sizeof(vt);

                let keytmp = a.add_nodes(kt, "SetMapIndex.keytmp");
                a.type_assert_constraint(kt, keytmp, *key);
                a.store(m, keytmp, 0, ksize);

                let valtmp = a.add_nodes(vt, "SetMapIndex.valtmp");
                a.type_assert_constraint(vt, valtmp, *val);
                a.store(m, valtmp, ksize, vsize);
            }
        }

        ReflectConstraint::ChanOf { result, dirs, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = a.rtype_tagged_value(t_obj);
                for dir in dirs {
                    let ct = a.prog.types.chan_of(*dir, t);
                    let rt = a.make_rtype(ct);
                    changed |= a.add_label(*result, rt);
                }
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::Indirect { cgn, result, .. } => {
            let mut changed = false;
            for v_obj in delta.iter() {
                let (t_dyn, _, _) = a
                    .nodes
                    .tagged_value(v_obj)
                    .unwrap_or_else(|| panic!("not a tagged object: {}", v_obj));

                let under = a.prog.types.underlying(t_dyn);
                let res = if let TypeKind::Pointer(elem) = *a.prog.types.kind(under) {
                    // Load the pointer's payload into a new tagged
                    // object of the pointee type.
                    let res = a.make_tagged(elem, Some(*cgn), ObjData::None);
                    let sz = a.sizeof(elem);
                    a.load(res.offset(1), v_obj.offset(1), 0, sz);
                    res
                } else {
                    v_obj
                };
                changed |= a.add_label(*result, res);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::MakeChan { cgn, result, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = a.rtype_tagged_value(t_obj);
                let under = a.prog.types.underlying(t);
                let elem = match *a.prog.types.kind(under) {
                    TypeKind::Chan(ChanDir::Both, elem) => elem,
                    _ => continue, // not a bidirectional channel type
                };

                let obj = a.next_node();
                a.add_nodes(elem, "reflect.MakeChan.value");
                a.end_object(obj, Some(*cgn), ObjData::None);

                // Wrap its address in a new T-tagged object and flow
                // that to the result.
                let id = a.make_tagged(t, Some(*cgn), ObjData::None);
                a.add_label(id.offset(1), obj);
                changed |= a.add_label(*result, id);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::MakeMap { cgn, result, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = a.rtype_tagged_value(t_obj);
                let (Some(key), Some(val)) = (a.prog.types.key(t), a.prog.types.elem(t)) else {
                    continue; // not a map type
                };

                let map_obj = a.next_node();
                a.add_nodes(key, "reflect.MakeMap.key");
                a.add_nodes(val, "reflect.MakeMap.value");
                a.end_object(map_obj, Some(*cgn), ObjData::None);

                let id = a.make_tagged(t, Some(*cgn), ObjData::None);
                a.add_label(id.offset(1), map_obj);
                changed |= a.add_label(*result, id);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::New { cgn, result, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = a.rtype_tagged_value(t_obj);

                // Allocate a new T object.
                let new_obj = a.next_node();
                a.add_nodes(t, "reflect.New");
                a.end_object(new_obj, Some(*cgn), ObjData::None);

                // Put its address in a new *T-tagged object and flow the
                // pointer to the result.
                let ptr = a.prog.types.pointer_to(t);
                let id = a.make_tagged(ptr, Some(*cgn), ObjData::None);
                a.add_label(id.offset(1), new_obj);
                changed |= a.add_label(*result, id);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::Zero { cgn, result, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = a.rtype_tagged_value(t_obj);

                // The memo is recorded but never consulted: every
                // application mints a fresh tagged object.
                let id = a.make_tagged(t, Some(*cgn), ObjData::None);
                a.reflect_zeros.insert(t, id);
                changed |= a.add_label(*result, id);
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::RtypeElem { result, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = rtype_obj_type(a, t_obj);
                if let Some(elem) = a.prog.types.elem(t) {
                    let rt = a.make_rtype(elem);
                    changed |= a.add_label(*result, rt);
                }
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::RtypeKey { result, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = rtype_obj_type(a, t_obj);
                if let Some(key) = a.prog.types.key(t) {
                    let rt = a.make_rtype(key);
                    changed |= a.add_label(*result, rt);
                }
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::RtypeInOut { result, out, .. } => {
            let mut changed = false;
            for t_obj in delta.iter() {
                let t = rtype_obj_type(a, t_obj);
                let under = a.prog.types.underlying(t);
                let TypeKind::Func(sig) = a.prog.types.kind(under).clone() else {
                    continue; // not a func type
                };
                let tuple = if *out { &sig.results } else { &sig.params };
                for ty in tuple {
                    let rt = a.make_rtype(*ty);
                    changed |= a.add_label(*result, rt);
                }
            }
            if changed {
                a.add_work(*result);
            }
        }

        ReflectConstraint::RtypeMethod { name, result, .. } => {
            for t_obj in delta.iter() {
                let t = rtype_obj_type(a, t_obj);
                // Avoid Lookup for named queries: >1 unexported methods
                // could match.
                let methods: Vec<_> = a
                    .prog
                    .types
                    .method_set(t)
                    .iter()
                    .filter(|m| name.as_deref().map_or(true, |n| n == m.name))
                    .map(|m| (m.sig, m.func))
                    .collect();
                for (sig_ty, func) in methods {
                    // Method struct layout:
                    //  0  identity
                    //  1  Name    string
                    //  2  PkgPath string
                    //  3  Type    Type
                    //  4  Func    Value
                    //  5  Index   int
                    let sig = a.prog.types.signature(sig_ty).clone();
                    let recv_prepended = change_recv(a, &sig);
                    let rt = a.make_rtype(recv_prepended);
                    if a.add_label(result.offset(3), rt) {
                        a.add_work(result.offset(3));
                    }
                    let contour = a.shared_contour(func);
                    if a.add_label(result.offset(4), contour) {
                        a.add_work(result.offset(4));
                    }
                }
            }
        }
    }
}

/// The type described by an rtype object (the single-node object behind
/// the canonical tagged `*rtype`).
fn rtype_obj_type(a: &Analysis, obj: NodeId) -> crate::types::TypeId {
    match &a.nodes.node(obj).obj {
        Some(o) => match o.data {
            ObjData::Rtype(t) => t,
            ref d => panic!("not an rtype object: {} ({:?})", obj, d),
        },
        None => panic!("not an object: {}", obj),
    }
}

/// Returns the signature with the receiver prepended to the parameters.
fn change_recv(a: &mut Analysis, sig: &Signature) -> crate::types::TypeId {
    let mut params = Vec::with_capacity(sig.params.len() + 1);
    if let Some(recv) = sig.recv {
        params.push(recv);
    }
    params.extend_from_slice(&sig.params);
    a.prog.types.func_of(Signature {
        recv: None,
        params,
        results: sig.results.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_populated() {
        assert!(find_intrinsic("reflect.TypeOf").is_some());
        assert!(find_intrinsic("(reflect.Value).MapIndex").is_some());
        assert!(find_intrinsic("(*reflect.rtype).Elem").is_some());
        assert!(find_intrinsic("main.main").is_none());
    }
}
