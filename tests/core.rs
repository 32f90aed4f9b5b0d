//! End-to-end tests for the points-to analysis.
//!
//! Each scenario builds a small SSA program through the builder, runs the
//! full pipeline, and checks points-to sets, the call graph, or the
//! warnings list.

use std::cell::RefCell;
use std::rc::Rc;

use pta_rs::analysis::analyze;
use pta_rs::config::Config;
use pta_rs::error::AnalysisError;
use pta_rs::node::ObjData;
use pta_rs::ssa::{Builtin, ProgramBuilder};
use pta_rs::types::{ChanDir, Signature};

fn void_sig() -> Signature {
    Signature {
        recv: None,
        params: vec![],
        results: vec![],
    }
}

// ─── Allocation & aliasing ─────────────────────────────────────────────────────

#[test]
fn alloc_and_aliasing() {
    // a := new(int); b := a; *b = 42
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let main = pb.declare("main", "main", void_sig());
    let (a, b) = {
        let mut f = pb.body(main);
        let a = f.alloc(int);
        let b = f.phi(&[a]);
        let v42 = f.const_int(42);
        f.store(b, v42);
        f.ret(&[]);
        (a, b)
    };

    let config = Config::entry("main").query(main, a).query(main, b);
    let result = analyze(pb.finish(), config).unwrap();

    let pa = result.points_to(main, a);
    let pb_ = result.points_to(main, b);
    assert_eq!(pa.len(), 1);
    assert_eq!(pa, pb_);
    assert!(pa[0].to_string().starts_with("alloc@main.main"));
}

#[test]
fn every_alloc_reaches_its_value() {
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let main = pb.declare("main", "main", void_sig());
    let (x, y) = {
        let mut f = pb.body(main);
        let x = f.alloc(int);
        let y = f.alloc(int);
        f.ret(&[]);
        (x, y)
    };

    let config = Config::entry("main").query(main, x).query(main, y);
    let result = analyze(pb.finish(), config).unwrap();

    let px = result.points_to(main, x);
    let py = result.points_to(main, y);
    assert_eq!(px.len(), 1);
    assert_eq!(py.len(), 1);
    assert_ne!(px[0], py[0]);
}

// ─── Interface dispatch ────────────────────────────────────────────────────────

#[test]
fn interface_dispatch() {
    // type D struct{ x int }; func (D) f()
    // var i I = D{...}; i.f()
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let st = pb.types().struct_of(vec![("x".into(), int)]);
    let d = pb.types().named("D", st);
    let msig_iface = pb.types().func_of(void_sig());
    let iface = pb.types().interface_of(vec![("f".into(), msig_iface)]);

    let method = pb.declare_method(
        "main",
        d,
        "f",
        Signature {
            recv: Some(d),
            params: vec![],
            results: vec![],
        },
    );
    {
        let mut f = pb.body(method);
        f.ret(&[]);
    }

    let main = pb.declare("main", "main", void_sig());
    let i = {
        let mut f = pb.body(main);
        let a = f.alloc(d);
        let v = f.load(a);
        let i = f.make_interface(iface, v);
        let _ = f.call_invoke(i, "f", &[]);
        f.ret(&[]);
        i
    };

    let config = Config::entry("main").query(main, i);
    let result = analyze(pb.finish(), config).unwrap();

    // pts(i) is the tagged object whose dynamic type is D.
    let pi = result.points_to(main, i);
    assert_eq!(pi.len(), 1);
    assert_eq!(pi[0].ty, d);

    // The call graph contains root -> main.main -> (D).f.
    let root = result.call_graph.root();
    let main_cgn = result
        .call_graph
        .callees_of(root)
        .into_iter()
        .find(|&c| result.cgn_name(c) == "main.main")
        .expect("main contour");
    assert!(result
        .call_graph
        .callees_of(main_cgn)
        .into_iter()
        .any(|c| result.cgn_name(c) == "(D).f"));
}

// ─── Maps ──────────────────────────────────────────────────────────────────────

#[test]
fn map_update_and_lookup() {
    // m := make(map[string]*int); m["k"] = &x; v := m["k"]
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let str_ = pb.types().string_type();
    let ptr_int = pb.types().pointer_to(int);
    let map_ty = pb.types().map_of(str_, ptr_int);

    let main = pb.declare("main", "main", void_sig());
    let (m, v) = {
        let mut f = pb.body(main);
        let m = f.make_map(map_ty);
        let x = f.alloc(int);
        let k = f.const_str("k");
        f.map_update(m, k, x);
        let k2 = f.const_str("k");
        let v = f.lookup(m, k2, false);
        f.ret(&[]);
        (m, v)
    };

    let config = Config::entry("main").query(main, m).query(main, v);
    let result = analyze(pb.finish(), config).unwrap();

    let pm = result.points_to(main, m);
    assert_eq!(pm.len(), 1);
    assert!(pm[0].to_string().starts_with("makemap@"));

    let pv = result.points_to(main, v);
    assert_eq!(pv.len(), 1);
    assert!(pv[0].to_string().starts_with("alloc@"));
}

// ─── Channels ──────────────────────────────────────────────────────────────────

#[test]
fn channel_send_recv() {
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);
    let chan_ty = pb.types().chan_of(ChanDir::Both, ptr_int);

    let main = pb.declare("main", "main", void_sig());
    let (x, r) = {
        let mut f = pb.body(main);
        let c = f.make_chan(chan_ty);
        let x = f.alloc(int);
        f.send(c, x);
        let r = f.recv(c, false);
        f.ret(&[]);
        (x, r)
    };

    let config = Config::entry("main").query(main, x).query(main, r);
    let result = analyze(pb.finish(), config).unwrap();

    assert_eq!(result.points_to(main, r), result.points_to(main, x));
}

// ─── Reflection ────────────────────────────────────────────────────────────────

#[test]
fn reflection_typeof_elem_roundtrip() {
    // t := reflect.TypeOf(a); e := t.Elem()  with a: *int
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let eface = pb.types().eface();
    let rtype_ptr = pb.types().rtype_ptr();
    let reflect_type = pb.types().reflect_type();

    let type_of = pb.declare(
        "reflect",
        "TypeOf",
        Signature {
            recv: None,
            params: vec![eface],
            results: vec![reflect_type],
        },
    );
    pb.declare_method(
        "reflect",
        rtype_ptr,
        "Elem",
        Signature {
            recv: Some(rtype_ptr),
            params: vec![],
            results: vec![reflect_type],
        },
    );

    let main = pb.declare("main", "main", void_sig());
    let (t, t2, e) = {
        let mut f = pb.body(main);
        let a = f.alloc(int); // a: *int
        let ai = f.make_interface(eface, a);
        let t = f.call_static(type_of, &[ai]).unwrap();
        let t2 = f.call_static(type_of, &[ai]).unwrap();
        let e = f.call_invoke(t, "Elem", &[]).unwrap();
        f.ret(&[]);
        (t, t2, e)
    };

    let config = Config::entry("main")
        .query(main, t)
        .query(main, t2)
        .query(main, e);
    let result = analyze(pb.finish(), config).unwrap();

    // TypeOf yields the canonical *rtype object for *int, both times.
    let pt = result.points_to(main, t);
    let pt2 = result.points_to(main, t2);
    assert_eq!(pt.len(), 1);
    assert_eq!(pt, pt2);
    assert!(matches!(pt[0].data, ObjData::Rtype(ty) if {
        result.prog.types.type_string(ty) == "*int"
    }));

    // Elem unwraps the pointer: the canonical object for int.
    let pe = result.points_to(main, e);
    assert_eq!(pe.len(), 1);
    assert!(matches!(pe[0].data, ObjData::Rtype(ty) if ty == int));
}

#[test]
fn reflect_zero_is_uncached() {
    // Two Zero(t) calls mint distinct abstract values: the memoization
    // is deliberately disabled.
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let eface = pb.types().eface();
    let reflect_type = pb.types().reflect_type();
    let reflect_value = pb.types().reflect_value();

    let type_of = pb.declare(
        "reflect",
        "TypeOf",
        Signature {
            recv: None,
            params: vec![eface],
            results: vec![reflect_type],
        },
    );
    let zero = pb.declare(
        "reflect",
        "Zero",
        Signature {
            recv: None,
            params: vec![reflect_type],
            results: vec![reflect_value],
        },
    );

    let main = pb.declare("main", "main", void_sig());
    let (z1, z2) = {
        let mut f = pb.body(main);
        let a = f.alloc(int);
        let ai = f.make_interface(eface, a);
        let t = f.call_static(type_of, &[ai]).unwrap();
        let z1 = f.call_static(zero, &[t]).unwrap();
        let z2 = f.call_static(zero, &[t]).unwrap();
        f.ret(&[]);
        (z1, z2)
    };

    let config = Config::entry("main").query(main, z1).query(main, z2);
    let result = analyze(pb.finish(), config).unwrap();

    let p1 = result.points_to(main, z1);
    let p2 = result.points_to(main, z2);
    assert_eq!(p1.len(), 1);
    assert_eq!(p2.len(), 1);
    assert_ne!(p1[0], p2[0], "Zero results must not be shared");
}

// ─── Append ────────────────────────────────────────────────────────────────────

#[test]
fn append_discipline() {
    // s := make([]int); s2 := append(s, y...)
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let slice_int = pb.types().slice_of(int);

    let main = pb.declare("main", "main", void_sig());
    let (s, s2) = {
        let mut f = pb.body(main);
        let s = f.make_slice(slice_int);
        let y = f.make_slice(slice_int);
        let s2 = f.call_builtin(Builtin::Append, &[s, y]).unwrap();
        f.ret(&[]);
        (s, s2)
    };

    let config = Config::entry("main").query(main, s).query(main, s2);
    let result = analyze(pb.finish(), config).unwrap();

    let ps = result.points_to(main, s);
    let ps2 = result.points_to(main, s2);
    assert_eq!(ps.len(), 1);
    // s2 sees both the original backing array and a fresh one.
    assert_eq!(ps2.len(), 2);
    assert!(ps2.contains(&ps[0]));
    assert!(ps2.iter().any(|l| l.to_string().starts_with("alloc@")));
}

// ─── Context sensitivity ───────────────────────────────────────────────────────

#[test]
fn context_sensitive_accessor() {
    // func G(p *int) *int { return p }, called with two distinct args.
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);

    let g = pb.declare(
        "main",
        "G",
        Signature {
            recv: None,
            params: vec![ptr_int],
            results: vec![ptr_int],
        },
    );
    {
        let mut f = pb.body(g);
        let p = f.param(0);
        f.ret(&[p]);
    }

    let main = pb.declare("main", "main", void_sig());
    let (x1, x2, r1, r2) = {
        let mut f = pb.body(main);
        let x1 = f.alloc(int);
        let x2 = f.alloc(int);
        let r1 = f.call_static(g, &[x1]).unwrap();
        let r2 = f.call_static(g, &[x2]).unwrap();
        f.ret(&[]);
        (x1, x2, r1, r2)
    };

    let config = Config::entry("main")
        .query(main, x1)
        .query(main, x2)
        .query(main, r1)
        .query(main, r2);
    let result = analyze(pb.finish(), config).unwrap();

    // The two call sites flow independently.
    assert_eq!(result.points_to(main, r1), result.points_to(main, x1));
    assert_eq!(result.points_to(main, r2), result.points_to(main, x2));
    assert_ne!(result.points_to(main, r1), result.points_to(main, r2));
}

// ─── Closures ──────────────────────────────────────────────────────────────────

#[test]
fn closure_captures_flow() {
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);

    let inner = pb.declare(
        "main",
        "main$1",
        Signature {
            recv: None,
            params: vec![],
            results: vec![ptr_int],
        },
    );
    {
        let mut f = pb.body(inner);
        let fv = f.free_var(ptr_int);
        f.ret(&[fv]);
    }

    let main = pb.declare("main", "main", void_sig());
    let (x, r) = {
        let mut f = pb.body(main);
        let x = f.alloc(int);
        let cl = f.make_closure(inner, &[x]);
        let r = f.call_dynamic(cl, &[]).unwrap();
        f.ret(&[]);
        (x, r)
    };

    let config = Config::entry("main").query(main, x).query(main, r);
    let result = analyze(pb.finish(), config).unwrap();

    assert_eq!(result.points_to(main, r), result.points_to(main, x));
}

// ─── Type assertions ───────────────────────────────────────────────────────────

#[test]
fn type_assert_concrete_copies_payload() {
    // D struct{ p *int }; i := I(d); t := i.(D); q := t.p
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);
    let st = pb.types().struct_of(vec![("p".into(), ptr_int)]);
    let d = pb.types().named("D", st);
    let eface = pb.types().eface();

    let main = pb.declare("main", "main", void_sig());
    let (x, q) = {
        let mut f = pb.body(main);
        let a = f.alloc(d);
        let x = f.alloc(int);
        let fa = f.field_addr(a, 0);
        f.store(fa, x);
        let v = f.load(a);
        let i = f.make_interface(eface, v);
        let t = f.type_assert(i, d, false);
        let q = f.field(t, 0);
        f.ret(&[]);
        (x, q)
    };

    let config = Config::entry("main").query(main, x).query(main, q);
    let result = analyze(pb.finish(), config).unwrap();

    assert_eq!(result.points_to(main, q), result.points_to(main, x));
}

// ─── Unsafe conversions ────────────────────────────────────────────────────────

#[test]
fn unsafe_conversion_allocates_and_warns() {
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let up = pb.types().unsafe_pointer();
    let ptr_int = pb.types().pointer_to(int);

    let main = pb.declare("main", "main", void_sig());
    let p2 = {
        let mut f = pb.body(main);
        let x = f.alloc(int);
        let u = f.convert(up, x);
        let p2 = f.convert(ptr_int, u);
        f.ret(&[]);
        p2
    };

    let config = Config::entry("main").query(main, p2);
    let result = analyze(pb.finish(), config).unwrap();

    let pp = result.points_to(main, p2);
    assert_eq!(pp.len(), 1);
    assert!(pp[0].to_string().starts_with("convert@"));
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("unsafe.Pointer conversion")));
}

// ─── Print probes ──────────────────────────────────────────────────────────────

#[test]
fn print_probe_fires_once_per_site() {
    // G prints its argument and is short enough to be cloned per
    // callsite; the probe must still be canonical.
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);

    let g = pb.declare(
        "main",
        "G",
        Signature {
            recv: None,
            params: vec![ptr_int],
            results: vec![],
        },
    );
    {
        let mut f = pb.body(g);
        let p = f.param(0);
        let _ = f.call_builtin(Builtin::Print, &[p]);
        f.ret(&[]);
    }

    let main = pb.declare("main", "main", void_sig());
    {
        let mut f = pb.body(main);
        let x1 = f.alloc(int);
        let x2 = f.alloc(int);
        let _ = f.call_static(g, &[x1]);
        let _ = f.call_static(g, &[x2]);
        f.ret(&[]);
    }

    let fired = Rc::new(RefCell::new(0usize));
    let fired2 = fired.clone();
    let config = Config::entry("main").print_hook(Box::new(move |_site, _probe| {
        *fired2.borrow_mut() += 1;
    }));
    let result = analyze(pb.finish(), config).unwrap();

    assert_eq!(*fired.borrow(), 1);
    assert_eq!(result.probes().len(), 1);
    // Both contours merged their argument into the one probe.
    let (_, probe) = result.probes()[0];
    assert_eq!(result.node_points_to(probe).len(), 2);
}

// ─── Call graph ────────────────────────────────────────────────────────────────

#[test]
fn call_graph_is_closed_under_reachability() {
    // main -> G (shared: two blocks) -> H (cloned per callsite).
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);

    let h = pb.declare(
        "main",
        "H",
        Signature {
            recv: None,
            params: vec![ptr_int],
            results: vec![ptr_int],
        },
    );
    {
        let mut f = pb.body(h);
        let p = f.param(0);
        f.ret(&[p]);
    }

    let g = pb.declare(
        "main",
        "G",
        Signature {
            recv: None,
            params: vec![ptr_int],
            results: vec![ptr_int],
        },
    );
    {
        let mut f = pb.body(g);
        let p = f.param(0);
        let r = f.call_static(h, &[p]).unwrap();
        // A second block keeps G out of the per-callsite policy.
        f.new_block();
        f.ret(&[r]);
    }

    let main = pb.declare("main", "main", void_sig());
    {
        let mut f = pb.body(main);
        let x = f.alloc(int);
        let _ = f.call_static(g, &[x]);
        f.ret(&[]);
    }

    let result = analyze(pb.finish(), Config::entry("main")).unwrap();

    // Every contour the analysis created is reachable from the root.
    let reachable = result.call_graph.reachable();
    assert_eq!(reachable.len(), result.num_cgnodes());

    let names: Vec<String> = result
        .call_graph
        .edges()
        .into_iter()
        .map(|(a, _, b)| format!("{} -> {}", result.cgn_name(a), result.cgn_name(b)))
        .collect();
    assert!(names.contains(&"<root> -> main.main".to_string()));
    assert!(names.contains(&"main.main -> main.G".to_string()));
    assert!(names.contains(&"main.G -> main.H".to_string()));
}

// ─── Object integrity & stability ──────────────────────────────────────────────

#[test]
fn object_headers_only_on_heads() {
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);
    let st = pb.types().struct_of(vec![("a".into(), ptr_int), ("b".into(), ptr_int)]);

    let main = pb.declare("main", "main", void_sig());
    {
        let mut f = pb.body(main);
        let o = f.alloc(st);
        let x = f.alloc(int);
        let fa = f.field_addr(o, 1);
        f.store(fa, x);
        f.ret(&[]);
    }

    let result = analyze(pb.finish(), Config::entry("main")).unwrap();

    let nodes = result.nodes();
    for (id, node) in nodes.iter() {
        if let Some(obj) = &node.obj {
            for k in 1..obj.size {
                assert!(
                    nodes.node(id.offset(k)).obj.is_none(),
                    "interior node {} carries an object header",
                    id.offset(k)
                );
            }
        }
    }
}

#[test]
fn results_are_stable_across_runs() {
    fn run() -> Vec<String> {
        let mut pb = ProgramBuilder::new();
        let int = pb.types().int_type();
        let str_ = pb.types().string_type();
        let ptr_int = pb.types().pointer_to(int);
        let map_ty = pb.types().map_of(str_, ptr_int);
        let main = pb.declare("main", "main", void_sig());
        let v = {
            let mut f = pb.body(main);
            let m = f.make_map(map_ty);
            let x = f.alloc(int);
            let y = f.alloc(int);
            let k = f.const_str("k");
            f.map_update(m, k, x);
            f.map_update(m, k, y);
            let v = f.lookup(m, k, false);
            f.ret(&[]);
            v
        };
        let result = analyze(pb.finish(), Config::entry("main").query(main, v)).unwrap();
        result
            .points_to(main, v)
            .into_iter()
            .map(|l| l.to_string())
            .collect()
    }

    assert_eq!(run(), run());
}

// ─── Configuration errors ──────────────────────────────────────────────────────

#[test]
fn config_errors_are_fatal() {
    fn program() -> (ProgramBuilder, pta_rs::ssa::FuncId) {
        let mut pb = ProgramBuilder::new();
        let main = pb.declare("main", "main", void_sig());
        {
            let mut f = pb.body(main);
            f.ret(&[]);
        }
        (pb, main)
    }

    let (pb, _) = program();
    let err = analyze(pb.finish(), Config::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::NoEntryPackages));

    let (pb, _) = program();
    let err = analyze(pb.finish(), Config::entry("main").add_entry("main")).unwrap_err();
    assert!(matches!(err, AnalysisError::DuplicateEntryPackage(_)));

    let (pb, _) = program();
    let err = analyze(pb.finish(), Config::entry("nosuch")).unwrap_err();
    assert!(matches!(err, AnalysisError::NoMainFunction(_)));

    // Duplicate query for one value.
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let main = pb.declare("main", "main", void_sig());
    let a = {
        let mut f = pb.body(main);
        let a = f.alloc(int);
        f.ret(&[]);
        a
    };
    let cfg = Config::entry("main").query(main, a).query(main, a);
    let err = analyze(pb.finish(), cfg).unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedQuery(_)));
}

// ─── Globals ───────────────────────────────────────────────────────────────────

#[test]
fn globals_flow_between_functions() {
    // var g *int;  set: g = &x;  get: v = g
    let mut pb = ProgramBuilder::new();
    let int = pb.types().int_type();
    let ptr_int = pb.types().pointer_to(int);
    let glob = pb.global("g", ptr_int);

    let setter = pb.declare("main", "set", void_sig());
    let x = {
        let mut f = pb.body(setter);
        let x = f.alloc(int);
        let gr = f.global_ref(glob);
        f.store(gr, x);
        f.ret(&[]);
        x
    };

    let main = pb.declare("main", "main", void_sig());
    let v = {
        let mut f = pb.body(main);
        let _ = f.call_static(setter, &[]);
        let gr = f.global_ref(glob);
        let v = f.load(gr);
        f.ret(&[]);
        v
    };

    let config = Config::entry("main").query(setter, x).query(main, v);
    let result = analyze(pb.finish(), config).unwrap();

    assert_eq!(result.points_to(main, v), result.points_to(setter, x));
}
