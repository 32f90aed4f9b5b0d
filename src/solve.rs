//! The constraint solver: worklist-driven difference propagation with
//! on-line cycle detection.
//!
//! Points-to sets only grow, the object universe is finite at any
//! instant, and every constraint added during solving increases a
//! monotone bound, so the fixed point is reached in finite time. Copy
//! edges form a graph whose cycles would otherwise be re-propagated
//! forever; the solver periodically runs an SCC pass (Nuutila's variant
//! of Tarjan's algorithm) over that graph and unifies each multi-node
//! component behind a representative in a union-find structure. Nodes
//! inside object blocks are never unified: their numeric identity is
//! address arithmetic, and collapse is only an optimization.

use log::debug;

use crate::analysis::Analysis;
use crate::constraint::Constraint;
use crate::node::NodeId;
use crate::nodeset::NodeSet;

/// How many node visits between cycle-collapse passes.
const CYCLE_DETECT_PERIOD: usize = 4096;

/// Union-find over node ids with path halving; the representative of a
/// component is its smallest member.
#[derive(Default)]
pub struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    pub fn new() -> Self {
        UnionFind { parent: Vec::new() }
    }

    fn ensure(&mut self, len: usize) {
        while self.parent.len() < len {
            self.parent.push(self.parent.len() as u32);
        }
    }

    pub fn find(&mut self, id: NodeId) -> NodeId {
        self.ensure(id.index() + 1);
        let mut x = id.0;
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        NodeId(x)
    }

    /// Unifies the components of `a` and `b`; the smaller root becomes
    /// the representative. Returns it.
    pub fn union(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let ra = self.find(a);
        let rb = self.find(b);
        let (keep, absorb) = if ra <= rb { (ra, rb) } else { (rb, ra) };
        self.parent[absorb.0 as usize] = keep.0;
        keep
    }
}

impl Analysis {
    /// Resolves `id` to its current representative.
    pub(crate) fn find(&mut self, id: NodeId) -> NodeId {
        self.rep.find(id)
    }

    pub(crate) fn add_work(&mut self, id: NodeId) {
        let id = self.find(id);
        self.work.insert(id);
    }

    /// Inserts label `obj` into `pts(id)`. Returns true if it was new.
    pub(crate) fn add_label(&mut self, id: NodeId, obj: NodeId) -> bool {
        let id = self.find(id);
        let added = self.nodes.node_mut(id).pts.insert(obj);
        if added {
            debug!("{} gains {}", id, obj);
        }
        added
    }

    /// Adds a copy edge `src -> dst` during solving, seeding `dst` with
    /// `src`'s current set. Returns true if `dst` grew.
    pub(crate) fn online_copy(&mut self, dst: NodeId, src: NodeId) -> bool {
        let dst = self.find(dst);
        let src = self.find(src);
        if dst == src {
            return false;
        }
        if self.copy_to.entry(src).or_default().insert(dst) {
            let src_pts = self.nodes.node(src).pts.clone();
            return self.nodes.node_mut(dst).pts.union_with(&src_pts);
        }
        false
    }

    /// `online_copy` over `sizeof` consecutive fields, scheduling changed
    /// destinations.
    pub(crate) fn online_copy_n(&mut self, dst: NodeId, src: NodeId, sizeof: u32) {
        for i in 0..sizeof {
            if self.online_copy(dst.offset(i), src.offset(i)) {
                self.add_work(dst.offset(i));
            }
        }
    }

    /// Folds constraints emitted since the last call into the solver
    /// state: `Addr` seeds points-to sets, `Copy` becomes a graph edge,
    /// everything else is indexed on its trigger node and caught up on
    /// labels that node already propagated.
    fn process_new_constraints(&mut self) {
        while self.processed < self.constraints.len() {
            let c = self.constraints[self.processed].clone();
            self.processed += 1;
            match c {
                Constraint::Addr { dst, obj } => {
                    if self.add_label(dst, obj) {
                        self.add_work(dst);
                    }
                }
                Constraint::Copy { dst, src } => {
                    if self.online_copy(dst, src) {
                        self.add_work(dst);
                    }
                }
                other => {
                    let p = self.find(other.ptr().expect("complex constraint without trigger"));
                    self.complex.entry(p).or_default().push(self.processed - 1);
                    let prev = self.nodes.node(p).prev_pts.clone();
                    if !prev.is_empty() {
                        self.solve_constraint(&other, &prev);
                    }
                }
            }
        }
    }

    /// Runs the worklist to a fixed point.
    pub(crate) fn solve(&mut self) {
        debug!("==== solving ({} constraints)", self.constraints.len());
        self.process_new_constraints();
        self.collapse_cycles();

        let mut visits = 0usize;
        loop {
            self.process_new_constraints();
            let Some(id) = self.work.pop_first() else {
                if self.processed == self.constraints.len() {
                    break;
                }
                continue;
            };
            let id = self.find(id);

            let delta = {
                let n = self.nodes.node(id);
                n.pts.difference(&n.prev_pts)
            };
            if delta.is_empty() {
                continue;
            }
            debug!("visit {} (+{} labels)", id, delta.len());
            let pts = self.nodes.node(id).pts.clone();
            self.nodes.node_mut(id).prev_pts = pts;

            visits += 1;
            if visits % CYCLE_DETECT_PERIOD == 0 {
                self.collapse_cycles();
            }

            // Complex constraints triggered by this node.
            if let Some(ids) = self.complex.get(&id) {
                let ids = ids.clone();
                for ci in ids {
                    let c = self.constraints[ci].clone();
                    self.solve_constraint(&c, &delta);
                }
            }

            // Flow the delta along copy edges.
            if let Some(targets) = self.copy_to.get(&id) {
                let targets: Vec<NodeId> = targets.iter().collect();
                for t in targets {
                    let t = self.find(t);
                    if t == id {
                        continue;
                    }
                    if self.nodes.node_mut(t).pts.union_with(&delta) {
                        self.add_work(t);
                    }
                }
            }
        }

        debug!(
            "==== fixed point: {} nodes, {} constraints",
            self.nodes.len(),
            self.constraints.len()
        );
    }

    fn solve_constraint(&mut self, c: &Constraint, delta: &NodeSet) {
        match c {
            Constraint::Addr { .. } | Constraint::Copy { .. } => {
                unreachable!("simple constraint in complex index")
            }

            Constraint::Load { offset, dst, .. } => {
                let mut changed = false;
                for k in delta.iter() {
                    let koff = k.offset(*offset);
                    if koff.index() >= self.nodes.len() {
                        continue;
                    }
                    if self.online_copy(*dst, koff) {
                        changed = true;
                    }
                }
                if changed {
                    self.add_work(*dst);
                }
            }

            Constraint::Store { offset, src, .. } => {
                for k in delta.iter() {
                    let koff = k.offset(*offset);
                    if koff.index() >= self.nodes.len() {
                        continue;
                    }
                    if self.online_copy(koff, *src) {
                        self.add_work(koff);
                    }
                }
            }

            Constraint::OffsetAddr { offset, dst, .. } => {
                let mut changed = false;
                for k in delta.iter() {
                    if self.add_label(*dst, k.offset(*offset)) {
                        changed = true;
                    }
                }
                if changed {
                    self.add_work(*dst);
                }
            }

            Constraint::TypeAssert { ty, dst, .. } => {
                let is_iface = self.prog.types.is_interface(*ty);
                let mut changed = false;
                for obj in delta.iter() {
                    let (t_dyn, v, indirect) = self
                        .nodes
                        .tagged_value(obj)
                        .unwrap_or_else(|| panic!("not a tagged object: {}", obj));
                    assert!(!indirect, "indirect tagged object");

                    if is_iface {
                        if self.prog.types.implements(t_dyn, *ty) {
                            // The tagged object flows as a whole.
                            if self.add_label(*dst, obj) {
                                changed = true;
                            }
                        }
                    } else if t_dyn == *ty {
                        // Assertion to a concrete type copies the
                        // payload.
                        let sz = self.sizeof(t_dyn);
                        self.online_copy_n(*dst, v, sz);
                    }
                }
                if changed {
                    self.add_work(*dst);
                }
            }

            Constraint::Invoke { method, block, .. } => {
                self.solve_invoke(method, *block, delta);
            }

            Constraint::Reflect(r) => crate::intrinsics::solve_reflect(self, r, delta),
        }
    }

    /// Resolves one dynamic dispatch: for each new tagged label, find the
    /// concrete method on its dynamic type, materialize its shared
    /// contour, and wire the call block's P/R window to it.
    fn solve_invoke(&mut self, method: &str, block: NodeId, delta: &NodeSet) {
        for obj in delta.iter() {
            let (t_dyn, v, indirect) = self
                .nodes
                .tagged_value(obj)
                .unwrap_or_else(|| panic!("not a tagged object: {}", obj));
            assert!(!indirect, "indirect tagged object");

            let m = self
                .prog
                .types
                .lookup_method(t_dyn, method)
                .unwrap_or_else(|| {
                    panic!(
                        "no concrete method {} on {}",
                        method,
                        self.prog.types.type_string(t_dyn)
                    )
                });
            let (m_sig, m_func) = (m.sig, m.func);

            // Dynamic calls dispatch through the shared contour.
            let fn_obj = self.shared_contour(m_func);
            let sig = self.prog.types.signature(m_sig).clone();
            let recv_sz = sig.recv.map_or(0, |r| self.sizeof(r));
            let psize: u32 = sig.params.iter().map(|p| self.sizeof(*p)).sum();
            let rsize: u32 = sig.results.iter().map(|r| self.sizeof(*r)).sum();

            // Receiver gets the tagged payload.
            let recv = self.func_params(fn_obj);
            self.online_copy_n(recv, v, recv_sz);

            // Actual params flow in, formal results flow out.
            let p_site = block.offset(1);
            self.online_copy_n(recv.offset(recv_sz), p_site, psize);
            let r_formal = self.func_results(fn_obj);
            self.online_copy_n(block.offset(1 + psize), r_formal, rsize);

            // Record the target; the call graph reads pts(targets).
            if self.add_label(block, fn_obj) {
                self.add_work(block);
            }
        }
    }

    // ---------- cycle detection ----------

    /// Collapses strongly connected components of the copy graph.
    pub(crate) fn collapse_cycles(&mut self) {
        let n = self.nodes.len();
        let mut order = vec![u32::MAX; n]; // discovery order, MAX = unvisited
        let mut low = vec![0u32; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<u32> = Vec::new();
        let mut counter = 0u32;
        let mut components: Vec<Vec<NodeId>> = Vec::new();

        // Iterative Tarjan; frames carry the resolved successor list.
        enum Frame {
            Enter(u32),
            Resume(u32, Vec<u32>, usize),
        }

        for root in 0..n as u32 {
            if order[root as usize] != u32::MAX || !self.is_cycle_candidate(root) {
                continue;
            }
            let mut frames = vec![Frame::Enter(root)];
            while let Some(frame) = frames.pop() {
                match frame {
                    Frame::Enter(v) => {
                        order[v as usize] = counter;
                        low[v as usize] = counter;
                        counter += 1;
                        stack.push(v);
                        on_stack[v as usize] = true;

                        let raw: Vec<NodeId> = self
                            .copy_to
                            .get(&NodeId(v))
                            .map(|s| s.iter().collect())
                            .unwrap_or_default();
                        let mut succs = Vec::with_capacity(raw.len());
                        for t in raw {
                            let t = self.find(t).0;
                            if t != v && self.is_cycle_candidate(t) {
                                succs.push(t);
                            }
                        }
                        frames.push(Frame::Resume(v, succs, 0));
                    }
                    Frame::Resume(v, succs, mut i) => {
                        let mut descended = false;
                        while i < succs.len() {
                            let w = succs[i];
                            i += 1;
                            if order[w as usize] == u32::MAX {
                                frames.push(Frame::Resume(v, succs, i));
                                frames.push(Frame::Enter(w));
                                descended = true;
                                break;
                            } else if on_stack[w as usize] {
                                low[v as usize] = low[v as usize].min(order[w as usize]);
                            }
                        }
                        if descended {
                            continue;
                        }
                        if low[v as usize] == order[v as usize] {
                            let mut component = Vec::new();
                            loop {
                                let w = stack.pop().unwrap();
                                on_stack[w as usize] = false;
                                component.push(NodeId(w));
                                if w == v {
                                    break;
                                }
                            }
                            if component.len() > 1 {
                                components.push(component);
                            }
                        } else if let Some(Frame::Resume(parent, _, _)) = frames.last() {
                            let p = *parent as usize;
                            low[p] = low[p].min(low[v as usize]);
                        }
                    }
                }
            }
        }

        for component in components {
            self.unify(&component);
        }
    }

    /// A node can join a cycle collapse only if it is its own
    /// representative and lies outside every object block.
    fn is_cycle_candidate(&mut self, v: u32) -> bool {
        let id = NodeId(v);
        self.find(id) == id && !self.nodes.node(id).in_object
    }

    /// Redirects every node of `component` to one representative,
    /// merging points-to sets, copy edges, and complex indices.
    fn unify(&mut self, component: &[NodeId]) {
        let mut rep = component[0];
        for &m in component {
            rep = self.rep.union(rep, m);
        }
        debug!("unify {:?} -> {}", component, rep);

        let mut pts = NodeSet::new();
        let mut prev: Option<NodeSet> = None;
        let mut edges = NodeSet::new();
        let mut complex: Vec<usize> = Vec::new();

        for &m in component {
            let node = self.nodes.node_mut(m);
            pts.union_with(&std::mem::take(&mut node.pts));
            let m_prev = std::mem::take(&mut node.prev_pts);
            // Only labels every member has already propagated may be
            // skipped in future deltas.
            prev = Some(match prev {
                None => m_prev,
                Some(p) => p.intersection(&m_prev),
            });
            if let Some(set) = self.copy_to.remove(&m) {
                edges.union_with(&set);
            }
            if let Some(mut list) = self.complex.remove(&m) {
                complex.append(&mut list);
            }
        }

        let rep_node = self.nodes.node_mut(rep);
        rep_node.pts = pts;
        rep_node.prev_pts = prev.unwrap_or_default();
        if !edges.is_empty() {
            self.copy_to.entry(rep).or_default().union_with(&edges);
        }
        if !complex.is_empty() {
            self.complex.entry(rep).or_default().extend(complex);
        }
        self.add_work(rep);
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::Analysis;
    use crate::config::Config;
    use crate::ssa::ProgramBuilder;
    use crate::types::Signature;

    /// An analysis over a trivial program, as a harness for feeding the
    /// solver hand-built constraints.
    fn mini_analysis() -> Analysis {
        let mut pb = ProgramBuilder::new();
        let main = pb.declare(
            "main",
            "main",
            Signature {
                recv: None,
                params: vec![],
                results: vec![],
            },
        );
        {
            let mut b = pb.body(main);
            b.ret(&[]);
        }
        let mut a = Analysis::new(pb.finish(), Config::entry("main")).unwrap();
        // Reserve the id-0 sentinel, as generation would.
        a.add_one_node(crate::types::TypeId::INVALID, "(zero)", None);
        a
    }

    #[test]
    fn addr_and_copy_propagate() {
        let mut a = mini_analysis();
        let int = a.prog.types.int_type();
        let x = a.add_one_node(int, "x", None);
        let y = a.add_one_node(int, "y", None);
        let obj = a.add_one_node(int, "obj", None);
        a.address_of(x, obj);
        a.copy(y, x, 1);
        a.solve();
        let ry = a.find(y);
        assert!(a.nodes.node(ry).pts.contains(obj));
    }

    #[test]
    fn chained_copies_reach_fixed_point() {
        let mut a = mini_analysis();
        let int = a.prog.types.int_type();
        let obj = a.add_one_node(int, "obj", None);
        let mut prev = a.add_one_node(int, "v0", None);
        a.address_of(prev, obj);
        let mut last = prev;
        for i in 0..32 {
            let next = a.add_one_node(int, &format!("v{}", i + 1), None);
            a.copy(next, prev, 1);
            prev = next;
            last = next;
        }
        a.solve();
        let rlast = a.find(last);
        assert!(a.nodes.node(rlast).pts.contains(obj));
    }

    #[test]
    fn copy_cycle_is_collapsed() {
        let mut a = mini_analysis();
        let int = a.prog.types.int_type();
        let obj = a.add_one_node(int, "obj", None);
        let x = a.add_one_node(int, "x", None);
        let y = a.add_one_node(int, "y", None);
        let z = a.add_one_node(int, "z", None);
        a.address_of(x, obj);
        a.copy(y, x, 1);
        a.copy(z, y, 1);
        a.copy(x, z, 1);
        a.solve();
        a.collapse_cycles();
        let rx = a.find(x);
        assert_eq!(rx, a.find(y));
        assert_eq!(rx, a.find(z));
        assert!(a.nodes.node(rx).pts.contains(obj));
    }

    #[test]
    fn load_and_store_through_pointer() {
        let mut a = mini_analysis();
        let int = a.prog.types.int_type();
        // o is an object with one slot; p points to o; *p = q; r = *p.
        let o = a.add_one_node(int, "o", None);
        let p = a.add_one_node(int, "p", None);
        let q = a.add_one_node(int, "q", None);
        let r = a.add_one_node(int, "r", None);
        let target = a.add_one_node(int, "target", None);
        a.address_of(p, o);
        a.address_of(q, target);
        a.store(p, q, 0, 1);
        a.load(r, p, 0, 1);
        a.solve();
        let ro = a.find(o);
        assert!(a.nodes.node(ro).pts.contains(target));
        let rr = a.find(r);
        assert!(a.nodes.node(rr).pts.contains(target));
    }

    #[test]
    fn offset_addr_shifts_labels() {
        let mut a = mini_analysis();
        let int = a.prog.types.int_type();
        let o = a.add_one_node(int, "o", None);
        a.add_one_node(int, "o.f", None);
        let p = a.add_one_node(int, "p", None);
        let q = a.add_one_node(int, "q", None);
        a.address_of(p, o);
        a.offset_addr(q, p, 1);
        a.solve();
        let rq = a.find(q);
        assert!(a.nodes.node(rq).pts.contains(o.offset(1)));
    }

    #[test]
    #[should_panic(expected = "address_of: zero dst")]
    fn node_zero_is_never_an_addr_destination() {
        let mut a = mini_analysis();
        let int = a.prog.types.int_type();
        let obj = a.add_one_node(int, "obj", None);
        a.address_of(crate::node::NodeId::ZERO, obj);
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut a = mini_analysis();
        let int = a.prog.types.int_type();
        let x = a.add_one_node(int, "x", None);
        let y = a.add_one_node(int, "y", None);
        let obj = a.add_one_node(int, "obj", None);
        a.address_of(x, obj);
        a.copy(y, x, 1);
        a.solve();
        let ry = a.find(y);
        let before = a.nodes.node(ry).pts.len();
        // Solving again with no new constraints changes nothing.
        a.solve();
        let ry = a.find(y);
        assert_eq!(a.nodes.node(ry).pts.len(), before);
    }
}
