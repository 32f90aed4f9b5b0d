//! The client-visible result bundle: labels, queries, call graph,
//! probes, and warnings.

use std::fmt;

use hashbrown::HashMap;

use crate::analysis::{Analysis, CgNode, CgnId};
use crate::callgraph::CallGraph;
use crate::error::Warning;
use crate::node::{NodeId, NodeTable, ObjData};
use crate::ssa::{FuncId, Instr, InstrRef, Program, ValueId};
use crate::types::TypeId;

/// An allocation the analysis can report: one member of a points-to set.
///
/// Labels compare equal iff they denote the same node, i.e. the same
/// allocation (or the same field of it).
#[derive(Debug, Clone)]
pub struct Label {
    /// The set member itself; `head` plus a field offset.
    pub node: NodeId,
    /// Head node of the enclosing object.
    pub head: NodeId,
    /// The allocation instruction, when the object has one.
    pub site: Option<InstrRef>,
    /// The allocating contour, if context-sensitive.
    pub cgn: Option<CgnId>,
    /// What the object denotes.
    pub data: ObjData,
    /// Type of the head node (for tagged objects, the dynamic type).
    pub ty: TypeId,
    text: String,
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}
impl Eq for Label {}

impl std::hash::Hash for Label {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Everything a completed run reports.
#[derive(Debug)]
pub struct AnalysisResult {
    pub prog: Program,
    pub call_graph: CallGraph,
    pub warnings: Vec<Warning>,
    nodes: NodeTable,
    /// Final representative per node id.
    reps: Vec<NodeId>,
    cgnodes: Vec<CgNode>,
    queries: HashMap<(FuncId, ValueId), Vec<(Option<CgnId>, NodeId)>>,
    probes: Vec<(InstrRef, NodeId)>,
}

impl Analysis {
    /// Translates the solved state into the result bundle.
    pub(crate) fn into_result(mut self, root: CgnId) -> AnalysisResult {
        let mut cg = CallGraph::new(root);
        for ci in 0..self.cgnodes.len() {
            cg.ensure(CgnId(ci as u32));
        }
        for ci in 0..self.cgnodes.len() {
            let caller = CgnId(ci as u32);
            let sites = self.cgnodes[ci].sites.clone();
            for site in sites {
                if site.targets.is_zero() {
                    continue;
                }
                let t = self.find(site.targets);
                let labels: Vec<NodeId> = self.nodes.node(t).pts.iter().collect();
                for obj in labels {
                    let node = self.nodes.node(obj);
                    let Some(o) = &node.obj else { continue };
                    if !o.is_function() {
                        continue;
                    }
                    let Some(callee) = o.cgn else { continue };
                    cg.add_edge(caller, site.instr, callee);
                }
            }
        }

        // Freeze the representatives so lookups need no mutation.
        let reps: Vec<NodeId> = (0..self.nodes.len() as u32)
            .map(|i| self.rep.find(NodeId(i)))
            .collect();

        let mut probes: Vec<(InstrRef, NodeId)> = self.probes.into_iter().collect();
        probes.sort_by_key(|(site, _)| (site.func, site.block, site.index));

        AnalysisResult {
            prog: self.prog,
            call_graph: cg,
            warnings: self.warnings,
            nodes: self.nodes,
            reps,
            cgnodes: self.cgnodes,
            queries: self.query_results,
            probes,
        }
    }
}

impl AnalysisResult {
    fn rep(&self, id: NodeId) -> NodeId {
        self.reps[id.index()]
    }

    /// The final points-to set of one node, as labels.
    pub fn node_points_to(&self, id: NodeId) -> Vec<Label> {
        if id.is_zero() {
            return Vec::new();
        }
        let mut labels: Vec<Label> = self
            .nodes
            .node(self.rep(id))
            .pts
            .iter()
            .map(|m| self.label_for(m))
            .collect();
        labels.sort_by_key(|l| l.node);
        labels
    }

    /// The union of points-to sets recorded for a queried value, across
    /// every context it was generated in.
    pub fn points_to(&self, func: FuncId, value: ValueId) -> Vec<Label> {
        let mut labels: Vec<Label> = Vec::new();
        if let Some(pairs) = self.queries.get(&(func, value)) {
            for &(_, id) in pairs {
                if id.is_zero() {
                    continue;
                }
                for m in self.nodes.node(self.rep(id)).pts.iter() {
                    labels.push(self.label_for(m));
                }
            }
        }
        labels.sort_by_key(|l| l.node);
        labels.dedup();
        labels
    }

    /// The raw `(contour, node)` pairs recorded for a queried value.
    pub fn query_nodes(&self, func: FuncId, value: ValueId) -> &[(Option<CgnId>, NodeId)] {
        self.queries
            .get(&(func, value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Print probes in source order, one per call site.
    pub fn probes(&self) -> &[(InstrRef, NodeId)] {
        &self.probes
    }

    pub fn cgn_func(&self, cgn: CgnId) -> FuncId {
        self.cgnodes[cgn.index()].func
    }

    /// `pkg.name` of the function a contour instantiates.
    pub fn cgn_name(&self, cgn: CgnId) -> String {
        self.prog.func(self.cgn_func(cgn)).qualified_name()
    }

    /// The callsite a per-callsite contour was cloned for.
    pub fn cgn_callersite(&self, cgn: CgnId) -> Option<InstrRef> {
        self.cgnodes[cgn.index()].callersite
    }

    pub fn num_cgnodes(&self) -> usize {
        self.cgnodes.len()
    }

    /// Direct access to the final node table, for invariant checks.
    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    fn label_for(&self, member: NodeId) -> Label {
        // Walk back to the object header.
        let mut head = member;
        while self.nodes.node(head).obj.is_none() {
            assert!(
                self.nodes.node(head).in_object && !head.is_zero(),
                "label member {} lies outside any object",
                member
            );
            head = NodeId(head.0 - 1);
        }
        let node = self.nodes.node(head);
        let o = node.obj.as_ref().unwrap();

        let base = match &o.data {
            ObjData::Site(site) => format!("{}@{}", self.site_kind(*site), self.prog.instr_string(*site)),
            ObjData::Global(g) => self.prog.global(*g).name.clone(),
            ObjData::Func(f) => self.prog.func(*f).qualified_name(),
            ObjData::Rtype(t) => format!("rtype:{}", self.prog.types.type_string(*t)),
            ObjData::Caption(c) => (*c).to_string(),
            ObjData::None => format!("object@{}", head),
        };
        let path = if member != head {
            self.nodes
                .node(member)
                .sub
                .as_ref()
                .map(|fi| fi.path.clone())
                .unwrap_or_default()
        } else {
            String::new()
        };

        Label {
            node: member,
            head,
            site: match &o.data {
                ObjData::Site(site) => Some(*site),
                _ => None,
            },
            cgn: o.cgn,
            data: o.data.clone(),
            ty: node.ty,
            text: format!("{}{}", base, path),
        }
    }

    fn site_kind(&self, site: InstrRef) -> &'static str {
        let func = self.prog.func(site.func);
        match &func.blocks[site.block as usize].instrs[site.index as usize] {
            Instr::Alloc { .. } => "alloc",
            Instr::MakeSlice { .. } => "makeslice",
            Instr::MakeChan { .. } => "makechan",
            Instr::MakeMap { .. } => "makemap",
            Instr::MakeInterface { .. } => "makeinterface",
            Instr::Convert { .. } => "convert",
            Instr::Call(_) => "alloc",
            _ => "site",
        }
    }
}
