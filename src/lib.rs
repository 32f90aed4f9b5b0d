//! # pta-rs: whole-program points-to analysis in Rust
//!
//! **`pta-rs`** is an inclusion-based (Andersen-style), context-sensitive,
//! field-sensitive points-to analysis for a statically typed,
//! garbage-collected language whose programs arrive lowered to typed SSA.
//! Given the SSA of all reachable functions, it computes a conservative
//! over-approximation of the heap allocations each pointer-like value may
//! refer to, together with a call graph that respects dynamic dispatch
//! through interfaces and reflection.
//!
//! ## Key properties
//!
//! - **Manager-centric architecture**: one [`Analysis`][analysis::Analysis]
//!   instance owns every table; generation, intrinsics, and the solver are
//!   operations over it.
//! - **Flow-insensitive, whole-program**: instruction order within a
//!   function never changes the result; reachability grows RTA-style from
//!   the entry packages.
//! - **Field-sensitive**: aggregates flatten to one node per scalar, with
//!   struct and array identity nodes; arrays are element-collapsed.
//! - **Context-sensitive by policy**: intrinsics, synthetic wrappers, and
//!   short call-free functions are cloned per callsite.
//! - **Reflection-aware**: a fixed intrinsic library models the
//!   reflection API over tagged objects; unsupported corners degrade to
//!   warnings, not silent wrong answers.
//!
//! ## Quick start
//!
//! ```rust
//! use pta_rs::analysis::analyze;
//! use pta_rs::config::Config;
//! use pta_rs::ssa::ProgramBuilder;
//! use pta_rs::types::Signature;
//!
//! // func main() { a := new(int); b := a; _ = b }
//! let mut pb = ProgramBuilder::new();
//! let int = pb.types().int_type();
//! let sig = Signature { recv: None, params: vec![], results: vec![] };
//! let main = pb.declare("main", "main", sig);
//! let (a, b) = {
//!     let mut f = pb.body(main);
//!     let a = f.alloc(int);
//!     let b = f.phi(&[a]);
//!     f.ret(&[]);
//!     (a, b)
//! };
//!
//! let config = Config::entry("main").query(main, a).query(main, b);
//! let result = analyze(pb.finish(), config).unwrap();
//!
//! // Both values may point only to the allocation site.
//! assert_eq!(result.points_to(main, a), result.points_to(main, b));
//! assert_eq!(result.points_to(main, a).len(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`ssa`] — the typed SSA input model and its builder
//! - [`types`] — the interned type universe and method sets
//! - [`analysis`] — the manager and the `analyze` entry point
//! - [`flatten`] — scalar decomposition of types
//! - [`node`] / [`nodeset`] — the node universe and points-to sets
//! - [`constraint`] — the constraint algebra
//! - [`intrinsics`] — the reflection intrinsic library
//! - [`solve`] — the worklist solver and cycle detection
//! - [`callgraph`] / [`result`] — the client-visible output
//!
//! Debug tracing goes through the [`log`] facade: install any logger to
//! see node creation, constraint emission, and solver propagation.

pub mod analysis;
pub mod callgraph;
pub mod config;
pub mod constraint;
pub mod error;
pub mod flatten;
pub mod intrinsics;
pub mod node;
pub mod nodeset;
pub mod result;
pub mod solve;
pub mod ssa;
pub mod types;

mod generate;

pub use analysis::analyze;
pub use config::Config;
pub use error::{AnalysisError, Warning};
pub use result::{AnalysisResult, Label};
