//! Analysis configuration.

use crate::node::NodeId;
use crate::ssa::{FuncId, InstrRef, ValueId};

/// A request to report the points-to set of one SSA value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Query {
    pub func: FuncId,
    pub value: ValueId,
    /// If set, report what the value's pointees point to (one extra
    /// dereference), not the value itself.
    pub indirect: bool,
}

/// Callback fired once per distinct `print` call site; the node is the
/// canonical probe whose points-to set can be read off the result.
pub type PrintHook = Box<dyn FnMut(InstrRef, NodeId)>;

/// Options recognized by the analysis.
///
/// Debug tracing goes through the `log` facade; install any logger to
/// capture the per-node / per-constraint trace.
#[derive(Default)]
pub struct Config {
    /// Packages whose `init` and `main` the synthetic root calls, in
    /// order.
    pub entry_packages: Vec<String>,
    pub queries: Vec<Query>,
    pub print_hook: Option<PrintHook>,
}

impl Config {
    pub fn entry(pkg: &str) -> Self {
        Config {
            entry_packages: vec![pkg.to_string()],
            ..Config::default()
        }
    }

    pub fn add_entry(mut self, pkg: &str) -> Self {
        self.entry_packages.push(pkg.to_string());
        self
    }

    /// Requests the points-to set of `value` in `func`.
    pub fn query(mut self, func: FuncId, value: ValueId) -> Self {
        self.queries.push(Query {
            func,
            value,
            indirect: false,
        });
        self
    }

    /// Requests the points-to set one dereference past `value`.
    pub fn query_indirect(mut self, func: FuncId, value: ValueId) -> Self {
        self.queries.push(Query {
            func,
            value,
            indirect: true,
        });
        self
    }

    pub fn print_hook(mut self, hook: PrintHook) -> Self {
        self.print_hook = Some(hook);
        self
    }
}
