//! Fatal errors and non-fatal unsoundness warnings.

use std::fmt;

use thiserror::Error;

use crate::ssa::InstrRef;

/// A fatal error: configuration problems surface before generation
/// starts, unsupported input shapes surface during it. Either way the run
/// produces no result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no entry packages given")]
    NoEntryPackages,

    #[error("duplicate entry package `{0}`")]
    DuplicateEntryPackage(String),

    #[error("entry package `{0}` has no main function")]
    NoMainFunction(String),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("unsupported conversion {from} -> {to} in {func}")]
    UnsupportedConversion {
        from: String,
        to: String,
        func: String,
    },
}

/// A non-fatal finding: the analysis continued, but the result may be
/// unsound around the reported position.
#[derive(Debug, Clone)]
pub struct Warning {
    pub site: Option<InstrRef>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.site {
            Some(site) => write!(f, "{}: {}", site, self.message),
            None => f.write_str(&self.message),
        }
    }
}
