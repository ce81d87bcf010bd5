//! The two-pass compiler from host expressions to net terms, and the
//! conservative capability analyzer that must predict, ahead of time,
//! exactly what the emitter can lower. The two dispatch over the same closed
//! expression type with exhaustive matches; any node class the emitter
//! cannot faithfully lower is rejected by the analyzer, never discovered as
//! a runtime surprise.

pub mod analyze;
pub mod context;
pub mod emit;
pub mod recur;
pub mod usage;

use crate::lang::symbol::Symbol;
use crate::net::NetError;

pub use analyze::Analyzer;
pub use emit::Compiler;

/// Failures while emitting. All of them resolve to a fallback; none carry
/// user-facing diagnostics because the standard evaluator re-evaluates and
/// reports in its own words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// A construct the emitter does not lower. With the analyzer in
    /// lock-step this is unreachable, but it is an error, not a panic.
    Unsupported(&'static str),
    UnboundVariable(Symbol),
    DependencyCycle,
    /// A duplication chain handed out more projections than the counting
    /// pass sized it for.
    ProjectionOverflow,
    /// A binding went out of scope with unconsumed projections.
    ProjectionUnderflow,
    Net(NetError),
}

impl From<NetError> for CompileError {
    fn from(error: NetError) -> Self {
        CompileError::Net(error)
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Unsupported(what) => write!(f, "unsupported expression: {}", what),
            CompileError::UnboundVariable(symbol) => {
                write!(f, "unbound variable #{}", symbol.id())
            }
            CompileError::DependencyCycle => write!(f, "cyclic bindings"),
            CompileError::ProjectionOverflow => write!(f, "duplication chain over-consumed"),
            CompileError::ProjectionUnderflow => write!(f, "duplication chain under-consumed"),
            CompileError::Net(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for CompileError {}

pub(crate) type Result<T> = std::result::Result<T, CompileError>;
