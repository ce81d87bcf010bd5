//! An alternative evaluator backend for a lazy, purely functional
//! configuration language. Instead of walking the AST with a tree
//! interpreter, a restricted subset of expressions is compiled into a term
//! graph for an optimal-reduction graph-rewriting engine, reduced to normal
//! form, and the result is translated back into host values. Anything
//! outside the supported subset makes the whole attempt fall back to the
//! standard evaluator, with zero observable side effects.

pub mod backend;
pub mod compile;
pub mod encode;
pub mod extract;
pub mod lang;
pub mod net;

#[cfg(test)]
mod test;

pub use backend::{NetBackend, Stats};
pub use lang::ast::Expr;
pub use lang::symbol::{Symbol, SymbolTable};
pub use lang::value::{Accessor, Env, Value};
pub use net::runtime::RuntimeOptions;
