//! Host-facing interface types: the AST consumed by the backend, the symbol
//! table shared with the host evaluator, and the value sink populated on a
//! successful evaluation. The backend never produces these, only consumes
//! (`Expr`, `SymbolTable`, `Env`) or fills (`Value`).

pub mod ast;
pub mod symbol;
pub mod value;
