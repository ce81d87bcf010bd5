use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;

use super::symbol::Symbol;

/// A fully evaluated host value, populated by the result extractor. Nested
/// values are established fresh on extraction; nothing aliases into the AST
/// or into host thunks.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(ArcStr),
    Path { accessor: Accessor, path: ArcStr },
    List(Vec<Value>),
    Attrs(IndexMap<Symbol, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

/// An opaque source-tree identity attached to path values. Two accessors are
/// the same accessor exactly when they share the same allocation, which is
/// what the accessor registry interns on.
#[derive(Clone, Debug)]
pub struct Accessor {
    root: Arc<str>,
}

impl Accessor {
    pub fn new(root: impl Into<Arc<str>>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn same(&self, other: &Accessor) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

/// The host evaluator's environment handle. The backend compiles only closed
/// expressions, so the environment contributes no bindings here; it is part
/// of the boundary signature so the caller can hand over whatever context it
/// evaluates under.
#[derive(Default)]
pub struct Env {
    _private: (),
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }
}
