use arcstr::ArcStr;

use super::symbol::Symbol;
use super::value::Accessor;

/// The expression language, as a closed sum type. The parser producing these
/// nodes lives in the host; the backend only reads them. Every variant the
/// capability analyzer and the emitter dispatch on is listed here, so the two
/// stay in lock-step through exhaustive matching.
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(ArcStr),
    Path {
        accessor: Accessor,
        path: ArcStr,
    },
    Var(Symbol),
    Select {
        subject: Box<Expr>,
        path: Vec<AttrName>,
        fallback: Option<Box<Expr>>,
    },
    HasAttr {
        subject: Box<Expr>,
        path: Vec<AttrName>,
    },
    Attrs(AttrSet),
    List(Vec<Expr>),
    Lambda(Lambda),
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Let {
        bindings: Bindings,
        body: Box<Expr>,
    },
    With {
        namespace: Box<Expr>,
        body: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assert {
        condition: Box<Expr>,
        body: Box<Expr>,
    },
    Not(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Impl(Box<Expr>, Box<Expr>),
    Update(Box<Expr>, Box<Expr>),
    ConcatLists(Box<Expr>, Box<Expr>),
    /// The parser folds both `+` chains and `"..${..}.."` interpolation into
    /// this node; `force_string` is set for interpolation, where the result
    /// is a string no matter what the first part looks like.
    ConcatStrings {
        force_string: bool,
        parts: Vec<Expr>,
    },
}

/// One attribute-path segment. Only statically known names compile; a
/// dynamic segment is grounds for rejection.
pub enum AttrName {
    Static(Symbol),
    Dynamic(Box<Expr>),
}

pub struct AttrSet {
    pub recursive: bool,
    pub bindings: Bindings,
    /// `${computed} = value;` entries. Never compiled.
    pub dynamic: Vec<(Expr, Expr)>,
}

/// The binding block shared by `let` and attribute sets: plain definitions,
/// `inherit name;`, and `inherit (from) name;` entries. The `from`
/// expressions are stored once per group and evaluated once each, however
/// many names are pulled out of them.
pub struct Bindings {
    pub inherit_from: Vec<Expr>,
    pub entries: Vec<Binding>,
}

pub struct Binding {
    pub name: Symbol,
    pub value: BindingValue,
}

pub enum BindingValue {
    Plain(Expr),
    /// `inherit name;` — rebinds the name from the enclosing scope.
    Inherited,
    /// `inherit (from) name;` — index into [`Bindings::inherit_from`].
    InheritedFrom(usize),
}

pub struct Lambda {
    pub param: Param,
    pub body: Box<Expr>,
}

pub enum Param {
    Simple(Symbol),
    Formals {
        /// `args @ { ... }` binding, if any.
        binding: Option<Symbol>,
        formals: Vec<Formal>,
        ellipsis: bool,
    },
}

pub struct Formal {
    pub name: Symbol,
    pub default: Option<Expr>,
}
