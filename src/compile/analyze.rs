use indexmap::IndexSet;

use crate::lang::ast::{
    AttrName, AttrSet, Binding, BindingValue, Bindings, Expr, Formal, Lambda, Param,
};
use crate::lang::symbol::{Symbol, SymbolTable};
use crate::net::Opcode;

/// The capability analyzer: a pure, conservative predicate deciding, from
/// static information only, whether the emitter can lower an expression. It
/// must never accept what the emitter cannot produce.
pub struct Analyzer<'a> {
    symbols: &'a SymbolTable,
}

/// The traversal's scope stack: bound names, with `With` markers recording
/// that a `with` namespace is live (variables not lexically bound resolve
/// through it at run time, so they are accepted optimistically).
pub enum ScopeEntry {
    Name(Symbol),
    With,
}

impl<'a> Analyzer<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self { symbols }
    }

    pub fn can_compile(&self, expr: &Expr, scope: &mut Vec<ScopeEntry>) -> bool {
        stacker::maybe_grow(64 * 1024, 4 * 1024 * 1024, || {
            self.can_compile_inner(expr, scope)
        })
    }

    fn can_compile_inner(&self, expr: &Expr, scope: &mut Vec<ScopeEntry>) -> bool {
        match expr {
            Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Path { .. } => true,

            Expr::Var(symbol) => self.var_resolves(*symbol, scope),

            Expr::Select {
                subject,
                path,
                fallback,
            } => {
                path.iter().all(|seg| matches!(seg, AttrName::Static(_)))
                    && self.can_compile(subject, scope)
                    && fallback
                        .as_deref()
                        .map_or(true, |fb| self.can_compile(fb, scope))
            }

            Expr::HasAttr { subject, path } => {
                path.iter().all(|seg| matches!(seg, AttrName::Static(_)))
                    && self.can_compile(subject, scope)
            }

            Expr::Attrs(AttrSet {
                recursive,
                bindings,
                dynamic,
            }) => {
                if !dynamic.is_empty() {
                    return false;
                }
                if *recursive {
                    self.can_compile_group(bindings, scope, None)
                } else {
                    self.can_compile_nonrec(bindings, scope)
                }
            }

            Expr::List(elements) => elements.iter().all(|e| self.can_compile(e, scope)),

            Expr::Lambda(Lambda { param, body }) => match param {
                Param::Simple(name) => {
                    scope.push(ScopeEntry::Name(*name));
                    let ok = self.can_compile(body, scope);
                    scope.pop();
                    ok
                }
                Param::Formals {
                    binding,
                    formals,
                    ellipsis: _,
                } => {
                    if binding.is_some() {
                        return false;
                    }
                    // formals go into scope before their defaults are
                    // checked; defaults may reference sibling formals
                    let depth = scope.len();
                    for formal in formals {
                        scope.push(ScopeEntry::Name(formal.name));
                    }
                    let ok = formals.iter().all(|Formal { default, .. }| {
                        default
                            .as_ref()
                            .map_or(true, |d| self.can_compile(d, scope))
                    }) && self.can_compile(body, scope);
                    scope.truncate(depth);
                    ok
                }
            },

            Expr::Call {
                function,
                arguments,
            } => {
                let shadowed = match function.as_ref() {
                    Expr::Var(symbol) => lexically_bound(scope, *symbol),
                    _ => false,
                };
                match call_shape(self.symbols, function, arguments, shadowed) {
                    CallShape::Arith(_, a, b) | CallShape::Less(a, b) => {
                        arith_operand(a)
                            && arith_operand(b)
                            && self.can_compile(a, scope)
                            && self.can_compile(b, scope)
                    }
                    CallShape::ToString(inner) => self.can_compile(inner, scope),
                    CallShape::General => {
                        self.can_compile(function, scope)
                            && arguments.iter().all(|a| self.can_compile(a, scope))
                    }
                }
            }

            Expr::Let { bindings, body } => self.can_compile_group(bindings, scope, Some(body)),

            Expr::With { namespace, body } => {
                if !self.can_compile(namespace, scope) {
                    return false;
                }
                scope.push(ScopeEntry::With);
                let ok = self.can_compile(body, scope);
                scope.pop();
                ok
            }

            Expr::If {
                condition,
                then,
                otherwise,
            } => {
                self.can_compile(condition, scope)
                    && self.can_compile(then, scope)
                    && self.can_compile(otherwise, scope)
            }

            Expr::Assert { condition, body } => {
                self.can_compile(condition, scope) && self.can_compile(body, scope)
            }

            Expr::Not(a) => self.can_compile(a, scope),

            Expr::Eq(a, b) | Expr::Ne(a, b) => {
                arith_operand(a)
                    && arith_operand(b)
                    && self.can_compile(a, scope)
                    && self.can_compile(b, scope)
            }

            Expr::And(a, b) | Expr::Or(a, b) | Expr::Impl(a, b) => {
                self.can_compile(a, scope) && self.can_compile(b, scope)
            }

            Expr::Update(a, b) | Expr::ConcatLists(a, b) => {
                self.can_compile(a, scope) && self.can_compile(b, scope)
            }

            Expr::ConcatStrings {
                force_string,
                parts,
            } => {
                if parts.is_empty() {
                    return false;
                }
                let string_mode = *force_string || is_string_shaped(&parts[0]);
                if string_mode {
                    parts.iter().all(|p| self.can_compile(p, scope))
                } else {
                    // numeric addition on the VM's 32-bit words
                    parts
                        .iter()
                        .all(|p| arith_operand(p) && self.can_compile(p, scope))
                }
            }
        }
    }

    fn var_resolves(&self, symbol: Symbol, scope: &[ScopeEntry]) -> bool {
        if lexically_bound(scope, symbol) {
            return true;
        }
        if builtin_constant(self.symbols.resolve(symbol)) {
            return true;
        }
        // statically resolvable through a with, optimistically
        scope.iter().any(|entry| matches!(entry, ScopeEntry::With))
    }

    /// Non-recursive attribute sets bind nothing; only the inherit sources
    /// and the entry values must compile in the enclosing scope.
    fn can_compile_nonrec(&self, bindings: &Bindings, scope: &mut Vec<ScopeEntry>) -> bool {
        bindings
            .inherit_from
            .iter()
            .all(|from| self.can_compile(from, scope))
            && bindings.entries.iter().all(|binding| {
                match &binding.value {
                    BindingValue::Plain(value) => self.can_compile(value, scope),
                    BindingValue::Inherited => self.var_resolves(binding.name, scope),
                    BindingValue::InheritedFrom(index) => *index < bindings.inherit_from.len(),
                }
            })
    }

    /// `let` and recursive attribute sets: accepted only if the bindings
    /// are non-cyclic under their free-variable dependency graph. There is
    /// no fixpoint encoding; a cycle is rejected, not deferred.
    fn can_compile_group(
        &self,
        bindings: &Bindings,
        scope: &mut Vec<ScopeEntry>,
        body: Option<&Expr>,
    ) -> bool {
        // inherit sources resolve outside the group
        if !bindings
            .inherit_from
            .iter()
            .all(|from| self.can_compile(from, scope))
        {
            return false;
        }
        for binding in &bindings.entries {
            match &binding.value {
                BindingValue::Inherited => {
                    if !self.var_resolves(binding.name, scope) {
                        return false;
                    }
                }
                BindingValue::InheritedFrom(index) => {
                    if *index >= bindings.inherit_from.len() {
                        return false;
                    }
                }
                BindingValue::Plain(_) => {}
            }
        }

        if toposort_bindings(bindings).is_none() {
            return false;
        }

        let depth = scope.len();
        for binding in &bindings.entries {
            scope.push(ScopeEntry::Name(binding.name));
        }
        let ok = bindings.entries.iter().all(|binding| match &binding.value {
            BindingValue::Plain(value) => self.can_compile(value, scope),
            _ => true,
        }) && body.map_or(true, |b| self.can_compile(b, scope));
        scope.truncate(depth);
        ok
    }
}

fn lexically_bound(scope: &[ScopeEntry], symbol: Symbol) -> bool {
    scope
        .iter()
        .any(|entry| matches!(entry, ScopeEntry::Name(s) if *s == symbol))
}

/// `true`, `false` and `null` are the fixed builtin constants; everything
/// else free is a rejection.
pub(crate) fn builtin_constant(name: &str) -> bool {
    matches!(name, "true" | "false" | "null")
}

/// The recognized shapes of a call node. Arithmetic and comparison are
/// accepted only when they resolve, by shape, to one of the fixed primitive
/// operator symbols applied to exactly two operands, and the symbol is not
/// shadowed by a live binding.
pub(crate) enum CallShape<'a> {
    Arith(Opcode, &'a Expr, &'a Expr),
    Less(&'a Expr, &'a Expr),
    ToString(&'a Expr),
    General,
}

pub(crate) fn call_shape<'a>(
    symbols: &SymbolTable,
    function: &'a Expr,
    arguments: &'a [Expr],
    shadowed: bool,
) -> CallShape<'a> {
    if shadowed {
        return CallShape::General;
    }
    if let Expr::Var(symbol) = function {
        match (symbols.resolve(*symbol), arguments) {
            ("__sub", [a, b]) => return CallShape::Arith(Opcode::Sub, a, b),
            ("__mul", [a, b]) => return CallShape::Arith(Opcode::Mul, a, b),
            ("__div", [a, b]) => return CallShape::Arith(Opcode::Div, a, b),
            ("__lessThan", [a, b]) => return CallShape::Less(a, b),
            ("toString", [a]) => return CallShape::ToString(a),
            _ => {}
        }
    }
    CallShape::General
}

/// Statically string-shaped: a literal, or a concatenation that starts with
/// one. This is the best-effort, first-operand heuristic for classifying
/// `+`: anything else is assumed numeric.
pub(crate) fn is_string_shaped(expr: &Expr) -> bool {
    match expr {
        Expr::Str(_) | Expr::Path { .. } => true,
        Expr::ConcatStrings {
            force_string: true, ..
        } => true,
        Expr::ConcatStrings { parts, .. } => parts.first().map_or(false, is_string_shaped),
        _ => false,
    }
}

pub(crate) fn is_float_shaped(expr: &Expr) -> bool {
    matches!(expr, Expr::Float(_))
}

/// An operand admissible to the VM's binary numeric primitives: statically
/// neither string- nor float-shaped (the primitives assume 32-bit words).
pub(crate) fn arith_operand(expr: &Expr) -> bool {
    !is_string_shaped(expr) && !is_float_shaped(expr)
}

/// Orders the group's bindings by dependency (Kahn's algorithm), restricted
/// to the candidate binding names. `None` on a cycle. Used both here for
/// rejection and by the emitter for its nesting order, so the two can never
/// disagree.
pub(crate) fn toposort_bindings(bindings: &Bindings) -> Option<Vec<usize>> {
    let names: Vec<Symbol> = bindings.entries.iter().map(|b| b.name).collect();
    let count = names.len();

    // per-binding dependencies on sibling names, via free-variable collection
    let mut deps: Vec<IndexSet<usize>> = Vec::with_capacity(count);
    for Binding { value, .. } in &bindings.entries {
        let mut free = IndexSet::new();
        if let BindingValue::Plain(expr) = value {
            let mut bound = Vec::new();
            free_vars(expr, &mut bound, &mut free);
        }
        let dep_set = names
            .iter()
            .enumerate()
            .filter(|(_, name)| free.contains(*name))
            .map(|(index, _)| index)
            .collect();
        deps.push(dep_set);
    }

    let mut indegree: Vec<usize> = deps.iter().map(|d| d.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, dep_set) in deps.iter().enumerate() {
        for dep in dep_set {
            dependents[*dep].push(index);
        }
    }

    let mut queue: std::collections::VecDeque<usize> = (0..count)
        .filter(|i| indegree[*i] == 0)
        .collect();
    let mut order = Vec::with_capacity(count);
    while let Some(index) = queue.pop_front() {
        order.push(index);
        for &dependent in &dependents[index] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() == count {
        Some(order)
    } else {
        None
    }
}

/// Collects variables not bound within `expr` itself. Conservative with
/// respect to `with`: variables that might resolve through a namespace are
/// still reported, which matches how the emitter resolves them (lexical
/// bindings win over any `with`).
pub(crate) fn free_vars(expr: &Expr, bound: &mut Vec<Symbol>, out: &mut IndexSet<Symbol>) {
    match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Path { .. } => {}

        Expr::Var(symbol) => {
            if !bound.contains(symbol) {
                out.insert(*symbol);
            }
        }

        Expr::Select {
            subject, fallback, ..
        } => {
            free_vars(subject, bound, out);
            if let Some(fb) = fallback {
                free_vars(fb, bound, out);
            }
        }

        Expr::HasAttr { subject, .. } => free_vars(subject, bound, out),

        Expr::Attrs(AttrSet {
            recursive,
            bindings,
            dynamic,
        }) => {
            for (name, value) in dynamic {
                free_vars(name, bound, out);
                free_vars(value, bound, out);
            }
            free_vars_bindings(bindings, *recursive, None, bound, out);
        }

        Expr::List(elements) => {
            for element in elements {
                free_vars(element, bound, out);
            }
        }

        Expr::Lambda(Lambda { param, body }) => {
            let depth = bound.len();
            match param {
                Param::Simple(name) => bound.push(*name),
                Param::Formals {
                    binding, formals, ..
                } => {
                    if let Some(name) = binding {
                        bound.push(*name);
                    }
                    for formal in formals {
                        bound.push(formal.name);
                    }
                    for formal in formals {
                        if let Some(default) = &formal.default {
                            free_vars(default, bound, out);
                        }
                    }
                }
            }
            free_vars(body, bound, out);
            bound.truncate(depth);
        }

        Expr::Call {
            function,
            arguments,
        } => {
            free_vars(function, bound, out);
            for argument in arguments {
                free_vars(argument, bound, out);
            }
        }

        Expr::Let { bindings, body } => {
            free_vars_bindings(bindings, true, Some(body), bound, out);
        }

        Expr::With { namespace, body } => {
            free_vars(namespace, bound, out);
            free_vars(body, bound, out);
        }

        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            free_vars(condition, bound, out);
            free_vars(then, bound, out);
            free_vars(otherwise, bound, out);
        }

        Expr::Assert { condition, body } => {
            free_vars(condition, bound, out);
            free_vars(body, bound, out);
        }

        Expr::Not(a) => free_vars(a, bound, out),

        Expr::Eq(a, b)
        | Expr::Ne(a, b)
        | Expr::And(a, b)
        | Expr::Or(a, b)
        | Expr::Impl(a, b)
        | Expr::Update(a, b)
        | Expr::ConcatLists(a, b) => {
            free_vars(a, bound, out);
            free_vars(b, bound, out);
        }

        Expr::ConcatStrings { parts, .. } => {
            for part in parts {
                free_vars(part, bound, out);
            }
        }
    }
}

fn free_vars_bindings(
    bindings: &Bindings,
    recursive: bool,
    body: Option<&Expr>,
    bound: &mut Vec<Symbol>,
    out: &mut IndexSet<Symbol>,
) {
    // inherit sources and plain `inherit` names resolve outside the group
    for from in &bindings.inherit_from {
        free_vars(from, bound, out);
    }
    for binding in &bindings.entries {
        if matches!(binding.value, BindingValue::Inherited) && !bound.contains(&binding.name) {
            out.insert(binding.name);
        }
    }
    let depth = bound.len();
    if recursive {
        for binding in &bindings.entries {
            bound.push(binding.name);
        }
    }
    for binding in &bindings.entries {
        if let BindingValue::Plain(value) = &binding.value {
            free_vars(value, bound, out);
        }
    }
    if let Some(body) = body {
        if !recursive {
            for binding in &bindings.entries {
                bound.push(binding.name);
            }
        }
        free_vars(body, bound, out);
    }
    bound.truncate(depth);
}
