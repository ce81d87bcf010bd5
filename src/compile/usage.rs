//! Pass 1: variable-use counting. Walks an expression over the same
//! scope-stack discipline as emission, incrementing the use counter on the
//! innermost matching binding for every reference, and only for bindings
//! still in their counting state (no heap slot yet). Bindings that already
//! have a slot were counted when their own group ran this pass; a later
//! re-entrant walk must not double-count them.

use super::analyze::{builtin_constant, call_shape, CallShape};
use super::context::{CompileContext, VarBinding};
use crate::lang::ast::{
    AttrName, AttrSet, BindingValue, Bindings, Expr, Lambda, Param,
};
use crate::lang::symbol::{Symbol, SymbolTable};

pub(crate) fn count(ctx: &mut CompileContext, symbols: &SymbolTable, expr: &Expr) {
    stacker::maybe_grow(64 * 1024, 4 * 1024 * 1024, || {
        count_inner(ctx, symbols, expr)
    })
}

/// Counts one variable reference: the innermost lexical match wins; failing
/// that, a reference resolved through `with` consumes one lookup on every
/// enclosing namespace, so each counting `with` binding is incremented.
pub(crate) fn count_var(ctx: &mut CompileContext, symbols: &SymbolTable, symbol: Symbol, skip: Option<u32>) {
    if let Some(binding) = ctx.lookup_mut(symbol, skip) {
        if binding.is_counting() {
            binding.uses += 1;
        }
        return;
    }
    if builtin_constant(symbols.resolve(symbol)) {
        return;
    }
    for with in ctx.withs.iter_mut() {
        if with.is_counting() {
            with.uses += 1;
        }
    }
}

fn count_inner(ctx: &mut CompileContext, symbols: &SymbolTable, expr: &Expr) {
    match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Path { .. } => {}

        Expr::Var(symbol) => count_var(ctx, symbols, *symbol, None),

        Expr::Select {
            subject,
            path,
            fallback,
        } => {
            count(ctx, symbols, subject);
            for segment in path {
                if let AttrName::Dynamic(name) = segment {
                    count(ctx, symbols, name);
                }
            }
            if let Some(fb) = fallback {
                count(ctx, symbols, fb);
            }
        }

        Expr::HasAttr { subject, .. } => count(ctx, symbols, subject),

        Expr::Attrs(AttrSet {
            recursive,
            bindings,
            dynamic: _,
        }) => count_bindings(ctx, symbols, bindings, *recursive, None),

        Expr::List(elements) => {
            for element in elements {
                count(ctx, symbols, element);
            }
        }

        Expr::Lambda(Lambda { param, body }) => {
            let group = ctx.fresh_group();
            let depth = ctx.scope.len();
            match param {
                Param::Simple(name) => {
                    ctx.scope.push(VarBinding::counting(Some(*name), group));
                }
                Param::Formals {
                    binding, formals, ..
                } => {
                    if let Some(name) = binding {
                        ctx.scope.push(VarBinding::counting(Some(*name), group));
                    }
                    for formal in formals {
                        ctx.scope
                            .push(VarBinding::counting(Some(formal.name), group));
                    }
                    for formal in formals {
                        if let Some(default) = &formal.default {
                            count(ctx, symbols, default);
                        }
                    }
                }
            }
            count(ctx, symbols, body);
            ctx.scope.truncate(depth);
        }

        Expr::Call {
            function,
            arguments,
        } => {
            let shadowed = match function.as_ref() {
                Expr::Var(symbol) => ctx.is_lexically_bound(*symbol),
                _ => false,
            };
            match call_shape(symbols, function, arguments, shadowed) {
                CallShape::Arith(_, a, b) | CallShape::Less(a, b) => {
                    count(ctx, symbols, a);
                    count(ctx, symbols, b);
                }
                CallShape::ToString(inner) => count(ctx, symbols, inner),
                CallShape::General => {
                    count(ctx, symbols, function);
                    for argument in arguments {
                        count(ctx, symbols, argument);
                    }
                }
            }
        }

        Expr::Let { bindings, body } => {
            count_bindings(ctx, symbols, bindings, true, Some(body))
        }

        Expr::With { namespace, body } => {
            count(ctx, symbols, namespace);
            let group = ctx.fresh_group();
            ctx.withs.push(VarBinding::counting(None, group));
            count(ctx, symbols, body);
            ctx.withs.pop();
        }

        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            count(ctx, symbols, condition);
            count(ctx, symbols, then);
            count(ctx, symbols, otherwise);
        }

        Expr::Assert { condition, body } => {
            count(ctx, symbols, condition);
            count(ctx, symbols, body);
        }

        Expr::Not(a) => count(ctx, symbols, a),

        Expr::Eq(a, b)
        | Expr::Ne(a, b)
        | Expr::And(a, b)
        | Expr::Or(a, b)
        | Expr::Impl(a, b)
        | Expr::Update(a, b)
        | Expr::ConcatLists(a, b) => {
            count(ctx, symbols, a);
            count(ctx, symbols, b);
        }

        Expr::ConcatStrings { parts, .. } => {
            for part in parts {
                count(ctx, symbols, part);
            }
        }
    }
}

fn count_bindings(
    ctx: &mut CompileContext,
    symbols: &SymbolTable,
    bindings: &Bindings,
    recursive: bool,
    body: Option<&Expr>,
) {
    // inherit sources resolve outside the group
    for from in &bindings.inherit_from {
        count(ctx, symbols, from);
    }
    let group = ctx.fresh_group();
    let depth = ctx.scope.len();
    if recursive {
        for binding in &bindings.entries {
            ctx.scope
                .push(VarBinding::counting(Some(binding.name), group));
        }
    }
    for binding in &bindings.entries {
        match &binding.value {
            BindingValue::Plain(value) => count(ctx, symbols, value),
            BindingValue::Inherited => {
                count_var(ctx, symbols, binding.name, Some(group));
            }
            BindingValue::InheritedFrom(_) => {}
        }
    }
    if let Some(body) = body {
        if !recursive {
            for binding in &bindings.entries {
                ctx.scope
                    .push(VarBinding::counting(Some(binding.name), group));
            }
        }
        count(ctx, symbols, body);
    }
    ctx.scope.truncate(depth);
}
