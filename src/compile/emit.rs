//! Pass 2: emission. Re-walks the expression over the same scope discipline
//! as counting, this time allocating a heap slot per binding before emitting
//! its scope's body, and resolving every variable reference to either a
//! direct reference (at most one use) or a projection out of a duplication
//! chain. Binder constructs all follow the same builder-lambda idiom:
//! pre-allocate the slot, compile the body against it, seal the lambda at
//! that slot, then apply it to the separately compiled bound value, so later
//! bindings compile with earlier bindings already in scope.

use super::analyze::{call_shape, is_string_shaped, toposort_bindings, CallShape};
use super::context::{CompileContext, DupChain, VarBinding};
use super::recur::{fix, Recur};
use super::usage;
use super::{CompileError, Result};
use crate::encode::{attrs, big_int, float, list, path, string, tag, AccessorRegistry, StringTable};
use crate::lang::ast::{
    AttrName, AttrSet, BindingValue, Bindings, Expr, Lambda, Param,
};
use crate::lang::symbol::{Symbol, SymbolTable};
use crate::net::{Opcode, Runtime, Slot, Term};

enum GroupBody<'e> {
    Expression(&'e Expr),
    AttrSpine,
}

pub struct Compiler<'a> {
    pub(crate) rt: &'a mut Runtime,
    pub(crate) symbols: &'a SymbolTable,
    pub(crate) strings: &'a mut StringTable,
    pub(crate) accessors: &'a mut AccessorRegistry,
    pub(crate) ctx: CompileContext,
}

impl<'a> Compiler<'a> {
    pub fn new(
        rt: &'a mut Runtime,
        symbols: &'a SymbolTable,
        strings: &'a mut StringTable,
        accessors: &'a mut AccessorRegistry,
    ) -> Self {
        Self {
            rt,
            symbols,
            strings,
            accessors,
            ctx: CompileContext::new(),
        }
    }

    pub fn compile(&mut self, expr: &Expr) -> Result<Term> {
        let root = self.emit(expr)?;
        if !self.ctx.scope.is_empty() || !self.ctx.withs.is_empty() {
            return Err(CompileError::Unsupported("scope imbalance"));
        }
        Ok(root)
    }

    /// Compile-time duplication nodes allocated so far.
    pub fn dup_nodes(&self) -> u32 {
        self.ctx.dup_nodes
    }

    // ------------------------------------------------------------------
    // small term builders

    pub(crate) fn app(&mut self, function: Term, argument: Term) -> Result<Term> {
        self.rt.app_node(function, argument).map_err(Into::into)
    }

    pub(crate) fn op(&mut self, op: Opcode, lhs: Term, rhs: Term) -> Result<Term> {
        self.rt.op2_node(op, lhs, rhs).map_err(Into::into)
    }

    pub(crate) fn ctr(&mut self, tag: u32, fields: &[Term]) -> Result<Term> {
        self.rt.ctr_node(tag, fields).map_err(Into::into)
    }

    pub(crate) fn mat(
        &mut self,
        scrutinee: Term,
        arms: &[(u32, Term)],
        default: Term,
    ) -> Result<Term> {
        self.rt
            .mat_node(scrutinee, arms, default)
            .map_err(Into::into)
    }

    pub(crate) fn lam(
        &mut self,
        build: impl FnOnce(&mut Self, Term) -> Result<Term>,
    ) -> Result<Term> {
        let slot = self.rt.alloc(1)?;
        let body = build(self, Term::var(slot))?;
        self.rt.set(slot, body);
        Ok(Term::lam(slot))
    }

    /// A lambda that ignores its argument.
    pub(crate) fn lam_const(&mut self, body: Term) -> Result<Term> {
        let slot = self.rt.alloc(1)?;
        self.rt.set(slot, body);
        Ok(Term::lam(slot))
    }

    fn const2(&mut self, body: Term) -> Result<Term> {
        let inner = self.lam_const(body)?;
        self.lam_const(inner)
    }

    fn identity_lam(&mut self) -> Result<Term> {
        let slot = self.rt.alloc(1)?;
        self.rt.set(slot, Term::var(slot));
        Ok(Term::lam(slot))
    }

    /// `~cond {0: on_zero; _: otherwise}` — the otherwise arm goes through
    /// one indirection because the match primitive reaches its non-matching
    /// branch by application to the scrutinee.
    pub(crate) fn swi(&mut self, cond: Term, on_zero: Term, otherwise: Term) -> Result<Term> {
        let other = self.lam_const(otherwise)?;
        self.mat(cond, &[(0, on_zero)], other)
    }

    fn num_to_bool(&mut self, word: Term) -> Result<Term> {
        self.swi(word, Term::ctr0(tag::FLS), Term::ctr0(tag::TRU))
    }

    /// N projections of one value, via a duplication chain when N > 1.
    pub(crate) fn dup_terms(&mut self, source: Term, n: u32) -> Result<Vec<Term>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if n == 1 {
            return Ok(vec![source]);
        }
        let label = self.ctx.fresh_label();
        let mut chain = DupChain::build(self.rt, label, source, n)?;
        self.ctx.dup_nodes += chain.node_count();
        let mut terms = Vec::with_capacity(n as usize);
        for _ in 0..n {
            terms.push(chain.take()?);
        }
        chain.finish()?;
        Ok(terms)
    }

    fn assign_binding(&mut self, index: usize) -> Result<()> {
        let uses = self.ctx.scope[index].uses;
        let slot = self.rt.alloc(1)?;
        let chain = if uses > 1 {
            let label = self.ctx.fresh_label();
            let chain = DupChain::build(self.rt, label, Term::var(slot), uses)?;
            self.ctx.dup_nodes += chain.node_count();
            Some(chain)
        } else {
            None
        };
        let binding = &mut self.ctx.scope[index];
        binding.slot = Some(slot);
        binding.chain = chain;
        Ok(())
    }

    fn pop_scope(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            let binding = self
                .ctx
                .scope
                .pop()
                .ok_or(CompileError::Unsupported("scope imbalance"))?;
            binding.finish()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // expression dispatch

    pub(crate) fn emit(&mut self, expr: &Expr) -> Result<Term> {
        stacker::maybe_grow(64 * 1024, 4 * 1024 * 1024, || self.emit_inner(expr))
    }

    fn emit_inner(&mut self, expr: &Expr) -> Result<Term> {
        match expr {
            Expr::Int(value) => big_int::encode(self.rt, *value).map_err(Into::into),
            Expr::Float(value) => float::encode(self.rt, *value).map_err(Into::into),
            Expr::Str(text) => string::literal(self.rt, self.strings, text).map_err(Into::into),
            Expr::Path { accessor, path } => {
                path::build(self.rt, self.accessors, self.strings, accessor, path)
                    .map_err(Into::into)
            }

            Expr::Var(symbol) => self.emit_var(*symbol, None),

            Expr::Select {
                subject,
                path,
                fallback,
            } => self.emit_select(subject, path, fallback.as_deref()),

            Expr::HasAttr { subject, path } => self.emit_has_attr(subject, path),

            Expr::Attrs(AttrSet {
                recursive,
                bindings,
                dynamic,
            }) => {
                if !dynamic.is_empty() {
                    return Err(CompileError::Unsupported("dynamic attribute names"));
                }
                if *recursive {
                    self.emit_group(bindings, GroupBody::AttrSpine)
                } else {
                    self.emit_attrs_nonrec(bindings)
                }
            }

            Expr::List(elements) => {
                let mut terms = Vec::with_capacity(elements.len());
                for element in elements {
                    terms.push(self.emit(element)?);
                }
                list::build(self.rt, &terms).map_err(Into::into)
            }

            Expr::Lambda(lambda) => self.emit_lambda(lambda),

            Expr::Call {
                function,
                arguments,
            } => self.emit_call(function, arguments),

            Expr::Let { bindings, body } => {
                self.emit_group(bindings, GroupBody::Expression(&**body))
            }

            Expr::With { namespace, body } => self.emit_with(namespace, body),

            Expr::If {
                condition,
                then,
                otherwise,
            } => {
                let cond = self.emit(condition)?;
                let otherwise = self.emit(otherwise)?;
                let then = self.emit(then)?;
                let then_arm = self.lam_const(then)?;
                self.mat(
                    cond,
                    &[
                        (0, otherwise),
                        (tag::FLS, otherwise),
                        (tag::ERR, Term::ctr0(tag::ERR)),
                    ],
                    then_arm,
                )
            }

            Expr::Assert { condition, body } => {
                let cond = self.emit(condition)?;
                let body = self.emit(body)?;
                let then_arm = self.lam_const(body)?;
                self.mat(
                    cond,
                    &[
                        (0, Term::ctr0(tag::ERR)),
                        (tag::FLS, Term::ctr0(tag::ERR)),
                        (tag::ERR, Term::ctr0(tag::ERR)),
                    ],
                    then_arm,
                )
            }

            Expr::Not(inner) => {
                let value = self.emit(inner)?;
                let on_true = self.lam_const(Term::ctr0(tag::FLS))?;
                self.mat(
                    value,
                    &[
                        (0, Term::ctr0(tag::TRU)),
                        (tag::FLS, Term::ctr0(tag::TRU)),
                        (tag::ERR, Term::ctr0(tag::ERR)),
                    ],
                    on_true,
                )
            }

            Expr::Eq(a, b) => self.emit_eq(a, b),
            Expr::Ne(a, b) => {
                let eq = self.emit_eq(a, b)?;
                let broken = self.lam_const(Term::ctr0(tag::ERR))?;
                self.mat(
                    eq,
                    &[
                        (tag::TRU, Term::ctr0(tag::FLS)),
                        (tag::FLS, Term::ctr0(tag::TRU)),
                    ],
                    broken,
                )
            }

            Expr::And(a, b) => {
                let lhs = self.emit(a)?;
                let rhs = self.emit(b)?;
                let on_true = self.lam_const(rhs)?;
                self.mat(
                    lhs,
                    &[
                        (0, Term::ctr0(tag::FLS)),
                        (tag::FLS, Term::ctr0(tag::FLS)),
                        (tag::ERR, Term::ctr0(tag::ERR)),
                    ],
                    on_true,
                )
            }
            Expr::Or(a, b) => {
                let lhs = self.emit(a)?;
                let rhs = self.emit(b)?;
                let on_true = self.lam_const(Term::ctr0(tag::TRU))?;
                self.mat(
                    lhs,
                    &[
                        (0, rhs),
                        (tag::FLS, rhs),
                        (tag::ERR, Term::ctr0(tag::ERR)),
                    ],
                    on_true,
                )
            }
            Expr::Impl(a, b) => {
                let lhs = self.emit(a)?;
                let rhs = self.emit(b)?;
                let on_true = self.lam_const(rhs)?;
                self.mat(
                    lhs,
                    &[
                        (0, Term::ctr0(tag::TRU)),
                        (tag::FLS, Term::ctr0(tag::TRU)),
                        (tag::ERR, Term::ctr0(tag::ERR)),
                    ],
                    on_true,
                )
            }

            Expr::Update(a, b) => self.emit_update(a, b),
            Expr::ConcatLists(a, b) => self.emit_concat_lists(a, b),

            Expr::ConcatStrings {
                force_string,
                parts,
            } => self.emit_concat_strings(*force_string, parts),
        }
    }

    // ------------------------------------------------------------------
    // variables

    fn emit_var(&mut self, symbol: Symbol, skip: Option<u32>) -> Result<Term> {
        if let Some(binding) = self.ctx.lookup_mut(symbol, skip) {
            return binding.take_ref();
        }
        match self.symbols.resolve(symbol) {
            "true" => return Ok(Term::ctr0(tag::TRU)),
            "false" => return Ok(Term::ctr0(tag::FLS)),
            "null" => return Ok(Term::ctr0(tag::NUL)),
            _ => {}
        }
        if !self.ctx.withs.is_empty() {
            return self.emit_with_chain(symbol);
        }
        Err(CompileError::UnboundVariable(symbol))
    }

    /// A variable resolved through `with`: try each enclosing namespace,
    /// innermost first, at run time. Exhausting the chain is an evaluation
    /// failure.
    fn emit_with_chain(&mut self, symbol: Symbol) -> Result<Term> {
        let key = symbol.id();
        let mut projections = Vec::with_capacity(self.ctx.withs.len());
        for with in self.ctx.withs.iter_mut() {
            projections.push(with.take_ref()?);
        }
        // built outermost-in, so the innermost namespace is consulted first
        let mut result = Term::ctr0(tag::ERR);
        for projection in projections {
            let lookup = self.maybe_lookup(projection, key)?;
            let found = self.identity_lam()?;
            let broken = self.lam_const(Term::ctr0(tag::ERR))?;
            result = self.mat(lookup, &[(tag::SOM, found), (tag::NON, result)], broken)?;
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // attribute lookup

    /// `Som{value}` if `subject` is an attribute set containing `key`,
    /// `Non` otherwise (including when `subject` is no attribute set at
    /// all, so selection with a fallback can degrade at any path level).
    fn maybe_lookup(&mut self, subject: Term, key: u32) -> Result<Term> {
        let found_arm = self.lam(move |c, spine| {
            let scan = c.scan_combinator()?;
            let with_key = c.app(scan, Term::num(key))?;
            c.app(with_key, spine)
        })?;
        let miss = self.lam_const(Term::ctr0(tag::NON))?;
        // an upstream evaluation failure passes through instead of reading
        // as a missing attribute
        self.mat(
            subject,
            &[(tag::ATS, found_arm), (tag::ERR, Term::ctr0(tag::ERR))],
            miss,
        )
    }

    /// Linear scan over the sorted spine, short-circuiting on the first key
    /// match. The key is duplicated once per step: one copy feeds the
    /// comparison, the other travels into the recursion.
    fn scan_combinator(&mut self) -> Result<Term> {
        fix(self, 1, |c, recur| {
            c.lam(move |c, key| {
                c.lam(move |c, spine| {
                    let keys = c.dup_terms(key, 2)?;
                    let con_arm = c.lam(move |c, head| {
                        c.lam(move |c, tail| {
                            let atr_arm = c.lam(move |c, k| {
                                c.lam(move |c, v| {
                                    let hit = c.ctr(tag::SOM, &[v])?;
                                    let equal = c.op(Opcode::Eq, k, keys[0])?;
                                    let miss = recur.call(c, &[keys[1], tail])?;
                                    c.swi(equal, miss, hit)
                                })
                            })?;
                            let broken = c.lam_const(Term::ctr0(tag::NON))?;
                            c.mat(head, &[(tag::ATR, atr_arm)], broken)
                        })
                    })?;
                    let broken = c.lam_const(Term::ctr0(tag::NON))?;
                    c.mat(
                        spine,
                        &[(tag::NIL, Term::ctr0(tag::NON)), (tag::CON, con_arm)],
                        broken,
                    )
                })
            })
        })
    }

    fn unwrap_or_err(&mut self, lookup: Term) -> Result<Term> {
        let found = self.identity_lam()?;
        let broken = self.lam_const(Term::ctr0(tag::ERR))?;
        self.mat(
            lookup,
            &[(tag::SOM, found), (tag::NON, Term::ctr0(tag::ERR))],
            broken,
        )
    }

    fn static_keys(path: &[AttrName]) -> Result<Vec<u32>> {
        path.iter()
            .map(|segment| match segment {
                AttrName::Static(symbol) => Ok(symbol.id()),
                AttrName::Dynamic(_) => Err(CompileError::Unsupported("dynamic attribute path")),
            })
            .collect()
    }

    fn emit_select(
        &mut self,
        subject: &Expr,
        path: &[AttrName],
        fallback: Option<&Expr>,
    ) -> Result<Term> {
        let subject_term = self.emit(subject)?;
        let keys = Self::static_keys(path)?;
        let Some((&first, rest)) = keys.split_first() else {
            return Ok(subject_term);
        };
        match fallback {
            None => {
                let mut current = subject_term;
                for key in std::iter::once(first).chain(rest.iter().copied()) {
                    let lookup = self.maybe_lookup(current, key)?;
                    current = self.unwrap_or_err(lookup)?;
                }
                Ok(current)
            }
            Some(fb) => {
                let fallback_term = self.emit(fb)?;
                let mut maybe = self.maybe_lookup(subject_term, first)?;
                for &key in rest {
                    // a miss at any level degrades to the fallback
                    let descend = self.lam(move |c, v| c.maybe_lookup(v, key))?;
                    let broken = self.lam_const(Term::ctr0(tag::NON))?;
                    maybe = self.mat(
                        maybe,
                        &[(tag::SOM, descend), (tag::NON, Term::ctr0(tag::NON))],
                        broken,
                    )?;
                }
                let found = self.identity_lam()?;
                let broken = self.lam_const(Term::ctr0(tag::ERR))?;
                self.mat(
                    maybe,
                    &[(tag::SOM, found), (tag::NON, fallback_term)],
                    broken,
                )
            }
        }
    }

    fn emit_has_attr(&mut self, subject: &Expr, path: &[AttrName]) -> Result<Term> {
        let subject_term = self.emit(subject)?;
        let keys = Self::static_keys(path)?;
        let Some((&first, rest)) = keys.split_first() else {
            return Ok(Term::ctr0(tag::TRU));
        };
        let mut maybe = self.maybe_lookup(subject_term, first)?;
        for &key in rest {
            let descend = self.lam(move |c, v| c.maybe_lookup(v, key))?;
            let broken = self.lam_const(Term::ctr0(tag::NON))?;
            maybe = self.mat(
                maybe,
                &[(tag::SOM, descend), (tag::NON, Term::ctr0(tag::NON))],
                broken,
            )?;
        }
        let found = self.lam_const(Term::ctr0(tag::TRU))?;
        let broken = self.lam_const(Term::ctr0(tag::ERR))?;
        self.mat(
            maybe,
            &[(tag::SOM, found), (tag::NON, Term::ctr0(tag::FLS))],
            broken,
        )
    }

    // ------------------------------------------------------------------
    // binding groups (let, recursive attribute sets, inherit sources)

    /// Evaluate-once `inherit (e)` sources, as anonymous bindings wrapped
    /// around the group. Returns their slots and compiled values.
    fn push_sources(&mut self, bindings: &Bindings, group: u32) -> Result<(Vec<Slot>, Vec<Term>)> {
        let mut from_uses = vec![0u32; bindings.inherit_from.len()];
        for binding in &bindings.entries {
            if let BindingValue::InheritedFrom(index) = &binding.value {
                from_uses[*index] += 1;
            }
        }
        let mut slots = Vec::with_capacity(bindings.inherit_from.len());
        let mut terms = Vec::with_capacity(bindings.inherit_from.len());
        let mut indices = Vec::with_capacity(bindings.inherit_from.len());
        for (source, uses) in bindings.inherit_from.iter().zip(&from_uses) {
            let term = self.emit(source)?;
            let slot = self.rt.alloc(1)?;
            let chain = if *uses > 1 {
                let label = self.ctx.fresh_label();
                let chain = DupChain::build(self.rt, label, Term::var(slot), *uses)?;
                self.ctx.dup_nodes += chain.node_count();
                Some(chain)
            } else {
                None
            };
            indices.push(self.ctx.scope.len());
            self.ctx
                .scope
                .push(VarBinding::assigned(None, group, slot, *uses, chain));
            slots.push(slot);
            terms.push(term);
        }
        self.ctx.inherit_froms.push(indices);
        Ok((slots, terms))
    }

    fn emit_from_select(&mut self, from: usize, name: Symbol) -> Result<Term> {
        let from_index = self
            .ctx
            .inherit_froms
            .last()
            .and_then(|frame| frame.get(from).copied())
            .ok_or(CompileError::Unsupported("inherit source out of range"))?;
        let projection = self.ctx.scope[from_index].take_ref()?;
        let lookup = self.maybe_lookup(projection, name.id())?;
        self.unwrap_or_err(lookup)
    }

    fn wrap_bindings(&mut self, slots: &[Slot], values: &[Term], body: Term) -> Result<Term> {
        let mut current = body;
        for index in (0..slots.len()).rev() {
            self.rt.set(slots[index], current);
            current = self.app(Term::lam(slots[index]), values[index])?;
        }
        Ok(current)
    }

    fn emit_group(&mut self, bindings: &Bindings, body: GroupBody) -> Result<Term> {
        let group = self.ctx.fresh_group();
        let (from_slots, from_terms) = self.push_sources(bindings, group)?;

        let base = self.ctx.scope.len();
        for binding in &bindings.entries {
            self.ctx
                .scope
                .push(VarBinding::counting(Some(binding.name), group));
        }

        // pass 1 over the group's values and body
        for binding in &bindings.entries {
            match &binding.value {
                BindingValue::Plain(value) => usage::count(&mut self.ctx, self.symbols, value),
                BindingValue::Inherited => {
                    usage::count_var(&mut self.ctx, self.symbols, binding.name, Some(group))
                }
                BindingValue::InheritedFrom(_) => {}
            }
        }
        match &body {
            GroupBody::Expression(expr) => usage::count(&mut self.ctx, self.symbols, expr),
            GroupBody::AttrSpine => {
                // the result spine references every binding once
                for index in 0..bindings.entries.len() {
                    self.ctx.scope[base + index].uses += 1;
                }
            }
        }

        // bindings are emitted in dependency order; a cycle was already
        // rejected by the analyzer, but never trust that from here
        let order = toposort_bindings(bindings).ok_or(CompileError::DependencyCycle)?;
        for index in 0..bindings.entries.len() {
            self.assign_binding(base + index)?;
        }

        let mut slots = Vec::with_capacity(order.len());
        let mut values = Vec::with_capacity(order.len());
        for &index in &order {
            let binding = &bindings.entries[index];
            let term = match &binding.value {
                BindingValue::Plain(value) => self.emit(value)?,
                BindingValue::Inherited => self.emit_var(binding.name, Some(group))?,
                BindingValue::InheritedFrom(from) => self.emit_from_select(*from, binding.name)?,
            };
            slots.push(self.ctx.scope[base + index].slot.unwrap());
            values.push(term);
        }

        let body_term = match body {
            GroupBody::Expression(expr) => self.emit(expr)?,
            GroupBody::AttrSpine => {
                let mut pairs = Vec::with_capacity(bindings.entries.len());
                for (index, binding) in bindings.entries.iter().enumerate() {
                    let term = self.ctx.scope[base + index].take_ref()?;
                    pairs.push((binding.name.id(), term));
                }
                pairs.sort_by_key(|(key, _)| *key);
                attrs::build(self.rt, &pairs)?
            }
        };

        let inner = self.wrap_bindings(&slots, &values, body_term)?;
        let current = self.wrap_bindings(&from_slots, &from_terms, inner)?;

        self.pop_scope(bindings.entries.len() + from_slots.len())?;
        self.ctx.inherit_froms.pop();
        Ok(current)
    }

    /// Non-recursive attribute sets bind no names; values compile in the
    /// enclosing scope and the pairs are re-sorted into canonical key order
    /// before being linked into the spine.
    fn emit_attrs_nonrec(&mut self, bindings: &Bindings) -> Result<Term> {
        let group = self.ctx.fresh_group();
        let (from_slots, from_terms) = self.push_sources(bindings, group)?;

        let mut pairs = Vec::with_capacity(bindings.entries.len());
        for binding in &bindings.entries {
            let term = match &binding.value {
                BindingValue::Plain(value) => self.emit(value)?,
                BindingValue::Inherited => self.emit_var(binding.name, None)?,
                BindingValue::InheritedFrom(from) => self.emit_from_select(*from, binding.name)?,
            };
            pairs.push((binding.name.id(), term));
        }
        pairs.sort_by_key(|(key, _)| *key);
        let spine = attrs::build(self.rt, &pairs)?;

        let current = self.wrap_bindings(&from_slots, &from_terms, spine)?;
        self.pop_scope(from_slots.len())?;
        self.ctx.inherit_froms.pop();
        Ok(current)
    }

    // ------------------------------------------------------------------
    // lambdas and application

    fn emit_lambda(&mut self, lambda: &Lambda) -> Result<Term> {
        match &lambda.param {
            Param::Simple(name) => {
                let group = self.ctx.fresh_group();
                let index = self.ctx.scope.len();
                self.ctx
                    .scope
                    .push(VarBinding::counting(Some(*name), group));
                usage::count(&mut self.ctx, self.symbols, &lambda.body);
                self.assign_binding(index)?;
                let slot = self.ctx.scope[index].slot.unwrap();
                let body = self.emit(&lambda.body)?;
                self.pop_scope(1)?;
                self.rt.set(slot, body);
                Ok(Term::lam(slot))
            }
            Param::Formals {
                binding,
                formals,
                ellipsis: _,
            } => {
                if binding.is_some() {
                    return Err(CompileError::Unsupported("@-pattern binding"));
                }
                let group = self.ctx.fresh_group();
                let arg_slot = self.rt.alloc(1)?;
                // the argument set is consulted once per formal
                let arg_uses = formals.len() as u32;
                let arg_chain = if arg_uses > 1 {
                    let label = self.ctx.fresh_label();
                    let chain = DupChain::build(self.rt, label, Term::var(arg_slot), arg_uses)?;
                    self.ctx.dup_nodes += chain.node_count();
                    Some(chain)
                } else {
                    None
                };
                let mut argument =
                    VarBinding::assigned(None, group, arg_slot, arg_uses, arg_chain);

                let base = self.ctx.scope.len();
                for formal in formals {
                    self.ctx
                        .scope
                        .push(VarBinding::counting(Some(formal.name), group));
                }
                for formal in formals {
                    if let Some(default) = &formal.default {
                        usage::count(&mut self.ctx, self.symbols, default);
                    }
                }
                usage::count(&mut self.ctx, self.symbols, &lambda.body);
                for index in 0..formals.len() {
                    self.assign_binding(base + index)?;
                }

                let mut values = Vec::with_capacity(formals.len());
                for formal in formals {
                    let projection = argument.take_ref()?;
                    let lookup = self.maybe_lookup(projection, formal.name.id())?;
                    let found = self.identity_lam()?;
                    let missing = match &formal.default {
                        Some(default) => self.emit(default)?,
                        None => Term::ctr0(tag::ERR),
                    };
                    let broken = self.lam_const(Term::ctr0(tag::ERR))?;
                    values.push(self.mat(
                        lookup,
                        &[(tag::SOM, found), (tag::NON, missing)],
                        broken,
                    )?);
                }

                let mut current = self.emit(&lambda.body)?;
                for index in (0..formals.len()).rev() {
                    let slot = self.ctx.scope[base + index].slot.unwrap();
                    self.rt.set(slot, current);
                    current = self.app(Term::lam(slot), values[index])?;
                }
                self.pop_scope(formals.len())?;
                argument.finish()?;
                self.rt.set(arg_slot, current);
                Ok(Term::lam(arg_slot))
            }
        }
    }

    fn emit_call(&mut self, function: &Expr, arguments: &[Expr]) -> Result<Term> {
        let shadowed = match function {
            Expr::Var(symbol) => self.ctx.is_lexically_bound(*symbol),
            _ => false,
        };
        match call_shape(self.symbols, function, arguments, shadowed) {
            CallShape::Arith(op, a, b) => {
                let lhs = self.emit(a)?;
                let rhs = self.emit(b)?;
                self.op(op, lhs, rhs)
            }
            CallShape::Less(a, b) => self.emit_less_than(a, b),
            CallShape::ToString(inner) => {
                let value = self.emit(inner)?;
                string::coerce(self.rt, value).map_err(Into::into)
            }
            CallShape::General => {
                let mut term = self.emit(function)?;
                for argument in arguments {
                    let arg = self.emit(argument)?;
                    term = self.app(term, arg)?;
                }
                Ok(term)
            }
        }
    }

    fn emit_with(&mut self, namespace: &Expr, body: &Expr) -> Result<Term> {
        // the namespace itself is evaluated outside its own scope
        let ns = self.emit(namespace)?;
        let group = self.ctx.fresh_group();
        self.ctx.withs.push(VarBinding::counting(None, group));
        usage::count(&mut self.ctx, self.symbols, body);
        let slot = self.rt.alloc(1)?;
        let uses = self.ctx.withs.last().map(|w| w.uses).unwrap_or(0);
        let chain = if uses > 1 {
            let label = self.ctx.fresh_label();
            let chain = DupChain::build(self.rt, label, Term::var(slot), uses)?;
            self.ctx.dup_nodes += chain.node_count();
            Some(chain)
        } else {
            None
        };
        if let Some(with) = self.ctx.withs.last_mut() {
            with.slot = Some(slot);
            with.chain = chain;
        }
        let body_term = self.emit(body)?;
        let with = self
            .ctx
            .withs
            .pop()
            .ok_or(CompileError::Unsupported("scope imbalance"))?;
        with.finish()?;
        self.rt.set(slot, body_term);
        self.app(Term::lam(slot), ns)
    }

    // ------------------------------------------------------------------
    // comparison dispatchers

    /// Unsigned 64-bit `x < y` over split halves, as a native word (0/1).
    fn lt64(&mut self, xlo: Term, xhi: Term, ylo: Term, yhi: Term) -> Result<Term> {
        let xh = self.dup_terms(xhi, 2)?;
        let yh = self.dup_terms(yhi, 2)?;
        let hi_lt = self.op(Opcode::Ltu, xh[0], yh[0])?;
        let hi_eq = self.op(Opcode::Eq, xh[1], yh[1])?;
        let lo_lt = self.op(Opcode::Ltu, xlo, ylo)?;
        let tie = self.swi(hi_eq, Term::num(0), lo_lt)?;
        self.swi(hi_lt, tie, Term::num(1))
    }

    /// Native signed less-than is only valid between two small integers, so
    /// every {negative-constructor, small, positive-constructor} pairing is
    /// dispatched separately; cross-category order is fixed.
    fn emit_less_than(&mut self, a: &Expr, b: &Expr) -> Result<Term> {
        let left = self.emit(a)?;
        let right = self.emit(b)?;

        let neg_arm = self.lam(move |c, alo| {
            c.lam(move |c, ahi| {
                let neg_neg = c.lam(move |c, blo| {
                    c.lam(move |c, bhi| {
                        // both negative: magnitudes compare reversed
                        let lt = c.lt64(blo, bhi, alo, ahi)?;
                        c.num_to_bool(lt)
                    })
                })?;
                let on_pos = c.const2(Term::ctr0(tag::TRU))?;
                let on_small = c.lam_const(Term::ctr0(tag::TRU))?;
                c.mat(right, &[(tag::NEG, neg_neg), (tag::POS, on_pos)], on_small)
            })
        })?;

        let pos_arm = self.lam(move |c, alo| {
            c.lam(move |c, ahi| {
                let pos_pos = c.lam(move |c, blo| {
                    c.lam(move |c, bhi| {
                        let lt = c.lt64(alo, ahi, blo, bhi)?;
                        c.num_to_bool(lt)
                    })
                })?;
                let on_neg = c.const2(Term::ctr0(tag::FLS))?;
                let on_small = c.lam_const(Term::ctr0(tag::FLS))?;
                c.mat(right, &[(tag::POS, pos_pos), (tag::NEG, on_neg)], on_small)
            })
        })?;

        let small_arm = self.lam(move |c, av| {
            let on_neg = c.const2(Term::ctr0(tag::FLS))?;
            let on_pos = c.const2(Term::ctr0(tag::TRU))?;
            let both_small = c.lam(move |c, bv| {
                let a_biased = c.op(Opcode::Xor, av, Term::num(big_int::SIGN_BIT))?;
                let b_biased = c.op(Opcode::Xor, bv, Term::num(big_int::SIGN_BIT))?;
                let lt = c.op(Opcode::Ltu, a_biased, b_biased)?;
                c.num_to_bool(lt)
            })?;
            c.mat(right, &[(tag::NEG, on_neg), (tag::POS, on_pos)], both_small)
        })?;

        self.mat(left, &[(tag::NEG, neg_arm), (tag::POS, pos_arm)], small_arm)
    }

    fn eq_wide_arm(&mut self, right: Term, kind: u32) -> Result<Term> {
        self.lam(move |c, alo| {
            c.lam(move |c, ahi| {
                let same = c.lam(move |c, blo| {
                    c.lam(move |c, bhi| {
                        let lo_eq = c.op(Opcode::Eq, alo, blo)?;
                        let hi_eq = c.op(Opcode::Eq, ahi, bhi)?;
                        let both = c.op(Opcode::Mul, lo_eq, hi_eq)?;
                        c.num_to_bool(both)
                    })
                })?;
                let other = c.lam_const(Term::ctr0(tag::FLS))?;
                c.mat(right, &[(kind, same)], other)
            })
        })
    }

    fn eq_const_arm(&mut self, right: Term, kind: u32) -> Result<Term> {
        let other = self.lam_const(Term::ctr0(tag::FLS))?;
        self.mat(right, &[(kind, Term::ctr0(tag::TRU))], other)
    }

    fn emit_eq(&mut self, a: &Expr, b: &Expr) -> Result<Term> {
        let left = self.emit(a)?;
        let right = self.emit(b)?;

        let pos_arm = self.eq_wide_arm(right, tag::POS)?;
        let neg_arm = self.eq_wide_arm(right, tag::NEG)?;
        let tru_arm = self.eq_const_arm(right, tag::TRU)?;
        let fls_arm = self.eq_const_arm(right, tag::FLS)?;
        let nul_arm = self.eq_const_arm(right, tag::NUL)?;

        let small_arm = self.lam(move |c, av| {
            let on_pos = c.const2(Term::ctr0(tag::FLS))?;
            let on_neg = c.const2(Term::ctr0(tag::FLS))?;
            let on_num = c.lam(move |c, bv| {
                let eq = c.op(Opcode::Eq, av, bv)?;
                c.num_to_bool(eq)
            })?;
            c.mat(
                right,
                &[
                    (tag::POS, on_pos),
                    (tag::NEG, on_neg),
                    (tag::TRU, Term::ctr0(tag::FLS)),
                    (tag::FLS, Term::ctr0(tag::FLS)),
                    (tag::NUL, Term::ctr0(tag::FLS)),
                ],
                on_num,
            )
        })?;

        self.mat(
            left,
            &[
                (tag::POS, pos_arm),
                (tag::NEG, neg_arm),
                (tag::TRU, tru_arm),
                (tag::FLS, fls_arm),
                (tag::NUL, nul_arm),
            ],
            small_arm,
        )
    }

    // ------------------------------------------------------------------
    // attribute merge and list concatenation

    /// `a // b`: an O(n+m) merge of the two sorted spines. Only spine links
    /// are rebuilt; the overlay's keys strictly override the base's.
    fn emit_update(&mut self, a: &Expr, b: &Expr) -> Result<Term> {
        let base = self.emit(a)?;
        let overlay = self.emit(b)?;

        let base_arm = self.lam(move |c, base_spine| {
            let overlay_arm = c.lam(move |c, overlay_spine| {
                let merge = c.merge_combinator()?;
                let partial = c.app(merge, base_spine)?;
                let spine = c.app(partial, overlay_spine)?;
                c.ctr(tag::ATS, &[spine])
            })?;
            let broken = c.lam_const(Term::ctr0(tag::ERR))?;
            c.mat(overlay, &[(tag::ATS, overlay_arm)], broken)
        })?;
        let broken = self.lam_const(Term::ctr0(tag::ERR))?;
        self.mat(base, &[(tag::ATS, base_arm)], broken)
    }

    fn merge_combinator(&mut self) -> Result<Term> {
        fix(self, 3, |c, recur| {
            c.lam(move |c, xs| {
                c.lam(move |c, ys| {
                    let con_arm = c.lam(move |c, xh| {
                        c.lam(move |c, xt| {
                            let keep_base = c.ctr(tag::CON, &[xh, xt])?;
                            let ys_con = c.lam(move |c, yh| {
                                c.lam(move |c, yt| {
                                    let xh_arm = c.lam(move |c, xk| {
                                        c.lam(move |c, xv| {
                                            let yh_arm = c.lam(move |c, yk| {
                                                c.lam(move |c, yv| {
                                                    c.merge_step(recur, xk, xv, xt, yk, yv, yt)
                                                })
                                            })?;
                                            let broken = c.lam_const(Term::ctr0(tag::ERR))?;
                                            c.mat(yh, &[(tag::ATR, yh_arm)], broken)
                                        })
                                    })?;
                                    let broken = c.lam_const(Term::ctr0(tag::ERR))?;
                                    c.mat(xh, &[(tag::ATR, xh_arm)], broken)
                                })
                            })?;
                            let broken = c.lam_const(Term::ctr0(tag::ERR))?;
                            c.mat(ys, &[(tag::NIL, keep_base), (tag::CON, ys_con)], broken)
                        })
                    })?;
                    let broken = c.lam_const(Term::ctr0(tag::ERR))?;
                    c.mat(xs, &[(tag::NIL, ys), (tag::CON, con_arm)], broken)
                })
            })
        })
    }

    fn merge_step(
        &mut self,
        recur: &mut Recur,
        xk: Term,
        xv: Term,
        xt: Term,
        yk: Term,
        yv: Term,
        yt: Term,
    ) -> Result<Term> {
        let xks = self.dup_terms(xk, 3)?;
        let yks = self.dup_terms(yk, 3)?;
        let lt = self.op(Opcode::Ltu, xks[0], yks[0])?;
        let eq = self.op(Opcode::Eq, xks[1], yks[1])?;

        // base key first: keep it, push the overlay head back
        let lt_branch = {
            let head = self.ctr(tag::ATR, &[xks[2], xv])?;
            let y_head = self.ctr(tag::ATR, &[yks[2], yv])?;
            let y_rest = self.ctr(tag::CON, &[y_head, yt])?;
            let rest = recur.call(self, &[xt, y_rest])?;
            self.ctr(tag::CON, &[head, rest])?
        };
        // overlay key first: keep it, push the base head back
        let gt_branch = {
            let head = self.ctr(tag::ATR, &[yks[2], yv])?;
            let x_head = self.ctr(tag::ATR, &[xks[2], xv])?;
            let x_rest = self.ctr(tag::CON, &[x_head, xt])?;
            let rest = recur.call(self, &[x_rest, yt])?;
            self.ctr(tag::CON, &[head, rest])?
        };
        // same key: the overlay strictly overrides, the base value is dropped
        let eq_branch = {
            let head = self.ctr(tag::ATR, &[yks[2], yv])?;
            let rest = recur.call(self, &[xt, yt])?;
            self.ctr(tag::CON, &[head, rest])?
        };

        let tie = self.swi(eq, gt_branch, eq_branch)?;
        self.swi(lt, tie, lt_branch)
    }

    /// `xs ++ ys`: element terms are shared, only cons cells are rebuilt,
    /// and the cached length is the sum of both operands.
    fn emit_concat_lists(&mut self, a: &Expr, b: &Expr) -> Result<Term> {
        let left = self.emit(a)?;
        let right = self.emit(b)?;

        let left_arm = self.lam(move |c, la| {
            c.lam(move |c, sa| {
                let right_arm = c.lam(move |c, lb| {
                    c.lam(move |c, sb| {
                        let append = c.append_combinator()?;
                        let partial = c.app(append, sa)?;
                        let spine = c.app(partial, sb)?;
                        let length = c.op(Opcode::Add, la, lb)?;
                        c.ctr(tag::LST, &[length, spine])
                    })
                })?;
                let broken = c.lam_const(Term::ctr0(tag::ERR))?;
                c.mat(right, &[(tag::LST, right_arm)], broken)
            })
        })?;
        let broken = self.lam_const(Term::ctr0(tag::ERR))?;
        self.mat(left, &[(tag::LST, left_arm)], broken)
    }

    fn append_combinator(&mut self) -> Result<Term> {
        fix(self, 1, |c, recur| {
            c.lam(move |c, xs| {
                c.lam(move |c, ys| {
                    let con_arm = c.lam(move |c, head| {
                        c.lam(move |c, tail| {
                            let rest = recur.call(c, &[tail, ys])?;
                            c.ctr(tag::CON, &[head, rest])
                        })
                    })?;
                    let broken = c.lam_const(Term::ctr0(tag::ERR))?;
                    c.mat(xs, &[(tag::NIL, ys), (tag::CON, con_arm)], broken)
                })
            })
        })
    }

    // ------------------------------------------------------------------
    // strings and addition

    /// Classified by the first part: statically string-shaped means a lazy
    /// concatenation spine with compile-time folding of constant runs;
    /// anything else is assumed to be numeric addition.
    fn emit_concat_strings(&mut self, force_string: bool, parts: &[Expr]) -> Result<Term> {
        let Some(first) = parts.first() else {
            return Err(CompileError::Unsupported("empty concatenation"));
        };
        let string_mode = force_string || is_string_shaped(first);
        if string_mode {
            let mut segments: Vec<Term> = Vec::new();
            let mut pending = String::new();
            for part in parts {
                if let Expr::Str(text) = part {
                    pending.push_str(text);
                    continue;
                }
                if !pending.is_empty() {
                    let folded = string::literal(self.rt, self.strings, &pending)?;
                    segments.push(folded);
                    pending.clear();
                }
                segments.push(self.emit(part)?);
            }
            if !pending.is_empty() || segments.is_empty() {
                let folded = string::literal(self.rt, self.strings, &pending)?;
                segments.push(folded);
            }
            let mut result = segments.pop().unwrap();
            while let Some(previous) = segments.pop() {
                result = string::concat(self.rt, previous, result)?;
            }
            Ok(result)
        } else {
            let mut iter = parts.iter();
            let mut result = self.emit(iter.next().unwrap())?;
            for part in iter {
                let rhs = self.emit(part)?;
                result = self.op(Opcode::Add, result, rhs)?;
            }
            Ok(result)
        }
    }
}
