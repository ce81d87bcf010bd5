#![cfg(test)]

//! End-to-end scenarios through the public backend surface: compile,
//! reduce, extract, and the fallback contract.

use arcstr::ArcStr;
use indexmap::IndexMap;

use crate::compile::Compiler;
use crate::encode::{AccessorRegistry, StringTable};
use crate::extract::Extractor;
use crate::lang::ast::{
    AttrName, AttrSet, Binding, BindingValue, Bindings, Expr, Formal, Lambda, Param,
};
use crate::lang::symbol::{Symbol, SymbolTable};
use crate::lang::value::{Env, Value};
use crate::net::{Runtime, RuntimeOptions};
use crate::NetBackend;

struct Fix {
    backend: NetBackend,
}

impl Fix {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Self {
            backend: NetBackend::new(),
        }
    }

    fn sym(&mut self, name: &str) -> Symbol {
        self.backend.symbols_mut().intern(name)
    }

    fn eval(&mut self, expr: &Expr) -> Option<Value> {
        let env = Env::new();
        let mut out = Value::Null;
        if self.backend.try_evaluate(expr, &env, &mut out) {
            Some(out)
        } else {
            None
        }
    }

    fn eval_ok(&mut self, expr: &Expr) -> Value {
        self.eval(expr).expect("expected net evaluation to succeed")
    }
}

// ---------------------------------------------------------------------
// little AST builders

fn int(value: i64) -> Expr {
    Expr::Int(value)
}

fn text(content: &str) -> Expr {
    Expr::Str(ArcStr::from(content))
}

fn var(symbol: Symbol) -> Expr {
    Expr::Var(symbol)
}

fn sum(parts: Vec<Expr>) -> Expr {
    Expr::ConcatStrings {
        force_string: false,
        parts,
    }
}

fn interpolate(parts: Vec<Expr>) -> Expr {
    Expr::ConcatStrings {
        force_string: true,
        parts,
    }
}

fn call(function: Expr, arguments: Vec<Expr>) -> Expr {
    Expr::Call {
        function: Box::new(function),
        arguments,
    }
}

fn plain(entries: Vec<(Symbol, Expr)>) -> Bindings {
    Bindings {
        inherit_from: Vec::new(),
        entries: entries
            .into_iter()
            .map(|(name, value)| Binding {
                name,
                value: BindingValue::Plain(value),
            })
            .collect(),
    }
}

fn attrs(recursive: bool, entries: Vec<(Symbol, Expr)>) -> Expr {
    Expr::Attrs(AttrSet {
        recursive,
        bindings: plain(entries),
        dynamic: Vec::new(),
    })
}

fn let_in(entries: Vec<(Symbol, Expr)>, body: Expr) -> Expr {
    Expr::Let {
        bindings: plain(entries),
        body: Box::new(body),
    }
}

fn select(subject: Expr, path: Vec<Symbol>, fallback: Option<Expr>) -> Expr {
    Expr::Select {
        subject: Box::new(subject),
        path: path.into_iter().map(AttrName::Static).collect(),
        fallback: fallback.map(Box::new),
    }
}

fn has_attr(subject: Expr, path: Vec<Symbol>) -> Expr {
    Expr::HasAttr {
        subject: Box::new(subject),
        path: path.into_iter().map(AttrName::Static).collect(),
    }
}

fn lambda(param: Symbol, body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        param: Param::Simple(param),
        body: Box::new(body),
    })
}

fn formals(entries: Vec<(Symbol, Option<Expr>)>, body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        param: Param::Formals {
            binding: None,
            formals: entries
                .into_iter()
                .map(|(name, default)| Formal { name, default })
                .collect(),
            ellipsis: false,
        },
        body: Box::new(body),
    })
}

fn if_then_else(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
    Expr::If {
        condition: Box::new(condition),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    }
}

fn with(namespace: Expr, body: Expr) -> Expr {
    Expr::With {
        namespace: Box::new(namespace),
        body: Box::new(body),
    }
}

fn attr_value(pairs: Vec<(Symbol, Value)>) -> Value {
    Value::Attrs(IndexMap::from_iter(pairs))
}

// ---------------------------------------------------------------------
// scenarios

#[test]
fn literal_integer() {
    let mut fix = Fix::new();
    assert_eq!(fix.eval_ok(&int(5)), Value::Int(5));
}

#[test]
fn wide_integers_round_trip() {
    let mut fix = Fix::new();
    for value in [
        5_000_000_000i64,
        -5_000_000_000,
        i64::MAX,
        i64::MIN,
        i32::MAX as i64 + 1,
        i32::MIN as i64 - 1,
    ] {
        assert_eq!(fix.eval_ok(&int(value)), Value::Int(value), "{}", value);
    }
}

#[test]
fn float_literal_preserves_bits() {
    let mut fix = Fix::new();
    let Value::Float(f) = fix.eval_ok(&Expr::Float(2.5)) else {
        panic!("expected a float");
    };
    assert_eq!(f.to_bits(), 2.5f64.to_bits());
}

#[test]
fn builtin_constants() {
    let mut fix = Fix::new();
    let t = fix.sym("true");
    let f = fix.sym("false");
    let n = fix.sym("null");
    assert_eq!(fix.eval_ok(&var(t)), Value::Bool(true));
    assert_eq!(fix.eval_ok(&var(f)), Value::Bool(false));
    assert_eq!(fix.eval_ok(&var(n)), Value::Null);
}

#[test]
fn select_from_literal_attrs() {
    // { a = 1; }.a  =>  1
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let expr = select(attrs(false, vec![(a, int(1))]), vec![a], None);
    assert_eq!(fix.eval_ok(&expr), Value::Int(1));
}

#[test]
fn select_missing_attr_falls_back() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    let expr = select(attrs(false, vec![(a, int(1))]), vec![b], None);
    assert_eq!(fix.eval(&expr), None);
}

#[test]
fn select_with_fallback_degrades_at_any_level() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    // { a = 1; }.b or 7
    let expr = select(attrs(false, vec![(a, int(1))]), vec![b], Some(int(7)));
    assert_eq!(fix.eval_ok(&expr), Value::Int(7));
    // { a = 1; }.a.b or 7 — the miss happens mid-path, on a non-set
    let expr = select(attrs(false, vec![(a, int(1))]), vec![a, b], Some(int(7)));
    assert_eq!(fix.eval_ok(&expr), Value::Int(7));
    // and a full hit still wins over the fallback
    let inner = attrs(false, vec![(b, int(3))]);
    let expr = select(attrs(false, vec![(a, inner)]), vec![a, b], Some(int(7)));
    assert_eq!(fix.eval_ok(&expr), Value::Int(3));
}

#[test]
fn has_attr_nested() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    let c = fix.sym("c");
    let set = attrs(false, vec![(a, attrs(false, vec![(b, int(1))]))]);
    let expr = has_attr(set, vec![a, b]);
    assert_eq!(fix.eval_ok(&expr), Value::Bool(true));
    let set = attrs(false, vec![(a, attrs(false, vec![(b, int(1))]))]);
    let expr = has_attr(set, vec![a, c]);
    assert_eq!(fix.eval_ok(&expr), Value::Bool(false));
}

#[test]
fn list_in_order() {
    let mut fix = Fix::new();
    let expr = Expr::List(vec![int(1), int(2), int(3)]);
    assert_eq!(
        fix.eval_ok(&expr),
        Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn list_concat() {
    let mut fix = Fix::new();
    // [1] ++ [2]  =>  [1, 2]
    let expr = Expr::ConcatLists(
        Box::new(Expr::List(vec![int(1)])),
        Box::new(Expr::List(vec![int(2)])),
    );
    assert_eq!(
        fix.eval_ok(&expr),
        Value::List(vec![Value::Int(1), Value::Int(2)])
    );
    // [] ++ [1] has one element
    let expr = Expr::ConcatLists(
        Box::new(Expr::List(vec![])),
        Box::new(Expr::List(vec![int(1)])),
    );
    assert_eq!(fix.eval_ok(&expr), Value::List(vec![Value::Int(1)]));
}

#[test]
fn update_overlay_wins() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    let c = fix.sym("c");
    // { a = 1; b = 2; } // { b = 3; c = 4; }
    let expr = Expr::Update(
        Box::new(attrs(false, vec![(a, int(1)), (b, int(2))])),
        Box::new(attrs(false, vec![(b, int(3)), (c, int(4))])),
    );
    assert_eq!(
        fix.eval_ok(&expr),
        attr_value(vec![
            (a, Value::Int(1)),
            (b, Value::Int(3)),
            (c, Value::Int(4)),
        ])
    );
}

#[test]
fn if_on_equality() {
    let mut fix = Fix::new();
    // if 1 == 1 then 10 else 20  =>  10
    let expr = if_then_else(
        Expr::Eq(Box::new(int(1)), Box::new(int(2 - 1))),
        int(10),
        int(20),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(10));
    let expr = if_then_else(
        Expr::Eq(Box::new(int(1)), Box::new(int(2))),
        int(10),
        int(20),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(20));
}

#[test]
fn arithmetic_chain() {
    let mut fix = Fix::new();
    let sub = fix.sym("__sub");
    let mul = fix.sym("__mul");
    // (10 - 4) * 7  =>  42
    let expr = call(var(mul), vec![call(var(sub), vec![int(10), int(4)]), int(7)]);
    assert_eq!(fix.eval_ok(&expr), Value::Int(42));
}

#[test]
fn shadowed_operator_is_not_a_primitive() {
    let mut fix = Fix::new();
    let sub = fix.sym("__sub");
    let a = fix.sym("a");
    let b = fix.sym("b");
    // let __sub = a: b: a; in __sub 10 4  =>  10
    let expr = let_in(
        vec![(sub, lambda(a, lambda(b, var(a))))],
        call(var(sub), vec![int(10), int(4)]),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(10));
}

#[test]
fn less_than_across_categories() {
    let mut fix = Fix::new();
    let lt = fix.sym("__lessThan");
    let cases: Vec<(i64, i64, bool)> = vec![
        (1, 2, true),
        (2, 1, false),
        (-3, 2, true),
        (-3, -7, false),
        (-5_000_000_000, 3, true),
        (3, -5_000_000_000, false),
        (5_000_000_000, 6_000_000_000, true),
        (6_000_000_000, 5_000_000_000, false),
        (-6_000_000_000, -5_000_000_000, true),
        (i64::MIN, i64::MAX, true),
        (i64::MAX, i64::MIN, false),
    ];
    for (a, b, expected) in cases {
        let expr = call(var(lt), vec![int(a), int(b)]);
        assert_eq!(fix.eval_ok(&expr), Value::Bool(expected), "{} < {}", a, b);
    }
}

#[test]
fn wide_equality() {
    let mut fix = Fix::new();
    let expr = Expr::Eq(Box::new(int(5_000_000_000)), Box::new(int(5_000_000_000)));
    assert_eq!(fix.eval_ok(&expr), Value::Bool(true));
    let expr = Expr::Eq(Box::new(int(5_000_000_000)), Box::new(int(3)));
    assert_eq!(fix.eval_ok(&expr), Value::Bool(false));
    let expr = Expr::Ne(Box::new(int(1)), Box::new(int(2)));
    assert_eq!(fix.eval_ok(&expr), Value::Bool(true));
}

#[test]
fn duplication_chain_for_three_uses() {
    // let x = 1; in x + x + x: exactly two duplication nodes, value 3
    let mut symbols = SymbolTable::new();
    let x = symbols.intern("x");
    let expr = let_in(vec![(x, int(1))], sum(vec![var(x), var(x), var(x)]));

    let mut rt = Runtime::new(RuntimeOptions::default());
    let mut strings = StringTable::new();
    let mut accessors = AccessorRegistry::new();
    let mut compiler = Compiler::new(&mut rt, &symbols, &mut strings, &mut accessors);
    let root = compiler.compile(&expr).unwrap();
    assert_eq!(compiler.dup_nodes(), 2);
    drop(compiler);

    let root = rt.evaluate_snf(root).unwrap();
    let mut extractor = Extractor {
        rt: &mut rt,
        symbols: &symbols,
        strings: &strings,
        accessors: &accessors,
    };
    assert_eq!(extractor.extract(root).unwrap(), Value::Int(3));
}

#[test]
fn cyclic_bindings_are_rejected() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    // rec { a = b; b = a; }
    let cyclic = attrs(true, vec![(a, var(b)), (b, var(a))]);
    assert!(!fix.backend.can_evaluate(&cyclic));

    // rec { a = 1; b = a + 1; }  =>  { a = 1; b = 2; }
    let acyclic = attrs(true, vec![(a, int(1)), (b, sum(vec![var(a), int(1)]))]);
    assert!(fix.backend.can_evaluate(&acyclic));
    assert_eq!(
        fix.eval_ok(&acyclic),
        attr_value(vec![(a, Value::Int(1)), (b, Value::Int(2))])
    );
}

#[test]
fn recursive_bindings_in_any_source_order() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    // rec { b = a + 1; a = 1; } — dependency order, not source order
    let expr = attrs(true, vec![(b, sum(vec![var(a), int(1)])), (a, int(1))]);
    assert_eq!(
        fix.eval_ok(&expr),
        attr_value(vec![(a, Value::Int(1)), (b, Value::Int(2))])
    );
}

#[test]
fn pattern_lambda_with_sibling_default() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    let mul = fix.sym("__mul");
    // ({ a, b ? a * 2 }: a + b) { a = 3; }  =>  9
    let body = sum(vec![var(a), var(b)]);
    let function = formals(
        vec![(a, None), (b, Some(call(var(mul), vec![var(a), int(2)])))],
        body,
    );
    let expr = call(function, vec![attrs(false, vec![(a, int(3))])]);
    assert_eq!(fix.eval_ok(&expr), Value::Int(9));
}

#[test]
fn pattern_lambda_explicit_argument_beats_default() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    let function = formals(
        vec![(a, None), (b, Some(int(100)))],
        sum(vec![var(a), var(b)]),
    );
    let expr = call(function, vec![attrs(false, vec![(a, int(1)), (b, int(2))])]);
    assert_eq!(fix.eval_ok(&expr), Value::Int(3));
}

#[test]
fn general_application() {
    let mut fix = Fix::new();
    let f = fix.sym("f");
    let x = fix.sym("x");
    // let f = x: x + 1; in f 41  =>  42
    let expr = let_in(
        vec![(f, lambda(x, sum(vec![var(x), int(1)])))],
        call(var(f), vec![int(41)]),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(42));
}

#[test]
fn with_resolution_and_shadowing() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    // with { a = 5; }; a  =>  5
    let expr = with(attrs(false, vec![(a, int(5))]), var(a));
    assert_eq!(fix.eval_ok(&expr), Value::Int(5));

    // with { a = 1; }; with { a = 2; }; a  =>  2 (innermost namespace wins)
    let expr = with(
        attrs(false, vec![(a, int(1))]),
        with(attrs(false, vec![(a, int(2))]), var(a)),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(2));

    // let a = 1; in with { a = 2; }; a  =>  1 (lexical beats with)
    let expr = let_in(
        vec![(a, int(1))],
        with(attrs(false, vec![(a, int(2))]), var(a)),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(1));
}

#[test]
fn with_falls_through_to_outer_namespace() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    // with { a = 1; }; with { b = 2; }; a  =>  1
    let expr = with(
        attrs(false, vec![(a, int(1))]),
        with(attrs(false, vec![(b, int(2))]), var(a)),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(1));
}

#[test]
fn missing_with_attribute_falls_back() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let q = fix.sym("q");
    let expr = with(attrs(false, vec![(a, int(1))]), var(q));
    assert!(fix.backend.can_evaluate(&expr), "accepted optimistically");
    assert_eq!(fix.eval(&expr), None);
}

#[test]
fn inherit_from_enclosing_scope() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    // let a = 1; in { inherit a; }  =>  { a = 1; }
    let expr = let_in(
        vec![(a, int(1))],
        Expr::Attrs(AttrSet {
            recursive: false,
            bindings: Bindings {
                inherit_from: Vec::new(),
                entries: vec![Binding {
                    name: a,
                    value: BindingValue::Inherited,
                }],
            },
            dynamic: Vec::new(),
        }),
    );
    assert_eq!(fix.eval_ok(&expr), attr_value(vec![(a, Value::Int(1))]));
}

#[test]
fn inherit_from_source_set() {
    let mut fix = Fix::new();
    let x = fix.sym("x");
    let y = fix.sym("y");
    // { inherit ({ x = 1; y = 2; }) x y; }
    let expr = Expr::Attrs(AttrSet {
        recursive: false,
        bindings: Bindings {
            inherit_from: vec![attrs(false, vec![(x, int(1)), (y, int(2))])],
            entries: vec![
                Binding {
                    name: x,
                    value: BindingValue::InheritedFrom(0),
                },
                Binding {
                    name: y,
                    value: BindingValue::InheritedFrom(0),
                },
            ],
        },
        dynamic: Vec::new(),
    });
    assert_eq!(
        fix.eval_ok(&expr),
        attr_value(vec![(x, Value::Int(1)), (y, Value::Int(2))])
    );
}

#[test]
fn strings_fold_and_flatten() {
    let mut fix = Fix::new();
    // "a" + "b" folds at compile time
    let expr = sum(vec![text("a"), text("b")]);
    assert_eq!(fix.eval_ok(&expr), Value::String(ArcStr::from("ab")));

    // "a${x}c" with a dynamic middle flattens at extraction
    let x = fix.sym("x");
    let expr = let_in(
        vec![(x, text("b"))],
        interpolate(vec![text("a"), var(x), text("c")]),
    );
    assert_eq!(fix.eval_ok(&expr), Value::String(ArcStr::from("abc")));
}

#[test]
fn to_string_coercion() {
    let mut fix = Fix::new();
    let to_string = fix.sym("toString");
    let expr = call(var(to_string), vec![int(12)]);
    assert_eq!(fix.eval_ok(&expr), Value::String(ArcStr::from("12")));
    let expr = call(var(to_string), vec![int(5_000_000_000)]);
    assert_eq!(
        fix.eval_ok(&expr),
        Value::String(ArcStr::from("5000000000"))
    );
}

#[test]
fn boolean_operators_short_circuit() {
    let mut fix = Fix::new();
    let f = fix.sym("false");
    let t = fix.sym("true");
    let div = fix.sym("__div");
    // false && (1 / 0 == 0) — the poisoned branch is never forced
    let poisoned = Expr::Eq(
        Box::new(call(var(div), vec![int(1), int(0)])),
        Box::new(int(0)),
    );
    let expr = Expr::And(Box::new(var(f)), Box::new(poisoned));
    assert_eq!(fix.eval_ok(&expr), Value::Bool(false));

    let expr = Expr::Or(Box::new(var(t)), Box::new(var(f)));
    assert_eq!(fix.eval_ok(&expr), Value::Bool(true));
    let expr = Expr::Impl(Box::new(var(f)), Box::new(var(f)));
    assert_eq!(fix.eval_ok(&expr), Value::Bool(true));
    let expr = Expr::Not(Box::new(var(t)));
    assert_eq!(fix.eval_ok(&expr), Value::Bool(false));
}

#[test]
fn assertion_success_and_failure() {
    let mut fix = Fix::new();
    let t = fix.sym("true");
    let f = fix.sym("false");
    let expr = Expr::Assert {
        condition: Box::new(var(t)),
        body: Box::new(int(5)),
    };
    assert_eq!(fix.eval_ok(&expr), Value::Int(5));

    let expr = Expr::Assert {
        condition: Box::new(var(f)),
        body: Box::new(int(5)),
    };
    assert_eq!(fix.eval(&expr), None);
}

#[test]
fn division_by_zero_falls_back() {
    let mut fix = Fix::new();
    let div = fix.sym("__div");
    let expr = call(var(div), vec![int(1), int(0)]);
    assert!(fix.backend.can_evaluate(&expr));
    assert_eq!(fix.eval(&expr), None);
}

#[test]
fn native_overflow_falls_back() {
    let mut fix = Fix::new();
    let expr = sum(vec![int(i32::MAX as i64), int(1)]);
    assert_eq!(fix.eval(&expr), None);
}

#[test]
fn fallback_leaves_the_sink_untouched() {
    let mut fix = Fix::new();
    let q = fix.sym("q");
    let env = Env::new();

    // rejection path: a free variable
    let mut out = Value::Int(42);
    assert!(!fix.backend.try_evaluate(&var(q), &env, &mut out));
    assert_eq!(out, Value::Int(42));

    // runtime-failure path: a failed assertion
    let f = fix.sym("false");
    let expr = Expr::Assert {
        condition: Box::new(var(f)),
        body: Box::new(int(1)),
    };
    let mut out = Value::Int(42);
    assert!(!fix.backend.try_evaluate(&expr, &env, &mut out));
    assert_eq!(out, Value::Int(42));
}

#[test]
fn unapplied_lambda_is_not_extractable() {
    let mut fix = Fix::new();
    let x = fix.sym("x");
    assert_eq!(fix.eval(&lambda(x, var(x))), None);
}

#[test]
fn float_arithmetic_is_rejected() {
    let mut fix = Fix::new();
    let expr = sum(vec![Expr::Float(1.5), int(1)]);
    assert!(!fix.backend.can_evaluate(&expr));
    let mul = fix.sym("__mul");
    let expr = call(var(mul), vec![Expr::Float(1.5), Expr::Float(2.0)]);
    assert!(!fix.backend.can_evaluate(&expr));
}

#[test]
fn dynamic_attributes_are_rejected() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let expr = Expr::Attrs(AttrSet {
        recursive: false,
        bindings: plain(vec![(a, int(1))]),
        dynamic: vec![(text("k"), int(2))],
    });
    assert!(!fix.backend.can_evaluate(&expr));
}

#[test]
fn free_variables_are_rejected() {
    let mut fix = Fix::new();
    let q = fix.sym("q");
    assert!(!fix.backend.can_evaluate(&var(q)));
    // but the same name under a with is accepted optimistically
    let a = fix.sym("a");
    let expr = with(attrs(false, vec![(a, int(1))]), var(q));
    assert!(fix.backend.can_evaluate(&expr));
}

#[test]
fn statistics_accumulate() {
    let mut fix = Fix::new();
    let q = fix.sym("q");
    fix.eval(&sum(vec![int(1), int(2)])).unwrap();
    assert!(fix.eval(&var(q)).is_none());
    let stats = fix.backend.stats();
    assert_eq!(stats.evaluations, 1);
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.fallbacks, 1);
    assert!(stats.interactions > 0);
    assert!(stats.heap_words > 0);
    assert!(!stats.show().is_empty());
}

#[test]
fn nested_lets_share_and_shadow() {
    let mut fix = Fix::new();
    let x = fix.sym("x");
    let y = fix.sym("y");
    // let x = 1; in let y = x + 1; in let x = 10; in x + y  =>  12
    let expr = let_in(
        vec![(x, int(1))],
        let_in(
            vec![(y, sum(vec![var(x), int(1)]))],
            let_in(vec![(x, int(10))], sum(vec![var(x), var(y)])),
        ),
    );
    assert_eq!(fix.eval_ok(&expr), Value::Int(12));
}

#[test]
fn deep_structure_round_trip() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let b = fix.sym("b");
    let null = fix.sym("null");
    // { a = [ 1 { b = null; } ]; b = "s"; }
    let expr = attrs(
        false,
        vec![
            (
                a,
                Expr::List(vec![int(1), attrs(false, vec![(b, var(null))])]),
            ),
            (b, text("s")),
        ],
    );
    let expected = attr_value(vec![
        (
            a,
            Value::List(vec![Value::Int(1), attr_value(vec![(b, Value::Null)])]),
        ),
        (b, Value::String(ArcStr::from("s"))),
    ]);
    assert_eq!(fix.eval_ok(&expr), expected);
}

#[test]
fn paths_carry_their_accessor() {
    let mut fix = Fix::new();
    let accessor = crate::Accessor::new("/src");
    let expr = Expr::Path {
        accessor: accessor.clone(),
        path: ArcStr::from("lib/default.lang"),
    };
    let Value::Path {
        accessor: out,
        path,
    } = fix.eval_ok(&expr)
    else {
        panic!("expected a path");
    };
    assert!(out.same(&accessor));
    assert_eq!(path.as_str(), "lib/default.lang");
}

#[test]
fn can_evaluate_is_pure_and_repeatable() {
    let mut fix = Fix::new();
    let a = fix.sym("a");
    let expr = select(attrs(false, vec![(a, int(1))]), vec![a], None);
    for _ in 0..3 {
        assert!(fix.backend.can_evaluate(&expr));
    }
    assert_eq!(fix.backend.stats().evaluations, 0);
}
