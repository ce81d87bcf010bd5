//! The orchestrator tying the pipeline together: capability check, heap
//! reset, compile, reduce to strong normal form, extract. Every call ends in
//! one of two outcomes: success, with the host sink populated and the
//! statistics bumped, or fallback, with the sink untouched and the caller
//! expected to re-evaluate with the standard evaluator. No error of any kind
//! escapes past this module.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use tracing::debug;

use crate::compile::analyze::Analyzer;
use crate::compile::{CompileError, Compiler};
use crate::encode::{AccessorRegistry, StringTable};
use crate::extract::{ExtractError, Extractor};
use crate::lang::ast::Expr;
use crate::lang::symbol::SymbolTable;
use crate::lang::value::{Env, Value};
use crate::net::{NetError, Runtime, RuntimeOptions};

/// Cumulative, read-only observability counters. Not part of the
/// correctness contract.
#[derive(Clone, Default, Serialize)]
pub struct Stats {
    /// Expressions successfully compiled to a term graph.
    pub compilations: u64,
    /// Evaluations that produced a host value.
    pub evaluations: u64,
    /// Attempts resolved by falling back to the standard evaluator.
    pub fallbacks: u64,
    /// Interactions carried out across all evaluations.
    pub interactions: u64,
    /// Heap words consumed across all evaluations.
    pub heap_words: u64,
}

impl Stats {
    pub fn show(&self) -> String {
        format!(
            "\
            \tCompilations: {}\n\
            \tEvaluations: {}\n\
            \tFallbacks: {}\n\
            \tInteractions: {}\n\
            \tHeap words: {}\n\
        ",
            self.compilations, self.evaluations, self.fallbacks, self.interactions, self.heap_words,
        )
    }
}

enum Failure {
    Compile(CompileError),
    Net(NetError),
    Extract(ExtractError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Compile(e) => write!(f, "compile: {}", e),
            Failure::Net(e) => write!(f, "reduce: {}", e),
            Failure::Extract(e) => write!(f, "extract: {}", e),
        }
    }
}

/// The alternative evaluator backend. Owns the runtime, the interning
/// tables (which persist across evaluations), and the statistics. One
/// backend per thread; nothing here is synchronized.
pub struct NetBackend {
    runtime: Runtime,
    symbols: SymbolTable,
    strings: StringTable,
    accessors: AccessorRegistry,
    stats: Stats,
}

impl Default for NetBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NetBackend {
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        Self {
            runtime: Runtime::new(options),
            symbols: SymbolTable::new(),
            strings: StringTable::new(),
            accessors: AccessorRegistry::new(),
            stats: Stats::default(),
        }
    }

    /// The symbol table shared with the host; expressions handed to this
    /// backend must intern their names here.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Pure query: would the compiler accept this expression? Safe to call
    /// repeatedly, no side effects.
    pub fn can_evaluate(&self, expr: &Expr) -> bool {
        Analyzer::new(&self.symbols).can_compile(expr, &mut Vec::new())
    }

    /// Compiles, reduces and extracts `expr` into `result`. On `true` the
    /// sink holds the fully evaluated value, owned fresh. On `false` the
    /// sink is untouched: extraction goes through a temporary and is moved
    /// only on full success.
    pub fn try_evaluate(&mut self, expr: &Expr, _env: &Env, result: &mut Value) -> bool {
        if !self.can_evaluate(expr) {
            debug!("net backend fallback: rejected by capability check");
            self.stats.fallbacks += 1;
            return false;
        }

        self.runtime.reset();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.evaluate(expr)));

        self.stats.interactions += self.runtime.rewrites.total();
        self.stats.heap_words += self.runtime.heap_used() as u64;

        match outcome {
            Ok(Ok(value)) => {
                self.stats.evaluations += 1;
                *result = value;
                true
            }
            Ok(Err(failure)) => {
                debug!(%failure, "net backend fallback");
                self.stats.fallbacks += 1;
                false
            }
            Err(_) => {
                debug!("net backend fallback: evaluation panicked");
                self.stats.fallbacks += 1;
                false
            }
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, Failure> {
        let root = {
            let mut compiler = Compiler::new(
                &mut self.runtime,
                &self.symbols,
                &mut self.strings,
                &mut self.accessors,
            );
            compiler.compile(expr).map_err(Failure::Compile)?
        };
        self.stats.compilations += 1;

        let root = self.runtime.evaluate_snf(root).map_err(Failure::Net)?;

        let mut extractor = Extractor {
            rt: &mut self.runtime,
            symbols: &self.symbols,
            strings: &self.strings,
            accessors: &self.accessors,
        };
        if !extractor.can_extract(root) {
            return Err(Failure::Extract(ExtractError::UnsupportedShape));
        }
        extractor.extract(root).map_err(Failure::Extract)
    }
}
