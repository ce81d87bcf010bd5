use tracing::trace;

use super::heap::{Heap, Slot};
use super::stats::Rewrites;
use super::term::{Opcode, Tag, Term};
use crate::encode::{ctor_arity, tag};

/// Recoverable failures inside the reduction engine. None of these escape
/// the backend; every one of them resolves to a fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetError {
    HeapOverflow,
    StackOverflow,
    /// A numeric primitive met a non-numeric operand, e.g. arithmetic on a
    /// value that took the wide-integer constructor path.
    NonNumericOperand,
    ArithmeticOverflow,
    DivisionByZero,
    /// Application of a non-function, or a match on an unmatched shape.
    InvalidInteraction,
    /// A free slot or otherwise impossible word reached the reducer.
    MalformedTerm,
}

impl std::fmt::Display for NetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetError::HeapOverflow => write!(f, "term heap exhausted"),
            NetError::StackOverflow => write!(f, "evaluation stack exhausted"),
            NetError::NonNumericOperand => write!(f, "numeric primitive on non-numeric operand"),
            NetError::ArithmeticOverflow => write!(f, "native arithmetic overflow"),
            NetError::DivisionByZero => write!(f, "division by zero"),
            NetError::InvalidInteraction => write!(f, "invalid interaction"),
            NetError::MalformedTerm => write!(f, "malformed term"),
        }
    }
}

impl std::error::Error for NetError {}

pub struct RuntimeOptions {
    /// Size of the term heap in 64-bit words.
    pub heap_words: usize,
    /// Maximum depth of the reduction spine stack.
    pub frame_limit: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            heap_words: 1 << 22,
            frame_limit: 1 << 16,
        }
    }
}

/// One pending spine position during weak-normal-form reduction.
enum Frame {
    App(Term),
    Dup(Term),
    Mat(Term),
    OpFst(Term),
    OpSnd(Term, Term),
}

impl Frame {
    fn original(&self) -> Term {
        match self {
            Frame::App(t)
            | Frame::Dup(t)
            | Frame::Mat(t)
            | Frame::OpFst(t)
            | Frame::OpSnd(t, _) => *t,
        }
    }
}

/// Owns the heap and the evaluation stack, and drives reduction. One runtime
/// per thread of evaluation; nothing here is shared or synchronized. The
/// heap is wiped wholesale by [`Runtime::reset`] between compilations.
pub struct Runtime {
    heap: Heap,
    frames: Vec<Frame>,
    frame_limit: usize,
    pub rewrites: Rewrites,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            heap: Heap::with_capacity(options.heap_words),
            frames: Vec::with_capacity(256),
            frame_limit: options.frame_limit,
            rewrites: Rewrites::default(),
        }
    }

    pub fn reset(&mut self) {
        self.heap.reset();
        self.rewrites.clear();
    }

    pub fn heap_used(&self) -> u32 {
        self.heap.used()
    }

    pub fn alloc(&mut self, n: u32) -> Result<Slot, NetError> {
        self.heap.alloc(n)
    }

    pub fn get(&self, slot: Slot) -> Term {
        self.heap.get(slot)
    }

    pub fn set(&mut self, slot: Slot, term: Term) {
        self.heap.set(slot, term)
    }

    /// Builds an application node.
    pub fn app_node(&mut self, function: Term, argument: Term) -> Result<Term, NetError> {
        let slot = self.heap.alloc(2)?;
        self.heap.set(slot, function);
        self.heap.set(slot.offset(1), argument);
        Ok(Term::app(slot))
    }

    pub fn op2_node(&mut self, op: Opcode, lhs: Term, rhs: Term) -> Result<Term, NetError> {
        let slot = self.heap.alloc(2)?;
        self.heap.set(slot, lhs);
        self.heap.set(slot.offset(1), rhs);
        Ok(Term::op2(op, slot))
    }

    pub fn ctr_node(&mut self, tag: u32, fields: &[Term]) -> Result<Term, NetError> {
        if fields.is_empty() {
            return Ok(Term::ctr0(tag));
        }
        let slot = self.heap.alloc(fields.len() as u32)?;
        for (i, field) in fields.iter().enumerate() {
            self.heap.set(slot.offset(i as u32), *field);
        }
        Ok(Term::ctr(tag, slot))
    }

    /// Builds a match node: `{scrutinee, key0, arm0, .., default}`. A `Num`
    /// scrutinee selects by value and takes the arm directly; a constructor
    /// selects by its tag and the arm is applied to each field in order; the
    /// default arm is applied to the scrutinee itself.
    pub fn mat_node(
        &mut self,
        scrutinee: Term,
        arms: &[(u32, Term)],
        default: Term,
    ) -> Result<Term, NetError> {
        let n = arms.len() as u32;
        let slot = self.heap.alloc(2 * n + 2)?;
        self.heap.set(slot, scrutinee);
        for (i, (key, arm)) in arms.iter().enumerate() {
            self.heap.set(slot.offset(1 + 2 * i as u32), Term::num(*key));
            self.heap.set(slot.offset(2 + 2 * i as u32), *arm);
        }
        self.heap.set(slot.offset(1 + 2 * n), default);
        Ok(Term::mat(n, slot))
    }

    /// Reduces to weak normal form: stops at the outermost value. A spine
    /// stuck on an unbound variable is returned as-is; extraction rejects
    /// it later.
    pub fn evaluate_wnf(&mut self, root: Term) -> Result<Term, NetError> {
        let mut frames = core::mem::take(&mut self.frames);
        frames.clear();
        let result = self.wnf_with(&mut frames, root);
        self.frames = frames;
        result
    }

    /// Reduces to strong normal form: weak normal form at every position,
    /// recursing through constructor fields, superposition branches, and
    /// lambda bodies.
    pub fn evaluate_snf(&mut self, root: Term) -> Result<Term, NetError> {
        stacker::maybe_grow(64 * 1024, 4 * 1024 * 1024, || {
            let term = self.evaluate_wnf(root)?;
            match term.tag() {
                Tag::Ctr => {
                    let arity = ctor_arity(term.ext());
                    for i in 0..arity {
                        let slot = term.slot().offset(i);
                        let field = self.heap.get(slot);
                        let field = self.evaluate_snf(field)?;
                        self.heap.set(slot, field);
                    }
                    Ok(term)
                }
                Tag::Sup => {
                    for i in 0..2 {
                        let slot = term.slot().offset(i);
                        let branch = self.heap.get(slot);
                        let branch = self.evaluate_snf(branch)?;
                        self.heap.set(slot, branch);
                    }
                    Ok(term)
                }
                Tag::Lam => {
                    let slot = term.slot();
                    let body = self.heap.get(slot);
                    if !body.is_sub() && body.tag() != Tag::Free {
                        let body = self.evaluate_snf(body)?;
                        self.heap.set(slot, body);
                    }
                    Ok(term)
                }
                _ => Ok(term),
            }
        })
    }

    fn push(&self, frames: &mut Vec<Frame>, frame: Frame) -> Result<(), NetError> {
        if frames.len() >= self.frame_limit {
            return Err(NetError::StackOverflow);
        }
        frames.push(frame);
        Ok(())
    }

    fn wnf_with(&mut self, frames: &mut Vec<Frame>, root: Term) -> Result<Term, NetError> {
        let mut next = root;
        loop {
            match next.tag() {
                Tag::Free => return Err(NetError::MalformedTerm),
                Tag::Var => {
                    let held = self.heap.get(next.slot());
                    if held.is_sub() {
                        next = held.unsub();
                        continue;
                    }
                    // unbound: the whole spine is stuck
                    return Ok(frames.first().map(Frame::original).unwrap_or(next));
                }
                Tag::Co0 | Tag::Co1 => {
                    let held = self.heap.get(next.slot());
                    if held.is_sub() {
                        next = held.unsub();
                        continue;
                    }
                    self.push(frames, Frame::Dup(next))?;
                    next = held;
                }
                Tag::App => {
                    self.push(frames, Frame::App(next))?;
                    next = self.heap.get(next.slot());
                }
                Tag::Mat => {
                    self.push(frames, Frame::Mat(next))?;
                    next = self.heap.get(next.slot());
                }
                Tag::Op2 => {
                    self.push(frames, Frame::OpFst(next))?;
                    next = self.heap.get(next.slot());
                }
                Tag::Lam | Tag::Num | Tag::Ctr | Tag::Sup => {
                    let Some(frame) = frames.pop() else {
                        return Ok(next);
                    };
                    match frame {
                        Frame::App(app) => next = self.interact_app(app, next)?,
                        Frame::Dup(proj) => next = self.interact_dup(proj, next)?,
                        Frame::Mat(mat) => next = self.interact_mat(mat, next)?,
                        Frame::OpFst(op) => {
                            next = match next.tag() {
                                Tag::Num => {
                                    self.push(frames, Frame::OpSnd(op, next))?;
                                    self.heap.get(op.slot().offset(1))
                                }
                                Tag::Sup => self.commute_op_fst(op, next)?,
                                _ => return Err(NetError::NonNumericOperand),
                            };
                        }
                        Frame::OpSnd(op, lhs) => next = self.interact_op_snd(op, lhs, next)?,
                    }
                }
            }
        }
    }

    fn interact_app(&mut self, app: Term, value: Term) -> Result<Term, NetError> {
        match value.tag() {
            Tag::Lam => {
                let argument = self.heap.get(app.slot().offset(1));
                let lam_slot = value.slot();
                let body = self.heap.get(lam_slot);
                self.heap.set(lam_slot, argument.with_sub());
                self.rewrites.app_lam += 1;
                Ok(body)
            }
            Tag::Sup => {
                // ({a b} x)  =>  dup x0 x1 = x; {(a x0) (b x1)}
                let label = value.ext();
                let argument = self.heap.get(app.slot().offset(1));
                let left = self.heap.get(value.slot());
                let right = self.heap.get(value.slot().offset(1));
                let dup = self.heap.alloc(1)?;
                self.heap.set(dup, argument);
                let app0 = self.app_node(left, Term::co0(label, dup))?;
                let app1 = self.app_node(right, Term::co1(label, dup))?;
                let pair = self.heap.alloc(2)?;
                self.heap.set(pair, app0);
                self.heap.set(pair.offset(1), app1);
                self.rewrites.app_sup += 1;
                Ok(Term::sup(label, pair))
            }
            _ => {
                trace!(?value, "applied a non-function");
                Err(NetError::InvalidInteraction)
            }
        }
    }

    fn interact_dup(&mut self, proj: Term, value: Term) -> Result<Term, NetError> {
        let label = proj.ext();
        let dup_slot = proj.slot();
        let first = proj.tag() == Tag::Co0;
        match value.tag() {
            Tag::Num => {
                self.heap.set(dup_slot, value.with_sub());
                self.rewrites.dup_copy += 1;
                Ok(value)
            }
            Tag::Ctr => {
                let arity = ctor_arity(value.ext());
                if arity == 0 {
                    self.heap.set(dup_slot, value.with_sub());
                    self.rewrites.dup_copy += 1;
                    return Ok(value);
                }
                let field_dups = self.heap.alloc(arity)?;
                for i in 0..arity {
                    let field = self.heap.get(value.slot().offset(i));
                    self.heap.set(field_dups.offset(i), field);
                }
                let mine = self.heap.alloc(arity)?;
                let theirs = self.heap.alloc(arity)?;
                for i in 0..arity {
                    let node = field_dups.offset(i);
                    let (m, t) = if first {
                        (Term::co0(label, node), Term::co1(label, node))
                    } else {
                        (Term::co1(label, node), Term::co0(label, node))
                    };
                    self.heap.set(mine.offset(i), m);
                    self.heap.set(theirs.offset(i), t);
                }
                self.heap
                    .set(dup_slot, Term::ctr(value.ext(), theirs).with_sub());
                self.rewrites.dup_ctr += 1;
                Ok(Term::ctr(value.ext(), mine))
            }
            Tag::Lam => {
                // dup a b = λx f  =>  a = λx0 f0; b = λx1 f1;
                //                     x = {x0 x1}; dup f0 f1 = f
                let lam_slot = value.slot();
                let body = self.heap.get(lam_slot);
                let body_dup = self.heap.alloc(1)?;
                self.heap.set(body_dup, body);
                let lam0 = self.heap.alloc(1)?;
                self.heap.set(lam0, Term::co0(label, body_dup));
                let lam1 = self.heap.alloc(1)?;
                self.heap.set(lam1, Term::co1(label, body_dup));
                let sup = self.heap.alloc(2)?;
                self.heap.set(sup, Term::var(lam0));
                self.heap.set(sup.offset(1), Term::var(lam1));
                self.heap.set(lam_slot, Term::sup(label, sup).with_sub());
                let (mine, theirs) = if first {
                    (Term::lam(lam0), Term::lam(lam1))
                } else {
                    (Term::lam(lam1), Term::lam(lam0))
                };
                self.heap.set(dup_slot, theirs.with_sub());
                self.rewrites.dup_lam += 1;
                Ok(mine)
            }
            Tag::Sup if value.ext() == label => {
                let left = self.heap.get(value.slot());
                let right = self.heap.get(value.slot().offset(1));
                let (mine, theirs) = if first { (left, right) } else { (right, left) };
                self.heap.set(dup_slot, theirs.with_sub());
                self.rewrites.annihilate += 1;
                Ok(mine)
            }
            Tag::Sup => {
                // labels differ: the duplication passes through the fork
                let other = value.ext();
                let left = self.heap.get(value.slot());
                let right = self.heap.get(value.slot().offset(1));
                let d0 = self.heap.alloc(1)?;
                self.heap.set(d0, left);
                let d1 = self.heap.alloc(1)?;
                self.heap.set(d1, right);
                let make = |first: bool, node: Slot| {
                    if first {
                        Term::co0(label, node)
                    } else {
                        Term::co1(label, node)
                    }
                };
                let mine = self.heap.alloc(2)?;
                self.heap.set(mine, make(first, d0));
                self.heap.set(mine.offset(1), make(first, d1));
                let theirs = self.heap.alloc(2)?;
                self.heap.set(theirs, make(!first, d0));
                self.heap.set(theirs.offset(1), make(!first, d1));
                self.heap.set(dup_slot, Term::sup(other, theirs).with_sub());
                self.rewrites.commute += 1;
                Ok(Term::sup(other, mine))
            }
            _ => Err(NetError::InvalidInteraction),
        }
    }

    fn interact_mat(&mut self, mat: Term, value: Term) -> Result<Term, NetError> {
        let n = mat.ext();
        let loc = mat.slot();
        let default = self.heap.get(loc.offset(1 + 2 * n));
        match value.tag() {
            Tag::Num => {
                // numeric keys and constructor-tag keys live in disjoint
                // ranges; a number never selects a constructor arm
                for i in 0..n {
                    let key = self.heap.get(loc.offset(1 + 2 * i));
                    if key.val() < tag::BASE && key.val() == value.val() {
                        self.rewrites.mat += 1;
                        return Ok(self.heap.get(loc.offset(2 + 2 * i)));
                    }
                }
                self.rewrites.mat += 1;
                self.app_node(default, value)
            }
            Tag::Ctr => {
                for i in 0..n {
                    let key = self.heap.get(loc.offset(1 + 2 * i));
                    if key.val() == value.ext() {
                        let mut result = self.heap.get(loc.offset(2 + 2 * i));
                        for f in 0..ctor_arity(value.ext()) {
                            let field = self.heap.get(value.slot().offset(f));
                            result = self.app_node(result, field)?;
                        }
                        self.rewrites.mat += 1;
                        return Ok(result);
                    }
                }
                self.rewrites.mat += 1;
                self.app_node(default, value)
            }
            Tag::Sup => self.commute_mat(mat, value),
            _ => Err(NetError::InvalidInteraction),
        }
    }

    /// Match on a superposition: fork the match, duplicating every arm.
    /// Superpositions only ever arise from duplication here, so both forks
    /// carry copies of the same underlying value and select the same arm.
    fn commute_mat(&mut self, mat: Term, value: Term) -> Result<Term, NetError> {
        let n = mat.ext();
        let loc = mat.slot();
        let label = value.ext();
        let left = self.heap.get(value.slot());
        let right = self.heap.get(value.slot().offset(1));

        let mat0 = self.heap.alloc(2 * n + 2)?;
        let mat1 = self.heap.alloc(2 * n + 2)?;
        self.heap.set(mat0, left);
        self.heap.set(mat1, right);
        for i in 0..n {
            let key = self.heap.get(loc.offset(1 + 2 * i));
            let arm = self.heap.get(loc.offset(2 + 2 * i));
            let dup = self.heap.alloc(1)?;
            self.heap.set(dup, arm);
            self.heap.set(mat0.offset(1 + 2 * i), key);
            self.heap.set(mat0.offset(2 + 2 * i), Term::co0(label, dup));
            self.heap.set(mat1.offset(1 + 2 * i), key);
            self.heap.set(mat1.offset(2 + 2 * i), Term::co1(label, dup));
        }
        let default = self.heap.get(loc.offset(1 + 2 * n));
        let dup = self.heap.alloc(1)?;
        self.heap.set(dup, default);
        self.heap.set(mat0.offset(1 + 2 * n), Term::co0(label, dup));
        self.heap.set(mat1.offset(1 + 2 * n), Term::co1(label, dup));

        let pair = self.heap.alloc(2)?;
        self.heap.set(pair, Term::mat(n, mat0));
        self.heap.set(pair.offset(1), Term::mat(n, mat1));
        self.rewrites.commute += 1;
        Ok(Term::sup(label, pair))
    }

    fn commute_op_fst(&mut self, op: Term, value: Term) -> Result<Term, NetError> {
        let opcode = Opcode::from_ext(op.ext()).ok_or(NetError::MalformedTerm)?;
        let label = value.ext();
        let left = self.heap.get(value.slot());
        let right = self.heap.get(value.slot().offset(1));
        let rhs = self.heap.get(op.slot().offset(1));
        let dup = self.heap.alloc(1)?;
        self.heap.set(dup, rhs);
        let op0 = self.op2_node(opcode, left, Term::co0(label, dup))?;
        let op1 = self.op2_node(opcode, right, Term::co1(label, dup))?;
        let pair = self.heap.alloc(2)?;
        self.heap.set(pair, op0);
        self.heap.set(pair.offset(1), op1);
        self.rewrites.commute += 1;
        Ok(Term::sup(label, pair))
    }

    fn interact_op_snd(&mut self, op: Term, lhs: Term, value: Term) -> Result<Term, NetError> {
        let opcode = Opcode::from_ext(op.ext()).ok_or(NetError::MalformedTerm)?;
        match value.tag() {
            Tag::Num => {
                let result = apply_op(opcode, lhs.val(), value.val())?;
                self.rewrites.op2 += 1;
                Ok(Term::num(result))
            }
            Tag::Sup => {
                // the left operand is an immediate, so it copies freely
                let label = value.ext();
                let left = self.heap.get(value.slot());
                let right = self.heap.get(value.slot().offset(1));
                let op0 = self.op2_node(opcode, lhs, left)?;
                let op1 = self.op2_node(opcode, lhs, right)?;
                let pair = self.heap.alloc(2)?;
                self.heap.set(pair, op0);
                self.heap.set(pair.offset(1), op1);
                self.rewrites.commute += 1;
                Ok(Term::sup(label, pair))
            }
            _ => Err(NetError::NonNumericOperand),
        }
    }
}

fn apply_op(op: Opcode, a: u32, b: u32) -> Result<u32, NetError> {
    Ok(match op {
        Opcode::Add => (a as i32)
            .checked_add(b as i32)
            .ok_or(NetError::ArithmeticOverflow)? as u32,
        Opcode::Sub => (a as i32)
            .checked_sub(b as i32)
            .ok_or(NetError::ArithmeticOverflow)? as u32,
        Opcode::Mul => (a as i32)
            .checked_mul(b as i32)
            .ok_or(NetError::ArithmeticOverflow)? as u32,
        Opcode::Div => {
            if b as i32 == 0 {
                return Err(NetError::DivisionByZero);
            }
            (a as i32)
                .checked_div(b as i32)
                .ok_or(NetError::ArithmeticOverflow)? as u32
        }
        Opcode::Eq => (a == b) as u32,
        Opcode::Ne => (a != b) as u32,
        Opcode::Ltu => (a < b) as u32,
        Opcode::Xor => a ^ b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeOptions {
            heap_words: 1 << 12,
            frame_limit: 1 << 10,
        })
    }

    fn identity(rt: &mut Runtime) -> Term {
        let slot = rt.alloc(1).unwrap();
        rt.set(slot, Term::var(slot));
        Term::lam(slot)
    }

    #[test]
    fn apply_identity() {
        let mut rt = runtime();
        let id = identity(&mut rt);
        let app = rt.app_node(id, Term::num(7)).unwrap();
        let result = rt.evaluate_wnf(app).unwrap();
        assert_eq!(result.tag(), Tag::Num);
        assert_eq!(result.val(), 7);
        assert_eq!(rt.rewrites.app_lam, 1);
    }

    #[test]
    fn duplicate_a_number() {
        let mut rt = runtime();
        let dup = rt.alloc(1).unwrap();
        rt.set(dup, Term::num(3));
        let sum = rt
            .op2_node(Opcode::Add, Term::co0(9, dup), Term::co1(9, dup))
            .unwrap();
        let result = rt.evaluate_wnf(sum).unwrap();
        assert_eq!(result.val(), 6);
    }

    #[test]
    fn duplicate_a_lambda() {
        // dup f0 f1 = λx.x; (f0 (f1 5))
        let mut rt = runtime();
        let id = identity(&mut rt);
        let dup = rt.alloc(1).unwrap();
        rt.set(dup, id);
        let inner = rt.app_node(Term::co1(4, dup), Term::num(5)).unwrap();
        let outer = rt.app_node(Term::co0(4, dup), inner).unwrap();
        let result = rt.evaluate_wnf(outer).unwrap();
        assert_eq!(result.val(), 5);
        assert!(rt.rewrites.dup_lam >= 1);
    }

    #[test]
    fn match_selects_by_number_and_applies_default_to_scrutinee() {
        let mut rt = runtime();
        // ~0 {0: 10; _: λx.x}  =>  10
        let default = identity(&mut rt);
        let m = rt.mat_node(Term::num(0), &[(0, Term::num(10))], default).unwrap();
        assert_eq!(rt.evaluate_wnf(m).unwrap().val(), 10);

        // ~7 {0: 10; _: λx.x}  =>  (λx.x 7)  =>  7
        let default = identity(&mut rt);
        let m = rt.mat_node(Term::num(7), &[(0, Term::num(10))], default).unwrap();
        assert_eq!(rt.evaluate_wnf(m).unwrap().val(), 7);
    }

    #[test]
    fn match_applies_constructor_arm_to_fields() {
        use crate::encode::tag;
        let mut rt = runtime();
        // ~Con{1, Nil} {Con: λh.λt.h; _: λx.x}  =>  1
        let spine = rt
            .ctr_node(tag::CON, &[Term::num(1), Term::ctr0(tag::NIL)])
            .unwrap();
        let tail_slot = rt.alloc(1).unwrap();
        let head_slot = rt.alloc(1).unwrap();
        rt.set(head_slot, Term::lam(tail_slot));
        rt.set(tail_slot, Term::var(head_slot));
        let arm = Term::lam(head_slot);
        let default = identity(&mut rt);
        let m = rt.mat_node(spine, &[(tag::CON, arm)], default).unwrap();
        assert_eq!(rt.evaluate_wnf(m).unwrap().val(), 1);
    }

    #[test]
    fn division_by_zero_is_recoverable() {
        let mut rt = runtime();
        let term = rt.op2_node(Opcode::Div, Term::num(1), Term::num(0)).unwrap();
        assert_eq!(rt.evaluate_wnf(term), Err(NetError::DivisionByZero));
    }

    #[test]
    fn overflow_is_recoverable() {
        let mut rt = runtime();
        let big = Term::num(i32::MAX as u32);
        let term = rt.op2_node(Opcode::Add, big, Term::num(1)).unwrap();
        assert_eq!(rt.evaluate_wnf(term), Err(NetError::ArithmeticOverflow));
    }

    #[test]
    fn arithmetic_on_constructor_operand_is_recoverable() {
        use crate::encode::tag;
        let mut rt = runtime();
        let wide = rt.ctr_node(tag::POS, &[Term::num(0), Term::num(1)]).unwrap();
        let term = rt.op2_node(Opcode::Add, wide, Term::num(1)).unwrap();
        assert_eq!(rt.evaluate_wnf(term), Err(NetError::NonNumericOperand));
    }

    #[test]
    fn unbound_variable_is_stuck_not_an_error() {
        let mut rt = runtime();
        let lam_slot = rt.alloc(1).unwrap();
        rt.set(lam_slot, Term::num(1)); // body, irrelevant
        let stuck = rt.evaluate_wnf(Term::var(lam_slot)).unwrap();
        assert_eq!(stuck.tag(), Tag::Var);
    }

    #[test]
    fn heap_exhaustion_during_reduction_is_recoverable() {
        let mut rt = Runtime::new(RuntimeOptions {
            heap_words: 8,
            frame_limit: 64,
        });
        let id = identity(&mut rt);
        let dup = rt.alloc(1).unwrap();
        rt.set(dup, id);
        let app = rt.app_node(Term::co0(1, dup), Term::num(0)).unwrap();
        // duplicating the lambda needs more room than is left
        assert_eq!(rt.evaluate_wnf(app), Err(NetError::HeapOverflow));
    }
}
