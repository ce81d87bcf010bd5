use super::heap::Slot;

// Word layout, from the top bit down:
//
//   S TTTTTTT EEEEEEEEEEEEEEEEEEEEEEEE VVVVVVVVVVVVVVVVVVVVVVVVVVVVVVVV
//
//   S : 1  substitution marker
//   T : 7  node-kind tag
//   E : 24 extension (constructor name, dup label, opcode, arm count)
//   V : 32 value (immediate payload or heap index)
//
// A zero word is a free heap slot, never a valid term.
const SUB_BIT: u64 = 1 << 63;
const TAG_SHIFT: u32 = 56;
const TAG_MASK: u64 = 0x7F;
const EXT_SHIFT: u32 = 32;
const EXT_MASK: u64 = 0xFF_FFFF;
const VAL_MASK: u64 = 0xFFFF_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// A free (zeroed) heap slot.
    Free = 0,
    /// A variable bound by a lambda; val is the lambda's slot, where the
    /// substituted argument will appear.
    Var = 1,
    /// First projection of a duplication; ext is the label, val the dup slot.
    Co0 = 2,
    /// Second projection of a duplication.
    Co1 = 3,
    /// Lambda; val points at a 1-slot node holding the body.
    Lam = 4,
    /// Application; val points at a 2-slot node {function, argument}.
    App = 5,
    /// Superposition; ext is the label, val a 2-slot node. Arises only from
    /// duplicating a lambda, never as user data.
    Sup = 6,
    /// Pattern match; ext is the arm count N, val points at a
    /// {scrutinee, key0, arm0, .., default} node of 2N + 2 slots.
    Mat = 7,
    /// Binary numeric operation; ext is the opcode, val a 2-slot node.
    Op2 = 8,
    /// Native number; val is the immediate 32-bit word. No heap node.
    Num = 9,
    /// Constructor; ext is the constructor tag, val points at the fields
    /// (absent for 0-ary constructors).
    Ctr = 10,
}

impl Tag {
    fn from_bits(bits: u64) -> Tag {
        match bits {
            1 => Tag::Var,
            2 => Tag::Co0,
            3 => Tag::Co1,
            4 => Tag::Lam,
            5 => Tag::App,
            6 => Tag::Sup,
            7 => Tag::Mat,
            8 => Tag::Op2,
            9 => Tag::Num,
            10 => Tag::Ctr,
            _ => Tag::Free,
        }
    }
}

/// Opcodes for [`Tag::Op2`] nodes. `Add`..`Div` treat the word as i32 with
/// overflow and division by zero surfaced as recoverable errors; the rest
/// are raw u32 operations used by generated dispatch code (signed comparison
/// is expressed there as the XOR-sign-bit trick over `Ltu`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Ltu,
    Xor,
}

impl Opcode {
    pub(crate) fn from_ext(ext: u32) -> Option<Opcode> {
        Some(match ext {
            0 => Opcode::Add,
            1 => Opcode::Sub,
            2 => Opcode::Mul,
            3 => Opcode::Div,
            4 => Opcode::Eq,
            5 => Opcode::Ne,
            6 => Opcode::Ltu,
            7 => Opcode::Xor,
            _ => return None,
        })
    }

    pub(crate) fn ext(self) -> u32 {
        match self {
            Opcode::Add => 0,
            Opcode::Sub => 1,
            Opcode::Mul => 2,
            Opcode::Div => 3,
            Opcode::Eq => 4,
            Opcode::Ne => 5,
            Opcode::Ltu => 6,
            Opcode::Xor => 7,
        }
    }
}

/// A graph node reference packed into one 64-bit word. Immutable once
/// constructed; the runtime rewrites heap slots, not terms.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Term(u64);

impl Term {
    pub const EMPTY: Term = Term(0);

    fn pack(tag: Tag, ext: u32, val: u32) -> Term {
        debug_assert!(ext as u64 <= EXT_MASK);
        Term(((tag as u64) << TAG_SHIFT) | ((ext as u64) << EXT_SHIFT) | val as u64)
    }

    pub fn var(slot: Slot) -> Term {
        Term::pack(Tag::Var, 0, slot.0)
    }

    pub fn co0(label: u32, slot: Slot) -> Term {
        Term::pack(Tag::Co0, label, slot.0)
    }

    pub fn co1(label: u32, slot: Slot) -> Term {
        Term::pack(Tag::Co1, label, slot.0)
    }

    pub fn lam(slot: Slot) -> Term {
        Term::pack(Tag::Lam, 0, slot.0)
    }

    pub fn app(slot: Slot) -> Term {
        Term::pack(Tag::App, 0, slot.0)
    }

    pub fn sup(label: u32, slot: Slot) -> Term {
        Term::pack(Tag::Sup, label, slot.0)
    }

    pub fn mat(arms: u32, slot: Slot) -> Term {
        Term::pack(Tag::Mat, arms, slot.0)
    }

    pub fn op2(op: Opcode, slot: Slot) -> Term {
        Term::pack(Tag::Op2, op.ext(), slot.0)
    }

    pub fn num(val: u32) -> Term {
        Term::pack(Tag::Num, 0, val)
    }

    pub fn ctr(tag: u32, slot: Slot) -> Term {
        Term::pack(Tag::Ctr, tag, slot.0)
    }

    /// A 0-ary constructor carries no fields and points nowhere.
    pub fn ctr0(tag: u32) -> Term {
        Term::pack(Tag::Ctr, tag, 0)
    }

    pub fn tag(self) -> Tag {
        Tag::from_bits((self.0 >> TAG_SHIFT) & TAG_MASK)
    }

    pub fn ext(self) -> u32 {
        ((self.0 >> EXT_SHIFT) & EXT_MASK) as u32
    }

    pub fn val(self) -> u32 {
        (self.0 & VAL_MASK) as u32
    }

    pub fn slot(self) -> Slot {
        Slot(self.val())
    }

    pub fn is_sub(self) -> bool {
        self.0 & SUB_BIT != 0
    }

    pub fn with_sub(self) -> Term {
        Term(self.0 | SUB_BIT)
    }

    pub fn unsub(self) -> Term {
        Term(self.0 & !SUB_BIT)
    }
}

impl core::fmt::Debug for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_sub() {
            write!(f, "^")?;
        }
        let t = self.unsub();
        match t.tag() {
            Tag::Free => write!(f, "Free"),
            Tag::Var => write!(f, "Var@{}", t.val()),
            Tag::Co0 => write!(f, "Co0#{}@{}", t.ext(), t.val()),
            Tag::Co1 => write!(f, "Co1#{}@{}", t.ext(), t.val()),
            Tag::Lam => write!(f, "Lam@{}", t.val()),
            Tag::App => write!(f, "App@{}", t.val()),
            Tag::Sup => write!(f, "Sup#{}@{}", t.ext(), t.val()),
            Tag::Mat => write!(f, "Mat/{}@{}", t.ext(), t.val()),
            Tag::Op2 => write!(f, "Op2.{}@{}", t.ext(), t.val()),
            Tag::Num => write!(f, "Num({})", t.val()),
            Tag::Ctr => write!(f, "Ctr#{:x}@{}", t.ext(), t.val()),
        }
    }
}
