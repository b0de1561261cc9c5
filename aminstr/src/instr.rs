//! The instruction set executed by the engine.
//!
//! Each operation family is a small data structure with public fields,
//! unified in the [`Instr`] tagged union. Every instruction reads a fixed
//! arity of operands and writes exactly one destination slot. You typically
//! manipulate instructions via `Instr`; the generated [`InstrKind`]
//! discriminant (via `strum`) can be helpful for fast classification.
use auto_enums::auto_enum;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumDiscriminants, EnumIs, EnumTryAs};

use crate::operand::{Operand, Slot};

/// Common interface implemented by every instruction node.
///
/// Provides lightweight, zero-allocation iteration over an instruction's
/// input operands and access to its destination slot.
pub trait Instruction {
    /// Iterate over all input operands for this instruction.
    fn operands(&self) -> impl Iterator<Item = &Operand>;

    /// Mutably iterate over all input operands for this instruction.
    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand>;

    /// The slot this instruction writes.
    fn destination(&self) -> Slot;

    /// Update the destination slot for this instruction.
    fn set_destination(&mut self, dest: Slot);

    /// Convenience iterator over referenced slots. Immediates are ignored.
    fn slot_dependencies(&self) -> impl Iterator<Item = Slot> {
        self.operands().filter_map(|op| match op {
            Operand::Slot(slot) => Some(*slot),
            _ => None,
        })
    }
}

/// Binary floating-point arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Atan2,
    Min,
    Max,
}

impl ArithOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
            ArithOp::Pow => "pow",
            ArithOp::Atan2 => "atan2",
            ArithOp::Min => "min",
            ArithOp::Max => "max",
        }
    }
}

impl std::fmt::Display for ArithOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Unary floating-point operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnaryOp {
    Neg,
    Abs,
    Sqrt,
    Cbrt,
    Exp,
    Ln,
    Log2,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Floor,
    Ceil,
    Round,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Cbrt => "cbrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Ln => "ln",
            UnaryOp::Log2 => "log2",
            UnaryOp::Log10 => "log10",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Asin => "asin",
            UnaryOp::Acos => "acos",
            UnaryOp::Atan => "atan",
            UnaryOp::Floor => "floor",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Round => "round",
        }
    }
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Comparison operators. The result is 0/1-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn name(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        }
    }
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Boolean connectives over 0/1-valued operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BitOp {
    And,
    Or,
    Xor,
}

impl BitOp {
    pub fn name(&self) -> &'static str {
        match self {
            BitOp::And => "and",
            BitOp::Or => "or",
            BitOp::Xor => "xor",
        }
    }
}

impl std::fmt::Display for BitOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Elementwise binary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Arith {
    pub op: ArithOp,
    pub dest: Slot,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction for Arith {
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.lhs, &self.rhs].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.lhs, &mut self.rhs].into_iter()
    }

    fn destination(&self) -> Slot {
        self.dest
    }

    fn set_destination(&mut self, dest: Slot) {
        self.dest = dest;
    }
}

/// Elementwise unary math.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Unary {
    pub op: UnaryOp,
    pub dest: Slot,
    pub value: Operand,
}

impl Instruction for Unary {
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.value)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.value)
    }

    fn destination(&self) -> Slot {
        self.dest
    }

    fn set_destination(&mut self, dest: Slot) {
        self.dest = dest;
    }
}

/// Elementwise comparison, writing 1.0 where the predicate holds and 0.0
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cmp {
    pub op: CmpOp,
    pub dest: Slot,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction for Cmp {
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.lhs, &self.rhs].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.lhs, &mut self.rhs].into_iter()
    }

    fn destination(&self) -> Slot {
        self.dest
    }

    fn set_destination(&mut self, dest: Slot) {
        self.dest = dest;
    }
}

/// Elementwise boolean connective. Operands are interpreted as false iff 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bit {
    pub op: BitOp,
    pub dest: Slot,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction for Bit {
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.lhs, &self.rhs].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.lhs, &mut self.rhs].into_iter()
    }

    fn destination(&self) -> Slot {
        self.dest
    }

    fn set_destination(&mut self, dest: Slot) {
        self.dest = dest;
    }
}

/// Elementwise boolean negation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Not {
    pub dest: Slot,
    pub value: Operand,
}

impl Instruction for Not {
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.value)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.value)
    }

    fn destination(&self) -> Slot {
        self.dest
    }

    fn set_destination(&mut self, dest: Slot) {
        self.dest = dest;
    }
}

/// Elementwise conditional: `dest[i] = cond[i] != 0 ? on_true[i] : on_false[i]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Select {
    pub dest: Slot,
    pub cond: Operand,
    pub on_true: Operand,
    pub on_false: Operand,
}

impl Instruction for Select {
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.cond, &self.on_true, &self.on_false].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.cond, &mut self.on_true, &mut self.on_false].into_iter()
    }

    fn destination(&self) -> Slot {
        self.dest
    }

    fn set_destination(&mut self, dest: Slot) {
        self.dest = dest;
    }
}

/// Slot-to-slot (or immediate-to-slot) move; also how the front end
/// materializes literals into const slots.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mov {
    pub dest: Slot,
    pub value: Operand,
}

impl Instruction for Mov {
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.value)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.value)
    }

    fn destination(&self) -> Slot {
        self.dest
    }

    fn set_destination(&mut self, dest: Slot) {
        self.dest = dest;
    }
}

/// Discriminated union covering all instruction kinds.
#[derive(Debug, Clone, Copy, PartialEq, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(InstrKind))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Instr {
    Arith(Arith),
    Unary(Unary),
    Cmp(Cmp),
    Bit(Bit),
    Not(Not),
    Select(Select),
    Mov(Mov),
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instr::Arith(i) => write!(f, "{} = {} {}, {}", i.dest, i.op, i.lhs, i.rhs),
            Instr::Unary(i) => write!(f, "{} = {} {}", i.dest, i.op, i.value),
            Instr::Cmp(i) => write!(f, "{} = cmp.{} {}, {}", i.dest, i.op, i.lhs, i.rhs),
            Instr::Bit(i) => write!(f, "{} = {} {}, {}", i.dest, i.op, i.lhs, i.rhs),
            Instr::Not(i) => write!(f, "{} = not {}", i.dest, i.value),
            Instr::Select(i) => {
                write!(f, "{} = select {}, {}, {}", i.dest, i.cond, i.on_true, i.on_false)
            }
            Instr::Mov(i) => write!(f, "{} = mov {}", i.dest, i.value),
        }
    }
}

macro_rules! define_instr_dispatch {
    (
        $($variant:ident),*
    ) => {
        impl Instruction for Instr {
            #[auto_enum(Iterator)]
            fn operands(&self) -> impl Iterator<Item = &Operand> {
                match self {
                    $(
                        Instr::$variant(instr) => instr.operands(),
                    )*
                }
            }

            #[auto_enum(Iterator)]
            fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
                match self {
                    $(
                        Instr::$variant(instr) => instr.operands_mut(),
                    )*
                }
            }

            fn destination(&self) -> Slot {
                match self {
                    $(
                        Instr::$variant(instr) => instr.destination(),
                    )*
                }
            }

            fn set_destination(&mut self, dest: Slot) {
                match self {
                    $(
                        Instr::$variant(instr) => instr.set_destination(dest),
                    )*
                }
            }
        }
    };
}

define_instr_dispatch! {
    Arith,
    Unary,
    Cmp,
    Bit,
    Not,
    Select,
    Mov
}

macro_rules! define_instr_from {
    ($typ:ty, $variant:ident) => {
        impl From<$typ> for Instr {
            fn from(inst: $typ) -> Self {
                Instr::$variant(inst)
            }
        }
    };
}

define_instr_from!(Arith, Arith);
define_instr_from!(Unary, Unary);
define_instr_from!(Cmp, Cmp);
define_instr_from!(Bit, Bit);
define_instr_from!(Not, Not);
define_instr_from!(Select, Select);
define_instr_from!(Mov, Mov);
