//! Instruction executor.
//!
//! Executes one tier's code against resolved buffer regions. Operands are
//! resolved to either a broadcast scalar or a base offset into the frame's
//! owned region; the inner loops then work purely by index, so reads of the
//! owned region never alias the destination borrow.
use aminstr::{
    code::CodeStep,
    instr::{ArithOp, BitOp, CmpOp, Instr, UnaryOp},
    operand::{Operand, Slot},
    tier::Tier,
};

use crate::error::EvalError;

/// Execution view for one tier invocation: the executing tier's cells plus
/// read-only results of earlier tiers.
///
/// `stride` is the cell count per slot in the owned region (1 for the
/// scalar tiers, `buffer_size` for sequential); `len` is the number of
/// active elements in this invocation (1, or the current chunk length).
pub(crate) struct Frame<'a> {
    pub tier: Tier,
    pub consts: &'a [f64],
    pub singles: &'a [f64],
    pub owned: &'a mut [f64],
    pub stride: usize,
    pub len: usize,
}

/// Operand resolved against a frame.
#[derive(Clone, Copy)]
enum Src {
    /// Immediate or earlier-tier scalar, broadcast across the chunk.
    Scalar(f64),
    /// Base offset of a slot in the owned region.
    Owned(usize),
}

impl Frame<'_> {
    fn resolve(&self, operand: &Operand) -> Result<Src, EvalError> {
        match operand {
            Operand::Imm(value) => Ok(Src::Scalar(*value)),
            Operand::Slot(slot) => self.resolve_slot(*slot),
        }
    }

    fn resolve_slot(&self, slot: Slot) -> Result<Src, EvalError> {
        let bad = EvalError::BadSlot {
            tier: slot.tier,
            index: slot.index,
        };
        if slot.tier == self.tier {
            let base = slot.index * self.stride;
            if base + self.len > self.owned.len() {
                return Err(bad);
            }
            return Ok(Src::Owned(base));
        }
        let cells = match slot.tier {
            Tier::Const => self.consts,
            Tier::Single => self.singles,
            Tier::Sequential => return Err(bad),
        };
        cells.get(slot.index).copied().map(Src::Scalar).ok_or(bad)
    }

    fn dest_base(&self, slot: Slot) -> Result<usize, EvalError> {
        let bad = EvalError::BadSlot {
            tier: slot.tier,
            index: slot.index,
        };
        if slot.tier != self.tier {
            return Err(bad);
        }
        let base = slot.index * self.stride;
        if base + self.len > self.owned.len() {
            return Err(bad);
        }
        Ok(base)
    }

    #[inline]
    fn load(&self, src: Src, i: usize) -> f64 {
        match src {
            Src::Scalar(value) => value,
            Src::Owned(base) => self.owned[base + i],
        }
    }
}

fn binary<F>(frame: &mut Frame<'_>, dest: usize, lhs: Src, rhs: Src, f: F) -> Result<(), EvalError>
where
    F: Fn(f64, f64) -> Result<f64, EvalError>,
{
    for i in 0..frame.len {
        let value = f(frame.load(lhs, i), frame.load(rhs, i))?;
        frame.owned[dest + i] = value;
    }
    Ok(())
}

fn unary<F>(frame: &mut Frame<'_>, dest: usize, value: Src, f: F) -> Result<(), EvalError>
where
    F: Fn(f64) -> Result<f64, EvalError>,
{
    for i in 0..frame.len {
        let result = f(frame.load(value, i))?;
        frame.owned[dest + i] = result;
    }
    Ok(())
}

fn as_flag(value: f64) -> bool {
    value != 0.0
}

/// Execute one code step against the frame, over all `frame.len` elements.
pub(crate) fn execute(step: &CodeStep, frame: &mut Frame<'_>) -> Result<(), EvalError> {
    match &step.instr {
        Instr::Arith(instr) => {
            let lhs = frame.resolve(&instr.lhs)?;
            let rhs = frame.resolve(&instr.rhs)?;
            let dest = frame.dest_base(instr.dest)?;
            match instr.op {
                ArithOp::Add => binary(frame, dest, lhs, rhs, |a, b| Ok(a + b)),
                ArithOp::Sub => binary(frame, dest, lhs, rhs, |a, b| Ok(a - b)),
                ArithOp::Mul => binary(frame, dest, lhs, rhs, |a, b| Ok(a * b)),
                ArithOp::Div => binary(frame, dest, lhs, rhs, |a, b| {
                    if b == 0.0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(a / b)
                    }
                }),
                ArithOp::Rem => binary(frame, dest, lhs, rhs, |a, b| {
                    if b == 0.0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(a % b)
                    }
                }),
                ArithOp::Pow => binary(frame, dest, lhs, rhs, |a, b| {
                    let value = a.powf(b);
                    // powf only produces NaN from finite inputs when the
                    // base is negative with a fractional exponent.
                    if value.is_nan() && !a.is_nan() && !b.is_nan() {
                        Err(EvalError::Domain { op: "pow" })
                    } else {
                        Ok(value)
                    }
                }),
                ArithOp::Atan2 => binary(frame, dest, lhs, rhs, |a, b| Ok(a.atan2(b))),
                ArithOp::Min => binary(frame, dest, lhs, rhs, |a, b| Ok(a.min(b))),
                ArithOp::Max => binary(frame, dest, lhs, rhs, |a, b| Ok(a.max(b))),
            }
        }
        Instr::Unary(instr) => {
            let value = frame.resolve(&instr.value)?;
            let dest = frame.dest_base(instr.dest)?;
            let op = instr.op;
            let domain = |ok: bool, v: f64| {
                if ok {
                    Ok(v)
                } else {
                    Err(EvalError::Domain { op: op.name() })
                }
            };
            match op {
                UnaryOp::Neg => unary(frame, dest, value, |a| Ok(-a)),
                UnaryOp::Abs => unary(frame, dest, value, |a| Ok(a.abs())),
                UnaryOp::Sqrt => unary(frame, dest, value, |a| domain(!(a < 0.0), a.sqrt())),
                UnaryOp::Cbrt => unary(frame, dest, value, |a| Ok(a.cbrt())),
                UnaryOp::Exp => unary(frame, dest, value, |a| Ok(a.exp())),
                UnaryOp::Ln => unary(frame, dest, value, |a| domain(a > 0.0, a.ln())),
                UnaryOp::Log2 => unary(frame, dest, value, |a| domain(a > 0.0, a.log2())),
                UnaryOp::Log10 => unary(frame, dest, value, |a| domain(a > 0.0, a.log10())),
                UnaryOp::Sin => unary(frame, dest, value, |a| Ok(a.sin())),
                UnaryOp::Cos => unary(frame, dest, value, |a| Ok(a.cos())),
                UnaryOp::Tan => unary(frame, dest, value, |a| Ok(a.tan())),
                UnaryOp::Asin => unary(frame, dest, value, |a| {
                    domain((-1.0..=1.0).contains(&a), a.asin())
                }),
                UnaryOp::Acos => unary(frame, dest, value, |a| {
                    domain((-1.0..=1.0).contains(&a), a.acos())
                }),
                UnaryOp::Atan => unary(frame, dest, value, |a| Ok(a.atan())),
                UnaryOp::Floor => unary(frame, dest, value, |a| Ok(a.floor())),
                UnaryOp::Ceil => unary(frame, dest, value, |a| Ok(a.ceil())),
                UnaryOp::Round => unary(frame, dest, value, |a| Ok(a.round())),
            }
        }
        Instr::Cmp(instr) => {
            let lhs = frame.resolve(&instr.lhs)?;
            let rhs = frame.resolve(&instr.rhs)?;
            let dest = frame.dest_base(instr.dest)?;
            let flag = |cond: bool| Ok(if cond { 1.0 } else { 0.0 });
            match instr.op {
                CmpOp::Eq => binary(frame, dest, lhs, rhs, |a, b| flag(a == b)),
                CmpOp::Ne => binary(frame, dest, lhs, rhs, |a, b| flag(a != b)),
                CmpOp::Lt => binary(frame, dest, lhs, rhs, |a, b| flag(a < b)),
                CmpOp::Le => binary(frame, dest, lhs, rhs, |a, b| flag(a <= b)),
                CmpOp::Gt => binary(frame, dest, lhs, rhs, |a, b| flag(a > b)),
                CmpOp::Ge => binary(frame, dest, lhs, rhs, |a, b| flag(a >= b)),
            }
        }
        Instr::Bit(instr) => {
            let lhs = frame.resolve(&instr.lhs)?;
            let rhs = frame.resolve(&instr.rhs)?;
            let dest = frame.dest_base(instr.dest)?;
            let flag = |cond: bool| Ok(if cond { 1.0 } else { 0.0 });
            match instr.op {
                BitOp::And => binary(frame, dest, lhs, rhs, |a, b| flag(as_flag(a) && as_flag(b))),
                BitOp::Or => binary(frame, dest, lhs, rhs, |a, b| flag(as_flag(a) || as_flag(b))),
                BitOp::Xor => binary(frame, dest, lhs, rhs, |a, b| flag(as_flag(a) ^ as_flag(b))),
            }
        }
        Instr::Not(instr) => {
            let value = frame.resolve(&instr.value)?;
            let dest = frame.dest_base(instr.dest)?;
            unary(frame, dest, value, |a| {
                Ok(if as_flag(a) { 0.0 } else { 1.0 })
            })
        }
        Instr::Select(instr) => {
            let cond = frame.resolve(&instr.cond)?;
            let on_true = frame.resolve(&instr.on_true)?;
            let on_false = frame.resolve(&instr.on_false)?;
            let dest = frame.dest_base(instr.dest)?;
            for i in 0..frame.len {
                let value = if as_flag(frame.load(cond, i)) {
                    frame.load(on_true, i)
                } else {
                    frame.load(on_false, i)
                };
                frame.owned[dest + i] = value;
            }
            Ok(())
        }
        Instr::Mov(instr) => {
            let value = frame.resolve(&instr.value)?;
            let dest = frame.dest_base(instr.dest)?;
            unary(frame, dest, value, Ok)
        }
    }
}
