//! Program code sequences.
//!
//! A tier's "program code" is an ordered list of [`CodeStep`]s executed in
//! list order. Later steps may read outputs of earlier ones; evaluation
//! order is guaranteed by the compiler and not re-verified at runtime. What
//! *is* verified, once and before execution, is that every slot reference
//! is structurally valid for the tier that owns the sequence.
use enum_map::EnumMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    error::CodeError,
    instr::{Instr, Instruction},
    operand::Slot,
    tier::Tier,
};

/// One element of a tier's program code: an instruction plus the source line
/// it was compiled from, used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CodeStep {
    pub instr: Instr,
    pub line: u32,
}

impl CodeStep {
    pub fn new(instr: impl Into<Instr>, line: u32) -> Self {
        Self {
            instr: instr.into(),
            line,
        }
    }
}

impl std::fmt::Display for CodeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.instr)
    }
}

/// Validate a code sequence against the declared per-tier slot counts.
///
/// Checks, for every step:
/// 1. The destination lies in the owning tier.
/// 2. Operand slots reference the owning tier or an earlier one: const
///    code may only reach const slots, single code const and single slots.
/// 3. Every referenced slot index is within the tier's declared size.
pub fn check_code<'a>(
    owner: Tier,
    steps: impl IntoIterator<Item = &'a CodeStep>,
    counts: &EnumMap<Tier, usize>,
) -> Result<(), CodeError> {
    let in_range = |step: &CodeStep, slot: Slot| {
        let len = counts[slot.tier];
        if slot.index < len {
            Ok(())
        } else {
            Err(CodeError::SlotOutOfRange {
                line: step.line,
                tier: slot.tier,
                index: slot.index,
                len,
            })
        }
    };

    for step in steps {
        let dest = step.instr.destination();
        if dest.tier != owner {
            return Err(CodeError::ForeignDestination {
                line: step.line,
                owner,
                found: dest.tier,
            });
        }
        in_range(step, dest)?;

        for slot in step.instr.slot_dependencies() {
            if slot.tier > owner {
                return Err(CodeError::ForwardReference {
                    line: step.line,
                    owner,
                    found: slot.tier,
                });
            }
            in_range(step, slot)?;
        }
    }

    Ok(())
}
