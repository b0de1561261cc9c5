//! Shared operand types for instructions.
//!
//! An instruction operand is either a reference to a variable slot (`Slot`)
//! or an immediate literal the front end chose not to hoist into the const
//! tier (`Imm`).
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumTryAs};

use crate::tier::Tier;

/// Reference to a variable slot: the owning tier and the index within that
/// tier's variable table.
///
/// Sequential code may read const and single slots (their scalar value is
/// broadcast across the chunk); const and single code may only reach their
/// own and earlier tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Slot {
    pub tier: Tier,
    pub index: usize,
}

impl Slot {
    pub const fn new(tier: Tier, index: usize) -> Self {
        Self { tier, index }
    }

    pub const fn constant(index: usize) -> Self {
        Self::new(Tier::Const, index)
    }

    pub const fn single(index: usize) -> Self {
        Self::new(Tier::Single, index)
    }

    pub const fn sequential(index: usize) -> Self {
        Self::new(Tier::Sequential, index)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}:{}", self.tier, self.index)
    }
}

/// Instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operand {
    /// Reference to a variable slot.
    Slot(Slot),
    /// Immediate literal.
    Imm(f64),
}

impl From<Slot> for Operand {
    fn from(slot: Slot) -> Self {
        Operand::Slot(slot)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Imm(value)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Slot(slot) => write!(f, "{}", slot),
            Operand::Imm(value) => write!(f, "{}", value),
        }
    }
}
