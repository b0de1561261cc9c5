use strum::EnumIs;
use thiserror::Error;

use crate::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs, Error)]
pub enum CodeError {
    /// An instruction writes into a tier it does not belong to.
    #[error(
        "instruction at line {line} in {owner} tier code writes to a {found} tier slot. Destinations must lie in the tier that owns the sequence."
    )]
    ForeignDestination { line: u32, owner: Tier, found: Tier },

    /// An operand references a tier evaluated after the owning one.
    #[error(
        "instruction at line {line} in {owner} tier code reads a {found} tier slot, which is not evaluated yet at that point."
    )]
    ForwardReference { line: u32, owner: Tier, found: Tier },

    /// A slot index exceeds the tier's declared size.
    #[error(
        "instruction at line {line} references slot {index} of the {tier} tier, which only holds {len} variables."
    )]
    SlotOutOfRange {
        line: u32,
        tier: Tier,
        index: usize,
        len: usize,
    },
}
