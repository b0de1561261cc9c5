use aminstr::{
    code::{self, CodeStep},
    error::CodeError,
    instr::{Arith, ArithOp, Instr, Instruction, Mov, Select, Unary, UnaryOp},
    operand::{Operand, Slot},
    tier::Tier,
};
use enum_map::{EnumMap, enum_map};

fn counts(n_const: usize, n_single: usize, n_seq: usize) -> EnumMap<Tier, usize> {
    enum_map! {
        Tier::Const => n_const,
        Tier::Single => n_single,
        Tier::Sequential => n_seq,
    }
}

#[test]
fn instructions_expose_operands_and_destination() {
    let mut instr = Instr::from(Arith {
        op: ArithOp::Add,
        dest: Slot::sequential(2),
        lhs: Operand::Slot(Slot::sequential(0)),
        rhs: Operand::Imm(1.5),
    });

    assert_eq!(instr.destination(), Slot::sequential(2));

    let operands: Vec<Operand> = instr.operands().copied().collect();
    assert_eq!(
        operands,
        vec![Operand::Slot(Slot::sequential(0)), Operand::Imm(1.5)]
    );

    let slots: Vec<Slot> = instr.slot_dependencies().collect();
    assert_eq!(slots, vec![Slot::sequential(0)], "immediates are skipped");

    instr.set_destination(Slot::sequential(7));
    assert_eq!(instr.destination(), Slot::sequential(7));
}

#[test]
fn operand_rewriting_reaches_every_input() {
    let mut instr = Instr::from(Select {
        dest: Slot::sequential(3),
        cond: Operand::Slot(Slot::sequential(0)),
        on_true: Operand::Slot(Slot::sequential(1)),
        on_false: Operand::Slot(Slot::sequential(2)),
    });

    for operand in instr.operands_mut() {
        if let Operand::Slot(slot) = operand {
            slot.index += 10;
        }
    }

    let indices: Vec<usize> = instr.slot_dependencies().map(|slot| slot.index).collect();
    assert_eq!(indices, vec![10, 11, 12]);
}

#[test]
fn display_renders_compiler_friendly_text() {
    let step = CodeStep::new(
        Arith {
            op: ArithOp::Mul,
            dest: Slot::sequential(1),
            lhs: Operand::Slot(Slot::sequential(0)),
            rhs: Operand::Imm(2.0),
        },
        4,
    );
    assert_eq!(step.to_string(), "line 4: %sequential:1 = mul %sequential:0, 2");

    let mov = Instr::from(Mov {
        dest: Slot::constant(0),
        value: Operand::Imm(1.5),
    });
    assert_eq!(mov.to_string(), "%const:0 = mov 1.5");
}

#[test]
fn check_code_accepts_a_well_formed_sequence() {
    let steps = [
        CodeStep::new(
            Unary {
                op: UnaryOp::Sqrt,
                dest: Slot::sequential(1),
                value: Operand::Slot(Slot::sequential(0)),
            },
            1,
        ),
        CodeStep::new(
            Arith {
                op: ArithOp::Add,
                dest: Slot::sequential(2),
                lhs: Operand::Slot(Slot::sequential(1)),
                rhs: Operand::Slot(Slot::constant(0)),
            },
            2,
        ),
    ];
    code::check_code(Tier::Sequential, &steps, &counts(1, 0, 3)).expect("valid sequence");
}

#[test]
fn check_code_rejects_destinations_outside_the_owning_tier() {
    let steps = [CodeStep::new(
        Mov {
            dest: Slot::sequential(0),
            value: Operand::Imm(0.0),
        },
        5,
    )];
    let err =
        code::check_code(Tier::Const, &steps, &counts(1, 0, 1)).expect_err("foreign destination");
    assert_eq!(
        err,
        CodeError::ForeignDestination {
            line: 5,
            owner: Tier::Const,
            found: Tier::Sequential,
        }
    );
}

#[test]
fn check_code_rejects_reads_of_later_tiers() {
    let steps = [CodeStep::new(
        Mov {
            dest: Slot::constant(0),
            value: Operand::Slot(Slot::single(0)),
        },
        2,
    )];
    let err =
        code::check_code(Tier::Const, &steps, &counts(1, 1, 0)).expect_err("forward reference");
    assert_eq!(
        err,
        CodeError::ForwardReference {
            line: 2,
            owner: Tier::Const,
            found: Tier::Single,
        }
    );
}

#[test]
fn check_code_bounds_every_slot_index() {
    let steps = [CodeStep::new(
        Mov {
            dest: Slot::constant(3),
            value: Operand::Imm(1.0),
        },
        8,
    )];
    let err = code::check_code(Tier::Const, &steps, &counts(2, 0, 0)).expect_err("out of range");
    assert_eq!(
        err,
        CodeError::SlotOutOfRange {
            line: 8,
            tier: Tier::Const,
            index: 3,
            len: 2,
        }
    );
}
