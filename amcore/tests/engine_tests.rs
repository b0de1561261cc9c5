use std::sync::Arc;

use aminstr::{
    code::CodeStep,
    instr::{Arith, ArithOp, Cmp, CmpOp, Mov, Select, Unary, UnaryOp},
    operand::{Operand, Slot},
    tier::Tier,
    value::{ValueKind, Variable, VariableHandle},
};
use amcore::{
    bindings::Role,
    engine::Engine,
    error::{BindError, EngineError, EvalError, IndexError},
    program::ParserProgram,
};

fn var(name: &str, kind: ValueKind) -> VariableHandle {
    Arc::new(Variable::new(name, kind))
}

/// Install `y = x * 2` as the sequential program on every worker thread.
fn install_double_program(engine: &mut Engine<'_>) {
    engine.resize_sequential_variables(2);
    engine.resize_sequential_program(1);
    for thread in 0..engine.num_threads() {
        engine
            .set_sequential_variable(0, thread, var("x", ValueKind::Float))
            .expect("x slot");
        engine
            .set_sequential_variable(1, thread, var("y", ValueKind::Float))
            .expect("y slot");
        engine
            .set_sequential_program_code(
                0,
                thread,
                CodeStep::new(
                    Arith {
                        op: ArithOp::Mul,
                        dest: Slot::sequential(1),
                        lhs: Operand::Slot(Slot::sequential(0)),
                        rhs: Operand::Imm(2.0),
                    },
                    1,
                ),
            )
            .expect("code step");
    }
}

/// Install `y = sqrt(x)` (through a scratch slot) on every worker thread,
/// with the sqrt at the given line.
fn install_sqrt_program(engine: &mut Engine<'_>, sqrt_line: u32) {
    engine.resize_sequential_variables(2);
    engine.resize_sequential_program(1);
    for thread in 0..engine.num_threads() {
        engine
            .set_sequential_variable(0, thread, var("x", ValueKind::Float))
            .expect("x slot");
        engine
            .set_sequential_variable(1, thread, var("y", ValueKind::Float))
            .expect("y slot");
        engine
            .set_sequential_program_code(
                0,
                thread,
                CodeStep::new(
                    Unary {
                        op: UnaryOp::Sqrt,
                        dest: Slot::sequential(1),
                        value: Operand::Slot(Slot::sequential(0)),
                    },
                    sqrt_line,
                ),
            )
            .expect("code step");
    }
}

#[test]
fn doubles_every_element_across_eight_chunks() {
    let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
    let mut y = vec![0.0f64; 1000];

    let mut engine = Engine::with_sizes(1000, 128, Some(4)).expect("valid sizing");
    assert_eq!(engine.num_chunks(), 8, "7 full chunks plus one of 104");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine.add_sink("y", y.as_mut_slice()).expect("bind y");
    install_double_program(&mut engine);

    engine.run_const().expect("const tier");
    engine.run_single().expect("single tier");
    engine.run_sequential().expect("sequential tier");
    drop(engine);

    for (i, value) in y.iter().enumerate() {
        assert_eq!(*value, 2.0 * i as f64);
    }
}

#[test]
fn result_is_independent_of_thread_count() {
    let x: Vec<f64> = (0..777).map(|i| (i as f64) * 0.25 + 1.0).collect();
    let mut outputs: Vec<Vec<f64>> = Vec::new();

    for threads in [1, 2, 5] {
        let mut y = vec![0.0f64; 777];
        let mut engine = Engine::with_sizes(777, 64, Some(threads)).expect("valid sizing");
        engine.add_source("x", x.as_slice()).expect("bind x");
        engine.add_sink("y", y.as_mut_slice()).expect("bind y");

        // y = sqrt(x) + x
        engine.resize_sequential_variables(3);
        engine.resize_sequential_program(2);
        for thread in 0..threads {
            engine
                .set_sequential_variable(0, thread, var("x", ValueKind::Float))
                .expect("x slot");
            engine
                .set_sequential_variable(1, thread, var("y", ValueKind::Float))
                .expect("y slot");
            engine
                .set_sequential_variable(2, thread, var("root", ValueKind::Float))
                .expect("scratch slot");
            engine
                .set_sequential_program_code(
                    0,
                    thread,
                    CodeStep::new(
                        Unary {
                            op: UnaryOp::Sqrt,
                            dest: Slot::sequential(2),
                            value: Operand::Slot(Slot::sequential(0)),
                        },
                        1,
                    ),
                )
                .expect("sqrt step");
            engine
                .set_sequential_program_code(
                    1,
                    thread,
                    CodeStep::new(
                        Arith {
                            op: ArithOp::Add,
                            dest: Slot::sequential(1),
                            lhs: Operand::Slot(Slot::sequential(2)),
                            rhs: Operand::Slot(Slot::sequential(0)),
                        },
                        2,
                    ),
                )
                .expect("add step");
        }

        engine.run_const().expect("const tier");
        engine.run_single().expect("single tier");
        engine.run_sequential().expect("sequential tier");
        drop(engine);
        outputs.push(y);
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn sqrt_failure_reports_line_and_leaves_unreached_chunks_untouched() {
    let mut x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
    x[500] = -1.0;
    let mut y = vec![0.0f64; 1000];

    // One worker makes chunk completion deterministic: chunks 0..=2 finish,
    // chunk 3 (elements 384..512) hits the negative input and is abandoned
    // before its sink copy-out, everything later is never started.
    let mut engine = Engine::with_sizes(1000, 128, Some(1)).expect("valid sizing");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine.add_sink("y", y.as_mut_slice()).expect("bind y");
    install_sqrt_program(&mut engine, 7);

    engine.run_const().expect("const tier");
    engine.run_single().expect("single tier");
    let err = engine
        .run_sequential()
        .expect_err("sqrt of negative input must fail");
    assert_eq!(err.error_line(), Some(7));
    assert!(matches!(
        err,
        EngineError::Eval {
            tier: Tier::Sequential,
            line: 7,
            source: EvalError::Domain { op: "sqrt" },
        }
    ));
    drop(engine);

    for (i, value) in y.iter().enumerate().take(384) {
        assert_eq!(*value, (i as f64).sqrt());
    }
    for value in &y[384..] {
        assert_eq!(*value, 0.0);
    }
}

#[test]
fn failing_line_is_reported_regardless_of_which_thread_hits_it() {
    let mut x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
    x[500] = -1.0;
    let mut y = vec![0.0f64; 1000];

    let mut engine = Engine::with_sizes(1000, 128, Some(4)).expect("valid sizing");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine.add_sink("y", y.as_mut_slice()).expect("bind y");
    install_sqrt_program(&mut engine, 7);

    engine.run_const().expect("const tier");
    engine.run_single().expect("single tier");
    let err = engine
        .run_sequential()
        .expect_err("sqrt of negative input must fail");
    assert_eq!(err.error_line(), Some(7));
}

#[test]
fn const_tier_fails_fast_and_no_sink_is_written() {
    let x = vec![1.0f64; 100];
    let mut y = vec![0.0f64; 100];

    let mut engine = Engine::with_sizes(100, 16, Some(2)).expect("valid sizing");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine.add_sink("y", y.as_mut_slice()).expect("bind y");
    install_double_program(&mut engine);

    engine.resize_const_variables(2);
    engine.resize_const_program(2);
    engine
        .set_const_program_code(
            0,
            CodeStep::new(
                Arith {
                    op: ArithOp::Div,
                    dest: Slot::constant(0),
                    lhs: Operand::Imm(1.0),
                    rhs: Operand::Imm(0.0),
                },
                3,
            ),
        )
        .expect("div step");
    // A second failing step proves the sequence stops at the first error.
    engine
        .set_const_program_code(
            1,
            CodeStep::new(
                Unary {
                    op: UnaryOp::Sqrt,
                    dest: Slot::constant(1),
                    value: Operand::Imm(-1.0),
                },
                9,
            ),
        )
        .expect("sqrt step");

    let err = engine.run_const().expect_err("division by zero");
    assert_eq!(err.error_line(), Some(3));
    assert!(matches!(
        err,
        EngineError::Eval {
            tier: Tier::Const,
            source: EvalError::DivisionByZero,
            ..
        }
    ));
    drop(engine);

    // A correct caller stops here; nothing has touched the sink.
    assert!(y.iter().all(|value| *value == 0.0));
}

#[test]
fn second_binding_under_the_same_name_is_rejected() {
    let a = vec![1.0f64; 4];
    let b = vec![2.0f64; 4];
    let mut out = vec![0.0f64; 4];

    let mut engine = Engine::with_sizes(4, 2, Some(1)).expect("valid sizing");
    engine.add_source("x", a.as_slice()).expect("first binding");

    let err = engine
        .add_source("x", b.as_slice())
        .expect_err("duplicate source");
    assert_eq!(
        err,
        BindError::AlreadyBound {
            name: "x".into(),
            role: Role::Source,
        }
    );

    let err = engine
        .add_sink("x", out.as_mut_slice())
        .expect_err("role conflict");
    assert_eq!(
        err,
        BindError::AlreadyBound {
            name: "x".into(),
            role: Role::Source,
        }
    );

    let bound = engine.find_source("x").expect("first binding intact");
    assert_eq!(bound.len(), 4);
    assert!(engine.find_sink("x").is_none());
}

#[test]
fn single_tier_scalars_broadcast_into_sequential_chunks() {
    let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
    let mut flags = vec![false; 40];

    let mut engine = Engine::with_sizes(40, 8, Some(2)).expect("valid sizing");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine
        .add_sink("flag", flags.as_mut_slice())
        .expect("bind flag");

    // const: threshold = 10
    engine.resize_const_variables(1);
    engine.resize_const_program(1);
    engine
        .set_const_variable(0, var("threshold", ValueKind::Float))
        .expect("threshold slot");
    engine
        .set_const_program_code(
            0,
            CodeStep::new(
                Mov {
                    dest: Slot::constant(0),
                    value: Operand::Imm(10.0),
                },
                1,
            ),
        )
        .expect("mov step");

    // single: cutoff = threshold + 0.5
    engine.resize_single_variables(1);
    engine.resize_single_program(1);
    engine
        .set_single_variable(0, var("cutoff", ValueKind::Float))
        .expect("cutoff slot");
    engine
        .set_single_program_code(
            0,
            CodeStep::new(
                Arith {
                    op: ArithOp::Add,
                    dest: Slot::single(0),
                    lhs: Operand::Slot(Slot::constant(0)),
                    rhs: Operand::Imm(0.5),
                },
                2,
            ),
        )
        .expect("add step");

    // sequential: flag = x > cutoff
    engine.resize_sequential_variables(2);
    engine.resize_sequential_program(1);
    for thread in 0..2 {
        engine
            .set_sequential_variable(0, thread, var("x", ValueKind::Float))
            .expect("x slot");
        engine
            .set_sequential_variable(1, thread, var("flag", ValueKind::Bool))
            .expect("flag slot");
        engine
            .set_sequential_program_code(
                0,
                thread,
                CodeStep::new(
                    Cmp {
                        op: CmpOp::Gt,
                        dest: Slot::sequential(1),
                        lhs: Operand::Slot(Slot::sequential(0)),
                        rhs: Operand::Slot(Slot::single(0)),
                    },
                    3,
                ),
            )
            .expect("cmp step");
    }

    engine.run_const().expect("const tier");
    engine.run_single().expect("single tier");
    engine.run_sequential().expect("sequential tier");
    drop(engine);

    for (i, flag) in flags.iter().enumerate() {
        assert_eq!(*flag, (i as f64) > 10.5);
    }
}

#[test]
fn select_chooses_elementwise_between_branches() {
    let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
    let mut y = vec![0.0f64; 20];

    let mut engine = Engine::with_sizes(20, 6, Some(3)).expect("valid sizing");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine.add_sink("y", y.as_mut_slice()).expect("bind y");

    // y = |x - 5|, spelled with a compare and a select
    engine.resize_sequential_variables(5);
    engine.resize_sequential_program(4);
    for thread in 0..3 {
        for (index, name) in ["x", "y", "below", "lo", "hi"].into_iter().enumerate() {
            engine
                .set_sequential_variable(index, thread, var(name, ValueKind::Float))
                .expect("variable slot");
        }
        let steps = [
            CodeStep::new(
                Cmp {
                    op: CmpOp::Lt,
                    dest: Slot::sequential(2),
                    lhs: Operand::Slot(Slot::sequential(0)),
                    rhs: Operand::Imm(5.0),
                },
                1,
            ),
            CodeStep::new(
                Arith {
                    op: ArithOp::Sub,
                    dest: Slot::sequential(3),
                    lhs: Operand::Imm(5.0),
                    rhs: Operand::Slot(Slot::sequential(0)),
                },
                2,
            ),
            CodeStep::new(
                Arith {
                    op: ArithOp::Sub,
                    dest: Slot::sequential(4),
                    lhs: Operand::Slot(Slot::sequential(0)),
                    rhs: Operand::Imm(5.0),
                },
                3,
            ),
            CodeStep::new(
                Select {
                    dest: Slot::sequential(1),
                    cond: Operand::Slot(Slot::sequential(2)),
                    on_true: Operand::Slot(Slot::sequential(3)),
                    on_false: Operand::Slot(Slot::sequential(4)),
                },
                4,
            ),
        ];
        for (index, step) in steps.into_iter().enumerate() {
            engine
                .set_sequential_program_code(index, thread, step)
                .expect("code step");
        }
    }

    engine.run_const().expect("const tier");
    engine.run_single().expect("single tier");
    engine.run_sequential().expect("sequential tier");
    drop(engine);

    for (i, value) in y.iter().enumerate() {
        assert_eq!(*value, (i as f64 - 5.0).abs());
    }
}

#[test]
fn short_arrays_are_rejected_when_the_run_starts() {
    let x = vec![1.0f64; 10];
    let mut y = vec![0.0f64; 100];

    let mut engine = Engine::with_sizes(100, 16, Some(1)).expect("valid sizing");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine.add_sink("y", y.as_mut_slice()).expect("bind y");
    install_double_program(&mut engine);

    engine.run_const().expect("const tier");
    engine.run_single().expect("single tier");
    let err = engine
        .run_sequential()
        .expect_err("source does not cover the array");
    assert!(matches!(
        err,
        EngineError::Bind(BindError::TooShort {
            len: 10,
            expected: 100,
            ..
        })
    ));
}

#[test]
fn unassigned_code_steps_fail_before_execution() {
    let mut engine = Engine::with_sizes(10, 4, Some(1)).expect("valid sizing");
    engine.resize_sequential_program(1);

    let err = engine.run_sequential().expect_err("vacant code step");
    assert!(matches!(
        err,
        EngineError::Index(IndexError::Vacant {
            tier: Tier::Sequential,
            index: 0,
        })
    ));
}

#[test]
fn accessor_indices_are_bounds_checked() {
    let mut engine = Engine::with_sizes(0, 8, Some(2)).expect("valid sizing");
    engine.resize_const_variables(2);

    let err = engine
        .set_const_variable(2, var("a", ValueKind::Float))
        .expect_err("index past the resize");
    assert_eq!(
        err,
        IndexError::OutOfRange {
            tier: Tier::Const,
            index: 2,
            len: 2,
        }
    );

    engine
        .set_const_variable(1, var("a", ValueKind::Float))
        .expect("in range");
    assert_eq!(engine.get_const_variable(1).expect("assigned").name, "a");
    assert!(matches!(
        engine.get_const_variable(0),
        Err(IndexError::Vacant { .. })
    ));
    assert!(matches!(
        engine.get_sequential_variable(0, 5),
        Err(IndexError::ThreadOutOfRange {
            thread: 5,
            num_threads: 2,
        })
    ));
}

#[test]
fn parser_program_handle_is_stored_verbatim() {
    let mut engine = Engine::default();
    assert!(engine.parser_program().is_none());

    let handle = Arc::new(ParserProgram::new("y = x * 2"));
    engine.set_parser_program(Arc::clone(&handle));

    let stored = engine.parser_program().expect("handle stored");
    assert_eq!(stored.uuid(), handle.uuid());
    assert_eq!(stored.source(), "y = x * 2");
}

#[test]
fn array_size_may_change_between_runs() {
    let x: Vec<f64> = (0..64).map(|i| i as f64).collect();
    let mut y = vec![0.0f64; 64];

    let mut engine = Engine::with_sizes(32, 8, Some(2)).expect("valid sizing");
    engine.add_source("x", x.as_slice()).expect("bind x");
    engine.add_sink("y", y.as_mut_slice()).expect("bind y");
    install_double_program(&mut engine);

    engine.run_const().expect("const tier");
    engine.run_single().expect("single tier");
    engine.run_sequential().expect("first run");

    engine.set_array_size(64);
    assert_eq!(engine.num_chunks(), 8);
    engine.run_single().expect("single tier again");
    engine.run_sequential().expect("second run");
    drop(engine);

    for (i, value) in y.iter().enumerate() {
        assert_eq!(*value, 2.0 * i as f64);
    }
}
