//! Opaque-predicate validity: every generated predicate template must
//! evaluate to its claimed constant, here checked over 1000 randomized
//! variable assignments per extracted predicate.

use umbra::ast::{BinaryOp, Expr, Stmt};
use umbra::passes::{ControlFlowPass, Pass};
use umbra::{parse, EntropyOracle, Options, INT};

/// Minimal integer evaluator for the arithmetic subset the predicate
/// templates draw from.  Every free variable takes `var_value`.
fn eval_int(expr: &Expr, var_value: INT) -> INT {
    match expr {
        Expr::IntegerConstant(i, ..) => *i,
        Expr::Variable(..) => var_value,
        Expr::Binary(x, ..) => {
            let lhs = eval_int(&x.lhs, var_value);
            let rhs = eval_int(&x.rhs, var_value);
            match x.op {
                BinaryOp::Add => lhs.wrapping_add(rhs),
                BinaryOp::Sub => lhs.wrapping_sub(rhs),
                BinaryOp::Mul => lhs.wrapping_mul(rhs),
                // The dialect's `%` floors toward the divisor's sign; the
                // templates only divide by positive constants.
                BinaryOp::Mod => lhs.rem_euclid(rhs),
                op => panic!("unexpected arithmetic operator {:?}", op),
            }
        }
        expr => panic!("unexpected operand {:?}", expr),
    }
}

fn eval_bool(expr: &Expr, var_value: INT) -> bool {
    let Expr::Binary(x, ..) = expr else {
        panic!("predicate root must be a comparison");
    };
    let cmp = |f: fn(&INT, &INT) -> bool| {
        f(&eval_int(&x.lhs, var_value), &eval_int(&x.rhs, var_value))
    };
    match x.op {
        BinaryOp::Eq => cmp(INT::eq),
        BinaryOp::NotEq => cmp(INT::ne),
        BinaryOp::Less => cmp(INT::lt),
        BinaryOp::LessEq => cmp(INT::le),
        BinaryOp::Greater => cmp(INT::gt),
        BinaryOp::GreaterEq => cmp(INT::ge),
        op => panic!("predicate root must be a comparison, found {:?}", op),
    }
}

/// Cheap deterministic value stream for the 1000-sample sweeps.
fn samples() -> impl Iterator<Item = INT> {
    let mut state: u64 = 0x1234_5678_9ABC_DEF0;
    std::iter::repeat_with(move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 16) as INT % 100_000 - 50_000
    })
    .take(1000)
}

fn transformed(source: &str, seed: u64) -> umbra::ast::AST {
    let mut ast = parse(source).expect("test programs parse");
    let mut oracle = EntropyOracle::new(seed);
    ControlFlowPass
        .run(&mut ast, &mut oracle, &Options::new())
        .expect("control-flow pass cannot fail");
    ast
}

#[test]
fn test_predicates_combined_into_conditions_hold() {
    for seed in 0_u64..100 {
        let ast = transformed("if c then print(c) end", seed);
        let Stmt::If(x, ..) = &ast.body.stmts[0] else {
            panic!("expected if");
        };
        let Expr::Binary(combined, ..) = &x.branches[0].0 else {
            panic!("expected combined condition");
        };
        let claimed = match combined.op {
            BinaryOp::And => true,
            BinaryOp::Or => false,
            op => panic!("unexpected combiner {:?}", op),
        };
        for value in samples() {
            assert_eq!(
                eval_bool(&combined.lhs, value),
                claimed,
                "seed {} value {}",
                seed,
                value
            );
        }
    }
}

#[test]
fn test_predicates_wrapping_loop_bodies_are_always_true() {
    for seed in 0_u64..100 {
        let ast = transformed("for i = 1, 3 do print(i) end", seed);
        let Stmt::NumericFor(numeric, ..) = &ast.body.stmts[0] else {
            panic!("expected for loop");
        };
        let Stmt::If(wrapper, ..) = &numeric.body.stmts[0] else {
            panic!("expected wrapping if");
        };
        for value in samples() {
            assert!(
                eval_bool(&wrapper.branches[0].0, value),
                "seed {} value {}",
                seed,
                value
            );
        }
    }
}
