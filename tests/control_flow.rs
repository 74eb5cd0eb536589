use umbra::ast::{Expr, Stmt};
use umbra::passes::{ControlFlowPass, Pass};
use umbra::{parse, EntropyOracle, Options};

fn transformed(source: &str, seed: u64) -> umbra::ast::AST {
    let mut ast = parse(source).expect("test programs parse");
    let mut oracle = EntropyOracle::new(seed);
    oracle.reserve_all(umbra::ast::collect_identifiers(&ast));
    ControlFlowPass
        .run(&mut ast, &mut oracle, &Options::new())
        .expect("control-flow pass cannot fail");
    ast
}

/// Find the first `if` statement anywhere in the printed output.
fn first_if_cond(ast: &umbra::ast::AST) -> Option<&Expr> {
    for stmt in &ast.body.stmts {
        if let Stmt::If(x, ..) = stmt {
            return Some(&x.branches[0].0);
        }
    }
    None
}

#[test]
fn test_flow_if_conditions_gain_predicates() {
    // Run across several seeds; the predicate combiner must always wrap the
    // original condition in an `and`/`or` with a pure arithmetic operand.
    for seed in 0_u64..8 {
        let ast = transformed("if x > 0 then print(x) end", seed);
        let cond = first_if_cond(&ast).expect("if statement survives");
        let Expr::Binary(combined, ..) = cond else {
            panic!("condition was not combined");
        };
        assert!(matches!(
            combined.op,
            umbra::ast::BinaryOp::And | umbra::ast::BinaryOp::Or
        ));
        // The original comparison sits on the right.
        assert!(matches!(&combined.rhs, Expr::Binary(orig, ..)
            if orig.op == umbra::ast::BinaryOp::Greater));
    }
}

#[test]
fn test_flow_for_bodies_wrapped_in_always_true_if() {
    let ast = transformed("for i = 1, 3 do print(i) end", 1);
    let Stmt::NumericFor(numeric, ..) = &ast.body.stmts[0] else {
        panic!("expected for loop");
    };
    assert_eq!(numeric.body.len(), 1);
    assert!(matches!(&numeric.body.stmts[0], Stmt::If(..)));
}

#[test]
fn test_flow_output_still_parses() {
    let source = "\
local total = 0
for i = 1, 10 do
  if i % 2 == 0 then
    total = total + i
  end
end
while total > 5 do
  total = total - 1
end
print(total)";
    for seed in 0_u64..16 {
        let printed = transformed(source, seed).to_source();
        parse(&printed).expect("transformed output parses");
    }
}

#[test]
fn test_flow_never_flattens_blocks_with_break() {
    // The loop body contains a bare `break`; whatever else happens, no
    // dispatch-closure rewrite may move it into a function.
    let source = "while true do local a = 1\nprint(a)\nbreak end";
    for seed in 0_u64..16 {
        let printed = transformed(source, seed).to_source();
        let reparsed = parse(&printed).expect("output parses");
        // `break` must still be directly inside the `while` body, not
        // inside any function expression.
        let mut ok = false;
        umbra::ast::visit_stmts(&reparsed.body, &mut |stmt| {
            if let Stmt::While(x, ..) = stmt {
                if x.body.stmts.iter().any(|s| matches!(s, Stmt::Break(..))) {
                    ok = true;
                }
            }
        });
        assert!(ok, "break left its loop body (seed {})", seed);
    }
}

#[test]
fn test_flow_never_flattens_blocks_with_return() {
    let source = "function f()\nlocal a = 1\nlocal b = 2\nreturn a + b\nend";
    for seed in 0_u64..16 {
        let ast = transformed(source, seed);
        let Stmt::FnDecl(decl, ..) = &ast.body.stmts[0] else {
            panic!("expected function");
        };
        // The tail return must still be a direct statement of the body.
        assert!(matches!(
            decl.func.body.stmts.last(),
            Some(Stmt::Return(..))
        ));
    }
}

#[test]
fn test_flow_never_flattens_blocks_with_goto() {
    let source = "do local a = 1\ngoto out\nlocal b = 2\n::out:: end";
    for seed in 0_u64..16 {
        let printed = transformed(source, seed).to_source();
        parse(&printed).expect("output parses");
    }
}

#[test]
fn test_flow_never_flattens_vararg_blocks() {
    // `...` would be invisible inside dispatch closures, so the chunk body
    // must survive structurally untouched.
    let source = "local args = {...}\nprint(args)";
    for seed in 0_u64..16 {
        let ast = transformed(source, seed);
        assert_eq!(ast.body.len(), 2, "seed {}", seed);
        assert!(matches!(&ast.body.stmts[0], Stmt::Local(..)));
        assert!(matches!(&ast.body.stmts[1], Stmt::Expr(..)));
    }
}

#[test]
fn test_flow_flattening_produces_dispatch_shape() {
    // With enough seeds, a safe two-statement block gets flattened; verify
    // the emitted shape: hoisted locals, a state counter, a dispatch table,
    // and a while loop.
    let source = "do local a = 1\nlocal b = 2\nprint(a, b) end";
    let flattened = (0_u64..32).find_map(|seed| {
        let ast = transformed(source, seed);
        let Stmt::Block(block, ..) = &ast.body.stmts[0] else {
            return None;
        };
        let has_while = block.stmts.iter().any(|s| matches!(s, Stmt::While(..)));
        has_while.then(|| ast.to_source())
    });
    let printed = flattened.expect("some seed flattens the block");
    let reparsed = parse(&printed).expect("flattened output parses");
    // The dispatch table is indexed by integer keys holding closures.
    let mut saw_dispatch_table = false;
    umbra::ast::visit_exprs(&reparsed.body, &mut |expr| {
        if let Expr::Table(table, ..) = expr {
            let all_indexed_closures = !table.fields.is_empty()
                && table.fields.iter().all(|field| {
                    matches!(
                        field,
                        umbra::ast::TableField::Indexed(
                            Expr::IntegerConstant(..),
                            Expr::Function(..)
                        )
                    )
                });
            saw_dispatch_table |= all_indexed_closures;
        }
    });
    assert!(saw_dispatch_table);
}
