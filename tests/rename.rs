use umbra::ast::{Expr, Stmt};
use umbra::passes::{Pass, RenamePass};
use umbra::{parse, EntropyOracle, Options};

fn renamed(source: &str, seed: u64) -> umbra::ast::AST {
    let mut ast = parse(source).expect("test programs parse");
    let mut oracle = EntropyOracle::new(seed);
    oracle.reserve_all(umbra::ast::collect_identifiers(&ast));
    RenamePass
        .run(&mut ast, &mut oracle, &Options::new())
        .expect("rename cannot fail");
    ast
}

#[test]
fn test_rename_locals_and_references() {
    let ast = renamed("local value = 1\nreturn value", 1);
    let Stmt::Local(local, ..) = &ast.body.stmts[0] else {
        panic!("expected local");
    };
    let Stmt::Return(exprs, ..) = &ast.body.stmts[1] else {
        panic!("expected return");
    };
    let Expr::Variable(reference) = &exprs[0] else {
        panic!("expected variable");
    };
    assert_ne!(local.names[0].name, "value");
    assert_eq!(local.names[0].name, reference.name);
}

#[test]
fn test_rename_leaves_globals_alone() {
    let ast = renamed("print(unknown_global)", 2);
    let printed = ast.to_source();
    assert!(printed.contains("print"));
    assert!(printed.contains("unknown_global"));
}

#[test]
fn test_rename_two_scopes_same_source_name_get_distinct_names() {
    let ast = renamed(
        "do local x = 1\nprint(x) end\ndo local x = 2\nprint(x) end",
        3,
    );
    let Stmt::Block(first, ..) = &ast.body.stmts[0] else {
        panic!("expected block");
    };
    let Stmt::Block(second, ..) = &ast.body.stmts[1] else {
        panic!("expected block");
    };
    let Stmt::Local(a, ..) = &first.stmts[0] else {
        panic!("expected local");
    };
    let Stmt::Local(b, ..) = &second.stmts[0] else {
        panic!("expected local");
    };
    assert_ne!(a.names[0].name, b.names[0].name);
}

#[test]
fn test_rename_is_capture_free_across_shadowing() {
    // Inner `x` shadows outer `x`; after renaming, the inner body must
    // reference the inner fresh name, and the tail must reference the outer.
    let ast = renamed(
        "local x = 1\ndo local x = 2\nprint(x) end\nprint(x)",
        4,
    );
    let Stmt::Local(outer, ..) = &ast.body.stmts[0] else {
        panic!("expected local");
    };
    let Stmt::Block(block, ..) = &ast.body.stmts[1] else {
        panic!("expected block");
    };
    let Stmt::Local(inner, ..) = &block.stmts[0] else {
        panic!("expected local");
    };
    let inner_use = match &block.stmts[1] {
        Stmt::Expr(Expr::Call(call, ..)) => match &call.args[0] {
            Expr::Variable(v) => v.name.clone(),
            _ => panic!("expected variable argument"),
        },
        _ => panic!("expected call"),
    };
    let outer_use = match &ast.body.stmts[2] {
        Stmt::Expr(Expr::Call(call, ..)) => match &call.args[0] {
            Expr::Variable(v) => v.name.clone(),
            _ => panic!("expected variable argument"),
        },
        _ => panic!("expected call"),
    };
    assert_eq!(inner_use, inner.names[0].name);
    assert_eq!(outer_use, outer.names[0].name);
    assert_ne!(inner_use, outer_use);
}

#[test]
fn test_rename_initializer_sees_outer_binding() {
    // In `local x = x`, the right-hand side reads the outer `x`.
    let ast = renamed("local x = 1\ndo local x = x\nprint(x) end", 5);
    let Stmt::Local(outer, ..) = &ast.body.stmts[0] else {
        panic!("expected local");
    };
    let Stmt::Block(block, ..) = &ast.body.stmts[1] else {
        panic!("expected block");
    };
    let Stmt::Local(inner, ..) = &block.stmts[0] else {
        panic!("expected local");
    };
    let Expr::Variable(init) = &inner.values[0] else {
        panic!("expected variable initializer");
    };
    assert_eq!(init.name, outer.names[0].name);
    assert_ne!(inner.names[0].name, outer.names[0].name);
}

#[test]
fn test_rename_repeat_condition_sees_body_locals() {
    let ast = renamed("repeat local done = true until done", 6);
    let Stmt::Repeat(repeat, ..) = &ast.body.stmts[0] else {
        panic!("expected repeat");
    };
    let Stmt::Local(local, ..) = &repeat.body.stmts[0] else {
        panic!("expected local");
    };
    let Expr::Variable(cond) = &repeat.cond else {
        panic!("expected variable condition");
    };
    assert_eq!(cond.name, local.names[0].name);
}

#[test]
fn test_rename_local_function_is_self_recursive() {
    let ast = renamed("local function fact(n) return fact(n - 1) end", 7);
    let Stmt::FnDecl(decl, ..) = &ast.body.stmts[0] else {
        panic!("expected function declaration");
    };
    let Stmt::Return(exprs, ..) = &decl.func.body.stmts[0] else {
        panic!("expected return");
    };
    let Expr::Call(call, ..) = &exprs[0] else {
        panic!("expected call");
    };
    let Expr::Variable(callee) = &call.callee else {
        panic!("expected variable callee");
    };
    assert_ne!(decl.name.root.name, "fact");
    assert_eq!(callee.name, decl.name.root.name);
}

#[test]
fn test_rename_never_reuses_program_identifiers() {
    // A program already using a confusable name must not collide with the
    // fresh names the oracle issues.
    let source = "local Il0O_l1l = 1\nlocal x = Il0O_l1l";
    let ast = renamed(source, 8);
    let Stmt::Local(first, ..) = &ast.body.stmts[0] else {
        panic!("expected local");
    };
    let Stmt::Local(second, ..) = &ast.body.stmts[1] else {
        panic!("expected local");
    };
    assert_ne!(first.names[0].name, "Il0O_l1l");
    assert_ne!(second.names[0].name, "Il0O_l1l");
    assert_ne!(first.names[0].name, second.names[0].name);
}

#[test]
fn test_rename_is_deterministic() {
    let a = renamed("local x = 1\nreturn x", 99).to_source();
    let b = renamed("local x = 1\nreturn x", 99).to_source();
    assert_eq!(a, b);
}
