use umbra::ast::{BinaryOp, Expr, Stmt};
use umbra::{parse, ParseErrorType};

#[test]
fn test_parse_error_reports_byte_offset() {
    // `local =` fails on the `=` at byte offset 6.
    let err = parse("local =").expect_err("should not parse");
    assert_eq!(err.1.offset(), Some(6));
    assert!(matches!(*err.0, ParseErrorType::Expected(..)));
}

#[test]
fn test_parse_aborts_on_first_error() {
    let err = parse("local = local =").expect_err("should not parse");
    assert_eq!(err.1.offset(), Some(6));
}

#[test]
fn test_parse_statement_shapes() {
    let ast = parse(
        "\
local a, b = 1, 2
a = a + b
if a > b then a = 1 elseif a < b then a = 2 else a = 3 end
for i = 1, 10, 2 do a = i end
for k, v in pairs(t) do a = k end
while a > 0 do a = a - 1 end
repeat a = a + 1 until a > 10
do a = 0 end
function f(x) return x end
local function g(...) return ... end
goto finish
::finish::
return a",
    )
    .expect("all statement forms parse");
    let kinds: Vec<&Stmt> = ast.body.stmts.iter().collect();
    assert!(matches!(kinds[0], Stmt::Local(..)));
    assert!(matches!(kinds[1], Stmt::Assign(..)));
    assert!(matches!(kinds[2], Stmt::If(..)));
    assert!(matches!(kinds[3], Stmt::NumericFor(..)));
    assert!(matches!(kinds[4], Stmt::GenericFor(..)));
    assert!(matches!(kinds[5], Stmt::While(..)));
    assert!(matches!(kinds[6], Stmt::Repeat(..)));
    assert!(matches!(kinds[7], Stmt::Block(..)));
    assert!(matches!(kinds[8], Stmt::FnDecl(..)));
    assert!(matches!(kinds[9], Stmt::FnDecl(..)));
    assert!(matches!(kinds[10], Stmt::Goto(..)));
    assert!(matches!(kinds[11], Stmt::Label(..)));
    assert!(matches!(kinds[12], Stmt::Return(..)));
}

#[test]
fn test_parse_precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3)
    let ast = parse("return 1 + 2 * 3").expect("parses");
    let Stmt::Return(exprs, ..) = &ast.body.stmts[0] else {
        panic!("expected return");
    };
    let Expr::Binary(add, ..) = &exprs[0] else {
        panic!("expected binary");
    };
    assert_eq!(add.op, BinaryOp::Add);
    assert!(matches!(&add.rhs, Expr::Binary(m, ..) if m.op == BinaryOp::Mul));
}

#[test]
fn test_parse_right_associativity() {
    // a .. b .. c parses as a .. (b .. c); 2 ^ 3 ^ 2 as 2 ^ (3 ^ 2)
    let ast = parse("return a .. b .. c, 2 ^ 3 ^ 2").expect("parses");
    let Stmt::Return(exprs, ..) = &ast.body.stmts[0] else {
        panic!("expected return");
    };
    let Expr::Binary(concat, ..) = &exprs[0] else {
        panic!("expected binary");
    };
    assert_eq!(concat.op, BinaryOp::Concat);
    assert!(matches!(&concat.lhs, Expr::Variable(..)));
    assert!(matches!(&concat.rhs, Expr::Binary(inner, ..) if inner.op == BinaryOp::Concat));
    let Expr::Binary(pow, ..) = &exprs[1] else {
        panic!("expected binary");
    };
    assert_eq!(pow.op, BinaryOp::Pow);
    assert!(matches!(&pow.rhs, Expr::Binary(inner, ..) if inner.op == BinaryOp::Pow));
}

#[test]
fn test_parse_unary_binds_looser_than_power() {
    // -x ^ 2 parses as -(x ^ 2)
    let ast = parse("return -x ^ 2").expect("parses");
    let Stmt::Return(exprs, ..) = &ast.body.stmts[0] else {
        panic!("expected return");
    };
    let Expr::Unary(_, arg, ..) = &exprs[0] else {
        panic!("expected unary at the root");
    };
    assert!(matches!(&**arg, Expr::Binary(x, ..) if x.op == BinaryOp::Pow));
}

#[test]
fn test_parse_method_definition_desugars_to_dot_form() {
    let ast = parse("function obj.sub:method(a) return self end").expect("parses");
    let Stmt::FnDecl(decl, ..) = &ast.body.stmts[0] else {
        panic!("expected function declaration");
    };
    assert_eq!(decl.name.root.name, "obj");
    assert_eq!(decl.name.path.len(), 2);
    assert_eq!(decl.name.path[1].name, "method");
    assert_eq!(decl.func.params[0].name, "self");
    assert_eq!(decl.func.params[1].name, "a");
}

#[test]
fn test_parse_call_sugar() {
    let ast = parse("f \"hello\"\ng {1, 2}").expect("parses");
    assert!(matches!(&ast.body.stmts[0], Stmt::Expr(Expr::Call(..))));
    assert!(matches!(&ast.body.stmts[1], Stmt::Expr(Expr::Call(..))));
}

#[test]
fn test_parse_rejects_statement_after_return() {
    assert!(parse("return 1\nlocal x = 2").is_err());
}

#[test]
fn test_parse_rejects_break_outside_loop() {
    let err = parse("break").expect_err("break needs a loop");
    assert!(matches!(*err.0, ParseErrorType::BreakOutsideLoop));
    // Inside a loop is fine; inside a function inside a loop is not.
    assert!(parse("while true do break end").is_ok());
    assert!(parse("while true do local f = function() break end end").is_err());
}

#[test]
fn test_parse_rejects_non_lvalue_assignment() {
    assert!(parse("f() = 1").is_err());
    assert!(parse("1 = 2").is_err());
}

#[test]
fn test_parse_depth_limit() {
    let deep = format!("return {}1{}", "(".repeat(200), ")".repeat(200));
    let mut engine = umbra::Obfuscator::new();
    engine.set_max_nesting_depth(64);
    let err = engine
        .compile(&deep)
        .expect_err("nesting exceeds the configured depth");
    assert!(matches!(
        err,
        umbra::ObfuscateError::ResourceExceeded {
            limit: "nesting depth",
            max: 64,
            ..
        }
    ));
    // The default limit accepts reasonable nesting.
    let shallow = format!("return {}1{}", "(".repeat(50), ")".repeat(50));
    assert!(umbra::Obfuscator::new().compile(&shallow).is_ok());
}

#[test]
fn test_parse_parentheses() {
    // (f()) truncates to one value and must be kept; (x) around a variable
    // is transparent and dropped; (f or g) must stay callable.
    let ast = parse("return (f()), (x), (f or g)()").expect("parses");
    let Stmt::Return(exprs, ..) = &ast.body.stmts[0] else {
        panic!("expected return");
    };
    assert!(matches!(&exprs[0], Expr::Paren(..)));
    assert!(matches!(&exprs[1], Expr::Variable(..)));
    assert!(matches!(&exprs[2], Expr::Call(..)));
}
