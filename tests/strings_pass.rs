use umbra::ast::{visit_exprs, Expr, Stmt};
use umbra::passes::{Pass, StringEncryptPass};
use umbra::{parse, EntropyOracle, Options};

fn encrypted(source: &str, seed: u64) -> umbra::ast::AST {
    let mut ast = parse(source).expect("test programs parse");
    let mut oracle = EntropyOracle::new(seed);
    oracle.reserve_all(umbra::ast::collect_identifiers(&ast));
    StringEncryptPass
        .run(&mut ast, &mut oracle, &Options::new())
        .expect("encryption cannot fail");
    ast
}

#[test]
fn test_strings_no_literal_survives() {
    let ast = encrypted("print(\"secret one\")\nlocal s = \"secret two\"", 42);
    let mut string_count = 0;
    visit_exprs(&ast.body, &mut |expr| {
        if matches!(expr, Expr::StringConstant(..)) {
            string_count += 1;
        }
    });
    assert_eq!(string_count, 0);
    let printed = ast.to_source();
    assert!(!printed.contains("secret one"));
    assert!(!printed.contains("secret two"));
}

#[test]
fn test_strings_decoder_emitted_once_at_prologue() {
    let ast = encrypted("local a = \"x\"\nlocal b = \"y\"\nlocal c = \"z\"", 7);
    assert!(matches!(&ast.body.stmts[0], Stmt::RawEmit(..)));
    let raw_count = ast
        .body
        .stmts
        .iter()
        .filter(|s| matches!(s, Stmt::RawEmit(..)))
        .count();
    assert_eq!(raw_count, 1);
    let printed = ast.to_source();
    // One decoder, three call sites.
    assert_eq!(printed.matches("string.char").count(), 1);
    assert_eq!(printed.matches("table.concat").count(), 1);
}

#[test]
fn test_strings_no_decoder_without_literals() {
    let ast = encrypted("local a = 1\nreturn a", 9);
    assert!(!ast
        .body
        .stmts
        .iter()
        .any(|s| matches!(s, Stmt::RawEmit(..))));
}

#[test]
fn test_strings_output_still_parses() {
    for seed in [0_u64, 1, 42, 12345] {
        let ast = encrypted(
            "print(\"hello\")\nlocal t = {\"a\", key = \"b\", [\"c\"] = \"d\"}\nreturn t[\"c\"]",
            seed,
        );
        let printed = ast.to_source();
        parse(&printed).expect("encrypted output parses");
    }
}

#[test]
fn test_strings_handles_empty_and_binary_literals() {
    let ast = encrypted(
        "local empty = \"\"\nlocal nul = \"\\000tail\"\nlocal wide = \"h\\233llo\"",
        3,
    );
    let printed = ast.to_source();
    parse(&printed).expect("encrypted output parses");
    // Each literal, including the empty one, became a decoder call with a
    // leading key byte.
    let call_count = printed.matches("(").count();
    assert!(call_count >= 3);
}

#[test]
fn test_strings_deterministic_per_seed() {
    let a = encrypted("print(\"hi\")", 5).to_source();
    let b = encrypted("print(\"hi\")", 5).to_source();
    let c = encrypted("print(\"hi\")", 6).to_source();
    assert_eq!(a, b);
    assert_ne!(a, c);
}
