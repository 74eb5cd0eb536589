use umbra::ast::{visit_stmts, Stmt};
use umbra::passes::{DeadCodePass, Pass};
use umbra::{parse, EntropyOracle, Options};

fn injected(source: &str, seed: u64) -> umbra::ast::AST {
    let mut ast = parse(source).expect("test programs parse");
    let mut oracle = EntropyOracle::new(seed);
    oracle.reserve_all(umbra::ast::collect_identifiers(&ast));
    DeadCodePass
        .run(&mut ast, &mut oracle, &Options::new())
        .expect("dead-code pass cannot fail");
    ast
}

const SOURCE: &str = "\
local a = 1
local b = 2
local c = a + b
print(c)
if c > 2 then
  print(\"big\")
end";

#[test]
fn test_dead_code_output_parses_on_many_seeds() {
    for seed in 0_u64..32 {
        let printed = injected(SOURCE, seed).to_source();
        parse(&printed).expect("injected output parses");
    }
}

#[test]
fn test_dead_code_density_is_bounded() {
    // Top block has 5 statements, so at most ceil(5 * 30%) = 2 insertions.
    for seed in 0_u64..32 {
        let ast = injected(SOURCE, seed);
        assert!(ast.body.len() <= 5 + 2, "seed {}", seed);
    }
}

#[test]
fn test_dead_code_eventually_injects() {
    let grew = (0_u64..32).any(|seed| injected(SOURCE, seed).body.len() > 5);
    assert!(grew, "no seed injected anything");
}

#[test]
fn test_dead_code_never_follows_trailing_return() {
    let source = "local x = 1\nreturn x";
    for seed in 0_u64..32 {
        let ast = injected(source, seed);
        assert!(
            matches!(ast.body.stmts.last(), Some(Stmt::Return(..))),
            "seed {}",
            seed
        );
        // And the result must still satisfy the parser's tail-position
        // rule.
        parse(&ast.to_source()).expect("output parses");
    }
}

#[test]
fn test_dead_code_declares_only_fresh_names() {
    // Every name the templates declare is drawn from the oracle, which was
    // seeded with the program's identifiers, so none may repeat a source
    // name.
    let ast = injected(SOURCE, 11);
    let mut declared = Vec::new();
    visit_stmts(&ast.body, &mut |stmt| {
        if let Stmt::Local(x, ..) = stmt {
            for name in &x.names {
                declared.push(name.name.clone());
            }
        }
    });
    for original in ["a", "b", "c"] {
        assert_eq!(
            declared.iter().filter(|n| *n == original).count(),
            1,
            "source name {} reused",
            original
        );
    }
}

#[test]
fn test_dead_code_never_declares_locals_across_goto_labels() {
    // The dialect forbids jumping into the scope of a local, so no injected
    // statement between a `goto` and its label may be a bare `local`
    // declaration; templates carry their locals in nested blocks instead.
    let source = "\
local n = 0
goto skip
print(n)
::skip::
print(\"after\")";
    for seed in 0_u64..64 {
        let ast = injected(source, seed);
        parse(&ast.to_source()).expect("injected output parses");
        let goto_at = ast
            .body
            .stmts
            .iter()
            .position(|s| matches!(s, Stmt::Goto(..)))
            .expect("goto survives");
        let label_at = ast
            .body
            .stmts
            .iter()
            .position(|s| matches!(s, Stmt::Label(..)))
            .expect("label survives");
        for stmt in &ast.body.stmts[goto_at..label_at] {
            assert!(
                !matches!(stmt, Stmt::Local(..)),
                "seed {} injected a local into the goto's path",
                seed
            );
        }
    }
}

#[test]
fn test_dead_code_skips_metatable_template_when_shadowed() {
    // A program that declares `local setmetatable` anywhere must never
    // receive the metatable template, whose injected global reference
    // could be captured.
    let source = "local setmetatable = nil\nlocal a = 1\nlocal b = 2\nprint(a, b)";
    for seed in 0_u64..64 {
        let printed = injected(source, seed).to_source();
        assert_eq!(
            printed.matches("setmetatable").count(),
            1,
            "seed {} injected a setmetatable reference",
            seed
        );
    }
}
