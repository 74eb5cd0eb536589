use umbra::ast::Stmt;
use umbra::passes::{Pass, VmWrapPass};
use umbra::{parse, EntropyOracle, Options};

fn wrapped(source: &str, seed: u64, options: &Options) -> umbra::ast::AST {
    let mut ast = parse(source).expect("test programs parse");
    let mut oracle = EntropyOracle::new(seed);
    oracle.reserve_all(umbra::ast::collect_identifiers(&ast));
    VmWrapPass
        .run(&mut ast, &mut oracle, options)
        .expect("vm pass cannot fail");
    ast
}

const COMPILABLE_FN: &str = "\
function adder(a, b)
  local sum = a + b
  return sum
end";

#[test]
fn test_vm_wraps_compilable_function() {
    let ast = (0_u64..32)
        .map(|seed| wrapped(COMPILABLE_FN, seed, &Options::new()))
        .find(|ast| matches!(&ast.body.stmts[0], Stmt::RawEmit(..)))
        .expect("some seed wraps the function");
    let printed = ast.to_source();
    let reparsed = parse(&printed).expect("emitted interpreter parses");
    // The emitted text re-declares the function under its original name.
    let Stmt::FnDecl(decl, ..) = &reparsed.body.stmts[0] else {
        panic!("expected a function declaration");
    };
    assert_eq!(decl.name.root.name, "adder");
    assert_eq!(decl.func.params.len(), 2);
    // The body is now an interpreter loop, not the original arithmetic.
    assert!(printed.contains("while"));
    assert!(printed.contains("65536"));
}

#[test]
fn test_vm_leaves_uncompilable_functions_untouched() {
    // Varargs, loops, and method calls are all outside the subset.
    let source = "\
function outside(...)
  for i = 1, 10 do
    print(i)
  end
  return ...
end";
    for seed in 0_u64..32 {
        let ast = wrapped(source, seed, &Options::new());
        assert!(
            matches!(&ast.body.stmts[0], Stmt::FnDecl(..)),
            "seed {}",
            seed
        );
    }
}

#[test]
fn test_vm_wraps_self_contained_do_blocks() {
    let source = "do local a = 2\nlocal b = a * 21\nprint(b) end";
    let ast = (0_u64..64)
        .map(|seed| wrapped(source, seed, &Options::new()))
        .find(|ast| matches!(&ast.body.stmts[0], Stmt::RawEmit(..)))
        .expect("some seed wraps the block");
    let printed = ast.to_source();
    let reparsed = parse(&printed).expect("emitted interpreter parses");
    assert!(matches!(&reparsed.body.stmts[0], Stmt::Block(..)));
}

#[test]
fn test_vm_refuses_snapshot_unsafe_callees() {
    // `emit` is reassigned later, so freezing its value in the constant
    // pool would change behavior; the function must stay unwrapped.
    let source = "\
function caller()
  emit(1)
end
emit = print";
    for seed in 0_u64..32 {
        let ast = wrapped(source, seed, &Options::new());
        assert!(
            matches!(&ast.body.stmts[0], Stmt::FnDecl(..)),
            "seed {}",
            seed
        );
    }
}

#[test]
fn test_vm_constant_pool_not_emitted_with_plain_names() {
    // Locals inside the fragment vanish into numbered register slots.
    let ast = (0_u64..32)
        .map(|seed| wrapped(COMPILABLE_FN, seed, &Options::new()))
        .find(|ast| matches!(&ast.body.stmts[0], Stmt::RawEmit(..)))
        .expect("some seed wraps the function");
    let printed = ast.to_source();
    assert!(!printed.contains("sum"));
}

#[test]
fn test_vm_output_is_deterministic() {
    let options = Options::new();
    let a = wrapped(COMPILABLE_FN, 9, &options).to_source();
    let b = wrapped(COMPILABLE_FN, 9, &options).to_source();
    assert_eq!(a, b);
}

#[test]
fn test_vm_opcode_randomization_changes_encoding() {
    let seed = (0_u64..64)
        .find(|&seed| {
            matches!(
                wrapped(COMPILABLE_FN, seed, &Options::new()).body.stmts[0],
                Stmt::RawEmit(..)
            )
        })
        .expect("some seed wraps the function");
    let plain = wrapped(COMPILABLE_FN, seed, &Options::new()).to_source();
    let mut options = Options::new();
    options.opcode_randomization = true;
    let randomized = wrapped(COMPILABLE_FN, seed, &options).to_source();
    // Same seed, but the per-fragment re-draw shifts the oracle stream.
    assert_ne!(plain, randomized);
}
