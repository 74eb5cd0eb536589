//! The anti-analysis prologue: textual guard snippets prepended to the
//! output program, one per active flag.
//!
//! The snippets are not semantically significant to the obfuscator itself;
//! they are runtime tripwires for the emitted program.  Each one must parse
//! as valid target-language source, bind only fresh oracle names, and stay
//! silent in an ordinary (or sandboxed) environment.

use crate::ast::{Stmt, AST};
use crate::entropy::EntropyOracle;
use crate::error::ObfuscateError;
use crate::options::Options;
use crate::passes::Pass;
use crate::token::Position;
use std::fmt::Write;

pub struct GuardPass;

impl Pass for GuardPass {
    fn name(&self) -> &'static str {
        "guard"
    }

    fn run(
        &mut self,
        ast: &mut AST,
        oracle: &mut EntropyOracle,
        options: &Options,
    ) -> Result<(), ObfuscateError> {
        let mut snippets: Vec<String> = Vec::new();
        if options.anti_debug {
            snippets.push(anti_debug(oracle));
        }
        if options.anti_tampering {
            snippets.push(anti_tampering(oracle));
        }
        if options.integrity_checks {
            snippets.push(integrity_checks(oracle));
        }
        if options.environment_detection {
            snippets.push(environment_detection(oracle));
        }
        if options.timing_protection {
            snippets.push(timing_protection(oracle));
        }
        if options.memory_protection {
            snippets.push(memory_protection(oracle));
        }

        tracing::debug!(count = snippets.len(), "emitting guard prologue");
        for text in snippets.into_iter().rev() {
            ast.body
                .stmts
                .insert(0, Stmt::RawEmit(text.into_boxed_str(), Position::NONE));
        }
        Ok(())
    }
}

/// Trip on an installed debug hook.  Absent `debug` library (the common
/// sandbox case) the guard is inert.
fn anti_debug(oracle: &mut EntropyOracle) -> String {
    let d = oracle.identifier();
    let trap = oracle.range(1000, 9999);
    let mut t = String::new();
    let _ = writeln!(t, "local {} = debug", d);
    let _ = writeln!(
        t,
        "if {d} ~= nil and {d}.gethook ~= nil and {d}.gethook() ~= nil then",
        d = d
    );
    let _ = writeln!(t, "  error({})", trap);
    t.push_str("end");
    t
}

/// Recompute a product from split halves; a patched constant trips it.
fn anti_tampering(oracle: &mut EntropyOracle) -> String {
    let a = oracle.identifier();
    let b = oracle.identifier();
    let k1 = oracle.range(100, 999);
    let k2 = oracle.range(100, 999);
    let trap = oracle.range(1000, 9999);
    let mut t = String::new();
    let _ = writeln!(t, "local {} = {}", a, k1);
    let _ = writeln!(t, "local {} = {}", b, k2);
    let _ = writeln!(t, "if {} * {} ~= {} then", a, b, k1 * k2);
    let _ = writeln!(t, "  error({})", trap);
    t.push_str("end");
    t
}

/// Sum a marker table and compare against the baked total.
fn integrity_checks(oracle: &mut EntropyOracle) -> String {
    let tbl = oracle.identifier();
    let sum = oracle.identifier();
    let i = oracle.identifier();
    let parts: Vec<i64> = (0..4).map(|_| oracle.range(10, 255)).collect();
    let total: i64 = parts.iter().sum();
    let trap = oracle.range(1000, 9999);
    let mut t = String::new();
    let _ = write!(t, "local {} = {{", tbl);
    for (n, part) in parts.iter().enumerate() {
        if n > 0 {
            t.push_str(", ");
        }
        let _ = write!(t, "{}", part);
    }
    t.push_str("}\n");
    let _ = writeln!(t, "local {} = 0", sum);
    let _ = writeln!(t, "for {i} = 1, #{tbl} do", i = i, tbl = tbl);
    let _ = writeln!(t, "  {sum} = {sum} + {tbl}[{i}]", sum = sum, tbl = tbl, i = i);
    t.push_str("end\n");
    let _ = writeln!(t, "if {} ~= {} then", sum, total);
    let _ = writeln!(t, "  error({})", trap);
    t.push_str("end");
    t
}

/// A hostile host can replace the environment wholesale; anything that
/// still looks like a table (or a stripped-down nil) passes.
fn environment_detection(oracle: &mut EntropyOracle) -> String {
    let e = oracle.identifier();
    let trap = oracle.range(1000, 9999);
    let mut t = String::new();
    let _ = writeln!(t, "local {} = type(_G)", e);
    let _ = writeln!(t, "if {e} ~= \"table\" and {e} ~= \"nil\" then", e = e);
    let _ = writeln!(t, "  error({})", trap);
    t.push_str("end");
    t
}

/// Two adjacent clock reads that differ by whole seconds mean a tracer is
/// single-stepping the prologue.
fn timing_protection(oracle: &mut EntropyOracle) -> String {
    let t1 = oracle.identifier();
    let t2 = oracle.identifier();
    let trap = oracle.range(1000, 9999);
    let mut t = String::new();
    let _ = writeln!(t, "if os ~= nil and os.clock ~= nil then");
    let _ = writeln!(t, "  local {} = os.clock()", t1);
    let _ = writeln!(t, "  local {} = os.clock()", t2);
    let _ = writeln!(t, "  if {} - {} > 5 then", t2, t1);
    let _ = writeln!(t, "    error({})", trap);
    t.push_str("  end\n");
    t.push_str("end");
    t
}

/// Snapshot the collector's count; a negative reading means the runtime is
/// lying about memory, which no honest host does.
fn memory_protection(oracle: &mut EntropyOracle) -> String {
    let m = oracle.identifier();
    let trap = oracle.range(1000, 9999);
    let mut t = String::new();
    let _ = writeln!(t, "if collectgarbage ~= nil then");
    let _ = writeln!(t, "  local {} = collectgarbage(\"count\")", m);
    let _ = writeln!(t, "  if {m} ~= nil and {m} < 0 then", m = m);
    let _ = writeln!(t, "    error({})", trap);
    t.push_str("  end\n");
    t.push_str("end");
    t
}
