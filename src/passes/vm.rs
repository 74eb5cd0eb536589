//! The VM-wrap pass: compile eligible fragments to a packed opcode stream
//! and replace them with an inline interpreter over that stream.
//!
//! Instructions are 32-bit words: opcode in the low 16 bits, operand A in
//! the next 8, operand B in the high 8.  Opcode numbering is drawn from the
//! oracle, and the interpreter is emitted with the same numbering, so each
//! output is self-contained.  The register file is 16 named slots on a
//! per-VM table, addressed through a slot-name list; `JUMP` only ever moves
//! forward, so every emitted interpreter terminates.
//!
//! Only fragments that fall entirely inside the compiled subset are
//! rewritten: single-target `local`/assignment over constants, fragment
//! locals and arithmetic, calls of snapshot-safe callees with at most three
//! simple arguments, `if` (no `else`) over a comparison, empty table
//! construction, and 0/1-expression `return` in function position.
//! Anything else leaves the node untouched.

use crate::ast::{globals_written, BinaryOp, Expr, FnCallExpr, FnDeclStmt, Stmt, StmtBlock, AST};
use crate::entropy::EntropyOracle;
use crate::error::ObfuscateError;
use crate::options::Options;
use crate::passes::Pass;
use crate::print::expr_to_source;
use crate::Identifier;
use ahash::{AHashMap, AHashSet};
use std::fmt::Write;

/// Register-file size.
const NUM_REGS: u8 = 16;
/// Code-length ceiling; jump targets must fit operand B.
const MAX_CODE: usize = 250;
/// Constant-pool ceiling; indices must fit operand B.
const MAX_CONSTS: usize = 256;
/// Call-arity ceiling of the emitted dispatch.
const MAX_CALL_ARGS: usize = 3;
/// Parameter ceiling for wrapped functions.
const MAX_PARAMS: usize = 8;
/// Fragments wrapped per run; each emitted interpreter costs kilobytes, so
/// an unbounded sweep over function-dense input would blow the output size
/// cap.
const MAX_FRAGMENTS: usize = 4;

/// The symbolic opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Load,
    Store,
    Call,
    Jump,
    Return,
    Compare,
    Math,
    Table,
}

/// Oracle-assigned numeric values for the opcode set, distinct within one
/// mapping.
struct OpCodes {
    values: [u16; 8],
}

impl OpCodes {
    fn new(oracle: &mut EntropyOracle) -> Self {
        let mut values = [0_u16; 8];
        let mut used = AHashSet::new();
        for value in &mut values {
            loop {
                let candidate = (oracle.next_u32() & 0xFFFF) as u16;
                if used.insert(candidate) {
                    *value = candidate;
                    break;
                }
            }
        }
        Self { values }
    }

    const fn get(&self, op: Op) -> u16 {
        self.values[op as usize]
    }
}

/// Sub-operation kinds packed into operand B's high nibble.
const MATH_KINDS: [(BinaryOp, u8); 8] = [
    (BinaryOp::Add, 0),
    (BinaryOp::Sub, 1),
    (BinaryOp::Mul, 2),
    (BinaryOp::Div, 3),
    (BinaryOp::Mod, 4),
    (BinaryOp::Pow, 5),
    (BinaryOp::Concat, 6),
    (BinaryOp::IDiv, 7),
];

const CMP_KINDS: [(BinaryOp, u8); 6] = [
    (BinaryOp::Eq, 0),
    (BinaryOp::NotEq, 1),
    (BinaryOp::Less, 2),
    (BinaryOp::LessEq, 3),
    (BinaryOp::Greater, 4),
    (BinaryOp::GreaterEq, 5),
];

fn math_kind(op: BinaryOp) -> Option<u8> {
    MATH_KINDS.iter().find(|(o, _)| *o == op).map(|(_, k)| *k)
}

fn cmp_kind(op: BinaryOp) -> Option<u8> {
    CMP_KINDS.iter().find(|(o, _)| *o == op).map(|(_, k)| *k)
}

/// Pack one instruction word.
const fn word(op: u16, a: u8, b: u8) -> u32 {
    op as u32 | (a as u32) << 16 | (b as u32) << 24
}

/// Compiles one fragment, or gives up with [`None`] the moment anything
/// falls outside the subset.
struct Compiler<'a> {
    codes: &'a OpCodes,
    /// Global (or outer-local) names the program assigns to anywhere;
    /// loading those through the constant pool would freeze a stale value.
    written: &'a AHashSet<Identifier>,
    code: Vec<u32>,
    consts: Vec<String>,
    locals: AHashMap<Identifier, u8>,
    locals_top: u8,
    temp_top: u8,
    allow_return: bool,
}

impl<'a> Compiler<'a> {
    fn new(codes: &'a OpCodes, written: &'a AHashSet<Identifier>, allow_return: bool) -> Self {
        Self {
            codes,
            written,
            code: Vec::new(),
            consts: Vec::new(),
            locals: AHashMap::new(),
            locals_top: 0,
            temp_top: 0,
            allow_return,
        }
    }

    fn emit(&mut self, op: Op, a: u8, b: u8) -> Option<()> {
        if self.code.len() >= MAX_CODE {
            return None;
        }
        self.code.push(word(self.codes.get(op), a, b));
        Some(())
    }

    /// Intern a printed constant expression, deduplicated.
    fn konst(&mut self, text: String) -> Option<u8> {
        if let Some(index) = self.consts.iter().position(|c| *c == text) {
            return Some(index as u8);
        }
        if self.consts.len() >= MAX_CONSTS {
            return None;
        }
        self.consts.push(text);
        Some((self.consts.len() - 1) as u8)
    }

    fn alloc_local(&mut self, name: &Identifier) -> Option<u8> {
        if self.locals_top >= NUM_REGS {
            return None;
        }
        let reg = self.locals_top;
        self.locals_top += 1;
        self.locals.insert(name.clone(), reg);
        Some(reg)
    }

    fn alloc_temp(&mut self) -> Option<u8> {
        if self.temp_top >= NUM_REGS {
            return None;
        }
        let reg = self.temp_top;
        self.temp_top += 1;
        Some(reg)
    }

    /// Compile an expression into a scratch register.
    fn compile_value(&mut self, expr: &Expr) -> Option<u8> {
        match expr {
            Expr::Nil(..)
            | Expr::BoolConstant(..)
            | Expr::IntegerConstant(..)
            | Expr::FloatConstant(..)
            | Expr::StringConstant(..) => {
                let index = self.konst(expr_to_source(expr))?;
                let reg = self.alloc_temp()?;
                self.emit(Op::Load, reg, index)?;
                Some(reg)
            }
            Expr::Variable(v) => {
                let src = *self.locals.get(&v.name)?;
                let reg = self.alloc_temp()?;
                self.emit(Op::Store, reg, src)?;
                Some(reg)
            }
            Expr::Binary(x, ..) => {
                let kind = math_kind(x.op)?;
                let lhs = self.compile_value(&x.lhs)?;
                let rhs = self.compile_value(&x.rhs)?;
                self.emit(Op::Math, lhs, (kind << 4) | rhs)?;
                Some(lhs)
            }
            Expr::Table(x, ..) if x.fields.is_empty() => {
                let reg = self.alloc_temp()?;
                self.emit(Op::Table, reg, 0)?;
                Some(reg)
            }
            Expr::Call(x, ..) => self.compile_call(x, true),
            Expr::Paren(inner, ..) => self.compile_value(inner),
            _ => None,
        }
    }

    /// Compile a call; the callee and arguments occupy consecutive
    /// registers, the result (if wanted) lands in the callee's slot.
    fn compile_call(&mut self, call: &FnCallExpr, want_result: bool) -> Option<u8> {
        if call.args.len() > MAX_CALL_ARGS {
            return None;
        }
        let base = self.alloc_temp()?;
        for _ in 0..call.args.len() {
            self.alloc_temp()?;
        }
        match &call.callee {
            Expr::Variable(v) => {
                if let Some(&src) = self.locals.get(&v.name) {
                    self.emit(Op::Store, base, src)?;
                } else if !self.written.contains(&v.name) {
                    let index = self.konst(v.name.to_string())?;
                    self.emit(Op::Load, base, index)?;
                } else {
                    return None;
                }
            }
            _ => return None,
        }
        for (i, arg) in call.args.iter().enumerate() {
            let reg = self.compile_value(arg)?;
            self.emit(Op::Store, base + 1 + i as u8, reg)?;
        }
        let b = ((want_result as u8) << 4) | call.args.len() as u8;
        self.emit(Op::Call, base, b)?;
        Some(base)
    }

    /// Compile a boolean condition into a register.
    fn compile_cond(&mut self, expr: &Expr) -> Option<u8> {
        match expr {
            Expr::Binary(x, ..) => {
                let kind = cmp_kind(x.op)?;
                let lhs = self.compile_value(&x.lhs)?;
                let rhs = self.compile_value(&x.rhs)?;
                self.emit(Op::Compare, lhs, (kind << 4) | rhs)?;
                Some(lhs)
            }
            _ => self.compile_value(expr),
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Option<()> {
        // Scratch registers live for one statement.
        self.temp_top = self.locals_top;
        match stmt {
            Stmt::Local(x, ..) => {
                if x.names.len() != 1 || x.values.len() > 1 {
                    return None;
                }
                let value = match x.values.first() {
                    Some(expr) => self.compile_value(expr)?,
                    None => {
                        let index = self.konst("nil".into())?;
                        let reg = self.alloc_temp()?;
                        self.emit(Op::Load, reg, index)?;
                        reg
                    }
                };
                let reg = self.alloc_local(&x.names[0].name)?;
                self.emit(Op::Store, reg, value)
            }
            Stmt::Assign(x, ..) => {
                if x.targets.len() != 1 || x.values.len() != 1 {
                    return None;
                }
                let target = match &x.targets[0] {
                    Expr::Variable(v) => *self.locals.get(&v.name)?,
                    _ => return None,
                };
                let value = self.compile_value(&x.values[0])?;
                self.emit(Op::Store, target, value)
            }
            Stmt::Expr(Expr::Call(call, ..)) => {
                self.compile_call(call, false)?;
                Some(())
            }
            Stmt::If(x, ..) => {
                if x.branches.len() != 1 || x.else_body.is_some() {
                    return None;
                }
                let (cond, body) = &x.branches[0];
                let cond_reg = self.compile_cond(cond)?;
                let patch = self.code.len();
                self.emit(Op::Jump, cond_reg, 0)?;
                for inner in &body.stmts {
                    // Registers have block scope here but the source does
                    // not, so declarations inside the arm are out.
                    if matches!(inner, Stmt::Local(..) | Stmt::FnDecl(..)) {
                        return None;
                    }
                    self.compile_stmt(inner)?;
                }
                let target = self.code.len();
                if target > u8::MAX as usize {
                    return None;
                }
                self.code[patch] = word(self.codes.get(Op::Jump), cond_reg, target as u8);
                Some(())
            }
            Stmt::Return(exprs, ..) => {
                if !self.allow_return {
                    return None;
                }
                match exprs.len() {
                    0 => self.emit(Op::Return, 0, 2),
                    1 => {
                        let reg = self.compile_value(&exprs[0])?;
                        self.emit(Op::Return, reg, 1)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

pub struct VmWrapPass;

impl Pass for VmWrapPass {
    fn name(&self) -> &'static str {
        "vm-wrap"
    }

    fn run(
        &mut self,
        ast: &mut AST,
        oracle: &mut EntropyOracle,
        options: &Options,
    ) -> Result<(), ObfuscateError> {
        let written = globals_written(ast);
        let mut codes = OpCodes::new(oracle);
        let mut budget = MAX_FRAGMENTS;
        transform_block(&mut ast.body, oracle, options, &written, &mut codes, &mut budget);
        Ok(())
    }
}

fn transform_block(
    block: &mut StmtBlock,
    oracle: &mut EntropyOracle,
    options: &Options,
    written: &AHashSet<Identifier>,
    codes: &mut OpCodes,
    budget: &mut usize,
) {
    for stmt in &mut block.stmts {
        let pos = stmt.position();
        let wrapped = match stmt {
            Stmt::FnDecl(x, ..)
                if *budget > 0
                    && !x.func.is_vararg
                    && !x.func.body.is_empty()
                    && x.func.params.len() <= MAX_PARAMS
                    && oracle.chance(70) =>
            {
                if options.opcode_randomization {
                    *codes = OpCodes::new(oracle);
                }
                try_compile_fn(x, oracle, options, written, codes)
            }
            Stmt::Block(b, ..) if *budget > 0 && !b.is_empty() && oracle.chance(40) => {
                if options.opcode_randomization {
                    *codes = OpCodes::new(oracle);
                }
                try_compile_do_block(b, oracle, options, written, codes)
            }
            _ => None,
        };
        if let Some(text) = wrapped {
            tracing::trace!("wrapped fragment in interpreter");
            *stmt = Stmt::RawEmit(text.into_boxed_str(), pos);
            *budget -= 1;
            continue;
        }
        match stmt {
            Stmt::Block(b, ..) => transform_block(b, oracle, options, written, codes, budget),
            Stmt::If(x, ..) => {
                for (_, body) in &mut x.branches {
                    transform_block(body, oracle, options, written, codes, budget);
                }
                if let Some(body) = &mut x.else_body {
                    transform_block(body, oracle, options, written, codes, budget);
                }
            }
            Stmt::NumericFor(x, ..) => {
                transform_block(&mut x.body, oracle, options, written, codes, budget)
            }
            Stmt::GenericFor(x, ..) => {
                transform_block(&mut x.body, oracle, options, written, codes, budget)
            }
            Stmt::While(x, ..) => {
                transform_block(&mut x.body, oracle, options, written, codes, budget)
            }
            Stmt::Repeat(x, ..) => {
                transform_block(&mut x.body, oracle, options, written, codes, budget)
            }
            Stmt::FnDecl(x, ..) => {
                transform_block(&mut x.func.body, oracle, options, written, codes, budget)
            }
            _ => {}
        }
    }
}

fn try_compile_fn(
    decl: &FnDeclStmt,
    oracle: &mut EntropyOracle,
    options: &Options,
    written: &AHashSet<Identifier>,
    codes: &OpCodes,
) -> Option<String> {
    let mut compiler = Compiler::new(codes, written, true);
    for param in &decl.func.params {
        compiler.alloc_local(&param.name)?;
    }
    for stmt in &decl.func.body.stmts {
        compiler.compile_stmt(stmt)?;
    }
    if compiler.code.is_empty() {
        return None;
    }
    Some(emit_interpreter(
        Head::Function(decl),
        &compiler,
        codes,
        oracle,
        options.stack_randomization,
    ))
}

fn try_compile_do_block(
    body: &StmtBlock,
    oracle: &mut EntropyOracle,
    options: &Options,
    written: &AHashSet<Identifier>,
    codes: &OpCodes,
) -> Option<String> {
    let mut compiler = Compiler::new(codes, written, false);
    for stmt in &body.stmts {
        compiler.compile_stmt(stmt)?;
    }
    if compiler.code.is_empty() {
        return None;
    }
    Some(emit_interpreter(
        Head::DoBlock,
        &compiler,
        codes,
        oracle,
        options.stack_randomization,
    ))
}

#[derive(Clone, Copy)]
enum Head<'a> {
    Function(&'a FnDeclStmt),
    DoBlock,
}

/// Emit the opcode table plus the inline interpreter for one compiled
/// fragment.  Every opcode the compiler can produce has a branch here; the
/// pair must stay in lock-step.
fn emit_interpreter(
    head: Head<'_>,
    compiler: &Compiler<'_>,
    codes: &OpCodes,
    oracle: &mut EntropyOracle,
    stack_randomization: bool,
) -> String {
    let mut slots: Vec<Identifier> = (0..NUM_REGS).map(|_| oracle.identifier()).collect();
    if stack_randomization {
        for i in (1..slots.len()).rev() {
            let j = oracle.index(i + 1);
            slots.swap(i, j);
        }
    }
    let s = oracle.identifier(); // slot-name list
    let r = oracle.identifier(); // register table
    let m = oracle.identifier(); // instruction stream
    let k = oracle.identifier(); // constant pool
    let ip = oracle.identifier();
    let w = oracle.identifier(); // current word
    let o = oracle.identifier(); // opcode field
    let a = oracle.identifier(); // operand A
    let b = oracle.identifier(); // operand B
    let nx = oracle.identifier(); // next ip
    let f = oracle.identifier(); // callee
    let n = oracle.identifier(); // call arity
    let rv = oracle.identifier(); // call result
    let x = oracle.identifier(); // binary lhs
    let y = oracle.identifier(); // binary rhs
    let kd = oracle.identifier(); // sub-operation kind

    let mut t = String::with_capacity(4096);
    let params: Vec<&str> = match head {
        Head::Function(decl) => decl.func.params.iter().map(|p| &*p.name).collect(),
        Head::DoBlock => Vec::new(),
    };
    match head {
        Head::Function(decl) => {
            if decl.is_local {
                let _ = write!(t, "local function {}(", decl.name.root.name);
            } else {
                let _ = write!(t, "function {}", decl.name.root.name);
                for part in &decl.name.path {
                    let _ = write!(t, ".{}", part.name);
                }
                t.push('(');
            }
            t.push_str(&params.join(", "));
            t.push_str(")\n");
        }
        Head::DoBlock => t.push_str("do\n"),
    }

    let _ = write!(t, "  local {} = {{", s);
    for (i, slot) in slots.iter().enumerate() {
        if i > 0 {
            t.push_str(", ");
        }
        let _ = write!(t, "\"{}\"", slot);
    }
    t.push_str("}\n");
    let _ = writeln!(t, "  local {} = {{}}", r);
    for (i, param) in params.iter().enumerate() {
        let _ = writeln!(t, "  {}[{}[{}]] = {}", r, s, i + 1, param);
    }
    let _ = write!(t, "  local {} = {{", m);
    for (i, word) in compiler.code.iter().enumerate() {
        if i > 0 {
            t.push_str(", ");
        }
        let _ = write!(t, "{}", word);
    }
    t.push_str("}\n");
    let _ = write!(t, "  local {} = {{", k);
    for (i, konst) in compiler.consts.iter().enumerate() {
        if i > 0 {
            t.push_str(", ");
        }
        t.push_str(konst);
    }
    t.push_str("}\n");

    let _ = writeln!(t, "  local {} = 1", ip);
    let _ = writeln!(t, "  while {} <= #{} do", ip, m);
    let _ = writeln!(t, "    local {} = {}[{}]", w, m, ip);
    let _ = writeln!(t, "    local {} = {} % 65536", o, w);
    let _ = writeln!(t, "    local {} = ({} // 65536) % 256", a, w);
    let _ = writeln!(t, "    local {} = {} // 16777216", b, w);
    let _ = writeln!(t, "    local {} = {} + 1", nx, ip);

    let reg = |idx: String| format!("{}[{}[{}]]", r, s, idx);
    let ra = reg(format!("{} + 1", a));

    let _ = writeln!(t, "    if {} == {} then", o, codes.get(Op::Load));
    let _ = writeln!(t, "      {} = {}[{} + 1]", ra, k, b);
    let _ = writeln!(t, "    elseif {} == {} then", o, codes.get(Op::Store));
    let _ = writeln!(t, "      {} = {}", ra, reg(format!("{} + 1", b)));
    let _ = writeln!(t, "    elseif {} == {} then", o, codes.get(Op::Math));
    let _ = writeln!(t, "      local {} = {}", x, ra);
    let _ = writeln!(t, "      local {} = {}", y, reg(format!("({} % 16) + 1", b)));
    let _ = writeln!(t, "      local {} = {} // 16", kd, b);
    let _ = writeln!(t, "      if {} == 0 then {} = {} + {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 1 then {} = {} - {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 2 then {} = {} * {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 3 then {} = {} / {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 4 then {} = {} % {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 5 then {} = {} ^ {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 6 then {} = {} .. {}", kd, ra, x, y);
    let _ = writeln!(t, "      else {} = {} // {} end", ra, x, y);
    let _ = writeln!(t, "    elseif {} == {} then", o, codes.get(Op::Compare));
    let _ = writeln!(t, "      local {} = {}", x, ra);
    let _ = writeln!(t, "      local {} = {}", y, reg(format!("({} % 16) + 1", b)));
    let _ = writeln!(t, "      local {} = {} // 16", kd, b);
    let _ = writeln!(t, "      if {} == 0 then {} = {} == {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 1 then {} = {} ~= {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 2 then {} = {} < {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 3 then {} = {} <= {}", kd, ra, x, y);
    let _ = writeln!(t, "      elseif {} == 4 then {} = {} > {}", kd, ra, x, y);
    let _ = writeln!(t, "      else {} = {} >= {} end", ra, x, y);
    let _ = writeln!(t, "    elseif {} == {} then", o, codes.get(Op::Table));
    let _ = writeln!(t, "      {} = {{}}", ra);
    let _ = writeln!(t, "    elseif {} == {} then", o, codes.get(Op::Jump));
    let _ = writeln!(t, "      if {} == 255 or not {} then", a, ra);
    let _ = writeln!(
        t,
        "        if {} + 1 > {} then {} = {} + 1 else {} = #{} + 1 end",
        b, ip, nx, b, nx, m
    );
    t.push_str("      end\n");
    let _ = writeln!(t, "    elseif {} == {} then", o, codes.get(Op::Call));
    let _ = writeln!(t, "      local {} = {}", f, ra);
    let _ = writeln!(t, "      local {} = {} % 16", n, b);
    let _ = writeln!(t, "      local {}", rv);
    let _ = writeln!(t, "      if {} == 0 then {} = {}()", n, rv, f);
    let _ = writeln!(
        t,
        "      elseif {} == 1 then {} = {}({})",
        n,
        rv,
        f,
        reg(format!("{} + 2", a))
    );
    let _ = writeln!(
        t,
        "      elseif {} == 2 then {} = {}({}, {})",
        n,
        rv,
        f,
        reg(format!("{} + 2", a)),
        reg(format!("{} + 3", a))
    );
    let _ = writeln!(
        t,
        "      else {} = {}({}, {}, {}) end",
        rv,
        f,
        reg(format!("{} + 2", a)),
        reg(format!("{} + 3", a)),
        reg(format!("{} + 4", a))
    );
    let _ = writeln!(t, "      if {} // 16 == 1 then {} = {} end", b, ra, rv);
    let _ = writeln!(t, "    elseif {} == {} then", o, codes.get(Op::Return));
    let _ = writeln!(t, "      if {} == 1 then", b);
    let _ = writeln!(t, "        return {}", ra);
    let _ = writeln!(t, "      elseif {} == 2 then", b);
    t.push_str("        return\n");
    let _ = writeln!(t, "      else {} = #{} + 1 end", nx, m);
    t.push_str("    end\n");
    let _ = writeln!(t, "    {} = {}", ip, nx);
    t.push_str("  end\n");
    t.push_str("end");
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_pack_and_unpack() {
        let w = word(0xBEEF, 7, 250);
        assert_eq!(w % 65536, 0xBEEF);
        assert_eq!((w / 65536) % 256, 7);
        assert_eq!(w / 16777216, 250);
    }

    #[test]
    fn opcode_values_are_distinct() {
        let mut oracle = EntropyOracle::new(123);
        let codes = OpCodes::new(&mut oracle);
        let mut seen = std::collections::HashSet::new();
        for op in [
            Op::Load,
            Op::Store,
            Op::Call,
            Op::Jump,
            Op::Return,
            Op::Compare,
            Op::Math,
            Op::Table,
        ] {
            assert!(seen.insert(codes.get(op)));
        }
    }

    #[test]
    fn compiler_rejects_out_of_subset_fragments() {
        let written = AHashSet::new();
        let mut oracle = EntropyOracle::new(1);
        let codes = OpCodes::new(&mut oracle);

        let ast = crate::parse::parse("local x = 1\nwhile x < 3 do x = x + 1 end", 64)
            .expect("valid script");
        let mut compiler = Compiler::new(&codes, &written, false);
        assert!(compiler.compile_stmt(&ast.body.stmts[0]).is_some());
        assert!(compiler.compile_stmt(&ast.body.stmts[1]).is_none());
    }

    #[test]
    fn compiler_accepts_the_documented_subset() {
        let written = AHashSet::new();
        let mut oracle = EntropyOracle::new(2);
        let codes = OpCodes::new(&mut oracle);

        let source = "\
local a = 2
local b = a * 3 + 1
if b > a then
  print(a, b)
end
print(\"done\")";
        let ast = crate::parse::parse(source, 64).expect("valid script");
        let mut compiler = Compiler::new(&codes, &written, false);
        for stmt in &ast.body.stmts {
            assert!(compiler.compile_stmt(stmt).is_some());
        }
        assert!(!compiler.code.is_empty());
        // `print`, 2, 3, 1, "done" all land in the pool.
        assert!(compiler.consts.iter().any(|c| c == "print"));
        assert!(compiler.consts.iter().any(|c| c == "\"done\""));
    }
}
