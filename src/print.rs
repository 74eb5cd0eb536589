//! Module implementing the printer: AST back to target-language source.
//!
//! Parentheses are re-derived from operator precedence rather than recorded
//! in the tree: a child is wrapped if and only if its operator binds weaker
//! than its parent's, or equally with the opposite associativity on that
//! side.  Everything else (indentation, one statement per line) is for
//! readability only; the final textual pass may disturb it.

use crate::ast::{
    BinaryExpr, Expr, FnExpr, Stmt, StmtBlock, TableField, UnaryOp, AST,
};
use crate::entropy::EntropyOracle;
use crate::token::Precedence;
use crate::INT;
use std::fmt::Write;

/// Indentation step for block bodies.
const INDENT: &str = "  ";

/// Comment words the textual pass scatters; deliberately unremarkable.
const NOISE_WORDS: &[&str] = &[
    "init", "sync", "cache", "tmp", "flush", "patch", "slot", "pool", "tick", "probe", "spill",
    "drain", "seed", "pad",
];

/// Print a whole tree back to source.
#[must_use]
pub fn to_source(ast: &AST) -> String {
    let mut printer = Printer::new();
    for stmt in &ast.body.stmts {
        printer.print_stmt(stmt);
    }
    tracing::debug!(bytes = printer.out.len(), "printed tree");
    printer.out
}

/// Print a single expression to source (no trailing newline).
#[must_use]
pub fn expr_to_source(expr: &Expr) -> String {
    let mut printer = Printer::new();
    printer.print_expr(expr);
    printer.out
}

/// Quote a byte-string literal with minimal escaping.
///
/// Printable ASCII is emitted as-is; the common control characters use their
/// mnemonic escapes; everything else (including non-UTF-8 bytes) uses
/// three-digit decimal escapes, which are unambiguous before a digit.
#[must_use]
pub fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03}", b);
            }
        }
    }
    out.push('"');
    out
}

/// Which side of a binary operator a child sits on.
#[derive(Clone, Copy, Eq, PartialEq)]
enum Side {
    Left,
    Right,
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn print_block(&mut self, block: &StmtBlock) {
        self.indent += 1;
        for stmt in &block.stmts {
            self.print_stmt(stmt);
        }
        self.indent -= 1;
    }

    fn print_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::RawEmit(text, ..) => {
                // Splice pre-formed source, re-indenting each line.
                for line in text.lines() {
                    self.write_indent();
                    self.out.push_str(line);
                    self.out.push('\n');
                }
                return;
            }
            _ => self.write_indent(),
        }
        match stmt {
            Stmt::Block(block, ..) => {
                self.out.push_str("do\n");
                self.print_block(block);
                self.write_indent();
                self.out.push_str("end\n");
            }
            Stmt::Local(x, ..) => {
                self.out.push_str("local ");
                self.print_ident_list(x.names.iter().map(|n| &*n.name));
                if !x.values.is_empty() {
                    self.out.push_str(" = ");
                    self.print_expr_list(&x.values);
                }
                self.out.push('\n');
            }
            Stmt::Assign(x, ..) => {
                self.print_expr_list(&x.targets);
                self.out.push_str(" = ");
                self.print_expr_list(&x.values);
                self.out.push('\n');
            }
            Stmt::If(x, ..) => {
                for (i, (cond, body)) in x.branches.iter().enumerate() {
                    self.out.push_str(if i == 0 { "if " } else { "elseif " });
                    self.print_expr(cond);
                    self.out.push_str(" then\n");
                    self.print_block(body);
                    self.write_indent();
                }
                if let Some(body) = &x.else_body {
                    self.out.push_str("else\n");
                    self.print_block(body);
                    self.write_indent();
                }
                self.out.push_str("end\n");
            }
            Stmt::NumericFor(x, ..) => {
                self.out.push_str("for ");
                self.out.push_str(&x.var.name);
                self.out.push_str(" = ");
                self.print_expr(&x.start);
                self.out.push_str(", ");
                self.print_expr(&x.limit);
                if let Some(step) = &x.step {
                    self.out.push_str(", ");
                    self.print_expr(step);
                }
                self.out.push_str(" do\n");
                self.print_block(&x.body);
                self.write_indent();
                self.out.push_str("end\n");
            }
            Stmt::GenericFor(x, ..) => {
                self.out.push_str("for ");
                self.print_ident_list(x.vars.iter().map(|n| &*n.name));
                self.out.push_str(" in ");
                self.print_expr_list(&x.exprs);
                self.out.push_str(" do\n");
                self.print_block(&x.body);
                self.write_indent();
                self.out.push_str("end\n");
            }
            Stmt::While(x, ..) => {
                self.out.push_str("while ");
                self.print_expr(&x.cond);
                self.out.push_str(" do\n");
                self.print_block(&x.body);
                self.write_indent();
                self.out.push_str("end\n");
            }
            Stmt::Repeat(x, ..) => {
                self.out.push_str("repeat\n");
                self.print_block(&x.body);
                self.write_indent();
                self.out.push_str("until ");
                self.print_expr(&x.cond);
                self.out.push('\n');
            }
            Stmt::Return(exprs, ..) => {
                self.out.push_str("return");
                if !exprs.is_empty() {
                    self.out.push(' ');
                    self.print_expr_list(exprs);
                }
                self.out.push('\n');
            }
            Stmt::Break(..) => self.out.push_str("break\n"),
            Stmt::Goto(label, ..) => {
                self.out.push_str("goto ");
                self.out.push_str(&label.name);
                self.out.push('\n');
            }
            Stmt::Label(label, ..) => {
                self.out.push_str("::");
                self.out.push_str(&label.name);
                self.out.push_str("::\n");
            }
            Stmt::FnDecl(x, ..) => {
                if x.is_local {
                    self.out.push_str("local ");
                }
                self.out.push_str("function ");
                self.out.push_str(&x.name.root.name);
                for part in &x.name.path {
                    self.out.push('.');
                    self.out.push_str(&part.name);
                }
                self.print_fn_tail(&x.func);
            }
            Stmt::Expr(expr) => {
                // A statement starting with `(` can glue onto the previous
                // one; an empty statement in front keeps them apart.
                if starts_with_paren(expr) {
                    self.out.push(';');
                }
                self.print_expr(expr);
                self.out.push('\n');
            }
            Stmt::RawEmit(..) => unreachable!("handled above"),
        }
    }

    /// Print `(params) ... end`, shared by declarations and function
    /// expressions.
    fn print_fn_tail(&mut self, func: &FnExpr) {
        self.out.push('(');
        let mut first = true;
        for param in &func.params {
            if !first {
                self.out.push_str(", ");
            }
            first = false;
            self.out.push_str(&param.name);
        }
        if func.is_vararg {
            if !first {
                self.out.push_str(", ");
            }
            self.out.push_str("...");
        }
        self.out.push_str(")\n");
        self.print_block(&func.body);
        self.write_indent();
        self.out.push_str("end\n");
    }

    fn print_ident_list<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        let mut first = true;
        for name in names {
            if !first {
                self.out.push_str(", ");
            }
            first = false;
            self.out.push_str(name);
        }
    }

    fn print_expr_list(&mut self, exprs: &[Expr]) {
        let mut first = true;
        for expr in exprs {
            if !first {
                self.out.push_str(", ");
            }
            first = false;
            self.print_expr(expr);
        }
    }

    /// Print an expression in a context that accepts any precedence.
    fn print_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Nil(..) => self.out.push_str("nil"),
            Expr::BoolConstant(b, ..) => self.out.push_str(if *b { "true" } else { "false" }),
            Expr::IntegerConstant(i, ..) => self.print_int(*i),
            Expr::FloatConstant(f, ..) => self.print_float(*f),
            Expr::StringConstant(bytes, ..) => {
                let quoted = quote_bytes(bytes);
                self.out.push_str(&quoted);
            }
            Expr::Vararg(..) => self.out.push_str("..."),
            Expr::Variable(x) => self.out.push_str(&x.name),
            Expr::Member(x, ..) => {
                self.print_prefix(&x.obj);
                self.out.push('.');
                self.out.push_str(&x.member.name);
            }
            Expr::Index(x, ..) => {
                self.print_prefix(&x.obj);
                self.out.push('[');
                self.print_expr(&x.index);
                self.out.push(']');
            }
            Expr::Call(x, ..) => {
                self.print_prefix(&x.callee);
                self.out.push('(');
                self.print_expr_list(&x.args);
                self.out.push(')');
            }
            Expr::MethodCall(x, ..) => {
                self.print_prefix(&x.obj);
                self.out.push(':');
                self.out.push_str(&x.method.name);
                self.out.push('(');
                self.print_expr_list(&x.args);
                self.out.push(')');
            }
            Expr::Binary(x, ..) => self.print_binary(x),
            Expr::Unary(op, arg, ..) => self.print_unary(*op, arg),
            Expr::Function(func, ..) => {
                self.out.push_str("function");
                self.print_fn_tail(func);
                // `end` lands on its own line; trim the newline so suffix
                // text (a comma, a closing bracket) can follow.
                if self.out.ends_with('\n') {
                    self.out.pop();
                }
            }
            Expr::Table(x, ..) => {
                self.out.push('{');
                let mut first = true;
                for field in &x.fields {
                    if !first {
                        self.out.push_str(", ");
                    }
                    first = false;
                    match field {
                        TableField::Named(name, value) => {
                            self.out.push_str(&name.name);
                            self.out.push_str(" = ");
                            self.print_expr(value);
                        }
                        TableField::Indexed(key, value) => {
                            self.out.push('[');
                            self.print_expr(key);
                            self.out.push_str("] = ");
                            self.print_expr(value);
                        }
                        TableField::Item(value) => self.print_expr(value),
                    }
                }
                self.out.push('}');
            }
            Expr::Paren(inner, ..) => {
                self.out.push('(');
                self.print_expr(inner);
                self.out.push(')');
            }
            Expr::Raw(text, ..) => self.out.push_str(text),
        }
    }

    /// Print an expression in callee/indexing-base position, parenthesizing
    /// anything that is not a prefix expression in the grammar.
    fn print_prefix(&mut self, expr: &Expr) {
        if expr.is_prefix_expr() {
            self.print_expr(expr);
        } else {
            self.out.push('(');
            self.print_expr(expr);
            self.out.push(')');
        }
    }

    fn print_binary(&mut self, x: &BinaryExpr) {
        let prec = x.op.precedence();
        self.print_operand(&x.lhs, prec, Side::Left, x.op.is_bind_right());
        self.out.push(' ');
        self.out.push_str(x.op.syntax());
        self.out.push(' ');
        self.print_operand(&x.rhs, prec, Side::Right, x.op.is_bind_right());
    }

    /// Print a binary operand, restoring parentheses where precedence alone
    /// would re-associate the tree differently.
    fn print_operand(&mut self, child: &Expr, parent: Precedence, side: Side, bind_right: bool) {
        let needs_parens = match child_precedence(child) {
            Some(child_prec) => {
                child_prec < parent
                    || (child_prec == parent
                        && ((side == Side::Left && bind_right)
                            || (side == Side::Right && !bind_right)))
            }
            None => is_negative_literal(child),
        };
        if needs_parens {
            self.out.push('(');
            self.print_expr(child);
            self.out.push(')');
        } else {
            self.print_expr(child);
        }
    }

    fn print_unary(&mut self, op: UnaryOp, arg: &Expr) {
        match op {
            UnaryOp::Not => self.out.push_str("not "),
            UnaryOp::Neg => self.out.push('-'),
            UnaryOp::Len => self.out.push('#'),
            UnaryOp::BitNot => self.out.push('~'),
        }
        // `- -x` must not fuse into a comment marker.
        let start = self.out.len();
        let needs_parens = match child_precedence(arg) {
            // Only `^` binds tighter than unary, and it may stay bare.
            Some(child_prec) => child_prec < Precedence::UNARY,
            None => is_negative_literal(arg),
        };
        if needs_parens {
            self.out.push('(');
            self.print_expr(arg);
            self.out.push(')');
        } else {
            self.print_expr(arg);
        }
        if op == UnaryOp::Neg && self.out[start..].starts_with('-') {
            self.out.insert(start, ' ');
        }
    }

    fn print_int(&mut self, i: INT) {
        if i == INT::MIN {
            // The literal would overflow before negation in the dialect.
            self.out.push_str("(-9223372036854775807 - 1)");
        } else {
            let _ = write!(self.out, "{}", i);
        }
    }

    fn print_float(&mut self, f: f64) {
        if f.is_nan() {
            self.out.push_str("(0 / 0)");
        } else if f.is_infinite() {
            self.out
                .push_str(if f > 0.0 { "(1 / 0)" } else { "(-(1 / 0))" });
        } else {
            // `{:?}` keeps the shortest representation that round-trips,
            // and always marks floats as floats ("1.0", not "1").
            let _ = write!(self.out, "{:?}", f);
        }
    }
}

/// Effective precedence of a child expression, or [`None`] for atoms.
fn child_precedence(expr: &Expr) -> Option<Precedence> {
    match expr {
        Expr::Binary(x, ..) => Some(x.op.precedence()),
        Expr::Unary(..) => Some(Precedence::UNARY),
        _ => None,
    }
}

/// Is this a negative numeric literal (printable only in parentheses inside
/// operator expressions)?
fn is_negative_literal(expr: &Expr) -> bool {
    match expr {
        Expr::IntegerConstant(i, ..) => *i < 0,
        Expr::FloatConstant(f, ..) => *f < 0.0,
        _ => false,
    }
}

/// Does the printed form of this expression start with `(`?
fn starts_with_paren(expr: &Expr) -> bool {
    match expr {
        Expr::Paren(..) => true,
        Expr::Call(x, ..) => !x.callee.is_prefix_expr() || starts_with_paren(&x.callee),
        Expr::MethodCall(x, ..) => !x.obj.is_prefix_expr() || starts_with_paren(&x.obj),
        Expr::Member(x, ..) => !x.obj.is_prefix_expr() || starts_with_paren(&x.obj),
        Expr::Index(x, ..) => !x.obj.is_prefix_expr() || starts_with_paren(&x.obj),
        Expr::Raw(text, ..) => text.starts_with('('),
        _ => false,
    }
}

/// The final textual pass: pad random lines with trailing whitespace and
/// append harmless comments, never exceeding `cap` output bytes in total.
/// No semantic effect.
#[must_use]
pub fn scatter_noise(printed: String, oracle: &mut EntropyOracle, cap: usize) -> String {
    let mut out = String::with_capacity(printed.len() + printed.len() / 4);
    for line in printed.lines() {
        out.push_str(line);
        if !line.is_empty() && out.len() + 16 <= cap && oracle.chance(20) {
            for _ in 0..oracle.range(1, 6) {
                out.push(' ');
            }
        }
        if !line.is_empty() && out.len() + 24 <= cap && oracle.chance(12) {
            out.push_str(" -- ");
            out.push_str(*oracle.choice(NOISE_WORDS));
        }
        out.push('\n');
    }
    out
}
