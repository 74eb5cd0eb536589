//! The control-flow pass: opaque predicates, then switch-dispatch
//! flattening.
//!
//! Flattening rewrites a statement list into a dispatch table of closures
//! driven by a state variable.  That rewrite moves each statement into its
//! own function, so any statement that could transfer control out of the
//! list (`break`, `return`, `goto`, a label someone could jump to, or raw
//! spliced text) disqualifies the whole block.  So does any direct use of
//! `...`, which a closure body cannot see.  Local declarations are hoisted
//! ahead of the dispatch loop; the closures then assign through upvalues.

use crate::ast::{
    for_each_block_mut, AssignStmt, BinaryExpr, BinaryOp, Expr, FnCallExpr, FnExpr, Ident,
    IfStmt, IndexAccess, LocalStmt, Stmt, StmtBlock, TableField, TableLit, WhileStmt, AST,
};
use crate::entropy::EntropyOracle;
use crate::error::ObfuscateError;
use crate::options::Options;
use crate::passes::Pass;
use crate::token::Position;
use crate::{Identifier, StaticVec, INT};
use ahash::AHashSet;

pub struct ControlFlowPass;

impl Pass for ControlFlowPass {
    fn name(&self) -> &'static str {
        "control-flow"
    }

    fn run(
        &mut self,
        ast: &mut AST,
        oracle: &mut EntropyOracle,
        _options: &Options,
    ) -> Result<(), ObfuscateError> {
        for_each_block_mut(&mut ast.body, &mut |block| {
            for stmt in &mut block.stmts {
                harden_conditions(stmt, oracle);
            }
        });
        for_each_block_mut(&mut ast.body, &mut |block| {
            maybe_flatten(block, oracle);
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Opaque predicates
// ---------------------------------------------------------------------

/// Combine an opaque predicate into every branching construct of `stmt`.
/// `if`/`while` conditions get an `and`/`or` form; `for` loops have no
/// condition slot, so their bodies are wrapped in an always-true `if`.
fn harden_conditions(stmt: &mut Stmt, oracle: &mut EntropyOracle) {
    match stmt {
        Stmt::If(x, ..) => {
            for (cond, ..) in &mut x.branches {
                let original = std::mem::replace(cond, Expr::Nil(Position::NONE));
                *cond = combine(original, oracle);
            }
        }
        Stmt::While(x, ..) => {
            let original = std::mem::replace(&mut x.cond, Expr::Nil(Position::NONE));
            x.cond = combine(original, oracle);
        }
        Stmt::NumericFor(x, ..) => {
            // The control variable is guaranteed numeric, so it may feed
            // the predicate.
            let pred = opaque_true(oracle, Some(x.var.name.clone()));
            wrap_body(&mut x.body, pred);
        }
        Stmt::GenericFor(x, ..) => {
            let pred = opaque_true(oracle, None);
            wrap_body(&mut x.body, pred);
        }
        _ => {}
    }
}

/// `pred and cond` for an always-true predicate, `pred or cond` for an
/// always-false one; both forms evaluate to exactly `cond`'s value, and the
/// predicates are effect-free, so short-circuiting changes nothing.
fn combine(cond: Expr, oracle: &mut EntropyOracle) -> Expr {
    let pos = cond.position();
    let (op, pred) = if oracle.chance(50) {
        (BinaryOp::And, opaque_true(oracle, None))
    } else {
        (BinaryOp::Or, opaque_false(oracle))
    };
    Expr::Binary(
        Box::new(BinaryExpr {
            op,
            lhs: pred,
            rhs: cond,
        }),
        pos,
    )
}

fn wrap_body(body: &mut StmtBlock, pred: Expr) {
    let pos = body.pos;
    let inner = std::mem::take(body);
    let mut branches = StaticVec::new();
    branches.push((pred, inner));
    body.stmts.push(Stmt::If(
        Box::new(IfStmt {
            branches,
            else_body: None,
        }),
        pos,
    ));
    body.pos = pos;
}

fn int(value: INT) -> Expr {
    Expr::IntegerConstant(value, Position::NONE)
}

fn var(name: Identifier) -> Expr {
    Expr::Variable(Ident::new(name, Position::NONE))
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs }), Position::NONE)
}

/// A predicate that always evaluates to `true`, built from pure integer
/// arithmetic over freshly chosen constants (no globals, so nothing the
/// surrounding program could have shadowed).
fn opaque_true(oracle: &mut EntropyOracle, loop_var: Option<Identifier>) -> Expr {
    let k1 = oracle.range(2, 97);
    let k2 = oracle.range(2, 97);
    let variants = if loop_var.is_some() { 4 } else { 3 };
    match oracle.index(variants) {
        // (k1 * 0) == 0
        0 => binary(BinaryOp::Eq, binary(BinaryOp::Mul, int(k1), int(0)), int(0)),
        // (k1 * k1) >= 0
        1 => binary(
            BinaryOp::GreaterEq,
            binary(BinaryOp::Mul, int(k1), int(k1)),
            int(0),
        ),
        // (k1 % k2) < k2, with k1, k2 positive
        2 => binary(
            BinaryOp::Less,
            binary(BinaryOp::Mod, int(k1), int(k2)),
            int(k2),
        ),
        // (v * 0) == 0, for a numeric loop variable
        _ => binary(
            BinaryOp::Eq,
            binary(
                BinaryOp::Mul,
                var(loop_var.expect("variant gated on presence")),
                int(0),
            ),
            int(0),
        ),
    }
}

/// A predicate that always evaluates to `false`.
fn opaque_false(oracle: &mut EntropyOracle) -> Expr {
    let k1 = oracle.range(2, 97);
    let k2 = oracle.range(2, 97);
    match oracle.index(3) {
        // (k1 * 0) == 1
        0 => binary(BinaryOp::Eq, binary(BinaryOp::Mul, int(k1), int(0)), int(1)),
        // (k1 + k2) ~= (k1 + k2)
        1 => binary(
            BinaryOp::NotEq,
            binary(BinaryOp::Add, int(k1), int(k2)),
            binary(BinaryOp::Add, int(k1), int(k2)),
        ),
        // (k1 * k1) < 0
        _ => binary(
            BinaryOp::Less,
            binary(BinaryOp::Mul, int(k1), int(k1)),
            int(0),
        ),
    }
}

// ---------------------------------------------------------------------
// Switch-dispatch flattening
// ---------------------------------------------------------------------

/// Rewrite `block` into dispatch-table form when every precondition holds.
fn maybe_flatten(block: &mut StmtBlock, oracle: &mut EntropyOracle) {
    if block.stmts.len() < 2 || !oracle.chance(60) {
        return;
    }
    if block.stmts.iter().any(transfers_control_out) {
        return;
    }
    if block.stmts.iter().any(uses_vararg) {
        return;
    }
    if !hoisting_is_safe(&block.stmts) {
        return;
    }

    let state = oracle.identifier();
    let dispatch = oracle.identifier();
    let pos = block.pos;

    let mut hoisted: StaticVec<Ident> = StaticVec::new();
    for stmt in &block.stmts {
        match stmt {
            Stmt::Local(x, ..) => hoisted.extend(x.names.iter().cloned()),
            Stmt::FnDecl(x, ..) if x.is_local => hoisted.push(x.name.root.clone()),
            _ => {}
        }
    }

    let stmts = std::mem::take(&mut block.stmts);
    let count = stmts.len();
    let mut fields: StaticVec<TableField> = StaticVec::new();
    for (index, stmt) in stmts.into_iter().enumerate() {
        let mut body: StaticVec<Stmt> = StaticVec::new();
        match stmt {
            // Hoisted declarations become plain assignments through the
            // upvalue; a value-less `local` needs no statement at all (the
            // hoisted slot is already nil).
            Stmt::Local(x, stmt_pos) => {
                if !x.values.is_empty() {
                    body.push(Stmt::Assign(
                        Box::new(AssignStmt {
                            targets: x.names.iter().map(|n| var(n.name.clone())).collect(),
                            values: x.values,
                        }),
                        stmt_pos,
                    ));
                }
            }
            Stmt::FnDecl(x, stmt_pos) if x.is_local => {
                let mut targets = StaticVec::new();
                targets.push(var(x.name.root.name.clone()));
                let mut values = StaticVec::new();
                values.push(Expr::Function(Box::new(x.func), stmt_pos));
                body.push(Stmt::Assign(
                    Box::new(AssignStmt { targets, values }),
                    stmt_pos,
                ));
            }
            stmt => body.push(stmt),
        }
        let mut targets = StaticVec::new();
        targets.push(var(state.clone()));
        let mut values = StaticVec::new();
        values.push(int(index as INT + 2));
        body.push(Stmt::Assign(
            Box::new(AssignStmt { targets, values }),
            Position::NONE,
        ));
        fields.push(TableField::Indexed(
            int(index as INT + 1),
            Expr::Function(
                Box::new(FnExpr {
                    params: StaticVec::new(),
                    is_vararg: false,
                    body: StmtBlock {
                        stmts: body,
                        pos: Position::NONE,
                    },
                }),
                Position::NONE,
            ),
        ));
    }

    let mut rebuilt: StaticVec<Stmt> = StaticVec::new();
    if !hoisted.is_empty() {
        rebuilt.push(Stmt::Local(
            Box::new(LocalStmt {
                names: hoisted,
                values: StaticVec::new(),
            }),
            pos,
        ));
    }
    {
        let mut names = StaticVec::new();
        names.push(Ident::new(state.clone(), Position::NONE));
        let mut values = StaticVec::new();
        values.push(int(1));
        rebuilt.push(Stmt::Local(Box::new(LocalStmt { names, values }), pos));
    }
    {
        let mut names = StaticVec::new();
        names.push(Ident::new(dispatch.clone(), Position::NONE));
        let mut values = StaticVec::new();
        values.push(Expr::Table(Box::new(TableLit { fields }), Position::NONE));
        rebuilt.push(Stmt::Local(Box::new(LocalStmt { names, values }), pos));
    }

    let entry = |state: &Identifier, dispatch: &Identifier| {
        Expr::Index(
            Box::new(IndexAccess {
                obj: var(dispatch.clone()),
                index: var(state.clone()),
            }),
            Position::NONE,
        )
    };
    let cond = binary(
        BinaryOp::And,
        binary(BinaryOp::NotEq, var(state.clone()), Expr::Nil(Position::NONE)),
        binary(
            BinaryOp::NotEq,
            entry(&state, &dispatch),
            Expr::Nil(Position::NONE),
        ),
    );
    let mut loop_body = StaticVec::new();
    loop_body.push(Stmt::Expr(Expr::Call(
        Box::new(FnCallExpr {
            callee: entry(&state, &dispatch),
            args: StaticVec::new(),
        }),
        Position::NONE,
    )));
    rebuilt.push(Stmt::While(
        Box::new(WhileStmt {
            cond,
            body: StmtBlock {
                stmts: loop_body,
                pos: Position::NONE,
            },
        }),
        pos,
    ));

    tracing::trace!(statements = count, "flattened block");
    block.stmts = rebuilt;
}

/// Could executing `stmt` transfer control outside the statement itself?
/// `break` inside a loop that is part of the statement is fine; a bare
/// `break`, any `return`, and anything `goto`-related is not.  Raw spliced
/// text is opaque and treated as if it could.
fn transfers_control_out(stmt: &Stmt) -> bool {
    fn escapes(stmt: &Stmt, in_loop: bool) -> bool {
        match stmt {
            Stmt::Break(..) => !in_loop,
            Stmt::Return(..) | Stmt::Goto(..) | Stmt::Label(..) | Stmt::RawEmit(..) => true,
            Stmt::Block(block, ..) => block.stmts.iter().any(|s| escapes(s, in_loop)),
            Stmt::If(x, ..) => {
                x.branches
                    .iter()
                    .any(|(_, body)| body.stmts.iter().any(|s| escapes(s, in_loop)))
                    || x.else_body
                        .as_ref()
                        .map_or(false, |body| body.stmts.iter().any(|s| escapes(s, in_loop)))
            }
            Stmt::While(x, ..) => x.body.stmts.iter().any(|s| escapes(s, true)),
            Stmt::Repeat(x, ..) => x.body.stmts.iter().any(|s| escapes(s, true)),
            Stmt::NumericFor(x, ..) => x.body.stmts.iter().any(|s| escapes(s, true)),
            Stmt::GenericFor(x, ..) => x.body.stmts.iter().any(|s| escapes(s, true)),
            // Function bodies establish their own control context.
            Stmt::Local(..) | Stmt::Assign(..) | Stmt::FnDecl(..) | Stmt::Expr(..) => false,
        }
    }
    escapes(stmt, false)
}

/// Does `stmt` use `...` outside any nested function body?
fn uses_vararg(stmt: &Stmt) -> bool {
    fn expr_uses(expr: &Expr) -> bool {
        match expr {
            Expr::Vararg(..) => true,
            Expr::Member(x, ..) => expr_uses(&x.obj),
            Expr::Index(x, ..) => expr_uses(&x.obj) || expr_uses(&x.index),
            Expr::Call(x, ..) => expr_uses(&x.callee) || x.args.iter().any(expr_uses),
            Expr::MethodCall(x, ..) => expr_uses(&x.obj) || x.args.iter().any(expr_uses),
            Expr::Binary(x, ..) => expr_uses(&x.lhs) || expr_uses(&x.rhs),
            Expr::Unary(_, arg, ..) => expr_uses(arg),
            Expr::Table(x, ..) => x.fields.iter().any(|field| match field {
                TableField::Named(_, value) | TableField::Item(value) => expr_uses(value),
                TableField::Indexed(key, value) => expr_uses(key) || expr_uses(value),
            }),
            Expr::Paren(inner, ..) => expr_uses(inner),
            // A nested function re-binds `...`.
            Expr::Function(..) => false,
            _ => false,
        }
    }
    fn block_uses(block: &StmtBlock) -> bool {
        block.stmts.iter().any(uses_vararg)
    }
    match stmt {
        Stmt::Block(block, ..) => block_uses(block),
        Stmt::Local(x, ..) => x.values.iter().any(expr_uses),
        Stmt::Assign(x, ..) => {
            x.targets.iter().any(expr_uses) || x.values.iter().any(expr_uses)
        }
        Stmt::If(x, ..) => {
            x.branches
                .iter()
                .any(|(cond, body)| expr_uses(cond) || block_uses(body))
                || x.else_body.as_ref().map_or(false, block_uses)
        }
        Stmt::NumericFor(x, ..) => {
            expr_uses(&x.start)
                || expr_uses(&x.limit)
                || x.step.as_ref().map_or(false, expr_uses)
                || block_uses(&x.body)
        }
        Stmt::GenericFor(x, ..) => x.exprs.iter().any(expr_uses) || block_uses(&x.body),
        Stmt::While(x, ..) => expr_uses(&x.cond) || block_uses(&x.body),
        Stmt::Repeat(x, ..) => block_uses(&x.body) || expr_uses(&x.cond),
        Stmt::Return(exprs, ..) => exprs.iter().any(expr_uses),
        Stmt::Expr(expr) => expr_uses(expr),
        Stmt::FnDecl(..)
        | Stmt::Break(..)
        | Stmt::Goto(..)
        | Stmt::Label(..)
        | Stmt::RawEmit(..) => false,
    }
}

/// Hoisting a `local` to the top of the block is only transparent when no
/// earlier statement (nor the declaration's own initializer) references the
/// name: such references resolve to an outer binding today and would be
/// captured by the hoisted slot.  After renaming every name is unique, so
/// this always holds; the check carries the pass when renaming is off.
fn hoisting_is_safe(stmts: &[Stmt]) -> bool {
    let mut pending: AHashSet<Identifier> = AHashSet::new();
    for stmt in stmts {
        match stmt {
            Stmt::Local(x, ..) => {
                for name in &x.names {
                    // A duplicate `local x ... local x` would collapse into
                    // one hoisted slot and change shadowing.
                    if !pending.insert(name.name.clone()) {
                        return false;
                    }
                }
            }
            Stmt::FnDecl(x, ..) if x.is_local => {
                if !pending.insert(x.name.root.name.clone()) {
                    return false;
                }
            }
            _ => {}
        }
    }
    if pending.is_empty() {
        return true;
    }

    // Re-scan: a reference to a pending name before its declaration point
    // resolves to an outer binding today and defeats hoisting.  `local
    // function` binds before its own body, so its name counts as declared
    // ahead of the reference scan.
    let mut declared: AHashSet<Identifier> = AHashSet::new();
    for stmt in stmts {
        if let Stmt::FnDecl(x, ..) = stmt {
            if x.is_local {
                declared.insert(x.name.root.name.clone());
            }
        }
        let mut names: StaticVec<Identifier> = StaticVec::new();
        collect_refs(stmt, &mut names);
        for name in names {
            if pending.contains(&name) && !declared.contains(&name) {
                return false;
            }
        }
        if let Stmt::Local(x, ..) = stmt {
            for name in &x.names {
                declared.insert(name.name.clone());
            }
        }
    }
    true
}

/// Every variable name referenced by `stmt`, including inside nested blocks
/// and function bodies.  Declaration slots are not references.
fn collect_refs(stmt: &Stmt, out: &mut StaticVec<Identifier>) {
    fn expr_refs(expr: &Expr, out: &mut StaticVec<Identifier>) {
        crate::ast::visit_expr(expr, &mut |e| {
            match e {
                Expr::Variable(x) => out.push(x.name.clone()),
                Expr::Function(func, ..) => {
                    for stmt in &func.body.stmts {
                        collect_refs(stmt, out);
                    }
                }
                _ => {}
            }
        });
    }
    fn block_refs(block: &StmtBlock, out: &mut StaticVec<Identifier>) {
        for stmt in &block.stmts {
            collect_refs(stmt, out);
        }
    }
    match stmt {
        Stmt::Block(block, ..) => block_refs(block, out),
        Stmt::Local(x, ..) => x.values.iter().for_each(|e| expr_refs(e, out)),
        Stmt::Assign(x, ..) => x
            .targets
            .iter()
            .chain(x.values.iter())
            .for_each(|e| expr_refs(e, out)),
        Stmt::If(x, ..) => {
            for (cond, body) in &x.branches {
                expr_refs(cond, out);
                block_refs(body, out);
            }
            if let Some(body) = &x.else_body {
                block_refs(body, out);
            }
        }
        Stmt::NumericFor(x, ..) => {
            expr_refs(&x.start, out);
            expr_refs(&x.limit, out);
            if let Some(step) = &x.step {
                expr_refs(step, out);
            }
            block_refs(&x.body, out);
        }
        Stmt::GenericFor(x, ..) => {
            x.exprs.iter().for_each(|e| expr_refs(e, out));
            block_refs(&x.body, out);
        }
        Stmt::While(x, ..) => {
            expr_refs(&x.cond, out);
            block_refs(&x.body, out);
        }
        Stmt::Repeat(x, ..) => {
            block_refs(&x.body, out);
            expr_refs(&x.cond, out);
        }
        Stmt::Return(exprs, ..) => exprs.iter().for_each(|e| expr_refs(e, out)),
        Stmt::FnDecl(x, ..) => {
            if !x.is_local {
                out.push(x.name.root.name.clone());
            }
            block_refs(&x.func.body, out);
        }
        Stmt::Expr(expr) => expr_refs(expr, out),
        Stmt::Break(..) | Stmt::Goto(..) | Stmt::Label(..) | Stmt::RawEmit(..) => {}
    }
}
