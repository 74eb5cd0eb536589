//! The dead-code pass: splice well-typed, effect-free statements between
//! real ones at oracle-controlled positions.
//!
//! Every template binds only fresh names, so nothing it declares can be
//! referenced, and nothing it references can have been captured.  The one
//! template that touches a global (`setmetatable`) is disabled whenever the
//! program declares a local of that name anywhere, since the injected
//! reference could then resolve to the user's binding.
//!
//! No template may declare a local in the enclosing scope: the dialect
//! forbids a `goto` from jumping into the scope of a local, so a bare
//! `local` spliced between a `goto` and its label would make a valid
//! program stop compiling.  Templates that need locals wrap them in their
//! own `do ... end` block (or a loop body), which keeps the enclosing
//! scope's label visibility untouched.

use crate::ast::{
    collect_declared_locals, for_each_block_mut, AssignStmt, BinaryExpr, BinaryOp, Expr,
    FnCallExpr, FnExpr, Ident, LocalStmt, NumericForStmt, Stmt, StmtBlock, TableField, TableLit,
    WhileStmt, AST,
};
use crate::entropy::EntropyOracle;
use crate::error::ObfuscateError;
use crate::options::Options;
use crate::passes::Pass;
use crate::token::Position;
use crate::{Identifier, StaticVec, INT};

/// Fraction of a block's original statement count that may be junk,
/// in percent (rounded up, so short blocks still get one slot).
const DENSITY_PERCENT: usize = 30;

/// Chance of splicing at any given insertion point, in percent.
const SPLICE_PERCENT: u32 = 25;

pub struct DeadCodePass;

impl Pass for DeadCodePass {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn run(
        &mut self,
        ast: &mut AST,
        oracle: &mut EntropyOracle,
        _options: &Options,
    ) -> Result<(), ObfuscateError> {
        let declared = collect_declared_locals(ast);
        let allow_metatable = !declared.contains("setmetatable");
        for_each_block_mut(&mut ast.body, &mut |block| {
            inject(block, oracle, allow_metatable);
        });
        Ok(())
    }
}

fn inject(block: &mut StmtBlock, oracle: &mut EntropyOracle, allow_metatable: bool) {
    let original = block.stmts.len();
    if original == 0 {
        return;
    }
    let budget = (original * DENSITY_PERCENT + 99) / 100;
    let mut inserted = 0_usize;

    // A `return` must stay the last statement of its block, so the slot
    // after one is off limits.
    let slots_after_last = match block.stmts.last() {
        Some(Stmt::Return(..)) => 0,
        _ => 1,
    };

    // Insert back to front so earlier indices stay valid.
    for slot in (0..original + slots_after_last).rev() {
        if inserted >= budget {
            break;
        }
        if oracle.chance(SPLICE_PERCENT) {
            block.stmts.insert(slot, template(oracle, allow_metatable));
            inserted += 1;
        }
    }
}

fn ident(oracle: &mut EntropyOracle) -> Ident {
    Ident::new(oracle.identifier(), Position::NONE)
}

fn int(value: INT) -> Expr {
    Expr::IntegerConstant(value, Position::NONE)
}

fn var(name: Identifier) -> Expr {
    Expr::Variable(Ident::new(name, Position::NONE))
}

fn local(name: Ident, value: Expr) -> Stmt {
    let mut names = StaticVec::new();
    names.push(name);
    let mut values = StaticVec::new();
    values.push(value);
    Stmt::Local(Box::new(LocalStmt { names, values }), Position::NONE)
}

fn assign(target: Expr, value: Expr) -> Stmt {
    let mut targets = StaticVec::new();
    targets.push(target);
    let mut values = StaticVec::new();
    values.push(value);
    Stmt::Assign(Box::new(AssignStmt { targets, values }), Position::NONE)
}

fn block_of(stmts: impl IntoIterator<Item = Stmt>) -> Stmt {
    Stmt::Block(
        Box::new(StmtBlock::new(stmts, Position::NONE)),
        Position::NONE,
    )
}

fn closure(body: impl IntoIterator<Item = Stmt>) -> Expr {
    Expr::Function(
        Box::new(FnExpr {
            params: StaticVec::new(),
            is_vararg: false,
            body: StmtBlock::new(body, Position::NONE),
        }),
        Position::NONE,
    )
}

/// Draw one no-effect statement from the template catalog.
fn template(oracle: &mut EntropyOracle, allow_metatable: bool) -> Stmt {
    let variants = if allow_metatable { 6 } else { 5 };
    let k1 = oracle.range(2, 255);
    let k2 = oracle.range(2, 255);
    match oracle.index(variants) {
        // while true do break end
        0 => {
            let mut body = StaticVec::new();
            body.push(Stmt::Break(Position::NONE));
            Stmt::While(
                Box::new(WhileStmt {
                    cond: Expr::BoolConstant(true, Position::NONE),
                    body: StmtBlock {
                        stmts: body,
                        pos: Position::NONE,
                    },
                }),
                Position::NONE,
            )
        }
        // do local a = k1 a = a * k2 + a end
        1 => {
            let a = ident(oracle);
            let a_name = a.name.clone();
            block_of([
                local(a, int(k1)),
                assign(
                    var(a_name.clone()),
                    Expr::Binary(
                        Box::new(BinaryExpr {
                            op: BinaryOp::Add,
                            lhs: Expr::Binary(
                                Box::new(BinaryExpr {
                                    op: BinaryOp::Mul,
                                    lhs: var(a_name.clone()),
                                    rhs: int(k2),
                                }),
                                Position::NONE,
                            ),
                            rhs: var(a_name),
                        }),
                        Position::NONE,
                    ),
                ),
            ])
        }
        // do local f = function() return k1 end end  (never referenced)
        2 => {
            let f = ident(oracle);
            let mut ret = StaticVec::new();
            ret.push(int(k1));
            block_of([local(f, closure([Stmt::Return(ret, Position::NONE)]))])
        }
        // do local t = {k1, k2} t = nil end
        3 => {
            let t = ident(oracle);
            let t_name = t.name.clone();
            let mut fields = StaticVec::new();
            fields.push(TableField::Item(int(k1)));
            fields.push(TableField::Item(int(k2)));
            block_of([
                local(
                    t,
                    Expr::Table(Box::new(TableLit { fields }), Position::NONE),
                ),
                assign(var(t_name), Expr::Nil(Position::NONE)),
            ])
        }
        // for i = 2, 1 do local j = k1 end  (zero iterations)
        4 => {
            let i = ident(oracle);
            let j = ident(oracle);
            let mut body = StaticVec::new();
            body.push(local(j, int(k1)));
            Stmt::NumericFor(
                Box::new(NumericForStmt {
                    var: i,
                    start: int(2),
                    limit: int(1),
                    step: None,
                    body: StmtBlock {
                        stmts: body,
                        pos: Position::NONE,
                    },
                }),
                Position::NONE,
            )
        }
        // do local m = setmetatable({}, {__index = function() return k1 end}) end
        _ => {
            let m = ident(oracle);
            let mut ret = StaticVec::new();
            ret.push(int(k1));
            let mut meta_fields = StaticVec::new();
            meta_fields.push(TableField::Named(
                Ident::new("__index", Position::NONE),
                closure([Stmt::Return(ret, Position::NONE)]),
            ));
            let mut args = StaticVec::new();
            args.push(Expr::Table(
                Box::new(TableLit {
                    fields: StaticVec::new(),
                }),
                Position::NONE,
            ));
            args.push(Expr::Table(
                Box::new(TableLit {
                    fields: meta_fields,
                }),
                Position::NONE,
            ));
            block_of([local(
                m,
                Expr::Call(
                    Box::new(FnCallExpr {
                        callee: var("setmetatable".into()),
                        args,
                    }),
                    Position::NONE,
                ),
            )])
        }
    }
}
