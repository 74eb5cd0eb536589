//! The alpha-renaming pass: replace user-introduced identifiers with opaque
//! ones without changing what any reference resolves to.

use crate::ast::{Expr, FnExpr, Ident, Stmt, StmtBlock, TableField, AST};
use crate::entropy::EntropyOracle;
use crate::error::ObfuscateError;
use crate::options::Options;
use crate::passes::Pass;
use crate::Identifier;
use ahash::AHashMap;

/// Alpha-renames locals, parameters, and loop variables.  Unbound references
/// are taken to be globals or built-ins and left alone, as are member names,
/// table keys, and `goto` labels (separate namespaces).
pub struct RenamePass;

impl Pass for RenamePass {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn run(
        &mut self,
        ast: &mut AST,
        oracle: &mut EntropyOracle,
        _options: &Options,
    ) -> Result<(), ObfuscateError> {
        let mut scopes = Scopes::new();
        rename_stmts(&mut ast.body, &mut scopes, oracle);
        Ok(())
    }
}

/// A stack of lexical scopes, innermost last.  Each frame maps an original
/// name to its fresh replacement.
struct Scopes {
    frames: Vec<AHashMap<Identifier, Identifier>>,
}

impl Scopes {
    fn new() -> Self {
        Self {
            frames: vec![AHashMap::new()],
        }
    }

    fn push(&mut self) {
        self.frames.push(AHashMap::new());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Allocate a fresh name for a declaration and rewrite it in place.
    /// Re-binding a name already bound in the current frame shadows it, so
    /// later references resolve to the newer fresh name.
    fn bind(&mut self, ident: &mut Ident, oracle: &mut EntropyOracle) {
        let fresh = oracle.identifier();
        self.frames
            .last_mut()
            .expect("at least the chunk frame exists")
            .insert(ident.name.clone(), fresh.clone());
        ident.name = fresh;
    }

    /// Resolve a reference along the scope chain, innermost first.
    fn resolve(&self, name: &Identifier) -> Option<&Identifier> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}

fn rename_stmts(block: &mut StmtBlock, scopes: &mut Scopes, oracle: &mut EntropyOracle) {
    for stmt in &mut block.stmts {
        rename_stmt(stmt, scopes, oracle);
    }
}

fn rename_block(block: &mut StmtBlock, scopes: &mut Scopes, oracle: &mut EntropyOracle) {
    scopes.push();
    rename_stmts(block, scopes, oracle);
    scopes.pop();
}

fn rename_stmt(stmt: &mut Stmt, scopes: &mut Scopes, oracle: &mut EntropyOracle) {
    match stmt {
        Stmt::Block(block, ..) => rename_block(block, scopes, oracle),
        Stmt::Local(x, ..) => {
            // Initializers see the outer bindings: `local x = x` reads the
            // old `x`.
            for value in &mut x.values {
                rename_expr(value, scopes, oracle);
            }
            for name in &mut x.names {
                scopes.bind(name, oracle);
            }
        }
        Stmt::Assign(x, ..) => {
            for target in &mut x.targets {
                rename_expr(target, scopes, oracle);
            }
            for value in &mut x.values {
                rename_expr(value, scopes, oracle);
            }
        }
        Stmt::If(x, ..) => {
            for (cond, body) in &mut x.branches {
                rename_expr(cond, scopes, oracle);
                rename_block(body, scopes, oracle);
            }
            if let Some(body) = &mut x.else_body {
                rename_block(body, scopes, oracle);
            }
        }
        Stmt::NumericFor(x, ..) => {
            rename_expr(&mut x.start, scopes, oracle);
            rename_expr(&mut x.limit, scopes, oracle);
            if let Some(step) = &mut x.step {
                rename_expr(step, scopes, oracle);
            }
            scopes.push();
            scopes.bind(&mut x.var, oracle);
            rename_stmts(&mut x.body, scopes, oracle);
            scopes.pop();
        }
        Stmt::GenericFor(x, ..) => {
            for expr in &mut x.exprs {
                rename_expr(expr, scopes, oracle);
            }
            scopes.push();
            for var in &mut x.vars {
                scopes.bind(var, oracle);
            }
            rename_stmts(&mut x.body, scopes, oracle);
            scopes.pop();
        }
        Stmt::While(x, ..) => {
            rename_expr(&mut x.cond, scopes, oracle);
            rename_block(&mut x.body, scopes, oracle);
        }
        Stmt::Repeat(x, ..) => {
            // Body locals stay in scope for the `until` condition.
            scopes.push();
            rename_stmts(&mut x.body, scopes, oracle);
            rename_expr(&mut x.cond, scopes, oracle);
            scopes.pop();
        }
        Stmt::Return(exprs, ..) => {
            for expr in exprs.iter_mut() {
                rename_expr(expr, scopes, oracle);
            }
        }
        Stmt::FnDecl(x, ..) => {
            if x.is_local {
                // `local function f` binds `f` before the body, so the
                // function can call itself.
                scopes.bind(&mut x.name.root, oracle);
            } else if let Some(fresh) = scopes.resolve(&x.name.root.name) {
                // `function f.g()` assigns through an existing binding; the
                // path parts are table keys and stay.
                x.name.root.name = fresh.clone();
            }
            rename_fn(&mut x.func, scopes, oracle);
        }
        Stmt::Expr(expr) => rename_expr(expr, scopes, oracle),
        Stmt::Break(..) | Stmt::Goto(..) | Stmt::Label(..) | Stmt::RawEmit(..) => {}
    }
}

fn rename_fn(func: &mut FnExpr, scopes: &mut Scopes, oracle: &mut EntropyOracle) {
    scopes.push();
    for param in &mut func.params {
        scopes.bind(param, oracle);
    }
    rename_stmts(&mut func.body, scopes, oracle);
    scopes.pop();
}

fn rename_expr(expr: &mut Expr, scopes: &mut Scopes, oracle: &mut EntropyOracle) {
    match expr {
        Expr::Variable(x) => {
            if let Some(fresh) = scopes.resolve(&x.name) {
                x.name = fresh.clone();
            }
        }
        Expr::Member(x, ..) => rename_expr(&mut x.obj, scopes, oracle),
        Expr::Index(x, ..) => {
            rename_expr(&mut x.obj, scopes, oracle);
            rename_expr(&mut x.index, scopes, oracle);
        }
        Expr::Call(x, ..) => {
            rename_expr(&mut x.callee, scopes, oracle);
            for arg in &mut x.args {
                rename_expr(arg, scopes, oracle);
            }
        }
        Expr::MethodCall(x, ..) => {
            rename_expr(&mut x.obj, scopes, oracle);
            for arg in &mut x.args {
                rename_expr(arg, scopes, oracle);
            }
        }
        Expr::Binary(x, ..) => {
            rename_expr(&mut x.lhs, scopes, oracle);
            rename_expr(&mut x.rhs, scopes, oracle);
        }
        Expr::Unary(_, arg, ..) => rename_expr(arg, scopes, oracle),
        Expr::Function(func, ..) => rename_fn(func, scopes, oracle),
        Expr::Table(x, ..) => {
            for field in &mut x.fields {
                match field {
                    TableField::Named(_, value) | TableField::Item(value) => {
                        rename_expr(value, scopes, oracle)
                    }
                    TableField::Indexed(key, value) => {
                        rename_expr(key, scopes, oracle);
                        rename_expr(value, scopes, oracle);
                    }
                }
            }
        }
        Expr::Paren(inner, ..) => rename_expr(inner, scopes, oracle),
        Expr::Nil(..)
        | Expr::BoolConstant(..)
        | Expr::IntegerConstant(..)
        | Expr::FloatConstant(..)
        | Expr::StringConstant(..)
        | Expr::Vararg(..)
        | Expr::Raw(..) => {}
    }
}
