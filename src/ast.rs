//! Module defining the AST (abstract syntax tree).
//!
//! The tree is pure: every non-leaf node owns its children exclusively, and a
//! pass that wants to share a subtree must deep-clone it first (all node
//! types are [`Clone`]).  There are no parent back-pointers; traversals carry
//! whatever context they need on the walk stack.

use crate::token::{Position, Precedence};
use crate::{Identifier, StaticVec, FLOAT, INT};
use ahash::AHashSet;
use std::fmt;

/// An identifier with its source [`Position`].
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Ident {
    /// Identifier name.
    pub name: Identifier,
    /// Declaration or reference position.
    pub pos: Position,
}

impl Ident {
    /// Create a new [`Ident`].
    #[inline(always)]
    #[must_use]
    pub fn new(name: impl Into<Identifier>, pos: Position) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.name, self.pos)
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `not`
    Not,
    /// `#`
    Len,
    /// `~`
    BitNot,
}

impl UnaryOp {
    /// Get the text representation of this operator.
    #[must_use]
    pub const fn syntax(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "not",
            Self::Len => "#",
            Self::BitNot => "~",
        }
    }
}

/// A binary operator.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    /// `or`
    Or,
    /// `and`
    And,
    /// `<`
    Less,
    /// `<=`
    LessEq,
    /// `>`
    Greater,
    /// `>=`
    GreaterEq,
    /// `~=`
    NotEq,
    /// `==`
    Eq,
    /// `|`
    BitOr,
    /// `~`
    BitXor,
    /// `&`
    BitAnd,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `..`
    Concat,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    IDiv,
    /// `%`
    Mod,
    /// `^`
    Pow,
}

impl BinaryOp {
    /// Get the text representation of this operator.
    #[must_use]
    pub const fn syntax(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::NotEq => "~=",
            Self::Eq => "==",
            Self::BitOr => "|",
            Self::BitXor => "~",
            Self::BitAnd => "&",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Concat => "..",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::IDiv => "//",
            Self::Mod => "%",
            Self::Pow => "^",
        }
    }

    /// Get the precedence of this operator.
    ///
    /// Mirrors [`Token::precedence`][crate::token::Token::precedence]; the
    /// printer's parenthesization rule is stated over these values.
    #[must_use]
    pub const fn precedence(self) -> Precedence {
        let value = match self {
            Self::Or => 10,
            Self::And => 20,
            Self::Less | Self::LessEq | Self::Greater | Self::GreaterEq | Self::NotEq
            | Self::Eq => 30,
            Self::BitOr => 40,
            Self::BitXor => 45,
            Self::BitAnd => 50,
            Self::Shl | Self::Shr => 55,
            Self::Concat => 60,
            Self::Add | Self::Sub => 70,
            Self::Mul | Self::Div | Self::IDiv | Self::Mod => 80,
            Self::Pow => 120,
        };
        match Precedence::new(value) {
            Some(p) => p,
            None => unreachable!(),
        }
    }

    /// Does this operator bind to the right (instead of left)?
    #[must_use]
    pub const fn is_bind_right(self) -> bool {
        matches!(self, Self::Concat | Self::Pow)
    }
}

/// A function call expression.
#[derive(Debug, Clone)]
pub struct FnCallExpr {
    /// Callee expression.
    pub callee: Expr,
    /// Call arguments.
    pub args: StaticVec<Expr>,
}

/// A method call expression (`obj:m(args)`).
///
/// Kept distinct from [`FnCallExpr`] because the sugar evaluates `obj` only
/// once; desugaring would need a synthetic temporary.
#[derive(Debug, Clone)]
pub struct MethodCallExpr {
    /// Receiver expression.
    pub obj: Expr,
    /// Method name (a table key, never renamed).
    pub method: Ident,
    /// Call arguments.
    pub args: StaticVec<Expr>,
}

/// A binary expression.
#[derive(Debug, Clone)]
pub struct BinaryExpr {
    /// Operator.
    pub op: BinaryOp,
    /// Left-hand side.
    pub lhs: Expr,
    /// Right-hand side.
    pub rhs: Expr,
}

/// Member access (`obj.member`).
#[derive(Debug, Clone)]
pub struct MemberAccess {
    /// Object expression.
    pub obj: Expr,
    /// Member name (a table key, never renamed).
    pub member: Ident,
}

/// Index access (`obj[index]`).
#[derive(Debug, Clone)]
pub struct IndexAccess {
    /// Object expression.
    pub obj: Expr,
    /// Index expression.
    pub index: Expr,
}

/// A function body: parameters plus statements.
#[derive(Debug, Clone)]
pub struct FnExpr {
    /// Parameter names.
    pub params: StaticVec<Ident>,
    /// Does the parameter list end in `...`?
    pub is_vararg: bool,
    /// Function body.
    pub body: StmtBlock,
}

/// One field of a table constructor.  The three kinds are pairwise disjoint;
/// positional [`Item`][TableField::Item] fields retain insertion order.
#[derive(Debug, Clone)]
pub enum TableField {
    /// `name = value`
    Named(Ident, Expr),
    /// `[key] = value`
    Indexed(Expr, Expr),
    /// A positional array value.
    Item(Expr),
}

/// A table constructor expression.
#[derive(Debug, Clone)]
pub struct TableLit {
    /// Table fields, in source order.
    pub fields: StaticVec<TableField>,
}

/// An expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `nil`
    Nil(Position),
    /// `true`/`false`
    BoolConstant(bool, Position),
    /// An integer constant.
    IntegerConstant(INT, Position),
    /// A floating-point constant.
    FloatConstant(FLOAT, Position),
    /// A string constant, held as raw bytes.
    StringConstant(Box<[u8]>, Position),
    /// `...`
    Vararg(Position),
    /// A variable reference.
    Variable(Ident),
    /// `obj.member`
    Member(Box<MemberAccess>, Position),
    /// `obj[index]`
    Index(Box<IndexAccess>, Position),
    /// `callee(args)`
    Call(Box<FnCallExpr>, Position),
    /// `obj:method(args)`
    MethodCall(Box<MethodCallExpr>, Position),
    /// A binary operation.
    Binary(Box<BinaryExpr>, Position),
    /// A unary operation.
    Unary(UnaryOp, Box<Expr>, Position),
    /// `function(params) body end`
    Function(Box<FnExpr>, Position),
    /// `{ fields }`
    Table(Box<TableLit>, Position),
    /// A parenthesized expression.
    ///
    /// Only materialized when the parentheses are semantically significant
    /// (they truncate a call or `...` to one value); redundant parentheses
    /// are dropped at parse time and re-derived by the printer.
    Paren(Box<Expr>, Position),
    /// Pre-formed source text spliced verbatim by the printer.  The payload
    /// must be a legal expression in the target language.
    Raw(Box<str>, Position),
}

impl Expr {
    /// Get the [`Position`] of the expression.
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::Variable(x) => x.pos,
            Self::Nil(pos)
            | Self::BoolConstant(_, pos)
            | Self::IntegerConstant(_, pos)
            | Self::FloatConstant(_, pos)
            | Self::StringConstant(_, pos)
            | Self::Vararg(pos)
            | Self::Member(_, pos)
            | Self::Index(_, pos)
            | Self::Call(_, pos)
            | Self::MethodCall(_, pos)
            | Self::Binary(_, pos)
            | Self::Unary(_, _, pos)
            | Self::Function(_, pos)
            | Self::Table(_, pos)
            | Self::Paren(_, pos)
            | Self::Raw(_, pos) => *pos,
        }
    }

    /// Is this expression a legal assignment target?
    #[must_use]
    pub const fn is_lvalue(&self) -> bool {
        matches!(self, Self::Variable(..) | Self::Member(..) | Self::Index(..))
    }

    /// Is this expression a _prefix expression_ in the dialect's grammar
    /// (i.e. usable as a callee or indexing base without parentheses)?
    #[must_use]
    pub const fn is_prefix_expr(&self) -> bool {
        matches!(
            self,
            Self::Variable(..)
                | Self::Member(..)
                | Self::Index(..)
                | Self::Call(..)
                | Self::MethodCall(..)
                | Self::Paren(..)
        )
    }
}

/// A statement block with its source [`Position`].
#[derive(Debug, Clone, Default)]
pub struct StmtBlock {
    /// Statements, in order.
    pub stmts: StaticVec<Stmt>,
    /// Position of the block opening.
    pub pos: Position,
}

impl StmtBlock {
    /// Create a new [`StmtBlock`].
    #[inline(always)]
    #[must_use]
    pub fn new(stmts: impl IntoIterator<Item = Stmt>, pos: Position) -> Self {
        Self {
            stmts: stmts.into_iter().collect(),
            pos,
        }
    }

    /// Is this block empty?
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Number of statements in this block.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }
}

/// `local names = values`
#[derive(Debug, Clone)]
pub struct LocalStmt {
    /// Declared names.
    pub names: StaticVec<Ident>,
    /// Initializer expressions (may be empty, or fewer than `names`).
    pub values: StaticVec<Expr>,
}

/// `targets = values`
#[derive(Debug, Clone)]
pub struct AssignStmt {
    /// Assignment targets; each is an lvalue.
    pub targets: StaticVec<Expr>,
    /// Assigned values.
    pub values: StaticVec<Expr>,
}

/// `if cond then ... elseif cond then ... else ... end`
#[derive(Debug, Clone)]
pub struct IfStmt {
    /// The `if` and `elseif` arms, in order.  Never empty.
    pub branches: StaticVec<(Expr, StmtBlock)>,
    /// The `else` arm, if any.
    pub else_body: Option<StmtBlock>,
}

/// `for var = start, limit [, step] do body end`
#[derive(Debug, Clone)]
pub struct NumericForStmt {
    /// Control variable.
    pub var: Ident,
    /// Start expression.
    pub start: Expr,
    /// Limit expression.
    pub limit: Expr,
    /// Optional step expression.
    pub step: Option<Expr>,
    /// Loop body.
    pub body: StmtBlock,
}

/// `for vars in exprs do body end`
#[derive(Debug, Clone)]
pub struct GenericForStmt {
    /// Control variables.
    pub vars: StaticVec<Ident>,
    /// Iterator expressions.
    pub exprs: StaticVec<Expr>,
    /// Loop body.
    pub body: StmtBlock,
}

/// `while cond do body end`
#[derive(Debug, Clone)]
pub struct WhileStmt {
    /// Loop condition.
    pub cond: Expr,
    /// Loop body.
    pub body: StmtBlock,
}

/// `repeat body until cond`
///
/// Locals declared in the body remain in scope inside `cond`.
#[derive(Debug, Clone)]
pub struct RepeatStmt {
    /// Loop body.
    pub body: StmtBlock,
    /// Termination condition.
    pub cond: Expr,
}

/// The name of a declared function: `root`, `root.p1.p2`, or `local root`.
///
/// Method definitions (`function a.b:c()`) are desugared at parse time into
/// the dot form with an explicit leading `self` parameter, so no method slot
/// is needed here.
#[derive(Debug, Clone)]
pub struct FnName {
    /// Leading name; a variable reference unless the declaration is `local`.
    pub root: Ident,
    /// Trailing member path (table keys, never renamed).
    pub path: StaticVec<Ident>,
}

/// `function name() ... end` / `local function name() ... end`
#[derive(Debug, Clone)]
pub struct FnDeclStmt {
    /// Declared name.
    pub name: FnName,
    /// Function parameters and body.
    pub func: FnExpr,
    /// Is this a `local function` declaration?  Implies an empty name path.
    pub is_local: bool,
}

/// A statement node.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `do ... end`
    Block(Box<StmtBlock>, Position),
    /// `local names = values`
    Local(Box<LocalStmt>, Position),
    /// `targets = values`
    Assign(Box<AssignStmt>, Position),
    /// `if ... end`
    If(Box<IfStmt>, Position),
    /// Numeric `for` loop.
    NumericFor(Box<NumericForStmt>, Position),
    /// Generic `for` loop.
    GenericFor(Box<GenericForStmt>, Position),
    /// `while` loop.
    While(Box<WhileStmt>, Position),
    /// `repeat` loop.
    Repeat(Box<RepeatStmt>, Position),
    /// `return exprs`
    Return(StaticVec<Expr>, Position),
    /// `break`
    Break(Position),
    /// `goto label`
    Goto(Ident, Position),
    /// `::label::`
    Label(Ident, Position),
    /// Function declaration.
    FnDecl(Box<FnDeclStmt>, Position),
    /// An expression statement (a call).
    Expr(Expr),
    /// Pre-formed source text spliced verbatim by the printer.  The payload
    /// must be legal statement-level source in the target language.
    RawEmit(Box<str>, Position),
}

impl Stmt {
    /// Get the [`Position`] of the statement.
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::Expr(expr) => expr.position(),
            Self::Goto(x, ..) | Self::Label(x, ..) => x.pos,
            Self::Block(_, pos)
            | Self::Local(_, pos)
            | Self::Assign(_, pos)
            | Self::If(_, pos)
            | Self::NumericFor(_, pos)
            | Self::GenericFor(_, pos)
            | Self::While(_, pos)
            | Self::Repeat(_, pos)
            | Self::Return(_, pos)
            | Self::Break(pos)
            | Self::FnDecl(_, pos)
            | Self::RawEmit(_, pos) => *pos,
        }
    }
}

/// A parsed script: the top-level chunk body.
///
/// The chunk behaves as a variadic function body, so `...` and `return` are
/// legal at the top level.
#[derive(Debug, Clone, Default)]
pub struct AST {
    /// Top-level statements.
    pub body: StmtBlock,
}

impl AST {
    /// Print this tree back to target-language source.
    #[inline(always)]
    #[must_use]
    pub fn to_source(&self) -> String {
        crate::print::to_source(self)
    }
}

/// Apply `f` to every expression in the block, bottom-up (children before
/// parents), recursing into nested function bodies.
///
/// Because the walk is post-order, `f` may replace a node wholesale without
/// the replacement being re-visited.
pub fn walk_exprs_mut(block: &mut StmtBlock, f: &mut impl FnMut(&mut Expr)) {
    for stmt in &mut block.stmts {
        walk_stmt_exprs_mut(stmt, f);
    }
}

fn walk_stmt_exprs_mut(stmt: &mut Stmt, f: &mut impl FnMut(&mut Expr)) {
    match stmt {
        Stmt::Block(block, ..) => walk_exprs_mut(block, f),
        Stmt::Local(x, ..) => x.values.iter_mut().for_each(|e| walk_expr_mut(e, f)),
        Stmt::Assign(x, ..) => {
            x.targets.iter_mut().for_each(|e| walk_expr_mut(e, f));
            x.values.iter_mut().for_each(|e| walk_expr_mut(e, f));
        }
        Stmt::If(x, ..) => {
            for (cond, body) in &mut x.branches {
                walk_expr_mut(cond, f);
                walk_exprs_mut(body, f);
            }
            if let Some(body) = &mut x.else_body {
                walk_exprs_mut(body, f);
            }
        }
        Stmt::NumericFor(x, ..) => {
            walk_expr_mut(&mut x.start, f);
            walk_expr_mut(&mut x.limit, f);
            if let Some(step) = &mut x.step {
                walk_expr_mut(step, f);
            }
            walk_exprs_mut(&mut x.body, f);
        }
        Stmt::GenericFor(x, ..) => {
            x.exprs.iter_mut().for_each(|e| walk_expr_mut(e, f));
            walk_exprs_mut(&mut x.body, f);
        }
        Stmt::While(x, ..) => {
            walk_expr_mut(&mut x.cond, f);
            walk_exprs_mut(&mut x.body, f);
        }
        Stmt::Repeat(x, ..) => {
            walk_exprs_mut(&mut x.body, f);
            walk_expr_mut(&mut x.cond, f);
        }
        Stmt::Return(exprs, ..) => exprs.iter_mut().for_each(|e| walk_expr_mut(e, f)),
        Stmt::FnDecl(x, ..) => walk_exprs_mut(&mut x.func.body, f),
        Stmt::Expr(expr) => walk_expr_mut(expr, f),
        Stmt::Break(..) | Stmt::Goto(..) | Stmt::Label(..) | Stmt::RawEmit(..) => {}
    }
}

/// Apply `f` to `expr` and every sub-expression, bottom-up, recursing into
/// nested function bodies.
pub fn walk_expr_mut(expr: &mut Expr, f: &mut impl FnMut(&mut Expr)) {
    match expr {
        Expr::Member(x, ..) => walk_expr_mut(&mut x.obj, f),
        Expr::Index(x, ..) => {
            walk_expr_mut(&mut x.obj, f);
            walk_expr_mut(&mut x.index, f);
        }
        Expr::Call(x, ..) => {
            walk_expr_mut(&mut x.callee, f);
            x.args.iter_mut().for_each(|e| walk_expr_mut(e, f));
        }
        Expr::MethodCall(x, ..) => {
            walk_expr_mut(&mut x.obj, f);
            x.args.iter_mut().for_each(|e| walk_expr_mut(e, f));
        }
        Expr::Binary(x, ..) => {
            walk_expr_mut(&mut x.lhs, f);
            walk_expr_mut(&mut x.rhs, f);
        }
        Expr::Unary(_, arg, ..) => walk_expr_mut(arg, f),
        Expr::Function(x, ..) => walk_exprs_mut(&mut x.body, f),
        Expr::Table(x, ..) => {
            for field in &mut x.fields {
                match field {
                    TableField::Named(_, value) | TableField::Item(value) => {
                        walk_expr_mut(value, f)
                    }
                    TableField::Indexed(key, value) => {
                        walk_expr_mut(key, f);
                        walk_expr_mut(value, f);
                    }
                }
            }
        }
        Expr::Paren(inner, ..) => walk_expr_mut(inner, f),
        Expr::Nil(..)
        | Expr::BoolConstant(..)
        | Expr::IntegerConstant(..)
        | Expr::FloatConstant(..)
        | Expr::StringConstant(..)
        | Expr::Vararg(..)
        | Expr::Variable(..)
        | Expr::Raw(..) => {}
    }
    f(expr);
}

/// Apply `f` to every [`StmtBlock`] in the tree, bottom-up (innermost blocks
/// first), recursing into nested function bodies.
pub fn for_each_block_mut(block: &mut StmtBlock, f: &mut impl FnMut(&mut StmtBlock)) {
    for stmt in &mut block.stmts {
        for_each_stmt_block_mut(stmt, f);
    }
    f(block);
}

fn for_each_stmt_block_mut(stmt: &mut Stmt, f: &mut impl FnMut(&mut StmtBlock)) {
    match stmt {
        Stmt::Block(block, ..) => for_each_block_mut(block, f),
        Stmt::If(x, ..) => {
            for (cond, body) in &mut x.branches {
                for_each_expr_block_mut(cond, f);
                for_each_block_mut(body, f);
            }
            if let Some(body) = &mut x.else_body {
                for_each_block_mut(body, f);
            }
        }
        Stmt::NumericFor(x, ..) => {
            for_each_expr_block_mut(&mut x.start, f);
            for_each_expr_block_mut(&mut x.limit, f);
            if let Some(step) = &mut x.step {
                for_each_expr_block_mut(step, f);
            }
            for_each_block_mut(&mut x.body, f);
        }
        Stmt::GenericFor(x, ..) => {
            for expr in &mut x.exprs {
                for_each_expr_block_mut(expr, f);
            }
            for_each_block_mut(&mut x.body, f);
        }
        Stmt::While(x, ..) => {
            for_each_expr_block_mut(&mut x.cond, f);
            for_each_block_mut(&mut x.body, f);
        }
        Stmt::Repeat(x, ..) => {
            for_each_block_mut(&mut x.body, f);
            for_each_expr_block_mut(&mut x.cond, f);
        }
        Stmt::FnDecl(x, ..) => for_each_block_mut(&mut x.func.body, f),
        Stmt::Local(x, ..) => {
            for value in &mut x.values {
                for_each_expr_block_mut(value, f);
            }
        }
        Stmt::Assign(x, ..) => {
            for value in x.targets.iter_mut().chain(x.values.iter_mut()) {
                for_each_expr_block_mut(value, f);
            }
        }
        Stmt::Return(exprs, ..) => {
            for value in exprs.iter_mut() {
                for_each_expr_block_mut(value, f);
            }
        }
        Stmt::Expr(expr) => for_each_expr_block_mut(expr, f),
        Stmt::Break(..) | Stmt::Goto(..) | Stmt::Label(..) | Stmt::RawEmit(..) => {}
    }
}

fn for_each_expr_block_mut(expr: &mut Expr, f: &mut impl FnMut(&mut StmtBlock)) {
    walk_expr_mut(expr, &mut |e| {
        if let Expr::Function(func, ..) = e {
            // `walk_expr_mut` already descended into the body's expressions,
            // but block-level passes need the body itself.
            for_each_block_mut(&mut func.body, f);
        }
    });
}

/// Visit every statement in the block, parents before children, recursing
/// into nested blocks and function bodies (including function expressions).
pub fn visit_stmts(block: &StmtBlock, f: &mut impl FnMut(&Stmt)) {
    for stmt in &block.stmts {
        visit_stmt(stmt, f);
    }
}

fn visit_stmt(stmt: &Stmt, f: &mut impl FnMut(&Stmt)) {
    f(stmt);
    let mut exprs: StaticVec<&Expr> = StaticVec::new();
    match stmt {
        Stmt::Block(block, ..) => visit_stmts(block, f),
        Stmt::Local(x, ..) => exprs.extend(x.values.iter()),
        Stmt::Assign(x, ..) => exprs.extend(x.targets.iter().chain(x.values.iter())),
        Stmt::If(x, ..) => {
            for (cond, body) in &x.branches {
                exprs.push(cond);
                visit_stmts(body, f);
            }
            if let Some(body) = &x.else_body {
                visit_stmts(body, f);
            }
        }
        Stmt::NumericFor(x, ..) => {
            exprs.push(&x.start);
            exprs.push(&x.limit);
            exprs.extend(x.step.iter());
            visit_stmts(&x.body, f);
        }
        Stmt::GenericFor(x, ..) => {
            exprs.extend(x.exprs.iter());
            visit_stmts(&x.body, f);
        }
        Stmt::While(x, ..) => {
            exprs.push(&x.cond);
            visit_stmts(&x.body, f);
        }
        Stmt::Repeat(x, ..) => {
            visit_stmts(&x.body, f);
            exprs.push(&x.cond);
        }
        Stmt::Return(values, ..) => exprs.extend(values.iter()),
        Stmt::FnDecl(x, ..) => visit_stmts(&x.func.body, f),
        Stmt::Expr(expr) => exprs.push(expr),
        Stmt::Break(..) | Stmt::Goto(..) | Stmt::Label(..) | Stmt::RawEmit(..) => {}
    }
    // Function bodies hidden inside the statement's expressions.
    for expr in exprs {
        visit_expr(expr, &mut |e| {
            if let Expr::Function(func, ..) = e {
                visit_stmts(&func.body, f);
            }
        });
    }
}

/// Visit every expression in the block, children before parents, recursing
/// into nested blocks and function bodies.
pub fn visit_exprs(block: &StmtBlock, f: &mut impl FnMut(&Expr)) {
    let mut g = |stmt: &Stmt| {
        let mut exprs: StaticVec<&Expr> = StaticVec::new();
        match stmt {
            Stmt::Local(x, ..) => exprs.extend(x.values.iter()),
            Stmt::Assign(x, ..) => exprs.extend(x.targets.iter().chain(x.values.iter())),
            Stmt::If(x, ..) => exprs.extend(x.branches.iter().map(|(cond, _)| cond)),
            Stmt::NumericFor(x, ..) => {
                exprs.push(&x.start);
                exprs.push(&x.limit);
                exprs.extend(x.step.iter());
            }
            Stmt::GenericFor(x, ..) => exprs.extend(x.exprs.iter()),
            Stmt::While(x, ..) => exprs.push(&x.cond),
            Stmt::Repeat(x, ..) => exprs.push(&x.cond),
            Stmt::Return(values, ..) => exprs.extend(values.iter()),
            Stmt::Expr(expr) => exprs.push(expr),
            Stmt::Block(..)
            | Stmt::FnDecl(..)
            | Stmt::Break(..)
            | Stmt::Goto(..)
            | Stmt::Label(..)
            | Stmt::RawEmit(..) => {}
        }
        for expr in exprs {
            visit_expr(expr, f);
        }
    };
    visit_stmts(block, &mut g);
}

/// Visit `expr` and every sub-expression, children before parents.  Does
/// *not* descend into function bodies; pair with [`visit_stmts`] when bodies
/// matter.
pub fn visit_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    match expr {
        Expr::Member(x, ..) => visit_expr(&x.obj, f),
        Expr::Index(x, ..) => {
            visit_expr(&x.obj, f);
            visit_expr(&x.index, f);
        }
        Expr::Call(x, ..) => {
            visit_expr(&x.callee, f);
            x.args.iter().for_each(|e| visit_expr(e, f));
        }
        Expr::MethodCall(x, ..) => {
            visit_expr(&x.obj, f);
            x.args.iter().for_each(|e| visit_expr(e, f));
        }
        Expr::Binary(x, ..) => {
            visit_expr(&x.lhs, f);
            visit_expr(&x.rhs, f);
        }
        Expr::Unary(_, arg, ..) => visit_expr(arg, f),
        Expr::Table(x, ..) => {
            for field in &x.fields {
                match field {
                    TableField::Named(_, value) | TableField::Item(value) => visit_expr(value, f),
                    TableField::Indexed(key, value) => {
                        visit_expr(key, f);
                        visit_expr(value, f);
                    }
                }
            }
        }
        Expr::Paren(inner, ..) => visit_expr(inner, f),
        Expr::Function(..)
        | Expr::Nil(..)
        | Expr::BoolConstant(..)
        | Expr::IntegerConstant(..)
        | Expr::FloatConstant(..)
        | Expr::StringConstant(..)
        | Expr::Vararg(..)
        | Expr::Variable(..)
        | Expr::Raw(..) => {}
    }
    f(expr);
}

/// Collect every identifier that appears in the tree: variable references,
/// declarations, parameters, member names, table keys, and labels.
///
/// The driver seeds the entropy oracle with this set so generated names can
/// never collide with a name the program already uses.
#[must_use]
pub fn collect_identifiers(ast: &AST) -> AHashSet<Identifier> {
    let mut seen = AHashSet::new();
    visit_stmts(&ast.body, &mut |stmt| match stmt {
        Stmt::Local(x, ..) => x.names.iter().for_each(|n| {
            seen.insert(n.name.clone());
        }),
        Stmt::NumericFor(x, ..) => {
            seen.insert(x.var.name.clone());
        }
        Stmt::GenericFor(x, ..) => x.vars.iter().for_each(|n| {
            seen.insert(n.name.clone());
        }),
        Stmt::Goto(x, ..) | Stmt::Label(x, ..) => {
            seen.insert(x.name.clone());
        }
        Stmt::FnDecl(x, ..) => {
            seen.insert(x.name.root.name.clone());
            x.name.path.iter().chain(x.func.params.iter()).for_each(|n| {
                seen.insert(n.name.clone());
            });
        }
        _ => {}
    });
    visit_exprs(&ast.body, &mut |expr| match expr {
        Expr::Variable(x) => {
            seen.insert(x.name.clone());
        }
        Expr::Member(x, ..) => {
            seen.insert(x.member.name.clone());
        }
        Expr::MethodCall(x, ..) => {
            seen.insert(x.method.name.clone());
        }
        Expr::Function(x, ..) => x.params.iter().for_each(|n| {
            seen.insert(n.name.clone());
        }),
        Expr::Table(x, ..) => {
            for field in &x.fields {
                if let TableField::Named(name, ..) = field {
                    seen.insert(name.name.clone());
                }
            }
        }
        _ => {}
    });
    seen
}

/// Collect every name declared as a local anywhere in the tree (locals,
/// parameters, loop variables, `local function` names).
///
/// Passes that inject references to well-known globals consult this set: a
/// program that declares a local with the same name could capture the
/// injected reference.
#[must_use]
pub fn collect_declared_locals(ast: &AST) -> AHashSet<Identifier> {
    let mut declared = AHashSet::new();
    visit_stmts(&ast.body, &mut |stmt| match stmt {
        Stmt::Local(x, ..) => x.names.iter().for_each(|n| {
            declared.insert(n.name.clone());
        }),
        Stmt::NumericFor(x, ..) => {
            declared.insert(x.var.name.clone());
        }
        Stmt::GenericFor(x, ..) => x.vars.iter().for_each(|n| {
            declared.insert(n.name.clone());
        }),
        Stmt::FnDecl(x, ..) => {
            if x.is_local {
                declared.insert(x.name.root.name.clone());
            }
            x.func.params.iter().for_each(|n| {
                declared.insert(n.name.clone());
            });
        }
        _ => {}
    });
    visit_exprs(&ast.body, &mut |expr| {
        if let Expr::Function(func, ..) = expr {
            func.params.iter().for_each(|n| {
                declared.insert(n.name.clone());
            });
        }
    });
    declared
}

/// Collect every global name the program assigns to (including function
/// declarations).  "Global" here means any [`Variable`][Expr::Variable]
/// assignment target; lexical resolution is not consulted, so the set
/// over-approximates, which is the safe direction for its callers.
#[must_use]
pub fn globals_written(ast: &AST) -> AHashSet<Identifier> {
    let mut written = AHashSet::new();
    visit_stmts(&ast.body, &mut |stmt| match stmt {
        Stmt::Assign(x, ..) => {
            for target in &x.targets {
                if let Expr::Variable(v) = target {
                    written.insert(v.name.clone());
                }
            }
        }
        Stmt::FnDecl(x, ..) if !x.is_local && x.name.path.is_empty() => {
            written.insert(x.name.root.name.clone());
        }
        _ => {}
    });
    written
}
