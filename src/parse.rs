//! Main module implementing the parser.

use crate::ast::{
    AssignStmt, BinaryExpr, BinaryOp, Expr, FnCallExpr, FnDeclStmt, FnExpr, FnName,
    GenericForStmt, Ident, IfStmt, IndexAccess, LocalStmt, MemberAccess, MethodCallExpr,
    NumericForStmt, RepeatStmt, Stmt, StmtBlock, TableField, TableLit, UnaryOp, WhileStmt, AST,
};
use crate::error::{ParseError, ParseErrorType};
use crate::token::{tokenize, Position, Precedence, Token, TokenStream};
use crate::StaticVec;

type PERR = ParseErrorType;

const NEVER_ENDS: &str = "`TokenIterator` never ends";

/// Per-call parse settings: the nesting depth budget and whether a `break`
/// would have a loop to land in.
///
/// Passed by value; every nested construct derives a deeper copy via
/// [`level_up`][ParseSettings::level_up], which enforces the budget.
#[derive(Debug, Clone, Copy)]
pub struct ParseSettings {
    /// Current nesting level.
    level: usize,
    /// Maximum nesting level.
    max_depth: usize,
    /// Is the parser inside a loop body (and not inside a nested function)?
    in_loop: bool,
}

impl ParseSettings {
    /// Create a new level of the settings, one deeper.
    fn level_up(self, pos: Position) -> Result<Self, ParseError> {
        if self.level + 1 > self.max_depth {
            return Err(PERR::TooDeep(self.max_depth).into_err(pos));
        }
        Ok(Self {
            level: self.level + 1,
            ..self
        })
    }

    /// Settings for a loop body.
    const fn looped(self) -> Self {
        Self {
            in_loop: true,
            ..self
        }
    }

    /// Settings for a function body: a fresh control context.
    const fn fn_body(self) -> Self {
        Self {
            in_loop: false,
            ..self
        }
    }
}

/// Parse a script into an [`AST`], aborting on the first error.
pub fn parse(script: &str, max_depth: usize) -> Result<AST, ParseError> {
    let mut input = tokenize(script);
    let settings = ParseSettings {
        level: 0,
        max_depth,
        in_loop: false,
    };
    let body = parse_block_body(&mut input, settings, Position::START)?;
    let (token, pos) = take(&mut input)?;
    match token {
        Token::EOF => Ok(AST { body }),
        token => Err(PERR::Expected("end of input".into(), token.syntax().into()).into_err(pos)),
    }
}

/// Peek at the next token without consuming it.
fn peek<'a>(input: &'a mut TokenStream) -> (&'a Token, Position) {
    let (token, pos) = input.peek().expect(NEVER_ENDS);
    (token, *pos)
}

/// Consume the next token, rejecting lex errors.
fn take(input: &mut TokenStream) -> Result<(Token, Position), ParseError> {
    let (token, pos) = input.next().expect(NEVER_ENDS);
    match token {
        Token::LexError(err) => Err(err.into_err(pos)),
        token => Ok((token, pos)),
    }
}

/// Consume the next token and require it to equal `expected`.
fn eat_expect(
    input: &mut TokenStream,
    expected: Token,
    desc: &str,
) -> Result<Position, ParseError> {
    let (token, pos) = take(input)?;
    if token == expected {
        Ok(pos)
    } else if token == Token::EOF {
        Err(PERR::UnexpectedEOF(desc.into()).into_err(pos))
    } else {
        Err(PERR::Expected(desc.into(), token.syntax().into()).into_err(pos))
    }
}

/// Consume the next token if it equals `token`.
fn eat_if(input: &mut TokenStream, token: &Token) -> bool {
    if peek(input).0 == token {
        input.next();
        true
    } else {
        false
    }
}

/// Consume the next token and require it to be an identifier.
fn parse_ident(input: &mut TokenStream) -> Result<Ident, ParseError> {
    let (token, pos) = take(input)?;
    match token {
        Token::Identifier(name) => Ok(Ident { name, pos }),
        Token::EOF => Err(PERR::UnexpectedEOF("identifier".into()).into_err(pos)),
        token => Err(PERR::Expected("identifier".into(), token.syntax().into()).into_err(pos)),
    }
}

/// Does this token terminate a statement block?
const fn is_block_end(token: &Token) -> bool {
    matches!(
        token,
        Token::End | Token::Else | Token::ElseIf | Token::Until | Token::EOF
    )
}

/// Parse statements up to (but not consuming) a block terminator.
///
/// A `return` statement, if present, must be the last statement of the
/// block; the parser rejects anything else, which is what lets every pass
/// assume `return` only appears in block-tail position.
fn parse_block_body(
    input: &mut TokenStream,
    settings: ParseSettings,
    pos: Position,
) -> Result<StmtBlock, ParseError> {
    let mut stmts = StaticVec::new();
    loop {
        while eat_if(input, &Token::SemiColon) {}
        let (token, ..) = peek(input);
        if is_block_end(token) {
            break;
        }
        if matches!(token, Token::Return) {
            stmts.push(parse_return(input, settings)?);
            while eat_if(input, &Token::SemiColon) {}
            let (token, token_pos) = peek(input);
            if !is_block_end(token) {
                return Err(PERR::Expected(
                    "end of block after 'return'".into(),
                    token.syntax().into(),
                )
                .into_err(token_pos));
            }
            break;
        }
        stmts.push(parse_stmt(input, settings)?);
    }
    Ok(StmtBlock { stmts, pos })
}

/// Parse a single statement.  Dispatch is keyword-directed; the fallback is
/// "expression statement or assignment", resolved by a bounded peek after
/// parsing a prefix expression.
fn parse_stmt(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (token, pos) = peek(input);
    let settings = settings.level_up(pos)?;

    match token {
        Token::If => parse_if(input, settings),
        Token::While => parse_while(input, settings),
        Token::Do => {
            let (.., pos) = take(input)?;
            let body = parse_block_body(input, settings, pos)?;
            eat_expect(input, Token::End, "'end' to close 'do' block")?;
            Ok(Stmt::Block(Box::new(body), pos))
        }
        Token::For => parse_for(input, settings),
        Token::Repeat => parse_repeat(input, settings),
        Token::Function => parse_fn_decl(input, settings),
        Token::Local => parse_local(input, settings),
        Token::Break => {
            let (.., pos) = take(input)?;
            if !settings.in_loop {
                return Err(PERR::BreakOutsideLoop.into_err(pos));
            }
            Ok(Stmt::Break(pos))
        }
        Token::Goto => {
            let (.., pos) = take(input)?;
            let label = parse_ident(input)?;
            Ok(Stmt::Goto(label, pos))
        }
        Token::DoubleColon => {
            let (.., pos) = take(input)?;
            let label = parse_ident(input)?;
            eat_expect(input, Token::DoubleColon, "'::' to close label")?;
            Ok(Stmt::Label(label, pos))
        }
        Token::EOF => Err(PERR::UnexpectedEOF("statement".into()).into_err(pos)),
        Token::LexError(..) => take(input).map(|_| unreachable!("lex error is rejected")),
        _ => parse_expr_stmt(input, settings),
    }
}

/// Parse `if cond then ... [elseif cond then ...]* [else ...] end`.
fn parse_if(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (.., pos) = take(input)?;
    let mut branches = StaticVec::new();
    let mut else_body = None;

    loop {
        let cond = parse_expr(input, settings)?;
        let body_pos = eat_expect(input, Token::Then, "'then' after 'if' condition")?;
        let body = parse_block_body(input, settings, body_pos)?;
        branches.push((cond, body));

        let (token, token_pos) = take(input)?;
        match token {
            Token::ElseIf => continue,
            Token::Else => {
                else_body = Some(parse_block_body(input, settings, token_pos)?);
                eat_expect(input, Token::End, "'end' to close 'if' statement")?;
                break;
            }
            Token::End => break,
            Token::EOF => {
                return Err(PERR::UnexpectedEOF("'end' to close 'if' statement".into())
                    .into_err(token_pos))
            }
            token => {
                return Err(PERR::Expected(
                    "'elseif', 'else' or 'end'".into(),
                    token.syntax().into(),
                )
                .into_err(token_pos))
            }
        }
    }

    Ok(Stmt::If(
        Box::new(IfStmt {
            branches,
            else_body,
        }),
        pos,
    ))
}

/// Parse `while cond do ... end`.
fn parse_while(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (.., pos) = take(input)?;
    let cond = parse_expr(input, settings)?;
    let body_pos = eat_expect(input, Token::Do, "'do' after 'while' condition")?;
    let body = parse_block_body(input, settings.looped(), body_pos)?;
    eat_expect(input, Token::End, "'end' to close 'while' loop")?;
    Ok(Stmt::While(Box::new(WhileStmt { cond, body }), pos))
}

/// Parse `repeat ... until cond`.
fn parse_repeat(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (.., pos) = take(input)?;
    let body = parse_block_body(input, settings.looped(), pos)?;
    eat_expect(input, Token::Until, "'until' to close 'repeat' loop")?;
    let cond = parse_expr(input, settings)?;
    Ok(Stmt::Repeat(Box::new(RepeatStmt { body, cond }), pos))
}

/// Parse a numeric or generic `for` loop.
fn parse_for(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (.., pos) = take(input)?;
    let first = parse_ident(input)?;

    if eat_if(input, &Token::Equals) {
        let start = parse_expr(input, settings)?;
        eat_expect(input, Token::Comma, "',' after 'for' start value")?;
        let limit = parse_expr(input, settings)?;
        let step = if eat_if(input, &Token::Comma) {
            Some(parse_expr(input, settings)?)
        } else {
            None
        };
        let body_pos = eat_expect(input, Token::Do, "'do' after 'for' header")?;
        let body = parse_block_body(input, settings.looped(), body_pos)?;
        eat_expect(input, Token::End, "'end' to close 'for' loop")?;
        return Ok(Stmt::NumericFor(
            Box::new(NumericForStmt {
                var: first,
                start,
                limit,
                step,
                body,
            }),
            pos,
        ));
    }

    let mut vars: StaticVec<Ident> = StaticVec::new();
    vars.push(first);
    while eat_if(input, &Token::Comma) {
        vars.push(parse_ident(input)?);
    }
    eat_expect(input, Token::In, "'in' after 'for' variables")?;
    let mut exprs = StaticVec::new();
    exprs.push(parse_expr(input, settings)?);
    while eat_if(input, &Token::Comma) {
        exprs.push(parse_expr(input, settings)?);
    }
    let body_pos = eat_expect(input, Token::Do, "'do' after 'for' header")?;
    let body = parse_block_body(input, settings.looped(), body_pos)?;
    eat_expect(input, Token::End, "'end' to close 'for' loop")?;
    Ok(Stmt::GenericFor(
        Box::new(GenericForStmt { vars, exprs, body }),
        pos,
    ))
}

/// Parse `function name[.p]*[:m] (params) ... end`.
///
/// A method definition is desugared on the spot into the dot form with an
/// explicit leading `self` parameter, so downstream passes see one shape.
fn parse_fn_decl(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (.., pos) = take(input)?;
    let root = parse_ident(input)?;
    let mut path = StaticVec::new();
    while eat_if(input, &Token::Period) {
        path.push(parse_ident(input)?);
    }
    let is_method = eat_if(input, &Token::Colon);
    if is_method {
        path.push(parse_ident(input)?);
    }
    let mut func = parse_fn_body(input, settings, pos)?;
    if is_method {
        func.params.insert(0, Ident::new("self", Position::NONE));
    }
    Ok(Stmt::FnDecl(
        Box::new(FnDeclStmt {
            name: FnName { root, path },
            func,
            is_local: false,
        }),
        pos,
    ))
}

/// Parse `local function name() ... end` or `local names [= values]`.
fn parse_local(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (.., pos) = take(input)?;

    if eat_if(input, &Token::Function) {
        let name = parse_ident(input)?;
        let func = parse_fn_body(input, settings, pos)?;
        return Ok(Stmt::FnDecl(
            Box::new(FnDeclStmt {
                name: FnName {
                    root: name,
                    path: StaticVec::new(),
                },
                func,
                is_local: true,
            }),
            pos,
        ));
    }

    let mut names = StaticVec::new();
    names.push(parse_ident(input)?);
    while eat_if(input, &Token::Comma) {
        names.push(parse_ident(input)?);
    }
    let mut values = StaticVec::new();
    if eat_if(input, &Token::Equals) {
        values.push(parse_expr(input, settings)?);
        while eat_if(input, &Token::Comma) {
            values.push(parse_expr(input, settings)?);
        }
    }
    Ok(Stmt::Local(Box::new(LocalStmt { names, values }), pos))
}

/// Parse a parameter list and function body (the name, if any, is already
/// consumed).
fn parse_fn_body(
    input: &mut TokenStream,
    settings: ParseSettings,
    pos: Position,
) -> Result<FnExpr, ParseError> {
    let settings = settings.level_up(pos)?.fn_body();
    eat_expect(input, Token::LeftParen, "'(' to start parameter list")?;
    let mut params = StaticVec::new();
    let mut is_vararg = false;
    if !eat_if(input, &Token::RightParen) {
        loop {
            let (token, token_pos) = take(input)?;
            match token {
                Token::Identifier(name) => params.push(Ident {
                    name,
                    pos: token_pos,
                }),
                Token::Ellipsis => {
                    is_vararg = true;
                    eat_expect(input, Token::RightParen, "')' after '...'")?;
                    break;
                }
                Token::EOF => {
                    return Err(PERR::UnexpectedEOF("parameter name".into()).into_err(token_pos))
                }
                token => {
                    return Err(PERR::Expected(
                        "parameter name or '...'".into(),
                        token.syntax().into(),
                    )
                    .into_err(token_pos))
                }
            }
            if !eat_if(input, &Token::Comma) {
                eat_expect(input, Token::RightParen, "')' to close parameter list")?;
                break;
            }
        }
    }
    let body = parse_block_body(input, settings, pos)?;
    eat_expect(input, Token::End, "'end' to close function body")?;
    Ok(FnExpr {
        params,
        is_vararg,
        body,
    })
}

/// Parse `return [exprs]`; the caller enforces tail position.
fn parse_return(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let (.., pos) = take(input)?;
    let mut exprs = StaticVec::new();
    let (token, ..) = peek(input);
    if !is_block_end(token) && !matches!(token, Token::SemiColon) {
        exprs.push(parse_expr(input, settings)?);
        while eat_if(input, &Token::Comma) {
            exprs.push(parse_expr(input, settings)?);
        }
    }
    Ok(Stmt::Return(exprs, pos))
}

/// Parse the statement fallback: an assignment or a call statement.
fn parse_expr_stmt(input: &mut TokenStream, settings: ParseSettings) -> Result<Stmt, ParseError> {
    let first = parse_suffixed_expr(input, settings)?;
    let pos = first.position();

    let (token, token_pos) = peek(input);
    if matches!(token, Token::Equals | Token::Comma) {
        let mut targets: StaticVec<Expr> = StaticVec::new();
        targets.push(first);
        while eat_if(input, &Token::Comma) {
            targets.push(parse_suffixed_expr(input, settings)?);
        }
        for target in &targets {
            if !target.is_lvalue() {
                return Err(PERR::Expected(
                    "assignable expression".into(),
                    "expression".into(),
                )
                .into_err(target.position()));
            }
        }
        eat_expect(input, Token::Equals, "'=' in assignment")?;
        let mut values = StaticVec::new();
        values.push(parse_expr(input, settings)?);
        while eat_if(input, &Token::Comma) {
            values.push(parse_expr(input, settings)?);
        }
        return Ok(Stmt::Assign(Box::new(AssignStmt { targets, values }), pos));
    }

    match first {
        Expr::Call(..) | Expr::MethodCall(..) => Ok(Stmt::Expr(first)),
        _ => Err(
            PERR::Expected("'=' or call arguments".into(), token.syntax().into())
                .into_err(token_pos),
        ),
    }
}

/// Map a binary-operator token to its [`BinaryOp`].
const fn binary_op(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::Or => BinaryOp::Or,
        Token::And => BinaryOp::And,
        Token::LessThan => BinaryOp::Less,
        Token::LessThanEqualsTo => BinaryOp::LessEq,
        Token::GreaterThan => BinaryOp::Greater,
        Token::GreaterThanEqualsTo => BinaryOp::GreaterEq,
        Token::NotEqualsTo => BinaryOp::NotEq,
        Token::EqualsTo => BinaryOp::Eq,
        Token::Pipe => BinaryOp::BitOr,
        Token::Tilde => BinaryOp::BitXor,
        Token::Ampersand => BinaryOp::BitAnd,
        Token::LeftShift => BinaryOp::Shl,
        Token::RightShift => BinaryOp::Shr,
        Token::Concat => BinaryOp::Concat,
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Multiply => BinaryOp::Mul,
        Token::Divide => BinaryOp::Div,
        Token::FloorDivide => BinaryOp::IDiv,
        Token::Modulo => BinaryOp::Mod,
        Token::PowerOf => BinaryOp::Pow,
        _ => return None,
    })
}

/// Parse an expression.
fn parse_expr(input: &mut TokenStream, settings: ParseSettings) -> Result<Expr, ParseError> {
    let settings = settings.level_up(peek(input).1)?;
    let lhs = parse_unary(input, settings)?;
    parse_binary_op(input, settings, None, lhs)
}

/// Precedence climbing over binary operators: bind left to the parent
/// expression unless the incoming operator binds stronger (or equally, for
/// right-associative operators).
fn parse_binary_op(
    input: &mut TokenStream,
    settings: ParseSettings,
    parent_precedence: Option<Precedence>,
    lhs: Expr,
) -> Result<Expr, ParseError> {
    let mut root = lhs;

    loop {
        let (current_op, ..) = peek(input);
        let precedence = current_op.precedence();
        let bind_right = current_op.is_bind_right();

        // Bind to the parent if the incoming operator is weaker; on a tie,
        // left-associative operators also yield.
        if precedence < parent_precedence
            || (precedence == parent_precedence && !bind_right)
        {
            return Ok(root);
        }

        let (op_token, pos) = take(input)?;
        let rhs = parse_unary(input, settings)?;

        let (next_op, ..) = peek(input);
        let next_precedence = next_op.precedence();

        // Bind to the right if the next operator is stronger, or equally
        // strong and right-associative.
        let rhs = if (precedence == next_precedence && bind_right)
            || precedence < next_precedence
        {
            parse_binary_op(input, settings.level_up(pos)?, precedence, rhs)?
        } else {
            rhs
        };

        let op = match binary_op(&op_token) {
            Some(op) => op,
            None => unreachable!("token has a precedence, so it maps to an operator"),
        };
        root = Expr::Binary(
            Box::new(BinaryExpr {
                op,
                lhs: root,
                rhs,
            }),
            pos,
        );
    }
}

/// Parse a unary expression.
///
/// The operand binds tighter than any binary operator except `^`, which the
/// dialect lets reach inside (`-x^2` is `-(x^2)`).
fn parse_unary(input: &mut TokenStream, settings: ParseSettings) -> Result<Expr, ParseError> {
    let (token, pos) = peek(input);
    let op = match token {
        Token::Minus => UnaryOp::Neg,
        Token::Not => UnaryOp::Not,
        Token::Hash => UnaryOp::Len,
        Token::Tilde => UnaryOp::BitNot,
        _ => return parse_suffixed_expr(input, settings),
    };
    take(input)?;
    let settings = settings.level_up(pos)?;
    let operand = {
        let lhs = parse_unary(input, settings)?;
        parse_binary_op(input, settings, Some(Precedence::UNARY), lhs)?
    };
    Ok(Expr::Unary(op, Box::new(operand), pos))
}

/// Parse a primary expression followed by any number of suffixes:
/// member access, indexing, calls, and method calls.
fn parse_suffixed_expr(
    input: &mut TokenStream,
    settings: ParseSettings,
) -> Result<Expr, ParseError> {
    let primary = parse_primary(input, settings)?;
    parse_suffixes(input, settings, primary)
}

/// Apply call/index/member suffixes to an already-parsed primary.
fn parse_suffixes(
    input: &mut TokenStream,
    settings: ParseSettings,
    mut expr: Expr,
) -> Result<Expr, ParseError> {
    loop {
        let (token, pos) = peek(input);
        let is_suffix = matches!(
            token,
            Token::Period
                | Token::LeftBracket
                | Token::Colon
                | Token::LeftParen
                | Token::LeftBrace
                | Token::StringConstant(..)
        );
        if !is_suffix {
            return Ok(expr);
        }
        // Only prefix expressions may be called or indexed.
        if !expr.is_prefix_expr() {
            return Err(
                PERR::Expected("statement separator".into(), token.syntax().into())
                    .into_err(pos),
            );
        }

        match take(input)? {
            (Token::Period, pos) => {
                let member = parse_ident(input)?;
                expr = Expr::Member(
                    Box::new(MemberAccess { obj: expr, member }),
                    pos,
                );
            }
            (Token::LeftBracket, pos) => {
                let index = parse_expr(input, settings)?;
                eat_expect(input, Token::RightBracket, "']' to close index")?;
                expr = Expr::Index(Box::new(IndexAccess { obj: expr, index }), pos);
            }
            (Token::Colon, pos) => {
                let method = parse_ident(input)?;
                let args = parse_call_args(input, settings, "method arguments")?;
                expr = Expr::MethodCall(
                    Box::new(MethodCallExpr {
                        obj: expr,
                        method,
                        args,
                    }),
                    pos,
                );
            }
            (Token::LeftParen, pos) => {
                let mut args = StaticVec::new();
                if !eat_if(input, &Token::RightParen) {
                    args.push(parse_expr(input, settings)?);
                    while eat_if(input, &Token::Comma) {
                        args.push(parse_expr(input, settings)?);
                    }
                    eat_expect(input, Token::RightParen, "')' to close call arguments")?;
                }
                expr = Expr::Call(Box::new(FnCallExpr { callee: expr, args }), pos);
            }
            (Token::StringConstant(bytes), pos) => {
                let mut args = StaticVec::new();
                args.push(Expr::StringConstant(bytes, pos));
                expr = Expr::Call(Box::new(FnCallExpr { callee: expr, args }), pos);
            }
            (Token::LeftBrace, pos) => {
                let table = parse_table(input, settings, pos)?;
                let mut args = StaticVec::new();
                args.push(table);
                expr = Expr::Call(Box::new(FnCallExpr { callee: expr, args }), pos);
            }
            _ => unreachable!("suffix token was peeked"),
        }
    }
}

/// Parse the argument list of a call or method call.
fn parse_call_args(
    input: &mut TokenStream,
    settings: ParseSettings,
    desc: &str,
) -> Result<StaticVec<Expr>, ParseError> {
    let mut args = StaticVec::new();
    match take(input)? {
        (Token::LeftParen, ..) => {
            if !eat_if(input, &Token::RightParen) {
                args.push(parse_expr(input, settings)?);
                while eat_if(input, &Token::Comma) {
                    args.push(parse_expr(input, settings)?);
                }
                eat_expect(input, Token::RightParen, "')' to close call arguments")?;
            }
        }
        (Token::StringConstant(bytes), pos) => args.push(Expr::StringConstant(bytes, pos)),
        (Token::LeftBrace, pos) => args.push(parse_table(input, settings, pos)?),
        (Token::EOF, pos) => return Err(PERR::UnexpectedEOF(desc.into()).into_err(pos)),
        (token, pos) => {
            return Err(PERR::Expected(desc.into(), token.syntax().into()).into_err(pos))
        }
    }
    Ok(args)
}

/// Parse a primary expression.
fn parse_primary(input: &mut TokenStream, settings: ParseSettings) -> Result<Expr, ParseError> {
    let (token, pos) = take(input)?;
    Ok(match token {
        Token::Nil => Expr::Nil(pos),
        Token::True => Expr::BoolConstant(true, pos),
        Token::False => Expr::BoolConstant(false, pos),
        Token::IntegerConstant(i) => Expr::IntegerConstant(i, pos),
        Token::FloatConstant(f) => Expr::FloatConstant(f, pos),
        Token::StringConstant(bytes) => Expr::StringConstant(bytes, pos),
        Token::Ellipsis => Expr::Vararg(pos),
        Token::Identifier(name) => Expr::Variable(Ident { name, pos }),
        Token::LeftParen => {
            let inner = parse_expr(input, settings)?;
            eat_expect(input, Token::RightParen, "')' to close expression")?;
            match inner {
                // Parentheses are transparent only around a single-valued
                // prefix expression; dropping them anywhere else would
                // either lose multi-value truncation (calls, `...`) or make
                // the result uncallable (`(f or g)()`).
                Expr::Variable(..) | Expr::Member(..) | Expr::Index(..) | Expr::Paren(..) => {
                    inner
                }
                inner => Expr::Paren(Box::new(inner), pos),
            }
        }
        Token::LeftBrace => parse_table(input, settings, pos)?,
        Token::Function => {
            let func = parse_fn_body(input, settings, pos)?;
            Expr::Function(Box::new(func), pos)
        }
        Token::EOF => return Err(PERR::UnexpectedEOF("expression".into()).into_err(pos)),
        token => {
            return Err(PERR::Expected("expression".into(), token.syntax().into()).into_err(pos))
        }
    })
}

/// Parse a table constructor; the opening `{` is already consumed.
fn parse_table(
    input: &mut TokenStream,
    settings: ParseSettings,
    pos: Position,
) -> Result<Expr, ParseError> {
    let settings = settings.level_up(pos)?;
    let mut fields = StaticVec::new();

    loop {
        if eat_if(input, &Token::RightBrace) {
            break;
        }
        let (token, ..) = peek(input);
        match token {
            Token::LeftBracket => {
                take(input)?;
                let key = parse_expr(input, settings)?;
                eat_expect(input, Token::RightBracket, "']' to close table key")?;
                eat_expect(input, Token::Equals, "'=' after table key")?;
                let value = parse_expr(input, settings)?;
                fields.push(TableField::Indexed(key, value));
            }
            Token::Identifier(..) => {
                // `name = value` needs a two-token peek: consume the name,
                // then decide whether it was a field name or the start of an
                // expression.
                let ident = parse_ident(input)?;
                if eat_if(input, &Token::Equals) {
                    let value = parse_expr(input, settings)?;
                    fields.push(TableField::Named(ident, value));
                } else {
                    let lhs = parse_suffixes(input, settings, Expr::Variable(ident))?;
                    let value = parse_binary_op(input, settings, None, lhs)?;
                    fields.push(TableField::Item(value));
                }
            }
            _ => {
                let value = parse_expr(input, settings)?;
                fields.push(TableField::Item(value));
            }
        }
        let (token, token_pos) = peek(input);
        match token {
            Token::Comma | Token::SemiColon => {
                take(input)?;
            }
            Token::RightBrace => {}
            Token::EOF => {
                return Err(
                    PERR::UnexpectedEOF("'}' to close table constructor".into())
                        .into_err(token_pos),
                )
            }
            token => {
                return Err(PERR::Expected(
                    "',', ';' or '}' in table constructor".into(),
                    token.syntax().into(),
                )
                .into_err(token_pos))
            }
        }
    }

    Ok(Expr::Table(Box::new(TableLit { fields }), pos))
}
