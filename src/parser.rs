use std::rc::Rc;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::ast::{Block, Expr, Program, Stmt};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Binding powers, low to high. The Pratt loop keeps consuming while the
/// peek token binds tighter than the calling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    OpAssign,
    Assign,
    LogicalOr,
    LogicalAnd,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
    Modulus,
    Pow,
    Bitwise,
    Postfix,
    Dot,
    Import,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt | TokenKind::Le | TokenKind::Ge => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Slash | TokenKind::Asterisk => Precedence::Product,
        TokenKind::Modulus => Precedence::Modulus,
        TokenKind::Pow => Precedence::Pow,
        TokenKind::Increment | TokenKind::Decrement => Precedence::Postfix,
        TokenKind::And | TokenKind::Or | TokenKind::Xor | TokenKind::Shl | TokenKind::Shr => {
            Precedence::Bitwise
        }
        TokenKind::Assign => Precedence::Assign,
        TokenKind::Lparen => Precedence::Call,
        TokenKind::Lbracket => Precedence::Index,
        TokenKind::PlusAssign
        | TokenKind::MinusAssign
        | TokenKind::AsteriskAssign
        | TokenKind::SlashAssign
        | TokenKind::ModulusAssign
        | TokenKind::AndAssign
        | TokenKind::OrAssign
        | TokenKind::XorAssign
        | TokenKind::ShlAssign
        | TokenKind::ShrAssign
        | TokenKind::PowAssign => Precedence::OpAssign,
        TokenKind::AndAnd => Precedence::LogicalAnd,
        TokenKind::OrOr => Precedence::LogicalOr,
        TokenKind::Dot => Precedence::Dot,
        TokenKind::Import => Precedence::Import,
        _ => Precedence::Lowest,
    }
}

// Token kinds that can continue an expression from infix position
fn has_infix(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Slash
            | TokenKind::Asterisk
            | TokenKind::Eq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::Le
            | TokenKind::Ge
            | TokenKind::Modulus
            | TokenKind::Pow
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::Xor
            | TokenKind::Shl
            | TokenKind::Shr
            | TokenKind::AndAnd
            | TokenKind::OrOr
            | TokenKind::Lparen
            | TokenKind::Lbracket
            | TokenKind::Increment
            | TokenKind::Decrement
            | TokenKind::Dot
            | TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::AsteriskAssign
            | TokenKind::SlashAssign
            | TokenKind::ModulusAssign
            | TokenKind::AndAssign
            | TokenKind::OrAssign
            | TokenKind::XorAssign
            | TokenKind::ShlAssign
            | TokenKind::ShrAssign
            | TokenKind::PowAssign
    )
}

// `x op= e` desugars to `x = x op e` at parse time
fn compound_base(op: &str) -> Option<&'static str> {
    match op {
        "+=" => Some("+"),
        "-=" => Some("-"),
        "*=" => Some("*"),
        "/=" => Some("/"),
        "%=" => Some("%"),
        "&=" => Some("&"),
        "|=" => Some("|"),
        "^=" => Some("^"),
        "<<=" => Some("<<"),
        ">>=" => Some(">>"),
        "**=" => Some("**"),
        _ => None,
    }
}

/// Pratt parser over the token stream with two tokens of lookahead.
/// Errors accumulate as strings; callers must check `errors()` before
/// evaluating the returned program.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    cur_token: Token,
    peek_token: Token,
    errors: Vec<String>,
}

impl<'src> Parser<'src> {
    pub fn new(lexer: Lexer<'src>) -> Parser<'src> {
        let mut parser = Parser {
            lexer,
            cur_token: Token::eof(),
            peek_token: Token::eof(),
            errors: Vec::new(),
        };
        // Prime cur_token and peek_token
        parser.next_token();
        parser.next_token();
        parser
    }

    pub fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();
        while !self.cur_is(TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.next_token();
        }
        Program { statements }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn next_token(&mut self) {
        self.cur_token = std::mem::replace(&mut self.peek_token, self.lexer.next_token());
    }

    fn cur_is(&self, kind: TokenKind) -> bool {
        self.cur_token.kind == kind
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek_token.kind == kind
    }

    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.next_token();
            true
        } else {
            self.errors.push(format!(
                "expected next token to be {}, got {} instead",
                kind, self.peek_token.kind
            ));
            false
        }
    }

    fn peek_precedence(&self) -> Precedence {
        precedence_of(self.peek_token.kind)
    }

    fn cur_precedence(&self) -> Precedence {
        precedence_of(self.cur_token.kind)
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.cur_token.kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Const => self.parse_const_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Break => self.parse_break_statement(),
            TokenKind::Continue => self.parse_continue_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Option<Stmt> {
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur_token.literal.clone();
        if !self.expect_peek(TokenKind::Assign) {
            return None;
        }
        self.next_token();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.eat_optional_semicolon();
        Some(Stmt::Let { name, value })
    }

    fn parse_const_statement(&mut self) -> Option<Stmt> {
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur_token.literal.clone();
        if !self.expect_peek(TokenKind::Assign) {
            return None;
        }
        self.next_token();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.eat_optional_semicolon();
        Some(Stmt::Const { name, value })
    }

    fn parse_return_statement(&mut self) -> Option<Stmt> {
        self.next_token();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.eat_optional_semicolon();
        Some(Stmt::Return(value))
    }

    fn parse_while_statement(&mut self) -> Option<Stmt> {
        self.next_token();
        let cond = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::Lbrace) {
            return None;
        }
        let body = self.parse_block();
        Some(Stmt::While { cond, body })
    }

    // `for (init?; cond?; post?) { body }` with every clause optional
    fn parse_for_statement(&mut self) -> Option<Stmt> {
        if !self.expect_peek(TokenKind::Lparen) {
            return None;
        }
        self.next_token();

        let init = if self.cur_is(TokenKind::Semicolon) {
            None
        } else {
            // The statement parser consumes the trailing ';' itself
            Some(Box::new(self.parse_statement()?))
        };
        self.next_token();

        let cond = if self.cur_is(TokenKind::Semicolon) {
            None
        } else {
            let cond = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::Semicolon) {
                return None;
            }
            Some(cond)
        };
        self.next_token();

        let post = if self.cur_is(TokenKind::Rparen) {
            None
        } else {
            let post = Some(Box::new(self.parse_statement()?));
            if !self.expect_peek(TokenKind::Rparen) {
                return None;
            }
            post
        };

        if !self.expect_peek(TokenKind::Lbrace) {
            return None;
        }
        let body = self.parse_block();
        Some(Stmt::For {
            init,
            cond,
            post,
            body,
        })
    }

    fn parse_break_statement(&mut self) -> Option<Stmt> {
        self.eat_optional_semicolon();
        Some(Stmt::Break)
    }

    fn parse_continue_statement(&mut self) -> Option<Stmt> {
        self.eat_optional_semicolon();
        Some(Stmt::Continue)
    }

    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        self.eat_optional_semicolon();
        Some(Stmt::Expr(expr))
    }

    fn eat_optional_semicolon(&mut self) {
        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(TokenKind::Semicolon) && precedence < self.peek_precedence() {
            // Plain `=` has no infix handler; an identifier followed by `=`
            // turns everything parsed so far into the assignment target.
            // Targets other than identifiers and dot accesses are rejected
            // at evaluation time.
            if self.cur_is(TokenKind::Ident) && self.peek_is(TokenKind::Assign) {
                return self.parse_assignment(left);
            }
            if !has_infix(self.peek_token.kind) {
                return Some(left);
            }
            self.next_token();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        match self.cur_token.kind {
            TokenKind::Ident => Some(Expr::Ident(self.cur_token.literal.clone())),
            TokenKind::Int => self.parse_integer_literal(),
            TokenKind::Float => self.parse_float_literal(),
            TokenKind::Str => Some(Expr::Str(self.cur_token.literal.clone())),
            TokenKind::True => Some(Expr::Bool(true)),
            TokenKind::False => Some(Expr::Bool(false)),
            TokenKind::Bang
            | TokenKind::Minus
            | TokenKind::Tilde
            | TokenKind::Increment
            | TokenKind::Decrement => self.parse_prefix_expression(),
            TokenKind::Lparen => self.parse_grouped_expression(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Function => self.parse_function_literal(),
            TokenKind::Lbracket => {
                let elements = self.parse_expression_list(TokenKind::Rbracket)?;
                Some(Expr::Array(elements))
            }
            TokenKind::Lbrace => self.parse_hash_literal(),
            TokenKind::Import => self.parse_import_expression(),
            TokenKind::Dot => self.parse_quick_float_literal(),
            kind => {
                self.errors
                    .push(format!("no prefix parse function for {} found", kind));
                None
            }
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Option<Expr> {
        match self.cur_token.kind {
            TokenKind::Lparen => self.parse_call_expression(left),
            TokenKind::Lbracket => self.parse_index_expression(left),
            TokenKind::Dot => self.parse_dot_expression(left),
            TokenKind::Increment | TokenKind::Decrement => Some(Expr::Postfix {
                op: self.cur_token.literal.clone(),
                left: Box::new(left),
            }),
            _ => self.parse_infix_expression(left),
        }
    }

    fn parse_integer_literal(&mut self) -> Option<Expr> {
        let literal = &self.cur_token.literal;
        if let Ok(value) = literal.parse::<BigInt>() {
            return Some(Expr::Int(value));
        }
        // Scientific notation slips through as a float
        if let Ok(value) = BigDecimal::from_str(literal) {
            return Some(Expr::Float(value));
        }
        self.errors
            .push(format!("could not parse {:?} as integer or float", literal));
        None
    }

    fn parse_float_literal(&mut self) -> Option<Expr> {
        let literal = self.cur_token.literal.clone();
        // Tolerate the `.5` and `5.` spellings the lexer lets through
        let mut normalized = literal.clone();
        if normalized.starts_with('.') {
            normalized.insert(0, '0');
        }
        if normalized.ends_with('.') {
            normalized.push('0');
        }
        match BigDecimal::from_str(&normalized) {
            Ok(value) => Some(Expr::Float(value)),
            Err(_) => {
                self.errors
                    .push(format!("could not parse {:?} as float", literal));
                None
            }
        }
    }

    // A dot in prefix position starts a float from the following number
    // token: `. 5` reads as 0.5
    fn parse_quick_float_literal(&mut self) -> Option<Expr> {
        self.next_token();
        let literal = format!("0.{}", self.cur_token.literal);
        match BigDecimal::from_str(&literal) {
            Ok(value) => Some(Expr::Float(value)),
            Err(_) => {
                self.errors.push(format!(
                    "could not parse {:?} as float",
                    self.cur_token.literal
                ));
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self) -> Option<Expr> {
        let op = self.cur_token.literal.clone();
        self.next_token();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expr::Prefix {
            op,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expr) -> Option<Expr> {
        let op = self.cur_token.literal.clone();
        let precedence = self.cur_precedence();
        self.next_token();
        let right = self.parse_expression(precedence)?;

        if let Some(base) = compound_base(&op) {
            return Some(Expr::Assign {
                target: Box::new(left.clone()),
                value: Box::new(Expr::Infix {
                    op: base.to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                }),
            });
        }

        Some(Expr::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_assignment(&mut self, target: Expr) -> Option<Expr> {
        if !self.expect_peek(TokenKind::Assign) {
            return None;
        }
        self.next_token();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.eat_optional_semicolon();
        Some(Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.next_token();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::Rparen) {
            return None;
        }
        Some(expr)
    }

    fn parse_if_expression(&mut self) -> Option<Expr> {
        if !self.expect_peek(TokenKind::Lparen) {
            return None;
        }
        self.next_token();
        let cond = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::Rparen) {
            return None;
        }
        if !self.expect_peek(TokenKind::Lbrace) {
            return None;
        }
        let consequence = self.parse_block();

        let mut elifs = Vec::new();
        while self.peek_is(TokenKind::Elif) {
            self.next_token();
            if !self.expect_peek(TokenKind::Lparen) {
                return None;
            }
            self.next_token();
            let elif_cond = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::Rparen) {
                return None;
            }
            if !self.expect_peek(TokenKind::Lbrace) {
                return None;
            }
            elifs.push((elif_cond, self.parse_block()));
        }

        let alternative = if self.peek_is(TokenKind::Else) {
            self.next_token();
            if !self.expect_peek(TokenKind::Lbrace) {
                return None;
            }
            Some(self.parse_block())
        } else {
            None
        };

        Some(Expr::If {
            cond: Box::new(cond),
            consequence,
            elifs,
            alternative,
        })
    }

    fn parse_block(&mut self) -> Block {
        self.next_token();
        let mut statements = Vec::new();
        while !self.cur_is(TokenKind::Rbrace) && !self.cur_is(TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.next_token();
        }
        Block { statements }
    }

    fn parse_function_literal(&mut self) -> Option<Expr> {
        if !self.expect_peek(TokenKind::Lparen) {
            return None;
        }
        let parameters = self.parse_function_parameters()?;
        if !self.expect_peek(TokenKind::Lbrace) {
            return None;
        }
        let body = self.parse_block();
        Some(Expr::Function {
            parameters: Rc::new(parameters),
            body: Rc::new(body),
        })
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<String>> {
        let mut parameters = Vec::new();
        if self.peek_is(TokenKind::Rparen) {
            self.next_token();
            return Some(parameters);
        }

        self.next_token();
        parameters.push(self.cur_token.literal.clone());
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            parameters.push(self.cur_token.literal.clone());
        }

        if !self.expect_peek(TokenKind::Rparen) {
            return None;
        }
        Some(parameters)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let arguments = self.parse_expression_list(TokenKind::Rparen)?;
        Some(Expr::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expr>> {
        let mut list = Vec::new();
        if self.peek_is(end) {
            self.next_token();
            return Some(list);
        }

        self.next_token();
        list.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(end) {
            return None;
        }
        Some(list)
    }

    fn parse_index_expression(&mut self, left: Expr) -> Option<Expr> {
        self.next_token();
        let mut indices = vec![self.parse_expression(Precedence::Lowest)?];
        // `a[i, j]` keeps the whole index tuple
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            indices.push(self.parse_expression(Precedence::Lowest)?);
        }
        if !self.expect_peek(TokenKind::Rbracket) {
            return None;
        }
        Some(Expr::Index {
            left: Box::new(left),
            indices,
        })
    }

    fn parse_hash_literal(&mut self) -> Option<Expr> {
        let mut pairs = Vec::new();
        while !self.peek_is(TokenKind::Rbrace) {
            self.next_token();
            let key = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }
            self.next_token();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if !self.peek_is(TokenKind::Rbrace) && !self.expect_peek(TokenKind::Comma) {
                return None;
            }
        }
        if !self.expect_peek(TokenKind::Rbrace) {
            return None;
        }
        Some(Expr::Hash(pairs))
    }

    fn parse_dot_expression(&mut self, left: Expr) -> Option<Expr> {
        self.next_token();
        if !self.cur_is(TokenKind::Ident) {
            self.errors.push(format!(
                "expected property name to be identifier, got {} instead",
                self.cur_token.kind
            ));
            return None;
        }
        Some(Expr::Dot {
            left: Box::new(left),
            property: self.cur_token.literal.clone(),
        })
    }

    fn parse_import_expression(&mut self) -> Option<Expr> {
        if !self.expect_peek(TokenKind::Lparen) {
            return None;
        }
        self.next_token();
        let path = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::Rparen) {
            return None;
        }
        Some(Expr::Import(Box::new(path)))
    }
}

/// Parse a whole source string, returning the program or the accumulated
/// parser errors.
pub fn parse_source(source: &str) -> Result<Program, Vec<String>> {
    let mut parser = Parser::new(Lexer::new(source));
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}
