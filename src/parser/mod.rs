//! Parser transforming tokens into an AST.
//!
//! Errors are collected rather than returned at the first failure, so a
//! single parse reports everything it can. Two pieces of sugar are expanded
//! here: `{k v ...}` becomes `(dict k v ...)` and `'(a b ...)` becomes
//! `(list a b ...)`.

use crate::ast::{Expr, Program, SExpression};
use crate::error::ParserError;
use crate::lexer::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<ParserError>,
}

impl Parser {
    /// Create a parser over a scanned token stream. The stream must end
    /// with an EOF token, which `Scanner::scan_tokens` guarantees.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream into a program.
    pub fn parse(mut self) -> Result<Program, Vec<ParserError>> {
        let mut expressions = Vec::new();

        while self.current().kind != TokenKind::Eof {
            if let Some(expr) = self.parse_expression() {
                expressions.push(expr);
            }
        }

        if self.errors.is_empty() {
            Ok(Program { expressions })
        } else {
            Err(self.errors)
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    /// Parse one expression. On error, records the diagnostic and returns
    /// None after advancing past the offending token.
    fn parse_expression(&mut self) -> Option<Expr> {
        let token = self.current().clone();

        match token.kind {
            TokenKind::IntLiteral(value) => {
                self.advance();
                Some(Expr::Integer(value))
            }
            TokenKind::FloatLiteral(value) => {
                self.advance();
                Some(Expr::Float(value))
            }
            TokenKind::StringLiteral(value) => {
                self.advance();
                Some(Expr::Str(value))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Some(Expr::Identifier(name))
            }
            TokenKind::LeftParen => self.parse_sexpression(),
            TokenKind::LeftBrace => self.parse_dict_literal(),
            TokenKind::Quote => self.parse_quote_expression(),
            TokenKind::Eof => None,
            _ => {
                self.errors.push(ParserError::UnexpectedToken {
                    found: token.kind.to_string(),
                    span: token.span,
                });
                self.advance();
                None
            }
        }
    }

    /// Parse `(head args...)`. `()` yields an S-expression with no head.
    fn parse_sexpression(&mut self) -> Option<Expr> {
        self.advance(); // (

        let mut sexpr = SExpression::default();

        if self.current().kind == TokenKind::RightParen {
            self.advance();
            return Some(Expr::SExpr(sexpr));
        }

        sexpr.head = self.parse_expression().map(Box::new);
        sexpr.args = self.parse_until(TokenKind::RightParen, ')')?;

        Some(Expr::SExpr(sexpr))
    }

    /// Parse `{k v ...}` into `(dict k v ...)`.
    fn parse_dict_literal(&mut self) -> Option<Expr> {
        self.advance(); // {

        let mut sexpr = SExpression::default();
        sexpr.head = Some(Box::new(Expr::Identifier("dict".to_string())));
        sexpr.args = self.parse_until(TokenKind::RightBrace, '}')?;

        Some(Expr::SExpr(sexpr))
    }

    /// Parse `'(a b ...)` into `(list a b ...)`.
    fn parse_quote_expression(&mut self) -> Option<Expr> {
        let quote_span = self.current().span;
        self.advance(); // '

        if self.current().kind != TokenKind::LeftParen {
            self.errors.push(ParserError::BadQuote(quote_span));
            return None;
        }
        self.advance(); // (

        let mut sexpr = SExpression::default();
        sexpr.head = Some(Box::new(Expr::Identifier("list".to_string())));
        sexpr.args = self.parse_until(TokenKind::RightParen, ')')?;

        Some(Expr::SExpr(sexpr))
    }

    /// Collect expressions until the closing token, consuming it.
    fn parse_until(&mut self, closing: TokenKind, closing_char: char) -> Option<Vec<Expr>> {
        let mut args = Vec::new();

        while self.current().kind != closing {
            if self.current().kind == TokenKind::Eof {
                self.errors.push(ParserError::UnexpectedEof {
                    expected: closing_char,
                });
                return None;
            }

            if let Some(expr) = self.parse_expression() {
                args.push(expr);
            }
        }

        self.advance(); // closing token
        Some(args)
    }
}

/// Scan and parse source text in one step.
pub fn parse_source(source: &str) -> Result<Program, Vec<ParserError>> {
    let tokens = crate::lexer::Scanner::new(source)
        .scan_tokens()
        .map_err(|e| vec![ParserError::from(e)])?;

    Parser::new(tokens).parse()
}
