//! Scanner transforming source text into tokens.

use crate::error::LexerError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// Characters that terminate an identifier or number and are never part
/// of one.
fn is_reserved(c: char) -> bool {
    matches!(c, '(' | ')' | '{' | '}' | '\'' | '"')
}

fn is_identifier_char(c: char) -> bool {
    !is_reserved(c) && !c.is_whitespace()
}

/// The scanner walks the source text once, producing one token per call.
pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Scan every token in the source, ending with an EOF token.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);

            if done {
                return Ok(tokens);
            }
        }
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace();

        let span = self.current_span();

        let Some(c) = self.peek() else {
            return Ok(Token::eof(span));
        };

        match c {
            '(' => {
                self.advance();
                Ok(Token::new(TokenKind::LeftParen, span))
            }
            ')' => {
                self.advance();
                Ok(Token::new(TokenKind::RightParen, span))
            }
            '{' => {
                self.advance();
                Ok(Token::new(TokenKind::LeftBrace, span))
            }
            '}' => {
                self.advance();
                Ok(Token::new(TokenKind::RightBrace, span))
            }
            '\'' => {
                self.advance();
                Ok(Token::new(TokenKind::Quote, span))
            }
            '"' => self.scan_string(span),
            '-' => {
                // A minus sign starts a number only when a digit follows;
                // otherwise it is the subtraction identifier.
                self.advance();
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number('-', span)
                } else {
                    self.scan_identifier('-', span)
                }
            }
            c if c.is_ascii_digit() => {
                self.advance();
                self.scan_number(c, span)
            }
            _ => {
                self.advance();
                self.scan_identifier(c, span)
            }
        }
    }

    fn current_span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;

        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    /// Read characters until whitespace or a reserved character, then parse
    /// the text as an integer or, failing that, a float.
    fn scan_number(&mut self, first: char, span: Span) -> Result<Token, LexerError> {
        let mut text = String::from(first);

        while self.peek().is_some_and(is_identifier_char) {
            text.push(self.advance().unwrap());
        }

        if let Ok(value) = text.parse::<i64>() {
            return Ok(Token::new(TokenKind::IntLiteral(value), span));
        }

        if let Ok(value) = text.parse::<f64>() {
            return Ok(Token::new(TokenKind::FloatLiteral(value), span));
        }

        Err(LexerError::InvalidNumber(text, span))
    }

    fn scan_identifier(&mut self, first: char, span: Span) -> Result<Token, LexerError> {
        let mut text = String::from(first);

        while self.peek().is_some_and(is_identifier_char) {
            text.push(self.advance().unwrap());
        }

        Ok(Token::new(TokenKind::Identifier(text), span))
    }

    /// Read characters until the closing quote. There are no escape
    /// sequences; a string is raw text.
    fn scan_string(&mut self, span: Span) -> Result<Token, LexerError> {
        self.advance(); // opening quote

        let mut text = String::new();

        loop {
            match self.advance() {
                Some('"') => return Ok(Token::new(TokenKind::StringLiteral(text), span)),
                Some(c) => text.push(c),
                None => return Err(LexerError::UnterminatedString(span)),
            }
        }
    }
}
