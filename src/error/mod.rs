//! Error types for every phase of the pipeline.
//!
//! Front-end errors (lexer, parser) carry source spans. Compile and runtime
//! errors are position-free: the compiler works on an AST that has already
//! been validated, and the VM only sees flat bytecode.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Clone, Error)]
pub enum LexerError {
    #[error("unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("'{0}' is not a valid number at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnterminatedString(span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors. A parse produces a list of these; any error aborts
/// compilation.
#[derive(Debug, Clone, Error)]
pub enum ParserError {
    #[error("unexpected token '{found}' at {span}")]
    UnexpectedToken { found: String, span: Span },

    #[error("reached end of file before '{expected}'")]
    UnexpectedEof { expected: char },

    #[error("' must be followed by a list at {0}")]
    BadQuote(Span),

    #[error("{0}")]
    Lexer(#[from] LexerError),
}

/// Bytecode compilation errors. Each is a single diagnostic; compilation
/// stops at the first one.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    #[error("incorrect number of values in if expression")]
    BadIfForm,

    #[error("incorrect number of values in def expression")]
    BadDefForm,

    #[error("first argument to def must be identifier")]
    BadDefTarget,

    #[error("not enough arguments for lambda definition")]
    BadLambdaForm,

    #[error("lambda parameters must be a list, got {0}")]
    BadParameterList(String),

    #[error("lambda parameters must be identifiers, got {0}")]
    BadParameter(String),
}

/// Runtime errors raised by the VM. A builtin that returns an `Error`
/// value halts the run with that value's message.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("max call frames exceeded")]
    FrameOverflow,

    #[error("calling non-function")]
    NotCallable,

    #[error("wrong number of arguments: expected={expected} got={got}")]
    WrongArity { expected: usize, got: usize },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("constant {0} is not a lambda")]
    NotALambda(usize),

    #[error("{0}")]
    ErrorValue(String),
}

/// A unified error for library entry points.
#[derive(Debug, Error)]
pub enum SolispError {
    #[error("{}", format_parse_errors(.0))]
    Parse(Vec<ParserError>),

    #[error("compiler error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_parse_errors(errors: &[ParserError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
