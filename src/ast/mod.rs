//! AST node definitions.
//!
//! The grammar is tiny: a program is a sequence of expressions, and an
//! expression is an atom or an S-expression. `Display` reproduces the
//! source form, which is also how lambdas render themselves at runtime.

use std::fmt;

/// A single expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i64),
    Float(f64),
    Str(String),
    Identifier(String),
    SExpr(SExpression),
}

/// A parenthesized head-plus-arguments form. `()` has no head.
///
/// The head and the arguments are themselves expressions, so calls nest
/// arbitrarily: `((lambda (n) n) 1)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SExpression {
    pub head: Option<Box<Expr>>,
    pub args: Vec<Expr>,
}

impl SExpression {
    /// The head's textual form when it is a bare identifier, used to
    /// dispatch special forms.
    pub fn head_name(&self) -> Option<&str> {
        match self.head.as_deref() {
            Some(Expr::Identifier(name)) => Some(name),
            _ => None,
        }
    }
}

/// A parsed program: the sequence of top-level expressions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub expressions: Vec<Expr>,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(value) => write!(f, "{}", value),
            Expr::Float(value) => write!(f, "{}", value),
            Expr::Str(value) => write!(f, "{}", value),
            Expr::Identifier(name) => write!(f, "{}", name),
            Expr::SExpr(se) => write!(f, "{}", se),
        }
    }
}

impl fmt::Display for SExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;

        if let Some(head) = &self.head {
            write!(f, "{}", head)?;
        }

        for arg in &self.args {
            write!(f, " {}", arg)?;
        }

        write!(f, ")")
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, expr) in self.expressions.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", expr)?;
        }

        Ok(())
    }
}
