//! Runtime values shared by the tree-walking interpreter and the VM.

pub mod builtins;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Expr;
use crate::bytecode::instruction::Instructions;
use crate::interpreter::environment::Environment;

pub use builtins::{Builtin, BUILTINS};

/// The canonical true value.
pub const TRUE: Value = Value::Boolean(true);
/// The canonical false value.
pub const FALSE: Value = Value::Boolean(false);
/// The canonical null value.
pub const NULL: Value = Value::Null;

/// Signature of a builtin function.
pub type NativeFn = fn(&[Value]) -> Value;

/// A runtime value. Aggregates are reference-counted so that cloning a
/// value is cheap and `push!`/`pop!`/`set` mutate the shared container.
#[derive(Debug, Clone)]
pub enum Value {
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(Rc<String>),
    /// Boolean value
    Boolean(bool),
    /// Null value
    Null,
    /// Ordered, mutable sequence
    List(Rc<RefCell<Vec<Value>>>),
    /// Mapping from hashed key to its key/value pair
    Dict(Rc<RefCell<IndexMap<HashKey, DictEntry>>>),
    /// A first-class error; returning one from a builtin halts the VM
    Error(Rc<String>),
    /// A user lambda under the tree-walking interpreter
    Lambda(Rc<LambdaObject>),
    /// Compiled instructions for a lambda, stored in the constants pool
    CompiledLambda(Rc<CompiledLambda>),
    /// A compiled lambda paired with its captured free values
    Closure(Rc<Closure>),
    /// A builtin exposed as a value
    Native(&'static Builtin),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Value {
        Value::String(Rc::new(value.into()))
    }

    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(values)))
    }

    pub fn dict(entries: IndexMap<HashKey, DictEntry>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(message.into()))
    }

    /// The type tag used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Boolean(_) => "BOOL",
            Value::Null => "NULL",
            Value::List(_) => "LIST",
            Value::Dict(_) => "DICT",
            Value::Error(_) => "ERROR",
            Value::Lambda(_) => "LAMBDA",
            Value::CompiledLambda(_) => "COMPILED_LAMBDA",
            Value::Closure(_) => "CLOSURE",
            Value::Native(_) => "FUNCTION",
        }
    }

    /// Everything is truthy except `false` and `null`; in particular,
    /// Error values are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The hash key for this value, if it can be used as a dictionary key.
    /// Only integers, booleans, and strings are hashable.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(value) => Some(HashKey {
                tag: HashTag::Integer,
                value: *value as u64,
            }),
            // Booleans share the string tag; see HashTag.
            Value::Boolean(value) => Some(HashKey {
                tag: HashTag::String,
                value: *value as u64,
            }),
            Value::String(value) => Some(HashKey {
                tag: HashTag::String,
                value: fnv1a_64(value.as_bytes()),
            }),
            _ => None,
        }
    }
}

/// Structural equality, used by tests and collection helpers. The `=`
/// builtin implements the language-level comparison separately.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Integer(b)) => *a == (*b as f64),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledLambda(a), Value::CompiledLambda(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{}", value),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Null => write!(f, "null"),
            Value::List(values) => {
                write!(f, "(")?;
                for (i, value) in values.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, entry) in entries.borrow().values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", entry.key, entry.value)?;
                }
                write!(f, "}}")
            }
            Value::Error(message) => write!(f, "ERROR: {}", message),
            Value::Lambda(lambda) => write!(f, "{}", lambda),
            Value::CompiledLambda(lambda) => {
                write!(f, "CompiledLambda[{:p}]", Rc::as_ptr(lambda))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Native(builtin) => write!(f, "{}", builtin.name),
        }
    }
}

/// One dictionary slot: the original key alongside its value, so that
/// rendering can show the key as written rather than its hash.
#[derive(Debug, Clone, PartialEq)]
pub struct DictEntry {
    pub key: Value,
    pub value: Value,
}

/// Tag half of a hash key. Booleans hash under the string tag with
/// payloads 0 and 1, preserving the original implementation's collision
/// behavior between `true`/`false` and strings whose digest is 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashTag {
    Integer,
    String,
}

/// A dictionary key: a type tag plus a 64-bit payload. Two values are the
/// same key iff both halves match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: HashTag,
    pub value: u64,
}

/// 64-bit FNV-1a digest, used to hash string keys.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// A user-defined lambda under the tree-walking interpreter: parameter
/// names, unevaluated body expressions, and the defining environment.
#[derive(Debug)]
pub struct LambdaObject {
    pub params: Vec<String>,
    pub body: Vec<Expr>,
    pub env: Rc<RefCell<Environment>>,
}

impl fmt::Display for LambdaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lambda ({})", self.params.join(" "))?;
        for expr in &self.body {
            write!(f, " {}", expr)?;
        }
        write!(f, ")")
    }
}

/// The compiled form of a lambda: flat instructions plus the stack space
/// its invocation needs. Lives in the constants pool for the lifetime of
/// the bytecode that references it.
#[derive(Debug, PartialEq)]
pub struct CompiledLambda {
    pub instructions: Instructions,
    pub locals_count: usize,
    pub parameter_count: usize,
}

/// A callable pairing of a compiled lambda with the free values captured
/// when `OpClosure` executed. The free vector length always equals the
/// number of free symbols recorded by the lambda's defining scope.
#[derive(Debug)]
pub struct Closure {
    pub lambda: Rc<CompiledLambda>,
    pub free: Vec<Value>,
}
