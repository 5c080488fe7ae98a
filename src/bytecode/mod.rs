//! Bytecode pipeline for solisp.
//!
//! - `instruction`: opcode definitions and the byte-level encoder
//! - `symbol_table`: lexically nested name resolution
//! - `compiler`: AST to bytecode lowering
//! - `frame`: per-invocation execution state
//! - `vm`: stack-based virtual machine
//! - `disassembler`: human-readable bytecode dumps

pub mod compiler;
pub mod disassembler;
pub mod frame;
pub mod instruction;
pub mod symbol_table;
pub mod vm;

pub use compiler::{Bytecode, Compiler};
pub use disassembler::disassemble;
pub use instruction::{make, read_operands, Instructions, OpCode};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use vm::VM;
