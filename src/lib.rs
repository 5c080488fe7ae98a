//! solisp: a small S-expression language.
//!
//! # Execution Modes
//!
//! Programs run on one of two engines over the same AST and value model:
//! - **Tree-walk interpreter**: direct AST evaluation with chained
//!   environments
//! - **Bytecode VM**: a compiler lowering the AST to instructions, run on
//!   a stack machine with call frames and first-class closures

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod span;
pub mod value;

use bytecode::{Compiler, VM};
use error::{RuntimeError, SolispError};
use interpreter::environment::Environment;
use value::Value;

/// Which engine executes the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// Bytecode compiler plus virtual machine (default)
    #[default]
    Vm,
    /// Tree-walking interpreter
    Eval,
}

/// Parse and run a program from source, returning its final value.
pub fn run(source: &str, engine: Engine) -> Result<Value, SolispError> {
    let program = parser::parse_source(source).map_err(SolispError::Parse)?;

    match engine {
        Engine::Vm => {
            let mut compiler = Compiler::new();
            compiler.compile(&program)?;

            let mut vm = VM::new(compiler.bytecode());
            vm.run()?;

            Ok(vm.last_popped().clone())
        }
        Engine::Eval => {
            let env = Environment::new(None);
            let result = interpreter::eval_program(&program, &env);

            // The evaluator surfaces runtime failures as Error values;
            // at this level they become run errors, matching the VM.
            if let Value::Error(message) = &result {
                return Err(RuntimeError::ErrorValue(message.to_string()).into());
            }

            Ok(result)
        }
    }
}
