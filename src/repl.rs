//! Interactive sessions for both engines.
//!
//! Each line is parsed, compiled, and executed on its own, with the
//! constants pool, symbol table, and globals vector threaded between
//! lines so definitions persist. Parser errors end the session; compile
//! and runtime errors print and let the session continue.

use std::path::PathBuf;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::vm::GLOBAL_SIZE;
use crate::bytecode::{Compiler, SymbolTable, VM};
use crate::interpreter;
use crate::interpreter::environment::Environment;
use crate::parser::parse_source;
use crate::value::{builtins, Value, NULL};
use crate::Engine;

const PROMPT: &str = ">>> ";
const HISTORY_FILE: &str = ".solisp_history";

fn history_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}

/// Start a REPL on the chosen engine. Returns when the user exits or a
/// parser error aborts the session.
pub fn start(engine: Engine) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("could not start line editor: {}", err);
            return;
        }
    };

    let history = history_path();
    let _ = editor.load_history(&history);

    let mut session = Session::new(engine);

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                let _ = editor.add_history_entry(line);

                if !session.eval_line(line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {}", err);
                break;
            }
        }
    }

    let _ = editor.save_history(&history);
}

/// Per-session state: either the VM triple of constants, symbols, and
/// globals, or the evaluator's environment.
enum Session {
    Vm {
        constants: Vec<Value>,
        symbol_table: SymbolTable,
        globals: Vec<Value>,
    },
    Eval {
        env: std::rc::Rc<std::cell::RefCell<Environment>>,
    },
}

impl Session {
    fn new(engine: Engine) -> Self {
        match engine {
            Engine::Vm => {
                let mut symbol_table = SymbolTable::new();

                for (i, builtin) in builtins::BUILTINS.iter().enumerate() {
                    symbol_table.define_builtin(i, builtin.name);
                }

                Session::Vm {
                    constants: Vec::new(),
                    symbol_table,
                    globals: vec![NULL; GLOBAL_SIZE],
                }
            }
            Engine::Eval => Session::Eval {
                env: Environment::new(None),
            },
        }
    }

    /// Evaluate one line, printing its result or error. Returns false when
    /// the session should end.
    fn eval_line(&mut self, line: &str) -> bool {
        let program = match parse_source(line) {
            Ok(program) => program,
            Err(errors) => {
                for err in errors {
                    eprintln!("{}", err.to_string().red());
                }
                return false;
            }
        };

        match self {
            Session::Vm {
                constants,
                symbol_table,
                globals,
            } => {
                let mut compiler =
                    Compiler::new_with_state(std::mem::take(symbol_table), std::mem::take(constants));

                if let Err(err) = compiler.compile(&program) {
                    let (table, consts) = compiler.into_state();
                    *symbol_table = table;
                    *constants = consts;

                    eprintln!("{}", format!("compiler error: {}", err).red());
                    return true;
                }

                let bytecode = compiler.bytecode();
                let (table, consts) = compiler.into_state();
                *symbol_table = table;
                *constants = consts;

                let mut vm = VM::new_with_state(bytecode, std::mem::take(globals));
                let result = vm.run();
                let last = vm.last_popped().clone();
                *globals = vm.into_globals();

                match result {
                    Ok(()) => println!("{}", last),
                    Err(err) => eprintln!("{}", format!("vm error: {}", err).red()),
                }
            }
            Session::Eval { env } => {
                let result = interpreter::eval_program(&program, env);
                println!("{}", result);
            }
        }

        true
    }
}
