//! Bytecode compiler: lowers the AST into instructions.
//!
//! Compilation happens inside a stack of scopes, one per lambda being
//! compiled. Leaving a scope yields the lambda's finished instructions,
//! which are wrapped in a `CompiledLambda` constant; the enclosing scope
//! then emits the loads for its captured free variables followed by
//! `OpClosure`.

use std::mem;
use std::rc::Rc;

use crate::ast::{Expr, Program, SExpression};
use crate::bytecode::instruction::{make, Instructions, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::error::CompileError;
use crate::value::{builtins, CompiledLambda, Value};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// An operand used for jump placeholders that are always backpatched.
const PLACEHOLDER: usize = 9999;

/// A single emitted instruction: its opcode and starting position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmittedInstruction {
    pub opcode: OpCode,
    pub position: usize,
}

/// The instruction buffer for one nesting level, along with the last two
/// instructions emitted into it for post-hoc rewrites.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The compiled program: the top-level instructions plus the constants
/// pool shared by every lambda in it.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    /// Create a compiler whose root symbol table knows every builtin.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();

        for (i, builtin) in builtins::BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(i, builtin.name);
        }

        Self::new_with_state(symbol_table, Vec::new())
    }

    /// Create a compiler that continues from an existing symbol table and
    /// constants pool, so the REPL keeps state between lines.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Compile every top-level expression, emitting a statement-level Pop
    /// after each so the stack stays neutral. The value the final Pop
    /// removes is what `VM::last_popped` surfaces as the program result.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for expr in &program.expressions {
            self.compile_expr(expr)?;
            self.emit(OpCode::Pop, &[]);
        }

        Ok(())
    }

    /// The compiled artifact. Constants are cheap to clone: aggregates are
    /// reference counted.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        }
    }

    /// Tear the compiler down into the state a REPL threads into the next
    /// `new_with_state`. After a failed compile the table can still be
    /// nested inside a lambda scope; unwind it so the REPL always carries
    /// the root table forward.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        let mut table = self.symbol_table;

        while !table.is_global() {
            table = table.into_outer().expect("nested table with no outer");
        }

        (table, self.constants)
    }

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Integer(value) => {
                let idx = self.add_constant(Value::Integer(*value));
                self.emit(OpCode::Constant, &[idx]);
            }
            Expr::Float(value) => {
                let idx = self.add_constant(Value::Float(*value));
                self.emit(OpCode::Constant, &[idx]);
            }
            Expr::Str(value) => {
                let idx = self.add_constant(Value::string(value.clone()));
                self.emit(OpCode::Constant, &[idx]);
            }
            Expr::Identifier(name) => self.compile_identifier(name)?,
            Expr::SExpr(se) => self.compile_sexpression(se)?,
        }

        Ok(())
    }

    fn compile_identifier(&mut self, name: &str) -> CompileResult<()> {
        match name {
            "true" => {
                self.emit(OpCode::True, &[]);
            }
            "false" => {
                self.emit(OpCode::False, &[]);
            }
            "null" => {
                self.emit(OpCode::Null, &[]);
            }
            _ => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))?;

                self.load_symbol(&symbol);
            }
        }

        Ok(())
    }

    fn compile_sexpression(&mut self, se: &SExpression) -> CompileResult<()> {
        let Some(head) = &se.head else {
            self.emit(OpCode::EmptyList, &[]);
            return Ok(());
        };

        match se.head_name() {
            Some("if") => self.compile_if(se),
            Some("def") => self.compile_def(se),
            Some("lambda") => self.compile_lambda(se, None),
            _ => {
                self.compile_expr(head)?;

                for arg in &se.args {
                    self.compile_expr(arg)?;
                }

                self.emit(OpCode::Call, &[se.args.len()]);
                Ok(())
            }
        }
    }

    /// `(if cond then)` or `(if cond then else)`. With no else branch the
    /// false path produces null.
    fn compile_if(&mut self, se: &SExpression) -> CompileResult<()> {
        if se.args.len() < 2 || se.args.len() > 3 {
            return Err(CompileError::BadIfForm);
        }

        self.compile_expr(&se.args[0])?;

        // Placeholder target, backpatched to the start of the false path.
        let conditional_jump_pos = self.emit(OpCode::JumpWhenFalse, &[PLACEHOLDER]);

        self.compile_expr(&se.args[1])?;

        // Placeholder target, backpatched to the end of the false path.
        let jump_pos = self.emit(OpCode::Jump, &[PLACEHOLDER]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(conditional_jump_pos, after_consequence);

        if let Some(alternative) = se.args.get(2) {
            self.compile_expr(alternative)?;
        } else {
            self.emit(OpCode::Null, &[]);
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);

        Ok(())
    }

    /// `(def name expr)`. The symbol is defined before the right-hand side
    /// compiles so that a lambda can resolve its own name; a lambda RHS is
    /// compiled carrying the name for exactly that purpose.
    fn compile_def(&mut self, se: &SExpression) -> CompileResult<()> {
        if se.args.len() != 2 {
            return Err(CompileError::BadDefForm);
        }

        let Expr::Identifier(name) = &se.args[0] else {
            return Err(CompileError::BadDefTarget);
        };

        let symbol = self.symbol_table.define(name);

        match &se.args[1] {
            Expr::SExpr(inner) if inner.head_name() == Some("lambda") => {
                self.compile_lambda(inner, Some(name))?;
            }
            expr => self.compile_expr(expr)?,
        }

        if symbol.scope == SymbolScope::Global {
            self.emit(OpCode::SetGlobal, &[symbol.index]);
        } else {
            self.emit(OpCode::SetLocal, &[symbol.index]);
        }

        Ok(())
    }

    /// `(lambda (params...) body...)`. Compiles the body in a fresh scope,
    /// wraps the result in a constant, then emits the free-variable loads
    /// and `OpClosure` in the enclosing scope.
    fn compile_lambda(&mut self, se: &SExpression, name: Option<&str>) -> CompileResult<()> {
        if se.args.is_empty() {
            return Err(CompileError::BadLambdaForm);
        }

        self.enter_scope();

        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }

        let Expr::SExpr(param_list) = &se.args[0] else {
            return Err(CompileError::BadParameterList(se.args[0].to_string()));
        };

        let mut parameter_count = 0;

        let params = param_list.head.as_deref().into_iter().chain(&param_list.args);

        for param in params {
            let Expr::Identifier(param_name) = param else {
                return Err(CompileError::BadParameter(param.to_string()));
            };

            self.symbol_table.define(param_name);
            parameter_count += 1;
        }

        let body = &se.args[1..];

        if body.is_empty() {
            self.emit(OpCode::Null, &[]);
        } else {
            for expr in &body[..body.len() - 1] {
                self.compile_expr(expr)?;
                self.emit(OpCode::Pop, &[]);
            }

            self.compile_expr(&body[body.len() - 1])?;
        }

        self.emit(OpCode::Return, &[]);

        // Captured before leave_scope tears the table down.
        let free_symbols = self.symbol_table.free_symbols.clone();
        let locals_count = self.symbol_table.count;

        let instructions = self.leave_scope();

        let lambda = Value::CompiledLambda(Rc::new(CompiledLambda {
            instructions,
            locals_count,
            parameter_count,
        }));

        let const_idx = self.add_constant(lambda);

        // Load each captured value in the enclosing scope, in the order
        // the inner scope recorded them.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        self.emit(OpCode::Closure, &[const_idx, free_symbols.len()]);

        Ok(())
    }

    /// Emit the getter matching where a symbol lives.
    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
    }

    /// Append a constant to the pool and return its index. The pool is
    /// append-only; no deduplication happens.
    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Encode an instruction into the active scope. Returns the position
    /// at which the instruction starts.
    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);

        self.set_last_instruction(op, position);

        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = &mut self.scopes[self.scope_index];
        let position = scope.instructions.len();

        scope.instructions.extend_from_slice(instruction);

        position
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        let scope = &mut self.scopes[self.scope_index];

        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    /// Re-encode the instruction at `position` with a new operand. Only
    /// valid for same-width replacements, which backpatching satisfies.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::from_u8(self.scopes[self.scope_index].instructions[position])
            .expect("changing operand of unknown opcode");

        let instruction = make(op, &[operand]);
        let target =
            &mut self.scopes[self.scope_index].instructions[position..position + instruction.len()];

        target.copy_from_slice(&instruction);
    }

    /// Open a scope for a lambda body: a fresh instruction buffer and an
    /// enclosed symbol table.
    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;

        let outer = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    /// Close the active scope, restoring the enclosing symbol table and
    /// returning the scope's instructions.
    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leaving nonexistent scope");
        self.scope_index -= 1;

        self.symbol_table = mem::take(&mut self.symbol_table)
            .into_outer()
            .expect("leaving the root scope");

        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
