//! Stack-based virtual machine executing compiled bytecode.

use std::rc::Rc;

use crate::bytecode::compiler::Bytecode;
use crate::bytecode::frame::Frame;
use crate::bytecode::instruction::{read_u16, OpCode};
use crate::error::RuntimeError;
use crate::value::{builtins, Closure, CompiledLambda, Value, FALSE, NULL, TRUE};

/// Operand stack depth.
pub const STACK_SIZE: usize = 2048;
/// Number of global slots.
pub const GLOBAL_SIZE: usize = 65536;
/// Call depth limit.
pub const MAX_FRAMES: usize = 1024;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// The virtual machine: a fixed operand stack, a globals vector, a frame
/// stack, and the constants pool produced by the compiler.
pub struct VM {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Points at the next free stack slot; the top of the stack is
    /// `stack[sp - 1]`.
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl VM {
    /// Create a VM for the given bytecode. The whole program is wrapped in
    /// a zero-parameter closure so that every level of execution looks the
    /// same to the dispatch loop.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_state(bytecode, vec![NULL; GLOBAL_SIZE])
    }

    /// Create a VM that reuses an existing globals vector, so the REPL
    /// keeps definitions between lines.
    pub fn new_with_state(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_lambda = Rc::new(CompiledLambda {
            instructions: bytecode.instructions,
            locals_count: 0,
            parameter_count: 0,
        });
        let main_closure = Rc::new(Closure {
            lambda: main_lambda,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![NULL; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Hand the globals vector back for the next `new_with_state`.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value most recently popped from the stack: the slot one past
    /// the current top, which after the statement-level Pop holds the
    /// program's result.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    /// Execute the bytecode with a fetch, decode, execute cycle until the
    /// main frame runs out of instructions.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip < self.current_frame().instructions().len() as i64 - 1 {
            // Fetch
            let frame = self.current_frame_mut();
            frame.ip += 1;

            let ip = frame.ip as usize;
            let byte = frame.instructions()[ip];

            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

            // Decode and execute
            match op {
                OpCode::Constant => {
                    let index = self.read_u16_operand();
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::True => self.push(TRUE)?,
                OpCode::False => self.push(FALSE)?,
                OpCode::Null => self.push(NULL)?,
                OpCode::Jump => {
                    let target = self.read_u16_operand();
                    // Land one short so the cycle's increment arrives
                    // exactly on the target.
                    self.current_frame_mut().ip = target as i64 - 1;
                }
                OpCode::JumpWhenFalse => {
                    let target = self.read_u16_operand();
                    let condition = self.pop();

                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target as i64 - 1;
                    }
                }
                OpCode::SetGlobal => {
                    // Reads the top without popping; the statement-level
                    // Pop that follows completes the def.
                    let index = self.read_u16_operand();
                    self.globals[index] = self.stack[self.sp - 1].clone();
                }
                OpCode::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    self.stack[base_pointer + index] = self.stack[self.sp - 1].clone();
                }
                OpCode::GetLocal => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }
                OpCode::GetBuiltin => {
                    let index = self.read_u8_operand();
                    self.push(Value::Native(&builtins::BUILTINS[index]))?;
                }
                OpCode::EmptyList => {
                    self.push(Value::list(Vec::new()))?;
                }
                OpCode::Call => {
                    let arg_count = self.read_u8_operand();
                    self.call(arg_count)?;
                }
                OpCode::Return => {
                    let return_value = self.pop();

                    let frame = self.frames.pop().expect("return with no frame");
                    // Drop the locals, the arguments, and the callee in
                    // one move.
                    self.sp = frame.base_pointer - 1;

                    self.push(return_value)?;
                }
                OpCode::Closure => {
                    let const_index = self.read_u16_operand();
                    let free_count = self.read_u8_operand();
                    self.push_closure(const_index, free_count)?;
                }
                OpCode::GetFree => {
                    let index = self.read_u8_operand();
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }
                OpCode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }
            }
        }

        Ok(())
    }

    /// Invoke the callable sitting below `arg_count` arguments.
    fn call(&mut self, arg_count: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - arg_count - 1].clone();

        match callee {
            Value::Closure(closure) => self.call_closure(closure, arg_count),
            Value::Native(builtin) => self.call_builtin(builtin, arg_count),
            _ => Err(RuntimeError::NotCallable),
        }
    }

    /// Push a frame for the closure. The arguments already sit where the
    /// frame's locals begin; the stack pointer moves up past the rest of
    /// the reserved local slots.
    fn call_closure(&mut self, closure: Rc<Closure>, arg_count: usize) -> VmResult<()> {
        if arg_count != closure.lambda.parameter_count {
            return Err(RuntimeError::WrongArity {
                expected: closure.lambda.parameter_count,
                got: arg_count,
            });
        }

        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.sp - arg_count;
        let locals_count = closure.lambda.locals_count;

        if base_pointer + locals_count > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = base_pointer + locals_count;

        Ok(())
    }

    /// Run a builtin directly on the stack slice. An Error result halts
    /// the VM with the error's message.
    fn call_builtin(&mut self, builtin: &'static builtins::Builtin, arg_count: usize) -> VmResult<()> {
        let args = &self.stack[self.sp - arg_count..self.sp];
        let result = (builtin.func)(args);

        if let Value::Error(message) = &result {
            return Err(RuntimeError::ErrorValue(message.to_string()));
        }

        self.sp = self.sp - arg_count - 1;
        self.push(result)
    }

    /// Build a closure from the compiled lambda at the constant index and
    /// the top `free_count` stack values, in order.
    fn push_closure(&mut self, const_index: usize, free_count: usize) -> VmResult<()> {
        let constant = self.constants[const_index].clone();

        let Value::CompiledLambda(lambda) = constant else {
            return Err(RuntimeError::NotALambda(const_index));
        };

        let free = self.stack[self.sp - free_count..self.sp].to_vec();
        self.sp -= free_count;

        self.push(Value::Closure(Rc::new(Closure { lambda, free })))
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    /// Read the u16 operand following the current instruction, advancing
    /// the instruction pointer past it.
    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = read_u16(&frame.instructions()[ip + 1..]);

        frame.ip += 2;

        value as usize
    }

    /// Read the u8 operand following the current instruction, advancing
    /// the instruction pointer past it.
    fn read_u8_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = frame.instructions()[ip + 1];

        frame.ip += 1;

        value as usize
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.stack[self.sp] = value;
        self.sp += 1;

        Ok(())
    }

    /// Remove and return the top of the stack. The value stays in its
    /// slot until overwritten, which is what `last_popped` relies on.
    fn pop(&mut self) -> Value {
        let value = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::parser::parse_source;

    fn run(input: &str) -> Result<Value, RuntimeError> {
        let program = parse_source(input).expect("parser error");
        let mut compiler = Compiler::new();

        compiler.compile(&program).expect("compiler error");

        let mut vm = VM::new(compiler.bytecode());
        vm.run()?;

        Ok(vm.last_popped().clone())
    }

    fn expect(input: &str) -> Value {
        run(input).unwrap_or_else(|e| panic!("vm error for {:?}: {}", input, e))
    }

    #[test]
    fn test_arithmetic() {
        let tests: Vec<(&str, Value)> = vec![
            ("1", Value::Integer(1)),
            ("2", Value::Integer(2)),
            ("(+ 1 2)", Value::Integer(3)),
            ("(+ 1 2 3 4)", Value::Integer(10)),
            ("(* 1 2 3 4)", Value::Integer(24)),
            ("(- 123 23 1)", Value::Integer(99)),
            ("(/ 8 2 2)", Value::Integer(2)),
            ("1.3", Value::Float(1.3)),
            ("(/ 4 3)", Value::Float(4.0 / 3.0)),
            ("(rem 7 3)", Value::Integer(1)),
        ];

        for (input, expected) in tests {
            assert_eq!(expect(input), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_boolean_expressions() {
        assert_eq!(expect("true"), TRUE);
        assert_eq!(expect("false"), FALSE);
    }

    #[test]
    fn test_conditionals() {
        let tests: Vec<(&str, Value)> = vec![
            ("(if true 10)", Value::Integer(10)),
            ("(if false 10)", NULL),
            ("(if true 10 20)", Value::Integer(10)),
            ("(if false 10 20)", Value::Integer(20)),
            ("(if 1 10)", Value::Integer(10)),
            ("(if 1 10 20)", Value::Integer(10)),
            ("(if (if false 10) 10 20)", Value::Integer(20)),
            ("(if (< 1 2) 10)", Value::Integer(10)),
            ("(if (< 1 2) 10 20)", Value::Integer(10)),
            ("(if (> 1 2) 10 20)", Value::Integer(20)),
            ("(not (if false 10))", TRUE),
        ];

        for (input, expected) in tests {
            assert_eq!(expect(input), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_global_def_expressions() {
        let tests: Vec<(&str, Value)> = vec![
            ("(def one 1) one", Value::Integer(1)),
            ("(def one 1) (def two 2) one", Value::Integer(1)),
            ("(def one 1) (def two one) two", Value::Integer(1)),
        ];

        for (input, expected) in tests {
            assert_eq!(expect(input), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_string_expressions() {
        assert_eq!(expect("\"string\""), Value::string("string"));
        assert_eq!(expect("(def a \"string\") a"), Value::string("string"));
        assert_eq!(
            expect("(str \"n=\" 4 \" \" true)"),
            Value::string("n=4 true")
        );
    }

    #[test]
    fn test_lambda_calls() {
        let tests: Vec<(&str, Value)> = vec![
            ("(def func (lambda () 5)) (func)", Value::Integer(5)),
            (
                "(def one (lambda () 1))
                 (def two (lambda () (one)))
                 (def three (lambda () (two)))
                 (three)",
                Value::Integer(1),
            ),
            (
                "(def truth (lambda () true))
                 (def two (lambda () (if (truth) 2 1)))
                 (two)",
                Value::Integer(2),
            ),
            ("((lambda ()))", NULL),
            (
                "(def one (lambda () 1))
                 (def oneBuilder (lambda () one))
                 ((oneBuilder))",
                Value::Integer(1),
            ),
            (
                "(def one (lambda () (def num 1) num))
                 (one)",
                Value::Integer(1),
            ),
            (
                "(def wrong (lambda ()
                    (def result false)
                    result))
                 (def answer (lambda ()
                    (def result 16)
                    result))
                 (if (wrong) 0 (answer))",
                Value::Integer(16),
            ),
            ("(def identity (lambda (a) a)) (identity 4)", Value::Integer(4)),
            (
                "((lambda (a b c) a b c) 1 2 3)",
                Value::Integer(3),
            ),
            (
                "(def threeIfTrue
                   (lambda (n)
                     (def result (if n 3 0))
                     result))
                 (threeIfTrue true)",
                Value::Integer(3),
            ),
            (
                "(def four 4)
                 (def threeElseFour
                   (lambda (n)
                     (def result (if n 3 four))
                     result))
                 (def outer
                   (lambda (n)
                     (def result (threeElseFour n))
                     result))
                 (outer false)",
                Value::Integer(4),
            ),
        ];

        for (input, expected) in tests {
            assert_eq!(expect(input), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_lambdas_with_wrong_arg_count() {
        let tests = [
            (
                "((lambda () 1) 1)",
                "wrong number of arguments: expected=0 got=1",
            ),
            (
                "((lambda () 1) 1 2)",
                "wrong number of arguments: expected=0 got=2",
            ),
            (
                "((lambda (a) a))",
                "wrong number of arguments: expected=1 got=0",
            ),
            (
                "((lambda (a b) a b) 1)",
                "wrong number of arguments: expected=2 got=1",
            ),
        ];

        for (input, expected) in tests {
            let err = run(input).expect_err("expected VM error");
            assert_eq!(err.to_string(), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_builtin_functions() {
        let tests: Vec<(&str, Value)> = vec![
            ("(+ 1 2)", Value::Integer(3)),
            ("(+ 1 2 3)", Value::Integer(6)),
            ("(len \"hello\")", Value::Integer(5)),
            ("(first (list 1 2 3))", Value::Integer(1)),
            ("(last '(1 2 3))", Value::Integer(3)),
            ("(len (rest '(1 2 3)))", Value::Integer(2)),
            ("(len (push '(1 2) 3))", Value::Integer(3)),
            (
                "(def l '(1 2)) (push! l 3) (len l)",
                Value::Integer(3),
            ),
            ("(def l '(1 2)) (pop! l)", Value::Integer(2)),
            ("(get {\"a\" 1} \"a\")", Value::Integer(1)),
            ("(get {\"a\" 1} \"b\")", NULL),
            (
                "(def d {\"a\" 1}) (set d \"b\" 2) (get d \"b\")",
                Value::Integer(2),
            ),
        ];

        for (input, expected) in tests {
            assert_eq!(expect(input), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_builtin_error_halts_the_vm() {
        let err = run("(len 1)").expect_err("expected VM error");
        assert_eq!(
            err.to_string(),
            "attempted to call len with unsupported type INTEGER (1)"
        );

        let err = run("(/ 1 0)").expect_err("expected VM error");
        assert_eq!(err.to_string(), "Attempted to divide by 0");
    }

    #[test]
    fn test_calling_non_function() {
        let err = run("(1 2)").expect_err("expected VM error");
        assert_eq!(err.to_string(), "calling non-function");
    }

    #[test]
    fn test_closures() {
        let tests: Vec<(&str, Value)> = vec![
            (
                "(def newClosure (lambda (a)
                    (lambda (n) (+ n a))))
                 (def closure (newClosure 5))
                 (closure 5)",
                Value::Integer(10),
            ),
            (
                "(def addBuilder (lambda (n) (lambda (m) (+ n m))))
                 (def add5 (addBuilder 5))
                 (add5 7)",
                Value::Integer(12),
            ),
            (
                "(def countdown (lambda (n)
                    (if (= n 0)
                        0
                        (countdown (- n 1)))))
                 (countdown 2)",
                Value::Integer(0),
            ),
            (
                "(def countdown (lambda (n)
                    (if (= n 0)
                        0
                        (countdown (- n 1)))))
                 (def wrapper (lambda ()
                    (countdown 10)))
                 (wrapper)",
                Value::Integer(0),
            ),
            (
                "(def wrapper (lambda ()
                    (def countdown (lambda (n)
                        (if (= n 0)
                            0
                            (countdown (- n 1)))))
                    (countdown 100)))
                 (wrapper)",
                Value::Integer(0),
            ),
        ];

        for (input, expected) in tests {
            assert_eq!(expect(input), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_recursive_fibonacci() {
        let input = "
            (def fibonacci (lambda (n)
                (if (or (= n 0)
                        (= n 1))
                    n
                    (+ (fibonacci (- n 1))
                       (fibonacci (- n 2))))))
            (fibonacci 15)
        ";

        assert_eq!(expect(input), Value::Integer(610));
    }

    #[test]
    fn test_higher_order_map_via_reduce() {
        let input = "
            (def reduce (lambda (lst f acc)
                (if (= 0 (len lst))
                    acc
                    (reduce (rest lst) f (f acc (first lst))))))
            (def map (lambda (lst f)
                (reduce lst (lambda (acc n) (push acc (f n))) '())))
            (def l '(1 2 3))
            (map l (lambda (n) (* 2 n)))
        ";

        assert_eq!(expect(input).to_string(), "(2 4 6)");
    }

    #[test]
    fn test_equality_of_functions() {
        let tests: Vec<(&str, Value)> = vec![
            ("(def f (lambda () 1)) (= f f)", TRUE),
            (
                "(def f (lambda () 1)) (def g (lambda () 1)) (= f g)",
                FALSE,
            ),
            ("(= + +)", TRUE),
            ("(= + *)", FALSE),
            ("(=)", TRUE),
        ];

        for (input, expected) in tests {
            assert_eq!(expect(input), expected, "for input {:?}", input);
        }
    }

    #[test]
    fn test_empty_list_literal() {
        assert_eq!(expect("()").to_string(), "()");
        assert_eq!(expect("(len ())"), Value::Integer(0));
    }

    #[test]
    fn test_float_demotion() {
        assert_eq!(expect("(+ 1.5 0.5)"), Value::Integer(2));
        assert_eq!(expect("(+ 1.5 1)"), Value::Float(2.5));
        assert_eq!(expect("(- 2.5)"), Value::Float(-2.5));
    }

    #[test]
    fn test_dict_rendering() {
        assert_eq!(expect("{\"a\" 1}").to_string(), "{a: 1}");
        assert_eq!(expect("(get {1 \"one\"} 1)"), Value::string("one"));
    }

    #[test]
    fn test_rem_by_zero_halts() {
        let err = run("(rem 7 0)").expect_err("expected VM error");
        assert_eq!(err.to_string(), "Attempted rem of 0");
    }

    #[test]
    fn test_stack_neutrality_per_statement() {
        let program = parse_source("(def x 1) (+ x 2) x").expect("parser error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compiler error");

        let mut vm = VM::new(compiler.bytecode());
        vm.run().expect("vm error");

        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped(), &Value::Integer(1));
    }

    #[test]
    fn test_stack_overflow() {
        // Infinite recursion must fail cleanly rather than run away.
        let err = run("(def loop (lambda () (loop))) (loop)").expect_err("expected overflow");

        assert!(matches!(
            err,
            RuntimeError::StackOverflow | RuntimeError::FrameOverflow
        ));
    }

    #[test]
    fn test_repl_state_threading() {
        use crate::bytecode::symbol_table::SymbolTable;

        let mut symbol_table = SymbolTable::new();
        for (i, builtin) in builtins::BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(i, builtin.name);
        }

        let mut constants = Vec::new();
        let mut globals = vec![NULL; GLOBAL_SIZE];
        let mut results = Vec::new();

        for line in ["(def x 10)", "(def y (+ x 5))", "(+ x y)"] {
            let program = parse_source(line).expect("parser error");
            let mut compiler = Compiler::new_with_state(symbol_table, constants);

            compiler.compile(&program).expect("compiler error");

            let bytecode = compiler.bytecode();
            (symbol_table, constants) = compiler.into_state();

            let mut vm = VM::new_with_state(bytecode, globals);
            vm.run().expect("vm error");

            results.push(vm.last_popped().clone());
            globals = vm.into_globals();
        }

        assert_eq!(results[2], Value::Integer(25));
    }
}
