//! The tree-walking interpreter.
//!
//! The legacy execution engine, kept alongside the bytecode VM and
//! selected with `--engine=eval`. It evaluates the AST directly against
//! chained environments; errors are Error values that short-circuit
//! outward through nested evaluation.

pub mod environment;

use std::rc::Rc;

use crate::ast::{Expr, Program, SExpression};
use crate::interpreter::environment::Environment;
use crate::value::{builtins, LambdaObject, Value, FALSE, NULL, TRUE};

use std::cell::RefCell;

type Env = Rc<RefCell<Environment>>;

/// Evaluate a whole program, returning the last expression's value.
/// An Error value stops evaluation early.
pub fn eval_program(program: &Program, env: &Env) -> Value {
    let mut result = NULL;

    for expr in &program.expressions {
        result = evaluate(expr, env);

        if result.is_error() {
            return result;
        }
    }

    result
}

/// Recursively evaluate one expression.
pub fn evaluate(expr: &Expr, env: &Env) -> Value {
    match expr {
        Expr::Integer(value) => Value::Integer(*value),
        Expr::Float(value) => Value::Float(*value),
        Expr::Str(value) => Value::string(value.clone()),
        Expr::Identifier(name) => eval_identifier(name, env),
        Expr::SExpr(se) => eval_sexpression(se, env),
    }
}

/// Reserved names first, then builtins, then the environment chain.
fn eval_identifier(name: &str, env: &Env) -> Value {
    match name {
        "true" => TRUE,
        "false" => FALSE,
        "null" => NULL,
        _ => match builtins::lookup(name) {
            Some(builtin) => Value::Native(builtin),
            None => env.borrow().get(name),
        },
    }
}

fn eval_sexpression(se: &SExpression, env: &Env) -> Value {
    let Some(head) = &se.head else {
        return Value::list(Vec::new());
    };

    // Special forms evaluate their arguments selectively.
    match se.head_name() {
        Some("if") => return eval_if(se, env),
        Some("def") => return eval_def(se, env),
        Some("lambda") => return eval_lambda_literal(se, env),
        _ => {}
    }

    let callee = evaluate(head, env);

    let mut args = Vec::with_capacity(se.args.len());

    for arg in &se.args {
        let value = evaluate(arg, env);

        if value.is_error() {
            return value;
        }

        args.push(value);
    }

    match callee {
        Value::Native(builtin) => (builtin.func)(&args),
        Value::Lambda(lambda) => apply_lambda(&head.to_string(), &lambda, &args),
        other => Value::error(format!("{} is not a function", other)),
    }
}

/// Call a user lambda: bind arguments in an environment enclosed by the
/// lambda's defining one, then evaluate the body expressions in order,
/// returning the last.
fn apply_lambda(name: &str, lambda: &LambdaObject, args: &[Value]) -> Value {
    if lambda.params.len() != args.len() {
        return Value::error(format!(
            "incorrect number of args for {}: expected={} got={}",
            name,
            lambda.params.len(),
            args.len()
        ));
    }

    let lambda_env = Environment::new(Some(lambda.env.clone()));

    for (param, arg) in lambda.params.iter().zip(args) {
        lambda_env.borrow_mut().set(param, arg.clone());
    }

    let Some((last, rest)) = lambda.body.split_last() else {
        return NULL;
    };

    for expr in rest {
        let value = evaluate(expr, &lambda_env);

        if value.is_error() {
            return value;
        }
    }

    evaluate(last, &lambda_env)
}

/// `(if cond then)` / `(if cond then else)`.
fn eval_if(se: &SExpression, env: &Env) -> Value {
    if se.args.len() < 2 || se.args.len() > 3 {
        return wrong_num_of_args_error("if", "2 or 3", se.args.len());
    }

    let condition = evaluate(&se.args[0], env);

    if condition.is_error() {
        return condition;
    }

    if condition.is_truthy() {
        evaluate(&se.args[1], env)
    } else if let Some(alternative) = se.args.get(2) {
        evaluate(alternative, env)
    } else {
        NULL
    }
}

/// `(def name expr)`: bind the evaluated expression in the current
/// environment and yield it.
fn eval_def(se: &SExpression, env: &Env) -> Value {
    if se.args.len() != 2 {
        return wrong_num_of_args_error("def", "2", se.args.len());
    }

    let Expr::Identifier(name) = &se.args[0] else {
        return Value::error(format!("cannot assign to non-identifier {}", se.args[0]));
    };

    let value = evaluate(&se.args[1], env);

    if !value.is_error() {
        env.borrow_mut().set(name, value.clone());
    }

    value
}

/// `(lambda (params...) body...)`: capture the current environment.
fn eval_lambda_literal(se: &SExpression, env: &Env) -> Value {
    if se.args.is_empty() {
        return wrong_num_of_args_error("lambda", "at least 1", se.args.len());
    }

    let Expr::SExpr(param_list) = &se.args[0] else {
        return Value::error(format!("lambda requires list of args, got {}", se.args[0]));
    };

    let mut params = Vec::new();

    let param_exprs = param_list.head.as_deref().into_iter().chain(&param_list.args);

    for param in param_exprs {
        let Expr::Identifier(name) = param else {
            return Value::error(format!("lambda args must be identifiers, got {}", param));
        };

        params.push(name.clone());
    }

    Value::Lambda(Rc::new(LambdaObject {
        params,
        body: se.args[1..].to_vec(),
        env: env.clone(),
    }))
}

fn wrong_num_of_args_error(fn_name: &str, expected: &str, got: usize) -> Value {
    Value::error(format!(
        "attempted to call {} with incorrect number of arguments: expected {}, got={}",
        fn_name, expected, got
    ))
}
