//! The builtin function table.
//!
//! The table order is load-bearing: `OpGetBuiltin` addresses builtins by
//! position, so appending is safe but reordering breaks compiled programs.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{DictEntry, NativeFn, Value, FALSE, NULL, TRUE};

/// A builtin function together with its language-level name.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub func: NativeFn,
}

/// Every builtin, in the order the compiler and VM index them.
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "+", func: add },
    Builtin { name: "*", func: multiply },
    Builtin { name: "-", func: subtract },
    Builtin { name: "/", func: divide },
    Builtin { name: "rem", func: rem },
    Builtin { name: "=", func: equal },
    Builtin { name: "<", func: less_than },
    Builtin { name: ">", func: greater_than },
    Builtin { name: "not", func: not },
    Builtin { name: "and", func: and },
    Builtin { name: "or", func: or },
    Builtin { name: "list", func: list },
    Builtin { name: "dict", func: dict },
    Builtin { name: "first", func: first },
    Builtin { name: "rest", func: rest },
    Builtin { name: "last", func: last },
    Builtin { name: "len", func: len },
    Builtin { name: "push", func: push },
    Builtin { name: "push!", func: push_mut },
    Builtin { name: "pop!", func: pop_mut },
    Builtin { name: "str", func: str_concat },
    Builtin { name: "print", func: print },
    Builtin { name: "get", func: dict_get },
    Builtin { name: "set", func: dict_set },
];

/// Look a builtin up by its language-level name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

// ---- error helpers ----

fn bad_type_error(fn_name: &str, value: &Value) -> Value {
    Value::error(format!(
        "attempted to call {} with unsupported type {} ({})",
        fn_name,
        value.type_name(),
        value
    ))
}

fn bad_key_error(value: &Value) -> Value {
    Value::error(format!(
        "attempted to use unsupported type as dict key {} ({})",
        value.type_name(),
        value
    ))
}

fn no_args_error(fn_name: &str) -> Value {
    Value::error(format!("attempted to call {} with no arguments", fn_name))
}

fn wrong_num_of_args_error(fn_name: &str, expected: &str, got: usize) -> Value {
    Value::error(format!(
        "attempted to call {} with incorrect number of arguments: expected {}, got={}",
        fn_name, expected, got
    ))
}

// ---- numeric helpers ----

fn is_int(num: f64) -> bool {
    num == (num as i64) as f64
}

/// Demote a float result to an integer when it is exactly integral.
fn number(num: f64) -> Value {
    if is_int(num) {
        Value::Integer(num as i64)
    } else {
        Value::Float(num)
    }
}

/// Collect every argument as an f64, or produce a type error naming the
/// offending builtin.
fn numeric_args(fn_name: &str, args: &[Value]) -> Result<Vec<f64>, Value> {
    let mut nums = Vec::with_capacity(args.len());

    for arg in args {
        match arg {
            Value::Integer(value) => nums.push(*value as f64),
            Value::Float(value) => nums.push(*value),
            other => return Err(bad_type_error(fn_name, other)),
        }
    }

    Ok(nums)
}

// ---- arithmetic ----

fn add(args: &[Value]) -> Value {
    match numeric_args("+", args) {
        Ok(nums) => number(nums.iter().sum()),
        Err(err) => err,
    }
}

fn multiply(args: &[Value]) -> Value {
    match numeric_args("*", args) {
        Ok(nums) => number(nums.iter().product()),
        Err(err) => err,
    }
}

fn subtract(args: &[Value]) -> Value {
    if args.is_empty() {
        return no_args_error("-");
    }

    let nums = match numeric_args("-", args) {
        Ok(nums) => nums,
        Err(err) => return err,
    };

    if nums.len() == 1 {
        number(-nums[0])
    } else {
        number(nums[1..].iter().fold(nums[0], |acc, n| acc - n))
    }
}

fn divide(args: &[Value]) -> Value {
    if args.is_empty() {
        return no_args_error("/");
    }

    let nums = match numeric_args("/", args) {
        Ok(nums) => nums,
        Err(err) => return err,
    };

    if nums.len() == 1 {
        return Value::Float(1.0 / nums[0]);
    }

    let mut result = nums[0];

    for &num in &nums[1..] {
        if num == 0.0 {
            return Value::error("Attempted to divide by 0");
        }
        result /= num;
    }

    number(result)
}

fn rem(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_num_of_args_error("rem", "2", args.len());
    }

    let mut ints = [0i64; 2];

    for (i, arg) in args.iter().enumerate() {
        match arg {
            Value::Integer(value) => ints[i] = *value,
            other => return bad_type_error("rem", other),
        }
    }

    if ints[1] == 0 {
        return Value::error("Attempted rem of 0");
    }

    Value::Integer(ints[0] % ints[1])
}

// ---- comparison and logic ----

/// Variadic equality: every argument is compared against the first by the
/// first one's kind. Mismatched kinds compare unequal rather than erroring,
/// except that integers and floats compare as numbers.
fn equal(args: &[Value]) -> Value {
    let Some(obj) = args.first() else {
        return TRUE;
    };

    let rest = &args[1..];

    match obj {
        Value::Integer(value) => nums_equal(*value as f64, rest),
        Value::Float(value) => nums_equal(*value, rest),
        Value::String(value) => all(rest, |arg| {
            matches!(arg, Value::String(other) if other == value)
        }),
        Value::Boolean(value) => all(rest, |arg| {
            matches!(arg, Value::Boolean(other) if other == value)
        }),
        Value::Lambda(lambda) => all(rest, |arg| {
            matches!(arg, Value::Lambda(other) if Rc::ptr_eq(other, lambda))
        }),
        Value::Closure(closure) => all(rest, |arg| {
            matches!(arg, Value::Closure(other) if Rc::ptr_eq(other, closure))
        }),
        Value::CompiledLambda(lambda) => all(rest, |arg| {
            matches!(arg, Value::CompiledLambda(other) if Rc::ptr_eq(other, lambda))
        }),
        Value::Native(builtin) => all(rest, |arg| {
            matches!(arg, Value::Native(other) if other.name == builtin.name)
        }),
        other => bad_type_error("=", other),
    }
}

fn all(args: &[Value], pred: impl Fn(&Value) -> bool) -> Value {
    if args.iter().all(pred) {
        TRUE
    } else {
        FALSE
    }
}

fn nums_equal(first: f64, rest: &[Value]) -> Value {
    all(rest, |arg| match arg {
        Value::Integer(value) => (*value as f64) == first,
        Value::Float(value) => *value == first,
        _ => false,
    })
}

fn less_than(args: &[Value]) -> Value {
    monotonic("<", args, |prev, next| next > prev)
}

fn greater_than(args: &[Value]) -> Value {
    monotonic(">", args, |prev, next| next < prev)
}

/// Shared body of `<` and `>`: true iff each adjacent pair satisfies the
/// ordering strictly.
fn monotonic(fn_name: &str, args: &[Value], ordered: impl Fn(f64, f64) -> bool) -> Value {
    if args.is_empty() {
        return wrong_num_of_args_error(fn_name, "at least 1", 0);
    }

    let nums = match numeric_args(fn_name, args) {
        Ok(nums) => nums,
        Err(err) => return err,
    };

    for pair in nums.windows(2) {
        if !ordered(pair[0], pair[1]) {
            return FALSE;
        }
    }

    TRUE
}

fn not(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_num_of_args_error("not", "1", args.len());
    }

    if args[0].is_error() {
        return args[0].clone();
    }

    if args[0].is_truthy() {
        FALSE
    } else {
        TRUE
    }
}

fn and(args: &[Value]) -> Value {
    for arg in args {
        if arg.is_error() {
            return arg.clone();
        }

        if !arg.is_truthy() {
            return FALSE;
        }
    }

    TRUE
}

fn or(args: &[Value]) -> Value {
    for arg in args {
        if arg.is_error() {
            return arg.clone();
        }

        if arg.is_truthy() {
            return TRUE;
        }
    }

    FALSE
}

// ---- collections ----

fn list(args: &[Value]) -> Value {
    Value::list(args.to_vec())
}

fn dict(args: &[Value]) -> Value {
    if args.len() % 2 != 0 {
        return wrong_num_of_args_error("dict", "even number", args.len());
    }

    let mut entries = IndexMap::new();

    for pair in args.chunks(2) {
        let (key, value) = (&pair[0], &pair[1]);

        let Some(hash) = key.hash_key() else {
            return bad_key_error(key);
        };

        entries.insert(
            hash,
            DictEntry {
                key: key.clone(),
                value: value.clone(),
            },
        );
    }

    Value::dict(entries)
}

/// Check the single-argument list shape shared by the list accessors.
fn expect_list<'a>(
    fn_name: &str,
    args: &'a [Value],
) -> Result<std::cell::Ref<'a, Vec<Value>>, Value> {
    if args.len() != 1 {
        return Err(wrong_num_of_args_error(fn_name, "1", args.len()));
    }

    match &args[0] {
        Value::List(values) => Ok(values.borrow()),
        other => Err(bad_type_error(fn_name, other)),
    }
}

fn first(args: &[Value]) -> Value {
    let list = match expect_list("first", args) {
        Ok(list) => list,
        Err(err) => return err,
    };

    match list.first() {
        Some(value) => value.clone(),
        None => Value::error("attempted to call first on empty list"),
    }
}

fn rest(args: &[Value]) -> Value {
    let list = match expect_list("rest", args) {
        Ok(list) => list,
        Err(err) => return err,
    };

    if list.is_empty() {
        return Value::error("attempted to call rest on empty list");
    }

    Value::list(list[1..].to_vec())
}

fn last(args: &[Value]) -> Value {
    let list = match expect_list("last", args) {
        Ok(list) => list,
        Err(err) => return err,
    };

    match list.last() {
        Some(value) => value.clone(),
        None => Value::error("attempted to call last on empty list"),
    }
}

fn len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_num_of_args_error("len", "1", args.len());
    }

    match &args[0] {
        Value::List(values) => Value::Integer(values.borrow().len() as i64),
        Value::String(value) => Value::Integer(value.len() as i64),
        other => bad_type_error("len", other),
    }
}

/// Non-mutating append: the result is a fresh list.
fn push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_num_of_args_error("push", "2", args.len());
    }

    let Value::List(values) = &args[0] else {
        return Value::error(format!(
            "first argument to push should be list. got={} ({})",
            args[0].type_name(),
            args[0]
        ));
    };

    let mut copy = values.borrow().clone();
    copy.push(args[1].clone());

    Value::list(copy)
}

/// In-place append: the argument list itself grows.
fn push_mut(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_num_of_args_error("push!", "2", args.len());
    }

    let Value::List(values) = &args[0] else {
        return Value::error(format!(
            "first argument to push! should be list. got={} ({})",
            args[0].type_name(),
            args[0]
        ));
    };

    values.borrow_mut().push(args[1].clone());

    args[0].clone()
}

/// In-place removal of the last element, which is returned.
fn pop_mut(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_num_of_args_error("pop!", "1", args.len());
    }

    let Value::List(values) = &args[0] else {
        return Value::error(format!(
            "argument to pop! should be list. got={} ({})",
            args[0].type_name(),
            args[0]
        ));
    };

    match values.borrow_mut().pop() {
        Some(value) => value,
        None => Value::error("attempted to pop from empty list"),
    }
}

// ---- strings and output ----

fn str_concat(args: &[Value]) -> Value {
    let mut result = String::new();

    for arg in args {
        result.push_str(&arg.to_string());
    }

    Value::string(result)
}

fn print(args: &[Value]) -> Value {
    let rendered: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    println!("{}", rendered.join(" "));

    NULL
}

// ---- dictionaries ----

fn dict_get(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_num_of_args_error("get", "2", args.len());
    }

    let Value::Dict(entries) = &args[0] else {
        return Value::error(format!(
            "attempted to get from {} ({}) instead of dict",
            args[0].type_name(),
            args[0]
        ));
    };

    let Some(hash) = args[1].hash_key() else {
        return bad_key_error(&args[1]);
    };

    match entries.borrow().get(&hash) {
        Some(entry) => entry.value.clone(),
        None => NULL,
    }
}

fn dict_set(args: &[Value]) -> Value {
    if args.len() != 3 {
        return wrong_num_of_args_error("set", "3", args.len());
    }

    let Value::Dict(entries) = &args[0] else {
        return Value::error(format!(
            "attempted to set on {} ({}) instead of dict",
            args[0].type_name(),
            args[0]
        ));
    };

    let Some(hash) = args[1].hash_key() else {
        return bad_key_error(&args[1]);
    };

    entries.borrow_mut().insert(
        hash,
        DictEntry {
            key: args[1].clone(),
            value: args[2].clone(),
        },
    );

    args[0].clone()
}
