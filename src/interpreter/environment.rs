//! Chained environments for the tree-walking interpreter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// A map of names to values, optionally enclosed by the environment the
/// current one was created in. Lambdas hold on to their defining
/// environment, which is what makes closures work in this engine.
#[derive(Debug, Default)]
pub struct Environment {
    outer: Option<Rc<RefCell<Environment>>>,
    values: HashMap<String, Value>,
}

impl Environment {
    /// Create an environment, enclosed by `outer` when one is given.
    pub fn new(outer: Option<Rc<RefCell<Environment>>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            outer,
            values: HashMap::new(),
        }))
    }

    /// Look a name up here or, failing that, in the enclosing chain.
    /// A miss is an Error value rather than a host error.
    pub fn get(&self, ident: &str) -> Value {
        if let Some(value) = self.values.get(ident) {
            return value.clone();
        }

        match &self.outer {
            Some(outer) => outer.borrow().get(ident),
            None => Value::error(format!("No such item: {}", ident)),
        }
    }

    pub fn set(&mut self, ident: &str, value: Value) {
        self.values.insert(ident.to_string(), value);
    }
}
