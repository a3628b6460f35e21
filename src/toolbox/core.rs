use std::rc::Rc;

use super::wrong_argument_count;
use crate::value::{Date, Value};

pub fn len(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    match &args[0] {
        Value::Str(s) => Some(Value::Integer(s.len() as i64)),
        Value::Array(elements) => Some(Value::Integer(elements.borrow().len() as i64)),
        Value::Dict(pairs) => Some(Value::Integer(pairs.borrow().len() as i64)),
        other => Some(Value::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        ))),
    }
}

/// Print each argument on its own line. Produces no value.
pub fn show(args: &[Value]) -> Option<Value> {
    for arg in args {
        println!("{}", arg);
    }
    None
}

pub fn now(args: &[Value]) -> Option<Value> {
    if !args.is_empty() {
        return Some(wrong_argument_count(args.len(), 0));
    }
    Some(Value::Date(Rc::new(Date::now())))
}
