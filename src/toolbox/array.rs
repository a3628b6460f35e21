use std::cell::RefCell;
use std::rc::Rc;

use super::wrong_argument_count;
use crate::value::Value;

fn expect_array<'a>(
    args: &'a [Value],
    builtin: &str,
) -> Result<&'a Rc<RefCell<Vec<Value>>>, Value> {
    match &args[0] {
        Value::Array(elements) => Ok(elements),
        other => Err(Value::error(format!(
            "argument to `{}` must be ARRAY, got {}",
            builtin,
            other.type_name()
        ))),
    }
}

pub fn first(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    let elements = match expect_array(args, "first") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };
    elements.borrow().first().cloned()
}

pub fn last(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    let elements = match expect_array(args, "last") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };
    elements.borrow().last().cloned()
}

pub fn all_but_first(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    let elements = match expect_array(args, "allButFirst") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };
    let elements = elements.borrow();
    if elements.is_empty() {
        return None;
    }
    Some(Value::array(elements[1..].to_vec()))
}

pub fn add_to_array_start(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return Some(wrong_argument_count(args.len(), 2));
    }
    let elements = match expect_array(args, "addToArrayStart") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };
    elements.borrow_mut().insert(0, args[1].clone());
    Some(args[0].clone())
}

pub fn add_to_array_end(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return Some(wrong_argument_count(args.len(), 2));
    }
    let elements = match expect_array(args, "addToArrayEnd") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };
    elements.borrow_mut().push(args[1].clone());
    Some(args[0].clone())
}

pub fn remove_from_array(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return Some(wrong_argument_count(args.len(), 2));
    }
    let elements = match expect_array(args, "removeFromArray") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };
    let index = match &args[1] {
        Value::Integer(index) => *index,
        other => {
            return Some(Value::error(format!(
                "index argument to `removeFromArray` must be INTEGER, got {}",
                other.type_name()
            )))
        }
    };

    let mut elements = elements.borrow_mut();
    if index < 0 || index as usize >= elements.len() {
        return Some(Value::error(format!("index out of bounds: {}", index)));
    }
    elements.remove(index as usize);
    drop(elements);

    Some(args[0].clone())
}

pub fn index_of(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return Some(wrong_argument_count(args.len(), 2));
    }
    let elements = match expect_array(args, "indexOf") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };

    match &args[1] {
        Value::Integer(needle) => {
            for (i, element) in elements.borrow().iter().enumerate() {
                if matches!(element, Value::Integer(v) if v == needle) {
                    return Some(Value::Integer(i as i64));
                }
            }
            Some(Value::Integer(-1))
        }
        Value::Str(needle) => {
            for (i, element) in elements.borrow().iter().enumerate() {
                if matches!(element, Value::Str(v) if v == needle) {
                    return Some(Value::Integer(i as i64));
                }
            }
            Some(Value::Integer(-1))
        }
        other => Some(Value::error(format!(
            "index argument to `indexOf` must be INTEGER, got {}",
            other.type_name()
        ))),
    }
}

/// Stable sort of an integer array, in place. Direction is "asc" unless a
/// second string argument says "desc".
pub fn organize(args: &[Value]) -> Option<Value> {
    if args.is_empty() || args.len() > 2 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    let elements = match expect_array(args, "organize") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };

    let mut by = "asc";
    if let Some(Value::Str(direction)) = args.get(1) {
        by = direction.as_str();
    }

    for element in elements.borrow().iter() {
        if !matches!(element, Value::Integer(_)) {
            return Some(Value::error(format!(
                "argument to `organize` must be an ARRAY of INTEGER, got {}",
                element.type_name()
            )));
        }
    }

    fn key(element: &Value) -> i64 {
        match element {
            Value::Integer(v) => *v,
            _ => 0,
        }
    }

    let mut elements = elements.borrow_mut();
    match by {
        "asc" => elements.sort_by(|a, b| key(a).cmp(&key(b))),
        "desc" => elements.sort_by(|a, b| key(b).cmp(&key(a))),
        _ => {}
    }
    drop(elements);
    Some(args[0].clone())
}

/// Sums integers and floats. The result is Float as soon as any element is
/// Float, Integer otherwise.
pub fn sum(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    let elements = match expect_array(args, "sum") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };

    let mut total = 0.0;
    let mut has_float = false;
    for element in elements.borrow().iter() {
        match element {
            Value::Integer(v) => total += *v as f64,
            Value::Float(v) => {
                total += v;
                has_float = true;
            }
            other => {
                return Some(Value::error(format!(
                    "argument to `sum` must be INTEGER or FLOAT, got {}",
                    other.type_name()
                )))
            }
        }
    }

    if has_float {
        Some(Value::Float(total))
    } else {
        Some(Value::Integer(total as i64))
    }
}

pub fn min(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    let elements = match expect_array(args, "min") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };

    let mut minimum: Option<i64> = None;
    for element in elements.borrow().iter() {
        match element {
            Value::Integer(v) => {
                minimum = Some(minimum.map_or(*v, |m| m.min(*v)));
            }
            other => {
                return Some(Value::error(format!(
                    "argument to `min` must be an ARRAY of INTEGER, got {}",
                    other.type_name()
                )))
            }
        }
    }
    minimum.map(Value::Integer)
}

pub fn max(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return Some(wrong_argument_count(args.len(), 1));
    }
    let elements = match expect_array(args, "max") {
        Ok(elements) => elements,
        Err(err) => return Some(err),
    };

    let mut maximum: Option<i64> = None;
    for element in elements.borrow().iter() {
        match element {
            Value::Integer(v) => {
                maximum = Some(maximum.map_or(*v, |m| m.max(*v)));
            }
            other => {
                return Some(Value::error(format!(
                    "argument to `max` must be an ARRAY of INTEGER, got {}",
                    other.type_name()
                )))
            }
        }
    }
    maximum.map(Value::Integer)
}
