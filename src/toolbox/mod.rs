pub mod array;
pub mod core;

use crate::value::Value;

/// A native function. Errors are reported by returning a Value of error
/// kind, never by aborting the VM; `None` means "no result" and the VM
/// pushes Null in its place.
pub type BuiltinFn = fn(&[Value]) -> Option<Value>;

#[derive(Debug)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl PartialEq for BuiltinDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// The builtin roster. Position in this table is the OpGetBuiltin operand,
/// so the order is part of the bytecode format.
pub static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: core::len,
    },
    BuiltinDef {
        name: "show",
        func: core::show,
    },
    BuiltinDef {
        name: "now",
        func: core::now,
    },
    BuiltinDef {
        name: "first",
        func: array::first,
    },
    BuiltinDef {
        name: "last",
        func: array::last,
    },
    BuiltinDef {
        name: "allButFirst",
        func: array::all_but_first,
    },
    BuiltinDef {
        name: "addToArrayStart",
        func: array::add_to_array_start,
    },
    BuiltinDef {
        name: "addToArrayEnd",
        func: array::add_to_array_end,
    },
    BuiltinDef {
        name: "removeFromArray",
        func: array::remove_from_array,
    },
    BuiltinDef {
        name: "indexOf",
        func: array::index_of,
    },
    BuiltinDef {
        name: "organize",
        func: array::organize,
    },
    BuiltinDef {
        name: "sum",
        func: array::sum,
    },
    BuiltinDef {
        name: "min",
        func: array::min,
    },
    BuiltinDef {
        name: "max",
        func: array::max,
    },
];

pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn wrong_argument_count(got: usize, want: usize) -> Value {
    Value::error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    ))
}
