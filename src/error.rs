use thiserror::Error;

/// Errors raised while translating an AST into bytecode. No partial
/// bytecode is returned alongside one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("unknown operator {0}")]
    UnknownOperator(String),
    #[error("return outside of a function")]
    ReturnOutsideFunction,
}

/// Errors raised from inside the dispatch loop. The first one aborts
/// execution; the shell reports it and keeps its globals for the next input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("frame stack overflow")]
    FrameOverflow,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("unknown builtin index {0}")]
    UnknownBuiltin(usize),
    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedBinaryTypes {
        left: &'static str,
        right: &'static str,
    },
    #[error("unknown operator: {op} ({left} {right})")]
    UnknownComparisonOperator {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("unknown integer operator: {0}")]
    UnknownIntegerOperator(&'static str),
    #[error("unknown float operator: {0}")]
    UnknownFloatOperator(&'static str),
    #[error("unknown string operator: {0}")]
    UnknownStringOperator(&'static str),
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),
    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),
    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),
    #[error("return outside of a function")]
    ReturnOutsideFunction,
    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongNumberOfArguments { want: usize, got: usize },
    #[error("calling non-function and non-built-in object: {0}")]
    CallingNonFunction(&'static str),
    #[error("not a function: constant at index {0}")]
    NotAFunction(usize),
    #[error("attribute name must be a string, got {0}")]
    AttributeNameNotString(&'static str),
    #[error("unknown attribute {0} for Date")]
    UnknownDateAttribute(String),
    #[error("object type {0} has no attributes")]
    NoAttributes(&'static str),
}
