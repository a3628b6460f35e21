use std::rc::Rc;

use crate::bytecode::{read_u16, read_u8, Instructions, Opcode};
use crate::compiler::Bytecode;
use crate::error::RuntimeError;
use crate::toolbox::{self, BuiltinDef};
use crate::value::{Closure, CompiledFunction, DictPair, DictPairs, Value};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

/// Activation record of one in-flight call. `ip` starts at -1; the
/// dispatch loop increments it before reading each opcode, so jumps assign
/// `target - 1`.
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: isize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}

pub struct VM {
    constants: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl VM {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals_store(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Build a VM around an existing globals array. The shell threads the
    /// same globals through successive inputs to keep bindings alive.
    pub fn new_with_globals_store(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_function = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        };
        let main_closure = Closure {
            function: Rc::new(main_function),
            free: Vec::new(),
        };

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(Rc::new(main_closure), 0));

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Hand the globals array back for the next evaluation.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    pub fn stack_top(&self) -> Option<&Value> {
        if self.sp == 0 {
            None
        } else {
            Some(&self.stack[self.sp - 1])
        }
    }

    /// The slot just above the live top of stack: the value the last OpPop
    /// discarded. Nothing overwrites it until the next push.
    pub fn last_popped_stack_elem(&self) -> &Value {
        &self.stack[self.sp]
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() as isize - 1 {
            self.current_frame_mut().ip += 1;

            let closure = Rc::clone(&self.current_frame().closure);
            let ip = self.current_frame().ip as usize;
            let ins = closure.function.instructions.as_bytes();

            let byte = ins[ip];
            let op = Opcode::from_byte(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

            match op {
                Opcode::Constant => {
                    let index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                    self.execute_binary_operation(op)?;
                }
                Opcode::And | Opcode::Or => {
                    let right = self.pop();
                    let left = self.pop();
                    let result = if op == Opcode::And {
                        left.is_truthy() && right.is_truthy()
                    } else {
                        left.is_truthy() || right.is_truthy()
                    };
                    self.push(Value::Boolean(result))?;
                }
                Opcode::Equal
                | Opcode::NotEqual
                | Opcode::GreaterThan
                | Opcode::LessThan
                | Opcode::GreaterThanOrEqual
                | Opcode::LessThanOrEqual => {
                    self.execute_comparison(op)?;
                }
                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Null => self.push(Value::Null)?,
                Opcode::Bang => {
                    let value = self.pop();
                    let result = match value {
                        Value::Boolean(value) => !value,
                        Value::Null => true,
                        _ => false,
                    };
                    self.push(Value::Boolean(result))?;
                }
                Opcode::Minus => {
                    let value = self.pop();
                    match value {
                        Value::Integer(value) => self.push(Value::Integer(-value))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()))
                        }
                    }
                }
                Opcode::Pop => {
                    self.pop();
                }
                Opcode::Jump => {
                    let target = read_u16(&ins[ip + 1..]) as isize;
                    self.current_frame_mut().ip = target - 1;
                }
                Opcode::JumpNotTruthy => {
                    let target = read_u16(&ins[ip + 1..]) as isize;
                    self.current_frame_mut().ip += 2;

                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target - 1;
                    }
                }
                Opcode::SetGlobal => {
                    let index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    self.globals[index] = self.pop();
                }
                Opcode::GetGlobal => {
                    let index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base_pointer = self.current_frame().base_pointer;
                    self.stack[base_pointer + index] = self.pop();
                }
                Opcode::GetLocal => {
                    let index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }
                Opcode::GetBuiltin => {
                    let index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let builtin = toolbox::BUILTINS
                        .get(index)
                        .ok_or(RuntimeError::UnknownBuiltin(index))?;
                    self.push(Value::Builtin(builtin))?;
                }
                Opcode::Array => {
                    let count = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let array = self.build_array(self.sp - count, self.sp);
                    self.sp -= count;
                    self.push(array)?;
                }
                Opcode::Dict => {
                    let count = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let dict = self.build_dict(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(dict)?;
                }
                Opcode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }
                Opcode::Call => {
                    let num_args = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    self.execute_call(num_args)?;
                }
                Opcode::ReturnValue => {
                    // The main frame has no caller to unwind to.
                    if self.frames.len() == 1 {
                        return Err(RuntimeError::ReturnOutsideFunction);
                    }
                    let return_value = self.pop();

                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;

                    self.push(return_value)?;
                }
                Opcode::Return => {
                    if self.frames.len() == 1 {
                        return Err(RuntimeError::ReturnOutsideFunction);
                    }
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;

                    self.push(Value::Null)?;
                }
                Opcode::Closure => {
                    let const_index = read_u16(&ins[ip + 1..]) as usize;
                    let num_free = read_u8(&ins[ip + 3..]) as usize;
                    self.current_frame_mut().ip += 3;
                    self.push_closure(const_index, num_free)?;
                }
                Opcode::GetFree => {
                    let index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let value = closure.free[index].clone();
                    self.push(value)?;
                }
                Opcode::CurrentClosure => {
                    self.push(Value::Closure(Rc::clone(&closure)))?;
                }
                Opcode::While => {
                    // Conditional back-edge. The compiler lowers loops to
                    // Jump/JumpNotTruthy pairs and never emits this.
                    let target = read_u16(&ins[ip + 1..]) as isize;
                    self.current_frame_mut().ip += 2;

                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target - 1;
                    }
                }
                Opcode::GetAttr => {
                    let attr = self.pop();
                    let name = match &attr {
                        Value::Str(name) => Rc::clone(name),
                        other => {
                            return Err(RuntimeError::AttributeNameNotString(other.type_name()))
                        }
                    };

                    let object = self.pop();
                    match &object {
                        Value::Date(date) => {
                            let value = match name.as_str() {
                                "hour" => Value::Integer(date.hour),
                                "minute" => Value::Integer(date.minute),
                                "day" => Value::Integer(date.day),
                                "second" => Value::Integer(date.second),
                                "month" => Value::Integer(date.month),
                                "year" => Value::Integer(date.year),
                                "fullDate" => Value::string(date.full_date.clone()),
                                other => {
                                    return Err(RuntimeError::UnknownDateAttribute(
                                        other.to_string(),
                                    ))
                                }
                            };
                            self.push(value)?;
                        }
                        other => return Err(RuntimeError::NoAttributes(other.type_name())),
                    }
                }
            }
        }

        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        let value = self.stack[self.sp - 1].clone();
        self.sp -= 1;
        value
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is empty")
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack is empty")
    }

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                self.execute_binary_integer_operation(op, *l, *r)
            }
            (Value::Float(l), Value::Float(r)) => self.execute_binary_float_operation(op, *l, *r),
            (Value::Integer(l), Value::Float(r)) => {
                self.execute_binary_float_operation(op, *l as f64, *r)
            }
            (Value::Float(l), Value::Integer(r)) => {
                self.execute_binary_float_operation(op, *l, *r as f64)
            }
            (Value::Str(l), Value::Str(r)) => {
                if op != Opcode::Add {
                    return Err(RuntimeError::UnknownStringOperator(op.definition().name));
                }
                let result = format!("{}{}", l, r);
                self.push(Value::string(result))
            }
            _ => Err(RuntimeError::UnsupportedBinaryTypes {
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        op: Opcode,
        left: i64,
        right: i64,
    ) -> Result<(), RuntimeError> {
        let result = match op {
            Opcode::Add => left + right,
            Opcode::Sub => left - right,
            Opcode::Mul => left * right,
            Opcode::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                left / right
            }
            Opcode::Mod => {
                if right == 0 {
                    return Err(RuntimeError::ModuloByZero);
                }
                left % right
            }
            other => return Err(RuntimeError::UnknownIntegerOperator(other.definition().name)),
        };
        self.push(Value::Integer(result))
    }

    fn execute_binary_float_operation(
        &mut self,
        op: Opcode,
        left: f64,
        right: f64,
    ) -> Result<(), RuntimeError> {
        let result = match op {
            Opcode::Add => left + right,
            Opcode::Sub => left - right,
            Opcode::Mul => left * right,
            Opcode::Div => left / right,
            other => return Err(RuntimeError::UnknownFloatOperator(other.definition().name)),
        };
        self.push(Value::Float(result))
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = Self::compare_integers(op, *l, *r)
                    .ok_or(RuntimeError::UnknownIntegerOperator(op.definition().name))?;
                self.push(Value::Boolean(result))
            }
            (Value::Float(l), Value::Float(r)) => {
                let result = Self::compare_floats(op, *l, *r)
                    .ok_or(RuntimeError::UnknownFloatOperator(op.definition().name))?;
                self.push(Value::Boolean(result))
            }
            (Value::Integer(l), Value::Float(r)) => {
                let result = Self::compare_floats(op, *l as f64, *r)
                    .ok_or(RuntimeError::UnknownFloatOperator(op.definition().name))?;
                self.push(Value::Boolean(result))
            }
            (Value::Float(l), Value::Integer(r)) => {
                let result = Self::compare_floats(op, *l, *r as f64)
                    .ok_or(RuntimeError::UnknownFloatOperator(op.definition().name))?;
                self.push(Value::Boolean(result))
            }
            (Value::Str(l), Value::Str(r)) => match op {
                Opcode::Equal => self.push(Value::Boolean(l == r)),
                Opcode::NotEqual => self.push(Value::Boolean(l != r)),
                other => Err(RuntimeError::UnknownStringOperator(other.definition().name)),
            },
            _ => match op {
                Opcode::Equal => {
                    let result = Self::identity_equal(&left, &right);
                    self.push(Value::Boolean(result))
                }
                Opcode::NotEqual => {
                    let result = !Self::identity_equal(&left, &right);
                    self.push(Value::Boolean(result))
                }
                other => Err(RuntimeError::UnknownComparisonOperator {
                    op: other.definition().name,
                    left: left.type_name(),
                    right: right.type_name(),
                }),
            },
        }
    }

    fn compare_integers(op: Opcode, left: i64, right: i64) -> Option<bool> {
        match op {
            Opcode::Equal => Some(left == right),
            Opcode::NotEqual => Some(left != right),
            Opcode::GreaterThan => Some(left > right),
            Opcode::LessThan => Some(left < right),
            Opcode::GreaterThanOrEqual => Some(left >= right),
            Opcode::LessThanOrEqual => Some(left <= right),
            _ => None,
        }
    }

    fn compare_floats(op: Opcode, left: f64, right: f64) -> Option<bool> {
        match op {
            Opcode::Equal => Some(left == right),
            Opcode::NotEqual => Some(left != right),
            Opcode::GreaterThan => Some(left > right),
            Opcode::LessThan => Some(left < right),
            Opcode::GreaterThanOrEqual => Some(left >= right),
            Opcode::LessThanOrEqual => Some(left <= right),
            _ => None,
        }
    }

    /// Equality for operands of incompatible types: canonical singletons
    /// compare structurally, containers and callables by identity.
    fn identity_equal(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Null, Value::Null) => true,
            (Value::Array(l), Value::Array(r)) => Rc::ptr_eq(l, r),
            (Value::Dict(l), Value::Dict(r)) => Rc::ptr_eq(l, r),
            (Value::Closure(l), Value::Closure(r)) => Rc::ptr_eq(l, r),
            (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
            (Value::Date(l), Value::Date(r)) => Rc::ptr_eq(l, r),
            (Value::Builtin(l), Value::Builtin(r)) => std::ptr::eq(*l, *r),
            _ => false,
        }
    }

    fn build_array(&self, start: usize, end: usize) -> Value {
        Value::array(self.stack[start..end].to_vec())
    }

    fn build_dict(&self, start: usize, end: usize) -> Result<Value, RuntimeError> {
        let mut pairs = DictPairs::new();

        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let dict_key = key
                .dict_key()
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            pairs.insert(dict_key, DictPair { key, value });

            i += 2;
        }

        Ok(Value::dict(pairs))
    }

    fn execute_index_expression(
        &mut self,
        left: Value,
        index: Value,
    ) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let element = {
                    let elements = elements.borrow();
                    let max = elements.len() as i64 - 1;
                    if *i < 0 || *i > max {
                        Value::Null
                    } else {
                        elements[*i as usize].clone()
                    }
                };
                self.push(element)
            }
            (Value::Dict(pairs), _) => {
                let dict_key = index
                    .dict_key()
                    .ok_or(RuntimeError::UnusableHashKey(index.type_name()))?;
                let value = pairs
                    .borrow()
                    .get(&dict_key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            other => Err(RuntimeError::CallingNonFunction(other.type_name())),
        }
    }

    fn call_closure(
        &mut self,
        closure: Rc<Closure>,
        num_args: usize,
    ) -> Result<(), RuntimeError> {
        if num_args != closure.function.num_parameters {
            return Err(RuntimeError::WrongNumberOfArguments {
                want: closure.function.num_parameters,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.sp - num_args;
        let num_locals = closure.function.num_locals;
        self.frames.push(Frame::new(closure, base_pointer));

        // Arguments sit in the first local slots; the rest are reserved
        // above them.
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(
        &mut self,
        builtin: &'static BuiltinDef,
        num_args: usize,
    ) -> Result<(), RuntimeError> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        self.sp = self.sp - num_args - 1;

        let result = (builtin.func)(&args);
        self.push(result.unwrap_or(Value::Null))
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let constant = self.constants[const_index].clone();
        let function = match constant {
            Value::Function(function) => function,
            _ => return Err(RuntimeError::NotAFunction(const_index)),
        };

        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }
}
