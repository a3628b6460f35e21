use std::rc::Rc;

use crate::bytecode::{make, Instructions, Opcode};
use crate::error::CompileError;
use crate::parser::{Block, Expr, InfixOp, PrefixOp, Program, Statement};
use crate::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::toolbox;
use crate::value::{CompiledFunction, Value};

/// Output of a compilation run: a flat instruction stream plus the constant
/// pool it references.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Instruction buffer for one function body. The last two emitted
/// instructions are tracked so trailing OpPop can be removed or rewritten
/// into OpReturnValue.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in toolbox::BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Continue compiling against an existing symbol table and constant
    /// pool. The shell uses this to keep bindings across inputs.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
            }
            Statement::Assign { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(name);
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                    _ => self.emit(Opcode::SetLocal, &[symbol.index]),
                };
            }
            Statement::Return(Some(value)) => {
                if self.scopes.len() == 1 {
                    return Err(CompileError::ReturnOutsideFunction);
                }
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
            Statement::Return(None) => {
                if self.scopes.len() == 1 {
                    return Err(CompileError::ReturnOutsideFunction);
                }
                self.emit(Opcode::Return, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::IntegerLiteral(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[index]);
            }
            Expr::FloatLiteral(value) => {
                let index = self.add_constant(Value::Float(*value));
                self.emit(Opcode::Constant, &[index]);
            }
            Expr::StringLiteral(value) => {
                let index = self.add_constant(Value::string(value.clone()));
                self.emit(Opcode::Constant, &[index]);
            }
            Expr::BooleanLiteral(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expr::BooleanLiteral(false) => {
                self.emit(Opcode::False, &[]);
            }
            Expr::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
            }
            Expr::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOp::Bang => self.emit(Opcode::Bang, &[]),
                    PrefixOp::Minus => self.emit(Opcode::Minus, &[]),
                };
            }
            Expr::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(*operator, left, right)?,
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
                let jump_pos = self.emit(Opcode::Jump, &[9999]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy_pos, after_consequence);

                match alternative {
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }
                let after_alternative = self.current_instructions().len();
                self.change_operand(jump_pos, after_alternative);
            }
            Expr::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }
            Expr::DictLiteral(pairs) => {
                // Emit pairs sorted by the key's source form so the
                // instruction stream is reproducible.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|pair| pair.0.to_string());
                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Dict, &[pairs.len() * 2]);
            }
            Expr::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
            Expr::Function {
                name,
                parameters,
                body,
            } => {
                self.enter_scope();

                if let Some(name) = name {
                    self.symbol_table.define_function_name(name);
                }
                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block(body)?;

                if self.last_instruction_is(Opcode::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Opcode::ReturnValue) {
                    self.emit(Opcode::Return, &[]);
                }

                let (instructions, free_symbols, num_locals) = self.leave_scope();
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let index = self.add_constant(Value::Function(Rc::new(function)));
                self.emit(Opcode::Closure, &[index, free_symbols.len()]);
            }
            Expr::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        operator: InfixOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), CompileError> {
        // < and <= compile as their mirrored operators with swapped
        // operands; && and || lower to short-circuit branches.
        match operator {
            InfixOp::Lt => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(Opcode::GreaterThan, &[]);
                return Ok(());
            }
            InfixOp::LtEq => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(Opcode::GreaterThanOrEqual, &[]);
                return Ok(());
            }
            InfixOp::And => return self.compile_and(left, right),
            InfixOp::Or => return self.compile_or(left, right),
            _ => {}
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        match operator {
            InfixOp::Plus => self.emit(Opcode::Add, &[]),
            InfixOp::Minus => self.emit(Opcode::Sub, &[]),
            InfixOp::Star => self.emit(Opcode::Mul, &[]),
            InfixOp::Slash => self.emit(Opcode::Div, &[]),
            InfixOp::Percent => self.emit(Opcode::Mod, &[]),
            InfixOp::Gt => self.emit(Opcode::GreaterThan, &[]),
            InfixOp::GtEq => self.emit(Opcode::GreaterThanOrEqual, &[]),
            InfixOp::Eq => self.emit(Opcode::Equal, &[]),
            InfixOp::NotEq => self.emit(Opcode::NotEqual, &[]),
            other => return Err(CompileError::UnknownOperator(other.to_string())),
        };
        Ok(())
    }

    /// `left && right` evaluates right only when left is truthy and always
    /// leaves a canonical Boolean.
    fn compile_and(&mut self, left: &Expr, right: &Expr) -> Result<(), CompileError> {
        self.compile_expression(left)?;
        let left_falsy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);
        self.compile_expression(right)?;
        let right_falsy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

        self.emit(Opcode::True, &[]);
        let jump_end_pos = self.emit(Opcode::Jump, &[9999]);

        let false_pos = self.current_instructions().len();
        self.change_operand(left_falsy_pos, false_pos);
        self.change_operand(right_falsy_pos, false_pos);
        self.emit(Opcode::False, &[]);

        let end_pos = self.current_instructions().len();
        self.change_operand(jump_end_pos, end_pos);
        Ok(())
    }

    /// `left || right` skips right when left is truthy.
    fn compile_or(&mut self, left: &Expr, right: &Expr) -> Result<(), CompileError> {
        self.compile_expression(left)?;
        let try_right_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);
        self.emit(Opcode::True, &[]);
        let jump_end_left_pos = self.emit(Opcode::Jump, &[9999]);

        let right_pos = self.current_instructions().len();
        self.change_operand(try_right_pos, right_pos);
        self.compile_expression(right)?;
        let right_falsy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);
        self.emit(Opcode::True, &[]);
        let jump_end_right_pos = self.emit(Opcode::Jump, &[9999]);

        let false_pos = self.current_instructions().len();
        self.change_operand(right_falsy_pos, false_pos);
        self.emit(Opcode::False, &[]);

        let end_pos = self.current_instructions().len();
        self.change_operand(jump_end_left_pos, end_pos);
        self.change_operand(jump_end_right_pos, end_pos);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    /// Constants are append-only; the returned index is the constant's
    /// identity for the rest of compilation.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.current_instructions().len();
        let scope = self.scope_mut();
        scope.instructions.extend(&instruction);
        scope.previous_instruction = scope.last_instruction.take();
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn current_instructions(&self) -> &Instructions {
        &self
            .scopes
            .last()
            .expect("compilation scope stack is empty")
            .instructions
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes
            .last_mut()
            .expect("compilation scope stack is empty")
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        self.scopes
            .last()
            .and_then(|scope| scope.last_instruction.as_ref())
            .is_some_and(|last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last_instruction.take() {
            scope.instructions.0.truncate(last.position);
            scope.last_instruction = scope.previous_instruction.take();
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last_instruction.as_mut() {
            scope.instructions.0[last.position] = Opcode::ReturnValue as u8;
            last.opcode = Opcode::ReturnValue;
        }
    }

    /// Rewrite the operand of a previously emitted jump once its target is
    /// known.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let scope = self.scope_mut();
        let op = scope.instructions.0[position];
        let new_instruction = make(
            Opcode::from_byte(op).expect("patching an unknown opcode"),
            &[operand],
        );
        scope.instructions.0[position..position + new_instruction.len()]
            .copy_from_slice(&new_instruction);
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> (Instructions, Vec<Symbol>, usize) {
        let scope = self
            .scopes
            .pop()
            .expect("compilation scope stack is empty");

        let mut table = std::mem::take(&mut self.symbol_table);
        let num_locals = table.num_definitions;
        let free_symbols = std::mem::take(&mut table.free_symbols);
        self.symbol_table = match table.outer {
            Some(outer) => *outer,
            None => SymbolTable::new(),
        };

        (scope.instructions, free_symbols, num_locals)
    }
}
