use std::rc::Rc;

use vaja::bytecode::{make, Instructions, Opcode};
use vaja::compiler::{Bytecode, Compiler};
use vaja::lexer::Lexer;
use vaja::parser::Parser;
use vaja::value::{CompiledFunction, Value};

fn compile(input: &str) -> Bytecode {
    let mut parser = Parser::new(Lexer::new(input));
    let program = parser.parse_program();
    assert!(
        parser.errors.is_empty(),
        "parser errors on {:?}: {:?}",
        input,
        parser.errors
    );
    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .unwrap_or_else(|err| panic!("compile error on {:?}: {}", input, err));
    compiler.bytecode()
}

fn concat(pieces: &[Vec<u8>]) -> Instructions {
    let mut instructions = Instructions::new();
    for piece in pieces {
        instructions.extend(piece);
    }
    instructions
}

fn function(pieces: &[Vec<u8>], num_locals: usize, num_parameters: usize) -> Value {
    Value::Function(Rc::new(CompiledFunction {
        instructions: concat(pieces),
        num_locals,
        num_parameters,
    }))
}

fn assert_instructions(input: &str, expected: &[Vec<u8>]) {
    let bytecode = compile(input);
    let expected = concat(expected);
    assert_eq!(
        bytecode.instructions, expected,
        "input {:?}\nwant:\n{}\ngot:\n{}",
        input, expected, bytecode.instructions
    );
}

fn assert_bytecode(input: &str, expected_instructions: &[Vec<u8>], expected_constants: &[Value]) {
    let bytecode = compile(input);
    let expected = concat(expected_instructions);
    assert_eq!(
        bytecode.instructions, expected,
        "input {:?}\nwant:\n{}\ngot:\n{}",
        input, expected, bytecode.instructions
    );
    assert_eq!(
        bytecode.constants, expected_constants,
        "constants mismatch on {:?}",
        input
    );
}

#[test]
fn integer_arithmetic() {
    assert_bytecode(
        "1 + 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Add, &[]),
            make(Opcode::Pop, &[]),
        ],
        &[Value::Integer(1), Value::Integer(2)],
    );
    assert_instructions(
        "1; 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Pop, &[]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "1 - 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Sub, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "1 * 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Mul, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "2 / 1",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Div, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "5 % 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Mod, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "-1",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Minus, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
}

#[test]
fn float_literals_go_through_the_constant_pool() {
    assert_bytecode(
        "1.5 + 0.25",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Add, &[]),
            make(Opcode::Pop, &[]),
        ],
        &[Value::Float(1.5), Value::Float(0.25)],
    );
}

#[test]
fn boolean_expressions() {
    assert_instructions("true", &[make(Opcode::True, &[]), make(Opcode::Pop, &[])]);
    assert_instructions("false", &[make(Opcode::False, &[]), make(Opcode::Pop, &[])]);
    assert_instructions(
        "1 > 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::GreaterThan, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "1 >= 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::GreaterThanOrEqual, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "1 == 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Equal, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "1 != 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::NotEqual, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "true != false",
        &[
            make(Opcode::True, &[]),
            make(Opcode::False, &[]),
            make(Opcode::NotEqual, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "!true",
        &[
            make(Opcode::True, &[]),
            make(Opcode::Bang, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
}

#[test]
fn less_than_compiles_as_mirrored_greater_than() {
    // 1 < 2 swaps its operands and reuses OpGreaterThan.
    assert_bytecode(
        "1 < 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::GreaterThan, &[]),
            make(Opcode::Pop, &[]),
        ],
        &[Value::Integer(2), Value::Integer(1)],
    );
    assert_bytecode(
        "1 <= 2",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::GreaterThanOrEqual, &[]),
            make(Opcode::Pop, &[]),
        ],
        &[Value::Integer(2), Value::Integer(1)],
    );
}

#[test]
fn logical_operators_lower_to_branches() {
    assert_instructions(
        "true && false",
        &[
            make(Opcode::True, &[]),           // 0000
            make(Opcode::JumpNotTruthy, &[12]), // 0001
            make(Opcode::False, &[]),          // 0004
            make(Opcode::JumpNotTruthy, &[12]), // 0005
            make(Opcode::True, &[]),           // 0008
            make(Opcode::Jump, &[13]),         // 0009
            make(Opcode::False, &[]),          // 0012
            make(Opcode::Pop, &[]),            // 0013
        ],
    );
    assert_instructions(
        "true || false",
        &[
            make(Opcode::True, &[]),           // 0000
            make(Opcode::JumpNotTruthy, &[8]), // 0001
            make(Opcode::True, &[]),           // 0004
            make(Opcode::Jump, &[17]),         // 0005
            make(Opcode::False, &[]),          // 0008
            make(Opcode::JumpNotTruthy, &[16]), // 0009
            make(Opcode::True, &[]),           // 0012
            make(Opcode::Jump, &[17]),         // 0013
            make(Opcode::False, &[]),          // 0016
            make(Opcode::Pop, &[]),            // 0017
        ],
    );
}

#[test]
fn conditionals() {
    assert_bytecode(
        "if (true) { 10 }; 3333;",
        &[
            make(Opcode::True, &[]),            // 0000
            make(Opcode::JumpNotTruthy, &[10]), // 0001
            make(Opcode::Constant, &[0]),       // 0004
            make(Opcode::Jump, &[11]),          // 0007
            make(Opcode::Null, &[]),            // 0010
            make(Opcode::Pop, &[]),             // 0011
            make(Opcode::Constant, &[1]),       // 0012
            make(Opcode::Pop, &[]),             // 0015
        ],
        &[Value::Integer(10), Value::Integer(3333)],
    );
    assert_bytecode(
        "if (true) { 10 } else { 20 }; 3333;",
        &[
            make(Opcode::True, &[]),            // 0000
            make(Opcode::JumpNotTruthy, &[10]), // 0001
            make(Opcode::Constant, &[0]),       // 0004
            make(Opcode::Jump, &[13]),          // 0007
            make(Opcode::Constant, &[1]),       // 0010
            make(Opcode::Pop, &[]),             // 0013
            make(Opcode::Constant, &[2]),       // 0014
            make(Opcode::Pop, &[]),             // 0017
        ],
        &[Value::Integer(10), Value::Integer(20), Value::Integer(3333)],
    );
}

#[test]
fn global_assign_statements() {
    assert_instructions(
        "var one << 1; var two << 2;",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::SetGlobal, &[1]),
        ],
    );
    assert_instructions(
        "var one << 1; one;",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::GetGlobal, &[0]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "var one << 1; var two << one; two;",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::GetGlobal, &[0]),
            make(Opcode::SetGlobal, &[1]),
            make(Opcode::GetGlobal, &[1]),
            make(Opcode::Pop, &[]),
        ],
    );
}

#[test]
fn string_expressions() {
    assert_bytecode(
        "\"vaja\"",
        &[make(Opcode::Constant, &[0]), make(Opcode::Pop, &[])],
        &[Value::string("vaja")],
    );
    assert_bytecode(
        "\"va\" + \"ja\"",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Add, &[]),
            make(Opcode::Pop, &[]),
        ],
        &[Value::string("va"), Value::string("ja")],
    );
}

#[test]
fn array_literals() {
    assert_instructions("[]", &[make(Opcode::Array, &[0]), make(Opcode::Pop, &[])]);
    assert_instructions(
        "[1, 2, 3]",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Array, &[3]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "[1 + 2, 3 - 4, 5 * 6]",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Add, &[]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[3]),
            make(Opcode::Sub, &[]),
            make(Opcode::Constant, &[4]),
            make(Opcode::Constant, &[5]),
            make(Opcode::Mul, &[]),
            make(Opcode::Array, &[3]),
            make(Opcode::Pop, &[]),
        ],
    );
}

#[test]
fn dict_literals_emit_keys_sorted_by_source_form() {
    assert_instructions("{}", &[make(Opcode::Dict, &[0]), make(Opcode::Pop, &[])]);
    assert_bytecode(
        "{1: 2, 3: 4, 5: 6}",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[3]),
            make(Opcode::Constant, &[4]),
            make(Opcode::Constant, &[5]),
            make(Opcode::Dict, &[6]),
            make(Opcode::Pop, &[]),
        ],
        &[
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4),
            Value::Integer(5),
            Value::Integer(6),
        ],
    );
    // Pairs written out of order are reordered by the key's source text.
    assert_bytecode(
        "{3: 4, 1: 2}",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[3]),
            make(Opcode::Dict, &[4]),
            make(Opcode::Pop, &[]),
        ],
        &[
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4),
        ],
    );
}

#[test]
fn index_expressions() {
    assert_instructions(
        "[1, 2, 3][1 + 1]",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Array, &[3]),
            make(Opcode::Constant, &[3]),
            make(Opcode::Constant, &[4]),
            make(Opcode::Add, &[]),
            make(Opcode::Index, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_instructions(
        "{1: 2}[2 - 1]",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Dict, &[2]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[3]),
            make(Opcode::Sub, &[]),
            make(Opcode::Index, &[]),
            make(Opcode::Pop, &[]),
        ],
    );
}

#[test]
fn functions() {
    assert_bytecode(
        "fct() { return 5 + 10 }",
        &[make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
        &[
            Value::Integer(5),
            Value::Integer(10),
            function(
                &[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Constant, &[1]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ],
                0,
                0,
            ),
        ],
    );
    // An implicit final expression compiles the same way as an explicit
    // return.
    assert_bytecode(
        "fct() { 5 + 10 }",
        &[make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
        &[
            Value::Integer(5),
            Value::Integer(10),
            function(
                &[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Constant, &[1]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ],
                0,
                0,
            ),
        ],
    );
    assert_bytecode(
        "fct() { 1; 2 }",
        &[make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
        &[
            Value::Integer(1),
            Value::Integer(2),
            function(
                &[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Pop, &[]),
                    make(Opcode::Constant, &[1]),
                    make(Opcode::ReturnValue, &[]),
                ],
                0,
                0,
            ),
        ],
    );
    assert_bytecode(
        "fct() { }",
        &[make(Opcode::Closure, &[0, 0]), make(Opcode::Pop, &[])],
        &[function(&[make(Opcode::Return, &[])], 0, 0)],
    );
}

#[test]
fn function_calls() {
    assert_bytecode(
        "fct() { 24 }();",
        &[
            make(Opcode::Closure, &[1, 0]),
            make(Opcode::Call, &[0]),
            make(Opcode::Pop, &[]),
        ],
        &[
            Value::Integer(24),
            function(
                &[make(Opcode::Constant, &[0]), make(Opcode::ReturnValue, &[])],
                0,
                0,
            ),
        ],
    );
    assert_instructions(
        "var noArg << fct() { 24 }; noArg();",
        &[
            make(Opcode::Closure, &[1, 0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::GetGlobal, &[0]),
            make(Opcode::Call, &[0]),
            make(Opcode::Pop, &[]),
        ],
    );
    assert_bytecode(
        "var oneArg << fct(a) { a }; oneArg(24);",
        &[
            make(Opcode::Closure, &[0, 0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::GetGlobal, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Call, &[1]),
            make(Opcode::Pop, &[]),
        ],
        &[
            function(
                &[make(Opcode::GetLocal, &[0]), make(Opcode::ReturnValue, &[])],
                1,
                1,
            ),
            Value::Integer(24),
        ],
    );
    assert_bytecode(
        "var manyArg << fct(a, b, c) { a; b; c }; manyArg(24, 25, 26);",
        &[
            make(Opcode::Closure, &[0, 0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::GetGlobal, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Constant, &[3]),
            make(Opcode::Call, &[3]),
            make(Opcode::Pop, &[]),
        ],
        &[
            function(
                &[
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Pop, &[]),
                    make(Opcode::GetLocal, &[1]),
                    make(Opcode::Pop, &[]),
                    make(Opcode::GetLocal, &[2]),
                    make(Opcode::ReturnValue, &[]),
                ],
                3,
                3,
            ),
            Value::Integer(24),
            Value::Integer(25),
            Value::Integer(26),
        ],
    );
}

#[test]
fn assign_statement_scopes() {
    assert_bytecode(
        "var num << 55; fct() { num }",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::Closure, &[1, 0]),
            make(Opcode::Pop, &[]),
        ],
        &[
            Value::Integer(55),
            function(
                &[make(Opcode::GetGlobal, &[0]), make(Opcode::ReturnValue, &[])],
                0,
                0,
            ),
        ],
    );
    assert_bytecode(
        "fct() { var num << 55; num }",
        &[make(Opcode::Closure, &[1, 0]), make(Opcode::Pop, &[])],
        &[
            Value::Integer(55),
            function(
                &[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::SetLocal, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::ReturnValue, &[]),
                ],
                1,
                0,
            ),
        ],
    );
    assert_bytecode(
        "fct() { var a << 55; var b << 77; a + b }",
        &[make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
        &[
            Value::Integer(55),
            Value::Integer(77),
            function(
                &[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::SetLocal, &[0]),
                    make(Opcode::Constant, &[1]),
                    make(Opcode::SetLocal, &[1]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::GetLocal, &[1]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ],
                2,
                0,
            ),
        ],
    );
}

#[test]
fn builtin_references_compile_to_indices() {
    assert_bytecode(
        "len([]); addToArrayEnd([], 1);",
        &[
            make(Opcode::GetBuiltin, &[0]),
            make(Opcode::Array, &[0]),
            make(Opcode::Call, &[1]),
            make(Opcode::Pop, &[]),
            make(Opcode::GetBuiltin, &[7]),
            make(Opcode::Array, &[0]),
            make(Opcode::Constant, &[0]),
            make(Opcode::Call, &[2]),
            make(Opcode::Pop, &[]),
        ],
        &[Value::Integer(1)],
    );
    assert_instructions(
        "fct() { len([]) }",
        &[make(Opcode::Closure, &[0, 0]), make(Opcode::Pop, &[])],
    );
    let bytecode = compile("fct() { len([]) }");
    assert_eq!(
        bytecode.constants,
        vec![function(
            &[
                make(Opcode::GetBuiltin, &[0]),
                make(Opcode::Array, &[0]),
                make(Opcode::Call, &[1]),
                make(Opcode::ReturnValue, &[]),
            ],
            0,
            0,
        )],
    );
}

#[test]
fn closures_load_free_variables_before_construction() {
    assert_bytecode(
        "fct(a) { fct(b) { a + b } }",
        &[make(Opcode::Closure, &[1, 0]), make(Opcode::Pop, &[])],
        &[
            function(
                &[
                    make(Opcode::GetFree, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ],
                1,
                1,
            ),
            function(
                &[
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Closure, &[0, 1]),
                    make(Opcode::ReturnValue, &[]),
                ],
                1,
                1,
            ),
        ],
    );
    assert_bytecode(
        "fct(a) { fct(b) { fct(c) { a + b + c } } }",
        &[make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
        &[
            function(
                &[
                    make(Opcode::GetFree, &[0]),
                    make(Opcode::GetFree, &[1]),
                    make(Opcode::Add, &[]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ],
                1,
                1,
            ),
            function(
                &[
                    make(Opcode::GetFree, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Closure, &[0, 2]),
                    make(Opcode::ReturnValue, &[]),
                ],
                1,
                1,
            ),
            function(
                &[
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Closure, &[1, 1]),
                    make(Opcode::ReturnValue, &[]),
                ],
                1,
                1,
            ),
        ],
    );
}

#[test]
fn recursive_functions_use_current_closure() {
    assert_bytecode(
        "var countDown << fct(x) { countDown(x - 1); }; countDown(1);",
        &[
            make(Opcode::Closure, &[1, 0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::GetGlobal, &[0]),
            make(Opcode::Constant, &[2]),
            make(Opcode::Call, &[1]),
            make(Opcode::Pop, &[]),
        ],
        &[
            Value::Integer(1),
            function(
                &[
                    make(Opcode::CurrentClosure, &[]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Sub, &[]),
                    make(Opcode::Call, &[1]),
                    make(Opcode::ReturnValue, &[]),
                ],
                1,
                1,
            ),
            Value::Integer(1),
        ],
    );
}

#[test]
fn compiler_scopes_restore_on_leave() {
    // Compiling a function and then more top-level code keeps emitting
    // into the right buffer.
    assert_instructions(
        "var num << 55; fct() { num }; num;",
        &[
            make(Opcode::Constant, &[0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::Closure, &[1, 0]),
            make(Opcode::Pop, &[]),
            make(Opcode::GetGlobal, &[0]),
            make(Opcode::Pop, &[]),
        ],
    );
}
