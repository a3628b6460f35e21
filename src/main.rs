use std::env;
use std::fs;
use std::io::{self, BufRead, Write};

use vaja::compiler::Compiler;
use vaja::lexer::Lexer;
use vaja::parser::Parser;
use vaja::symbol_table::SymbolTable;
use vaja::toolbox;
use vaja::value::Value;
use vaja::vm::{GLOBALS_SIZE, VM};

const PROMPT: &str = ">> ";

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None => start_shell(),
        Some("run") => {
            let Some(filename) = args.get(2) else {
                print_usage();
                std::process::exit(1);
            };
            run_file(filename);
        }
        Some(_) => {
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("Usage:");
    println!("  vaja                 - Start the interactive shell");
    println!("  vaja run <file.vaja> - Compile and run a script");
}

fn run_file(filename: &str) {
    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read file {}: {}", filename, err);
            std::process::exit(1);
        }
    };

    let mut parser = Parser::new(Lexer::new(&source));
    let program = parser.parse_program();
    if !parser.errors.is_empty() {
        eprintln!("Parser errors:");
        for error in &parser.errors {
            eprintln!("\t{}", error);
        }
        std::process::exit(1);
    }

    let mut compiler = Compiler::new();
    if let Err(err) = compiler.compile(&program) {
        eprintln!("Compilation failed: {}", err);
        std::process::exit(1);
    }

    let mut vm = VM::new(compiler.bytecode());
    if let Err(err) = vm.run() {
        eprintln!("Executing bytecode failed: {}", err);
        std::process::exit(1);
    }

    let result = vm.last_popped_stack_elem();
    if *result != Value::Null {
        println!("{}", result);
    }
}

/// Read one input at a time, keeping globals, constants, and the symbol
/// table alive across lines so bindings persist.
fn start_shell() {
    let stdin = io::stdin();

    let mut symbol_table = SymbolTable::new();
    for (index, builtin) in toolbox::BUILTINS.iter().enumerate() {
        symbol_table.define_builtin(index, builtin.name);
    }
    let mut constants: Vec<Value> = Vec::new();
    let mut globals: Vec<Value> = vec![Value::Null; GLOBALS_SIZE];

    loop {
        print!("{}", PROMPT);
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let mut parser = Parser::new(Lexer::new(&line));
        let program = parser.parse_program();
        if !parser.errors.is_empty() {
            print_parser_errors(&parser.errors);
            continue;
        }

        let mut compiler = Compiler::new_with_state(symbol_table, constants);
        if let Err(err) = compiler.compile(&program) {
            println!("Woops! Compilation failed:\n {}", err);
            (symbol_table, constants) = compiler.into_state();
            continue;
        }

        let bytecode = compiler.bytecode();
        (symbol_table, constants) = compiler.into_state();

        let mut vm = VM::new_with_globals_store(bytecode, globals);
        match vm.run() {
            Ok(()) => {
                let result = vm.last_popped_stack_elem();
                if *result != Value::Null {
                    println!("{}", result);
                }
            }
            Err(err) => println!("Woops! Executing bytecode failed:\n {}", err),
        }
        globals = vm.into_globals();
    }
}

fn print_parser_errors(errors: &[String]) {
    println!("Woops! We ran into some 'I need a beer' business here!");
    println!("Parser errors:");
    for error in errors {
        println!("\t{}", error);
    }
}
