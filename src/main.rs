//! gvm command line.
//!
//! # Usage
//! ```text
//! gvm [l|L|-v|-vv] <command> ...
//! ```
//!
//! A leading `l`/`-v` raises log output to info, `L`/`-vv` to debug.
//!
//! # Commands
//! - `compile (c) <src> <obj>`: assemble a source file into an object file
//! - `run (r) <obj> [args...]`: execute an object file
//! - `disassemble (d) <obj>`: print a listing of an object file
//! - `debug (g) <obj> [args...]`: execute under the interactive debugger
//! - `cr <src> <obj> [args...]`: compile then run
//! - `cd <src> <obj>`: compile then disassemble
//! - `help (h)`: print usage
//!
//! Program output goes to stdout; diagnostics and logs go to stderr. Any
//! failure exits with status 1.

use gvm::utils::log::{Level, set_max_level};
use gvm::virtual_machine::assembler::assemble_file;
use gvm::virtual_machine::debugger::Debugger;
use gvm::virtual_machine::errors::VMError;
use gvm::virtual_machine::isa::disassemble;
use gvm::virtual_machine::program::Program;
use gvm::virtual_machine::vm::{ExecContext, MachineConfig, VM};
use gvm::{debug, error};
use std::env;
use std::io::{self, Write};
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map(String::as_str).unwrap_or("gvm");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "l" | "-v" => set_max_level(Level::Info),
            "L" | "-vv" => set_max_level(Level::Debug),
            _ => break,
        }
        i += 1;
    }

    let Some(command) = args.get(i) else {
        print_usage(program_name);
        process::exit(1);
    };
    let rest = &args[i + 1..];
    debug!("command '{command}' with {} argument(s)", rest.len());

    let result = match command.as_str() {
        "compile" | "c" => {
            let [src, obj] = expect_paths::<2>(command, rest, program_name);
            compile(src, obj).map(|_| ())
        }
        "run" | "r" => {
            let (obj, prog_args) = split_first(command, rest, program_name);
            Program::load(obj).and_then(|program| run(program, prog_args))
        }
        "disassemble" | "d" => {
            let [obj] = expect_paths::<1>(command, rest, program_name);
            Program::load(obj).and_then(|program| print_listing(&program))
        }
        "debug" | "g" => {
            let (obj, prog_args) = split_first(command, rest, program_name);
            Program::load(obj).and_then(|program| debug_program(program, prog_args))
        }
        "cr" => {
            if rest.len() < 2 {
                usage_error(command, program_name);
            }
            compile(&rest[0], &rest[1]).and_then(|program| run(program, &rest[2..]))
        }
        "cd" => {
            let [src, obj] = expect_paths::<2>(command, rest, program_name);
            compile(src, obj).and_then(|program| print_listing(&program))
        }
        "help" | "h" | "--help" | "-h" => {
            print_usage(program_name);
            Ok(())
        }
        other => {
            error!("Unknown command: {other}\n");
            print_usage(program_name);
            process::exit(1);
        }
    };

    if let Err(e) = result {
        // Assembly diagnostics have already been rendered with source context.
        if !matches!(e, VMError::AssemblyError { .. }) {
            error!("{e}");
        }
        process::exit(1);
    }
}

fn compile(src: &str, obj: &str) -> Result<Program, VMError> {
    let program = assemble_file(src)?;
    program.save(obj)?;
    Ok(program)
}

fn machine(program: Program, args: &[String]) -> VM {
    VM::with_config(
        program,
        ExecContext::new(args.to_vec()),
        &MachineConfig::from_env(),
    )
}

fn run(program: Program, args: &[String]) -> Result<(), VMError> {
    let mut vm = machine(program, args);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    vm.run(&mut out)
}

fn debug_program(program: Program, args: &[String]) -> Result<(), VMError> {
    let mut vm = machine(program, args);
    let stdin = io::stdin();
    let stdout = io::stdout();
    Debugger::new().run(&mut vm, &mut stdin.lock(), &mut stdout.lock())
}

fn print_listing(program: &Program) -> Result<(), VMError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in disassemble(&program.code)? {
        writeln!(out, "{line}").map_err(|e| VMError::OutputError {
            source: e.to_string(),
        })?;
    }
    Ok(())
}

fn expect_paths<'a, const N: usize>(
    command: &str,
    rest: &'a [String],
    program_name: &str,
) -> [&'a str; N] {
    if rest.len() != N {
        usage_error(command, program_name);
    }
    std::array::from_fn(|k| rest[k].as_str())
}

fn split_first<'a>(
    command: &str,
    rest: &'a [String],
    program_name: &str,
) -> (&'a str, &'a [String]) {
    match rest.split_first() {
        Some((first, tail)) => (first.as_str(), tail),
        None => usage_error(command, program_name),
    }
}

fn usage_error(command: &str, program_name: &str) -> ! {
    error!("Wrong number of arguments for '{command}'\n");
    print_usage(program_name);
    process::exit(1);
}

const USAGE: &str = "\
gvm virtual machine

USAGE:
    {program} [l|L|-v|-vv] <command> ...

COMMANDS:
    compile (c) <src> <obj>          Assemble <src> into object file <obj>
    run (r) <obj> [args...]          Execute object file <obj>
    disassemble (d) <obj>            Print a listing of <obj>
    debug (g) <obj> [args...]        Execute <obj> under the debugger
    cr <src> <obj> [args...]         Compile, then run
    cd <src> <obj>                   Compile, then disassemble
    help (h)                         Print this help message

FLAGS:
    l, -v                            Log at info level
    L, -vv                           Log at debug level

ENVIRONMENT:
    GVM_STACK_SIZE                   Operand stack capacity (default 1024)
    GVM_CALL_STACK_SIZE              Call stack capacity (default 128)

EXAMPLES:
    {program} cr count.asm count.bin 10
    {program} -v disassemble count.bin
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
