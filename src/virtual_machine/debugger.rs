//! Interactive step debugger.
//!
//! Wraps [`VM::step`] with a breakpoint set and a small command language.
//! Before every instruction the debugger prints its position and
//! disassembly, then decides whether to prompt:
//!
//! - in `step` mode it always prompts
//! - in `continue` mode it prompts only on a breakpoint
//!
//! Commands:
//!
//! | command                         | effect                                  |
//! |---------------------------------|-----------------------------------------|
//! | *(empty)*                       | repeat the current mode                 |
//! | `step`, `s`, `n`                | execute one instruction, stay stepping  |
//! | `continue`, `c`                 | run until the next breakpoint           |
//! | `breakpoint N`, `bp N`, `b N`   | add a breakpoint at position N          |
//! | `delete N`, `d N`               | remove the breakpoint at N              |
//! | `breakpoints`, `bl`             | list breakpoints                        |
//! | `print stack\|registers\|code`  | inspect state (`p`, `reg` also accepted)|
//! | `help`, `h`                     | command summary                         |
//! | `exit`, `x`, `quit`, `q`        | end the session                         |
//!
//! Everything except `step`, `continue` and the empty line prompts again
//! without executing. End of input ends the session.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::disassemble;
use crate::virtual_machine::vm::VM;
use crate::{debug, info};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};

pub const PROMPT: &str = "gvm.debugger> ";

const HELP: &str = "\
commands:
  <enter>                      repeat last step/continue
  step | s | n                 execute one instruction
  continue | c                 run until a breakpoint
  breakpoint | bp | b <pos>    add breakpoint
  delete | d <pos>             remove breakpoint
  breakpoints | bl             list breakpoints
  print | p <stack|registers|reg|code>
  help | h                     this message
  exit | x | quit | q          leave the debugger";

/// What the debugger does between prompts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Directive {
    Step,
    Continue,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum View {
    Stack,
    Registers,
    Code,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Command {
    /// Execute; `None` keeps the current directive.
    Resume(Option<Directive>),
    Exit,
    AddBreakpoint(usize),
    DeleteBreakpoint(usize),
    ListBreakpoints,
    Print(View),
    Help,
}

/// Result of one prompt cycle.
enum Flow {
    Execute,
    Exit,
}

fn parse_position(cmd: &str, arg: Option<&str>) -> Result<usize, String> {
    let arg = arg.ok_or_else(|| format!("`{cmd}` requires a position"))?;
    arg.parse::<usize>()
        .map_err(|_| format!("invalid position '{arg}'"))
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut tokens = line.split_whitespace();
    let Some(cmd) = tokens.next() else {
        return Ok(Command::Resume(None));
    };
    let arg = tokens.next();
    if let Some(extra) = tokens.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }

    match cmd {
        "step" | "s" | "n" => Ok(Command::Resume(Some(Directive::Step))),
        "continue" | "c" => Ok(Command::Resume(Some(Directive::Continue))),
        "exit" | "x" | "quit" | "q" => Ok(Command::Exit),
        "breakpoint" | "bp" | "b" => parse_position(cmd, arg).map(Command::AddBreakpoint),
        "delete" | "d" => parse_position(cmd, arg).map(Command::DeleteBreakpoint),
        "breakpoints" | "bl" => Ok(Command::ListBreakpoints),
        "help" | "h" => Ok(Command::Help),
        "print" | "p" => match arg {
            Some("stack") => Ok(Command::Print(View::Stack)),
            Some("registers" | "reg") => Ok(Command::Print(View::Registers)),
            Some("code") => Ok(Command::Print(View::Code)),
            Some(other) => Err(format!("unknown view '{other}'")),
            None => Err(format!("`{cmd}` requires stack, registers or code")),
        },
        other => Err(format!("unknown command '{other}'")),
    }
}

fn output_error(e: std::io::Error) -> VMError {
    VMError::OutputError {
        source: e.to_string(),
    }
}

/// Breakpoints and the sticky directive for one debugging session.
pub struct Debugger {
    breakpoints: BTreeSet<usize>,
    directive: Directive,
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            breakpoints: BTreeSet::new(),
            directive: Directive::Step,
        }
    }

    pub fn directive(&self) -> Directive {
        self.directive
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = usize> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Runs `vm` under debugger control until it halts or the user exits.
    ///
    /// Commands are read from `input`; listings, views and program output
    /// all go to `out`.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        vm: &mut VM,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), VMError> {
        info!("debug session started");
        while !vm.is_halted() {
            writeln!(out, "{:04}: {}", vm.ip(), vm.current_instruction()?)
                .map_err(output_error)?;

            if self.should_prompt(vm.ip())
                && let Flow::Exit = self.prompt(vm, input, out)?
            {
                info!("debug session ended by user at {}", vm.ip());
                return Ok(());
            }

            vm.step(out)?;
        }
        out.flush().map_err(output_error)?;
        info!("debug session finished: program halted");
        Ok(())
    }

    fn should_prompt(&self, ip: usize) -> bool {
        match self.directive {
            Directive::Step => true,
            Directive::Continue => self.breakpoints.contains(&ip),
        }
    }

    /// Reads commands until one of them resumes execution or ends the session.
    fn prompt<R: BufRead, W: Write>(
        &mut self,
        vm: &VM,
        input: &mut R,
        out: &mut W,
    ) -> Result<Flow, VMError> {
        loop {
            write!(out, "{PROMPT}").map_err(output_error)?;
            out.flush().map_err(output_error)?;

            let mut line = String::new();
            let read = input
                .read_line(&mut line)
                .map_err(|e| VMError::io("<console>", e))?;
            if read == 0 {
                writeln!(out).map_err(output_error)?;
                return Ok(Flow::Exit);
            }

            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(message) => {
                    writeln!(out, "error: {message}").map_err(output_error)?;
                    continue;
                }
            };
            debug!("debugger command {command:?}");

            match command {
                Command::Resume(directive) => {
                    if let Some(directive) = directive {
                        self.directive = directive;
                    }
                    return Ok(Flow::Execute);
                }
                Command::Exit => return Ok(Flow::Exit),
                Command::AddBreakpoint(pos) => {
                    self.breakpoints.insert(pos);
                }
                Command::DeleteBreakpoint(pos) => {
                    if !self.breakpoints.remove(&pos) {
                        writeln!(out, "error: no breakpoint at {pos}").map_err(output_error)?;
                    }
                }
                Command::ListBreakpoints => {
                    let list: Vec<usize> = self.breakpoints().collect();
                    writeln!(out, "breakpoints: {list:?}").map_err(output_error)?;
                }
                Command::Print(view) => self.print_view(vm, view, out)?,
                Command::Help => writeln!(out, "{HELP}").map_err(output_error)?,
            }
        }
    }

    fn print_view<W: Write>(&self, vm: &VM, view: View, out: &mut W) -> Result<(), VMError> {
        match view {
            View::Stack => writeln!(out, "{:?}", vm.stack()),
            View::Registers => writeln!(out, "{:?}", vm.registers()),
            View::Code => match disassemble(vm.code()) {
                Ok(lines) => lines.iter().try_for_each(|line| writeln!(out, "{line}")),
                Err(err) => writeln!(out, "error: {err}"),
            },
        }
        .map_err(output_error)
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}
