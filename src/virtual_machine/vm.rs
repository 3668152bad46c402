//! Core virtual machine implementation.
//!
//! The VM interprets a flat code image of `i64` words against a register
//! file, an operand stack, a separate call stack and two flags:
//!
//! - the comparison flag, holding `dst - src` of the last `cmp`
//! - the error flag, set by a failed `iarg` and cleared by `jerr`
//!
//! Arithmetic wraps on overflow. Stack overflow/underflow, unknown opcodes,
//! bad register indices and division by zero are faults that stop
//! execution; output already written stays written.

mod context;
mod registers;
mod stack;

pub use context::{CALL_STACK_SIZE, ExecContext, MachineConfig, REGISTER_COUNT, STACK_SIZE};

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, disassemble_at};
use crate::virtual_machine::program::Program;
use registers::Registers;
use stack::{BoundedStack, StackKind};
use std::io::Write;

/// Outcome of a single [`VM::step`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VMStatus {
    /// More instructions remain.
    Running,
    /// The program counter is at or past the end of the code image.
    Halted,
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        out = $out:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    let instr_name = $instr.mnemonic();
                    exec_vm!(@call $vm, $out, instr_name, $handler, $args)
                }
            ),*
        }
    }};

    // Handler that writes program output (semicolon separator)
    (@call $vm:ident, $out:ident, $instr_name:expr, $handler:ident,
        (out; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $kind)?; )*
        $vm.$handler($instr_name, $out, $( $field ),*)
    }};

    // Handler without output (no semicolon)
    (@call $vm:ident, $out:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $kind)?; )*
        $vm.$handler($instr_name, $( $field ),*)
    }};

    // Register index, immediate and code position are all one raw word
    (@read $vm:ident, Reg) => {{ $vm.read_word() }};
    (@read $vm:ident, Imm) => {{ $vm.read_word() }};
    (@read $vm:ident, Addr) => {{ $vm.read_word() }};
}

/// Register-based virtual machine.
///
/// Executes a code image one instruction at a time until the program
/// counter leaves the image.
pub struct VM {
    /// Code image to execute.
    code: Vec<i64>,
    /// Program counter (next word to decode).
    ip: usize,
    /// Position of the instruction currently executing.
    instr_offset: usize,
    registers: Registers,
    stack: BoundedStack<i64>,
    call_stack: BoundedStack<usize>,
    cmp_flag: i64,
    err_flag: bool,
    args: Vec<String>,
}

impl VM {
    /// Creates a VM with the default machine capacities.
    pub fn new(program: Program, ctx: ExecContext) -> Self {
        Self::with_config(program, ctx, &MachineConfig::default())
    }

    /// Creates a VM with explicit capacities.
    pub fn with_config(program: Program, ctx: ExecContext, config: &MachineConfig) -> Self {
        Self {
            code: program.code,
            ip: 0,
            instr_offset: 0,
            registers: Registers::new(config.registers),
            stack: BoundedStack::new(config.stack_size, StackKind::Operand),
            call_stack: BoundedStack::new(config.call_stack_size, StackKind::Call),
            cmp_flag: 0,
            err_flag: false,
            args: ctx.args,
        }
    }

    /// Executes until the program halts or faults.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<(), VMError> {
        while self.step(out)? == VMStatus::Running {}
        out.flush().map_err(|e| VMError::OutputError {
            source: e.to_string(),
        })
    }

    /// Decodes and executes exactly one instruction.
    ///
    /// Calling this on a halted machine does nothing.
    pub fn step<W: Write>(&mut self, out: &mut W) -> Result<VMStatus, VMError> {
        if self.is_halted() {
            return Ok(VMStatus::Halted);
        }

        let opcode_offset = self.ip;
        let opcode = self.code[opcode_offset];
        let instr = Instruction::try_from(opcode).map_err(|_| VMError::InvalidInstruction {
            opcode,
            offset: opcode_offset,
        })?;
        self.instr_offset = opcode_offset;
        self.ip += 1;
        self.exec(instr, out)?;

        Ok(if self.is_halted() {
            VMStatus::Halted
        } else {
            VMStatus::Running
        })
    }

    /// True once the program counter is at or past the end of the code.
    pub fn is_halted(&self) -> bool {
        self.ip >= self.code.len()
    }

    /// Disassembles the instruction at the program counter.
    pub fn current_instruction(&self) -> Result<String, VMError> {
        disassemble_at(&self.code, self.ip).map(|(text, _)| text)
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn registers(&self) -> &[i64] {
        self.registers.as_slice()
    }

    /// Live operand stack contents, bottom first.
    pub fn stack(&self) -> &[i64] {
        self.stack.as_slice()
    }

    /// Pending return positions, outermost first.
    pub fn call_stack(&self) -> &[usize] {
        self.call_stack.as_slice()
    }

    pub fn cmp_flag(&self) -> i64 {
        self.cmp_flag
    }

    pub fn err_flag(&self) -> bool {
        self.err_flag
    }

    pub fn code(&self) -> &[i64] {
        &self.code
    }

    /// Reads one operand word and advances the program counter.
    fn read_word(&mut self) -> Result<i64, VMError> {
        let word = *self
            .code
            .get(self.ip)
            .ok_or(VMError::UnexpectedEndOfBytecode {
                ip: self.ip,
                requested: 1,
                available: 0,
            })?;
        self.ip += 1;
        Ok(word)
    }

    /// Executes a single instruction.
    fn exec<W: Write>(&mut self, instruction: Instruction, out: &mut W) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            out = out,
            instr = instruction,
            {
                Halt => op_halt(),
                Const => op_const(imm: Imm, rd: Reg),
                // Stack
                Push => op_push(rs: Reg),
                Pop => op_pop(rd: Reg),
                // Arithmetic
                Inc => op_inc(rd: Reg),
                Dec => op_dec(rd: Reg),
                Mov => op_mov(rs: Reg, rd: Reg),
                Add => op_add(rs: Reg, rd: Reg),
                Sub => op_sub(rs: Reg, rd: Reg),
                Mul => op_mul(rs: Reg, rd: Reg),
                Div => op_div(rs: Reg, rd: Reg),
                Rem => op_rem(rs: Reg, rd: Reg),
                Cmp => op_cmp(rs: Reg, rd: Reg),
                // Control flow
                Jmp => op_jmp(target: Addr),
                Jeq => op_jeq(target: Addr),
                Jne => op_jne(target: Addr),
                Jgt => op_jgt(target: Addr),
                Jlt => op_jlt(target: Addr),
                Jge => op_jge(target: Addr),
                Jle => op_jle(target: Addr),
                Jerr => op_jerr(target: Addr),
                Call => op_call(target: Addr),
                Ret => op_ret(),
                Noop => op_noop(),
                // I/O
                Show => op_show(out; rs: Reg),
                Iarg => op_iarg(rs: Reg),
            }
        }
    }

    fn jump_to(&mut self, target: i64) -> Result<(), VMError> {
        self.ip = usize::try_from(target).map_err(|_| VMError::InvalidJumpTarget {
            target,
            ip: self.instr_offset,
        })?;
        Ok(())
    }

    fn jump_if(&mut self, cond: bool, target: i64) -> Result<(), VMError> {
        if cond { self.jump_to(target) } else { Ok(()) }
    }

    /// Applies `f(dst, src)` and stores the result in `dst`.
    fn binary_op(
        &mut self,
        rs: i64,
        rd: i64,
        f: impl FnOnce(i64, i64) -> i64,
    ) -> Result<(), VMError> {
        let src = self.registers.get(rs)?;
        let dst = self.registers.get(rd)?;
        self.registers.set(rd, f(dst, src))
    }

    fn divisor(&self, rs: i64) -> Result<i64, VMError> {
        match self.registers.get(rs)? {
            0 => Err(VMError::DivisionByZero {
                ip: self.instr_offset,
            }),
            v => Ok(v),
        }
    }

    fn op_halt(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.ip = self.code.len();
        Ok(())
    }

    fn op_const(&mut self, _instr: &'static str, imm: i64, rd: i64) -> Result<(), VMError> {
        self.registers.set(rd, imm)
    }

    fn op_push(&mut self, _instr: &'static str, rs: i64) -> Result<(), VMError> {
        let v = self.registers.get(rs)?;
        self.stack.push(v)
    }

    fn op_pop(&mut self, _instr: &'static str, rd: i64) -> Result<(), VMError> {
        let v = self.stack.pop()?;
        self.registers.set(rd, v)
    }

    fn op_inc(&mut self, _instr: &'static str, rd: i64) -> Result<(), VMError> {
        let v = self.registers.get(rd)?;
        self.registers.set(rd, v.wrapping_add(1))
    }

    fn op_dec(&mut self, _instr: &'static str, rd: i64) -> Result<(), VMError> {
        let v = self.registers.get(rd)?;
        self.registers.set(rd, v.wrapping_sub(1))
    }

    fn op_mov(&mut self, _instr: &'static str, rs: i64, rd: i64) -> Result<(), VMError> {
        let v = self.registers.get(rs)?;
        self.registers.set(rd, v)
    }

    fn op_add(&mut self, _instr: &'static str, rs: i64, rd: i64) -> Result<(), VMError> {
        self.binary_op(rs, rd, i64::wrapping_add)
    }

    fn op_sub(&mut self, _instr: &'static str, rs: i64, rd: i64) -> Result<(), VMError> {
        self.binary_op(rs, rd, i64::wrapping_sub)
    }

    fn op_mul(&mut self, _instr: &'static str, rs: i64, rd: i64) -> Result<(), VMError> {
        self.binary_op(rs, rd, i64::wrapping_mul)
    }

    fn op_div(&mut self, _instr: &'static str, rs: i64, rd: i64) -> Result<(), VMError> {
        self.divisor(rs)?;
        self.binary_op(rs, rd, i64::wrapping_div)
    }

    fn op_rem(&mut self, _instr: &'static str, rs: i64, rd: i64) -> Result<(), VMError> {
        self.divisor(rs)?;
        self.binary_op(rs, rd, i64::wrapping_rem)
    }

    fn op_cmp(&mut self, _instr: &'static str, rs: i64, rd: i64) -> Result<(), VMError> {
        let src = self.registers.get(rs)?;
        let dst = self.registers.get(rd)?;
        self.cmp_flag = dst.wrapping_sub(src);
        Ok(())
    }

    fn op_jmp(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        self.jump_to(target)
    }

    fn op_jeq(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        self.jump_if(self.cmp_flag == 0, target)
    }

    fn op_jne(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        self.jump_if(self.cmp_flag != 0, target)
    }

    fn op_jgt(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        self.jump_if(self.cmp_flag > 0, target)
    }

    fn op_jlt(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        self.jump_if(self.cmp_flag < 0, target)
    }

    fn op_jge(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        self.jump_if(self.cmp_flag >= 0, target)
    }

    fn op_jle(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        self.jump_if(self.cmp_flag <= 0, target)
    }

    fn op_jerr(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        if self.err_flag {
            self.err_flag = false;
            self.jump_to(target)?;
        }
        Ok(())
    }

    fn op_call(&mut self, _instr: &'static str, target: i64) -> Result<(), VMError> {
        // ip already points past the operand
        self.call_stack.push(self.ip)?;
        self.jump_to(target)
    }

    fn op_ret(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.ip = self.call_stack.pop()?;
        Ok(())
    }

    fn op_noop(&mut self, _instr: &'static str) -> Result<(), VMError> {
        Ok(())
    }

    fn op_show<W: Write>(
        &mut self,
        _instr: &'static str,
        out: &mut W,
        rs: i64,
    ) -> Result<(), VMError> {
        let v = self.registers.get(rs)?;
        writeln!(out, "{v}").map_err(|e| VMError::OutputError {
            source: e.to_string(),
        })
    }

    fn op_iarg(&mut self, _instr: &'static str, rs: i64) -> Result<(), VMError> {
        let idx = self.registers.get(rs)?;
        let parsed = usize::try_from(idx)
            .ok()
            .and_then(|i| self.args.get(i))
            .and_then(|arg| arg.parse::<i64>().ok());
        match parsed {
            Some(v) => self.stack.push(v),
            None => {
                self.err_flag = true;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests;
