//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction list and invokes a callback macro for code
//! generation, so the opcode enum, both mnemonic lookup directions, the
//! assembler's parser and the disassembler are all derived from one place.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<i64>` for decoding opcodes
//! - [`Instruction::from_mnemonic`] / [`Instruction::mnemonic`]
//! - Operand shapes used by the disassembler
//!
//! See [`assembler`](super::assembler) for the parsing side.
//!
//! # Code image format
//!
//! Every word of the code image is an `i64`. An instruction occupies
//! `1 + operand count` consecutive words: the opcode, then one word per
//! operand:
//! - Register operand: register index
//! - Immediate operand: the signed value itself
//! - Address operand: absolute position in the code image
//!
//! Two-register instructions take `src` first and `dst` second, and write
//! their result to `dst` (`sub r0 r1` computes `r1 = r1 - r0`).

use crate::virtual_machine::errors::VMError;
use std::fmt::Write;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Opcode numbers are part of the object file format; `isa_static_check`
/// fails if they change.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// HALT ; stop execution
            Halt = 0, "halt" => [],
            /// CONST imm, rd ; rd = imm
            Const = 1, "const" => [imm: Imm, rd: Reg],
            /// PUSH rs ; push rs onto the operand stack
            Push = 2, "push" => [rs: Reg],
            /// POP rd ; rd = pop operand stack
            Pop = 3, "pop" => [rd: Reg],
            /// INC rd ; rd = rd + 1
            Inc = 4, "inc" => [rd: Reg],
            /// DEC rd ; rd = rd - 1
            Dec = 5, "dec" => [rd: Reg],
            /// MOV rs, rd ; rd = rs
            Mov = 6, "mov" => [rs: Reg, rd: Reg],
            /// ADD rs, rd ; rd = rd + rs
            Add = 7, "add" => [rs: Reg, rd: Reg],
            /// SUB rs, rd ; rd = rd - rs
            Sub = 8, "sub" => [rs: Reg, rd: Reg],
            /// MUL rs, rd ; rd = rd * rs
            Mul = 9, "mul" => [rs: Reg, rd: Reg],
            /// DIV rs, rd ; rd = rd / rs (fault on division by zero)
            Div = 10, "div" => [rs: Reg, rd: Reg],
            /// REM rs, rd ; rd = rd % rs (fault on division by zero)
            Rem = 11, "rem" => [rs: Reg, rd: Reg],
            /// CMP rs, rd ; cmp = rd - rs
            Cmp = 12, "cmp" => [rs: Reg, rd: Reg],
            /// JMP target ; pc = target
            Jmp = 13, "jmp" => [target: Addr],
            /// JEQ target ; if cmp == 0 then pc = target
            Jeq = 14, "jeq" => [target: Addr],
            /// JNE target ; if cmp != 0 then pc = target
            Jne = 15, "jne" => [target: Addr],
            /// JGT target ; if cmp > 0 then pc = target
            Jgt = 16, "jgt" => [target: Addr],
            /// JLT target ; if cmp < 0 then pc = target
            Jlt = 17, "jlt" => [target: Addr],
            /// JGE target ; if cmp >= 0 then pc = target
            Jge = 18, "jge" => [target: Addr],
            /// JLE target ; if cmp <= 0 then pc = target
            Jle = 19, "jle" => [target: Addr],
            /// JERR target ; if err then err = 0, pc = target
            Jerr = 20, "jerr" => [target: Addr],
            /// SHOW rs ; print rs to the program output
            Show = 21, "show" => [rs: Reg],
            /// CALL target ; push return position, pc = target
            Call = 22, "call" => [target: Addr],
            /// RET ; pc = pop call stack
            Ret = 23, "ret" => [],
            /// NOOP ; do nothing
            Noop = 24, "noop" => [],
            /// IARG rs ; push args[rs] parsed as integer, or set err
            Iarg = 25, "iarg" => [rs: Reg],
        }
    };
}

/// Shape of a single instruction operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Register index, rendered as `r<N>`.
    Reg,
    /// Signed 64-bit immediate.
    Imm,
    /// Absolute code position (jump/call target).
    Addr,
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<i64> for Instruction {
            type Error = VMError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidInstruction {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction, in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Looks up an instruction by its assembly mnemonic (case-sensitive).
            pub fn from_mnemonic(name: &str) -> Result<Instruction, VMError> {
                match name {
                    $( $mnemonic => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidInstructionName {
                        name: name.to_string(),
                    }),
                }
            }

            /// Returns the operand shapes, in source and encoding order.
            pub const fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Instruction::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Number of operand words following the opcode.
    pub const fn arity(&self) -> usize {
        self.operands().len()
    }

    /// Total number of words this instruction occupies in the code image.
    pub const fn width(&self) -> usize {
        1 + self.arity()
    }

    /// Returns the opcode word for this instruction.
    pub const fn opcode(&self) -> i64 {
        *self as i64
    }
}

/// Renders the instruction at `pos` as assembly text.
///
/// Returns the text and the position of the following instruction. Address
/// operands are printed as absolute positions, which the assembler accepts
/// back verbatim.
pub fn disassemble_at(code: &[i64], pos: usize) -> Result<(String, usize), VMError> {
    let word = *code.get(pos).ok_or(VMError::UnexpectedEndOfBytecode {
        ip: pos,
        requested: 1,
        available: 0,
    })?;
    let instr = Instruction::try_from(word).map_err(|_| VMError::InvalidInstruction {
        opcode: word,
        offset: pos,
    })?;

    let end = pos + instr.width();
    let operands = code
        .get(pos + 1..end)
        .ok_or(VMError::UnexpectedEndOfBytecode {
            ip: pos + 1,
            requested: instr.arity(),
            available: code.len().saturating_sub(pos + 1),
        })?;

    let mut text = instr.mnemonic().to_string();
    for (kind, value) in instr.operands().iter().zip(operands) {
        let _ = match kind {
            OperandKind::Reg => write!(text, " r{value}"),
            OperandKind::Imm | OperandKind::Addr => write!(text, " {value}"),
        };
    }
    Ok((text, end))
}

/// Produces a full listing of `code`, one `NNNN: instr` line per instruction.
pub fn disassemble(code: &[i64]) -> Result<Vec<String>, VMError> {
    let mut lines = Vec::new();
    let mut pos = 0;
    while pos < code.len() {
        let (text, next) = disassemble_at(code, pos)?;
        lines.push(format!("{pos:04}: {text}"));
        pos = next;
    }
    Ok(lines)
}
