//! Register-based virtual machine, its assembler and its tooling.
//!
//! # Architecture
//!
//! - **Registers**: 16 general-purpose `i64` registers, zero-initialized
//! - **Stacks**: a bounded operand stack and a separate bounded call stack
//! - **Flags**: comparison flag written by `cmp`, error flag written by `iarg`
//! - **Instruction format**: one `i64` word per opcode and per operand
//!
//! # Data flow
//!
//! Source text is assembled into a [`program::Program`], which can be written
//! to and read back from an object file, then executed directly by
//! [`vm::VM`] or stepped through [`debugger::Debugger`].
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, label resolution and diagnostics
//! - [`debugger`]: Interactive breakpoint/step controller
//! - [`errors`]: Assembly, object file and execution error types
//! - [`isa`]: Instruction set definition, opcode mappings and disassembly
//! - [`program`]: Object file format
//! - [`vm`]: Execution engine

pub mod assembler;
pub mod debugger;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod vm;
