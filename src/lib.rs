//! gvm: a small register-based virtual machine.
//!
//! Provides an assembler, an object file codec, an execution engine and an
//! interactive debugger, plus the logging and encoding utilities they share.

pub mod types;
pub mod utils;
pub mod virtual_machine;
