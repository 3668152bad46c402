use crate::types::encoding::DecodeError;
use gvm_derive::Error;

/// Errors that can occur during assembly, object file decoding, or execution.
#[derive(Debug, Error)]
pub enum VMError {
    // =========================
    // Assembly
    // =========================
    /// Unrecognized instruction mnemonic during assembly.
    #[error("unknown instruction '{name}'")]
    InvalidInstructionName { name: String },
    /// Wrong number of operands for an instruction.
    #[error("operand count mismatch: '{instruction}' expected {expected} operands, got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Expected a register operand (e.g., `r0`) but got something else.
    #[error("expected register ('r' or 'f' followed by an index), got '{token}'")]
    ExpectedRegister { token: String },
    /// Register token has the right sigil but a malformed index.
    #[error("invalid register '{token}': index must be a non-negative integer")]
    InvalidRegister { token: String },
    /// Immediate operand is not a signed 64-bit integer.
    #[error("expected integer, got '{token}'")]
    InvalidImmediate { token: String },
    /// Label defined more than once.
    #[error(
        "duplicate label '{label}': first defined on line {first_line} at {first_position}, redefined at {position}"
    )]
    DuplicateLabel {
        label: String,
        first_line: usize,
        first_position: usize,
        position: usize,
    },
    /// Sublabel defined or referenced before any ordinary label.
    #[error("orphan sublabel '{label}': no label defined before it")]
    OrphanSublabel { label: String },
    /// Reference to undefined label.
    #[error("reference to unknown label '{label}' at position {position}")]
    UndefinedLabel { label: String, position: usize },
    /// Assembly error with line/column context.
    #[error("line {line}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// File I/O error while reading source or object files, or writing output.
    #[error("io error on '{path}': {source}")]
    IoError { path: String, source: String },

    // =========================
    // Object files
    // =========================
    /// Object file header does not carry the expected magic value.
    #[error("expected header {expected} but got {actual}")]
    BadMagic { expected: i64, actual: i64 },
    /// Object file is truncated or otherwise malformed.
    #[error("decoding error: {reason}")]
    DecodeError { reason: String },

    // =========================
    // Execution
    // =========================
    /// Unknown opcode encountered in the code image.
    #[error("unexpected instruction code {opcode} at position {offset}")]
    InvalidInstruction { opcode: i64, offset: usize },
    /// Register operand outside the register file.
    #[error("register index {index} out of bounds (register file has {available})")]
    InvalidRegisterIndex { index: i64, available: usize },
    /// Code image ended while reading an instruction's operands.
    #[error(
        "unexpected end of code at position {ip}: needed {requested} words, {available} available"
    )]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// Jump, call or return to a negative position.
    #[error("invalid jump target {target} from position {ip}")]
    InvalidJumpTarget { target: i64, ip: usize },
    /// Push onto a full operand stack.
    #[error("stack overflow (capacity {capacity})")]
    StackOverflow { capacity: usize },
    /// Pop from an empty operand stack.
    #[error("stack underflow")]
    StackUnderflow,
    /// Call with a full call stack.
    #[error("call stack overflow (capacity {capacity})")]
    CallStackOverflow { capacity: usize },
    /// Return with an empty call stack.
    #[error("call stack underflow")]
    CallStackUnderflow,
    /// Division or remainder by zero.
    #[error("division by zero at position {ip}")]
    DivisionByZero { ip: usize },
    /// Program output could not be written.
    #[error("failed writing program output: {source}")]
    OutputError { source: String },
}

impl VMError {
    /// Wraps an assembly error with its source location.
    ///
    /// Errors that already carry a location are returned unchanged.
    pub(crate) fn at(self, line: usize, offset: usize) -> Self {
        match self {
            VMError::AssemblyError { .. } => self,
            other => VMError::AssemblyError {
                line,
                offset,
                source: other.to_string(),
            },
        }
    }

    pub(crate) fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        VMError::IoError {
            path: path.into(),
            source: err.to_string(),
        }
    }
}

impl From<DecodeError> for VMError {
    fn from(err: DecodeError) -> Self {
        let reason = match err {
            DecodeError::UnexpectedEof => "unexpected end of input",
            DecodeError::InvalidValue => "invalid value",
        };
        VMError::DecodeError {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_interpolates_fields() {
        let err = VMError::BadMagic {
            expected: 20200111,
            actual: 7,
        };
        assert_eq!(err.to_string(), "expected header 20200111 but got 7");
    }

    #[test]
    fn display_skips_unreferenced_fields() {
        let err = VMError::AssemblyError {
            line: 3,
            offset: 9,
            source: "unknown instruction 'foo'".into(),
        };
        assert_eq!(err.to_string(), "line 3: unknown instruction 'foo'");
    }

    #[test]
    fn at_wraps_once() {
        let err = VMError::StackUnderflow.at(4, 1).at(10, 2);
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 4, offset: 1, ref source } if source == "stack underflow"
        ));
    }
}
