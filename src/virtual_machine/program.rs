//! Object file representation and serialization.
//!
//! A [`Program`] is the flat code image produced by the assembler. On disk it
//! is stored as three little-endian sections:
//!
//! | offset | field        | type          |
//! |--------|--------------|---------------|
//! | 0      | magic header | `i64`         |
//! | 8      | word count N | `i64`         |
//! | 16     | code words   | N x `i64`     |

use crate::types::encoding::{Decode, Encode, EncodeSink};
use crate::virtual_machine::errors::VMError;
use crate::{info, warn};
use std::io::{Read, Write};

/// Magic value identifying a gvm object file.
pub const MAGIC: i64 = 20200111;

/// Size of one encoded word in bytes.
const WORD_SIZE: usize = 8;

/// Compiled code image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    /// Instruction words, opcode followed by operands.
    pub code: Vec<i64>,
}

impl Encode for Program {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        MAGIC.encode(out);
        (self.code.len() as i64).encode(out);
        for word in &self.code {
            word.encode(out);
        }
    }
}

impl Program {
    /// Wraps an existing code image.
    pub fn new(code: Vec<i64>) -> Self {
        Self { code }
    }

    /// Deserializes a program from its binary representation.
    ///
    /// Validates the magic header and that the declared number of words is
    /// present. Bytes after the last word are ignored.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, VMError> {
        let magic = i64::decode(&mut input)?;
        if magic != MAGIC {
            return Err(VMError::BadMagic {
                expected: MAGIC,
                actual: magic,
            });
        }

        let count = i64::decode(&mut input)?;
        let count = usize::try_from(count).map_err(|_| VMError::DecodeError {
            reason: format!("negative word count {count}"),
        })?;
        let needed = count.checked_mul(WORD_SIZE).unwrap_or(usize::MAX);
        if input.len() < needed {
            return Err(VMError::DecodeError {
                reason: format!(
                    "truncated code section: expected {count} words, found {}",
                    input.len() / WORD_SIZE
                ),
            });
        }

        let mut code = Vec::with_capacity(count);
        for _ in 0..count {
            code.push(i64::decode(&mut input)?);
        }

        if !input.is_empty() {
            warn!("ignoring {} trailing bytes after code section", input.len());
        }
        Ok(Self { code })
    }

    /// Reads a whole object file from `reader`.
    ///
    /// `path` is used only for error messages.
    pub fn read_from<R: Read>(mut reader: R, path: &str) -> Result<Self, VMError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| VMError::io(path, e))?;
        let program = Self::from_bytes(&bytes)?;
        info!("loaded {} words from {path}", program.code.len());
        Ok(program)
    }

    /// Writes the object file encoding of this program to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W, path: &str) -> Result<(), VMError> {
        writer
            .write_all(&self.to_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| VMError::io(path, e))?;
        info!("wrote {} words to {path}", self.code.len());
        Ok(())
    }

    /// Loads an object file from disk.
    pub fn load(path: &str) -> Result<Self, VMError> {
        let file = std::fs::File::open(path).map_err(|e| VMError::io(path, e))?;
        Self::read_from(std::io::BufReader::new(file), path)
    }

    /// Saves this program to disk, replacing any existing file.
    pub fn save(&self, path: &str) -> Result<(), VMError> {
        let file = std::fs::File::create(path).map_err(|e| VMError::io(path, e))?;
        self.write_to(std::io::BufWriter::new(file), path)
    }
}
