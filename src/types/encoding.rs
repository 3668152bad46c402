//! Binary encoding and decoding traits for deterministic serialization.
//!
//! All encoded data uses little-endian byte order, so object files written on
//! one host load on any other.
//!
//! # Binary Format
//!
//! - Integers: little-endian, fixed-width
//! - Composite types write their fields in order, with no padding
//!
//! # Example
//!
//! ```
//! use gvm::types::encoding::{Decode, Encode};
//!
//! let value: i64 = -42;
//! let bytes = value.to_bytes();
//! assert_eq!(i64::from_bytes(&bytes).unwrap(), value);
//! ```

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counter for computing encoded size without allocating memory.
///
/// Used by `Encode::to_bytes` to pre-allocate exact capacity before encoding.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self { len: 0 }
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Trait for types that can be serialized to binary format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new byte buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before expected data was read.
    UnexpectedEof,
    /// Data does not represent a valid value for the target type.
    InvalidValue,
}

/// Trait for types that can be deserialized from binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value from the input buffer.
    ///
    /// Advances the input slice past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value from a byte slice, requiring all bytes to be consumed.
    ///
    /// Returns `InvalidValue` if trailing bytes remain after decoding.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }

        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

impl Encode for i64 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_le_bytes());
    }
}

impl Decode for i64 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut word = [0u8; 8];
        word.copy_from_slice(read_bytes(input, 8)?);
        Ok(i64::from_le_bytes(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i64_little_endian_layout() {
        assert_eq!(
            0x0102_0304_0506_0708i64.to_bytes(),
            vec![8, 7, 6, 5, 4, 3, 2, 1]
        );
        assert_eq!((-1i64).to_bytes(), vec![0xFF; 8]);
    }

    #[test]
    fn size_counter_matches_encoding() {
        let mut counter = SizeCounter::new();
        7i64.encode(&mut counter);
        (-7i64).encode(&mut counter);
        assert_eq!(counter.len(), 16);
    }

    #[test]
    fn unexpected_eof_partial_input() {
        assert_eq!(
            i64::from_bytes(&[1, 2, 3]),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn trailing_bytes_error() {
        let mut bytes = 5i64.to_bytes();
        bytes.push(0);
        assert_eq!(i64::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn decode_advances_input() {
        let mut bytes = 1i64.to_bytes();
        bytes.extend(2i64.to_bytes());
        let mut input = bytes.as_slice();
        assert_eq!(i64::decode(&mut input).unwrap(), 1);
        assert_eq!(input.len(), 8);
        assert_eq!(i64::decode(&mut input).unwrap(), 2);
        assert!(input.is_empty());
    }
}
