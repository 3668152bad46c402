//! Serialization primitives shared by on-disk formats.
//!
//! - [`encoding`]: `Encode`/`Decode` traits for deterministic little-endian
//!   binary encoding

pub mod encoding;
