//! Derive macros for the gvm crate.
//!
//! Provides `#[derive(Error)]`, the error type boilerplate used by
//! [`VMError`](../gvm/virtual_machine/errors/enum.VMError.html).

mod error;

use proc_macro::TokenStream;

/// Automatically implements `Display` and `Error` traits for error types.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
