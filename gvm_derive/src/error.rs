//! Derive macro for error enums.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations.
//!
//! # Usage
//!
//! ```ignore
//! use gvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MachineError {
//!     #[error("unknown opcode {opcode} at {offset}")]
//!     UnknownOpcode { opcode: i64, offset: usize },
//!
//!     #[error("io error: {0}")]
//!     Io(String),
//!
//!     #[error("call stack underflow")]
//!     CallStackUnderflow,
//! }
//! ```
//!
//! Fields that the message does not mention are still allowed: only the
//! fields referenced by `{name}` (or `{0}`, `{1}`, ...) are passed to
//! `write!`, so a variant can carry context for programmatic use without
//! printing it.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

/// Derives `Display` and `Error` for an enum.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error derive only supports enums",
        ));
    };

    let arms = data_enum
        .variants
        .iter()
        .map(|variant| {
            let variant_name = &variant.ident;
            let message = message_of(variant)?;
            let used = referenced_names(&message);

            Ok(match &variant.fields {
                Fields::Unit => quote! {
                    Self::#variant_name => write!(f, #message),
                },
                Fields::Unnamed(fields) => {
                    let count = fields.unnamed.len();
                    let message = positional_to_named(&message, count);
                    let binds = (0..count).map(|i| {
                        if used.contains(&i.to_string()) {
                            let ident = format_ident!("f{}", i);
                            quote! { #ident }
                        } else {
                            quote! { _ }
                        }
                    });
                    let args = (0..count)
                        .filter(|i| used.contains(&i.to_string()))
                        .map(|i| {
                            let ident = format_ident!("f{}", i);
                            quote! { #ident = #ident }
                        });
                    quote! {
                        Self::#variant_name(#(#binds),*) => write!(f, #message #(, #args)*),
                    }
                }
                Fields::Named(fields) => {
                    let referenced: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|field| field.ident.as_ref())
                        .filter(|ident| used.contains(&ident.to_string()))
                        .collect();
                    quote! {
                        Self::#variant_name { #(#referenced,)* .. } => write!(f, #message #(, #referenced = #referenced)*),
                    }
                }
            })
        })
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Extracts the message from a variant's `#[error("...")]` attribute.
fn message_of(variant: &syn::Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "use #[error(\"message\")] to describe the error",
            ));
        };
        return match syn::parse2::<Lit>(list.tokens.clone()) {
            Ok(Lit::Str(lit)) => Ok(lit.value()),
            _ => Err(syn::Error::new_spanned(
                &attr.meta,
                "#[error] message must be a string literal, e.g. #[error(\"stack overflow: {capacity}\")]",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        &variant.ident,
        format!(
            "missing #[error(\"...\")] attribute on variant `{}`",
            variant.ident
        ),
    ))
}

/// Collects the argument names used by `{name}` / `{name:spec}` placeholders.
///
/// Escaped braces (`{{`) are skipped.
fn referenced_names(message: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = message.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            continue;
        }
        let mut name = String::new();
        while let Some(&n) = chars.peek() {
            if n == '}' || n == ':' {
                break;
            }
            name.push(n);
            chars.next();
        }
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Rewrites positional placeholders `{0}`, `{1:>4}` into `{f0}`, `{f1:>4}`.
fn positional_to_named(message: &str, count: usize) -> String {
    let mut result = message.to_string();
    for i in (0..count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
