//! Shared utilities for remora procedural macro crates.
//!
//! Generated code has to name runtime crates by path. A consumer may depend
//! on `remora_resource` directly, rename it, or only pull in the `remora`
//! umbrella crate; [`resolve_crate_path`] picks whichever is visible.

use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// A remora crate that macro-generated code may reference.
#[derive(Debug, Clone, Copy)]
pub enum RemoraCrate {
    /// `remora_resource`
    Resource,
}

impl RemoraCrate {
    fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "remora_resource",
        }
    }
}

/// Returns a [`TokenStream`] path for the given remora crate.
///
/// Resolution order:
/// 1. Direct dependency (possibly renamed in `Cargo.toml`), or the crate
///    itself when expanding inside its own tests.
/// 2. Indirect access via the `remora` umbrella crate (`remora::<name>`).
/// 3. The literal crate name, so the compile error names what is missing.
#[must_use]
pub fn resolve_crate_path(krate: RemoraCrate) -> TokenStream {
    let name = krate.as_str();

    match crate_name(name) {
        Ok(FoundCrate::Itself) => {
            let ident = format_ident!("{}", name);
            quote!(::#ident)
        }
        Ok(FoundCrate::Name(found)) => {
            let ident = format_ident!("{}", found);
            quote!(::#ident)
        }
        Err(_) => match crate_name("remora") {
            Ok(FoundCrate::Name(found)) => {
                let umbrella = format_ident!("{}", found);
                let ident = format_ident!("{}", name);
                quote!(::#umbrella::#ident)
            }
            // Tests and doctests of the umbrella link it under its own name.
            Ok(FoundCrate::Itself) => {
                let ident = format_ident!("{}", name);
                quote!(::remora::#ident)
            }
            Err(_) => {
                let ident = format_ident!("{}", name);
                quote!(::#ident)
            }
        },
    }
}
