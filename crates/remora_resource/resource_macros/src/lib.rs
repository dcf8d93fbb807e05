//! Procedural macros for declaring remora resources.
//!
//! Provides `#[resource]`, which turns an inherent impl block into a
//! `RemoteResource` implementation with a once-built descriptor.

mod common;
mod resource;

use proc_macro::TokenStream;

/// Declares a remotely callable resource from an impl block.
///
/// # Resource properties
///
/// - `class = "Module::Type"`: logical class (defaults to the type name)
/// - `name = "attr"`: attribute whose value names each instance
/// - `reader(a, b)`, `writer(..)`, `accessor(..)`: remote attributes
/// - `ttl(attr = seconds)`: attribute values expire after `seconds`
///
/// # Method attributes
///
/// - `#[remote]`: a remote method; must be `pub` and take `&self`
/// - `#[remote(variadic)]`: the final `Vec<T>` parameter takes any number
///   of trailing arguments
/// - `#[local_attribute]`: serves the attribute of the same name from the
///   instance itself (used for the name attribute)
/// - `#[params]`: initialization parameters stored on registration
/// - `#[on_start]` / `#[on_stop]`: dispatcher lifecycle callbacks; they
///   return nothing or a `Result`, and a failed `#[on_start]` keeps the
///   dispatcher from starting
///
/// Remote methods returning `Result<T, E>` send `E` back as a
/// `RemoteError`; `E` must implement `std::error::Error`.
///
/// # Example
///
/// ```
/// use remora_resource::resource;
///
/// struct Greeter;
///
/// #[resource(class = "Demo::Greeter", reader(greeting))]
/// impl Greeter {
///     #[remote]
///     pub fn greet(&self, who: String) -> String {
///         format!("hello {who}")
///     }
///
///     #[on_start]
///     fn started(&self) {}
/// }
/// ```
#[proc_macro_attribute]
pub fn resource(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = common::ResourceArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    syn::parse_macro_input!(attr with parser);

    let input = syn::parse_macro_input!(item as syn::ItemImpl);
    resource::generate_resource(&args, &input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
