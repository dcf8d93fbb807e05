//! Code generation for `#[resource]` on impl blocks.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use remora_macro_utils::{RemoraCrate, resolve_crate_path};
use std::collections::HashSet;
use syn::{ImplItem, ImplItemFn, ItemImpl, LitStr, ReturnType, Type};

use crate::common::{
    MemberRole, ResourceArgs, is_member_attr, is_result_type, is_vec_type, member_name,
    member_role, type_name_str, typed_params, validate_no_params, validate_public,
    validate_returns, validate_signature,
};

/// A `#[remote]` method ready for code generation.
struct RemoteMethod<'a> {
    name: String,
    method: &'a ImplItemFn,
    params: Vec<&'a Type>,
    variadic: bool,
}

/// Lifecycle and attribute hooks found in the impl block.
#[derive(Default)]
struct Hooks<'a> {
    local_attributes: Vec<(String, &'a ImplItemFn)>,
    params: Option<&'a ImplItemFn>,
    on_start: Option<&'a ImplItemFn>,
    on_stop: Option<&'a ImplItemFn>,
}

/// Generates the inherent impl and a `RemoteResource` impl.
pub(crate) fn generate_resource(args: &ResourceArgs, input: &ItemImpl) -> syn::Result<TokenStream> {
    let rr = resolve_crate_path(RemoraCrate::Resource);

    if let Some((_, trait_path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            trait_path,
            "#[resource] must be applied to an inherent impl block",
        ));
    }

    let self_ty = &input.self_ty;
    let (impl_generics, _ty_generics, where_clause) = input.generics.split_for_impl();

    let mut remote = Vec::new();
    let mut hooks = Hooks::default();

    for item in &input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let Some(role) = member_role(method)? else {
            continue;
        };
        collect_member(method, role, &mut remote, &mut hooks)?;
    }

    check_member_names(args, &remote)?;

    let class = match &args.class {
        Some(class) => class.clone(),
        None => LitStr::new(&type_name_str(self_ty)?, proc_macro2::Span::call_site()),
    };

    let descriptor = generate_descriptor(args, &class, &remote, &rr);
    let invoke = generate_invoke(&class, self_ty, &remote, &rr);
    let hook_fns = generate_hooks(self_ty, &hooks, &rr);

    // Original impl block with helper attributes stripped
    let cleaned_items = input.items.iter().map(|item| match item {
        ImplItem::Fn(method) => {
            let mut cleaned = method.clone();
            cleaned.attrs.retain(|attr| !is_member_attr(attr));
            ImplItem::Fn(cleaned)
        }
        other => other.clone(),
    });
    let impl_attrs = &input.attrs;

    Ok(quote! {
        #(#impl_attrs)*
        impl #impl_generics #self_ty #where_clause {
            #(#cleaned_items)*
        }

        impl #impl_generics #rr::RemoteResource for #self_ty #where_clause {
            #descriptor
            #invoke
            #hook_fns
        }
    })
}

fn collect_member<'a>(
    method: &'a ImplItemFn,
    role: MemberRole,
    remote: &mut Vec<RemoteMethod<'a>>,
    hooks: &mut Hooks<'a>,
) -> syn::Result<()> {
    let sig = &method.sig;
    match role {
        MemberRole::Remote { variadic } => {
            validate_signature(sig, "#[remote]")?;
            validate_public(method)?;
            let params = typed_params(sig)?;
            if variadic && !params.last().is_some_and(|ty| is_vec_type(ty)) {
                return Err(syn::Error::new_spanned(
                    &sig.ident,
                    "#[remote(variadic)] requires the last parameter to be a `Vec<T>`",
                ));
            }
            remote.push(RemoteMethod {
                name: member_name(&sig.ident),
                method,
                params,
                variadic,
            });
        }
        MemberRole::LocalAttribute => {
            validate_hook(method, "#[local_attribute]", true)?;
            hooks
                .local_attributes
                .push((member_name(&sig.ident), method));
        }
        MemberRole::Params => {
            validate_hook(method, "#[params]", true)?;
            set_once(&mut hooks.params, method, "#[params]")?;
        }
        MemberRole::OnStart => {
            validate_hook(method, "#[on_start]", false)?;
            set_once(&mut hooks.on_start, method, "#[on_start]")?;
        }
        MemberRole::OnStop => {
            validate_hook(method, "#[on_stop]", false)?;
            set_once(&mut hooks.on_stop, method, "#[on_stop]")?;
        }
    }
    Ok(())
}

fn validate_hook(method: &ImplItemFn, role: &str, returns_value: bool) -> syn::Result<()> {
    validate_signature(&method.sig, role)?;
    validate_no_params(&method.sig, role)?;
    if returns_value {
        validate_returns(&method.sig, role)?;
    } else if !(matches!(method.sig.output, ReturnType::Default)
        || is_result_type(&method.sig.output))
    {
        return Err(syn::Error::new_spanned(
            &method.sig.output,
            format!("{role} methods must return nothing or a `Result`"),
        ));
    }
    Ok(())
}

fn set_once<'a>(
    slot: &mut Option<&'a ImplItemFn>,
    method: &'a ImplItemFn,
    role: &str,
) -> syn::Result<()> {
    if slot.is_some() {
        return Err(syn::Error::new_spanned(
            &method.sig.ident,
            format!("only one {role} method is allowed per resource"),
        ));
    }
    *slot = Some(method);
    Ok(())
}

/// Rejects members that would be ambiguous for a proxy.
fn check_member_names(args: &ResourceArgs, remote: &[RemoteMethod]) -> syn::Result<()> {
    let mut attributes = HashSet::new();
    for ident in args.attribute_names() {
        attributes.insert(member_name(ident));
    }

    let mut seen = HashSet::new();
    for method in remote {
        let ident = &method.method.sig.ident;
        if attributes.contains(&method.name) {
            return Err(syn::Error::new_spanned(
                ident,
                format!(
                    "'{}' is declared both as a remote method and a remote attribute",
                    method.name
                ),
            ));
        }
        if !seen.insert(method.name.as_str()) {
            return Err(syn::Error::new_spanned(ident, "duplicate remote method"));
        }
    }
    Ok(())
}

fn generate_descriptor(
    args: &ResourceArgs,
    class: &LitStr,
    remote: &[RemoteMethod],
    rr: &TokenStream,
) -> TokenStream {
    let methods = remote.iter().map(|method| {
        let name = &method.name;
        let arity = if method.variadic {
            let min = method.params.len() - 1;
            quote!(#rr::Arity::AtLeast(#min))
        } else {
            let count = method.params.len();
            quote!(#rr::Arity::Exact(#count))
        };
        quote!(.method(#name, #arity))
    });

    let readers = args.readers.iter().map(member_name);
    let writers = args.writers.iter().map(member_name);
    let accessors = args.accessors.iter().map(member_name);
    let ttls = args.ttls.iter().map(|(ident, secs)| {
        let name = member_name(ident);
        quote!(.ttl(#name, ::core::time::Duration::from_secs(#secs)))
    });
    let name_attribute = args
        .name
        .as_ref()
        .map(|name| quote!(.name_attribute(#name)));

    quote! {
        fn descriptor(&self) -> &#rr::ResourceDescriptor {
            static __DESCRIPTOR: ::std::sync::OnceLock<#rr::ResourceDescriptor> =
                ::std::sync::OnceLock::new();
            __DESCRIPTOR.get_or_init(|| {
                #rr::ResourceDescriptor::builder(#class)
                    #(#methods)*
                    #(.reader(#readers))*
                    #(.writer(#writers))*
                    #(.accessor(#accessors))*
                    #(#ttls)*
                    #name_attribute
                    .build()
            })
        }
    }
}

fn generate_invoke(
    class: &LitStr,
    self_ty: &Type,
    remote: &[RemoteMethod],
    rr: &TokenStream,
) -> TokenStream {
    let arms = remote.iter().map(|method| {
        let name = &method.name;
        let ident = &method.method.sig.ident;
        let arg_idents: Vec<_> = (0..method.params.len())
            .map(|i| format_ident!("__arg{}", i))
            .collect();

        let (fixed, tail) = if method.variadic {
            method.params.split_at(method.params.len() - 1)
        } else {
            (method.params.as_slice(), &[][..])
        };

        let fixed_extractions = fixed.iter().zip(&arg_idents).map(|(ty, arg)| {
            quote! { let #arg: #ty = __arguments.next_arg()?; }
        });
        let finish = match tail.first() {
            Some(ty) => {
                let arg = &arg_idents[fixed.len()];
                quote! { let #arg: #ty = __arguments.rest()?; }
            }
            None => quote! { __arguments.finish()?; },
        };
        let binding = if fixed.is_empty() {
            quote! { let __arguments = #rr::Arguments::new(__method, __args); }
        } else {
            quote! { let mut __arguments = #rr::Arguments::new(__method, __args); }
        };

        let call = quote! { <#self_ty>::#ident(self, #(#arg_idents),*) };
        let result = match &method.method.sig.output {
            ReturnType::Default => quote! {
                #call;
                ::core::result::Result::Ok(#rr::Value::Null)
            },
            output if is_result_type(output) => quote! {
                match #call {
                    ::core::result::Result::Ok(__value) => #rr::into_value(__value),
                    ::core::result::Result::Err(__err) => ::core::result::Result::Err(
                        #rr::IntoRemoteError::into_remote_error(__err),
                    ),
                }
            },
            ReturnType::Type(..) => quote! { #rr::into_value(#call) },
        };

        quote! {
            #name => {
                #binding
                #(#fixed_extractions)*
                #finish
                #result
            }
        }
    });

    quote! {
        fn invoke(
            &self,
            __method: &str,
            __args: ::std::vec::Vec<#rr::Value>,
        ) -> ::core::result::Result<#rr::Value, #rr::RemoteError> {
            match __method {
                #(#arms)*
                _ => ::core::result::Result::Err(#rr::RemoteError::undefined_method(#class, __method)),
            }
        }
    }
}

fn generate_hooks(self_ty: &Type, hooks: &Hooks, rr: &TokenStream) -> TokenStream {
    let local_attribute = (!hooks.local_attributes.is_empty()).then(|| {
        let arms = hooks.local_attributes.iter().map(|(name, method)| {
            let ident = &method.sig.ident;
            quote! { #name => #rr::into_value(<#self_ty>::#ident(self)).ok(), }
        });
        quote! {
            fn local_attribute(&self, __key: &str) -> ::core::option::Option<#rr::Value> {
                match __key {
                    #(#arms)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    });

    let params = hooks.params.map(|method| {
        let ident = &method.sig.ident;
        quote! {
            fn params(&self) -> ::core::option::Option<#rr::Value> {
                #rr::into_value(<#self_ty>::#ident(self))
                    .ok()
                    .filter(|__value| !__value.is_null())
            }
        }
    });

    let lifecycle = |hook: Option<&ImplItemFn>, trait_fn: &str| {
        hook.map(|method| {
            let ident = &method.sig.ident;
            let trait_fn = format_ident!("{}", trait_fn);
            let call = match method.sig.output {
                ReturnType::Default => quote! {
                    <#self_ty>::#ident(self);
                    ::core::result::Result::Ok(())
                },
                ReturnType::Type(..) => quote! {
                    match <#self_ty>::#ident(self) {
                        ::core::result::Result::Ok(_) => ::core::result::Result::Ok(()),
                        ::core::result::Result::Err(__err) => ::core::result::Result::Err(
                            #rr::IntoRemoteError::into_remote_error(__err),
                        ),
                    }
                },
            };
            quote! {
                fn #trait_fn(&self) -> ::core::result::Result<(), #rr::RemoteError> {
                    #call
                }
            }
        })
    };
    let on_start = lifecycle(hooks.on_start, "on_resource_start");
    let on_stop = lifecycle(hooks.on_stop, "on_resource_stop");

    quote! {
        #local_attribute
        #params
        #on_start
        #on_stop
    }
}
