//! Shared parsing and validation for resource macro code generation.

use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{
    Attribute, FnArg, GenericArgument, Ident, ImplItemFn, LitInt, LitStr, PathArguments,
    ReturnType, Signature, Type, Visibility,
};

// ─────────────────────────────────────────────────────────────────────────────
// #[resource(...)] arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed `#[resource(...)]` arguments.
#[derive(Default)]
pub(crate) struct ResourceArgs {
    /// `class = "..."`; defaults to the impl target's type name.
    pub class: Option<LitStr>,
    /// `name = "..."`: the name attribute.
    pub name: Option<LitStr>,
    pub readers: Vec<Ident>,
    pub writers: Vec<Ident>,
    pub accessors: Vec<Ident>,
    /// `ttl(attr = seconds)`
    pub ttls: Vec<(Ident, u64)>,
}

impl ResourceArgs {
    pub(crate) fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("class") {
            self.class = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("reader") {
            parse_ident_list(&meta, &mut self.readers)
        } else if meta.path.is_ident("writer") {
            parse_ident_list(&meta, &mut self.writers)
        } else if meta.path.is_ident("accessor") {
            parse_ident_list(&meta, &mut self.accessors)
        } else if meta.path.is_ident("ttl") {
            meta.parse_nested_meta(|inner| {
                let attr = inner.path.require_ident()?.clone();
                let secs: LitInt = inner.value()?.parse()?;
                self.ttls.push((attr, secs.base10_parse()?));
                Ok(())
            })
        } else {
            Err(meta.error(
                "unsupported #[resource] property; expected one of \
                 class, name, reader, writer, accessor, ttl",
            ))
        }
    }

    /// Every declared attribute name.
    pub(crate) fn attribute_names(&self) -> impl Iterator<Item = &Ident> {
        self.readers
            .iter()
            .chain(&self.writers)
            .chain(&self.accessors)
            .chain(self.ttls.iter().map(|(ident, _)| ident))
    }
}

fn parse_ident_list(meta: &ParseNestedMeta, out: &mut Vec<Ident>) -> syn::Result<()> {
    meta.parse_nested_meta(|inner| {
        out.push(inner.path.require_ident()?.clone());
        Ok(())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Member attributes
// ─────────────────────────────────────────────────────────────────────────────

/// Helper attributes recognised on methods of a `#[resource]` impl.
pub(crate) const MEMBER_ATTRS: &[&str] = &["remote", "local_attribute", "params", "on_start", "on_stop"];

/// Role of one method in the impl block.
pub(crate) enum MemberRole {
    Remote { variadic: bool },
    LocalAttribute,
    Params,
    OnStart,
    OnStop,
}

/// Reads the role of `method`, if any. A method may carry one role only.
pub(crate) fn member_role(method: &ImplItemFn) -> syn::Result<Option<MemberRole>> {
    let mut role = None;
    for attr in &method.attrs {
        let Some(found) = parse_role(attr)? else {
            continue;
        };
        if role.is_some() {
            return Err(syn::Error::new_spanned(
                attr,
                "a #[resource] method can only have one of \
                 #[remote], #[local_attribute], #[params], #[on_start], #[on_stop]",
            ));
        }
        role = Some(found);
    }
    Ok(role)
}

fn parse_role(attr: &Attribute) -> syn::Result<Option<MemberRole>> {
    let path = attr.path();
    if path.is_ident("remote") {
        let mut variadic = false;
        if let syn::Meta::List(_) = &attr.meta {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("variadic") {
                    variadic = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported #[remote] option; expected `variadic`"))
                }
            })?;
        }
        return Ok(Some(MemberRole::Remote { variadic }));
    }

    let role = if path.is_ident("local_attribute") {
        MemberRole::LocalAttribute
    } else if path.is_ident("params") {
        MemberRole::Params
    } else if path.is_ident("on_start") {
        MemberRole::OnStart
    } else if path.is_ident("on_stop") {
        MemberRole::OnStop
    } else {
        return Ok(None);
    };
    attr.meta.require_path_only()?;
    Ok(Some(role))
}

/// Returns `true` for the helper attributes stripped from the output.
pub(crate) fn is_member_attr(attr: &Attribute) -> bool {
    MEMBER_ATTRS.iter().any(|name| attr.path().is_ident(name))
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature checks
// ─────────────────────────────────────────────────────────────────────────────

/// Rejects async, unsafe, extern, and generic functions.
pub(crate) fn validate_signature(sig: &Signature, role: &str) -> syn::Result<()> {
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            format!("{role} methods cannot be async; the dispatcher runs them on its own thread"),
        ));
    }
    if let Some(unsafety) = &sig.unsafety {
        return Err(syn::Error::new_spanned(
            unsafety,
            format!("{role} cannot be applied to unsafe functions"),
        ));
    }
    if let Some(abi) = &sig.abi {
        return Err(syn::Error::new_spanned(
            abi,
            format!("{role} cannot be applied to extern functions"),
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            format!("{role} does not support generic parameters"),
        ));
    }
    validate_receiver(sig, role)
}

/// Requires `&self` as the first parameter.
fn validate_receiver(sig: &Signature, role: &str) -> syn::Result<()> {
    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver)) => {
            if receiver.reference.is_none() || receiver.mutability.is_some() {
                return Err(syn::Error::new_spanned(
                    receiver,
                    format!(
                        "{role} methods must take `&self`; a resource is shared \
                         between its dispatcher and local callers"
                    ),
                ));
            }
            Ok(())
        }
        _ => Err(syn::Error::new_spanned(
            sig.fn_token,
            format!("{role} methods must take `&self` as the first parameter"),
        )),
    }
}

/// Remote methods must be public.
pub(crate) fn validate_public(method: &ImplItemFn) -> syn::Result<()> {
    if matches!(method.vis, Visibility::Public(_)) {
        Ok(())
    } else {
        Err(syn::Error::new_spanned(
            &method.sig.ident,
            "#[remote] methods must be `pub`; private methods are never remote",
        ))
    }
}

/// Requires a hook to take nothing but `&self`.
pub(crate) fn validate_no_params(sig: &Signature, role: &str) -> syn::Result<()> {
    if sig.inputs.len() > 1 {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            format!("{role} methods take no parameters besides `&self`"),
        ));
    }
    Ok(())
}

/// Requires a hook to return a value.
pub(crate) fn validate_returns(sig: &Signature, role: &str) -> syn::Result<()> {
    if matches!(sig.output, ReturnType::Default) {
        return Err(syn::Error::new_spanned(
            &sig.ident,
            format!("{role} methods must return a serializable value"),
        ));
    }
    Ok(())
}

/// Typed parameters after `&self`; rejects borrowed parameter types.
pub(crate) fn typed_params(sig: &Signature) -> syn::Result<Vec<&Type>> {
    sig.inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat_type) => Some(&*pat_type.ty),
            FnArg::Receiver(_) => None,
        })
        .map(|ty| {
            if let Type::Reference(reference) = ty {
                Err(syn::Error::new_spanned(
                    reference,
                    "remote method parameters must be owned types; \
                     arguments are decoded from the call envelope",
                ))
            } else {
                Ok(ty)
            }
        })
        .collect()
}

/// Checks if a type is `Vec<T>`.
pub(crate) fn is_vec_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == "Vec"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && args.args.len() == 1
        && let GenericArgument::Type(_) = &args.args[0]
    {
        return true;
    }
    false
}

/// Checks if a return type is `Result<T, E>`.
pub(crate) fn is_result_type(return_type: &ReturnType) -> bool {
    if let ReturnType::Type(_, ty) = return_type
        && let Type::Path(type_path) = ty.as_ref()
        && let Some(segment) = type_path.path.segments.last()
    {
        return segment.ident == "Result";
    }
    false
}

/// Member name as seen remotely (raw identifiers lose their `r#`).
pub(crate) fn member_name(ident: &Ident) -> String {
    ident.unraw().to_string()
}

/// Last path segment of the impl target.
pub(crate) fn type_name_str(ty: &Type) -> syn::Result<String> {
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
    {
        return Ok(segment.ident.to_string());
    }
    Err(syn::Error::new_spanned(
        ty,
        "#[resource] impl target must be a path type",
    ))
}
