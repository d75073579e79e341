// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Maps a Rust field type onto a [`sql_orm_core::registry::HostType`]
//! variant, and the [`Value`](sql_orm_core::codec::Value) variant that
//! carries it.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{GenericArgument, Ident, PathArguments, Type};

/// The registry host type a Rust field maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Bool,
    String,
    Bytes,
    Image,
    Guid,
    DateTime,
    TypeName,
    Enum,
    Object
}

impl Host {
    /// The `Value`/`HostType` variant identifier sharing this host's name.
    pub fn variant_ident(self) -> Ident {
        let name = match self {
            Host::I8 => "I8",
            Host::I16 => "I16",
            Host::I32 => "I32",
            Host::I64 => "I64",
            Host::F32 => "F32",
            Host::F64 => "F64",
            Host::Decimal => "Decimal",
            Host::Bool => "Bool",
            Host::String => "String",
            Host::Bytes => "Bytes",
            Host::Image => "Image",
            Host::Guid => "Guid",
            Host::DateTime => "DateTime",
            Host::TypeName => "TypeName",
            Host::Enum => "Enum",
            Host::Object => "Object"
        };
        Ident::new(name, Span::call_site())
    }

    /// `::sql_orm_core::registry::HostType::<variant>`.
    pub fn host_type_tokens(self) -> TokenStream {
        let variant = self.variant_ident();
        quote! { ::sql_orm_core::registry::HostType::#variant }
    }

    /// Fields that own their bytes (`String`, blobs, JSON, images) need a
    /// `.clone()` to read out of `&self`; the rest are `Copy`.
    pub fn needs_clone(self) -> bool {
        matches!(self, Host::String | Host::Bytes | Host::Object | Host::Image | Host::TypeName)
    }

    /// The non-`Option` default used when a driver null is coerced into
    /// this host type. `None` for `Image`, which has no sensible default.
    pub fn default_tokens(self) -> Option<TokenStream> {
        Some(match self {
            Host::I8 => quote! { 0i8 },
            Host::I16 => quote! { 0i16 },
            Host::I32 => quote! { 0i32 },
            Host::I64 => quote! { 0i64 },
            Host::F32 => quote! { 0.0f32 },
            Host::F64 => quote! { 0.0f64 },
            Host::Decimal => quote! { ::rust_decimal::Decimal::ZERO },
            Host::Bool => quote! { false },
            Host::String => quote! { ::std::string::String::new() },
            Host::Bytes => quote! { ::std::vec::Vec::new() },
            Host::Guid => quote! { ::uuid::Uuid::nil() },
            Host::DateTime => quote! { ::chrono::NaiveDateTime::MIN },
            Host::TypeName => quote! { ::std::string::String::new() },
            Host::Enum => quote! { 0i32 },
            Host::Object => quote! { ::serde_json::Value::Null },
            Host::Image => return None
        })
    }
}

/// The last path segment of a type, e.g. `"Uuid"` for `uuid::Uuid` or
/// `Option<uuid::Uuid>`'s inner type.
pub fn type_last_segment(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|segment| segment.ident.to_string()),
        _ => None
    }
}

/// `(true, T)` if `ty` is `Option<T>`, else `(false, ty.clone())`.
pub fn unwrap_option(ty: &Type) -> (bool, Type) {
    if let Type::Path(path) = ty
        && let Some(segment) = path.path.segments.last()
        && segment.ident == "Option"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return (true, inner.clone());
    }
    (false, ty.clone())
}

/// Infer the [`Host`] a field's Rust type maps onto. `explicit` is the
/// `#[field(host_type = "...")]` override, needed for types a bare Rust
/// type can't disambiguate (enum discriminants, type names, generic blobs).
pub fn infer(ty: &Type, explicit: Option<&str>) -> Result<Host, String> {
    if let Some(explicit) = explicit {
        return match explicit {
            "enum" => Ok(Host::Enum),
            "type_name" => Ok(Host::TypeName),
            "object" => Ok(Host::Object),
            "bytes" => Ok(Host::Bytes),
            "image" => Ok(Host::Image),
            other => Err(format!("unknown host_type override `{other}`"))
        };
    }

    let (_, inner) = unwrap_option(ty);
    let name = type_last_segment(&inner).ok_or_else(|| "unsupported field type".to_string())?;
    match name.as_str() {
        "i8" => Ok(Host::I8),
        "i16" => Ok(Host::I16),
        "i32" => Ok(Host::I32),
        "i64" => Ok(Host::I64),
        "f32" => Ok(Host::F32),
        "f64" => Ok(Host::F64),
        "Decimal" => Ok(Host::Decimal),
        "bool" => Ok(Host::Bool),
        "String" => Ok(Host::String),
        "Vec" => Ok(Host::Bytes),
        "Bitmap" => Ok(Host::Image),
        "Uuid" => Ok(Host::Guid),
        "NaiveDateTime" => Ok(Host::DateTime),
        "Value" => Ok(Host::Object),
        other => Err(format!(
            "cannot infer a host type for `{other}`; add `#[field(host_type = \"...\")]`"
        ))
    }
}
