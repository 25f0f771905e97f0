//! Procedural macros for the svckit project.
//!
//! - `#[derive(Document)]` implements `Document` and `IsZero` for a struct with
//!   named fields, projecting every serialized field under its serde name.
//! - `#[derive(IsZero)]` implements only `IsZero`, for nested structs.
//!
//! Field roles are inferred from storage keys (`_id`, `create_time`,
//! `update_time`) or set explicitly with `#[document(id)]`,
//! `#[document(created_at)]` and `#[document(updated_at)]`.
//!
//! Generated code refers to `::svckit`. Crates depending on `svckit-core`
//! directly use `#[document(crate = "svckit_core")]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Error, Fields, FieldsNamed, Ident, LitStr, Path, Result, Token,
    Type, parse_macro_input, spanned::Spanned,
};

const ID_KEY: &str = "_id";
const CREATED_AT_KEY: &str = "create_time";
const UPDATED_AT_KEY: &str = "update_time";

#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_document(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

#[proc_macro_derive(IsZero, attributes(document))]
pub fn derive_is_zero(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_is_zero_only(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Data,
    Id,
    CreatedAt,
    UpdatedAt,
}

struct ProjectedField {
    ident: Ident,
    ty: Type,
    key: String,
    role: Role,
}

fn expand_document(input: &DeriveInput) -> Result<TokenStream2> {
    let krate = crate_path(&input.attrs)?;
    reject_container_renames(&input.attrs)?;

    let fields = projected_fields(named_fields(input)?)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let projections = fields.iter().map(|field| {
        let ProjectedField { ident, ty, key, role } = field;
        let role = match role {
            Role::Data => quote!(#krate::document::FieldRole::Data),
            Role::Id => quote! {
                #krate::document::FieldRole::Id(<#ty as #krate::document::IdValue>::KIND)
            },
            Role::CreatedAt => quote!(#krate::document::FieldRole::CreatedAt),
            Role::UpdatedAt => quote!(#krate::document::FieldRole::UpdatedAt),
        };

        quote! {
            #krate::document::Field::project(#key, &self.#ident, #role)?
        }
    });

    let is_zero = expand_is_zero(input, &krate, fields.iter().map(|field| &field.ident));

    Ok(quote! {
        impl #impl_generics #krate::document::Document for #ident #ty_generics #where_clause {
            fn fields(
                &self,
            ) -> #krate::error::DocumentStoreResult<::std::vec::Vec<#krate::document::Field>> {
                ::std::result::Result::Ok(::std::vec![#(#projections),*])
            }
        }

        #is_zero
    })
}

fn expand_is_zero_only(input: &DeriveInput) -> Result<TokenStream2> {
    let krate = crate_path(&input.attrs)?;
    let fields = projected_fields(named_fields(input)?)?;

    Ok(expand_is_zero(
        input,
        &krate,
        fields.iter().map(|field| &field.ident),
    ))
}

fn expand_is_zero<'a>(
    input: &DeriveInput,
    krate: &Path,
    idents: impl Iterator<Item = &'a Ident>,
) -> TokenStream2 {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics #krate::document::IsZero for #ident #ty_generics #where_clause {
            fn is_zero(&self) -> bool {
                true #(&& #krate::document::IsZero::is_zero(&self.#idents))*
            }
        }
    }
}

fn named_fields(input: &DeriveInput) -> Result<&FieldsNamed> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(fields),
            _ => Err(Error::new(
                input.ident.span(),
                "documents must be structs with named fields",
            )),
        },
        _ => Err(Error::new(
            input.ident.span(),
            "documents must be structs with named fields",
        )),
    }
}

fn projected_fields(fields: &FieldsNamed) -> Result<Vec<ProjectedField>> {
    let mut projected = Vec::new();

    for field in &fields.named {
        let Some(ident) = field.ident.clone() else {
            continue;
        };

        let serde = serde_field_attrs(&field.attrs)?;
        if serde.skip {
            continue;
        }
        if serde.flatten {
            return Err(Error::new(
                field.span(),
                "#[serde(flatten)] is not supported on document fields",
            ));
        }

        let key = serde
            .rename
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        let role = match document_field_role(&field.attrs)? {
            Some(role) => role,
            None => match key.as_str() {
                ID_KEY => Role::Id,
                CREATED_AT_KEY => Role::CreatedAt,
                UPDATED_AT_KEY => Role::UpdatedAt,
                _ => Role::Data,
            },
        };

        projected.push(ProjectedField {
            ident,
            ty: field.ty.clone(),
            key,
            role,
        });
    }

    Ok(projected)
}

#[derive(Default)]
struct SerdeFieldAttrs {
    rename: Option<String>,
    skip: bool,
    flatten: bool,
}

fn serde_field_attrs(attrs: &[Attribute]) -> Result<SerdeFieldAttrs> {
    let mut parsed = SerdeFieldAttrs::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if meta.input.peek(Token![=]) {
                    parsed.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    meta.parse_nested_meta(|inner| {
                        let value = inner.value()?.parse::<LitStr>()?.value();
                        if inner.path.is_ident("serialize") {
                            parsed.rename = Some(value);
                        }
                        Ok(())
                    })?;
                }
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                parsed.skip = true;
            } else if meta.path.is_ident("flatten") {
                parsed.flatten = true;
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        })?;
    }

    Ok(parsed)
}

fn skip_meta_value(meta: &syn::meta::ParseNestedMeta) -> Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        content.parse::<TokenStream2>()?;
    }
    Ok(())
}

fn document_field_role(attrs: &[Attribute]) -> Result<Option<Role>> {
    let mut role = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("document")) {
        attr.parse_nested_meta(|meta| {
            let next = if meta.path.is_ident("id") {
                Role::Id
            } else if meta.path.is_ident("created_at") {
                Role::CreatedAt
            } else if meta.path.is_ident("updated_at") {
                Role::UpdatedAt
            } else {
                return Err(meta.error("expected `id`, `created_at` or `updated_at`"));
            };

            if role.replace(next).is_some() {
                return Err(meta.error("a field can only have one document role"));
            }
            Ok(())
        })?;
    }

    Ok(role)
}

fn crate_path(attrs: &[Attribute]) -> Result<Path> {
    let mut path = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("document")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                path = Some(meta.value()?.parse::<LitStr>()?.parse::<Path>()?);
                Ok(())
            } else {
                Err(meta.error("unsupported container attribute, expected `crate`"))
            }
        })?;
    }

    Ok(path.unwrap_or_else(|| syn::parse_quote!(::svckit)))
}

fn reject_container_renames(attrs: &[Attribute]) -> Result<()> {
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") || meta.path.is_ident("rename_all_fields") {
                return Err(meta.error(
                    "#[serde(rename_all)] is not supported on documents, rename fields individually",
                ));
            }
            skip_meta_value(&meta)
        })?;
    }

    Ok(())
}
