//! Derive macro for plife type enums.
//!
//! `#[derive(ParticleType)]` turns a fieldless enum into the type table of a
//! simulation. Variant order is type-index order, and each variant may carry
//! a `#[particle(...)]` attribute with the values of its
//! `plife::ParticleType` description:
//!
//! ```ignore
//! use plife::prelude::*;
//!
//! #[derive(ParticleType, Clone, Copy, PartialEq, Debug)]
//! enum Species {
//!     #[particle(count = 500, color = [0.2, 1.0, 0.2])]
//!     Prey,
//!     #[particle(count = 50, mass = 3.0, radius = 0.1)]
//!     Predator,
//! }
//!
//! let sim = Simulation::new()
//!     .with_types_of::<Species>()
//!     .with_rule(InteractionRule::new(Species::Predator, Species::Prey, 0.8));
//! ```
//!
//! The macro is re-exported from `plife`; depend on that crate, not this one.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse_macro_input, Data, DeriveInput, Expr, Fields, Variant};

/// Keys accepted inside `#[particle(...)]`, with the builder method each one
/// feeds.
const SETTINGS: [(&str, &str); 4] = [
    ("mass", "with_mass"),
    ("radius", "with_radius"),
    ("count", "with_count"),
    ("color", "with_color"),
];

/// Implements `plife::ParticleTypes`, `From<Enum> for u32` and
/// `TryFrom<u32> for Enum` for a fieldless enum.
///
/// `TryFrom<u32>` rejects indices past the last variant with
/// `SimulationError::TypeOutOfRange`, the same error the simulation returns
/// for out-of-range raw indices.
#[proc_macro_derive(ParticleType, attributes(particle))]
pub fn derive_particle_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "ParticleType can only be derived for enums",
        ));
    };
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "a ParticleType enum needs at least one variant",
        ));
    }

    let idents: Vec<_> = data.variants.iter().map(|v| &v.ident).collect();
    let indices: Vec<u32> = (0..idents.len() as u32).collect();
    let labels: Vec<String> = idents.iter().map(|ident| ident.to_string()).collect();
    let count = idents.len();
    let descriptions = data
        .variants
        .iter()
        .map(description)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl ::core::convert::From<#name> for u32 {
            fn from(value: #name) -> u32 {
                match value {
                    #(#name::#idents => #indices,)*
                }
            }
        }

        impl ::core::convert::TryFrom<u32> for #name {
            type Error = ::plife::SimulationError;

            fn try_from(value: u32) -> ::core::result::Result<Self, Self::Error> {
                match value {
                    #(#indices => Ok(#name::#idents),)*
                    _ => Err(::plife::SimulationError::TypeOutOfRange {
                        index: value as usize,
                        type_count: #count,
                    }),
                }
            }
        }

        impl ::plife::ParticleTypes for #name {
            const COUNT: usize = #count;

            fn all() -> &'static [Self] {
                &[#(#name::#idents),*]
            }

            fn name(self) -> &'static str {
                match self {
                    #(#name::#idents => #labels,)*
                }
            }

            fn particle_types() -> ::std::vec::Vec<::plife::ParticleType> {
                ::std::vec![#(#descriptions),*]
            }
        }
    })
}

/// `ParticleType::new("Variant")` followed by one builder call per key in the
/// variant's `#[particle(...)]` attribute.
fn description(variant: &Variant) -> syn::Result<TokenStream2> {
    if !matches!(variant.fields, Fields::Unit) {
        return Err(syn::Error::new_spanned(
            variant,
            "ParticleType variants cannot carry fields",
        ));
    }

    let label = variant.ident.to_string();
    let mut calls = Vec::new();
    for attr in variant.attrs.iter().filter(|a| a.path().is_ident("particle")) {
        attr.parse_nested_meta(|meta| {
            let Some((_, method)) = SETTINGS.iter().find(|&&(key, _)| meta.path.is_ident(key)) else {
                return Err(meta.error("expected one of `mass`, `radius`, `count`, `color`"));
            };
            let method = syn::Ident::new(method, meta.path.span());
            let value: Expr = meta.value()?.parse()?;
            calls.push(quote! { .#method(#value) });
            Ok(())
        })?;
    }

    Ok(quote! { ::plife::ParticleType::new(#label) #(#calls)* })
}
