use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub fn derive_component(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let struct_name = &ast.ident;

    // Use ::sparse_ecs::component::Component, which resolves both inside this crate
    // (via `extern crate self as sparse_ecs;` in lib.rs) and from downstream consumers.
    TokenStream::from(quote! {
        impl ::sparse_ecs::component::Component for #struct_name {
        }
    })
}
