//! Attribute macros behind `#[core_async::test]` and `#[core_async::main]`.
//!
//! Both turn an `async fn` into a plain function that drives its body on a
//! runtime built through `core_async::runtime`, so crates never name Tokio in
//! their entry points or tests.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    if !attr.is_empty() {
        let tokens = TokenStream2::from(attr);
        return syn::Error::new_spanned(
            tokens,
            "core_async attribute macros do not accept arguments",
        )
        .to_compile_error()
        .into();
    }

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let mut sig = input.sig.clone();
    sig.asyncness = None;

    let attrs = input.attrs;
    let vis = input.vis;
    let block = input.block;

    let expanded = match kind {
        // Tests get a fresh current-thread runtime each, mirroring #[tokio::test].
        MacroKind::Test => quote! {
            #(#attrs)*
            #[test]
            #vis #sig {
                core_async::runtime::block_on(async move #block)
            }
        },
        MacroKind::Main => quote! {
            #(#attrs)*
            #vis #sig {
                core_async::runtime::block_on_multi_thread(async move #block)
            }
        },
    };

    expanded.into()
}
