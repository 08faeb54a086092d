mod args;
use args::HubArgs;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Error, ItemFn, ReturnType, parse_macro_input};

/// Runs the function body as the root coroutine of a fresh hub.
///
/// The hub is driven until the body returns. A body without a return type
/// may use `?` on `coro::Result`; errors are turned into a panic. A body
/// that declares a return type must return `coro::Result<T>`, which is
/// passed through.
///
/// ```rust,ignore
/// #[coro::main(stack_size = 262144)]
/// fn main() {
///     coro::sleep(std::time::Duration::from_millis(10))?;
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as HubArgs);
    let input = parse_macro_input!(item as ItemFn);

    if input.sig.ident != "main" {
        return Error::new_spanned(&input.sig.ident, "#[coro::main] must be used on fn main")
            .to_compile_error()
            .into();
    }

    expand(&args, input, quote! {}).into()
}

/// Like [`macro@main`], for `#[test]` functions: each test gets its own
/// hub.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as HubArgs);
    let input = parse_macro_input!(item as ItemFn);

    expand(&args, input, quote! { #[test] }).into()
}

fn expand(args: &HubArgs, input: ItemFn, marker: TokenStream2) -> TokenStream2 {
    let sig = &input.sig;

    if let Some(asyncness) = &sig.asyncness {
        return Error::new_spanned(asyncness, "coroutine bodies are plain functions, remove `async`")
            .to_compile_error();
    }

    if !sig.inputs.is_empty() {
        return Error::new_spanned(&sig.inputs, "the function must not take arguments")
            .to_compile_error();
    }

    let attrs = &input.attrs;
    let vis = &input.vis;
    let block = &input.block;

    let stack_size = args
        .stack_size
        .as_ref()
        .map(|size| quote! { .stack_size(#size) });

    let builder = quote! {
        ::coro::Hub::builder()
            #stack_size
            .build()
    };

    match &sig.output {
        ReturnType::Default => quote! {
            #marker
            #(#attrs)*
            #vis #sig {
                #builder
                    .expect("failed to build hub")
                    .block_on(move || -> ::coro::Result<()> {
                        #block;
                        ::core::result::Result::Ok(())
                    })
                    .expect("root coroutine failed")
            }
        },
        ReturnType::Type(..) => quote! {
            #marker
            #(#attrs)*
            #vis #sig {
                let hub = #builder?;
                hub.block_on(move || #block)
            }
        },
    }
}
